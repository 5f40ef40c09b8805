//! Interview Question Lists
//!
//! Questions arrive as the raw text output of an upstream generative model. The
//! model is asked for a JSON array of strings but routinely wraps it in code
//! fences, quotes, doubled brackets or a bracketed string literal such as
//! `['["Q1", "Q2"]\n']`. This module peels those layers off one at a time and
//! attempts a strict parse after each step.

use serde::Serialize;
use serde_json::Value;
use std::ops::Index;

/// Upper bound on the number of wrapper layers removed from a payload.
const MAX_UNWRAP_DEPTH: usize = 12;

const FENCE: &str = "```";

/// An ordered, immutable list of interview questions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct QuestionList(Vec<String>);

impl QuestionList {
    /// Builds a list from already-clean question strings.
    ///
    /// Each question is trimmed and blank entries are dropped.
    pub fn new<I, S>(questions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(
            questions
                .into_iter()
                .map(Into::into)
                .map(|q| q.trim().to_string())
                .filter(|q| !q.is_empty())
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.0.get(index).map(String::as_str)
    }

}

impl Index<usize> for QuestionList {
    type Output = str;

    fn index(&self, index: usize) -> &str {
        &self.0[index]
    }
}

impl From<QuestionList> for Vec<String> {
    fn from(list: QuestionList) -> Self {
        list.0
    }
}

/// Failure to turn a raw payload into a [`QuestionList`].
///
/// Both variants keep the original payload and the last cleaned form so the
/// caller can log exactly what the model produced.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("Could not parse interview questions: {reason}")]
    Malformed {
        raw: String,
        cleaned: String,
        reason: String,
    },
    #[error("Could not parse interview questions: expected an array of strings")]
    NotStringArray { raw: String, cleaned: String },
}

impl ParseError {
    pub fn raw(&self) -> &str {
        match self {
            ParseError::Malformed { raw, .. } | ParseError::NotStringArray { raw, .. } => raw,
        }
    }

    pub fn cleaned(&self) -> &str {
        match self {
            ParseError::Malformed { cleaned, .. } | ParseError::NotStringArray { cleaned, .. } => {
                cleaned
            }
        }
    }
}

/// Outcome of one strict parse attempt.
enum Attempt {
    Questions(Vec<String>),
    /// Valid JSON holding a string; its content may itself be the array.
    Nested(String),
    WrongShape,
    Invalid(String),
}

fn attempt(candidate: &str) -> Attempt {
    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Array(items)) => {
            let strings: Option<Vec<String>> = items
                .into_iter()
                .map(|item| match item {
                    Value::String(s) => Some(s),
                    _ => None,
                })
                .collect();
            match strings {
                Some(strings) => Attempt::Questions(strings),
                None => Attempt::WrongShape,
            }
        }
        Ok(Value::String(inner)) => Attempt::Nested(inner),
        Ok(_) => Attempt::WrongShape,
        Err(e) => Attempt::Invalid(e.to_string()),
    }
}

/// Removes a leading fence line (including any language tag) and a trailing fence.
fn strip_fences(s: &str) -> Option<&str> {
    let mut out = s;
    let mut changed = false;
    if let Some(rest) = out.strip_prefix(FENCE) {
        out = match rest.find('\n') {
            Some(newline) => &rest[newline + 1..],
            None => rest,
        };
        changed = true;
    }
    if let Some(rest) = out.trim_end().strip_suffix(FENCE) {
        out = rest;
        changed = true;
    }
    changed.then_some(out)
}

fn is_quote(c: char) -> bool {
    c == '"' || c == '\''
}

fn strip_leading_quote(s: &str) -> Option<&str> {
    s.strip_prefix(is_quote)
}

fn strip_trailing_quote(s: &str) -> Option<&str> {
    s.strip_suffix(is_quote)
}

/// `[[...` becomes `[...`.
fn collapse_leading_bracket(s: &str) -> Option<&str> {
    s.starts_with("[[").then(|| &s[1..])
}

/// `...]]` becomes `...]`.
fn collapse_trailing_bracket(s: &str) -> Option<&str> {
    s.ends_with("]]").then(|| &s[..s.len() - 1])
}

/// Drops quotes just inside the outer brackets: `['...']` becomes `[...]`.
///
/// Either side is stripped on its own, so `['...]` and `[...']` are handled too.
fn strip_inner_quotes(s: &str) -> Option<String> {
    let inner = s.strip_prefix('[')?.strip_suffix(']')?.trim();
    let unquoted = strip_leading_quote(inner).unwrap_or(inner);
    let unquoted = strip_trailing_quote(unquoted).unwrap_or(unquoted);
    (unquoted.len() != inner.len()).then(|| format!("[{}]", unquoted.trim()))
}

/// Removes exactly one wrapper artifact, trying the outermost kinds first.
fn peel(s: &str) -> Option<String> {
    strip_fences(s)
        .or_else(|| strip_leading_quote(s))
        .or_else(|| strip_trailing_quote(s))
        .or_else(|| collapse_leading_bracket(s))
        .or_else(|| collapse_trailing_bracket(s))
        .map(str::to_string)
        .or_else(|| strip_inner_quotes(s))
}

/// Parses a raw model payload into a [`QuestionList`].
///
/// An empty array is accepted here; refusing to start an empty interview is
/// the controller's decision.
pub fn parse(raw: &str) -> Result<QuestionList, ParseError> {
    let mut cleaned = raw.trim().to_string();
    let mut wrong_shape = false;
    let mut last_reason = String::from("empty input");

    for _ in 0..MAX_UNWRAP_DEPTH {
        match attempt(&cleaned) {
            Attempt::Questions(questions) => return Ok(QuestionList::new(questions)),
            Attempt::Nested(inner) => {
                cleaned = inner.trim().to_string();
                continue;
            }
            Attempt::WrongShape => wrong_shape = true,
            Attempt::Invalid(reason) => last_reason = reason,
        }

        let Some(next) = peel(&cleaned) else {
            break;
        };
        cleaned = next.trim().to_string();
    }

    tracing::warn!(raw = %raw, cleaned = %cleaned, "Failed to parse interview questions");
    if wrong_shape {
        Err(ParseError::NotStringArray {
            raw: raw.to_string(),
            cleaned,
        })
    } else {
        Err(ParseError::Malformed {
            raw: raw.to_string(),
            cleaned,
            reason: last_reason,
        })
    }
}
