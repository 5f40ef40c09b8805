//! Voice selection for the speech output engine.

use serde::{Deserialize, Serialize};

/// A voice offered by a speech synthesis engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voice {
    pub name: String,
    #[serde(default)]
    pub lang: String,
}

/// Which voice the interviewer should prefer when several are available.
#[derive(Debug, Clone, PartialEq)]
pub struct VoicePreference {
    /// BCP 47 language tag, e.g. `en-US`. Matched on the primary subtag.
    pub language: String,
    /// Substrings looked for in voice names, in priority order.
    pub name_hints: Vec<String>,
}

impl Default for VoicePreference {
    fn default() -> Self {
        Self {
            language: "en-US".to_string(),
            name_hints: vec![
                "Google UK English Female".to_string(),
                "Female".to_string(),
            ],
        }
    }
}

fn primary_subtag(tag: &str) -> &str {
    tag.split(['-', '_']).next().unwrap_or(tag)
}

impl VoicePreference {
    fn speaks_language(&self, voice: &Voice) -> bool {
        primary_subtag(&voice.lang).eq_ignore_ascii_case(primary_subtag(&self.language))
    }

    /// Picks the best available voice, or `None` to use the engine default.
    ///
    /// Hints are tried in order; a hinted voice in the preferred language wins
    /// over a hinted voice in any other language.
    pub fn select<'a>(&self, voices: &'a [Voice]) -> Option<&'a Voice> {
        for hint in &self.name_hints {
            let hinted: Vec<&Voice> = voices
                .iter()
                .filter(|v| v.name.contains(hint.as_str()))
                .collect();
            if let Some(voice) = hinted.iter().find(|v| self.speaks_language(v)) {
                return Some(*voice);
            }
            if let Some(voice) = hinted.first() {
                return Some(*voice);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voice(name: &str, lang: &str) -> Voice {
        Voice {
            name: name.to_string(),
            lang: lang.to_string(),
        }
    }

    #[test]
    fn test_select_prefers_first_hint() {
        let voices = vec![
            voice("Microsoft Zira Female", "en-US"),
            voice("Google UK English Female", "en-GB"),
            voice("Google US English", "en-US"),
        ];
        let chosen = VoicePreference::default().select(&voices).unwrap();
        assert_eq!(chosen.name, "Google UK English Female");
    }

    #[test]
    fn test_select_prefers_matching_language_within_a_hint() {
        let voices = vec![voice("Amelie Female", "fr-FR"), voice("Zira Female", "en-US")];
        let pref = VoicePreference {
            language: "en-GB".to_string(),
            name_hints: vec!["Female".to_string()],
        };
        assert_eq!(pref.select(&voices).unwrap().name, "Zira Female");
    }

    #[test]
    fn test_select_falls_back_to_engine_default() {
        let voices = vec![voice("Alex", "en-US")];
        assert!(VoicePreference::default().select(&voices).is_none());
        assert!(VoicePreference::default().select(&[]).is_none());
    }
}
