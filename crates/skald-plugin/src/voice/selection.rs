//! Voice selection heuristic.
//!
//! Run once when a backend is activated and cached; a call-name override
//! can still pick a different voice per utterance.
//!
//! Order:
//! 1. call-name override from `voice_by_call_name`;
//! 2. first voice matching preferred language and gender;
//! 3. first voice matching preferred language;
//! 4. `default_voice_index` (index 0 when out of range).

use serde::{Deserialize, Serialize};

use crate::options::EffectiveOptions;
use crate::router::split_pattern;

/// One voice offered by a backend, in enumeration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceDescriptor {
    /// Backend-specific voice id passed back on synthesis.
    pub id: String,
    pub display_name: String,
    /// Language tags such as `ru`, `en-us`.
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub gender: Option<String>,
}

impl VoiceDescriptor {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            languages: Vec::new(),
            gender: None,
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.languages.push(language.into());
        self
    }

    pub fn with_gender(mut self, gender: impl Into<String>) -> Self {
        self.gender = Some(gender.into());
        self
    }

    /// Whether this voice speaks `language` (`"ru"` matches `ru-RU`).
    pub fn matches_language(&self, language: &str) -> bool {
        let wanted = primary_subtag(language);
        if wanted.is_empty() {
            return false;
        }
        if self.languages.iter().any(|tag| primary_subtag(tag) == wanted) {
            return true;
        }
        let name = self.display_name.to_lowercase();
        language_names(&wanted).iter().any(|known| name.contains(known))
    }

    /// Whether this voice carries the `gender` token.
    pub fn matches_gender(&self, gender: &str) -> bool {
        let Some(wanted) = canonical_gender(gender) else {
            return false;
        };
        if let Some(explicit) = self.gender.as_deref() {
            return canonical_gender(explicit) == Some(wanted);
        }
        self.display_name
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|token| token.chars().count() > 1)
            .any(|token| canonical_gender(token) == Some(wanted))
    }
}

/// Voice preferences read from a TTS plugin's options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoicePreferences {
    pub language: String,
    pub gender: String,
    pub default_index: usize,
    /// `(aliases, voice id)` from `voice_by_call_name`.
    pub by_call_name: Vec<(Vec<String>, String)>,
}

impl Default for VoicePreferences {
    fn default() -> Self {
        Self {
            language: "ru".into(),
            gender: "female".into(),
            default_index: 0,
            by_call_name: Vec::new(),
        }
    }
}

impl VoicePreferences {
    /// Option keys: `prefer_language`, `prefer_gender`,
    /// `default_voice_index`, `voice_by_call_name`.
    pub fn from_options(options: &EffectiveOptions) -> Self {
        let defaults = Self::default();
        let by_call_name = options
            .object("voice_by_call_name")
            .map(|mapping| {
                mapping
                    .iter()
                    .filter_map(|(pattern, voice)| {
                        let voice = voice.as_str()?.trim();
                        (!voice.is_empty()).then(|| (split_pattern(pattern), voice.to_string()))
                    })
                    .collect()
            })
            .unwrap_or_default();
        Self {
            language: options
                .str("prefer_language")
                .map(str::to_string)
                .unwrap_or(defaults.language),
            gender: options
                .str("prefer_gender")
                .map(str::to_string)
                .unwrap_or(defaults.gender),
            default_index: options
                .i64("default_voice_index")
                .and_then(|i| usize::try_from(i).ok())
                .unwrap_or(defaults.default_index),
            by_call_name,
        }
    }

    /// Voice bound to the name the user addressed the assistant with.
    ///
    /// The configured id is returned even if the backend does not list it;
    /// `index` is then `None`.
    pub fn override_for(&self, call_name: &str, voices: &[VoiceDescriptor]) -> Option<VoiceChoice> {
        let call_name = crate::router::normalize_phrase(call_name);
        if call_name.is_empty() {
            return None;
        }
        let (_, voice_id) = self
            .by_call_name
            .iter()
            .find(|(aliases, _)| aliases.contains(&call_name))?;
        Some(VoiceChoice {
            id: voice_id.clone(),
            index: voices.iter().position(|v| v.id == *voice_id),
            source: SelectionSource::CallName,
        })
    }
}

/// Which rule picked a voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionSource {
    CallName,
    LanguageAndGender,
    Language,
    DefaultIndex,
}

/// The selected voice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoiceChoice {
    pub id: String,
    /// Position in the enumerated voices, when listed.
    pub index: Option<usize>,
    pub source: SelectionSource,
}

/// Pick a voice. `None` only when there are no voices and no override.
pub fn select_voice(
    voices: &[VoiceDescriptor],
    preferences: &VoicePreferences,
    call_name: &str,
) -> Option<VoiceChoice> {
    if let Some(choice) = preferences.override_for(call_name, voices) {
        return Some(choice);
    }
    if voices.is_empty() {
        return None;
    }

    let pick = |index: usize, source: SelectionSource| VoiceChoice {
        id: voices[index].id.clone(),
        index: Some(index),
        source,
    };

    let language = preferences.language.as_str();
    if let Some(index) = voices
        .iter()
        .position(|v| v.matches_language(language) && v.matches_gender(&preferences.gender))
    {
        return Some(pick(index, SelectionSource::LanguageAndGender));
    }
    if let Some(index) = voices.iter().position(|v| v.matches_language(language)) {
        return Some(pick(index, SelectionSource::Language));
    }

    let index = if preferences.default_index < voices.len() {
        preferences.default_index
    } else {
        0
    };
    Some(pick(index, SelectionSource::DefaultIndex))
}

fn primary_subtag(tag: &str) -> String {
    tag.trim()
        .split(['-', '_'])
        .next()
        .unwrap_or_default()
        .to_lowercase()
}

fn language_names(language: &str) -> &'static [&'static str] {
    match language {
        "ru" => &["russian", "русский"],
        "en" => &["english", "английский"],
        "uk" => &["ukrainian", "українська", "украинский"],
        "de" => &["german", "deutsch", "немецкий"],
        "fr" => &["french", "français", "французский"],
        _ => &[],
    }
}

fn canonical_gender(token: &str) -> Option<&'static str> {
    match token.trim().to_lowercase().as_str() {
        "female" | "f" | "woman" | "женский" | "жен" | "женщина" => Some("female"),
        "male" | "m" | "man" | "мужской" | "муж" | "мужчина" => Some("male"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{OptionMap, merge};
    use serde_json::json;

    fn pair() -> Vec<VoiceDescriptor> {
        vec![
            VoiceDescriptor::new("0", "English").with_language("en"),
            VoiceDescriptor::new("1", "Irina")
                .with_language("ru")
                .with_gender("female"),
        ]
    }

    fn prefs(language: &str, gender: &str, default_index: usize) -> VoicePreferences {
        VoicePreferences {
            language: language.into(),
            gender: gender.into(),
            default_index,
            by_call_name: Vec::new(),
        }
    }

    #[test]
    fn language_and_gender_match_wins() {
        let choice = select_voice(&pair(), &prefs("ru", "female", 0), "").unwrap();
        assert_eq!(choice.id, "1");
        assert_eq!(choice.index, Some(1));
        assert_eq!(choice.source, SelectionSource::LanguageAndGender);
    }

    #[test]
    fn unknown_language_falls_back_to_default_index() {
        let choice = select_voice(&pair(), &prefs("fr", "female", 1), "").unwrap();
        assert_eq!(choice.id, "1");
        assert_eq!(choice.source, SelectionSource::DefaultIndex);

        let choice = select_voice(&pair(), &prefs("fr", "female", 0), "").unwrap();
        assert_eq!(choice.id, "0");
    }

    #[test]
    fn default_index_out_of_range_uses_first_voice() {
        let choice = select_voice(&pair(), &prefs("fr", "", 7), "").unwrap();
        assert_eq!(choice.index, Some(0));
    }

    #[test]
    fn language_only_match_when_gender_differs() {
        let voices = vec![
            VoiceDescriptor::new("a", "English").with_language("en"),
            VoiceDescriptor::new("b", "Aleksandr").with_language("ru").with_gender("male"),
            VoiceDescriptor::new("c", "Anna").with_language("ru-RU").with_gender("female"),
        ];
        let choice = select_voice(&voices, &prefs("ru", "male", 0), "").unwrap();
        assert_eq!(choice.id, "b");
        let choice = select_voice(&voices, &prefs("ru", "robot", 0), "").unwrap();
        assert_eq!(choice.id, "b");
        assert_eq!(choice.source, SelectionSource::Language);
    }

    #[test]
    fn display_name_carries_language_and_gender() {
        let voices = vec![
            VoiceDescriptor::new("v0", "Microsoft David - English (United States)"),
            VoiceDescriptor::new("v1", "Microsoft Pavel - Russian male"),
            VoiceDescriptor::new("v2", "Microsoft Irina - Russian female"),
        ];
        let choice = select_voice(&voices, &prefs("ru", "female", 0), "").unwrap();
        assert_eq!(choice.id, "v2");
    }

    #[test]
    fn female_is_not_mistaken_for_male() {
        let voice = VoiceDescriptor::new("x", "Russian female");
        assert!(voice.matches_gender("female"));
        assert!(!voice.matches_gender("male"));
    }

    #[test]
    fn explicit_gender_field_uses_synonyms() {
        let voice = VoiceDescriptor::new("x", "ru").with_gender("F");
        assert!(voice.matches_gender("женский"));
        assert!(!voice.matches_gender("male"));
    }

    #[test]
    fn call_name_override_wins() {
        let mut preferences = prefs("ru", "female", 0);
        preferences.by_call_name = vec![(vec!["николай".into(), "коля".into()], "0".into())];
        let choice = select_voice(&pair(), &preferences, "Коля").unwrap();
        assert_eq!(choice.id, "0");
        assert_eq!(choice.source, SelectionSource::CallName);
        assert_eq!(choice.index, Some(0));
    }

    #[test]
    fn override_for_unlisted_voice_keeps_id() {
        let mut preferences = prefs("ru", "female", 0);
        preferences.by_call_name = vec![(vec!["николай".into()], "aidar".into())];
        let choice = select_voice(&[], &preferences, "николай").unwrap();
        assert_eq!(choice.id, "aidar");
        assert_eq!(choice.index, None);
    }

    #[test]
    fn no_voices_and_no_override_is_none() {
        assert!(select_voice(&[], &prefs("ru", "female", 0), "ирина").is_none());
    }

    #[test]
    fn preferences_from_options() {
        let defaults = json!({
            "prefer_language": "ru",
            "prefer_gender": "female",
            "default_voice_index": 0,
            "voice_by_call_name": {}
        });
        let persisted = json!({
            "prefer_gender": "male",
            "default_voice_index": 2,
            "voice_by_call_name": {"николай|коля": "aidar", "пустой": ""}
        });
        let options = merge(
            defaults.as_object().unwrap(),
            persisted.as_object().unwrap(),
        );
        let preferences = VoicePreferences::from_options(&options);
        assert_eq!(preferences.language, "ru");
        assert_eq!(preferences.gender, "male");
        assert_eq!(preferences.default_index, 2);
        assert_eq!(
            preferences.by_call_name,
            vec![(vec!["николай".to_string(), "коля".to_string()], "aidar".to_string())]
        );
    }

    #[test]
    fn negative_default_index_uses_default() {
        let defaults = json!({"default_voice_index": 0});
        let persisted = json!({"default_voice_index": -3});
        let options = merge(
            defaults.as_object().unwrap(),
            persisted.as_object().unwrap(),
        );
        assert_eq!(VoicePreferences::from_options(&options).default_index, 0);
        assert_eq!(
            VoicePreferences::from_options(&merge(&OptionMap::new(), &OptionMap::new())),
            VoicePreferences::default()
        );
    }
}
