//! Anonymous profile attributes and the normalizer that coerces
//! untrusted client input into the canonical domain.
//!
//! Normalization never fails: unrecognized enum values fall back to
//! `not-specified` (profiles) or `any` (preferences), free text is
//! trimmed and truncated, keyword lists are capped.

use serde::{Deserialize, Serialize};

use crate::constants::{MAX_KEYWORDS, MAX_KEYWORD_LEN, MAX_LOCATION_LEN};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Other,
    #[serde(rename = "not-specified")]
    NotSpecified,
}

impl Gender {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "male" => Self::Male,
            "female" => Self::Female,
            "other" => Self::Other,
            _ => Self::NotSpecified,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgeBand {
    #[serde(rename = "18-25")]
    From18To25,
    #[serde(rename = "26-35")]
    From26To35,
    #[serde(rename = "36-45")]
    From36To45,
    #[serde(rename = "46+")]
    Over46,
    #[serde(rename = "not-specified")]
    NotSpecified,
}

impl AgeBand {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "18-25" => Self::From18To25,
            "26-35" => Self::From26To35,
            "36-45" => Self::From36To45,
            "46+" => Self::Over46,
            _ => Self::NotSpecified,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatType {
    Text,
    Video,
}

impl ChatType {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "video" => Self::Video,
            _ => Self::Text,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Video => "video",
        }
    }
}

/// Desired counterpart gender; `any` is the wildcard sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenderPref {
    Any,
    Male,
    Female,
    Other,
    #[serde(rename = "not-specified")]
    NotSpecified,
}

impl GenderPref {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "male" => Self::Male,
            "female" => Self::Female,
            "other" => Self::Other,
            "not-specified" => Self::NotSpecified,
            _ => Self::Any,
        }
    }

    pub fn accepts(&self, gender: Gender) -> bool {
        match self {
            Self::Any => true,
            Self::Male => gender == Gender::Male,
            Self::Female => gender == Gender::Female,
            Self::Other => gender == Gender::Other,
            Self::NotSpecified => gender == Gender::NotSpecified,
        }
    }
}

/// Desired counterpart age band; `any` is the wildcard sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgePref {
    #[serde(rename = "any")]
    Any,
    #[serde(rename = "18-25")]
    From18To25,
    #[serde(rename = "26-35")]
    From26To35,
    #[serde(rename = "36-45")]
    From36To45,
    #[serde(rename = "46+")]
    Over46,
}

impl AgePref {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "18-25" => Self::From18To25,
            "26-35" => Self::From26To35,
            "36-45" => Self::From36To45,
            "46+" => Self::Over46,
            _ => Self::Any,
        }
    }

    pub fn accepts(&self, age: AgeBand) -> bool {
        match self {
            Self::Any => true,
            Self::From18To25 => age == AgeBand::From18To25,
            Self::From26To35 => age == AgeBand::From26To35,
            Self::From36To45 => age == AgeBand::From36To45,
            Self::Over46 => age == AgeBand::Over46,
        }
    }
}

/// Sanitized anonymous profile attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub gender: Gender,
    pub age: AgeBand,
    pub location: Option<String>,
    pub keywords: Vec<String>,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            gender: Gender::NotSpecified,
            age: AgeBand::NotSpecified,
            location: None,
            keywords: Vec::new(),
        }
    }
}

/// Sanitized matching preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    pub gender: GenderPref,
    pub age: AgePref,
    pub chat_type: ChatType,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            gender: GenderPref::Any,
            age: AgePref::Any,
            chat_type: ChatType::Text,
        }
    }
}

/// Untrusted profile attributes as received from a client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawProfile {
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub age: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub keywords: Option<Vec<String>>,
}

/// Untrusted matching preferences as received from a client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawPreferences {
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub age: Option<String>,
    #[serde(default)]
    pub chat_type: Option<String>,
}

pub fn normalize_profile(raw: &RawProfile) -> Profile {
    Profile {
        gender: raw
            .gender
            .as_deref()
            .map(Gender::parse)
            .unwrap_or(Gender::NotSpecified),
        age: raw
            .age
            .as_deref()
            .map(AgeBand::parse)
            .unwrap_or(AgeBand::NotSpecified),
        location: raw.location.as_deref().and_then(normalize_location),
        keywords: raw
            .keywords
            .as_deref()
            .map(normalize_keywords)
            .unwrap_or_default(),
    }
}

/// Partial update: only the fields present in `raw` are replaced.
pub fn merge_profile(profile: &mut Profile, raw: &RawProfile) {
    if let Some(gender) = raw.gender.as_deref() {
        profile.gender = Gender::parse(gender);
    }
    if let Some(age) = raw.age.as_deref() {
        profile.age = AgeBand::parse(age);
    }
    if let Some(location) = raw.location.as_deref() {
        profile.location = normalize_location(location);
    }
    if let Some(keywords) = raw.keywords.as_deref() {
        profile.keywords = normalize_keywords(keywords);
    }
}

pub fn normalize_preferences(raw: &RawPreferences) -> Preferences {
    Preferences {
        gender: raw
            .gender
            .as_deref()
            .map(GenderPref::parse)
            .unwrap_or(GenderPref::Any),
        age: raw.age.as_deref().map(AgePref::parse).unwrap_or(AgePref::Any),
        chat_type: raw
            .chat_type
            .as_deref()
            .map(ChatType::parse)
            .unwrap_or(ChatType::Text),
    }
}

fn normalize_location(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(truncate_chars(trimmed, MAX_LOCATION_LEN))
}

/// Keywords keep their client-supplied order; duplicates (case
/// insensitive) are dropped, the list is capped at 10 entries.
fn normalize_keywords(words: &[String]) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    let mut out: Vec<String> = Vec::new();
    for word in words {
        let trimmed = word.trim();
        if trimmed.is_empty() {
            continue;
        }
        let cleaned = truncate_chars(trimmed, MAX_KEYWORD_LEN);
        let key = cleaned.to_lowercase();
        if seen.contains(&key) {
            continue;
        }
        seen.push(key);
        out.push(cleaned);
        if out.len() == MAX_KEYWORDS {
            break;
        }
    }
    out
}

fn truncate_chars(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_coercion_is_lenient() {
        assert_eq!(Gender::parse("MALE"), Gender::Male);
        assert_eq!(Gender::parse("  Female "), Gender::Female);
        assert_eq!(Gender::parse("attack-helicopter"), Gender::NotSpecified);
        assert_eq!(AgeBand::parse("26-35"), AgeBand::From26To35);
        assert_eq!(AgeBand::parse("old"), AgeBand::NotSpecified);
        assert_eq!(GenderPref::parse("whatever"), GenderPref::Any);
        assert_eq!(AgePref::parse(""), AgePref::Any);
        assert_eq!(ChatType::parse("VIDEO"), ChatType::Video);
        assert_eq!(ChatType::parse("hologram"), ChatType::Text);
    }

    #[test]
    fn test_normalize_profile_caps_fields() {
        let raw = RawProfile {
            gender: Some("female".to_string()),
            age: Some("18-25".to_string()),
            location: Some(format!("  {}  ", "x".repeat(500))),
            keywords: Some(
                (0..20)
                    .map(|i| format!("  keyword-{} ", i))
                    .collect::<Vec<_>>(),
            ),
        };
        let profile = normalize_profile(&raw);
        assert_eq!(profile.gender, Gender::Female);
        assert_eq!(profile.location.as_ref().map(|l| l.chars().count()), Some(100));
        assert_eq!(profile.keywords.len(), 10);
        assert_eq!(profile.keywords[0], "keyword-0");
    }

    #[test]
    fn test_normalize_keywords_dedupes_case_insensitive() {
        let words = vec![
            "Rust".to_string(),
            "rust".to_string(),
            " RUST ".to_string(),
            "chess".to_string(),
            "".to_string(),
        ];
        let cleaned = normalize_keywords(&words);
        assert_eq!(cleaned, vec!["Rust".to_string(), "chess".to_string()]);
    }

    #[test]
    fn test_keyword_length_cap() {
        let words = vec!["y".repeat(200)];
        let cleaned = normalize_keywords(&words);
        assert_eq!(cleaned[0].chars().count(), MAX_KEYWORD_LEN);
    }

    #[test]
    fn test_merge_profile_is_partial() {
        let mut profile = normalize_profile(&RawProfile {
            gender: Some("male".to_string()),
            age: Some("36-45".to_string()),
            location: Some("Lyon, France".to_string()),
            keywords: Some(vec!["cinema".to_string()]),
        });
        merge_profile(
            &mut profile,
            &RawProfile {
                location: Some("Paris, France".to_string()),
                ..Default::default()
            },
        );
        assert_eq!(profile.gender, Gender::Male);
        assert_eq!(profile.location.as_deref(), Some("Paris, France"));
        assert_eq!(profile.keywords, vec!["cinema".to_string()]);
    }

    #[test]
    fn test_preference_accepts() {
        assert!(GenderPref::Any.accepts(Gender::NotSpecified));
        assert!(GenderPref::Female.accepts(Gender::Female));
        assert!(!GenderPref::Female.accepts(Gender::Male));
        assert!(AgePref::Any.accepts(AgeBand::NotSpecified));
        assert!(AgePref::From18To25.accepts(AgeBand::From18To25));
        assert!(!AgePref::Over46.accepts(AgeBand::From18To25));
    }

    #[test]
    fn test_normalizer_never_fails_on_garbage() {
        let raw = RawPreferences {
            gender: Some("\u{0}\u{1}".to_string()),
            age: Some("999".to_string()),
            chat_type: None,
        };
        let prefs = normalize_preferences(&raw);
        assert_eq!(prefs.gender, GenderPref::Any);
        assert_eq!(prefs.age, AgePref::Any);
        assert_eq!(prefs.chat_type, ChatType::Text);
    }
}
