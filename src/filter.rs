//! Outbound text filtering: profanity replacement, contact-information
//! scrubbing, and length capping for relayed chat messages.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::AppConfig;

/// Tokens always replaced with `[REMOVED]`.
const HIGH_SEVERITY: &[&str] = &[
    "fuck", "shit", "bitch", "asshole", "bastard", "dick", "cunt", "whore", "slut",
];

/// Tokens masked with `*` in strict mode.
const MEDIUM_SEVERITY: &[&str] = &[
    "idiot", "stupid", "moron", "dumbass", "loser", "jerk", "creep",
];

static HIGH_SEVERITY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)\b(?:{})\b", HIGH_SEVERITY.join("|"))).expect("profanity pattern")
});

static MEDIUM_SEVERITY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)\b(?:{})\b", MEDIUM_SEVERITY.join("|"))).expect("profanity pattern")
});

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace pattern"));

static LINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:https?://|www\.)\S+").expect("link pattern"));

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").expect("email pattern")
});

static PHONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{3}-\d{3}-\d{4}\b").expect("phone pattern"));

/// Message text filter. Applied to every accepted chat message before
/// it is stored or relayed.
#[derive(Debug, Clone)]
pub struct ContentFilter {
    enabled: bool,
    strict: bool,
    max_length: usize,
}

impl ContentFilter {
    pub fn new(enabled: bool, strict: bool, max_length: usize) -> Self {
        Self {
            enabled,
            strict,
            max_length,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.content_filter_enabled,
            config.profanity_filter_strict,
            config.max_message_length,
        )
    }

    /// Filter steps run in a fixed order: profanity first so contact
    /// scrubbing sees cleaned text, whitespace collapse before the
    /// pattern scrubbers, truncation last.
    pub fn apply(&self, text: &str) -> String {
        if !self.enabled {
            return text.to_string();
        }

        let mut out = HIGH_SEVERITY_RE.replace_all(text, "[REMOVED]").into_owned();

        if self.strict {
            out = MEDIUM_SEVERITY_RE
                .replace_all(&out, |caps: &regex::Captures<'_>| {
                    "*".repeat(caps[0].chars().count())
                })
                .into_owned();
        }

        out = WHITESPACE_RE.replace_all(&out, " ").trim().to_string();
        out = LINK_RE.replace_all(&out, "[LINK REMOVED]").into_owned();
        out = EMAIL_RE.replace_all(&out, "[EMAIL REMOVED]").into_owned();
        out = PHONE_RE.replace_all(&out, "[PHONE REMOVED]").into_owned();

        if out.chars().count() > self.max_length {
            out = out.chars().take(self.max_length).collect();
        }
        out
    }
}
