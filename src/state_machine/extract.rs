//! Best-effort extraction of user details from free text
//!
//! The transition function only depends on the [`InfoExtractor`] contract;
//! [`KeywordExtractor`] is the default heuristic.

use super::state::{
    CollectedInfo, CONSUMPTION, CUSTOMER_EMAIL, CUSTOMER_NAME, CUSTOMER_PHONE, LOCATION,
};
use regex::Regex;

/// Pulls workflow fields out of a user message.
///
/// Returns only fields that are absent from `known`; callers merge the result.
pub trait InfoExtractor: Send + Sync {
    fn extract(&self, user_text: &str, known: &CollectedInfo) -> CollectedInfo;
}

const LOCATION_WORDS: &[&str] = &[
    "city", "state", "pincode", "zip", "zipcode", "location", "address", "in", "at", "live",
];
const CONSUMPTION_WORDS: &[&str] = &[
    "bill", "bills", "consumption", "usage", "kwh", "units", "electricity",
];
/// Words that end a name captured after "my name is" / "i am"
const NAME_STOP_WORDS: &[&str] = &["in", "from", "and", "at", "with", "my", "living", "here"];

/// Keyword and pattern based extractor
pub struct KeywordExtractor {
    name: Regex,
    phone: Regex,
    email: Regex,
    postal_code: Regex,
}

impl Default for KeywordExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl KeywordExtractor {
    #[allow(clippy::missing_panics_doc)] // patterns are literals
    pub fn new() -> Self {
        Self {
            name: Regex::new(r"\b(?:my name is|name is|i am|i'm)\s+([a-z][a-z' -]*)")
                .expect("name pattern"),
            phone: Regex::new(r"\d{3}[-.\s]?\d{3}[-.\s]?\d{4}").expect("phone pattern"),
            email: Regex::new(r"[^\s@]+@[^\s@]+\.[^\s@]+").expect("email pattern"),
            postal_code: Regex::new(r"\b\d{5,6}\b").expect("postal code pattern"),
        }
    }

    fn mentions_location(&self, text: &str, words: &[&str]) -> bool {
        words.iter().any(|w| LOCATION_WORDS.contains(w)) || self.postal_code.is_match(text)
    }

    fn extract_name(&self, text: &str) -> Option<String> {
        let captured = self.name.captures(text)?.get(1)?.as_str();
        let words: Vec<String> = captured
            .split_whitespace()
            .take_while(|w| !NAME_STOP_WORDS.contains(w))
            .take(3)
            .map(title_case)
            .collect();
        if words.is_empty() {
            None
        } else {
            Some(words.join(" "))
        }
    }
}

impl InfoExtractor for KeywordExtractor {
    fn extract(&self, user_text: &str, known: &CollectedInfo) -> CollectedInfo {
        let text = user_text.to_lowercase();
        let words: Vec<&str> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        let mut found = CollectedInfo::new();

        if !known.contains(LOCATION) && self.mentions_location(&text, &words) {
            found.mark_provided(LOCATION);
        }

        if !known.contains(CONSUMPTION)
            && (text.contains('$') || words.iter().any(|w| CONSUMPTION_WORDS.contains(w)))
        {
            found.mark_provided(CONSUMPTION);
        }

        if !known.contains(CUSTOMER_NAME) {
            if let Some(name) = self.extract_name(&text) {
                found.set(CUSTOMER_NAME, name);
            }
        }

        if !known.contains(CUSTOMER_EMAIL) {
            if let Some(m) = self.email.find(user_text) {
                found.set(CUSTOMER_EMAIL, m.as_str().trim_end_matches(['.', ',']));
            }
        }

        if !known.contains(CUSTOMER_PHONE) {
            if let Some(m) = self.phone.find(&text) {
                found.set(CUSTOMER_PHONE, m.as_str());
            }
        }

        found
    }
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
