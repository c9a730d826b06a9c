//! Document-type inference for scraped pages.
//!
//! Two heuristics are tried in order: keywords in the URL path, then a phrase
//! scan over the first words of the page text. Both are expressed as ordered
//! rule tables evaluated by small generic matchers.

use crate::scraper::ScrapedDocument;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of leading words inspected by the content heuristic
pub const CONTENT_WINDOW_WORDS: usize = 1000;

/// Characters removed before splitting the text into words
const STRIPPED_PUNCTUATION: &[char] = &[
    '.', ',', '/', '#', '!', '$', '%', '^', '*', ';', ':', '{', '}', '=', '-', '_', '`', '~', '(',
    ')',
];

/// Words that, directly before a phrase, settle the document type outright
const DEFINITE_DETERMINERS: &[&str] = &["this", "these"];

/// A document type the summarisation service understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentType {
    #[serde(rename = "Privacy Policy")]
    PrivacyPolicy,
    #[serde(rename = "Terms and Conditions")]
    TermsAndConditions,
}

impl DocumentType {
    pub const ALL: [DocumentType; 2] = [DocumentType::PrivacyPolicy, DocumentType::TermsAndConditions];

    /// Wire value for the `doctype` request field
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::PrivacyPolicy => "Privacy Policy",
            DocumentType::TermsAndConditions => "Terms and Conditions",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of classifying a page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    PrivacyPolicy,
    TermsAndConditions,
    Unknown,
}

impl Classification {
    pub fn document_type(self) -> Option<DocumentType> {
        match self {
            Classification::PrivacyPolicy => Some(DocumentType::PrivacyPolicy),
            Classification::TermsAndConditions => Some(DocumentType::TermsAndConditions),
            Classification::Unknown => None,
        }
    }

    /// Summarisation actions to offer: the inferred type, or both when unsure
    pub fn offered_actions(self) -> Vec<DocumentType> {
        match self.document_type() {
            Some(doc_type) => vec![doc_type],
            None => DocumentType::ALL.to_vec(),
        }
    }
}

impl From<DocumentType> for Classification {
    fn from(doc_type: DocumentType) -> Self {
        match doc_type {
            DocumentType::PrivacyPolicy => Classification::PrivacyPolicy,
            DocumentType::TermsAndConditions => Classification::TermsAndConditions,
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.document_type() {
            Some(doc_type) => doc_type.fmt(f),
            None => f.write_str("Unknown"),
        }
    }
}

/// Substring keywords in a URL path
struct PathRule {
    keywords: &'static [&'static str],
    doc_type: DocumentType,
}

/// Earlier rules win when several match.
const PATH_RULES: &[PathRule] = &[
    PathRule {
        keywords: &["privacy", "security", "data protection"],
        doc_type: DocumentType::PrivacyPolicy,
    },
    PathRule {
        keywords: &["terms", "tos", "t&c"],
        doc_type: DocumentType::TermsAndConditions,
    },
];

/// A phrase anchored on `head`, where each word after it must come from the
/// corresponding `following` set.
struct PhraseRule {
    head: &'static [&'static str],
    following: &'static [&'static [&'static str]],
    doc_type: DocumentType,
}

impl PhraseRule {
    fn matches_at(&self, words: &[String], index: usize) -> bool {
        let Some(head) = words.get(index) else {
            return false;
        };
        self.head.contains(&head.as_str())
            && self.following.iter().enumerate().all(|(offset, allowed)| {
                words
                    .get(index + offset + 1)
                    .is_some_and(|word| allowed.contains(&word.as_str()))
            })
    }
}

/// Terms is listed first so it is preferred when indices tie.
const CONTENT_RULES: &[PhraseRule] = &[
    PhraseRule {
        head: &["terms"],
        following: &[&["of", "and", "&"], &["conditions", "service", "use"]],
        doc_type: DocumentType::TermsAndConditions,
    },
    PhraseRule {
        head: &["privacy"],
        following: &[&["policy", "notice", "statement"]],
        doc_type: DocumentType::PrivacyPolicy,
    },
];

/// A bare occurrence of this word implies terms when no phrase matched
const BARE_TERMS_WORD: &str = "terms";

/// Infer the document type from a URL path
pub fn classify_by_path(path: &str) -> Classification {
    let path = path.to_lowercase();
    PATH_RULES
        .iter()
        .find(|rule| rule.keywords.iter().any(|keyword| path.contains(keyword)))
        .map(|rule| rule.doc_type.into())
        .unwrap_or(Classification::Unknown)
}

/// Infer the document type from page text.
///
/// A phrase preceded by "this" or "these" decides immediately. Otherwise the
/// earliest matching phrase wins, and a lone "terms" anywhere in the window
/// is the last resort.
pub fn classify_by_content(text: &str) -> Classification {
    if text.is_empty() {
        return Classification::Unknown;
    }

    let words: Vec<String> = text
        .replace(STRIPPED_PUNCTUATION, "")
        .split_whitespace()
        .take(CONTENT_WINDOW_WORDS)
        .map(str::to_lowercase)
        .collect();

    let mut first_match: Vec<Option<usize>> = vec![None; CONTENT_RULES.len()];
    let mut saw_bare_terms = false;

    for index in 0..words.len() {
        if words[index] == BARE_TERMS_WORD {
            saw_bare_terms = true;
        }

        for (rule_idx, rule) in CONTENT_RULES.iter().enumerate() {
            if !rule.matches_at(&words, index) {
                continue;
            }
            let preceded_by_determiner = index
                .checked_sub(1)
                .is_some_and(|prev| DEFINITE_DETERMINERS.contains(&words[prev].as_str()));
            if preceded_by_determiner {
                return rule.doc_type.into();
            }
            first_match[rule_idx].get_or_insert(index);
        }
    }

    let earliest = first_match
        .iter()
        .enumerate()
        .filter_map(|(rule_idx, found)| found.map(|index| (index, rule_idx)))
        .min();

    match earliest {
        Some((_, rule_idx)) => CONTENT_RULES[rule_idx].doc_type.into(),
        None if saw_bare_terms => Classification::TermsAndConditions,
        None => Classification::Unknown,
    }
}

/// Classify a scraped page: URL path first, then content
pub fn classify(document: &ScrapedDocument) -> Classification {
    match classify_by_path(&document.path()) {
        Classification::Unknown => classify_by_content(&document.text),
        known => known,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_is_case_insensitive() {
        assert_eq!(classify_by_path("/LEGAL/PRIVACY"), Classification::PrivacyPolicy);
        assert_eq!(classify_by_path("/en/Terms-Of-Use"), Classification::TermsAndConditions);
        assert_eq!(classify_by_path("/help/tos"), Classification::TermsAndConditions);
        assert_eq!(classify_by_path("/security"), Classification::PrivacyPolicy);
    }

    #[test]
    fn privacy_keywords_take_priority_in_path() {
        assert_eq!(classify_by_path("/Privacy-Terms"), Classification::PrivacyPolicy);
        assert_eq!(classify_by_path("/terms/privacy"), Classification::PrivacyPolicy);
    }

    #[test]
    fn unmatched_path_is_unknown() {
        assert_eq!(classify_by_path("/blog/2024/launch"), Classification::Unknown);
        assert_eq!(classify_by_path(""), Classification::Unknown);
    }

    #[test]
    fn definite_privacy_phrase_returns_immediately() {
        let text = "Terms of Use are elsewhere. This Privacy Policy describes how we use data.";
        assert_eq!(classify_by_content(text), Classification::PrivacyPolicy);
    }

    #[test]
    fn definite_terms_phrase_returns_immediately() {
        let text = "Our privacy notice is linked below. These terms of service govern your use.";
        assert_eq!(classify_by_content(text), Classification::TermsAndConditions);
    }

    #[test]
    fn earliest_phrase_wins_without_determiner() {
        let text = "Read our privacy statement and our terms and conditions carefully.";
        assert_eq!(classify_by_content(text), Classification::PrivacyPolicy);

        let text = "Read our terms & conditions and our privacy policy.";
        assert_eq!(classify_by_content(text), Classification::TermsAndConditions);
    }

    #[test]
    fn bare_terms_falls_back_to_terms() {
        let text = "By continuing you accept the terms listed here.";
        assert_eq!(classify_by_content(text), Classification::TermsAndConditions);
    }

    #[test]
    fn no_signal_is_unknown() {
        assert_eq!(classify_by_content(""), Classification::Unknown);
        assert_eq!(
            classify_by_content("A recipe for banana bread with walnuts."),
            Classification::Unknown
        );
    }

    #[test]
    fn punctuation_is_stripped_before_matching() {
        let text = "Welcome! (This) privacy-policy... this: Privacy, Notice; applies.";
        assert_eq!(classify_by_content(text), Classification::PrivacyPolicy);
    }

    #[test]
    fn only_the_leading_window_is_scanned() {
        let filler = "word ".repeat(CONTENT_WINDOW_WORDS);
        let text = format!("{filler} this privacy policy");
        assert_eq!(classify_by_content(&text), Classification::Unknown);

        let filler = "word ".repeat(CONTENT_WINDOW_WORDS - 3);
        let text = format!("{filler} this privacy policy");
        assert_eq!(classify_by_content(&text), Classification::PrivacyPolicy);
    }

    #[test]
    fn phrase_must_be_complete() {
        // "terms of" without a third word still sets the bare-terms flag
        assert_eq!(classify_by_content("the terms of"), Classification::TermsAndConditions);
        assert_eq!(classify_by_content("privacy matters"), Classification::Unknown);
    }

    #[test]
    fn path_beats_content() {
        let document = ScrapedDocument {
            text: "These terms of service govern your use.".to_string(),
            url: "https://example.com/privacy".to_string(),
        };
        assert_eq!(classify(&document), Classification::PrivacyPolicy);

        let document = ScrapedDocument {
            text: "These terms of service govern your use.".to_string(),
            url: "https://example.com/legal".to_string(),
        };
        assert_eq!(classify(&document), Classification::TermsAndConditions);
    }

    #[test]
    fn unknown_offers_both_actions() {
        assert_eq!(
            Classification::Unknown.offered_actions(),
            vec![DocumentType::PrivacyPolicy, DocumentType::TermsAndConditions]
        );
        assert_eq!(
            Classification::PrivacyPolicy.offered_actions(),
            vec![DocumentType::PrivacyPolicy]
        );
    }

    #[test]
    fn doc_type_serialises_to_wire_value() {
        assert_eq!(
            serde_json::to_string(&DocumentType::TermsAndConditions).unwrap(),
            "\"Terms and Conditions\""
        );
    }
}
