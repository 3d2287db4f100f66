//! Grounding checks for model-extracted lead data.
//!
//! The model never gets to vouch for its own output. Every contact field has
//! to be re-derivable from the transcript it came from; anything that is not
//! gets reported so the caller can drop it before persisting.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use telos_core::domain::conversation::Turn;
use telos_core::domain::lead::{ExtractedLeadFields, LeadField};

/// Confidence is tracked in hundredths so penalties add up exactly.
const FULL_CONFIDENCE: u32 = 100;
const HALLUCINATION_THRESHOLD: u32 = 50;

const UNGROUNDED_NAME_PENALTY: u32 = 20;
const UNGROUNDED_EMAIL_PENALTY: u32 = 30;
const UNGROUNDED_COMPANY_PENALTY: u32 = 20;
const FAKE_EMAIL_PENALTY: u32 = 40;
const PLACEHOLDER_PENALTY: u32 = 10;
const INTEREST_RANGE_PENALTY: u32 = 20;

pub const INTEREST_LEVEL_RANGE: std::ops::RangeInclusive<i64> = 1..=10;

pub const CONTACT_FIELDS: [LeadField; 3] = [LeadField::Name, LeadField::Email, LeadField::Company];

const FAKE_EMAIL_MARKERS: &[&str] = &[
    "example.com",
    "test.com",
    "sample.com",
    "demo.com",
    "placeholder",
    "your-email",
    "email@email.com",
];

/// Matched as whole words: "na" must not flag "Dana".
const PLACEHOLDER_TOKENS: &[&str] = &["n/a", "na", "none", "unknown", "tbd"];
/// Matched anywhere in the value.
const PLACEHOLDER_PHRASES: &[&str] = &["not provided", "to be determined", "placeholder", "example"];

const NAME_MENTION_MIN_CHARS: usize = 50;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ValidationVerdict {
    pub is_valid: bool,
    pub is_hallucinated: bool,
    pub missing_fields: BTreeSet<LeadField>,
    pub suspicious_fields: BTreeSet<LeadField>,
    /// In `[0, 1]`.
    pub confidence: f64,
    /// Field-level explanations; never carry the extracted values themselves.
    pub warnings: Vec<String>,
}

impl ValidationVerdict {
    /// The extraction with every suspicious field nulled out.
    pub fn grounded(&self, fields: &ExtractedLeadFields) -> ExtractedLeadFields {
        fields.without(&self.suspicious_fields)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CollectionReport {
    pub collected: Vec<LeadField>,
    pub missing: Vec<LeadField>,
    pub needs_follow_up: bool,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ExtractionValidator;

impl ExtractionValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn validate(&self, extracted: &ExtractedLeadFields, turns: &[Turn]) -> ValidationVerdict {
        let transcript = lowered_transcript(turns);
        let mut tally = Tally::default();

        for field in CONTACT_FIELDS {
            if !extracted.is_present(field) {
                tally.missing_fields.insert(field);
            }
        }

        for (field, penalty) in [
            (LeadField::Name, UNGROUNDED_NAME_PENALTY),
            (LeadField::Email, UNGROUNDED_EMAIL_PENALTY),
            (LeadField::Company, UNGROUNDED_COMPANY_PENALTY),
        ] {
            let Some(value) = present_text(extracted, field) else {
                continue;
            };
            if !transcript.contains(&value.to_lowercase()) {
                tally.flag(field, penalty, format!("{field} not found in conversation"));
            }
        }

        if let Some(email) = present_text(extracted, LeadField::Email) {
            let email = email.to_lowercase();
            if FAKE_EMAIL_MARKERS.iter().any(|marker| email.contains(marker)) {
                tally.flag(
                    LeadField::Email,
                    FAKE_EMAIL_PENALTY,
                    "email looks like a placeholder address".to_string(),
                );
            }
        }

        for field in LeadField::ALL {
            if field_has_placeholder(extracted, field) {
                tally.flag(
                    field,
                    PLACEHOLDER_PENALTY,
                    format!("{field} contains a placeholder value"),
                );
            }
        }

        if let Some(level) = extracted.interest_level {
            if !INTEREST_LEVEL_RANGE.contains(&level) {
                tally.flag(
                    LeadField::InterestLevel,
                    INTEREST_RANGE_PENALTY,
                    format!("interest_level {level} is outside 1-10"),
                );
            }
        }

        tally.into_verdict()
    }
}

#[derive(Default)]
struct Tally {
    missing_fields: BTreeSet<LeadField>,
    suspicious_fields: BTreeSet<LeadField>,
    penalty: u32,
    warnings: Vec<String>,
}

impl Tally {
    fn flag(&mut self, field: LeadField, penalty: u32, warning: String) {
        self.suspicious_fields.insert(field);
        self.penalty += penalty;
        self.warnings.push(warning);
    }

    fn into_verdict(self) -> ValidationVerdict {
        let remaining = FULL_CONFIDENCE.saturating_sub(self.penalty);
        let is_hallucinated =
            !self.suspicious_fields.is_empty() || remaining < HALLUCINATION_THRESHOLD;

        ValidationVerdict {
            is_valid: self.missing_fields.is_empty() && !is_hallucinated,
            is_hallucinated,
            missing_fields: self.missing_fields,
            suspicious_fields: self.suspicious_fields,
            confidence: f64::from(remaining) / f64::from(FULL_CONFIDENCE),
            warnings: self.warnings,
        }
    }
}

fn lowered_transcript(turns: &[Turn]) -> String {
    turns.iter().map(|turn| turn.plain_text().to_lowercase()).collect::<Vec<_>>().join(" ")
}

fn present_text(fields: &ExtractedLeadFields, field: LeadField) -> Option<&str> {
    fields.text(field).map(str::trim).filter(|value| !value.is_empty())
}

fn field_has_placeholder(fields: &ExtractedLeadFields, field: LeadField) -> bool {
    match field {
        LeadField::ToolsUsed => fields
            .tools_used
            .as_ref()
            .is_some_and(|tools| tools.iter().any(|tool| is_placeholder(tool))),
        LeadField::InterestLevel => false,
        other => fields.text(other).is_some_and(is_placeholder),
    }
}

pub fn is_placeholder(value: &str) -> bool {
    let lowered = value.to_lowercase();
    if PLACEHOLDER_PHRASES.iter().any(|phrase| lowered.contains(phrase)) {
        return true;
    }
    lowered
        .split(|character: char| !(character.is_alphanumeric() || character == '/'))
        .any(|word| PLACEHOLDER_TOKENS.contains(&word))
}

/// Regex probe for whether contact details were mentioned at all, independent
/// of what the model extracted. Only name, email and company are recognised;
/// other requested fields are ignored.
pub fn verify_data_collection(turns: &[Turn], required: &[LeadField]) -> CollectionReport {
    let transcript = lowered_transcript(turns);
    let mut report = CollectionReport::default();

    for field in CONTACT_FIELDS {
        if !required.contains(&field) {
            continue;
        }
        let mentioned = match field {
            LeadField::Name => mentions_name(&transcript),
            LeadField::Email => patterns().email.as_ref().is_some_and(|re| re.is_match(&transcript)),
            _ => mentions_company(&transcript),
        };
        if mentioned {
            report.collected.push(field);
        } else {
            report.missing.push(field);
        }
    }

    report.needs_follow_up = !report.missing.is_empty();
    report
}

fn mentions_name(transcript: &str) -> bool {
    patterns().name.iter().any(|re| re.is_match(transcript))
        || (transcript.contains("name") && transcript.chars().count() > NAME_MENTION_MIN_CHARS)
}

fn mentions_company(transcript: &str) -> bool {
    patterns().company.iter().any(|re| re.is_match(transcript))
        || transcript.contains("company")
        || transcript.contains("business")
}

struct CollectionPatterns {
    name: Vec<Regex>,
    email: Option<Regex>,
    company: Vec<Regex>,
}

fn patterns() -> &'static CollectionPatterns {
    static PATTERNS: OnceLock<CollectionPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| CollectionPatterns {
        name: [
            r"(?i)(?:my name is|i'm|i am|call me|this is)\s+[a-z]+(?:\s+[a-z]+)?",
            r"(?i)name[:\s]+[a-z]+(?:\s+[a-z]+)?",
        ]
        .into_iter()
        .filter_map(|pattern| Regex::new(pattern).ok())
        .collect(),
        email: Regex::new(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}").ok(),
        company: [
            r"(?i)(?:company|business|brand|organization|org)[:\s]+[a-z][a-z\s&]+",
            r"(?i)\b(?:work at|work for|at)\s+[a-z][a-z\s&]+",
        ]
        .into_iter()
        .filter_map(|pattern| Regex::new(pattern).ok())
        .collect(),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use telos_core::domain::conversation::Turn;
    use telos_core::domain::lead::{ExtractedLeadFields, LeadField};
    use telos_core::sanitize::sanitize_input;

    use super::{is_placeholder, verify_data_collection, ExtractionValidator, CONTACT_FIELDS};

    fn transcript() -> Vec<Turn> {
        vec![
            Turn::assistant("Hi! Who am I talking to?"),
            Turn::user("I'm Priya Raman, I work at Lumen Logistics"),
            Turn::assistant("Great to meet you Priya. Best email?"),
            Turn::user("priya@lumenlogistics.io"),
        ]
    }

    fn contact(name: &str, email: &str, company: &str) -> ExtractedLeadFields {
        ExtractedLeadFields {
            name: Some(name.to_string()),
            email: Some(email.to_string()),
            company: Some(company.to_string()),
            ..ExtractedLeadFields::default()
        }
    }

    #[test]
    fn grounded_fields_keep_full_confidence() {
        let verdict = ExtractionValidator::new().validate(
            &contact("Priya Raman", "Priya@LumenLogistics.io", "lumen logistics"),
            &transcript(),
        );

        assert!(verdict.suspicious_fields.is_empty());
        assert!(verdict.missing_fields.is_empty());
        assert_eq!(verdict.confidence, 1.0);
        assert!(verdict.is_valid);
        assert!(!verdict.is_hallucinated);
    }

    #[test]
    fn escaped_visitor_text_still_grounds_punctuated_values() {
        let turns = vec![
            Turn::assistant("Hi! Who am I talking to?"),
            Turn::user(sanitize_input("I'm Sean O'Brien from Smith & Sons")),
        ];
        let fields = ExtractedLeadFields {
            name: Some("Sean O'Brien".to_string()),
            company: Some("Smith & Sons".to_string()),
            ..ExtractedLeadFields::default()
        };

        let verdict = ExtractionValidator::new().validate(&fields, &turns);
        assert!(verdict.suspicious_fields.is_empty());
        assert_eq!(verdict.grounded(&fields), fields);

        let report = verify_data_collection(&turns, &[LeadField::Name]);
        assert_eq!(report.collected, vec![LeadField::Name]);
    }

    #[test]
    fn invented_contact_is_hallucinated() {
        let fields = ExtractedLeadFields {
            name: Some("Bob".to_string()),
            email: Some("bob@example.com".to_string()),
            ..ExtractedLeadFields::default()
        };
        let verdict = ExtractionValidator::new().validate(&fields, &transcript());

        assert!(verdict.suspicious_fields.contains(&LeadField::Name));
        assert!(verdict.suspicious_fields.contains(&LeadField::Email));
        assert_eq!(verdict.missing_fields, BTreeSet::from([LeadField::Company]));
        assert!(verdict.confidence <= 0.5);
        assert!(verdict.confidence >= 0.0);
        assert!(verdict.is_hallucinated);
        assert!(!verdict.is_valid);
    }

    #[test]
    fn confidence_never_goes_negative() {
        let fields = ExtractedLeadFields {
            name: Some("Unknown".to_string()),
            email: Some("placeholder@example.com".to_string()),
            company: Some("TBD".to_string()),
            role: Some("n/a".to_string()),
            industry: Some("none".to_string()),
            interest_level: Some(42),
            ..ExtractedLeadFields::default()
        };
        let verdict = ExtractionValidator::new().validate(&fields, &[]);

        assert_eq!(verdict.confidence, 0.0);
        assert!(verdict.is_hallucinated);
    }

    #[test]
    fn missing_contact_is_incomplete_not_suspicious() {
        let verdict =
            ExtractionValidator::new().validate(&ExtractedLeadFields::default(), &transcript());

        assert_eq!(verdict.missing_fields, BTreeSet::from(CONTACT_FIELDS));
        assert!(verdict.suspicious_fields.is_empty());
        assert_eq!(verdict.confidence, 1.0);
        assert!(!verdict.is_hallucinated);
        assert!(!verdict.is_valid);
    }

    #[test]
    fn blank_values_count_as_missing() {
        let verdict =
            ExtractionValidator::new().validate(&contact("  ", "", " "), &transcript());
        assert_eq!(verdict.missing_fields.len(), 3);
        assert!(verdict.suspicious_fields.is_empty());
    }

    #[test]
    fn out_of_range_interest_level_is_suspicious() {
        let mut fields = contact("Priya Raman", "priya@lumenlogistics.io", "Lumen Logistics");
        fields.interest_level = Some(0);
        let verdict = ExtractionValidator::new().validate(&fields, &transcript());

        assert_eq!(verdict.suspicious_fields, BTreeSet::from([LeadField::InterestLevel]));
        assert!((verdict.confidence - 0.8).abs() < f64::EPSILON);

        fields.interest_level = Some(10);
        assert!(ExtractionValidator::new().validate(&fields, &transcript()).is_valid);
    }

    #[test]
    fn placeholder_tools_are_flagged() {
        let mut fields = contact("Priya Raman", "priya@lumenlogistics.io", "Lumen Logistics");
        fields.tools_used = Some(vec!["Excel".to_string(), "N/A".to_string()]);
        let verdict = ExtractionValidator::new().validate(&fields, &transcript());
        assert_eq!(verdict.suspicious_fields, BTreeSet::from([LeadField::ToolsUsed]));
    }

    #[test]
    fn warnings_do_not_echo_values() {
        let fields = ExtractedLeadFields {
            email: Some("ghost@nowhere.dev".to_string()),
            ..ExtractedLeadFields::default()
        };
        let verdict = ExtractionValidator::new().validate(&fields, &transcript());
        assert!(!verdict.warnings.is_empty());
        assert!(verdict.warnings.iter().all(|warning| !warning.contains("ghost@nowhere.dev")));
    }

    #[test]
    fn grounded_copy_drops_suspicious_fields() {
        let fields = contact("Bob", "priya@lumenlogistics.io", "Lumen Logistics");
        let verdict = ExtractionValidator::new().validate(&fields, &transcript());
        let kept = verdict.grounded(&fields);

        assert!(kept.name.is_none());
        assert_eq!(kept.email.as_deref(), Some("priya@lumenlogistics.io"));
        assert_eq!(fields.name.as_deref(), Some("Bob"), "input is never mutated");
    }

    #[test]
    fn placeholder_tokens_match_whole_words() {
        assert!(is_placeholder("N/A"));
        assert!(is_placeholder("tbd"));
        assert!(is_placeholder("Not provided"));
        assert!(!is_placeholder("Dana Nakamura"));
        assert!(!is_placeholder("Nonesuch Analytics"));
    }

    #[test]
    fn collection_probe_reports_mentions() {
        let report = verify_data_collection(&transcript(), &CONTACT_FIELDS);
        assert_eq!(report.collected, CONTACT_FIELDS.to_vec());
        assert!(!report.needs_follow_up);

        let quiet = vec![Turn::user("hello")];
        let report = verify_data_collection(&quiet, &[LeadField::Email, LeadField::Company]);
        assert!(report.collected.is_empty());
        assert_eq!(report.missing, vec![LeadField::Email, LeadField::Company]);
        assert!(report.needs_follow_up);
    }
}
