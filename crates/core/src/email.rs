//! Email address hygiene for extracted lead contact details.

use std::sync::OnceLock;

use regex::Regex;

const DOMAIN_TYPOS: &[(&str, &str)] = &[
    ("gmial.com", "gmail.com"),
    ("gmai.com", "gmail.com"),
    ("gmil.com", "gmail.com"),
    ("yahooo.com", "yahoo.com"),
    ("yaho.com", "yahoo.com"),
    ("hotmial.com", "hotmail.com"),
    ("outlok.com", "outlook.com"),
];

fn address_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").ok()).as_ref()
}

pub fn is_valid_email(email: &str) -> bool {
    let email = email.trim();
    if email.is_empty() {
        return false;
    }
    match address_pattern() {
        Some(pattern) => pattern.is_match(email),
        None => false,
    }
}

/// Trimmed and lowercased address, or `None` when it is not a plausible email.
pub fn validate_and_clean_email(email: &str) -> Option<String> {
    let cleaned = email.trim().to_lowercase();
    is_valid_email(&cleaned).then_some(cleaned)
}

/// Correction hint shown to the visitor when an address is rejected.
pub fn email_error_message(email: &str) -> &'static str {
    if email.trim().is_empty() {
        "Please provide your email address."
    } else if !email.contains('@') {
        "Hmm, that doesn't look like a complete email. It needs an '@' symbol (e.g., you@company.com)."
    } else if !email.contains('.') {
        "Almost there! Your email needs a domain like .com, .au, or .co (e.g., you@company.com)."
    } else {
        "That email format doesn't look quite right. Can you double-check it? (e.g., you@company.com)"
    }
}

pub fn suggest_email_correction(email: &str) -> String {
    let cleaned = email.trim().to_lowercase();
    for (typo, correct) in DOMAIN_TYPOS {
        if let Some(prefix) = cleaned.strip_suffix(typo) {
            return format!("{prefix}{correct}");
        }
    }
    cleaned
}

#[cfg(test)]
mod tests {
    use super::{
        email_error_message, is_valid_email, suggest_email_correction, validate_and_clean_email,
    };

    #[test]
    fn accepts_ordinary_addresses() {
        assert!(is_valid_email("test@gmail.com"));
        assert!(is_valid_email("  user@company.co.uk "));
        assert!(!is_valid_email("test"));
        assert!(!is_valid_email("test@"));
        assert!(!is_valid_email("test@company"));
        assert!(!is_valid_email("two words@company.com"));
        assert!(!is_valid_email(""));
    }

    #[test]
    fn cleaning_trims_and_lowercases() {
        assert_eq!(
            validate_and_clean_email("  Jane.Doe@Acme.IO "),
            Some("jane.doe@acme.io".to_string())
        );
        assert_eq!(validate_and_clean_email("jane at acme"), None);
    }

    #[test]
    fn error_message_points_at_the_missing_piece() {
        assert!(email_error_message("  ").starts_with("Please provide"));
        assert!(email_error_message("jane.acme.io").contains("'@' symbol"));
        assert!(email_error_message("jane@acme").contains("needs a domain"));
        assert!(email_error_message("jane@@acme.io").contains("double-check"));
    }

    #[test]
    fn common_provider_typos_are_corrected() {
        assert_eq!(suggest_email_correction("Sam@Gmial.com"), "sam@gmail.com");
        assert_eq!(suggest_email_correction("sam@outlok.com"), "sam@outlook.com");
        assert_eq!(suggest_email_correction("sam@acme.io"), "sam@acme.io");
    }
}
