use serde::{Deserialize, Serialize};

use crate::domain::{full_name, normalize_email, normalize_name, normalize_phone, NormalizedContact};

/// Weight per feature; the score is the weighted mean over all features
pub const EMAIL_WEIGHT: f64 = 0.3;
pub const PHONE_WEIGHT: f64 = 0.2;
pub const NAME_WEIGHT: f64 = 0.2;
pub const COMPANY_WEIGHT: f64 = 0.1;
pub const TITLE_WEIGHT: f64 = 0.1;
pub const PHONETIC_NAME_WEIGHT: f64 = 0.05;
pub const EMAIL_DOMAIN_WEIGHT: f64 = 0.05;
pub const NAME_TOKEN_WEIGHT: f64 = 0.05;

/// Per-attribute similarity between two contacts, each in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactFeatures {
    pub email_similarity: f64,
    pub phone_similarity: f64,
    pub name_similarity: f64,
    pub company_similarity: f64,
    pub title_similarity: f64,
    pub phonetic_name_similarity: f64,
    pub email_domain_similarity: f64,
    pub name_token_similarity: f64,
}

impl ContactFeatures {
    pub fn extract(a: &NormalizedContact, b: &NormalizedContact) -> Self {
        let name_a = full_name(&a.contact);
        let name_b = full_name(&b.contact);
        let email_a = a.contact.email.as_deref();
        let email_b = b.contact.email.as_deref();

        Self {
            email_similarity: exact_match(email_a, email_b, normalize_email),
            phone_similarity: exact_match(
                a.contact.phone.as_deref(),
                b.contact.phone.as_deref(),
                normalize_phone,
            ),
            name_similarity: levenshtein_similarity(&normalize_name(&name_a), &normalize_name(&name_b)),
            company_similarity: optional_text_similarity(
                a.contact.company.as_deref(),
                b.contact.company.as_deref(),
            ),
            title_similarity: optional_text_similarity(
                a.contact.title.as_deref(),
                b.contact.title.as_deref(),
            ),
            phonetic_name_similarity: levenshtein_similarity(
                &phonetic_key(&name_a),
                &phonetic_key(&name_b),
            ),
            email_domain_similarity: email_domain_similarity(email_a, email_b),
            name_token_similarity: name_token_similarity(&name_a, &name_b),
        }
    }

    /// Weighted mean of all features
    pub fn score(&self) -> f64 {
        let weighted = [
            (self.email_similarity, EMAIL_WEIGHT),
            (self.phone_similarity, PHONE_WEIGHT),
            (self.name_similarity, NAME_WEIGHT),
            (self.company_similarity, COMPANY_WEIGHT),
            (self.title_similarity, TITLE_WEIGHT),
            (self.phonetic_name_similarity, PHONETIC_NAME_WEIGHT),
            (self.email_domain_similarity, EMAIL_DOMAIN_WEIGHT),
            (self.name_token_similarity, NAME_TOKEN_WEIGHT),
        ];
        let total_weight: f64 = weighted.iter().map(|(_, w)| w).sum();
        let total: f64 = weighted.iter().map(|(v, w)| v * w).sum();
        total / total_weight
    }
}

fn exact_match(a: Option<&str>, b: Option<&str>, normalize: fn(&str) -> String) -> f64 {
    match (a, b) {
        (Some(a), Some(b)) if !a.is_empty() && !b.is_empty() => {
            if normalize(a) == normalize(b) {
                1.0
            } else {
                0.0
            }
        }
        _ => 0.0,
    }
}

fn optional_text_similarity(a: Option<&str>, b: Option<&str>) -> f64 {
    match (a, b) {
        (Some(a), Some(b)) if !a.is_empty() && !b.is_empty() => {
            levenshtein_similarity(&normalize_name(a), &normalize_name(b))
        }
        _ => 0.0,
    }
}

/// `1 - distance / longest`, measured in chars. Two empty strings carry no
/// evidence and score 0.
pub fn levenshtein_similarity(a: &str, b: &str) -> f64 {
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 0.0;
    }
    1.0 - strsim::levenshtein(a, b) as f64 / longest as f64
}

/// Consonant skeleton: lowercase ASCII letters, vowels dropped, runs collapsed
pub fn phonetic_key(name: &str) -> String {
    let mut key = String::with_capacity(name.len());
    for c in name.to_lowercase().chars() {
        if !c.is_ascii_lowercase() || matches!(c, 'a' | 'e' | 'i' | 'o' | 'u') {
            continue;
        }
        if key.ends_with(c) {
            continue;
        }
        key.push(c);
    }
    key
}

fn email_domain_similarity(a: Option<&str>, b: Option<&str>) -> f64 {
    let domain = |email: &str| email.split('@').nth(1).map(|d| d.trim().to_lowercase());
    match (a.and_then(domain), b.and_then(domain)) {
        (Some(a), Some(b)) if !a.is_empty() && a == b => 1.0,
        _ => 0.0,
    }
}

/// Share of the longer token list present in the other list
pub fn name_token_similarity(a: &str, b: &str) -> f64 {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    let tokens_a: Vec<&str> = a.split_whitespace().collect();
    let tokens_b: Vec<&str> = b.split_whitespace().collect();
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }
    let common = tokens_a.iter().filter(|t| tokens_b.contains(t)).count();
    common as f64 / tokens_a.len().max(tokens_b.len()) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Contact;

    fn contact(first: &str, last: &str, email: &str, phone: &str) -> NormalizedContact {
        NormalizedContact::from_contact(Contact {
            id: format!("{}-{}", first, last),
            first_name: Some(first.to_string()),
            last_name: Some(last.to_string()),
            email: Some(email.to_string()),
            phone: Some(phone.to_string()),
            ..Default::default()
        })
    }

    #[test]
    fn test_identical_contacts_without_company_score_high() {
        let a = contact("Jane", "Doe", "jane@acme.io", "5550100");
        let b = contact("Jane", "Doe", "JANE@acme.io", "555-0100");

        let features = ContactFeatures::extract(&a, &b);

        assert_eq!(features.email_similarity, 1.0);
        assert_eq!(features.phone_similarity, 1.0);
        assert_eq!(features.name_similarity, 1.0);
        assert_eq!(features.company_similarity, 0.0);
        // 0.85 of the 1.05 total weight
        assert!((features.score() - 0.85 / 1.05).abs() < 1e-9);
        assert!(features.score() >= 0.8);
    }

    #[test]
    fn test_unrelated_contacts_score_low() {
        let a = contact("Jane", "Doe", "jane@acme.io", "5550100");
        let b = contact("Bob", "Stone", "bob@other.org", "5559999");

        assert!(ContactFeatures::extract(&a, &b).score() < 0.3);
    }

    #[test]
    fn test_helpers() {
        assert_eq!(levenshtein_similarity("", ""), 0.0);
        assert_eq!(levenshtein_similarity("abc", "abc"), 1.0);
        assert_eq!(phonetic_key("Anna Bell"), "nbl");
        assert_eq!(name_token_similarity("Jane Ann Doe", "jane doe"), 2.0 / 3.0);
    }
}
