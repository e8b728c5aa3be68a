use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::contact::Contact;
use crate::constants::DEFAULT_SOURCE;

/// Read-mostly projection of a [`Contact`] carrying canonical match keys.
///
/// A new projection is derived for every normalization pass; existing ones are
/// never updated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedContact {
    #[serde(flatten)]
    pub contact: Contact,
    pub normalized_email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalized_phone: Option<String>,
    pub normalized_name: String,
    pub source: String,
    /// Confidence in the projection, 0.0 to 1.0
    pub confidence: f64,
    pub normalization_timestamp: DateTime<Utc>,
    pub original_values: OriginalValues,
}

/// Snapshot of the match-relevant fields before projection
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginalValues {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

impl NormalizedContact {
    pub fn from_contact(contact: Contact) -> Self {
        Self::from_contact_with_source(contact, DEFAULT_SOURCE)
    }

    pub fn from_contact_with_source(contact: Contact, source: &str) -> Self {
        let original_values = OriginalValues {
            email: contact.email.clone(),
            phone: contact.phone.clone(),
            first_name: contact.first_name.clone(),
            last_name: contact.last_name.clone(),
        };

        let normalized_email = normalize_email(contact.email.as_deref().unwrap_or(""));
        let normalized_phone = contact.phone.as_deref().map(normalize_phone);
        let normalized_name = normalize_name(&full_name(&contact));

        let mut contact = contact;
        if contact.email.is_some() {
            contact.email = Some(normalized_email.clone());
        }
        if let Some(phone) = &normalized_phone {
            contact.phone = Some(phone.clone());
        }

        Self {
            contact,
            normalized_email,
            normalized_phone,
            normalized_name,
            source: source.to_string(),
            confidence: 1.0,
            normalization_timestamp: Utc::now(),
            original_values,
        }
    }

    pub fn id(&self) -> &str {
        &self.contact.id
    }

    /// Recompute the match keys from the current contact fields, keeping
    /// `original_values` from the first projection.
    pub fn reproject(&self, contact: Contact) -> Self {
        let mut next = Self::from_contact_with_source(contact, &self.source);
        next.original_values = self.original_values.clone();
        next.confidence = self.confidence;
        next
    }
}

/// Lowercase and trim an email address
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Keep only digits and `+`
pub fn normalize_phone(phone: &str) -> String {
    phone
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '+')
        .collect()
}

/// Trim, lowercase and collapse internal whitespace
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

pub fn full_name(contact: &Contact) -> String {
    format!(
        "{} {}",
        contact.first_name.as_deref().unwrap_or(""),
        contact.last_name.as_deref().unwrap_or("")
    )
    .trim()
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_helper_normalizers() {
        assert_eq!(normalize_email("  Jane.Doe@Example.COM "), "jane.doe@example.com");
        assert_eq!(normalize_phone("+1 (555) 010-9999"), "+15550109999");
        assert_eq!(normalize_name("  Jane \t  DOE "), "jane doe");
    }

    #[test]
    fn test_projection_keeps_original_values() {
        let contact = Contact {
            id: "c-1".to_string(),
            first_name: Some("Jane".to_string()),
            last_name: Some("Doe".to_string()),
            email: Some("JANE@Example.com".to_string()),
            phone: Some("555-0100".to_string()),
            ..Default::default()
        };

        let normalized = NormalizedContact::from_contact(contact);

        assert_eq!(normalized.normalized_email, "jane@example.com");
        assert_eq!(normalized.normalized_phone.as_deref(), Some("5550100"));
        assert_eq!(normalized.normalized_name, "jane doe");
        assert_eq!(normalized.source, "manual");
        assert_eq!(normalized.original_values.email.as_deref(), Some("JANE@Example.com"));
        assert_eq!(normalized.contact.email.as_deref(), Some("jane@example.com"));
    }

    #[test]
    fn test_projection_serializes_flat() {
        let normalized = NormalizedContact::from_contact_with_source(
            Contact {
                id: "c-2".to_string(),
                ..Default::default()
            },
            "import",
        );

        let value = serde_json::to_value(&normalized).unwrap();
        assert_eq!(value["id"], "c-2");
        assert_eq!(value["source"], "import");
        assert!(value.get("contact").is_none());

        let back: NormalizedContact = serde_json::from_value(value).unwrap();
        assert_eq!(back.id(), "c-2");
    }
}
