// Field normalization: ordered rewrite rules with a full change audit trail

pub mod rules;
pub mod service;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::{Contact, ContactField};

pub use rules::{default_rules, NormalizationRule, RuleAction, RuleOutcome};
pub use service::NormalizationService;

/// Audit record for one field rewritten by one rule.
///
/// Only emitted when `normalized_value` differs from `original_value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizationChange {
    pub contact_id: String,
    pub field: ContactField,
    pub original_value: String,
    pub normalized_value: String,
    pub rule_applied: String,
    pub timestamp: DateTime<Utc>,
}

/// A transform that a rule's validator refused
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizationRejection {
    pub contact_id: String,
    pub field: ContactField,
    pub value: String,
    pub rejected_value: String,
    pub rule: String,
    pub timestamp: DateTime<Utc>,
}

/// Result of running the rule list over one contact
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizationOutcome {
    pub normalized: Contact,
    pub changes: Vec<NormalizationChange>,
    pub rejections: Vec<NormalizationRejection>,
}

/// Result of normalizing a list of contacts
#[derive(Debug, Clone)]
pub struct ContactsNormalization {
    pub normalized: Vec<Contact>,
    pub stats: NormalizationStats,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangesByType {
    pub email: usize,
    pub phone: usize,
    pub first_name: usize,
    pub last_name: usize,
    pub company: usize,
    pub title: usize,
}

/// Aggregates derived from a change list; every counter is a projection of
/// `detailed_changes`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizationStats {
    pub total_changes: usize,
    pub changes_by_field: BTreeMap<ContactField, usize>,
    pub changes_by_rule: BTreeMap<String, usize>,
    pub changes_by_type: ChangesByType,
    pub detailed_changes: Vec<NormalizationChange>,
    pub rejections: Vec<NormalizationRejection>,
}

impl NormalizationStats {
    pub fn from_changes<'a>(
        changes: impl IntoIterator<Item = &'a NormalizationChange>,
        rejections: impl IntoIterator<Item = &'a NormalizationRejection>,
    ) -> Self {
        let mut stats = Self::default();
        for change in changes {
            stats.record(change.clone());
        }
        stats.rejections.extend(rejections.into_iter().cloned());
        stats
    }

    pub fn record(&mut self, change: NormalizationChange) {
        self.total_changes += 1;
        *self.changes_by_field.entry(change.field).or_insert(0) += 1;
        *self
            .changes_by_rule
            .entry(change.rule_applied.clone())
            .or_insert(0) += 1;

        match change.field {
            ContactField::Email => self.changes_by_type.email += 1,
            ContactField::Phone => self.changes_by_type.phone += 1,
            ContactField::FirstName => self.changes_by_type.first_name += 1,
            ContactField::LastName => self.changes_by_type.last_name += 1,
            ContactField::Company => self.changes_by_type.company += 1,
            ContactField::Title => self.changes_by_type.title += 1,
            _ => {}
        }

        self.detailed_changes.push(change);
    }
}
