use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, RwLock};
use tracing::{debug, info};

use super::rules::{default_rules, NormalizationRule, RuleOutcome};
use super::{
    ContactsNormalization, NormalizationChange, NormalizationOutcome, NormalizationRejection,
    NormalizationStats,
};
use crate::domain::{Contact, ContactField};
use crate::metrics;

/// Applies the ordered rule list (built-in rules, then custom rules) to
/// contacts and keeps a log of every change it made.
///
/// One instance is meant to be built at startup and shared by reference.
pub struct NormalizationService {
    default_rules: Vec<NormalizationRule>,
    custom_rules: RwLock<Vec<NormalizationRule>>,
    changes: Mutex<Vec<NormalizationChange>>,
    rejections: Mutex<Vec<NormalizationRejection>>,
}

impl Default for NormalizationService {
    fn default() -> Self {
        Self::new()
    }
}

impl NormalizationService {
    /// Service with the built-in email/phone/name rules
    pub fn new() -> Self {
        Self::with_rules(default_rules())
    }

    /// Service whose base rule list is `rules` instead of the built-ins
    pub fn with_rules(rules: Vec<NormalizationRule>) -> Self {
        Self {
            default_rules: rules,
            custom_rules: RwLock::new(Vec::new()),
            changes: Mutex::new(Vec::new()),
            rejections: Mutex::new(Vec::new()),
        }
    }

    pub fn add_custom_rule(&self, rule: NormalizationRule) {
        debug!("Registering custom rule '{}' on {}", rule.description, rule.field);
        self.custom_rules
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(rule);
    }

    /// Remove the custom rule at `index`; out-of-range indexes are ignored
    pub fn remove_custom_rule(&self, index: usize) -> Option<NormalizationRule> {
        let mut custom = self.custom_rules.write().unwrap_or_else(|e| e.into_inner());
        if index < custom.len() {
            Some(custom.remove(index))
        } else {
            None
        }
    }

    /// Every rule in application order
    pub fn rules(&self) -> Vec<NormalizationRule> {
        let custom = self.custom_rules.read().unwrap_or_else(|e| e.into_inner());
        self.default_rules
            .iter()
            .chain(custom.iter())
            .cloned()
            .collect()
    }

    /// Run the rules over `contact` without touching the change log
    pub fn preview_normalization(&self, contact: &Contact) -> NormalizationOutcome {
        let mut normalized = contact.clone();
        let mut changes = Vec::new();
        let mut rejections = Vec::new();

        for rule in self.rules() {
            if !rule.field.is_normalizable() {
                continue;
            }
            // Later rules see the output of earlier ones
            let Some(current) = rule.field.get(&normalized).map(str::to_string) else {
                continue;
            };

            match rule.apply(&current) {
                RuleOutcome::Unchanged => {}
                RuleOutcome::Changed(next) => {
                    rule.field.set(&mut normalized, next.clone());
                    changes.push(NormalizationChange {
                        contact_id: contact.id.clone(),
                        field: rule.field,
                        original_value: current,
                        normalized_value: next,
                        rule_applied: rule.description.clone(),
                        timestamp: Utc::now(),
                    });
                }
                RuleOutcome::Rejected(rejected_value) => {
                    debug!(
                        "Rule '{}' rejected value for {} on contact {}",
                        rule.description, rule.field, contact.id
                    );
                    rejections.push(NormalizationRejection {
                        contact_id: contact.id.clone(),
                        field: rule.field,
                        value: current,
                        rejected_value,
                        rule: rule.description.clone(),
                        timestamp: Utc::now(),
                    });
                }
            }
        }

        NormalizationOutcome {
            normalized,
            changes,
            rejections,
        }
    }

    /// Normalize one contact and append its changes to the log
    pub fn normalize_contact(&self, contact: &Contact) -> NormalizationOutcome {
        let outcome = self.preview_normalization(contact);
        self.record(&outcome);
        outcome
    }

    /// Append the changes and rejections of a previewed outcome to the log
    pub fn record(&self, outcome: &NormalizationOutcome) {
        self.changes_guard().extend(outcome.changes.iter().cloned());
        if !outcome.rejections.is_empty() {
            self.rejections
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .extend(outcome.rejections.iter().cloned());
        }
    }

    pub fn normalize_contacts(&self, contacts: &[Contact]) -> ContactsNormalization {
        let mut normalized = Vec::with_capacity(contacts.len());
        let mut stats = NormalizationStats::default();

        for contact in contacts {
            let outcome = self.normalize_contact(contact);
            normalized.push(outcome.normalized);
            for change in outcome.changes {
                stats.record(change);
            }
            stats.rejections.extend(outcome.rejections);
        }

        metrics::normalize::contacts_processed(contacts.len());
        metrics::normalize::changes_recorded(stats.total_changes);
        metrics::normalize::rejections_recorded(stats.rejections.len());
        info!(
            "Normalized {} contacts with {} changes",
            contacts.len(),
            stats.total_changes
        );

        ContactsNormalization { normalized, stats }
    }

    /// Restore fields of `contact` from this contact's entries in the change log.
    ///
    /// Each field that currently holds a value goes back to the value it had
    /// before the first logged rewrite. Fields without a logged change stay as-is.
    pub fn revert_changes(&self, contact: &Contact) -> Contact {
        let log = self.changes_guard();
        let mut originals: BTreeMap<ContactField, &str> = BTreeMap::new();
        for change in log.iter().filter(|c| c.contact_id == contact.id) {
            originals
                .entry(change.field)
                .or_insert(change.original_value.as_str());
        }

        let mut reverted = contact.clone();
        for (field, original) in originals {
            if field.get(&reverted).is_some() {
                field.set(&mut reverted, original.to_string());
            }
        }
        reverted
    }

    /// Aggregate statistics over the whole change log
    pub fn normalization_stats(&self) -> NormalizationStats {
        let changes = self.changes_guard();
        let rejections = self.rejections.lock().unwrap_or_else(|e| e.into_inner());
        NormalizationStats::from_changes(changes.iter(), rejections.iter())
    }

    pub fn change_log(&self) -> Vec<NormalizationChange> {
        self.changes_guard().clone()
    }

    pub fn clear_changes(&self) {
        self.changes_guard().clear();
        self.rejections
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    fn changes_guard(&self) -> MutexGuard<'_, Vec<NormalizationChange>> {
        self.changes.lock().unwrap_or_else(|e| e.into_inner())
    }
}
