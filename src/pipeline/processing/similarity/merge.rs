use chrono::Utc;
use std::collections::BTreeMap;

use crate::constants::MERGE_HISTORY_KEY;
use crate::domain::{AdditionalField, Contact, ContactField, CustomMergeRule, MergeHistory, MergeStrategy};
use crate::error::{PipelineError, Result};

/// How a duplicate group is folded into one contact
#[derive(Debug, Clone, PartialEq)]
pub struct MergePlan {
    pub strategy: MergeStrategy,
    /// Per-field overrides, consulted when `strategy` is `Custom`
    pub custom_rules: Vec<CustomMergeRule>,
}

impl Default for MergePlan {
    fn default() -> Self {
        Self::new(MergeStrategy::Combine)
    }
}

impl MergePlan {
    pub fn new(strategy: MergeStrategy) -> Self {
        Self {
            strategy,
            custom_rules: Vec::new(),
        }
    }

    pub fn with_rule(mut self, field: ContactField, strategy: MergeStrategy) -> Self {
        self.custom_rules.push(CustomMergeRule { field, strategy });
        self
    }

    fn strategy_for(&self, field: ContactField) -> MergeStrategy {
        if self.strategy != MergeStrategy::Custom {
            return self.strategy;
        }
        self.custom_rules
            .iter()
            .find(|rule| rule.field == field)
            .map(|rule| rule.strategy)
            .filter(|strategy| *strategy != MergeStrategy::Custom)
            .unwrap_or(MergeStrategy::PreferExisting)
    }
}

/// Fold a duplicate group into its first member.
///
/// The first contact's `id` is kept. The pre-merge field values of every
/// member are recorded as a [`MergeHistory`] under `additionalFields`.
pub fn merge_contacts(group: &[Contact], plan: &MergePlan) -> Result<Contact> {
    let (first, rest) = group
        .split_first()
        .ok_or_else(|| PipelineError::Merge("no contacts to merge".to_string()))?;

    let mut merged = first.clone();
    merged.additional_fields.remove(MERGE_HISTORY_KEY);

    for incoming in rest {
        for field in ContactField::ALL {
            if field == ContactField::Id {
                continue;
            }
            let Some(value) = field.get(incoming).filter(|v| !v.is_empty()) else {
                continue;
            };
            let existing = field.get(&merged).filter(|v| !v.is_empty()).map(str::to_string);
            if let Some(next) = merge_value(existing.as_deref(), value, plan.strategy_for(field)) {
                field.set(&mut merged, next);
            }
        }

        for (key, value) in &incoming.additional_fields {
            if key == MERGE_HISTORY_KEY {
                continue;
            }
            merged
                .additional_fields
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
    }

    let history = MergeHistory {
        merged_at: Utc::now(),
        strategy: plan.strategy,
        custom_rules: plan.custom_rules.clone(),
        original_values: group.iter().map(|c| (c.id.clone(), snapshot(c))).collect(),
    };
    merged.updated_at = history.merged_at;
    merged
        .additional_fields
        .insert(MERGE_HISTORY_KEY.to_string(), AdditionalField::MergeHistory(history));

    Ok(merged)
}

/// New value for a field, or `None` to keep the existing one
fn merge_value(existing: Option<&str>, incoming: &str, strategy: MergeStrategy) -> Option<String> {
    match (existing, strategy) {
        (None, _) => Some(incoming.to_string()),
        (Some(current), MergeStrategy::PreferNew) if current != incoming => Some(incoming.to_string()),
        (Some(current), MergeStrategy::Combine) => {
            let already = current.split(", ").any(|part| part == incoming);
            (!already).then(|| format!("{}, {}", current, incoming))
        }
        _ => None,
    }
}

fn snapshot(contact: &Contact) -> BTreeMap<String, String> {
    ContactField::ALL
        .iter()
        .filter(|field| **field != ContactField::Id)
        .filter_map(|field| field.get(contact).map(|v| (field.as_str().to_string(), v.to_string())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contact(id: &str, email: &str, phone: Option<&str>) -> Contact {
        Contact {
            id: id.to_string(),
            email: Some(email.to_string()),
            phone: phone.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_combine_joins_distinct_values() {
        let group = vec![
            contact("a", "a@x.io", None),
            contact("b", "b@x.io", Some("555")),
            contact("c", "a@x.io", None),
        ];

        let merged = merge_contacts(&group, &MergePlan::default()).unwrap();

        assert_eq!(merged.id, "a");
        assert_eq!(merged.email.as_deref(), Some("a@x.io, b@x.io"));
        assert_eq!(merged.phone.as_deref(), Some("555"));
        match merged.additional_fields.get(MERGE_HISTORY_KEY) {
            Some(AdditionalField::MergeHistory(history)) => {
                assert_eq!(history.original_values.len(), 3);
                assert_eq!(history.original_values["b"]["email"], "b@x.io");
            }
            other => panic!("missing merge history: {:?}", other),
        }
    }

    #[test]
    fn test_prefer_strategies() {
        let group = vec![contact("a", "old@x.io", None), contact("b", "new@x.io", None)];

        let existing = merge_contacts(&group, &MergePlan::new(MergeStrategy::PreferExisting)).unwrap();
        let newer = merge_contacts(&group, &MergePlan::new(MergeStrategy::PreferNew)).unwrap();

        assert_eq!(existing.email.as_deref(), Some("old@x.io"));
        assert_eq!(newer.email.as_deref(), Some("new@x.io"));
    }

    #[test]
    fn test_custom_rules_apply_per_field() {
        let group = vec![
            contact("a", "old@x.io", Some("111")),
            contact("b", "new@x.io", Some("222")),
        ];
        let plan = MergePlan::new(MergeStrategy::Custom).with_rule(ContactField::Phone, MergeStrategy::PreferNew);

        let merged = merge_contacts(&group, &plan).unwrap();

        assert_eq!(merged.email.as_deref(), Some("old@x.io"));
        assert_eq!(merged.phone.as_deref(), Some("222"));
    }

    #[test]
    fn test_empty_group_is_an_error() {
        assert!(merge_contacts(&[], &MergePlan::default()).is_err());
    }
}
