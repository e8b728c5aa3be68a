use anyhow::Result;
use std::io::Write;

use contact_pipeline::config::Config;
use contact_pipeline::domain::{Contact, ContactField};
use contact_pipeline::pipeline::processing::normalize::{NormalizationRule, NormalizationService};
use contact_pipeline::pipeline::processing::similarity::{merge_contacts, MergePlan};
use contact_pipeline::domain::MergeStrategy;

fn messy_contact(id: &str) -> Contact {
    Contact {
        id: id.to_string(),
        first_name: Some(" John  ".to_string()),
        last_name: Some("Doe".to_string()),
        email: Some("john (at) doe@example.com".to_string()),
        phone: Some("+1 (555) 010-0000".to_string()),
        company: Some("Doe Holdings Inc.".to_string()),
        notes: Some("met at   conference".to_string()),
        ..Default::default()
    }
}

#[test]
fn test_config_rules_extend_the_defaults() -> Result<()> {
    let mut file = tempfile::NamedTempFile::new()?;
    writeln!(
        file,
        r#"
[[normalization.custom_rules]]
field = "company"
pattern = "\\s+Inc\\.?$"
description = "Drop Inc suffix"

[[normalization.custom_rules]]
field = "firstName"
pattern = "^\\s+|\\s+$"
description = "Trim first names"
"#
    )?;
    let config = Config::load_from(file.path())?;

    let service = NormalizationService::new();
    for rule in config.custom_rules()? {
        service.add_custom_rule(rule);
    }
    assert_eq!(service.rules().len(), 6);

    let outcome = service.normalize_contact(&messy_contact("1"));

    assert_eq!(outcome.normalized.email.as_deref(), Some("johnatdoe@example.com"));
    assert_eq!(outcome.normalized.phone.as_deref(), Some("+15550100000"));
    assert_eq!(outcome.normalized.first_name.as_deref(), Some("John"));
    assert_eq!(outcome.normalized.company.as_deref(), Some("Doe Holdings"));
    // notes carry no rule
    assert_eq!(outcome.normalized.notes.as_deref(), Some("met at   conference"));

    // whitespace collapse then trim, both recorded
    let first_name: Vec<(&str, &str)> = outcome
        .changes
        .iter()
        .filter(|c| c.field == ContactField::FirstName)
        .map(|c| (c.original_value.as_str(), c.normalized_value.as_str()))
        .collect();
    assert_eq!(first_name, vec![(" John  ", " John "), (" John ", "John")]);

    let stats = service.normalization_stats();
    assert_eq!(stats.total_changes, stats.detailed_changes.len());
    assert_eq!(stats.changes_by_field.values().sum::<usize>(), stats.total_changes);
    assert_eq!(stats.changes_by_rule["Drop Inc suffix"], 1);
    assert_eq!(stats.changes_by_type.company, 1);
    Ok(())
}

#[test]
fn test_batch_normalization_then_revert() -> Result<()> {
    let service = NormalizationService::new();
    let contacts = vec![messy_contact("1"), messy_contact("2")];

    let result = service.normalize_contacts(&contacts);

    assert_eq!(result.normalized.len(), 2);
    assert_eq!(result.stats.total_changes, 6);
    assert_eq!(result.stats.changes_by_type.email, 2);
    assert_eq!(result.stats.changes_by_type.phone, 2);
    assert_eq!(result.stats.changes_by_type.first_name, 2);

    let reverted = service.revert_changes(&result.normalized[1]);
    assert_eq!(reverted, contacts[1]);
    Ok(())
}

#[test]
fn test_transform_rule_with_validation() -> Result<()> {
    let service = NormalizationService::with_rules(vec![NormalizationRule::transform(
        ContactField::Title,
        |title| title.to_uppercase(),
        "Uppercase titles",
    )
    .with_validation(|title| title.len() <= 5)]);

    let short = Contact {
        id: "s".to_string(),
        title: Some("cto".to_string()),
        ..Default::default()
    };
    let long = Contact {
        id: "l".to_string(),
        title: Some("head of sales".to_string()),
        ..Default::default()
    };

    let result = service.normalize_contacts(&[short, long]);

    assert_eq!(result.normalized[0].title.as_deref(), Some("CTO"));
    assert_eq!(result.normalized[1].title.as_deref(), Some("head of sales"));
    assert_eq!(result.stats.total_changes, 1);
    assert_eq!(result.stats.rejections.len(), 1);
    assert_eq!(result.stats.rejections[0].rejected_value, "HEAD OF SALES");
    Ok(())
}

#[test]
fn test_normalized_duplicates_merge_into_one_contact() -> Result<()> {
    let service = NormalizationService::new();
    let mut second = messy_contact("2");
    second.title = Some("Founder".to_string());
    let normalized = service.normalize_contacts(&[messy_contact("1"), second]).normalized;

    let merged = merge_contacts(&normalized, &MergePlan::new(MergeStrategy::PreferExisting))?;

    assert_eq!(merged.id, "1");
    assert_eq!(merged.title.as_deref(), Some("Founder"));
    assert_eq!(merged.email.as_deref(), Some("johnatdoe@example.com"));
    assert!(merged.additional_fields.contains_key("mergeHistory"));
    Ok(())
}
