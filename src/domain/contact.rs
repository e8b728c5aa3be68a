use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A contact record as owned by the contact store.
///
/// `id` is unique within a tenant and never rewritten by merges; `email` and
/// `phone` carry no uniqueness guarantee before normalization.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub status: ContactStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default)]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_contacted_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_follow_up_date: Option<DateTime<Utc>>,
    /// Kept as received from the import so normalization rules can target it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birthday: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub additional_fields: BTreeMap<String, AdditionalField>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactStatus {
    #[default]
    Active,
    Inactive,
    Archived,
}

/// Value stored under a contact's `additionalFields`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AdditionalField {
    MergeHistory(MergeHistory),
    Value(serde_json::Value),
}

/// Record of a merge that folded other contacts into this one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeHistory {
    pub merged_at: DateTime<Utc>,
    pub strategy: MergeStrategy,
    #[serde(default)]
    pub custom_rules: Vec<CustomMergeRule>,
    /// Pre-merge field values keyed by contact id, then field name
    #[serde(default)]
    pub original_values: BTreeMap<String, BTreeMap<String, String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomMergeRule {
    pub field: ContactField,
    pub strategy: MergeStrategy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    PreferNew,
    PreferExisting,
    Combine,
    Custom,
}

/// String-valued fields of a [`Contact`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ContactField {
    Id,
    FirstName,
    LastName,
    Name,
    Email,
    Phone,
    Company,
    Role,
    Title,
    Category,
    Birthday,
    Notes,
    AssignedTo,
}

impl ContactField {
    pub const ALL: [ContactField; 13] = [
        ContactField::Id,
        ContactField::FirstName,
        ContactField::LastName,
        ContactField::Name,
        ContactField::Email,
        ContactField::Phone,
        ContactField::Company,
        ContactField::Role,
        ContactField::Title,
        ContactField::Category,
        ContactField::Birthday,
        ContactField::Notes,
        ContactField::AssignedTo,
    ];

    /// Whether normalization rules may rewrite this field
    pub fn is_normalizable(&self) -> bool {
        matches!(
            self,
            ContactField::Id
                | ContactField::FirstName
                | ContactField::LastName
                | ContactField::Email
                | ContactField::Phone
                | ContactField::Company
                | ContactField::Title
                | ContactField::Birthday
                | ContactField::Notes
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContactField::Id => "id",
            ContactField::FirstName => "firstName",
            ContactField::LastName => "lastName",
            ContactField::Name => "name",
            ContactField::Email => "email",
            ContactField::Phone => "phone",
            ContactField::Company => "company",
            ContactField::Role => "role",
            ContactField::Title => "title",
            ContactField::Category => "category",
            ContactField::Birthday => "birthday",
            ContactField::Notes => "notes",
            ContactField::AssignedTo => "assignedTo",
        }
    }

    /// Current value of this field on `contact`, if it holds a string
    pub fn get<'a>(&self, contact: &'a Contact) -> Option<&'a str> {
        match self {
            ContactField::Id => Some(contact.id.as_str()),
            ContactField::FirstName => contact.first_name.as_deref(),
            ContactField::LastName => contact.last_name.as_deref(),
            ContactField::Name => contact.name.as_deref(),
            ContactField::Email => contact.email.as_deref(),
            ContactField::Phone => contact.phone.as_deref(),
            ContactField::Company => contact.company.as_deref(),
            ContactField::Role => contact.role.as_deref(),
            ContactField::Title => contact.title.as_deref(),
            ContactField::Category => contact.category.as_deref(),
            ContactField::Birthday => contact.birthday.as_deref(),
            ContactField::Notes => contact.notes.as_deref(),
            ContactField::AssignedTo => contact.assigned_to.as_deref(),
        }
    }

    pub fn set(&self, contact: &mut Contact, value: String) {
        match self {
            ContactField::Id => contact.id = value,
            ContactField::FirstName => contact.first_name = Some(value),
            ContactField::LastName => contact.last_name = Some(value),
            ContactField::Name => contact.name = Some(value),
            ContactField::Email => contact.email = Some(value),
            ContactField::Phone => contact.phone = Some(value),
            ContactField::Company => contact.company = Some(value),
            ContactField::Role => contact.role = Some(value),
            ContactField::Title => contact.title = Some(value),
            ContactField::Category => contact.category = Some(value),
            ContactField::Birthday => contact.birthday = Some(value),
            ContactField::Notes => contact.notes = Some(value),
            ContactField::AssignedTo => contact.assigned_to = Some(value),
        }
    }
}

impl fmt::Display for ContactField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
