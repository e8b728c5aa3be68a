use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::sync::Arc;

use crate::domain::ContactField;
use crate::error::Result;

pub type TransformFn = Arc<dyn Fn(&str) -> String + Send + Sync>;
pub type ValidateFn = Arc<dyn Fn(&str) -> bool + Send + Sync>;

static EMAIL_INVALID_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-zA-Z0-9@._-]").expect("email pattern compiles"));
static PHONE_NON_NUMERIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^0-9+]").expect("phone pattern compiles"));
static WHITESPACE_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("whitespace pattern compiles"));

/// A single ordered rewrite applied to one contact field
#[derive(Clone)]
pub struct NormalizationRule {
    pub field: ContactField,
    pub action: RuleAction,
    pub description: String,
}

#[derive(Clone)]
pub enum RuleAction {
    /// Replace every match of `pattern` with `replacement`
    Pattern { pattern: Regex, replacement: String },
    /// Arbitrary rewrite; when `validate` rejects the result the rewrite is discarded
    Transform {
        transform: TransformFn,
        validate: Option<ValidateFn>,
    },
}

/// What a rule did to a value
#[derive(Debug, Clone, PartialEq)]
pub enum RuleOutcome {
    Unchanged,
    Changed(String),
    Rejected(String),
}

impl NormalizationRule {
    pub fn pattern(
        field: ContactField,
        pattern: &str,
        replacement: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self::from_regex(field, Regex::new(pattern)?, replacement, description))
    }

    pub fn from_regex(
        field: ContactField,
        pattern: Regex,
        replacement: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            field,
            action: RuleAction::Pattern {
                pattern,
                replacement: replacement.into(),
            },
            description: description.into(),
        }
    }

    pub fn transform<F>(field: ContactField, transform: F, description: impl Into<String>) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        Self {
            field,
            action: RuleAction::Transform {
                transform: Arc::new(transform),
                validate: None,
            },
            description: description.into(),
        }
    }

    /// Attach a validator to a transform rule. Pattern rules are returned as-is.
    pub fn with_validation<V>(mut self, validate: V) -> Self
    where
        V: Fn(&str) -> bool + Send + Sync + 'static,
    {
        if let RuleAction::Transform { validate: slot, .. } = &mut self.action {
            *slot = Some(Arc::new(validate));
        }
        self
    }

    pub fn apply(&self, value: &str) -> RuleOutcome {
        let next = match &self.action {
            RuleAction::Pattern {
                pattern,
                replacement,
            } => pattern.replace_all(value, replacement.as_str()).into_owned(),
            RuleAction::Transform {
                transform,
                validate,
            } => {
                let next = transform(value);
                if let Some(validate) = validate {
                    if next != value && !validate(&next) {
                        return RuleOutcome::Rejected(next);
                    }
                }
                next
            }
        };

        if next == value {
            RuleOutcome::Unchanged
        } else {
            RuleOutcome::Changed(next)
        }
    }
}

impl fmt::Debug for NormalizationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.action {
            RuleAction::Pattern { pattern, .. } => format!("pattern({})", pattern.as_str()),
            RuleAction::Transform { validate, .. } => {
                if validate.is_some() {
                    "transform+validate".to_string()
                } else {
                    "transform".to_string()
                }
            }
        };
        f.debug_struct("NormalizationRule")
            .field("field", &self.field)
            .field("kind", &kind)
            .field("description", &self.description)
            .finish()
    }
}

/// Built-in rules, in application order
pub fn default_rules() -> Vec<NormalizationRule> {
    vec![
        NormalizationRule::from_regex(
            ContactField::Email,
            EMAIL_INVALID_CHARS.clone(),
            "",
            "Remove invalid characters from email",
        ),
        NormalizationRule::from_regex(
            ContactField::Phone,
            PHONE_NON_NUMERIC.clone(),
            "",
            "Remove non-numeric characters from phone",
        ),
        NormalizationRule::from_regex(
            ContactField::FirstName,
            WHITESPACE_RUN.clone(),
            " ",
            "Normalize whitespace in first names",
        ),
        NormalizationRule::from_regex(
            ContactField::LastName,
            WHITESPACE_RUN.clone(),
            " ",
            "Normalize whitespace in last names",
        ),
    ]
}
