// Domain data shapes shared across layers

pub mod contact;
pub mod normalized;

pub use contact::{
    AdditionalField, Contact, ContactField, ContactStatus, CustomMergeRule, MergeHistory,
    MergeStrategy,
};
pub use normalized::{
    full_name, normalize_email, normalize_name, normalize_phone, NormalizedContact,
    OriginalValues,
};
