//! Field definition vocabulary and the pure metadata derivation used when a
//! tenant administrator creates or edits a field.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

// ---------------------------------------------------------------------------
// Database type
// ---------------------------------------------------------------------------

/// Storage interpretation of a field's values. Values are always persisted
/// as text; this tag says how to read them back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    String,
    Text,
    Integer,
    Date,
    Boolean,
}

impl DatabaseType {
    pub const ALL: [DatabaseType; 5] = [
        DatabaseType::String,
        DatabaseType::Text,
        DatabaseType::Integer,
        DatabaseType::Date,
        DatabaseType::Boolean,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Text => "text",
            Self::Integer => "integer",
            Self::Date => "date",
            Self::Boolean => "boolean",
        }
    }

    /// Human label shown in field forms.
    pub fn title(&self) -> &'static str {
        match self {
            Self::String => "Small text",
            Self::Text => "Long text",
            Self::Integer => "Number",
            Self::Date => "Date",
            Self::Boolean => "Yes / No",
        }
    }
}

impl fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatabaseType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "string" => Ok(Self::String),
            "text" => Ok(Self::Text),
            "integer" => Ok(Self::Integer),
            "date" => Ok(Self::Date),
            "boolean" => Ok(Self::Boolean),
            other => Err(DomainError::UnknownDatabaseType(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Requirement
// ---------------------------------------------------------------------------

/// How strongly a field should be filled in. The numeric code is the sort
/// key used to order forms, so lower codes come first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Requirement {
    AutoGenerated,
    Required,
    StronglyAdvised,
    Advised,
    IfPossible,
    Undefined,
}

impl Requirement {
    pub fn code(&self) -> i64 {
        match self {
            Self::AutoGenerated => 0,
            Self::Required => 1,
            Self::StronglyAdvised => 2,
            Self::Advised => 3,
            Self::IfPossible => 4,
            Self::Undefined => 100,
        }
    }

    pub fn from_code(code: i64) -> Result<Self, DomainError> {
        match code {
            0 => Ok(Self::AutoGenerated),
            1 => Ok(Self::Required),
            2 => Ok(Self::StronglyAdvised),
            3 => Ok(Self::Advised),
            4 => Ok(Self::IfPossible),
            100 => Ok(Self::Undefined),
            other => Err(DomainError::UnknownRequirement(other)),
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Self::AutoGenerated => "Auto generated",
            Self::Required => "Required",
            Self::StronglyAdvised => "Strongly advised",
            Self::Advised => "Advised",
            Self::IfPossible => "If possible",
            Self::Undefined => "Undefined",
        }
    }

    /// Only this tier turns into a hard validation constraint.
    pub fn is_mandatory(&self) -> bool {
        matches!(self, Self::Required)
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Where a field is shown. Ordered so that `status > min` filters work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldStatus {
    Disabled,
    Website,
    WebsiteAndApp,
}

impl FieldStatus {
    pub fn code(&self) -> i64 {
        match self {
            Self::Disabled => 0,
            Self::Website => 1,
            Self::WebsiteAndApp => 2,
        }
    }

    pub fn from_code(code: i64) -> Result<Self, DomainError> {
        match code {
            0 => Ok(Self::Disabled),
            1 => Ok(Self::Website),
            2 => Ok(Self::WebsiteAndApp),
            other => Err(DomainError::UnknownStatus(other)),
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Self::Disabled => "Disabled",
            Self::Website => "Website",
            Self::WebsiteAndApp => "Website & App",
        }
    }
}

// ---------------------------------------------------------------------------
// Derived metadata
// ---------------------------------------------------------------------------

/// Presentation and validation attributes computed from a field's type and
/// requirement level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMetadata {
    /// HTML input type for web forms.
    pub html_type: String,
    /// Widget tag understood by the mobile client.
    pub android_type: String,
    /// Pipe-separated validation rule, e.g. `required|date`.
    pub validation_rule: String,
}

/// Map a database type and requirement level to the metadata stored on the
/// field.
///
/// Only [`Requirement::Required`] yields a `required` rule. Every other tier
/// yields `nullable`, so a missing value never fails validation.
pub fn derive_metadata(database_type: DatabaseType, required: Requirement) -> FieldMetadata {
    let (html_type, android_type) = match database_type {
        DatabaseType::String => ("text", "EditText"),
        DatabaseType::Text => ("textarea", "EditTextMultiLine"),
        DatabaseType::Integer => ("number", "EditTextNumber"),
        DatabaseType::Date => ("date", "DatePicker"),
        DatabaseType::Boolean => ("checkbox", "CheckBox"),
    };

    FieldMetadata {
        html_type: html_type.to_string(),
        android_type: android_type.to_string(),
        validation_rule: validation_rule(database_type, required),
    }
}

/// Validation rule alone. Used when a field's requirement changes but its
/// type, which is fixed after creation, does not.
pub fn validation_rule(database_type: DatabaseType, required: Requirement) -> String {
    let presence = if required.is_mandatory() {
        "required"
    } else {
        "nullable"
    };
    let shape = match database_type {
        DatabaseType::String => "string|max:255",
        DatabaseType::Text => "string|max:65535",
        DatabaseType::Integer => "integer",
        DatabaseType::Date => "date",
        DatabaseType::Boolean => "boolean",
    };
    format!("{presence}|{shape}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_string_gets_mandatory_rule() {
        let meta = derive_metadata(DatabaseType::String, Requirement::Required);
        assert_eq!(meta.html_type, "text");
        assert_eq!(meta.android_type, "EditText");
        assert_eq!(meta.validation_rule, "required|string|max:255");
    }

    #[test]
    fn required_date_rule() {
        let meta = derive_metadata(DatabaseType::Date, Requirement::Required);
        assert_eq!(meta.validation_rule, "required|date");
        assert_eq!(meta.html_type, "date");
    }

    #[test]
    fn advisory_tiers_never_emit_required() {
        for tier in [
            Requirement::AutoGenerated,
            Requirement::StronglyAdvised,
            Requirement::Advised,
            Requirement::IfPossible,
            Requirement::Undefined,
        ] {
            for ty in DatabaseType::ALL {
                let rule = derive_metadata(ty, tier).validation_rule;
                assert!(rule.starts_with("nullable|"), "{ty} / {tier:?}: {rule}");
                assert!(!rule.contains("required"));
            }
        }
    }

    #[test]
    fn requirement_codes_sort_required_first() {
        assert!(Requirement::Required < Requirement::StronglyAdvised);
        assert!(Requirement::IfPossible < Requirement::Undefined);
        assert_eq!(Requirement::from_code(100).unwrap(), Requirement::Undefined);
        assert!(Requirement::from_code(5).is_err());
    }

    #[test]
    fn database_type_parses_its_own_names() {
        for ty in DatabaseType::ALL {
            assert_eq!(ty.as_str().parse::<DatabaseType>().unwrap(), ty);
        }
        assert!("float".parse::<DatabaseType>().is_err());
    }

    #[test]
    fn status_ordering_matches_codes() {
        assert!(FieldStatus::WebsiteAndApp > FieldStatus::Website);
        assert_eq!(FieldStatus::from_code(2).unwrap(), FieldStatus::WebsiteAndApp);
    }
}
