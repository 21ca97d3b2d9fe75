use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + label + std::str::FromStr pattern.
///
/// `as_str` is the stored/serialized value, `label` is the display text used
/// when rendering patient context. Parsing ignores ASCII case so legacy
/// upper-case values ("MODERATE") are accepted.
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal : $label:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$(Self::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }

            pub fn label(&self) -> &'static str {
                match self {
                    $(Self::$variant => $label),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let trimmed = s.trim();
                $(
                    if trimmed.eq_ignore_ascii_case($s) {
                        return Ok(Self::$variant);
                    }
                )+
                Err(DatabaseError::InvalidEnum {
                    field: stringify!($name).into(),
                    value: s.into(),
                })
            }
        }
    };
}

str_enum!(Gender {
    Male => "male" : "Male",
    Female => "female" : "Female",
    Other => "other" : "Other",
});

str_enum!(BloodType {
    APositive => "A+" : "A+",
    ANegative => "A-" : "A-",
    BPositive => "B+" : "B+",
    BNegative => "B-" : "B-",
    AbPositive => "AB+" : "AB+",
    AbNegative => "AB-" : "AB-",
    OPositive => "O+" : "O+",
    ONegative => "O-" : "O-",
});

str_enum!(Severity {
    Low => "low" : "Low",
    Moderate => "moderate" : "Moderate",
    High => "high" : "High",
    Critical => "critical" : "Critical",
});

str_enum!(MessageType {
    Query => "query" : "Query",
    Diagnosis => "diagnosis" : "Diagnosis",
    FollowUp => "follow_up" : "Follow Up",
    Emergency => "emergency" : "Emergency",
});

impl Default for Gender {
    fn default() -> Self {
        Self::Other
    }
}

impl Default for BloodType {
    fn default() -> Self {
        Self::OPositive
    }
}

impl Default for Severity {
    fn default() -> Self {
        Self::Moderate
    }
}

impl Default for MessageType {
    fn default() -> Self {
        Self::Query
    }
}
