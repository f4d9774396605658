use serde::{Deserialize, Serialize};

/// Daily class index from which the multiple-classes allowance applies (third class that day).
pub const MULTIPLE_CLASS_THRESHOLD: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllowanceKind {
    Weekend,
    Holiday,
    Emergency,
    MultipleClasses,
}

impl AllowanceKind {
    pub const fn ordered() -> [Self; 4] {
        [
            Self::Weekend,
            Self::Holiday,
            Self::Emergency,
            Self::MultipleClasses,
        ]
    }

    /// Suffix of the `specialAllowances.*` settings key.
    pub const fn key(self) -> &'static str {
        match self {
            Self::Weekend => "weekend",
            Self::Holiday => "holiday",
            Self::Emergency => "emergency",
            Self::MultipleClasses => "multipleClasses",
        }
    }

    /// Weekend and holiday pay follow the calendar and cannot be negotiated away.
    pub const fn is_mandatory(self) -> bool {
        matches!(self, Self::Weekend | Self::Holiday)
    }
}

/// Flat add-ons configured per situation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SpecialAllowances {
    pub weekend: u64,
    pub holiday: u64,
    pub emergency: u64,
    pub multiple_classes: u64,
}

impl SpecialAllowances {
    pub fn amount(&self, kind: AllowanceKind) -> u64 {
        match kind {
            AllowanceKind::Weekend => self.weekend,
            AllowanceKind::Holiday => self.holiday,
            AllowanceKind::Emergency => self.emergency,
            AllowanceKind::MultipleClasses => self.multiple_classes,
        }
    }
}

/// One allowance that applied to a computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowanceLine {
    pub kind: AllowanceKind,
    pub amount: u64,
}
