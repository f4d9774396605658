//! Compensation pipeline: session fee, grade multiplier, transport band, special allowances,
//! clamp and withholding, applied in that order and recorded step by step.

mod allowances;
mod calculator;
mod grade;
mod money;
mod session;
mod transport;

pub use allowances::{AllowanceKind, AllowanceLine, SpecialAllowances, MULTIPLE_CLASS_THRESHOLD};
pub use calculator::FeeCalculator;
pub use grade::{GradeDefinition, GradeResolution, GradeRuleEngine};
pub use money::{apply_multiplier, ClampOutcome, FeeBounds, Rate};
pub use session::{SessionFee, SessionFeeTable};
pub use transport::{DistanceBand, TransportFee, TransportFeeTable};

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use super::domain::{GradeKey, InstructorType};

/// Classes booked with this many days of notice or fewer count as emergencies.
pub const EMERGENCY_NOTICE_DAYS: i64 = 3;

/// Inputs for a single assignment's compensation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeInput {
    pub sessions: u32,
    #[serde(default)]
    pub distance_km: Option<f64>,
    /// Band to price transport with when the distance is unknown.
    #[serde(default)]
    pub fallback_band: Option<DistanceBand>,
    pub instructor_type: InstructorType,
    pub grade: GradeKey,
    #[serde(default)]
    pub is_weekend: bool,
    #[serde(default)]
    pub is_holiday: bool,
    #[serde(default)]
    pub is_emergency: bool,
    /// 1-based position of this class among the instructor's classes that day.
    #[serde(default = "first_class_of_day")]
    pub daily_class_index: u32,
    #[serde(default)]
    pub bonus: u64,
    #[serde(default)]
    pub deductions: u64,
    #[serde(default)]
    pub waived_allowances: Vec<AllowanceKind>,
}

fn first_class_of_day() -> u32 {
    1
}

impl FeeInput {
    pub fn new(sessions: u32, instructor_type: InstructorType, grade: GradeKey) -> Self {
        Self {
            sessions,
            distance_km: None,
            fallback_band: None,
            instructor_type,
            grade,
            is_weekend: false,
            is_holiday: false,
            is_emergency: false,
            daily_class_index: first_class_of_day(),
            bonus: 0,
            deductions: 0,
            waived_allowances: Vec::new(),
        }
    }

    pub(crate) fn validate(&self) -> Result<(), FeeError> {
        if self.sessions == 0 {
            return Err(FeeError::Validation {
                field: "sessions",
                reason: "session count must be at least 1".to_string(),
            });
        }

        if let Some(distance) = self.distance_km {
            if !distance.is_finite() || distance < 0.0 {
                return Err(FeeError::Validation {
                    field: "distance_km",
                    reason: format!(
                        "must be a non-negative number of kilometers, got {distance}"
                    ),
                });
            }
        }

        if self.daily_class_index == 0 {
            return Err(FeeError::Validation {
                field: "daily_class_index",
                reason: "class index is 1-based".to_string(),
            });
        }

        Ok(())
    }

    pub(crate) fn allowance_applies(&self, kind: AllowanceKind) -> bool {
        if self.waived_allowances.contains(&kind) {
            return false;
        }
        match kind {
            AllowanceKind::Weekend => self.is_weekend,
            AllowanceKind::Holiday => self.is_holiday,
            AllowanceKind::Emergency => self.is_emergency,
            AllowanceKind::MultipleClasses => self.daily_class_index >= MULTIPLE_CLASS_THRESHOLD,
        }
    }
}

/// Errors raised before or during fee computation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FeeError {
    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },
    #[error("no session fee configured at or below {requested} session(s)")]
    UnknownSessionCount { requested: u32 },
    #[error(
        "grade {} is not configured for {} instructors",
        .grade.key(),
        .instructor_type.label()
    )]
    UnknownGrade {
        instructor_type: InstructorType,
        grade: GradeKey,
    },
}

/// Pipeline stage, in application order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeStage {
    BaseFee,
    GradeMultiplier,
    Transport,
    Allowances,
    Subtotal,
    Clamp,
    TaxWithholding,
    NetAmount,
}

impl FeeStage {
    pub const fn label(self) -> &'static str {
        match self {
            Self::BaseFee => "base fee",
            Self::GradeMultiplier => "grade multiplier",
            Self::Transport => "transport",
            Self::Allowances => "allowances",
            Self::Subtotal => "subtotal",
            Self::Clamp => "clamp",
            Self::TaxWithholding => "tax withholding",
            Self::NetAmount => "net amount",
        }
    }
}

/// Audit entry describing the running value after a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeStep {
    pub stage: FeeStage,
    pub amount: u64,
    pub notes: String,
}

/// Conditions an approver should see before paying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum FeeWarning {
    TransportNotComputed,
    SessionFeeFallback { requested: u32, matched: u32 },
    NetFlooredToZero { shortfall: u64 },
}

/// Full compensation breakdown for one assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentBreakdown {
    pub sessions: u32,
    pub matched_session_count: u32,
    pub base_fee: u64,
    pub grade: GradeKey,
    pub grade_name: String,
    pub multiplier: f64,
    pub grade_adjusted_fee: u64,
    pub transport: TransportFee,
    pub allowances: Vec<AllowanceLine>,
    pub allowance_total: u64,
    pub unclamped_subtotal: u64,
    pub clamp: ClampOutcome,
    pub subtotal: u64,
    pub tax_rate: Rate,
    pub tax_withholding: u64,
    pub bonus: u64,
    pub deductions: u64,
    pub net_amount: u64,
    pub floored_to_zero: bool,
    pub warnings: Vec<FeeWarning>,
    pub steps: Vec<FeeStep>,
}

impl PaymentBreakdown {
    pub fn transport_fee(&self) -> u64 {
        self.transport.amount()
    }

    pub fn has_allowance(&self, kind: AllowanceKind) -> bool {
        self.allowances.iter().any(|line| line.kind == kind)
    }

    /// Signed amount the fee bounds moved the subtotal by. Positive when raised to the minimum.
    /// `grade_adjusted_fee + transport + allowance_total + clamp_adjustment == subtotal`.
    pub fn clamp_adjustment(&self) -> i64 {
        let delta = i128::from(self.subtotal) - i128::from(self.unclamped_subtotal);
        delta.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
    }
}

impl PaymentBreakdown {
    /// Re-applies the final stage with a new bonus and deductions. Earlier stages are untouched.
    pub fn settle(&self, bonus: u64, deductions: u64) -> PaymentBreakdown {
        let net = NetAmount::settle(self.subtotal, self.tax_withholding, bonus, deductions);

        let mut settled = self.clone();
        settled.bonus = bonus;
        settled.deductions = deductions;
        settled.net_amount = net.amount;
        settled.floored_to_zero = net.floored_to_zero();
        settled
            .warnings
            .retain(|warning| !matches!(warning, FeeWarning::NetFlooredToZero { .. }));
        settled.warnings.extend(net.warning());
        settled.steps.retain(|step| step.stage != FeeStage::NetAmount);
        settled.steps.push(net.step(bonus, deductions));
        settled
    }
}

/// Net payout after withholding; a negative result floors at zero and keeps the shortfall.
#[derive(Debug, Clone, Copy)]
pub(crate) struct NetAmount {
    pub(crate) amount: u64,
    raw: i128,
}

impl NetAmount {
    pub(crate) fn settle(
        subtotal: u64,
        tax_withholding: u64,
        bonus: u64,
        deductions: u64,
    ) -> Self {
        let raw = subtotal as i128 + bonus as i128 - deductions as i128 - tax_withholding as i128;
        let amount = raw.clamp(0, u64::MAX as i128) as u64;
        Self { amount, raw }
    }

    pub(crate) fn floored_to_zero(&self) -> bool {
        self.raw < 0
    }

    pub(crate) fn warning(&self) -> Option<FeeWarning> {
        self.floored_to_zero().then(|| FeeWarning::NetFlooredToZero {
            shortfall: self.raw.unsigned_abs().min(u64::MAX as u128) as u64,
        })
    }

    pub(crate) fn step(&self, bonus: u64, deductions: u64) -> FeeStep {
        FeeStep {
            stage: FeeStage::NetAmount,
            amount: self.amount,
            notes: if self.floored_to_zero() {
                format!("floored to zero from {}", self.raw)
            } else {
                format!("subtotal - withholding - deductions {deductions} + bonus {bonus}")
            },
        }
    }
}

pub fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Short-notice check between the submission date and the class date.
pub fn is_emergency(submitted_on: NaiveDate, class_date: NaiveDate) -> bool {
    class_date.signed_duration_since(submitted_on).num_days() <= EMERGENCY_NOTICE_DAYS
}
