use chrono::{Datelike, NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

use super::fees::{PaymentBreakdown, Rate};

/// Identifier wrapper for school class requests.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstructorId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SchoolId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuoteId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssignmentId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PaymentId(pub String);

impl QuoteId {
    pub fn generate() -> Self {
        Self(format!("quote-{}", uuid::Uuid::new_v4()))
    }
}

impl AssignmentId {
    pub fn generate() -> Self {
        Self(format!("asg-{}", uuid::Uuid::new_v4()))
    }
}

impl PaymentId {
    pub fn generate() -> Self {
        Self(format!("pay-{}", uuid::Uuid::new_v4()))
    }
}

/// School snapshot carried on each request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct School {
    pub id: SchoolId,
    pub name: String,
    pub region: String,
}

/// Catalog program a school may request. Programs without a category match every subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    pub id: String,
    pub name: String,
    pub category: Option<String>,
}

/// A school's request for a class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchoolRequest {
    pub id: RequestId,
    pub school: School,
    pub program: Option<Program>,
    pub custom_program: Option<String>,
    pub submitted_on: NaiveDate,
    pub desired_date: NaiveDate,
    pub alternate_date: Option<NaiveDate>,
    pub start_time: Option<NaiveTime>,
    pub session_count: u32,
    pub student_count: u32,
    pub target_grade: String,
    pub budget: Option<u64>,
    pub status: RequestStatus,
}

impl SchoolRequest {
    pub fn program_category(&self) -> Option<&str> {
        self.program
            .as_ref()
            .and_then(|program| program.category.as_deref())
            .filter(|category| !category.trim().is_empty())
    }

    pub fn program_label(&self) -> &str {
        match (&self.program, &self.custom_program) {
            (Some(program), _) => &program.name,
            (None, Some(custom)) => custom,
            (None, None) => "unspecified program",
        }
    }

    pub fn desired_weekday(&self) -> Weekday {
        self.desired_date.weekday()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Submitted,
    Reviewing,
    Approved,
    Quoted,
    Assigned,
    Confirmed,
    Completed,
    Cancelled,
}

impl RequestStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::Reviewing => "reviewing",
            Self::Approved => "approved",
            Self::Quoted => "quoted",
            Self::Assigned => "assigned",
            Self::Confirmed => "confirmed",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Only freshly submitted requests enter the automated quote + assign path.
    pub const fn is_automatable(self) -> bool {
        matches!(self, Self::Submitted)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstructorStatus {
    Pending,
    Active,
    Inactive,
    OnLeave,
    Terminated,
    Rejected,
}

impl InstructorStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::OnLeave => "on_leave",
            Self::Terminated => "terminated",
            Self::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstructorType {
    Internal,
    External,
}

impl InstructorType {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Internal => "internal",
            Self::External => "external",
        }
    }
}

/// Instructor tier. Internal staff carry one of four levels, contractors one of three tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GradeKey {
    InternalLevel1,
    InternalLevel2,
    InternalLevel3,
    InternalLevel4,
    ExternalBasic,
    ExternalPremium,
    ExternalVip,
}

impl GradeKey {
    pub const fn all() -> [Self; 7] {
        [
            Self::InternalLevel1,
            Self::InternalLevel2,
            Self::InternalLevel3,
            Self::InternalLevel4,
            Self::ExternalBasic,
            Self::ExternalPremium,
            Self::ExternalVip,
        ]
    }

    /// Settings-table identifier, e.g. `grades.internal_level2.feeMultiplier`.
    pub const fn key(self) -> &'static str {
        match self {
            Self::InternalLevel1 => "internal_level1",
            Self::InternalLevel2 => "internal_level2",
            Self::InternalLevel3 => "internal_level3",
            Self::InternalLevel4 => "internal_level4",
            Self::ExternalBasic => "external_basic",
            Self::ExternalPremium => "external_premium",
            Self::ExternalVip => "external_vip",
        }
    }

    pub fn from_key(raw: &str) -> Option<Self> {
        Self::all().into_iter().find(|grade| grade.key() == raw)
    }

    pub const fn instructor_type(self) -> InstructorType {
        match self {
            Self::InternalLevel1
            | Self::InternalLevel2
            | Self::InternalLevel3
            | Self::InternalLevel4 => InstructorType::Internal,
            Self::ExternalBasic | Self::ExternalPremium | Self::ExternalVip => {
                InstructorType::External
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instructor {
    pub id: InstructorId,
    pub name: String,
    pub home_region: String,
    pub travel_radius_km: u32,
    pub subjects: Vec<String>,
    pub available_days: Vec<Weekday>,
    pub status: InstructorStatus,
    pub instructor_type: InstructorType,
    pub grade: GradeKey,
    pub total_classes: u32,
    pub rating: f32,
}

impl Instructor {
    pub fn is_active(&self) -> bool {
        self.status == InstructorStatus::Active
    }

    pub fn is_available_on(&self, weekday: Weekday) -> bool {
        self.available_days.contains(&weekday)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteStatus {
    Draft,
    Sent,
    Accepted,
    Rejected,
    Expired,
}

impl QuoteStatus {
    pub const fn is_live(self) -> bool {
        matches!(self, Self::Draft | Self::Sent | Self::Accepted)
    }
}

/// Priced proposal sent back to the school. The fee parts, material cost and margin add up
/// to `total`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub id: QuoteId,
    pub request_id: RequestId,
    pub instructor_id: InstructorId,
    /// Grade-adjusted session fee, before transport and allowances.
    pub session_fee: u64,
    pub transport_fee: u64,
    pub allowance_total: u64,
    /// Signed correction from the session fee bounds.
    pub clamp_adjustment: i64,
    pub material_cost: u64,
    /// Configured margin rate. A budget trim lowers `margin` only, so `margin` can sit below
    /// this rate applied to the subtotal.
    pub margin_rate: Rate,
    pub margin: u64,
    pub total: u64,
    pub valid_from: NaiveDate,
    pub valid_until: NaiveDate,
    pub status: QuoteStatus,
    pub breakdown: PaymentBreakdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Proposed,
    Pending,
    Accepted,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
    Declined,
}

impl AssignmentStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Proposed => "proposed",
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Confirmed => "confirmed",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Declined => "declined",
        }
    }

    /// Anything short of cancelled/declined still holds the request.
    pub const fn is_active(self) -> bool {
        !matches!(self, Self::Cancelled | Self::Declined)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstructorAssignment {
    pub id: AssignmentId,
    pub request_id: RequestId,
    pub instructor_id: InstructorId,
    pub status: AssignmentStatus,
    pub scheduled_date: NaiveDate,
    pub start_time: Option<NaiveTime>,
    pub distance_km: Option<f64>,
    pub transport_fee: u64,
    pub breakdown: PaymentBreakdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Calculated,
    Approved,
    Processing,
    Paid,
    Cancelled,
}

impl PaymentStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Calculated => "calculated",
            Self::Approved => "approved",
            Self::Processing => "processing",
            Self::Paid => "paid",
            Self::Cancelled => "cancelled",
        }
    }

    /// `PENDING -> CALCULATED -> APPROVED -> PROCESSING -> PAID`, or cancellation before payout.
    pub const fn can_transition_to(self, next: PaymentStatus) -> bool {
        match (self, next) {
            (Self::Paid, _) | (Self::Cancelled, _) => false,
            (_, Self::Cancelled) => true,
            (Self::Pending, Self::Calculated)
            | (Self::Calculated, Self::Approved)
            | (Self::Approved, Self::Processing)
            | (Self::Processing, Self::Paid) => true,
            _ => false,
        }
    }
}

/// Compensation record for one assignment. Frozen once paid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub assignment_id: AssignmentId,
    pub instructor_id: InstructorId,
    /// Grade-adjusted session fee, before transport and allowances.
    pub session_fee: u64,
    pub transport_fee: u64,
    pub allowance_total: u64,
    /// Signed correction from the session fee bounds; the four parts sum to `subtotal`.
    pub clamp_adjustment: i64,
    pub bonus: u64,
    pub deductions: u64,
    pub subtotal: u64,
    pub tax_withholding: u64,
    pub net_amount: u64,
    pub floored_to_zero: bool,
    pub status: PaymentStatus,
}
