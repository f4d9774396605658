//! End-to-end automation: rank instructors, price the class, fit the budget, and commit the
//! quote (plus an optional proposed assignment) atomically.

mod budget;
mod workflow;

pub use budget::{BudgetAdjustment, QuotePricing, REDUCIBLE_ALLOWANCES};
pub use workflow::AutomationWorkflow;

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::domain::{InstructorAssignment, InstructorId, Quote, RequestId, RequestStatus};
use super::fees::{FeeError, PaymentBreakdown};
use super::repository::RepositoryError;
use super::rules::RuleSourceError;

/// Public-holiday lookup used for the holiday allowance.
pub trait HolidayCalendar: Send + Sync {
    fn is_holiday(&self, date: NaiveDate) -> bool;
}

impl HolidayCalendar for BTreeSet<NaiveDate> {
    fn is_holiday(&self, date: NaiveDate) -> bool {
        self.contains(&date)
    }
}

/// Calendar without holidays.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHolidays;

impl HolidayCalendar for NoHolidays {
    fn is_holiday(&self, _date: NaiveDate) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomationOptions {
    /// Also create a proposed assignment for the top-ranked instructor.
    #[serde(default)]
    pub auto_assign: bool,
    /// Waive discretionary allowances and trim margin when over the school's budget.
    #[serde(default)]
    pub adjust_to_budget: bool,
}

/// Result of a committed automation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationOutcome {
    pub success: bool,
    pub message: String,
    pub request_id: RequestId,
    pub request_status: RequestStatus,
    pub instructor_id: InstructorId,
    pub candidates_considered: usize,
    pub quote: Quote,
    pub assignment: Option<InstructorAssignment>,
    pub breakdown: PaymentBreakdown,
    pub adjustments: Vec<BudgetAdjustment>,
    /// Quote total exceeds the stated budget and no adjustment was requested.
    pub over_budget: bool,
}

/// Error raised by the automation workflow. Nothing is persisted when one is returned.
#[derive(Debug, thiserror::Error)]
pub enum AutomationError {
    #[error("request {0} not found")]
    RequestNotFound(String),
    #[error("request {id} is {} and cannot be automated", .status.label())]
    NotAutomatable { id: String, status: RequestStatus },
    #[error("request {0} already has an active assignment")]
    RequestAlreadyAssigned(String),
    #[error("no eligible instructor for request {0}")]
    NoEligibleInstructor(String),
    #[error("budget {budget} cannot cover the minimum achievable total {minimum_total}")]
    BudgetInfeasible { budget: u64, minimum_total: u64 },
    #[error("request {id} changed while automating (now {})", .actual.label())]
    ConcurrencyConflict { id: String, actual: RequestStatus },
    #[error(transparent)]
    Fee(#[from] FeeError),
    #[error(transparent)]
    Rules(#[from] RuleSourceError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
