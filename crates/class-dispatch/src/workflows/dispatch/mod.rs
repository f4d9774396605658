//! Instructor dispatch: pricing school class requests, matching instructors, automating
//! quote and assignment, and settling instructor payments.

pub mod automation;
pub mod domain;
pub mod fees;
pub mod matching;
pub mod payments;
pub mod repository;
pub mod router;
pub mod rules;

pub use automation::{
    AutomationError, AutomationOptions, AutomationOutcome, AutomationWorkflow, BudgetAdjustment,
    HolidayCalendar, NoHolidays, QuotePricing,
};
pub use domain::{
    AssignmentId, AssignmentStatus, GradeKey, Instructor, InstructorAssignment, InstructorId,
    InstructorStatus, InstructorType, Payment, PaymentId, PaymentStatus, Program, Quote, QuoteId,
    QuoteStatus, RequestId, RequestStatus, School, SchoolId, SchoolRequest,
};
pub use fees::{FeeCalculator, FeeError, FeeInput, PaymentBreakdown};
pub use matching::{InstructorMatcher, RankedCandidate, SubjectCategoryMap};
pub use payments::{PaymentError, PaymentLedger};
pub use repository::{
    AutomationCommit, DispatchRepository, InMemoryDispatchRepository, RepositoryError,
};
pub use router::{dispatch_router, DispatchState};
pub use rules::{
    CsvRuleSource, RuleConfig, RuleConfigCache, RuleConfigError, RuleProvider, RuleSource,
    RuleSourceError, StaticRuleSource,
};

#[cfg(test)]
mod tests;
