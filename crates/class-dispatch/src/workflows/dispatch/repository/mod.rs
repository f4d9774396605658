mod memory;

pub use memory::InMemoryDispatchRepository;

use chrono::NaiveDate;

use super::domain::{
    AssignmentId, Instructor, InstructorAssignment, InstructorId, Payment, PaymentId, Quote,
    RequestId, RequestStatus, SchoolId, SchoolRequest,
};

/// Everything the automation step writes, applied as one unit or not at all.
#[derive(Debug, Clone)]
pub struct AutomationCommit {
    pub request_id: RequestId,
    /// Compare-and-swap guard on the stored request status.
    pub expected_status: RequestStatus,
    pub new_status: RequestStatus,
    pub quote: Quote,
    pub assignment: Option<InstructorAssignment>,
}

/// Storage abstraction for requests, instructors, quotes, assignments and payments.
pub trait DispatchRepository: Send + Sync {
    fn fetch_request(&self, id: &RequestId) -> Result<Option<SchoolRequest>, RepositoryError>;
    fn list_instructors(&self) -> Result<Vec<Instructor>, RepositoryError>;
    fn active_assignments_for_request(
        &self,
        id: &RequestId,
    ) -> Result<Vec<InstructorAssignment>, RepositoryError>;
    fn assignments_for_instructor_on(
        &self,
        id: &InstructorId,
        date: NaiveDate,
    ) -> Result<Vec<InstructorAssignment>, RepositoryError>;
    /// Distance recorded from earlier dispatches of this instructor to this school.
    fn known_distance_km(
        &self,
        instructor: &InstructorId,
        school: &SchoolId,
    ) -> Result<Option<f64>, RepositoryError>;
    /// Must reject with `StatusMismatch` when the request status is not `expected_status`, and
    /// with `ActiveAssignmentExists` when an assignment is included and one is already active.
    fn commit_automation(&self, commit: AutomationCommit) -> Result<(), RepositoryError>;
    fn fetch_assignment(
        &self,
        id: &AssignmentId,
    ) -> Result<Option<InstructorAssignment>, RepositoryError>;
    /// Inserts a payment; `Conflict` when the assignment already has one.
    fn save_payment(&self, payment: Payment) -> Result<Payment, RepositoryError>;
    fn fetch_payment(&self, id: &PaymentId) -> Result<Option<Payment>, RepositoryError>;
    fn update_payment(&self, payment: Payment) -> Result<(), RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error(
        "request status is {} but {} was expected",
        .actual.label(),
        .expected.label()
    )]
    StatusMismatch {
        expected: RequestStatus,
        actual: RequestStatus,
    },
    #[error("request already has an active assignment")]
    ActiveAssignmentExists,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
