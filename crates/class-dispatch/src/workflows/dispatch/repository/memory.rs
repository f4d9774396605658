use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::NaiveDate;

use super::{AutomationCommit, DispatchRepository, RepositoryError};
use crate::workflows::dispatch::domain::{
    AssignmentId, AssignmentStatus, Instructor, InstructorAssignment, InstructorId, Payment,
    PaymentId, Quote, RequestId, SchoolId, SchoolRequest,
};

/// Process-local store. A single mutex makes every commit atomic.
#[derive(Debug, Default)]
pub struct InMemoryDispatchRepository {
    state: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    requests: HashMap<RequestId, SchoolRequest>,
    instructors: Vec<Instructor>,
    distances: HashMap<(InstructorId, SchoolId), f64>,
    quotes: Vec<Quote>,
    assignments: Vec<InstructorAssignment>,
    payments: HashMap<PaymentId, Payment>,
}

impl InMemoryDispatchRepository {
    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert_request(&self, request: SchoolRequest) {
        self.lock().requests.insert(request.id.clone(), request);
    }

    pub fn add_instructor(&self, instructor: Instructor) {
        self.lock().instructors.push(instructor);
    }

    pub fn record_distance(&self, instructor: &InstructorId, school: &SchoolId, km: f64) {
        self.lock()
            .distances
            .insert((instructor.clone(), school.clone()), km);
    }

    /// Seeds an assignment created outside the automation path (manual assignment screen).
    pub fn insert_assignment(&self, assignment: InstructorAssignment) {
        self.lock().assignments.push(assignment);
    }

    /// Status changes driven by the instructor and school confirmation screens.
    pub fn set_assignment_status(
        &self,
        id: &AssignmentId,
        status: AssignmentStatus,
    ) -> Result<(), RepositoryError> {
        let mut state = self.lock();
        let assignment = state
            .assignments
            .iter_mut()
            .find(|assignment| &assignment.id == id)
            .ok_or(RepositoryError::NotFound)?;
        assignment.status = status;
        Ok(())
    }

    pub fn quotes_for(&self, request: &RequestId) -> Vec<Quote> {
        self.lock()
            .quotes
            .iter()
            .filter(|quote| &quote.request_id == request)
            .cloned()
            .collect()
    }

    pub fn assignments_for(&self, request: &RequestId) -> Vec<InstructorAssignment> {
        self.lock()
            .assignments
            .iter()
            .filter(|assignment| &assignment.request_id == request)
            .cloned()
            .collect()
    }

    pub fn payments(&self) -> Vec<Payment> {
        self.lock().payments.values().cloned().collect()
    }
}

impl DispatchRepository for InMemoryDispatchRepository {
    fn fetch_request(&self, id: &RequestId) -> Result<Option<SchoolRequest>, RepositoryError> {
        Ok(self.lock().requests.get(id).cloned())
    }

    fn list_instructors(&self) -> Result<Vec<Instructor>, RepositoryError> {
        Ok(self.lock().instructors.clone())
    }

    fn active_assignments_for_request(
        &self,
        id: &RequestId,
    ) -> Result<Vec<InstructorAssignment>, RepositoryError> {
        Ok(self
            .lock()
            .assignments
            .iter()
            .filter(|assignment| &assignment.request_id == id && assignment.status.is_active())
            .cloned()
            .collect())
    }

    fn assignments_for_instructor_on(
        &self,
        id: &InstructorId,
        date: NaiveDate,
    ) -> Result<Vec<InstructorAssignment>, RepositoryError> {
        Ok(self
            .lock()
            .assignments
            .iter()
            .filter(|assignment| {
                &assignment.instructor_id == id && assignment.scheduled_date == date
            })
            .cloned()
            .collect())
    }

    fn known_distance_km(
        &self,
        instructor: &InstructorId,
        school: &SchoolId,
    ) -> Result<Option<f64>, RepositoryError> {
        Ok(self
            .lock()
            .distances
            .get(&(instructor.clone(), school.clone()))
            .copied())
    }

    fn commit_automation(&self, commit: AutomationCommit) -> Result<(), RepositoryError> {
        let mut state = self.lock();

        let actual = state
            .requests
            .get(&commit.request_id)
            .map(|request| request.status)
            .ok_or(RepositoryError::NotFound)?;
        if actual != commit.expected_status {
            return Err(RepositoryError::StatusMismatch {
                expected: commit.expected_status,
                actual,
            });
        }

        if commit.assignment.is_some()
            && state.assignments.iter().any(|assignment| {
                assignment.request_id == commit.request_id && assignment.status.is_active()
            })
        {
            return Err(RepositoryError::ActiveAssignmentExists);
        }

        state.quotes.push(commit.quote);
        if let Some(assignment) = commit.assignment {
            state.assignments.push(assignment);
        }
        if let Some(request) = state.requests.get_mut(&commit.request_id) {
            request.status = commit.new_status;
        }
        Ok(())
    }

    fn fetch_assignment(
        &self,
        id: &AssignmentId,
    ) -> Result<Option<InstructorAssignment>, RepositoryError> {
        Ok(self
            .lock()
            .assignments
            .iter()
            .find(|assignment| &assignment.id == id)
            .cloned())
    }

    fn save_payment(&self, payment: Payment) -> Result<Payment, RepositoryError> {
        let mut state = self.lock();
        if state
            .payments
            .values()
            .any(|existing| existing.assignment_id == payment.assignment_id)
        {
            return Err(RepositoryError::Conflict);
        }
        state.payments.insert(payment.id.clone(), payment.clone());
        Ok(payment)
    }

    fn fetch_payment(&self, id: &PaymentId) -> Result<Option<Payment>, RepositoryError> {
        Ok(self.lock().payments.get(id).cloned())
    }

    fn update_payment(&self, payment: Payment) -> Result<(), RepositoryError> {
        let mut state = self.lock();
        match state.payments.get_mut(&payment.id) {
            Some(existing) => {
                *existing = payment;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }
}
