use std::sync::Arc;

use tracing::{info, warn};

use super::domain::{AssignmentId, AssignmentStatus, Payment, PaymentId, PaymentStatus};
use super::repository::{DispatchRepository, RepositoryError};

/// Instructor payments derived from the breakdown stored on each assignment.
pub struct PaymentLedger<R> {
    repository: Arc<R>,
}

impl<R> PaymentLedger<R>
where
    R: DispatchRepository + 'static,
{
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }

    /// Settles the stored breakdown with `bonus` and `deductions` into a `Calculated` payment.
    /// The rule set is not consulted again, so later settings edits never change the amount.
    pub fn calculate(
        &self,
        assignment_id: &AssignmentId,
        bonus: u64,
        deductions: u64,
    ) -> Result<Payment, PaymentError> {
        let assignment = self
            .repository
            .fetch_assignment(assignment_id)?
            .ok_or_else(|| PaymentError::AssignmentNotFound(assignment_id.0.clone()))?;
        if !matches!(
            assignment.status,
            AssignmentStatus::Confirmed | AssignmentStatus::Completed
        ) {
            return Err(PaymentError::AssignmentNotPayable {
                id: assignment_id.0.clone(),
                status: assignment.status,
            });
        }

        let settled = assignment.breakdown.settle(bonus, deductions);
        let payment = Payment {
            id: PaymentId::generate(),
            assignment_id: assignment.id.clone(),
            instructor_id: assignment.instructor_id.clone(),
            session_fee: settled.grade_adjusted_fee,
            transport_fee: settled.transport_fee(),
            allowance_total: settled.allowance_total,
            clamp_adjustment: settled.clamp_adjustment(),
            bonus,
            deductions,
            subtotal: settled.subtotal,
            tax_withholding: settled.tax_withholding,
            net_amount: settled.net_amount,
            floored_to_zero: settled.floored_to_zero,
            status: PaymentStatus::Calculated,
        };

        let stored = self
            .repository
            .save_payment(payment)
            .map_err(|error| match error {
                RepositoryError::Conflict => {
                    PaymentError::AlreadyCalculated(assignment_id.0.clone())
                }
                other => PaymentError::Repository(other),
            })?;
        info!(
            payment_id = stored.id.0.as_str(),
            assignment_id = assignment_id.0.as_str(),
            net_amount = stored.net_amount,
            "payment calculated"
        );
        Ok(stored)
    }

    pub fn transition(
        &self,
        payment_id: &PaymentId,
        target: PaymentStatus,
    ) -> Result<Payment, PaymentError> {
        let mut payment = self.get(payment_id)?;

        if payment.status == PaymentStatus::Paid {
            return Err(PaymentError::Immutable(payment_id.0.clone()));
        }
        if !payment.status.can_transition_to(target) {
            return Err(PaymentError::InvalidTransition {
                from: payment.status,
                to: target,
            });
        }
        if target == PaymentStatus::Approved && payment.floored_to_zero {
            warn!(
                payment_id = payment_id.0.as_str(),
                "approving payment whose net amount was floored to zero"
            );
        }

        let from = payment.status;
        payment.status = target;
        self.repository.update_payment(payment.clone())?;
        info!(
            payment_id = payment_id.0.as_str(),
            from = from.label(),
            to = target.label(),
            "payment status changed"
        );
        Ok(payment)
    }

    pub fn get(&self, payment_id: &PaymentId) -> Result<Payment, PaymentError> {
        self.repository
            .fetch_payment(payment_id)?
            .ok_or_else(|| PaymentError::NotFound(payment_id.0.clone()))
    }
}

/// Error raised by the payment ledger.
#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("payment {0} not found")]
    NotFound(String),
    #[error("assignment {0} not found")]
    AssignmentNotFound(String),
    #[error("assignment {id} is {} and cannot be paid yet", .status.label())]
    AssignmentNotPayable {
        id: String,
        status: AssignmentStatus,
    },
    #[error("assignment {0} already has a payment")]
    AlreadyCalculated(String),
    #[error("payment {0} is paid and can no longer change")]
    Immutable(String),
    #[error("payment cannot move from {} to {}", .from.label(), .to.label())]
    InvalidTransition {
        from: PaymentStatus,
        to: PaymentStatus,
    },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
