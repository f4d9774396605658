use std::sync::Arc;

use chrono::{Days, Local, NaiveDate};
use tracing::{info, warn};

use super::budget::{fit_to_budget, BudgetFit, QuotePricing};
use super::{
    AutomationError, AutomationOptions, AutomationOutcome, HolidayCalendar, NoHolidays,
};
use crate::workflows::dispatch::domain::{
    AssignmentId, AssignmentStatus, InstructorAssignment, Quote, QuoteId, QuoteStatus, RequestId,
    RequestStatus,
};
use crate::workflows::dispatch::fees::{
    is_emergency, is_weekend, FeeCalculator, FeeInput, PaymentBreakdown,
};
use crate::workflows::dispatch::matching::{InstructorMatcher, RankedCandidate};
use crate::workflows::dispatch::repository::{
    AutomationCommit, DispatchRepository, RepositoryError,
};
use crate::workflows::dispatch::rules::{RuleConfig, RuleProvider};

/// Orchestrates matcher, calculator and budget fitting over one rule snapshot per call.
pub struct AutomationWorkflow<R> {
    repository: Arc<R>,
    rules: Arc<dyn RuleProvider>,
    holidays: Arc<dyn HolidayCalendar>,
}

impl<R> AutomationWorkflow<R>
where
    R: DispatchRepository + 'static,
{
    pub fn new(repository: Arc<R>, rules: Arc<dyn RuleProvider>) -> Self {
        Self {
            repository,
            rules,
            holidays: Arc::new(NoHolidays),
        }
    }

    pub fn with_holidays(mut self, holidays: Arc<dyn HolidayCalendar>) -> Self {
        self.holidays = holidays;
        self
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repository
    }

    pub fn rules(&self) -> Result<Arc<RuleConfig>, AutomationError> {
        Ok(self.rules.current()?)
    }

    /// Manual-assignment entry point: price a class from caller-supplied inputs.
    pub fn compute_fee(&self, input: &FeeInput) -> Result<PaymentBreakdown, AutomationError> {
        let calculator = FeeCalculator::new(self.rules()?);
        Ok(calculator.compute(input)?)
    }

    /// Manual-assignment entry point: ranked candidates for a stored request.
    pub fn rank_instructors(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<RankedCandidate>, AutomationError> {
        let request = self
            .repository
            .fetch_request(request_id)?
            .ok_or_else(|| AutomationError::RequestNotFound(request_id.0.clone()))?;
        let rules = self.rules()?;
        let pool = self.repository.list_instructors()?;
        Ok(InstructorMatcher::new(rules.subject_categories.clone()).rank(&request, &pool))
    }

    pub fn process(
        &self,
        request_id: &RequestId,
        options: AutomationOptions,
    ) -> Result<AutomationOutcome, AutomationError> {
        self.process_on(request_id, options, Local::now().date_naive())
    }

    /// Runs the automation as of `today`, which only anchors the quote validity window.
    pub fn process_on(
        &self,
        request_id: &RequestId,
        options: AutomationOptions,
        today: NaiveDate,
    ) -> Result<AutomationOutcome, AutomationError> {
        info!(
            request_id = request_id.0.as_str(),
            auto_assign = options.auto_assign,
            adjust_to_budget = options.adjust_to_budget,
            "automating school request"
        );

        let request = self
            .repository
            .fetch_request(request_id)?
            .ok_or_else(|| AutomationError::RequestNotFound(request_id.0.clone()))?;
        if !request.status.is_automatable() {
            if holds_assignment(request.status) {
                return Err(AutomationError::RequestAlreadyAssigned(request_id.0.clone()));
            }
            return Err(AutomationError::NotAutomatable {
                id: request_id.0.clone(),
                status: request.status,
            });
        }
        if !self
            .repository
            .active_assignments_for_request(request_id)?
            .is_empty()
        {
            return Err(AutomationError::RequestAlreadyAssigned(request_id.0.clone()));
        }

        let rules = self.rules()?;
        let pool = self.repository.list_instructors()?;
        let candidates =
            InstructorMatcher::new(rules.subject_categories.clone()).rank(&request, &pool);
        let instructor = candidates
            .first()
            .and_then(|top| pool.get(top.pool_position))
            .ok_or_else(|| AutomationError::NoEligibleInstructor(request_id.0.clone()))?;

        let distance_km = self
            .repository
            .known_distance_km(&instructor.id, &request.school.id)?;
        let classes_that_day = self
            .repository
            .assignments_for_instructor_on(&instructor.id, request.desired_date)?
            .iter()
            .filter(|assignment| assignment.status.is_active())
            .count();

        let input = FeeInput {
            distance_km,
            fallback_band: rules.default_transport_band,
            is_weekend: is_weekend(request.desired_date),
            is_holiday: self.holidays.is_holiday(request.desired_date),
            is_emergency: is_emergency(request.submitted_on, request.desired_date),
            daily_class_index: u32::try_from(classes_that_day)
                .unwrap_or(u32::MAX - 1)
                .saturating_add(1),
            ..FeeInput::new(
                request.session_count,
                instructor.instructor_type,
                instructor.grade,
            )
        };

        let calculator = FeeCalculator::new(Arc::clone(&rules));
        let breakdown = calculator.compute(&input)?;
        let material_cost = rules
            .quote
            .material_cost_per_student
            .saturating_mul(u64::from(request.student_count));
        let margin_rate = rules.quote.margin_rate;

        let fit = match request.budget {
            Some(budget) if options.adjust_to_budget => {
                fit_to_budget(&calculator, input, breakdown, material_cost, margin_rate, budget)
                    .inspect_err(|error| {
                        info!(request_id = request_id.0.as_str(), %error, "budget not reachable");
                    })?
            }
            _ => BudgetFit {
                pricing: QuotePricing::price(breakdown.subtotal, material_cost, margin_rate),
                input,
                breakdown,
                adjustments: Vec::new(),
            },
        };
        let over_budget = request
            .budget
            .is_some_and(|budget| fit.pricing.total > budget);

        let quote = Quote {
            id: QuoteId::generate(),
            request_id: request_id.clone(),
            instructor_id: instructor.id.clone(),
            session_fee: fit.breakdown.grade_adjusted_fee,
            transport_fee: fit.breakdown.transport_fee(),
            allowance_total: fit.breakdown.allowance_total,
            clamp_adjustment: fit.breakdown.clamp_adjustment(),
            material_cost: fit.pricing.material_cost,
            margin_rate: fit.pricing.margin_rate,
            margin: fit.pricing.margin,
            total: fit.pricing.total,
            valid_from: today,
            valid_until: today
                .checked_add_days(Days::new(u64::from(rules.quote.validity_days)))
                .unwrap_or(NaiveDate::MAX),
            status: QuoteStatus::Draft,
            breakdown: fit.breakdown.clone(),
        };

        let assignment = options.auto_assign.then(|| InstructorAssignment {
            id: AssignmentId::generate(),
            request_id: request_id.clone(),
            instructor_id: instructor.id.clone(),
            status: AssignmentStatus::Proposed,
            scheduled_date: request.desired_date,
            start_time: request.start_time,
            distance_km: fit.breakdown.transport.distance_km(),
            transport_fee: fit.breakdown.transport_fee(),
            breakdown: fit.breakdown.clone(),
        });

        let new_status = if assignment.is_some() {
            RequestStatus::Assigned
        } else {
            RequestStatus::Quoted
        };

        self.repository
            .commit_automation(AutomationCommit {
                request_id: request_id.clone(),
                expected_status: request.status,
                new_status,
                quote: quote.clone(),
                assignment: assignment.clone(),
            })
            .map_err(|error| commit_error(request_id, error))?;

        info!(
            request_id = request_id.0.as_str(),
            instructor_id = instructor.id.0.as_str(),
            total = quote.total,
            status = new_status.label(),
            adjustments = fit.adjustments.len(),
            "school request automated"
        );

        let message = match &assignment {
            Some(_) => format!("quoted {} and proposed {}", quote.total, instructor.name),
            None => format!("quoted {}", quote.total),
        };

        Ok(AutomationOutcome {
            success: true,
            message,
            request_id: request_id.clone(),
            request_status: new_status,
            instructor_id: instructor.id.clone(),
            candidates_considered: candidates.len(),
            quote,
            assignment,
            breakdown: fit.breakdown,
            adjustments: fit.adjustments,
            over_budget,
        })
    }
}

fn holds_assignment(status: RequestStatus) -> bool {
    matches!(
        status,
        RequestStatus::Assigned | RequestStatus::Confirmed | RequestStatus::Completed
    )
}

fn commit_error(request_id: &RequestId, error: RepositoryError) -> AutomationError {
    match error {
        RepositoryError::ActiveAssignmentExists => {
            AutomationError::RequestAlreadyAssigned(request_id.0.clone())
        }
        RepositoryError::StatusMismatch { actual, .. } if holds_assignment(actual) => {
            AutomationError::RequestAlreadyAssigned(request_id.0.clone())
        }
        RepositoryError::StatusMismatch { actual, .. } => AutomationError::ConcurrencyConflict {
            id: request_id.0.clone(),
            actual,
        },
        RepositoryError::NotFound => AutomationError::RequestNotFound(request_id.0.clone()),
        other => {
            warn!(request_id = request_id.0.as_str(), error = %other, "automation commit failed");
            AutomationError::Repository(other)
        }
    }
}
