use crate::infra::{public_holidays, rule_handles, seeded_repository};
use chrono::{Datelike, Local, NaiveDate, Utc};
use clap::Args;
use class_dispatch::config::{AppConfig, RulesConfig};
use class_dispatch::error::AppError;
use class_dispatch::security::LoginRateLimiter;
use class_dispatch::workflows::dispatch::fees::{DistanceBand, FeeWarning};
use class_dispatch::workflows::dispatch::{
    AssignmentStatus, AutomationError, AutomationOptions, AutomationOutcome, AutomationWorkflow,
    BudgetAdjustment, FeeCalculator, FeeInput, GradeKey, PaymentBreakdown, PaymentError,
    PaymentLedger, PaymentStatus, RequestId, RuleProvider,
};
use std::path::PathBuf;
use std::sync::Arc;

const DEMO_REQUESTS: [&str; 3] = ["req-robotics", "req-lab", "req-art"];
const DEMO_CLIENT: &str = "203.0.113.7";

#[derive(Args, Debug)]
pub(crate) struct FeeComputeArgs {
    /// Number of sessions in the class
    #[arg(long)]
    pub(crate) sessions: u32,
    /// Instructor grade key, e.g. internal_level2 or external_basic
    #[arg(long, value_parser = crate::infra::parse_grade)]
    pub(crate) grade: GradeKey,
    /// Instructor-to-school distance in kilometres
    #[arg(long)]
    pub(crate) distance_km: Option<f64>,
    /// Transport band to price with when the distance is unknown (e.g. 20_40)
    #[arg(long, value_parser = crate::infra::parse_band)]
    pub(crate) band: Option<DistanceBand>,
    #[arg(long)]
    pub(crate) weekend: bool,
    #[arg(long)]
    pub(crate) holiday: bool,
    /// Class requested at short notice
    #[arg(long)]
    pub(crate) emergency: bool,
    /// Position of this class among the instructor's classes that day
    #[arg(long, default_value_t = 1)]
    pub(crate) daily_class_index: u32,
    #[arg(long, default_value_t = 0)]
    pub(crate) bonus: u64,
    #[arg(long, default_value_t = 0)]
    pub(crate) deductions: u64,
    /// Settings CSV export to price with instead of APP_RULES_PATH
    #[arg(long)]
    pub(crate) rules: Option<PathBuf>,
    /// Print the breakdown as JSON
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Date the demo requests are submitted on (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) today: Option<NaiveDate>,
    /// Settings CSV export to price with instead of the built-in rules
    #[arg(long)]
    pub(crate) rules: Option<PathBuf>,
    /// Stop after assignment; skip payment settlement.
    #[arg(long)]
    pub(crate) skip_payment: bool,
}

pub(crate) fn run_fee_compute(args: FeeComputeArgs) -> Result<(), AppError> {
    let FeeComputeArgs {
        sessions,
        grade,
        distance_km,
        band,
        weekend,
        holiday,
        emergency,
        daily_class_index,
        bonus,
        deductions,
        rules,
        json,
    } = args;

    let mut rules_config = AppConfig::load()?.rules;
    if rules.is_some() {
        rules_config.settings_path = rules;
    }
    let config = rule_handles(&rules_config).provider.current()?;

    let input = FeeInput {
        distance_km,
        fallback_band: band,
        is_weekend: weekend,
        is_holiday: holiday,
        is_emergency: emergency,
        daily_class_index,
        bonus,
        deductions,
        ..FeeInput::new(sessions, grade.instructor_type(), grade)
    };
    let breakdown = FeeCalculator::new(config).compute(&input)?;

    if json {
        let rendered = serde_json::to_string_pretty(&breakdown).map_err(std::io::Error::from)?;
        println!("{rendered}");
    } else {
        render_breakdown(&breakdown);
    }
    Ok(())
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        today,
        rules,
        skip_payment,
    } = args;

    let today = today.unwrap_or_else(|| Local::now().date_naive());
    let rules_config = RulesConfig {
        settings_path: rules,
    };
    let handles = rule_handles(&rules_config);
    let repository = seeded_repository(today);
    let workflow = AutomationWorkflow::new(Arc::clone(&repository), handles.provider)
        .with_holidays(Arc::new(public_holidays(today.year()..=today.year() + 1)));

    println!("Class dispatch demo (requests submitted {today})");

    let options = AutomationOptions {
        auto_assign: true,
        adjust_to_budget: true,
    };
    let mut assigned = Vec::new();
    for request_id in DEMO_REQUESTS {
        let request_id = RequestId(request_id.to_string());
        let candidates = workflow.rank_instructors(&request_id)?;
        println!(
            "\nRequest {} | {} candidate(s)",
            request_id.0,
            candidates.len()
        );
        for candidate in &candidates {
            println!(
                "  {}. {} | region match: {} | subjects: {}",
                candidate.rank,
                candidate.instructor_name,
                yes_no(candidate.region_match),
                candidate.matched_subjects.join(", ")
            );
        }

        match workflow.process_on(&request_id, options, today) {
            Ok(outcome) => {
                render_outcome(&outcome);
                assigned.extend(outcome.assignment);
            }
            Err(
                err @ (AutomationError::BudgetInfeasible { .. }
                | AutomationError::NoEligibleInstructor(_)),
            ) => println!("  automation declined: {err}"),
            Err(err) => return Err(err.into()),
        }
    }

    if !skip_payment {
        let ledger = PaymentLedger::new(Arc::clone(&repository));
        println!("\nPayment settlement");
        for assignment in &assigned {
            repository
                .set_assignment_status(&assignment.id, AssignmentStatus::Completed)
                .map_err(PaymentError::from)?;
            let payment = ledger.calculate(&assignment.id, 0, 0)?;
            for status in [
                PaymentStatus::Approved,
                PaymentStatus::Processing,
                PaymentStatus::Paid,
            ] {
                ledger.transition(&payment.id, status)?;
            }
            println!(
                "- {} | gross {} | withholding {} | net {} | {}",
                payment.instructor_id.0,
                format_won(payment.subtotal),
                format_won(payment.tax_withholding),
                format_won(payment.net_amount),
                ledger.get(&payment.id)?.status.label()
            );
        }
    }

    render_login_throttle();
    Ok(())
}

fn render_outcome(outcome: &AutomationOutcome) {
    let quote = &outcome.quote;
    println!(
        "  -> {} | quote {} (session {} + transport {} + allowances {} + materials {} + margin {}) valid until {}",
        outcome.instructor_id.0,
        format_won(quote.total),
        format_won(quote.session_fee.saturating_add_signed(quote.clamp_adjustment)),
        format_won(quote.transport_fee),
        format_won(quote.allowance_total),
        format_won(quote.material_cost),
        format_won(quote.margin),
        quote.valid_until
    );
    for adjustment in &outcome.adjustments {
        match adjustment {
            BudgetAdjustment::AllowanceWaived {
                allowance,
                amount,
                total_after,
            } => println!(
                "     waived {} allowance ({}), total now {}",
                allowance.key(),
                format_won(*amount),
                format_won(*total_after)
            ),
            BudgetAdjustment::MarginReduced {
                from,
                to,
                total_after,
            } => println!(
                "     margin cut from {} to {}, total now {}",
                format_won(*from),
                format_won(*to),
                format_won(*total_after)
            ),
        }
    }
    if outcome.over_budget {
        println!("     quote exceeds the school's budget");
    }
    println!("     request is now {}", outcome.request_status.label());
}

fn render_breakdown(breakdown: &PaymentBreakdown) {
    println!(
        "Fee breakdown: {} session(s) | {}",
        breakdown.sessions, breakdown.grade_name
    );
    for step in &breakdown.steps {
        println!(
            "  {:<18}{:>12}  {}",
            step.stage.label(),
            format_won(step.amount),
            step.notes
        );
    }
    for warning in &breakdown.warnings {
        println!("  ! {}", describe_warning(warning));
    }
}

fn render_login_throttle() {
    let limiter = LoginRateLimiter::default();
    let now = Utc::now();

    println!("\nLogin throttling for {DEMO_CLIENT}");
    for attempt in 1..=5 {
        let decision = limiter.record_at(DEMO_CLIENT, false, now);
        println!(
            "- failed attempt {attempt}: {} attempt(s) left",
            decision.remaining_attempts
        );
    }
    let decision = limiter.check_at(DEMO_CLIENT, now);
    match decision.blocked_until {
        Some(until) if !decision.allowed => {
            println!("- next attempt refused until {}", until.format("%H:%M:%S UTC"))
        }
        _ => println!("- next attempt allowed"),
    }
}

fn describe_warning(warning: &FeeWarning) -> String {
    match warning {
        FeeWarning::TransportNotComputed => {
            "transport fee not computed; distance unknown and no fallback band".to_string()
        }
        FeeWarning::SessionFeeFallback { requested, matched } => {
            format!("no {requested}-session tier; priced with the {matched}-session fee")
        }
        FeeWarning::NetFlooredToZero { shortfall } => format!(
            "deductions exceed the payable amount by {}; net floored to zero",
            format_won(*shortfall)
        ),
    }
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

fn format_won(amount: u64) -> String {
    let digits = amount.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (index, digit) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    grouped.push('원');
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn won_amounts_are_grouped_by_thousands() {
        assert_eq!(format_won(0), "0원");
        assert_eq!(format_won(999), "999원");
        assert_eq!(format_won(99_601), "99,601원");
        assert_eq!(format_won(1_250_000), "1,250,000원");
    }

    #[test]
    fn fallback_warning_names_both_tiers() {
        let text = describe_warning(&FeeWarning::SessionFeeFallback {
            requested: 3,
            matched: 2,
        });
        assert!(text.contains("3-session"));
        assert!(text.contains("2-session"));
    }

    #[test]
    fn demo_runs_end_to_end_on_builtin_rules() {
        let args = DemoArgs {
            today: NaiveDate::from_ymd_opt(2025, 3, 3),
            rules: None,
            skip_payment: false,
        };
        run_demo(args).expect("demo completes");
    }
}
