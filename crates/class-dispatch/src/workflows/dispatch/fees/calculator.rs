use std::sync::Arc;

use super::money::apply_multiplier;
use super::{
    AllowanceKind, AllowanceLine, ClampOutcome, FeeError, FeeInput, FeeStage, FeeStep,
    FeeWarning, NetAmount, PaymentBreakdown, TransportFee,
};
use crate::workflows::dispatch::rules::RuleConfig;

/// Stateless calculator over an immutable rule snapshot.
#[derive(Debug, Clone)]
pub struct FeeCalculator {
    rules: Arc<RuleConfig>,
}

impl FeeCalculator {
    pub fn new(rules: Arc<RuleConfig>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &RuleConfig {
        &self.rules
    }

    pub fn compute(&self, input: &FeeInput) -> Result<PaymentBreakdown, FeeError> {
        input.validate()?;

        let rules = &self.rules;
        let mut steps = Vec::with_capacity(8);
        let mut warnings = Vec::new();

        let session = rules.session_fees.lookup(input.sessions)?;
        let session_notes = if session.is_exact() {
            format!("{} session(s) at configured rate", session.requested)
        } else {
            warnings.push(FeeWarning::SessionFeeFallback {
                requested: session.requested,
                matched: session.matched,
            });
            format!(
                "{} session(s) priced at the {}-session rate",
                session.requested, session.matched
            )
        };
        steps.push(FeeStep {
            stage: FeeStage::BaseFee,
            amount: session.fee,
            notes: session_notes,
        });

        let grade = rules.grades.resolve(input.instructor_type, input.grade)?;
        let grade_adjusted_fee = apply_multiplier(session.fee, grade.multiplier);
        steps.push(FeeStep {
            stage: FeeStage::GradeMultiplier,
            amount: grade_adjusted_fee,
            notes: format!("{} x{:.2}", grade.name, grade.multiplier),
        });

        let transport = match (input.distance_km, input.fallback_band) {
            (Some(_), _) => rules.transport_fees.lookup(input.distance_km)?,
            (None, Some(band)) => rules.transport_fees.lookup_band(band),
            (None, None) => TransportFee::NotComputed,
        };
        let transport_notes = match &transport {
            TransportFee::Distance {
                distance_km, band, ..
            } => format!("{distance_km:.1} km in band {}", band.key()),
            TransportFee::DefaultBand { band, .. } => {
                format!("distance unknown, default band {}", band.key())
            }
            TransportFee::NotComputed => {
                warnings.push(FeeWarning::TransportNotComputed);
                "distance unknown, transport not computed".to_string()
            }
        };
        steps.push(FeeStep {
            stage: FeeStage::Transport,
            amount: transport.amount(),
            notes: transport_notes,
        });

        let allowances: Vec<AllowanceLine> = AllowanceKind::ordered()
            .into_iter()
            .filter(|kind| input.allowance_applies(*kind))
            .map(|kind| AllowanceLine {
                kind,
                amount: rules.allowances.amount(kind),
            })
            .collect();
        let allowance_total = allowances
            .iter()
            .fold(0u64, |total, line| total.saturating_add(line.amount));
        steps.push(FeeStep {
            stage: FeeStage::Allowances,
            amount: allowance_total,
            notes: allowance_notes(&allowances, &input.waived_allowances),
        });

        let unclamped_subtotal = grade_adjusted_fee
            .saturating_add(transport.amount())
            .saturating_add(allowance_total);
        steps.push(FeeStep {
            stage: FeeStage::Subtotal,
            amount: unclamped_subtotal,
            notes: "grade-adjusted fee + transport + allowances".to_string(),
        });

        let (subtotal, clamp) = rules.fee_bounds.apply(unclamped_subtotal);
        steps.push(FeeStep {
            stage: FeeStage::Clamp,
            amount: subtotal,
            notes: match clamp {
                ClampOutcome::Unchanged => format!(
                    "within [{}, {}]",
                    rules.fee_bounds.min, rules.fee_bounds.max
                ),
                ClampOutcome::RaisedToMin { from } => {
                    format!("raised from {from} to minimum {}", rules.fee_bounds.min)
                }
                ClampOutcome::LoweredToMax { from } => {
                    format!("lowered from {from} to maximum {}", rules.fee_bounds.max)
                }
            },
        });

        let tax_rate = rules.tax_withholding_rate;
        let tax_withholding = tax_rate.apply_half_up(subtotal);
        steps.push(FeeStep {
            stage: FeeStage::TaxWithholding,
            amount: tax_withholding,
            notes: format!("{:.2}% of {subtotal}", tax_rate.as_fraction() * 100.0),
        });

        let net = NetAmount::settle(subtotal, tax_withholding, input.bonus, input.deductions);
        if let Some(warning) = net.warning() {
            warnings.push(warning);
        }
        steps.push(net.step(input.bonus, input.deductions));

        Ok(PaymentBreakdown {
            sessions: session.requested,
            matched_session_count: session.matched,
            base_fee: session.fee,
            grade: grade.grade,
            grade_name: grade.name,
            multiplier: grade.multiplier,
            grade_adjusted_fee,
            transport,
            allowances,
            allowance_total,
            unclamped_subtotal,
            clamp,
            subtotal,
            tax_rate,
            tax_withholding,
            bonus: input.bonus,
            deductions: input.deductions,
            net_amount: net.amount,
            floored_to_zero: net.floored_to_zero(),
            warnings,
            steps,
        })
    }
}

fn allowance_notes(applied: &[AllowanceLine], waived: &[AllowanceKind]) -> String {
    let mut parts: Vec<String> = applied
        .iter()
        .map(|line| format!("{} {}", line.kind.key(), line.amount))
        .collect();
    parts.extend(waived.iter().map(|kind| format!("{} waived", kind.key())));

    if parts.is_empty() {
        "no special allowances".to_string()
    } else {
        parts.join(", ")
    }
}
