use serde::{Deserialize, Serialize};

use super::AutomationError;
use crate::workflows::dispatch::fees::{
    AllowanceKind, FeeCalculator, FeeInput, PaymentBreakdown, Rate,
};

/// Discretionary allowances, dropped in this order when a quote exceeds the school's budget.
/// Weekend and holiday pay are never waived.
pub const REDUCIBLE_ALLOWANCES: [AllowanceKind; 2] =
    [AllowanceKind::MultipleClasses, AllowanceKind::Emergency];

/// Quote totals layered over the instructor subtotal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotePricing {
    pub subtotal: u64,
    pub material_cost: u64,
    pub margin_rate: Rate,
    pub margin: u64,
    pub total: u64,
}

impl QuotePricing {
    pub fn price(subtotal: u64, material_cost: u64, margin_rate: Rate) -> Self {
        let margin = margin_rate.apply_half_up(subtotal);
        Self {
            subtotal,
            material_cost,
            margin_rate,
            margin,
            total: subtotal.saturating_add(material_cost).saturating_add(margin),
        }
    }

    /// Lowest total reachable without touching the subtotal.
    pub fn floor_total(&self) -> u64 {
        self.subtotal.saturating_add(self.material_cost)
    }

    fn with_margin(self, margin: u64) -> Self {
        Self {
            margin,
            total: self.floor_total().saturating_add(margin),
            ..self
        }
    }
}

/// One concession made to fit a budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum BudgetAdjustment {
    AllowanceWaived {
        allowance: AllowanceKind,
        amount: u64,
        total_after: u64,
    },
    MarginReduced {
        from: u64,
        to: u64,
        total_after: u64,
    },
}

#[derive(Debug, Clone)]
pub(crate) struct BudgetFit {
    pub(crate) input: FeeInput,
    pub(crate) breakdown: PaymentBreakdown,
    pub(crate) pricing: QuotePricing,
    pub(crate) adjustments: Vec<BudgetAdjustment>,
}

/// Waives discretionary allowances, then trims the margin, until the total fits `budget`.
/// The subtotal never drops below the configured minimum because every retry goes back
/// through the calculator's clamp.
pub(crate) fn fit_to_budget(
    calculator: &FeeCalculator,
    input: FeeInput,
    breakdown: PaymentBreakdown,
    material_cost: u64,
    margin_rate: Rate,
    budget: u64,
) -> Result<BudgetFit, AutomationError> {
    let mut fit = BudgetFit {
        pricing: QuotePricing::price(breakdown.subtotal, material_cost, margin_rate),
        input,
        breakdown,
        adjustments: Vec::new(),
    };

    for kind in REDUCIBLE_ALLOWANCES {
        if fit.pricing.total <= budget {
            break;
        }
        let Some(amount) = fit
            .breakdown
            .allowances
            .iter()
            .find(|line| line.kind == kind)
            .map(|line| line.amount)
        else {
            continue;
        };

        fit.input.waived_allowances.push(kind);
        fit.breakdown = calculator.compute(&fit.input)?;
        fit.pricing = QuotePricing::price(fit.breakdown.subtotal, material_cost, margin_rate);
        fit.adjustments.push(BudgetAdjustment::AllowanceWaived {
            allowance: kind,
            amount,
            total_after: fit.pricing.total,
        });
    }

    if fit.pricing.total > budget && fit.pricing.margin > 0 {
        let from = fit.pricing.margin;
        let to = budget.saturating_sub(fit.pricing.floor_total()).min(from);
        fit.pricing = fit.pricing.with_margin(to);
        fit.adjustments.push(BudgetAdjustment::MarginReduced {
            from,
            to,
            total_after: fit.pricing.total,
        });
    }

    if fit.pricing.total > budget {
        return Err(AutomationError::BudgetInfeasible {
            budget,
            minimum_total: fit.pricing.total,
        });
    }

    Ok(fit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn margin_rounds_half_up_on_the_subtotal() {
        let pricing = QuotePricing::price(101_000, 5_000, Rate::from_fraction(0.15));
        assert_eq!(pricing.margin, 15_150);
        assert_eq!(pricing.total, 121_150);
        assert_eq!(pricing.floor_total(), 106_000);
    }

    #[test]
    fn reduced_margin_keeps_floor() {
        let pricing = QuotePricing::price(100_000, 0, Rate::from_fraction(0.2)).with_margin(5_000);
        assert_eq!(pricing.total, 105_000);
        assert_eq!(pricing.subtotal, 100_000);
    }
}
