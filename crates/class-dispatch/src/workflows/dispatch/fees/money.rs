use serde::{Deserialize, Serialize};

const PPM: u128 = 1_000_000;

/// Percentage stored as parts-per-million so withholding and margin stay in integer math.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Rate {
    ppm: u32,
}

impl Rate {
    pub const ZERO: Rate = Rate { ppm: 0 };

    pub const fn from_ppm(ppm: u32) -> Self {
        Self { ppm }
    }

    /// Converts a fraction such as `0.033`. Callers validate the range beforehand.
    pub fn from_fraction(fraction: f64) -> Self {
        let ppm = (fraction * PPM as f64).round().clamp(0.0, u32::MAX as f64);
        Self { ppm: ppm as u32 }
    }

    pub const fn ppm(self) -> u32 {
        self.ppm
    }

    pub fn as_fraction(self) -> f64 {
        self.ppm as f64 / PPM as f64
    }

    /// `round(amount * rate)` with halves rounded up.
    pub fn apply_half_up(self, amount: u64) -> u64 {
        let scaled = amount as u128 * self.ppm as u128 + PPM / 2;
        (scaled / PPM).min(u64::MAX as u128) as u64
    }
}

/// Hard floor/ceiling applied to the pre-tax subtotal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeBounds {
    pub min: u64,
    pub max: u64,
}

impl FeeBounds {
    pub fn clamp(&self, amount: u64) -> u64 {
        amount.clamp(self.min, self.max)
    }

    pub fn apply(&self, amount: u64) -> (u64, ClampOutcome) {
        let clamped = self.clamp(amount);
        let outcome = if clamped > amount {
            ClampOutcome::RaisedToMin { from: amount }
        } else if clamped < amount {
            ClampOutcome::LoweredToMax { from: amount }
        } else {
            ClampOutcome::Unchanged
        };
        (clamped, outcome)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ClampOutcome {
    Unchanged,
    RaisedToMin { from: u64 },
    LoweredToMax { from: u64 },
}

/// Multiplies a won amount by a grade multiplier, rounding to the nearest won immediately.
pub fn apply_multiplier(amount: u64, multiplier: f64) -> u64 {
    let scaled = (amount as f64 * multiplier).round();
    if scaled <= 0.0 {
        0
    } else {
        scaled.min(u64::MAX as f64) as u64
    }
}
