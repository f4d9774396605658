use serde::{Deserialize, Serialize};

use super::FeeError;

/// Distance bands, right-closed: `[0,20], (20,40], (40,60], (60,80], (80,∞)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceBand {
    UpTo20,
    UpTo40,
    UpTo60,
    UpTo80,
    Over80,
}

impl DistanceBand {
    pub const fn ordered() -> [Self; 5] {
        [
            Self::UpTo20,
            Self::UpTo40,
            Self::UpTo60,
            Self::UpTo80,
            Self::Over80,
        ]
    }

    /// Suffix used by the `transport_*` settings keys.
    pub const fn key(self) -> &'static str {
        match self {
            Self::UpTo20 => "0_20",
            Self::UpTo40 => "20_40",
            Self::UpTo60 => "40_60",
            Self::UpTo80 => "60_80",
            Self::Over80 => "80_plus",
        }
    }

    pub fn from_key(raw: &str) -> Option<Self> {
        Self::ordered()
            .into_iter()
            .find(|band| band.key() == raw.trim())
    }

    pub fn for_distance(distance_km: f64) -> Self {
        if distance_km <= 20.0 {
            Self::UpTo20
        } else if distance_km <= 40.0 {
            Self::UpTo40
        } else if distance_km <= 60.0 {
            Self::UpTo60
        } else if distance_km <= 80.0 {
            Self::UpTo80
        } else {
            Self::Over80
        }
    }

    const fn index(self) -> usize {
        match self {
            Self::UpTo20 => 0,
            Self::UpTo40 => 1,
            Self::UpTo60 => 2,
            Self::UpTo80 => 3,
            Self::Over80 => 4,
        }
    }
}

/// Resolved transport fee. `NotComputed` is distinct from the lowest band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "source")]
pub enum TransportFee {
    Distance {
        distance_km: f64,
        band: DistanceBand,
        fee: u64,
    },
    DefaultBand {
        band: DistanceBand,
        fee: u64,
    },
    NotComputed,
}

impl TransportFee {
    pub fn amount(&self) -> u64 {
        match self {
            TransportFee::Distance { fee, .. } | TransportFee::DefaultBand { fee, .. } => *fee,
            TransportFee::NotComputed => 0,
        }
    }

    pub fn is_computed(&self) -> bool {
        !matches!(self, TransportFee::NotComputed)
    }

    pub fn distance_km(&self) -> Option<f64> {
        match self {
            TransportFee::Distance { distance_km, .. } => Some(*distance_km),
            _ => None,
        }
    }
}

/// Flat fee per distance band. Lookup only; monotonicity is a property of the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportFeeTable {
    fees: [u64; 5],
}

impl TransportFeeTable {
    /// Fees in band order, see [`DistanceBand::ordered`].
    pub fn new(fees: [u64; 5]) -> Self {
        Self { fees }
    }

    pub fn fee_for_band(&self, band: DistanceBand) -> u64 {
        self.fees[band.index()]
    }

    pub fn lookup(&self, distance_km: Option<f64>) -> Result<TransportFee, FeeError> {
        let Some(distance_km) = distance_km else {
            return Ok(TransportFee::NotComputed);
        };

        if !distance_km.is_finite() || distance_km < 0.0 {
            return Err(FeeError::Validation {
                field: "distance_km",
                reason: format!("must be a non-negative number of kilometers, got {distance_km}"),
            });
        }

        let band = DistanceBand::for_distance(distance_km);
        Ok(TransportFee::Distance {
            distance_km,
            band,
            fee: self.fee_for_band(band),
        })
    }

    pub fn lookup_band(&self, band: DistanceBand) -> TransportFee {
        TransportFee::DefaultBand {
            band,
            fee: self.fee_for_band(band),
        }
    }

    pub fn is_non_decreasing(&self) -> bool {
        self.fees.windows(2).all(|pair| pair[0] <= pair[1])
    }
}
