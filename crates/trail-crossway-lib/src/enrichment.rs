//! Altitude lookup for intersection points

use crate::Result;

/// Batched elevation lookup
///
/// Implementations receive `(latitude, longitude)` pairs and must return one altitude
/// per input, in input order. Anything else is treated as an unavailable service.
#[cfg_attr(test, mockall::automock)]
pub trait AltitudeEnricher: Send + Sync {
    fn batch_lookup(&self, points: &[(f64, f64)]) -> Result<Vec<f64>>;
}

/// Enricher answering every lookup with the same altitude
///
/// Stands in for an elevation service when none is configured.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ConstantAltitudeEnricher {
    pub altitude: f64,
}

impl ConstantAltitudeEnricher {
    pub fn new(altitude: f64) -> Self {
        Self { altitude }
    }
}

impl AltitudeEnricher for ConstantAltitudeEnricher {
    fn batch_lookup(&self, points: &[(f64, f64)]) -> Result<Vec<f64>> {
        Ok(vec![self.altitude; points.len()])
    }
}
