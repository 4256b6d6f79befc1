//! Half-band cascade designer
//!
//! Derives the per-stage specifications of a power-of-two oversampling chain
//! from a single attenuation/transition pair. Stage `i` runs at `2^(i+1)`
//! times the base rate; its transition band is widened so that every stage
//! keeps the base-rate passband while its own stopband only has to reach the
//! images left by the stage before it.

use crate::halfband;
use rf_core::{ContractViolation, RfError, RfResult, contract_violation};
use std::sync::OnceLock;

/// Default number of designed stages (factors up to 32x)
pub const DEFAULT_STAGE_COUNT: usize = rf_core::MAX_OVERSAMPLING_ORDER;

/// One half-band stage of the cascade.
#[derive(Debug, Clone)]
pub struct StageSpec {
    attenuation_db: f64,
    transition: f64,
    coefficients: OnceLock<Vec<f64>>,
}

impl StageSpec {
    pub fn new(attenuation_db: f64, transition: f64) -> Self {
        Self {
            attenuation_db,
            transition,
            coefficients: OnceLock::new(),
        }
    }

    #[inline]
    pub fn attenuation_db(&self) -> f64 {
        self.attenuation_db
    }

    /// Transition bandwidth normalised to the stage output rate
    #[inline]
    pub fn transition(&self) -> f64 {
        self.transition
    }

    /// Allpass coefficients, synthesised on first access.
    pub fn coefficients(&self) -> &[f64] {
        self.coefficients
            .get_or_init(|| halfband::compute_coefficients(self.attenuation_db, self.transition))
    }

    pub fn coefficient_count(&self) -> usize {
        self.coefficients().len()
    }

    /// Group delay in samples of the stage output rate.
    pub fn group_delay(&self, freq: f64) -> f64 {
        halfband::group_delay(self.coefficients(), freq)
    }
}

/// Cascade of half-band stage specs.
#[derive(Debug, Clone)]
pub struct OversamplingDesigner {
    stages: Vec<StageSpec>,
}

impl OversamplingDesigner {
    /// `transition` is the base transition band of stage 0, normalised to its
    /// output rate.
    pub fn new(attenuation_db: f64, transition: f64, stage_count: usize) -> RfResult<Self> {
        if !(attenuation_db > 0.0 && attenuation_db.is_finite()) {
            return Err(RfError::InvalidParam(format!(
                "attenuation must be positive, got {attenuation_db}"
            )));
        }
        if !(transition > 0.0 && transition < 0.5) {
            return Err(RfError::InvalidParam(format!(
                "transition must lie in ]0, 0.5[, got {transition}"
            )));
        }
        if stage_count == 0 {
            return Err(RfError::InvalidParam("stage count must be at least 1".into()));
        }

        let mut stages = Vec::with_capacity(stage_count);
        let mut tb = transition;
        for _ in 0..stage_count {
            stages.push(StageSpec::new(attenuation_db, tb));
            tb = 0.5 * (0.5 + tb);
        }
        Ok(Self { stages })
    }

    #[inline]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    #[inline]
    pub fn stage(&self, index: usize) -> &StageSpec {
        &self.stages[index]
    }

    #[inline]
    pub fn stages(&self) -> &[StageSpec] {
        &self.stages
    }

    /// Cascade group delay in base-rate samples for the first `order` stages.
    ///
    /// Stage `i` delays by `gd_i` samples of its own output rate, which is
    /// `2^(i+1)` times the base rate.
    pub fn group_delay(&self, freq: f64, order: usize) -> RfResult<f64> {
        if order > self.stages.len() {
            return Err(contract_violation(ContractViolation::OrderOutOfRange {
                order,
                max: self.stages.len(),
            }));
        }
        let mut scale = 0.5;
        let mut delay = 0.0;
        for stage in &self.stages[..order] {
            delay += scale * stage.group_delay(freq);
            scale *= 0.5;
        }
        Ok(delay)
    }

    pub fn min_group_delay(&self, order: usize) -> RfResult<f64> {
        self.group_delay(0.0, order)
    }

    pub fn max_group_delay(&self, order: usize) -> RfResult<f64> {
        self.group_delay(0.25, order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_transition_recurrence() {
        let d = OversamplingDesigner::new(100.0, 0.1, 5).unwrap();
        let expected = [0.1, 0.3, 0.4, 0.45, 0.475];
        for (stage, &tb) in d.stages().iter().zip(&expected) {
            assert_relative_eq!(stage.transition(), tb, epsilon = 1e-12);
            assert_eq!(stage.attenuation_db(), 100.0);
        }
    }

    #[test]
    fn test_later_stages_are_cheaper() {
        let d = OversamplingDesigner::new(100.0, 0.1, 5).unwrap();
        let counts: Vec<usize> = d.stages().iter().map(StageSpec::coefficient_count).collect();
        assert_eq!(counts[0], 6);
        assert!(counts.windows(2).all(|w| w[0] >= w[1]));
        assert!(counts.iter().all(|&c| c >= 1));
    }

    #[test]
    fn test_group_delay_grows_with_order() {
        let d = OversamplingDesigner::new(100.0, 0.1, 5).unwrap();
        assert_eq!(d.min_group_delay(0).unwrap(), 0.0);
        let mut prev = 0.0;
        for order in 1..=5 {
            let gd = d.min_group_delay(order).unwrap();
            assert!(gd > prev, "order {order}: {gd} <= {prev}");
            assert!(d.max_group_delay(order).unwrap() > gd);
            prev = gd;
        }
        // First stage alone: half of its own-rate delay
        assert_relative_eq!(
            d.min_group_delay(1).unwrap(),
            0.5 * d.stage(0).group_delay(0.0),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_rejects_invalid_parameters() {
        assert!(matches!(
            OversamplingDesigner::new(0.0, 0.1, 5),
            Err(RfError::InvalidParam(_))
        ));
        assert!(OversamplingDesigner::new(100.0, 0.5, 5).is_err());
        assert!(OversamplingDesigner::new(100.0, 0.0, 5).is_err());
        assert!(OversamplingDesigner::new(100.0, 0.1, 0).is_err());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "contract violation")]
    fn test_order_beyond_stage_count_panics_in_debug() {
        let d = OversamplingDesigner::new(100.0, 0.1, 3).unwrap();
        let _ = d.min_group_delay(4);
    }

    #[test]
    #[cfg(not(debug_assertions))]
    fn test_order_beyond_stage_count_errors_in_release() {
        let d = OversamplingDesigner::new(100.0, 0.1, 3).unwrap();
        assert!(matches!(
            d.min_group_delay(4),
            Err(RfError::Contract(ContractViolation::OrderOutOfRange { order: 4, max: 3 }))
        ));
    }
}
