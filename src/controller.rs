//! Correction strategies. Each one maps the error on a single axis to a coarse step
//! count; pitch and roll are evaluated independently with the same rule.

use crate::config::{BalanceConfig, StrategyKind};
use crate::data::{Axis, MotorCommand, OrientationSample};

pub trait Strategy {
    fn name(&self) -> &'static str;

    /// Coarse step for an axis with error `e` degrees, or `None` for no command.
    fn correction(&self, e: f64) -> Option<i64>;

    /// Whether single-unit steps follow the coarse step until the axis is within tolerance.
    fn fine_convergence(&self) -> bool;

    /// At most one coarse command per axis, pitch first.
    fn decide(&self, sample: &OrientationSample) -> Vec<MotorCommand> {
        Axis::ALL
            .iter()
            .filter_map(|&axis| {
                self.correction(sample.error(axis))
                    .map(|steps| MotorCommand::coarse(axis, steps))
            })
            .collect()
    }
}

/// The reference band table, kept as it runs on the testbed: the 2-5 degree band
/// and the last band correct against the error, and the last band
/// (`e <= 1 || e >= -1`) catches every finite value the others missed.
#[derive(Debug, Clone, Copy, Default)]
pub struct TieredLiteral;

impl Strategy for TieredLiteral {
    fn name(&self) -> &'static str {
        "tiered-literal"
    }

    fn correction(&self, e: f64) -> Option<i64> {
        if e >= 10.0 {
            Some(500000)
        } else if e <= -10.0 {
            Some(-500000)
        } else if e >= 5.0 {
            Some(250000)
        } else if e <= -5.0 {
            Some(-250000)
        } else if e >= 2.0 {
            Some(-100000)
        } else if e <= -2.0 {
            Some(100000)
        } else if e <= 1.0 || e >= -1.0 {
            // zero error still takes the negative step
            Some(if e < 0.0 { 50000 } else { -50000 })
        } else {
            None
        }
    }

    fn fine_convergence(&self) -> bool {
        true
    }
}

/// Same bands with the sign always following the error and the small band limited
/// to `-1 <= e <= 1`. Errors between 1 and 2 degrees get no coarse step and are left
/// to the fine steps.
#[derive(Debug, Clone, Copy, Default)]
pub struct TieredSymmetric;

impl Strategy for TieredSymmetric {
    fn name(&self) -> &'static str {
        "tiered-symmetric"
    }

    fn correction(&self, e: f64) -> Option<i64> {
        let mag = e.abs();
        let steps = if mag >= 10.0 {
            500000
        } else if mag >= 5.0 {
            250000
        } else if mag >= 2.0 {
            100000
        } else if mag <= 1.0 && e != 0.0 {
            50000
        } else {
            return None;
        };
        Some(if e < 0.0 { -steps } else { steps })
    }

    fn fine_convergence(&self) -> bool {
        true
    }
}

/// `round(gain * e^3)` every cycle on both axes, no thresholds and no fine steps.
/// Rounding is half away from zero. A result of zero steps sends nothing.
#[derive(Debug, Clone, Copy)]
pub struct Cubic {
    pub gain: f64,
}

impl Strategy for Cubic {
    fn name(&self) -> &'static str {
        "cubic"
    }

    fn correction(&self, e: f64) -> Option<i64> {
        let steps = (self.gain * e.powi(3)).round();
        if steps.is_nan() || steps == 0.0 {
            return None;
        }
        // saturating cast, the actuator controller clamps to its own travel
        Some(steps as i64)
    }

    fn fine_convergence(&self) -> bool {
        false
    }
}

pub fn build_strategy(cfg: &BalanceConfig) -> Box<dyn Strategy + Send> {
    match cfg.strategy {
        StrategyKind::TieredLiteral => Box::new(TieredLiteral),
        StrategyKind::TieredSymmetric => Box::new(TieredSymmetric),
        StrategyKind::Cubic => Box::new(Cubic { gain: cfg.cubic_gain }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::StepProfile;
    use rstest::rstest;

    #[rstest]
    #[case(12.0, 500000)]
    #[case(10.0, 500000)]
    #[case(-10.0, -500000)]
    #[case(-45.0, -500000)]
    #[case(7.2, 250000)]
    #[case(5.0, 250000)]
    #[case(-9.99, -250000)]
    #[case(3.0, -100000)]
    #[case(-3.0, 100000)]
    #[case(1.5, -50000)]
    #[case(0.5, -50000)]
    #[case(0.0, -50000)]
    #[case(-0.5, 50000)]
    #[case(-1.5, 50000)]
    fn test_literal_table(#[case] e: f64, #[case] expected: i64) {
        assert_eq!(TieredLiteral.correction(e), Some(expected));
    }

    #[test]
    fn test_literal_small_errors_take_inverted_fifty_thousand() {
        for i in 1..100 {
            let e = i as f64 / 100.0;
            assert_eq!(TieredLiteral.correction(e), Some(-50000), "e = {}", e);
        }
    }

    #[test]
    fn test_literal_nan_falls_through() {
        assert_eq!(TieredLiteral.correction(f64::NAN), None);
    }

    #[rstest]
    #[case(12.0, Some(500000))]
    #[case(-12.0, Some(-500000))]
    #[case(7.2, Some(250000))]
    #[case(-7.2, Some(-250000))]
    #[case(3.0, Some(100000))]
    #[case(-3.0, Some(-100000))]
    #[case(1.5, None)]
    #[case(-1.5, None)]
    #[case(1.0, Some(50000))]
    #[case(-0.5, Some(-50000))]
    #[case(0.0, None)]
    fn test_symmetric_table(#[case] e: f64, #[case] expected: Option<i64>) {
        assert_eq!(TieredSymmetric.correction(e), expected);
    }

    #[test]
    fn test_symmetric_is_odd() {
        for i in -200..=200 {
            let e = i as f64 * 0.07;
            let pos = TieredSymmetric.correction(e);
            let neg = TieredSymmetric.correction(-e);
            assert_eq!(pos.map(|s| -s), neg, "e = {}", e);
        }
    }

    #[rstest]
    #[case(2.0, 4000)]
    #[case(-1.5, -1688)]
    #[case(0.1, 1)]
    #[case(-10.0, -500000)]
    fn test_cubic(#[case] e: f64, #[case] expected: i64) {
        assert_eq!(Cubic { gain: 500.0 }.correction(e), Some(expected));
    }

    #[test]
    fn test_cubic_small_error_sends_nothing() {
        assert_eq!(Cubic { gain: 500.0 }.correction(0.0), None);
        assert_eq!(Cubic { gain: 500.0 }.correction(0.05), None);
    }

    #[test]
    fn test_cubic_saturates() {
        assert_eq!(Cubic { gain: 500.0 }.correction(1e300), Some(i64::MAX));
        assert_eq!(Cubic { gain: 500.0 }.correction(f64::NAN), None);
    }

    #[test]
    fn test_decide_keeps_axes_independent() {
        let sample = OrientationSample::new(7.2, 0.0, 0.0);
        let cmds = Cubic { gain: 500.0 }.decide(&sample);
        assert_eq!(cmds, vec![MotorCommand::coarse(Axis::Pitch, 186624)]);

        let cmds = TieredSymmetric.decide(&sample);
        assert_eq!(cmds, vec![MotorCommand::coarse(Axis::Pitch, 250000)]);
        assert!(cmds.iter().all(|c| c.profile == StepProfile::Coarse));
    }

    #[test]
    fn test_decide_wire_output() {
        let cmds = TieredLiteral.decide(&OrientationSample::new(7.2, -0.5, 3.0));
        assert_eq!(cmds[0].to_wire(), "I250000,25600,9600,16000,320000,800000,490,122,490,490,50,8\r");
        assert_eq!(cmds[1], MotorCommand::coarse(Axis::Roll, 50000));
    }

    #[test]
    fn test_build_strategy() {
        let mut cfg = BalanceConfig::default();
        assert_eq!(build_strategy(&cfg).name(), "tiered-literal");
        cfg.strategy = StrategyKind::Cubic;
        let s = build_strategy(&cfg);
        assert_eq!(s.name(), "cubic");
        assert!(!s.fine_convergence());
    }
}
