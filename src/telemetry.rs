//! Sensor capability and the telemetry reader the driver pulls samples through.

use std::time::{Duration, Instant};

use log::warn;

use crate::data::{OrientationSample, RateSample};
use crate::error::{BalanceError, Result};

/// Anything that can report the platform attitude. Each call is a fresh blocking
/// query of the hardware; implementations must not cache.
///
/// Implementations must bound their own blocking: [`TelemetryReader`] can only judge
/// a read once it returns, so a call that never returns stalls the driver.
pub trait Sensor {
    fn read_orientation(&mut self) -> Result<OrientationSample>;
    fn read_rates(&mut self) -> Result<RateSample>;
}

impl<S: Sensor + ?Sized> Sensor for Box<S> {
    fn read_orientation(&mut self) -> Result<OrientationSample> {
        (**self).read_orientation()
    }

    fn read_rates(&mut self) -> Result<RateSample> {
        (**self).read_rates()
    }
}

/// Wraps a [`Sensor`] with a per-read deadline and value checks. No retries: a
/// failed read is handed straight back to the driver. The deadline is checked after
/// the read returns, so a late sample is rejected rather than interrupted.
pub struct TelemetryReader<S> {
    sensor: S,
    deadline: Duration,
}

impl<S: Sensor> TelemetryReader<S> {
    pub fn new(sensor: S, deadline: Duration) -> Self {
        TelemetryReader { sensor, deadline }
    }

    pub fn read_orientation(&mut self) -> Result<OrientationSample> {
        let start = Instant::now();
        let sample = self.sensor.read_orientation()?;
        self.check_deadline(start, "orientation")?;
        if !sample.is_finite() {
            warn!("discarding non-finite orientation {:?}", sample);
            return Err(BalanceError::sensor("non-finite orientation reading"));
        }
        Ok(sample)
    }

    pub fn read_rates(&mut self) -> Result<RateSample> {
        let start = Instant::now();
        let sample = self.sensor.read_rates()?;
        self.check_deadline(start, "angular rate")?;
        if !sample.is_finite() {
            warn!("discarding non-finite rates {:?}", sample);
            return Err(BalanceError::sensor("non-finite angular rate reading"));
        }
        Ok(sample)
    }

    fn check_deadline(&self, start: Instant, what: &str) -> Result<()> {
        let elapsed = start.elapsed();
        if elapsed > self.deadline {
            return Err(BalanceError::sensor(format!(
                "{} read took {:?}, deadline is {:?}",
                what, elapsed, self.deadline
            )));
        }
        Ok(())
    }

    pub fn into_inner(self) -> S {
        self.sensor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    struct Fixed {
        orientation: OrientationSample,
        delay: Duration,
    }

    impl Sensor for Fixed {
        fn read_orientation(&mut self) -> Result<OrientationSample> {
            thread::sleep(self.delay);
            Ok(self.orientation)
        }

        fn read_rates(&mut self) -> Result<RateSample> {
            Err(BalanceError::sensor("link disconnected"))
        }
    }

    #[test]
    fn test_passes_sample_through() {
        let mut reader = TelemetryReader::new(
            Fixed { orientation: OrientationSample::new(1.5, -2.0, 90.0), delay: Duration::ZERO },
            Duration::from_secs(1),
        );
        assert_eq!(reader.read_orientation().unwrap(), OrientationSample::new(1.5, -2.0, 90.0));
    }

    #[test]
    fn test_sensor_error_propagates() {
        let mut reader = TelemetryReader::new(
            Fixed { orientation: OrientationSample::default(), delay: Duration::ZERO },
            Duration::from_secs(1),
        );
        assert!(matches!(reader.read_rates(), Err(BalanceError::SensorUnavailable(_))));
    }

    #[test]
    fn test_slow_read_misses_deadline() {
        let mut reader = TelemetryReader::new(
            Fixed { orientation: OrientationSample::default(), delay: Duration::from_millis(30) },
            Duration::from_millis(5),
        );
        assert!(matches!(reader.read_orientation(), Err(BalanceError::SensorUnavailable(_))));
    }

    #[test]
    fn test_rejects_nan() {
        let mut reader = TelemetryReader::new(
            Fixed { orientation: OrientationSample::new(f64::NAN, 0.0, 0.0), delay: Duration::ZERO },
            Duration::from_secs(1),
        );
        assert!(reader.read_orientation().is_err());
    }
}
