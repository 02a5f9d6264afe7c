use serde::{Serialize, Deserialize};
use std::time::Duration;

use crate::data::Axis;
use crate::error::{BalanceError, Result};

pub const SENSOR_PORT: &str = "/dev/ttyUSB1";
pub const SENSOR_BAUD: u32 = 115200;

pub const PITCH_MOTOR_PORT: &str = "/dev/ttyUSB0";
pub const ROLL_MOTOR_PORT: &str = "/dev/ttyUSB2";
pub const MOTOR_BAUD: u32 = 57600;
pub const MOTOR_TIMEOUT_MS: u64 = 2000;

pub const CYCLE_PAUSE_MS: u64 = 5000;
pub const FINE_STEP_PAUSE_MS: u64 = 5000;
pub const FINE_TOLERANCE_DEG: f64 = 0.000001;
pub const SENSOR_DEADLINE_MS: u64 = 2000;

// degrees -> steps, tied to the actuator's steps-per-degree calibration
pub const CUBIC_GAIN: f64 = 500.0;

pub const DEFAULT_TELEMETRY_URL: &str = "http://127.0.0.1:8080/telemetry";

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Default)]
pub enum StrategyKind {
    #[default]
    TieredLiteral,
    TieredSymmetric,
    Cubic,
}

impl std::str::FromStr for StrategyKind {
    type Err = BalanceError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "tiered" | "tiered-literal" => Ok(StrategyKind::TieredLiteral),
            "symmetric" | "tiered-symmetric" => Ok(StrategyKind::TieredSymmetric),
            "cubic" => Ok(StrategyKind::Cubic),
            other => Err(BalanceError::config(format!("unknown strategy {:?}", other))),
        }
    }
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct BalanceConfig {
    pub sensor_port: String,
    pub sensor_baud: u32,
    pub pitch_port: String,
    pub roll_port: String,
    pub motor_baud: u32,
    pub motor_timeout_ms: u64,

    pub strategy: StrategyKind,
    pub cubic_gain: f64,
    pub cycle_pause_ms: u64,
    pub fine_pause_ms: u64,
    pub fine_tolerance: f64,
    pub fine_step_limit: Option<u32>, // per axis per cycle, None = until converged or stopped
    pub sensor_deadline_ms: u64,

    pub pitch_sign: i64, // +1 or -1, flips the mounting direction of an actuator
    pub roll_sign: i64,

    pub telemetry_url: Option<String>,
}

impl Default for BalanceConfig {
    fn default() -> Self {
        BalanceConfig {
            sensor_port: SENSOR_PORT.to_string(),
            sensor_baud: SENSOR_BAUD,
            pitch_port: PITCH_MOTOR_PORT.to_string(),
            roll_port: ROLL_MOTOR_PORT.to_string(),
            motor_baud: MOTOR_BAUD,
            motor_timeout_ms: MOTOR_TIMEOUT_MS,
            strategy: StrategyKind::default(),
            cubic_gain: CUBIC_GAIN,
            cycle_pause_ms: CYCLE_PAUSE_MS,
            fine_pause_ms: FINE_STEP_PAUSE_MS,
            fine_tolerance: FINE_TOLERANCE_DEG,
            fine_step_limit: None,
            sensor_deadline_ms: SENSOR_DEADLINE_MS,
            pitch_sign: 1,
            roll_sign: 1,
            telemetry_url: None,
        }
    }
}

fn parse_num<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse::<T>()
        .map_err(|_| BalanceError::config(format!("{} expects a number, got {:?}", key, value)))
}

fn parse_sign(key: &str, value: &str) -> Result<i64> {
    match value {
        "1" | "+1" | "+" => Ok(1),
        "-1" | "-" => Ok(-1),
        _ => Err(BalanceError::config(format!("{} must be +1 or -1, got {:?}", key, value))),
    }
}

impl BalanceConfig {
    /// Builds a config from `--key value` pairs layered over the defaults.
    /// `args` excludes the program name.
    pub fn from_args<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut cfg = BalanceConfig::default();
        let mut iter = args.into_iter();
        while let Some(arg) = iter.next() {
            let key = arg.as_ref().to_string();
            // flags without a value
            if key == "--publish" {
                cfg.telemetry_url = Some(DEFAULT_TELEMETRY_URL.to_string());
                continue;
            }
            let value = match iter.next() {
                Some(v) => v.as_ref().to_string(),
                None => return Err(BalanceError::config(format!("{} is missing a value", key))),
            };
            match key.as_str() {
                "--sensor-port" => cfg.sensor_port = value,
                "--sensor-baud" => cfg.sensor_baud = parse_num(&key, &value)?,
                "--pitch-port" => cfg.pitch_port = value,
                "--roll-port" => cfg.roll_port = value,
                "--motor-baud" => cfg.motor_baud = parse_num(&key, &value)?,
                "--strategy" => cfg.strategy = value.parse()?,
                "--gain" => cfg.cubic_gain = parse_num(&key, &value)?,
                "--cycle-pause-ms" => cfg.cycle_pause_ms = parse_num(&key, &value)?,
                "--fine-pause-ms" => cfg.fine_pause_ms = parse_num(&key, &value)?,
                "--fine-tolerance" => cfg.fine_tolerance = parse_num(&key, &value)?,
                "--fine-step-limit" => cfg.fine_step_limit = Some(parse_num(&key, &value)?),
                "--sensor-deadline-ms" => cfg.sensor_deadline_ms = parse_num(&key, &value)?,
                "--pitch-sign" => cfg.pitch_sign = parse_sign(&key, &value)?,
                "--roll-sign" => cfg.roll_sign = parse_sign(&key, &value)?,
                "--telemetry-url" => cfg.telemetry_url = Some(value),
                _ => return Err(BalanceError::config(format!("unknown option {}", key))),
            }
        }
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, port) in [
            ("sensor port", &self.sensor_port),
            ("pitch motor port", &self.pitch_port),
            ("roll motor port", &self.roll_port),
        ] {
            if port.trim().is_empty() {
                return Err(BalanceError::config(format!("{} is empty", name)));
            }
        }
        if self.pitch_port == self.roll_port {
            return Err(BalanceError::config("pitch and roll motors share one port"));
        }
        if self.sensor_baud == 0 || self.motor_baud == 0 {
            return Err(BalanceError::config("baud rate must be positive"));
        }
        if !self.cubic_gain.is_finite() {
            return Err(BalanceError::config("gain must be finite"));
        }
        if !(self.fine_tolerance.is_finite() && self.fine_tolerance >= 0.0) {
            return Err(BalanceError::config("fine tolerance must be a non-negative number"));
        }
        if self.sensor_deadline_ms == 0 {
            return Err(BalanceError::config("sensor deadline must be positive"));
        }
        Ok(())
    }

    pub fn sign(&self, axis: Axis) -> i64 {
        match axis {
            Axis::Pitch => self.pitch_sign,
            Axis::Roll => self.roll_sign,
        }
    }

    pub fn cycle_pause(&self) -> Duration {
        Duration::from_millis(self.cycle_pause_ms)
    }

    pub fn fine_pause(&self) -> Duration {
        Duration::from_millis(self.fine_pause_ms)
    }

    pub fn sensor_deadline(&self) -> Duration {
        Duration::from_millis(self.sensor_deadline_ms)
    }

    pub fn motor_timeout(&self) -> Duration {
        Duration::from_millis(self.motor_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_defaults_match_testbed_wiring() {
        let cfg = BalanceConfig::default();
        assert_eq!(cfg.pitch_port, "/dev/ttyUSB0");
        assert_eq!(cfg.sensor_port, "/dev/ttyUSB1");
        assert_eq!(cfg.roll_port, "/dev/ttyUSB2");
        assert_eq!(cfg.motor_baud, 57600);
        assert_eq!(cfg.cycle_pause(), Duration::from_secs(5));
        assert_eq!(cfg.strategy, StrategyKind::TieredLiteral);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_from_args_overrides() {
        let cfg = BalanceConfig::from_args([
            "--strategy", "cubic",
            "--gain", "250",
            "--roll-sign", "-1",
            "--fine-step-limit", "20",
            "--publish",
        ])
        .unwrap();
        assert_eq!(cfg.strategy, StrategyKind::Cubic);
        assert_eq!(cfg.cubic_gain, 250.0);
        assert_eq!(cfg.sign(Axis::Roll), -1);
        assert_eq!(cfg.sign(Axis::Pitch), 1);
        assert_eq!(cfg.fine_step_limit, Some(20));
        assert_eq!(cfg.telemetry_url.as_deref(), Some(DEFAULT_TELEMETRY_URL));
    }

    #[rstest]
    #[case(&["--motor-baud", "fast"])]
    #[case(&["--motor-baud", "0"])]
    #[case(&["--strategy", "pid"])]
    #[case(&["--pitch-port", "/dev/ttyUSB2"])]
    #[case(&["--sensor-port", " "])]
    #[case(&["--fine-tolerance", "-1"])]
    #[case(&["--pitch-sign", "2"])]
    #[case(&["--bogus", "1"])]
    #[case(&["--gain"])]
    fn test_from_args_rejects(#[case] args: &[&str]) {
        let res = BalanceConfig::from_args(args.iter());
        assert!(matches!(res, Err(BalanceError::Config(_))), "{:?}", res);
    }
}
