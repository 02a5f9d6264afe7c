use serde::{Serialize, Deserialize};
use std::fmt;

#[derive(Clone, Copy, Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct OrientationSample {
    pub pitch: f64, // degrees
    pub roll: f64,  // degrees
    pub yaw: f64,   // degrees, display only - yaw is not actuated
}

impl OrientationSample {
    pub fn new(pitch: f64, roll: f64, yaw: f64) -> Self {
        OrientationSample { pitch, roll, yaw }
    }

    /// Error on the given axis. The setpoint is level (0, 0), so the error is the angle itself.
    pub fn error(&self, axis: Axis) -> f64 {
        match axis {
            Axis::Pitch => self.pitch,
            Axis::Roll => self.roll,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.pitch.is_finite() && self.roll.is_finite() && self.yaw.is_finite()
    }
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct RateSample {
    pub pitch_rate: f64, // degrees/second
    pub roll_rate: f64,
    pub yaw_rate: f64,
}

impl RateSample {
    pub fn is_finite(&self) -> bool {
        self.pitch_rate.is_finite() && self.roll_rate.is_finite() && self.yaw_rate.is_finite()
    }
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Hash)]
pub enum Axis {
    Pitch,
    Roll,
}

impl Axis {
    // pitch is always corrected before roll within a cycle
    pub const ALL: [Axis; 2] = [Axis::Pitch, Axis::Roll];
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::Pitch => write!(f, "pitch"),
            Axis::Roll => write!(f, "roll"),
        }
    }
}

/// Trailing profile id of a wire command.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub enum StepProfile {
    Coarse, // tiered, cubic and manual moves
    Fine,   // single-unit convergence steps
}

impl StepProfile {
    pub fn id(&self) -> u8 {
        match self {
            StepProfile::Coarse => 8,
            StepProfile::Fine => 64,
        }
    }
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct MotorCommand {
    pub axis: Axis,
    pub steps: i64,
    pub profile: StepProfile,
}

impl MotorCommand {
    pub fn coarse(axis: Axis, steps: i64) -> Self {
        MotorCommand { axis, steps, profile: StepProfile::Coarse }
    }

    pub fn fine(axis: Axis, steps: i64) -> Self {
        MotorCommand { axis, steps, profile: StepProfile::Fine }
    }
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Default)]
pub enum DriverState {
    #[default]
    Idle,
    Running,
    Stopped,
    Faulted,
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Default)]
pub enum ControlMode {
    #[default]
    Automatic,
    Manual,
}

/// What the driver exposes to the display/recording layer. Read-only from the outside.
#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct TelemetrySnapshot {
    pub state: DriverState,
    pub mode: ControlMode,
    pub cycle: u64,
    pub orientation: Option<OrientationSample>,
    pub rates: Option<RateSample>,
    pub last_command: Option<MotorCommand>,
}
