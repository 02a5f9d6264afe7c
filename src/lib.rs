//! Pitch/roll balancing loop for the CubeSat attitude simulator testbed.
//!
//! A VN-100 reports the platform attitude, two linear actuators shift the balance
//! masses. [`driver::Driver`] ties them together through a [`controller::Strategy`].

pub mod config;
pub mod controller;
pub mod data;
pub mod driver;
pub mod encoder;
pub mod error;
pub mod motor;
pub mod telemetry;
pub mod vectornav;

pub use data::{Axis, ControlMode, DriverState, MotorCommand, OrientationSample, RateSample, TelemetrySnapshot};
pub use error::{BalanceError, Result};
