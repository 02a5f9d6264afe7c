use thiserror::Error;

use crate::data::Axis;

#[derive(Debug, Error)]
pub enum BalanceError {
    /// read failure, timeout, bad frame or an unusable value from the sensor
    #[error("sensor unavailable: {0}")]
    SensorUnavailable(String),
    /// a command could not be written to the motor controller; never retried
    #[error("failed to write {axis} motor command: {source}")]
    LinkWrite {
        axis: Axis,
        #[source]
        source: std::io::Error,
    },
    #[error("bad configuration: {0}")]
    Config(String),
}

impl BalanceError {
    pub fn sensor(msg: impl Into<String>) -> Self {
        BalanceError::SensorUnavailable(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        BalanceError::Config(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, BalanceError>;
