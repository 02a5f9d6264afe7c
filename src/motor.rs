use std::io;
use std::time::Duration;

use log::{debug, info};
use serial2::{CharSize, FlowControl, Parity, SerialPort, Settings, StopBits};

use crate::config::BalanceConfig;
use crate::data::{Axis, MotorCommand};
use crate::error::{BalanceError, Result};

/// Byte channel to the actuator controllers, one endpoint per axis.
/// Writes are fire-and-forget: nothing is read back from the controller.
pub trait MotorLink {
    fn send(&mut self, axis: Axis, bytes: &[u8]) -> io::Result<()>;
}

impl<L: MotorLink + ?Sized> MotorLink for Box<L> {
    fn send(&mut self, axis: Axis, bytes: &[u8]) -> io::Result<()> {
        (**self).send(axis, bytes)
    }
}

/// Encodes and writes one command. A failed write is reported, never retried,
/// since resending could apply the same step twice.
pub fn send_command<L: MotorLink + ?Sized>(link: &mut L, cmd: &MotorCommand) -> Result<()> {
    let wire = cmd.to_wire();
    debug!("{} <- {:?}", cmd.axis, wire);
    link.send(cmd.axis, wire.as_bytes())
        .map_err(|source| BalanceError::LinkWrite { axis: cmd.axis, source })
}

// 8 data bits, no parity, 1 stop bit
pub fn open_port(port_name: &str, baud: u32, timeout: Duration) -> io::Result<SerialPort> {
    let mut port = SerialPort::open(port_name, |mut settings: Settings| {
        settings.set_raw();
        settings.set_baud_rate(baud)?;
        settings.set_char_size(CharSize::Bits8);
        settings.set_stop_bits(StopBits::One);
        settings.set_parity(Parity::None);
        settings.set_flow_control(FlowControl::None);
        Ok(settings)
    })?;
    port.set_read_timeout(timeout)?;
    port.set_write_timeout(timeout)?;
    Ok(port)
}

pub struct SerialMotorLink {
    pitch: SerialPort,
    roll: SerialPort,
}

impl SerialMotorLink {
    pub fn open(cfg: &BalanceConfig) -> Result<Self> {
        let timeout = cfg.motor_timeout();
        let pitch = open_port(&cfg.pitch_port, cfg.motor_baud, timeout)
            .map_err(|e| BalanceError::config(format!("pitch motor {}: {}", cfg.pitch_port, e)))?;
        let roll = open_port(&cfg.roll_port, cfg.motor_baud, timeout)
            .map_err(|e| BalanceError::config(format!("roll motor {}: {}", cfg.roll_port, e)))?;
        info!(
            "motor links open: pitch {} roll {} @ {} baud",
            cfg.pitch_port, cfg.roll_port, cfg.motor_baud
        );
        Ok(SerialMotorLink { pitch, roll })
    }
}

impl MotorLink for SerialMotorLink {
    fn send(&mut self, axis: Axis, bytes: &[u8]) -> io::Result<()> {
        let port = match axis {
            Axis::Pitch => &self.pitch,
            Axis::Roll => &self.roll,
        };
        port.write_all(bytes)
    }
}
