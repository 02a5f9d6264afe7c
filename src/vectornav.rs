//! VectorNav VN-100 over its ASCII register protocol.
//!
//! Requests are `$VNRRG,<reg>*<cs>\r\n`, responses `$VNRRG,<reg>,<v1>,<v2>,...*<cs>\r\n`.
//! The checksum is either two hex digits (xor of the bytes between `$` and `*`) or four
//! hex digits (CRC-16/XMODEM over the same bytes).

use std::io;
use std::time::{Duration, Instant};

use crc::{Crc, CRC_16_XMODEM};
use log::{info, warn};
use nalgebra::Vector3;
use serial2::SerialPort;

use crate::data::{OrientationSample, RateSample};
use crate::error::{BalanceError, Result};
use crate::motor::open_port;
use crate::telemetry::Sensor;

pub const START_BYTE: u8 = b'$';
pub const CHECKSUM_BYTE: u8 = b'*';
pub const STOP_BYTE: u8 = b'\n';

pub const REG_YAW_PITCH_ROLL: u8 = 8;
pub const REG_ANGULAR_RATE: u8 = 19;

const MAX_FRAME_LEN: usize = 256;

const XMODEM: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

pub fn checksum8(body: &[u8]) -> u8 {
    body.iter().fold(0u8, |acc, b| acc ^ b)
}

pub fn checksum16(body: &[u8]) -> u16 {
    XMODEM.checksum(body)
}

pub fn read_register_request(reg: u8) -> String {
    let body = format!("VNRRG,{:02}", reg);
    format!("${}*{:02X}\r\n", body, checksum8(body.as_bytes()))
}

// check the frame and hand back the comma separated fields between '$' and '*'
pub fn decode_frame(frame: &[u8]) -> Result<Vec<String>> {
    let text = std::str::from_utf8(frame)
        .map_err(|_| BalanceError::sensor("frame is not ascii"))?
        .trim_end_matches(|c: char| c == '\r' || c == '\n');
    let text = text
        .strip_prefix('$')
        .ok_or_else(|| BalanceError::sensor("frame is missing start byte"))?;
    let (body, cs) = text
        .rsplit_once(CHECKSUM_BYTE as char)
        .ok_or_else(|| BalanceError::sensor("frame is missing checksum"))?;

    let ok = match cs.len() {
        2 => u8::from_str_radix(cs, 16).map(|c| c == checksum8(body.as_bytes())),
        4 => u16::from_str_radix(cs, 16).map(|c| c == checksum16(body.as_bytes())),
        _ => return Err(BalanceError::sensor(format!("bad checksum field {:?}", cs))),
    }
    .map_err(|_| BalanceError::sensor(format!("bad checksum field {:?}", cs)))?;
    if !ok {
        return Err(BalanceError::sensor(format!("checksum mismatch in {:?}", body)));
    }

    Ok(body.split(',').map(|f| f.to_string()).collect())
}

/// Pulls the three values out of a `VNRRG` response for `reg`.
/// Returns `Ok(None)` when the frame is some other message (e.g. async output).
pub fn parse_register3(fields: &[String], reg: u8) -> Result<Option<Vector3<f64>>> {
    if fields.first().map(String::as_str) == Some("VNERR") {
        let code = fields.get(1).map(String::as_str).unwrap_or("?");
        return Err(BalanceError::sensor(format!("sensor reported error {}", code)));
    }
    if fields.len() < 2 || fields[0] != "VNRRG" {
        return Ok(None);
    }
    match fields[1].parse::<u8>() {
        Ok(r) if r == reg => {}
        _ => return Ok(None),
    }
    if fields.len() < 5 {
        return Err(BalanceError::sensor(format!("register {} response is short", reg)));
    }
    let mut v = [0.0; 3];
    for (i, f) in fields[2..5].iter().enumerate() {
        v[i] = f
            .trim()
            .parse::<f64>()
            .map_err(|_| BalanceError::sensor(format!("bad value {:?} in register {}", f, reg)))?;
    }
    Ok(Some(Vector3::new(v[0], v[1], v[2])))
}

// x = yaw, y = pitch, z = roll
pub fn orientation_from_ypr(ypr: &Vector3<f64>) -> OrientationSample {
    OrientationSample { pitch: ypr.y, roll: ypr.z, yaw: ypr.x }
}

// register 19 reports body rates in rad/s about x (roll), y (pitch), z (yaw)
pub fn rates_from_gyro(gyro: &Vector3<f64>) -> RateSample {
    let deg = gyro.map(f64::to_degrees);
    RateSample { pitch_rate: deg.y, roll_rate: deg.x, yaw_rate: deg.z }
}

pub struct VnSensor {
    port: SerialPort,
    timeout: Duration,
}

impl VnSensor {
    pub fn connect(port_name: &str, baud: u32, timeout: Duration) -> Result<Self> {
        let port = open_port(port_name, baud, timeout)
            .map_err(|e| BalanceError::config(format!("sensor {}: {}", port_name, e)))?;
        info!("VN-100 connected on {} @ {} baud", port_name, baud);
        Ok(VnSensor { port, timeout })
    }

    // bounded by roughly twice `timeout`: the last blocking byte read can start just
    // before the listener's own clock runs out
    fn read_register3(&mut self, reg: u8) -> Result<Vector3<f64>> {
        if let Err(e) = self.port.discard_input_buffer() {
            warn!("could not discard stale sensor input: {}", e);
        }
        self.port
            .write_all(read_register_request(reg).as_bytes())
            .map_err(|e| BalanceError::sensor(format!("request register {}: {}", reg, e)))?;

        let start_time = Instant::now();
        while start_time.elapsed() < self.timeout {
            let frame = listen_frame(&mut self.port, self.timeout.saturating_sub(start_time.elapsed()))
                .map_err(|e| BalanceError::sensor(format!("register {}: {}", reg, e)))?;
            let fields = match decode_frame(&frame) {
                Ok(f) => f,
                Err(e) => {
                    warn!("dropping frame: {}", e);
                    continue;
                }
            };
            if let Some(v) = parse_register3(&fields, reg)? {
                return Ok(v);
            }
        }
        Err(BalanceError::sensor(format!("no reply for register {}", reg)))
    }
}

// read until we see one '$'...'\n' frame, or run out of time
fn listen_frame(port: &mut SerialPort, timeout: Duration) -> io::Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let mut byte = [0; 1];
    let start_time = Instant::now();
    let mut in_frame = false;
    while start_time.elapsed() < timeout {
        let n = port.read(&mut byte)?;
        if n == 0 {
            continue;
        }
        if byte[0] == START_BYTE {
            // a new start byte always restarts the frame
            buffer.clear();
            in_frame = true;
        }
        if !in_frame {
            continue;
        }
        buffer.push(byte[0]);
        if byte[0] == STOP_BYTE {
            return Ok(buffer);
        }
        if buffer.len() > MAX_FRAME_LEN {
            buffer.clear();
            in_frame = false;
        }
    }
    Err(io::Error::new(io::ErrorKind::TimedOut, "Timed out"))
}

impl Sensor for VnSensor {
    fn read_orientation(&mut self) -> Result<OrientationSample> {
        let ypr = self.read_register3(REG_YAW_PITCH_ROLL)?;
        Ok(orientation_from_ypr(&ypr))
    }

    fn read_rates(&mut self) -> Result<RateSample> {
        let gyro = self.read_register3(REG_ANGULAR_RATE)?;
        Ok(rates_from_gyro(&gyro))
    }
}
