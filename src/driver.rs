//! The balancing loop: read telemetry, decide, send, pause, repeat.
//!
//! ```text
//! Idle ──run()──► Running ──stop requested──► Stopped
//!                    │
//!                    └──sensor / link error──► Faulted
//! ```
//!
//! Everything runs on the calling thread. Stop requests are honoured at cycle
//! boundaries and before every fine step, so a stop takes effect within one pause.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::config::BalanceConfig;
use crate::controller::Strategy;
use crate::data::{Axis, ControlMode, DriverState, MotorCommand, TelemetrySnapshot};
use crate::error::Result;
use crate::motor::{send_command, MotorLink};
use crate::telemetry::{Sensor, TelemetryReader};

/// Blocking wait between moves. Swapped out in tests.
pub trait Pause {
    fn pause(&mut self, d: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadPause;

impl Pause for ThreadPause {
    fn pause(&mut self, d: Duration) {
        thread::sleep(d);
    }
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct ManualMove {
    pub axis: Axis,
    pub steps: i64,
}

/// Cloneable remote control for a running [`Driver`].
#[derive(Clone)]
pub struct DriverHandle {
    stop: Arc<AtomicBool>,
    manual: Arc<AtomicBool>,
    moves: Sender<ManualMove>,
}

impl DriverHandle {
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    pub fn set_mode(&self, mode: ControlMode) {
        self.manual.store(mode == ControlMode::Manual, Ordering::SeqCst);
    }

    pub fn mode(&self) -> ControlMode {
        if self.manual.load(Ordering::SeqCst) {
            ControlMode::Manual
        } else {
            ControlMode::Automatic
        }
    }

    /// Queues a move for the next manual cycle. Returns false once the driver is gone.
    pub fn queue_manual(&self, axis: Axis, steps: i64) -> bool {
        self.moves.send(ManualMove { axis, steps }).is_ok()
    }
}

#[derive(Debug, Clone)]
pub struct DriverSettings {
    pub cycle_pause: Duration,
    pub fine_pause: Duration,
    pub fine_tolerance: f64,
    pub fine_step_limit: Option<u32>,
    pub sensor_deadline: Duration,
    pub pitch_sign: i64,
    pub roll_sign: i64,
}

impl From<&BalanceConfig> for DriverSettings {
    fn from(cfg: &BalanceConfig) -> Self {
        DriverSettings {
            cycle_pause: cfg.cycle_pause(),
            fine_pause: cfg.fine_pause(),
            fine_tolerance: cfg.fine_tolerance,
            fine_step_limit: cfg.fine_step_limit,
            sensor_deadline: cfg.sensor_deadline(),
            pitch_sign: cfg.pitch_sign,
            roll_sign: cfg.roll_sign,
        }
    }
}

impl DriverSettings {
    fn sign(&self, axis: Axis) -> i64 {
        match axis {
            Axis::Pitch => self.pitch_sign,
            Axis::Roll => self.roll_sign,
        }
    }
}

pub struct Driver<S, L, P> {
    reader: TelemetryReader<S>,
    link: L,
    pause: P,
    strategy: Box<dyn Strategy + Send>,
    settings: DriverSettings,
    state: DriverState,
    handle: DriverHandle,
    moves: Receiver<ManualMove>,
    pending: VecDeque<ManualMove>,
    snapshot: watch::Sender<TelemetrySnapshot>,
    cycle: u64,
}

impl<S: Sensor, L: MotorLink, P: Pause> Driver<S, L, P> {
    pub fn new(
        sensor: S,
        link: L,
        pause: P,
        strategy: Box<dyn Strategy + Send>,
        settings: DriverSettings,
    ) -> Self {
        let (tx, rx) = mpsc::channel();
        let handle = DriverHandle {
            stop: Arc::new(AtomicBool::new(false)),
            manual: Arc::new(AtomicBool::new(false)),
            moves: tx,
        };
        let (snapshot, _) = watch::channel(TelemetrySnapshot::default());
        Driver {
            reader: TelemetryReader::new(sensor, settings.sensor_deadline),
            link,
            pause,
            strategy,
            settings,
            state: DriverState::Idle,
            handle,
            moves: rx,
            pending: VecDeque::new(),
            snapshot,
            cycle: 0,
        }
    }

    pub fn handle(&self) -> DriverHandle {
        self.handle.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<TelemetrySnapshot> {
        self.snapshot.subscribe()
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn cycles(&self) -> u64 {
        self.cycle
    }

    /// Runs until stopped (`Ok`) or until a sensor/link error (`Err`, state `Faulted`).
    /// Nothing is sent after the first error.
    pub fn run(&mut self) -> Result<()> {
        info!("balancing with {} strategy", self.strategy.name());
        self.set_state(DriverState::Running);
        loop {
            if self.handle.is_stop_requested() {
                self.set_state(DriverState::Stopped);
                return Ok(());
            }
            if let Err(e) = self.run_cycle() {
                error!("cycle {} failed: {}", self.cycle, e);
                self.set_state(DriverState::Faulted);
                return Err(e);
            }
            if self.handle.is_stop_requested() {
                self.set_state(DriverState::Stopped);
                return Ok(());
            }
            self.pause.pause(self.settings.cycle_pause);
        }
    }

    fn set_state(&mut self, state: DriverState) {
        if self.state != state {
            info!("driver {:?} -> {:?}", self.state, state);
        }
        self.state = state;
        self.snapshot.send_modify(|s| s.state = state);
    }

    fn run_cycle(&mut self) -> Result<()> {
        self.cycle += 1;
        let mode = self.handle.mode();
        let orientation = self.reader.read_orientation()?;
        // rates are display only
        let rates = self.reader.read_rates()?;
        let cycle = self.cycle;
        self.snapshot.send_modify(|s| {
            s.cycle = cycle;
            s.mode = mode;
            s.orientation = Some(orientation);
            s.rates = Some(rates);
        });
        debug!(
            "cycle {}: pitch {:.3} roll {:.3} yaw {:.3}",
            cycle, orientation.pitch, orientation.roll, orientation.yaw
        );

        match mode {
            ControlMode::Manual => self.run_manual(),
            ControlMode::Automatic => {
                self.discard_manual();
                for cmd in self.strategy.decide(&orientation) {
                    // saturating: a cubic step can already sit at i64::MIN
                    let steps = cmd.steps.saturating_mul(self.settings.sign(cmd.axis));
                    let signed = MotorCommand { steps, ..cmd };
                    self.issue(&signed)?;
                }
                if self.strategy.fine_convergence() {
                    for axis in Axis::ALL {
                        self.converge(axis)?;
                    }
                }
                Ok(())
            }
        }
    }

    // single-unit steps on one axis until a fresh reading is inside the tolerance
    fn converge(&mut self, axis: Axis) -> Result<()> {
        let tol = self.settings.fine_tolerance;
        let mut steps = 0u32;
        loop {
            if self.handle.is_stop_requested() {
                return Ok(());
            }
            if let Some(limit) = self.settings.fine_step_limit {
                if steps >= limit {
                    warn!("{} not within {} after {} fine steps", axis, tol, steps);
                    return Ok(());
                }
            }
            // let the previous move land before looking again
            self.pause.pause(self.settings.fine_pause);
            if self.handle.is_stop_requested() {
                return Ok(());
            }
            let sample = self.reader.read_orientation()?;
            self.snapshot.send_modify(|s| s.orientation = Some(sample));
            let e = sample.error(axis);
            if e.abs() <= tol {
                debug!("{} converged at {:.6} after {} fine steps", axis, e, steps);
                return Ok(());
            }
            let dir = if e > tol { 1 } else { -1 };
            self.issue(&MotorCommand::fine(axis, dir * self.settings.sign(axis)))?;
            steps += 1;
        }
    }

    // one move per axis per cycle, the rest wait for the next cycle
    fn run_manual(&mut self) -> Result<()> {
        self.pending.extend(self.moves.try_iter());
        let mut commanded: Vec<Axis> = Vec::with_capacity(2);
        let mut deferred = VecDeque::new();
        while let Some(mv) = self.pending.pop_front() {
            if commanded.contains(&mv.axis) {
                deferred.push_back(mv);
                continue;
            }
            self.issue(&MotorCommand::coarse(mv.axis, mv.steps))?;
            commanded.push(mv.axis);
        }
        self.pending = deferred;
        Ok(())
    }

    fn discard_manual(&mut self) {
        let dropped = self.pending.len() + self.moves.try_iter().count();
        self.pending.clear();
        if dropped > 0 {
            warn!("discarding {} manual moves queued outside manual mode", dropped);
        }
    }

    fn issue(&mut self, cmd: &MotorCommand) -> Result<()> {
        send_command(&mut self.link, cmd)?;
        let cmd = *cmd;
        self.snapshot.send_modify(|s| s.last_command = Some(cmd));
        Ok(())
    }
}
