//! Wire format for the linear actuator controllers.
//!
//! Every command is `I<steps>,<motion profile>,<profile id>\r` in ASCII. The motion
//! profile (acceleration, velocity and current limits) is part of the controller's
//! native protocol and is sent unchanged with every command on both axes.

use crate::data::{Axis, MotorCommand, StepProfile};

pub const MOTION_PROFILE: [u32; 10] = [25600, 9600, 16000, 320000, 800000, 490, 122, 490, 490, 50];

pub const COMMAND_PREFIX: char = 'I';
pub const COMMAND_TERMINATOR: char = '\r';

// the template is axis agnostic, the axis only picks the port the bytes go to
pub fn encode(_axis: Axis, steps: i64, profile: StepProfile) -> String {
    let mut cmd = String::with_capacity(64);
    cmd.push(COMMAND_PREFIX);
    cmd.push_str(&steps.to_string());
    for p in MOTION_PROFILE.iter() {
        cmd.push(',');
        cmd.push_str(&p.to_string());
    }
    cmd.push(',');
    cmd.push_str(&profile.id().to_string());
    cmd.push(COMMAND_TERMINATOR);
    cmd
}

impl MotorCommand {
    pub fn to_wire(&self) -> String {
        encode(self.axis, self.steps, self.profile)
    }
}
