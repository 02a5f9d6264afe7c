use std::env;
use std::process::ExitCode;

use log::{error, info, warn};
use reqwest::Client;
use tokio::sync::watch;

use attitude_balancer::config::BalanceConfig;
use attitude_balancer::controller::build_strategy;
use attitude_balancer::driver::{Driver, DriverHandle, DriverSettings, ThreadPause};
use attitude_balancer::motor::SerialMotorLink;
use attitude_balancer::vectornav::VnSensor;
use attitude_balancer::{Axis, ControlMode, TelemetrySnapshot};

async fn send_snapshot(client: &Client, url: &str, s: &TelemetrySnapshot) -> Result<(), reqwest::Error> {
    let _res = client.post(url)
        .json(s)
        .send()
        .await?
        .error_for_status()?;
    Ok(())
}

// forward every snapshot the driver publishes to the telemetry server
async fn publish(mut rx: watch::Receiver<TelemetrySnapshot>, url: String) {
    let client = Client::new();
    while rx.changed().await.is_ok() {
        let snapshot = rx.borrow_and_update().clone();
        if let Err(e) = send_snapshot(&client, &url, &snapshot).await {
            warn!("telemetry publish to {} failed: {}", url, e);
        }
    }
}

// console commands: "manual", "auto", "pitch <steps>", "roll <steps>", "stop"
fn console_command(handle: &DriverHandle, line: &str) {
    let mut iter = line.split_whitespace();
    match (iter.next(), iter.next()) {
        (Some("manual"), None) => handle.set_mode(ControlMode::Manual),
        (Some("auto"), None) => handle.set_mode(ControlMode::Automatic),
        (Some("stop"), None) => handle.request_stop(),
        (Some(axis @ ("pitch" | "roll")), Some(steps)) => {
            let axis = if axis == "pitch" { Axis::Pitch } else { Axis::Roll };
            match steps.parse::<i64>() {
                Ok(steps) => {
                    if handle.mode() != ControlMode::Manual {
                        warn!("not in manual mode, the move will be discarded");
                    }
                    handle.queue_manual(axis, steps);
                }
                Err(_) => warn!("bad step count {:?}", steps),
            }
        }
        (None, _) => {}
        _ => warn!("unknown command {:?}", line),
    }
}

// plain thread so a pending stdin read never holds up shutdown
fn console(handle: DriverHandle) {
    for line in std::io::stdin().lines() {
        match line {
            Ok(line) => console_command(&handle, line.trim()),
            Err(_) => break,
        }
    }
}

// first Ctrl-C asks for a clean stop, the second gives up on it
fn on_interrupt(handle: &DriverHandle, count: u32) -> bool {
    if count == 1 {
        info!("interrupted, stopping at the next cycle boundary (Ctrl-C again to quit now)");
        handle.request_stop();
        false
    } else {
        warn!("interrupted again, exiting without waiting for the driver");
        true
    }
}

// cross build --target armv7-unknown-linux-gnueabihf --release

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cfg = match BalanceConfig::from_args(env::args().skip(1)) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("{}", e);
            return ExitCode::from(2);
        }
    };

    let sensor = match VnSensor::connect(&cfg.sensor_port, cfg.sensor_baud, cfg.sensor_deadline()) {
        Ok(s) => s,
        Err(e) => {
            error!("{}", e);
            return ExitCode::from(2);
        }
    };
    let link = match SerialMotorLink::open(&cfg) {
        Ok(l) => l,
        Err(e) => {
            error!("{}", e);
            return ExitCode::from(2);
        }
    };

    let mut driver = Driver::new(sensor, link, ThreadPause, build_strategy(&cfg), DriverSettings::from(&cfg));
    let handle = driver.handle();

    if let Some(url) = cfg.telemetry_url.clone() {
        info!("publishing telemetry to {}", url);
        tokio::spawn(publish(driver.subscribe(), url));
    }

    let stopper = handle.clone();
    tokio::spawn(async move {
        let mut count = 0;
        while tokio::signal::ctrl_c().await.is_ok() {
            count += 1;
            if on_interrupt(&stopper, count) {
                std::process::exit(130);
            }
        }
    });
    std::thread::spawn(move || console(handle));

    match tokio::task::spawn_blocking(move || driver.run()).await {
        Ok(Ok(())) => {
            info!("stopped");
            ExitCode::SUCCESS
        }
        Ok(Err(e)) => {
            error!("faulted: {}", e);
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("control thread died: {}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attitude_balancer::controller::TieredLiteral;
    use attitude_balancer::driver::Pause;
    use attitude_balancer::motor::MotorLink;
    use attitude_balancer::telemetry::Sensor;
    use attitude_balancer::{BalanceError, OrientationSample, RateSample};
    use std::time::Duration;

    struct NoSensor;

    impl Sensor for NoSensor {
        fn read_orientation(&mut self) -> attitude_balancer::Result<OrientationSample> {
            Err(BalanceError::sensor("not connected"))
        }

        fn read_rates(&mut self) -> attitude_balancer::Result<RateSample> {
            Err(BalanceError::sensor("not connected"))
        }
    }

    struct NoLink;

    impl MotorLink for NoLink {
        fn send(&mut self, _axis: Axis, _bytes: &[u8]) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct NoPause;

    impl Pause for NoPause {
        fn pause(&mut self, _d: Duration) {}
    }

    fn driver() -> Driver<NoSensor, NoLink, NoPause> {
        let cfg = BalanceConfig::default();
        Driver::new(NoSensor, NoLink, NoPause, Box::new(TieredLiteral), DriverSettings::from(&cfg))
    }

    #[test]
    fn test_first_interrupt_requests_stop() {
        let d = driver();
        let handle = d.handle();
        assert!(!on_interrupt(&handle, 1));
        assert!(handle.is_stop_requested());
    }

    #[test]
    fn test_second_interrupt_exits() {
        let d = driver();
        let handle = d.handle();
        on_interrupt(&handle, 1);
        assert!(on_interrupt(&handle, 2));
    }

    #[test]
    fn test_console_stop_and_mode() {
        let d = driver();
        let handle = d.handle();
        console_command(&handle, "manual");
        assert_eq!(handle.mode(), ControlMode::Manual);
        console_command(&handle, "stop");
        assert!(handle.is_stop_requested());
    }
}
