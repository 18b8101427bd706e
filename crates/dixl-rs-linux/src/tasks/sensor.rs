use crate::{NodeOptions, QueueSet, wall_now};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use dixl_rs::device::sensor::SensorLatch;
use dixl_rs::logbuf::{LogKind, LogRecord};
use dixl_rs::types::{RouteId, SensorState};
use dixl_rs::{Msg, NodeId, SensorInput};
use log::{info, warn};
use std::thread;
use std::time::Duration;

/// Occupancy input substituted for the hardware in simulation: while the
/// control logic waits for a state, it appears after a fixed delay.
pub struct SimulatedSensor {
    current: SensorState,
    delay: Duration,
}

impl SimulatedSensor {
    pub fn new(delay: Duration) -> Self {
        SimulatedSensor { current: SensorState::Off, delay }
    }
}

impl SensorInput for SimulatedSensor {
    fn sample(&mut self, pending: Option<SensorState>) -> SensorState {
        if let Some(target) = pending {
            if self.current != target {
                info!("[Sensor] Simulation mode: emulating SENSOR {target}");
                thread::sleep(self.delay);
                self.current = target;
            }
        }
        self.current
    }
}

/// Sensor sampler task: samples the occupancy input every check period and
/// answers the latched state request exactly once.
pub fn run(
    options: NodeOptions,
    queues: QueueSet,
    rx: Receiver<Msg>,
    mut input: Box<dyn SensorInput + Send>,
) {
    info!("[Sensor] Task started");
    info!("[Sensor] Sensor check specs:");
    info!("[Sensor] > Requested check period: {}ms", options.sensor_check_period_ms);

    let period = Duration::from_millis(options.sensor_check_period_ms);
    let mut latch = SensorLatch::new();

    loop {
        match rx.recv_timeout(period) {
            Ok(Msg::Shutdown) => break,
            Ok(Msg::SensorRequest { target, nonce }) => {
                info!("[Sensor] Waiting for {target} state");
                latch.request(target, nonce);
            }
            Ok(_) => {
                warn!("[Sensor] Unattended message type, should not be sent to Sensor task and will be ignored");
            }
            Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {
                // Sampling tick.
                let sampled = input.sample(latch.pending());
                let events = latch.observe(sampled);
                if events.occupied_edge {
                    queues.log.send(Msg::Log(LogRecord {
                        timestamp: wall_now(),
                        kind: LogKind::Occupied,
                        route_id: RouteId(0),
                        source: NodeId::NULL,
                    }));
                }
                if let Some((state, nonce)) = events.notify {
                    info!("[Sensor] State {state} reached");
                    queues.ctrl.send(Msg::SensorNotify { state, nonce });
                }
            }
        }
    }
    info!("[Sensor] Task stopped");
}
