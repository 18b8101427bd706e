use crate::{QueueSet, wall_now};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use dixl_rs::fsm::ctrl::{CtrlAction, CtrlEvent, CtrlMachine, PointCtrl, TrackCircuitCtrl};
use dixl_rs::{LogRecord, Msg, NodeType};
use log::{error, info, warn};
use std::process;
use std::time::Duration;

/// Ctrl task: owns the reservation machine selected by the configuration
/// and drives it with inbound messages and deadline expiries.
pub fn run(queues: QueueSet, rx: Receiver<Msg>) {
    info!("[Ctrl] Task started");

    let mut machine: Option<Box<dyn CtrlMachine + Send>> = None;

    loop {
        // Block until a message arrives or, in a wait state, until the
        // armed deadline expires.
        let received = match machine.as_ref().and_then(|m| m.deadline()) {
            Some(deadline) => {
                let wait = deadline.millis_since(wall_now());
                match rx.recv_timeout(Duration::from_millis(wait)) {
                    Ok(msg) => Some(msg),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            None => match rx.recv() {
                Ok(msg) => Some(msg),
                Err(_) => break,
            },
        };

        let Some(msg) = received else {
            // Deadline expired: inject the synthetic timeout event.
            if let Some(m) = machine.as_mut() {
                info!("[Ctrl] Wait deadline expired");
                match m.process_event(CtrlEvent::Timeout, wall_now()) {
                    Ok(actions) => apply(actions, &queues),
                    Err(e) => {
                        error!("[Ctrl] {e}");
                        process::exit(e.exit_code());
                    }
                }
            }
            continue;
        };

        match msg {
            Msg::Shutdown => break,
            // CONFIGSET and CONFIGRESET are handled here; Init can send
            // them at any time.
            Msg::NodeConfigSet(config) => {
                let mut selected: Box<dyn CtrlMachine + Send> = match config.node_type {
                    NodeType::Point => {
                        info!("[Ctrl] Node configured for Point logic");
                        Box::new(PointCtrl::new(config.routes.clone()))
                    }
                    NodeType::TrackCircuit => {
                        info!("[Ctrl] Node configured for Track Circuit logic");
                        Box::new(TrackCircuitCtrl::new(config.routes.clone()))
                    }
                };
                apply(selected.start(), &queues);
                machine = Some(selected);
            }
            Msg::NodeConfigReset => {
                machine = None;
                info!("[Ctrl] Configuration reset");
            }
            other => {
                let Some(event) = event_of(&other) else {
                    warn!("[Ctrl] Unattended message type, ignored");
                    continue;
                };
                match machine.as_mut() {
                    Some(m) => match m.process_event(event, wall_now()) {
                        Ok(actions) => apply(actions, &queues),
                        Err(e) => {
                            error!("[Ctrl] {e}");
                            process::exit(e.exit_code());
                        }
                    },
                    None => warn!("[Ctrl] Node not configured: message discarded"),
                }
            }
        }
    }
    info!("[Ctrl] Task stopped");
}

fn event_of(msg: &Msg) -> Option<CtrlEvent> {
    match msg {
        Msg::External(message) => CtrlEvent::from_ext(message),
        Msg::PointNotify { position, nonce } => {
            Some(CtrlEvent::PointNotify { position: *position, nonce: *nonce })
        }
        Msg::SensorNotify { state, nonce } => {
            Some(CtrlEvent::SensorNotify { state: *state, nonce: *nonce })
        }
        Msg::DiagErrComm { .. } | Msg::DiagErrTask => Some(CtrlEvent::DiagErr),
        _ => None,
    }
}

fn apply(actions: Vec<CtrlAction>, queues: &QueueSet) {
    for action in actions {
        match action {
            CtrlAction::Send { kind, destination, route_id } => {
                queues.comm_tx.send(Msg::SendRoute { kind, destination, route_id });
            }
            CtrlAction::CommandPoint { position, nonce } => {
                queues.point.send(Msg::PointPos { position, nonce });
            }
            CtrlAction::RequestSensor { target, nonce } => {
                queues.sensor.send(Msg::SensorRequest { target, nonce });
            }
            CtrlAction::Log { kind, route_id, source } => {
                queues.log.send(Msg::Log(LogRecord {
                    timestamp: wall_now(),
                    kind,
                    route_id,
                    source,
                }));
            }
        }
    }
}
