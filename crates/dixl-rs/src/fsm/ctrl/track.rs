use super::{
    CtrlAction, CtrlEvent, CtrlMachine, CtrlState, ReservationCore, RouteEvent,
};
use crate::common::{Nonce, Timestamp};
use crate::hal::DixlError;
use crate::types::{Route, RouteId, RoutePosition, SensorState};
use alloc::sync::Arc;
use alloc::vec::Vec;
use log::{debug, error, info, warn};

/// Reservation machine for a track-circuit node.
///
/// A strict subset of the point machine: there is nothing to actuate, so the
/// agreement leads straight into Reserved and neither Positioning nor
/// Malfunction exists.
pub struct TrackCircuitCtrl {
    state: CtrlState,
    core: ReservationCore,
    /// Nonce of the last sensor request (the expected one).
    last_sensor_nonce: Option<Nonce>,
}

impl TrackCircuitCtrl {
    pub fn new(routes: Arc<Vec<Route>>) -> Self {
        TrackCircuitCtrl {
            state: CtrlState::Dummy,
            core: ReservationCore::new(routes),
            last_sensor_nonce: None,
        }
    }

    fn matches_current(&self, id: RouteId) -> bool {
        self.core.current_route().map(|route| route.id) == Some(id)
    }

    fn to_not_reserved(&mut self, actions: &mut Vec<CtrlAction>) {
        self.state = CtrlState::NotReserved;
        self.core.enter_not_reserved(actions);
    }
}

impl CtrlMachine for TrackCircuitCtrl {
    fn start(&mut self) -> Vec<CtrlAction> {
        let mut actions = Vec::new();
        self.state = CtrlState::NotReserved;
        self.core.enter_not_reserved(&mut actions);
        info!("[Ctrl] Track circuit FSM initialized");
        actions
    }

    fn state(&self) -> CtrlState {
        self.state
    }

    fn deadline(&self) -> Option<Timestamp> {
        self.core.deadline()
    }

    fn process_event(
        &mut self,
        event: CtrlEvent,
        now: Timestamp,
    ) -> Result<Vec<CtrlAction>, DixlError> {
        let mut actions = Vec::new();

        if self.state == CtrlState::Dummy {
            error!("[Ctrl] Wrong state Dummy: message received");
            return Err(DixlError::FsmWrongState);
        }

        // Diagnostic errors land in FailSafe from every state, silently.
        if event == CtrlEvent::DiagErr {
            if self.state != CtrlState::FailSafe {
                self.state = CtrlState::FailSafe;
                self.core.enter_fail_safe();
            }
            return Ok(actions);
        }

        // A request outside NotReserved is rejected and consumed.
        if let CtrlEvent::Route { kind: RouteEvent::Req, route_id, source } = event {
            if self.state != CtrlState::NotReserved {
                self.core.reject_route_request(source, route_id, &mut actions);
                return Ok(actions);
            }
        }

        match self.state {
            CtrlState::NotReserved => match event {
                CtrlEvent::Route { kind: RouteEvent::Req, route_id, source } => {
                    if !self.core.set_route(route_id) {
                        self.core.reject_route_request(source, route_id, &mut actions);
                    } else {
                        self.core.exit_not_reserved(source, &mut actions);
                        let position = self.core.current_route().map(|route| route.position);
                        match position {
                            Some(RoutePosition::First) | Some(RoutePosition::Middle) => {
                                self.state = CtrlState::WaitAck;
                                self.core.enter_wait_ack(now, &mut actions);
                            }
                            Some(RoutePosition::Last) => {
                                self.state = CtrlState::WaitCommit;
                                self.core.enter_wait_commit(now, &mut actions);
                            }
                            None => {}
                        }
                    }
                }
                other => debug!("[Ctrl] NotReserved: discarding {other:?}"),
            },

            CtrlState::WaitAck => match event {
                CtrlEvent::Route { kind: RouteEvent::Ack, route_id, .. }
                    if self.matches_current(route_id) =>
                {
                    let position = self.core.current_route().map(|route| route.position);
                    match position {
                        Some(RoutePosition::First) => {
                            self.state = CtrlState::WaitAgree;
                            self.core.enter_wait_agree(now, &mut actions);
                        }
                        Some(RoutePosition::Middle) => {
                            self.state = CtrlState::WaitCommit;
                            self.core.enter_wait_commit(now, &mut actions);
                        }
                        _ => warn!("[Ctrl] WaitAck: ACK in impossible role"),
                    }
                }
                CtrlEvent::Route { kind: RouteEvent::Nack, route_id, .. }
                    if self.matches_current(route_id) =>
                {
                    self.core.nack_retreat(&mut actions);
                    self.to_not_reserved(&mut actions);
                }
                CtrlEvent::Timeout => {
                    self.core.nack_retreat(&mut actions);
                    self.to_not_reserved(&mut actions);
                }
                other => debug!("[Ctrl] WaitAck: discarding {other:?}"),
            },

            CtrlState::WaitCommit => match event {
                CtrlEvent::Route { kind: RouteEvent::Commit, route_id, .. }
                    if self.matches_current(route_id) =>
                {
                    let position = self.core.current_route().map(|route| route.position);
                    match position {
                        Some(RoutePosition::Middle) => {
                            self.state = CtrlState::WaitAgree;
                            self.core.enter_wait_agree(now, &mut actions);
                        }
                        Some(RoutePosition::Last) => {
                            // Nothing to actuate: the track circuit reserves
                            // at once.
                            self.state = CtrlState::Reserved;
                            self.last_sensor_nonce = self.core.enter_reserved(now, &mut actions);
                        }
                        _ => warn!("[Ctrl] WaitCommit: COMMIT in impossible role"),
                    }
                }
                CtrlEvent::Route { kind: RouteEvent::Disagree, route_id, .. }
                    if self.matches_current(route_id) =>
                {
                    self.core.disagree_forward(&mut actions);
                    self.to_not_reserved(&mut actions);
                }
                CtrlEvent::Timeout => {
                    self.core.disagree_forward(&mut actions);
                    self.to_not_reserved(&mut actions);
                }
                other => debug!("[Ctrl] WaitCommit: discarding {other:?}"),
            },

            CtrlState::WaitAgree => match event {
                CtrlEvent::Route { kind: RouteEvent::Agree, route_id, .. }
                    if self.matches_current(route_id) =>
                {
                    self.state = CtrlState::Reserved;
                    self.last_sensor_nonce = self.core.enter_reserved(now, &mut actions);
                }
                CtrlEvent::Route { kind: RouteEvent::Disagree, route_id, .. }
                    if self.matches_current(route_id) =>
                {
                    self.core.disagree_back(&mut actions);
                    self.to_not_reserved(&mut actions);
                }
                CtrlEvent::Timeout => {
                    self.core.disagree_back(&mut actions);
                    self.to_not_reserved(&mut actions);
                }
                other => debug!("[Ctrl] WaitAgree: discarding {other:?}"),
            },

            CtrlState::Reserved => match event {
                CtrlEvent::SensorNotify { state, nonce }
                    if state == SensorState::On && Some(nonce) == self.last_sensor_nonce =>
                {
                    self.state = CtrlState::TrainInTransition;
                    self.last_sensor_nonce =
                        self.core.enter_train_in_transition(now, &mut actions);
                }
                CtrlEvent::Route { kind: RouteEvent::Disagree, route_id, .. }
                    if self.matches_current(route_id) =>
                {
                    self.core.disagree_forward(&mut actions);
                    self.to_not_reserved(&mut actions);
                }
                other => debug!("[Ctrl] Reserved: discarding {other:?}"),
            },

            CtrlState::TrainInTransition => match event {
                CtrlEvent::SensorNotify { state, nonce }
                    if state == SensorState::Off && Some(nonce) == self.last_sensor_nonce =>
                {
                    self.core.exit_train_in_transition(&mut actions);
                    self.to_not_reserved(&mut actions);
                }
                other => debug!("[Ctrl] TrainInTransition: discarding {other:?}"),
            },

            CtrlState::FailSafe => {
                debug!("[Ctrl] FailSafe: discarding {event:?}");
            }

            // Dummy is handled above; the track circuit never enters the
            // point-only states.
            CtrlState::Dummy | CtrlState::Positioning | CtrlState::Malfunction => {}
        }

        Ok(actions)
    }
}
