//! Reservation control state machines.
//!
//! Two variants share the states and the retreat semantics: the point
//! machine actuates the physical switch before agreeing, the track-circuit
//! machine reserves immediately. Entry and exit behaviour is expressed as
//! returned [`CtrlAction`]s; since neither can name a state, the engine
//! invariant that entry/exit never generate events holds by construction.

pub mod point;
pub mod track;

pub use point::PointCtrl;
pub use track::TrackCircuitCtrl;

use crate::common::{Nonce, Timestamp};
use crate::hal::DixlError;
use crate::logbuf::LogKind;
use crate::message::{ExtBody, ExtMessage, RouteMsgKind};
use crate::types::{
    COMM_MSG_TIMEOUT_MS, NodeId, PointPosition, Route, RouteId, RoutePosition, SensorState,
};
use alloc::sync::Arc;
use alloc::vec::Vec;
use log::{info, warn};

/// States of the reservation machine. The track-circuit variant never enters
/// Positioning or Malfunction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CtrlState {
    /// Pre-initialisation placeholder; receiving input here is fatal.
    Dummy,
    NotReserved,
    WaitAck,
    WaitCommit,
    WaitAgree,
    Positioning,
    Malfunction,
    Reserved,
    TrainInTransition,
    FailSafe,
}

/// Inbound route protocol message kinds a node can receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteEvent {
    Req,
    Ack,
    Nack,
    Commit,
    Agree,
    Disagree,
}

/// One event offered to the reservation machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CtrlEvent {
    Route { kind: RouteEvent, route_id: RouteId, source: NodeId },
    PointNotify { position: PointPosition, nonce: Nonce },
    SensorNotify { state: SensorState, nonce: Nonce },
    /// Synthetic event injected when the armed deadline expires.
    Timeout,
    /// DIAGERRCOMM / DIAGERRTASK; both force FailSafe.
    DiagErr,
}

impl CtrlEvent {
    /// Maps an inbound wire message to a control event, if it is one the
    /// machine consumes.
    pub fn from_ext(message: &ExtMessage) -> Option<CtrlEvent> {
        let kind = match message.body {
            ExtBody::RouteReq(_) => RouteEvent::Req,
            ExtBody::RouteAck(_) => RouteEvent::Ack,
            ExtBody::RouteNack(_) => RouteEvent::Nack,
            ExtBody::RouteCommit(_) => RouteEvent::Commit,
            ExtBody::RouteAgree(_) => RouteEvent::Agree,
            ExtBody::RouteDisagree(_) => RouteEvent::Disagree,
            _ => return None,
        };
        let route_id = match message.body {
            ExtBody::RouteReq(id)
            | ExtBody::RouteAck(id)
            | ExtBody::RouteNack(id)
            | ExtBody::RouteCommit(id)
            | ExtBody::RouteAgree(id)
            | ExtBody::RouteDisagree(id) => id,
            _ => return None,
        };
        Some(CtrlEvent::Route { kind, route_id, source: message.source })
    }
}

/// Effect requested by the machine; the Ctrl task performs it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CtrlAction {
    /// Hand a protocol message to CommTx.
    Send { kind: RouteMsgKind, destination: NodeId, route_id: RouteId },
    /// Command the point simulator to a position, tagged with a fresh nonce.
    CommandPoint { position: PointPosition, nonce: Nonce },
    /// Ask the sensor sampler to watch for a state, tagged with a fresh nonce.
    RequestSensor { target: SensorState, nonce: Nonce },
    /// Append a structured record to the log ring.
    Log { kind: LogKind, route_id: RouteId, source: NodeId },
}

/// Common interface of the two reservation machines.
pub trait CtrlMachine {
    /// Runs the initial transition out of Dummy into NotReserved.
    fn start(&mut self) -> Vec<CtrlAction>;

    fn state(&self) -> CtrlState;

    /// Deadline of the current wait state, if one is armed.
    fn deadline(&self) -> Option<Timestamp>;

    /// Offers one event; `now` both times log records and mints nonces.
    ///
    /// `Err(FsmWrongState)` is returned only for input in the Dummy state,
    /// which is fatal for the Ctrl task.
    fn process_event(
        &mut self,
        event: CtrlEvent,
        now: Timestamp,
    ) -> Result<Vec<CtrlAction>, DixlError>;
}

/// State shared by both machine variants: the immutable route list, the
/// index of the reservation in progress, and the armed deadline.
#[derive(Debug)]
pub(crate) struct ReservationCore {
    routes: Arc<Vec<Route>>,
    current: Option<usize>,
    deadline: Option<Timestamp>,
}

impl ReservationCore {
    pub(crate) fn new(routes: Arc<Vec<Route>>) -> Self {
        ReservationCore { routes, current: None, deadline: None }
    }

    pub(crate) fn deadline(&self) -> Option<Timestamp> {
        self.deadline
    }

    pub(crate) fn current_route(&self) -> Option<&Route> {
        self.current.map(|index| &self.routes[index])
    }

    pub(crate) fn find_route(&self, id: RouteId) -> Option<&Route> {
        self.routes.iter().find(|route| route.id == id)
    }

    /// Selects the requested route as the reservation in progress.
    pub(crate) fn set_route(&mut self, id: RouteId) -> bool {
        self.current = self.routes.iter().position(|route| route.id == id);
        if self.current.is_none() {
            warn!("[Ctrl] Requested route id ({id}) not found");
        }
        self.current.is_some()
    }

    pub(crate) fn arm_deadline(&mut self, now: Timestamp) {
        self.deadline = Some(now.add_millis(COMM_MSG_TIMEOUT_MS));
    }

    pub(crate) fn clear_deadline(&mut self) {
        self.deadline = None;
    }

    /// NotReserved entry: reservation and deadline cleared.
    pub(crate) fn enter_not_reserved(&mut self, actions: &mut Vec<CtrlAction>) {
        self.current = None;
        self.deadline = None;
        info!("[Ctrl] Request cleaned");
        actions.push(CtrlAction::Log {
            kind: LogKind::NotReserved,
            route_id: RouteId(0),
            source: NodeId::NULL,
        });
    }

    /// FailSafe entry: absorbing, nothing reserved any more.
    pub(crate) fn enter_fail_safe(&mut self) {
        self.current = None;
        self.deadline = None;
        log::error!("[Ctrl] Node is going in fail-safe mode, all subsequent requests will be rejected");
    }

    /// Replies to a route request that cannot be served: NACK toward the
    /// requester, TRAINNOK when this node is FIRST for that route (the
    /// requester is the host).
    pub(crate) fn reject_route_request(
        &self,
        source: NodeId,
        route_id: RouteId,
        actions: &mut Vec<CtrlAction>,
    ) {
        actions.push(CtrlAction::Log { kind: LogKind::Req, route_id, source });
        match self.find_route(route_id).map(|route| route.position) {
            Some(RoutePosition::First) => {
                info!("[Ctrl] Sending TRAINNOK for route ({route_id}) to host node ({source})");
                actions.push(CtrlAction::Send {
                    kind: RouteMsgKind::TrainNok,
                    destination: source,
                    route_id,
                });
                actions.push(CtrlAction::Log {
                    kind: LogKind::Disagree,
                    route_id,
                    source: NodeId::NULL,
                });
            }
            _ => {
                info!("[Ctrl] Sending NACK for route ({route_id}) to node ({source})");
                actions.push(CtrlAction::Send {
                    kind: RouteMsgKind::Nack,
                    destination: source,
                    route_id,
                });
                actions.push(CtrlAction::Log {
                    kind: LogKind::ReqNack,
                    route_id,
                    source: NodeId::NULL,
                });
            }
        }
    }

    /// NotReserved exit on an accepted request: the request is on record.
    pub(crate) fn exit_not_reserved(&self, source: NodeId, actions: &mut Vec<CtrlAction>) {
        if let Some(route) = self.current_route() {
            if route.position != RoutePosition::Last {
                info!(
                    "[Ctrl] Received route request ({}) propagating to next node ({})",
                    route.id, route.next
                );
            } else {
                info!("[Ctrl] Received route request ({}) not propagating (last)", route.id);
            }
            actions.push(CtrlAction::Log { kind: LogKind::Req, route_id: route.id, source });
        }
    }

    /// WaitAck entry: REQ forwarded to the next node, deadline armed.
    pub(crate) fn enter_wait_ack(&mut self, now: Timestamp, actions: &mut Vec<CtrlAction>) {
        if let Some(route) = self.current_route() {
            actions.push(CtrlAction::Send {
                kind: RouteMsgKind::Req,
                destination: route.next,
                route_id: route.id,
            });
        }
        self.arm_deadline(now);
    }

    /// WaitCommit entry: ACK returned to the previous node, deadline armed.
    pub(crate) fn enter_wait_commit(&mut self, now: Timestamp, actions: &mut Vec<CtrlAction>) {
        if let Some(route) = self.current_route() {
            info!(
                "[Ctrl] Route request ({}) ACKed sending back ACK to previous node ({})",
                route.id, route.prev
            );
            actions.push(CtrlAction::Send {
                kind: RouteMsgKind::Ack,
                destination: route.prev,
                route_id: route.id,
            });
        }
        self.arm_deadline(now);
    }

    /// WaitAgree entry: COMMIT forwarded to the next node, deadline armed.
    pub(crate) fn enter_wait_agree(&mut self, now: Timestamp, actions: &mut Vec<CtrlAction>) {
        if let Some(route) = self.current_route() {
            info!(
                "[Ctrl] Route request ({}) COMMITed forwarding COMMIT to next node ({})",
                route.id, route.next
            );
            actions.push(CtrlAction::Send {
                kind: RouteMsgKind::Commit,
                destination: route.next,
                route_id: route.id,
            });
        }
        self.arm_deadline(now);
    }

    /// Reserved entry: TRAINOK to the host when FIRST, AGREE backwards
    /// otherwise, then the sensor is asked for the train (ON) with a fresh
    /// nonce.
    pub(crate) fn enter_reserved(
        &mut self,
        now: Timestamp,
        actions: &mut Vec<CtrlAction>,
    ) -> Option<Nonce> {
        let route = self.current_route()?;
        if route.position == RoutePosition::First {
            info!(
                "[Ctrl] Route request ({}) TRAIN OK reached sending back to host node ({})",
                route.id, route.prev
            );
            actions.push(CtrlAction::Send {
                kind: RouteMsgKind::TrainOk,
                destination: route.prev,
                route_id: route.id,
            });
        } else {
            info!(
                "[Ctrl] Route request ({}) AGREEed sending back AGREE to prev node ({})",
                route.id, route.prev
            );
            actions.push(CtrlAction::Send {
                kind: RouteMsgKind::Agree,
                destination: route.prev,
                route_id: route.id,
            });
        }
        actions.push(CtrlAction::Log {
            kind: LogKind::Reserved,
            route_id: route.id,
            source: NodeId::NULL,
        });

        let route_id = route.id;
        info!("[Ctrl] Route request ({route_id}) waiting for SENSOR ON");
        actions.push(CtrlAction::RequestSensor { target: SensorState::On, nonce: now });
        self.clear_deadline();
        Some(now)
    }

    /// TrainInTransition entry: watch for the sensor falling back OFF.
    pub(crate) fn enter_train_in_transition(
        &mut self,
        now: Timestamp,
        actions: &mut Vec<CtrlAction>,
    ) -> Option<Nonce> {
        if let Some(route) = self.current_route() {
            info!("[Ctrl] Route request ({}) TRAIN IS GOING THROUGH", route.id);
        }
        actions.push(CtrlAction::RequestSensor { target: SensorState::Off, nonce: now });
        self.clear_deadline();
        Some(now)
    }

    /// TrainInTransition exit on the OFF notification: the track is free.
    pub(crate) fn exit_train_in_transition(&self, actions: &mut Vec<CtrlAction>) {
        if let Some(route) = self.current_route() {
            info!("[Ctrl] Route request ({}) SENSOR OFF received", route.id);
            actions.push(CtrlAction::Log {
                kind: LogKind::Freed,
                route_id: route.id,
                source: NodeId::NULL,
            });
        }
    }

    /// Retreat after a NACK (or the equivalent timeout) in WaitAck: TRAINNOK
    /// to the host when FIRST, NACK backwards otherwise.
    pub(crate) fn nack_retreat(&self, actions: &mut Vec<CtrlAction>) {
        let Some(route) = self.current_route() else { return };
        if route.position == RoutePosition::First {
            info!(
                "[Ctrl] Received NACK for route ({}) sending back TRAINNOK to host node ({})",
                route.id, route.prev
            );
            actions.push(CtrlAction::Send {
                kind: RouteMsgKind::TrainNok,
                destination: route.prev,
                route_id: route.id,
            });
            actions.push(CtrlAction::Log {
                kind: LogKind::Disagree,
                route_id: route.id,
                source: NodeId::NULL,
            });
        } else {
            info!(
                "[Ctrl] Received NACK for route ({}) sending back NACK to previous node ({})",
                route.id, route.prev
            );
            actions.push(CtrlAction::Send {
                kind: RouteMsgKind::Nack,
                destination: route.prev,
                route_id: route.id,
            });
            actions.push(CtrlAction::Log {
                kind: LogKind::ReqNack,
                route_id: route.id,
                source: NodeId::NULL,
            });
        }
    }

    /// Retreat after a DISAGREE (or timeout) in WaitAgree: TRAINNOK to the
    /// host when FIRST, DISAGREE backwards otherwise.
    pub(crate) fn disagree_back(&self, actions: &mut Vec<CtrlAction>) {
        let Some(route) = self.current_route() else { return };
        if route.position == RoutePosition::First {
            info!(
                "[Ctrl] Received DISAGREE for route ({}) sending back TRAINNOK to host node ({})",
                route.id, route.prev
            );
            actions.push(CtrlAction::Send {
                kind: RouteMsgKind::TrainNok,
                destination: route.prev,
                route_id: route.id,
            });
        } else {
            info!(
                "[Ctrl] Received DISAGREE for route ({}) sending back DISAGREE to previous node ({})",
                route.id, route.prev
            );
            actions.push(CtrlAction::Send {
                kind: RouteMsgKind::Disagree,
                destination: route.prev,
                route_id: route.id,
            });
        }
        actions.push(CtrlAction::Log {
            kind: LogKind::Disagree,
            route_id: route.id,
            source: NodeId::NULL,
        });
    }

    /// Retreat after a DISAGREE (or timeout) past the ACK phase: the abort
    /// is propagated downstream unless this node is LAST.
    pub(crate) fn disagree_forward(&self, actions: &mut Vec<CtrlAction>) {
        let Some(route) = self.current_route() else { return };
        if route.position != RoutePosition::Last {
            info!(
                "[Ctrl] Received DISAGREE for route ({}) forwarding DISAGREE to next node ({})",
                route.id, route.next
            );
            actions.push(CtrlAction::Send {
                kind: RouteMsgKind::Disagree,
                destination: route.next,
                route_id: route.id,
            });
        } else {
            info!("[Ctrl] Received DISAGREE for route ({}) not forwarding (last)", route.id);
        }
        actions.push(CtrlAction::Log {
            kind: LogKind::Disagree,
            route_id: route.id,
            source: NodeId::NULL,
        });
    }
}
