use super::{
    CtrlAction, CtrlEvent, CtrlMachine, CtrlState, ReservationCore, RouteEvent,
};
use crate::common::{Nonce, Timestamp};
use crate::hal::DixlError;
use crate::logbuf::LogKind;
use crate::message::RouteMsgKind;
use crate::types::{NodeId, Route, RouteId, RoutePosition};
use alloc::sync::Arc;
use alloc::vec::Vec;
use log::{debug, error, info, warn};

/// Reservation machine for a point node.
///
/// The full cycle actuates the physical switch between the agreement and the
/// reservation: WaitAgree/WaitCommit lead into Positioning, whose outcome
/// decides between Reserved and Malfunction.
pub struct PointCtrl {
    state: CtrlState,
    core: ReservationCore,
    /// Nonce of the last point position request (the expected one).
    last_point_nonce: Option<Nonce>,
    /// Nonce of the last sensor request (the expected one).
    last_sensor_nonce: Option<Nonce>,
}

impl PointCtrl {
    pub fn new(routes: Arc<Vec<Route>>) -> Self {
        PointCtrl {
            state: CtrlState::Dummy,
            core: ReservationCore::new(routes),
            last_point_nonce: None,
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

    /// Positioning entry: the single actuation of the reservation cycle.
    fn enter_positioning(&mut self, now: Timestamp, actions: &mut Vec<CtrlAction>) {
        if let Some(route) = self.core.current_route() {
            info!(
                "[Ctrl] Route request ({}) AGREEed requesting {} positioning to Point",
                route.id, route.requested_position
            );
            actions.push(CtrlAction::CommandPoint {
                position: route.requested_position,
                nonce: now,
            });
        }
        self.last_point_nonce = Some(now);
        self.core.clear_deadline();
    }

    /// Malfunction entry followed by the immediate slide into FailSafe.
    ///
    /// The reservation is aborted on both sides before the node seals
    /// itself: TRAINNOK/DISAGREE backwards, DISAGREE forwards unless LAST.
    fn to_malfunction_then_fail_safe(&mut self, actions: &mut Vec<CtrlAction>) {
        self.state = CtrlState::Malfunction;
        if let Some(route) = self.core.current_route() {
            if route.position == RoutePosition::First {
                info!(
                    "[Ctrl] Route request ({}) MALFUNCTION reached sending TRAINNOK to host node ({})",
                    route.id, route.prev
                );
                actions.push(CtrlAction::Send {
                    kind: RouteMsgKind::TrainNok,
                    destination: route.prev,
                    route_id: route.id,
                });
            } else {
                info!(
                    "[Ctrl] Route request ({}) MALFUNCTION reached sending back DISAGREE to prev node ({})",
                    route.id, route.prev
                );
                actions.push(CtrlAction::Send {
                    kind: RouteMsgKind::Disagree,
                    destination: route.prev,
                    route_id: route.id,
                });
            }
            actions.push(CtrlAction::Log {
                kind: LogKind::Malfunction,
                route_id: RouteId(0),
                source: NodeId::NULL,
            });
            actions.push(CtrlAction::Log {
                kind: LogKind::Disagree,
                route_id: route.id,
                source: NodeId::NULL,
            });
            if route.position != RoutePosition::Last {
                info!(
                    "[Ctrl] Route request ({}) MALFUNCTION reached sending DISAGREE to next node ({})",
                    route.id, route.next
                );
                actions.push(CtrlAction::Send {
                    kind: RouteMsgKind::Disagree,
                    destination: route.next,
                    route_id: route.id,
                });
            } else {
                info!(
                    "[Ctrl] Route request ({}) MALFUNCTION reached not propagating (last)",
                    route.id
                );
            }
        }
        self.core.clear_deadline();

        // Malfunction never rests: the node seals itself.
        self.state = CtrlState::FailSafe;
        self.core.enter_fail_safe();
    }
}

impl CtrlMachine for PointCtrl {
    fn start(&mut self) -> Vec<CtrlAction> {
        let mut actions = Vec::new();
        self.state = CtrlState::NotReserved;
        self.core.enter_not_reserved(&mut actions);
        info!("[Ctrl] Point FSM initialized");
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
                            self.state = CtrlState::Positioning;
                            self.enter_positioning(now, &mut actions);
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
                    self.state = CtrlState::Positioning;
                    self.enter_positioning(now, &mut actions);
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

            CtrlState::Positioning => match event {
                CtrlEvent::PointNotify { position, nonce } => {
                    if position.is_undefined() {
                        self.to_malfunction_then_fail_safe(&mut actions);
                    } else if Some(nonce) == self.last_point_nonce {
                        let requested =
                            self.core.current_route().map(|route| route.requested_position);
                        if Some(position) == requested {
                            self.state = CtrlState::Reserved;
                            self.last_sensor_nonce =
                                self.core.enter_reserved(now, &mut actions);
                        } else {
                            // Matched nonce with the wrong position: the
                            // actuator lies about where it stopped.
                            self.to_malfunction_then_fail_safe(&mut actions);
                        }
                    } else {
                        debug!("[Ctrl] Positioning: stale POINTNOTIFY discarded");
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
                other => debug!("[Ctrl] Positioning: discarding {other:?}"),
            },

            CtrlState::Reserved => match event {
                CtrlEvent::SensorNotify { state, nonce }
                    if state == crate::types::SensorState::On
                        && Some(nonce) == self.last_sensor_nonce =>
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
                    if state == crate::types::SensorState::Off
                        && Some(nonce) == self.last_sensor_nonce =>
                {
                    self.core.exit_train_in_transition(&mut actions);
                    self.to_not_reserved(&mut actions);
                }
                other => debug!("[Ctrl] TrainInTransition: discarding {other:?}"),
            },

            CtrlState::FailSafe => {
                debug!("[Ctrl] FailSafe: discarding {event:?}");
            }

            // Dummy is handled above; Malfunction never rests between events.
            CtrlState::Dummy | CtrlState::Malfunction => {}
        }

        Ok(actions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PointPosition, SensorState};
    use alloc::vec;

    const HOST: NodeId = NodeId::new(192, 168, 1, 100);
    const NODE_B: NodeId = NodeId::new(10, 0, 0, 2);
    const NODE_C: NodeId = NodeId::new(10, 0, 0, 3);

    fn first_route() -> Route {
        Route {
            id: RouteId(42),
            prev: HOST,
            next: NODE_B,
            position: RoutePosition::First,
            requested_position: PointPosition::DIVERGING,
        }
    }

    fn middle_route() -> Route {
        Route {
            id: RouteId(42),
            prev: NODE_B,
            next: NODE_C,
            position: RoutePosition::Middle,
            requested_position: PointPosition::STRAIGHT,
        }
    }

    fn last_route() -> Route {
        Route {
            id: RouteId(42),
            prev: NODE_B,
            next: NodeId::NULL,
            position: RoutePosition::Last,
            requested_position: PointPosition::DIVERGING,
        }
    }

    fn machine(routes: Vec<Route>) -> PointCtrl {
        let mut ctrl = PointCtrl::new(Arc::new(routes));
        ctrl.start();
        ctrl
    }

    fn at(secs: i64) -> Timestamp {
        Timestamp::new(secs, 0)
    }

    fn req(route: u32, source: NodeId) -> CtrlEvent {
        CtrlEvent::Route { kind: RouteEvent::Req, route_id: RouteId(route), source }
    }

    fn route_event(kind: RouteEvent, route: u32, source: NodeId) -> CtrlEvent {
        CtrlEvent::Route { kind, route_id: RouteId(route), source }
    }

    fn sent(actions: &[CtrlAction]) -> Vec<(RouteMsgKind, NodeId, RouteId)> {
        actions
            .iter()
            .filter_map(|action| match action {
                CtrlAction::Send { kind, destination, route_id } => {
                    Some((*kind, *destination, *route_id))
                }
                _ => None,
            })
            .collect()
    }

    fn point_nonce(actions: &[CtrlAction]) -> Nonce {
        actions
            .iter()
            .find_map(|action| match action {
                CtrlAction::CommandPoint { nonce, .. } => Some(*nonce),
                _ => None,
            })
            .expect("point command expected")
    }

    fn sensor_nonce(actions: &[CtrlAction]) -> Nonce {
        actions
            .iter()
            .find_map(|action| match action {
                CtrlAction::RequestSensor { nonce, .. } => Some(*nonce),
                _ => None,
            })
            .expect("sensor request expected")
    }

    #[test]
    fn first_node_full_cycle_reaches_not_reserved_again() {
        let mut ctrl = machine(vec![first_route()]);

        let actions = ctrl.process_event(req(42, HOST), at(1)).unwrap();
        assert_eq!(ctrl.state(), CtrlState::WaitAck);
        assert_eq!(sent(&actions), vec![(RouteMsgKind::Req, NODE_B, RouteId(42))]);
        assert!(ctrl.deadline().is_some());

        let actions = ctrl
            .process_event(route_event(RouteEvent::Ack, 42, NODE_B), at(2))
            .unwrap();
        assert_eq!(ctrl.state(), CtrlState::WaitAgree);
        assert_eq!(sent(&actions), vec![(RouteMsgKind::Commit, NODE_B, RouteId(42))]);

        let actions = ctrl
            .process_event(route_event(RouteEvent::Agree, 42, NODE_B), at(3))
            .unwrap();
        assert_eq!(ctrl.state(), CtrlState::Positioning);
        assert!(ctrl.deadline().is_none());
        let t_point = point_nonce(&actions);

        // The point reports the commanded position with the right nonce.
        let actions = ctrl
            .process_event(
                CtrlEvent::PointNotify { position: PointPosition::DIVERGING, nonce: t_point },
                at(7),
            )
            .unwrap();
        assert_eq!(ctrl.state(), CtrlState::Reserved);
        assert_eq!(sent(&actions), vec![(RouteMsgKind::TrainOk, HOST, RouteId(42))]);
        let t_on = sensor_nonce(&actions);

        let actions = ctrl
            .process_event(CtrlEvent::SensorNotify { state: SensorState::On, nonce: t_on }, at(9))
            .unwrap();
        assert_eq!(ctrl.state(), CtrlState::TrainInTransition);
        let t_off = sensor_nonce(&actions);

        let actions = ctrl
            .process_event(
                CtrlEvent::SensorNotify { state: SensorState::Off, nonce: t_off },
                at(12),
            )
            .unwrap();
        assert_eq!(ctrl.state(), CtrlState::NotReserved);
        assert!(actions.iter().any(|action| matches!(
            action,
            CtrlAction::Log { kind: LogKind::Freed, .. }
        )));
    }

    #[test]
    fn middle_node_relays_both_directions() {
        let mut ctrl = machine(vec![middle_route()]);

        let actions = ctrl.process_event(req(42, NODE_B), at(1)).unwrap();
        assert_eq!(ctrl.state(), CtrlState::WaitAck);
        assert_eq!(sent(&actions), vec![(RouteMsgKind::Req, NODE_C, RouteId(42))]);

        let actions = ctrl
            .process_event(route_event(RouteEvent::Ack, 42, NODE_C), at(2))
            .unwrap();
        assert_eq!(ctrl.state(), CtrlState::WaitCommit);
        assert_eq!(sent(&actions), vec![(RouteMsgKind::Ack, NODE_B, RouteId(42))]);

        let actions = ctrl
            .process_event(route_event(RouteEvent::Commit, 42, NODE_B), at(3))
            .unwrap();
        assert_eq!(ctrl.state(), CtrlState::WaitAgree);
        assert_eq!(sent(&actions), vec![(RouteMsgKind::Commit, NODE_C, RouteId(42))]);

        let actions = ctrl
            .process_event(route_event(RouteEvent::Agree, 42, NODE_C), at(4))
            .unwrap();
        assert_eq!(ctrl.state(), CtrlState::Positioning);
        let t_point = point_nonce(&actions);

        let actions = ctrl
            .process_event(
                CtrlEvent::PointNotify { position: PointPosition::STRAIGHT, nonce: t_point },
                at(5),
            )
            .unwrap();
        assert_eq!(ctrl.state(), CtrlState::Reserved);
        assert_eq!(sent(&actions), vec![(RouteMsgKind::Agree, NODE_B, RouteId(42))]);
    }

    #[test]
    fn last_node_skips_wait_ack_and_wait_agree() {
        let mut ctrl = machine(vec![last_route()]);

        let actions = ctrl.process_event(req(42, NODE_B), at(1)).unwrap();
        assert_eq!(ctrl.state(), CtrlState::WaitCommit);
        assert_eq!(sent(&actions), vec![(RouteMsgKind::Ack, NODE_B, RouteId(42))]);

        let actions = ctrl
            .process_event(route_event(RouteEvent::Commit, 42, NODE_B), at(2))
            .unwrap();
        assert_eq!(ctrl.state(), CtrlState::Positioning);
        let t_point = point_nonce(&actions);

        let actions = ctrl
            .process_event(
                CtrlEvent::PointNotify { position: PointPosition::DIVERGING, nonce: t_point },
                at(3),
            )
            .unwrap();
        assert_eq!(ctrl.state(), CtrlState::Reserved);
        // LAST agrees backwards; there is nobody to forward to.
        assert_eq!(sent(&actions), vec![(RouteMsgKind::Agree, NODE_B, RouteId(42))]);
    }

    #[test]
    fn stale_point_notify_is_ignored() {
        let mut ctrl = machine(vec![first_route()]);
        ctrl.process_event(req(42, HOST), at(1)).unwrap();
        ctrl.process_event(route_event(RouteEvent::Ack, 42, NODE_B), at(2)).unwrap();
        let actions = ctrl
            .process_event(route_event(RouteEvent::Agree, 42, NODE_B), at(3))
            .unwrap();
        let t1 = point_nonce(&actions);

        // A delayed notification carrying an older nonce arrives.
        let t0 = at(0);
        assert_ne!(t0, t1);
        let actions = ctrl
            .process_event(
                CtrlEvent::PointNotify { position: PointPosition::STRAIGHT, nonce: t0 },
                at(4),
            )
            .unwrap();
        assert_eq!(ctrl.state(), CtrlState::Positioning);
        assert!(actions.is_empty());
    }

    #[test]
    fn undefined_position_aborts_to_fail_safe() {
        let mut ctrl = machine(vec![first_route(), Route {
            id: RouteId(43),
            prev: NODE_B,
            next: NODE_C,
            position: RoutePosition::Middle,
            requested_position: PointPosition::STRAIGHT,
        }]);
        ctrl.process_event(req(42, HOST), at(1)).unwrap();
        ctrl.process_event(route_event(RouteEvent::Ack, 42, NODE_B), at(2)).unwrap();
        let actions = ctrl
            .process_event(route_event(RouteEvent::Agree, 42, NODE_B), at(3))
            .unwrap();
        let t1 = point_nonce(&actions);

        let actions = ctrl
            .process_event(
                CtrlEvent::PointNotify { position: PointPosition::UNDEFINED, nonce: t1 },
                at(4),
            )
            .unwrap();
        assert_eq!(ctrl.state(), CtrlState::FailSafe);
        // FIRST tells the host, and there is a next node to abort.
        assert_eq!(
            sent(&actions),
            vec![
                (RouteMsgKind::TrainNok, HOST, RouteId(42)),
                (RouteMsgKind::Disagree, NODE_B, RouteId(42)),
            ]
        );
        assert!(actions.iter().any(|action| matches!(
            action,
            CtrlAction::Log { kind: LogKind::Malfunction, .. }
        )));

        // A subsequent request for another route is refused with NACK.
        let actions = ctrl.process_event(req(43, NODE_B), at(5)).unwrap();
        assert_eq!(ctrl.state(), CtrlState::FailSafe);
        assert_eq!(sent(&actions), vec![(RouteMsgKind::Nack, NODE_B, RouteId(43))]);
    }

    #[test]
    fn mismatched_settled_position_is_a_malfunction() {
        let mut ctrl = machine(vec![last_route()]);
        ctrl.process_event(req(42, NODE_B), at(1)).unwrap();
        let actions = ctrl
            .process_event(route_event(RouteEvent::Commit, 42, NODE_B), at(2))
            .unwrap();
        let t1 = point_nonce(&actions);

        let actions = ctrl
            .process_event(
                CtrlEvent::PointNotify { position: PointPosition::STRAIGHT, nonce: t1 },
                at(3),
            )
            .unwrap();
        assert_eq!(ctrl.state(), CtrlState::FailSafe);
        // LAST has no next node: only the backward DISAGREE goes out.
        assert_eq!(sent(&actions), vec![(RouteMsgKind::Disagree, NODE_B, RouteId(42))]);
    }

    #[test]
    fn timeout_in_wait_agree_retreats_to_host() {
        let mut ctrl = machine(vec![first_route()]);
        ctrl.process_event(req(42, HOST), at(1)).unwrap();
        ctrl.process_event(route_event(RouteEvent::Ack, 42, NODE_B), at(2)).unwrap();
        assert_eq!(ctrl.state(), CtrlState::WaitAgree);

        let actions = ctrl.process_event(CtrlEvent::Timeout, at(8)).unwrap();
        assert_eq!(ctrl.state(), CtrlState::NotReserved);
        assert_eq!(sent(&actions), vec![(RouteMsgKind::TrainNok, HOST, RouteId(42))]);
        assert!(ctrl.deadline().is_none());
    }

    #[test]
    fn nack_in_wait_ack_propagates_backwards_for_middle() {
        let mut ctrl = machine(vec![middle_route()]);
        ctrl.process_event(req(42, NODE_B), at(1)).unwrap();

        let actions = ctrl
            .process_event(route_event(RouteEvent::Nack, 42, NODE_C), at(2))
            .unwrap();
        assert_eq!(ctrl.state(), CtrlState::NotReserved);
        assert_eq!(sent(&actions), vec![(RouteMsgKind::Nack, NODE_B, RouteId(42))]);
    }

    #[test]
    fn request_while_busy_is_rejected_without_state_change() {
        let mut ctrl = machine(vec![first_route(), Route {
            id: RouteId(43),
            prev: NODE_B,
            next: NODE_C,
            position: RoutePosition::Middle,
            requested_position: PointPosition::STRAIGHT,
        }]);
        ctrl.process_event(req(42, HOST), at(1)).unwrap();
        assert_eq!(ctrl.state(), CtrlState::WaitAck);

        let actions = ctrl.process_event(req(43, NODE_B), at(2)).unwrap();
        assert_eq!(ctrl.state(), CtrlState::WaitAck);
        assert_eq!(sent(&actions), vec![(RouteMsgKind::Nack, NODE_B, RouteId(43))]);
    }

    #[test]
    fn unknown_route_request_is_refused() {
        let mut ctrl = machine(vec![middle_route()]);
        let actions = ctrl.process_event(req(99, NODE_B), at(1)).unwrap();
        assert_eq!(ctrl.state(), CtrlState::NotReserved);
        assert_eq!(sent(&actions), vec![(RouteMsgKind::Nack, NODE_B, RouteId(99))]);
    }

    #[test]
    fn wrong_route_id_replies_are_discarded() {
        let mut ctrl = machine(vec![first_route()]);
        ctrl.process_event(req(42, HOST), at(1)).unwrap();

        let actions = ctrl
            .process_event(route_event(RouteEvent::Ack, 7, NODE_B), at(2))
            .unwrap();
        assert_eq!(ctrl.state(), CtrlState::WaitAck);
        assert!(actions.is_empty());
    }

    #[test]
    fn diag_error_is_absorbing_fail_safe() {
        let mut ctrl = machine(vec![first_route()]);
        let actions = ctrl.process_event(CtrlEvent::DiagErr, at(1)).unwrap();
        assert_eq!(ctrl.state(), CtrlState::FailSafe);
        assert!(actions.is_empty());

        // Every non-request event leaves the state untouched.
        for event in [
            route_event(RouteEvent::Ack, 42, NODE_B),
            route_event(RouteEvent::Commit, 42, NODE_B),
            route_event(RouteEvent::Agree, 42, NODE_B),
            route_event(RouteEvent::Disagree, 42, NODE_B),
            CtrlEvent::Timeout,
            CtrlEvent::DiagErr,
            CtrlEvent::PointNotify { position: PointPosition::DIVERGING, nonce: at(9) },
            CtrlEvent::SensorNotify { state: SensorState::On, nonce: at(9) },
        ] {
            let actions = ctrl.process_event(event, at(2)).unwrap();
            assert_eq!(ctrl.state(), CtrlState::FailSafe);
            assert!(actions.is_empty());
        }
    }

    #[test]
    fn input_in_dummy_state_is_fatal() {
        let mut ctrl = PointCtrl::new(Arc::new(vec![first_route()]));
        let result = ctrl.process_event(req(42, HOST), at(1));
        assert_eq!(result, Err(DixlError::FsmWrongState));
    }

    #[test]
    fn disagree_in_reserved_aborts_and_forwards() {
        let mut ctrl = machine(vec![middle_route()]);
        ctrl.process_event(req(42, NODE_B), at(1)).unwrap();
        ctrl.process_event(route_event(RouteEvent::Ack, 42, NODE_C), at(2)).unwrap();
        ctrl.process_event(route_event(RouteEvent::Commit, 42, NODE_B), at(3)).unwrap();
        let actions = ctrl
            .process_event(route_event(RouteEvent::Agree, 42, NODE_C), at(4))
            .unwrap();
        let t_point = point_nonce(&actions);
        ctrl.process_event(
            CtrlEvent::PointNotify { position: PointPosition::STRAIGHT, nonce: t_point },
            at(5),
        )
        .unwrap();
        assert_eq!(ctrl.state(), CtrlState::Reserved);

        let actions = ctrl
            .process_event(route_event(RouteEvent::Disagree, 42, NODE_B), at(6))
            .unwrap();
        assert_eq!(ctrl.state(), CtrlState::NotReserved);
        assert_eq!(sent(&actions), vec![(RouteMsgKind::Disagree, NODE_C, RouteId(42))]);
    }
}
