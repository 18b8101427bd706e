//! Drives a chain of sans-IO reservation machines over a virtual network,
//! asserting the protocol walk of full reservations and refusals.

use dixl_rs::fsm::ctrl::{
    CtrlAction, CtrlEvent, CtrlMachine, CtrlState, PointCtrl, RouteEvent, TrackCircuitCtrl,
};
use dixl_rs::message::RouteMsgKind;
use dixl_rs::{NodeId, PointPosition, Route, RouteId, RoutePosition, SensorState, Timestamp};

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

const HOST: NodeId = NodeId::new(192, 168, 1, 100);
const NODE_A: NodeId = NodeId::new(10, 0, 0, 1);
const NODE_B: NodeId = NodeId::new(10, 0, 0, 2);
const NODE_C: NodeId = NodeId::new(10, 0, 0, 3);

/// A protocol message in flight on the virtual network.
#[derive(Debug, Clone, Copy)]
struct Packet {
    kind: RouteMsgKind,
    route_id: RouteId,
    source: NodeId,
    destination: NodeId,
}

/// One node under test: its machine plus the latest pending device requests.
struct Harness {
    machine: Box<dyn CtrlMachine>,
    pending_sensor: Option<(SensorState, Timestamp)>,
    pending_point: Option<(PointPosition, Timestamp)>,
}

/// Virtual chain: delivers packets between machines and records everything
/// addressed to the host.
struct Chain {
    nodes: HashMap<NodeId, Harness>,
    in_flight: VecDeque<Packet>,
    to_host: Vec<(RouteMsgKind, RouteId)>,
    clock: i64,
}

fn tc(routes: Vec<Route>) -> Box<dyn CtrlMachine> {
    Box::new(TrackCircuitCtrl::new(Arc::new(routes)))
}

fn point(routes: Vec<Route>) -> Box<dyn CtrlMachine> {
    Box::new(PointCtrl::new(Arc::new(routes)))
}

impl Chain {
    fn new(nodes: Vec<(NodeId, Box<dyn CtrlMachine>)>) -> Self {
        let mut map = HashMap::new();
        for (id, mut machine) in nodes {
            machine.start();
            map.insert(id, Harness { machine, pending_sensor: None, pending_point: None });
        }
        Chain { nodes: map, in_flight: VecDeque::new(), to_host: Vec::new(), clock: 0 }
    }

    fn now(&mut self) -> Timestamp {
        self.clock += 1;
        Timestamp::new(self.clock, 0)
    }

    fn state_of(&self, id: NodeId) -> CtrlState {
        self.nodes[&id].machine.state()
    }

    fn inject(&mut self, packet: Packet) {
        self.in_flight.push_back(packet);
    }

    fn request(&mut self, first: NodeId, route_id: u32) {
        self.inject(Packet {
            kind: RouteMsgKind::Req,
            route_id: RouteId(route_id),
            source: HOST,
            destination: first,
        });
        self.pump();
    }

    fn deliver(&mut self, node: NodeId, event: CtrlEvent) {
        let now = self.now();
        let actions = {
            let harness = self.nodes.get_mut(&node).expect("unknown node");
            harness.machine.process_event(event, now).expect("machine input")
        };
        self.apply(node, actions);
    }

    fn apply(&mut self, node: NodeId, actions: Vec<CtrlAction>) {
        for action in actions {
            match action {
                CtrlAction::Send { kind, destination, route_id } => {
                    self.in_flight.push_back(Packet {
                        kind,
                        route_id,
                        source: node,
                        destination,
                    });
                }
                CtrlAction::RequestSensor { target, nonce } => {
                    self.nodes.get_mut(&node).unwrap().pending_sensor = Some((target, nonce));
                }
                CtrlAction::CommandPoint { position, nonce } => {
                    self.nodes.get_mut(&node).unwrap().pending_point = Some((position, nonce));
                }
                CtrlAction::Log { .. } => {}
            }
        }
    }

    /// Delivers packets until the network is quiet.
    fn pump(&mut self) {
        while let Some(packet) = self.in_flight.pop_front() {
            if packet.destination == HOST {
                self.to_host.push((packet.kind, packet.route_id));
                continue;
            }
            if !self.nodes.contains_key(&packet.destination) {
                panic!("packet to unknown node {:?}", packet.destination);
            }
            let kind = match packet.kind {
                RouteMsgKind::Req => RouteEvent::Req,
                RouteMsgKind::Ack => RouteEvent::Ack,
                RouteMsgKind::Nack => RouteEvent::Nack,
                RouteMsgKind::Commit => RouteEvent::Commit,
                RouteMsgKind::Agree => RouteEvent::Agree,
                RouteMsgKind::Disagree => RouteEvent::Disagree,
                RouteMsgKind::TrainOk | RouteMsgKind::TrainNok => {
                    panic!("train reports are host-bound")
                }
            };
            self.deliver(
                packet.destination,
                CtrlEvent::Route { kind, route_id: packet.route_id, source: packet.source },
            );
        }
    }

    /// Makes the node's occupancy sensor observe the state it is waiting for.
    fn fire_sensor(&mut self, node: NodeId) {
        let (target, nonce) = self.nodes.get_mut(&node).unwrap().pending_sensor.take().expect(
            "no sensor request pending",
        );
        self.deliver(node, CtrlEvent::SensorNotify { state: target, nonce });
        self.pump();
    }

    /// Makes the node's point settle at the commanded position.
    fn fire_point(&mut self, node: NodeId) {
        let (position, nonce) = self.nodes.get_mut(&node).unwrap().pending_point.take().expect(
            "no point command pending",
        );
        self.deliver(node, CtrlEvent::PointNotify { position, nonce });
        self.pump();
    }
}

fn route(id: u32, prev: NodeId, next: NodeId, position: RoutePosition) -> Route {
    Route { id: RouteId(id), prev, next, position, requested_position: PointPosition::DIVERGING }
}

fn three_node_chain() -> Chain {
    Chain::new(vec![
        (NODE_A, tc(vec![route(42, HOST, NODE_B, RoutePosition::First)])),
        (NODE_B, tc(vec![route(42, NODE_A, NODE_C, RoutePosition::Middle)])),
        (NODE_C, tc(vec![route(42, NODE_B, NodeId::NULL, RoutePosition::Last)])),
    ])
}

#[test]
fn three_node_happy_path_reserves_and_releases() {
    let mut chain = three_node_chain();

    // Host asks A for route 42; the request walks to C and the agreement
    // walks back.
    chain.request(NODE_A, 42);

    assert_eq!(chain.state_of(NODE_A), CtrlState::Reserved);
    assert_eq!(chain.state_of(NODE_B), CtrlState::Reserved);
    assert_eq!(chain.state_of(NODE_C), CtrlState::Reserved);
    assert_eq!(chain.to_host, vec![(RouteMsgKind::TrainOk, RouteId(42))]);

    // The train reaches C: ON puts it in transition, OFF releases it.
    chain.fire_sensor(NODE_C);
    assert_eq!(chain.state_of(NODE_C), CtrlState::TrainInTransition);

    chain.fire_sensor(NODE_C);
    assert_eq!(chain.state_of(NODE_C), CtrlState::NotReserved);

    // A and B are still reserved until their own sensors report passage.
    assert_eq!(chain.state_of(NODE_A), CtrlState::Reserved);
    assert_eq!(chain.state_of(NODE_B), CtrlState::Reserved);

    chain.fire_sensor(NODE_B);
    chain.fire_sensor(NODE_B);
    chain.fire_sensor(NODE_A);
    chain.fire_sensor(NODE_A);
    assert_eq!(chain.state_of(NODE_A), CtrlState::NotReserved);
    assert_eq!(chain.state_of(NODE_B), CtrlState::NotReserved);
}

#[test]
fn mixed_chain_positions_points_before_agreeing() {
    // A and C are points, B is a plain track circuit.
    let mut chain = Chain::new(vec![
        (NODE_A, point(vec![route(42, HOST, NODE_B, RoutePosition::First)])),
        (NODE_B, tc(vec![route(42, NODE_A, NODE_C, RoutePosition::Middle)])),
        (NODE_C, point(vec![route(42, NODE_B, NodeId::NULL, RoutePosition::Last)])),
    ]);

    chain.request(NODE_A, 42);

    // The COMMIT reached C, which is moving its switch; nobody has agreed
    // yet, so upstream nodes still wait.
    assert_eq!(chain.state_of(NODE_C), CtrlState::Positioning);
    assert_eq!(chain.state_of(NODE_B), CtrlState::WaitAgree);
    assert_eq!(chain.state_of(NODE_A), CtrlState::WaitAgree);
    assert!(chain.to_host.is_empty());

    // C's switch locks in place: C agrees, B relays, A starts positioning.
    chain.fire_point(NODE_C);
    assert_eq!(chain.state_of(NODE_C), CtrlState::Reserved);
    assert_eq!(chain.state_of(NODE_B), CtrlState::Reserved);
    assert_eq!(chain.state_of(NODE_A), CtrlState::Positioning);

    // A's switch locks: the whole route is reserved and the host learns it.
    chain.fire_point(NODE_A);
    assert_eq!(chain.state_of(NODE_A), CtrlState::Reserved);
    assert_eq!(chain.to_host, vec![(RouteMsgKind::TrainOk, RouteId(42))]);
}

#[test]
fn refusal_at_the_tail_retreats_to_the_host() {
    // C does not know route 42: the request dies there and the refusal
    // walks back as NACK, reaching the host as TRAINNOK.
    let mut chain = Chain::new(vec![
        (NODE_A, tc(vec![route(42, HOST, NODE_B, RoutePosition::First)])),
        (NODE_B, tc(vec![route(42, NODE_A, NODE_C, RoutePosition::Middle)])),
        (NODE_C, tc(vec![route(7, NODE_B, NodeId::NULL, RoutePosition::Last)])),
    ]);

    chain.request(NODE_A, 42);

    assert_eq!(chain.state_of(NODE_A), CtrlState::NotReserved);
    assert_eq!(chain.state_of(NODE_B), CtrlState::NotReserved);
    assert_eq!(chain.state_of(NODE_C), CtrlState::NotReserved);
    assert_eq!(chain.to_host, vec![(RouteMsgKind::TrainNok, RouteId(42))]);
}

#[test]
fn point_malfunction_mid_chain_aborts_both_sides() {
    // B is a point that will fail while positioning.
    let mut chain = Chain::new(vec![
        (NODE_A, tc(vec![route(42, HOST, NODE_B, RoutePosition::First)])),
        (NODE_B, point(vec![route(42, NODE_A, NODE_C, RoutePosition::Middle)])),
        (NODE_C, tc(vec![route(42, NODE_B, NodeId::NULL, RoutePosition::Last)])),
    ]);

    chain.request(NODE_A, 42);

    // C agreed at once (track circuit), so B is positioning its switch.
    assert_eq!(chain.state_of(NODE_B), CtrlState::Positioning);

    // B's actuator reports the malfunction sentinel.
    let (_, nonce) = chain.nodes.get_mut(&NODE_B).unwrap().pending_point.take().unwrap();
    chain.deliver(
        NODE_B,
        CtrlEvent::PointNotify { position: PointPosition::UNDEFINED, nonce },
    );
    chain.pump();

    // B is sealed; the abort reached both neighbours and the host.
    assert_eq!(chain.state_of(NODE_B), CtrlState::FailSafe);
    assert_eq!(chain.state_of(NODE_A), CtrlState::NotReserved);
    assert_eq!(chain.state_of(NODE_C), CtrlState::NotReserved);
    assert_eq!(chain.to_host, vec![(RouteMsgKind::TrainNok, RouteId(42))]);
}

#[test]
fn mid_chain_fail_safe_rejects_a_second_request() {
    let mut chain = three_node_chain();

    // B learns of a diagnostic failure and seals itself.
    chain.deliver(NODE_B, CtrlEvent::DiagErr);
    chain.pump();
    assert_eq!(chain.state_of(NODE_B), CtrlState::FailSafe);

    // A's forwarded request is now refused by B, and A reports TRAINNOK.
    chain.request(NODE_A, 42);

    assert_eq!(chain.state_of(NODE_A), CtrlState::NotReserved);
    assert_eq!(chain.state_of(NODE_B), CtrlState::FailSafe);
    assert_eq!(chain.state_of(NODE_C), CtrlState::NotReserved);
    assert_eq!(chain.to_host, vec![(RouteMsgKind::TrainNok, RouteId(42))]);
}
