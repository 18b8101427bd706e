use core::convert::TryFrom;
use core::fmt;

// --- Protocol Constants ---

/// Maximum length of a single wire message, including the header.
pub const MSG_MAX_LENGTH: usize = 255;

/// Receive reassembly buffer: two maximum-length messages.
pub const COMM_BUFFER_SIZE: usize = 2 * MSG_MAX_LENGTH;

/// Default TCP port every node listens on (IANA unassigned).
pub const COMM_SOCK_PORT: u16 = 256;

/// Deadline applied to the reservation wait states (WaitAck/WaitCommit/WaitAgree).
pub const COMM_MSG_TIMEOUT_MS: u64 = 5_000;

/// Maximum number of routes accepted in a node configuration.
pub const CONFIG_MAX_ROUTES: usize = 256;

/// Capacity of every inter-task queue, in messages.
pub const QUEUE_CAPACITY: usize = 1_024;

/// Full straight-to-diverging transition time of the point motor.
pub const POINT_TRANS_TIME_MS: u64 = 3_000;

/// Occupancy sensor sampling period.
pub const SENSOR_CHECK_PERIOD_MS: u64 = 1_000;

/// Diagnostic round period (peer probing and sibling liveness).
pub const DIAG_CHECK_PERIOD_MS: u64 = 1_000;

/// Echo requests per peer reachability check.
pub const DIAG_PING_PKTS: u16 = 3;

/// Capacity of the log ring buffer, in records.
pub const LOG_MAX_LINES: usize = 1_024;

/// GPIO pin driving the status LED on a physical target.
pub const GPIO_PIN_LED: u8 = 17;

/// GPIO pin sampled as the occupancy input on a physical target.
pub const GPIO_PIN_BUTTON: u8 = 27;

// --- Node Identity ---

/// Identifier of a participant: its packed IPv4 address.
///
/// The all-zero value is the distinguished NULL node ("absent").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub [u8; 4]);

impl NodeId {
    pub const NULL: NodeId = NodeId([0, 0, 0, 0]);

    pub const fn new(a: u8, b: u8, c: u8, d: u8) -> Self {
        NodeId([a, b, c, d])
    }

    /// True only for the all-zero node.
    pub fn is_null(&self) -> bool {
        self.0 == [0, 0, 0, 0]
    }

    pub const fn octets(&self) -> [u8; 4] {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}.{}", self.0[0], self.0[1], self.0[2], self.0[3])
    }
}

/// 32-bit identifier of a route (itinerary) through the topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RouteId(pub u32);

impl fmt::Display for RouteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// --- Node Behaviour ---

/// Kind of track element this node controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NodeType {
    /// Movable point (switch) with two safe positions.
    Point = 10,
    /// Fixed segment with an occupancy sensor.
    TrackCircuit = 20,
}

/// Error type for an unknown node-type byte in a configuration.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct InvalidNodeTypeError(pub u8);

impl TryFrom<u8> for NodeType {
    type Error = InvalidNodeTypeError;
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            10 => Ok(NodeType::Point),
            20 => Ok(NodeType::TrackCircuit),
            other => Err(InvalidNodeTypeError(other)),
        }
    }
}

/// Role of this node inside one particular route.
///
/// The wire encoding is the original one: -128 / 0 / 127.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i8)]
pub enum RoutePosition {
    First = -128,
    Middle = 0,
    Last = 127,
}

/// Error type for an i8 that is none of the three role encodings.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct InvalidRoutePositionError(pub i8);

impl TryFrom<i8> for RoutePosition {
    type Error = InvalidRoutePositionError;
    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            -128 => Ok(RoutePosition::First),
            0 => Ok(RoutePosition::Middle),
            127 => Ok(RoutePosition::Last),
            other => Err(InvalidRoutePositionError(other)),
        }
    }
}

// --- Physical Devices ---

/// Position of the point actuator.
///
/// 0 is STRAIGHT, 50 is DIVERGING, intermediate values are transitioning and
/// -1 is the UNDEFINED malfunction sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointPosition(pub i8);

impl PointPosition {
    pub const STRAIGHT: PointPosition = PointPosition(0);
    pub const DIVERGING: PointPosition = PointPosition(50);
    pub const UNDEFINED: PointPosition = PointPosition(-1);

    /// Number of motor steps between the two end positions.
    pub const STEPS: i8 = 50;

    pub fn is_undefined(&self) -> bool {
        *self == Self::UNDEFINED
    }
}

impl fmt::Display for PointPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            0 => write!(f, "STRAIGHT"),
            50 => write!(f, "DIVERGING"),
            -1 => write!(f, "UNDEFINED"),
            value => write!(f, "transitioning({value})"),
        }
    }
}

/// Binary occupancy state reported by the track sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SensorState {
    Off = 0,
    On = 1,
}

impl fmt::Display for SensorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorState::Off => write!(f, "OFF"),
            SensorState::On => write!(f, "ON"),
        }
    }
}

// --- Routes ---

/// Precomputed record describing this node's place along one route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    /// Route identifier, unique across the topology.
    pub id: RouteId,
    /// Previous node along the route; the host when this node is FIRST.
    pub prev: NodeId,
    /// Next node along the route; NULL when this node is LAST.
    pub next: NodeId,
    /// Role of this node inside the route.
    pub position: RoutePosition,
    /// Target point position, meaningful only for point nodes.
    pub requested_position: PointPosition,
}
