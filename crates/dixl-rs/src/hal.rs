use crate::types::{InvalidNodeTypeError, InvalidRoutePositionError, NodeId, SensorState};
use core::array::TryFromSliceError;
use core::fmt;

/// Defines a portable, descriptive error type for the node.
///
/// Every kind carries the process exit code it maps to when the error is
/// fatal for the task that raised it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DixlError {
    /// An inter-task queue could not be created.
    QueueInit,
    /// Receiving from an inter-task queue failed (queue gone).
    QueueReceive,
    /// Sending to an inter-task queue failed (queue gone).
    QueueSend,
    /// The communication socket could not be created.
    SocketInit,
    /// The listening socket could not be bound.
    SocketBind,
    /// The listening socket refused to listen.
    SocketListen,
    /// Accepting an inbound connection failed.
    SocketAccept,
    /// Receiving from a connection failed.
    SocketRecv,
    /// Sending on a connection failed.
    SocketSend,
    /// The local network interfaces could not be enumerated.
    NetworkIfEnumeration,
    /// A state machine received input while still in its Dummy state.
    FsmWrongState,
    /// A received frame or reply does not fit the protocol at this point
    /// (bad length, unknown type, wrong route id, out-of-sequence CONFIG).
    ProtocolMismatch,
    /// A predecessor node did not answer its reachability probe.
    PeerUnreachable(NodeId),
    /// A sibling task is no longer running.
    TaskMissing,
    /// The point actuator reported the UNDEFINED position.
    DeviceMalfunction,
}

impl DixlError {
    /// Process exit code for the fatal subset of the taxonomy.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::QueueInit => 101,
            Self::QueueReceive => 102,
            Self::QueueSend => 103,
            Self::SocketInit => 201,
            Self::SocketBind => 202,
            Self::SocketListen => 203,
            Self::SocketAccept => 204,
            Self::SocketRecv => 205,
            Self::SocketSend => 206,
            Self::NetworkIfEnumeration => 301,
            Self::FsmWrongState => 400,
            // Non-fatal kinds; a generic failure code if ever surfaced.
            Self::ProtocolMismatch
            | Self::PeerUnreachable(_)
            | Self::TaskMissing
            | Self::DeviceMalfunction => 1,
        }
    }
}

impl fmt::Display for DixlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QueueInit => write!(f, "Queue initialization error"),
            Self::QueueReceive => write!(f, "Queue receive error"),
            Self::QueueSend => write!(f, "Queue send error"),
            Self::SocketInit => write!(f, "Socket initialization error"),
            Self::SocketBind => write!(f, "Socket bind error"),
            Self::SocketListen => write!(f, "Socket listen error"),
            Self::SocketAccept => write!(f, "Socket accept error"),
            Self::SocketRecv => write!(f, "Socket receive error"),
            Self::SocketSend => write!(f, "Socket send error"),
            Self::NetworkIfEnumeration => write!(f, "Network interface enumeration error"),
            Self::FsmWrongState => write!(f, "FSM in a wrong state"),
            Self::ProtocolMismatch => write!(f, "Protocol mismatch"),
            Self::PeerUnreachable(node) => write!(f, "Peer {} unreachable", node),
            Self::TaskMissing => write!(f, "Sibling task missing"),
            Self::DeviceMalfunction => write!(f, "Device malfunction"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for DixlError {}

// --- From Implementations for Error Conversion ---

impl From<TryFromSliceError> for DixlError {
    fn from(_: TryFromSliceError) -> Self {
        DixlError::ProtocolMismatch
    }
}

impl From<InvalidNodeTypeError> for DixlError {
    fn from(_: InvalidNodeTypeError) -> Self {
        DixlError::ProtocolMismatch
    }
}

impl From<InvalidRoutePositionError> for DixlError {
    fn from(_: InvalidRoutePositionError) -> Self {
        DixlError::ProtocolMismatch
    }
}

/// Hardware abstraction for the binary occupancy input.
///
/// A hardware implementation reads the GPIO input; the simulation
/// implementation substitutes a fixed delay before the awaited state is
/// observed, which is enough to exercise the control plane end to end.
pub trait SensorInput {
    /// Samples the occupancy input once.
    ///
    /// `pending` carries the state the control logic is currently waiting
    /// for, if a request is armed; hardware implementations ignore it.
    fn sample(&mut self, pending: Option<SensorState>) -> SensorState;
}

/// Reachability probe toward a predecessor node.
///
/// The echo transport itself (ICMP on the original target) is an external
/// collaborator; only this contract is part of the node.
pub trait PeerProbe {
    /// Sends `packets` echo requests to `peer`; succeeds only if all of them
    /// are answered.
    fn probe(&mut self, peer: NodeId, packets: u16) -> Result<(), DixlError>;
}
