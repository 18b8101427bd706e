pub mod codec;

use crate::common::Nonce;
use crate::logbuf::LogRecord;
use crate::types::{NodeId, NodeType, PointPosition, Route, RouteId, SensorState};
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::convert::TryFrom;

// --- External (wire) messages ---

/// Wire message type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExtKind {
    // Service messages - Init task
    NodeReset = 10,
    NodeConfig = 11,
    /// Reserved for topology discovery, not implemented.
    NodeDiscovery = 20,
    /// Reserved for topology discovery, not implemented.
    NodeAdvertise = 21,

    // Route messages - Ctrl task
    RouteReq = 30,
    RouteAck = 31,
    RouteNack = 32,
    RouteCommit = 33,
    RouteAgree = 34,
    RouteDisagree = 35,
    RouteTrainOk = 36,
    RouteTrainNok = 37,

    // Log messages - Log task
    LogReq = 81,
    LogSend = 82,
    LogDel = 83,
    LogDelAck = 84,

    // Diagnostic messages - outbound only
    DiagErrTask = 90,
    DiagErrComm = 91,

    // Device messages - Point task
    PointMalfunc = 95,
}

/// Error type for an unknown wire type byte.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct InvalidExtKindError(pub u8);

impl TryFrom<u8> for ExtKind {
    type Error = InvalidExtKindError;
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            10 => Ok(ExtKind::NodeReset),
            11 => Ok(ExtKind::NodeConfig),
            20 => Ok(ExtKind::NodeDiscovery),
            21 => Ok(ExtKind::NodeAdvertise),
            30 => Ok(ExtKind::RouteReq),
            31 => Ok(ExtKind::RouteAck),
            32 => Ok(ExtKind::RouteNack),
            33 => Ok(ExtKind::RouteCommit),
            34 => Ok(ExtKind::RouteAgree),
            35 => Ok(ExtKind::RouteDisagree),
            36 => Ok(ExtKind::RouteTrainOk),
            37 => Ok(ExtKind::RouteTrainNok),
            81 => Ok(ExtKind::LogReq),
            82 => Ok(ExtKind::LogSend),
            83 => Ok(ExtKind::LogDel),
            84 => Ok(ExtKind::LogDelAck),
            90 => Ok(ExtKind::DiagErrTask),
            91 => Ok(ExtKind::DiagErrComm),
            95 => Ok(ExtKind::PointMalfunc),
            other => Err(InvalidExtKindError(other)),
        }
    }
}

/// Type-specific payload of a wire message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtBody {
    NodeReset,
    /// Sequence 0 of a configuration: the "config type" record.
    NodeConfigType { total_segments: u32, node_type: u8 },
    /// Sequence 1..N of a configuration: one route record.
    NodeConfigRoute { sequence: u32, total_segments: u32, route: Route },
    RouteReq(RouteId),
    RouteAck(RouteId),
    RouteNack(RouteId),
    RouteCommit(RouteId),
    RouteAgree(RouteId),
    RouteDisagree(RouteId),
    RouteTrainOk(RouteId),
    RouteTrainNok(RouteId),
    LogReq,
    LogSend { current: u32, total: u32, record: LogRecord },
    LogDel,
    LogDelAck,
    DiagErrTask,
    DiagErrComm(NodeId),
    PointMalfunc,
}

impl ExtBody {
    pub fn kind(&self) -> ExtKind {
        match self {
            ExtBody::NodeReset => ExtKind::NodeReset,
            ExtBody::NodeConfigType { .. } | ExtBody::NodeConfigRoute { .. } => ExtKind::NodeConfig,
            ExtBody::RouteReq(_) => ExtKind::RouteReq,
            ExtBody::RouteAck(_) => ExtKind::RouteAck,
            ExtBody::RouteNack(_) => ExtKind::RouteNack,
            ExtBody::RouteCommit(_) => ExtKind::RouteCommit,
            ExtBody::RouteAgree(_) => ExtKind::RouteAgree,
            ExtBody::RouteDisagree(_) => ExtKind::RouteDisagree,
            ExtBody::RouteTrainOk(_) => ExtKind::RouteTrainOk,
            ExtBody::RouteTrainNok(_) => ExtKind::RouteTrainNok,
            ExtBody::LogReq => ExtKind::LogReq,
            ExtBody::LogSend { .. } => ExtKind::LogSend,
            ExtBody::LogDel => ExtKind::LogDel,
            ExtBody::LogDelAck => ExtKind::LogDelAck,
            ExtBody::DiagErrTask => ExtKind::DiagErrTask,
            ExtBody::DiagErrComm(_) => ExtKind::DiagErrComm,
            ExtBody::PointMalfunc => ExtKind::PointMalfunc,
        }
    }
}

/// One decoded wire message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtMessage {
    pub source: NodeId,
    pub destination: NodeId,
    pub body: ExtBody,
}

// --- Internal (queue) messages ---

/// Kind of a route protocol message a task asks CommTx to deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteMsgKind {
    Req,
    Ack,
    Nack,
    Commit,
    Agree,
    Disagree,
    TrainOk,
    TrainNok,
}

impl RouteMsgKind {
    /// The external twin of this internal request.
    pub fn ext_kind(&self) -> ExtKind {
        match self {
            RouteMsgKind::Req => ExtKind::RouteReq,
            RouteMsgKind::Ack => ExtKind::RouteAck,
            RouteMsgKind::Nack => ExtKind::RouteNack,
            RouteMsgKind::Commit => ExtKind::RouteCommit,
            RouteMsgKind::Agree => ExtKind::RouteAgree,
            RouteMsgKind::Disagree => ExtKind::RouteDisagree,
            RouteMsgKind::TrainOk => ExtKind::RouteTrainOk,
            RouteMsgKind::TrainNok => ExtKind::RouteTrainNok,
        }
    }

    pub fn body(&self, route_id: RouteId) -> ExtBody {
        match self {
            RouteMsgKind::Req => ExtBody::RouteReq(route_id),
            RouteMsgKind::Ack => ExtBody::RouteAck(route_id),
            RouteMsgKind::Nack => ExtBody::RouteNack(route_id),
            RouteMsgKind::Commit => ExtBody::RouteCommit(route_id),
            RouteMsgKind::Agree => ExtBody::RouteAgree(route_id),
            RouteMsgKind::Disagree => ExtBody::RouteDisagree(route_id),
            RouteMsgKind::TrainOk => ExtBody::RouteTrainOk(route_id),
            RouteMsgKind::TrainNok => ExtBody::RouteTrainNok(route_id),
        }
    }
}

/// Validated node configuration handed from Init to Ctrl and Diag.
///
/// The route list is shared immutably; consumers index into it instead of
/// keeping pointers.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub node_type: NodeType,
    pub routes: Arc<Vec<Route>>,
}

/// Message carried on the inter-task queues.
#[derive(Debug, Clone)]
pub enum Msg {
    /// A decoded wire message, routed by CommRx to the owning task.
    External(ExtMessage),

    // Init -> Ctrl / Diag
    NodeConfigSet(NodeConfig),
    NodeConfigReset,

    // Init -> CommTx
    CommTxConfigSet { host: NodeId },
    CommTxConfigReset,

    // Ctrl -> CommTx
    SendRoute { kind: RouteMsgKind, destination: NodeId, route_id: RouteId },

    // Ctrl -> Point and back
    PointReset { position: PointPosition },
    PointPos { position: PointPosition, nonce: Nonce },
    PointNotify { position: PointPosition, nonce: Nonce },

    // Ctrl -> Sensor and back
    SensorRequest { target: SensorState, nonce: Nonce },
    SensorNotify { state: SensorState, nonce: Nonce },

    // Diag -> Ctrl / CommTx (destination resolved from the CommTx host config)
    DiagErrComm { peer: NodeId },
    DiagErrTask,

    // Any task -> Log
    Log(LogRecord),

    // Log -> CommTx
    LogSend { destination: NodeId, current: u32, total: u32, record: LogRecord },
    LogDelAck { destination: NodeId },

    /// Cooperative-stop marker injected by the runtime during shutdown.
    Shutdown,
}
