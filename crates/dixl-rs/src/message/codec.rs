use crate::common::Timestamp;
use crate::hal::DixlError;
use crate::logbuf::{LogKind, LogRecord};
use crate::message::{ExtBody, ExtKind, ExtMessage};
use crate::types::{NodeId, PointPosition, Route, RouteId, RoutePosition};
use core::convert::TryFrom;

/// Total size of the common wire header:
/// length (1), type (1), padding (2), source (4), destination (4), padding (4).
pub const HEADER_LEN: usize = 16;

/// Size of a route record on the wire.
const ROUTE_LEN: usize = 16;

/// Size of a log record on the wire.
const LOG_RECORD_LEN: usize = 24;

/// A trait for objects that can be serialized into and deserialized from a byte buffer.
pub trait Codec: Sized {
    /// Serializes the object into the provided buffer.
    ///
    /// Returns the number of bytes written.
    fn serialize(&self, buffer: &mut [u8]) -> Result<usize, DixlError>;

    /// Deserializes an object from the provided buffer.
    fn deserialize(buffer: &[u8]) -> Result<Self, DixlError>;
}

fn read_u32(buffer: &[u8], at: usize) -> Result<u32, DixlError> {
    let bytes: [u8; 4] = buffer[at..at + 4].try_into()?;
    Ok(u32::from_le_bytes(bytes))
}

fn read_i64(buffer: &[u8], at: usize) -> Result<i64, DixlError> {
    let bytes: [u8; 8] = buffer[at..at + 8].try_into()?;
    Ok(i64::from_le_bytes(bytes))
}

fn read_node(buffer: &[u8], at: usize) -> Result<NodeId, DixlError> {
    let bytes: [u8; 4] = buffer[at..at + 4].try_into()?;
    Ok(NodeId(bytes))
}

impl Codec for Route {
    fn serialize(&self, buffer: &mut [u8]) -> Result<usize, DixlError> {
        if buffer.len() < ROUTE_LEN {
            return Err(DixlError::ProtocolMismatch);
        }
        buffer[0..4].copy_from_slice(&self.id.0.to_le_bytes());
        buffer[4..8].copy_from_slice(&self.prev.octets());
        buffer[8..12].copy_from_slice(&self.next.octets());
        buffer[12] = self.position as i8 as u8;
        buffer[13] = self.requested_position.0 as u8;
        buffer[14..16].fill(0);
        Ok(ROUTE_LEN)
    }

    fn deserialize(buffer: &[u8]) -> Result<Self, DixlError> {
        if buffer.len() < ROUTE_LEN {
            return Err(DixlError::ProtocolMismatch);
        }
        Ok(Route {
            id: RouteId(read_u32(buffer, 0)?),
            prev: read_node(buffer, 4)?,
            next: read_node(buffer, 8)?,
            position: RoutePosition::try_from(buffer[12] as i8)?,
            requested_position: PointPosition(buffer[13] as i8),
        })
    }
}

impl Codec for LogRecord {
    fn serialize(&self, buffer: &mut [u8]) -> Result<usize, DixlError> {
        if buffer.len() < LOG_RECORD_LEN {
            return Err(DixlError::ProtocolMismatch);
        }
        buffer[0..8].copy_from_slice(&self.timestamp.secs.to_le_bytes());
        buffer[8..12].copy_from_slice(&self.timestamp.nanos.to_le_bytes());
        buffer[12] = self.kind as u8;
        buffer[13..16].fill(0);
        buffer[16..20].copy_from_slice(&self.route_id.0.to_le_bytes());
        buffer[20..24].copy_from_slice(&self.source.octets());
        Ok(LOG_RECORD_LEN)
    }

    fn deserialize(buffer: &[u8]) -> Result<Self, DixlError> {
        if buffer.len() < LOG_RECORD_LEN {
            return Err(DixlError::ProtocolMismatch);
        }
        let kind = LogKind::try_from(buffer[12]).map_err(|_| DixlError::ProtocolMismatch)?;
        Ok(LogRecord {
            timestamp: Timestamp::new(read_i64(buffer, 0)?, read_u32(buffer, 8)?),
            kind,
            route_id: RouteId(read_u32(buffer, 16)?),
            source: read_node(buffer, 20)?,
        })
    }
}

impl ExtMessage {
    /// Total length of this message on the wire, header included.
    pub fn wire_len(&self) -> usize {
        HEADER_LEN
            + match self.body {
                ExtBody::NodeReset
                | ExtBody::LogReq
                | ExtBody::LogDel
                | ExtBody::LogDelAck
                | ExtBody::DiagErrTask
                | ExtBody::PointMalfunc => 0,
                ExtBody::NodeConfigType { .. } => 9,
                ExtBody::NodeConfigRoute { .. } => 8 + ROUTE_LEN,
                ExtBody::RouteReq(_)
                | ExtBody::RouteAck(_)
                | ExtBody::RouteNack(_)
                | ExtBody::RouteCommit(_)
                | ExtBody::RouteAgree(_)
                | ExtBody::RouteDisagree(_)
                | ExtBody::RouteTrainOk(_)
                | ExtBody::RouteTrainNok(_) => 4,
                ExtBody::LogSend { .. } => 8 + LOG_RECORD_LEN,
                ExtBody::DiagErrComm(_) => 4,
            }
    }
}

impl Codec for ExtMessage {
    fn serialize(&self, buffer: &mut [u8]) -> Result<usize, DixlError> {
        let len = self.wire_len();
        if buffer.len() < len {
            return Err(DixlError::ProtocolMismatch);
        }
        buffer[0] = len as u8;
        buffer[1] = self.body.kind() as u8;
        buffer[2..4].fill(0);
        buffer[4..8].copy_from_slice(&self.source.octets());
        buffer[8..12].copy_from_slice(&self.destination.octets());
        buffer[12..16].fill(0);

        let payload = &mut buffer[HEADER_LEN..len];
        match &self.body {
            ExtBody::NodeReset
            | ExtBody::LogReq
            | ExtBody::LogDel
            | ExtBody::LogDelAck
            | ExtBody::DiagErrTask
            | ExtBody::PointMalfunc => {}
            ExtBody::NodeConfigType { total_segments, node_type } => {
                payload[0..4].copy_from_slice(&0u32.to_le_bytes());
                payload[4..8].copy_from_slice(&total_segments.to_le_bytes());
                payload[8] = *node_type;
            }
            ExtBody::NodeConfigRoute { sequence, total_segments, route } => {
                payload[0..4].copy_from_slice(&sequence.to_le_bytes());
                payload[4..8].copy_from_slice(&total_segments.to_le_bytes());
                route.serialize(&mut payload[8..])?;
            }
            ExtBody::RouteReq(id)
            | ExtBody::RouteAck(id)
            | ExtBody::RouteNack(id)
            | ExtBody::RouteCommit(id)
            | ExtBody::RouteAgree(id)
            | ExtBody::RouteDisagree(id)
            | ExtBody::RouteTrainOk(id)
            | ExtBody::RouteTrainNok(id) => {
                payload[0..4].copy_from_slice(&id.0.to_le_bytes());
            }
            ExtBody::LogSend { current, total, record } => {
                payload[0..4].copy_from_slice(&current.to_le_bytes());
                payload[4..8].copy_from_slice(&total.to_le_bytes());
                record.serialize(&mut payload[8..])?;
            }
            ExtBody::DiagErrComm(node) => {
                payload[0..4].copy_from_slice(&node.octets());
            }
        }
        Ok(len)
    }

    fn deserialize(buffer: &[u8]) -> Result<Self, DixlError> {
        if buffer.len() < HEADER_LEN {
            return Err(DixlError::ProtocolMismatch);
        }
        let len = buffer[0] as usize;
        if len < HEADER_LEN || len > buffer.len() {
            return Err(DixlError::ProtocolMismatch);
        }
        let kind =
            ExtKind::try_from(buffer[1]).map_err(|_| DixlError::ProtocolMismatch)?;
        let source = read_node(buffer, 4)?;
        let destination = read_node(buffer, 8)?;
        let payload = &buffer[HEADER_LEN..len];

        let expect = |n: usize| -> Result<(), DixlError> {
            if payload.len() == n { Ok(()) } else { Err(DixlError::ProtocolMismatch) }
        };

        let body = match kind {
            ExtKind::NodeReset => {
                expect(0)?;
                ExtBody::NodeReset
            }
            ExtKind::NodeConfig => {
                if payload.len() < 8 {
                    return Err(DixlError::ProtocolMismatch);
                }
                let sequence = read_u32(payload, 0)?;
                let total_segments = read_u32(payload, 4)?;
                if sequence == 0 {
                    expect(9)?;
                    ExtBody::NodeConfigType { total_segments, node_type: payload[8] }
                } else {
                    expect(8 + ROUTE_LEN)?;
                    ExtBody::NodeConfigRoute {
                        sequence,
                        total_segments,
                        route: Route::deserialize(&payload[8..])?,
                    }
                }
            }
            ExtKind::RouteReq
            | ExtKind::RouteAck
            | ExtKind::RouteNack
            | ExtKind::RouteCommit
            | ExtKind::RouteAgree
            | ExtKind::RouteDisagree
            | ExtKind::RouteTrainOk
            | ExtKind::RouteTrainNok => {
                expect(4)?;
                let id = RouteId(read_u32(payload, 0)?);
                match kind {
                    ExtKind::RouteReq => ExtBody::RouteReq(id),
                    ExtKind::RouteAck => ExtBody::RouteAck(id),
                    ExtKind::RouteNack => ExtBody::RouteNack(id),
                    ExtKind::RouteCommit => ExtBody::RouteCommit(id),
                    ExtKind::RouteAgree => ExtBody::RouteAgree(id),
                    ExtKind::RouteDisagree => ExtBody::RouteDisagree(id),
                    ExtKind::RouteTrainOk => ExtBody::RouteTrainOk(id),
                    _ => ExtBody::RouteTrainNok(id),
                }
            }
            ExtKind::LogReq => {
                expect(0)?;
                ExtBody::LogReq
            }
            ExtKind::LogSend => {
                expect(8 + LOG_RECORD_LEN)?;
                ExtBody::LogSend {
                    current: read_u32(payload, 0)?,
                    total: read_u32(payload, 4)?,
                    record: LogRecord::deserialize(&payload[8..])?,
                }
            }
            ExtKind::LogDel => {
                expect(0)?;
                ExtBody::LogDel
            }
            ExtKind::LogDelAck => {
                expect(0)?;
                ExtBody::LogDelAck
            }
            ExtKind::DiagErrTask => {
                expect(0)?;
                ExtBody::DiagErrTask
            }
            ExtKind::DiagErrComm => {
                expect(4)?;
                ExtBody::DiagErrComm(read_node(payload, 0)?)
            }
            ExtKind::PointMalfunc => {
                expect(0)?;
                ExtBody::PointMalfunc
            }
            // Discovery codes are reserved but carry no defined payload yet.
            ExtKind::NodeDiscovery | ExtKind::NodeAdvertise => {
                return Err(DixlError::ProtocolMismatch);
            }
        };

        Ok(ExtMessage { source, destination, body })
    }
}

/// Parses one complete wire message from the front of `buffer`.
///
/// This is the primary entry point for CommRx after re-framing: the first
/// byte is the total message length and must be fully contained in `buffer`.
pub fn deserialize_message(buffer: &[u8]) -> Result<ExtMessage, DixlError> {
    ExtMessage::deserialize(buffer)
}
