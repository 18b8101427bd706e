use crate::common::Timestamp;
use crate::types::{NodeId, RouteId};
use alloc::collections::VecDeque;
use alloc::vec::Vec;
use core::convert::TryFrom;

/// Kind of a structured protocol log record, host-visible through LOGSEND.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LogKind {
    /// Route request received.
    Req = 10,
    /// Track occupied (sensor ON edge).
    Occupied = 11,
    /// Request NACKed.
    ReqNack = 12,
    /// Request DISAGREEed.
    Disagree = 13,
    /// Request AGREEed, resource reserved.
    Reserved = 14,
    /// Track freed after transit.
    Freed = 15,
    /// Device malfunction.
    Malfunction = 90,
    /// Reservation cleared.
    NotReserved = 99,
}

/// Error type for an unknown log-kind byte.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct InvalidLogKindError(pub u8);

impl TryFrom<u8> for LogKind {
    type Error = InvalidLogKindError;
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            10 => Ok(LogKind::Req),
            11 => Ok(LogKind::Occupied),
            12 => Ok(LogKind::ReqNack),
            13 => Ok(LogKind::Disagree),
            14 => Ok(LogKind::Reserved),
            15 => Ok(LogKind::Freed),
            90 => Ok(LogKind::Malfunction),
            99 => Ok(LogKind::NotReserved),
            other => Err(InvalidLogKindError(other)),
        }
    }
}

/// One structured log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogRecord {
    pub timestamp: Timestamp,
    pub kind: LogKind,
    /// Route the record refers to; 0 when not route-specific.
    pub route_id: RouteId,
    /// Source node, meaningful only for request records.
    pub source: NodeId,
}

/// Bounded ring of log records with the host pull protocol.
///
/// When full, the oldest record is overwritten. Streaming remembers the
/// highest index handed to the host so a later prune removes exactly what was
/// streamed; an overwrite that reaches into the streamed range invalidates
/// the mark.
pub struct LogBuffer {
    records: VecDeque<LogRecord>,
    capacity: usize,
    streamed_mark: Option<usize>,
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        LogBuffer {
            records: VecDeque::with_capacity(capacity),
            capacity,
            streamed_mark: None,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Appends a record, overwriting the oldest one when full.
    pub fn push(&mut self, record: LogRecord) {
        if self.records.len() == self.capacity {
            self.records.pop_front();
            // The overwrite consumed the oldest streamed record.
            self.streamed_mark = match self.streamed_mark {
                Some(0) | None => None,
                Some(mark) => Some(mark - 1),
            };
        }
        self.records.push_back(record);
    }

    /// Returns a snapshot of every current record, oldest first, and
    /// remembers the highest index streamed.
    pub fn stream(&mut self) -> Vec<LogRecord> {
        let snapshot: Vec<LogRecord> = self.records.iter().copied().collect();
        self.streamed_mark = snapshot.len().checked_sub(1);
        snapshot
    }

    /// Prunes every record up to the remembered streamed index.
    ///
    /// Returns the number of records removed; zero when nothing was streamed
    /// since the last prune (or the mark was invalidated by overwrites).
    pub fn prune(&mut self) -> usize {
        match self.streamed_mark.take() {
            Some(mark) => {
                let removed = mark + 1;
                self.records.drain(..removed);
                removed
            }
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(n: u32) -> LogRecord {
        LogRecord {
            timestamp: Timestamp::new(n as i64, 0),
            kind: LogKind::Req,
            route_id: RouteId(n),
            source: NodeId::NULL,
        }
    }

    #[test]
    fn stream_then_prune_empties_the_buffer() {
        let mut buf = LogBuffer::new(8);
        for n in 0..5 {
            buf.push(record(n));
        }
        let streamed = buf.stream();
        assert_eq!(streamed.len(), 5);
        assert_eq!(buf.prune(), 5);
        assert_eq!(buf.len(), 0);
        // A second prune has nothing marked.
        assert_eq!(buf.prune(), 0);
    }

    #[test]
    fn overflow_keeps_only_the_youngest_records() {
        let capacity = 4;
        let mut buf = LogBuffer::new(capacity);
        let k = 11;
        for n in 0..k {
            buf.push(record(n));
        }
        assert_eq!(buf.len(), capacity);
        let streamed = buf.stream();
        // Youngest retained record is the (k-1)-th enqueued.
        assert_eq!(streamed.last().unwrap().route_id, RouteId(k - 1));
        assert_eq!(streamed.first().unwrap().route_id, RouteId(k - capacity as u32));
    }

    #[test]
    fn overwrite_through_the_mark_invalidates_it() {
        let mut buf = LogBuffer::new(2);
        buf.push(record(0));
        buf.push(record(1));
        buf.stream();
        // Two more pushes overwrite both streamed records.
        buf.push(record(2));
        buf.push(record(3));
        assert_eq!(buf.prune(), 0);
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn overwrite_below_the_mark_shifts_it() {
        let mut buf = LogBuffer::new(3);
        buf.push(record(0));
        buf.push(record(1));
        buf.stream();
        // One overwrite: record(0) is gone, the mark now covers record(1) only.
        buf.push(record(2));
        buf.push(record(3));
        assert_eq!(buf.prune(), 1);
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn prune_without_stream_is_a_no_op() {
        let mut buf = LogBuffer::new(4);
        buf.push(record(0));
        assert_eq!(buf.prune(), 0);
        assert_eq!(buf.len(), 1);
    }
}
