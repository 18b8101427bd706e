use crate::common::Timestamp;
use crate::types::{NodeId, Route};
use alloc::vec::Vec;

/// Reachability statistics for one monitored predecessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerStats {
    pub id: NodeId,
    /// Checks performed since the monitor was configured.
    pub checks: u64,
    /// Consecutive failures since the last success.
    pub consecutive_fails: u32,
    /// Timestamp of the last check.
    pub last_check: Timestamp,
}

/// Extracts the distinct, non-null `prev` nodes of a route list: the set of
/// upstream peers this node must keep monitoring.
pub fn peer_set(routes: &[Route]) -> Vec<NodeId> {
    let mut peers: Vec<NodeId> = Vec::new();
    for route in routes {
        if route.prev.is_null() {
            continue;
        }
        if !peers.contains(&route.prev) {
            peers.push(route.prev);
        }
    }
    peers
}

/// Round-robin monitor over the configured peer set.
#[derive(Debug)]
pub struct DiagMonitor {
    peers: Vec<PeerStats>,
    cursor: usize,
}

impl DiagMonitor {
    pub fn new(routes: &[Route]) -> Self {
        let peers = peer_set(routes)
            .into_iter()
            .map(|id| PeerStats {
                id,
                checks: 0,
                consecutive_fails: 0,
                last_check: Timestamp::ZERO,
            })
            .collect();
        DiagMonitor { peers, cursor: 0 }
    }

    pub fn peers(&self) -> &[PeerStats] {
        &self.peers
    }

    /// Peer to probe this round, or None when no peer is configured.
    pub fn current(&self) -> Option<NodeId> {
        self.peers.get(self.cursor).map(|p| p.id)
    }

    /// Records the outcome of the current probe and advances the cursor.
    pub fn record(&mut self, success: bool, now: Timestamp) {
        if let Some(peer) = self.peers.get_mut(self.cursor) {
            peer.checks += 1;
            peer.last_check = now;
            if success {
                peer.consecutive_fails = 0;
            } else {
                peer.consecutive_fails += 1;
            }
        }
        if !self.peers.is_empty() {
            self.cursor = (self.cursor + 1) % self.peers.len();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PointPosition, RouteId, RoutePosition};

    fn route(id: u32, prev: NodeId) -> Route {
        Route {
            id: RouteId(id),
            prev,
            next: NodeId::new(10, 0, 0, 99),
            position: RoutePosition::Middle,
            requested_position: PointPosition::STRAIGHT,
        }
    }

    #[test]
    fn peer_set_is_distinct_and_skips_null() {
        let a = NodeId::new(10, 0, 0, 1);
        let b = NodeId::new(10, 0, 0, 2);
        let routes = [
            route(1, a),
            route(2, b),
            route(3, a),
            route(4, NodeId::NULL),
        ];
        assert_eq!(peer_set(&routes), alloc::vec![a, b]);
    }

    #[test]
    fn monitor_cycles_round_robin() {
        let a = NodeId::new(10, 0, 0, 1);
        let b = NodeId::new(10, 0, 0, 2);
        let routes = [route(1, a), route(2, b)];
        let mut monitor = DiagMonitor::new(&routes);

        assert_eq!(monitor.current(), Some(a));
        monitor.record(true, Timestamp::new(1, 0));
        assert_eq!(monitor.current(), Some(b));
        monitor.record(false, Timestamp::new(2, 0));
        assert_eq!(monitor.current(), Some(a));

        assert_eq!(monitor.peers()[0].checks, 1);
        assert_eq!(monitor.peers()[0].consecutive_fails, 0);
        assert_eq!(monitor.peers()[1].consecutive_fails, 1);
    }

    #[test]
    fn empty_route_list_has_no_current_peer() {
        let mut monitor = DiagMonitor::new(&[]);
        assert_eq!(monitor.current(), None);
        monitor.record(true, Timestamp::ZERO);
        assert_eq!(monitor.current(), None);
    }
}
