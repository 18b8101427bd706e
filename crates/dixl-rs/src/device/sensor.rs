use crate::common::Nonce;
use crate::types::SensorState;

/// Effects of one sampling period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SensorEvents {
    /// The input transitioned to ON this period; worth an OCCUPIED log record.
    pub occupied_edge: bool,
    /// Notification to deliver to Ctrl: the requested state was reached.
    pub notify: Option<(SensorState, Nonce)>,
}

/// Latch pairing sensor samples with the outstanding state request.
///
/// A request arms a target state and a nonce; the first sample equal to the
/// target produces exactly one notification and clears the nonce.
#[derive(Debug)]
pub struct SensorLatch {
    current: Option<SensorState>,
    target: SensorState,
    nonce: Option<Nonce>,
}

impl SensorLatch {
    pub fn new() -> Self {
        SensorLatch { current: None, target: SensorState::On, nonce: None }
    }

    /// State the control logic is currently waiting for.
    pub fn target(&self) -> SensorState {
        self.target
    }

    /// The awaited state while a request is armed.
    pub fn pending(&self) -> Option<SensorState> {
        self.nonce.map(|_| self.target)
    }

    /// Last sampled state, if any sample was taken yet.
    pub fn current(&self) -> Option<SensorState> {
        self.current
    }

    /// Latches a new state request, superseding any previous nonce.
    pub fn request(&mut self, target: SensorState, nonce: Nonce) {
        self.target = target;
        self.nonce = Some(nonce);
    }

    /// Ingests one sample and reports the resulting events.
    pub fn observe(&mut self, sampled: SensorState) -> SensorEvents {
        let mut events = SensorEvents::default();
        if sampled == SensorState::On && self.current != Some(SensorState::On) {
            events.occupied_edge = true;
        }
        self.current = Some(sampled);

        if sampled == self.target {
            if let Some(nonce) = self.nonce.take() {
                events.notify = Some((sampled, nonce));
            }
        }
        events
    }
}

impl Default for SensorLatch {
    fn default() -> Self {
        Self::new()
    }
}
