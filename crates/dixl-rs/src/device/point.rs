use crate::common::Nonce;
use crate::types::PointPosition;

/// Per-step period for a full transition of `total_ms` milliseconds across
/// the motor's step range.
pub fn step_period_ms(total_ms: u64) -> u64 {
    total_ms.div_ceil(PointPosition::STEPS as u64)
}

/// Pure model of the motorised point.
///
/// The actuator moves one unit per step toward the requested position. The
/// UNDEFINED position models a malfunction and latches until an explicit
/// reset. A notification is produced at most once per request nonce, when
/// stepping ends.
#[derive(Debug)]
pub struct PointMechanics {
    position: PointPosition,
    requested: PointPosition,
    nonce: Option<Nonce>,
}

impl PointMechanics {
    pub fn new(initial: PointPosition) -> Self {
        PointMechanics { position: initial, requested: initial, nonce: None }
    }

    pub fn position(&self) -> PointPosition {
        self.position
    }

    /// Latches a positioning request.
    ///
    /// While malfunctioning the target is ignored (the position is latched
    /// at UNDEFINED), but the nonce is still recorded so the requester gets
    /// its single UNDEFINED notification.
    pub fn request(&mut self, target: PointPosition, nonce: Nonce) {
        self.nonce = Some(nonce);
        if self.position.is_undefined() {
            return;
        }
        self.requested = target;
    }

    /// Forces the malfunction sentinel. Ignored if already malfunctioning
    /// (the position is latched anyway).
    pub fn force_malfunction(&mut self) {
        if self.position.is_undefined() {
            return;
        }
        self.position = PointPosition::UNDEFINED;
        self.requested = PointPosition::UNDEFINED;
    }

    /// Physical reset: position restored, pending request discarded.
    pub fn reset(&mut self, position: PointPosition) {
        self.position = position;
        self.requested = position;
        self.nonce = None;
    }

    /// True when no further stepping can change the position.
    pub fn is_settled(&self) -> bool {
        self.position.is_undefined() || self.position == self.requested
    }

    /// Advances the motor one unit toward the requested position.
    pub fn step(&mut self) {
        if self.is_settled() {
            return;
        }
        if self.position.0 > self.requested.0 {
            self.position.0 -= 1;
        } else {
            self.position.0 += 1;
        }
    }

    /// When stepping has ended and a request is outstanding, yields the
    /// single notification for it and clears the nonce.
    pub fn take_notification(&mut self) -> Option<(PointPosition, Nonce)> {
        if !self.is_settled() {
            return None;
        }
        self.nonce.take().map(|nonce| (self.position, nonce))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Timestamp;

    fn nonce(n: i64) -> Nonce {
        Timestamp::new(n, 0)
    }

    #[test]
    fn full_transition_takes_the_step_count() {
        let mut point = PointMechanics::new(PointPosition::STRAIGHT);
        point.request(PointPosition::DIVERGING, nonce(1));
        let mut steps = 0i8;
        while !point.is_settled() {
            point.step();
            steps += 1;
        }
        assert_eq!(steps, PointPosition::STEPS);
        assert_eq!(point.take_notification(), Some((PointPosition::DIVERGING, nonce(1))));
        // The notification is produced exactly once.
        assert_eq!(point.take_notification(), None);
    }

    #[test]
    fn reversal_steps_back_down() {
        let mut point = PointMechanics::new(PointPosition::DIVERGING);
        point.request(PointPosition::STRAIGHT, nonce(2));
        point.step();
        assert_eq!(point.position(), PointPosition(49));
        assert!(!point.is_settled());
    }

    #[test]
    fn malfunction_latches_until_reset() {
        let mut point = PointMechanics::new(PointPosition::STRAIGHT);
        point.request(PointPosition::DIVERGING, nonce(3));
        point.step();
        point.force_malfunction();
        assert!(point.is_settled());
        // The outstanding request is answered with UNDEFINED.
        assert_eq!(point.take_notification(), Some((PointPosition::UNDEFINED, nonce(3))));

        // A request against the latched malfunction cannot move the motor,
        // but it is still answered once with UNDEFINED.
        point.request(PointPosition::STRAIGHT, nonce(4));
        point.step();
        assert_eq!(point.position(), PointPosition::UNDEFINED);
        assert_eq!(point.take_notification(), Some((PointPosition::UNDEFINED, nonce(4))));
        assert_eq!(point.take_notification(), None);

        // Reset restores normal operation.
        point.reset(PointPosition::STRAIGHT);
        point.request(PointPosition::STRAIGHT, nonce(5));
        assert_eq!(point.take_notification(), Some((PointPosition::STRAIGHT, nonce(5))));
    }

    #[test]
    fn no_notification_without_an_active_nonce() {
        let mut point = PointMechanics::new(PointPosition::STRAIGHT);
        assert!(point.is_settled());
        assert_eq!(point.take_notification(), None);
        point.force_malfunction();
        assert_eq!(point.take_notification(), None);
    }

    #[test]
    fn step_period_covers_the_transition_time() {
        // 3000 ms over 50 steps.
        assert_eq!(step_period_ms(3_000), 60);
        // Non-divisible times round the period up.
        assert_eq!(step_period_ms(1_000), 20);
        assert_eq!(step_period_ms(1_001), 21);
    }
}
