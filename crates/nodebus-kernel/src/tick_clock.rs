//! [`TickClock`] – fixed-rate ticking driven by variable frame times.
//!
//! The host advances every node's clock by the wall time of each frame.  The
//! clock accumulates `dt * rate` and reports one tick per whole unit
//! accumulated, carrying the remainder into the next frame.  A long frame
//! therefore produces several ticks and a short one may produce none.

use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct TickClock {
    /// Ticks per second.  Non-positive rates never tick.
    rate: f32,
    accumulated: f32,
}

impl TickClock {
    pub fn new(rate: f32) -> Self {
        Self {
            rate,
            accumulated: 0.0,
        }
    }

    pub fn rate(&self) -> f32 {
        self.rate
    }

    /// Change the rate without discarding accumulated time.
    pub fn set_rate(&mut self, rate: f32) {
        self.rate = rate;
    }

    fn is_ticking(&self) -> bool {
        self.rate > 0.0 && self.rate.is_finite()
    }

    /// Seconds between ticks, or `None` for a clock that never ticks or
    /// whose period does not fit in a [`Duration`].
    pub fn delay(&self) -> Option<Duration> {
        if !self.is_ticking() {
            return None;
        }
        Duration::try_from_secs_f32(1.0 / self.rate).ok()
    }

    /// Advance by `dt` and return how many ticks are now due.
    pub fn advance(&mut self, dt: Duration) -> u32 {
        if !self.is_ticking() {
            return 0;
        }
        self.accumulated += dt.as_secs_f32() * self.rate;
        if !self.accumulated.is_finite() {
            self.accumulated = 0.0;
            return u32::MAX;
        }
        let whole = self.accumulated.floor();
        self.accumulated -= whole;
        // Saturating cast.
        whole as u32
    }

    pub fn reset(&mut self) {
        self.accumulated = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_second_at_ten_hertz_is_ten_ticks() {
        let mut clock = TickClock::new(10.0);
        assert_eq!(clock.advance(Duration::from_secs(1)), 10);
    }

    #[test]
    fn remainder_carries_across_frames() {
        let mut clock = TickClock::new(2.0);
        // 0.3 s * 2 Hz = 0.6 per frame.
        assert_eq!(clock.advance(Duration::from_millis(300)), 0);
        assert_eq!(clock.advance(Duration::from_millis(300)), 1);
        assert_eq!(clock.advance(Duration::from_millis(300)), 0);
        assert_eq!(clock.advance(Duration::from_millis(300)), 1);
    }

    #[test]
    fn delay_is_reciprocal_of_rate() {
        let clock = TickClock::new(4.0);
        assert_eq!(clock.delay(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn non_positive_rate_never_ticks() {
        for rate in [0.0, -1.0, f32::NAN] {
            let mut clock = TickClock::new(rate);
            assert_eq!(clock.delay(), None);
            assert_eq!(clock.advance(Duration::from_secs(60)), 0);
        }
    }

    #[test]
    fn tiny_rate_has_no_representable_delay_and_does_not_panic() {
        let mut clock = TickClock::new(1e-20);
        assert_eq!(clock.delay(), None);
        assert_eq!(clock.advance(Duration::from_secs(1)), 0);
        assert_eq!(clock.advance(Duration::from_secs(3600)), 0);
    }

    #[test]
    fn huge_rate_saturates_instead_of_spinning() {
        let mut clock = TickClock::new(f32::MAX);
        assert_eq!(clock.delay(), Some(Duration::ZERO));
        assert_eq!(clock.advance(Duration::from_secs(10)), u32::MAX);

        let mut clock = TickClock::new(1e9);
        assert_eq!(clock.advance(Duration::from_secs(1)), 1_000_000_000);
    }

    #[test]
    fn reset_discards_partial_progress() {
        let mut clock = TickClock::new(1.0);
        assert_eq!(clock.advance(Duration::from_millis(900)), 0);
        clock.reset();
        assert_eq!(clock.advance(Duration::from_millis(200)), 0);
        clock.set_rate(10.0);
        assert_eq!(clock.rate(), 10.0);
    }
}
