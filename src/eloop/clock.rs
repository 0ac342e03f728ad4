//! Wrapping millisecond clock.
//!
//! Fire times are stored as a 32-bit millisecond counter that wraps after
//! about 49 days. Two ticks are compared through their signed difference,
//! which stays correct as long as the pending timeouts span less than
//! 2^31 ms.

use tokio::time::Instant;

/// Monotonic millisecond tick, wrapping at `u32::MAX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Tick(pub u32);

impl Tick {
    /// Tick `ms` milliseconds after this one.
    pub fn after(self, ms: u32) -> Tick {
        Tick(self.0.wrapping_add(ms))
    }

    /// Signed distance `self - earlier` in milliseconds.
    pub fn since(self, earlier: Tick) -> i32 {
        self.0.wrapping_sub(earlier.0) as i32
    }

    /// True once `now` has reached this tick.
    pub fn is_due(self, now: Tick) -> bool {
        now.since(self) >= 0
    }

    /// Milliseconds left until this tick, zero if already due.
    pub fn remaining(self, now: Tick) -> u32 {
        self.since(now).max(0) as u32
    }
}

/// Millisecond clock anchored at the event loop's creation.
///
/// Backed by `tokio::time::Instant` so paused-time tests drive it.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    origin: Instant,
    offset: u32,
}

impl Clock {
    pub fn new() -> Self {
        Self::starting_at(Tick(0))
    }

    /// Clock whose first reading is `start`. Used to exercise wrap-around.
    pub fn starting_at(start: Tick) -> Self {
        Self {
            origin: Instant::now(),
            offset: start.0,
        }
    }

    pub fn now(&self) -> Tick {
        // Truncation is the wrap.
        let elapsed = self.origin.elapsed().as_millis() as u32;
        Tick(self.offset.wrapping_add(elapsed))
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_ordering_across_wrap() {
        let before = Tick(u32::MAX - 5);
        let after = before.after(10);
        assert_eq!(after, Tick(4));
        assert_eq!(after.since(before), 10);
        assert_eq!(before.since(after), -10);
        assert!(before.is_due(after));
        assert!(!after.is_due(before));
    }

    #[test]
    fn test_remaining_clamps_to_zero() {
        let fire = Tick(100);
        assert_eq!(fire.remaining(Tick(40)), 60);
        assert_eq!(fire.remaining(Tick(100)), 0);
        assert_eq!(fire.remaining(Tick(250)), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clock_follows_paused_time() {
        let clock = Clock::starting_at(Tick(u32::MAX - 49));
        tokio::time::advance(std::time::Duration::from_millis(100)).await;
        assert_eq!(clock.now(), Tick(50));
    }
}
