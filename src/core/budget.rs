use crate::domain::ports::Clock;
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// 真實時間，sleep 交給 tokio
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}

/// 手動推進的時鐘：sleep 只推進虛擬時間，不會真的等待
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *offset += by;
    }

    pub fn elapsed(&self) -> Duration {
        *self.offset.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

/// 單一類別的時間預算（絕對截止時間）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    started_at: Instant,
    expires_at: Instant,
}

impl Deadline {
    pub fn starting_at(started_at: Instant, budget: Duration) -> Self {
        Self {
            started_at,
            expires_at: started_at + budget,
        }
    }

    pub fn remaining(&self, now: Instant) -> Duration {
        self.expires_at.saturating_duration_since(now)
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started_at)
    }

    /// 剩餘時間低於安全邊界
    pub fn is_exhausted(&self, now: Instant, safety_margin: Duration) -> bool {
        self.remaining(now) < safety_margin
    }

    /// 是否還能負擔一次等待加一次查詢，且之後仍保有安全邊界
    pub fn can_afford(&self, now: Instant, cost: Duration, safety_margin: Duration) -> bool {
        self.remaining(now) >= cost + safety_margin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_sleep_advances_virtual_time() {
        let clock = ManualClock::new();
        let start = clock.now();
        tokio_test::block_on(clock.sleep(Duration::from_secs(30)));
        assert_eq!(clock.now() - start, Duration::from_secs(30));
        assert_eq!(clock.elapsed(), Duration::from_secs(30));
    }

    #[test]
    fn test_deadline_remaining_saturates() {
        let clock = ManualClock::new();
        let deadline = Deadline::starting_at(clock.now(), Duration::from_secs(10));

        clock.advance(Duration::from_secs(4));
        assert_eq!(deadline.remaining(clock.now()), Duration::from_secs(6));
        assert_eq!(deadline.elapsed(clock.now()), Duration::from_secs(4));

        clock.advance(Duration::from_secs(20));
        assert_eq!(deadline.remaining(clock.now()), Duration::ZERO);
    }

    #[test]
    fn test_deadline_safety_margin_and_affordability() {
        let clock = ManualClock::new();
        let deadline = Deadline::starting_at(clock.now(), Duration::from_secs(10));
        let margin = Duration::from_secs(3);

        assert!(!deadline.is_exhausted(clock.now(), margin));
        assert!(deadline.can_afford(clock.now(), Duration::from_secs(7), margin));
        assert!(!deadline.can_afford(clock.now(), Duration::from_secs(8), margin));

        clock.advance(Duration::from_secs(8));
        assert!(deadline.is_exhausted(clock.now(), margin));
    }
}
