use std::time::Duration;

/// Fixed-delay pacer for API courtesy pauses. Kept separate from the fetch
/// logic so stages can be tested with zero delay.
#[derive(Debug, Clone)]
pub struct FixedDelayPacer {
    delay: Duration,
}

impl FixedDelayPacer {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// Pacer that never sleeps, for tests.
    pub fn disabled() -> Self {
        Self {
            delay: Duration::ZERO,
        }
    }

    pub async fn pause(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn test_disabled_pacer_does_not_sleep() {
        let pacer = FixedDelayPacer::disabled();
        let start = Instant::now();
        pacer.pause().await;
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_pacer_waits_at_least_delay() {
        let pacer = FixedDelayPacer::new(Duration::from_millis(20));
        let start = Instant::now();
        pacer.pause().await;
        assert!(start.elapsed() >= Duration::from_millis(20));
    }
}
