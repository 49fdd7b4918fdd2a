use std::time::{Duration, Instant};

/// Minimum spacing between repeated vehicle actions.
#[derive(Debug)]
pub struct CommandRateLimit {
    last: Option<Instant>,
    min_interval: Duration,
}

impl CommandRateLimit {
    pub fn new(min_interval: Duration) -> Self {
        Self { last: None, min_interval }
    }

    pub fn allow(&mut self) -> bool {
        self.allow_at(Instant::now())
    }

    pub fn allow_at(&mut self, now: Instant) -> bool {
        if let Some(t) = self.last {
            if now.saturating_duration_since(t) < self.min_interval { return false; }
        }
        self.last = Some(now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_request_inside_interval_is_refused() {
        let mut lim = CommandRateLimit::new(Duration::from_secs(2));
        let t0 = Instant::now();
        assert!(lim.allow_at(t0));
        assert!(!lim.allow_at(t0 + Duration::from_millis(1500)));
        assert!(lim.allow_at(t0 + Duration::from_secs(2)));
    }
}
