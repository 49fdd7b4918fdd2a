use std::time::{Duration, Instant};

use crate::error::LinkError;
use crate::topic::{FusedPosition, Topic, Vector3f};

#[derive(Debug, Clone, Copy)]
pub struct Stamped<T> {
    pub value: T,
    pub at: Instant,
}

impl<T: Copy> Stamped<T> {
    pub fn new(value: T, at: Instant) -> Self {
        Self { value, at }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckRecord {
    pub command: u32,
    pub result: u32,
}

/// Latest values received from the autopilot, written by the reader thread.
#[derive(Debug, Clone)]
pub struct LinkCache {
    pub opened_at: Instant,
    pub last_heartbeat: Option<Instant>,
    pub flight_status: Option<Stamped<u8>>,
    pub display_mode: Option<Stamped<u8>>,
    pub position: Option<Stamped<FusedPosition>>,
    pub satellites: u16,
    pub velocity: Option<Stamped<Vector3f>>,
    pub acceleration: Option<Stamped<Vector3f>>,
    pub last_ack: Option<AckRecord>,
}

impl LinkCache {
    pub fn new(opened_at: Instant) -> Self {
        Self {
            opened_at,
            last_heartbeat: None,
            flight_status: None,
            display_mode: None,
            position: None,
            satellites: 0,
            velocity: None,
            acceleration: None,
            last_ack: None,
        }
    }

    /// Value of a slot if it was refreshed within `stale_after`. An empty slot
    /// reads as the default value until the link has been open that long.
    pub fn fresh<T: Copy + Default>(
        &self,
        slot: &Option<Stamped<T>>,
        topic: Topic,
        stale_after: Duration,
        now: Instant,
    ) -> Result<T, LinkError> {
        let (value, since) = match slot {
            Some(s) => (s.value, s.at),
            None => (T::default(), self.opened_at),
        };
        let age = now.saturating_duration_since(since);
        if age > stale_after {
            return Err(LinkError::Stale { topic, age_ms: age.as_millis() as u64 });
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_slot_reads_default_while_link_is_young() {
        let t0 = Instant::now();
        let cache = LinkCache::new(t0);
        let v = cache
            .fresh(&cache.velocity, Topic::GpsVelocity, Duration::from_secs(3), t0 + Duration::from_secs(1))
            .unwrap();
        assert_eq!(v, Vector3f::default());
    }

    #[test]
    fn old_sample_is_stale() {
        let t0 = Instant::now();
        let mut cache = LinkCache::new(t0);
        cache.display_mode = Some(Stamped::new(6, t0));
        let err = cache
            .fresh(&cache.display_mode, Topic::DisplayMode, Duration::from_millis(500), t0 + Duration::from_secs(2))
            .unwrap_err();
        assert!(matches!(err, LinkError::Stale { topic: Topic::DisplayMode, age_ms: 2000 }));
    }
}
