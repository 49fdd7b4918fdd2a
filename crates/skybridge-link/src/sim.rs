//! In-process stand-in for a vehicle: bench runs without hardware, and failure
//! injection for every link primitive.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::debug;

use crate::error::LinkError;
use crate::topic::{is_supported_rate, FusedPosition, PackageSpec, Topic, TopicValue, Vector3f};
use crate::{ActionAck, LinkProvider, VehicleLink};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Connection attempts finish without a vehicle, with this description.
    pub connect_error: Option<String>,
    /// Connection attempts fail with a lower-level fault.
    pub connect_fault: Option<String>,
    pub reject_package: Option<u8>,
    pub fail_start_package: Option<u8>,
    /// Non-zero: go-home acknowledgment carries this result code.
    pub go_home_result: u32,
    /// Every sample read reports the link as stale.
    pub stale: bool,

    pub flight_status: u8,
    pub display_mode: u8,
    pub longitude: f64,
    pub latitude: f64,
    pub altitude: f32,
    pub satellites: u16,
    /// Raw cm/s.
    pub velocity: [f32; 3],
    pub acceleration: [f32; 3],
}

#[derive(Debug, Clone)]
pub struct SimPackage {
    pub spec: PackageSpec,
    pub started: bool,
}

#[derive(Debug, Default)]
pub struct SimState {
    pub cfg: SimConfig,
    pub packages: BTreeMap<u8, SimPackage>,
    pub connect_attempts: u32,
    pub go_home_requests: u32,
}

/// Shared view of the simulated vehicle, for tests and bench tooling.
#[derive(Debug, Clone)]
pub struct SimHandle(Arc<Mutex<SimState>>);

impl SimHandle {
    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut SimState) -> R) -> R {
        f(&mut self.lock())
    }

    /// Indices of every package currently registered on the link.
    pub fn registered(&self) -> Vec<u8> {
        self.lock().packages.keys().copied().collect()
    }

    pub fn package(&self, index: u8) -> Option<SimPackage> {
        self.lock().packages.get(&index).cloned()
    }
}

pub struct SimProvider {
    handle: SimHandle,
}

impl SimProvider {
    pub fn new(cfg: SimConfig) -> Self {
        Self { handle: SimHandle(Arc::new(Mutex::new(SimState { cfg, ..Default::default() }))) }
    }

    pub fn handle(&self) -> SimHandle {
        self.handle.clone()
    }
}

impl LinkProvider for SimProvider {
    fn init_vehicle(&mut self) -> Result<Box<dyn VehicleLink>, LinkError> {
        let mut st = self.handle.lock();
        st.connect_attempts += 1;
        if let Some(fault) = &st.cfg.connect_fault {
            return Err(LinkError::Fault(fault.clone()));
        }
        if let Some(err) = &st.cfg.connect_error {
            return Err(LinkError::Unavailable(err.clone()));
        }
        st.packages.clear();
        debug!("sim: vehicle connected (attempt {})", st.connect_attempts);
        Ok(Box::new(SimVehicle { handle: self.handle.clone() }))
    }
}

pub struct SimVehicle {
    handle: SimHandle,
}

impl VehicleLink for SimVehicle {
    fn init_package(&mut self, spec: &PackageSpec) -> bool {
        let mut st = self.handle.lock();
        if st.cfg.reject_package == Some(spec.index)
            || spec.topics.is_empty()
            || !is_supported_rate(spec.freq_hz)
            || st.packages.contains_key(&spec.index)
        {
            return false;
        }
        st.packages.insert(spec.index, SimPackage { spec: spec.clone(), started: false });
        true
    }

    fn start_package(&mut self, index: u8) -> Result<(), LinkError> {
        let mut st = self.handle.lock();
        if st.cfg.fail_start_package == Some(index) {
            return Err(LinkError::PackageStart { index, reason: "simulated start failure".into() });
        }
        match st.packages.get_mut(&index) {
            Some(p) => {
                p.started = true;
                Ok(())
            }
            None => Err(LinkError::PackageStart { index, reason: "package not initialized".into() }),
        }
    }

    fn remove_package(&mut self, index: u8) {
        self.handle.lock().packages.remove(&index);
    }

    fn value(&mut self, topic: Topic) -> Result<TopicValue, LinkError> {
        let st = self.handle.lock();
        if !st.packages.values().any(|p| p.started && p.spec.contains(topic)) {
            return Err(LinkError::NotSubscribed(topic));
        }
        if st.cfg.stale {
            return Err(LinkError::Stale { topic, age_ms: 3000 });
        }
        let c = &st.cfg;
        let v = match topic {
            Topic::FlightStatus => TopicValue::FlightStatus(c.flight_status),
            Topic::DisplayMode => TopicValue::DisplayMode(c.display_mode),
            Topic::GpsFused => TopicValue::Position(FusedPosition {
                longitude: c.longitude,
                latitude: c.latitude,
                altitude: c.altitude,
                visible_satellites: c.satellites,
            }),
            Topic::AccelerationBody => {
                TopicValue::Acceleration(Vector3f::new(c.acceleration[0], c.acceleration[1], c.acceleration[2]))
            }
            Topic::GpsVelocity => TopicValue::Velocity(Vector3f::new(c.velocity[0], c.velocity[1], c.velocity[2])),
        };
        Ok(v)
    }

    fn start_go_home(&mut self, _timeout: Duration) -> ActionAck {
        let mut st = self.handle.lock();
        st.go_home_requests += 1;
        match st.cfg.go_home_result {
            0 => ActionAck::Success,
            code => ActionAck::Rejected(code),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_error_is_unavailable() {
        let mut p = SimProvider::new(SimConfig { connect_error: Some("no vehicle".into()), ..Default::default() });
        let err = p.init_vehicle().err().unwrap();
        assert!(matches!(err, LinkError::Unavailable(ref s) if s == "no vehicle"));
        assert_eq!(p.handle().with(|s| s.connect_attempts), 1);
    }

    #[test]
    fn unsubscribed_topic_is_refused() {
        let mut p = SimProvider::new(SimConfig::default());
        let mut v = p.init_vehicle().unwrap();
        assert!(matches!(v.velocity(), Err(LinkError::NotSubscribed(Topic::GpsVelocity))));

        assert!(v.init_package(&PackageSpec::new(2, &[Topic::GpsVelocity], 5)));
        v.start_package(2).unwrap();
        p.handle().with(|s| s.cfg.velocity = [-120.0, 40.0, 3.0]);
        assert_eq!(v.velocity().unwrap(), Vector3f::new(-120.0, 40.0, 3.0));
    }

    #[test]
    fn unsupported_rate_and_duplicate_index_rejected() {
        let mut p = SimProvider::new(SimConfig::default());
        let mut v = p.init_vehicle().unwrap();
        assert!(!v.init_package(&PackageSpec::new(0, &[Topic::FlightStatus], 7)));
        assert!(v.init_package(&PackageSpec::new(0, &[Topic::FlightStatus], 1)));
        assert!(!v.init_package(&PackageSpec::new(0, &[Topic::DisplayMode], 10)));
    }
}
