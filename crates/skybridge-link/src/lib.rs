pub mod autodetect;
pub mod error;
pub mod mav;
pub mod safety;
pub mod sim;
pub mod state;
pub mod topic;

use serde::Deserialize;
use std::time::Duration;

pub use error::LinkError;
pub use topic::{is_supported_rate, FusedPosition, PackageSpec, Topic, TopicValue, Vector3f, SUPPORTED_RATES_HZ};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    Mavlink,
    Sim,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LinkConfig {
    pub kind: LinkKind,

    /// If true, probe candidate serial ports/bauds and pick the first that
    /// yields a MAVLink HEARTBEAT.
    #[serde(default)]
    pub autodetect: bool,

    /// When autodetect=false: fixed port config
    pub serial_dev: Option<String>,
    pub baud: Option<u32>,

    pub candidate_devs: Option<Vec<String>>,
    pub candidate_bauds: Option<Vec<u32>>,

    /// Heartbeat wait per probe attempt and per connection attempt
    pub heartbeat_timeout_ms: Option<u64>,

    /// MAVLink ids we use (bridge side)
    pub sys_id: u8,
    pub comp_id: u8,

    /// target system/component (autopilot side). 1/1 is common for ArduPilot.
    pub target_sys: u8,
    pub target_comp: u8,

    #[serde(default)]
    pub allow_rtl: bool,

    /// Require seeing a heartbeat before the connection counts as established
    #[serde(default)]
    pub require_heartbeat: bool,

    /// A topic with no refresh for this long is reported as stale. Default 3s.
    pub stale_after_ms: Option<u64>,

    /// How long to wait for the go-home acknowledgment. Default 3s.
    pub go_home_timeout_s: Option<u64>,

    /// Initial state of the simulated vehicle (kind = "sim").
    pub sim: Option<sim::SimConfig>,
}

impl LinkConfig {
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms.unwrap_or(1500))
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_millis(self.stale_after_ms.unwrap_or(3000))
    }

    pub fn go_home_timeout(&self) -> Duration {
        Duration::from_secs(self.go_home_timeout_s.unwrap_or(3))
    }
}

/// Outcome of a vehicle action such as go-home.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionAck {
    Success,
    /// The vehicle answered with a non-success result code.
    Rejected(u32),
    Timeout,
    RateLimited,
    /// The request never left the bridge.
    Refused(String),
}

impl ActionAck {
    pub fn is_success(&self) -> bool {
        matches!(self, ActionAck::Success)
    }
}

/// A connected vehicle: topic subscription primitives plus the actions the
/// bridge can trigger.
pub trait VehicleLink: Send {
    /// Registers a package. Returns false when the link refuses it (unknown
    /// rate, duplicate index, empty topic list).
    fn init_package(&mut self, spec: &PackageSpec) -> bool;

    fn start_package(&mut self, index: u8) -> Result<(), LinkError>;

    fn remove_package(&mut self, index: u8);

    /// Most recent value of a topic.
    fn value(&mut self, topic: Topic) -> Result<TopicValue, LinkError>;

    fn start_go_home(&mut self, timeout: Duration) -> ActionAck;

    fn flight_status(&mut self) -> Result<u8, LinkError> {
        match self.value(Topic::FlightStatus)? {
            TopicValue::FlightStatus(v) => Ok(v),
            _ => Err(LinkError::UnexpectedValue(Topic::FlightStatus)),
        }
    }

    fn display_mode(&mut self) -> Result<u8, LinkError> {
        match self.value(Topic::DisplayMode)? {
            TopicValue::DisplayMode(v) => Ok(v),
            _ => Err(LinkError::UnexpectedValue(Topic::DisplayMode)),
        }
    }

    fn position(&mut self) -> Result<FusedPosition, LinkError> {
        match self.value(Topic::GpsFused)? {
            TopicValue::Position(v) => Ok(v),
            _ => Err(LinkError::UnexpectedValue(Topic::GpsFused)),
        }
    }

    fn acceleration(&mut self) -> Result<Vector3f, LinkError> {
        match self.value(Topic::AccelerationBody)? {
            TopicValue::Acceleration(v) => Ok(v),
            _ => Err(LinkError::UnexpectedValue(Topic::AccelerationBody)),
        }
    }

    fn velocity(&mut self) -> Result<Vector3f, LinkError> {
        match self.value(Topic::GpsVelocity)? {
            TopicValue::Velocity(v) => Ok(v),
            _ => Err(LinkError::UnexpectedValue(Topic::GpsVelocity)),
        }
    }
}

/// Establishes the vehicle connection. Both "no vehicle" and lower-level
/// faults come back as a `LinkError`.
pub trait LinkProvider: Send {
    fn init_vehicle(&mut self) -> Result<Box<dyn VehicleLink>, LinkError>;
}

pub fn provider(cfg: &LinkConfig) -> Box<dyn LinkProvider> {
    match cfg.kind {
        LinkKind::Mavlink => Box::new(mav::MavProvider::new(cfg.clone())),
        LinkKind::Sim => Box::new(sim::SimProvider::new(cfg.sim.clone().unwrap_or_default())),
    }
}
