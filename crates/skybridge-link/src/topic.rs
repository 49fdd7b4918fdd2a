use std::fmt;

/// Package rates the vehicle link accepts.
pub const SUPPORTED_RATES_HZ: [u16; 7] = [1, 5, 10, 50, 100, 200, 400];

pub fn is_supported_rate(hz: u16) -> bool {
    SUPPORTED_RATES_HZ.contains(&hz)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Topic {
    FlightStatus,
    DisplayMode,
    GpsFused,
    AccelerationBody,
    GpsVelocity,
}

impl Topic {
    pub fn name(self) -> &'static str {
        match self {
            Topic::FlightStatus => "flight-status",
            Topic::DisplayMode => "display-mode",
            Topic::GpsFused => "gps-fused",
            Topic::AccelerationBody => "acceleration-body",
            Topic::GpsVelocity => "gps-velocity",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Fused position: degrees, metres above mean sea level.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FusedPosition {
    pub longitude: f64,
    pub latitude: f64,
    pub altitude: f32,
    pub visible_satellites: u16,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vector3f {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3f {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Velocity is raw link units (cm/s); acceleration is m/s^2.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TopicValue {
    FlightStatus(u8),
    DisplayMode(u8),
    Position(FusedPosition),
    Acceleration(Vector3f),
    Velocity(Vector3f),
}

/// Topics sampled together at one rate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSpec {
    pub index: u8,
    pub topics: Vec<Topic>,
    pub freq_hz: u16,
}

impl PackageSpec {
    pub fn new(index: u8, topics: &[Topic], freq_hz: u16) -> Self {
        Self { index, topics: topics.to_vec(), freq_hz }
    }

    pub fn contains(&self, topic: Topic) -> bool {
        self.topics.contains(&topic)
    }
}
