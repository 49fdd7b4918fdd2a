//! Records published on the bridge socket.
//!
//! Every frame is UTF-8 JSON carrying a `topic` field naming the record, so a
//! subscriber can decode a multi-part reply frame by frame.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InterfaceState {
    Online,
    Offline,
}

/// `fail_state` on the wire.
///
/// Older consumers only know `NO_FAILURE` and `ATTEMPT_FAILURE`.
/// `DROPPED_FAILURE` is sent once a connected link stops delivering samples,
/// so a consumer must accept it (or treat unknown values as a failure) rather
/// than reject the whole status frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailState {
    NoFailure,
    /// The connection attempt itself failed.
    AttemptFailure,
    /// The link was up and stopped delivering samples. Always paired with
    /// `state = OFFLINE` and a non-empty `fail_output`.
    DroppedFailure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceStatus {
    pub state: InterfaceState,
    pub fail_state: FailState,
    pub fail_output: String,
    pub active_mode: bool,
}

impl InterfaceStatus {
    pub fn online(active_mode: bool) -> Self {
        Self::online_with_note("", active_mode)
    }

    /// ONLINE without failure, but with an explanatory note in `fail_output`
    /// (argument errors, idle notices).
    pub fn online_with_note(note: impl Into<String>, active_mode: bool) -> Self {
        Self {
            state: InterfaceState::Online,
            fail_state: FailState::NoFailure,
            fail_output: note.into(),
            active_mode,
        }
    }

    pub fn offline() -> Self {
        Self {
            state: InterfaceState::Offline,
            fail_state: FailState::NoFailure,
            fail_output: String::new(),
            active_mode: false,
        }
    }

    pub fn attempt_failed(output: impl Into<String>) -> Self {
        Self {
            state: InterfaceState::Offline,
            fail_state: FailState::AttemptFailure,
            fail_output: output.into(),
            active_mode: false,
        }
    }

    pub fn dropped(output: impl Into<String>) -> Self {
        Self {
            state: InterfaceState::Offline,
            fail_state: FailState::DroppedFailure,
            fail_output: output.into(),
            active_mode: false,
        }
    }
}

/// Position, velocity (m/s) and body acceleration (m/s^2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    pub longitude: f64,
    pub latitude: f64,
    pub altitude: f32,
    pub satellites: u16,
    pub vel_x: f64,
    pub vel_y: f64,
    pub vel_z: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accel_x: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accel_y: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accel_z: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlightStatus {
    pub state: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlDevice {
    pub auto_mode: bool,
    pub return_to_home: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "topic")]
pub enum Message {
    InterfaceStatus(InterfaceStatus),
    Telemetry(Telemetry),
    FlightStatus(FlightStatus),
    ControlDevice(ControlDevice),
}

impl Message {
    pub fn topic(&self) -> &'static str {
        match self {
            Message::InterfaceStatus(_) => "InterfaceStatus",
            Message::Telemetry(_) => "Telemetry",
            Message::FlightStatus(_) => "FlightStatus",
            Message::ControlDevice(_) => "ControlDevice",
        }
    }

    pub fn to_frame(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn from_frame(frame: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(frame)
    }
}

impl From<InterfaceStatus> for Message {
    fn from(v: InterfaceStatus) -> Self {
        Message::InterfaceStatus(v)
    }
}

impl From<Telemetry> for Message {
    fn from(v: Telemetry) -> Self {
        Message::Telemetry(v)
    }
}

impl From<FlightStatus> for Message {
    fn from(v: FlightStatus) -> Self {
        Message::FlightStatus(v)
    }
}

impl From<ControlDevice> for Message {
    fn from(v: ControlDevice) -> Self {
        Message::ControlDevice(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn interface_status_wire_shape() {
        let frame = Message::from(InterfaceStatus::attempt_failed("no heartbeat"))
            .to_frame()
            .unwrap();
        let v: Value = serde_json::from_slice(&frame).unwrap();
        assert_eq!(v["topic"], "InterfaceStatus");
        assert_eq!(v["state"], "OFFLINE");
        assert_eq!(v["fail_state"], "ATTEMPT_FAILURE");
        assert_eq!(v["fail_output"], "no heartbeat");
        assert_eq!(v["active_mode"], false);
    }

    #[test]
    fn telemetry_omits_acceleration_when_absent() {
        let t = Telemetry {
            longitude: 8.5,
            latitude: 47.3,
            altitude: 420.0,
            satellites: 12,
            vel_x: 1.0,
            vel_y: -0.5,
            vel_z: 0.0,
            accel_x: None,
            accel_y: None,
            accel_z: None,
        };
        let v: Value = serde_json::to_value(Message::from(t)).unwrap();
        assert_eq!(v["topic"], "Telemetry");
        assert_eq!(v["satellites"], 12);
        assert!(v.get("accel_x").is_none());
    }

    #[test]
    fn decodes_control_device_frame() {
        let msg = Message::from_frame(br#"{"topic":"ControlDevice","auto_mode":true,"return_to_home":false}"#)
            .unwrap();
        assert_eq!(
            msg,
            Message::ControlDevice(ControlDevice { auto_mode: true, return_to_home: false })
        );
        assert_eq!(msg.topic(), "ControlDevice");
    }

    #[test]
    fn flight_status_state_is_integer() {
        let v: Value = serde_json::to_value(Message::from(FlightStatus { state: 2 })).unwrap();
        assert_eq!(v["state"], 2);
    }

    #[test]
    fn dropped_link_status_wire_shape() {
        let v: Value = serde_json::to_value(Message::from(InterfaceStatus::dropped("no fresh gps-fused sample"))).unwrap();
        assert_eq!(v["topic"], "InterfaceStatus");
        assert_eq!(v["state"], "OFFLINE");
        assert_eq!(v["fail_state"], "DROPPED_FAILURE");
        assert_eq!(v["active_mode"], false);

        let back = Message::from_frame(br#"{"topic":"InterfaceStatus","state":"OFFLINE","fail_state":"DROPPED_FAILURE","fail_output":"x","active_mode":false}"#).unwrap();
        let Message::InterfaceStatus(st) = back else { panic!("status expected") };
        assert_eq!(st.fail_state, FailState::DroppedFailure);
    }
}
