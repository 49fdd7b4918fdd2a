pub mod messages;

pub use messages::{
    ControlDevice, FailState, FlightStatus, InterfaceState, InterfaceStatus, Message, Telemetry,
};
