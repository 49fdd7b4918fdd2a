pub mod command;
pub mod config;
pub mod control_state;
pub mod dispatcher;
pub mod doctor;
pub mod publisher;
pub mod session;
pub mod status;
pub mod subscription;
pub mod transport;

pub use command::{Command, CommandError};
pub use config::{CommandConfig, TelemetryConfig};
pub use control_state::{derive_control_state, ControlState, DisplayMode};
pub use dispatcher::Dispatcher;
pub use publisher::{PublishError, Snapshot, TelemetryController};
pub use session::{LinkState, Session};
pub use status::report_status;
pub use subscription::{PackageLayout, Subscriptions};
pub use transport::{MemoryTransport, Transport, ZmqTransport};
