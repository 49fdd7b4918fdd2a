use skybridge_link::{LinkError, LinkProvider};
use skybridge_proto::InterfaceStatus;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::TelemetryConfig;
use crate::publisher::TelemetryController;

pub enum LinkState {
    Disconnected,
    Connected(TelemetryController),
    /// The link was up and stopped delivering samples.
    Degraded { reason: String },
}

/// Everything the dispatcher mutates: the vehicle connection and its
/// telemetry controller.
pub struct Session {
    state: LinkState,
    provider: Box<dyn LinkProvider>,
    telemetry: TelemetryConfig,
    go_home_timeout: Duration,
}

impl Session {
    pub fn new(provider: Box<dyn LinkProvider>, telemetry: TelemetryConfig, go_home_timeout: Duration) -> Self {
        Self { state: LinkState::Disconnected, provider, telemetry, go_home_timeout }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, LinkState::Connected(_))
    }

    pub fn go_home_timeout(&self) -> Duration {
        self.go_home_timeout
    }

    pub fn status(&self) -> InterfaceStatus {
        match &self.state {
            LinkState::Disconnected => InterfaceStatus::offline(),
            LinkState::Connected(c) => InterfaceStatus::online(c.active_mode()),
            LinkState::Degraded { reason } => InterfaceStatus::dropped(reason.clone()),
        }
    }

    pub fn controller_mut(&mut self) -> Option<&mut TelemetryController> {
        match &mut self.state {
            LinkState::Connected(c) => Some(c),
            _ => None,
        }
    }

    /// Connects to the vehicle and subscribes telemetry. Either both succeed
    /// or the session stays disconnected.
    pub fn start_interface(&mut self, now_ms: u64) -> InterfaceStatus {
        if let LinkState::Connected(c) = &self.state {
            return InterfaceStatus::online_with_note("Vehicle interface already active.", c.active_mode());
        }

        info!("Initializing vehicle.");
        let vehicle = match self.provider.init_vehicle() {
            Ok(v) => v,
            Err(e) => {
                warn!("Could not connect: {}", e);
                self.state = LinkState::Disconnected;
                return InterfaceStatus::attempt_failed(e.failure_description());
            }
        };

        match TelemetryController::new(vehicle, self.telemetry.active_hz(), self.telemetry.velocity_hz(), now_ms) {
            Ok(c) => {
                info!("Connected.");
                let status = InterfaceStatus::online(c.active_mode());
                self.state = LinkState::Connected(c);
                status
            }
            Err(e) => {
                warn!("telemetry subscription failed: {}", e);
                self.state = LinkState::Disconnected;
                InterfaceStatus::attempt_failed(format!("telemetry subscription failed: {}", e.failure_description()))
            }
        }
    }

    /// Tears down the controller after the link stopped answering.
    pub fn degrade(&mut self, err: &LinkError) {
        if let LinkState::Connected(c) = &mut self.state {
            c.shutdown();
        }
        warn!("link dropped: {}", err);
        self.state = LinkState::Degraded { reason: err.failure_description() };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skybridge_link::sim::{SimConfig, SimProvider};
    use skybridge_proto::{FailState, InterfaceState};

    fn session(cfg: SimConfig) -> (Session, skybridge_link::sim::SimHandle) {
        let p = SimProvider::new(cfg);
        let h = p.handle();
        (Session::new(Box::new(p), TelemetryConfig::default(), Duration::from_secs(3)), h)
    }

    #[test]
    fn offline_before_any_attempt() {
        let (s, _) = session(SimConfig::default());
        let st = s.status();
        assert_eq!(st.state, InterfaceState::Offline);
        assert_eq!(st.fail_state, FailState::NoFailure);
        assert!(!st.active_mode);
    }

    #[test]
    fn successful_attempt_is_online() {
        let (mut s, _) = session(SimConfig::default());
        let st = s.start_interface(0);
        assert_eq!(st.state, InterfaceState::Online);
        assert_eq!(st.fail_state, FailState::NoFailure);
        assert_eq!(st.fail_output, "");
        assert!(s.is_connected());
    }

    #[test]
    fn fault_and_unavailable_share_failure_shape() {
        for cfg in [
            SimConfig { connect_error: Some("vehicle not found".into()), ..Default::default() },
            SimConfig { connect_fault: Some("serial port busy".into()), ..Default::default() },
        ] {
            let (mut s, _) = session(cfg);
            let st = s.start_interface(0);
            assert_eq!(st.state, InterfaceState::Offline);
            assert_eq!(st.fail_state, FailState::AttemptFailure);
            assert!(!st.fail_output.is_empty());
            assert!(!s.is_connected());
        }
    }

    #[test]
    fn subscription_failure_keeps_session_disconnected() {
        let (mut s, sim) = session(SimConfig { reject_package: Some(2), ..Default::default() });
        let st = s.start_interface(0);
        assert_eq!(st.fail_state, FailState::AttemptFailure);
        assert!(st.fail_output.contains("package 2"));
        assert!(s.controller_mut().is_none());
        assert!(sim.registered().is_empty());
    }

    #[test]
    fn degrade_then_reconnect() {
        let (mut s, sim) = session(SimConfig::default());
        s.start_interface(0);
        s.degrade(&LinkError::Stale { topic: skybridge_link::Topic::GpsFused, age_ms: 5000 });
        assert_eq!(s.status().fail_state, FailState::DroppedFailure);
        assert!(sim.registered().is_empty());

        assert_eq!(s.start_interface(10).state, InterfaceState::Online);
        assert_eq!(sim.with(|st| st.connect_attempts), 2);
    }
}
