use anyhow::Result;
use skybridge_proto::InterfaceStatus;
use tracing::{debug, info, warn};

use crate::command::Command;
use crate::config::CommandConfig;
use crate::publisher::{unix_millis, PublishError};
use crate::session::Session;
use crate::status::report_status;
use crate::transport::{send_text, Transport};

pub const UNKNOWN_COMMAND: &str = "Unknown command.";
pub const GOING_HOME: &str = "Going home!";
pub const GO_HOME_FAILED: &str = "Fail to execute go home action!";
pub const NOT_CONNECTED: &str = "Vehicle is not connected.";
pub const TELEMETRY_IDLE: &str = "Telemetry is idle.";

/// Strict request/reply loop: one request in, exactly one (possibly
/// multi-part) reply out.
pub struct Dispatcher {
    commands: CommandConfig,
    clock: fn() -> u64,
}

impl Dispatcher {
    pub fn new(commands: CommandConfig) -> Self {
        Self { commands, clock: unix_millis }
    }

    /// Replaces the millisecond wall clock used for publish deadlines.
    pub fn with_clock(mut self, clock: fn() -> u64) -> Self {
        self.clock = clock;
        self
    }

    /// Runs until the transport fails.
    pub fn serve(&self, session: &mut Session, transport: &mut dyn Transport) -> Result<()> {
        info!("dispatcher: serving (extended commands: {})", self.commands.extended);
        loop {
            let request = transport.recv()?;
            self.handle(session, &request, transport)?;
        }
    }

    pub fn handle(&self, session: &mut Session, request: &[u8], transport: &mut dyn Transport) -> Result<()> {
        let text = String::from_utf8_lossy(request);
        let cmd = Command::parse(&text, self.commands.extended);
        info!("REQUEST: {}", cmd.name());

        match cmd {
            Command::CheckInterface => report_status(transport, &session.status()),
            Command::StartInterface => {
                let status = session.start_interface((self.clock)());
                report_status(transport, &status)
            }
            Command::SwitchIdle => {
                let status = match session.controller_mut() {
                    Some(c) => {
                        c.switch_to_idle();
                        InterfaceStatus::online(c.active_mode())
                    }
                    None => session.status(),
                };
                report_status(transport, &status)
            }
            Command::SwitchActive(rate) => {
                let status = match session.controller_mut() {
                    Some(c) => match rate {
                        Err(e) => InterfaceStatus::online_with_note(e.to_string(), c.active_mode()),
                        Ok(hz) => match c.switch_to_active(hz) {
                            Ok(()) => InterfaceStatus::online(c.active_mode()),
                            Err(e) => {
                                warn!("switch_active {} failed: {}", hz, e);
                                InterfaceStatus::online_with_note(e.failure_description(), c.active_mode())
                            }
                        },
                    },
                    None => session.status(),
                };
                report_status(transport, &status)
            }
            Command::RetrieveData => self.retrieve_data(session, transport),
            Command::ReturnHome => {
                let timeout = session.go_home_timeout();
                let reply = match session.controller_mut() {
                    Some(c) => {
                        let ack = c.go_home(timeout);
                        if ack.is_success() {
                            GOING_HOME
                        } else {
                            warn!("{} ack={:?}", GO_HOME_FAILED, ack);
                            GO_HOME_FAILED
                        }
                    }
                    None => NOT_CONNECTED,
                };
                send_text(transport, reply)
            }
            Command::Unknown(_) => send_text(transport, UNKNOWN_COMMAND),
        }
    }

    fn retrieve_data(&self, session: &mut Session, transport: &mut dyn Transport) -> Result<()> {
        let now = (self.clock)();
        let outcome = match session.controller_mut() {
            None => None,
            Some(c) if !c.active_mode() => {
                return report_status(transport, &InterfaceStatus::online_with_note(TELEMETRY_IDLE, false));
            }
            Some(c) => Some(c.publish_cycle(now, transport)),
        };

        match outcome {
            None => report_status(transport, &session.status()),
            Some(Ok(frames)) => {
                debug!("retrieve_data: {} frames", frames);
                Ok(())
            }
            Some(Err(PublishError::Link(e))) => {
                session.degrade(&e);
                report_status(transport, &session.status())
            }
            Some(Err(PublishError::Transport(e))) => Err(e),
        }
    }
}
