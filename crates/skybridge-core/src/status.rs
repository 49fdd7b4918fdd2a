use anyhow::Result;
use skybridge_proto::{InterfaceStatus, Message};
use tracing::info;

use crate::transport::{send_message, Transport};

/// Sends a status record as a single, final frame.
pub fn report_status(transport: &mut dyn Transport, status: &InterfaceStatus) -> Result<()> {
    info!(
        "status: {:?}/{:?} active={} {}",
        status.state, status.fail_state, status.active_mode, status.fail_output
    );
    send_message(transport, &Message::InterfaceStatus(status.clone()), false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryTransport;
    use skybridge_proto::{FailState, InterfaceState};

    #[test]
    fn status_is_one_final_frame() {
        let mut t = MemoryTransport::default();
        report_status(&mut t, &InterfaceStatus::attempt_failed("port busy")).unwrap();
        assert_eq!(t.sent.len(), 1);
        assert!(!t.sent[0].1);
        match Message::from_frame(&t.sent[0].0).unwrap() {
            Message::InterfaceStatus(s) => {
                assert_eq!(s.state, InterfaceState::Offline);
                assert_eq!(s.fail_state, FailState::AttemptFailure);
                assert_eq!(s.fail_output, "port busy");
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
