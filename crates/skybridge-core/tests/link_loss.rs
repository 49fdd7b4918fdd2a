use anyhow::Result;
use skybridge_core::{CommandConfig, Dispatcher, MemoryTransport, Session, TelemetryConfig};
use skybridge_link::mav::{FcLink, MavHeader, MavMessage, MavSink, MavSource};
use skybridge_link::{LinkConfig, LinkError, LinkKind, LinkProvider, VehicleLink};
use skybridge_proto::{FailState, InterfaceState, InterfaceStatus, Message};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A serial port that never delivers a byte: every read times out.
struct QuietPort;

impl MavSource for QuietPort {
    fn read(&mut self) -> Result<Option<(MavHeader, MavMessage)>> {
        std::thread::sleep(Duration::from_millis(10));
        Ok(None)
    }
}

#[derive(Clone, Default)]
struct CountingSink(Arc<AtomicUsize>);

impl MavSink for CountingSink {
    fn send(&mut self, _hdr: MavHeader, _msg: &MavMessage) -> Result<()> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct QuietVehicle {
    cfg: LinkConfig,
    sink: CountingSink,
}

impl LinkProvider for QuietVehicle {
    fn init_vehicle(&mut self) -> Result<Box<dyn VehicleLink>, LinkError> {
        let link = FcLink::with_wire(Box::new(QuietPort), Box::new(self.sink.clone()), &self.cfg)
            .map_err(|e| LinkError::Fault(format!("{:#}", e)))?;
        Ok(Box::new(link))
    }
}

fn link_cfg() -> LinkConfig {
    LinkConfig {
        kind: LinkKind::Mavlink,
        autodetect: false,
        serial_dev: None,
        baud: None,
        candidate_devs: None,
        candidate_bauds: None,
        heartbeat_timeout_ms: None,
        sys_id: 255,
        comp_id: 190,
        target_sys: 1,
        target_comp: 1,
        allow_rtl: true,
        require_heartbeat: false,
        stale_after_ms: Some(50),
        go_home_timeout_s: None,
        sim: None,
    }
}

fn status(t: &mut MemoryTransport) -> InterfaceStatus {
    let frames = t.take_reply().expect("one reply");
    assert_eq!(frames.len(), 1);
    match Message::from_frame(&frames[0]).expect("json frame") {
        Message::InterfaceStatus(s) => s,
        other => panic!("expected status, got {:?}", other),
    }
}

#[test]
fn quiet_mavlink_vehicle_degrades_and_reconnects() {
    let sink = CountingSink::default();
    let provider = QuietVehicle { cfg: link_cfg(), sink: sink.clone() };
    let mut session = Session::new(Box::new(provider), TelemetryConfig::default(), Duration::from_secs(1));
    let dispatcher = Dispatcher::new(CommandConfig::default());
    let mut t = MemoryTransport::default();

    dispatcher.handle(&mut session, b"start_interface", &mut t).unwrap();
    assert_eq!(status(&mut t).state, InterfaceState::Online);
    let after_start = sink.0.load(Ordering::SeqCst);
    assert!(after_start > 0, "stream requests were sent");

    std::thread::sleep(Duration::from_millis(120));
    dispatcher.handle(&mut session, b"retrieve_data", &mut t).unwrap();
    let st = status(&mut t);
    assert_eq!(st.state, InterfaceState::Offline);
    assert_eq!(st.fail_state, FailState::DroppedFailure);
    assert!(st.fail_output.contains("no fresh"));
    // streams were switched off on the way down
    assert!(sink.0.load(Ordering::SeqCst) > after_start);

    dispatcher.handle(&mut session, b"check_interface", &mut t).unwrap();
    assert_eq!(status(&mut t).fail_state, FailState::DroppedFailure);

    dispatcher.handle(&mut session, b"start_interface", &mut t).unwrap();
    let st = status(&mut t);
    assert_eq!(st.state, InterfaceState::Online);
    assert_eq!(st.fail_state, FailState::NoFailure);
}
