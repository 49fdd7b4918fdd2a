use anyhow::{Context, Result};
use mavlink::{
    common::{MavAutopilot, MavCmd, MavModeFlag, MavResult, MavState, COMMAND_LONG_DATA, HEARTBEAT_DATA},
    error::MessageReadError,
    peek_reader::PeekReader,
    MavlinkVersion,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio_serial::SerialPort;
use tracing::{debug, info, warn};

pub use mavlink::common::MavMessage;
pub use mavlink::MavHeader;

use crate::autodetect::{autodetect_fc, default_candidate_bauds, default_candidate_devs};
use crate::error::LinkError;
use crate::safety::CommandRateLimit;
use crate::state::{AckRecord, LinkCache, Stamped};
use crate::topic::{is_supported_rate, FusedPosition, PackageSpec, Topic, TopicValue, Vector3f};
use crate::{ActionAck, LinkConfig, LinkProvider, VehicleLink};

const MSG_HEARTBEAT: u32 = 0;
const MSG_GPS_RAW_INT: u32 = 24;
const MSG_SCALED_IMU: u32 = 26;
const MSG_GLOBAL_POSITION_INT: u32 = 33;

const STANDARD_GRAVITY: f32 = 9.806_65;

/// Upper bound for one serial read, and so for how long the reader thread
/// takes to notice it should stop.
const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Inbound half of a MAVLink link. `read` must return within a bounded time;
/// `Ok(None)` means nothing complete arrived.
pub trait MavSource: Send {
    fn read(&mut self) -> Result<Option<(MavHeader, MavMessage)>>;
}

/// Outbound half of a MAVLink link.
pub trait MavSink: Send {
    fn send(&mut self, hdr: MavHeader, msg: &MavMessage) -> Result<()>;
}

pub struct SerialSource {
    port: PeekReader<Box<dyn SerialPort>>,
}

impl MavSource for SerialSource {
    fn read(&mut self) -> Result<Option<(MavHeader, MavMessage)>> {
        match mavlink::read_versioned_msg::<MavMessage, _>(&mut self.port, MavlinkVersion::V2) {
            Ok(m) => Ok(Some(m)),
            Err(MessageReadError::Io(e))
                if matches!(e.kind(), std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock) =>
            {
                Ok(None)
            }
            Err(MessageReadError::Io(e)) => Err(e).context("fc serial read"),
            Err(e) => {
                debug!("mav: dropped undecodable frame: {:?}", e);
                Ok(None)
            }
        }
    }
}

pub struct SerialSink {
    port: Box<dyn SerialPort>,
}

impl MavSink for SerialSink {
    fn send(&mut self, hdr: MavHeader, msg: &MavMessage) -> Result<()> {
        mavlink::write_versioned_msg(&mut self.port, MavlinkVersion::V2, hdr, msg)
            .map_err(|e| anyhow::anyhow!("fc serial write: {:?}", e))?;
        Ok(())
    }
}

/// Opens the port once for reading (with a timeout) and clones the handle
/// for writing, so a silent vehicle never stalls outbound commands.
pub fn open_serial(dev: &str, baud: u32) -> Result<(SerialSource, SerialSink)> {
    let port = tokio_serial::new(dev, baud)
        .timeout(READ_TIMEOUT)
        .open()
        .with_context(|| format!("open fc serial device {}", dev))?;
    let writer = port.try_clone().with_context(|| format!("clone fc serial handle {}", dev))?;
    Ok((SerialSource { port: PeekReader::new(port) }, SerialSink { port: writer }))
}

#[derive(Debug)]
struct Package {
    spec: PackageSpec,
    started: bool,
}

/// A MAVLink autopilot reached over a serial port.
pub struct FcLink {
    sink: Box<dyn MavSink>,
    hdr: MavHeader,
    target_sys: u8,
    target_comp: u8,
    cache: Arc<Mutex<LinkCache>>,
    stop: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
    packages: BTreeMap<u8, Package>,
    /// Rate currently requested for each streamed message id.
    streams: BTreeMap<u32, u16>,
    limiter: CommandRateLimit,
    allow_rtl: bool,
    require_heartbeat: bool,
    stale_after: Duration,
}

impl FcLink {
    pub fn open(dev: &str, baud: u32, cfg: &LinkConfig) -> Result<Self> {
        let (source, sink) = open_serial(dev, baud)?;
        debug!("mav: opened {} @ {}", dev, baud);
        Self::with_wire(Box::new(source), Box::new(sink), cfg)
    }

    /// Builds a link over an arbitrary reader/writer pair and starts the
    /// reader thread.
    pub fn with_wire(source: Box<dyn MavSource>, sink: Box<dyn MavSink>, cfg: &LinkConfig) -> Result<Self> {
        let cache = Arc::new(Mutex::new(LinkCache::new(Instant::now())));
        let stop = Arc::new(AtomicBool::new(false));
        let reader = spawn_reader(source, cache.clone(), stop.clone(), cfg.target_sys)?;

        Ok(Self {
            sink,
            hdr: MavHeader { system_id: cfg.sys_id, component_id: cfg.comp_id, sequence: 0 },
            target_sys: cfg.target_sys,
            target_comp: cfg.target_comp,
            cache,
            stop,
            reader: Some(reader),
            packages: BTreeMap::new(),
            streams: BTreeMap::new(),
            limiter: CommandRateLimit::new(Duration::from_secs(2)),
            allow_rtl: cfg.allow_rtl,
            require_heartbeat: cfg.require_heartbeat,
            stale_after: cfg.stale_after(),
        })
    }

    fn cache(&self) -> MutexGuard<'_, LinkCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocks until a heartbeat from the target system arrives or `timeout`
    /// passes.
    pub fn wait_heartbeat(&self, timeout: Duration) -> bool {
        let start = Instant::now();
        while start.elapsed() < timeout {
            if self.cache().last_heartbeat.is_some() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(25));
        }
        false
    }

    fn set_message_interval(&mut self, msg_id: u32, interval_us: f32) -> Result<()> {
        let cmd = self.command_long(MavCmd::MAV_CMD_SET_MESSAGE_INTERVAL, [msg_id as f32, interval_us]);
        self.send(MavMessage::COMMAND_LONG(cmd))
    }

    /// Fastest rate any started package needs, per backing message.
    fn wanted_streams(&self) -> BTreeMap<u32, u16> {
        let mut want = BTreeMap::new();
        for p in self.packages.values().filter(|p| p.started) {
            for id in backing_messages(&p.spec.topics) {
                let hz = want.entry(id).or_insert(0u16);
                *hz = (*hz).max(p.spec.freq_hz);
            }
        }
        want
    }

    /// Requests every needed stream at its wanted rate and disables the
    /// streams no started package uses any more.
    fn apply_streams(&mut self) -> Result<()> {
        let want = self.wanted_streams();
        for (&id, &hz) in &want {
            if self.streams.get(&id) != Some(&hz) {
                self.set_message_interval(id, 1_000_000.0 / f32::from(hz))?;
                self.streams.insert(id, hz);
            }
        }
        let unused: Vec<u32> = self.streams.keys().filter(|id| !want.contains_key(id)).copied().collect();
        for id in unused {
            self.set_message_interval(id, -1.0)?;
            self.streams.remove(&id);
        }
        Ok(())
    }

    fn command_long(&self, command: MavCmd, params: [f32; 2]) -> COMMAND_LONG_DATA {
        COMMAND_LONG_DATA {
            target_system: self.target_sys,
            target_component: self.target_comp,
            command,
            confirmation: 0,
            param1: params[0],
            param2: params[1],
            param3: 0.0,
            param4: 0.0,
            param5: 0.0,
            param6: 0.0,
            param7: 0.0,
        }
    }

    fn subscribed(&self, topic: Topic) -> bool {
        self.packages.values().any(|p| p.started && p.spec.contains(topic))
    }

    fn send(&mut self, msg: MavMessage) -> Result<()> {
        self.hdr.sequence = self.hdr.sequence.wrapping_add(1);
        self.sink.send(self.hdr, &msg).context("mavlink send")
    }
}

impl Drop for FcLink {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        // the reader owns the read handle; the port is only free once it exits
        if let Some(reader) = self.reader.take() {
            if reader.join().is_err() {
                warn!("mav: reader thread panicked");
            }
        }
    }
}

impl VehicleLink for FcLink {
    fn init_package(&mut self, spec: &PackageSpec) -> bool {
        if spec.topics.is_empty() || !is_supported_rate(spec.freq_hz) || self.packages.contains_key(&spec.index) {
            return false;
        }
        self.packages.insert(spec.index, Package { spec: spec.clone(), started: false });
        true
    }

    fn start_package(&mut self, index: u8) -> Result<(), LinkError> {
        let freq_hz = match self.packages.get_mut(&index) {
            Some(p) => {
                p.started = true;
                p.spec.freq_hz
            }
            None => return Err(LinkError::PackageStart { index, reason: "package not initialized".into() }),
        };
        if let Err(e) = self.apply_streams() {
            if let Some(p) = self.packages.get_mut(&index) {
                p.started = false;
            }
            return Err(LinkError::PackageStart { index, reason: format!("{:#}", e) });
        }
        debug!("mav: package {} streaming @ {} Hz", index, freq_hz);
        Ok(())
    }

    fn remove_package(&mut self, index: u8) {
        let Some(pkg) = self.packages.remove(&index) else { return; };
        if !pkg.started {
            return;
        }
        if let Err(e) = self.apply_streams() {
            warn!("mav: could not update streams after removing package {}: {:#}", index, e);
        }
    }

    fn value(&mut self, topic: Topic) -> Result<TopicValue, LinkError> {
        if !self.subscribed(topic) {
            return Err(LinkError::NotSubscribed(topic));
        }
        let now = Instant::now();
        let stale_after = self.stale_after;
        let c = self.cache();
        let v = match topic {
            Topic::FlightStatus => TopicValue::FlightStatus(c.fresh(&c.flight_status, topic, stale_after, now)?),
            Topic::DisplayMode => TopicValue::DisplayMode(c.fresh(&c.display_mode, topic, stale_after, now)?),
            Topic::GpsFused => {
                let mut p = c.fresh(&c.position, topic, stale_after, now)?;
                p.visible_satellites = c.satellites;
                TopicValue::Position(p)
            }
            Topic::AccelerationBody => TopicValue::Acceleration(c.fresh(&c.acceleration, topic, stale_after, now)?),
            Topic::GpsVelocity => TopicValue::Velocity(c.fresh(&c.velocity, topic, stale_after, now)?),
        };
        Ok(v)
    }

    fn start_go_home(&mut self, timeout: Duration) -> ActionAck {
        if !self.allow_rtl {
            return ActionAck::Refused("go-home disabled by config".into());
        }
        if self.require_heartbeat && self.cache().last_heartbeat.is_none() {
            return ActionAck::Refused("no heartbeat seen yet".into());
        }
        if !self.limiter.allow() {
            warn!("RTL rate-limited");
            return ActionAck::RateLimited;
        }

        self.cache().last_ack = None;
        let cmd = self.command_long(MavCmd::MAV_CMD_NAV_RETURN_TO_LAUNCH, [0.0, 0.0]);
        info!("FC: sending RTL");
        if let Err(e) = self.send(MavMessage::COMMAND_LONG(cmd)) {
            return ActionAck::Refused(format!("{:#}", e));
        }

        let rtl = MavCmd::MAV_CMD_NAV_RETURN_TO_LAUNCH as u32;
        let start = Instant::now();
        while start.elapsed() < timeout {
            if let Some(ack) = self.cache().last_ack.filter(|a| a.command == rtl) {
                return ack_outcome(ack);
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        ActionAck::Timeout
    }
}

fn spawn_reader(
    mut source: Box<dyn MavSource>,
    cache: Arc<Mutex<LinkCache>>,
    stop: Arc<AtomicBool>,
    target_sys: u8,
) -> Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("mav-reader".into())
        .spawn(move || {
            while !stop.load(Ordering::Relaxed) {
                match source.read() {
                    Ok(Some((hdr, msg))) => {
                        if hdr.system_id != target_sys { continue; }
                        let mut c = cache.lock().unwrap_or_else(PoisonError::into_inner);
                        absorb(&mut c, &msg, Instant::now());
                    }
                    Ok(None) => {}
                    Err(e) => {
                        debug!("mav: read error: {:#}", e);
                        std::thread::sleep(Duration::from_millis(10));
                    }
                }
            }
            debug!("mav: reader stopped");
        })
        .context("spawn mavlink reader")
}

/// Folds one autopilot message into the cache.
fn absorb(c: &mut LinkCache, msg: &MavMessage, now: Instant) {
    match msg {
        MavMessage::HEARTBEAT(hb) => {
            c.last_heartbeat = Some(now);
            c.flight_status = Some(Stamped::new(flight_status(hb), now));
            let mode = if hb.autopilot == MavAutopilot::MAV_AUTOPILOT_ARDUPILOTMEGA {
                display_mode_from_copter(hb.custom_mode)
            } else {
                0
            };
            c.display_mode = Some(Stamped::new(mode, now));
        }
        MavMessage::GLOBAL_POSITION_INT(p) => {
            let pos = FusedPosition {
                longitude: f64::from(p.lon) / 1e7,
                latitude: f64::from(p.lat) / 1e7,
                altitude: p.alt as f32 / 1000.0,
                visible_satellites: c.satellites,
            };
            c.position = Some(Stamped::new(pos, now));
            // cm/s, left unscaled
            let vel = Vector3f::new(f32::from(p.vx), f32::from(p.vy), f32::from(p.vz));
            c.velocity = Some(Stamped::new(vel, now));
        }
        MavMessage::GPS_RAW_INT(g) => {
            c.satellites = if g.satellites_visible == u8::MAX { 0 } else { u16::from(g.satellites_visible) };
        }
        MavMessage::SCALED_IMU(imu) => {
            // milli-g to m/s^2
            let k = STANDARD_GRAVITY / 1000.0;
            let acc = Vector3f::new(f32::from(imu.xacc) * k, f32::from(imu.yacc) * k, f32::from(imu.zacc) * k);
            c.acceleration = Some(Stamped::new(acc, now));
        }
        MavMessage::COMMAND_ACK(a) => {
            c.last_ack = Some(AckRecord { command: a.command as u32, result: a.result as u32 });
        }
        _ => {}
    }
}

fn ack_outcome(ack: AckRecord) -> ActionAck {
    if ack.result == MavResult::MAV_RESULT_ACCEPTED as u32 {
        ActionAck::Success
    } else {
        ActionAck::Rejected(ack.result)
    }
}

/// 0 = stopped, 1 = on ground, 2 = in air.
pub fn flight_status(hb: &HEARTBEAT_DATA) -> u8 {
    let armed = hb.base_mode.contains(MavModeFlag::MAV_MODE_FLAG_SAFETY_ARMED);
    match (armed, hb.system_status) {
        (false, _) => 0,
        (true, MavState::MAV_STATE_ACTIVE) => 2,
        (true, _) => 1,
    }
}

/// Maps an ArduCopter custom mode onto the display-mode code space the
/// control-state classification works on. Unmapped modes read as 0 (unknown).
pub fn display_mode_from_copter(custom_mode: u32) -> u8 {
    match custom_mode {
        0 | 1 | 2 => 1,            // STABILIZE, ACRO, ALT_HOLD -> attitude
        5 | 11 | 13 | 16 | 17 => 6, // LOITER, DRIFT, SPORT, POSHOLD, BRAKE -> P-GPS
        7 => 9,                    // CIRCLE -> hotpoint
        3 => 14,                   // AUTO -> fly to point
        4 => 17,                   // GUIDED -> SDK control
        6 | 21 => 15,              // RTL, SMART_RTL -> go home
        9 => 12,                   // LAND -> auto landing
        _ => 0,
    }
}

fn backing_messages(topics: &[Topic]) -> Vec<u32> {
    let mut ids = Vec::new();
    for t in topics {
        let needed: &[u32] = match t {
            Topic::FlightStatus | Topic::DisplayMode => &[MSG_HEARTBEAT],
            Topic::GpsFused => &[MSG_GLOBAL_POSITION_INT, MSG_GPS_RAW_INT],
            Topic::AccelerationBody => &[MSG_SCALED_IMU],
            Topic::GpsVelocity => &[MSG_GLOBAL_POSITION_INT],
        };
        for id in needed {
            // heartbeat runs at its own fixed rate
            if *id != MSG_HEARTBEAT && !ids.contains(id) {
                ids.push(*id);
            }
        }
    }
    ids
}

pub struct MavProvider {
    cfg: LinkConfig,
}

impl MavProvider {
    pub fn new(cfg: LinkConfig) -> Self {
        Self { cfg }
    }
}

impl LinkProvider for MavProvider {
    fn init_vehicle(&mut self) -> Result<Box<dyn VehicleLink>, LinkError> {
        let (dev, baud) = resolve_fc_port(&self.cfg).map_err(|e| LinkError::Unavailable(format!("{:#}", e)))?;
        let link = FcLink::open(&dev, baud, &self.cfg).map_err(|e| LinkError::Fault(format!("{:#}", e)))?;
        if self.cfg.require_heartbeat && !link.wait_heartbeat(self.cfg.heartbeat_timeout()) {
            return Err(LinkError::Unavailable(format!(
                "no heartbeat from system {} on {} @ {}",
                self.cfg.target_sys, dev, baud
            )));
        }
        info!("mav: connected {} @ {}", dev, baud);
        Ok(Box::new(link))
    }
}

pub fn resolve_fc_port(cfg: &LinkConfig) -> Result<(String, u32)> {
    if cfg.autodetect {
        let devs = cfg.candidate_devs.clone().unwrap_or_else(default_candidate_devs);
        let bauds = cfg.candidate_bauds.clone().unwrap_or_else(default_candidate_bauds);
        let res = autodetect_fc(devs, bauds, cfg)?;
        if let Some((dev, baud)) = res.chosen {
            return Ok((dev, baud));
        }
        anyhow::bail!("fc autodetect failed: no heartbeat found");
    } else {
        let dev = cfg.serial_dev.clone().context("link.serial_dev missing (autodetect=false)")?;
        let baud = cfg.baud.context("link.baud missing (autodetect=false)")?;
        Ok((dev, baud))
    }
}
