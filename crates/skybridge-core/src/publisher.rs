use skybridge_link::{ActionAck, FusedPosition, LinkError, Vector3f, VehicleLink};
use skybridge_proto::{FlightStatus, Message, Telemetry};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::control_state::{derive_control_state, ControlState};
use crate::subscription::{active_package, PackageLayout, Subscriptions, ACTIVE_PACKAGE};
use crate::transport::{send_multipart, Transport};

/// Flight status goes out at most this often.
pub const SLOW_TOPIC_PERIOD_MS: u64 = 1000;

/// Raw link velocity (cm/s) to m/s.
pub const VELOCITY_SCALE: f64 = 0.01;

pub fn unix_millis() -> u64 {
    (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as u64
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

/// Latest values of the fast topics as of one publish cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Snapshot {
    pub position: FusedPosition,
    pub display_mode: u8,
    pub acceleration: Vector3f,
    pub velocity: Vector3f,
}

impl Snapshot {
    pub fn read(vehicle: &mut dyn VehicleLink) -> Result<Self, LinkError> {
        Ok(Self {
            position: vehicle.position()?,
            display_mode: vehicle.display_mode()?,
            acceleration: vehicle.acceleration()?,
            velocity: vehicle.velocity()?,
        })
    }

    pub fn telemetry(&self, with_accel: bool) -> Telemetry {
        let accel = |v: f32| with_accel.then_some(v);
        Telemetry {
            longitude: self.position.longitude,
            latitude: self.position.latitude,
            altitude: self.position.altitude,
            satellites: self.position.visible_satellites,
            vel_x: f64::from(self.velocity.x) * VELOCITY_SCALE,
            vel_y: f64::from(self.velocity.y) * VELOCITY_SCALE,
            vel_z: f64::from(self.velocity.z) * VELOCITY_SCALE,
            accel_x: accel(self.acceleration.x),
            accel_y: accel(self.acceleration.y),
            accel_z: accel(self.acceleration.z),
        }
    }
}

/// Owns the telemetry subscriptions of a connected vehicle and turns samples
/// into outbound frames.
pub struct TelemetryController {
    subs: Subscriptions,
    active_hz: Option<u16>,
    control: ControlState,
    slow_topic_deadline_ms: u64,
}

impl TelemetryController {
    /// Subscribes the standard package layout. Any package failure drops the
    /// controller; nothing stays registered on the link.
    pub fn new(vehicle: Box<dyn VehicleLink>, active_hz: u16, velocity_hz: u16, now_ms: u64) -> Result<Self, LinkError> {
        let layout = PackageLayout::standard(active_hz, velocity_hz)
            .map_err(|e| LinkError::Fault(format!("{:#}", e)))?;
        let mut subs = Subscriptions::new(vehicle);
        subs.subscribe_all(&layout)?;
        info!("telemetry: subscribed, active @ {} Hz, velocity @ {} Hz", active_hz, velocity_hz);
        Ok(Self {
            subs,
            active_hz: Some(active_hz),
            control: ControlState::default(),
            slow_topic_deadline_ms: now_ms,
        })
    }

    pub fn active_mode(&self) -> bool {
        self.active_hz.is_some()
    }

    pub fn active_hz(&self) -> Option<u16> {
        self.active_hz
    }

    pub fn control_state(&self) -> ControlState {
        self.control
    }

    pub fn slow_topic_deadline_ms(&self) -> u64 {
        self.slow_topic_deadline_ms
    }

    pub fn switch_to_idle(&mut self) {
        if self.subs.is_registered(ACTIVE_PACKAGE) {
            self.subs.remove_package(ACTIVE_PACKAGE);
        }
        self.active_hz = None;
        info!("telemetry: idle");
    }

    /// Re-subscribes the active package at `hz`. When the link refuses the
    /// new rate the previous mode is restored and the error returned.
    pub fn switch_to_active(&mut self, hz: u16) -> Result<(), LinkError> {
        if self.active_hz == Some(hz) && self.subs.is_started(ACTIVE_PACKAGE) {
            return Ok(());
        }
        let previous = self.active_hz;
        self.switch_to_idle();
        if let Err(e) = self.subs.subscribe(&active_package(hz)) {
            if let Some(prev) = previous {
                match self.subs.subscribe(&active_package(prev)) {
                    Ok(()) => {
                        self.active_hz = Some(prev);
                        info!("telemetry: kept active @ {} Hz", prev);
                    }
                    Err(restore) => warn!("telemetry: could not restore {} Hz: {}", prev, restore),
                }
            }
            return Err(e);
        }
        self.active_hz = Some(hz);
        info!("telemetry: active @ {} Hz", hz);
        Ok(())
    }

    /// Samples the link and assembles one cycle's frames: flight status when
    /// its deadline has passed, then control device, then telemetry. State
    /// only advances when every sample succeeded.
    pub fn collect_cycle(&mut self, now_ms: u64) -> Result<Vec<Message>, LinkError> {
        let vehicle = self.subs.vehicle_mut();
        let flight_status = if now_ms >= self.slow_topic_deadline_ms {
            Some(vehicle.flight_status()?)
        } else {
            None
        };
        let snap = Snapshot::read(vehicle)?;

        let mut frames = Vec::with_capacity(3);
        if let Some(state) = flight_status {
            frames.push(FlightStatus { state: i32::from(state) }.into());
            self.slow_topic_deadline_ms = now_ms + SLOW_TOPIC_PERIOD_MS;
        }
        self.control = derive_control_state(snap.display_mode, self.control);
        frames.push(Message::ControlDevice(self.control.into()));
        frames.push(snap.telemetry(true).into());
        Ok(frames)
    }

    /// Runs one cycle and sends it as a single multi-part message.
    pub fn publish_cycle(&mut self, now_ms: u64, transport: &mut dyn Transport) -> Result<usize, PublishError> {
        let frames = self.collect_cycle(now_ms)?;
        send_multipart(transport, &frames)?;
        debug!("telemetry: published {} frames", frames.len());
        Ok(frames.len())
    }

    pub fn go_home(&mut self, timeout: Duration) -> ActionAck {
        self.subs.vehicle_mut().start_go_home(timeout)
    }

    /// Removes every package from the link.
    pub fn shutdown(&mut self) {
        self.subs.clear();
        self.active_hz = None;
    }
}
