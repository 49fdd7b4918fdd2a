use anyhow::Result;
use skybridge_link::{LinkError, PackageSpec, Topic, VehicleLink};
use std::collections::BTreeMap;
use tracing::{debug, warn};

pub const FLIGHT_STATUS_PACKAGE: u8 = 0;
pub const ACTIVE_PACKAGE: u8 = 1;
pub const VELOCITY_PACKAGE: u8 = 2;

pub const FLIGHT_STATUS_HZ: u16 = 1;
pub const ACTIVE_TOPICS: [Topic; 3] = [Topic::DisplayMode, Topic::GpsFused, Topic::AccelerationBody];

/// Package specs keyed by index, started in index order.
#[derive(Debug, Clone, Default)]
pub struct PackageLayout {
    packages: BTreeMap<u8, PackageSpec>,
}

impl PackageLayout {
    pub fn insert(&mut self, spec: PackageSpec) -> Result<()> {
        anyhow::ensure!(!self.packages.contains_key(&spec.index), "duplicate package index {}", spec.index);
        anyhow::ensure!(!spec.topics.is_empty(), "package {} has no topics", spec.index);
        self.packages.insert(spec.index, spec);
        Ok(())
    }

    /// Flight status at 1 Hz, the active set at `active_hz`, velocity at
    /// `velocity_hz`.
    pub fn standard(active_hz: u16, velocity_hz: u16) -> Result<Self> {
        let mut layout = Self::default();
        layout.insert(PackageSpec::new(FLIGHT_STATUS_PACKAGE, &[Topic::FlightStatus], FLIGHT_STATUS_HZ))?;
        layout.insert(active_package(active_hz))?;
        layout.insert(PackageSpec::new(VELOCITY_PACKAGE, &[Topic::GpsVelocity], velocity_hz))?;
        Ok(layout)
    }

    pub fn get(&self, index: u8) -> Option<&PackageSpec> {
        self.packages.get(&index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PackageSpec> {
        self.packages.values()
    }
}

pub fn active_package(hz: u16) -> PackageSpec {
    PackageSpec::new(ACTIVE_PACKAGE, &ACTIVE_TOPICS, hz)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PackageStatus {
    Initialized,
    Started,
}

/// Tracks which packages are registered on the vehicle link and guarantees
/// that a package which fails to start is removed again.
pub struct Subscriptions {
    vehicle: Box<dyn VehicleLink>,
    registered: BTreeMap<u8, PackageStatus>,
}

impl Subscriptions {
    pub fn new(vehicle: Box<dyn VehicleLink>) -> Self {
        Self { vehicle, registered: BTreeMap::new() }
    }

    pub fn init_package(&mut self, spec: &PackageSpec) -> bool {
        if self.registered.contains_key(&spec.index) {
            warn!("package {} already registered", spec.index);
            return false;
        }
        if !self.vehicle.init_package(spec) {
            return false;
        }
        self.registered.insert(spec.index, PackageStatus::Initialized);
        true
    }

    pub fn start_package(&mut self, index: u8) -> Result<(), LinkError> {
        match self.vehicle.start_package(index) {
            Ok(()) => {
                self.registered.insert(index, PackageStatus::Started);
                Ok(())
            }
            Err(e) => {
                warn!("package {} failed to start: {}", index, e);
                self.remove_package(index);
                Err(e)
            }
        }
    }

    pub fn remove_package(&mut self, index: u8) {
        self.vehicle.remove_package(index);
        self.registered.remove(&index);
    }

    /// Init and start in one step.
    pub fn subscribe(&mut self, spec: &PackageSpec) -> Result<(), LinkError> {
        if !self.init_package(spec) {
            return Err(LinkError::PackageRejected { index: spec.index });
        }
        self.start_package(spec.index)?;
        debug!("package {} started: {:?} @ {} Hz", spec.index, spec.topics, spec.freq_hz);
        Ok(())
    }

    /// Subscribes every package of the layout. On failure the packages
    /// started so far are removed as well.
    pub fn subscribe_all(&mut self, layout: &PackageLayout) -> Result<(), LinkError> {
        for spec in layout.iter() {
            if let Err(e) = self.subscribe(spec) {
                self.clear();
                return Err(e);
            }
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        let indices: Vec<u8> = self.registered.keys().copied().collect();
        for index in indices {
            self.remove_package(index);
        }
    }

    pub fn is_registered(&self, index: u8) -> bool {
        self.registered.contains_key(&index)
    }

    pub fn is_started(&self, index: u8) -> bool {
        self.registered.get(&index) == Some(&PackageStatus::Started)
    }

    pub fn vehicle_mut(&mut self) -> &mut dyn VehicleLink {
        self.vehicle.as_mut()
    }
}
