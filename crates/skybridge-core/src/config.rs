use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TelemetryConfig {
    /// Rate of the display-mode/position/acceleration package when a
    /// controller is created. Default 10 Hz.
    pub active_hz: Option<u16>,
    /// Default 5 Hz.
    pub velocity_hz: Option<u16>,
}

impl TelemetryConfig {
    pub fn active_hz(&self) -> u16 {
        self.active_hz.unwrap_or(10)
    }

    pub fn velocity_hz(&self) -> u16 {
        self.velocity_hz.unwrap_or(5)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommandConfig {
    /// false: answer only `check_interface`
    #[serde(default = "default_extended")]
    pub extended: bool,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self { extended: default_extended() }
    }
}

fn default_extended() -> bool {
    true
}
