//! Automation and return-to-home flags derived from the vehicle display mode.

use skybridge_proto::ControlDevice;

/// Highest display-mode code the vehicle reports for a real mode. Code 0 and
/// anything above this are transient readings.
pub const MAX_KNOWN_CODE: u8 = 43;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayMode {
    Attitude,
    PGps,
    Hotpoint,
    AssistedTakeoff,
    AutoTakeoff,
    AutoLanding,
    FlyToPoint,
    GoHome,
    SdkControl,
    ForcedAutoLanding,
    SearchMode,
    EngineStart,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Class {
    auto: bool,
    rth: bool,
}

const MANUAL: Class = Class { auto: false, rth: false };
const AUTO: Class = Class { auto: true, rth: false };
const AUTO_RTH: Class = Class { auto: true, rth: true };

const CLASSIFICATION: [(DisplayMode, u8, Class); 12] = [
    (DisplayMode::Attitude, 1, MANUAL),
    (DisplayMode::PGps, 6, MANUAL),
    (DisplayMode::Hotpoint, 9, MANUAL),
    (DisplayMode::AssistedTakeoff, 10, MANUAL),
    (DisplayMode::AutoTakeoff, 11, AUTO),
    (DisplayMode::AutoLanding, 12, AUTO_RTH),
    (DisplayMode::FlyToPoint, 14, AUTO),
    (DisplayMode::GoHome, 15, AUTO_RTH),
    (DisplayMode::SdkControl, 17, AUTO),
    (DisplayMode::ForcedAutoLanding, 33, AUTO_RTH),
    (DisplayMode::SearchMode, 40, MANUAL),
    (DisplayMode::EngineStart, 41, MANUAL),
];

impl DisplayMode {
    pub fn from_code(code: u8) -> Option<Self> {
        CLASSIFICATION.iter().find(|(_, c, _)| *c == code).map(|(m, _, _)| *m)
    }

    pub fn code(self) -> u8 {
        CLASSIFICATION.iter().find(|(m, _, _)| *m == self).map(|(_, c, _)| *c).unwrap_or(0)
    }

    pub fn is_automated(self) -> bool {
        class_of(self.code()).auto
    }

    pub fn is_return_to_home(self) -> bool {
        class_of(self.code()).rth
    }
}

fn class_of(code: u8) -> Class {
    CLASSIFICATION.iter().find(|(_, c, _)| *c == code).map(|(_, _, k)| *k).unwrap_or(MANUAL)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlState {
    pub auto_mode: bool,
    pub return_to_home: bool,
}

impl From<ControlState> for ControlDevice {
    fn from(s: ControlState) -> Self {
        ControlDevice { auto_mode: s.auto_mode, return_to_home: s.return_to_home }
    }
}

/// Recomputes both flags from a valid display-mode code. Unknown codes leave
/// the previous state untouched so spurious readings cannot flap it.
pub fn derive_control_state(display_mode: u8, previous: ControlState) -> ControlState {
    if display_mode == 0 || display_mode > MAX_KNOWN_CODE {
        return previous;
    }
    let class = class_of(display_mode);
    ControlState { auto_mode: class.auto, return_to_home: class.rth }
}

#[cfg(test)]
mod tests {
    use super::*;

    const AUTOMATED: [u8; 6] = [11, 12, 14, 15, 17, 33];
    const RTH: [u8; 3] = [12, 15, 33];

    #[test]
    fn valid_codes_recompute_both_flags() {
        let sticky = ControlState { auto_mode: true, return_to_home: true };
        for code in 1..=MAX_KNOWN_CODE {
            let s = derive_control_state(code, sticky);
            assert_eq!(s.auto_mode, AUTOMATED.contains(&code), "auto for code {}", code);
            assert_eq!(s.return_to_home, RTH.contains(&code), "rth for code {}", code);
        }
    }

    #[test]
    fn unknown_codes_freeze_state() {
        for prev in [
            ControlState::default(),
            ControlState { auto_mode: true, return_to_home: false },
            ControlState { auto_mode: true, return_to_home: true },
        ] {
            for code in [0u8, 44, 100, 255] {
                assert_eq!(derive_control_state(code, prev), prev);
            }
        }
    }

    #[test]
    fn leaving_go_home_clears_rth() {
        let s = derive_control_state(15, ControlState::default());
        assert_eq!(s, ControlState { auto_mode: true, return_to_home: true });
        let s = derive_control_state(17, s);
        assert_eq!(s, ControlState { auto_mode: true, return_to_home: false });
        let s = derive_control_state(6, s);
        assert_eq!(s, ControlState::default());
    }

    #[test]
    fn named_modes_round_trip_codes() {
        assert_eq!(DisplayMode::from_code(33), Some(DisplayMode::ForcedAutoLanding));
        assert_eq!(DisplayMode::GoHome.code(), 15);
        assert!(DisplayMode::SdkControl.is_automated());
        assert!(!DisplayMode::SdkControl.is_return_to_home());
        assert_eq!(DisplayMode::from_code(2), None);
    }
}
