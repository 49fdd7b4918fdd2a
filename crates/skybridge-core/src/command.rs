use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("Must provide an update rate for active mode (Hz).")]
    MissingRate,
    #[error("Could not parse the update rate argument into an integer.")]
    BadRate(String),
    /// Zero is not a rate; reported like any other unparsable argument.
    #[error("Could not parse the update rate argument into an integer.")]
    ZeroRate,
    #[error("Update rate {0} Hz is out of range.")]
    RateOutOfRange(String),
}

/// One inbound request: a command token and its arguments, separated by
/// whitespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    CheckInterface,
    StartInterface,
    SwitchIdle,
    SwitchActive(Result<u16, CommandError>),
    RetrieveData,
    ReturnHome,
    Unknown(String),
}

impl Command {
    /// With `extended = false` only `check_interface` is recognized.
    pub fn parse(request: &str, extended: bool) -> Self {
        let mut words = request.split_whitespace();
        let token = words.next().unwrap_or("");
        match (token, extended) {
            ("check_interface", _) => Command::CheckInterface,
            ("start_interface", true) => Command::StartInterface,
            ("switch_idle", true) => Command::SwitchIdle,
            ("switch_active", true) => Command::SwitchActive(parse_rate(words.next())),
            ("retrieve_data", true) => Command::RetrieveData,
            ("return_home", true) => Command::ReturnHome,
            _ => Command::Unknown(token.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Command::CheckInterface => "check_interface",
            Command::StartInterface => "start_interface",
            Command::SwitchIdle => "switch_idle",
            Command::SwitchActive(_) => "switch_active",
            Command::RetrieveData => "retrieve_data",
            Command::ReturnHome => "return_home",
            Command::Unknown(token) => token,
        }
    }
}

fn parse_rate(arg: Option<&str>) -> Result<u16, CommandError> {
    let arg = arg.ok_or(CommandError::MissingRate)?;
    match arg.parse::<u64>() {
        Ok(0) => Err(CommandError::ZeroRate),
        Ok(hz) => u16::try_from(hz).map_err(|_| CommandError::RateOutOfRange(arg.to_string())),
        // digits only, too long even for u64
        Err(_) if arg.bytes().all(|b| b.is_ascii_digit()) => Err(CommandError::RateOutOfRange(arg.to_string())),
        Err(_) => Err(CommandError::BadRate(arg.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_command_surface() {
        assert_eq!(Command::parse("check_interface", true), Command::CheckInterface);
        assert_eq!(Command::parse("  start_interface  ", true), Command::StartInterface);
        assert_eq!(Command::parse("switch_active 10", true), Command::SwitchActive(Ok(10)));
        assert_eq!(Command::parse("switch_active\t50 extra", true), Command::SwitchActive(Ok(50)));
        assert_eq!(Command::parse("return_home", true), Command::ReturnHome);
    }

    #[test]
    fn rate_argument_errors() {
        assert_eq!(Command::parse("switch_active", true), Command::SwitchActive(Err(CommandError::MissingRate)));
        assert_eq!(
            Command::parse("switch_active fast", true),
            Command::SwitchActive(Err(CommandError::BadRate("fast".into())))
        );
        assert_eq!(Command::parse("switch_active -5", true), Command::SwitchActive(Err(CommandError::BadRate("-5".into()))));
        assert_eq!(Command::parse("switch_active 0", true), Command::SwitchActive(Err(CommandError::ZeroRate)));
    }

    #[test]
    fn oversized_rate_is_out_of_range_not_unparsable() {
        let err = CommandError::RateOutOfRange("70000".into());
        assert_eq!(Command::parse("switch_active 70000", true), Command::SwitchActive(Err(err.clone())));
        assert_eq!(err.to_string(), "Update rate 70000 Hz is out of range.");
        assert_eq!(
            Command::parse("switch_active 99999999999999999999999", true),
            Command::SwitchActive(Err(CommandError::RateOutOfRange("99999999999999999999999".into())))
        );
        assert_eq!(Command::parse("switch_active 65535", true), Command::SwitchActive(Ok(65535)));
    }

    #[test]
    fn minimal_surface_only_knows_check() {
        assert_eq!(Command::parse("check_interface", false), Command::CheckInterface);
        assert_eq!(Command::parse("start_interface", false), Command::Unknown("start_interface".into()));
    }

    #[test]
    fn empty_request_is_unknown() {
        assert_eq!(Command::parse("", true), Command::Unknown(String::new()));
        assert_eq!(Command::parse("CHECK_INTERFACE", true).name(), "CHECK_INTERFACE");
    }
}
