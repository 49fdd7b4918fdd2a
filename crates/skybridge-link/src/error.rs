use thiserror::Error;

use crate::topic::Topic;

#[derive(Debug, Error)]
pub enum LinkError {
    /// The connection attempt finished without a vehicle.
    #[error("{0}")]
    Unavailable(String),

    /// A lower-level failure while setting up the link.
    #[error("{0}")]
    Fault(String),

    #[error("package {index} rejected by the link")]
    PackageRejected { index: u8 },

    #[error("package {index} failed to start: {reason}")]
    PackageStart { index: u8, reason: String },

    #[error("topic {0} is not subscribed")]
    NotSubscribed(Topic),

    #[error("no fresh {topic} sample for {age_ms} ms")]
    Stale { topic: Topic, age_ms: u64 },

    #[error("link returned an unexpected value for {0}")]
    UnexpectedValue(Topic),
}

impl LinkError {
    /// Text placed in `fail_output` of an interface status.
    pub fn failure_description(&self) -> String {
        let s = self.to_string();
        if s.trim().is_empty() {
            "Could not detect the error.".to_string()
        } else {
            s
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_connection_error_gets_placeholder() {
        assert_eq!(LinkError::Unavailable(String::new()).failure_description(), "Could not detect the error.");
        assert_eq!(LinkError::Fault("serial port busy".into()).failure_description(), "serial port busy");
    }

    #[test]
    fn stale_names_topic() {
        let e = LinkError::Stale { topic: Topic::GpsVelocity, age_ms: 4200 };
        assert_eq!(e.failure_description(), "no fresh gps-velocity sample for 4200 ms");
    }
}
