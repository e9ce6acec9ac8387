//! Command Builder
//!
//! Validates parameters against a [`DeviceProfile`] and produces [`Command`]s.
//! Out-of-range values are rejected here, before anything reaches a port.
//!
//! The free functions use the default profile of the stock firmware.

use super::{Command, CommandKind, DeviceProfile, ProtocolError};

/// Builds commands against the limits of one device profile
#[derive(Debug, Clone, Default)]
pub struct CommandBuilder {
    profile: DeviceProfile,
}

impl CommandBuilder {
    pub fn new(profile: DeviceProfile) -> Self {
        Self { profile }
    }

    pub fn profile(&self) -> &DeviceProfile {
        &self.profile
    }

    /// Build `FREQ <hz>`; fails if `hz` is outside the profile's frequency range
    pub fn frequency(&self, hz: i64) -> Result<Command, ProtocolError> {
        let hz = check_range(
            "frequency",
            hz,
            self.profile.frequency_min,
            self.profile.frequency_max,
        )?;
        Ok(Command::new(CommandKind::SetFrequency(hz)))
    }

    /// Build `DUTY <percent>`; fails if `percent` is outside the profile's duty range
    pub fn duty(&self, percent: i64) -> Result<Command, ProtocolError> {
        let percent = check_range("duty", percent, self.profile.duty_min, self.profile.duty_max)?;
        Ok(Command::new(CommandKind::SetDuty(percent)))
    }

    pub fn on(&self) -> Command {
        Command::new(CommandKind::OutputOn)
    }

    pub fn off(&self) -> Command {
        Command::new(CommandKind::OutputOff)
    }

    pub fn status_query(&self) -> Command {
        Command::new(CommandKind::QueryStatus)
    }

    pub fn identity_query(&self) -> Command {
        Command::new(CommandKind::QueryIdentity)
    }
}

fn check_range(parameter: &'static str, value: i64, min: u32, max: u32) -> Result<u32, ProtocolError> {
    u32::try_from(value)
        .ok()
        .filter(|v| (min..=max).contains(v))
        .ok_or(ProtocolError::OutOfRange {
            parameter,
            value,
            min: i64::from(min),
            max: i64::from(max),
        })
}

/// `FREQ <hz>` for hz in 1..=40_000_000
pub fn build_frequency_command(hz: i64) -> Result<Command, ProtocolError> {
    CommandBuilder::default().frequency(hz)
}

/// `DUTY <percent>` for percent in 0..=100
pub fn build_duty_command(percent: i64) -> Result<Command, ProtocolError> {
    CommandBuilder::default().duty(percent)
}

pub fn build_on_command() -> Command {
    Command::new(CommandKind::OutputOn)
}

pub fn build_off_command() -> Command {
    Command::new(CommandKind::OutputOff)
}

pub fn build_status_query_command() -> Command {
    Command::new(CommandKind::QueryStatus)
}

pub fn build_identity_query_command() -> Command {
    Command::new(CommandKind::QueryIdentity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frequency_bounds() {
        assert_eq!(build_frequency_command(1).unwrap().as_str(), "FREQ 1");
        assert_eq!(
            build_frequency_command(40_000_000).unwrap().as_str(),
            "FREQ 40000000"
        );
        assert!(build_frequency_command(0).is_err());
        assert!(build_frequency_command(40_000_001).is_err());
        assert!(build_frequency_command(-1).is_err());
    }

    #[test]
    fn test_duty_bounds() {
        assert_eq!(build_duty_command(0).unwrap().as_str(), "DUTY 0");
        assert_eq!(build_duty_command(100).unwrap().as_str(), "DUTY 100");
        assert!(build_duty_command(101).is_err());
        assert!(build_duty_command(-1).is_err());
    }

    #[test]
    fn test_out_of_range_reports_limits() {
        match build_duty_command(101) {
            Err(ProtocolError::OutOfRange {
                parameter,
                value,
                min,
                max,
            }) => {
                assert_eq!(parameter, "duty");
                assert_eq!(value, 101);
                assert_eq!((min, max), (0, 100));
            }
            other => panic!("expected OutOfRange, got {:?}", other),
        }
    }

    #[test]
    fn test_custom_profile_limits() {
        let builder = CommandBuilder::new(DeviceProfile {
            frequency_max: 1_000,
            duty_min: 10,
            duty_max: 90,
            ..DeviceProfile::default()
        });
        assert!(builder.frequency(1_000).is_ok());
        assert!(builder.frequency(1_001).is_err());
        assert!(builder.duty(5).is_err());
        assert_eq!(builder.duty(90).unwrap().as_str(), "DUTY 90");
    }

    #[test]
    fn test_huge_values_do_not_wrap() {
        assert!(build_frequency_command(i64::MAX).is_err());
        assert!(build_frequency_command(i64::from(u32::MAX) + 1).is_err());
    }
}
