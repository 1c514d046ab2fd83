//! Sync channels.

use std::fmt;

const PATIENT_PREFIX: &str = "patient/";

/// A named stream of records exchanged with central.
///
/// Channels are either plain (`encounter`) or scoped to one patient
/// (`patient/<patientId>/encounter`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Channel {
    /// An unscoped channel.
    Plain(String),
    /// A channel limited to one patient's records.
    Patient {
        /// The patient the channel is limited to.
        patient_id: String,
        /// The channel within the patient.
        name: String,
    },
}

impl Channel {
    /// Parses a channel name. Anything not shaped like a patient channel is plain.
    pub fn parse(channel: &str) -> Self {
        if let Some(rest) = channel.strip_prefix(PATIENT_PREFIX) {
            if let Some((patient_id, name)) = rest.split_once('/') {
                if !patient_id.is_empty() && !name.is_empty() && !name.contains('/') {
                    return Channel::Patient {
                        patient_id: patient_id.to_string(),
                        name: name.to_string(),
                    };
                }
            }
        }
        Channel::Plain(channel.to_string())
    }

    /// Builds the channel of `name` scoped to `patient_id`.
    pub fn for_patient(patient_id: impl Into<String>, name: impl Into<String>) -> Self {
        Channel::Patient {
            patient_id: patient_id.into(),
            name: name.into(),
        }
    }

    /// Returns the patient the channel is scoped to.
    pub fn patient_id(&self) -> Option<&str> {
        match self {
            Channel::Plain(_) => None,
            Channel::Patient { patient_id, .. } => Some(patient_id),
        }
    }

    /// Returns the channel name without the patient scope.
    pub fn name(&self) -> &str {
        match self {
            Channel::Plain(name) | Channel::Patient { name, .. } => name,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Plain(name) => f.write_str(name),
            Channel::Patient { patient_id, name } => write!(f, "{PATIENT_PREFIX}{patient_id}/{name}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_patient_channels() {
        let channel = Channel::parse("patient/P1/encounter");
        assert_eq!(channel.patient_id(), Some("P1"));
        assert_eq!(channel.name(), "encounter");
        assert_eq!(channel.to_string(), "patient/P1/encounter");
    }

    #[test]
    fn everything_else_is_plain() {
        for raw in ["encounter", "patient", "patient/", "patient/P1", "patient//x", "patient/P1/a/b"] {
            let channel = Channel::parse(raw);
            assert_eq!(channel, Channel::Plain(raw.to_string()), "{raw}");
            assert_eq!(channel.to_string(), raw);
        }
    }

    #[test]
    fn for_patient_matches_parse() {
        assert_eq!(
            Channel::for_patient("P9", "labRequest"),
            Channel::parse("patient/P9/labRequest")
        );
    }
}
