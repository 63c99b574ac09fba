//! Scenario scripts for `roomlink replay`.
//!
//! A script lists simulated speakers and the registry operations to run
//! against them, in order.
//!
//! ```yaml
//! speakers:
//!   - ip: 10.0.0.1
//!     followers: [10.0.0.2]
//! steps:
//!   - op: register
//!     ip: 10.0.0.1
//!     uuid: u1
//!     name: Living Room
//!   - op: role_change
//!     ip: 10.0.0.1
//!     from: solo
//!     to: leader
//! ```

use std::net::IpAddr;
use std::path::Path;

use serde::Deserialize;

use roomlink_core::{Role, StatusSnapshot};

use crate::error::CliError;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Script {
    #[serde(default)]
    pub speakers: Vec<SpeakerSpec>,
    pub steps: Vec<Step>,
}

/// A simulated speaker and what it answers to follower queries.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpeakerSpec {
    pub ip: IpAddr,
    #[serde(default)]
    pub followers: Vec<IpAddr>,
    /// Follower queries fail instead of answering.
    #[serde(default)]
    pub failing: bool,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    /// Feed a status report into the registry.
    Register {
        ip: IpAddr,
        uuid: Option<String>,
        name: Option<String>,
        hardware_address: Option<String>,
        reference: Option<String>,
    },
    /// Change what a simulated speaker reports as its followers.
    SetFollowers { ip: IpAddr, followers: Vec<IpAddr> },
    /// Make a simulated speaker's follower queries fail or recover.
    SetFailing { ip: IpAddr, failing: bool },
    /// Report a role change observed on the speaker at `ip`.
    RoleChange {
        ip: IpAddr,
        from: Role,
        to: Role,
        #[serde(default)]
        group: bool,
        leader_uuid: Option<String>,
        leader_ip: Option<IpAddr>,
    },
    Unregister { device: String },
    CreateRepresentative {
        leader: String,
        reference: Option<String>,
    },
    DestroyRepresentative { leader: String },
    PruneRepresentatives,
    SetReference {
        device: String,
        reference: Option<String>,
    },
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Register { .. } => "register",
            Self::SetFollowers { .. } => "set_followers",
            Self::SetFailing { .. } => "set_failing",
            Self::RoleChange { .. } => "role_change",
            Self::Unregister { .. } => "unregister",
            Self::CreateRepresentative { .. } => "create_representative",
            Self::DestroyRepresentative { .. } => "destroy_representative",
            Self::PruneRepresentatives => "prune_representatives",
            Self::SetReference { .. } => "set_reference",
        }
    }

    /// Every speaker address the step mentions.
    pub fn addresses(&self) -> Vec<IpAddr> {
        match self {
            Self::Register { ip, .. } | Self::SetFailing { ip, .. } => vec![*ip],
            Self::SetFollowers { ip, followers } => {
                std::iter::once(*ip).chain(followers.iter().copied()).collect()
            }
            Self::RoleChange { ip, leader_ip, .. } => {
                std::iter::once(*ip).chain(*leader_ip).collect()
            }
            _ => Vec::new(),
        }
    }
}

/// Status report a `register` step describes.
pub fn register_snapshot(
    ip: IpAddr,
    uuid: Option<&str>,
    name: Option<&str>,
    hardware_address: Option<&str>,
) -> StatusSnapshot {
    StatusSnapshot {
        uuid: uuid.map(str::to_owned),
        ip: Some(ip),
        hardware_address: hardware_address.map(str::to_owned),
        display_name: name.map(str::to_owned),
        ..StatusSnapshot::default()
    }
}

/// Status report a `role_change` step describes.
pub fn role_snapshot(group: bool, leader_uuid: Option<&str>, leader_ip: Option<IpAddr>) -> StatusSnapshot {
    StatusSnapshot {
        group_indicator: group,
        leader_uuid_hint: leader_uuid.map(str::to_owned),
        leader_ip_hint: leader_ip,
        ..StatusSnapshot::default()
    }
}

/// Parse a script, choosing YAML or JSON by file extension.
pub fn parse(path: &Path, text: &str) -> Result<Script, CliError> {
    let is_yaml = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"));

    let parsed = if is_yaml {
        serde_yaml::from_str(text).map_err(|e| e.to_string())
    } else {
        serde_json::from_str(text).map_err(|e| e.to_string())
    };
    parsed.map_err(|reason| CliError::Script {
        path: path.display().to_string(),
        reason,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn yaml_script_parses_with_vendor_roles() {
        let text = "
speakers:
  - ip: 10.0.0.1
    followers: [10.0.0.2]
steps:
  - op: register
    ip: 10.0.0.1
    uuid: u1
  - op: role_change
    ip: 10.0.0.2
    from: solo
    to: slave
    group: true
    leader_uuid: u1
  - op: prune_representatives
";
        let script = parse(Path::new("s.yaml"), text).unwrap();
        assert_eq!(script.speakers.len(), 1);
        assert_eq!(script.steps.len(), 3);
        assert!(matches!(
            script.steps[1],
            Step::RoleChange {
                to: Role::Follower,
                group: true,
                ..
            }
        ));
    }

    #[test]
    fn json_script_parses() {
        let text = r#"{"steps":[{"op":"unregister","device":"u1"}]}"#;
        let script = parse(Path::new("s.json"), text).unwrap();
        assert_eq!(script.steps[0].name(), "unregister");
    }

    #[test]
    fn unknown_op_is_a_script_error() {
        let text = r#"{"steps":[{"op":"explode"}]}"#;
        assert!(matches!(
            parse(Path::new("s.json"), text),
            Err(CliError::Script { .. })
        ));
    }

    #[test]
    fn addresses_cover_follower_lists() {
        let step = Step::SetFollowers {
            ip: "10.0.0.1".parse().unwrap(),
            followers: vec!["10.0.0.2".parse().unwrap()],
        };
        assert_eq!(step.addresses().len(), 2);
    }
}
