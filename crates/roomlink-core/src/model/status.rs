// ── Status and reconciliation payloads ──
//
// Typed shapes exchanged with the collaborators that talk to the
// speakers. Normalizing raw device payloads into these is not the
// registry's job.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// Normalized status report for one speaker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusSnapshot {
    pub uuid: Option<String>,
    pub ip: Option<IpAddr>,
    pub hardware_address: Option<String>,
    pub display_name: Option<String>,
    /// Set while the device participates in a multiroom group.
    pub group_indicator: bool,
    pub leader_uuid_hint: Option<String>,
    pub leader_ip_hint: Option<IpAddr>,
}

impl StatusSnapshot {
    /// The reported UUID, if it is present and non-blank.
    pub fn reported_uuid(&self) -> Option<&str> {
        self.uuid.as_deref().map(str::trim).filter(|u| !u.is_empty())
    }

    pub fn reported_name(&self) -> Option<&str> {
        self.display_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
    }
}

/// A device's own account of who follows it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowerList {
    pub count: usize,
    #[serde(default)]
    pub followers: Vec<FollowerEntry>,
}

impl FollowerList {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_ips(ips: impl IntoIterator<Item = IpAddr>) -> Self {
        let followers: Vec<FollowerEntry> = ips
            .into_iter()
            .map(|ip| FollowerEntry {
                ip,
                uuid: None,
                name: None,
            })
            .collect();
        Self {
            count: followers.len(),
            followers,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowerEntry {
    pub ip: IpAddr,
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}
