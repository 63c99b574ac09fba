// ── Device domain types ──

use std::net::IpAddr;
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::entity_id::{DeviceId, EntityRef, HardwareAddress};
use crate::speaker::SpeakerController;

/// Multiroom role of a record.
///
/// Parsing accepts the vendor vocabulary (`master`, `slave`, `virtual`)
/// as well as the canonical names.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Role {
    #[default]
    Solo,
    #[serde(alias = "master")]
    #[strum(to_string = "leader", serialize = "master")]
    Leader,
    #[serde(alias = "slave")]
    #[strum(to_string = "follower", serialize = "slave")]
    Follower,
    #[serde(alias = "virtual")]
    #[strum(to_string = "group_representative", serialize = "virtual")]
    GroupRepresentative,
}

/// Canonical record for a physical speaker or a group representative.
///
/// Role and link fields are only ever written by the registry, which keeps
/// `leader_id` and `follower_ids` bidirectional.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceRecord {
    pub id: DeviceId,
    pub ip: Option<IpAddr>,
    pub hardware_address: Option<HardwareAddress>,
    pub display_name: String,
    pub external_ref: Option<EntityRef>,
    pub role: Role,
    pub leader_id: Option<DeviceId>,
    pub follower_ids: IndexSet<DeviceId>,
    /// The id was derived from the IP because the device reported no UUID.
    pub fallback_id: bool,
    pub updated_at: DateTime<Utc>,

    #[serde(skip)]
    pub(crate) controller: Option<Weak<dyn SpeakerController>>,
}

impl DeviceRecord {
    pub(crate) fn new(id: DeviceId, display_name: String, role: Role) -> Self {
        Self {
            id,
            ip: None,
            hardware_address: None,
            display_name,
            external_ref: None,
            role,
            leader_id: None,
            follower_ids: IndexSet::new(),
            fallback_id: false,
            updated_at: Utc::now(),
            controller: None,
        }
    }

    pub fn is_physical(&self) -> bool {
        !self.id.is_representative()
    }

    pub fn is_leader(&self) -> bool {
        self.role == Role::Leader
    }

    pub fn is_follower(&self) -> bool {
        self.role == Role::Follower
    }

    /// The controller registered for this device, if its owner still holds it.
    pub fn controller(&self) -> Option<Arc<dyn SpeakerController>> {
        self.controller.as_ref().and_then(Weak::upgrade)
    }

    /// Role implied by the link fields.
    pub(crate) fn linked_role(&self) -> Role {
        if !self.is_physical() {
            Role::GroupRepresentative
        } else if self.leader_id.is_some() {
            Role::Follower
        } else if self.follower_ids.is_empty() {
            Role::Solo
        } else {
            Role::Leader
        }
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
