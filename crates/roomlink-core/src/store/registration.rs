// ── Status registration ──
//
// Applies one status report to the table: resolves the device id,
// refreshes identity fields in place, and pairs the record with an
// external reference when one can be matched by name.

use std::net::IpAddr;
use std::sync::Weak;

use tracing::{info, warn};

use super::index::IndexKey;
use super::table::DeviceTable;
use crate::model::{DeviceId, DeviceRecord, EntityRef, HardwareAddress, Role, StatusSnapshot};
use crate::naming::reference_matches;
use crate::speaker::SpeakerController;

/// Everything one registration needs, gathered before the table is locked.
pub(crate) struct Registration<'a> {
    pub snapshot: &'a StatusSnapshot,
    pub ip: IpAddr,
    pub controller: Option<Weak<dyn SpeakerController>>,
    pub known_references: &'a [EntityRef],
    pub reference_domain: &'a str,
}

impl DeviceTable {
    /// Create or refresh the record a status report describes.
    ///
    /// Role and link fields are never touched here.
    pub(crate) fn register(&mut self, reg: Registration<'_>) -> DeviceRecord {
        let known_at_ip = self
            .lookup_ip(reg.ip)
            .filter(|owner| self.get(owner).is_some_and(|r| !r.fallback_id));
        let (id, fallback) = match (reg.snapshot.reported_uuid(), known_at_ip) {
            (Some(uuid), _) => (DeviceId::device(uuid), false),
            // A report that omits the UUID refreshes the device already
            // known at this address.
            (None, Some(owner)) => (owner, false),
            (None, None) => {
                let id = DeviceId::fallback_for(reg.ip);
                warn!(ip = %reg.ip, device = %id, "device reported no UUID, using IP-derived id");
                (id, true)
            }
        };

        let inherited_ref = if fallback {
            None
        } else {
            self.retire_fallback(&id, reg.ip)
        };

        let mut record = if let Some(existing) = self.get(&id) {
            existing.clone()
        } else {
            info!(device = %id, ip = %reg.ip, "registered new device");
            DeviceRecord::new(id, String::new(), Role::Solo)
        };

        record.fallback_id = fallback;
        record.ip = Some(reg.ip);
        if let Some(hw) = reg
            .snapshot
            .hardware_address
            .as_deref()
            .map(HardwareAddress::new)
            .filter(|hw| !hw.is_empty())
        {
            record.hardware_address = Some(hw);
        }
        if let Some(name) = reg.snapshot.reported_name() {
            name.clone_into(&mut record.display_name);
        } else if record.display_name.is_empty() {
            record.display_name = reg.ip.to_string();
        }
        if reg.controller.is_some() {
            record.controller = reg.controller;
        }
        if record.external_ref.is_none() {
            let matched = inherited_ref.or_else(|| {
                self.match_known_reference(&record, reg.known_references, reg.reference_domain)
            });
            record.external_ref = matched;
        }
        record.touch();

        self.put(record.clone());
        record
    }

    /// Drop the IP-derived record at `ip` now that the device reported a
    /// real UUID. Returns the reference it carried so the new record keeps it.
    fn retire_fallback(&mut self, id: &DeviceId, ip: IpAddr) -> Option<EntityRef> {
        let owner = self.lookup_ip(ip)?;
        if owner == *id || !self.get(&owner).is_some_and(|r| r.fallback_id) {
            return None;
        }
        let retired = self.remove(&owner)?;
        info!(previous = %owner, device = %id, %ip, "replaced IP-derived id with reported UUID");
        retired.external_ref
    }

    /// Best-effort name match against references known to the control
    /// surface. The shortest unclaimed match wins, so `kitchen` beats `kitchen_2`.
    fn match_known_reference(
        &self,
        record: &DeviceRecord,
        known: &[EntityRef],
        domain: &str,
    ) -> Option<EntityRef> {
        known
            .iter()
            .filter(|r| r.in_domain(domain))
            .filter(|r| reference_matches(r, &record.display_name))
            .filter(|r| self.lookup(&IndexKey::Reference((*r).clone())).is_none())
            .min_by_key(|r| r.as_str().len())
            .cloned()
    }
}
