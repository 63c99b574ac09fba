// ── Device table ──
//
// Owns every record, keyed by id, together with the identity index.
// Any change to an identity field goes through `put` so the index and
// the records can never disagree.

use std::net::IpAddr;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, info};

use super::index::{IdentityIndex, IndexKey};
use crate::model::{DeviceId, DeviceRecord, EntityRef, Identifier, Role};
use crate::naming::reference_matches;

#[derive(Debug, Default)]
pub(crate) struct DeviceTable {
    records: IndexMap<DeviceId, DeviceRecord>,
    pub(super) index: IdentityIndex,
}

impl DeviceTable {
    // ── Reads ────────────────────────────────────────────────────────

    pub(crate) fn get(&self, id: &DeviceId) -> Option<&DeviceRecord> {
        self.records.get(id)
    }

    pub(super) fn get_mut(&mut self, id: &DeviceId) -> Option<&mut DeviceRecord> {
        self.records.get_mut(id)
    }

    pub(crate) fn contains(&self, id: &DeviceId) -> bool {
        self.records.contains_key(id)
    }

    pub(crate) fn records(&self) -> impl Iterator<Item = &DeviceRecord> {
        self.records.values()
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    pub(crate) fn lookup(&self, key: &IndexKey) -> Option<DeviceId> {
        self.index.get(key).cloned()
    }

    pub(crate) fn lookup_ip(&self, ip: IpAddr) -> Option<DeviceId> {
        self.lookup(&IndexKey::Ip(ip))
    }

    /// Resolve through the id table or the identity index. Never scans.
    pub(crate) fn resolve(&self, identifier: &Identifier) -> Option<DeviceId> {
        match identifier {
            Identifier::Id(id) => self.contains(id).then(|| id.clone()),
            Identifier::Reference(r) => self.lookup(&IndexKey::Reference(r.clone())),
            Identifier::Ip(ip) => self.lookup_ip(*ip),
            Identifier::HardwareAddress(hw) => self.lookup(&IndexKey::Hardware(hw.clone())),
        }
    }

    /// Physical record without a reference whose display name `reference` names.
    pub(crate) fn match_reference(&self, reference: &EntityRef) -> Option<DeviceId> {
        self.records
            .values()
            .find(|r| {
                r.is_physical()
                    && r.external_ref.is_none()
                    && reference_matches(reference, &r.display_name)
            })
            .map(|r| r.id.clone())
    }

    pub(crate) fn snapshot(&self) -> Vec<Arc<DeviceRecord>> {
        self.records.values().cloned().map(Arc::new).collect()
    }

    // ── Writes ───────────────────────────────────────────────────────

    /// Store `record`, replacing any previous version, and re-index it.
    ///
    /// A key already owned by another record moves to this one and the
    /// field it came from is blanked on the previous owner.
    pub(crate) fn put(&mut self, record: DeviceRecord) {
        if let Some(old) = self.records.get(&record.id) {
            self.index.unindex(old);
        }
        for key in IndexKey::of(&record) {
            if let Some(owner) = self.index.get(&key).filter(|o| **o != record.id).cloned() {
                debug!(%key, previous = %owner, device = %record.id, "identity moved to another device");
                if let Some(previous) = self.records.get_mut(&owner) {
                    key.clear_on(previous);
                    previous.touch();
                }
                self.index.remove(&key);
            }
            self.index.insert(key, record.id.clone());
        }
        self.records.insert(record.id.clone(), record);
    }

    /// Replace the external reference of `id`. Returns whether it changed.
    pub(crate) fn set_reference(&mut self, id: &DeviceId, reference: Option<EntityRef>) -> bool {
        let Some(mut record) = self.records.get(id).cloned() else {
            return false;
        };
        let reference = reference.filter(|r| !r.is_empty());
        if record.external_ref == reference {
            return false;
        }
        record.external_ref = reference;
        record.touch();
        self.put(record);
        true
    }

    /// Remove a record with all of its links and index entries.
    ///
    /// Followers of a removed leader become solo, a removed follower leaves
    /// its group, and a removed leader takes its representative with it.
    pub(crate) fn remove(&mut self, id: &DeviceId) -> Option<DeviceRecord> {
        if !self.records.contains_key(id) {
            return None;
        }
        if !id.is_representative() {
            self.detach(id);
            self.dissolve(id);
            if let Some(rep) = id.representative() {
                if self.remove(&rep).is_some() {
                    info!(leader = %id, "removed group representative with its leader");
                }
            }
        }
        let record = self.records.shift_remove(id)?;
        self.index.unindex(&record);
        Some(record)
    }

    pub(crate) fn clear(&mut self) {
        self.records.clear();
        self.index.clear();
    }

    // ── Consistency ──────────────────────────────────────────────────

    /// Check every topology and index invariant, reporting the first breach.
    pub(crate) fn check_invariants(&self) -> Result<(), String> {
        for (id, record) in &self.records {
            if record.id != *id {
                return Err(format!("record stored under {id} carries id {}", record.id));
            }
            self.check_links(record)?;
            for key in IndexKey::of(record) {
                if self.index.get(&key) != Some(id) {
                    return Err(format!("{key} of {id} is not indexed to it"));
                }
            }
        }
        for (key, owner) in self.index.iter() {
            let Some(record) = self.records.get(owner) else {
                return Err(format!("{key} points at missing record {owner}"));
            };
            if !IndexKey::of(record).contains(key) {
                return Err(format!("{key} points at {owner}, which no longer carries it"));
            }
        }
        Ok(())
    }

    fn check_links(&self, record: &DeviceRecord) -> Result<(), String> {
        let id = &record.id;
        if record.is_physical() == (record.role == Role::GroupRepresentative) {
            return Err(format!("{id} has role {} but a mismatched id kind", record.role));
        }
        match record.role {
            Role::Solo => {
                if record.leader_id.is_some() || !record.follower_ids.is_empty() {
                    return Err(format!("solo {id} still carries links"));
                }
            }
            Role::Follower => {
                if !record.follower_ids.is_empty() {
                    return Err(format!("follower {id} has followers of its own"));
                }
                let leader = record
                    .leader_id
                    .as_ref()
                    .and_then(|l| self.records.get(l))
                    .ok_or_else(|| format!("follower {id} has no resolvable leader"))?;
                if leader.role != Role::Leader || !leader.follower_ids.contains(id) {
                    return Err(format!("{} does not list follower {id}", leader.id));
                }
            }
            Role::Leader => {
                if record.leader_id.is_some() || record.follower_ids.is_empty() {
                    return Err(format!("leader {id} has a leader or no followers"));
                }
                for f in &record.follower_ids {
                    let follower = self
                        .records
                        .get(f)
                        .ok_or_else(|| format!("leader {id} lists missing follower {f}"))?;
                    if follower.role != Role::Follower || follower.leader_id.as_ref() != Some(id) {
                        return Err(format!("{f} is listed by {id} but does not follow it"));
                    }
                }
            }
            Role::GroupRepresentative => {
                if record.leader_id.is_some() || !record.follower_ids.is_empty() {
                    return Err(format!("representative {id} carries links"));
                }
                let leader = id.leader().ok_or_else(|| format!("{id} has no leader id"))?;
                if !self.records.contains_key(&leader) {
                    return Err(format!("representative {id} outlived its leader"));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::HardwareAddress;

    fn device(id: &str, ip: [u8; 4]) -> DeviceRecord {
        let mut r = DeviceRecord::new(DeviceId::device(id), id.to_uppercase(), Role::Solo);
        r.ip = Some(IpAddr::from(ip));
        r.hardware_address = Some(HardwareAddress::new(format!("aa:bb:cc:dd:ee:{:02x}", ip[3])));
        r
    }

    #[test]
    fn put_indexes_identity_fields() {
        let mut table = DeviceTable::default();
        table.put(device("u1", [10, 0, 0, 1]));

        let id = DeviceId::device("u1");
        assert_eq!(table.resolve(&Identifier::Ip(IpAddr::from([10, 0, 0, 1]))), Some(id.clone()));
        assert_eq!(
            table.resolve(&Identifier::HardwareAddress(HardwareAddress::new("AA-BB-CC-DD-EE-01"))),
            Some(id)
        );
        assert!(table.check_invariants().is_ok());
    }

    #[test]
    fn changed_ip_drops_old_entry() {
        let mut table = DeviceTable::default();
        table.put(device("u1", [10, 0, 0, 1]));
        let mut moved = table.get(&DeviceId::device("u1")).unwrap().clone();
        moved.ip = Some(IpAddr::from([10, 0, 0, 9]));
        table.put(moved);

        assert!(table.lookup_ip(IpAddr::from([10, 0, 0, 1])).is_none());
        assert!(table.lookup_ip(IpAddr::from([10, 0, 0, 9])).is_some());
        assert!(table.check_invariants().is_ok());
    }

    #[test]
    fn claimed_ip_is_cleared_on_previous_owner() {
        let mut table = DeviceTable::default();
        table.put(device("u1", [10, 0, 0, 1]));
        let mut other = device("u2", [10, 0, 0, 1]);
        other.hardware_address = None;
        table.put(other);

        assert_eq!(table.lookup_ip(IpAddr::from([10, 0, 0, 1])), Some(DeviceId::device("u2")));
        assert!(table.get(&DeviceId::device("u1")).unwrap().ip.is_none());
        assert!(table.check_invariants().is_ok());
    }

    #[test]
    fn set_reference_replaces_index_entry() {
        let mut table = DeviceTable::default();
        table.put(device("u1", [10, 0, 0, 1]));
        let id = DeviceId::device("u1");

        assert!(table.set_reference(&id, Some(EntityRef::new("media_player.a"))));
        assert!(table.set_reference(&id, Some(EntityRef::new("media_player.b"))));
        assert!(!table.set_reference(&id, Some(EntityRef::new("media_player.b"))));

        assert!(table.resolve(&Identifier::Reference(EntityRef::new("media_player.a"))).is_none());
        assert_eq!(
            table.resolve(&Identifier::Reference(EntityRef::new("media_player.b"))),
            Some(id)
        );
    }

    #[test]
    fn match_reference_skips_already_referenced_records() {
        let mut table = DeviceTable::default();
        let mut r = device("u1", [10, 0, 0, 1]);
        r.display_name = "Living Room".into();
        table.put(r);

        let reference = EntityRef::new("media_player.living_room_2");
        assert_eq!(table.match_reference(&reference), Some(DeviceId::device("u1")));

        table.set_reference(&DeviceId::device("u1"), Some(EntityRef::new("media_player.lr")));
        assert!(table.match_reference(&reference).is_none());
    }

    #[test]
    fn remove_clears_index() {
        let mut table = DeviceTable::default();
        table.put(device("u1", [10, 0, 0, 1]));
        let removed = table.remove(&DeviceId::device("u1"));
        assert!(removed.is_some());
        assert_eq!(table.len(), 0);
        assert_eq!(table.index.len(), 0);
        assert!(table.remove(&DeviceId::device("u1")).is_none());
    }
}
