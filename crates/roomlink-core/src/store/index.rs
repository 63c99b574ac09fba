// ── Identity index ──
//
// One map from every secondary identity (IP, hardware address, external
// reference) to the owning record's id.

use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;

use crate::model::{DeviceId, DeviceRecord, EntityRef, HardwareAddress};

/// A secondary identity a record can be found by.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum IndexKey {
    Ip(IpAddr),
    Hardware(HardwareAddress),
    Reference(EntityRef),
}

impl IndexKey {
    /// Keys a record should be indexed under.
    ///
    /// Representatives copy their leader's IP and hardware address for
    /// display only; the physical leader keeps owning those keys.
    pub(crate) fn of(record: &DeviceRecord) -> Vec<Self> {
        let mut keys = Vec::with_capacity(3);
        if record.is_physical() {
            if let Some(ip) = record.ip {
                keys.push(Self::Ip(ip));
            }
            if let Some(hw) = record.hardware_address.as_ref().filter(|hw| !hw.is_empty()) {
                keys.push(Self::Hardware(hw.clone()));
            }
        }
        if let Some(r) = record.external_ref.as_ref().filter(|r| !r.is_empty()) {
            keys.push(Self::Reference(r.clone()));
        }
        keys
    }

    /// Blank the field on `record` that this key was derived from.
    pub(crate) fn clear_on(&self, record: &mut DeviceRecord) {
        match self {
            Self::Ip(_) => record.ip = None,
            Self::Hardware(_) => record.hardware_address = None,
            Self::Reference(_) => record.external_ref = None,
        }
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ip(ip) => write!(f, "ip {ip}"),
            Self::Hardware(hw) => write!(f, "hardware address {hw}"),
            Self::Reference(r) => write!(f, "reference {r}"),
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct IdentityIndex {
    entries: HashMap<IndexKey, DeviceId>,
}

impl IdentityIndex {
    pub(crate) fn get(&self, key: &IndexKey) -> Option<&DeviceId> {
        self.entries.get(key)
    }

    pub(crate) fn insert(&mut self, key: IndexKey, id: DeviceId) {
        self.entries.insert(key, id);
    }

    pub(crate) fn remove(&mut self, key: &IndexKey) -> Option<DeviceId> {
        self.entries.remove(key)
    }

    /// Drop every entry that points at `record`. Entries another record
    /// has since claimed are left alone.
    pub(crate) fn unindex(&mut self, record: &DeviceRecord) {
        for key in IndexKey::of(record) {
            if self.entries.get(&key) == Some(&record.id) {
                self.entries.remove(&key);
            }
        }
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&IndexKey, &DeviceId)> {
        self.entries.iter()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Role;

    fn record(id: &str) -> DeviceRecord {
        let mut r = DeviceRecord::new(DeviceId::device(id), "Kitchen".into(), Role::Solo);
        r.ip = Some(IpAddr::from([10, 0, 0, 1]));
        r.hardware_address = Some(HardwareAddress::new("AA:BB:CC:DD:EE:FF"));
        r.external_ref = Some(EntityRef::new("media_player.kitchen"));
        r
    }

    #[test]
    fn physical_records_have_three_keys() {
        assert_eq!(IndexKey::of(&record("u1")).len(), 3);
    }

    #[test]
    fn representatives_are_keyed_by_reference_only() {
        let mut rep = record("u1");
        rep.id = DeviceId::Group("u1".into());
        let keys = IndexKey::of(&rep);
        assert_eq!(keys, vec![IndexKey::Reference(EntityRef::new("media_player.kitchen"))]);
    }

    #[test]
    fn unindex_leaves_foreign_entries() {
        let mut index = IdentityIndex::default();
        let a = record("a");
        for key in IndexKey::of(&a) {
            index.insert(key, a.id.clone());
        }
        let ip_key = IndexKey::Ip(IpAddr::from([10, 0, 0, 1]));
        index.insert(ip_key.clone(), DeviceId::device("b"));

        index.unindex(&a);
        assert_eq!(index.len(), 1);
        assert_eq!(index.get(&ip_key), Some(&DeviceId::device("b")));
    }
}
