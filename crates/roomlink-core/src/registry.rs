// ── Registry facade ──
//
// Explicitly constructed, cheaply cloneable handle over the device table.
// One write lock serializes every mutation; readers share the read lock
// or consume published snapshots.

use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

use tokio::sync::{RwLock, watch};
use tracing::{debug, info};

use crate::config::RegistryConfig;
use crate::error::CoreError;
use crate::model::{DeviceId, DeviceRecord, EntityRef, HardwareAddress, Identifier, StatusSnapshot};
use crate::speaker::{ControllerLookup, ReferenceDirectory, SpeakerController};
use crate::store::{DeviceTable, IndexKey, Registration};
use crate::stream::{DeviceSnapshot, DeviceStream};

// ── Registry ─────────────────────────────────────────────────────────

/// Single source of truth for device identity and group topology.
#[derive(Clone)]
pub struct Registry {
    pub(crate) inner: Arc<RegistryInner>,
}

pub(crate) struct RegistryInner {
    pub(crate) config: RegistryConfig,
    pub(crate) table: RwLock<DeviceTable>,
    snapshot: watch::Sender<DeviceSnapshot>,
    pub(crate) lookup: Option<Arc<dyn ControllerLookup>>,
    directory: Option<Arc<dyn ReferenceDirectory>>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("config", &self.inner.config)
            .field("devices", &self.inner.snapshot.borrow().len())
            .finish_non_exhaustive()
    }
}

/// Wires the optional collaborators into a new [`Registry`].
pub struct RegistryBuilder {
    config: RegistryConfig,
    lookup: Option<Arc<dyn ControllerLookup>>,
    directory: Option<Arc<dyn ReferenceDirectory>>,
}

impl RegistryBuilder {
    /// Used to auto-register a device first seen through a role change.
    pub fn controller_lookup(mut self, lookup: Arc<dyn ControllerLookup>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    /// Supplies references for name-pattern matching on registration.
    pub fn reference_directory(mut self, directory: Arc<dyn ReferenceDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    pub fn build(self) -> Result<Registry, CoreError> {
        self.config.validate()?;
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));
        Ok(Registry {
            inner: Arc::new(RegistryInner {
                config: self.config,
                table: RwLock::new(DeviceTable::default()),
                snapshot,
                lookup: self.lookup,
                directory: self.directory,
            }),
        })
    }
}

impl Registry {
    /// Registry without collaborators. See [`Registry::builder`] to add them.
    pub fn new(config: RegistryConfig) -> Result<Self, CoreError> {
        Self::builder(config).build()
    }

    pub fn builder(config: RegistryConfig) -> RegistryBuilder {
        RegistryBuilder {
            config,
            lookup: None,
            directory: None,
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.inner.config
    }

    // ── Registration ─────────────────────────────────────────────────

    /// Create or refresh the record described by `snapshot`.
    ///
    /// A snapshot without a UUID is registered under an id derived from
    /// `ip`. The registry keeps only a weak reference to `controller`.
    pub async fn register_device(
        &self,
        snapshot: &StatusSnapshot,
        ip: IpAddr,
        controller: Option<&Arc<dyn SpeakerController>>,
    ) -> DeviceRecord {
        let known = self
            .inner
            .directory
            .as_ref()
            .map(|d| d.known_references())
            .unwrap_or_default();

        let mut table = self.inner.table.write().await;
        let record = table.register(Registration {
            snapshot,
            ip,
            controller: controller.map(Arc::downgrade),
            known_references: &known,
            reference_domain: &self.inner.config.reference_domain,
        });
        self.publish(&table);
        record
    }

    /// Remove a device with all of its links. Followers of a removed
    /// leader become solo. Returns the removed record.
    pub async fn unregister_device(&self, identifier: &Identifier) -> Option<DeviceRecord> {
        let id = self.resolve_id(identifier).await?;
        let mut table = self.inner.table.write().await;
        let removed = table.remove(&id)?;
        info!(device = %id, name = %removed.display_name, "unregistered device");
        self.publish(&table);
        Some(removed)
    }

    /// Drop every record, for example when the owning session ends.
    pub async fn clear(&self) {
        let mut table = self.inner.table.write().await;
        let count = table.len();
        table.clear();
        self.publish(&table);
        info!(count, "registry cleared");
    }

    // ── Identity queries ─────────────────────────────────────────────

    /// Lookup by primary id. `group:<uuid>` addresses a representative.
    pub async fn find_by_uuid(&self, uuid: &str) -> Option<DeviceRecord> {
        let table = self.inner.table.read().await;
        table.get(&DeviceId::from(uuid)).cloned()
    }

    pub async fn find_by_ip(&self, ip: IpAddr) -> Option<DeviceRecord> {
        self.find_device(&Identifier::Ip(ip)).await
    }

    /// Lookup by hardware address in any common notation.
    pub async fn find_by_hardware_address(&self, address: &str) -> Option<DeviceRecord> {
        let hw = HardwareAddress::new(address);
        if hw.is_empty() {
            return None;
        }
        self.find_device(&Identifier::HardwareAddress(hw)).await
    }

    /// Lookup by external reference, falling back to a display-name match
    /// that is written back into the index when it succeeds.
    pub async fn find_by_external_reference(&self, reference: &EntityRef) -> Option<DeviceRecord> {
        self.find_device(&Identifier::Reference(reference.clone())).await
    }

    pub async fn find_device(&self, identifier: &Identifier) -> Option<DeviceRecord> {
        let id = self.resolve_id(identifier).await?;
        self.inner.table.read().await.get(&id).cloned()
    }

    /// Resolve untyped input by trying id, reference, IP and hardware
    /// address in that order. Input that only matches a reference without
    /// the configured domain is tried last against the reference index.
    pub async fn find_device_str(&self, raw: &str) -> Option<DeviceRecord> {
        let id = self.resolve_str(raw).await?;
        self.inner.table.read().await.get(&id).cloned()
    }

    /// Controller of the device, if its owner still holds it.
    pub async fn find_controller(&self, identifier: &Identifier) -> Option<Arc<dyn SpeakerController>> {
        self.find_device(identifier).await?.controller()
    }

    pub async fn get_all_devices(&self) -> Vec<DeviceRecord> {
        self.inner.table.read().await.records().cloned().collect()
    }

    /// Addresses of every physical device.
    pub async fn get_all_ips(&self) -> Vec<IpAddr> {
        self.inner
            .table
            .read()
            .await
            .records()
            .filter(|r| r.is_physical())
            .filter_map(|r| r.ip)
            .collect()
    }

    pub async fn device_count(&self) -> usize {
        self.inner.table.read().await.len()
    }

    // ── Reference maintenance ────────────────────────────────────────

    /// Replace (or with `None`, drop) the external reference of a device.
    /// A reference held by another record moves to this one.
    pub async fn update_external_reference(
        &self,
        identifier: &Identifier,
        reference: Option<EntityRef>,
    ) -> bool {
        let Some(id) = self.resolve_id(identifier).await else {
            return false;
        };
        let mut table = self.inner.table.write().await;
        let changed = table.set_reference(&id, reference);
        if changed {
            debug!(device = %id, "external reference updated");
            self.publish(&table);
        }
        changed
    }

    // ── Observation ──────────────────────────────────────────────────

    pub fn subscribe(&self) -> DeviceStream {
        DeviceStream::new(self.inner.snapshot.subscribe())
    }

    /// Check every topology and index invariant against the live table.
    pub async fn verify_topology(&self) -> Result<(), CoreError> {
        self.inner
            .table
            .read()
            .await
            .check_invariants()
            .map_err(|message| CoreError::InvariantViolation { message })
    }

    // ── Internals ────────────────────────────────────────────────────

    /// Publish the table after a mutation. Called with the write lock
    /// held so snapshots go out in mutation order.
    pub(crate) fn publish(&self, table: &DeviceTable) {
        let values = table.snapshot();
        self.inner.snapshot.send_modify(|snap| *snap = Arc::new(values));
    }

    pub(crate) async fn resolve_id(&self, identifier: &Identifier) -> Option<DeviceId> {
        {
            let table = self.inner.table.read().await;
            if let Some(id) = table.resolve(identifier) {
                return Some(id);
            }
        }
        let Identifier::Reference(reference) = identifier else {
            return None;
        };
        if reference.is_empty() {
            return None;
        }

        let mut table = self.inner.table.write().await;
        // Another writer may have indexed it while the lock was released.
        if let Some(id) = table.resolve(identifier) {
            return Some(id);
        }
        let id = table.match_reference(reference)?;
        table.set_reference(&id, Some(reference.clone()));
        debug!(device = %id, %reference, "backfilled reference from display name");
        self.publish(&table);
        Some(id)
    }

    pub(crate) async fn resolve_str(&self, raw: &str) -> Option<DeviceId> {
        for candidate in Identifier::candidates(raw, &self.inner.config.reference_domain) {
            if let Some(id) = self.resolve_id(&candidate).await {
                return Some(id);
            }
        }
        let reference = EntityRef::new(raw);
        if reference.is_empty() {
            return None;
        }
        self.inner.table.read().await.lookup(&IndexKey::Reference(reference))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn snapshot(uuid: &str, name: &str) -> StatusSnapshot {
        StatusSnapshot {
            uuid: Some(uuid.into()),
            display_name: Some(name.into()),
            hardware_address: Some(format!("aa:bb:cc:dd:ee:{uuid}")),
            ..StatusSnapshot::default()
        }
    }

    fn registry() -> Registry {
        Registry::new(RegistryConfig::default()).unwrap()
    }

    struct Directory(Vec<EntityRef>);

    impl ReferenceDirectory for Directory {
        fn known_references(&self) -> Vec<EntityRef> {
            self.0.clone()
        }
    }

    #[tokio::test]
    async fn find_device_agrees_across_identities() {
        let reg = registry();
        let ip = IpAddr::from([10, 0, 0, 1]);
        reg.register_device(&snapshot("01", "Kitchen"), ip, None).await;
        reg.update_external_reference(&Identifier::Ip(ip), Some("media_player.kitchen".into()))
            .await;

        for raw in ["01", "10.0.0.1", "AA-BB-CC-DD-EE-01", "media_player.kitchen"] {
            let found = reg.find_device_str(raw).await.unwrap();
            assert_eq!(found.id, DeviceId::device("01"), "lookup by {raw}");
        }
        assert!(reg.find_device_str("10.0.0.2").await.is_none());
        assert!(reg.find_device_str("").await.is_none());
    }

    #[tokio::test]
    async fn reference_lookup_backfills_from_display_name() {
        let reg = registry();
        reg.register_device(&snapshot("01", "Living Room"), IpAddr::from([10, 0, 0, 1]), None)
            .await;

        let reference = EntityRef::new("media_player.living_room_2");
        let found = reg.find_by_external_reference(&reference).await.unwrap();
        assert_eq!(found.external_ref, Some(reference.clone()));
        assert!(reg.verify_topology().await.is_ok());

        let again = reg.find_device(&Identifier::Reference(reference)).await.unwrap();
        assert_eq!(again.id, found.id);
    }

    #[tokio::test]
    async fn directory_references_are_matched_on_registration() {
        let reg = Registry::builder(RegistryConfig::default())
            .reference_directory(Arc::new(Directory(vec![EntityRef::new("media_player.kitchen")])))
            .build()
            .unwrap();
        let rec = reg
            .register_device(&snapshot("01", "Kitchen"), IpAddr::from([10, 0, 0, 1]), None)
            .await;
        assert_eq!(rec.external_ref.unwrap().as_str(), "media_player.kitchen");
    }

    #[tokio::test]
    async fn hardware_address_lookup_normalizes_input() {
        let reg = registry();
        reg.register_device(&snapshot("01", "Kitchen"), IpAddr::from([10, 0, 0, 1]), None)
            .await;
        assert!(reg.find_by_hardware_address("AA:BB:CC:DD:EE:01").await.is_some());
        assert!(reg.find_by_hardware_address("  ").await.is_none());
    }

    #[tokio::test]
    async fn subscribers_see_each_mutation() {
        let reg = registry();
        let mut stream = reg.subscribe();
        assert!(stream.current().is_empty());

        reg.register_device(&snapshot("01", "Kitchen"), IpAddr::from([10, 0, 0, 1]), None)
            .await;
        let snap = stream.changed().await.unwrap();
        assert_eq!(snap.len(), 1);

        reg.clear().await;
        assert!(stream.changed().await.unwrap().is_empty());
        assert_eq!(reg.device_count().await, 0);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let cfg = RegistryConfig {
            representative_suffix: String::new(),
            ..RegistryConfig::default()
        };
        assert!(matches!(Registry::new(cfg), Err(CoreError::Config { .. })));
    }

    #[tokio::test]
    async fn registered_controller_is_weakly_held() {
        struct Silent;
        impl SpeakerController for Silent {
            fn follower_list(
                &self,
            ) -> futures_util::future::BoxFuture<'_, Result<crate::model::FollowerList, CoreError>>
            {
                Box::pin(async { Ok(crate::model::FollowerList::empty()) })
            }
        }

        let reg = registry();
        let ip = IpAddr::from([10, 0, 0, 1]);
        let controller: Arc<dyn SpeakerController> = Arc::new(Silent);
        reg.register_device(&snapshot("01", "Kitchen"), ip, Some(&controller)).await;
        assert!(reg.find_controller(&Identifier::Ip(ip)).await.is_some());

        drop(controller);
        assert!(reg.find_controller(&Identifier::Ip(ip)).await.is_none());
    }
}
