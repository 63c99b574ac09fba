// ── Group representatives ──
//
// Synthetic records that let a group be addressed as one unit. The id
// is derived from the physical leader's id, so no extra mapping is kept.

use tracing::{debug, info};

use crate::error::CoreError;
use crate::model::{DeviceId, DeviceRecord, EntityRef, Role};
use crate::naming;
use crate::registry::Registry;
use crate::store::{DeviceTable, IndexKey};

impl DeviceTable {
    /// Create or refresh the representative of `leader_id`, indexed under
    /// `reference`.
    pub(crate) fn create_representative(
        &mut self,
        leader_id: &DeviceId,
        reference: EntityRef,
    ) -> Result<DeviceRecord, CoreError> {
        let rep_id = leader_id.representative().ok_or_else(|| {
            CoreError::invariant(format!("{leader_id} is a representative and cannot have one"))
        })?;
        let leader = self.get(leader_id).ok_or_else(|| CoreError::DeviceNotFound {
            identifier: leader_id.to_string(),
        })?;

        let reference = Some(reference).filter(|r| !r.is_empty());
        if let Some(r) = &reference {
            if let Some(owner) = self
                .lookup(&IndexKey::Reference(r.clone()))
                .filter(|owner| *owner != rep_id)
            {
                return Err(CoreError::invariant(format!(
                    "reference {r} already belongs to {owner}"
                )));
            }
        }

        let mut rep = DeviceRecord::new(rep_id, leader.display_name.clone(), Role::GroupRepresentative);
        rep.ip = leader.ip;
        rep.hardware_address.clone_from(&leader.hardware_address);
        rep.controller.clone_from(&leader.controller);
        rep.external_ref = reference;

        self.put(rep.clone());
        Ok(rep)
    }

    pub(crate) fn destroy_representative(&mut self, leader_id: &DeviceId) -> Option<DeviceRecord> {
        let rep_id = leader_id.representative()?;
        self.remove(&rep_id)
    }

    pub(crate) fn representative_for(&self, leader_id: &DeviceId) -> Option<&DeviceRecord> {
        self.get(&leader_id.representative()?)
    }

    /// Remove every representative whose leader no longer leads a group.
    pub(crate) fn prune_representatives(&mut self) -> Vec<DeviceId> {
        let orphaned: Vec<DeviceId> = self
            .records()
            .filter(|r| !r.is_physical())
            .filter(|r| {
                !r.id
                    .leader()
                    .and_then(|l| self.get(&l))
                    .is_some_and(DeviceRecord::is_leader)
            })
            .map(|r| r.id.clone())
            .collect();
        for id in &orphaned {
            self.remove(id);
        }
        orphaned
    }
}

impl Registry {
    /// Create the representative standing in for `leader`'s group.
    ///
    /// Its IP, hardware address and controller are copied from the leader
    /// for display and control; only `reference` is indexed.
    pub async fn create_representative(
        &self,
        leader: &DeviceRecord,
        reference: EntityRef,
    ) -> Result<DeviceRecord, CoreError> {
        let mut table = self.inner.table.write().await;
        let rep = table.create_representative(&leader.id, reference)?;
        info!(leader = %leader.id, representative = %rep.id, "group representative created");
        self.publish(&table);
        Ok(rep)
    }

    /// Remove the representative of `leader_id`. Returns whether one existed.
    pub async fn destroy_representative(&self, leader_id: &DeviceId) -> bool {
        let mut table = self.inner.table.write().await;
        let Some(rep) = table.destroy_representative(leader_id) else {
            debug!(leader = %leader_id, "no group representative to destroy");
            return false;
        };
        info!(leader = %leader_id, representative = %rep.id, "group representative destroyed");
        self.publish(&table);
        true
    }

    pub async fn get_representative_for(&self, leader_id: &DeviceId) -> Option<DeviceRecord> {
        self.inner
            .table
            .read()
            .await
            .representative_for(leader_id)
            .cloned()
    }

    /// Reference a control surface would assign to `record`.
    pub fn generate_reference(&self, record: &DeviceRecord) -> EntityRef {
        naming::generate_reference(record, &self.inner.config)
    }

    /// Drop representatives whose leader has no followers left, returning
    /// their ids.
    pub async fn prune_representatives(&self) -> Vec<DeviceId> {
        let mut table = self.inner.table.write().await;
        let removed = table.prune_representatives();
        if !removed.is_empty() {
            info!(count = removed.len(), "pruned group representatives of dissolved groups");
            self.publish(&table);
        }
        removed
    }
}
