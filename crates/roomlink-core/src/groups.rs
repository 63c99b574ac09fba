// ── Group composition queries ──
//
// Read-only views over the topology. Misses resolve to `Solo`, `None`
// or an empty list rather than an error.

use crate::model::{DeviceId, DeviceRecord, EntityRef, Identifier, Role};
use crate::registry::Registry;
use crate::store::DeviceTable;

impl DeviceTable {
    pub(crate) fn leader_of(&self, id: &DeviceId) -> Option<&DeviceRecord> {
        let record = self.get(id).filter(|r| r.role == Role::Follower)?;
        self.get(record.leader_id.as_ref()?)
    }

    pub(crate) fn followers_of(&self, id: &DeviceId) -> Vec<&DeviceRecord> {
        self.get(id)
            .filter(|r| r.role == Role::Leader)
            .map(|r| r.follower_ids.iter().filter_map(|f| self.get(f)).collect())
            .unwrap_or_default()
    }

    /// References of the whole group `id` belongs to, leader first, then
    /// followers in the order they joined. Members without a reference
    /// are left out.
    pub(crate) fn group_members(&self, id: &DeviceId) -> Vec<EntityRef> {
        let Some(record) = self.get(id) else {
            return Vec::new();
        };
        match record.role {
            Role::Solo => Vec::new(),
            Role::Leader => std::iter::once(record)
                .chain(self.followers_of(id))
                .filter_map(|r| r.external_ref.clone())
                .collect(),
            Role::Follower => self
                .leader_of(id)
                .filter(|l| l.role == Role::Leader)
                .map(|l| self.group_members(&l.id))
                .unwrap_or_default(),
            Role::GroupRepresentative => id
                .leader()
                .filter(|l| self.get(l).is_some_and(DeviceRecord::is_physical))
                .map(|l| self.group_members(&l))
                .unwrap_or_default(),
        }
    }

    pub(crate) fn group_leader_reference(&self, id: &DeviceId) -> Option<EntityRef> {
        let record = self.get(id)?;
        match record.role {
            Role::Solo => None,
            Role::Leader => record.external_ref.clone(),
            Role::Follower => self.leader_of(id)?.external_ref.clone(),
            Role::GroupRepresentative => {
                let leader = id.leader()?;
                self.get(&leader)
                    .filter(|l| l.role == Role::Leader)?
                    .external_ref
                    .clone()
            }
        }
    }
}

impl Registry {
    /// Role of the device, `Solo` when it does not resolve.
    pub async fn get_role(&self, identifier: &Identifier) -> Role {
        self.find_device(identifier).await.map_or(Role::Solo, |r| r.role)
    }

    /// Leader of a follower. `None` for any other role.
    pub async fn get_leader(&self, identifier: &Identifier) -> Option<DeviceRecord> {
        let id = self.resolve_id(identifier).await?;
        self.inner.table.read().await.leader_of(&id).cloned()
    }

    /// Followers of a leader in join order. Empty for any other role.
    pub async fn get_followers(&self, identifier: &Identifier) -> Vec<DeviceRecord> {
        let Some(id) = self.resolve_id(identifier).await else {
            return Vec::new();
        };
        let table = self.inner.table.read().await;
        table.followers_of(&id).into_iter().cloned().collect()
    }

    /// References of every member of the device's group, leader first.
    ///
    /// A follower yields its whole group and a representative yields the
    /// group of the leader it stands for. Solo devices yield nothing.
    pub async fn get_group_members(&self, identifier: &Identifier) -> Vec<EntityRef> {
        let Some(id) = self.resolve_id(identifier).await else {
            return Vec::new();
        };
        self.inner.table.read().await.group_members(&id)
    }

    pub async fn get_group_leader_reference(&self, identifier: &Identifier) -> Option<EntityRef> {
        let id = self.resolve_id(identifier).await?;
        self.inner.table.read().await.group_leader_reference(&id)
    }
}
