// ── Role/group engine ──
//
// Applies reported role changes to the topology. The authoritative
// follower query runs with the table unlocked; its result and every
// sub-transition it implies are then applied in one write section.

use std::net::IpAddr;
use std::sync::Arc;

use indexmap::IndexSet;
use tracing::{debug, info, warn};

use crate::error::CoreError;
use crate::model::{DeviceId, FollowerList, Role, StatusSnapshot};
use crate::registry::Registry;
use crate::speaker::SpeakerController;
use crate::store::DeviceTable;

impl Registry {
    /// Apply a role change reported by the device at `ip`.
    ///
    /// Returns whether any record changed. Unresolvable leaders and failed
    /// follower queries leave the topology as it was and return `Ok(false)`;
    /// only invariant violations are returned as errors.
    pub async fn handle_role_change(
        &self,
        ip: IpAddr,
        old_role: Role,
        new_role: Role,
        snapshot: &StatusSnapshot,
    ) -> Result<bool, CoreError> {
        if new_role == Role::GroupRepresentative {
            return Err(CoreError::InvariantViolation {
                message: format!("device at {ip} cannot report the group representative role"),
            });
        }

        let Some((id, controller)) = self.device_at(ip, snapshot).await else {
            warn!(%ip, %old_role, %new_role, "role change for unknown device not applied");
            return Ok(false);
        };

        let followers = if new_role == Role::Follower {
            None
        } else {
            self.query_followers(&id, controller).await
        };

        let mut table = self.inner.table.write().await;
        if !table.contains(&id) {
            warn!(device = %id, "device was removed while its followers were queried");
            return Ok(false);
        }

        let mut changed = false;
        if new_role == Role::Follower {
            let Some(leader) = table.resolve_leader(&id, snapshot) else {
                warn!(
                    device = %id,
                    uuid_hint = ?snapshot.leader_uuid_hint,
                    ip_hint = ?snapshot.leader_ip_hint,
                    "cannot resolve leader, follower transition not applied"
                );
                return Ok(false);
            };
            changed |= table.link(&id, &leader)?;
        } else {
            let is_linked = table.get(&id).is_some_and(|r| r.leader_id.is_some());
            if old_role == Role::Follower || is_linked {
                changed |= table.detach(&id);
            }
            if let Some(list) = &followers {
                changed |= table.apply_follower_list(&id, list)?;
            }
        }
        changed |= table.settle_role(&id, new_role);

        if changed {
            let role = table.get(&id).map_or(Role::Solo, |r| r.role);
            info!(device = %id, %old_role, %new_role, %role, "role change applied");
            self.publish(&table);
        } else {
            debug!(device = %id, %new_role, "role change left topology unchanged");
        }
        Ok(changed)
    }

    /// Resolve the device at `ip` with its controller, registering it from
    /// `snapshot` when the controller lookup knows the address.
    async fn device_at(
        &self,
        ip: IpAddr,
        snapshot: &StatusSnapshot,
    ) -> Option<(DeviceId, Option<Arc<dyn SpeakerController>>)> {
        let lookup = self.inner.lookup.as_ref();
        let known = {
            let table = self.inner.table.read().await;
            table
                .lookup_ip(ip)
                .and_then(|id| table.get(&id))
                .map(|r| (r.id.clone(), r.controller()))
        };
        if let Some((id, controller)) = known {
            let controller = controller.or_else(|| lookup.and_then(|l| l.controller_for_ip(ip)));
            return Some((id, controller));
        }

        let controller = lookup?.controller_for_ip(ip)?;
        let record = self.register_device(snapshot, ip, Some(&controller)).await;
        info!(device = %record.id, %ip, "auto-registered device seen through a role change");
        Some((record.id, Some(controller)))
    }

    /// Ask the device for its own follower list. Any failure is logged and
    /// reported as `None` so the caller keeps the current topology.
    async fn query_followers(
        &self,
        id: &DeviceId,
        controller: Option<Arc<dyn SpeakerController>>,
    ) -> Option<FollowerList> {
        let Some(controller) = controller else {
            let err = CoreError::ControllerUnavailable {
                device: id.to_string(),
            };
            warn!(device = %id, error = %err, "skipping follower reconciliation");
            return None;
        };

        let limit = self.inner.config.reconcile_timeout;
        match tokio::time::timeout(limit, controller.follower_list()).await {
            Ok(Ok(list)) => {
                debug!(device = %id, count = list.count, "follower list received");
                Some(list)
            }
            Ok(Err(err)) => {
                warn!(device = %id, error = %err, "follower query failed, keeping current topology");
                None
            }
            Err(_) => {
                let err = CoreError::Timeout { timeout: limit };
                warn!(device = %id, error = %err, "follower query failed, keeping current topology");
                None
            }
        }
    }
}

impl DeviceTable {
    /// Leader named by a follower's status report: UUID hint first, then
    /// the IP hint. The device itself never counts as its own leader.
    pub(crate) fn resolve_leader(&self, id: &DeviceId, snapshot: &StatusSnapshot) -> Option<DeviceId> {
        if !snapshot.group_indicator {
            return None;
        }
        let by_uuid = snapshot
            .leader_uuid_hint
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(DeviceId::from)
            .filter(|l| l != id && self.contains(l));
        by_uuid.or_else(|| {
            snapshot
                .leader_ip_hint
                .and_then(|ip| self.lookup_ip(ip))
                .filter(|l| l != id)
        })
    }

    /// Make the table agree with a leader's self-reported follower list.
    ///
    /// Followers that are tracked but no longer reported are released.
    /// Reported followers that match no record are skipped.
    pub(crate) fn apply_follower_list(
        &mut self,
        leader: &DeviceId,
        list: &FollowerList,
    ) -> Result<bool, CoreError> {
        if list.count == 0 {
            return Ok(self.dissolve(leader));
        }

        let mut fresh = IndexSet::new();
        for entry in &list.followers {
            let resolved = self.lookup_ip(entry.ip).or_else(|| {
                entry
                    .uuid
                    .as_deref()
                    .map(str::trim)
                    .filter(|u| !u.is_empty())
                    .map(DeviceId::device)
                    .filter(|f| self.contains(f))
            });
            match resolved {
                Some(f) if f == *leader => {
                    debug!(device = %leader, "device listed itself as a follower");
                }
                Some(f) => {
                    fresh.insert(f);
                }
                None => {
                    warn!(leader = %leader, ip = %entry.ip, "reported follower is not registered, skipping");
                }
            }
        }

        let stale: Vec<DeviceId> = self
            .get(leader)
            .map(|r| {
                r.follower_ids
                    .iter()
                    .filter(|f| !fresh.contains(*f))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        let mut changed = false;
        for f in &stale {
            info!(leader = %leader, follower = %f, "follower no longer reported, released");
            changed |= self.detach(f);
        }
        if fresh.is_empty() {
            warn!(leader = %leader, reported = list.count, "no reported follower could be resolved");
            return Ok(changed);
        }
        for f in &fresh {
            changed |= self.link(f, leader)?;
        }
        Ok(changed)
    }
}
