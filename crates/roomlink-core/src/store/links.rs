// ── Leader/follower links ──
//
// Every operation here updates both sides of a link in the same call.
// Roles are kept in step with the links: a leader that loses its last
// follower drops back to solo.

use tracing::{debug, info};

use super::table::DeviceTable;
use crate::error::CoreError;
use crate::model::{DeviceId, Role};

impl DeviceTable {
    /// Detach `id` from its leader. Returns whether anything changed.
    pub(crate) fn detach(&mut self, id: &DeviceId) -> bool {
        let Some(record) = self.get_mut(id) else {
            return false;
        };
        let leader_id = record.leader_id.take();
        let mut changed = leader_id.is_some();
        if record.role == Role::Follower {
            record.role = Role::Solo;
            changed = true;
        }
        if changed {
            record.touch();
        }

        let Some(leader_id) = leader_id else {
            return changed;
        };
        if let Some(leader) = self.get_mut(&leader_id) {
            if leader.follower_ids.shift_remove(id) {
                leader.touch();
            }
            if leader.follower_ids.is_empty() && leader.role == Role::Leader {
                leader.role = Role::Solo;
                info!(leader = %leader_id, "group dissolved: last follower left");
            }
        }
        debug!(device = %id, leader = %leader_id, "detached from leader");
        changed
    }

    /// Release every follower of `id`. The group is dissolved, not handed over.
    pub(crate) fn dissolve(&mut self, id: &DeviceId) -> bool {
        let Some(record) = self.get_mut(id) else {
            return false;
        };
        let followers = std::mem::take(&mut record.follower_ids);
        let mut changed = !followers.is_empty();
        if record.role == Role::Leader {
            record.role = Role::Solo;
            changed = true;
        }
        if changed {
            record.touch();
        }

        for f in &followers {
            if let Some(follower) = self.get_mut(f) {
                if follower.leader_id.as_ref() == Some(id) {
                    follower.leader_id = None;
                    follower.role = Role::Solo;
                    follower.touch();
                }
            }
        }
        if !followers.is_empty() {
            info!(leader = %id, released = followers.len(), "group dissolved");
        }
        changed
    }

    /// Put `follower` under `leader`, unwinding any links either side had.
    ///
    /// A follower never keeps followers of its own, and a leader cannot
    /// stay a follower of somebody else.
    pub(crate) fn link(&mut self, follower: &DeviceId, leader: &DeviceId) -> Result<bool, CoreError> {
        if follower == leader {
            return Err(CoreError::invariant(format!("{follower} cannot follow itself")));
        }
        for id in [follower, leader] {
            match self.get(id) {
                None => {
                    return Err(CoreError::DeviceNotFound {
                        identifier: id.to_string(),
                    });
                }
                Some(r) if !r.is_physical() => {
                    return Err(CoreError::invariant(format!(
                        "group representative {id} cannot be part of a group"
                    )));
                }
                Some(_) => {}
            }
        }

        let linked = self.get(follower).is_some_and(|r| {
            r.role == Role::Follower && r.leader_id.as_ref() == Some(leader)
        }) && self
            .get(leader)
            .is_some_and(|r| r.role == Role::Leader && r.follower_ids.contains(follower));
        if linked {
            return Ok(false);
        }

        self.dissolve(follower);
        if self.get(follower).is_some_and(|r| r.leader_id.is_some()) {
            self.detach(follower);
        }
        if self.get(leader).is_some_and(|r| r.leader_id.is_some()) {
            info!(device = %leader, "follower promoted to leader");
            self.detach(leader);
        }

        if let Some(r) = self.get_mut(follower) {
            r.leader_id = Some(leader.clone());
            r.role = Role::Follower;
            r.touch();
        }
        if let Some(r) = self.get_mut(leader) {
            r.follower_ids.insert(follower.clone());
            r.role = Role::Leader;
            r.touch();
        }
        debug!(follower = %follower, leader = %leader, "linked");
        Ok(true)
    }

    /// Align the stored role of `id` with its links. Returns whether it changed.
    pub(crate) fn settle_role(&mut self, id: &DeviceId, requested: Role) -> bool {
        let Some(record) = self.get_mut(id) else {
            return false;
        };
        let linked = record.linked_role();
        if linked != requested {
            debug!(device = %id, %requested, settled = %linked, "requested role not backed by links");
        }
        if record.role == linked {
            return false;
        }
        record.role = linked;
        record.touch();
        true
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::DeviceRecord;

    fn table(ids: &[&str]) -> DeviceTable {
        let mut table = DeviceTable::default();
        for id in ids {
            table.put(DeviceRecord::new(DeviceId::device(*id), (*id).into(), Role::Solo));
        }
        table
    }

    fn id(s: &str) -> DeviceId {
        DeviceId::device(s)
    }

    fn role(table: &DeviceTable, s: &str) -> Role {
        table.get(&id(s)).unwrap().role
    }

    #[test]
    fn link_sets_both_sides() {
        let mut t = table(&["a", "b"]);
        assert!(t.link(&id("b"), &id("a")).unwrap());
        assert_eq!(role(&t, "a"), Role::Leader);
        assert_eq!(role(&t, "b"), Role::Follower);
        assert!(t.get(&id("a")).unwrap().follower_ids.contains(&id("b")));
        assert!(t.check_invariants().is_ok());

        assert!(!t.link(&id("b"), &id("a")).unwrap());
    }

    #[test]
    fn detach_last_follower_demotes_leader() {
        let mut t = table(&["a", "b", "c"]);
        t.link(&id("b"), &id("a")).unwrap();
        t.link(&id("c"), &id("a")).unwrap();

        assert!(t.detach(&id("b")));
        assert_eq!(role(&t, "a"), Role::Leader);
        assert!(t.detach(&id("c")));
        assert_eq!(role(&t, "a"), Role::Solo);
        assert!(t.check_invariants().is_ok());
        assert!(!t.detach(&id("c")));
    }

    #[test]
    fn switching_leaders_leaves_old_group() {
        let mut t = table(&["a", "b", "c"]);
        t.link(&id("c"), &id("a")).unwrap();
        t.link(&id("c"), &id("b")).unwrap();

        assert_eq!(role(&t, "a"), Role::Solo);
        assert_eq!(role(&t, "b"), Role::Leader);
        assert!(t.check_invariants().is_ok());
    }

    #[test]
    fn leader_joining_another_group_releases_its_followers() {
        let mut t = table(&["a", "b", "c"]);
        t.link(&id("b"), &id("a")).unwrap();
        t.link(&id("a"), &id("c")).unwrap();

        assert_eq!(role(&t, "a"), Role::Follower);
        assert_eq!(role(&t, "b"), Role::Solo);
        assert!(t.get(&id("b")).unwrap().leader_id.is_none());
        assert!(t.check_invariants().is_ok());
    }

    #[test]
    fn follower_promoted_to_leader_leaves_its_group() {
        let mut t = table(&["a", "b", "c"]);
        t.link(&id("b"), &id("a")).unwrap();
        t.link(&id("c"), &id("b")).unwrap();

        assert_eq!(role(&t, "a"), Role::Solo);
        assert_eq!(role(&t, "b"), Role::Leader);
        assert!(t.check_invariants().is_ok());
    }

    #[test]
    fn self_link_is_an_invariant_violation() {
        let mut t = table(&["a"]);
        assert!(matches!(
            t.link(&id("a"), &id("a")),
            Err(CoreError::InvariantViolation { .. })
        ));
    }

    #[test]
    fn representative_cannot_lead() {
        let mut t = table(&["a"]);
        t.put(DeviceRecord::new(
            DeviceId::Group("a".into()),
            "A".into(),
            Role::GroupRepresentative,
        ));
        assert!(matches!(
            t.link(&id("a"), &DeviceId::Group("a".into())),
            Err(CoreError::InvariantViolation { .. })
        ));
        assert_eq!(role(&t, "a"), Role::Solo);
    }

    #[test]
    fn dissolve_releases_all_followers() {
        let mut t = table(&["a", "b", "c"]);
        t.link(&id("b"), &id("a")).unwrap();
        t.link(&id("c"), &id("a")).unwrap();

        assert!(t.dissolve(&id("a")));
        for s in ["a", "b", "c"] {
            assert_eq!(role(&t, s), Role::Solo);
        }
        assert!(t.check_invariants().is_ok());
    }

    #[test]
    fn settle_role_follows_links() {
        let mut t = table(&["a"]);
        assert!(!t.settle_role(&id("a"), Role::Leader));
        assert_eq!(role(&t, "a"), Role::Solo);
    }
}
