//! `roomlink replay`: run a scenario script against a fresh registry.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::future::BoxFuture;
use serde::Serialize;
use tabled::Tabled;
use tokio::sync::Mutex;
use tracing::debug;

use roomlink_core::{
    ControllerLookup, CoreError, DeviceId, DeviceRecord, EntityRef, FollowerList, Identifier,
    Registry, RegistryConfig, Role, SpeakerController,
};

use crate::cli::{ReplayArgs, View};
use crate::error::CliError;
use crate::output::{self, Presentation};
use crate::script::{self, Script, Step};

// ── Simulated fleet ──────────────────────────────────────────────────

/// A speaker whose follower list is whatever the script last said.
struct ScriptedSpeaker {
    ip: IpAddr,
    followers: Mutex<Vec<IpAddr>>,
    failing: AtomicBool,
}

impl SpeakerController for ScriptedSpeaker {
    fn follower_list(&self) -> BoxFuture<'_, Result<FollowerList, CoreError>> {
        Box::pin(async move {
            if self.failing.load(Ordering::Acquire) {
                return Err(CoreError::Reconciliation {
                    device: self.ip.to_string(),
                    reason: "speaker scripted to fail".into(),
                });
            }
            let ips = self.followers.lock().await.clone();
            Ok(FollowerList::from_ips(ips))
        })
    }
}

/// Every speaker the script mentions, keyed by address.
struct ScriptedFleet {
    speakers: HashMap<IpAddr, Arc<ScriptedSpeaker>>,
}

impl ScriptedFleet {
    fn from_script(script: &Script) -> Self {
        let mut speakers = HashMap::new();
        for spec in &script.speakers {
            speakers.insert(
                spec.ip,
                Arc::new(ScriptedSpeaker {
                    ip: spec.ip,
                    followers: Mutex::new(spec.followers.clone()),
                    failing: AtomicBool::new(spec.failing),
                }),
            );
        }
        for ip in script.steps.iter().flat_map(Step::addresses) {
            speakers.entry(ip).or_insert_with(|| {
                Arc::new(ScriptedSpeaker {
                    ip,
                    followers: Mutex::new(Vec::new()),
                    failing: AtomicBool::new(false),
                })
            });
        }
        Self { speakers }
    }

    fn speaker(&self, ip: IpAddr) -> Result<&Arc<ScriptedSpeaker>, CliError> {
        self.speakers.get(&ip).ok_or_else(|| CliError::NotFound {
            identifier: ip.to_string(),
        })
    }
}

impl ControllerLookup for ScriptedFleet {
    fn controller_for_ip(&self, ip: IpAddr) -> Option<Arc<dyn SpeakerController>> {
        self.speakers
            .get(&ip)
            .map(|s| Arc::clone(s) as Arc<dyn SpeakerController>)
    }
}

// ── Rows ─────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct StepOutcome {
    step: usize,
    op: &'static str,
    outcome: String,
}

#[derive(Tabled)]
struct StepRow {
    #[tabled(rename = "#")]
    step: usize,
    #[tabled(rename = "Op")]
    op: &'static str,
    #[tabled(rename = "Outcome")]
    outcome: String,
}

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "IP")]
    ip: String,
    #[tabled(rename = "Role")]
    role: String,
    #[tabled(rename = "Leader")]
    leader: String,
    #[tabled(rename = "Followers")]
    followers: String,
    #[tabled(rename = "Reference")]
    reference: String,
}

fn device_row(record: &DeviceRecord, color: bool) -> DeviceRow {
    DeviceRow {
        id: record.id.to_string(),
        name: record.display_name.clone(),
        ip: record.ip.map(|ip| ip.to_string()).unwrap_or_default(),
        role: output::paint_role(record.role, color),
        leader: record
            .leader_id
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default(),
        followers: join(record.follower_ids.iter()),
        reference: record
            .external_ref
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default(),
    }
}

/// One multiroom group, leader first.
#[derive(Serialize)]
struct GroupView {
    leader: DeviceId,
    name: String,
    followers: Vec<DeviceId>,
    members: Vec<EntityRef>,
    representative: Option<EntityRef>,
}

#[derive(Tabled)]
struct GroupRow {
    #[tabled(rename = "Leader")]
    leader: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Members")]
    members: String,
    #[tabled(rename = "Representative")]
    representative: String,
}

fn group_row(g: &GroupView) -> GroupRow {
    GroupRow {
        leader: g.leader.to_string(),
        name: g.name.clone(),
        members: join(g.members.iter()),
        representative: g
            .representative
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default(),
    }
}

fn join<T: ToString>(items: impl Iterator<Item = T>) -> String {
    items.map(|i| i.to_string()).collect::<Vec<_>>().join(", ")
}

// ── Handler ──────────────────────────────────────────────────────────

pub async fn handle(
    args: ReplayArgs,
    registry_config: RegistryConfig,
    out: &Presentation,
) -> Result<(), CliError> {
    let text = tokio::fs::read_to_string(&args.script).await?;
    let script = script::parse(&args.script, &text)?;

    let fleet = Arc::new(ScriptedFleet::from_script(&script));
    let registry = Registry::builder(registry_config)
        .controller_lookup(Arc::clone(&fleet) as Arc<dyn ControllerLookup>)
        .build()?;

    let mut outcomes = Vec::with_capacity(script.steps.len());
    for (index, step) in script.steps.iter().enumerate() {
        let number = index + 1;
        debug!(step = number, op = step.name(), "applying step");

        let outcome = apply(&registry, &fleet, step).await?;
        if args.check {
            registry
                .verify_topology()
                .await
                .map_err(|e| CliError::Topology {
                    step: number,
                    message: e.to_string(),
                })?;
        }
        outcomes.push(StepOutcome {
            step: number,
            op: step.name(),
            outcome,
        });
    }

    if args.steps {
        let rendered = output::render_list(
            out.format,
            &outcomes,
            |o| StepRow {
                step: o.step,
                op: o.op,
                outcome: o.outcome.clone(),
            },
            |o| format!("{} {}", o.step, o.outcome),
        )?;
        output::print_output(&rendered, out.quiet);
    }

    let rendered = match args.view {
        View::Devices => {
            let records = registry.get_all_devices().await;
            output::render_list(
                out.format,
                &records,
                |r| device_row(r, out.color),
                |r| r.id.to_string(),
            )?
        }
        View::Groups => {
            let groups = collect_groups(&registry).await;
            output::render_list(out.format, &groups, group_row, |g| g.leader.to_string())?
        }
    };
    output::print_output(&rendered, out.quiet);
    Ok(())
}

async fn collect_groups(registry: &Registry) -> Vec<GroupView> {
    let mut groups = Vec::new();
    for record in registry.get_all_devices().await {
        if !record.is_leader() {
            continue;
        }
        let key = Identifier::Id(record.id.clone());
        let members = registry.get_group_members(&key).await;
        let representative = registry
            .get_representative_for(&record.id)
            .await
            .and_then(|rep| rep.external_ref);
        groups.push(GroupView {
            followers: record.follower_ids.iter().cloned().collect(),
            leader: record.id,
            name: record.display_name,
            members,
            representative,
        });
    }
    groups
}

async fn find(registry: &Registry, raw: &str) -> Result<DeviceRecord, CliError> {
    registry
        .find_device_str(raw)
        .await
        .ok_or_else(|| CliError::NotFound {
            identifier: raw.to_owned(),
        })
}

/// Apply one step and describe what it did.
async fn apply(registry: &Registry, fleet: &ScriptedFleet, step: &Step) -> Result<String, CliError> {
    match step {
        Step::Register {
            ip,
            uuid,
            name,
            hardware_address,
            reference,
        } => {
            let snapshot = script::register_snapshot(
                *ip,
                uuid.as_deref(),
                name.as_deref(),
                hardware_address.as_deref(),
            );
            let controller: Arc<dyn SpeakerController> = Arc::clone(fleet.speaker(*ip)?) as _;
            let record = registry
                .register_device(&snapshot, *ip, Some(&controller))
                .await;
            if let Some(reference) = reference {
                registry
                    .update_external_reference(
                        &Identifier::Id(record.id.clone()),
                        Some(EntityRef::new(reference)),
                    )
                    .await;
            }
            Ok(format!("registered {}", record.id))
        }

        Step::SetFollowers { ip, followers } => {
            *fleet.speaker(*ip)?.followers.lock().await = followers.clone();
            Ok(format!("{ip} reports {} follower(s)", followers.len()))
        }

        Step::SetFailing { ip, failing } => {
            fleet.speaker(*ip)?.failing.store(*failing, Ordering::Release);
            Ok(if *failing {
                format!("{ip} fails follower queries")
            } else {
                format!("{ip} answers follower queries")
            })
        }

        Step::RoleChange {
            ip,
            from,
            to,
            group,
            leader_uuid,
            leader_ip,
        } => {
            let snapshot = script::role_snapshot(*group, leader_uuid.as_deref(), *leader_ip);
            let changed = registry
                .handle_role_change(*ip, *from, *to, &snapshot)
                .await?;
            let role = match registry.find_by_ip(*ip).await {
                Some(record) => record.role,
                None => Role::Solo,
            };
            Ok(if changed {
                format!("{ip} {from} -> {to}, now {role}")
            } else {
                format!("{ip} {from} -> {to}, unchanged")
            })
        }

        Step::Unregister { device } => {
            let record = find(registry, device).await?;
            registry
                .unregister_device(&Identifier::Id(record.id.clone()))
                .await;
            Ok(format!("unregistered {}", record.id))
        }

        Step::CreateRepresentative { leader, reference } => {
            let leader = find(registry, leader).await?;
            let reference = match reference {
                Some(r) => EntityRef::new(r),
                None => {
                    let Some(rep_id) = leader.id.representative() else {
                        return Err(CliError::Invariant {
                            message: format!("{} is already a group representative", leader.id),
                        });
                    };
                    let mut draft = leader.clone();
                    draft.id = rep_id;
                    draft.role = Role::GroupRepresentative;
                    registry.generate_reference(&draft)
                }
            };
            let rep = registry.create_representative(&leader, reference).await?;
            Ok(format!(
                "representative {} as {}",
                rep.id,
                rep.external_ref.map(|r| r.to_string()).unwrap_or_default()
            ))
        }

        Step::DestroyRepresentative { leader } => {
            let leader = find(registry, leader).await?;
            Ok(if registry.destroy_representative(&leader.id).await {
                format!("destroyed representative of {}", leader.id)
            } else {
                format!("{} had no representative", leader.id)
            })
        }

        Step::PruneRepresentatives => {
            let removed = registry.prune_representatives().await;
            Ok(format!("pruned {}", removed.len()))
        }

        Step::SetReference { device, reference } => {
            let record = find(registry, device).await?;
            let updated = registry
                .update_external_reference(
                    &Identifier::Id(record.id.clone()),
                    reference.as_deref().map(EntityRef::new),
                )
                .await;
            Ok(match (updated, reference) {
                (false, _) => format!("{} not updated", record.id),
                (true, Some(r)) => format!("{} now {r}", record.id),
                (true, None) => format!("{} reference cleared", record.id),
            })
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn config() -> RegistryConfig {
        RegistryConfig {
            reference_domain: "media_player".into(),
            representative_suffix: "group".into(),
            reconcile_timeout: Duration::from_secs(1),
        }
    }

    fn grouping_script() -> Script {
        script::parse(
            std::path::Path::new("s.yaml"),
            "
speakers:
  - ip: 10.0.0.1
    followers: [10.0.0.2]
steps:
  - op: register
    ip: 10.0.0.1
    uuid: u1
    name: Living Room
    reference: media_player.living_room
  - op: register
    ip: 10.0.0.2
    uuid: u2
    name: Kitchen
    reference: media_player.kitchen
  - op: role_change
    ip: 10.0.0.1
    from: solo
    to: leader
  - op: create_representative
    leader: u1
",
        )
        .unwrap()
    }

    async fn run(script: &Script) -> (Registry, Vec<String>) {
        let fleet = Arc::new(ScriptedFleet::from_script(script));
        let registry = Registry::builder(config())
            .controller_lookup(Arc::clone(&fleet) as Arc<dyn ControllerLookup>)
            .build()
            .unwrap();
        let mut outcomes = Vec::new();
        for step in &script.steps {
            outcomes.push(apply(&registry, &fleet, step).await.unwrap());
            registry.verify_topology().await.unwrap();
        }
        (registry, outcomes)
    }

    #[tokio::test]
    async fn script_builds_group_with_generated_representative() {
        let (registry, outcomes) = run(&grouping_script()).await;

        let follower = registry.find_by_uuid("u2").await.unwrap();
        assert_eq!(follower.leader_id, Some(DeviceId::device("u1")));
        assert!(outcomes[2].contains("now leader"));

        let rep = registry
            .get_representative_for(&DeviceId::device("u1"))
            .await
            .unwrap();
        assert_eq!(
            rep.external_ref,
            Some(EntityRef::new("media_player.living_room_group"))
        );

        let groups = collect_groups(&registry).await;
        assert_eq!(groups.len(), 1);
        assert_eq!(
            groups[0].members,
            vec![
                EntityRef::new("media_player.living_room"),
                EntityRef::new("media_player.kitchen")
            ]
        );
    }

    #[tokio::test]
    async fn failing_speaker_leaves_topology_alone() {
        let mut script = grouping_script();
        script.steps.insert(
            2,
            Step::SetFailing {
                ip: ip("10.0.0.1"),
                failing: true,
            },
        );
        script.steps.pop();

        let (registry, outcomes) = run(&script).await;
        assert!(outcomes[3].ends_with("unchanged"));
        assert!(registry.find_by_uuid("u2").await.unwrap().leader_id.is_none());
    }

    #[tokio::test]
    async fn unknown_device_is_not_found() {
        let script = Script::default();
        let fleet = ScriptedFleet::from_script(&script);
        let registry = Registry::new(config()).unwrap();
        let step = Step::Unregister {
            device: "nobody".into(),
        };
        assert!(matches!(
            apply(&registry, &fleet, &step).await,
            Err(CliError::NotFound { .. })
        ));
    }
}
