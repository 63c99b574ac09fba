// ── Collaborator seams ──
//
// The registry never talks to a speaker itself. Whoever polls the fleet
// implements these traits and keeps the controller objects alive; the
// registry only holds weak references to them.

use std::net::IpAddr;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::error::CoreError;
use crate::model::{EntityRef, FollowerList};

/// Per-device controller owned by the external poller.
pub trait SpeakerController: Send + Sync {
    /// Ask the device for its self-reported follower list.
    ///
    /// The transport's own timeout applies; the registry additionally
    /// bounds the call with `RegistryConfig::reconcile_timeout`.
    fn follower_list(&self) -> BoxFuture<'_, Result<FollowerList, CoreError>>;
}

/// Finds the controller for an address the registry has not seen yet.
pub trait ControllerLookup: Send + Sync {
    fn controller_for_ip(&self, ip: IpAddr) -> Option<Arc<dyn SpeakerController>>;
}

/// Lists the references the surrounding control surface already knows,
/// so new records can be matched to them by name.
pub trait ReferenceDirectory: Send + Sync {
    fn known_references(&self) -> Vec<EntityRef>;
}
