//! Device registry and multiroom group topology for networked speakers.
//!
//! - **[`Registry`]**: explicitly constructed, cloneable service that owns
//!   every device record and its identity index. All mutations run under
//!   one write lock, so leader/follower links are never observed
//!   half-updated. [`Registry::handle_role_change`] applies reported role
//!   changes and reconciles a leader against its own follower list.
//!
//! - **Identity** ([`model`]): [`DeviceId`] with its structural mapping to
//!   group representatives, [`HardwareAddress`], [`EntityRef`], and the
//!   tagged [`Identifier`] used for lookups.
//!   [`Registry::find_device_str`] keeps the string heuristics for untyped
//!   input at the boundary.
//!
//! - **Collaborators** ([`speaker`]): the poller that owns speaker
//!   connections implements [`SpeakerController`] and, optionally,
//!   [`ControllerLookup`] and [`ReferenceDirectory`].
//!
//! - **[`DeviceStream`]**: subscription to registry snapshots, published
//!   after every mutation.

pub mod config;
pub mod error;
pub mod model;
pub mod naming;
pub mod speaker;
pub mod stream;

mod engine;
mod groups;
mod registry;
mod representative;
mod store;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::RegistryConfig;
pub use error::CoreError;
pub use registry::{Registry, RegistryBuilder};
pub use speaker::{ControllerLookup, ReferenceDirectory, SpeakerController};
pub use stream::{DeviceSnapshot, DeviceStream, DeviceWatchStream};

pub use model::{
    DeviceId, DeviceRecord, EntityRef, FollowerEntry, FollowerList, HardwareAddress, Identifier,
    Role, StatusSnapshot,
};
