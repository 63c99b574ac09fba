// ── Domain model ──
//
// Canonical types shared by the store, the group engine and consumers.

pub mod device;
pub mod entity_id;
pub mod status;

pub use device::{DeviceRecord, Role};
pub use entity_id::{DeviceId, EntityRef, HardwareAddress, Identifier};
pub use status::{FollowerEntry, FollowerList, StatusSnapshot};
