// ── Device store ──
//
// Records plus their identity index, mutated only under the registry's
// write lock so cross-record links are never observed half-updated.

mod index;
mod links;
mod registration;
mod table;

pub(crate) use index::IndexKey;
pub(crate) use registration::Registration;
pub(crate) use table::DeviceTable;
