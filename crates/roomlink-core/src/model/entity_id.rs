// ── Core identity types ──
//
// DeviceId, HardwareAddress and EntityRef are the keys the registry
// indexes on. `Identifier` is the tagged lookup key handed to
// `Registry::find_device`; the string heuristics live only in
// `Identifier::candidates`, at the boundary.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

const GROUP_PREFIX: &str = "group:";

// ── DeviceId ────────────────────────────────────────────────────────

/// Primary key of every record in the registry.
///
/// Physical speakers are keyed by their reported UUID. A group
/// representative is keyed by the UUID of the physical leader it
/// stands for, so the two ids map onto each other structurally.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum DeviceId {
    Device(String),
    Group(String),
}

impl DeviceId {
    pub fn device(uuid: impl Into<String>) -> Self {
        Self::Device(uuid.into())
    }

    /// Deterministic id for a speaker that never reported a UUID.
    pub fn fallback_for(ip: IpAddr) -> Self {
        let uuid = Uuid::new_v5(&Uuid::NAMESPACE_URL, format!("roomlink://{ip}").as_bytes());
        Self::Device(uuid.to_string())
    }

    /// Id of the representative standing in for the group this device leads.
    pub fn representative(&self) -> Option<Self> {
        match self {
            Self::Device(uuid) => Some(Self::Group(uuid.clone())),
            Self::Group(_) => None,
        }
    }

    /// Id of the physical leader behind a representative.
    pub fn leader(&self) -> Option<Self> {
        match self {
            Self::Group(uuid) => Some(Self::Device(uuid.clone())),
            Self::Device(_) => None,
        }
    }

    pub fn is_representative(&self) -> bool {
        matches!(self, Self::Group(_))
    }

    /// The underlying UUID string, without the group prefix.
    pub fn uuid(&self) -> &str {
        match self {
            Self::Device(uuid) | Self::Group(uuid) => uuid,
        }
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Device(uuid) => write!(f, "{uuid}"),
            Self::Group(uuid) => write!(f, "{GROUP_PREFIX}{uuid}"),
        }
    }
}

impl FromStr for DeviceId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s.to_owned()))
    }
}

impl From<String> for DeviceId {
    fn from(s: String) -> Self {
        let trimmed = s.trim();
        match trimmed.strip_prefix(GROUP_PREFIX) {
            Some(uuid) => Self::Group(uuid.to_owned()),
            None => Self::Device(trimmed.to_owned()),
        }
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self::from(s.to_owned())
    }
}

impl From<DeviceId> for String {
    fn from(id: DeviceId) -> Self {
        id.to_string()
    }
}

// ── HardwareAddress ─────────────────────────────────────────────────

/// Link-layer address, normalized to lowercase with separators stripped
/// (`aabbccddeeff`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String")]
pub struct HardwareAddress(String);

impl HardwareAddress {
    /// Normalize from any common format: colon, dash, dot-separated or bare hex.
    pub fn new(raw: impl AsRef<str>) -> Self {
        let normalized = raw
            .as_ref()
            .chars()
            .filter(|c| !matches!(c, ':' | '-' | '.') && !c.is_whitespace())
            .collect::<String>()
            .to_lowercase();
        Self(normalized)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether untyped input has the shape of a hardware address.
    pub fn looks_like(raw: &str) -> bool {
        if raw.contains(':') || raw.contains('-') {
            return true;
        }
        let stripped = Self::new(raw);
        stripped.0.len() == 12 && stripped.0.chars().all(|c| c.is_ascii_hexdigit())
    }
}

impl fmt::Display for HardwareAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for HardwareAddress {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl FromStr for HardwareAddress {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

// ── EntityRef ───────────────────────────────────────────────────────

/// Opaque name the surrounding control surface uses to address a record,
/// conventionally `<domain>.<object_id>` (e.g. `media_player.kitchen`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityRef(String);

impl EntityRef {
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn domain(&self) -> Option<&str> {
        self.0.split_once('.').map(|(domain, _)| domain)
    }

    /// The part after the domain, or the whole reference if it has none.
    pub fn object_id(&self) -> &str {
        self.0.split_once('.').map_or(self.0.as_str(), |(_, id)| id)
    }

    pub fn in_domain(&self, domain: &str) -> bool {
        self.domain() == Some(domain)
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EntityRef {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for EntityRef {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

// ── Identifier ──────────────────────────────────────────────────────

/// A lookup key whose addressing scheme is known to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identifier {
    Id(DeviceId),
    Reference(EntityRef),
    Ip(IpAddr),
    HardwareAddress(HardwareAddress),
}

impl Identifier {
    /// Interpretations of untyped input, in the order they should be tried:
    /// id, reference (when it carries `reference_domain`), IP, hardware address.
    pub fn candidates(raw: &str, reference_domain: &str) -> Vec<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Vec::new();
        }

        let mut out = vec![Self::Id(DeviceId::from(raw))];
        let reference = EntityRef::new(raw);
        if reference.in_domain(reference_domain) {
            out.push(Self::Reference(reference));
        }
        if raw.contains('.') || raw.contains(':') {
            if let Ok(ip) = raw.parse::<IpAddr>() {
                out.push(Self::Ip(ip));
            }
        }
        if HardwareAddress::looks_like(raw) {
            out.push(Self::HardwareAddress(HardwareAddress::new(raw)));
        }
        out
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Reference(r) => write!(f, "{r}"),
            Self::Ip(ip) => write!(f, "{ip}"),
            Self::HardwareAddress(hw) => write!(f, "{hw}"),
        }
    }
}

impl From<DeviceId> for Identifier {
    fn from(id: DeviceId) -> Self {
        Self::Id(id)
    }
}

impl From<EntityRef> for Identifier {
    fn from(r: EntityRef) -> Self {
        Self::Reference(r)
    }
}

impl From<IpAddr> for Identifier {
    fn from(ip: IpAddr) -> Self {
        Self::Ip(ip)
    }
}

impl From<HardwareAddress> for Identifier {
    fn from(hw: HardwareAddress) -> Self {
        Self::HardwareAddress(hw)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn representative_id_round_trips_to_leader() {
        let leader = DeviceId::device("u1");
        let rep = leader.representative().unwrap();
        assert!(rep.is_representative());
        assert_eq!(rep.leader().unwrap(), leader);
        assert!(rep.representative().is_none());
    }

    #[test]
    fn device_id_display_and_parse() {
        let rep = DeviceId::Group("u1".into());
        assert_eq!(rep.to_string(), "group:u1");
        let parsed: DeviceId = "group:u1".parse().unwrap();
        assert_eq!(parsed, rep);
        assert_eq!(DeviceId::from("u1"), DeviceId::device("u1"));
    }

    #[test]
    fn fallback_id_is_stable_per_ip() {
        let ip: IpAddr = "10.0.0.7".parse().unwrap();
        let other: IpAddr = "10.0.0.8".parse().unwrap();
        assert_eq!(DeviceId::fallback_for(ip), DeviceId::fallback_for(ip));
        assert_ne!(DeviceId::fallback_for(ip), DeviceId::fallback_for(other));
    }

    #[test]
    fn hardware_address_strips_separators() {
        assert_eq!(HardwareAddress::new("AA:BB:CC:DD:EE:FF").as_str(), "aabbccddeeff");
        assert_eq!(HardwareAddress::new("aa-bb-cc-dd-ee-ff").as_str(), "aabbccddeeff");
        assert_eq!(HardwareAddress::new("aabb.ccdd.eeff").as_str(), "aabbccddeeff");
    }

    #[test]
    fn hardware_address_shape() {
        assert!(HardwareAddress::looks_like("AABBCCDDEEFF"));
        assert!(HardwareAddress::looks_like("aa:bb:cc:dd:ee:ff"));
        assert!(!HardwareAddress::looks_like("kitchen"));
        assert!(!HardwareAddress::looks_like("10.0.0.1"));
    }

    #[test]
    fn entity_ref_parts() {
        let r = EntityRef::new("media_player.kitchen_2");
        assert_eq!(r.domain(), Some("media_player"));
        assert_eq!(r.object_id(), "kitchen_2");
        assert!(r.in_domain("media_player"));
        assert_eq!(EntityRef::new("group_a").object_id(), "group_a");
    }

    #[test]
    fn candidates_follow_resolution_order() {
        let c = Identifier::candidates("10.0.0.1", "media_player");
        assert_eq!(c.len(), 2);
        assert!(matches!(c[0], Identifier::Id(_)));
        assert!(matches!(c[1], Identifier::Ip(_)));

        let c = Identifier::candidates("media_player.kitchen", "media_player");
        assert!(matches!(c[1], Identifier::Reference(_)));
        assert_eq!(c.len(), 2);

        let c = Identifier::candidates("AA:BB:CC:DD:EE:FF", "media_player");
        assert!(matches!(c.last().unwrap(), Identifier::HardwareAddress(_)));

        assert!(Identifier::candidates("  ", "media_player").is_empty());
    }
}
