// ── Reference naming ──
//
// Deterministic slugs for display names and the name-pattern match used
// to pair records with references created elsewhere.

use crate::config::RegistryConfig;
use crate::model::{DeviceRecord, EntityRef, Role};

/// Lowercase `name`, collapsing every run of non-alphanumerics into one `_`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_sep = false;
    for c in name.chars() {
        if c.is_alphanumeric() {
            if pending_sep && !slug.is_empty() {
                slug.push('_');
            }
            pending_sep = false;
            slug.extend(c.to_lowercase());
        } else {
            pending_sep = true;
        }
    }
    slug
}

/// Reference a control surface would assign to `record`.
pub fn generate_reference(record: &DeviceRecord, config: &RegistryConfig) -> EntityRef {
    let mut object_id = slugify(&record.display_name);
    if object_id.is_empty() {
        object_id = slugify(record.id.uuid());
    }
    if record.role == Role::GroupRepresentative {
        object_id.push('_');
        object_id.push_str(&slugify(&config.representative_suffix));
    }
    EntityRef::new(format!("{}.{object_id}", config.reference_domain))
}

/// Whether `reference` names a device called `display_name`: its object id
/// is the slug of the name, optionally followed by a `_<digits>` suffix.
pub fn reference_matches(reference: &EntityRef, display_name: &str) -> bool {
    let slug = slugify(display_name);
    if slug.is_empty() {
        return false;
    }
    let object_id = reference.object_id();
    if object_id == slug {
        return true;
    }
    object_id
        .strip_prefix(slug.as_str())
        .and_then(|rest| rest.strip_prefix('_'))
        .is_some_and(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DeviceId;

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("Living Room"), "living_room");
        assert_eq!(slugify("  Kitchen -- Speaker!  "), "kitchen_speaker");
        assert_eq!(slugify("Küche"), "küche");
        assert_eq!(slugify("---"), "");
    }

    #[test]
    fn generated_reference_marks_representatives() {
        let cfg = RegistryConfig::default();
        let mut rec = DeviceRecord::new(DeviceId::device("u1"), "Living Room".into(), Role::Solo);
        assert_eq!(generate_reference(&rec, &cfg).as_str(), "media_player.living_room");

        rec.id = DeviceId::Group("u1".into());
        rec.role = Role::GroupRepresentative;
        assert_eq!(
            generate_reference(&rec, &cfg).as_str(),
            "media_player.living_room_group"
        );
    }

    #[test]
    fn nameless_record_falls_back_to_uuid() {
        let cfg = RegistryConfig::default();
        let rec = DeviceRecord::new(DeviceId::device("AB-12"), String::new(), Role::Solo);
        assert_eq!(generate_reference(&rec, &cfg).as_str(), "media_player.ab_12");
    }

    #[test]
    fn reference_matching_accepts_numeric_suffix() {
        let r = EntityRef::new("media_player.living_room_2");
        assert!(reference_matches(&r, "Living Room"));
        assert!(reference_matches(&EntityRef::new("media_player.living_room"), "Living Room"));
        assert!(!reference_matches(&EntityRef::new("media_player.living_room_tv"), "Living Room"));
        assert!(!reference_matches(&r, ""));
    }
}
