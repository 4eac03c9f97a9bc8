//! Fixed activity and property catalogs. Submissions referencing identifiers
//! outside these tables are rejected at validation. `restricted` marks
//! activities that gate physical area access and therefore carry a
//! per-submission access code.

#[derive(Debug, Clone, Copy)]
pub struct ActivityInfo {
    pub id: &'static str,
    pub label: &'static str,
    pub restricted: bool,
}

pub const ACTIVITIES: &[ActivityInfo] = &[
    ActivityInfo { id: "archery", label: "Archery", restricted: true },
    ActivityInfo { id: "swimming", label: "Swimming", restricted: false },
    ActivityInfo { id: "hiking", label: "Hiking", restricted: false },
    ActivityInfo { id: "rock-climbing", label: "Rock Climbing", restricted: false },
    ActivityInfo { id: "kayaking", label: "Kayaking", restricted: false },
];

pub const PROPERTIES: &[&str] = &["resort-a", "resort-b"];

pub fn find_activity(id: &str) -> Option<&'static ActivityInfo> {
    ACTIVITIES.iter().find(|a| a.id == id)
}

pub fn is_restricted(id: &str) -> bool {
    find_activity(id).map(|a| a.restricted).unwrap_or(false)
}

pub fn is_known_property(id: &str) -> bool {
    PROPERTIES.contains(&id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archery_is_the_only_restricted_activity() {
        assert!(is_restricted("archery"));
        for a in ACTIVITIES.iter().filter(|a| a.id != "archery") {
            assert!(!a.restricted, "{} must not be restricted", a.id);
        }
    }

    #[test]
    fn unknown_identifiers_are_rejected() {
        assert!(find_activity("base-jumping").is_none());
        assert!(!is_restricted("base-jumping"));
        assert!(!is_known_property("resort-z"));
    }
}
