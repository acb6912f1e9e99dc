//! Advertised beacon name parsing.
//!
//! Zone beacons advertise names of the form `<prefix>-<location>-<id>` or
//! `<prefix>-<location>-<zone>-<id>`, e.g. `PetZone-Home-01` or
//! `PetZone-Home-Living-01`.

use serde::{Deserialize, Serialize};

/// Default advertised-name prefix for zone beacons.
pub const DEFAULT_NAME_PREFIX: &str = "PetZone";

const UNKNOWN_LOCATION: &str = "Unknown";
const UNKNOWN_ID: &str = "00";

/// Location metadata extracted from an advertised name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeaconName {
    /// Location segment, or `Unknown` for names outside the convention.
    pub location: String,

    /// Optional sub-zone within the location.
    pub zone: Option<String>,

    /// Trailing identifier segment.
    pub beacon_id: String,
}

impl BeaconName {
    /// Parse `name` against the `<prefix>-...` convention.
    #[must_use]
    pub fn parse(name: &str, prefix: &str) -> Self {
        let Some(rest) = name
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_prefix('-'))
            .filter(|rest| !rest.is_empty())
        else {
            return Self {
                location: UNKNOWN_LOCATION.to_string(),
                zone: None,
                beacon_id: trailing_id(name),
            };
        };

        let segments: Vec<&str> = rest.split('-').collect();
        match segments.as_slice() {
            [location] => Self::from_parts(location, None, UNKNOWN_ID),
            [location, id] => Self::from_parts(location, None, id),
            [location, zone, .., id] => Self::from_parts(location, Some(*zone), id),
            [] => Self::from_parts(UNKNOWN_LOCATION, None, UNKNOWN_ID),
        }
    }

    fn from_parts(location: &str, zone: Option<&str>, id: &str) -> Self {
        Self {
            location: location.to_string(),
            zone: zone.filter(|z| !z.is_empty()).map(str::to_string),
            beacon_id: if id.is_empty() { UNKNOWN_ID } else { id }.to_string(),
        }
    }
}

fn trailing_id(name: &str) -> String {
    match name.rsplit_once('-') {
        Some((head, id)) if !head.is_empty() && !id.is_empty() => id.to_string(),
        _ => UNKNOWN_ID.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_and_id() {
        let parsed = BeaconName::parse("PetZone-Home-01", DEFAULT_NAME_PREFIX);
        assert_eq!(parsed.location, "Home");
        assert_eq!(parsed.zone, None);
        assert_eq!(parsed.beacon_id, "01");
    }

    #[test]
    fn test_hierarchical_name() {
        let parsed = BeaconName::parse("PetZone-Home-Living-07", DEFAULT_NAME_PREFIX);
        assert_eq!(parsed.location, "Home");
        assert_eq!(parsed.zone.as_deref(), Some("Living"));
        assert_eq!(parsed.beacon_id, "07");
    }

    #[test]
    fn test_location_only() {
        let parsed = BeaconName::parse("PetZone-Garden", DEFAULT_NAME_PREFIX);
        assert_eq!(parsed.location, "Garden");
        assert_eq!(parsed.beacon_id, "00");
    }

    #[test]
    fn test_foreign_name() {
        let parsed = BeaconName::parse("Tile-42", DEFAULT_NAME_PREFIX);
        assert_eq!(parsed.location, "Unknown");
        assert_eq!(parsed.beacon_id, "42");

        let bare = BeaconName::parse("PetZone", DEFAULT_NAME_PREFIX);
        assert_eq!(bare.location, "Unknown");
        assert_eq!(bare.beacon_id, "00");
    }

    #[test]
    fn test_custom_prefix() {
        let parsed = BeaconName::parse("Dock-Kitchen-3", "Dock");
        assert_eq!(parsed.location, "Kitchen");
        assert_eq!(parsed.beacon_id, "3");
    }
}
