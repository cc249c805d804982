//! Mapping from the Verfügernummer prefix to the region shown in the login dropdown.

/// Prefix length that identifies the regional bank.
pub const PREFIX_LEN: usize = 8;

const REGIONS: &[(&str, &str)] = &[
    ("ELVIE33V", "Burgenland"),
    ("ELOOE03V", "Carinthia"),
    ("ELVIE32V", "Lower Austria"),
    ("ELOOE01V", "Upper Austria"),
    ("ELOOE05V", "Salzburg"),
    ("ELVIE38V", "Styria"),
    ("ELOOE11V", "Tyrol"),
    ("ELVIE37V", "Vorarlberg"),
];

/// Dropdown label for an ELBA ID, matched on its first eight characters.
pub fn region_for_id(elba_id: &str) -> Option<&'static str> {
    let prefix = elba_id.get(..PREFIX_LEN)?.to_ascii_uppercase();
    REGIONS
        .iter()
        .find(|(p, _)| *p == prefix)
        .map(|(_, name)| *name)
}

/// Whether a dropdown option's text refers to `region`.
pub fn option_matches(option_text: &str, region: &str) -> bool {
    option_text
        .to_lowercase()
        .contains(&region.to_lowercase())
}
