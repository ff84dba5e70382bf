// Utility functions to generate consistent keys across the crate.

use uuid::Uuid;

/// Generate a unique artifact identifier: "<prefix>_<uuid hex>".
/// An empty prefix falls back to "export".
pub fn make_artifact_id(prefix: &str) -> String {
    let prefix = prefix.trim();
    let prefix = if prefix.is_empty() { "export" } else { prefix };
    format!("{}_{}", prefix, Uuid::new_v4().simple())
}

/// File name an artifact is published under.
pub fn make_artifact_file_name(artifact_id: &str) -> String {
    format!("{}.geojson", artifact_id)
}

/// Normalize a place name for lookup: trimmed, lowercased, inner whitespace collapsed.
pub fn normalize_place_key(place: &str) -> String {
    place
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}
