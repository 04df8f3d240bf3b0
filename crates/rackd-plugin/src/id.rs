//! Plugin identifier helpers.
//!
//! Canonical ids have the form `<format>-<name>-<uid hex>`. Clients may also send
//! the four-part form `<format>-<name>-<file hash>-<uid>` used by other hosts; those
//! are converted by dropping the file hash.

const LEGACY_FORMATS: [&str; 3] = ["AudioUnit", "VST", "VST3"];

pub fn create_plugin_id(format: &str, name: &str, uid: u32) -> String {
    format!("{}-{}-{:x}", format, name, uid)
}

/// Convert a four-part id to the canonical form, `None` if `id` is not one.
pub fn convert_legacy_id(id: &str) -> Option<String> {
    let (format, rest) = id.split_once('-')?;
    if !LEGACY_FORMATS.contains(&format) {
        return None;
    }
    let (rest, plugin_id) = rest.rsplit_once('-')?;
    let (name, file_hash) = rest.rsplit_once('-')?;

    let file_hash = file_hash.to_lowercase();
    if !file_hash.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }

    let converted = format!("{}-{}-{}", format, name, plugin_id);
    tracing::debug!("converted legacy plugin id {} to {}", id, converted);
    Some(converted)
}
