//! Temporary/final object key convention
//!
//! An uploaded blob first lives under `temp/<name>`. Committing strips the
//! prefix; a committed key never carries it.

/// Prefix that marks a blob as not yet committed
pub const TEMP_PREFIX: &str = "temp/";

/// Whether `key` names a blob in its temporary location
pub fn is_temporary(key: &str) -> bool {
    key.starts_with(TEMP_PREFIX)
}

/// Temporary key for an object name
pub fn to_temporary(name: &str) -> String {
    if is_temporary(name) {
        name.to_string()
    } else {
        format!("{}{}", TEMP_PREFIX, name)
    }
}

/// Final key for a temporary key. Final keys are returned unchanged.
pub fn to_final(key: &str) -> String {
    let mut current = key;
    while let Some(rest) = current.strip_prefix(TEMP_PREFIX) {
        current = rest;
    }
    current.to_string()
}

/// Generate a fresh object name (`<uuid>_<millis>.json`)
pub fn generate_object_name() -> String {
    format!(
        "{}_{}.json",
        uuid::Uuid::new_v4(),
        chrono::Utc::now().timestamp_millis()
    )
}
