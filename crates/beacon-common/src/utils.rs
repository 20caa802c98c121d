//! Small helpers shared by the engine and the server

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Local;
use md5::{Digest, Md5};

use crate::constants::PROPERTIES_SUFFIX;

static RELEASE_KEY_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a release key: `yyyyMMddHHmmss-<hex>`.
///
/// The hex part is derived from the namespace coordinates, the current time and
/// a process-wide counter, so keys are unique within a process.
pub fn generate_release_key(app_id: &str, cluster: &str, namespace: &str) -> String {
    let now = Local::now();
    let counter = RELEASE_KEY_COUNTER.fetch_add(1, Ordering::Relaxed);
    let digest = Md5::digest(
        format!(
            "{}-{}-{}-{}-{}",
            app_id,
            cluster,
            namespace,
            now.timestamp_nanos_opt().unwrap_or_default(),
            counter
        )
        .as_bytes(),
    );
    let hex = const_hex::encode(digest.as_slice());
    format!("{}-{}", now.format("%Y%m%d%H%M%S"), &hex[..16])
}

/// Strip the `.properties` suffix clients may append to a namespace name
pub fn normalize_namespace(namespace: &str) -> &str {
    namespace.strip_suffix(PROPERTIES_SUFFIX).unwrap_or(namespace)
}

/// Current time in milliseconds since the unix epoch
pub fn current_timestamp_ms() -> i64 {
    Local::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_release_key() {
        let key = generate_release_key("app1", "default", "application");
        let (timestamp, hex) = key.split_once('-').unwrap();
        assert_eq!(timestamp.len(), 14);
        assert!(timestamp.chars().all(|c| c.is_ascii_digit()));
        assert_eq!(hex.len(), 16);
    }

    #[test]
    fn test_release_keys_unique() {
        let a = generate_release_key("app1", "default", "application");
        let b = generate_release_key("app1", "default", "application");
        assert_ne!(a, b);
    }

    #[test]
    fn test_normalize_namespace() {
        assert_eq!(normalize_namespace("application.properties"), "application");
        assert_eq!(normalize_namespace("application"), "application");
        assert_eq!(normalize_namespace("config.json"), "config.json");
    }
}
