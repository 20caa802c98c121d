//! Well-known constants shared by the release engine and its surfaces

/// Name of the fallback cluster every application owns
pub const DEFAULT_CLUSTER_NAME: &str = "default";

/// Separator between the parts of a watch key
pub const CLUSTER_NAMESPACE_SEPARATOR: &str = "+";

/// Notification id reported when no change log row exists for a key
pub const NOTIFICATION_ID_PLACEHOLDER: i64 = -1;

/// Wildcard entry in a gray rule IP list
pub const ALL_IP: &str = "*";

/// App id used by clients that have not been assigned one
pub const NO_APPID_PLACEHOLDER: &str = "BeaconNoAppIdPlaceHolder";

/// The single channel release messages are published on
pub const RELEASE_MESSAGE_TOPIC: &str = "beacon-release";

/// Namespace suffix stripped from client requests
pub const PROPERTIES_SUFFIX: &str = ".properties";

/// Gray rule payload used when a branch is deleted or merged
pub const EMPTY_GRAY_RULES: &str = "[]";
