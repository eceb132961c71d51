//! Ambient, host-tunable defaults handed to the [`crate::registry::RegistrationContext`]
//! at construction. The core itself never reads a file or an environment
//! variable; a host's YAML/env loader populates this struct and hands it
//! over.

use serde::Deserialize;

use crate::middleware::DEFAULT_PRIORITY;
use crate::registry::PermissionGrant;

/// Host-tunable defaults. `Deserialize`d so a host's config loader can
/// populate it directly from YAML/JSON/env without this crate depending on
/// a config-file format or parser.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Maximum accepted JSON request body size, in bytes.
    pub max_json_body_bytes: usize,
    /// Default middleware priority when a registration omits one.
    pub default_middleware_priority: u8,
    /// Buffer size used when streaming static-mount file bodies.
    pub static_mount_buffer_size: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            max_json_body_bytes: 2 * 1024 * 1024,
            default_middleware_priority: DEFAULT_PRIORITY,
            static_mount_buffer_size: 64 * 1024,
        }
    }
}

/// One entry in a YAML/JSON route-override document: the config-side half
/// of the YAML merge contract (4.9). `path`, `middleware`, and
/// `description` overlay the matching code-defined route's fields when
/// non-empty; `handler` is never read from config (every code route MUST
/// already carry a handler).
#[derive(Debug, Clone, Deserialize)]
pub struct RouteOverride {
    pub name: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub middleware: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// An ordered list of [`RouteOverride`]s, as a host would deserialize one
/// "routes:" YAML document into.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RouteOverrideSet {
    pub routes: Vec<RouteOverride>,
}

/// Returns the full-access grant the root [`crate::registry::RegistrationContext`]
/// is constructed with, per [`RuntimeConfig`]'s "default permission grant
/// for the root context" field.
pub fn default_root_permission() -> PermissionGrant {
    PermissionGrant::root()
}
