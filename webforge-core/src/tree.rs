//! The route tree: a fluent builder over nested groups, verb-attached
//! routes, and static/proxy/RPC mounts, resolved by [`crate::resolver`] into
//! a [`webforge_router::Router`] of compiled handlers.

use std::rc::Rc;

use http::Method;
use webforge_router::RouteMethod;

use crate::handler::CanonicalHandler;
use crate::middleware::Middleware;

/// A handler attached to a route: either resolved inline at registration
/// time, or deferred to a name looked up in the registry (4.9).
pub enum HandlerRef {
    Named(String),
    Inline(CanonicalHandler),
}

/// A middleware attached to a route or group: either resolved inline, or a
/// factory name plus the opaque configuration to invoke it with.
pub enum MiddlewareRef {
    Named {
        name: String,
        config: serde_json::Value,
        priority: Option<u8>,
    },
    Inline {
        middleware: Rc<dyn Middleware>,
        priority: u8,
    },
}

/// A service reference for an RPC mount: either an inline instance handle
/// (by name, already registered) or a name to resolve later.
pub enum ServiceRef {
    Named(String),
}

pub struct RouteDef {
    pub method: RouteMethod,
    pub path: String,
    pub handler: HandlerRef,
    pub override_parent_mw: bool,
    pub middleware: Vec<MiddlewareRef>,
    /// The name a YAML/JSON route-override document refers to this route
    /// by (4.9's merge contract). Unnamed routes are simply unreachable by
    /// config overrides.
    pub name: Option<String>,
    /// Overlaid by a matching config route's non-empty `description`.
    pub description: Option<String>,
}

impl RouteDef {
    /// Gives this route a name a config-side [`crate::config::RouteOverride`]
    /// can refer to.
    pub fn named(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = Some(name.into());
        self
    }
}

pub struct StaticMount {
    pub prefix: String,
    pub spa_mode: bool,
    pub sources: Vec<std::path::PathBuf>,
    pub override_parent_mw: bool,
    pub middleware: Vec<MiddlewareRef>,
}

pub struct ProxyMount {
    pub prefix: String,
    pub target: String,
    pub override_parent_mw: bool,
    pub middleware: Vec<MiddlewareRef>,
}

pub struct RpcMount {
    pub path: String,
    pub service: ServiceRef,
    pub override_parent_mw: bool,
    pub middleware: Vec<MiddlewareRef>,
}

/// Middleware composition proceeds as for routes (4.6/4.3): attach inline
/// or named middleware and optionally override the parent group's list
/// rather than prepend to it. Implemented identically on each mount type so
/// `mount_static`/`mount_reverse_proxy`/`mount_rpc_service`'s returned
/// `&mut _` all support the same builder calls `RouteDef` does.
macro_rules! impl_mount_middleware {
    ($ty:ty) => {
        impl $ty {
            pub fn use_mw(&mut self, middleware: Rc<dyn Middleware>, priority: u8) -> &mut Self {
                self.middleware.push(MiddlewareRef::Inline {
                    middleware,
                    priority,
                });
                self
            }

            pub fn use_named_mw(
                &mut self,
                name: impl Into<String>,
                config: serde_json::Value,
            ) -> &mut Self {
                self.middleware.push(MiddlewareRef::Named {
                    name: name.into(),
                    config,
                    priority: None,
                });
                self
            }

            pub fn with_override_middleware(&mut self, override_parent_mw: bool) -> &mut Self {
                self.override_parent_mw = override_parent_mw;
                self
            }
        }
    };
}

impl_mount_middleware!(StaticMount);
impl_mount_middleware!(ProxyMount);
impl_mount_middleware!(RpcMount);

pub struct RawMount {
    pub prefix: String,
    pub handler: CanonicalHandler,
    pub strip_prefix: bool,
}

/// A subtree: a prefix, its own middleware list, and the routes/mounts/
/// sub-groups attached directly to it. Groups form a tree with a single
/// unnamed root (held by [`Tree`]).
#[derive(Default)]
pub struct Group {
    pub prefix: String,
    pub override_parent_mw: bool,
    pub middleware: Vec<MiddlewareRef>,
    pub routes: Vec<RouteDef>,
    pub groups: Vec<Group>,
    pub static_mounts: Vec<StaticMount>,
    pub proxy_mounts: Vec<ProxyMount>,
    pub rpc_mounts: Vec<RpcMount>,
    pub raw_mounts: Vec<RawMount>,
}

/// Joins a group prefix and a route segment with a single `/`, trimming
/// surrounding slashes from each side first. A trailing `/` on `segment` is
/// preserved — it marks a prefix-catchall route.
pub fn join_prefix(prefix: &str, segment: &str) -> String {
    let prefix = prefix.trim_matches('/');
    let trailing_slash = segment.ends_with('/') && segment.len() > 1;
    let segment_trimmed = segment.trim_matches('/');

    let mut joined = String::new();
    joined.push('/');
    if !prefix.is_empty() {
        joined.push_str(prefix);
    }
    if !segment_trimmed.is_empty() {
        if !prefix.is_empty() {
            joined.push('/');
        }
        joined.push_str(segment_trimmed);
    }
    if trailing_slash && !joined.ends_with('/') {
        joined.push('/');
    }
    joined
}

impl Group {
    fn new(prefix: impl Into<String>) -> Self {
        Group {
            prefix: prefix.into(),
            ..Default::default()
        }
    }

    fn attach(&mut self, method: RouteMethod, path: &str, handler: HandlerRef) -> &mut RouteDef {
        self.routes.push(RouteDef {
            method,
            path: path.to_owned(),
            handler,
            override_parent_mw: false,
            middleware: Vec::new(),
            name: None,
            description: None,
        });
        self.routes.last_mut().unwrap()
    }

    pub fn get(&mut self, path: &str, handler: HandlerRef) -> &mut RouteDef {
        self.attach(Method::GET.into(), path, handler)
    }

    pub fn post(&mut self, path: &str, handler: HandlerRef) -> &mut RouteDef {
        self.attach(Method::POST.into(), path, handler)
    }

    pub fn put(&mut self, path: &str, handler: HandlerRef) -> &mut RouteDef {
        self.attach(Method::PUT.into(), path, handler)
    }

    pub fn patch(&mut self, path: &str, handler: HandlerRef) -> &mut RouteDef {
        self.attach(Method::PATCH.into(), path, handler)
    }

    pub fn delete(&mut self, path: &str, handler: HandlerRef) -> &mut RouteDef {
        self.attach(Method::DELETE.into(), path, handler)
    }

    pub fn handle(&mut self, method: RouteMethod, path: &str, handler: HandlerRef) -> &mut RouteDef {
        self.attach(method, path, handler)
    }

    pub fn use_mw(&mut self, middleware: Rc<dyn Middleware>, priority: u8) {
        self.middleware.push(MiddlewareRef::Inline {
            middleware,
            priority,
        });
    }

    pub fn use_named_mw(&mut self, name: impl Into<String>, config: serde_json::Value) {
        self.middleware.push(MiddlewareRef::Named {
            name: name.into(),
            config,
            priority: None,
        });
    }

    pub fn with_override_middleware(&mut self, override_parent_mw: bool) -> &mut Self {
        self.override_parent_mw = override_parent_mw;
        self
    }

    /// Opens (or reopens) a named subtree under `prefix`.
    pub fn group(&mut self, prefix: &str) -> &mut Group {
        let joined = join_prefix(&self.prefix, prefix);
        self.groups.push(Group::new(joined));
        self.groups.last_mut().unwrap()
    }

    /// Same as [`Group::group`], but runs `f` against the new subtree
    /// immediately — the block form of grouping.
    pub fn group_block(&mut self, prefix: &str, f: impl FnOnce(&mut Group)) {
        let sub = self.group(prefix);
        f(sub);
    }

    pub fn mount_static(
        &mut self,
        prefix: &str,
        spa_mode: bool,
        sources: Vec<std::path::PathBuf>,
    ) -> &mut StaticMount {
        self.static_mounts.push(StaticMount {
            prefix: join_prefix(&self.prefix, prefix),
            spa_mode,
            sources,
            override_parent_mw: false,
            middleware: Vec::new(),
        });
        self.static_mounts.last_mut().unwrap()
    }

    pub fn mount_reverse_proxy(&mut self, prefix: &str, target: impl Into<String>) -> &mut ProxyMount {
        self.proxy_mounts.push(ProxyMount {
            prefix: join_prefix(&self.prefix, prefix),
            target: target.into(),
            override_parent_mw: false,
            middleware: Vec::new(),
        });
        self.proxy_mounts.last_mut().unwrap()
    }

    pub fn mount_rpc_service(&mut self, path: &str, service: ServiceRef) -> &mut RpcMount {
        self.rpc_mounts.push(RpcMount {
            path: join_prefix(&self.prefix, path),
            service,
            override_parent_mw: false,
            middleware: Vec::new(),
        });
        self.rpc_mounts.last_mut().unwrap()
    }

    pub fn mount_raw_handler(&mut self, prefix: &str, handler: CanonicalHandler, strip_prefix: bool) {
        self.raw_mounts.push(RawMount {
            prefix: join_prefix(&self.prefix, prefix),
            handler,
            strip_prefix,
        });
    }

    /// Merges `other`'s routes, groups, and mounts into this group. Does
    /// not merge `other`'s own top-level middleware list — only its
    /// children's attachments are copied in.
    pub fn add_router(&mut self, other: Group) {
        self.routes.extend(other.routes);
        self.groups.extend(other.groups);
        self.static_mounts.extend(other.static_mounts);
        self.proxy_mounts.extend(other.proxy_mounts);
        self.rpc_mounts.extend(other.rpc_mounts);
        self.raw_mounts.extend(other.raw_mounts);
    }

    /// Lists every concrete `(method, path)` pair reachable from this
    /// group, depth-first, prefixed with its own path.
    pub fn dump_routes(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.dump_into(&mut out);
        out
    }

    fn dump_into(&self, out: &mut Vec<String>) {
        for route in &self.routes {
            let method = match &route.method {
                RouteMethod::Any => "ANY".to_owned(),
                RouteMethod::Verb(m) => m.to_string(),
            };
            out.push(format!("{method} {}", join_prefix(&self.prefix, &route.path)));
        }
        for mount in &self.static_mounts {
            out.push(format!("STATIC {}", mount.prefix));
        }
        for mount in &self.proxy_mounts {
            out.push(format!("PROXY {} -> {}", mount.prefix, mount.target));
        }
        for mount in &self.rpc_mounts {
            out.push(format!("RPC {}/:method", mount.path));
        }
        for group in &self.groups {
            group.dump_into(out);
        }
    }
}

/// The whole route tree: a single unnamed root group.
pub struct Tree {
    pub root: Group,
}

impl Default for Tree {
    fn default() -> Self {
        Tree {
            root: Group::new(""),
        }
    }
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }
}

impl std::ops::Deref for Tree {
    type Target = Group;

    fn deref(&self) -> &Group {
        &self.root
    }
}

impl std::ops::DerefMut for Tree {
    fn deref_mut(&mut self) -> &mut Group {
        &mut self.root
    }
}
