//! Walks a built [`Tree`] and the [`RegistrationContext`] it was built
//! against, resolving every name (handler, middleware factory, RPC service)
//! into a concrete value, and compiles the result into a single
//! [`webforge_router::Router`] of fully middleware-wrapped handlers.

use std::rc::Rc;

use webforge_router::{Router, RouterBuilder};

use crate::config::RouteOverrideSet;
use crate::error::Error;
use crate::handler::CanonicalHandler;
use crate::middleware::{self, MiddlewareEntry};
use crate::registry::{RegistrationContext, Service};
use crate::tree::{Group, HandlerRef, MiddlewareRef, RouteDef, ServiceRef, Tree};

/// An RPC service's method dispatch contract, resolved via the
/// [`RegistrationContext::register_rpc_server`] slot. Given the service
/// instance bound to a mount and the `:method` path parameter, dispatches
/// to the appropriate method and populates the response.
#[async_trait::async_trait(?Send)]
pub trait RpcServer {
    async fn dispatch(
        &self,
        service: Rc<dyn Service>,
        method: &str,
        ctx: crate::context::Context,
    ) -> (crate::context::Context, Result<(), Error>);
}

/// The YAML/JSON route-override merge contract (4.9): overlays each
/// config-defined [`crate::config::RouteOverride`]'s non-empty `path`,
/// `middleware`, and `description` onto the code-defined route it names.
/// Every config route MUST match a code route by name — a config-only
/// route is an error, surfaced as [`crate::error::ErrorKind::NotFound`].
/// `handler` is never read from the config side: every code route already
/// carries a concrete handler by construction.
pub fn apply_route_overrides(tree: &mut Tree, overrides: &RouteOverrideSet) -> Result<(), Error> {
    for override_route in &overrides.routes {
        let route = find_named_route_mut(&mut tree.root, &override_route.name).ok_or_else(|| {
            Error::not_found(format!(
                "config route {:?} does not match any code-defined route",
                override_route.name
            ))
        })?;

        if let Some(path) = override_route.path.as_deref() {
            if !path.is_empty() {
                route.path = path.to_owned();
            }
        }

        if !override_route.middleware.is_empty() {
            route.middleware = override_route
                .middleware
                .iter()
                .cloned()
                .map(|name| MiddlewareRef::Named {
                    name,
                    config: serde_json::Value::Null,
                    priority: None,
                })
                .collect();
        }

        if let Some(description) = override_route.description.as_deref() {
            if !description.is_empty() {
                route.description = Some(description.to_owned());
            }
        }
    }

    Ok(())
}

fn find_named_route_mut<'a>(group: &'a mut Group, name: &str) -> Option<&'a mut RouteDef> {
    if let Some(route) = group
        .routes
        .iter_mut()
        .find(|route| route.name.as_deref() == Some(name))
    {
        return Some(route);
    }
    for sub in &mut group.groups {
        if let Some(route) = find_named_route_mut(sub, name) {
            return Some(route);
        }
    }
    None
}

/// Resolves `tree` against `registry`, returning the compiled router ready
/// for the runtime dispatcher. Consumes both `tree` and the registry's
/// handler/middleware-factory tables, matching the "frozen after first
/// request" lifecycle: resolution is a one-time, startup-only step.
pub fn resolve(
    tree: Tree,
    registry: &RegistrationContext,
) -> Result<Router<CanonicalHandler>, Error> {
    let mut builder = Router::build();
    resolve_group(tree.root, Vec::new(), &mut builder, registry)?;
    registry.freeze();
    Ok(builder.finish())
}

/// Resolves one node's own middleware list against the factory table, then
/// prepends (or replaces) the parent's already-resolved list per the
/// `override_parent_mw` rule.
fn resolve_middleware_list(
    parent: Vec<MiddlewareEntry>,
    own: Vec<MiddlewareRef>,
    override_parent_mw: bool,
    registry: &RegistrationContext,
) -> Result<Vec<MiddlewareEntry>, Error> {
    let mut resolved_own = Vec::with_capacity(own.len());
    for (execution_order, entry) in own.into_iter().enumerate() {
        let (middleware, priority) = match entry {
            MiddlewareRef::Inline {
                middleware,
                priority,
            } => (middleware, priority),
            MiddlewareRef::Named {
                name,
                config,
                priority,
            } => {
                let (middleware, default_priority) = registry.resolve_middleware(&name, config)?;
                (middleware, priority.unwrap_or(default_priority))
            }
        };
        resolved_own.push(MiddlewareEntry {
            priority,
            execution_order,
            middleware,
        });
    }

    Ok(middleware::accumulate(&parent, resolved_own, override_parent_mw))
}

fn resolve_route(
    route: RouteDef,
    group_prefix: &str,
    group_mw: &[MiddlewareEntry],
    builder: &mut RouterBuilder<CanonicalHandler>,
    registry: &RegistrationContext,
) -> Result<(), Error> {
    let handler = match route.handler {
        HandlerRef::Inline(handler) => handler,
        HandlerRef::Named(name) => registry
            .take_handler(&name)
            .unwrap_or_else(|| panic!("route handler {name} not found in registry")),
    };

    let route_mw = resolve_middleware_list(
        group_mw.to_vec(),
        route.middleware,
        route.override_parent_mw,
        registry,
    )?;

    let path = crate::tree::join_prefix(group_prefix, &route.path);
    let compiled = middleware::compile(route_mw, handler);
    builder
        .register(&path, route.method, compiled)
        .map_err(|err| Error::internal(err.to_string()))?;
    Ok(())
}

fn resolve_group(
    group: Group,
    parent_mw: Vec<MiddlewareEntry>,
    builder: &mut RouterBuilder<CanonicalHandler>,
    registry: &RegistrationContext,
) -> Result<(), Error> {
    let group_mw = resolve_middleware_list(
        parent_mw,
        group.middleware,
        group.override_parent_mw,
        registry,
    )?;

    for route in group.routes {
        resolve_route(route, &group.prefix, &group_mw, builder, registry)?;
    }

    for mount in group.static_mounts {
        let mount_mw = resolve_middleware_list(
            group_mw.clone(),
            mount.middleware,
            mount.override_parent_mw,
            registry,
        )?;
        let files_mount = Rc::new(webforge_files::Mount::new(
            mount.prefix.clone(),
            mount.spa_mode,
            mount.sources,
        ));
        let handler = static_mount_handler(files_mount);
        let path = format!("{}/*rest", mount.prefix.trim_end_matches('/'));
        let compiled = middleware::compile(mount_mw, handler);
        builder
            .register(&path, webforge_router::RouteMethod::Any, compiled)
            .map_err(|err| Error::internal(err.to_string()))?;
    }

    for mount in group.rpc_mounts {
        let mount_mw = resolve_middleware_list(
            group_mw.clone(),
            mount.middleware,
            mount.override_parent_mw,
            registry,
        )?;
        let ServiceRef::Named(service_name) = mount.service;
        let service = registry.get_service(&service_name)?;
        let rpc_server = registry.rpc_server().ok_or_else(|| {
            log::warn!("no rpc_server registered for RPC mount {}", mount.path);
            Error::factory_not_found(format!(
                "no rpc_server registered for RPC mount {}",
                mount.path
            ))
        })?;
        let handler = rpc_mount_handler(service, rpc_server);
        let path = format!("{}/:method", mount.path.trim_end_matches('/'));
        let compiled = middleware::compile(mount_mw, handler);
        builder
            .register(&path, http::Method::POST.into(), compiled)
            .map_err(|err| Error::internal(err.to_string()))?;
    }

    for proxy in group.proxy_mounts {
        let mount_mw = resolve_middleware_list(
            group_mw.clone(),
            proxy.middleware,
            proxy.override_parent_mw,
            registry,
        )?;
        let transport = registry.proxy_transport().ok_or_else(|| {
            log::warn!("no proxy_transport registered for proxy mount {}", proxy.prefix);
            Error::factory_not_found(format!(
                "no proxy_transport registered for proxy mount {}",
                proxy.prefix
            ))
        })?;
        let target = url::Url::parse(&proxy.target)
            .map_err(|err| Error::internal(format!("invalid reverse proxy target: {err}")))?;
        let handler = proxy_mount_handler(proxy.prefix.clone(), target, transport);
        let path = format!("{}/*rest", proxy.prefix.trim_end_matches('/'));
        let compiled = middleware::compile(mount_mw, handler);
        builder
            .register(&path, webforge_router::RouteMethod::Any, compiled)
            .map_err(|err| Error::internal(err.to_string()))?;
    }

    for mount in group.raw_mounts {
        let path = format!("{}/*rest", mount.prefix.trim_end_matches('/'));
        builder
            .register(&path, webforge_router::RouteMethod::Any, mount.handler)
            .map_err(|err| Error::internal(err.to_string()))?;
    }

    for sub in group.groups {
        resolve_group(sub, group_mw.clone(), builder, registry)?;
    }

    Ok(())
}

fn static_mount_handler(mount: Rc<webforge_files::Mount>) -> CanonicalHandler {
    crate::handler::raw(move |ctx: crate::context::Context| {
        let mount = Rc::clone(&mount);
        async move {
            let mut ctx = ctx;
            match mount.resolve(ctx.path()) {
                Ok(webforge_files::Resolved::File(file))
                | Ok(webforge_files::Resolved::SpaFallback(file)) => {
                    let content_type = file.content_type().clone();
                    match std::fs::read(file.path()) {
                        Ok(bytes) => {
                            ctx.response_mut().bytes(content_type, bytes);
                        }
                        Err(err) => {
                            ctx.response_mut()
                                .status(http::StatusCode::INTERNAL_SERVER_ERROR);
                            ctx.response_mut()
                                .json(serde_json::json!({ "message": err.to_string() }));
                        }
                    }
                }
                Err(_) => {
                    ctx.response_mut().status(http::StatusCode::NOT_FOUND);
                    ctx.response_mut()
                        .json(serde_json::json!({ "message": "not found" }));
                }
            }
            ctx
        }
    })
}

fn rpc_mount_handler(service: Rc<dyn Service>, rpc_server: Rc<dyn RpcServer>) -> CanonicalHandler {
    crate::handler::plain(move |ctx: crate::context::Context| {
        let service = Rc::clone(&service);
        let rpc_server = Rc::clone(&rpc_server);
        async move {
            let method = ctx.path_params().get("method").unwrap_or("").to_owned();
            rpc_server.dispatch(service, &method, ctx).await
        }
    })
}

fn proxy_mount_handler(
    prefix: String,
    target: url::Url,
    transport: Rc<dyn crate::proxy::ProxyTransport>,
) -> CanonicalHandler {
    crate::handler::plain(move |ctx: crate::context::Context| {
        let mount = crate::proxy::ProxyMount::new(prefix.clone(), target.clone());
        let transport = Rc::clone(&transport);
        async move {
            let method = ctx.method().clone();
            let path = ctx.path().to_owned();
            let query = ctx.query_str().to_owned();
            let headers = ctx.headers().clone();
            let body = ctx.body().clone();
            let mut ctx = ctx;
            let result = mount
                .forward_unless_terminal(
                    transport.as_ref(),
                    ctx.response(),
                    method,
                    &path,
                    &query,
                    &headers,
                    body,
                )
                .await;
            match result {
                Ok(_forwarded) => (ctx, Ok(())),
                Err(err) => {
                    ctx.response_mut()
                        .status(http::StatusCode::BAD_GATEWAY);
                    (ctx, Err(err))
                }
            }
        }
    })
}
