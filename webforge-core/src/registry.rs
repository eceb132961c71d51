//! The Registration Context: the three keyed tables (services, handlers,
//! middleware factories), the permission grant, and the freeze-after-first-
//! request lifecycle.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::Error;
use crate::handler::CanonicalHandler;
use crate::middleware::Middleware;
use crate::proxy::ProxyTransport;
use crate::resolver::RpcServer;

/// Tracks requests in flight so [`RegistrationContext::shutdown_all_services`]
/// can wait for them (up to a deadline) before forcing cancellation — 5's
/// "`ShutdownAllServices` waits for all in-flight requests to complete up to
/// a configured deadline, then forces cancellation and proceeds with service
/// shutdown". Mirrors `actix-utils`'s `Counter`/`CounterGuard` (RAII
/// increment/decrement, wake waiters when the count returns to the target),
/// adapted to async wakeup via [`tokio::sync::Notify`] instead of the
/// futures-0.1 `AtomicTask`.
#[derive(Clone)]
pub struct InFlightTracker(Rc<InFlightInner>);

impl Default for InFlightTracker {
    fn default() -> Self {
        InFlightTracker::new()
    }
}

struct InFlightInner {
    count: Cell<usize>,
    drained: tokio::sync::Notify,
    shutdown: CancellationToken,
}

impl InFlightTracker {
    /// A standalone tracker not wired to any [`RegistrationContext`] —
    /// [`crate::dispatcher::Dispatcher::new`]'s default before
    /// `with_in_flight_tracking` attaches a real one.
    pub fn new() -> Self {
        InFlightTracker(Rc::new(InFlightInner {
            count: Cell::new(0),
            drained: tokio::sync::Notify::new(),
            shutdown: CancellationToken::new(),
        }))
    }

    /// Acquired once per dispatched request; held until the request
    /// completes.
    pub fn acquire(&self) -> InFlightGuard {
        self.0.count.set(self.0.count.get() + 1);
        InFlightGuard(Rc::clone(&self.0))
    }

    /// A per-request cancellation token should be a child of this: a forced
    /// shutdown cancels every outstanding child without disturbing requests
    /// that already completed.
    pub fn shutdown_signal(&self) -> CancellationToken {
        self.0.shutdown.child_token()
    }

    pub fn count(&self) -> usize {
        self.0.count.get()
    }

    async fn wait_for_drain(&self) {
        while self.0.count.get() > 0 {
            self.0.drained.notified().await;
        }
    }

    fn force(&self) {
        self.0.shutdown.cancel();
    }
}

pub struct InFlightGuard(Rc<InFlightInner>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let remaining = self.0.count.get() - 1;
        self.0.count.set(remaining);
        if remaining == 0 {
            self.0.drained.notify_waiters();
        }
    }
}

/// A registered service instance, type-erased so the table can hold any
/// concrete type.
pub trait Service: Any {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> Service for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A service that must release resources at shutdown. Closing is
/// idempotent: `ShutdownAllServices` may call it exactly once per service,
/// but implementers should tolerate repeated calls defensively.
#[async_trait::async_trait(?Send)]
pub trait Shutdownable {
    async fn shutdown(&self) -> Result<(), Error>;
}

type ServiceFactory = Rc<dyn Fn(serde_json::Value) -> Result<Rc<dyn Service>, Error>>;
type MiddlewareFactory = Rc<dyn Fn(serde_json::Value) -> Result<(Rc<dyn Middleware>, u8), Error>>;

/// `{allowed-get-services, may-register-handler, may-register-middleware,
/// may-register-service, may-create-permission-context, context-settings}`.
/// Sub-contexts inherit nothing by default; [`RegistrationContext::child`]
/// constructs them explicitly.
#[derive(Clone)]
pub struct PermissionGrant {
    pub allowed_get_services: AllowList,
    pub may_register_handler: bool,
    pub may_register_middleware: bool,
    pub may_register_service: bool,
    pub may_create_permission_context: bool,
    pub context_settings: HashMap<String, serde_json::Value>,
}

impl PermissionGrant {
    /// Full access, no restrictions — the grant the root registration
    /// context is constructed with.
    pub fn root() -> Self {
        PermissionGrant {
            allowed_get_services: AllowList::All,
            may_register_handler: true,
            may_register_middleware: true,
            may_register_service: true,
            may_create_permission_context: true,
            context_settings: HashMap::new(),
        }
    }
}

#[derive(Clone)]
pub enum AllowList {
    All,
    Names(Vec<String>),
}

impl AllowList {
    fn allows(&self, name: &str) -> bool {
        match self {
            AllowList::All => true,
            AllowList::Names(names) => names.iter().any(|n| n == name),
        }
    }
}

/// The three keyed tables plus the permission grant and freeze flag. Used
/// only during startup on a single thread; after the first request it is
/// effectively read-only, and mutation after freeze panics.
pub struct RegistrationContext {
    services: RefCell<HashMap<String, Rc<dyn Service>>>,
    service_factories: RefCell<HashMap<String, ServiceFactory>>,
    handlers: RefCell<HashMap<String, CanonicalHandler>>,
    raw_handlers: RefCell<HashMap<String, CanonicalHandler>>,
    middleware_factories: RefCell<HashMap<String, (MiddlewareFactory, u8)>>,
    loaded_modules: RefCell<std::collections::HashSet<String>>,
    shutdown_hooks: RefCell<Vec<(String, Rc<dyn Shutdownable>)>>,
    rpc_server: RefCell<Option<Rc<dyn RpcServer>>>,
    proxy_transport: RefCell<Option<Rc<dyn ProxyTransport>>>,
    in_flight: InFlightTracker,
    permission: PermissionGrant,
    frozen: AtomicBool,
}

impl RegistrationContext {
    pub fn new(permission: PermissionGrant) -> Self {
        RegistrationContext {
            services: RefCell::new(HashMap::new()),
            service_factories: RefCell::new(HashMap::new()),
            handlers: RefCell::new(HashMap::new()),
            raw_handlers: RefCell::new(HashMap::new()),
            middleware_factories: RefCell::new(HashMap::new()),
            loaded_modules: RefCell::new(std::collections::HashSet::new()),
            shutdown_hooks: RefCell::new(Vec::new()),
            rpc_server: RefCell::new(None),
            proxy_transport: RefCell::new(None),
            in_flight: InFlightTracker::new(),
            permission,
            frozen: AtomicBool::new(false),
        }
    }

    /// A clone of the tracker a [`crate::dispatcher::Dispatcher`] should
    /// register in-flight requests against via
    /// `Dispatcher::with_in_flight_tracking`, so that
    /// [`RegistrationContext::shutdown_all_services`] knows what it's
    /// waiting on.
    pub fn in_flight(&self) -> InFlightTracker {
        self.in_flight.clone()
    }

    /// Called once, by the dispatcher, on the first request. Subsequent
    /// calls are no-ops.
    pub fn freeze(&self) {
        self.frozen.store(true, Ordering::Release);
    }

    fn check_not_frozen(&self, action: &str) {
        if self.frozen.load(Ordering::Acquire) {
            panic!("registration context: cannot {action} after freeze");
        }
    }

    pub fn register_service(
        &self,
        name: impl Into<String>,
        value: Rc<dyn Service>,
        allow_replace: bool,
    ) -> Result<(), Error> {
        self.check_not_frozen("register_service");
        if !self.permission.may_register_service {
            return Err(Error::not_allowed("register_service denied by permission grant"));
        }
        let name = name.into();
        let mut services = self.services.borrow_mut();
        if !allow_replace && services.contains_key(&name) {
            return Err(Error::already_exists(format!("service {name} already registered")));
        }
        log::debug!("registering service {name}");
        services.insert(name, value);
        Ok(())
    }

    pub fn register_service_factory(
        &self,
        name: impl Into<String>,
        factory: ServiceFactory,
    ) -> Result<(), Error> {
        self.check_not_frozen("register_service_factory");
        if !self.permission.may_register_service {
            return Err(Error::not_allowed(
                "register_service_factory denied by permission grant",
            ));
        }
        let name = name.into();
        log::debug!("registering service factory {name}");
        self.service_factories.borrow_mut().insert(name, factory);
        Ok(())
    }

    pub fn create_service(
        &self,
        factory_name: &str,
        name: impl Into<String>,
        allow_replace: bool,
        config: serde_json::Value,
    ) -> Result<(), Error> {
        let factory = self
            .service_factories
            .borrow()
            .get(factory_name)
            .cloned()
            .ok_or_else(|| Error::factory_not_found(format!("service factory {factory_name}")))?;
        let instance = factory(config)?;
        self.register_service(name, instance, allow_replace)
    }

    pub fn get_or_create_service(
        &self,
        factory_name: &str,
        name: &str,
        config: serde_json::Value,
    ) -> Result<Rc<dyn Service>, Error> {
        if let Some(existing) = self.services.borrow().get(name) {
            return Ok(Rc::clone(existing));
        }
        self.create_service(factory_name, name, false, config)?;
        self.get_service(name)
    }

    pub fn get_service(&self, name: &str) -> Result<Rc<dyn Service>, Error> {
        if !self.permission.allowed_get_services.allows(name) {
            return Err(Error::not_allowed(format!("get_service({name}) denied by permission grant")));
        }
        self.services
            .borrow()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("service {name}")))
    }

    pub fn register_handler(&self, name: impl Into<String>, handler: CanonicalHandler) -> Result<(), Error> {
        self.check_not_frozen("register_handler");
        if !self.permission.may_register_handler {
            return Err(Error::not_allowed("register_handler denied by permission grant"));
        }
        let name = name.into();
        log::debug!("registering handler {name}");
        self.handlers.borrow_mut().insert(name, handler);
        Ok(())
    }

    pub fn register_raw_handler(&self, name: impl Into<String>, handler: CanonicalHandler) -> Result<(), Error> {
        self.check_not_frozen("register_raw_handler");
        if !self.permission.may_register_handler {
            return Err(Error::not_allowed("register_raw_handler denied by permission grant"));
        }
        let name = name.into();
        log::debug!("registering raw handler {name}");
        self.raw_handlers.borrow_mut().insert(name, handler);
        Ok(())
    }

    pub fn take_handler(&self, name: &str) -> Option<CanonicalHandler> {
        self.handlers.borrow_mut().remove(name)
    }

    pub fn take_raw_handler(&self, name: &str) -> Option<CanonicalHandler> {
        self.raw_handlers.borrow_mut().remove(name)
    }

    pub fn register_middleware_factory(
        &self,
        name: impl Into<String>,
        factory: MiddlewareFactory,
        priority: Option<u8>,
    ) -> Result<(), Error> {
        self.check_not_frozen("register_middleware_factory");
        if !self.permission.may_register_middleware {
            return Err(Error::not_allowed(
                "register_middleware_factory denied by permission grant",
            ));
        }
        let name = name.into();
        log::debug!("registering middleware factory {name}");
        self.middleware_factories
            .borrow_mut()
            .insert(name, (factory, priority.unwrap_or(crate::middleware::DEFAULT_PRIORITY)));
        Ok(())
    }

    pub fn resolve_middleware(
        &self,
        name: &str,
        config: serde_json::Value,
    ) -> Result<(Rc<dyn Middleware>, u8), Error> {
        let (factory, default_priority) = self
            .middleware_factories
            .borrow()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::factory_not_found(format!("middleware factory {name}")))?;
        let (middleware, priority) = factory(config)?;
        let _ = default_priority;
        Ok((middleware, priority))
    }

    /// Loads a module by name, deduplicating silently (logged at `debug`)
    /// if already loaded.
    pub fn register_module(&self, name: impl Into<String>, loader: impl FnOnce(&RegistrationContext)) {
        let name = name.into();
        if !self.loaded_modules.borrow_mut().insert(name.clone()) {
            log::debug!("module {name} already loaded, skipping");
            return;
        }
        log::debug!("loading module {name}");
        loader(self);
    }

    /// Registers a service's shutdown hook, so that it is closed by
    /// [`RegistrationContext::shutdown_all_services`]. A service implementing
    /// [`Shutdownable`] is registered once via [`RegistrationContext::register_service`]
    /// (for lookup) and once here (for the shutdown-capable variant of the
    /// same `Rc`).
    pub fn register_shutdown_hook(&self, name: impl Into<String>, service: Rc<dyn Shutdownable>) {
        self.shutdown_hooks.borrow_mut().push((name.into(), service));
    }

    /// Waits for in-flight requests to drain (up to `deadline`), forcing
    /// cancellation of any still outstanding, then closes every registered
    /// [`Shutdownable`] service. Shutdown hooks run sequentially in
    /// registration order; errors from each are aggregated into a single
    /// composite error rather than short-circuiting the rest.
    pub async fn shutdown_all_services(&self, deadline: Duration) -> Result<(), Error> {
        if self.in_flight.count() > 0 {
            log::info!(
                "shutdown: waiting up to {deadline:?} for {} in-flight request(s)",
                self.in_flight.count()
            );
            if tokio::time::timeout(deadline, self.in_flight.wait_for_drain())
                .await
                .is_err()
            {
                log::warn!(
                    "shutdown: deadline elapsed with {} request(s) still in flight, forcing cancellation",
                    self.in_flight.count()
                );
                self.in_flight.force();
            }
        }

        let hooks: Vec<_> = self.shutdown_hooks.borrow_mut().drain(..).collect();
        let mut errors = Vec::new();
        for (name, hook) in hooks {
            if let Err(err) = hook.shutdown().await {
                log::error!("service {name} failed to shut down: {err}");
                errors.push(format!("{name}: {err}"));
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::internal(format!(
                "service shutdown errors: {}",
                errors.join("; ")
            )))
        }
    }

    /// Registers the `rpc_server` dispatcher every RPC mount resolves
    /// through. A host that never calls this leaves RPC mounts unresolvable
    /// (4.9: "resolves an `rpc_server` service via the registry, creating
    /// it from a default factory if absent" — the default factory is a
    /// host concern; this crate has no built-in RPC dispatch).
    pub fn register_rpc_server(&self, server: Rc<dyn RpcServer>) {
        self.check_not_frozen("register_rpc_server");
        *self.rpc_server.borrow_mut() = Some(server);
    }

    pub fn rpc_server(&self) -> Option<Rc<dyn RpcServer>> {
        self.rpc_server.borrow().clone()
    }

    /// Registers the transport every reverse-proxy mount forwards through.
    pub fn register_proxy_transport(&self, transport: Rc<dyn ProxyTransport>) {
        self.check_not_frozen("register_proxy_transport");
        *self.proxy_transport.borrow_mut() = Some(transport);
    }

    pub fn proxy_transport(&self) -> Option<Rc<dyn ProxyTransport>> {
        self.proxy_transport.borrow().clone()
    }

    /// Creates a restricted child context, available only if this context's
    /// grant enables it.
    pub fn child(&self, permission: PermissionGrant) -> Result<RegistrationContext, Error> {
        if !self.permission.may_create_permission_context {
            return Err(Error::not_allowed(
                "may_create_permission_context denied by permission grant",
            ));
        }
        Ok(RegistrationContext::new(permission))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_service_without_replace_is_already_exists() {
        let ctx = RegistrationContext::new(PermissionGrant::root());
        ctx.register_service("db", Rc::new(42u32), false).unwrap();
        let err = ctx.register_service("db", Rc::new(43u32), false).unwrap_err();
        assert_eq!(*err.kind(), crate::error::ErrorKind::AlreadyExists);
    }

    #[test]
    fn allow_replace_overwrites_existing_service() {
        let ctx = RegistrationContext::new(PermissionGrant::root());
        ctx.register_service("db", Rc::new(42u32), false).unwrap();
        ctx.register_service("db", Rc::new(43u32), true).unwrap();
        let got = ctx.get_service("db").unwrap();
        assert_eq!(*got.as_any().downcast_ref::<u32>().unwrap(), 43);
    }

    #[test]
    fn get_service_denied_by_whitelist() {
        let mut grant = PermissionGrant::root();
        grant.allowed_get_services = AllowList::Names(vec!["public".into()]);
        let ctx = RegistrationContext::new(grant);
        ctx.register_service("secret", Rc::new(1u32), false).unwrap();
        let err = ctx.get_service("secret").unwrap_err();
        assert_eq!(*err.kind(), crate::error::ErrorKind::NotAllowed);
    }

    #[test]
    fn mutation_after_freeze_panics() {
        let ctx = RegistrationContext::new(PermissionGrant::root());
        ctx.freeze();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            ctx.register_service("db", Rc::new(1u32), false).unwrap();
        }));
        assert!(result.is_err());
    }

    struct FailingService;

    #[async_trait::async_trait(?Send)]
    impl Shutdownable for FailingService {
        async fn shutdown(&self) -> Result<(), Error> {
            Err(Error::internal("connection refused"))
        }
    }

    struct OkService;

    #[async_trait::async_trait(?Send)]
    impl Shutdownable for OkService {
        async fn shutdown(&self) -> Result<(), Error> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn shutdown_all_services_aggregates_errors() {
        let ctx = RegistrationContext::new(PermissionGrant::root());
        ctx.register_shutdown_hook("ok", Rc::new(OkService));
        ctx.register_shutdown_hook("failing", Rc::new(FailingService));

        let err = ctx
            .shutdown_all_services(Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(err.message().contains("failing"));
    }

    #[tokio::test]
    async fn shutdown_waits_for_in_flight_then_proceeds() {
        let ctx = RegistrationContext::new(PermissionGrant::root());
        let guard = ctx.in_flight().acquire();
        ctx.register_shutdown_hook("ok", Rc::new(OkService));

        let done = Rc::new(Cell::new(false));
        let done_clone = Rc::clone(&done);
        let in_flight = ctx.in_flight();
        let release_after_notified = async move {
            // Hold the guard past the first poll so shutdown genuinely waits,
            // then drop it to unblock `wait_for_drain`.
            tokio::task::yield_now().await;
            done_clone.set(true);
            drop(guard);
            let _ = &in_flight;
        };

        let (shutdown_result, _) = tokio::join!(
            ctx.shutdown_all_services(Duration::from_secs(5)),
            release_after_notified
        );

        assert!(shutdown_result.is_ok());
        assert!(done.get());
    }

    #[tokio::test]
    async fn shutdown_forces_cancellation_past_deadline() {
        let ctx = RegistrationContext::new(PermissionGrant::root());
        let guard = ctx.in_flight().acquire();
        let signal = ctx.in_flight().shutdown_signal();

        ctx.shutdown_all_services(Duration::from_millis(10))
            .await
            .unwrap();

        assert!(signal.is_cancelled());
        drop(guard);
    }

    #[test]
    fn module_registration_is_deduplicated() {
        let ctx = RegistrationContext::new(PermissionGrant::root());
        let calls = Rc::new(RefCell::new(0));
        for _ in 0..3 {
            let calls = Rc::clone(&calls);
            ctx.register_module("auth", move |_| {
                *calls.borrow_mut() += 1;
            });
        }
        assert_eq!(*calls.borrow(), 1);
    }
}
