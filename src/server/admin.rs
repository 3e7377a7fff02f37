//! Server assembly and runtime mounting.

use std::sync::{Arc, RwLock, Weak};

use anyhow::Context as _;
use tracing::info;

use super::http_server::{HttpServer, ServerHandle};
use super::routes::RouteTable;
use super::service::AdminService;
use crate::config::{ProjectPaths, ServerConfig};
use crate::dispatcher::Dispatcher;
use crate::middleware::{AuthMiddleware, CorsMiddleware, Middleware, TracingMiddleware};
use crate::resources::ResourceContext;
use crate::router::{RouteMeta, Router};
use crate::store::store_from_url;

/// The assembled admin server: document store, resource context, router,
/// dispatcher and middleware chain behind one mount/run surface.
///
/// Route tables are swapped at runtime: the generation API mounts a fresh
/// prefix for each generated resource and a snapshot import unmounts stale
/// ones again, all while the server keeps serving.
pub struct AdminServer {
    config: ServerConfig,
    ctx: Arc<ResourceContext>,
    router: Arc<RwLock<Router>>,
    dispatcher: Arc<Dispatcher>,
    cors: Arc<CorsMiddleware>,
}

impl AdminServer {
    /// Build a server for the project in `PANELFORGE_PROJECT_ROOT` (default:
    /// the current directory) with settings from the environment.
    pub fn from_env() -> anyhow::Result<Self> {
        let root = std::env::var("PANELFORGE_PROJECT_ROOT").unwrap_or_else(|_| ".".to_string());
        Self::new(ProjectPaths::new(root), ServerConfig::from_env())
    }

    pub fn new(project: ProjectPaths, config: ServerConfig) -> anyhow::Result<Self> {
        let store = store_from_url(&config.database_url)
            .with_context(|| format!("connecting document store at {}", config.database_url))?;
        let ctx = Arc::new(ResourceContext::for_project(project, store));
        Ok(Self::with_context(ctx, config))
    }

    /// Assemble around an existing context. The CLI uses this to share one
    /// context between the server and the generation engine. The context is
    /// handed a [`RouteMounter`] so request handlers can mount routes for
    /// resources they generate.
    pub fn with_context(ctx: Arc<ResourceContext>, config: ServerConfig) -> Self {
        let cors = Arc::new(CorsMiddleware::default());
        let dispatcher = Arc::new(Dispatcher::new());
        dispatcher.add_middleware(Arc::new(AuthMiddleware::new(config.admin_token.clone())));
        dispatcher.add_middleware(Arc::clone(&cors) as Arc<dyn Middleware>);
        dispatcher.add_middleware(Arc::new(TracingMiddleware));

        let router = Arc::new(RwLock::new(Router::new()));
        ctx.attach_mounter(RouteMounter {
            router: Arc::clone(&router),
            dispatcher: Arc::clone(&dispatcher),
            ctx: Arc::downgrade(&ctx),
        });

        Self {
            config,
            ctx,
            router,
            dispatcher,
            cors,
        }
    }

    /// Mount a route table under `prefix`, replacing whatever was mounted
    /// there before. Old handler coroutines exit once their channels drain.
    pub fn mount(&self, prefix: &str, table: RouteTable) {
        mount_table(&self.router, &self.dispatcher, &self.ctx, prefix, table);
    }

    /// Unmount every route under `prefix` and stop its handlers.
    pub fn unmount(&self, prefix: &str) {
        unmount_prefix(&self.router, &self.dispatcher, prefix);
    }

    pub fn service(&self) -> AdminService {
        AdminService::new(
            Arc::clone(&self.router),
            Arc::clone(&self.dispatcher),
            Arc::clone(&self.cors),
        )
    }

    pub fn context(&self) -> Arc<ResourceContext> {
        Arc::clone(&self.ctx)
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn router(&self) -> Arc<RwLock<Router>> {
        Arc::clone(&self.router)
    }

    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        Arc::clone(&self.dispatcher)
    }

    /// Bind and serve without blocking; the caller owns the handle.
    pub fn start(&self) -> anyhow::Result<ServerHandle> {
        let handle = HttpServer(self.service())
            .start(self.config.addr.as_str())
            .with_context(|| format!("binding {}", self.config.addr))?;
        info!(addr = %self.config.addr, "admin server listening");
        Ok(handle)
    }

    /// Serve until the process is stopped.
    pub fn run(self) -> anyhow::Result<()> {
        let handle = self.start()?;
        handle
            .join()
            .map_err(|_| anyhow::anyhow!("server exited after a panic"))
    }
}

/// Runtime mount surface held by the resource context.
///
/// Handlers receive `&ResourceContext`, not the server, so this is how a
/// generation request registers routes on the instance serving it. The
/// context reference is weak; mounting after the server is gone is a no-op.
pub struct RouteMounter {
    router: Arc<RwLock<Router>>,
    dispatcher: Arc<Dispatcher>,
    ctx: Weak<ResourceContext>,
}

impl RouteMounter {
    /// Mount `table` under `prefix` on the running server.
    pub fn mount(&self, prefix: &str, table: RouteTable) {
        let Some(ctx) = self.ctx.upgrade() else {
            return;
        };
        mount_table(&self.router, &self.dispatcher, &ctx, prefix, table);
    }

    /// Unmount every route under `prefix`.
    pub fn unmount(&self, prefix: &str) {
        unmount_prefix(&self.router, &self.dispatcher, prefix);
    }
}

/// Swap in a route table: unmount the prefix, then register each route's
/// handler coroutine and pattern. The router write lock is held across the
/// swap so routing never observes a half-mounted table.
fn mount_table(
    router: &Arc<RwLock<Router>>,
    dispatcher: &Arc<Dispatcher>,
    ctx: &Arc<ResourceContext>,
    prefix: &str,
    table: RouteTable,
) {
    let route_count = table.routes.len();
    let mut router = router.write().unwrap();

    let removed = router.unmount(prefix);
    dispatcher.deregister(&removed);

    for route in table.routes {
        let path_pattern = join_mount(prefix, &route.path);
        let handler_name = format!("{} {}", route.method, path_pattern);
        // SAFETY: the handler is a plain fn pointer and the context is
        // owned by the spawned coroutine; see Dispatcher::register_handler.
        unsafe {
            dispatcher.register_handler(&handler_name, route.handler, Arc::clone(ctx));
        }
        router.mount(RouteMeta {
            method: route.method,
            path_pattern,
            mount: prefix.to_string(),
            handler_name,
            public: route.public,
        });
    }

    info!(prefix, routes = route_count, "route table mounted");
}

fn unmount_prefix(router: &Arc<RwLock<Router>>, dispatcher: &Arc<Dispatcher>, prefix: &str) {
    let removed = router.write().unwrap().unmount(prefix);
    dispatcher.deregister(&removed);
    if !removed.is_empty() {
        info!(prefix, handlers = removed.len(), "route table unmounted");
    }
}

/// Join a mount prefix and a route-relative path into the full pattern.
fn join_mount(prefix: &str, path: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    let rel = path.trim_start_matches('/');
    if rel.is_empty() {
        if prefix.is_empty() {
            "/".to_string()
        } else {
            prefix.to_string()
        }
    } else {
        format!("{prefix}/{rel}")
    }
}
