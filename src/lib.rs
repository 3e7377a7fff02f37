//! # panelforge
//!
//! **panelforge** is a coroutine-powered admin-panel backend that can grow
//! itself: an authenticated generation API synthesizes new CRUD resources
//! (persistence model, handler modules, route registration, live mounting)
//! at runtime, without restarting the server.
//!
//! ## Overview
//!
//! panelforge manages a *scaffolded project*: a directory holding a schema
//! document (`prisma/schema.prisma`), a client ledger (`client/schema.prisma`),
//! a server bootstrap (`server/main.rs`) and one module directory per
//! resource (`server/resources/<slug>/`). `panelforge init` seeds the layout;
//! `panelforge serve` runs the admin server over it. A `POST
//! /api/admin/generate-resource` then does, in one request, what a developer
//! would otherwise do by hand:
//!
//! 1. validate the requested resource (name, fields, shape)
//! 2. merge its persistence model into the shared schema document
//! 3. write handler/route source modules for the resource
//! 4. register the routes in the project bootstrap (idempotent line patching)
//! 5. mount the routes on the running server
//! 6. push the schema to the live database and regenerate the client
//!
//! Until the client regeneration lands, the new resource is served through a
//! raw document fallback; the ledger flip upgrades it to typed access with no
//! restart.
//!
//! ## Architecture
//!
//! - **[`descriptor`]** - generation request validation and resource identity
//!   (model name, route slug, collection, shape)
//! - **[`schema`]** - line-oriented schema document: model block parsing,
//!   idempotent merge, canonical preamble
//! - **[`generator`]** - Askama templates rendering every generated artifact,
//!   plus project scaffolding
//! - **[`bootstrap`]** - anchor-based line patching of the project bootstrap
//!   and resources module
//! - **[`sync`]** - external ORM CLI subprocess driver (schema push + client
//!   regen) with a restart-marker fallback
//! - **[`resources`]** - runtime resource context: typed-or-raw access
//!   strategy, model registry over the ledger, live resource mounting
//! - **[`store`]** - document store protocol (`run_command`) with in-memory
//!   and HTTP implementations
//! - **[`router`]** / **[`dispatcher`]** - regex route matching and
//!   coroutine-per-handler dispatch
//! - **[`server`]** - `may_minihttp` HTTP server, request/response plumbing,
//!   runtime mount surface
//! - **[`middleware`]** - bearer-token auth, CORS, request tracing
//! - **[`api`]** - the admin management surface and seeded core CRUD tables
//! - **[`pages`]** / **[`snapshot`]** / **[`reset`]** - dynamic page registry,
//!   full-state export/import, generated-state cleanup
//! - **[`hot_reload`]** - ledger watching for `--watch`
//!
//! ### Generation Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant Admin as Admin UI
//!     participant API as api::admin
//!     participant Desc as descriptor
//!     participant Gen as generator
//!     participant Schema as schema::SchemaDoc
//!     participant Boot as bootstrap
//!     participant Ctx as resources::ResourceContext
//!     participant Sync as sync::SyncEngine
//!
//!     Admin->>API: POST /api/admin/generate-resource
//!     API->>Desc: ResourceDescriptor::from_request(body)
//!     Desc-->>API: descriptor | 400 (all violations)
//!     API->>Gen: generate_resource(project, descriptor)
//!     Gen->>Schema: merge_model_file(model)
//!     Gen->>Schema: merge_model_file(structure model)
//!     Gen->>Gen: write handlers/routes modules
//!     Gen->>Boot: register_routes + ensure_resource_module
//!     Gen-->>API: GeneratedResource
//!     API->>Ctx: mount_live(resource)
//!     API->>Sync: spawn_detached(push + generate)
//!     API-->>Admin: 201 {success, endpoints}
//! ```
//!
//! ### Request Handling Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant Client
//!     participant Service as server::AdminService
//!     participant Router as router::Router
//!     participant Disp as dispatcher::Dispatcher
//!     participant Handler as handler coroutine
//!     participant Store as store::DocumentStore
//!
//!     Client->>Service: HTTP request
//!     Service->>Router: route(method, path)
//!     Router-->>Service: RouteMatch (params, public flag)
//!     Service->>Disp: dispatch(request)
//!     Disp->>Disp: middleware before (auth, CORS, tracing)
//!     Disp->>Handler: send over channel
//!     Handler->>Store: run_command(find/insert/update/delete)
//!     Store-->>Handler: documents
//!     Handler-->>Disp: HandlerResponse
//!     Disp-->>Service: response (CORS headers applied)
//!     Service-->>Client: JSON
//! ```
//!
//! ### Key Architectural Patterns
//!
//! - **Line-oriented code patching** - generated registration is idempotent
//!   anchor-based text insertion, so repeated generation never duplicates a
//!   mount line
//! - **Typed-or-raw access** - every handler resolves its access path per
//!   request from the client ledger; generation never blocks on the external
//!   ORM CLI
//! - **Runtime mounting** - route tables swap under a write lock while the
//!   dispatcher keeps serving; handlers mount new resources from inside a
//!   request
//!
//! ## Quick Start
//!
//! ```bash
//! panelforge init --dir ./panel
//! PANELFORGE_ADMIN_TOKEN=secret panelforge serve --dir ./panel --watch
//!
//! # Generate a resource on the running server
//! curl -X POST localhost:8080/api/admin/generate-resource \
//!   -H "Authorization: Bearer secret" \
//!   -H "Content-Type: application/json" \
//!   -d '{"resourceName": "Cases", "fields": [{"name": "title", "type": "String", "required": true}]}'
//!
//! # The new endpoints are live immediately
//! curl -H "Authorization: Bearer secret" localhost:8080/api/cases
//! ```
//!
//! ## Runtime Considerations
//!
//! Handlers run as `may` coroutines with a fixed stack
//! (`PANELFORGE_STACK_SIZE`, default 64 KB). Generated-resource handlers do
//! file and store I/O on that stack, so prefer the roomy default unless
//! memory is tight. Blocking work beyond the document store protocol does
//! not belong in a handler; the ORM subprocess runs on a detached OS thread
//! for exactly that reason.

pub mod api;
pub mod bootstrap;
pub mod cli;
pub mod config;
pub mod descriptor;
pub mod dispatcher;
pub mod errors;
pub mod generator;
pub mod hot_reload;
pub mod ids;
pub mod middleware;
pub mod naming;
pub mod pages;
pub mod reset;
pub mod resources;
pub mod router;
pub mod runtime_config;
pub mod schema;
pub mod server;
pub mod snapshot;
pub mod store;
pub mod sync;

pub use errors::{PanelError, PanelResult};
pub use server::AdminServer;
