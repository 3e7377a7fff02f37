//! Core resource handlers served by the admin server itself.
//!
//! These mirror the modules `panelforge init` seeds into a managed project
//! (`server/resources/{auth,users,config,media}/`), so both servers answer
//! the core routes with identical contracts.

use crate::server::RouteTable;

/// The core mounts in bootstrap order.
pub fn core_tables() -> Vec<(&'static str, RouteTable)> {
    vec![
        ("/api/auth", auth::table()),
        ("/api/users", users::table()),
        ("/api/config", config::table()),
        ("/api/media", media::table()),
    ]
}

pub mod users {
    //! CRUD over the `users` collection, dual-path like any generated
    //! collection resource.

    use serde_json::json;

    use crate::resources::ResourceContext;
    use crate::server::{HandlerRequest, HandlerResponse, Route, RouteTable};

    const MODEL: &str = "User";
    const COLLECTION: &str = "users";

    pub fn table() -> RouteTable {
        RouteTable::new(vec![
            Route::get("/", get_all),
            Route::post("/", create),
            Route::get("/{id}", get_by_id),
            Route::put("/{id}", update),
            Route::delete("/{id}", delete),
        ])
    }

    /// GET /api/users
    pub fn get_all(ctx: &ResourceContext, req: &HandlerRequest) -> HandlerResponse {
        let page = req.query_usize("page", 1).max(1);
        let limit = req.query_usize("limit", 10).max(1);
        match ctx
            .accessor(MODEL, COLLECTION)
            .find_many((page - 1) * limit, limit)
        {
            Ok((docs, total)) => HandlerResponse::ok(json!({
                "users": docs,
                "total": total,
                "page": page,
                "limit": limit,
                "totalPages": (total + limit - 1) / limit,
            })),
            Err(err) => HandlerResponse::from_error(&err),
        }
    }

    /// GET /api/users/:id
    pub fn get_by_id(ctx: &ResourceContext, req: &HandlerRequest) -> HandlerResponse {
        let id = match req.path_param("id") {
            Some(id) => id.to_string(),
            None => return HandlerResponse::bad_request("id parameter is required"),
        };
        match ctx.accessor(MODEL, COLLECTION).find_one(&id) {
            Ok(Some(doc)) => HandlerResponse::ok(doc),
            Ok(None) => HandlerResponse::not_found(MODEL),
            Err(err) => HandlerResponse::from_error(&err),
        }
    }

    /// POST /api/users
    pub fn create(ctx: &ResourceContext, req: &HandlerRequest) -> HandlerResponse {
        match ctx.accessor(MODEL, COLLECTION).insert(req.body_json()) {
            Ok(doc) => HandlerResponse::created(doc),
            Err(err) => HandlerResponse::from_error(&err),
        }
    }

    /// PUT /api/users/:id
    pub fn update(ctx: &ResourceContext, req: &HandlerRequest) -> HandlerResponse {
        let id = match req.path_param("id") {
            Some(id) => id.to_string(),
            None => return HandlerResponse::bad_request("id parameter is required"),
        };
        match ctx.accessor(MODEL, COLLECTION).update(&id, req.body_json()) {
            Ok(Some(doc)) => HandlerResponse::ok(doc),
            Ok(None) => HandlerResponse::not_found(MODEL),
            Err(err) => HandlerResponse::from_error(&err),
        }
    }

    /// DELETE /api/users/:id
    pub fn delete(ctx: &ResourceContext, req: &HandlerRequest) -> HandlerResponse {
        let id = match req.path_param("id") {
            Some(id) => id.to_string(),
            None => return HandlerResponse::bad_request("id parameter is required"),
        };
        match ctx.accessor(MODEL, COLLECTION).delete(&id) {
            Ok(true) => HandlerResponse::ok(json!({ "message": "User deleted" })),
            Ok(false) => HandlerResponse::not_found(MODEL),
            Err(err) => HandlerResponse::from_error(&err),
        }
    }
}

pub mod config {
    //! Instance configuration backed by the `config` singleton.

    use serde_json::{json, Value};

    use crate::resources::ResourceContext;
    use crate::server::{HandlerRequest, HandlerResponse, Route, RouteTable};

    const MODEL: &str = "Config";
    const COLLECTION: &str = "config";

    pub fn table() -> RouteTable {
        RouteTable::new(vec![
            Route::get("/", get_config).public(),
            Route::put("/", put_config),
        ])
    }

    /// GET /api/config (public)
    pub fn get_config(ctx: &ResourceContext, _req: &HandlerRequest) -> HandlerResponse {
        match ctx.accessor(MODEL, COLLECTION).find_first() {
            Ok(doc) => {
                let url = doc
                    .as_ref()
                    .and_then(|d| d.get("backend_api_url"))
                    .cloned()
                    .unwrap_or(Value::Null);
                HandlerResponse::ok(json!({ "backendApiUrl": url }))
            }
            Err(err) => HandlerResponse::from_error(&err),
        }
    }

    /// PUT /api/config
    pub fn put_config(ctx: &ResourceContext, req: &HandlerRequest) -> HandlerResponse {
        let body = req.body_json();
        let backend = match body.get("backendApiUrl").and_then(|v| v.as_str()) {
            Some(value) => value.trim().to_string(),
            None => {
                return HandlerResponse::bad_request(
                    "backendApiUrl is required and must be a string",
                )
            }
        };
        let mut patch = json!({ "backend_api_url": backend });
        if let Some(front) = body.get("frontendUrl").and_then(|v| v.as_str()) {
            patch["frontend_url"] = json!(front.trim());
        }
        match ctx.accessor(MODEL, COLLECTION).upsert_first(patch) {
            Ok(doc) => HandlerResponse::ok(json!({ "success": true, "config": doc })),
            Err(err) => HandlerResponse::from_error(&err),
        }
    }
}

pub mod auth {
    //! Placeholder auth endpoints; admin requests authenticate with the
    //! static bearer token checked in middleware, not a login flow.

    use serde_json::json;

    use crate::resources::ResourceContext;
    use crate::server::{HandlerRequest, HandlerResponse, Route, RouteTable};

    pub fn table() -> RouteTable {
        RouteTable::new(vec![
            Route::post("/login", login).public(),
            Route::post("/register", register).public(),
        ])
    }

    /// POST /api/auth/login
    pub fn login(_ctx: &ResourceContext, _req: &HandlerRequest) -> HandlerResponse {
        HandlerResponse::json(
            501,
            json!({
                "success": false,
                "message": "Password login is not enabled; authenticate with the admin bearer token",
            }),
        )
    }

    /// POST /api/auth/register
    pub fn register(_ctx: &ResourceContext, _req: &HandlerRequest) -> HandlerResponse {
        HandlerResponse::json(
            501,
            json!({
                "success": false,
                "message": "Self-service registration is not enabled",
            }),
        )
    }
}

pub mod media {
    //! Placeholder media endpoints; file storage is configured per
    //! deployment.

    use serde_json::json;

    use crate::resources::ResourceContext;
    use crate::server::{HandlerRequest, HandlerResponse, Route, RouteTable};

    pub fn table() -> RouteTable {
        RouteTable::new(vec![Route::post("/upload", upload)])
    }

    /// POST /api/media/upload
    pub fn upload(_ctx: &ResourceContext, _req: &HandlerRequest) -> HandlerResponse {
        HandlerResponse::json(
            501,
            json!({
                "success": false,
                "message": "File storage is not configured for this instance",
            }),
        )
    }
}
