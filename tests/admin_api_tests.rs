//! End-to-end tests against a served admin panel: auth gate, generation,
//! generated CRUD, dynamic pages and snapshot transfer over plain HTTP.

mod common;

use common::panel::TestPanel;
use serde_json::{json, Value};

fn cases_request() -> Value {
    json!({
        "resourceName": "Cases",
        "fields": [
            { "name": "title", "type": "String", "required": true },
            { "name": "blocks", "type": "Json" }
        ],
        "resourceType": "collection"
    })
}

#[test]
fn health_answers_without_a_token() {
    let panel = TestPanel::start_with_token(Some("secret"));
    let (status, body) = panel.get_unauthenticated("/health");
    assert_eq!(status, 200);
    assert_eq!(body, json!({ "status": "ok" }));
}

#[test]
fn admin_routes_enforce_the_bearer_token() {
    let panel = TestPanel::start_with_token(Some("secret"));

    let (status, body) = panel.get_unauthenticated("/api/users");
    assert_eq!(status, 401);
    assert_eq!(body["message"], "Not authorized, no token provided");

    let resp = reqwest::blocking::Client::new()
        .get(panel.url("/api/users"))
        .bearer_auth("wrong")
        .send()
        .unwrap();
    assert_eq!(resp.status().as_u16(), 401);
    let body: Value = resp.json().unwrap();
    assert_eq!(body["message"], "Not authorized, token failed");

    let (status, _) = panel.get("/api/users");
    assert_eq!(status, 200);
}

#[test]
fn unknown_routes_answer_a_json_not_found() {
    let panel = TestPanel::start();
    let (status, body) = panel.get("/api/nope");
    assert_eq!(status, 404);
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["message"], "GET /api/nope not found");
}

#[test]
fn preflight_is_answered_before_routing() {
    let panel = TestPanel::start_with_token(Some("secret"));
    let resp = reqwest::blocking::Client::new()
        .request(reqwest::Method::OPTIONS, panel.url("/api/users"))
        .send()
        .unwrap();
    assert_eq!(resp.status().as_u16(), 204);
    assert_eq!(
        resp.headers()
            .get("Access-Control-Allow-Origin")
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );
    assert!(resp.headers().contains_key("Access-Control-Allow-Methods"));
}

#[test]
fn generation_brings_new_endpoints_live() {
    let panel = TestPanel::start_with_token(Some("secret"));

    let (status, body) = panel.post("/api/admin/generate-resource", cases_request());
    assert_eq!(status, 201);
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["message"], "Resource Cases generated successfully");
    assert_eq!(body["resourceName"], "Cases");
    assert_eq!(body["endpoints"]["getAll"], "GET /api/cases");
    assert_eq!(body["endpoints"]["update"], "PUT /api/cases/:id");

    // The collection is served immediately, without a restart.
    let (status, body) = panel.get("/api/cases");
    assert_eq!(status, 200);
    assert_eq!(
        body,
        json!({ "cases": [], "total": 0, "page": 1, "limit": 10, "totalPages": 0 })
    );

    let (status, created) = panel.post("/api/cases", json!({ "title": "First" }));
    assert_eq!(status, 201);
    assert_eq!(created["title"], "First");
    assert_eq!(created["isPublished"], json!(false));
    let id = created["id"].as_str().unwrap().to_string();

    let (status, fetched) = panel.get(&format!("/api/cases/{id}"));
    assert_eq!(status, 200);
    assert_eq!(fetched["title"], "First");

    let (status, updated) = panel.put(&format!("/api/cases/{id}"), json!({ "title": "Second" }));
    assert_eq!(status, 200);
    assert_eq!(updated["title"], "Second");

    let (status, deleted) = panel.delete(&format!("/api/cases/{id}"));
    assert_eq!(status, 200);
    assert_eq!(deleted["message"], "Cases deleted");

    let (status, body) = panel.get(&format!("/api/cases/{id}"));
    assert_eq!(status, 404);
    assert_eq!(body["message"], "Cases not found");

    // The structure companion came up with the resource.
    let (status, structure) = panel.get("/api/cases-structure");
    assert_eq!(status, 200);
    assert!(structure.get("fields").is_some());
}

#[test]
fn generation_registers_an_admin_page() {
    let panel = TestPanel::start();
    let (status, _) = panel.post("/api/admin/generate-resource", cases_request());
    assert_eq!(status, 201);

    let (status, page) = panel.get("/api/admin/dynamic-pages/cases");
    assert_eq!(status, 200);
    assert_eq!(page["slug"], "cases");
    assert_eq!(page["title"], "Cases");
}

#[test]
fn invalid_generation_reports_every_violation() {
    let panel = TestPanel::start();
    let (status, body) = panel.post("/api/admin/generate-resource", json!({}));
    assert_eq!(status, 400);
    assert_eq!(body["success"], json!(false));
    let message = body["message"].as_str().unwrap();
    assert!(message.contains("Resource name is required"));
    assert!(message.contains("resourceName and fields array are required"));
}

#[test]
fn import_requires_a_snapshot_member() {
    let panel = TestPanel::start();
    let (status, body) = panel.post("/api/admin/data/import", json!({ "snapshot": "text" }));
    assert_eq!(status, 400);
    assert_eq!(body["message"], "snapshot is required");
}

#[test]
fn export_wraps_the_current_state() {
    let panel = TestPanel::start();
    let (status, _) = panel.post("/api/admin/generate-resource", cases_request());
    assert_eq!(status, 201);
    let (_, created) = panel.post("/api/cases", json!({ "title": "Kept" }));
    assert!(created["id"].is_string());

    let (status, body) = panel.get("/api/admin/data/export");
    assert_eq!(status, 200);
    assert_eq!(body["version"], 1);
    assert!(body["exportedAt"].is_string());
    let snapshot = &body["snapshot"];
    assert!(snapshot["files"]["prismaSchema"]
        .as_str()
        .unwrap()
        .contains("model Cases {"));
    let dirs = snapshot["files"]["generatedDirs"].as_array().unwrap();
    assert_eq!(dirs[0]["name"], "cases");
    let collections = snapshot["database"]["collections"].as_array().unwrap();
    assert!(collections
        .iter()
        .any(|c| c["name"] == "cases"
            && c["documents"].as_array().unwrap()[0]["title"] == "Kept"));
}

#[test]
fn dynamic_pages_merge_partial_updates() {
    let panel = TestPanel::start();

    let (status, page) = panel.get("/api/admin/dynamic-pages/landing");
    assert_eq!(status, 200);
    assert_eq!(page["slug"], "landing");

    let (status, page) = panel.put(
        "/api/admin/dynamic-pages/landing",
        json!({ "title": "Landing" }),
    );
    assert_eq!(status, 200);
    assert_eq!(page["title"], "Landing");

    let (status, page) = panel.put(
        "/api/admin/dynamic-pages/landing",
        json!({ "structure": { "blocks": [1, 2] } }),
    );
    assert_eq!(status, 200);
    assert_eq!(page["title"], "Landing");
    assert_eq!(page["structure"]["blocks"], json!([1, 2]));

    let (status, body) = panel.post("/api/admin/dynamic-pages/landing", json!({}));
    assert_eq!(status, 400);
    assert_eq!(
        body["message"],
        "Dynamic page with slug \"landing\" already exists"
    );

    let (status, fresh) = panel.put("/api/admin/dynamic-pages/about", json!({ "title": "About" }));
    assert_eq!(status, 201);
    assert_eq!(fresh["title"], "About");
}

#[test]
fn config_endpoint_round_trips() {
    let panel = TestPanel::start_with_token(Some("secret"));

    // Reads are public so the frontend can bootstrap itself.
    let (status, body) = panel.get_unauthenticated("/api/config");
    assert_eq!(status, 200);
    assert_eq!(body["backendApiUrl"], Value::Null);

    let (status, _) = panel.put("/api/config", json!({ "backendApiUrl": "https://api.test" }));
    assert_eq!(status, 200);

    let (_, body) = panel.get_unauthenticated("/api/config");
    assert_eq!(body["backendApiUrl"], "https://api.test");
}
