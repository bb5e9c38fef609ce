use axum::http::{self, Request, StatusCode};
use http_body_util::BodyExt;
use mock_server::{app, router, Registry, VERSION};
use serde_json::Value;
use tower::ServiceExt;

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> bytes::Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

fn request(method: &str, uri: &str, body: &str) -> Request<String> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(body.to_string())
        .unwrap()
}

fn seeded() -> Registry {
    let mut registry = Registry::new();
    registry.add_job("job/alpha", "<project/>");
    registry
}

// --- root ---

#[tokio::test]
async fn root_lists_jobs_and_carries_version_header() {
    let app = router(seeded().shared());
    let resp = app.oneshot(request("GET", "/api/json", "")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["x-jenkins"], VERSION);
    let root = body_json(resp).await;
    assert_eq!(root["jobs"][0]["name"], "alpha");
    assert_eq!(root["views"][0]["name"], "all");
}

#[tokio::test]
async fn unknown_path_returns_404_with_version_header() {
    let resp = app().oneshot(request("GET", "/nowhere/api/json", "")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(resp.headers()["x-jenkins"], VERSION);
}

// --- items ---

#[tokio::test]
async fn create_item_stores_config_and_rejects_duplicates() {
    let db = Registry::new().shared();

    let resp = router(db.clone())
        .oneshot(request("POST", "/createItem/?name=alpha", "<project/>"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = router(db.clone())
        .oneshot(request("GET", "/job/alpha/config.xml/", ""))
        .await
        .unwrap();
    assert_eq!(body_bytes(resp).await, "<project/>");

    let resp = router(db)
        .oneshot(request("POST", "/createItem/?name=alpha", "<project/>"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn folders_nest_items() {
    let db = Registry::new().shared();
    let folder_mode = format!("/createItem/?name=team&mode={}", mock_server::FOLDER_CLASS);
    router(db.clone())
        .oneshot(request("POST", &folder_mode, ""))
        .await
        .unwrap();
    let resp = router(db.clone())
        .oneshot(request("POST", "/job/team/createItem/?name=svc", "<project/>"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = router(db)
        .oneshot(request("GET", "/job/team/api/json", ""))
        .await
        .unwrap();
    let folder = body_json(resp).await;
    assert_eq!(folder["_class"], mock_server::FOLDER_CLASS);
    assert_eq!(folder["jobs"][0]["name"], "svc");
    assert_eq!(folder["jobs"][0]["url"], "/job/team/job/svc/");
}

#[tokio::test]
async fn build_answers_201_with_queue_location() {
    let db = seeded().shared();
    let resp = router(db.clone())
        .oneshot(request("POST", "/job/alpha/buildWithParameters/?BRANCH=main", ""))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    assert_eq!(resp.headers()[http::header::LOCATION], "/queue/item/1/");

    let resp = router(db)
        .oneshot(request("GET", "/job/alpha/1/consoleText/", ""))
        .await
        .unwrap();
    let console = body_bytes(resp).await;
    assert!(String::from_utf8_lossy(&console).contains("BRANCH=main"));
}

#[tokio::test]
async fn toggling_to_current_state_answers_400() {
    let db = seeded().shared();
    let resp = router(db.clone())
        .oneshot(request("POST", "/job/alpha/enable/", ""))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = router(db)
        .oneshot(request("POST", "/job/alpha/disable/", ""))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

// --- faults ---

#[tokio::test]
async fn applied_fault_commits_then_reports_error() {
    let mut registry = seeded();
    registry.inject_fault("DELETE", "/job/alpha/", 500, true);
    let db = registry.shared();

    let resp = router(db.clone())
        .oneshot(request("DELETE", "/job/alpha/", ""))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(db.read().await.item("job/alpha").is_none());
}

#[tokio::test]
async fn unapplied_fault_is_one_shot() {
    let mut registry = seeded();
    registry.inject_fault("GET", "job/alpha", 503, false);
    let db = registry.shared();

    let resp = router(db.clone())
        .oneshot(request("GET", "/job/alpha/api/json", ""))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

    let resp = router(db)
        .oneshot(request("GET", "/job/alpha/api/json", ""))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["name"], "alpha");
}

// --- auth and recording ---

#[tokio::test]
async fn required_credentials_gate_every_request() {
    let mut registry = seeded();
    registry.require_credentials("admin", "admin");
    let db = registry.shared();

    let resp = router(db.clone())
        .oneshot(request("GET", "/api/json", ""))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let authorized = Request::builder()
        .uri("/api/json")
        .header(http::header::AUTHORIZATION, "Basic YWRtaW46YWRtaW4=")
        .body(String::new())
        .unwrap();
    let resp = router(db.clone()).oneshot(authorized).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let registry = db.read().await;
    assert_eq!(registry.requests.len(), 2);
    assert_eq!(registry.requests[0].authorization, None);
}

#[tokio::test]
async fn multipart_parts_are_recorded() {
    let db = Registry::new().shared();
    let body = "--XYZ\r\n\
        Content-Disposition: form-data; name=\"file\"; filename=\"tool.hpi\"\r\n\
        Content-Type: application/octet-stream\r\n\r\n\
        archive\r\n\
        --XYZ--\r\n";
    let upload = Request::builder()
        .method("POST")
        .uri("/pluginManager/uploadPlugin/")
        .header(http::header::CONTENT_TYPE, "multipart/form-data; boundary=XYZ")
        .body(body.to_string())
        .unwrap();
    let resp = router(db.clone()).oneshot(upload).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let registry = db.read().await;
    let sent = registry.requests_to("POST", "pluginManager/uploadPlugin");
    assert_eq!(sent[0].parts[0].file_name.as_deref(), Some("tool.hpi"));
    assert_eq!(sent[0].parts[0].bytes, b"archive");
    assert_eq!(registry.plugins[0].short_name, "tool");
}

// --- nodes and views ---

#[tokio::test]
async fn computer_list_includes_built_in_node() {
    let resp = app().oneshot(request("GET", "/computer/api/json", "")).await.unwrap();
    let list = body_json(resp).await;
    assert_eq!(list["computer"][0]["displayName"], "Built-In Node");
    assert_eq!(list["totalExecutors"], 2);
}

#[tokio::test]
async fn create_view_then_add_job() {
    let db = seeded().shared();
    let resp = router(db.clone())
        .oneshot(request(
            "POST",
            "/createView/?name=ci&mode=hudson.model.ListView",
            "",
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    router(db.clone())
        .oneshot(request("POST", "/view/ci/addJobToView/?name=alpha", ""))
        .await
        .unwrap();
    let resp = router(db)
        .oneshot(request("GET", "/view/ci/api/json", ""))
        .await
        .unwrap();
    let view = body_json(resp).await;
    assert_eq!(view["jobs"][0]["name"], "alpha");
}
