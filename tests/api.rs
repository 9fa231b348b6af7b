use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use warp::http::StatusCode;

use healthguard::api::RestApi;
use healthguard::auth::AuthService;
use healthguard::classifier::Vitals;
use healthguard::config::AuthConfig;
use healthguard::history::HistoryEngine;
use healthguard::storage::{ObservationDraft, RecordStore};

struct Harness {
    api: RestApi,
    history: Arc<HistoryEngine>,
}

fn harness() -> Harness {
    harness_with_iterations(1_000)
}

fn harness_with_iterations(pbkdf2_iterations: u32) -> Harness {
    let store = Arc::new(RecordStore::open_in_memory().unwrap());
    let history = Arc::new(HistoryEngine::new(Arc::clone(&store), 10));
    let auth = AuthService::new(store, &AuthConfig { session_ttl_secs: 600, pbkdf2_iterations });
    Harness { api: RestApi::new(Arc::clone(&history), auth), history }
}

fn seed(history: &HistoryEngine, name: &str, day: u32, hour: u32, vitals: Vitals, notes: Option<&str>) -> i64 {
    let at = NaiveDate::from_ymd_opt(2024, 3, day).unwrap().and_hms_opt(hour, 0, 0).unwrap();
    let mut draft = ObservationDraft::new(name, 40, "12 Elm St", vitals).at(at);
    if let Some(notes) = notes {
        draft = draft.with_notes(notes);
    }
    history.submit(draft).unwrap().id
}

fn healthy() -> Vitals {
    Vitals::new(120.0, 80.0, 70.0, 98.0)
}

fn risky() -> Vitals {
    Vitals::new(150.0, 95.0, 110.0, 90.0)
}

async fn token(api: &RestApi) -> String {
    let routes = api.routes();
    let credentials = json!({"username": "house", "password": "vicodin"});

    let res = warp::test::request()
        .method("POST")
        .path("/register")
        .json(&credentials)
        .reply(&routes)
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = warp::test::request()
        .method("POST")
        .path("/login")
        .json(&credentials)
        .reply(&routes)
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = serde_json::from_slice(res.body()).unwrap();
    body["data"]["token"].as_str().unwrap().to_string()
}

async fn get(api: &RestApi, token: &str, path: &str) -> (StatusCode, Value) {
    let res = warp::test::request()
        .method("GET")
        .path(path)
        .header("authorization", format!("Bearer {token}"))
        .reply(&api.routes())
        .await;
    let body = serde_json::from_slice(res.body()).unwrap_or(Value::Null);
    (res.status(), body)
}

fn names(body: &Value) -> Vec<String> {
    body.as_array()
        .unwrap()
        .iter()
        .map(|o| o["name"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_routes_require_a_session() {
    let h = harness();
    let res = warp::test::request()
        .method("GET")
        .path("/history")
        .reply(&h.api.routes())
        .await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let (status, body) = get(&h.api, "not-a-token", "/chartdata").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["status"], "error");
}

#[tokio::test]
async fn test_duplicate_registration_conflicts() {
    let h = harness();
    token(&h.api).await;
    let res = warp::test::request()
        .method("POST")
        .path("/register")
        .json(&json!({"username": "house", "password": "other"}))
        .reply(&h.api.routes())
        .await;
    assert_eq!(res.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_wrong_password_is_unauthorized() {
    let h = harness();
    token(&h.api).await;
    let res = warp::test::request()
        .method("POST")
        .path("/login")
        .json(&json!({"username": "house", "password": "aspirin"}))
        .reply(&h.api.routes())
        .await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_ends_session() {
    let h = harness();
    let token = token(&h.api).await;
    let res = warp::test::request()
        .method("POST")
        .path("/logout")
        .header("authorization", format!("Bearer {token}"))
        .reply(&h.api.routes())
        .await;
    assert_eq!(res.status(), StatusCode::OK);

    let (status, _) = get(&h.api, &token, "/history").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_predict_classifies_and_stores() {
    let h = harness();
    let token = token(&h.api).await;

    let res = warp::test::request()
        .method("POST")
        .path("/predict")
        .header("authorization", format!("Bearer {token}"))
        .json(&json!({
            "name": "Jane", "age": "40", "address": "12 Elm St",
            "systolic_bp": 150, "diastolic_bp": 95, "heart_rate": 110, "spo2": 90,
            "notes": "dizzy"
        }))
        .reply(&h.api.routes())
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = serde_json::from_slice(res.body()).unwrap();
    assert_eq!(body, json!({"result": "RISK"}));

    let (_, body) = get(&h.api, &token, "/history").await;
    let records = body["data"].as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["name"], "Jane");
    assert_eq!(records[0]["result"], "RISK");
    assert_eq!(records[0]["notes"], "dizzy");
}

#[tokio::test]
async fn test_predict_rejects_malformed_body() {
    let h = harness();
    let token = token(&h.api).await;
    let res = warp::test::request()
        .method("POST")
        .path("/predict")
        .header("authorization", format!("Bearer {token}"))
        .json(&json!({"name": "Jane", "age": 40, "address": "x", "systolic_bp": "high",
                      "diastolic_bp": 80, "heart_rate": 70, "spo2": 98}))
        .reply(&h.api.routes())
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(h.history.store().count().unwrap(), 0);
}

#[tokio::test]
async fn test_history_filters() {
    let h = harness();
    let token = token(&h.api).await;
    seed(&h.history, "Ann", 1, 9, healthy(), Some("routine check"));
    seed(&h.history, "Bob", 2, 9, risky(), Some("chest pain"));
    seed(&h.history, "Cy", 3, 9, risky(), None);

    let (status, body) = get(&h.api, &token, "/history").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(names(&body["data"]), vec!["Cy", "Bob", "Ann"]);

    let (_, body) = get(&h.api, &token, "/history?risk_only=1").await;
    assert_eq!(names(&body["data"]), vec!["Cy", "Bob"]);

    let (_, body) = get(&h.api, &token, "/history?start_date=2024-03-02&end_date=2024-03-03").await;
    assert_eq!(names(&body["data"]), vec!["Bob"]);

    let (_, body) = get(&h.api, &token, "/history?keyword=pain").await;
    assert_eq!(names(&body["data"]), vec!["Bob"]);

    let (status, body) = get(&h.api, &token, "/history?start_date=03/01/2024").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");
}

#[tokio::test]
async fn test_patient_profile_groups_by_name() {
    let h = harness();
    let token = token(&h.api).await;
    let first = seed(&h.history, "Jane", 1, 9, healthy(), None);
    seed(&h.history, "Other", 1, 10, risky(), None);
    let last = seed(&h.history, "Jane", 2, 9, risky(), Some("follow-up"));

    let (status, body) = get(&h.api, &token, &format!("/patient/{first}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["patient"]["id"], first);
    let ids: Vec<i64> = body["data"]["records"]
        .as_array()
        .unwrap()
        .iter()
        .map(|o| o["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![last, first]);

    let (_, body) = get(&h.api, &token, &format!("/patient/{first}?risk_only=true")).await;
    assert_eq!(body["data"]["records"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_unknown_patient_is_not_found() {
    let h = harness();
    let token = token(&h.api).await;
    for path in ["/patient/99", "/patient/chartdata/99", "/patient/export/pdf/99"] {
        let (status, _) = get(&h.api, &token, path).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{path}");
    }
}

#[tokio::test]
async fn test_chart_series_are_aligned_and_chronological() {
    let h = harness();
    let token = token(&h.api).await;
    let id = seed(&h.history, "Jane", 1, 9, healthy(), None);
    seed(&h.history, "Jane", 2, 9, risky(), None);

    let (_, body) = get(&h.api, &token, "/chartdata").await;
    assert_eq!(body["labels"], json!(["2024-03-01 09:00", "2024-03-02 09:00"]));
    assert_eq!(body["heart"], json!([70.0, 110.0]));
    assert_eq!(body["spo2"].as_array().unwrap().len(), 2);

    let (_, body) = get(&h.api, &token, &format!("/patient/chartdata/{id}")).await;
    assert_eq!(body["systolic"], json!([120.0, 150.0]));
    assert_eq!(body["diastolic"], json!([80.0, 95.0]));
}

#[tokio::test]
async fn test_search_by_name_fragment() {
    let h = harness();
    let token = token(&h.api).await;
    seed(&h.history, "Janet", 1, 9, healthy(), None);
    seed(&h.history, "Bob", 2, 9, healthy(), None);

    let (_, body) = get(&h.api, &token, "/search?name=Jan").await;
    assert_eq!(names(&body["data"]), vec!["Janet"]);

    let (status, _) = get(&h.api, &token, "/search?name=Jan&end_date=yesterday").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_csv_export() {
    let h = harness();
    let token = token(&h.api).await;
    seed(&h.history, "Doe, Jane", 1, 9, risky(), None);

    let res = warp::test::request()
        .method("GET")
        .path("/export/csv")
        .header("authorization", format!("Bearer {token}"))
        .reply(&h.api.routes())
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["content-type"], "text/csv");
    assert_eq!(
        res.headers()["content-disposition"],
        "attachment; filename=patient_history.csv"
    );

    let text = String::from_utf8(res.body().to_vec()).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "Name,Age,Address,Date,Systolic,Diastolic,HR,SpO2,Result");
    assert_eq!(lines[1], "\"Doe, Jane\",40,12 Elm St,2024-03-01 09:00,150,95,110,90,RISK");
}

#[tokio::test]
async fn test_pdf_exports() {
    let h = harness();
    let token = token(&h.api).await;
    let id = seed(&h.history, "Jane Doe", 1, 9, risky(), Some("dizzy"));

    let res = warp::test::request()
        .method("GET")
        .path("/export/pdf")
        .header("authorization", format!("Bearer {token}"))
        .reply(&h.api.routes())
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["content-type"], "application/pdf");
    assert!(res.body().starts_with(b"%PDF"));

    let res = warp::test::request()
        .method("GET")
        .path(&format!("/patient/export/pdf/{id}"))
        .header("authorization", format!("Bearer {token}"))
        .reply(&h.api.routes())
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        res.headers()["content-disposition"],
        "attachment; filename=Jane_Doe_profile.pdf"
    );
    assert!(res.body().starts_with(b"%PDF"));
}

#[tokio::test]
async fn test_unknown_route_is_json_404() {
    let h = harness();
    let res = warp::test::request().method("GET").path("/nowhere").reply(&h.api.routes()).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: Value = serde_json::from_slice(res.body()).unwrap();
    assert_eq!(body["status"], "error");
}

#[tokio::test]
async fn test_login_does_not_stall_the_runtime() {
    let h = harness_with_iterations(200_000);
    token(&h.api).await;

    let started = Instant::now();
    let ticker = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        started.elapsed()
    });

    let res = warp::test::request()
        .method("POST")
        .path("/login")
        .json(&json!({"username": "house", "password": "vicodin"}))
        .reply(&h.api.routes())
        .await;
    let login_took = started.elapsed();
    assert_eq!(res.status(), StatusCode::OK);

    let ticker_took = ticker.await.unwrap();
    assert!(
        ticker_took < login_took,
        "timer fired after {ticker_took:?}, login took {login_took:?}"
    );
}

#[tokio::test]
async fn test_storage_failure_is_a_500_envelope() {
    let h = harness();
    let token = token(&h.api).await;
    h.history
        .store()
        .with_conn(|conn| Ok(conn.execute_batch("DROP TABLE observations;")?))
        .unwrap();

    let (status, body) = get(&h.api, &token, "/history").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["status"], "error");
    assert_eq!(body["data"], Value::Null);

    let res = warp::test::request()
        .method("POST")
        .path("/predict")
        .header("authorization", format!("Bearer {token}"))
        .json(&json!({"name": "Jane", "age": 40, "address": "x", "systolic_bp": 120,
                      "diastolic_bp": 80, "heart_rate": 70, "spo2": 98}))
        .reply(&h.api.routes())
        .await;
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
}
