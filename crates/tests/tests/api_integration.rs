use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;
use voyage_api::{build_app, build_router, ApiState};
use voyage_llm::{CompletionBackend, CompletionTimeouts, ScriptedCompletionClient};
use voyage_storage::Store;

const NANJING_PLAN: &str = r#"```json
{
  "day1": {"date": "2025-11-01", "activities": [{"time": "09:00", "activity": "中山陵", "location": "紫金山", "duration": "3小时", "cost": 0, "type": "景点", "description": "步行游览"}]},
  "day2": {"date": "2025-11-02", "activities": []},
  "day10": {"date": "2025-11-10", "activities": []}
}
```"#;

fn app_with(client: &ScriptedCompletionClient) -> Router {
    build_router(ApiState::new(
        Store::memory(),
        CompletionBackend::Scripted(client.clone()),
        CompletionTimeouts::default(),
        vec!["http://localhost:5173".to_string()],
    ))
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let parsed = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, parsed)
}

async fn create_trip(app: &Router, client: &ScriptedCompletionClient) -> String {
    client.push_content(NANJING_PLAN);
    let (status, body) = send(
        app,
        "POST",
        "/api/itinerary/generate",
        Some(json!({
            "destination": "南京",
            "start_date": "2025-11-01",
            "end_date": "2025-11-04",
            "budget": 1000
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["trip_id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_reports_backends() {
    let app = build_app().await.expect("app should build");

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let parsed: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(parsed["status"], "ok");
    assert_eq!(parsed["completion"]["backend"], "remote");
}

#[tokio::test]
async fn itinerary_generation_returns_planning_trip() {
    let client = ScriptedCompletionClient::new();
    let app = app_with(&client);
    client.push_content(NANJING_PLAN);

    let (status, body) = send(
        &app,
        "POST",
        "/api/itinerary/generate",
        Some(json!({
            "destination": "南京",
            "start_date": "2025-11-01",
            "end_date": "2025-11-04",
            "budget": 1000
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "planning");
    assert_eq!(body["duration_days"], 4);
    assert_eq!(body["parse_stage"], "recovered");
    assert_eq!(body["trip"]["title"], "南京之旅");

    let days = body["trip"]["itinerary"]["days"].as_array().unwrap();
    let order = days.iter().map(|day| day["day"].as_u64().unwrap()).collect::<Vec<_>>();
    assert_eq!(order, vec![1, 2, 10]);
    assert_eq!(days[0]["activities"][0]["activity"], "中山陵");

    let trip_id = body["trip_id"].as_str().unwrap();
    let (status, fetched) = send(&app, "GET", &format!("/api/itinerary/{trip_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["id"], trip_id);

    let (status, listed) = send(&app, "GET", "/api/itinerary/list", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn reversed_dates_are_unprocessable() {
    let client = ScriptedCompletionClient::new();
    let app = app_with(&client);

    let (status, body) = send(
        &app,
        "POST",
        "/api/itinerary/generate",
        Some(json!({
            "destination": "南京",
            "start_date": "2025-11-04",
            "end_date": "2025-11-01"
        })),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "validation_error");
    assert_eq!(client.calls(), 0);
}

#[tokio::test]
async fn unknown_trip_is_not_found() {
    let client = ScriptedCompletionClient::new();
    let app = app_with(&client);

    let (status, body) = send(&app, "GET", "/api/itinerary/does-not-exist", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn manual_expenses_feed_budget_summary() {
    let client = ScriptedCompletionClient::new();
    let app = app_with(&client);
    let trip_id = create_trip(&app, &client).await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/budget/add",
        Some(json!({
            "trip_id": trip_id,
            "amount": 10,
            "category": "交通",
            "expense_date": "2025-11-01"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "validation_error");

    let (status, body) = send(
        &app,
        "POST",
        "/api/budget/add",
        Some(json!({
            "trip_id": trip_id,
            "amount": 250.5,
            "category": "transport",
            "description": "高铁",
            "expense_date": "2025-11-01"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["category"], "transport");

    let (status, listed) = send(&app, "GET", &format!("/api/budget/list?trip_id={trip_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let (status, summary) =
        send(&app, "GET", &format!("/api/budget/summary?trip_id={trip_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["total_expenses"], 250.5);
    assert_eq!(summary["remaining_budget"], 749.5);
}

#[tokio::test]
async fn ai_extract_degrades_to_null_record() {
    let client = ScriptedCompletionClient::with_replies(["not json at all"]);
    let app = app_with(&client);

    let (status, body) = send(
        &app,
        "POST",
        "/api/budget/ai-extract",
        Some(json!({ "text": "昨天买了点东西" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["parse_stage"], "fallback");
    assert_eq!(
        body["expense"],
        json!({
            "amount": null,
            "category": null,
            "description": null,
            "expense_date": null
        })
    );
}

#[tokio::test]
async fn budget_analysis_requires_expenses() {
    let client = ScriptedCompletionClient::new();
    let app = app_with(&client);
    let trip_id = create_trip(&app, &client).await;
    let calls_before = client.calls();

    let (status, body) = send(
        &app,
        "POST",
        "/api/budget/analysis",
        Some(json!({ "trip_id": trip_id })),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "validation_error");
    assert_eq!(client.calls(), calls_before);
}

#[tokio::test]
async fn budget_analysis_returns_three_suggestions() {
    let client = ScriptedCompletionClient::new();
    let app = app_with(&client);
    let trip_id = create_trip(&app, &client).await;

    let (status, _) = send(
        &app,
        "POST",
        "/api/budget/add",
        Some(json!({
            "trip_id": trip_id,
            "amount": 300,
            "category": "food",
            "expense_date": "2025-11-02"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    client.push_content(
        r#"{"analysis": "餐饮支出占比较高", "suggestions": ["尝试本地小吃", "减少正餐次数", "提前预订", "多余的一条"]}"#,
    );
    let (status, body) = send(
        &app,
        "POST",
        "/api/budget/analysis",
        Some(json!({ "trip_id": trip_id })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["analysis"], "餐饮支出占比较高");
    assert_eq!(body["suggestions"].as_array().unwrap().len(), 3);
    assert_eq!(body["suggestions"][2], "提前预订");
}

#[tokio::test]
async fn text_parse_returns_trip_info() {
    let client = ScriptedCompletionClient::with_replies([
        r#"{"destination": "成都", "title": "成都三日游", "start_date": "2025-05-01", "end_date": "2025-05-03", "budget": 5000, "travelers": "2人", "preferences": "美食"}"#,
    ]);
    let app = app_with(&client);

    let (status, body) = send(
        &app,
        "POST",
        "/api/text/parse",
        Some(json!({ "text": "五一和老婆去成都玩三天，预算五千", "reference_date": "2025-04-20" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["parse_stage"], "strict");
    assert_eq!(body["trip_info"]["destination"], "成都");
    assert_eq!(body["trip_info"]["travelers"], 2);
    assert_eq!(body["trip_info"]["budget"], 5000.0);
    assert!(client.requests()[0].user.contains("今天是2025-04-20"));
}

#[tokio::test]
async fn missing_credential_is_configuration_error() {
    let client = ScriptedCompletionClient::unconfigured();
    let app = app_with(&client);

    let (status, body) = send(
        &app,
        "POST",
        "/api/budget/ai-extract",
        Some(json!({ "text": "打车花了50" })),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "configuration_error");
    assert_eq!(client.calls(), 0);
}

#[tokio::test]
async fn upstream_failure_is_bad_gateway() {
    let client = ScriptedCompletionClient::new();
    client.push_failure("status 503: overloaded");
    let app = app_with(&client);

    let (status, body) = send(
        &app,
        "POST",
        "/api/text/parse",
        Some(json!({ "text": "下周去西安" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "upstream_error");
}
