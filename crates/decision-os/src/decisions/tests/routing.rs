use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, Request, StatusCode};
use axum::{Json, Router};
use serde_json::{json, Value};
use tower::ServiceExt;

use super::common::*;
use crate::decisions::criteria::{ModelVersion, DEFAULT_TOLERANCE};
use crate::decisions::domain::DecisionId;
use crate::decisions::governance::{ApproverRoles, RuleBook};
use crate::decisions::history::EntryPayload;
use crate::decisions::router::{decision_router, DecisionRoutes};
use crate::decisions::service::DecisionService;

fn routes() -> (DecisionRoutes<MemoryRepository>, Arc<MemoryRepository>) {
    let (service, repository) = build_service();
    let routes = DecisionRoutes {
        service: Arc::new(service),
        rules: Arc::new(RuleBook::from(strict_rules(0.6))),
    };
    (routes, repository)
}

fn router_for(routes: &DecisionRoutes<MemoryRepository>) -> Router {
    decision_router(routes.service.clone(), routes.rules.clone())
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request builds")
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).expect("request builds")
}

async fn create_decision(router: &Router) -> String {
    let response = router
        .clone()
        .oneshot(post_json(
            "/api/v1/decisions",
            json!({
                "model": { "model_id": "vendor", "version": 1 },
                "metadata": serde_json::to_value(complete_metadata()).expect("metadata json"),
            }),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::CREATED);
    let payload = read_json_body(response).await;
    payload["id"].as_str().expect("id").to_string()
}

fn acme() -> Value {
    json!({ "id": "acme", "values": { "cost": 40.0, "quality": 8.0 } })
}

#[tokio::test]
async fn decision_lifecycle_over_http() {
    let (routes, _) = routes();
    let router = router_for(&routes);
    let id = create_decision(&router).await;

    let response = router
        .clone()
        .oneshot(post_json(&format!("/api/v1/decisions/{id}/scores"), acme()))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::CREATED);
    let score = read_json_body(response).await;
    let total = score["total_score"].as_f64().expect("total");
    assert!((total - 0.68).abs() < 1e-12);

    let response = router
        .clone()
        .oneshot(get(&format!("/api/v1/decisions/{id}/explanation")))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let explanation = read_json_body(response).await;
    assert_eq!(explanation["entries"][0]["criterion_id"], "cost");

    let response = router
        .clone()
        .oneshot(post_json(&format!("/api/v1/decisions/{id}/submit"), json!({})))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);

    let response = router
        .clone()
        .oneshot(post_json(
            &format!("/api/v1/decisions/{id}/readiness"),
            json!({ "roles": ["approver"] }),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let report = read_json_body(response).await;
    assert_eq!(report["approved"], true);
    assert_eq!(report["state"], "approved");

    let response = router
        .clone()
        .oneshot(post_json(&format!("/api/v1/decisions/{id}/lock"), json!({})))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);

    let response = router
        .clone()
        .oneshot(post_json(&format!("/api/v1/decisions/{id}/scores"), acme()))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = router
        .clone()
        .oneshot(get(&format!("/api/v1/decisions/{id}/history")))
        .await
        .expect("route executes");
    let history = read_json_body(response).await;
    assert_eq!(history.as_array().map(Vec::len), Some(4));

    let response = router
        .oneshot(get(&format!("/api/v1/decisions/{id}/verify")))
        .await
        .expect("route executes");
    let verification = read_json_body(response).await;
    assert_eq!(verification["status"], "intact");
}

#[tokio::test]
async fn score_handler_rejects_out_of_range_input() {
    let (routes, repository) = routes();
    let view = routes
        .service
        .create(ModelVersion::new("vendor", 1), complete_metadata())
        .expect("create");

    let response = crate::decisions::router::score_handler::<MemoryRepository>(
        State(routes.clone()),
        Path(view.id.0.clone()),
        Json(vendor_alternative().with_value("quality", 11.0)),
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let payload = read_json_body(response).await;
    assert!(payload["error"].as_str().expect("message").contains("quality"));
    assert!(repository.entries.lock().expect("repository mutex poisoned").is_empty());
}

#[tokio::test]
async fn submit_handler_returns_conflict_without_score() {
    let (routes, _) = routes();
    let view = routes
        .service
        .create(ModelVersion::new("vendor", 1), complete_metadata())
        .expect("create");

    let response = crate::decisions::router::submit_handler::<MemoryRepository>(
        State(routes.clone()),
        Path(view.id.0.clone()),
    )
    .await;

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn get_handler_returns_not_found() {
    let (routes, _) = routes();
    let response = crate::decisions::router::get_handler::<MemoryRepository>(
        State(routes),
        Path("dec_unknown".to_string()),
    )
    .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn create_route_rejects_unknown_model() {
    let (routes, _) = routes();
    let response = router_for(&routes)
        .oneshot(post_json(
            "/api/v1/decisions",
            json!({ "model": { "model_id": "vendor", "version": 7 } }),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn readiness_rejection_is_reported_with_failed_rules() {
    let (routes, _) = routes();
    let router = router_for(&routes);
    let id = create_decision(&router).await;
    let decision_id = DecisionId(id.clone());
    routes
        .service
        .score(&decision_id, vendor_alternative())
        .expect("score");
    routes.service.submit_for_review(&decision_id).expect("submit");

    let response = router
        .oneshot(post_json(&format!("/api/v1/decisions/{id}/readiness"), json!({})))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let report = read_json_body(response).await;
    assert_eq!(report["approved"], false);
    assert_eq!(report["failed_rules"], json!(["approver"]));
}

#[tokio::test]
async fn scenario_route_returns_sensitivity_report() {
    let (routes, _) = routes();
    let router = router_for(&routes);
    let id = create_decision(&router).await;
    router
        .clone()
        .oneshot(post_json(&format!("/api/v1/decisions/{id}/scores"), acme()))
        .await
        .expect("route executes");

    let response = router
        .oneshot(post_json(
            &format!("/api/v1/decisions/{id}/scenarios"),
            json!({
                "perturbations": [
                    { "name": "cost-up", "target": { "weight": "cost" }, "delta": { "percent": 20.0 } }
                ]
            }),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let report = read_json_body(response).await;
    let scenario_total = report["runs"][0]["result"]["total_score"]
        .as_f64()
        .expect("scenario total");
    assert!((scenario_total - 0.656).abs() < 1e-9);
    assert!(report["spread"].is_number());
}

#[tokio::test]
async fn integrity_violation_reports_first_divergent_sequence() {
    let repository = Arc::new(MemoryRepository::default());
    let writer = DecisionService::new(repository.clone(), registry(), DEFAULT_TOLERANCE);
    let id = writer
        .create(ModelVersion::new("vendor", 1), complete_metadata())
        .expect("create")
        .id;
    writer.score(&id, vendor_alternative()).expect("score");
    writer.submit_for_review(&id).expect("submit");
    repository.tamper(&id, 0, |entry| {
        if let EntryPayload::ScoreComputed(score) = &mut entry.payload {
            score.inputs.insert("cost".to_string(), 10.0);
        }
    });

    let reader = Arc::new(DecisionService::new(repository, registry(), DEFAULT_TOLERANCE));
    let response = decision_router(reader, Arc::new(RuleBook::from(strict_rules(0.5))))
        .oneshot(post_json(
            &format!("/api/v1/decisions/{id}/readiness"),
            json!({ "roles": ["approver"] }),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let payload = read_json_body(response).await;
    assert_eq!(payload["first_divergent_sequence"], 0);
}

#[tokio::test]
async fn templates_route_lists_builtin_models() {
    let (routes, _) = routes();
    let response = router_for(&routes)
        .oneshot(get("/api/v1/templates"))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let templates = read_json_body(response).await;
    let ids: Vec<_> = templates
        .as_array()
        .expect("array")
        .iter()
        .filter_map(|template| template["id"].as_str())
        .collect();
    assert_eq!(ids, vec!["go_no_go", "risk_exposure", "change_impact"]);
}

#[tokio::test]
async fn register_route_accepts_new_versions() {
    let (routes, _) = routes();
    let response = router_for(&routes)
        .oneshot(post_json(
            "/api/v1/models",
            json!({
                "id": "hiring",
                "name": "Hiring",
                "criteria": [
                    { "id": "skills", "weight": 0.7, "direction": "maximize", "scale": { "min": 0.0, "max": 5.0 } },
                    { "id": "salary", "weight": 0.3, "direction": "minimize", "scale": { "min": 50.0, "max": 150.0 } }
                ]
            }),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::CREATED);
    let payload = read_json_body(response).await;
    assert_eq!(payload["model"]["model_id"], "hiring");
    assert_eq!(payload["model"]["version"], 1);
}

#[tokio::test]
async fn readiness_request_cannot_replace_the_configured_rules() {
    let (service, _) = build_service();
    let routes = DecisionRoutes {
        service: Arc::new(service),
        rules: Arc::new(RuleBook::from(strict_rules(0.9))),
    };
    let router = router_for(&routes);
    let id = create_decision(&router).await;
    let decision_id = DecisionId(id.clone());
    routes
        .service
        .score(&decision_id, vendor_alternative())
        .expect("score");
    routes.service.submit_for_review(&decision_id).expect("submit");

    let lenient = serde_json::to_value(strict_rules(0.0)).expect("rules json");
    let response = router
        .clone()
        .oneshot(post_json(
            &format!("/api/v1/decisions/{id}/readiness"),
            json!({ "roles": ["approver"], "rule_set": lenient }),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(routes.service.history(&decision_id).expect("history").len(), 2);

    let response = router
        .clone()
        .oneshot(post_json(
            &format!("/api/v1/decisions/{id}/readiness"),
            json!({ "roles": ["approver"] }),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let report = read_json_body(response).await;
    assert_eq!(report["approved"], false);
    assert_eq!(report["failed_rules"], json!(["score-floor"]));

    let response = router
        .clone()
        .oneshot(post_json(&format!("/api/v1/decisions/{id}/lock"), json!({})))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = router
        .oneshot(get(&format!("/api/v1/decisions/{id}")))
        .await
        .expect("route executes");
    let view = read_json_body(response).await;
    assert_eq!(view["state"], "rejected");
}

#[tokio::test]
async fn outcome_route_requires_a_locked_decision() {
    let (routes, _) = routes();
    let router = router_for(&routes);
    let id = create_decision(&router).await;
    let decision_id = DecisionId(id.clone());
    routes
        .service
        .score(&decision_id, vendor_alternative())
        .expect("score");

    let outcome = json!({ "outcome": "success", "notes": "Delivered on time" });
    let response = router
        .clone()
        .oneshot(post_json(&format!("/api/v1/decisions/{id}/outcome"), outcome.clone()))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::CONFLICT);

    routes.service.submit_for_review(&decision_id).expect("submit");
    routes
        .service
        .evaluate_readiness(&decision_id, &strict_rules(0.6), &ApproverRoles::new(["approver"]))
        .expect("readiness");
    routes.service.lock(&decision_id).expect("lock");

    let response = router
        .clone()
        .oneshot(post_json(&format!("/api/v1/decisions/{id}/outcome"), outcome))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::CREATED);
    let follow_up = read_json_body(response).await;
    assert_eq!(follow_up["outcome"], "success");

    let response = router
        .oneshot(get("/api/v1/portfolio/metrics"))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let metrics = read_json_body(response).await;
    assert_eq!(metrics["decisions"], 1);
    assert_eq!(metrics["follow_ups"]["success"], 1);
}

#[tokio::test]
async fn playbook_and_contract_routes_describe_the_decision() {
    let (routes, _) = routes();
    let router = router_for(&routes);
    let id = create_decision(&router).await;

    let response = router
        .clone()
        .oneshot(get(&format!("/api/v1/decisions/{id}/playbook")))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::CONFLICT);

    router
        .clone()
        .oneshot(post_json(&format!("/api/v1/decisions/{id}/scores"), acme()))
        .await
        .expect("route executes");
    let response = router
        .clone()
        .oneshot(get(&format!("/api/v1/decisions/{id}/playbook")))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let playbook = read_json_body(response).await;
    assert_eq!(playbook["focus"][0]["criterion_id"], "cost");

    let response = router
        .oneshot(get(&format!("/api/v1/decisions/{id}/contract")))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let contract = read_json_body(response).await;
    assert_eq!(contract["review_on"], "2025-09-01");
    assert_eq!(contract["valid_if"][0], "Volumes stay flat");
}
