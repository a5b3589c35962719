use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;

use super::catalog::builtin_templates;
use super::criteria::{CriteriaModel, ModelVersion};
use super::domain::{DecisionId, DecisionMetadata, FollowUpOutcome};
use super::governance::{ApproverRoles, GovernanceError, RuleBook};
use super::history::HistoryError;
use super::registry::RegistryError;
use super::repository::{DecisionRepository, RepositoryError};
use super::scenario::Perturbation;
use super::scoring::Alternative;
use super::service::{DecisionService, DecisionServiceError};

/// Shared state for decision routes: the service and the server's readiness policy.
pub struct DecisionRoutes<R> {
    pub service: Arc<DecisionService<R>>,
    pub rules: Arc<RuleBook>,
}

impl<R> Clone for DecisionRoutes<R> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            rules: Arc::clone(&self.rules),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDecisionRequest {
    pub model: ModelVersion,
    #[serde(default)]
    pub metadata: DecisionMetadata,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReviseDecisionRequest {
    #[serde(default)]
    pub model: Option<ModelVersion>,
}

/// Callers only assert their roles; the rules come from server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReadinessRequest {
    #[serde(default)]
    pub roles: ApproverRoles,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeRequest {
    pub outcome: FollowUpOutcome,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioRequest {
    pub perturbations: Vec<Perturbation>,
}

/// Router builder exposing the decision lifecycle over JSON.
pub fn decision_router<R>(service: Arc<DecisionService<R>>, rules: Arc<RuleBook>) -> Router
where
    R: DecisionRepository + 'static,
{
    Router::new()
        .route("/api/v1/models", post(register_model_handler::<R>))
        .route("/api/v1/templates", get(templates_handler))
        .route("/api/v1/decisions", post(create_handler::<R>))
        .route("/api/v1/decisions/:decision_id", get(get_handler::<R>))
        .route(
            "/api/v1/decisions/:decision_id/revisions",
            post(revise_handler::<R>),
        )
        .route(
            "/api/v1/decisions/:decision_id/scores",
            post(score_handler::<R>),
        )
        .route("/api/v1/portfolio/metrics", get(portfolio_handler::<R>))
        .route(
            "/api/v1/decisions/:decision_id/explanation",
            get(explanation_handler::<R>),
        )
        .route(
            "/api/v1/decisions/:decision_id/playbook",
            get(playbook_handler::<R>),
        )
        .route(
            "/api/v1/decisions/:decision_id/contract",
            get(contract_handler::<R>),
        )
        .route(
            "/api/v1/decisions/:decision_id/submit",
            post(submit_handler::<R>),
        )
        .route(
            "/api/v1/decisions/:decision_id/readiness",
            post(readiness_handler::<R>),
        )
        .route("/api/v1/decisions/:decision_id/lock", post(lock_handler::<R>))
        .route(
            "/api/v1/decisions/:decision_id/reopen",
            post(reopen_handler::<R>),
        )
        .route(
            "/api/v1/decisions/:decision_id/scenarios",
            post(scenario_handler::<R>),
        )
        .route(
            "/api/v1/decisions/:decision_id/outcome",
            post(outcome_handler::<R>),
        )
        .route(
            "/api/v1/decisions/:decision_id/history",
            get(history_handler::<R>),
        )
        .route(
            "/api/v1/decisions/:decision_id/verify",
            get(verify_handler::<R>),
        )
        .with_state(DecisionRoutes { service, rules })
}

/// HTTP status for a service failure: caller mistakes are 4xx, everything else 5xx.
pub fn status_for(error: &DecisionServiceError) -> StatusCode {
    match error {
        DecisionServiceError::DecisionNotFound(_)
        | DecisionServiceError::Repository(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
        DecisionServiceError::UnknownModel(_)
        | DecisionServiceError::Model(_)
        | DecisionServiceError::Scoring(_)
        | DecisionServiceError::Scenario(_)
        | DecisionServiceError::Registry(RegistryError::InvalidModel(_))
        | DecisionServiceError::Registry(RegistryError::VariantNotRegistrable(_)) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        DecisionServiceError::Registry(RegistryError::VersionConflict(_))
        | DecisionServiceError::Repository(RepositoryError::Conflict)
        | DecisionServiceError::History(HistoryError::DecisionLocked(_))
        | DecisionServiceError::History(HistoryError::OutcomeBeforeLock(_))
        | DecisionServiceError::Governance(GovernanceError::NoScoreRecorded)
        | DecisionServiceError::Governance(GovernanceError::DecisionLocked(_))
        | DecisionServiceError::Governance(GovernanceError::InvalidTransition { .. })
        | DecisionServiceError::Governance(GovernanceError::GovernanceRuleFailure(_))
        | DecisionServiceError::Governance(GovernanceError::History(
            HistoryError::DecisionLocked(_) | HistoryError::OutcomeBeforeLock(_),
        )) => StatusCode::CONFLICT,
        DecisionServiceError::StressTestInterrupted { source, .. } => status_for(source),
        DecisionServiceError::Registry(RegistryError::Unavailable)
        | DecisionServiceError::Repository(RepositoryError::Unavailable(_)) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        DecisionServiceError::Governance(GovernanceError::HistoryIntegrityViolation { .. })
        | DecisionServiceError::Governance(GovernanceError::History(_))
        | DecisionServiceError::History(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn error_response(error: DecisionServiceError) -> Response {
    let status = status_for(&error);
    let payload = match &error {
        DecisionServiceError::Governance(GovernanceError::GovernanceRuleFailure(rules)) => json!({
            "error": error.to_string(),
            "failed_rules": rules,
        }),
        DecisionServiceError::Governance(GovernanceError::HistoryIntegrityViolation {
            sequence,
        }) => json!({
            "error": error.to_string(),
            "first_divergent_sequence": sequence,
        }),
        DecisionServiceError::StressTestInterrupted {
            recorded, total, ..
        } => json!({
            "error": error.to_string(),
            "recorded_runs": recorded,
            "total_runs": total,
        }),
        _ => json!({
            "error": error.to_string(),
        }),
    };
    (status, Json(payload)).into_response()
}

fn respond<T: Serialize>(status: StatusCode, result: Result<T, DecisionServiceError>) -> Response {
    match result {
        Ok(body) => (status, Json(body)).into_response(),
        Err(error) => error_response(error),
    }
}

/// Run a service call on the blocking pool; repository writes may fsync.
async fn blocking<R, T, F>(routes: DecisionRoutes<R>, status: StatusCode, call: F) -> Response
where
    R: DecisionRepository + 'static,
    T: Serialize + Send + 'static,
    F: FnOnce(&DecisionService<R>) -> Result<T, DecisionServiceError> + Send + 'static,
{
    let service = routes.service;
    match tokio::task::spawn_blocking(move || call(&service)).await {
        Ok(result) => respond(status, result),
        Err(join_error) => {
            error!(error = %join_error, "decision service task failed");
            let payload = json!({
                "error": "decision service task failed",
            });
            (StatusCode::INTERNAL_SERVER_ERROR, Json(payload)).into_response()
        }
    }
}

pub(crate) async fn register_model_handler<R>(
    State(routes): State<DecisionRoutes<R>>,
    Json(model): Json<CriteriaModel>,
) -> Response
where
    R: DecisionRepository + 'static,
{
    blocking(routes, StatusCode::CREATED, move |service| {
        service
            .register_model(model)
            .map(|version| json!({ "model": version }))
    })
    .await
}

pub(crate) async fn templates_handler() -> Response {
    match builtin_templates() {
        Ok(templates) => (StatusCode::OK, Json(templates)).into_response(),
        Err(error) => {
            let payload = json!({
                "error": error.to_string(),
            });
            (StatusCode::INTERNAL_SERVER_ERROR, Json(payload)).into_response()
        }
    }
}

pub(crate) async fn create_handler<R>(
    State(routes): State<DecisionRoutes<R>>,
    Json(request): Json<CreateDecisionRequest>,
) -> Response
where
    R: DecisionRepository + 'static,
{
    blocking(routes, StatusCode::CREATED, move |service| {
        service.create(request.model, request.metadata)
    })
    .await
}

pub(crate) async fn get_handler<R>(
    State(routes): State<DecisionRoutes<R>>,
    Path(decision_id): Path<String>,
) -> Response
where
    R: DecisionRepository + 'static,
{
    blocking(routes, StatusCode::OK, move |service| {
        service.get(&DecisionId(decision_id))
    })
    .await
}

pub(crate) async fn revise_handler<R>(
    State(routes): State<DecisionRoutes<R>>,
    Path(decision_id): Path<String>,
    Json(request): Json<ReviseDecisionRequest>,
) -> Response
where
    R: DecisionRepository + 'static,
{
    blocking(routes, StatusCode::CREATED, move |service| {
        service.revise(&DecisionId(decision_id), request.model)
    })
    .await
}

pub(crate) async fn score_handler<R>(
    State(routes): State<DecisionRoutes<R>>,
    Path(decision_id): Path<String>,
    Json(alternative): Json<Alternative>,
) -> Response
where
    R: DecisionRepository + 'static,
{
    blocking(routes, StatusCode::CREATED, move |service| {
        service.score(&DecisionId(decision_id), alternative)
    })
    .await
}

pub(crate) async fn explanation_handler<R>(
    State(routes): State<DecisionRoutes<R>>,
    Path(decision_id): Path<String>,
) -> Response
where
    R: DecisionRepository + 'static,
{
    blocking(routes, StatusCode::OK, move |service| {
        service.explain(&DecisionId(decision_id))
    })
    .await
}

pub(crate) async fn playbook_handler<R>(
    State(routes): State<DecisionRoutes<R>>,
    Path(decision_id): Path<String>,
) -> Response
where
    R: DecisionRepository + 'static,
{
    blocking(routes, StatusCode::OK, move |service| {
        service.playbook(&DecisionId(decision_id))
    })
    .await
}

pub(crate) async fn contract_handler<R>(
    State(routes): State<DecisionRoutes<R>>,
    Path(decision_id): Path<String>,
) -> Response
where
    R: DecisionRepository + 'static,
{
    blocking(routes, StatusCode::OK, move |service| {
        service.validity_contract(&DecisionId(decision_id))
    })
    .await
}

pub(crate) async fn submit_handler<R>(
    State(routes): State<DecisionRoutes<R>>,
    Path(decision_id): Path<String>,
) -> Response
where
    R: DecisionRepository + 'static,
{
    blocking(routes, StatusCode::OK, move |service| {
        service.submit_for_review(&DecisionId(decision_id))
    })
    .await
}

pub(crate) async fn readiness_handler<R>(
    State(routes): State<DecisionRoutes<R>>,
    Path(decision_id): Path<String>,
    Json(request): Json<ReadinessRequest>,
) -> Response
where
    R: DecisionRepository + 'static,
{
    let rules = Arc::clone(&routes.rules);
    blocking(routes, StatusCode::OK, move |service| {
        service.evaluate_readiness_with(&DecisionId(decision_id), &rules, &request.roles)
    })
    .await
}

pub(crate) async fn lock_handler<R>(
    State(routes): State<DecisionRoutes<R>>,
    Path(decision_id): Path<String>,
) -> Response
where
    R: DecisionRepository + 'static,
{
    blocking(routes, StatusCode::OK, move |service| {
        service.lock(&DecisionId(decision_id))
    })
    .await
}

pub(crate) async fn reopen_handler<R>(
    State(routes): State<DecisionRoutes<R>>,
    Path(decision_id): Path<String>,
) -> Response
where
    R: DecisionRepository + 'static,
{
    blocking(routes, StatusCode::OK, move |service| {
        service.reopen(&DecisionId(decision_id))
    })
    .await
}

pub(crate) async fn scenario_handler<R>(
    State(routes): State<DecisionRoutes<R>>,
    Path(decision_id): Path<String>,
    Json(request): Json<ScenarioRequest>,
) -> Response
where
    R: DecisionRepository + 'static,
{
    blocking(routes, StatusCode::OK, move |service| {
        service.stress_test(&DecisionId(decision_id), &request.perturbations)
    })
    .await
}

pub(crate) async fn outcome_handler<R>(
    State(routes): State<DecisionRoutes<R>>,
    Path(decision_id): Path<String>,
    Json(request): Json<OutcomeRequest>,
) -> Response
where
    R: DecisionRepository + 'static,
{
    blocking(routes, StatusCode::CREATED, move |service| {
        service.record_outcome(&DecisionId(decision_id), request.outcome, request.notes)
    })
    .await
}

pub(crate) async fn portfolio_handler<R>(State(routes): State<DecisionRoutes<R>>) -> Response
where
    R: DecisionRepository + 'static,
{
    blocking(routes, StatusCode::OK, |service| service.portfolio_metrics()).await
}

pub(crate) async fn history_handler<R>(
    State(routes): State<DecisionRoutes<R>>,
    Path(decision_id): Path<String>,
) -> Response
where
    R: DecisionRepository + 'static,
{
    blocking(routes, StatusCode::OK, move |service| {
        service.history(&DecisionId(decision_id))
    })
    .await
}

pub(crate) async fn verify_handler<R>(
    State(routes): State<DecisionRoutes<R>>,
    Path(decision_id): Path<String>,
) -> Response
where
    R: DecisionRepository + 'static,
{
    blocking(routes, StatusCode::OK, move |service| {
        service.verify(&DecisionId(decision_id))
    })
    .await
}
