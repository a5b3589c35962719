use crate::cli::ServeArgs;
use crate::infra::{AppState, InMemoryDecisionRepository, JsonlDecisionRepository};
use crate::routes::with_decision_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use decision_os::config::AppConfig;
use decision_os::decisions::{DecisionRepository, DecisionService, ModelRegistry, RuleBook};
use decision_os::error::AppError;
use decision_os::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let tolerance = config.engine.tolerance;
    let registry = ModelRegistry::with_tolerance(tolerance)?;
    registry.load_builtin_templates()?;
    let registry = Arc::new(registry);
    let rules = match &config.governance.rules_path {
        Some(path) => RuleBook::load(path)?,
        None => RuleBook::standard(),
    };
    info!(
        decision_types = rules.decision_types().count(),
        "readiness rules loaded"
    );
    let rules = Arc::new(rules);

    let app = match &config.storage.history_path {
        Some(path) => {
            info!(path = %path.display(), "persisting decision history as json lines");
            let repository = Arc::new(JsonlDecisionRepository::open(path)?);
            decision_app(repository, registry, rules, tolerance)?
        }
        None => {
            let repository = Arc::new(InMemoryDecisionRepository::default());
            decision_app(repository, registry, rules, tolerance)?
        }
    };

    let app = app
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, tolerance, "decision service ready");

    axum::serve(listener, app).await?;
    Ok(())
}

fn decision_app<R>(
    repository: Arc<R>,
    registry: Arc<ModelRegistry>,
    rules: Arc<RuleBook>,
    tolerance: f64,
) -> Result<axum::Router, AppError>
where
    R: DecisionRepository + 'static,
{
    let service = DecisionService::open(repository, registry, tolerance)?;
    Ok(with_decision_routes(Arc::new(service), rules))
}
