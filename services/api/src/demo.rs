use crate::infra::{InMemoryDecisionRepository, JsonlDecisionRepository};
use clap::Args;
use decision_os::decisions::{
    builtin_templates, Alternative, ApproverRoles, CriteriaModel, Criterion, DecisionClass,
    DecisionHistory, DecisionId, DecisionMetadata, DecisionRepository, DecisionService,
    DecisionServiceError, Delta, GovernanceError, ModelRegistry, Perturbation, RuleBook,
    TransitionOutcome, TransitionRecord, Verification, DEFAULT_TOLERANCE,
};
use decision_os::error::AppError;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Persist the demo ledger to a JSON-lines store in this directory.
    #[arg(long)]
    pub(crate) store: Option<PathBuf>,
    /// Skip the stress-test portion of the demo.
    #[arg(long)]
    pub(crate) skip_scenarios: bool,
}

#[derive(Args, Debug)]
pub(crate) struct AuditArgs {
    /// Directory holding the JSON-lines decision store
    #[arg(long)]
    pub(crate) store: PathBuf,
    /// Identifier of the decision to verify
    #[arg(long)]
    pub(crate) decision: String,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        store,
        skip_scenarios,
    } = args;

    let registry = demo_registry()?;
    let id = match store {
        Some(path) => {
            let repository = Arc::new(JsonlDecisionRepository::open(&path)?);
            let id = walkthrough(repository, registry, skip_scenarios)?;
            println!("\nLedger persisted under {}", path.display());
            println!(
                "Re-check it with: audit --store {} --decision {}",
                path.display(),
                id
            );
            id
        }
        None => {
            let repository = Arc::new(InMemoryDecisionRepository::default());
            walkthrough(repository, registry, skip_scenarios)?
        }
    };

    println!("\nDecision {} complete", id);
    Ok(())
}

pub(crate) fn run_templates() -> Result<(), AppError> {
    let templates = builtin_templates().map_err(DecisionServiceError::from)?;

    println!("Built-in decision templates");
    for template in &templates {
        println!("\n{} (v{}) - {}", template.id(), template.version(), template.name());
        for criterion in template.criteria() {
            println!(
                "  - {:<20} weight {:.2} | {} | scale {}-{}",
                criterion.id,
                criterion.weight,
                criterion.direction.label(),
                criterion.scale.min,
                criterion.scale.max
            );
        }
        let bands: Vec<String> = template
            .outcome_bands()
            .iter()
            .map(|band| format!("{} >= {:.2}", band.label, band.min_score))
            .collect();
        println!("  Outcomes: {}", bands.join(" | "));
    }
    Ok(())
}

pub(crate) fn run_audit(args: AuditArgs) -> Result<(), AppError> {
    let AuditArgs { store, decision } = args;
    let repository = JsonlDecisionRepository::open(&store)?;
    let id = DecisionId(decision);

    let header = repository
        .fetch(&id)
        .map_err(DecisionServiceError::from)?
        .ok_or_else(|| DecisionServiceError::DecisionNotFound(id.clone()))?;
    let entries = repository
        .entries(&header.id)
        .map_err(DecisionServiceError::from)?;
    let history = DecisionHistory::from_entries(header.id.clone(), entries);

    println!(
        "Decision {} | {} | revision {} | model {}",
        header.id, header.metadata.title, header.revision, header.model
    );
    for entry in history.entries() {
        println!(
            "  #{:<3} {:<22} {}",
            entry.sequence,
            entry.kind().label(),
            short_hash(&entry.content_hash)
        );
    }
    println!("Derived state: {}", history.derived_state().label());

    match history.verify() {
        Verification::Intact { entries } => {
            println!("Hash chain intact across {} entries", entries);
            Ok(())
        }
        Verification::Broken { sequence, fault } => {
            println!(
                "Hash chain broken at sequence {}: {}",
                sequence,
                fault.describe()
            );
            Err(AppError::Service(
                GovernanceError::HistoryIntegrityViolation { sequence }.into(),
            ))
        }
    }
}

fn demo_registry() -> Result<Arc<ModelRegistry>, AppError> {
    Ok(Arc::new(ModelRegistry::with_builtin_templates()?))
}

fn vendor_model() -> Result<CriteriaModel, decision_os::decisions::CriteriaModelError> {
    CriteriaModel::new(
        "vendor_selection",
        1,
        "Vendor selection",
        vec![
            Criterion::minimize("cost", 0.6, 0.0, 100.0),
            Criterion::maximize("quality", 0.4, 0.0, 10.0),
        ],
    )
}

fn demo_metadata() -> DecisionMetadata {
    DecisionMetadata {
        title: "Select a freight partner".to_string(),
        context: "Current contract expires at quarter end".to_string(),
        decision_type: "procurement".to_string(),
        decision_class: DecisionClass::OneWay,
        owner: "Operations lead".to_string(),
        stakeholders: vec!["Finance".to_string(), "Logistics".to_string()],
        assumptions: vec!["Volumes stay within 10% of forecast".to_string()],
        risks: vec!["Switching costs if the partner underdelivers".to_string()],
        review_date: chrono::NaiveDate::from_ymd_opt(2026, 3, 31),
        responsibility_confirmed: true,
    }
}

fn walkthrough<R>(
    repository: Arc<R>,
    registry: Arc<ModelRegistry>,
    skip_scenarios: bool,
) -> Result<DecisionId, AppError>
where
    R: DecisionRepository + 'static,
{
    let service = DecisionService::open(repository, registry, DEFAULT_TOLERANCE)?;

    println!("DecisionOS walkthrough");
    let model = service.register_model(vendor_model().map_err(DecisionServiceError::from)?)?;
    let view = service.create(model, demo_metadata())?;
    println!(
        "Created {} ({}) for '{}'",
        view.id,
        view.metadata.decision_class.label(),
        view.metadata.title
    );

    let alternative = Alternative::new("acme_freight")
        .with_value("cost", 40.0)
        .with_value("quality", 8.0);
    let score = service.score(&view.id, alternative)?;
    println!(
        "\nScore {:.3} ({} confidence) | input hash {}",
        score.total_score,
        score.confidence().label(),
        short_hash(&score.input_hash)
    );

    let explanation = service.explain(&view.id)?;
    println!("Contribution ranking:");
    for entry in &explanation.entries {
        println!(
            "  {}. {:<8} weight {:.2} | normalized {:.2} | contribution {:.3} | share {:.0}% | shortfall {:.3}",
            entry.rank,
            entry.criterion_id,
            entry.weight,
            entry.normalized_value,
            entry.contribution,
            entry.share * 100.0,
            entry.shortfall
        );
    }

    let playbook = service.playbook(&view.id)?;
    println!("{}", playbook.summary);
    for flag in &playbook.flags {
        println!("  ! {}", flag);
    }

    if !skip_scenarios {
        let perturbations = [
            Perturbation::weight("cost_weight_up", "cost", Delta::Percent(20.0)),
            Perturbation::input("quality_slips", "quality", Delta::Absolute(-2.0)),
        ];
        let report = service.stress_test(&view.id, &perturbations)?;
        println!("\nStress test");
        for run in &report.runs {
            println!(
                "  {:<16} total {:.3} (delta {:+.3}){}",
                run.name,
                run.result.total_score,
                run.delta.total,
                if run.delta.reordered {
                    " | ranking changed"
                } else {
                    ""
                }
            );
        }
        if let (Some(worst), Some(best), Some(spread)) =
            (&report.worst_case, &report.best_case, report.spread)
        {
            println!(
                "  Bounds: worst {:.3} | best {:.3} | spread {:.3}",
                worst.result.total_score, best.result.total_score, spread
            );
        }
        if let Some(run) = report.most_sensitive() {
            println!("  Most sensitive to: {}", run.name);
        }
    }

    println!("\nGovernance trail");
    print_transition(&service.submit_for_review(&view.id)?);
    let readiness = service.evaluate_readiness_with(
        &view.id,
        &RuleBook::standard(),
        &ApproverRoles::new(["approver"]),
    )?;
    for verdict in &readiness.verdicts {
        println!(
            "    [{}] {}: {}",
            if verdict.passed { "pass" } else { "fail" },
            verdict.name,
            verdict.detail
        );
    }
    let readiness = readiness
        .into_result()
        .map_err(DecisionServiceError::from)?;
    println!("  readiness -> {}", readiness.state.label());
    print_transition(&service.lock(&view.id)?);

    let contract = service.validity_contract(&view.id)?;
    println!("\nValid while:");
    for condition in &contract.valid_if {
        println!("  - {}", condition);
    }
    println!("Invalidated if:");
    for trigger in &contract.invalidates_if {
        println!("  - {}", trigger);
    }
    println!("{}", contract.cadence);

    let verification = service.verify(&view.id)?;
    let history = service.history(&view.id)?;
    match verification {
        Verification::Intact { entries } => {
            println!("\nLedger intact: {} entries", entries);
        }
        Verification::Broken { sequence, fault } => {
            println!("\nLedger broken at {}: {}", sequence, fault.describe());
        }
    }
    if let Some(last) = history.last() {
        println!("Head hash {}", short_hash(&last.content_hash));
    }

    Ok(view.id)
}

fn print_transition(record: &TransitionRecord) {
    match &record.outcome {
        TransitionOutcome::Applied => println!(
            "  {} : {} -> {}",
            record.transition.label(),
            record.from.label(),
            record.to.label()
        ),
        TransitionOutcome::Refused { reason } => println!(
            "  {} refused in {}: {}",
            record.transition.label(),
            record.from.label(),
            reason
        ),
    }
}

fn short_hash(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}
