use super::common::*;
use crate::decisions::domain::{Decision, DecisionClass, DecisionMetadata};
use crate::decisions::governance::{
    ApproverRoles, GovernanceError, GovernanceGate, GovernanceState, NamedRule, ReadinessRule,
    RuleSet, Transition, TransitionOutcome,
};
use crate::decisions::history::{EntryKind, EntryPayload, HistoryError};
use crate::decisions::scenario::{Delta, Perturbation, ScenarioEngine};

fn approvers() -> ApproverRoles {
    ApproverRoles::new(["approver"])
}

fn under_review() -> Decision {
    let mut decision = scored_decision();
    GovernanceGate::default()
        .submit_for_review(&mut decision)
        .expect("submit succeeds");
    decision
}

fn locked() -> Decision {
    let gate = GovernanceGate::default();
    let mut decision = under_review();
    let report = gate
        .evaluate_readiness(&mut decision, &vendor_model(), &strict_rules(0.6), &approvers())
        .expect("readiness evaluates");
    assert!(report.approved);
    gate.lock(&mut decision).expect("lock succeeds");
    decision
}

#[test]
fn submit_without_score_is_refused_and_recorded() {
    let mut decision = decision_with(complete_metadata());

    match GovernanceGate::default().submit_for_review(&mut decision) {
        Err(GovernanceError::NoScoreRecorded) => {}
        other => panic!("expected no score, got {other:?}"),
    }

    assert_eq!(decision.state(), GovernanceState::Draft);
    assert_eq!(decision.history().len(), 1);
    let record = decision.history().transitions().next().expect("refusal recorded");
    assert_eq!(record.transition, Transition::SubmitForReview);
    assert!(matches!(record.outcome, TransitionOutcome::Refused { .. }));
}

#[test]
fn submit_records_the_score_it_was_judged_on() {
    let decision = under_review();
    assert_eq!(decision.state(), GovernanceState::UnderReview);

    let record = decision.history().transitions().last().expect("transition");
    assert!(record.is_applied());
    assert_eq!(
        record.score_hash.as_deref(),
        decision.latest_score().map(|score| score.input_hash.as_str())
    );
}

#[test]
fn one_failing_rule_rejects_the_decision() {
    let mut decision = under_review();

    let report = GovernanceGate::default()
        .evaluate_readiness(&mut decision, &vendor_model(), &strict_rules(0.7), &approvers())
        .expect("rejection is not an error");

    assert!(!report.approved);
    assert_eq!(report.state, GovernanceState::Rejected);
    assert_eq!(report.failed_rules, vec!["score-floor".to_string()]);
    assert_eq!(report.verdicts.len(), 4);
    assert_eq!(decision.state(), GovernanceState::Rejected);

    match report.into_result() {
        Err(GovernanceError::GovernanceRuleFailure(failed)) => {
            assert_eq!(failed, vec!["score-floor".to_string()])
        }
        other => panic!("expected rule failure, got {other:?}"),
    }
}

#[test]
fn score_below_the_floor_is_rejected_whatever_the_tolerance() {
    let gate = GovernanceGate::new(1e-2);
    let mut decision = scored_decision();
    gate.submit_for_review(&mut decision).expect("submit");
    let total = decision.latest_score().expect("scored").total_score;

    let report = gate
        .evaluate_readiness(
            &mut decision,
            &vendor_model(),
            &strict_rules(total + 5e-3),
            &approvers(),
        )
        .expect("evaluates");
    assert!(!report.approved);
    assert_eq!(report.failed_rules, vec!["score-floor".to_string()]);

    let mut exact = scored_decision();
    gate.submit_for_review(&mut exact).expect("submit");
    let report = gate
        .evaluate_readiness(&mut exact, &vendor_model(), &strict_rules(total), &approvers())
        .expect("evaluates");
    assert!(report.approved);
}

#[test]
fn missing_role_lists_only_that_rule() {
    let mut decision = under_review();
    let report = GovernanceGate::default()
        .evaluate_readiness(
            &mut decision,
            &vendor_model(),
            &strict_rules(0.5),
            &ApproverRoles::default(),
        )
        .expect("evaluates");

    assert_eq!(report.failed_rules, vec!["approver".to_string()]);
    let record = decision.history().transitions().last().expect("recorded");
    assert_eq!(record.rule_set.as_deref(), Some("strict"));
    assert_eq!(record.to, GovernanceState::Rejected);
}

#[test]
fn standard_rules_require_risks_for_one_way_decisions() {
    let mut metadata = complete_metadata();
    metadata.risks.clear();
    let mut decision = decision_with(metadata.clone());
    decision
        .append(EntryPayload::ScoreComputed(scored(
            &vendor_model(),
            &vendor_alternative(),
        )))
        .expect("score");
    let gate = GovernanceGate::default();
    gate.submit_for_review(&mut decision).expect("submit");

    let report = gate
        .evaluate_readiness(
            &mut decision,
            &vendor_model(),
            &RuleSet::standard(),
            &ApproverRoles::default(),
        )
        .expect("evaluates");
    assert_eq!(report.failed_rules, vec!["one_way_risks_documented".to_string()]);

    metadata.decision_class = DecisionClass::TwoWay;
    let mut reversible = decision_with(metadata);
    reversible
        .append(EntryPayload::ScoreComputed(scored(
            &vendor_model(),
            &vendor_alternative(),
        )))
        .expect("score");
    gate.submit_for_review(&mut reversible).expect("submit");
    let report = gate
        .evaluate_readiness(
            &mut reversible,
            &vendor_model(),
            &RuleSet::standard(),
            &ApproverRoles::default(),
        )
        .expect("evaluates");
    assert!(report.approved);
}

#[test]
fn metadata_completeness_reports_missing_fields() {
    let mut metadata = complete_metadata();
    metadata.stakeholders.clear();
    metadata.review_date = None;
    let mut decision = decision_with(metadata);
    decision
        .append(EntryPayload::ScoreComputed(scored(
            &vendor_model(),
            &vendor_alternative(),
        )))
        .expect("score");
    let gate = GovernanceGate::default();
    gate.submit_for_review(&mut decision).expect("submit");

    let rules = RuleSet::new(
        "brief",
        vec![NamedRule::new(
            "brief-complete",
            ReadinessRule::MetadataCompleteness { threshold: 0.8 },
        )],
    )
    .expect("valid");
    let report = gate
        .evaluate_readiness(&mut decision, &vendor_model(), &rules, &approvers())
        .expect("evaluates");

    assert!(!report.approved);
    let verdict = &report.verdicts[0];
    assert!(verdict.detail.contains("stakeholders"));
    assert!(verdict.detail.contains("review_date"));
}

#[test]
fn locked_decision_rejects_new_scores_and_scenarios() {
    let mut decision = locked();
    assert_eq!(decision.state(), GovernanceState::Locked);
    let length = decision.history().len();

    let score = scored(&vendor_model(), &vendor_alternative());
    match decision.append(EntryPayload::ScoreComputed(score.clone())) {
        Err(HistoryError::DecisionLocked(id)) => assert_eq!(id, *decision.id()),
        other => panic!("expected locked, got {other:?}"),
    }

    let engine = ScenarioEngine::default();
    let model = vendor_model();
    let perturbations = [Perturbation::input("cheaper", "cost", Delta::Absolute(-5.0))];
    let run = engine
        .stress_test_from(&model, score, &perturbations)
        .next()
        .expect("one run")
        .expect("run succeeds");
    assert!(matches!(
        decision.append(EntryPayload::ScenarioExecuted(run)),
        Err(HistoryError::DecisionLocked(_))
    ));

    assert_eq!(decision.history().len(), length);
}

#[test]
fn transitions_out_of_locked_are_refused() {
    let gate = GovernanceGate::default();
    let mut decision = locked();

    assert!(matches!(
        gate.lock(&mut decision),
        Err(GovernanceError::DecisionLocked(_))
    ));
    assert!(matches!(
        gate.reopen(&mut decision),
        Err(GovernanceError::DecisionLocked(_))
    ));
    assert_eq!(decision.state(), GovernanceState::Locked);
    assert_eq!(decision.history().count(EntryKind::GovernanceTransition), 5);
    assert!(decision.history().is_intact());
}

#[test]
fn rejected_decision_reopens_to_draft() {
    let gate = GovernanceGate::default();
    let mut decision = under_review();
    gate.evaluate_readiness(&mut decision, &vendor_model(), &strict_rules(0.9), &approvers())
        .expect("evaluates");
    assert_eq!(decision.state(), GovernanceState::Rejected);

    let record = gate.reopen(&mut decision).expect("reopen");
    assert_eq!(record.from, GovernanceState::Rejected);
    assert_eq!(record.to, GovernanceState::Draft);
    assert_eq!(decision.state(), GovernanceState::Draft);

    gate.submit_for_review(&mut decision).expect("resubmit");
    assert_eq!(decision.state(), GovernanceState::UnderReview);
}

#[test]
fn out_of_order_transitions_are_refused_and_recorded() {
    let gate = GovernanceGate::default();
    let mut decision = scored_decision();

    match gate.lock(&mut decision) {
        Err(GovernanceError::InvalidTransition { transition, from }) => {
            assert_eq!(transition, Transition::Lock);
            assert_eq!(from, GovernanceState::Draft);
        }
        other => panic!("expected invalid transition, got {other:?}"),
    }
    assert!(matches!(
        gate.evaluate_readiness(&mut decision, &vendor_model(), &strict_rules(0.5), &approvers()),
        Err(GovernanceError::InvalidTransition { .. })
    ));

    let refused: Vec<_> = decision
        .history()
        .transitions()
        .filter(|record| !record.is_applied())
        .collect();
    assert_eq!(refused.len(), 2);
    assert_eq!(decision.state(), GovernanceState::Draft);
}

#[test]
fn tampered_history_halts_readiness() {
    let decision = under_review();
    let mut entries = decision.history().entries().to_vec();
    if let EntryPayload::ScoreComputed(score) = &mut entries[0].payload {
        score.total_score = 0.99;
    } else {
        panic!("first entry should be a score");
    }
    let mut tampered = Decision::rehydrate(decision.header().clone(), entries);
    assert_eq!(tampered.state(), GovernanceState::UnderReview);

    match GovernanceGate::default().evaluate_readiness(
        &mut tampered,
        &vendor_model(),
        &strict_rules(0.5),
        &approvers(),
    ) {
        Err(GovernanceError::HistoryIntegrityViolation { sequence }) => assert_eq!(sequence, 0),
        other => panic!("expected integrity violation, got {other:?}"),
    }
    assert_eq!(tampered.state(), GovernanceState::UnderReview);
}

#[test]
fn readiness_without_score_is_refused() {
    let gate = GovernanceGate::default();
    let mut decision = under_review();
    // A decision moved to review by hand, without any score on record.
    let mut unscored = decision_with(complete_metadata());
    let attempt = gate.plan_submit(&decision);
    assert!(attempt.refusal.is_none());
    unscored
        .append(EntryPayload::GovernanceTransition(attempt.record))
        .expect("transition recorded");
    assert_eq!(unscored.state(), GovernanceState::UnderReview);

    assert!(matches!(
        gate.evaluate_readiness(&mut unscored, &vendor_model(), &strict_rules(0.5), &approvers()),
        Err(GovernanceError::NoScoreRecorded)
    ));
    assert!(gate.lock(&mut decision).is_err());
}

fn under_review_with(metadata: DecisionMetadata, cost: f64, quality: f64) -> Decision {
    let mut decision = decision_with(metadata);
    let alternative = vendor_alternative()
        .with_value("cost", cost)
        .with_value("quality", quality);
    decision
        .append(EntryPayload::ScoreComputed(scored(&vendor_model(), &alternative)))
        .expect("score");
    GovernanceGate::default()
        .submit_for_review(&mut decision)
        .expect("submit");
    decision
}

fn pillar(rule: ReadinessRule) -> RuleSet {
    RuleSet::new("pillar", vec![NamedRule::new("pillar", rule)]).expect("valid")
}

#[test]
fn high_confidence_without_risks_is_overconfident() {
    let mut metadata = complete_metadata();
    metadata.risks.clear();
    let mut decision = under_review_with(metadata, 0.0, 10.0);

    let report = GovernanceGate::default()
        .evaluate_readiness(
            &mut decision,
            &vendor_model(),
            &pillar(ReadinessRule::NoOverconfidence),
            &approvers(),
        )
        .expect("evaluates");
    assert!(!report.approved);
    assert!(report.verdicts[0].detail.contains("overconfidence"));

    let mut metadata = complete_metadata();
    metadata.assumptions = vec!["  ".to_string()];
    let mut medium = under_review_with(metadata, 40.0, 8.0);
    let report = GovernanceGate::default()
        .evaluate_readiness(
            &mut medium,
            &vendor_model(),
            &pillar(ReadinessRule::NoOverconfidence),
            &approvers(),
        )
        .expect("evaluates");
    assert!(!report.approved);
    assert!(report.verdicts[0].detail.starts_with("medium confidence"));
}

#[test]
fn severity_floor_binds_only_the_named_decision_type() {
    let floor = pillar(ReadinessRule::SeverityFloor {
        decision_type: "Strategic".to_string(),
        one_way_only: true,
        threshold: 0.75,
    });

    let mut metadata = complete_metadata();
    metadata.decision_type = " strategic ".to_string();
    let mut strategic = under_review_with(metadata.clone(), 40.0, 8.0);
    let report = GovernanceGate::default()
        .evaluate_readiness(&mut strategic, &vendor_model(), &floor, &approvers())
        .expect("evaluates");
    assert!(!report.approved);

    metadata.decision_class = DecisionClass::TwoWay;
    let mut reversible = under_review_with(metadata, 40.0, 8.0);
    let report = GovernanceGate::default()
        .evaluate_readiness(&mut reversible, &vendor_model(), &floor, &approvers())
        .expect("evaluates");
    assert!(report.approved);
    assert!(report.verdicts[0].detail.starts_with("not required"));

    let mut procurement = under_review_with(complete_metadata(), 40.0, 8.0);
    let report = GovernanceGate::default()
        .evaluate_readiness(&mut procurement, &vendor_model(), &floor, &approvers())
        .expect("evaluates");
    assert!(report.approved);
}
