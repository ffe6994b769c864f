//! The caller-facing orchestration surface.
//!
//! [`GateEngine`] ties the store, validator registry, circuit breaker and
//! trigger dispatcher together. Every mutating call takes an explicit
//! [`Actor`]; role checks and audit writes happen inside the store so a
//! denied write is recorded in the same place it is refused.

use std::path::Path;

use gatekeeper_common::{Actor, HandoffType, Phase};

use super::{HandoffDraft, HandoffResult, executor_for};
use crate::audit::AuditEvent;
use crate::errors::{GateError, GateResult};
use crate::gate_config::GateConfig;
use crate::gates::CircuitBreaker;
use crate::progress::{ProgressAggregator, ProgressBreakdown};
use crate::review::{
    ActivationOutbox, ActivationRecord, DEFAULT_MAX_ATTEMPTS, DeliveryReport, NewReviewerResult,
    ReviewerActivation, ReviewerResult, ReviewerSink, TriggerContext, TriggerDispatcher,
};
use crate::store::{
    AcceptResult, DbHandle, Deliverable, Directive, Evidence, GateDb, Handoff, HandoffFilter,
    NewDirective, NewHandoff, PlanDocument,
};
use crate::validation::{ValidationContext, ValidatorRegistry, aggregate};

pub struct GateEngine {
    db: DbHandle,
    registry: ValidatorRegistry,
    breaker: CircuitBreaker,
    dispatcher: TriggerDispatcher,
    aggregator: ProgressAggregator,
    max_attempts: u32,
}

impl GateEngine {
    pub fn new(
        db: GateDb,
        registry: ValidatorRegistry,
        breaker: CircuitBreaker,
        dispatcher: TriggerDispatcher,
    ) -> Self {
        Self {
            db: DbHandle::new(db),
            registry,
            breaker,
            dispatcher,
            aggregator: ProgressAggregator::new(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Built-in validators, default threshold and default triggers.
    pub fn with_defaults(db: GateDb) -> GateResult<Self> {
        Ok(Self::new(
            db,
            ValidatorRegistry::with_builtins(),
            CircuitBreaker::default(),
            TriggerDispatcher::with_defaults()?,
        ))
    }

    /// Open the configured database and wire every component from `config`.
    pub fn from_config(config: &GateConfig) -> GateResult<Self> {
        config.ensure_valid()?;
        let db = GateDb::new(&config.db_path())?;
        tracing::debug!(
            db = %config.db_path().display(),
            threshold = config.threshold().value(),
            "gate engine configured"
        );
        Ok(Self::new(db, config.registry(), config.circuit_breaker(), config.dispatcher()?)
            .with_max_attempts(config.max_delivery_attempts()))
    }

    /// Engine over a database file with defaults for everything else.
    pub fn open(path: &Path) -> GateResult<Self> {
        Self::with_defaults(GateDb::new(path)?)
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn dispatcher(&self) -> &TriggerDispatcher {
        &self.dispatcher
    }

    // ── Directives ───────────────────────────────────────────────────

    /// Create a directive in INITIATION and queue the reviewers its text triggers.
    pub async fn create_directive(&self, input: NewDirective, actor: &Actor) -> GateResult<Directive> {
        let activations = self.dispatcher.dispatch_all(&[
            (input.title.as_str(), TriggerContext::Directive),
            (input.description.as_str(), TriggerContext::Directive),
        ]);
        let actor = actor.clone();
        let directive = self
            .db
            .call(move |db| db.create_directive(&input, &actor, &activations))
            .await?;
        tracing::info!(
            directive_id = directive.id,
            title = %directive.title,
            "directive created"
        );
        Ok(directive)
    }

    pub async fn activate_directive(&self, id: i64, actor: &Actor) -> GateResult<Directive> {
        let actor = actor.clone();
        self.db.call(move |db| db.activate_directive(id, &actor)).await
    }

    pub async fn defer_directive(&self, id: i64, actor: &Actor) -> GateResult<Directive> {
        let actor = actor.clone();
        self.db.call(move |db| db.defer_directive(id, &actor)).await
    }

    pub async fn get_directive(&self, id: i64) -> GateResult<Directive> {
        self.db.call(move |db| db.get_directive(id)).await
    }

    pub async fn list_directives(&self) -> GateResult<Vec<Directive>> {
        Ok(self.db.call(|db| db.list_directives()).await?)
    }

    // ── Evidence ─────────────────────────────────────────────────────

    pub async fn set_plan_document(
        &self,
        directive_id: i64,
        content: String,
        actor: &Actor,
    ) -> GateResult<PlanDocument> {
        let actor = actor.clone();
        self.db
            .call(move |db| db.set_plan_document(directive_id, &content, &actor))
            .await
    }

    pub async fn track_deliverable(
        &self,
        directive_id: i64,
        name: String,
        kind: String,
        actor: &Actor,
    ) -> GateResult<Deliverable> {
        let actor = actor.clone();
        self.db
            .call(move |db| db.track_deliverable(directive_id, &name, &kind, &actor))
            .await
    }

    pub async fn complete_deliverable(&self, deliverable_id: i64, actor: &Actor) -> GateResult<Deliverable> {
        let actor = actor.clone();
        self.db
            .call(move |db| db.complete_deliverable(deliverable_id, &actor))
            .await
    }

    pub async fn record_reviewer_result(
        &self,
        directive_id: i64,
        input: NewReviewerResult,
        actor: &Actor,
    ) -> GateResult<ReviewerResult> {
        let actor = actor.clone();
        let result = self
            .db
            .call(move |db| db.record_reviewer_result(directive_id, &input, &actor))
            .await?;
        tracing::info!(
            directive_id,
            reviewer = %result.reviewer_code,
            verdict = %result.verdict,
            "reviewer result recorded"
        );
        Ok(result)
    }

    async fn load_evidence(&self, directive_id: i64) -> GateResult<Evidence> {
        self.db
            .call(move |db| Evidence::load(db.conn(), directive_id))
            .await
    }

    // ── Handoffs ─────────────────────────────────────────────────────

    /// Hand off from the directive's current phase to the next one.
    pub async fn execute(
        &self,
        directive_id: i64,
        draft: HandoffDraft,
        actor: &Actor,
    ) -> GateResult<HandoffResult> {
        let directive = self.get_directive(directive_id).await?;
        let handoff_type = directive.current_phase.outbound_handoff();
        self.create_handoff(
            directive_id,
            handoff_type.from_phase(),
            handoff_type.to_phase(),
            draft,
            actor,
        )
        .await
    }

    /// Score a handoff for `from → to`, persist the attempt and try to accept it.
    ///
    /// The attempt row is written whatever the score. A score under the
    /// threshold leaves it `pending_acceptance` and returns
    /// [`GateError::CircuitBreakerTripped`].
    pub async fn create_handoff(
        &self,
        directive_id: i64,
        from: Phase,
        to: Phase,
        draft: HandoffDraft,
        actor: &Actor,
    ) -> GateResult<HandoffResult> {
        let handoff_type = HandoffType::from_phases(from, to).ok_or_else(|| GateError::InvalidTransition {
            from,
            to,
            reason: "not an adjacent phase pair".to_string(),
        })?;

        let evidence = self.load_evidence(directive_id).await?;
        let prepared = executor_for(handoff_type).prepare(&evidence, &draft);
        if !prepared.gaps.is_empty() {
            tracing::debug!(directive_id, %handoff_type, gaps = ?prepared.gaps, "handoff evidence incomplete");
        }

        let activations = self.dispatcher.dispatch_all(&[
            (evidence.directive.title.as_str(), TriggerContext::Directive),
            (evidence.directive.description.as_str(), TriggerContext::Directive),
            (evidence.plan_text(), TriggerContext::Plan),
        ]);

        let ctx = ValidationContext {
            evidence,
            handoff_type,
            fields: prepared.fields.clone(),
            payload: prepared.payload.clone(),
        };
        let results = self.registry.run_all(ctx).await;
        let score = aggregate(&results, self.breaker.threshold());
        tracing::debug!(directive_id, %handoff_type, score = score.value(), "handoff scored");

        let input = NewHandoff {
            directive_id,
            handoff_type,
            validation_score: score,
            fields: prepared.fields,
            payload: prepared.payload,
            validation_details: results,
        };
        let handoff = self.insert_attempt(input, activations, actor).await?;

        match self.accept_handoff(handoff.id, actor).await? {
            AcceptResult::Accepted {
                handoff,
                directive,
                progress,
            } => Ok(HandoffResult {
                handoff,
                directive,
                progress,
            }),
            AcceptResult::AlreadyAccepted { handoff_id } => {
                let handoff = self.get_handoff(handoff_id).await?;
                let directive = self.get_directive(handoff.directive_id).await?;
                Ok(HandoffResult {
                    progress: directive.progress_percentage,
                    handoff,
                    directive,
                })
            }
        }
    }

    async fn insert_attempt(
        &self,
        input: NewHandoff,
        activations: Vec<ReviewerActivation>,
        actor: &Actor,
    ) -> GateResult<Handoff> {
        let actor = actor.clone();
        self.db
            .call(move |db| db.insert_handoff_attempt(&input, &actor, &activations))
            .await
    }

    /// Accept a pending handoff. A transition conflict is retried once
    /// against fresh state before it reaches the caller.
    pub async fn accept_handoff(&self, handoff_id: i64, actor: &Actor) -> GateResult<AcceptResult> {
        match self.try_accept(handoff_id, actor).await {
            Err(GateError::ConcurrentTransitionConflict { .. }) => {
                tracing::debug!(handoff_id, "transition conflict, retrying once");
                self.try_accept(handoff_id, actor).await
            }
            other => other,
        }
    }

    async fn try_accept(&self, handoff_id: i64, actor: &Actor) -> GateResult<AcceptResult> {
        let actor = actor.clone();
        let breaker = self.breaker;
        self.db
            .call(move |db| db.accept_handoff(handoff_id, &actor, &breaker))
            .await
    }

    pub async fn reject_handoff(&self, handoff_id: i64, actor: &Actor, reason: String) -> GateResult<Handoff> {
        let actor = actor.clone();
        self.db
            .call(move |db| db.reject_handoff(handoff_id, &actor, &reason))
            .await
    }

    pub async fn get_handoff(&self, id: i64) -> GateResult<Handoff> {
        self.db.call(move |db| db.get_handoff(id)).await
    }

    pub async fn list_pending_handoffs(&self, filter: HandoffFilter) -> GateResult<Vec<Handoff>> {
        Ok(self
            .db
            .call(move |db| db.list_pending_handoffs(&filter))
            .await?)
    }

    pub async fn handoff_history(&self, directive_id: i64) -> GateResult<Vec<Handoff>> {
        self.db.call(move |db| db.handoff_history(directive_id)).await
    }

    // ── Reads ────────────────────────────────────────────────────────

    pub async fn get_progress(&self, directive_id: i64) -> GateResult<ProgressBreakdown> {
        let evidence = self.load_evidence(directive_id).await?;
        Ok(self.aggregator.breakdown(&evidence))
    }

    pub async fn audit_trail(&self, directive_id: Option<i64>) -> GateResult<Vec<AuditEvent>> {
        Ok(self.db.call(move |db| db.audit_trail(directive_id)).await?)
    }

    pub async fn activations(&self, directive_id: Option<i64>) -> GateResult<Vec<ActivationRecord>> {
        Ok(self
            .db
            .call(move |db| db.list_activations(directive_id))
            .await?)
    }

    // ── Reviewer delivery ────────────────────────────────────────────

    pub async fn deliver_activations(&self, sink: &dyn ReviewerSink) -> GateResult<DeliveryReport> {
        let report = ActivationOutbox::new(self.db.clone(), self.max_attempts)
            .deliver_pending(sink)
            .await?;
        tracing::info!(
            delivered = report.delivered,
            failed = report.failed,
            "reviewer activations pushed"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditKind;
    use crate::review::{ReviewerCode, Verdict};
    use crate::store::{DirectiveStatus, HandoffStatus};
    use crate::validation::tests_support::complete_fields;
    use crate::validation::{ValidatorOutcome, Validator};
    use async_trait::async_trait;
    use gatekeeper_common::Score;
    use std::sync::Arc;

    const PLAN: &str = "Introduce a token bucket keyed by account id, persist buckets in SQLite, \
        expose lockout thresholds in configuration and cover the limiter with unit tests.";

    /// Scores every handoff with a fixed value.
    struct Fixed(u8);

    #[async_trait]
    impl Validator for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn validate(&self, _ctx: &ValidationContext) -> anyhow::Result<ValidatorOutcome> {
            Ok(ValidatorOutcome::from_issues(Score::saturating(self.0), Vec::new()))
        }
    }

    fn engine() -> GateEngine {
        GateEngine::with_defaults(GateDb::new_in_memory().unwrap()).unwrap()
    }

    fn fixed_engine(score: u8) -> GateEngine {
        let mut registry = ValidatorRegistry::new();
        registry.register(Arc::new(Fixed(score)));
        GateEngine::new(
            GateDb::new_in_memory().unwrap(),
            registry,
            CircuitBreaker::default(),
            TriggerDispatcher::with_defaults().unwrap(),
        )
    }

    fn draft() -> HandoffDraft {
        HandoffDraft {
            fields: complete_fields(),
        }
    }

    async fn active_directive(engine: &GateEngine, title: &str) -> Directive {
        let lead = Actor::lead("lead-1");
        let d = engine
            .create_directive(NewDirective::new(title, "Rate limit the login endpoint"), &lead)
            .await
            .unwrap();
        engine.activate_directive(d.id, &lead).await.unwrap()
    }

    #[tokio::test]
    async fn test_low_score_trips_breaker_and_keeps_phase() {
        let engine = fixed_engine(70);
        let d = active_directive(&engine, "Harden login").await;

        let err = engine
            .create_handoff(d.id, Phase::Initiation, Phase::Planning, draft(), &Actor::lead("lead-1"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "CIRCUIT_BREAKER_TRIPPED");

        let after = engine.get_directive(d.id).await.unwrap();
        assert_eq!(after.current_phase, Phase::Initiation);
        let pending = engine
            .list_pending_handoffs(HandoffFilter::for_directive(d.id))
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].validation_score.value(), 70);

        let blocks: Vec<_> = engine
            .audit_trail(Some(d.id))
            .await
            .unwrap()
            .into_iter()
            .filter(|e| e.kind == AuditKind::CircuitBreakerBlock)
            .collect();
        assert_eq!(blocks.len(), 1);
    }

    #[tokio::test]
    async fn test_perfect_score_advances_phase() {
        let engine = fixed_engine(100);
        let d = active_directive(&engine, "Harden login").await;

        let result = engine
            .create_handoff(d.id, Phase::Initiation, Phase::Planning, draft(), &Actor::lead("lead-1"))
            .await
            .unwrap();
        assert_eq!(result.handoff.status, HandoffStatus::Accepted);
        assert_eq!(result.directive.current_phase, Phase::Planning);
        assert_eq!(result.directive.status, DirectiveStatus::InProgress);

        let progress = engine.get_progress(d.id).await.unwrap();
        assert_eq!(progress.phases[&Phase::Initiation].completion, 1.0);
        assert_eq!(progress.overall, result.progress);
    }

    #[tokio::test]
    async fn test_non_adjacent_pair_is_invalid() {
        let engine = engine();
        let d = active_directive(&engine, "Harden login").await;
        let err = engine
            .create_handoff(d.id, Phase::Initiation, Phase::Verification, draft(), &Actor::lead("lead-1"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_TRANSITION");
        assert!(engine.handoff_history(d.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_wrong_role_is_denied_and_audited() {
        let engine = engine();
        let d = active_directive(&engine, "Harden login").await;
        let err = engine
            .execute(d.id, draft(), &Actor::exec("exec-1"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "CONSTRAINT_VIOLATION");

        let trail = engine.audit_trail(Some(d.id)).await.unwrap();
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].kind, AuditKind::ConstraintViolation);
        assert!(engine.handoff_history(d.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_draft_directive_cannot_hand_off() {
        let engine = engine();
        let d = engine
            .create_directive(NewDirective::new("Harden login", "desc"), &Actor::lead("lead-1"))
            .await
            .unwrap();
        let err = engine
            .execute(d.id, draft(), &Actor::lead("lead-1"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "CIRCUIT_BREAKER_TRIPPED");
        let history = engine.handoff_history(d.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert!(history[0].validation_score.value() < 85);
    }

    #[tokio::test]
    async fn test_accept_after_acceptance_is_idempotent() {
        let engine = fixed_engine(100);
        let d = active_directive(&engine, "Harden login").await;
        let lead = Actor::lead("lead-1");
        let result = engine.execute(d.id, draft(), &lead).await.unwrap();

        let again = engine.accept_handoff(result.handoff.id, &lead).await.unwrap();
        assert!(matches!(again, AcceptResult::AlreadyAccepted { handoff_id } if handoff_id == result.handoff.id));
        let after = engine.get_directive(d.id).await.unwrap();
        assert_eq!(after.current_phase, Phase::Planning);
    }

    #[tokio::test]
    async fn test_concurrent_accepts_advance_once() {
        // Threshold above the fixed score keeps the first attempt pending.
        let mut registry = ValidatorRegistry::new();
        registry.register(Arc::new(Fixed(90)));
        let db = GateDb::new_in_memory().unwrap();
        let engine = Arc::new(GateEngine::new(
            db,
            registry,
            CircuitBreaker::new(Score::saturating(95)),
            TriggerDispatcher::with_defaults().unwrap(),
        ));
        let d = active_directive(&engine, "Harden login").await;
        let lead = Actor::lead("lead-1");
        let err = engine.execute(d.id, draft(), &lead).await.unwrap_err();
        assert_eq!(err.code(), "CIRCUIT_BREAKER_TRIPPED");
        let pending = engine
            .list_pending_handoffs(HandoffFilter::for_directive(d.id))
            .await
            .unwrap();
        let id = pending[0].id;

        // Same store, lower threshold: both racers may pass the breaker.
        let racer = Arc::new(GateEngine {
            db: engine.db.clone(),
            registry: ValidatorRegistry::new(),
            breaker: CircuitBreaker::default(),
            dispatcher: TriggerDispatcher::with_defaults().unwrap(),
            aggregator: ProgressAggregator::new(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        });
        let a = {
            let racer = Arc::clone(&racer);
            let lead = lead.clone();
            tokio::spawn(async move { racer.accept_handoff(id, &lead).await })
        };
        let b = {
            let racer = Arc::clone(&racer);
            let lead = lead.clone();
            tokio::spawn(async move { racer.accept_handoff(id, &lead).await })
        };
        let outcomes = [a.await.unwrap().unwrap(), b.await.unwrap().unwrap()];
        let advanced = outcomes
            .iter()
            .filter(|o| matches!(o, AcceptResult::Accepted { .. }))
            .count();
        assert_eq!(advanced, 1);

        let after = engine.get_directive(d.id).await.unwrap();
        assert_eq!(after.current_phase, Phase::Planning);
    }

    #[tokio::test]
    async fn test_full_lifecycle_completes_directive() {
        let engine = engine();
        let lead = Actor::lead("lead-1");
        let plan = Actor::plan("plan-1");
        let exec = Actor::exec("exec-1");
        let reviewer = Actor::reviewer("reviewer-1");

        let d = engine
            .create_directive(
                NewDirective::new("Harden authentication", "Rate limit the login endpoint"),
                &lead,
            )
            .await
            .unwrap();
        engine.activate_directive(d.id, &lead).await.unwrap();
        let r = engine.execute(d.id, draft(), &lead).await.unwrap();
        assert_eq!(r.progress, 20);

        engine
            .set_plan_document(d.id, PLAN.to_string(), &plan)
            .await
            .unwrap();
        let deliverable = engine
            .track_deliverable(d.id, "rate limiter".into(), "code".into(), &plan)
            .await
            .unwrap();
        let r = engine.execute(d.id, draft(), &plan).await.unwrap();
        assert_eq!(r.directive.current_phase, Phase::Implementation);

        engine
            .complete_deliverable(deliverable.id, &exec)
            .await
            .unwrap();
        let r = engine.execute(d.id, draft(), &exec).await.unwrap();
        assert_eq!(r.directive.current_phase, Phase::Verification);

        let expected: Vec<ReviewerCode> = engine
            .activations(Some(d.id))
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.reviewer_code)
            .collect();
        assert!(expected.contains(&ReviewerCode::Security));
        for code in expected {
            engine
                .record_reviewer_result(
                    d.id,
                    NewReviewerResult::new(code, Verdict::Pass, Score::saturating(90)),
                    &reviewer,
                )
                .await
                .unwrap();
        }
        let r = engine.execute(d.id, draft(), &plan).await.unwrap();
        assert_eq!(r.directive.current_phase, Phase::FinalApproval);

        let r = engine.execute(d.id, draft(), &lead).await.unwrap();
        assert_eq!(r.directive.status, DirectiveStatus::Completed);
        assert_eq!(r.progress, 100);

        let progress = engine.get_progress(d.id).await.unwrap();
        assert!(progress.can_complete);
        assert_eq!(engine.handoff_history(d.id).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_handoff_queues_plan_triggered_reviewers() {
        let engine = fixed_engine(100);
        let d = active_directive(&engine, "Tidy widget").await;
        let lead = Actor::lead("lead-1");
        engine.execute(d.id, draft(), &lead).await.unwrap();
        engine
            .set_plan_document(
                d.id,
                "Keep backward compatibility with the v1 widget API.".to_string(),
                &Actor::plan("plan-1"),
            )
            .await
            .unwrap();
        engine.execute(d.id, draft(), &Actor::plan("plan-1")).await.unwrap();

        let activations = engine.activations(Some(d.id)).await.unwrap();
        let regression: Vec<_> = activations
            .iter()
            .filter(|a| a.reviewer_code == ReviewerCode::Regression)
            .collect();
        assert_eq!(regression.len(), 1);
        assert_eq!(regression[0].priority.value(), 95);
        assert!(regression[0].handoff_id.is_some());
    }
}
