use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

use serde_json::{Map, Value};

use crate::audit::{
    AuditCategory, AuditEvent, AuditOutcome, AuditSink, FINALIZE_FAILED, SESSION_COMPLETED,
    SESSION_GAVE_UP, SESSION_RESUMED, SESSION_STARTED, SLOT_COMMITTED, SLOT_REJECTED,
    TURN_REDIRECTED, VALIDATION_REJECTED,
};
use crate::errors::EngineError;
use crate::extraction::SlotExtractor;
use crate::flows::spec::{DynFlow, Flow};
use crate::flows::states::{Stage, StartOutcome, TurnOutcome};
use crate::session::{Cursor, SessionLocks, SessionMeta, SessionState, SessionStore};
use crate::slots::parser::is_skip;
use crate::slots::{coerce_json, is_out_of_scope, parse_slot, ResolvedSlot, SlotValue, UiHints};

pub const CLARIFY_LEAD: &str = "Sorry, I didn't quite get that.";
pub const ALREADY_COMPLETE_MESSAGE: &str =
    "This conversation is already complete. Start a new session to set up something else.";
pub const GAVE_UP_MESSAGE: &str =
    "Let's stop here for now. Start a new session whenever you're ready to try again.";
pub const AWAITING_FINALIZE_PROMPT: &str =
    "Everything is filled in. Send any message to finish, or confirm your choices.";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunnerSettings {
    /// Consecutive rejected answers on one slot before the session gives up.
    /// `None` lets the user retry forever.
    pub max_slot_failures: Option<u32>,
}

/// Drives sessions through their flow's slot sequence, one turn per call.
pub struct FlowRunner {
    flows: RwLock<HashMap<String, Arc<dyn DynFlow>>>,
    store: Arc<dyn SessionStore>,
    extractor: Option<Arc<dyn SlotExtractor>>,
    audit: Option<Arc<dyn AuditSink>>,
    locks: SessionLocks,
    settings: RunnerSettings,
}

impl FlowRunner {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            flows: RwLock::new(HashMap::new()),
            store,
            extractor: None,
            audit: None,
            locks: SessionLocks::default(),
            settings: RunnerSettings::default(),
        }
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn SlotExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn with_audit(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    pub fn with_settings(mut self, settings: RunnerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Inserts or replaces a flow under its id.
    pub fn register_flow<F: Flow>(&self, flow: F) {
        let flow_id = flow.id();
        let mut flows = match self.flows.write() {
            Ok(flows) => flows,
            Err(poisoned) => poisoned.into_inner(),
        };
        let replaced = flows.insert(flow_id.to_string(), Arc::new(flow)).is_some();
        tracing::info!(
            event_name = "clarifier.flow.registered",
            flow_id,
            replaced,
            "flow registered"
        );
    }

    pub fn flow_ids(&self) -> Vec<String> {
        let flows = match self.flows.read() {
            Ok(flows) => flows,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut ids = flows.keys().cloned().collect::<Vec<_>>();
        ids.sort();
        ids
    }

    pub fn store(&self) -> Arc<dyn SessionStore> {
        Arc::clone(&self.store)
    }

    fn flow(&self, flow_id: &str) -> Result<Arc<dyn DynFlow>, EngineError> {
        let flows = match self.flows.read() {
            Ok(flows) => flows,
            Err(poisoned) => poisoned.into_inner(),
        };
        flows
            .get(flow_id)
            .cloned()
            .ok_or_else(|| EngineError::FlowNotFound { flow_id: flow_id.to_string() })
    }

    async fn load(&self, session_id: &str) -> Result<SessionState, EngineError> {
        self.store
            .get(session_id)
            .await?
            .ok_or_else(|| EngineError::SessionNotFound { session_id: session_id.to_string() })
    }

    fn emit(&self, event: impl FnOnce() -> AuditEvent) {
        if let Some(sink) = &self.audit {
            sink.emit(event());
        }
    }

    /// Opens a session, or resumes it when the id already names an active
    /// session of the same flow.
    pub async fn start(
        &self,
        flow_id: &str,
        meta: SessionMeta,
    ) -> Result<StartOutcome, EngineError> {
        let flow = self.flow(flow_id)?;
        if flow.slot_count() == 0 {
            return Err(EngineError::EmptySlotSequence { flow_id: flow_id.to_string() });
        }

        let _guard = self.locks.acquire(&meta.session_id).await;

        let existing = self
            .store
            .get(&meta.session_id)
            .await?
            .filter(|session| session.flow == flow_id && session.is_active());
        if let Some(existing) = existing {
            let idx = existing.idx();
            let (next_prompt, ui) = match flow.resolve_slot(idx as usize, &existing.ctx)? {
                Some(slot) => (slot.prompt, slot.ui),
                None => (AWAITING_FINALIZE_PROMPT.to_string(), UiHints::default()),
            };
            let extra = flow.start_fields_for(&existing.ctx)?;
            tracing::info!(
                event_name = "clarifier.session.resumed",
                session_id = %existing.session_id,
                flow_id,
                idx,
                "session resumed"
            );
            self.emit(|| {
                AuditEvent::new(
                    &existing.session_id,
                    flow_id,
                    SESSION_RESUMED,
                    AuditCategory::Session,
                    AuditOutcome::Success,
                )
                .with_metadata("idx", idx.to_string())
            });
            return Ok(StartOutcome {
                session_id: existing.session_id,
                flow: existing.flow,
                next_prompt,
                ui,
                resumed: true,
                extra,
            });
        }

        let ctx = flow.init_context(&meta).await?;
        let first = flow
            .resolve_slot(0, &ctx)?
            .ok_or_else(|| EngineError::EmptySlotSequence { flow_id: flow_id.to_string() })?;
        let extra = flow.start_fields_for(&ctx)?;
        let session = SessionState::new(&meta, flow_id, ctx);
        self.store.set(session).await?;

        tracing::info!(
            event_name = "clarifier.session.started",
            session_id = %meta.session_id,
            user_id = %meta.user_id,
            flow_id,
            "session started"
        );
        self.emit(|| {
            AuditEvent::new(
                &meta.session_id,
                flow_id,
                SESSION_STARTED,
                AuditCategory::Session,
                AuditOutcome::Success,
            )
            .with_metadata("doc_count", meta.doc_ids.len().to_string())
        });

        Ok(StartOutcome {
            session_id: meta.session_id,
            flow: flow_id.to_string(),
            next_prompt: first.prompt,
            ui: first.ui,
            resumed: false,
            extra,
        })
    }

    /// Processes one user turn against the session's current slot.
    pub async fn ingest(&self, session_id: &str, text: &str) -> Result<TurnOutcome, EngineError> {
        let _guard = self.locks.acquire(session_id).await;
        let mut session = self.load(session_id).await?;
        let flow = self.flow(&session.flow)?;

        let idx = match &session.cursor {
            Cursor::Collecting { idx } => *idx,
            Cursor::Complete => return Ok(already_complete(session)),
            Cursor::GaveUp { .. } => {
                return Ok(TurnOutcome::new(Stage::GaveUp, session.filled)
                    .with_message(GAVE_UP_MESSAGE))
            }
        };

        let Some(slot) = flow.resolve_slot(idx, &session.ctx)? else {
            return self.finish(flow.as_ref(), session).await;
        };

        if is_out_of_scope(text) {
            return self.redirect(flow.as_ref(), &session, &slot, "gate");
        }

        if !slot.required && is_skip(text) {
            session.filled.remove(&slot.key);
            return self.commit(flow.as_ref(), session, idx, &slot, None, "skip").await;
        }

        let (value, source) = match parse_guarded(&slot, text) {
            Some(value) => (Some(value), "parser"),
            None => match &self.extractor {
                Some(extractor) => {
                    let extracted = extractor.extract(text, &slot.key, slot.hint).await;
                    if extracted.out_of_scope {
                        return self.redirect(flow.as_ref(), &session, &slot, "extractor");
                    }
                    (extracted.value_for(&slot), "extractor")
                }
                None => (None, "parser"),
            },
        };

        let Some(value) = value else {
            return self.reject(session, &slot, Stage::Clarification, CLARIFY_LEAD).await;
        };
        if let Err(problem) = slot.check(&value) {
            return self.reject(session, &slot, Stage::Error, &problem).await;
        }

        self.commit(flow.as_ref(), session, idx, &slot, Some(value), source).await
    }

    /// Explicit confirmation: coerces client-supplied values per slot, merges
    /// them over what the session already holds, then validates and finalizes.
    pub async fn confirm(
        &self,
        session_id: &str,
        values: &Map<String, Value>,
    ) -> Result<TurnOutcome, EngineError> {
        let _guard = self.locks.acquire(session_id).await;
        let mut session = self.load(session_id).await?;
        let flow = self.flow(&session.flow)?;

        if session.cursor == Cursor::Complete {
            return Ok(already_complete(session));
        }

        let mut merged = session.filled.clone();
        let mut errors = Vec::new();
        for slot in flow.resolve_slots(&session.ctx)? {
            let Some(raw) = values.get(&slot.key).or_else(|| values.get(&camel_case(&slot.key)))
            else {
                continue;
            };
            if raw.is_null() {
                continue;
            }
            match coerce_json(&slot, raw) {
                Some(value) => match slot.check(&value) {
                    Ok(()) => {
                        merged.insert(slot.key.clone(), value);
                    }
                    Err(problem) => errors.push(problem),
                },
                None => errors.push(format!("Couldn't read a value for `{}`.", slot.key)),
            }
        }

        if errors.is_empty() {
            let validation = flow.validate_filled(&merged, &session.ctx).await?;
            if validation.ok {
                merged = validation.filled;
            } else {
                errors = validation.errors;
            }
        }
        if !errors.is_empty() {
            self.emit(|| {
                AuditEvent::new(
                    &session.session_id,
                    &session.flow,
                    VALIDATION_REJECTED,
                    AuditCategory::Validation,
                    AuditOutcome::Rejected,
                )
                .with_metadata("via", "confirm")
                .with_metadata("errors", errors.join("; "))
            });
            return Err(EngineError::Validation { errors });
        }

        let result = match flow.finalize_filled(&merged, &session.ctx).await {
            Ok(result) => result,
            Err(error) => return Err(self.finalize_failed(&session, error)),
        };

        session.filled = merged;
        session.cursor = Cursor::Complete;
        session.consecutive_failures = 0;
        session.touch();
        self.store.set(session.clone()).await?;
        self.completed(&session, result.status, "confirm");

        Ok(TurnOutcome::new(Stage::Complete, session.filled).completed(result))
    }

    pub async fn get_session(
        &self,
        session_id: &str,
    ) -> Result<Option<SessionState>, EngineError> {
        Ok(self.store.get(session_id).await?)
    }

    pub async fn all_sessions(&self) -> Result<Vec<SessionState>, EngineError> {
        Ok(self.store.list().await?)
    }

    pub async fn clear_session(&self, session_id: &str) -> Result<bool, EngineError> {
        let removed = self.store.delete(session_id).await?;
        self.locks.forget(session_id);
        Ok(removed)
    }

    pub async fn clear_all_sessions(&self) -> Result<usize, EngineError> {
        let removed = self.store.clear().await?;
        self.locks.prune();
        Ok(removed)
    }

    /// Drops expired sessions from the store and forgets idle locks.
    pub async fn purge_expired(&self) -> Result<usize, EngineError> {
        let removed = self.store.purge_expired().await?;
        self.locks.prune();
        Ok(removed)
    }

    fn redirect(
        &self,
        flow: &dyn DynFlow,
        session: &SessionState,
        slot: &ResolvedSlot,
        source: &str,
    ) -> Result<TurnOutcome, EngineError> {
        let message = flow.redirect_for(&session.ctx)?;
        tracing::debug!(
            event_name = "clarifier.turn.redirected",
            session_id = %session.session_id,
            slot = %slot.key,
            source,
            "out-of-scope input redirected"
        );
        self.emit(|| {
            AuditEvent::new(
                &session.session_id,
                &session.flow,
                TURN_REDIRECTED,
                AuditCategory::Slot,
                AuditOutcome::Rejected,
            )
            .with_metadata("slot", &slot.key)
            .with_metadata("source", source)
        });
        Ok(TurnOutcome::new(Stage::Redirect, session.filled.clone())
            .prompting(slot, Some(&message)))
    }

    async fn reject(
        &self,
        mut session: SessionState,
        slot: &ResolvedSlot,
        stage: Stage,
        lead: &str,
    ) -> Result<TurnOutcome, EngineError> {
        session.consecutive_failures = session.consecutive_failures.saturating_add(1);
        let gave_up = self
            .settings
            .max_slot_failures
            .is_some_and(|cap| cap > 0 && session.consecutive_failures >= cap);
        if gave_up {
            session.cursor = Cursor::GaveUp { slot: slot.key.clone() };
        }
        session.touch();
        self.store.set(session.clone()).await?;

        if gave_up {
            tracing::warn!(
                event_name = "clarifier.session.gave_up",
                session_id = %session.session_id,
                flow_id = %session.flow,
                slot = %slot.key,
                failures = session.consecutive_failures,
                "session gave up after repeated failures"
            );
            self.emit(|| {
                AuditEvent::new(
                    &session.session_id,
                    &session.flow,
                    SESSION_GAVE_UP,
                    AuditCategory::Session,
                    AuditOutcome::Failed,
                )
                .with_metadata("slot", &slot.key)
                .with_metadata("failures", session.consecutive_failures.to_string())
            });
            return Ok(
                TurnOutcome::new(Stage::GaveUp, session.filled).with_message(GAVE_UP_MESSAGE)
            );
        }

        self.emit(|| {
            AuditEvent::new(
                &session.session_id,
                &session.flow,
                SLOT_REJECTED,
                AuditCategory::Slot,
                AuditOutcome::Rejected,
            )
            .with_metadata("slot", &slot.key)
            .with_metadata("stage", format!("{stage:?}"))
        });
        let outcome = TurnOutcome::new(stage, session.filled).prompting(slot, Some(lead));
        Ok(match stage {
            Stage::Error => outcome.with_errors(vec![lead.to_string()]),
            _ => outcome,
        })
    }

    async fn commit(
        &self,
        flow: &dyn DynFlow,
        mut session: SessionState,
        idx: usize,
        slot: &ResolvedSlot,
        value: Option<SlotValue>,
        source: &str,
    ) -> Result<TurnOutcome, EngineError> {
        if let Some(value) = value {
            session.filled.insert(slot.key.clone(), value);
        }
        session.cursor = Cursor::Collecting { idx: idx + 1 };
        session.consecutive_failures = 0;
        self.emit(|| {
            AuditEvent::new(
                &session.session_id,
                &session.flow,
                SLOT_COMMITTED,
                AuditCategory::Slot,
                AuditOutcome::Success,
            )
            .with_metadata("slot", &slot.key)
            .with_metadata("source", source)
        });

        match flow.resolve_slot(idx + 1, &session.ctx)? {
            Some(next) => {
                session.touch();
                self.store.set(session.clone()).await?;
                Ok(TurnOutcome::new(Stage::NextSlot, session.filled).prompting(&next, None))
            }
            None => self.finish(flow, session).await,
        }
    }

    async fn finish(
        &self,
        flow: &dyn DynFlow,
        mut session: SessionState,
    ) -> Result<TurnOutcome, EngineError> {
        let validation = flow.validate_filled(&session.filled, &session.ctx).await?;
        if !validation.ok {
            session.touch();
            self.store.set(session.clone()).await?;
            self.emit(|| {
                AuditEvent::new(
                    &session.session_id,
                    &session.flow,
                    VALIDATION_REJECTED,
                    AuditCategory::Validation,
                    AuditOutcome::Rejected,
                )
                .with_metadata("via", "ingest")
                .with_metadata("errors", validation.errors.join("; "))
            });
            return Ok(TurnOutcome::new(Stage::Error, session.filled)
                .with_message(validation.errors.join(" "))
                .with_errors(validation.errors));
        }

        let result = match flow.finalize_filled(&validation.filled, &session.ctx).await {
            Ok(result) => result,
            Err(error) => {
                session.touch();
                self.store.set(session.clone()).await?;
                return Err(self.finalize_failed(&session, error));
            }
        };

        session.filled = validation.filled;
        session.cursor = Cursor::Complete;
        session.consecutive_failures = 0;
        session.touch();
        self.store.set(session.clone()).await?;
        self.completed(&session, result.status, "ingest");

        Ok(TurnOutcome::new(Stage::Complete, session.filled).completed(result))
    }

    fn completed(&self, session: &SessionState, status: u16, via: &str) {
        tracing::info!(
            event_name = "clarifier.session.completed",
            session_id = %session.session_id,
            flow_id = %session.flow,
            status,
            via,
            "session completed"
        );
        self.emit(|| {
            AuditEvent::new(
                &session.session_id,
                &session.flow,
                SESSION_COMPLETED,
                AuditCategory::Finalize,
                AuditOutcome::Success,
            )
            .with_metadata("status", status.to_string())
            .with_metadata("via", via)
        });
    }

    fn finalize_failed(&self, session: &SessionState, error: EngineError) -> EngineError {
        tracing::warn!(
            event_name = "clarifier.session.finalize_failed",
            session_id = %session.session_id,
            flow_id = %session.flow,
            error = %error,
            "flow finalize failed"
        );
        self.emit(|| {
            AuditEvent::new(
                &session.session_id,
                &session.flow,
                FINALIZE_FAILED,
                AuditCategory::Finalize,
                AuditOutcome::Failed,
            )
            .with_metadata("error", error.to_string())
        });
        error
    }
}

fn already_complete(session: SessionState) -> TurnOutcome {
    let mut outcome = TurnOutcome::new(Stage::AlreadyComplete, session.filled)
        .with_message(ALREADY_COMPLETE_MESSAGE);
    outcome.done = true;
    outcome
}

/// A panicking parser counts as "no value".
fn parse_guarded(slot: &ResolvedSlot, text: &str) -> Option<SlotValue> {
    match catch_unwind(AssertUnwindSafe(|| parse_slot(slot, text))) {
        Ok(value) => value,
        Err(_) => {
            tracing::warn!(
                event_name = "clarifier.parser.panicked",
                slot = %slot.key,
                "slot parser panicked, treating input as unparsed"
            );
            None
        }
    }
}

fn camel_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper = false;
    for ch in key.chars() {
        if ch == '_' {
            upper = true;
        } else if upper {
            out.extend(ch.to_uppercase());
            upper = false;
        } else {
            out.push(ch);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};
    use serde_json::{json, Map, Value};

    use super::{camel_case, FlowRunner, RunnerSettings, CLARIFY_LEAD};
    use crate::audit::{InMemoryAuditSink, SESSION_COMPLETED, SESSION_STARTED, SLOT_COMMITTED};
    use crate::errors::EngineError;
    use crate::extraction::{ExtractorResult, SlotExtractor};
    use crate::flows::budget::{BudgetLimits, FixedBudgetEstimator, RetryPolicy};
    use crate::flows::quiz_setup::QuizSetupFlow;
    use crate::flows::spec::{FinalizeError, FinalizeResult, Flow, Validation};
    use crate::flows::states::Stage;
    use crate::session::{InMemorySessionStore, SessionMeta, SessionStore};
    use crate::slots::{Filled, IntBounds, ParserHint, SlotSpec, SlotType, SlotValue};

    fn quiz_flow() -> QuizSetupFlow {
        QuizSetupFlow::new(
            Arc::new(FixedBudgetEstimator::new(50)),
            BudgetLimits::default(),
            RetryPolicy::immediate(3),
        )
    }

    fn meta(session_id: &str) -> SessionMeta {
        SessionMeta {
            session_id: session_id.to_string(),
            user_id: "u-1".to_string(),
            subject_id: "bio-101".to_string(),
            doc_ids: vec!["doc-1".to_string()],
        }
    }

    fn runner() -> FlowRunner {
        let runner = FlowRunner::new(Arc::new(InMemorySessionStore::new()));
        runner.register_flow(quiz_flow());
        runner
    }

    async fn idx(runner: &FlowRunner, session_id: &str) -> i64 {
        runner
            .get_session(session_id)
            .await
            .expect("store read")
            .expect("session exists")
            .idx()
    }

    /// Two integer slots whose cross-slot rule is `low < high`.
    #[derive(Serialize, Deserialize)]
    struct RangeCtx;

    struct RangeFlow {
        slots: Vec<SlotSpec<RangeCtx>>,
    }

    impl RangeFlow {
        fn new() -> Self {
            Self {
                slots: vec![
                    SlotSpec::new("low", SlotType::BoundedInt, |_: &RangeCtx| "Low?".to_string())
                        .with_bounds(|_| IntBounds::new(1, 10))
                        .with_hint(ParserHint::Count),
                    SlotSpec::new("high", SlotType::BoundedInt, |_: &RangeCtx| "High?".to_string())
                        .with_bounds(|_| IntBounds::new(1, 10))
                        .with_hint(ParserHint::Count),
                    SlotSpec::new("note", SlotType::FreeText, |_: &RangeCtx| "Note?".to_string())
                        .optional(),
                ],
            }
        }
    }

    #[async_trait]
    impl Flow for RangeFlow {
        type Context = RangeCtx;

        fn id(&self) -> &'static str {
            "range"
        }

        fn slots(&self) -> &[SlotSpec<RangeCtx>] {
            &self.slots
        }

        async fn init(&self, _meta: &SessionMeta) -> RangeCtx {
            RangeCtx
        }

        async fn validate(&self, filled: &Filled, _ctx: &RangeCtx) -> Validation {
            let low = filled.get("low").and_then(SlotValue::as_integer).unwrap_or_default();
            let high = filled.get("high").and_then(SlotValue::as_integer).unwrap_or_default();
            if low < high {
                Validation::accept(filled.clone())
            } else {
                Validation::reject(vec!["`low` must be below `high`.".to_string()], filled.clone())
            }
        }

        async fn finalize(
            &self,
            filled: &Filled,
            _ctx: &RangeCtx,
        ) -> Result<FinalizeResult, FinalizeError> {
            let low = filled.get("low").and_then(SlotValue::as_integer).unwrap_or_default();
            if low == 9 {
                return Err(FinalizeError::new(503, "range service down"));
            }
            Ok(FinalizeResult::ok(json!({ "filled": filled })))
        }
    }

    struct EmptyFlow;

    #[async_trait]
    impl Flow for EmptyFlow {
        type Context = ();

        fn id(&self) -> &'static str {
            "empty"
        }

        fn slots(&self) -> &[SlotSpec<()>] {
            &[]
        }

        async fn init(&self, _meta: &SessionMeta) {}

        async fn validate(&self, filled: &Filled, _ctx: &()) -> Validation {
            Validation::accept(filled.clone())
        }

        async fn finalize(
            &self,
            _filled: &Filled,
            _ctx: &(),
        ) -> Result<FinalizeResult, FinalizeError> {
            Ok(FinalizeResult::ok(Value::Null))
        }
    }

    /// Question types limited to a subset of what the parser recognizes.
    struct NarrowFlow {
        slots: Vec<SlotSpec<()>>,
    }

    impl NarrowFlow {
        fn new() -> Self {
            Self {
                slots: vec![SlotSpec::new("question_types", SlotType::MultiEnum, |_: &()| {
                    "Which types?".to_string()
                })
                .with_allowed(&["mcq", "true_false"])
                .with_hint(ParserHint::QuestionType)],
            }
        }
    }

    #[async_trait]
    impl Flow for NarrowFlow {
        type Context = ();

        fn id(&self) -> &'static str {
            "narrow"
        }

        fn slots(&self) -> &[SlotSpec<()>] {
            &self.slots
        }

        async fn init(&self, _meta: &SessionMeta) {}

        async fn validate(&self, filled: &Filled, _ctx: &()) -> Validation {
            Validation::accept(filled.clone())
        }

        async fn finalize(
            &self,
            _filled: &Filled,
            _ctx: &(),
        ) -> Result<FinalizeResult, FinalizeError> {
            Ok(FinalizeResult::ok(Value::Null))
        }
    }

    struct StubExtractor(ExtractorResult);

    #[async_trait]
    impl SlotExtractor for StubExtractor {
        async fn extract(
            &self,
            _text: &str,
            _slot_key: &str,
            _hint: Option<ParserHint>,
        ) -> ExtractorResult {
            self.0.clone()
        }
    }

    #[tokio::test]
    async fn start_returns_first_prompt_and_budget_fields() {
        let runner = runner();
        let started = runner.start("quiz_setup", meta("s-1")).await.expect("start");

        assert_eq!(started.session_id, "s-1");
        assert_eq!(started.flow, "quiz_setup");
        assert!(started.next_prompt.contains("question types"));
        assert!(!started.ui.quick.is_empty());
        assert_eq!(started.extra.get("maxQuestions"), Some(&json!(50)));
        assert!(!started.resumed);
        assert_eq!(idx(&runner, "s-1").await, 0);
    }

    #[tokio::test]
    async fn start_rejects_unknown_and_empty_flows() {
        let runner = runner();
        runner.register_flow(EmptyFlow);

        let unknown = runner.start("nope", meta("s-1")).await.expect_err("unknown flow");
        assert!(matches!(unknown, EngineError::FlowNotFound { ref flow_id } if flow_id == "nope"));

        let empty = runner.start("empty", meta("s-2")).await.expect_err("empty flow");
        assert!(matches!(empty, EngineError::EmptySlotSequence { .. }));
        assert!(runner.get_session("s-2").await.expect("store read").is_none());
    }

    #[tokio::test]
    async fn multi_enum_answer_advances_to_next_slot() {
        let runner = runner();
        runner.start("quiz_setup", meta("s-1")).await.expect("start");

        let outcome = runner.ingest("s-1", "mcq and true/false").await.expect("ingest");
        assert_eq!(outcome.stage, Stage::NextSlot);
        assert_eq!(
            outcome.filled.get("question_types"),
            Some(&SlotValue::List(vec!["mcq".to_string(), "true_false".to_string()]))
        );
        assert!(outcome.next_prompt.as_deref().is_some_and(|prompt| prompt.contains("difficult")));
        assert_eq!(idx(&runner, "s-1").await, 1);
    }

    #[tokio::test]
    async fn word_number_completes_the_flow() {
        let runner = runner();
        runner.start("quiz_setup", meta("s-1")).await.expect("start");
        runner.ingest("s-1", "mcq").await.expect("types");
        runner.ingest("s-1", "medium please").await.expect("difficulty");

        let outcome = runner.ingest("s-1", "ten").await.expect("count");
        assert_eq!(outcome.filled.get("requested_count"), Some(&SlotValue::Integer(10)));
        assert_eq!(outcome.stage, Stage::Complete);
    }

    #[tokio::test]
    async fn max_sentinel_takes_slot_maximum() {
        let runner = runner();
        runner.start("quiz_setup", meta("s-1")).await.expect("start");
        runner.ingest("s-1", "all types").await.expect("types");
        runner.ingest("s-1", "hard").await.expect("difficulty");

        let outcome = runner.ingest("s-1", "max").await.expect("count");
        assert_eq!(outcome.filled.get("requested_count"), Some(&SlotValue::Integer(50)));
    }

    #[tokio::test]
    async fn question_redirects_without_touching_state() {
        let runner = runner();
        runner.start("quiz_setup", meta("s-1")).await.expect("start");
        runner.ingest("s-1", "short answer").await.expect("types");
        let before = runner.get_session("s-1").await.expect("read").expect("exists");

        let outcome = runner.ingest("s-1", "what is mitosis?").await.expect("ingest");
        assert_eq!(outcome.stage, Stage::Redirect);
        assert_eq!(outcome.filled, before.filled);
        assert!(outcome.next_prompt.as_deref().is_some_and(|prompt| prompt.contains("difficult")));

        let after = runner.get_session("s-1").await.expect("read").expect("exists");
        assert_eq!(after.filled, before.filled);
        assert_eq!(after.idx(), before.idx());
        assert_eq!(after.consecutive_failures, 0);
    }

    #[tokio::test]
    async fn final_slot_finalizes_with_validated_values() {
        let runner = runner();
        runner.start("quiz_setup", meta("s-1")).await.expect("start");
        runner.ingest("s-1", "Multiple choice, true or false").await.expect("types");
        runner.ingest("s-1", "easy").await.expect("difficulty");

        let outcome = runner.ingest("s-1", "12 questions").await.expect("count");
        assert_eq!(outcome.stage, Stage::Complete);
        assert!(outcome.done);
        assert_eq!(idx(&runner, "s-1").await, -1);

        let flow = quiz_flow();
        let ctx = flow.init(&meta("s-1")).await;
        let expected = flow.finalize(&outcome.filled, &ctx).await.expect("finalize");
        assert_eq!(outcome.finalize_result, Some(expected));
    }

    #[tokio::test]
    async fn cross_slot_rejection_keeps_exhausted_position() {
        let runner = runner();
        runner.register_flow(RangeFlow::new());
        runner.start("range", meta("s-1")).await.expect("start");
        runner.ingest("s-1", "7").await.expect("low");
        runner.ingest("s-1", "3").await.expect("high");

        let outcome = runner.ingest("s-1", "skip").await.expect("note");
        assert_eq!(outcome.stage, Stage::Error);
        assert_eq!(outcome.errors, vec!["`low` must be below `high`.".to_string()]);
        assert!(!outcome.done);
        assert_eq!(idx(&runner, "s-1").await, 3);
        assert!(!outcome.filled.contains_key("note"));
    }

    #[tokio::test]
    async fn unparsed_input_asks_again() {
        let runner = runner();
        runner.start("quiz_setup", meta("s-1")).await.expect("start");

        let outcome = runner.ingest("s-1", "banana").await.expect("ingest");
        assert_eq!(outcome.stage, Stage::Clarification);
        let prompt = outcome.next_prompt.expect("reprompt");
        assert!(prompt.starts_with(CLARIFY_LEAD));
        assert_eq!(idx(&runner, "s-1").await, 0);
    }

    #[tokio::test]
    async fn out_of_range_value_is_rejected_and_idempotent() {
        let runner = FlowRunner::new(Arc::new(InMemorySessionStore::new())).with_extractor(
            Arc::new(StubExtractor(ExtractorResult {
                requested_count: Some(99),
                ..ExtractorResult::default()
            })),
        );
        runner.register_flow(quiz_flow());
        runner.start("quiz_setup", meta("s-1")).await.expect("start");
        runner.ingest("s-1", "mcq").await.expect("types");
        runner.ingest("s-1", "medium").await.expect("difficulty");

        let first = runner.ingest("s-1", "loads of them").await.expect("first");
        let second = runner.ingest("s-1", "loads of them").await.expect("second");
        assert_eq!(first.stage, Stage::Error);
        assert_eq!(first.stage, second.stage);
        assert_eq!(first.next_prompt, second.next_prompt);
        assert!(first.errors[0].contains("between 5 and 50"));
        assert_eq!(idx(&runner, "s-1").await, 2);
        assert!(!second.filled.contains_key("requested_count"));
    }

    #[tokio::test]
    async fn disallowed_choice_is_rejected() {
        let runner = runner();
        runner.register_flow(NarrowFlow::new());
        runner.start("narrow", meta("s-1")).await.expect("start");

        let outcome = runner.ingest("s-1", "short answer").await.expect("ingest");
        assert_eq!(outcome.stage, Stage::Error);
        assert!(outcome.errors[0].contains("\"short_answer\""));
        assert!(outcome.filled.is_empty());
        assert_eq!(idx(&runner, "s-1").await, 0);
    }

    #[tokio::test]
    async fn extractor_fills_value_when_parser_fails() {
        let runner = FlowRunner::new(Arc::new(InMemorySessionStore::new())).with_extractor(
            Arc::new(StubExtractor(ExtractorResult {
                question_types: Some(vec!["Short Answer".to_string()]),
                ..ExtractorResult::default()
            })),
        );
        runner.register_flow(quiz_flow());
        runner.start("quiz_setup", meta("s-1")).await.expect("start");

        let outcome =
            runner.ingest("s-1", "the kind where you write a sentence").await.expect("ingest");
        assert_eq!(outcome.stage, Stage::NextSlot);
        assert_eq!(
            outcome.filled.get("question_types"),
            Some(&SlotValue::List(vec!["short_answer".to_string()]))
        );
    }

    #[tokio::test]
    async fn extractor_out_of_scope_redirects() {
        let runner = FlowRunner::new(Arc::new(InMemorySessionStore::new())).with_extractor(
            Arc::new(StubExtractor(ExtractorResult {
                out_of_scope: true,
                ..ExtractorResult::default()
            })),
        );
        runner.register_flow(quiz_flow());
        runner.start("quiz_setup", meta("s-1")).await.expect("start");

        let outcome = runner.ingest("s-1", "tell me a joke").await.expect("ingest");
        assert_eq!(outcome.stage, Stage::Redirect);
        assert_eq!(idx(&runner, "s-1").await, 0);
    }

    #[tokio::test]
    async fn ingest_after_completion_is_already_complete() {
        let sink = Arc::new(InMemoryAuditSink::default());
        let runner =
            FlowRunner::new(Arc::new(InMemorySessionStore::new())).with_audit(sink.clone());
        runner.register_flow(quiz_flow());
        runner.start("quiz_setup", meta("s-1")).await.expect("start");
        runner.ingest("s-1", "mcq").await.expect("types");
        runner.ingest("s-1", "hard").await.expect("difficulty");
        let done = runner.ingest("s-1", "20").await.expect("count");
        assert_eq!(done.stage, Stage::Complete);

        let again = runner.ingest("s-1", "30").await.expect("post-completion ingest");
        assert_eq!(again.stage, Stage::AlreadyComplete);
        assert!(again.done);
        assert_eq!(again.filled, done.filled);
        assert!(again.finalize_result.is_none());

        let completions =
            sink.event_types().into_iter().filter(|event| event == SESSION_COMPLETED).count();
        assert_eq!(completions, 1);
        assert_eq!(sink.event_types().first().map(String::as_str), Some(SESSION_STARTED));
        assert!(sink.event_types().iter().any(|event| event == SLOT_COMMITTED));
    }

    #[tokio::test]
    async fn repeated_failures_give_up() {
        let runner = FlowRunner::new(Arc::new(InMemorySessionStore::new()))
            .with_settings(RunnerSettings { max_slot_failures: Some(2) });
        runner.register_flow(quiz_flow());
        runner.start("quiz_setup", meta("s-1")).await.expect("start");

        let first = runner.ingest("s-1", "banana").await.expect("first");
        assert_eq!(first.stage, Stage::Clarification);
        let second = runner.ingest("s-1", "banana").await.expect("second");
        assert_eq!(second.stage, Stage::GaveUp);
        assert_eq!(idx(&runner, "s-1").await, -1);

        let after = runner.ingest("s-1", "mcq").await.expect("after give up");
        assert_eq!(after.stage, Stage::GaveUp);
    }

    #[tokio::test]
    async fn successful_answer_resets_failure_count() {
        let runner = FlowRunner::new(Arc::new(InMemorySessionStore::new()))
            .with_settings(RunnerSettings { max_slot_failures: Some(2) });
        runner.register_flow(quiz_flow());
        runner.start("quiz_setup", meta("s-1")).await.expect("start");

        runner.ingest("s-1", "banana").await.expect("miss");
        runner.ingest("s-1", "mcq").await.expect("hit");
        let outcome = runner.ingest("s-1", "banana").await.expect("miss on next slot");
        assert_eq!(outcome.stage, Stage::Clarification);
    }

    #[tokio::test]
    async fn repeated_start_resumes_active_session() {
        let runner = runner();
        runner.start("quiz_setup", meta("s-1")).await.expect("start");
        runner.ingest("s-1", "mcq").await.expect("types");

        let resumed = runner.start("quiz_setup", meta("s-1")).await.expect("resume");
        assert!(resumed.resumed);
        assert!(resumed.next_prompt.contains("difficult"));
        assert_eq!(idx(&runner, "s-1").await, 1);
        let session = runner.get_session("s-1").await.expect("read").expect("exists");
        assert!(session.filled.contains_key("question_types"));
    }

    #[tokio::test]
    async fn start_after_completion_opens_a_fresh_session() {
        let runner = runner();
        runner.register_flow(RangeFlow::new());
        runner.start("range", meta("s-1")).await.expect("start");
        runner.ingest("s-1", "1").await.expect("low");
        runner.ingest("s-1", "2").await.expect("high");
        runner.ingest("s-1", "none").await.expect("note");

        let restarted = runner.start("range", meta("s-1")).await.expect("restart");
        assert!(!restarted.resumed);
        assert_eq!(idx(&runner, "s-1").await, 0);
    }

    #[tokio::test]
    async fn confirm_validates_and_finalizes_client_values() {
        let runner = runner();
        runner.start("quiz_setup", meta("s-1")).await.expect("start");
        runner.ingest("s-1", "mcq").await.expect("types");

        let mut values = Map::new();
        values.insert("difficulty".to_string(), json!("Hard"));
        values.insert("requestedCount".to_string(), json!(15));
        let outcome = runner.confirm("s-1", &values).await.expect("confirm");

        assert_eq!(outcome.stage, Stage::Complete);
        assert!(outcome.done);
        assert_eq!(outcome.filled.get("difficulty"), Some(&SlotValue::Text("hard".to_string())));
        assert_eq!(outcome.filled.get("requested_count"), Some(&SlotValue::Integer(15)));
        assert_eq!(idx(&runner, "s-1").await, -1);
    }

    #[tokio::test]
    async fn confirm_rejects_invalid_values() {
        let runner = runner();
        runner.start("quiz_setup", meta("s-1")).await.expect("start");

        let mut values = Map::new();
        values.insert("question_types".to_string(), json!(["mcq"]));
        values.insert("difficulty".to_string(), json!("medium"));
        values.insert("requested_count".to_string(), json!(500));
        let error = runner.confirm("s-1", &values).await.expect_err("count out of range");
        assert!(matches!(error, EngineError::Validation { ref errors } if errors.len() == 1));
        assert_eq!(idx(&runner, "s-1").await, 0);

        let missing = runner.confirm("s-1", &Map::new()).await.expect_err("nothing filled");
        assert!(matches!(missing, EngineError::Validation { ref errors } if errors.len() == 3));
    }

    #[tokio::test]
    async fn unknown_session_is_reported() {
        let runner = runner();
        let ingest = runner.ingest("ghost", "mcq").await.expect_err("no session");
        assert!(matches!(ingest, EngineError::SessionNotFound { .. }));
        let confirm = runner.confirm("ghost", &Map::new()).await.expect_err("no session");
        assert!(matches!(confirm, EngineError::SessionNotFound { .. }));
    }

    #[tokio::test]
    async fn finalize_failure_surfaces_and_keeps_session_open() {
        let runner = runner();
        runner.register_flow(RangeFlow::new());
        runner.start("range", meta("s-1")).await.expect("start");
        runner.ingest("s-1", "9").await.expect("low");
        runner.ingest("s-1", "10").await.expect("high");

        let error = runner.ingest("s-1", "skip").await.expect_err("finalize fails");
        assert!(matches!(error, EngineError::Finalize(ref failure) if failure.status == 503));
        assert_eq!(idx(&runner, "s-1").await, 3);
    }

    #[tokio::test]
    async fn unregistered_flow_on_existing_session_is_reported() {
        let store = Arc::new(InMemorySessionStore::new());
        let runner = FlowRunner::new(store.clone());
        runner.register_flow(quiz_flow());
        runner.start("quiz_setup", meta("s-1")).await.expect("start");

        let orphan = FlowRunner::new(store);
        let error = orphan.ingest("s-1", "mcq").await.expect_err("flow missing");
        assert!(matches!(error, EngineError::FlowNotFound { .. }));
    }

    #[tokio::test]
    async fn concurrent_turns_on_one_session_do_not_lose_updates() {
        let runner = Arc::new(runner());
        runner.register_flow(RangeFlow::new());
        runner.start("range", meta("s-1")).await.expect("start");

        let turns = ["1", "5"].map(|text| {
            let runner = Arc::clone(&runner);
            tokio::spawn(async move { runner.ingest("s-1", text).await })
        });
        for turn in turns {
            turn.await.expect("join").expect("ingest");
        }

        let session = runner.get_session("s-1").await.expect("read").expect("exists");
        assert_eq!(session.idx(), 2);
        assert_eq!(session.filled.len(), 2);
    }

    #[tokio::test]
    async fn session_accessors_delegate_to_store() {
        let store = Arc::new(InMemorySessionStore::new());
        let runner = FlowRunner::new(store.clone());
        runner.register_flow(quiz_flow());
        runner.start("quiz_setup", meta("a")).await.expect("start a");
        runner.start("quiz_setup", meta("b")).await.expect("start b");

        assert_eq!(runner.all_sessions().await.expect("list").len(), 2);
        assert!(runner.clear_session("a").await.expect("clear a"));
        assert!(store.get("a").await.expect("read").is_none());
        assert_eq!(runner.clear_all_sessions().await.expect("clear all"), 1);
        assert_eq!(runner.flow_ids(), vec!["quiz_setup".to_string()]);
    }

    #[tokio::test]
    async fn registering_an_existing_id_overwrites_it() {
        let runner = runner();
        runner.register_flow(quiz_flow());
        assert_eq!(runner.flow_ids(), vec!["quiz_setup".to_string()]);

        let started = runner.start("quiz_setup", meta("s-over")).await.expect("start");
        assert_eq!(started.flow, "quiz_setup");
    }

    #[tokio::test]
    async fn clearing_a_session_mid_turn_keeps_turns_serialized() {
        let runner = runner();
        runner.start("quiz_setup", meta("s-clear")).await.expect("start");

        let in_flight = runner.locks.acquire("s-clear").await;
        assert!(runner.clear_session("s-clear").await.expect("clear"));

        let next = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            runner.locks.acquire("s-clear"),
        )
        .await;
        assert!(next.is_err(), "a turn after the clear must wait for the in-flight one");

        drop(in_flight);
        assert_eq!(runner.locks.prune(), 1);
    }

    #[test]
    fn snake_keys_map_to_camel_case() {
        assert_eq!(camel_case("requested_count"), "requestedCount");
        assert_eq!(camel_case("difficulty"), "difficulty");
    }
}
