use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::errors::EngineError;
use crate::session::SessionMeta;
use crate::slots::{Filled, ResolvedSlot, SlotSpec};

pub const DEFAULT_REDIRECT: &str =
    "Let's finish setting this up first, then I can help with other questions.";

/// Outcome of a flow's cross-slot validation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validation {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    pub filled: Filled,
}

impl Validation {
    pub fn accept(filled: Filled) -> Self {
        Self { ok: true, errors: Vec::new(), filled }
    }

    pub fn reject(errors: Vec<String>, filled: Filled) -> Self {
        Self { ok: false, errors, filled }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizeResult {
    pub status: u16,
    pub body: Value,
}

impl FinalizeResult {
    pub fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("finalize failed ({status}): {message}")]
pub struct FinalizeError {
    pub status: u16,
    pub message: String,
}

impl FinalizeError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }
}

/// One guided conversation type.
///
/// `Context` is computed once by [`Flow::init`] when a session opens and is
/// handed back to every later call. It must round-trip through JSON because
/// sessions are persisted.
#[async_trait]
pub trait Flow: Send + Sync + 'static {
    type Context: Serialize + DeserializeOwned + Send + Sync;

    fn id(&self) -> &'static str;

    fn slots(&self) -> &[SlotSpec<Self::Context>];

    /// Must not fail: external lookups degrade to conservative defaults.
    async fn init(&self, meta: &SessionMeta) -> Self::Context;

    async fn validate(&self, filled: &Filled, ctx: &Self::Context) -> Validation;

    async fn finalize(
        &self,
        filled: &Filled,
        ctx: &Self::Context,
    ) -> Result<FinalizeResult, FinalizeError>;

    fn redirect_message(&self, _ctx: &Self::Context) -> String {
        DEFAULT_REDIRECT.to_string()
    }

    /// Extra fields merged into the start response.
    fn start_fields(&self, _ctx: &Self::Context) -> Map<String, Value> {
        Map::new()
    }
}

/// Object-safe view of a [`Flow`] with the context carried as JSON, so the
/// runner can hold flows with different context types side by side.
#[async_trait]
pub trait DynFlow: Send + Sync {
    fn flow_id(&self) -> &'static str;
    fn slot_count(&self) -> usize;
    fn resolve_slot(&self, idx: usize, ctx: &Value) -> Result<Option<ResolvedSlot>, EngineError>;
    fn resolve_slots(&self, ctx: &Value) -> Result<Vec<ResolvedSlot>, EngineError>;
    async fn init_context(&self, meta: &SessionMeta) -> Result<Value, EngineError>;
    async fn validate_filled(&self, filled: &Filled, ctx: &Value)
        -> Result<Validation, EngineError>;
    async fn finalize_filled(
        &self,
        filled: &Filled,
        ctx: &Value,
    ) -> Result<FinalizeResult, EngineError>;
    fn redirect_for(&self, ctx: &Value) -> Result<String, EngineError>;
    fn start_fields_for(&self, ctx: &Value) -> Result<Map<String, Value>, EngineError>;
}

fn decode<F: Flow>(flow: &F, ctx: &Value) -> Result<F::Context, EngineError> {
    serde_json::from_value(ctx.clone()).map_err(|error| EngineError::ContextDecode {
        flow_id: flow.id().to_string(),
        message: error.to_string(),
    })
}

#[async_trait]
impl<F: Flow> DynFlow for F {
    fn flow_id(&self) -> &'static str {
        self.id()
    }

    fn slot_count(&self) -> usize {
        self.slots().len()
    }

    fn resolve_slot(&self, idx: usize, ctx: &Value) -> Result<Option<ResolvedSlot>, EngineError> {
        let Some(slot) = self.slots().get(idx) else {
            return Ok(None);
        };
        let ctx = decode(self, ctx)?;
        Ok(Some(slot.resolve(&ctx)))
    }

    fn resolve_slots(&self, ctx: &Value) -> Result<Vec<ResolvedSlot>, EngineError> {
        let ctx = decode(self, ctx)?;
        Ok(self.slots().iter().map(|slot| slot.resolve(&ctx)).collect())
    }

    async fn init_context(&self, meta: &SessionMeta) -> Result<Value, EngineError> {
        let ctx = self.init(meta).await;
        serde_json::to_value(&ctx).map_err(|error| EngineError::ContextDecode {
            flow_id: self.id().to_string(),
            message: error.to_string(),
        })
    }

    async fn validate_filled(
        &self,
        filled: &Filled,
        ctx: &Value,
    ) -> Result<Validation, EngineError> {
        let ctx = decode(self, ctx)?;
        Ok(self.validate(filled, &ctx).await)
    }

    async fn finalize_filled(
        &self,
        filled: &Filled,
        ctx: &Value,
    ) -> Result<FinalizeResult, EngineError> {
        let ctx = decode(self, ctx)?;
        Ok(self.finalize(filled, &ctx).await?)
    }

    fn redirect_for(&self, ctx: &Value) -> Result<String, EngineError> {
        let ctx = decode(self, ctx)?;
        Ok(self.redirect_message(&ctx))
    }

    fn start_fields_for(&self, ctx: &Value) -> Result<Map<String, Value>, EngineError> {
        let ctx = decode(self, ctx)?;
        Ok(self.start_fields(&ctx))
    }
}

/// Re-runs every per-slot check over a filled map. Flows use this as their
/// baseline cross-slot validation.
pub fn check_filled<C>(slots: &[SlotSpec<C>], filled: &Filled, ctx: &C) -> Vec<String> {
    let mut errors = Vec::new();
    for slot in slots.iter().map(|slot| slot.resolve(ctx)) {
        match filled.get(&slot.key) {
            Some(value) => {
                if let Err(problem) = slot.check(value) {
                    errors.push(problem);
                }
            }
            None if slot.required => errors.push(format!("Missing a value for `{}`.", slot.key)),
            None => {}
        }
    }
    errors
}
