pub mod audit;
pub mod config;
pub mod errors;
pub mod extraction;
pub mod flows;
pub mod session;
pub mod slots;

pub use audit::{AuditEvent, AuditSink, InMemoryAuditSink, TracingAuditSink};
pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat, SessionBackend};
pub use errors::{EngineError, InterfaceError};
pub use extraction::{ExtractorResult, SlotExtractor};
pub use flows::{
    BulletSummaryFlow, FinalizeError, FinalizeResult, Flow, FlowRunner, QuizSetupFlow,
    RunnerSettings, Stage, StartOutcome, TurnOutcome, Validation,
};
pub use session::{
    Cursor, InMemorySessionStore, SessionMeta, SessionState, SessionStore, StoreError,
};
pub use slots::{Filled, ParserHint, ResolvedSlot, SlotSpec, SlotType, SlotValue, UiHints};
