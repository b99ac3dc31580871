//! Extraction fallback for the dialogue engine.
//!
//! When the deterministic parser bank cannot read a slot value, the runner
//! may ask an externally hosted language model. This crate owns that call:
//! the slot-specific instruction templates (`prompts`), the transport seam
//! (`llm`), and the tolerant response reader (`extraction`).
//!
//! The model is strictly a reader. Whatever it returns is whitelisted, shaped
//! to the slot type, and then checked by the runner like any parsed value.

pub mod extraction;
pub mod llm;
pub mod prompts;

pub use extraction::{read_extraction, ExtractionFallback};
pub use llm::{CompletionRequest, HttpLlmClient, LlmClient};
