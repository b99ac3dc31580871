pub mod clarifier;

use std::sync::Arc;

use axum::Router;
use clarifier_core::flows::FlowRunner;

pub fn router(runner: Arc<FlowRunner>) -> Router {
    clarifier::router(clarifier::ClarifierState { runner })
}
