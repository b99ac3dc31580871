use thiserror::Error;

use crate::flows::FinalizeError;
use crate::session::StoreError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("unknown flow `{flow_id}`")]
    FlowNotFound { flow_id: String },
    #[error("flow `{flow_id}` declares no slots")]
    EmptySlotSequence { flow_id: String },
    #[error("no session with id `{session_id}`")]
    SessionNotFound { session_id: String },
    #[error("validation failed: {}", errors.join("; "))]
    Validation { errors: Vec<String> },
    #[error("stored context for flow `{flow_id}` could not be decoded: {message}")]
    ContextDecode { flow_id: String, message: String },
    #[error(transparent)]
    Finalize(#[from] FinalizeError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
    #[error("upstream error ({status}): {message}")]
    Upstream { status: u16, message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::NotFound { .. } => "The requested session does not exist.",
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
            Self::Upstream { .. } => "The downstream service rejected the request.",
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            Self::BadRequest { .. } => 400,
            Self::NotFound { .. } => 404,
            Self::ServiceUnavailable { .. } => 503,
            Self::Internal { .. } => 500,
            Self::Upstream { status, .. } => *status,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::BadRequest { message, .. }
            | Self::NotFound { message, .. }
            | Self::ServiceUnavailable { message, .. }
            | Self::Internal { message, .. }
            | Self::Upstream { message, .. } => message,
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. }
            | Self::Upstream { correlation_id, .. } => correlation_id,
        }
    }
}

impl EngineError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. }
            | InterfaceError::Upstream { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<EngineError> for InterfaceError {
    fn from(value: EngineError) -> Self {
        let correlation_id = "unassigned".to_owned();
        match value {
            EngineError::FlowNotFound { .. }
            | EngineError::EmptySlotSequence { .. }
            | EngineError::Validation { .. } => {
                Self::BadRequest { message: value.to_string(), correlation_id }
            }
            EngineError::SessionNotFound { .. } => {
                Self::NotFound { message: value.to_string(), correlation_id }
            }
            EngineError::Finalize(error) => {
                Self::Upstream { status: error.status, message: error.message, correlation_id }
            }
            EngineError::Store(error) => {
                Self::ServiceUnavailable { message: error.to_string(), correlation_id }
            }
            EngineError::ContextDecode { .. } => {
                Self::Internal { message: value.to_string(), correlation_id }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::{EngineError, InterfaceError};
    use crate::flows::FinalizeError;
    use crate::session::StoreError;

    #[test]
    fn unknown_flow_maps_to_bad_request_with_correlation_id() {
        let interface =
            EngineError::FlowNotFound { flow_id: "nope".to_owned() }.into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest { ref correlation_id, .. } if correlation_id == "req-1"
        ));
        assert_eq!(interface.status_code(), 400);
        assert!(interface.message().contains("nope"));
    }

    #[test]
    fn missing_session_maps_to_not_found() {
        let interface =
            EngineError::SessionNotFound { session_id: "s-1".to_owned() }.into_interface("req-2");
        assert_eq!(interface.status_code(), 404);
        assert_eq!(interface.correlation_id(), "req-2");
    }

    #[test]
    fn validation_error_lists_every_problem() {
        let error = EngineError::Validation {
            errors: vec!["count too high".to_owned(), "no types".to_owned()],
        };
        assert_eq!(error.to_string(), "validation failed: count too high; no types");
    }

    #[test]
    fn finalize_error_keeps_downstream_status() {
        let interface = EngineError::from(FinalizeError::new(502, "quiz service down"))
            .into_interface("req-3");
        assert_eq!(interface.status_code(), 502);
        assert_eq!(interface.message(), "quiz service down");
        assert_eq!(interface.user_message(), "The downstream service rejected the request.");
    }

    #[test]
    fn store_error_maps_to_service_unavailable() {
        let interface = EngineError::from(StoreError::Backend("database lock timeout".to_owned()))
            .into_interface("req-4");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert_eq!(
            interface.user_message(),
            "The service is temporarily unavailable. Please retry shortly."
        );
    }
}
