use crate::collectors::TelemetryError;
use crate::control::ControlError;
use crate::models::ErrorBody;
use axum::body::Body;
use axum::extract::rejection::BytesRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::any::Any;
use thiserror::Error;
use tracing::error;

const FAULT_TITLE: &str = "Something went wrong!";
const GENERIC_FAULT_MESSAGE: &str = "Server error";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("The requested resource at {0} was not found")]
    NotFound(String),
    #[error("malformed request body: {0}")]
    MalformedBody(String),
    #[error("{message}")]
    Rejected { status: StatusCode, message: String },
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    #[error(transparent)]
    Control(#[from] ControlError),
}

impl From<BytesRejection> for ApiError {
    fn from(rejection: BytesRejection) -> Self {
        Self::Rejected {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

/// Raw description of an unhandled fault, attached to a 500 response so the
/// error policy can decide whether the caller gets to see it.
#[derive(Debug, Clone)]
pub struct FaultDetail(pub String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::NotFound(_) => {
                error_response(StatusCode::NOT_FOUND, "Not Found", self.to_string())
            }
            Self::MalformedBody(_) => {
                error_response(StatusCode::BAD_REQUEST, "Bad Request", self.to_string())
            }
            Self::Rejected { status, message } => {
                let title = status.canonical_reason().unwrap_or("Bad Request");
                error_response(status, title, message)
            }
            Self::Telemetry(_) | Self::Control(_) => {
                let detail = self.to_string();
                error!(error = %detail, "request failed");
                let mut response = fault_response(GENERIC_FAULT_MESSAGE.to_string());
                response.extensions_mut().insert(FaultDetail(detail));
                response
            }
        }
    }
}

/// Decides how much of an unhandled fault reaches the caller.
#[derive(Debug, Clone, Copy)]
pub struct ErrorPolicy {
    production: bool,
}

impl ErrorPolicy {
    pub fn new(production: bool) -> Self {
        Self { production }
    }

    pub fn is_production(&self) -> bool {
        self.production
    }

    pub fn fault_message(&self, detail: &str) -> String {
        if self.production {
            GENERIC_FAULT_MESSAGE.to_string()
        } else {
            detail.to_string()
        }
    }

    pub fn panic_response(&self, panic: Box<dyn Any + Send + 'static>) -> Response<Body> {
        let detail = panic_message(panic.as_ref());
        error!(panic = %detail, "handler panicked");
        fault_response(self.fault_message(&detail))
    }
}

/// Rewrites 500 responses carrying a [`FaultDetail`] according to the policy.
pub async fn apply_error_policy(State(policy): State<ErrorPolicy>, response: Response) -> Response {
    let detail = response
        .extensions()
        .get::<FaultDetail>()
        .map(|FaultDetail(detail)| detail.clone());
    match detail {
        Some(detail) if !policy.is_production() => fault_response(policy.fault_message(&detail)),
        _ => response,
    }
}

fn fault_response(message: String) -> Response {
    error_response(StatusCode::INTERNAL_SERVER_ERROR, FAULT_TITLE, message)
}

fn error_response(status: StatusCode, title: &str, message: String) -> Response {
    (
        status,
        Json(ErrorBody {
            error: title.to_string(),
            message,
        }),
    )
        .into_response()
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn not_found_names_the_path() {
        let response = ApiError::NotFound("/no/such/path".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Not Found");
        assert_eq!(
            body["message"],
            "The requested resource at /no/such/path was not found"
        );
    }

    #[tokio::test]
    async fn faults_hide_detail_until_policy_applies() {
        let err = ApiError::from(TelemetryError::Source("sensor exploded".to_string()));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.extensions().get::<FaultDetail>().is_some());

        let dev = apply_error_policy(State(ErrorPolicy::new(false)), response).await;
        let body = body_json(dev).await;
        assert_eq!(body["error"], "Something went wrong!");
        assert_eq!(body["message"], "telemetry source failed: sensor exploded");

        let err = ApiError::from(TelemetryError::Source("sensor exploded".to_string()));
        let prod = apply_error_policy(State(ErrorPolicy::new(true)), err.into_response()).await;
        let body = body_json(prod).await;
        assert_eq!(body["message"], "Server error");
    }

    #[tokio::test]
    async fn panic_response_follows_policy() {
        let dev = ErrorPolicy::new(false).panic_response(Box::new("boom"));
        assert_eq!(dev.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(dev).await["message"], "boom");

        let prod = ErrorPolicy::new(true).panic_response(Box::new(String::from("boom")));
        assert_eq!(body_json(prod).await["message"], "Server error");
    }
}
