//! Error types and HTTP responses for refused requests.

use crate::attributes::ResourceAttributes;
use crate::authority::AuthorityError;
use axum::response::{IntoResponse, Response};
use axum::Json;
use http::StatusCode;
use serde::Serialize;
use std::fmt;

/// Message used for every denial.
pub const NOT_ALLOWED: &str = "authorization decision: not allowed";

/// Why a request was refused.
#[derive(Debug, thiserror::Error)]
pub enum AuthorizationError {
    /// The authority did not allow one of the request's tuples.
    #[error("authorization decision: not allowed")]
    Denied {
        /// The tuple that was not allowed.
        attributes: ResourceAttributes,
        /// Reason reported by the authority.
        reason: String,
    },

    /// The authority could not be consulted.
    #[error("authorization failed: {0}")]
    Failed(#[from] AuthorityError),
}

/// JSON body of an error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    /// Human readable message.
    pub message: String,
    /// Stable machine readable code.
    pub message_code: &'static str,
}

impl ErrorBody {
    fn forbidden(reason: &str) -> Self {
        let message = if reason.is_empty() {
            "Request forbidden".to_string()
        } else {
            format!("Request forbidden: {}", reason)
        };
        Self {
            message,
            message_code: "forbidden",
        }
    }

    fn internal() -> Self {
        Self {
            message: "Authorization check failed".to_string(),
            message_code: "internal_server_error",
        }
    }
}

impl IntoResponse for AuthorizationError {
    fn into_response(self) -> Response {
        match self {
            Self::Denied { reason, .. } => {
                (StatusCode::FORBIDDEN, Json(ErrorBody::forbidden(&reason))).into_response()
            }
            // The authority error stays in the logs.
            Self::Failed(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorBody::internal())).into_response()
            }
        }
    }
}

/// Details of a denied request, handed to an [`AccessDeniedHandler`].
#[derive(Debug, Clone)]
pub struct AccessDenied {
    /// Request path.
    pub path: String,
    /// Request method.
    pub method: String,
    /// Username of the subject, if one was extracted.
    pub user: Option<String>,
    /// The tuple that was not allowed.
    pub attributes: ResourceAttributes,
    /// Reason reported by the authority.
    pub reason: String,
}

impl AccessDenied {
    /// Create a denial for a request.
    pub fn new(path: impl Into<String>, method: impl Into<String>, attributes: ResourceAttributes) -> Self {
        Self {
            path: path.into(),
            method: method.into(),
            user: None,
            attributes,
            reason: String::new(),
        }
    }

    /// Set the authority's reason.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    /// Set the subject's username.
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }
}

impl fmt::Display for AccessDenied {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} {}: {})", NOT_ALLOWED, self.method, self.path, self.attributes)
    }
}

impl std::error::Error for AccessDenied {}

impl IntoResponse for AccessDenied {
    fn into_response(self) -> Response {
        AuthorizationError::Denied {
            attributes: self.attributes,
            reason: self.reason,
        }
        .into_response()
    }
}

/// Custom response for denied requests.
///
/// # Example
/// ```
/// use axum_endpoint_authz::{AccessDeniedHandler, AccessDenied};
/// use axum::response::{Response, IntoResponse};
/// use http::StatusCode;
///
/// struct NotFoundHandler;
///
/// impl AccessDeniedHandler for NotFoundHandler {
///     fn handle(&self, _denied: &AccessDenied) -> Response {
///         // Hide the existence of the resource
///         StatusCode::NOT_FOUND.into_response()
///     }
/// }
/// ```
pub trait AccessDeniedHandler: Send + Sync {
    /// Build the response for a denied request.
    fn handle(&self, denied: &AccessDenied) -> Response;
}

/// JSON 403 with `message` and `message_code` only.
#[derive(Debug, Clone, Default)]
pub struct DefaultDeniedHandler;

impl AccessDeniedHandler for DefaultDeniedHandler {
    fn handle(&self, denied: &AccessDenied) -> Response {
        denied.clone().into_response()
    }
}

/// Plain text 403.
#[derive(Debug, Clone, Default)]
pub struct PlainDeniedHandler;

impl AccessDeniedHandler for PlainDeniedHandler {
    fn handle(&self, _denied: &AccessDenied) -> Response {
        (StatusCode::FORBIDDEN, "Access denied").into_response()
    }
}

/// JSON 403 that can also report what was checked.
#[derive(Debug, Clone, Default)]
pub struct JsonDeniedHandler {
    include_details: bool,
}

impl JsonDeniedHandler {
    /// Create a handler without details.
    pub fn new() -> Self {
        Self::default()
    }

    /// Include path, method and the denied tuple in the body.
    ///
    /// Exposes the authorization model to clients.
    pub fn with_details(mut self) -> Self {
        self.include_details = true;
        self
    }
}

impl AccessDeniedHandler for JsonDeniedHandler {
    fn handle(&self, denied: &AccessDenied) -> Response {
        let base = ErrorBody::forbidden(&denied.reason);
        let body = if self.include_details {
            serde_json::json!({
                "message": base.message,
                "message_code": base.message_code,
                "path": denied.path,
                "method": denied.method,
                "resourceAttributes": denied.attributes,
            })
        } else {
            serde_json::json!({
                "message": base.message,
                "message_code": base.message_code,
            })
        };

        (StatusCode::FORBIDDEN, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn denied() -> AccessDenied {
        AccessDenied::new(
            "/api/v1/jobs",
            "POST",
            ResourceAttributes {
                namespace: "tenant-a".into(),
                resource: "jobs".into(),
                verb: "create".into(),
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_denied_error_response() {
        let err = AuthorizationError::Denied {
            attributes: ResourceAttributes::default(),
            reason: String::new(),
        };
        assert_eq!(err.to_string(), NOT_ALLOWED);

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = body_json(response).await;
        assert_eq!(body["message_code"], "forbidden");
        assert_eq!(body["message"], "Request forbidden");
    }

    #[tokio::test]
    async fn test_failed_error_response_hides_cause() {
        let err = AuthorizationError::from(AuthorityError::InvalidResponse("secret detail".into()));
        assert!(err.to_string().contains("secret detail"));

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["message_code"], "internal_server_error");
        assert!(!body.to_string().contains("secret detail"));
    }

    #[tokio::test]
    async fn test_default_handler_includes_reason() {
        let response = DefaultDeniedHandler.handle(&denied().with_reason("no rolebinding"));
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = body_json(response).await;
        assert_eq!(body["message"], "Request forbidden: no rolebinding");
        assert!(body.get("path").is_none());
    }

    #[tokio::test]
    async fn test_plain_handler() {
        let response = PlainDeniedHandler.handle(&denied());
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"Access denied");
    }

    #[tokio::test]
    async fn test_json_handler_details() {
        let response = JsonDeniedHandler::new().with_details().handle(&denied());
        let body = body_json(response).await;
        assert_eq!(body["path"], "/api/v1/jobs");
        assert_eq!(body["method"], "POST");
        assert_eq!(body["resourceAttributes"]["namespace"], "tenant-a");
        assert_eq!(body["resourceAttributes"]["verb"], "create");

        let body = body_json(JsonDeniedHandler::new().handle(&denied())).await;
        assert!(body.get("resourceAttributes").is_none());
    }

    #[test]
    fn test_access_denied_display() {
        let text = denied().with_user("alice").to_string();
        assert!(text.starts_with(NOT_ALLOWED));
        assert!(text.contains("POST /api/v1/jobs"));
        assert!(text.contains("resource=jobs"));
    }
}
