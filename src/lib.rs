//! # axum-endpoint-authz
//!
//! Endpoint authorization middleware for [axum](https://docs.rs/axum) 0.8.
//!
//! HTTP endpoints are mapped, in configuration, to the Kubernetes-style
//! resource attributes they stand for. Every request is turned into zero or
//! more tuples:
//!
//! - **namespace**, **apiGroup**, **apiVersion**, **resource**,
//!   **subresource**, **name** and **verb**
//!
//! and each tuple is checked with an external access review authority, such
//! as a Kubernetes `SubjectAccessReview`. The request proceeds only if every
//! tuple is allowed.
//!
//! ## Features
//!
//! - **Declarative mapping** - endpoint prefix + method to resource tuples, in YAML or TOML
//! - **Dynamic values** - tuple fields templated from a header, a query parameter or the method
//! - **All-or-nothing decisions** - tuples reviewed in order, first refusal wins
//! - **Pluggable authority** - implement [`AccessReviewer`], or use the built-in
//!   `SubjectAccessReviewer` (feature `kubernetes`)
//! - **Cancellation aware** - reviews stop when the client goes away or a timeout passes
//!
//! ## Quick Start
//!
//! ```no_run
//! use axum::{Router, routing::post};
//! use axum_endpoint_authz::{AuthzLayer, Authorizer, AuthorizationConfig, StaticReviewer};
//! use std::sync::Arc;
//!
//! async fn create_job() -> &'static str {
//!     "created"
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = AuthorizationConfig::from_yaml(r#"
//! authorization:
//!   endpoints:
//!     - path: /api/v1/evaluations/jobs
//!       mappings:
//!         - methods: [post]
//!           resources:
//!             - rewrites:
//!                 byHttpHeader:
//!                   name: X-Tenant
//!               resourceAttributes:
//!                 namespace: "{{ .FromHeader }}"
//!                 apiGroup: trustyai.opendatahub.io
//!                 resource: evaluations
//!                 verb: "{{ .FromMethod }}"
//! "#).unwrap();
//!
//!     let authorizer = Authorizer::new(config.into_shared(), Arc::new(StaticReviewer::allow_all()));
//!
//!     let app = Router::new()
//!         .route("/api/v1/evaluations/jobs", post(create_job))
//!         .layer(AuthzLayer::new(authorizer));
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
//!     axum::serve(listener, app).await.unwrap();
//! }
//! ```
//!
//! ## Rule Matching
//!
//! 1. **Endpoint**: the first endpoint whose `path` is a string prefix of the request path
//! 2. **Mapping**: the first of its mappings whose `methods` contain the request method
//!    (an empty list matches any method)
//! 3. **Resources**: every rule of that mapping yields one tuple
//!
//! If no endpoint matches, or the matching endpoint has no mapping for the
//! method, there is nothing to check and the request is **allowed**. Later
//! endpoints are never consulted once one has matched by path.
//!
//! ## Templates
//!
//! | Value             | Source                                            |
//! |-------------------|---------------------------------------------------|
//! | `FromHeader`      | the rule's `rewrites.byHttpHeader.name` header    |
//! | `FromQueryString` | the rule's `rewrites.byQueryString.name` parameter|
//! | `FromMethod`      | `GET`→`get`, `POST`→`create`, `PUT`→`update`, ... |
//!
//! A template that fails to render yields an empty field; it never fails the
//! request.
//!
//! ## Outcomes
//!
//! | Outcome                | Middleware response           |
//! |------------------------|-------------------------------|
//! | every tuple `Allow`    | inner service                 |
//! | `Deny` or `NoOpinion`  | 403 via [`AccessDeniedHandler`] |
//! | authority error        | 500                           |
//!
//! ## Subjects
//!
//! By default the subject is read from `X-Forwarded-User` and
//! `X-Forwarded-Groups`. Implement [`SubjectExtractor`] for anything else:
//!
//! ```
//! use axum_endpoint_authz::{SubjectExtractor, SubjectExtractionResult, UserInfo};
//! use http::Request;
//!
//! struct BearerExtractor;
//!
//! impl<B> SubjectExtractor<B> for BearerExtractor {
//!     fn extract_subject(&self, request: &Request<B>) -> SubjectExtractionResult {
//!         if request.headers().contains_key("Authorization") {
//!             // Validate the token and read its claims...
//!             SubjectExtractionResult::Subject(UserInfo::new("token-user"))
//!         } else {
//!             SubjectExtractionResult::Anonymous
//!         }
//!     }
//! }
//! ```
//!
//! ## Custom Denied Response
//!
//! ```
//! use axum_endpoint_authz::{AuthzLayer, AccessDeniedHandler, AccessDenied, JsonDeniedHandler};
//! use axum::response::{Response, IntoResponse};
//! use http::StatusCode;
//!
//! // Built-in JSON handler with the denied tuple in the body
//! let layer = AuthzLayer::disabled()
//!     .with_denied_handler(JsonDeniedHandler::new().with_details());
//!
//! // Or your own
//! struct CustomHandler;
//!
//! impl AccessDeniedHandler for CustomHandler {
//!     fn handle(&self, _denied: &AccessDenied) -> Response {
//!         (StatusCode::FORBIDDEN, "Custom denied message").into_response()
//!     }
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![forbid(unsafe_code)]

mod attributes;
mod authority;
mod authorizer;
mod config;
mod error;
mod extractor;
#[cfg(feature = "kubernetes")]
mod kubernetes;
mod matcher;
mod middleware;
mod request;
mod template;
mod verb;

// Re-export main types
pub use attributes::{resource_attributes, AttributeBuilder, ResourceAttributes};
pub use authority::{
    AccessReviewer, AuthorityError, AuthorizeContext, Decision, Review, StaticReviewer, UserInfo,
};
pub use authorizer::{AuthorizationOutcome, Authorizer};
pub use config::{
    AuthorizationConfig, ConfigError, Endpoint, Mapping, ResourceAttributeTemplates, ResourceRule,
    Rewrite,
};
pub use error::{
    AccessDenied, AccessDeniedHandler, AuthorizationError, DefaultDeniedHandler, ErrorBody,
    JsonDeniedHandler, PlainDeniedHandler, NOT_ALLOWED,
};
pub use extractor::{
    AnonymousSubjectExtractor, ChainedSubjectExtractor, ExtensionSubjectExtractor,
    FixedSubjectExtractor, HeaderSubjectExtractor, SubjectExtractionResult, SubjectExtractor,
    DEFAULT_GROUPS_HEADER, DEFAULT_USER_HEADER,
};
#[cfg(feature = "kubernetes")]
pub use kubernetes::{build_review, interpret, SubjectAccessReviewer, NO_SUBJECT_REASON};
pub use matcher::RuleMatch;
pub use middleware::{AuthzConfig, AuthzLayer, AuthzMiddleware};
pub use request::{QueryParams, RequestView};
pub use template::{render_template, TemplateEngine, TemplateError, TemplateValues};
pub use verb::kube_verb;

/// Prelude module for convenient imports.
///
/// ```
/// use axum_endpoint_authz::prelude::*;
/// ```
pub mod prelude {
    pub use crate::attributes::ResourceAttributes;
    pub use crate::authority::{AccessReviewer, AuthorizeContext, Decision, Review, UserInfo};
    pub use crate::authorizer::{AuthorizationOutcome, Authorizer};
    pub use crate::config::{AuthorizationConfig, ConfigError};
    pub use crate::error::{AccessDenied, AccessDeniedHandler, AuthorizationError};
    pub use crate::extractor::{HeaderSubjectExtractor, SubjectExtractionResult, SubjectExtractor};
    pub use crate::middleware::AuthzLayer;
    pub use crate::request::RequestView;
}
