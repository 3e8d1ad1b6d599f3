//! Decision engine.
//!
//! [`Authorizer`] ties the pieces together: it builds the tuples for a
//! request, submits them one at a time to the [`AccessReviewer`] and reduces
//! the verdicts to a single [`AuthorizationOutcome`].

use crate::attributes::{AttributeBuilder, ResourceAttributes};
use crate::authority::{AccessReviewer, AuthorityError, AuthorizeContext, Decision, Review};
use crate::config::AuthorizationConfig;
use crate::error::AuthorizationError;
use crate::request::RequestView;
use std::sync::Arc;

/// Reduced result of reviewing every tuple of a request.
#[derive(Debug)]
pub enum AuthorizationOutcome {
    /// Every tuple was allowed, or the request matched no rule.
    Allowed,
    /// A tuple was not allowed. Later tuples were not reviewed.
    Denied {
        /// The first tuple that was not allowed.
        attributes: ResourceAttributes,
        /// Reason reported by the authority.
        reason: String,
    },
    /// The authority could not produce a verdict.
    Failed(AuthorityError),
}

impl AuthorizationOutcome {
    /// Whether the request may proceed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }

    /// Whether the request was denied.
    pub fn is_denied(&self) -> bool {
        matches!(self, Self::Denied { .. })
    }

    /// Whether the authority failed.
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Convert to a `Result`, keeping denial and failure apart.
    pub fn into_result(self) -> Result<(), AuthorizationError> {
        match self {
            Self::Allowed => Ok(()),
            Self::Denied { attributes, reason } => Err(AuthorizationError::Denied { attributes, reason }),
            Self::Failed(err) => Err(AuthorizationError::Failed(err)),
        }
    }
}

/// Authorizes requests against an [`AuthorizationConfig`].
///
/// # Example
/// ```
/// use axum_endpoint_authz::{Authorizer, AuthorizationConfig, AuthorizeContext, RequestView, StaticReviewer};
/// use std::sync::Arc;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let config = AuthorizationConfig::new().into_shared();
/// let authorizer = Authorizer::new(config, Arc::new(StaticReviewer::deny_all()));
///
/// // Nothing is configured, so the request is allowed without a review
/// let request = RequestView::new("GET", "/healthz");
/// assert!(authorizer.is_allowed(&AuthorizeContext::new(), &request).await);
/// # }
/// ```
pub struct Authorizer {
    config: Arc<AuthorizationConfig>,
    reviewer: Arc<dyn AccessReviewer>,
    builder: AttributeBuilder,
}

impl std::fmt::Debug for Authorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authorizer")
            .field("endpoints", &self.config.endpoints.len())
            .finish_non_exhaustive()
    }
}

impl Authorizer {
    /// Create an authorizer.
    ///
    /// Templates that cannot render are reported as warnings here; at request
    /// time they produce empty fields.
    pub fn new(config: Arc<AuthorizationConfig>, reviewer: Arc<dyn AccessReviewer>) -> Self {
        let builder = AttributeBuilder::new();
        warn_on_bad_templates(&config, &builder);
        Self {
            config,
            reviewer,
            builder,
        }
    }

    /// The configuration in use.
    pub fn config(&self) -> &Arc<AuthorizationConfig> {
        &self.config
    }

    /// Tuples the request would be reviewed with.
    pub fn attributes(&self, request: &RequestView) -> Vec<ResourceAttributes> {
        self.builder.build(&self.config, request)
    }

    /// Decide a request.
    pub async fn decide(&self, ctx: &AuthorizeContext, request: &RequestView) -> AuthorizationOutcome {
        let attributes = self.attributes(request);
        if attributes.is_empty() {
            tracing::trace!(
                path = request.path(),
                method = request.method(),
                "No authorization rule matched, allowing"
            );
        }
        self.decide_attributes(ctx, &attributes).await
    }

    /// Decide a precomputed list of tuples.
    ///
    /// Tuples are reviewed in order. The first failure or non-`Allow` verdict
    /// stops the loop. An empty list is allowed.
    pub async fn decide_attributes(
        &self,
        ctx: &AuthorizeContext,
        attributes: &[ResourceAttributes],
    ) -> AuthorizationOutcome {
        for (index, attrs) in attributes.iter().enumerate() {
            let review = match self.review(ctx, attrs).await {
                Ok(review) => review,
                Err(err) => {
                    tracing::debug!(index = index, attributes = %attrs, error = %err, "Access review failed");
                    return AuthorizationOutcome::Failed(err);
                }
            };

            if review.decision != Decision::Allow {
                tracing::debug!(
                    index = index,
                    attributes = %attrs,
                    decision = ?review.decision,
                    reason = %review.reason,
                    "Access review did not allow"
                );
                return AuthorizationOutcome::Denied {
                    attributes: attrs.clone(),
                    reason: review.reason,
                };
            }

            tracing::trace!(index = index, attributes = %attrs, "Access review allowed");
        }
        AuthorizationOutcome::Allowed
    }

    /// Whether the request is allowed. Authority failures count as not allowed.
    pub async fn is_allowed(&self, ctx: &AuthorizeContext, request: &RequestView) -> bool {
        self.decide(ctx, request).await.is_allowed()
    }

    /// Authorize the request, returning why it was refused.
    pub async fn authorize(&self, ctx: &AuthorizeContext, request: &RequestView) -> Result<(), AuthorizationError> {
        self.decide(ctx, request).await.into_result()
    }

    async fn review(&self, ctx: &AuthorizeContext, attrs: &ResourceAttributes) -> Result<Review, AuthorityError> {
        ctx.check()?;

        let review = self.reviewer.review(ctx, attrs);
        let cancelled = ctx.cancellation().cancelled();

        match ctx.deadline() {
            Some(deadline) => tokio::select! {
                biased;
                _ = cancelled => Err(AuthorityError::Cancelled),
                result = tokio::time::timeout_at(deadline, review) => {
                    result.unwrap_or_else(|_| Err(AuthorityError::DeadlineExceeded))
                }
            },
            None => tokio::select! {
                biased;
                _ = cancelled => Err(AuthorityError::Cancelled),
                result = review => result,
            },
        }
    }
}

fn warn_on_bad_templates(config: &AuthorizationConfig, builder: &AttributeBuilder) {
    for endpoint in &config.endpoints {
        for mapping in &endpoint.mappings {
            for rule in &mapping.resources {
                for (field, template) in rule.resource_attributes.fields() {
                    if let Err(err) = builder.engine().check(template) {
                        tracing::warn!(
                            endpoint = %endpoint.path,
                            field = field,
                            template = template,
                            error = %err,
                            "Attribute template will render empty"
                        );
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Endpoint, Mapping, ResourceAttributeTemplates, ResourceRule, Rewrite};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    /// Answers by resource name and records every call.
    #[derive(Default)]
    struct ScriptedReviewer {
        answers: Vec<(&'static str, Result<Decision, &'static str>)>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedReviewer {
        fn new(answers: Vec<(&'static str, Result<Decision, &'static str>)>) -> Arc<Self> {
            Arc::new(Self {
                answers,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AccessReviewer for ScriptedReviewer {
        async fn review(
            &self,
            _ctx: &AuthorizeContext,
            attributes: &ResourceAttributes,
        ) -> Result<Review, AuthorityError> {
            self.calls.lock().unwrap().push(attributes.resource.clone());
            let answer = self
                .answers
                .iter()
                .find(|(resource, _)| *resource == attributes.resource)
                .map(|(_, answer)| answer.clone())
                .unwrap_or(Ok(Decision::NoOpinion));
            match answer {
                Ok(decision) => Ok(Review {
                    decision,
                    reason: format!("{:?} {}", decision, attributes.resource),
                }),
                Err(msg) => Err(AuthorityError::InvalidResponse(msg.to_string())),
            }
        }
    }

    /// Never answers.
    struct HangingReviewer;

    #[async_trait]
    impl AccessReviewer for HangingReviewer {
        async fn review(
            &self,
            _ctx: &AuthorizeContext,
            _attributes: &ResourceAttributes,
        ) -> Result<Review, AuthorityError> {
            std::future::pending().await
        }
    }

    fn tuple(resource: &str) -> ResourceAttributes {
        ResourceAttributes {
            resource: resource.to_string(),
            ..Default::default()
        }
    }

    fn jobs_config() -> Arc<AuthorizationConfig> {
        AuthorizationConfig::from_yaml(include_str!("../testdata/rbac_jobs.yaml"))
            .unwrap()
            .into_shared()
    }

    #[tokio::test]
    async fn test_empty_tuples_allowed_without_review() {
        let reviewer = ScriptedReviewer::new(vec![]);
        let authorizer = Authorizer::new(jobs_config(), reviewer.clone());

        let request = RequestView::new("GET", "/api/v1/other");
        let outcome = authorizer.decide(&AuthorizeContext::new(), &request).await;
        assert!(outcome.is_allowed());
        assert!(reviewer.calls().is_empty());
    }

    #[tokio::test]
    async fn test_endpoint_without_method_mapping_allowed() {
        let reviewer = ScriptedReviewer::new(vec![]);
        let authorizer = Authorizer::new(jobs_config(), reviewer.clone());

        let request = RequestView::new("PUT", "/api/v1/evaluations/jobs");
        assert!(authorizer.is_allowed(&AuthorizeContext::new(), &request).await);
        assert!(reviewer.calls().is_empty());
    }

    #[tokio::test]
    async fn test_all_allowed() {
        let reviewer = ScriptedReviewer::new(vec![
            ("evaluations", Ok(Decision::Allow)),
            ("experiments", Ok(Decision::Allow)),
        ]);
        let authorizer = Authorizer::new(jobs_config(), reviewer.clone());

        let request = RequestView::new("POST", "/api/v1/evaluations/jobs").header("X-Tenant", "tenant-a");
        let outcome = authorizer.decide(&AuthorizeContext::new(), &request).await;
        assert!(outcome.is_allowed());
        assert_eq!(reviewer.calls(), vec!["evaluations", "experiments"]);
        assert!(authorizer.authorize(&AuthorizeContext::new(), &request).await.is_ok());
    }

    #[tokio::test]
    async fn test_short_circuit_on_deny() {
        let reviewer = ScriptedReviewer::new(vec![
            ("t1", Ok(Decision::Allow)),
            ("t2", Ok(Decision::Deny)),
            ("t3", Ok(Decision::Allow)),
        ]);
        let authorizer = Authorizer::new(AuthorizationConfig::new().into_shared(), reviewer.clone());

        let outcome = authorizer
            .decide_attributes(&AuthorizeContext::new(), &[tuple("t1"), tuple("t2"), tuple("t3")])
            .await;
        match outcome {
            AuthorizationOutcome::Denied { attributes, reason } => {
                assert_eq!(attributes.resource, "t2");
                assert_eq!(reason, "Deny t2");
            }
            other => panic!("Expected Denied, got {:?}", other),
        }
        assert_eq!(reviewer.calls(), vec!["t1", "t2"]);
    }

    #[tokio::test]
    async fn test_no_opinion_is_denied() {
        let reviewer = ScriptedReviewer::new(vec![("t1", Ok(Decision::NoOpinion))]);
        let authorizer = Authorizer::new(AuthorizationConfig::new().into_shared(), reviewer.clone());

        let outcome = authorizer
            .decide_attributes(&AuthorizeContext::new(), &[tuple("t1"), tuple("t2")])
            .await;
        assert!(outcome.is_denied());
        assert_eq!(reviewer.calls(), vec!["t1"]);
    }

    #[tokio::test]
    async fn test_error_stops_and_fails() {
        let reviewer = ScriptedReviewer::new(vec![
            ("t1", Err("garbled")),
            ("t2", Ok(Decision::Allow)),
        ]);
        let authorizer = Authorizer::new(AuthorizationConfig::new().into_shared(), reviewer.clone());

        let outcome = authorizer
            .decide_attributes(&AuthorizeContext::new(), &[tuple("t1"), tuple("t2")])
            .await;
        assert!(matches!(
            outcome,
            AuthorizationOutcome::Failed(AuthorityError::InvalidResponse(_))
        ));
        assert_eq!(reviewer.calls(), vec!["t1"]);
    }

    #[tokio::test]
    async fn test_boolean_and_error_projections() {
        let reviewer = ScriptedReviewer::new(vec![("evaluations", Err("boom"))]);
        let authorizer = Authorizer::new(jobs_config(), reviewer);
        let request = RequestView::new("GET", "/api/v1/evaluations/jobs");
        let ctx = AuthorizeContext::new();

        assert!(!authorizer.is_allowed(&ctx, &request).await);
        assert!(matches!(
            authorizer.authorize(&ctx, &request).await,
            Err(AuthorizationError::Failed(_))
        ));

        let reviewer = ScriptedReviewer::new(vec![("evaluations", Ok(Decision::Deny))]);
        let authorizer = Authorizer::new(jobs_config(), reviewer);
        let err = authorizer.authorize(&ctx, &request).await.unwrap_err();
        assert_eq!(err.to_string(), "authorization decision: not allowed");
    }

    #[tokio::test]
    async fn test_cancelled_before_review() {
        let reviewer = ScriptedReviewer::new(vec![("t1", Ok(Decision::Allow))]);
        let authorizer = Authorizer::new(AuthorizationConfig::new().into_shared(), reviewer.clone());

        let token = CancellationToken::new();
        token.cancel();
        let ctx = AuthorizeContext::new().with_cancellation(token);

        let outcome = authorizer.decide_attributes(&ctx, &[tuple("t1")]).await;
        assert!(matches!(outcome, AuthorizationOutcome::Failed(AuthorityError::Cancelled)));
        assert!(reviewer.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_during_review() {
        let authorizer = Authorizer::new(AuthorizationConfig::new().into_shared(), Arc::new(HangingReviewer));

        let token = CancellationToken::new();
        let ctx = AuthorizeContext::new().with_cancellation(token.clone());
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            token.cancel();
        });

        let outcome = authorizer.decide_attributes(&ctx, &[tuple("t1")]).await;
        assert!(matches!(outcome, AuthorizationOutcome::Failed(AuthorityError::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_during_review() {
        let authorizer = Authorizer::new(AuthorizationConfig::new().into_shared(), Arc::new(HangingReviewer));
        let ctx = AuthorizeContext::new().with_timeout(Duration::from_secs(2));

        let outcome = authorizer.decide_attributes(&ctx, &[tuple("t1")]).await;
        assert!(matches!(
            outcome,
            AuthorizationOutcome::Failed(AuthorityError::DeadlineExceeded)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_passed_before_review() {
        let reviewer = ScriptedReviewer::new(vec![("t1", Ok(Decision::Allow))]);
        let authorizer = Authorizer::new(AuthorizationConfig::new().into_shared(), reviewer.clone());
        let ctx = AuthorizeContext::new().with_timeout(Duration::from_secs(1));
        tokio::time::advance(Duration::from_secs(2)).await;

        let outcome = authorizer.decide_attributes(&ctx, &[tuple("t1")]).await;
        assert!(matches!(
            outcome,
            AuthorizationOutcome::Failed(AuthorityError::DeadlineExceeded)
        ));
        assert!(reviewer.calls().is_empty());
    }

    #[tokio::test]
    async fn test_bad_template_does_not_block_construction() {
        let config = AuthorizationConfig::new().endpoint(Endpoint::new("/x").mapping(
            Mapping::new().resource(
                ResourceRule::new(
                    ResourceAttributeTemplates::new()
                        .namespace("{{ .Nope }}")
                        .resource("things"),
                )
                .rewrite(Rewrite::header("X-Tenant")),
            ),
        ));
        let reviewer = ScriptedReviewer::new(vec![("things", Ok(Decision::Allow))]);
        let authorizer = Authorizer::new(config.into_shared(), reviewer);

        let attrs = authorizer.attributes(&RequestView::new("GET", "/x"));
        assert_eq!(attrs[0].namespace, "");
        assert!(authorizer.is_allowed(&AuthorizeContext::new(), &RequestView::new("GET", "/x")).await);
    }
}
