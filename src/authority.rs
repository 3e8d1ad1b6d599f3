//! Access review authority contract.
//!
//! The decision engine never evaluates policy itself. It hands each
//! [`ResourceAttributes`] tuple to an [`AccessReviewer`] and interprets the
//! returned [`Review`].

use crate::attributes::ResourceAttributes;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Verdict of an access review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// The subject may perform the action.
    Allow,
    /// The subject is explicitly refused.
    Deny,
    /// The authority has no rule either way.
    NoOpinion,
}

/// Result of reviewing a single tuple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Review {
    /// The verdict.
    pub decision: Decision,
    /// Free-form explanation from the authority. May be empty.
    pub reason: String,
}

impl Review {
    /// An `Allow` review.
    pub fn allow() -> Self {
        Self {
            decision: Decision::Allow,
            reason: String::new(),
        }
    }

    /// A `Deny` review with a reason.
    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            decision: Decision::Deny,
            reason: reason.into(),
        }
    }

    /// A `NoOpinion` review with a reason.
    pub fn no_opinion(reason: impl Into<String>) -> Self {
        Self {
            decision: Decision::NoOpinion,
            reason: reason.into(),
        }
    }

    /// Whether the decision is `Allow`.
    pub fn is_allowed(&self) -> bool {
        self.decision == Decision::Allow
    }
}

/// Error reaching a verdict.
///
/// Any of these makes the whole request fail rather than be denied.
#[derive(Debug, thiserror::Error)]
pub enum AuthorityError {
    /// The authority could not be reached or rejected the call.
    #[error("access review request failed: {0}")]
    Request(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The authority answered with something that is not a verdict.
    #[error("invalid access review response: {0}")]
    InvalidResponse(String),

    /// The request context was cancelled.
    #[error("access review cancelled")]
    Cancelled,

    /// The request context deadline passed.
    #[error("access review deadline exceeded")]
    DeadlineExceeded,
}

impl AuthorityError {
    /// Wrap a transport or client error.
    pub fn request(error: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Request(error.into())
    }
}

/// Authenticated identity the review is performed for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    /// User name.
    pub username: String,
    /// Stable user identifier, if known.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uid: String,
    /// Group memberships.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,
}

impl UserInfo {
    /// Create a user with no uid and no groups.
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            ..Default::default()
        }
    }

    /// Set the uid.
    pub fn uid(mut self, uid: impl Into<String>) -> Self {
        self.uid = uid.into();
        self
    }

    /// Add a group.
    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.groups.push(group.into());
        self
    }

    /// Set all groups.
    pub fn groups<I, G>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = G>,
        G: Into<String>,
    {
        self.groups = groups.into_iter().map(Into::into).collect();
        self
    }
}

/// Per-request context passed to every review.
///
/// Carries the subject, a cancellation token and an optional deadline. The
/// decision engine checks both before each call and races them against it.
#[derive(Debug, Clone, Default)]
pub struct AuthorizeContext {
    user: Option<UserInfo>,
    cancellation: CancellationToken,
    deadline: Option<Instant>,
}

impl AuthorizeContext {
    /// A context with no subject, a fresh token and no deadline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the subject.
    pub fn with_user(mut self, user: UserInfo) -> Self {
        self.user = Some(user);
        self
    }

    /// Use `token` for cancellation.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Set an absolute deadline.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Set the deadline `timeout` from now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// The subject, if any.
    pub fn user(&self) -> Option<&UserInfo> {
        self.user.as_ref()
    }

    /// The cancellation token.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// The deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Whether the context was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Whether the deadline has passed.
    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// The error to report if this context may no longer be used.
    pub(crate) fn check(&self) -> Result<(), AuthorityError> {
        if self.is_cancelled() {
            return Err(AuthorityError::Cancelled);
        }
        if self.is_expired() {
            return Err(AuthorityError::DeadlineExceeded);
        }
        Ok(())
    }
}

/// An external authority that turns a tuple into a verdict.
///
/// Implementations may cache or retry; the decision engine does neither.
///
/// ```ignore
/// let reviewer: Arc<dyn AccessReviewer> = Arc::new(SubjectAccessReviewer::new(client));
/// let review = reviewer.review(&ctx, &attributes).await?;
/// ```
#[async_trait]
pub trait AccessReviewer: Send + Sync {
    /// Review one tuple on behalf of the context's subject.
    ///
    /// # Errors
    ///
    /// - `Request` if the authority cannot be reached
    /// - `InvalidResponse` if the answer carries no verdict
    async fn review(
        &self,
        ctx: &AuthorizeContext,
        attributes: &ResourceAttributes,
    ) -> Result<Review, AuthorityError>;
}

/// Reviewer that answers every tuple with the same decision.
///
/// For local development and tests; it ignores the subject.
#[derive(Debug, Clone)]
pub struct StaticReviewer {
    decision: Decision,
}

impl StaticReviewer {
    /// Answer every review with `decision`.
    pub fn new(decision: Decision) -> Self {
        Self { decision }
    }

    /// Allow everything.
    pub fn allow_all() -> Self {
        Self::new(Decision::Allow)
    }

    /// Deny everything.
    pub fn deny_all() -> Self {
        Self::new(Decision::Deny)
    }
}

#[async_trait]
impl AccessReviewer for StaticReviewer {
    async fn review(
        &self,
        _ctx: &AuthorizeContext,
        _attributes: &ResourceAttributes,
    ) -> Result<Review, AuthorityError> {
        Ok(Review {
            decision: self.decision,
            reason: match self.decision {
                Decision::Allow => String::new(),
                Decision::Deny => "denied by static policy".to_string(),
                Decision::NoOpinion => "no static policy".to_string(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_reviewer() {
        let ctx = AuthorizeContext::new();
        let attrs = ResourceAttributes::default();

        let review = StaticReviewer::allow_all().review(&ctx, &attrs).await.unwrap();
        assert!(review.is_allowed());

        let review = StaticReviewer::deny_all().review(&ctx, &attrs).await.unwrap();
        assert_eq!(review.decision, Decision::Deny);
        assert!(!review.reason.is_empty());
    }

    #[test]
    fn test_context_cancellation() {
        let token = CancellationToken::new();
        let ctx = AuthorizeContext::new().with_cancellation(token.clone());
        assert!(ctx.check().is_ok());

        token.cancel();
        assert!(ctx.is_cancelled());
        assert!(matches!(ctx.check(), Err(AuthorityError::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_context_deadline() {
        let ctx = AuthorizeContext::new().with_timeout(Duration::from_secs(5));
        assert!(!ctx.is_expired());

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(ctx.is_expired());
        assert!(matches!(ctx.check(), Err(AuthorityError::DeadlineExceeded)));
    }

    #[test]
    fn test_user_info_builder() {
        let user = UserInfo::new("alice").uid("u-1").group("dev").group("ops");
        assert_eq!(user.username, "alice");
        assert_eq!(user.uid, "u-1");
        assert_eq!(user.groups, vec!["dev", "ops"]);

        let ctx = AuthorizeContext::new().with_user(user.clone());
        assert_eq!(ctx.user(), Some(&user));
    }

    #[test]
    fn test_request_error_keeps_source() {
        let err = AuthorityError::request(std::io::Error::other("connection refused"));
        assert!(err.to_string().contains("connection refused"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
