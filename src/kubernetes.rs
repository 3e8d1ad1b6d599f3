//! Kubernetes `SubjectAccessReview` authority.
//!
//! Each tuple becomes one `authorization.k8s.io/v1` `SubjectAccessReview`
//! created against the API server.

use crate::attributes::ResourceAttributes;
use crate::authority::{AccessReviewer, AuthorityError, AuthorizeContext, Decision, Review, UserInfo};
use async_trait::async_trait;
use k8s_openapi::api::authorization::v1::{
    ResourceAttributes as KubeResourceAttributes, SubjectAccessReview, SubjectAccessReviewSpec,
};
use kube::api::PostParams;
use kube::{Api, Client};

/// Reason reported when a request carries no subject.
pub const NO_SUBJECT_REASON: &str = "no authenticated subject";

/// Reviews tuples with the Kubernetes API server.
#[derive(Clone)]
pub struct SubjectAccessReviewer {
    api: Api<SubjectAccessReview>,
}

impl std::fmt::Debug for SubjectAccessReviewer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubjectAccessReviewer").finish_non_exhaustive()
    }
}

impl SubjectAccessReviewer {
    /// Create a reviewer using `client`.
    pub fn new(client: Client) -> Self {
        Self {
            api: Api::all(client),
        }
    }

    /// Create a reviewer from the in-cluster or kubeconfig environment.
    pub async fn try_default() -> Result<Self, kube::Error> {
        Ok(Self::new(Client::try_default().await?))
    }
}

#[async_trait]
impl AccessReviewer for SubjectAccessReviewer {
    async fn review(
        &self,
        ctx: &AuthorizeContext,
        attributes: &ResourceAttributes,
    ) -> Result<Review, AuthorityError> {
        let Some(user) = ctx.user() else {
            tracing::debug!(attributes = %attributes, "No subject on request, skipping access review");
            return Ok(Review::no_opinion(NO_SUBJECT_REASON));
        };

        let review = build_review(user, attributes);
        let response = self
            .api
            .create(&PostParams::default(), &review)
            .await
            .map_err(AuthorityError::request)?;

        interpret(response)
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

/// The review object submitted for `user` and `attributes`.
pub fn build_review(user: &UserInfo, attributes: &ResourceAttributes) -> SubjectAccessReview {
    SubjectAccessReview {
        spec: SubjectAccessReviewSpec {
            user: non_empty(&user.username),
            uid: non_empty(&user.uid),
            groups: (!user.groups.is_empty()).then(|| user.groups.clone()),
            resource_attributes: Some(KubeResourceAttributes {
                namespace: non_empty(&attributes.namespace),
                group: non_empty(&attributes.api_group),
                version: non_empty(&attributes.api_version),
                resource: non_empty(&attributes.resource),
                subresource: non_empty(&attributes.subresource),
                name: non_empty(&attributes.name),
                verb: non_empty(&attributes.verb),
                ..Default::default()
            }),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Map the API server's answer to a [`Review`].
pub fn interpret(response: SubjectAccessReview) -> Result<Review, AuthorityError> {
    let status = response.status.ok_or_else(|| {
        AuthorityError::InvalidResponse("SubjectAccessReview response has no status".to_string())
    })?;

    let reason = match (status.reason, status.evaluation_error) {
        (Some(reason), _) if !reason.is_empty() => reason,
        (_, Some(error)) => error,
        _ => String::new(),
    };

    if status.allowed {
        Ok(Review {
            decision: Decision::Allow,
            reason,
        })
    } else if status.denied == Some(true) {
        Ok(Review::deny(reason))
    } else {
        Ok(Review::no_opinion(reason))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::authorization::v1::SubjectAccessReviewStatus;

    fn with_status(status: SubjectAccessReviewStatus) -> SubjectAccessReview {
        SubjectAccessReview {
            status: Some(status),
            ..Default::default()
        }
    }

    #[test]
    fn test_build_review_omits_empty_fields() {
        let user = UserInfo::new("alice").group("dev");
        let attrs = ResourceAttributes {
            namespace: "tenant-a".into(),
            api_group: "trustyai.opendatahub.io".into(),
            resource: "evaluations".into(),
            verb: "create".into(),
            ..Default::default()
        };

        let review = build_review(&user, &attrs);
        assert_eq!(review.spec.user.as_deref(), Some("alice"));
        assert_eq!(review.spec.uid, None);
        assert_eq!(review.spec.groups, Some(vec!["dev".to_string()]));

        let ra = review.spec.resource_attributes.unwrap();
        assert_eq!(ra.namespace.as_deref(), Some("tenant-a"));
        assert_eq!(ra.group.as_deref(), Some("trustyai.opendatahub.io"));
        assert_eq!(ra.resource.as_deref(), Some("evaluations"));
        assert_eq!(ra.verb.as_deref(), Some("create"));
        assert_eq!(ra.version, None);
        assert_eq!(ra.subresource, None);
        assert_eq!(ra.name, None);
    }

    #[test]
    fn test_interpret_allowed() {
        let review = interpret(with_status(SubjectAccessReviewStatus {
            allowed: true,
            reason: Some("RBAC: allowed by RoleBinding".into()),
            ..Default::default()
        }))
        .unwrap();
        assert_eq!(review.decision, Decision::Allow);
        assert_eq!(review.reason, "RBAC: allowed by RoleBinding");
    }

    #[test]
    fn test_interpret_denied() {
        let review = interpret(with_status(SubjectAccessReviewStatus {
            allowed: false,
            denied: Some(true),
            ..Default::default()
        }))
        .unwrap();
        assert_eq!(review.decision, Decision::Deny);
    }

    #[test]
    fn test_interpret_no_opinion_uses_evaluation_error() {
        let review = interpret(with_status(SubjectAccessReviewStatus {
            allowed: false,
            evaluation_error: Some("webhook timed out".into()),
            ..Default::default()
        }))
        .unwrap();
        assert_eq!(review.decision, Decision::NoOpinion);
        assert_eq!(review.reason, "webhook timed out");
    }

    #[test]
    fn test_interpret_missing_status() {
        let err = interpret(SubjectAccessReview::default()).unwrap_err();
        assert!(matches!(err, AuthorityError::InvalidResponse(_)));
    }
}
