//! Basic example demonstrating the endpoint authorization middleware.
//!
//! The access review authority here is a small in-process reviewer: members
//! of the `evaluators` group may do anything in the namespace named after
//! their tenant, everyone else may only read.
//!
//! Run with: `cargo run --example basic`
//!
//! Test with:
//! ```sh
//! # No rule covers /health (allowed)
//! curl http://localhost:3000/health
//!
//! # Read jobs as a plain user (allowed)
//! curl -H "X-Forwarded-User: bob" -H "X-Tenant: team-a" http://localhost:3000/api/v1/evaluations/jobs
//!
//! # Create a job as a plain user (denied)
//! curl -X POST -H "X-Forwarded-User: bob" -H "X-Tenant: team-a" http://localhost:3000/api/v1/evaluations/jobs
//!
//! # Create a job as an evaluator (allowed)
//! curl -X POST -H "X-Forwarded-User: alice" -H "X-Forwarded-Groups: evaluators" \
//!      -H "X-Tenant: team-a" http://localhost:3000/api/v1/evaluations/jobs
//!
//! # Create a job without a tenant (denied, empty namespace)
//! curl -X POST -H "X-Forwarded-User: alice" -H "X-Forwarded-Groups: evaluators" \
//!      http://localhost:3000/api/v1/evaluations/jobs
//! ```

use async_trait::async_trait;
use axum::{routing::get, Router};
use axum_endpoint_authz::{
    AccessReviewer, AuthorityError, AuthorizationConfig, AuthorizeContext, Authorizer, AuthzLayer,
    Endpoint, Mapping, ResourceAttributeTemplates, ResourceAttributes, ResourceRule, Review, Rewrite,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Read-only for everyone, full access for `evaluators` inside a namespace.
struct GroupReviewer;

#[async_trait]
impl AccessReviewer for GroupReviewer {
    async fn review(
        &self,
        ctx: &AuthorizeContext,
        attributes: &ResourceAttributes,
    ) -> Result<Review, AuthorityError> {
        let Some(user) = ctx.user() else {
            return Ok(Review::no_opinion("anonymous"));
        };
        if matches!(attributes.verb.as_str(), "get" | "list") {
            return Ok(Review::allow());
        }
        if attributes.namespace.is_empty() {
            return Ok(Review::deny("writes need a namespace"));
        }
        if user.groups.iter().any(|g| g == "evaluators") {
            Ok(Review::allow())
        } else {
            Ok(Review::deny(format!("{} is not an evaluator", user.username)))
        }
    }
}

async fn list_jobs() -> &'static str {
    "[]"
}

async fn create_job() -> &'static str {
    "job created"
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "axum_endpoint_authz=debug,basic=debug".into()),
        )
        .init();

    let tenant_rule = |resource: &str| {
        ResourceRule::new(
            ResourceAttributeTemplates::new()
                .namespace("{{ FromHeader }}")
                .api_group("trustyai.opendatahub.io")
                .resource(resource)
                .verb("{{ FromMethod }}"),
        )
        .rewrite(Rewrite::header("X-Tenant"))
    };

    let config = AuthorizationConfig::new().endpoint(
        Endpoint::new("/api/v1/evaluations/jobs")
            .mapping(Mapping::new().methods(["post"]).resource(tenant_rule("evaluations")))
            .mapping(Mapping::new().methods(["get"]).resource(tenant_rule("evaluations"))),
    );

    tracing::info!("Authorization configured: {} endpoints", config.endpoints.len());

    let authorizer = Authorizer::new(config.into_shared(), Arc::new(GroupReviewer));

    let app = Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/api/v1/evaluations/jobs", get(list_jobs).post(create_job))
        .layer(AuthzLayer::new(authorizer).with_review_timeout(Duration::from_secs(5)));

    let addr = SocketAddr::from(([127, 0, 0, 1], 3000));
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
