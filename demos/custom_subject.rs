//! Example demonstrating custom subject extraction.
//!
//! This example shows how to:
//! - Take the subject from a request extension set by an auth middleware
//! - Fall back to proxy headers when the extension is missing
//! - Return plain text denials
//!
//! Run with: `cargo run --example custom_subject`

use async_trait::async_trait;
use axum::{
    extract::Request,
    middleware::{self, Next},
    response::Response,
    routing::get,
    Router,
};
use axum_endpoint_authz::{
    AccessReviewer, AuthorityError, AuthorizationConfig, AuthorizeContext, Authorizer, AuthzLayer,
    ChainedSubjectExtractor, ExtensionSubjectExtractor, HeaderSubjectExtractor, PlainDeniedHandler,
    ResourceAttributes, Review, UserInfo,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// User information set by authentication.
/// In a real app, this would come from JWT validation, session lookup, etc.
#[derive(Clone, Debug)]
struct AuthenticatedUser {
    name: String,
    teams: Vec<String>,
}

/// Simulated authentication middleware.
async fn auth_middleware(mut request: Request, next: Next) -> Response {
    // Fake auth: "Bearer <name>:<team>,<team>"
    let user = request
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|token| {
            let (name, teams) = token.split_once(':').unwrap_or((token, ""));
            AuthenticatedUser {
                name: name.to_string(),
                teams: teams.split(',').filter(|t| !t.is_empty()).map(str::to_string).collect(),
            }
        });

    if let Some(user) = user {
        tracing::debug!(user = %user.name, "Authenticated request");
        request.extensions_mut().insert(user);
    }

    next.run(request).await
}

/// Allows a tuple when one of the subject's teams is named like the namespace.
struct TeamNamespaceReviewer;

#[async_trait]
impl AccessReviewer for TeamNamespaceReviewer {
    async fn review(
        &self,
        ctx: &AuthorizeContext,
        attributes: &ResourceAttributes,
    ) -> Result<Review, AuthorityError> {
        match ctx.user() {
            Some(user) if user.groups.iter().any(|g| *g == attributes.namespace) => Ok(Review::allow()),
            Some(user) => Ok(Review::deny(format!(
                "{} is not a member of {}",
                user.username, attributes.namespace
            ))),
            None => Ok(Review::no_opinion("anonymous")),
        }
    }
}

const CONFIG: &str = r#"
authorization:
  endpoints:
    - path: /teams/
      mappings:
        - resources:
            - rewrites:
                byQueryString:
                  name: team
              resourceAttributes:
                namespace: "{{ FromQueryString }}"
                resource: reports
                verb: "{{ FromMethod }}"
"#;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "axum_endpoint_authz=debug,custom_subject=debug".into()),
        )
        .init();

    let config = AuthorizationConfig::from_yaml(CONFIG).expect("Failed to parse config");
    let authorizer = Authorizer::new(config.into_shared(), Arc::new(TeamNamespaceReviewer));

    // Extension first, proxy headers second
    let subjects = ChainedSubjectExtractor::<axum::body::Body>::new()
        .add(ExtensionSubjectExtractor::<AuthenticatedUser>::new(|user| {
            UserInfo::new(user.name.clone()).groups(user.teams.clone())
        }))
        .add(HeaderSubjectExtractor::new());

    // Note: Auth middleware runs BEFORE the authorization layer
    let app = Router::new()
        .route("/teams/reports", get(|| async { "reports" }))
        .layer(
            AuthzLayer::new(authorizer)
                .with_subject_extractor(subjects)
                .with_denied_handler(PlainDeniedHandler),
        )
        .layer(middleware::from_fn(auth_middleware));

    let addr = SocketAddr::from(([127, 0, 0, 1], 3000));
    tracing::info!("Starting server on {}", addr);
    tracing::info!("Test with:");
    tracing::info!("  curl -H 'Authorization: Bearer alice:red,blue' 'http://localhost:3000/teams/reports?team=red'");
    tracing::info!("  curl -H 'Authorization: Bearer bob:green' 'http://localhost:3000/teams/reports?team=red'");
    tracing::info!("  curl -H 'X-Forwarded-User: carol' -H 'X-Forwarded-Groups: red' 'http://localhost:3000/teams/reports?team=red'");

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
