//! Example demonstrating YAML configuration and the Kubernetes authority.
//!
//! This example shows two methods:
//! 1. Compile-time embedded configuration (include_str!)
//! 2. Runtime file loading, when a path is given on the command line
//!
//! With the `kubernetes` feature (default) and a reachable cluster, tuples are
//! checked with `SubjectAccessReview`. Without a cluster, every tuple is
//! allowed so the mapping can still be explored.
//!
//! Run with: `cargo run --example yaml_config [-- path/to/authorization.yaml]`
//!
//! Test endpoints:
//! ```sh
//! # Two tuples: evaluations and experiments in namespace tenant-a, verb create
//! curl -X POST -H "X-Forwarded-User: alice" -H "X-Tenant: tenant-a" \
//!      http://localhost:3000/api/v1/evaluations/jobs
//!
//! # One tuple, empty namespace, verb get
//! curl -H "X-Forwarded-User: alice" http://localhost:3000/api/v1/evaluations/jobs
//!
//! # Namespace from the query string
//! curl -H "X-Forwarded-User: alice" "http://localhost:3000/api/v1/namespaces?namespace=query-ns"
//!
//! # No rule (allowed)
//! curl http://localhost:3000/api/v1/other
//! ```

use axum::{routing::get, Router};
use axum_endpoint_authz::{
    AccessReviewer, AuthorizationConfig, Authorizer, AuthzLayer, JsonDeniedHandler, StaticReviewer,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// ============================================================================
// METHOD 1: Compile-time embedded configuration
// ============================================================================

const EMBEDDED_CONFIG: &str = r#"
authorization:
  endpoints:
    - path: /api/v1/evaluations/jobs
      mappings:
        - methods: [post]
          resources:
            - rewrites:
                byHttpHeader:
                  name: X-Tenant
              resourceAttributes:
                namespace: "{{ .FromHeader }}"
                apiGroup: trustyai.opendatahub.io
                resource: evaluations
                verb: "{{ .FromMethod }}"
            - rewrites:
                byHttpHeader:
                  name: X-Tenant
              resourceAttributes:
                namespace: "{{ .FromHeader }}"
                apiGroup: mlflow.kubeflow.org
                resource: experiments
                verb: "{{ .FromMethod }}"
        - methods: [get]
          resources:
            - rewrites:
                byHttpHeader:
                  name: X-Tenant
              resourceAttributes:
                namespace: "{{ .FromHeader }}"
                apiGroup: trustyai.opendatahub.io
                resource: evaluations
                verb: "{{ .FromMethod }}"
    - path: /api/v1/namespaces
      mappings:
        - methods: [get]
          resources:
            - rewrites:
                byQueryString:
                  name: namespace
              resourceAttributes:
                namespace: "{{ FromQueryString }}"
                resource: namespaces
                verb: "{{ FromMethod }}"
"#;

#[cfg(feature = "kubernetes")]
async fn reviewer() -> Arc<dyn AccessReviewer> {
    match axum_endpoint_authz::SubjectAccessReviewer::try_default().await {
        Ok(reviewer) => {
            tracing::info!("Using Kubernetes SubjectAccessReview");
            Arc::new(reviewer)
        }
        Err(err) => {
            tracing::warn!(error = %err, "No Kubernetes client, allowing every tuple");
            Arc::new(StaticReviewer::allow_all())
        }
    }
}

#[cfg(not(feature = "kubernetes"))]
async fn reviewer() -> Arc<dyn AccessReviewer> {
    tracing::warn!("Built without the kubernetes feature, allowing every tuple");
    Arc::new(StaticReviewer::allow_all())
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "axum_endpoint_authz=debug,yaml_config=info".into()),
        )
        .init();

    // METHOD 2: runtime file loading, format picked from the extension
    let config = match std::env::args().nth(1) {
        Some(path) => AuthorizationConfig::from_file(&path).expect("Failed to load authorization config"),
        None => AuthorizationConfig::from_yaml(EMBEDDED_CONFIG).expect("Failed to parse embedded config"),
    };

    for endpoint in &config.endpoints {
        tracing::info!(path = %endpoint.path, mappings = endpoint.mappings.len(), "Loaded endpoint");
    }

    let authorizer = Authorizer::new(config.into_shared(), reviewer().await);

    let app = Router::new()
        .route("/api/v1/evaluations/jobs", get(|| async { "[]" }).post(|| async { "created" }))
        .route("/api/v1/namespaces", get(|| async { "[]" }))
        .route("/api/v1/other", get(|| async { "other" }))
        .layer(
            AuthzLayer::new(authorizer)
                .with_denied_handler(JsonDeniedHandler::new().with_details())
                .with_review_timeout(Duration::from_secs(10)),
        );

    let addr = SocketAddr::from(([127, 0, 0, 1], 3000));
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
