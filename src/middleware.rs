//! Authorization middleware for axum.
//!
//! [`AuthzLayer`] runs the [`Authorizer`] for every request before the inner
//! service sees it.

use crate::authority::AuthorizeContext;
use crate::authorizer::{AuthorizationOutcome, Authorizer};
use crate::error::{AccessDenied, AccessDeniedHandler, AuthorizationError, DefaultDeniedHandler};
use crate::extractor::{HeaderSubjectExtractor, SubjectExtractionResult, SubjectExtractor};
use crate::request::RequestView;

use axum::body::{Body, Bytes};
use axum::response::{IntoResponse, Response};
use axum::BoxError;
use futures_util::future::BoxFuture;
use http::Request;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower::{Layer, Service};

/// Shared middleware settings.
pub struct AuthzConfig<E> {
    /// The authorizer, or `None` to pass every request through.
    pub authorizer: Option<Arc<Authorizer>>,
    /// The subject extractor.
    pub subject_extractor: Arc<E>,
    /// The handler for denied requests.
    pub denied_handler: Arc<dyn AccessDeniedHandler>,
    /// Upper bound on the whole review of one request.
    pub review_timeout: Option<Duration>,
}

// Manual Clone impl to avoid requiring E: Clone (it is behind Arc)
impl<E> Clone for AuthzConfig<E> {
    fn clone(&self) -> Self {
        Self {
            authorizer: self.authorizer.clone(),
            subject_extractor: self.subject_extractor.clone(),
            denied_handler: self.denied_handler.clone(),
            review_timeout: self.review_timeout,
        }
    }
}

/// A Tower layer that authorizes requests.
///
/// # Example
/// ```no_run
/// use axum::{Router, routing::get};
/// use axum_endpoint_authz::{AuthzLayer, Authorizer, AuthorizationConfig, StaticReviewer};
/// use std::sync::Arc;
///
/// async fn handler() -> &'static str {
///     "Hello, World!"
/// }
///
/// #[tokio::main]
/// async fn main() {
///     let config = AuthorizationConfig::from_file("authorization.yaml").unwrap();
///     let authorizer = Authorizer::new(config.into_shared(), Arc::new(StaticReviewer::allow_all()));
///
///     let app = Router::new()
///         .route("/", get(handler))
///         .layer(AuthzLayer::new(authorizer));
///
///     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
///     axum::serve(listener, app).await.unwrap();
/// }
/// ```
pub struct AuthzLayer<E> {
    config: AuthzConfig<E>,
}

impl<E> Clone for AuthzLayer<E> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
        }
    }
}

impl AuthzLayer<HeaderSubjectExtractor> {
    /// Create a layer around `authorizer`.
    ///
    /// Uses the default header subject extractor (`X-Forwarded-User`,
    /// `X-Forwarded-Groups`) and the default JSON 403 handler.
    pub fn new(authorizer: Authorizer) -> Self {
        Self::from_shared(Arc::new(authorizer))
    }

    /// Create a layer around a shared authorizer.
    pub fn from_shared(authorizer: Arc<Authorizer>) -> Self {
        Self::with_authorizer(Some(authorizer))
    }

    /// A layer that lets every request through.
    ///
    /// For deployments where authorization is turned off.
    pub fn disabled() -> Self {
        Self::with_authorizer(None)
    }

    fn with_authorizer(authorizer: Option<Arc<Authorizer>>) -> Self {
        Self {
            config: AuthzConfig {
                authorizer,
                subject_extractor: Arc::new(HeaderSubjectExtractor::new()),
                denied_handler: Arc::new(DefaultDeniedHandler),
                review_timeout: None,
            },
        }
    }
}

impl<E> AuthzLayer<E> {
    /// Use a custom subject extractor.
    ///
    /// # Example
    /// ```
    /// use axum_endpoint_authz::{AuthzLayer, FixedSubjectExtractor, UserInfo};
    ///
    /// let layer = AuthzLayer::disabled()
    ///     .with_subject_extractor(FixedSubjectExtractor::new(UserInfo::new("dev")));
    /// ```
    pub fn with_subject_extractor<E2>(self, extractor: E2) -> AuthzLayer<E2> {
        AuthzLayer {
            config: AuthzConfig {
                authorizer: self.config.authorizer,
                subject_extractor: Arc::new(extractor),
                denied_handler: self.config.denied_handler,
                review_timeout: self.config.review_timeout,
            },
        }
    }

    /// Set a custom access denied handler.
    pub fn with_denied_handler(mut self, handler: impl AccessDeniedHandler + 'static) -> Self {
        self.config.denied_handler = Arc::new(handler);
        self
    }

    /// Fail the request if reviewing it takes longer than `timeout`.
    pub fn with_review_timeout(mut self, timeout: Duration) -> Self {
        self.config.review_timeout = Some(timeout);
        self
    }

    /// The authorizer, unless the layer is disabled.
    pub fn authorizer(&self) -> Option<&Arc<Authorizer>> {
        self.config.authorizer.as_ref()
    }
}

impl<S, E> Layer<S> for AuthzLayer<E> {
    type Service = AuthzMiddleware<S, E>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthzMiddleware {
            inner,
            config: self.config.clone(),
        }
    }
}

/// The authorization middleware service.
pub struct AuthzMiddleware<S, E> {
    inner: S,
    config: AuthzConfig<E>,
}

impl<S: Clone, E> Clone for AuthzMiddleware<S, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            config: self.config.clone(),
        }
    }
}

impl<S, E, ReqBody, ResBody> Service<Request<ReqBody>> for AuthzMiddleware<S, E>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    E: SubjectExtractor<ReqBody> + 'static,
    ReqBody: Send + 'static,
    ResBody: http_body::Body<Data = Bytes> + Send + 'static,
    ResBody::Error: Into<BoxError>,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<ReqBody>) -> Self::Future {
        let config = self.config.clone();
        let mut inner = self.inner.clone();

        let Some(authorizer) = config.authorizer.clone() else {
            return Box::pin(async move { inner.call(request).await.map(|r| r.map(Body::new)) });
        };

        // Everything the pipeline reads is taken before entering the async block
        let view = RequestView::from_request(&request);
        let user = match config.subject_extractor.extract_subject(&request) {
            SubjectExtractionResult::Subject(user) => Some(user),
            SubjectExtractionResult::Anonymous => None,
            SubjectExtractionResult::Error(e) => {
                tracing::warn!(error = %e, path = view.path(), "Subject extraction failed, reviewing as anonymous");
                None
            }
        };

        Box::pin(async move {
            // Cancelled when this future completes or is dropped
            let token = CancellationToken::new();
            let _cancel_on_drop = token.clone().drop_guard();

            let mut ctx = AuthorizeContext::new().with_cancellation(token);
            if let Some(user) = user.clone() {
                ctx = ctx.with_user(user);
            }
            if let Some(timeout) = config.review_timeout {
                ctx = ctx.with_timeout(timeout);
            }

            let username = user.as_ref().map(|u| u.username.as_str()).unwrap_or("");

            match authorizer.decide(&ctx, &view).await {
                AuthorizationOutcome::Allowed => {
                    tracing::trace!(
                        user = username,
                        path = view.path(),
                        method = view.method(),
                        "Authorization allowed request"
                    );
                    inner.call(request).await.map(|r| r.map(Body::new))
                }
                AuthorizationOutcome::Denied { attributes, reason } => {
                    tracing::info!(
                        user = username,
                        path = view.path(),
                        method = view.method(),
                        attributes = %attributes,
                        reason = %reason,
                        "Authorization denied request"
                    );

                    let mut denied = AccessDenied::new(view.path(), view.method(), attributes).with_reason(reason);
                    if let Some(user) = &user {
                        denied = denied.with_user(user.username.clone());
                    }
                    Ok(config.denied_handler.handle(&denied))
                }
                AuthorizationOutcome::Failed(err) => {
                    tracing::error!(
                        user = username,
                        path = view.path(),
                        method = view.method(),
                        error = %err,
                        "Error authorizing request"
                    );
                    Ok(AuthorizationError::Failed(err).into_response())
                }
            }
        })
    }
}
