//! Subject extraction from HTTP requests.
//!
//! The access review authority needs to know on whose behalf a tuple is
//! checked. A [`SubjectExtractor`] produces that [`UserInfo`] from the request,
//! usually from headers set by an authenticating proxy or from an extension
//! inserted by an earlier authentication layer.
//!
//! ## Custom Extraction
//!
//! ```
//! use axum_endpoint_authz::{SubjectExtractor, SubjectExtractionResult, UserInfo};
//! use http::Request;
//!
//! /// Trust a service-account header, and nothing else.
//! struct ServiceAccountExtractor;
//!
//! impl<B> SubjectExtractor<B> for ServiceAccountExtractor {
//!     fn extract_subject(&self, request: &Request<B>) -> SubjectExtractionResult {
//!         match request.headers().get("X-Service-Account").map(|v| v.to_str()) {
//!             Some(Ok(name)) if !name.is_empty() => SubjectExtractionResult::Subject(
//!                 UserInfo::new(format!("system:serviceaccount:{}", name))
//!                     .group("system:serviceaccounts"),
//!             ),
//!             Some(Err(_)) => SubjectExtractionResult::Error("non-ASCII service account".into()),
//!             _ => SubjectExtractionResult::Anonymous,
//!         }
//!     }
//! }
//! ```

use crate::authority::UserInfo;
use http::Request;
use std::sync::Arc;

/// Default header carrying the username.
pub const DEFAULT_USER_HEADER: &str = "X-Forwarded-User";
/// Default header carrying comma-separated groups.
pub const DEFAULT_GROUPS_HEADER: &str = "X-Forwarded-Groups";

/// Result of subject extraction.
#[derive(Debug, Clone)]
pub enum SubjectExtractionResult {
    /// The request carries an authenticated subject.
    Subject(UserInfo),
    /// No subject could be found.
    Anonymous,
    /// Extraction failed.
    Error(String),
}

impl SubjectExtractionResult {
    /// The subject, treating errors as anonymous.
    pub fn into_user(self) -> Option<UserInfo> {
        match self {
            Self::Subject(user) => Some(user),
            Self::Anonymous | Self::Error(_) => None,
        }
    }
}

/// Extracts the subject of a request.
///
/// Synchronous: extraction reads headers or extensions only.
pub trait SubjectExtractor<B>: Send + Sync {
    /// Extract the subject from an HTTP request.
    fn extract_subject(&self, request: &Request<B>) -> SubjectExtractionResult;
}

impl<B, T: SubjectExtractor<B>> SubjectExtractor<B> for Arc<T> {
    fn extract_subject(&self, request: &Request<B>) -> SubjectExtractionResult {
        (**self).extract_subject(request)
    }
}

impl<B, T: SubjectExtractor<B> + ?Sized> SubjectExtractor<B> for Box<T> {
    fn extract_subject(&self, request: &Request<B>) -> SubjectExtractionResult {
        (**self).extract_subject(request)
    }
}

/// Read the subject from proxy headers.
///
/// # Example
/// ```
/// use axum_endpoint_authz::HeaderSubjectExtractor;
///
/// // X-Forwarded-User / X-Forwarded-Groups
/// let extractor = HeaderSubjectExtractor::new();
///
/// // Custom headers
/// let extractor = HeaderSubjectExtractor::new()
///     .user_header("X-Remote-User")
///     .groups_header("X-Remote-Group");
/// ```
#[derive(Debug, Clone)]
pub struct HeaderSubjectExtractor {
    user_header: String,
    groups_header: Option<String>,
    uid_header: Option<String>,
}

impl Default for HeaderSubjectExtractor {
    fn default() -> Self {
        Self {
            user_header: DEFAULT_USER_HEADER.to_string(),
            groups_header: Some(DEFAULT_GROUPS_HEADER.to_string()),
            uid_header: None,
        }
    }
}

impl HeaderSubjectExtractor {
    /// Extractor using the default headers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Header carrying the username.
    pub fn user_header(mut self, name: impl Into<String>) -> Self {
        self.user_header = name.into();
        self
    }

    /// Header carrying comma-separated groups.
    pub fn groups_header(mut self, name: impl Into<String>) -> Self {
        self.groups_header = Some(name.into());
        self
    }

    /// Ignore groups.
    pub fn without_groups(mut self) -> Self {
        self.groups_header = None;
        self
    }

    /// Header carrying the user's uid.
    pub fn uid_header(mut self, name: impl Into<String>) -> Self {
        self.uid_header = Some(name.into());
        self
    }
}

impl<B> SubjectExtractor<B> for HeaderSubjectExtractor {
    fn extract_subject(&self, request: &Request<B>) -> SubjectExtractionResult {
        let username = match request.headers().get(&self.user_header) {
            Some(value) => match value.to_str() {
                Ok(s) if !s.trim().is_empty() => s.trim().to_string(),
                Ok(_) => return SubjectExtractionResult::Anonymous,
                Err(_) => {
                    return SubjectExtractionResult::Error(format!(
                        "header '{}' is not valid ASCII",
                        self.user_header
                    ))
                }
            },
            None => return SubjectExtractionResult::Anonymous,
        };

        let mut user = UserInfo::new(username);
        if let Some(groups_header) = &self.groups_header {
            user.groups = request
                .headers()
                .get_all(groups_header)
                .iter()
                .filter_map(|value| value.to_str().ok())
                .flat_map(|s| s.split(','))
                .map(str::trim)
                .filter(|g| !g.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(uid_header) = &self.uid_header {
            if let Some(uid) = request.headers().get(uid_header).and_then(|v| v.to_str().ok()) {
                user.uid = uid.trim().to_string();
            }
        }
        SubjectExtractionResult::Subject(user)
    }
}

/// Read the subject from a request extension.
///
/// # Example
/// ```
/// use axum_endpoint_authz::{ExtensionSubjectExtractor, UserInfo};
///
/// // Inserted by the authentication middleware
/// #[derive(Clone)]
/// struct AuthenticatedUser {
///     name: String,
///     teams: Vec<String>,
/// }
///
/// let extractor = ExtensionSubjectExtractor::<AuthenticatedUser>::new(|user| {
///     UserInfo::new(user.name.clone()).groups(user.teams.clone())
/// });
/// ```
pub struct ExtensionSubjectExtractor<T> {
    extract_fn: Box<dyn Fn(&T) -> UserInfo + Send + Sync>,
}

impl<T> ExtensionSubjectExtractor<T> {
    /// Create an extractor converting the extension with `extract_fn`.
    pub fn new<F>(extract_fn: F) -> Self
    where
        F: Fn(&T) -> UserInfo + Send + Sync + 'static,
    {
        Self {
            extract_fn: Box::new(extract_fn),
        }
    }
}

impl<T> std::fmt::Debug for ExtensionSubjectExtractor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionSubjectExtractor")
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}

impl<B, T: Clone + Send + Sync + 'static> SubjectExtractor<B> for ExtensionSubjectExtractor<T> {
    fn extract_subject(&self, request: &Request<B>) -> SubjectExtractionResult {
        match request.extensions().get::<T>() {
            Some(ext) => SubjectExtractionResult::Subject((self.extract_fn)(ext)),
            None => SubjectExtractionResult::Anonymous,
        }
    }
}

/// Always returns the same subject. Useful for tests and local runs.
#[derive(Debug, Clone)]
pub struct FixedSubjectExtractor {
    user: UserInfo,
}

impl FixedSubjectExtractor {
    /// Create a fixed subject extractor.
    pub fn new(user: UserInfo) -> Self {
        Self { user }
    }
}

impl<B> SubjectExtractor<B> for FixedSubjectExtractor {
    fn extract_subject(&self, _request: &Request<B>) -> SubjectExtractionResult {
        SubjectExtractionResult::Subject(self.user.clone())
    }
}

/// Never finds a subject.
#[derive(Debug, Clone, Default)]
pub struct AnonymousSubjectExtractor;

impl AnonymousSubjectExtractor {
    /// Create an anonymous extractor.
    pub fn new() -> Self {
        Self
    }
}

impl<B> SubjectExtractor<B> for AnonymousSubjectExtractor {
    fn extract_subject(&self, _request: &Request<B>) -> SubjectExtractionResult {
        SubjectExtractionResult::Anonymous
    }
}

/// Tries several extractors in order and returns the first subject found.
pub struct ChainedSubjectExtractor<B> {
    extractors: Vec<Box<dyn SubjectExtractor<B>>>,
}

impl<B> ChainedSubjectExtractor<B> {
    /// Create an empty chain.
    pub fn new() -> Self {
        Self {
            extractors: Vec::new(),
        }
    }

    /// Append an extractor.
    pub fn add<E: SubjectExtractor<B> + 'static>(mut self, extractor: E) -> Self {
        self.extractors.push(Box::new(extractor));
        self
    }
}

impl<B> Default for ChainedSubjectExtractor<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B> std::fmt::Debug for ChainedSubjectExtractor<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainedSubjectExtractor")
            .field("extractors_count", &self.extractors.len())
            .finish()
    }
}

impl<B> SubjectExtractor<B> for ChainedSubjectExtractor<B> {
    fn extract_subject(&self, request: &Request<B>) -> SubjectExtractionResult {
        for extractor in &self.extractors {
            match extractor.extract_subject(request) {
                SubjectExtractionResult::Subject(user) => return SubjectExtractionResult::Subject(user),
                SubjectExtractionResult::Error(e) => {
                    tracing::warn!(error = %e, "Subject extractor failed, trying next");
                }
                SubjectExtractionResult::Anonymous => continue,
            }
        }
        SubjectExtractionResult::Anonymous
    }
}
