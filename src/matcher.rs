//! Request to resource rule matching.
//!
//! Matching walks [`AuthorizationConfig::endpoints`] in declaration order.
//! The first endpoint whose path is a string prefix of the request path is the
//! only one consulted: if none of its mappings accepts the method the result
//! is empty, even when a later endpoint would have matched.

use crate::config::{AuthorizationConfig, Endpoint, Mapping, ResourceRule};

/// Location of the mapping that produced a rule set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleMatch {
    /// Index into [`AuthorizationConfig::endpoints`].
    pub endpoint_index: usize,
    /// Index into [`Endpoint::mappings`], or `None` when the endpoint matched
    /// by path but no mapping accepted the method.
    pub mapping_index: Option<usize>,
}

impl Endpoint {
    /// Whether this endpoint's path is a prefix of `path`.
    ///
    /// Plain string comparison: `/api/v1/jobs` also matches `/api/v1/jobsX`.
    pub fn matches_path(&self, path: &str) -> bool {
        path.starts_with(self.path.as_str())
    }
}

impl Mapping {
    /// Whether this mapping accepts `method`.
    ///
    /// An empty method list accepts everything. The comparison is against the
    /// lowercased request method.
    pub fn matches_method(&self, method: &str) -> bool {
        if self.methods.is_empty() {
            return true;
        }
        let method = method.to_ascii_lowercase();
        self.methods.iter().any(|m| *m == method)
    }
}

impl AuthorizationConfig {
    /// Resource rules that apply to a request, in declaration order.
    ///
    /// Returns an empty slice when nothing matches.
    ///
    /// # Example
    /// ```
    /// use axum_endpoint_authz::{AuthorizationConfig, Endpoint, Mapping, ResourceRule, ResourceAttributeTemplates};
    ///
    /// let config = AuthorizationConfig::new()
    ///     .endpoint(Endpoint::new("/api/v1/jobs").mapping(
    ///         Mapping::new()
    ///             .methods(["get"])
    ///             .resource(ResourceRule::new(ResourceAttributeTemplates::new().resource("jobs"))),
    ///     ));
    ///
    /// assert_eq!(config.match_rules("/api/v1/jobs/42", "GET").len(), 1);
    /// assert!(config.match_rules("/api/v1/jobs", "POST").is_empty());
    /// assert!(config.match_rules("/healthz", "GET").is_empty());
    /// ```
    pub fn match_rules(&self, path: &str, method: &str) -> &[ResourceRule] {
        self.match_rules_with_match(path, method).0
    }

    /// Like [`match_rules`](Self::match_rules), also reporting which endpoint
    /// and mapping were selected.
    pub fn match_rules_with_match(
        &self,
        path: &str,
        method: &str,
    ) -> (&[ResourceRule], Option<RuleMatch>) {
        let Some((endpoint_index, endpoint)) = self
            .endpoints
            .iter()
            .enumerate()
            .find(|(_, endpoint)| endpoint.matches_path(path))
        else {
            tracing::trace!(path = path, method = method, "No endpoint prefix matched");
            return (&[], None);
        };

        for (mapping_index, mapping) in endpoint.mappings.iter().enumerate() {
            if mapping.matches_method(method) {
                tracing::debug!(
                    path = path,
                    method = method,
                    endpoint = %endpoint.path,
                    mapping_index = mapping_index,
                    rules = mapping.resources.len(),
                    "Authorization rule match"
                );
                return (
                    &mapping.resources,
                    Some(RuleMatch {
                        endpoint_index,
                        mapping_index: Some(mapping_index),
                    }),
                );
            }
        }

        tracing::debug!(
            path = path,
            method = method,
            endpoint = %endpoint.path,
            "Endpoint matched but no mapping accepts the method"
        );
        (
            &[],
            Some(RuleMatch {
                endpoint_index,
                mapping_index: None,
            }),
        )
    }
}
