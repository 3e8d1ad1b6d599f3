//! Endpoint authorization configuration.
//!
//! This module holds the typed mapping from HTTP endpoints to resource
//! attribute templates, together with loaders for YAML and TOML documents.
//! The configuration is built once at startup and is read-only afterwards;
//! share it as `Arc<AuthorizationConfig>` and replace the whole value to reload.
//!
//! # Example YAML Format
//!
//! ```yaml
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
//! ```
//!
//! The same document can be written in TOML:
//!
//! ```toml
//! [[authorization.endpoints]]
//! path = "/api/v1/namespaces"
//!
//! [[authorization.endpoints.mappings]]
//! methods = ["get"]
//!
//! [[authorization.endpoints.mappings.resources]]
//! rewrites = { byQueryString = { name = "namespace" } }
//! resourceAttributes = { namespace = "{{ FromQueryString }}", resource = "namespaces", verb = "{{ FromMethod }}" }
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use axum_endpoint_authz::AuthorizationConfig;
//!
//! // Embedded at compile time
//! const CONFIG: &str = include_str!("../authorization.yaml");
//! let config = AuthorizationConfig::from_yaml(CONFIG).unwrap();
//!
//! // Or read at runtime, format picked from the extension
//! let config = AuthorizationConfig::from_file("config/authorization.yaml").unwrap();
//! ```

use http::HeaderName;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Root of the endpoint authorization configuration.
///
/// Endpoints are matched in declaration order, see
/// [`AuthorizationConfig::match_rules`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationConfig {
    /// Endpoint rules, in matching order.
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
}

/// On-disk document: endpoints live under a top-level `authorization` key.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Document {
    #[serde(default)]
    authorization: AuthorizationConfig,
}

/// An endpoint prefix and its method mappings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Path prefix compared against the request path (plain string prefix).
    pub path: String,
    /// Method mappings, tried in declaration order.
    #[serde(default)]
    pub mappings: Vec<Mapping>,
}

/// A set of HTTP methods and the resource rules they map to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mapping {
    /// Lowercase method names. Empty means any method.
    #[serde(default, deserialize_with = "lowercase_methods")]
    pub methods: Vec<String>,
    /// Resource rules; each one yields one resource attribute tuple.
    #[serde(default)]
    pub resources: Vec<ResourceRule>,
}

/// One resource attribute tuple to produce for a matching request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRule {
    /// Where the dynamic template value comes from.
    #[serde(default)]
    pub rewrites: Rewrite,
    /// Templates for the seven tuple fields.
    #[serde(default)]
    pub resource_attributes: ResourceAttributeTemplates,
}

/// Source of the dynamic value exposed to templates.
///
/// On disk this keeps the `byHttpHeader: {name}` / `byQueryString: {name}`
/// shape; declaring both on one rule is rejected when the document is parsed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RewriteConfig", into = "RewriteConfig")]
pub enum Rewrite {
    /// No dynamic value; `FromHeader` and `FromQueryString` render empty.
    #[default]
    None,
    /// First value of the named request header feeds `FromHeader`.
    ByHttpHeader(String),
    /// First value of the named query parameter feeds `FromQueryString`.
    ByQueryString(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RewriteConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    by_http_header: Option<NamedSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    by_query_string: Option<NamedSource>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct NamedSource {
    name: String,
}

impl TryFrom<RewriteConfig> for Rewrite {
    type Error = ConfigError;

    fn try_from(config: RewriteConfig) -> Result<Self, Self::Error> {
        let rewrite = match (config.by_http_header, config.by_query_string) {
            (None, None) => Rewrite::None,
            (Some(header), None) => Rewrite::ByHttpHeader(header.name),
            (None, Some(query)) => Rewrite::ByQueryString(query.name),
            (Some(header), Some(query)) => {
                return Err(ConfigError::ConflictingRewrites {
                    header: header.name,
                    query: query.name,
                })
            }
        };
        match &rewrite {
            Rewrite::ByHttpHeader(name) | Rewrite::ByQueryString(name) if name.is_empty() => {
                Err(ConfigError::EmptyRewriteName)
            }
            _ => Ok(rewrite),
        }
    }
}

impl From<Rewrite> for RewriteConfig {
    fn from(rewrite: Rewrite) -> Self {
        match rewrite {
            Rewrite::None => RewriteConfig::default(),
            Rewrite::ByHttpHeader(name) => RewriteConfig {
                by_http_header: Some(NamedSource { name }),
                by_query_string: None,
            },
            Rewrite::ByQueryString(name) => RewriteConfig {
                by_http_header: None,
                by_query_string: Some(NamedSource { name }),
            },
        }
    }
}

impl Rewrite {
    /// Rewrite from the named request header.
    pub fn header(name: impl Into<String>) -> Self {
        Self::ByHttpHeader(name.into())
    }

    /// Rewrite from the named query parameter.
    pub fn query(name: impl Into<String>) -> Self {
        Self::ByQueryString(name.into())
    }
}

/// Templates for the fields of a resource attribute tuple.
///
/// Every field is rendered on its own; a literal without placeholders renders
/// to itself and a missing field renders to the empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ResourceAttributeTemplates {
    /// Namespace template.
    pub namespace: String,
    /// API group template.
    pub api_group: String,
    /// API version template.
    pub api_version: String,
    /// Resource template.
    pub resource: String,
    /// Subresource template.
    pub subresource: String,
    /// Resource name template.
    pub name: String,
    /// Verb template.
    pub verb: String,
}

impl ResourceAttributeTemplates {
    /// Create an empty template set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the namespace template.
    pub fn namespace(mut self, template: impl Into<String>) -> Self {
        self.namespace = template.into();
        self
    }

    /// Set the API group template.
    pub fn api_group(mut self, template: impl Into<String>) -> Self {
        self.api_group = template.into();
        self
    }

    /// Set the API version template.
    pub fn api_version(mut self, template: impl Into<String>) -> Self {
        self.api_version = template.into();
        self
    }

    /// Set the resource template.
    pub fn resource(mut self, template: impl Into<String>) -> Self {
        self.resource = template.into();
        self
    }

    /// Set the subresource template.
    pub fn subresource(mut self, template: impl Into<String>) -> Self {
        self.subresource = template.into();
        self
    }

    /// Set the resource name template.
    pub fn name(mut self, template: impl Into<String>) -> Self {
        self.name = template.into();
        self
    }

    /// Set the verb template.
    pub fn verb(mut self, template: impl Into<String>) -> Self {
        self.verb = template.into();
        self
    }

    /// All templates with their field names, in tuple order.
    pub fn fields(&self) -> [(&'static str, &str); 7] {
        [
            ("namespace", &self.namespace),
            ("apiGroup", &self.api_group),
            ("apiVersion", &self.api_version),
            ("resource", &self.resource),
            ("subresource", &self.subresource),
            ("name", &self.name),
            ("verb", &self.verb),
        ]
    }
}

impl ResourceRule {
    /// Create a rule with the given templates and no rewrite.
    pub fn new(templates: ResourceAttributeTemplates) -> Self {
        Self {
            rewrites: Rewrite::None,
            resource_attributes: templates,
        }
    }

    /// Set the rewrite source.
    pub fn rewrite(mut self, rewrite: Rewrite) -> Self {
        self.rewrites = rewrite;
        self
    }
}

impl Mapping {
    /// Create a mapping that matches any method and has no resources.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict the mapping to the given methods (stored lowercase).
    pub fn methods<I, M>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = M>,
        M: AsRef<str>,
    {
        self.methods = methods
            .into_iter()
            .map(|m| m.as_ref().to_ascii_lowercase())
            .collect();
        self
    }

    /// Append a resource rule.
    pub fn resource(mut self, rule: ResourceRule) -> Self {
        self.resources.push(rule);
        self
    }
}

impl Endpoint {
    /// Create an endpoint for the given path prefix.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            mappings: Vec::new(),
        }
    }

    /// Append a method mapping.
    pub fn mapping(mut self, mapping: Mapping) -> Self {
        self.mappings.push(mapping);
        self
    }
}

fn lowercase_methods<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let methods = Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(methods
        .into_iter()
        .map(|m| m.trim().to_ascii_lowercase())
        .collect())
}

/// Error type for configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// YAML parsing error.
    #[error("Failed to parse YAML: {0}")]
    YamlParse(String),

    /// TOML parsing error.
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// File I/O error.
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// The file extension does not name a supported format.
    #[error("Unsupported config file format '{0}' (expected .yaml, .yml or .toml)")]
    UnsupportedFormat(String),

    /// A rewrite declares both a header and a query string source.
    ///
    /// A rule carries at most one dynamic value, so documents that set
    /// `byHttpHeader` and `byQueryString` on the same rule (and expect both
    /// `FromHeader` and `FromQueryString` to be filled) are rejected here.
    /// Split such a rule into one rule per source.
    #[error("rewrite declares both byHttpHeader '{header}' and byQueryString '{query}'; only one source is allowed")]
    ConflictingRewrites {
        /// Declared header name.
        header: String,
        /// Declared query parameter name.
        query: String,
    },

    /// A rewrite source has an empty name.
    #[error("rewrite source name must not be empty")]
    EmptyRewriteName,

    /// A header rewrite names something that is not a valid HTTP header.
    #[error("Invalid header name '{name}' in rewrite for endpoint '{endpoint}'")]
    InvalidHeaderName {
        /// Endpoint path the rule belongs to.
        endpoint: String,
        /// Offending header name.
        name: String,
    },

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl AuthorizationConfig {
    /// Create an empty configuration. Every request is unmatched.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an endpoint.
    pub fn endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoints.push(endpoint);
        self
    }

    /// Wrap the configuration in an `Arc` for sharing across requests.
    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Parse configuration from a YAML document.
    ///
    /// # Example
    /// ```
    /// use axum_endpoint_authz::AuthorizationConfig;
    ///
    /// let yaml = r#"
    /// authorization:
    ///   endpoints:
    ///     - path: /api/v1/namespaces
    ///       mappings:
    ///         - methods: [get]
    ///           resources:
    ///             - resourceAttributes:
    ///                 resource: namespaces
    ///                 verb: list
    /// "#;
    ///
    /// let config = AuthorizationConfig::from_yaml(yaml).unwrap();
    /// assert_eq!(config.endpoints.len(), 1);
    /// ```
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let document: Document =
            serde_saphyr::from_str(yaml).map_err(|e| ConfigError::YamlParse(e.to_string()))?;
        document.authorization.validated()
    }

    /// Parse configuration from a TOML document.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let document: Document = toml::from_str(toml_str)?;
        document.authorization.validated()
    }

    /// Load configuration from a file, picking the format from the extension.
    ///
    /// # Example
    /// ```ignore
    /// use axum_endpoint_authz::AuthorizationConfig;
    ///
    /// let config = AuthorizationConfig::from_file("config/authorization.yaml").unwrap();
    /// ```
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let contents = std::fs::read_to_string(path)?;
        match extension.as_str() {
            "yaml" | "yml" => Self::from_yaml(&contents),
            "toml" => Self::from_toml(&contents),
            _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        }
    }

    fn validated(self) -> Result<Self, ConfigError> {
        self.validate()?;
        Ok(self)
    }

    /// Validate the configuration.
    ///
    /// Checks rewrite source names and method tokens. Templates are not
    /// checked here: a malformed template degrades to an empty field at
    /// request time.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for endpoint in &self.endpoints {
            for (i, mapping) in endpoint.mappings.iter().enumerate() {
                if mapping.methods.iter().any(|m| m.is_empty()) {
                    return Err(ConfigError::Invalid(format!(
                        "endpoint '{}', mapping {}: empty method name",
                        endpoint.path, i
                    )));
                }
                for rule in &mapping.resources {
                    match &rule.rewrites {
                        Rewrite::None => {}
                        Rewrite::ByHttpHeader(name) => {
                            if name.is_empty() {
                                return Err(ConfigError::EmptyRewriteName);
                            }
                            if HeaderName::from_bytes(name.as_bytes()).is_err() {
                                return Err(ConfigError::InvalidHeaderName {
                                    endpoint: endpoint.path.clone(),
                                    name: name.clone(),
                                });
                            }
                        }
                        Rewrite::ByQueryString(name) => {
                            if name.is_empty() {
                                return Err(ConfigError::EmptyRewriteName);
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }
}
