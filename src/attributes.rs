//! Resource attribute tuples and how requests turn into them.

use crate::config::{AuthorizationConfig, ResourceRule, Rewrite};
use crate::request::RequestView;
use crate::template::{shared_engine, TemplateEngine, TemplateValues};
use crate::verb::kube_verb;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The tuple submitted to the access review authority.
///
/// Every field may be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ResourceAttributes {
    /// Namespace of the resource.
    pub namespace: String,
    /// API group.
    pub api_group: String,
    /// API version.
    pub api_version: String,
    /// Resource type.
    pub resource: String,
    /// Subresource.
    pub subresource: String,
    /// Resource name.
    pub name: String,
    /// Verb.
    pub verb: String,
}

impl fmt::Display for ResourceAttributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "verb={} ", self.verb)?;
        if self.api_group.is_empty() {
            write!(f, "resource={}", self.resource)?;
        } else {
            write!(f, "resource={}.{}", self.resource, self.api_group)?;
        }
        if !self.api_version.is_empty() {
            write!(f, "/{}", self.api_version)?;
        }
        if !self.subresource.is_empty() {
            write!(f, " subresource={}", self.subresource)?;
        }
        if !self.name.is_empty() {
            write!(f, " name={}", self.name)?;
        }
        write!(f, " namespace={}", self.namespace)
    }
}

/// Builds resource attribute tuples for requests.
#[derive(Debug, Default)]
pub struct AttributeBuilder {
    engine: TemplateEngine,
}

impl AttributeBuilder {
    /// Create a builder with its own template engine.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder around an existing engine.
    pub fn with_engine(engine: TemplateEngine) -> Self {
        Self { engine }
    }

    /// Template engine used for rendering.
    pub fn engine(&self) -> &TemplateEngine {
        &self.engine
    }

    /// Tuples for `request`, one per matched rule, in declaration order.
    ///
    /// Empty when no rule matches.
    pub fn build(&self, config: &AuthorizationConfig, request: &RequestView) -> Vec<ResourceAttributes> {
        build_with(&self.engine, config, request)
    }

    /// Render a single rule against a request.
    pub fn render_rule(&self, rule: &ResourceRule, request: &RequestView) -> ResourceAttributes {
        render_rule(&self.engine, rule, request)
    }
}

/// Tuples for `request` using the process-wide template engine.
///
/// # Example
/// ```
/// use axum_endpoint_authz::{resource_attributes, AuthorizationConfig, RequestView};
///
/// let config = AuthorizationConfig::from_yaml(r#"
/// authorization:
///   endpoints:
///     - path: /api/v1/jobs
///       mappings:
///         - methods: [post]
///           resources:
///             - rewrites:
///                 byHttpHeader:
///                   name: X-Tenant
///               resourceAttributes:
///                 namespace: "{{ .FromHeader }}"
///                 resource: jobs
///                 verb: "{{ .FromMethod }}"
/// "#).unwrap();
///
/// let request = RequestView::new("POST", "/api/v1/jobs").header("X-Tenant", "team-a");
/// let tuples = resource_attributes(&config, &request);
/// assert_eq!(tuples.len(), 1);
/// assert_eq!(tuples[0].namespace, "team-a");
/// assert_eq!(tuples[0].verb, "create");
/// ```
pub fn resource_attributes(config: &AuthorizationConfig, request: &RequestView) -> Vec<ResourceAttributes> {
    build_with(shared_engine(), config, request)
}

fn build_with(
    engine: &TemplateEngine,
    config: &AuthorizationConfig,
    request: &RequestView,
) -> Vec<ResourceAttributes> {
    config
        .match_rules(request.path(), request.method())
        .iter()
        .map(|rule| render_rule(engine, rule, request))
        .collect()
}

fn render_rule(engine: &TemplateEngine, rule: &ResourceRule, request: &RequestView) -> ResourceAttributes {
    let values = template_values(rule, request);
    let t = &rule.resource_attributes;
    ResourceAttributes {
        namespace: engine.render(&t.namespace, &values),
        api_group: engine.render(&t.api_group, &values),
        api_version: engine.render(&t.api_version, &values),
        resource: engine.render(&t.resource, &values),
        subresource: engine.render(&t.subresource, &values),
        name: engine.render(&t.name, &values),
        verb: engine.render(&t.verb, &values),
    }
}

fn template_values(rule: &ResourceRule, request: &RequestView) -> TemplateValues {
    let mut values = TemplateValues {
        from_method: kube_verb(request.method()).to_string(),
        ..Default::default()
    };
    match &rule.rewrites {
        Rewrite::None => {}
        Rewrite::ByHttpHeader(name) => {
            values.from_header = request.header_value(name).unwrap_or_default();
        }
        Rewrite::ByQueryString(name) => {
            values.from_query_string = request.query_value(name).unwrap_or_default().to_string();
        }
    }
    values
}
