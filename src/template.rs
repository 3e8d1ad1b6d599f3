//! Resource attribute templates.
//!
//! Templates use minijinja syntax and see exactly three string values:
//!
//! | Name              | Value                                              |
//! |-------------------|----------------------------------------------------|
//! | `FromHeader`      | first value of the rule's rewrite header, or `""`  |
//! | `FromQueryString` | first value of the rule's rewrite query parameter  |
//! | `FromMethod`      | Kubernetes verb for the request method             |
//!
//! `{{ FromHeader }}` and the Go-style `{{ .FromHeader }}` are equivalent.
//! Only `{{` and `{%` start template syntax; a value such as `team{#1` is a
//! literal and is returned unchanged.
//!
//! The environment is empty (no filters, functions, tests or loaders) and
//! undefined names are errors. Rendering never fails from the caller's point
//! of view: a malformed template, an unknown name or any other render error
//! degrades that single field to the empty string.

use minijinja::{Environment, UndefinedBehavior};
use serde::Serialize;
use std::sync::OnceLock;

/// Per-request substitution values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TemplateValues {
    /// Value taken from the rewrite header.
    pub from_header: String,
    /// Value taken from the rewrite query parameter.
    pub from_query_string: String,
    /// Verb derived from the HTTP method.
    pub from_method: String,
}

/// A template failed to parse or render.
#[derive(Debug, thiserror::Error)]
#[error("invalid attribute template: {0}")]
pub struct TemplateError(#[from] minijinja::Error);

/// Renders resource attribute templates.
#[derive(Debug)]
pub struct TemplateEngine {
    env: Environment<'static>,
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateEngine {
    /// Create an engine with an empty, strict environment.
    pub fn new() -> Self {
        let mut env = Environment::empty();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_keep_trailing_newline(true);
        Self { env }
    }

    /// Render `template` against `values`.
    ///
    /// Returns the empty string if the template cannot be parsed or rendered.
    ///
    /// # Example
    /// ```
    /// use axum_endpoint_authz::{TemplateEngine, TemplateValues};
    ///
    /// let engine = TemplateEngine::new();
    /// let values = TemplateValues {
    ///     from_header: "tenant-a".into(),
    ///     ..Default::default()
    /// };
    /// assert_eq!(engine.render("{{ .FromHeader }}", &values), "tenant-a");
    /// assert_eq!(engine.render("ns-{{ FromHeader }}", &values), "ns-tenant-a");
    /// assert_eq!(engine.render("{{ Unknown }}", &values), "");
    /// ```
    pub fn render(&self, template: &str, values: &TemplateValues) -> String {
        if !has_template_syntax(template) {
            return template.to_string();
        }
        match self.try_render(template, values) {
            Ok(rendered) => rendered,
            Err(error) => {
                tracing::debug!(
                    template = template,
                    error = %error,
                    "Attribute template failed, rendering empty value"
                );
                String::new()
            }
        }
    }

    /// Render `template`, surfacing failures.
    pub fn try_render(&self, template: &str, values: &TemplateValues) -> Result<String, TemplateError> {
        let normalized = normalize_dot_references(template);
        Ok(self.env.render_str(&normalized, values)?)
    }

    /// Check that `template` parses and only references known values.
    pub fn check(&self, template: &str) -> Result<(), TemplateError> {
        if !has_template_syntax(template) {
            return Ok(());
        }
        self.try_render(template, &TemplateValues::default()).map(|_| ())
    }
}

/// Process-wide engine for the free-function API.
pub(crate) fn shared_engine() -> &'static TemplateEngine {
    static ENGINE: OnceLock<TemplateEngine> = OnceLock::new();
    ENGINE.get_or_init(TemplateEngine::new)
}

/// Render `template` with the process-wide engine.
pub fn render_template(template: &str, values: &TemplateValues) -> String {
    shared_engine().render(template, values)
}

fn has_template_syntax(s: &str) -> bool {
    s.contains("{{") || s.contains("{%")
}

/// Drop the leading dot of Go-style field references inside `{{ ... }}`.
///
/// `{{ .FromHeader }}` becomes `{{ FromHeader }}`. Attribute access such as
/// `a.b` and dots inside string literals are left alone.
fn normalize_dot_references(template: &str) -> String {
    let mut result = String::with_capacity(template.len());
    let mut remaining = template;

    while let Some(start) = remaining.find("{{") {
        result.push_str(&remaining[..start + 2]);
        remaining = &remaining[start + 2..];

        let Some(end) = remaining.find("}}") else {
            break;
        };
        result.push_str(&strip_leading_dots(&remaining[..end]));
        result.push_str("}}");
        remaining = &remaining[end + 2..];
    }

    result.push_str(remaining);
    result
}

fn strip_leading_dots(expression: &str) -> String {
    let mut out = String::with_capacity(expression.len());
    let mut quote: Option<char> = None;
    let mut prev: Option<char> = None;
    let mut chars = expression.chars().peekable();

    while let Some(c) = chars.next() {
        match quote {
            Some(q) => {
                if c == q && prev != Some('\\') {
                    quote = None;
                }
                out.push(c);
            }
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                out.push(c);
            }
            None if c == '.' => {
                let starts_identifier = chars
                    .peek()
                    .is_some_and(|next| next.is_ascii_alphabetic() || *next == '_');
                let follows_value = prev
                    .is_some_and(|p| p.is_ascii_alphanumeric() || p == '_' || p == ')' || p == ']');
                if !(starts_identifier && !follows_value) {
                    out.push(c);
                }
            }
            None => out.push(c),
        }
        prev = Some(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values() -> TemplateValues {
        TemplateValues {
            from_header: "tenant-a".to_string(),
            from_query_string: "query-ns".to_string(),
            from_method: "get".to_string(),
        }
    }

    #[test]
    fn test_literal_passes_through() {
        let engine = TemplateEngine::new();
        assert_eq!(engine.render("trustyai.opendatahub.io", &values()), "trustyai.opendatahub.io");
        assert_eq!(engine.render("", &values()), "");
    }

    #[test]
    fn test_comment_marker_alone_is_literal() {
        let engine = TemplateEngine::new();
        assert_eq!(engine.render("team{#1", &values()), "team{#1");
        assert_eq!(engine.render("a{#b#}c", &values()), "a{#b#}c");
        assert!(engine.check("team{#1").is_ok());
    }

    #[test]
    fn test_all_three_values() {
        let engine = TemplateEngine::new();
        assert_eq!(engine.render("{{ FromHeader }}", &values()), "tenant-a");
        assert_eq!(engine.render("{{ FromQueryString }}", &values()), "query-ns");
        assert_eq!(engine.render("{{ FromMethod }}", &values()), "get");
    }

    #[test]
    fn test_go_style_references() {
        let engine = TemplateEngine::new();
        assert_eq!(engine.render("{{.FromHeader}}", &values()), "tenant-a");
        assert_eq!(engine.render("{{ .FromMethod }}", &values()), "get");
        assert_eq!(
            engine.render("{{ .FromHeader }}/{{ .FromQueryString }}", &values()),
            "tenant-a/query-ns"
        );
    }

    #[test]
    fn test_text_around_placeholders() {
        let engine = TemplateEngine::new();
        assert_eq!(engine.render("ns-{{ FromHeader }}-x", &values()), "ns-tenant-a-x");
        assert_eq!(engine.render("{{ FromMethod }}\n", &values()), "get\n");
    }

    #[test]
    fn test_empty_value_renders_empty() {
        let engine = TemplateEngine::new();
        let values = TemplateValues::default();
        assert_eq!(engine.render("{{ FromHeader }}", &values), "");
        assert_eq!(engine.render("prefix-{{ FromQueryString }}", &values), "prefix-");
    }

    #[test]
    fn test_unknown_name_degrades_to_empty() {
        let engine = TemplateEngine::new();
        assert_eq!(engine.render("{{ FromBody }}", &values()), "");
        assert_eq!(engine.render("x-{{ .Namespace }}", &values()), "");
        assert!(engine.check("{{ FromBody }}").is_err());
    }

    #[test]
    fn test_syntax_error_degrades_to_empty() {
        let engine = TemplateEngine::new();
        assert_eq!(engine.render("{{ FromHeader", &values()), "");
        assert_eq!(engine.render("{% if %}", &values()), "");
        assert!(engine.check("{{ FromHeader").is_err());
    }

    #[test]
    fn test_no_builtin_filters() {
        let engine = TemplateEngine::new();
        assert_eq!(engine.render("{{ FromHeader | upper }}", &values()), "");
    }

    #[test]
    fn test_attribute_access_on_value_fails() {
        let engine = TemplateEngine::new();
        assert_eq!(engine.render("{{ FromHeader.length }}", &values()), "");
    }

    #[test]
    fn test_conditionals() {
        let engine = TemplateEngine::new();
        let template = "{% if FromHeader %}{{ FromHeader }}{% else %}default{% endif %}";
        assert_eq!(engine.render(template, &values()), "tenant-a");
        assert_eq!(engine.render(template, &TemplateValues::default()), "default");
    }

    #[test]
    fn test_rendering_is_repeatable() {
        let engine = TemplateEngine::new();
        let first = engine.render("{{ .FromHeader }}:{{ .FromMethod }}", &values());
        for _ in 0..10 {
            assert_eq!(engine.render("{{ .FromHeader }}:{{ .FromMethod }}", &values()), first);
        }
        assert_eq!(render_template("{{ .FromHeader }}:{{ .FromMethod }}", &values()), first);
    }

    #[test]
    fn test_check_accepts_valid_templates() {
        let engine = TemplateEngine::new();
        assert!(engine.check("literal").is_ok());
        assert!(engine.check("{{ .FromHeader }}").is_ok());
        assert!(engine.check("{{ FromMethod }}-{{ FromQueryString }}").is_ok());
    }

    #[test]
    fn test_normalize_keeps_literals_and_attributes() {
        assert_eq!(normalize_dot_references("{{ .A }}"), "{{ A }}");
        assert_eq!(normalize_dot_references("a.b {{ x.y }}"), "a.b {{ x.y }}");
        assert_eq!(normalize_dot_references("{{ '.x' }}"), "{{ '.x' }}");
        assert_eq!(normalize_dot_references("{{ 1.5 }}"), "{{ 1.5 }}");
        assert_eq!(normalize_dot_references("{{ .A"), "{{ .A");
    }
}
