//! HTTP method to Kubernetes verb translation.

/// Translate an HTTP method token to the Kubernetes verb it represents.
///
/// The table is case-sensitive on the upper-case method tokens. Anything
/// else, including lowercase spellings and extension methods, maps to the
/// empty string so that an unmapped method shows up as an empty verb in the
/// rendered tuple instead of failing the request.
///
/// # Example
/// ```
/// use axum_endpoint_authz::kube_verb;
///
/// assert_eq!(kube_verb("POST"), "create");
/// assert_eq!(kube_verb("post"), "");
/// ```
pub fn kube_verb(method: &str) -> &'static str {
    match method {
        "GET" => "get",
        "POST" => "create",
        "PUT" => "update",
        "DELETE" => "delete",
        "PATCH" => "patch",
        "OPTIONS" => "options",
        "HEAD" => "head",
        _ => "",
    }
}
