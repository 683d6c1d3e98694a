/// Hides everything after the host so credentials in paths never reach logs.
pub fn mask_url(url: &str) -> String {
    if let Some(scheme_end) = url.find("://") {
        let scheme = &url[..scheme_end + 3];
        let rest = &url[scheme_end + 3..];
        let host = rest.split(['/', '?']).next().unwrap_or_default();
        if host.is_empty() {
            return "***".to_string();
        }
        if rest.len() > host.len() {
            return format!("{scheme}{host}/***/");
        }
        return format!("{scheme}{host}");
    }
    "***".to_string()
}
