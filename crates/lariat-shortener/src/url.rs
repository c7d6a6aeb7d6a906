/// URLs must be shorter than this many characters.
pub const MAX_URL_LENGTH: usize = 250;

/// Checks the length contract for long URLs: non-empty and under
/// [`MAX_URL_LENGTH`] characters.
pub fn validate_url(url: &str) -> bool {
    !url.is_empty() && url.len() < MAX_URL_LENGTH
}

/// Joins the public base address and a short id into a shareable link.
pub fn format_short_url(base: &str, short_id: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), short_id)
}
