//! Bot-mitigation challenge detection

/// Statuses an interstitial challenge page is served with.
const CHALLENGE_STATUSES: [u16; 4] = [403, 503, 520, 521];

/// Markers that identify a challenge page when paired with a challenge status.
const CHALLENGE_MARKERS: [&str; 3] = [
    "cf-mitigation",
    "cf-browser-verification",
    "cf_chl_opt",
];

/// Interstitial texts that identify a challenge page on their own.
const INTERSTITIAL_PHRASES: [&str; 4] = [
    "Just a moment...",
    "DDoS protection by Cloudflare",
    "Checking your browser before accessing",
    "Attention Required!",
];

/// Returns true when the response is a bot/rate-limit challenge page rather
/// than real content.
///
/// A bare rate-limit status (e.g. 429 with an empty body) is not a
/// challenge; callers classify that separately.
pub fn is_challenge(status: u16, body: &str) -> bool {
    if CHALLENGE_STATUSES.contains(&status)
        && CHALLENGE_MARKERS.iter().any(|marker| body.contains(marker))
    {
        return true;
    }

    if INTERSTITIAL_PHRASES.iter().any(|phrase| body.contains(phrase)) {
        return true;
    }

    body.contains("Cloudflare") && status >= 400
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interstitial_phrase() {
        assert!(is_challenge(503, "Checking your browser before accessing"));
        assert!(is_challenge(200, "<title>Just a moment...</title>"));
        assert!(is_challenge(403, "<h1>Attention Required!</h1>"));
    }

    #[test]
    fn test_plain_content_is_not_a_challenge() {
        assert!(!is_challenge(200, "hello world"));
        assert!(!is_challenge(404, "not found"));
    }

    #[test]
    fn test_rate_limit_alone_is_not_a_challenge() {
        assert!(!is_challenge(429, ""));
        assert!(!is_challenge(402, "payment required"));
    }

    #[test]
    fn test_marker_requires_challenge_status() {
        assert!(is_challenge(403, r#"<div id="cf-mitigation">"#));
        assert!(is_challenge(521, "cf-browser-verification"));
        assert!(!is_challenge(200, r#"<div id="cf-mitigation">"#));
        assert!(!is_challenge(429, "cf-browser-verification"));
    }

    #[test]
    fn test_cloudflare_mention_on_error_status() {
        assert!(is_challenge(429, "Blocked by Cloudflare"));
        assert!(!is_challenge(200, "Served via Cloudflare"));
    }
}
