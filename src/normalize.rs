use regex::Regex;
use std::sync::OnceLock;
use url::Url;

use crate::error::ValidationError;
use crate::models::JobTarget;

const CANONICAL_HOST: &str = "www.youtube.com";
const SHORT_LINK_HOST: &str = "youtu.be";
const WATCH_HOSTS: [&str; 3] = ["www.youtube.com", "youtube.com", "m.youtube.com"];

fn video_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("static regex"))
}

fn extract_video_id(url: &Url) -> Option<String> {
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }

    let host = url.host_str()?;

    let id = if WATCH_HOSTS.contains(&host) {
        if url.path() == "/watch" {
            url.query_pairs()
                .find(|(key, _)| key == "v")
                .map(|(_, value)| value.into_owned())
        } else if let Some(rest) = url.path().strip_prefix("/shorts/") {
            rest.split('/').next().map(str::to_owned)
        } else {
            None
        }
    } else if host == SHORT_LINK_HOST {
        // the query string is already split off by the parser
        url.path_segments()
            .and_then(|mut segments| segments.next())
            .map(str::to_owned)
    } else {
        None
    }?;

    if video_id_re().is_match(&id) {
        Some(id)
    } else {
        None
    }
}

/// Canonical target for `raw`, or `None` when it is not a recognised video URL.
pub fn recognize(raw: &str) -> Option<JobTarget> {
    let url = Url::parse(raw.trim()).ok()?;
    let id = extract_video_id(&url)?;

    Some(JobTarget::from_canonical(format!(
        "https://{CANONICAL_HOST}/watch?v={id}"
    )))
}

/// Rewrites watch, short-link and shorts URLs to `https://www.youtube.com/watch?v=<id>`,
/// dropping every other query parameter. Anything else comes back unchanged.
pub fn normalize(raw: &str) -> String {
    match recognize(raw) {
        Some(target) => target.to_string(),
        None => raw.to_owned(),
    }
}

/// Validation applied before a submission may reach the backend.
pub fn validate(raw: &str) -> Result<JobTarget, ValidationError> {
    let trimmed = raw.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::Empty);
    }

    recognize(trimmed).ok_or(ValidationError::Unrecognized)
}
