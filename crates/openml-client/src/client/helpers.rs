//! Pure helpers: URL building and error excerpts (no HTTP, no status logic).

use reqwest::Url;

use crate::error::{OpenMlError, OpenMlResult};

/// Append `segments` to `base`, percent-encoding each one.
pub(crate) fn url_with_segments<'a>(
    base: &str,
    segments: impl IntoIterator<Item = &'a str>,
) -> OpenMlResult<String> {
    let mut url = Url::parse(base).map_err(|e| OpenMlError::Config {
        message: format!("invalid server url {:?}: {}", base, e),
    })?;
    {
        let mut path = url.path_segments_mut().map_err(|_| OpenMlError::Config {
            message: format!("server url cannot be a base: {}", base),
        })?;
        path.pop_if_empty();
        for segment in segments {
            path.push(segment);
        }
    }
    Ok(url.to_string())
}

/// True when both URLs parse and share scheme, host and port.
pub(crate) fn same_origin(a: &str, b: &str) -> bool {
    match (Url::parse(a), Url::parse(b)) {
        (Ok(a), Ok(b)) => a.origin() == b.origin(),
        _ => false,
    }
}

/// First 200 characters of a body, for error messages.
pub(crate) fn body_excerpt(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.is_empty() {
        "no message provided".to_string()
    } else {
        text.chars().take(200).collect()
    }
}
