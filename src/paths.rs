//! URL helpers: classify sources, absolutize paths, resolve relative refs.
//!
//! Every document is identified by an absolute URL. Filesystem paths become
//! `file://` URLs so relative `$ref`s resolve the same way for files and
//! HTTP documents.

use std::path::PathBuf;

use url::Url;

use crate::error::Error;

/// Check if a string looks like a URL (starts with http:// or https://).
pub fn is_http(s: &str) -> bool {
    let lower = s.get(..8).unwrap_or(s).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Check if a string is a filesystem path or a `file://` URL.
pub fn is_file_path(s: &str) -> bool {
    if is_http(s) {
        return false;
    }
    match Url::parse(s) {
        Ok(url) => url.scheme() == "file" || url.scheme().len() == 1, // Windows drive letter
        Err(_) => true,
    }
}

/// Strip the `#fragment` from a URL or path.
pub fn strip_hash(s: &str) -> &str {
    match s.find('#') {
        Some(idx) => &s[..idx],
        None => s,
    }
}

/// The `#fragment` of a URL or path, `#` included; empty when absent.
pub fn get_hash(s: &str) -> &str {
    match s.find('#') {
        Some(idx) => &s[idx..],
        None => "",
    }
}

/// The current working directory as a `file://` URL (with trailing slash).
pub fn cwd_url() -> Result<Url, Error> {
    let cwd = std::env::current_dir().map_err(|e| Error::InvalidUrl {
        url: ".".to_string(),
        message: format!("cannot read current directory: {e}"),
    })?;
    Url::from_directory_path(&cwd).map_err(|()| Error::InvalidUrl {
        url: cwd.display().to_string(),
        message: "current directory is not an absolute path".to_string(),
    })
}

/// Turn a path or URL into an absolute URL string.
///
/// HTTP(S) and `file://` URLs are normalized; absolute filesystem paths are
/// converted directly; relative paths resolve against the current directory.
/// The fragment, if any, is kept.
pub fn to_absolute(source: &str) -> Result<String, Error> {
    let invalid = |message: String| Error::InvalidUrl {
        url: source.to_string(),
        message,
    };

    if let Ok(url) = Url::parse(source) {
        if url.scheme().len() > 1 {
            return Ok(url.to_string());
        }
    }

    let path = std::path::Path::new(strip_hash(source));
    let mut url = if path.is_absolute() {
        Url::from_file_path(path).map_err(|()| invalid("not an absolute path".to_string()))?
    } else {
        cwd_url()?
            .join(strip_hash(source))
            .map_err(|e| invalid(e.to_string()))?
    };

    let hash = get_hash(source);
    if !hash.is_empty() {
        url.set_fragment(Some(&hash[1..]));
    }
    Ok(url.to_string())
}

/// Resolve `reference` against the absolute URL `base`.
///
/// Relative refs resolve against the referring document, so `base` is the
/// URL of the file that contains the `$ref`.
pub fn resolve(base: &str, reference: &str) -> Result<String, Error> {
    let base_url = Url::parse(base).map_err(|e| Error::InvalidUrl {
        url: base.to_string(),
        message: e.to_string(),
    })?;
    let joined = base_url.join(reference).map_err(|e| Error::InvalidUrl {
        url: reference.to_string(),
        message: e.to_string(),
    })?;
    Ok(joined.to_string())
}

/// Convert a `file://` URL (or a bare path) into a filesystem path.
pub fn to_file_path(url: &str) -> Result<PathBuf, Error> {
    let url = strip_hash(url);
    match Url::parse(url) {
        Ok(parsed) if parsed.scheme() == "file" => {
            parsed.to_file_path().map_err(|()| Error::InvalidUrl {
                url: url.to_string(),
                message: "cannot convert to a filesystem path".to_string(),
            })
        }
        _ => Ok(PathBuf::from(url)),
    }
}
