//! Resolver plugins: read the raw bytes behind a URL.
//!
//! Handles `file://` URLs and bare paths, plus HTTP(S) URLs when the
//! `remote` feature is enabled.

use std::sync::Arc;

use crate::error::Error;
use crate::file::{FileData, FileInfo};
use crate::options::Options;
use crate::paths::{is_file_path, to_file_path};
use crate::plugins::{run, Plugin};

#[cfg(feature = "remote")]
use crate::options::Method;
#[cfg(feature = "remote")]
use crate::paths::is_http;
#[cfg(feature = "remote")]
use std::time::Duration;

/// A resolver plugin.
pub trait Resolver: Plugin {
    fn read(&self, file: &FileInfo, options: &Options) -> Result<FileData, Error>;
}

/// Read `file` with the first configured resolver that claims it.
///
/// Unlike parsing there is no fall-back: a URL no resolver claims (for
/// example an HTTP URL with the HTTP resolver disabled) cannot be read.
///
/// # Errors
///
/// Returns `Error::Resolver` carrying `file.url`.
pub fn read_file(file: &FileInfo, options: &Options) -> Result<FileData, Error> {
    let candidates: Vec<Arc<dyn Resolver>> = options
        .resolve
        .plugins()
        .into_iter()
        .filter(|r| r.can_handle(file))
        .collect();

    match run(&candidates, |resolver| resolver.read(file, options))? {
        Some(handled) => {
            tracing::debug!(url = %file.url, resolver = %handled.plugin, "read file");
            Ok(handled.result)
        }
        None => Err(Error::resolver(
            &file.url,
            "no enabled resolver can read this location",
        )),
    }
}

/// Reads local files.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileResolver;

impl Plugin for FileResolver {
    fn name(&self) -> &str {
        "file"
    }

    fn can_handle(&self, file: &FileInfo) -> bool {
        is_file_path(&file.url)
    }
}

impl Resolver for FileResolver {
    fn read(&self, file: &FileInfo, _options: &Options) -> Result<FileData, Error> {
        let path = to_file_path(&file.url)?;
        if !path.exists() {
            return Err(Error::resolver(
                &file.url,
                format!("file not found: {}", path.display()),
            ));
        }

        std::fs::read(&path).map(FileData::Bytes).map_err(|e| {
            Error::resolver(&file.url, format!("cannot read {}: {}", path.display(), e))
        })
    }
}

/// One outgoing HTTP request.
#[cfg(feature = "remote")]
#[derive(Debug, Clone)]
pub struct RequestOptions<'a> {
    pub url: String,
    pub method: Method,
    pub headers: &'a [(String, String)],
    pub timeout: Duration,
    /// Maximum number of redirects to follow.
    pub max_redirects: usize,
}

/// Send a request, following redirects by hand.
///
/// `redirects` accumulates every URL visited, starting with the requested
/// one, so errors can report the whole chain. Non-redirect responses are
/// returned whatever their status; status handling is up to the caller.
///
/// # Errors
///
/// Returns `Error::Resolver` (with the originally requested URL) on network
/// failure or timeout, on a redirect without `location` header, and when
/// the chain grows past `max_redirects`.
#[cfg(feature = "remote")]
pub fn send_request(
    client: &reqwest::blocking::Client,
    request: &RequestOptions<'_>,
    redirects: &mut Vec<String>,
) -> Result<reqwest::blocking::Response, Error> {
    redirects.push(request.url.clone());
    let requested = redirects[0].clone();

    let method = match request.method {
        Method::Get => reqwest::Method::GET,
        Method::Head => reqwest::Method::HEAD,
    };
    let mut builder = client
        .request(method, request.url.as_str())
        .timeout(request.timeout);
    for (name, value) in request.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }

    let response = builder.send().map_err(|e| {
        Error::resolver(
            &requested,
            format!("Error downloading {}: {}", request.url, e),
        )
    })?;

    let status = response.status();
    if !status.is_redirection() {
        return Ok(response);
    }

    if redirects.len() > request.max_redirects {
        return Err(Error::resolver(
            &requested,
            format!(
                "Error downloading {}. Too many redirects: \n  {}",
                requested,
                redirects.join(" \n  ")
            ),
        ));
    }

    let location = response
        .headers()
        .get(reqwest::header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            Error::resolver(
                &requested,
                format!(
                    "HTTP {} redirect with no location header",
                    status.as_u16()
                ),
            )
        })?;

    let target = crate::paths::resolve(&request.url, location)?;
    tracing::debug!(from = %request.url, to = %target, status = status.as_u16(), "following redirect");

    let next = RequestOptions {
        url: target,
        ..request.clone()
    };
    send_request(client, &next, redirects)
}

/// Reads HTTP(S) URLs.
#[cfg(feature = "remote")]
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpResolver;

#[cfg(feature = "remote")]
impl Plugin for HttpResolver {
    fn name(&self) -> &str {
        "http"
    }

    fn can_handle(&self, file: &FileInfo) -> bool {
        is_http(&file.url)
    }
}

#[cfg(feature = "remote")]
impl Resolver for HttpResolver {
    fn read(&self, file: &FileInfo, options: &Options) -> Result<FileData, Error> {
        let client = reqwest::blocking::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| Error::resolver(&file.url, e.to_string()))?;

        let request = RequestOptions {
            url: file.url.clone(),
            method: options.fetch.method,
            headers: &options.fetch.headers,
            timeout: options.timeout,
            max_redirects: options.fetch.redirects,
        };
        let response = send_request(&client, &request, &mut Vec::new())?;

        let status = response.status();
        if status.as_u16() >= 400 {
            if request.method == Method::Head && status == reqwest::StatusCode::METHOD_NOT_ALLOWED
            {
                // Server refuses HEAD; treat as no content
                return Ok(FileData::Bytes(Vec::new()));
            }
            return Err(Error::resolver(
                &file.url,
                format!("HTTP ERROR {}", status.as_u16()),
            ));
        }

        response
            .bytes()
            .map(|b| FileData::Bytes(b.to_vec()))
            .map_err(|e| Error::resolver(&file.url, format!("Error downloading {}: {}", file.url, e)))
    }
}

/// The built-in resolvers in priority order.
pub fn default_resolvers() -> (Arc<dyn Resolver>, Option<Arc<dyn Resolver>>) {
    #[cfg(feature = "remote")]
    let http: Option<Arc<dyn Resolver>> = Some(Arc::new(HttpResolver));
    #[cfg(not(feature = "remote"))]
    let http: Option<Arc<dyn Resolver>> = None;

    (Arc::new(FileResolver), http)
}
