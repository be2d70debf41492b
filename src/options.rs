//! Options for parsing, resolving, bundling and dereferencing.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::parsers::{BinaryParser, JsonParser, Parser, TextParser, YamlParser};
use crate::plugins::Plugin;
use crate::resolvers::{default_resolvers, Resolver};

/// Default timeout for HTTP requests (60 seconds).
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(60);

/// Default maximum number of HTTP redirects to follow.
pub const MAX_REDIRECTS: usize = 5;

/// What to do when a `$ref` points back into one of its own ancestors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Circular {
    /// Install a back-reference so the output graph has a real cycle.
    #[default]
    Allow,
    /// Fail with `Error::Circular`.
    Forbid,
    /// Leave the `$ref` object untouched at the cycle point.
    Ignore,
}

impl Circular {
    /// Parse a circular policy name (`allow`/`true`, `forbid`/`false`, `ignore`).
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "allow" | "true" => Some(Circular::Allow),
            "forbid" | "false" => Some(Circular::Forbid),
            "ignore" => Some(Circular::Ignore),
            _ => None,
        }
    }
}

/// HTTP method used by the HTTP resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    #[default]
    Get,
    Head,
}

/// Request settings passed to the HTTP resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchOptions {
    pub method: Method,
    /// Extra request headers, sent in order.
    pub headers: Vec<(String, String)>,
    /// Maximum number of redirects to follow.
    pub redirects: usize,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            method: Method::Get,
            headers: Vec::new(),
            redirects: MAX_REDIRECTS,
        }
    }
}

/// The serializable part of [`Options`], as read from a config file.
///
/// Absent fields leave the corresponding option unchanged. Plugins cannot be
/// configured this way.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub circular: Option<Circular>,
    pub external: Option<bool>,
    /// HTTP timeout in seconds.
    pub timeout: Option<u64>,
    pub fetch: Option<FetchOptions>,
}

/// Enabled parsers. `None` disables a built-in parser.
#[derive(Clone)]
pub struct ParseOptions {
    pub json: Option<Arc<dyn Parser>>,
    pub yaml: Option<Arc<dyn Parser>>,
    pub text: Option<Arc<dyn Parser>>,
    pub binary: Option<Arc<dyn Parser>>,
    /// Custom parsers, tried after the built-ins.
    pub custom: Vec<Arc<dyn Parser>>,
}

impl ParseOptions {
    /// No parsers at all.
    pub fn none() -> Self {
        Self {
            json: None,
            yaml: None,
            text: None,
            binary: None,
            custom: Vec::new(),
        }
    }

    /// Enabled parsers in priority order.
    pub fn plugins(&self) -> Vec<Arc<dyn Parser>> {
        [&self.json, &self.yaml, &self.text, &self.binary]
            .into_iter()
            .flatten()
            .cloned()
            .chain(self.custom.iter().cloned())
            .collect()
    }
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            json: Some(Arc::new(JsonParser)),
            yaml: Some(Arc::new(YamlParser)),
            text: Some(Arc::new(TextParser)),
            binary: Some(Arc::new(BinaryParser)),
            custom: Vec::new(),
        }
    }
}

/// Enabled resolvers. `None` disables a built-in resolver.
#[derive(Clone)]
pub struct ResolveOptions {
    /// Follow refs into other files and URLs. When false only the root
    /// document is read and external `$ref`s are left as they are.
    pub external: bool,
    pub file: Option<Arc<dyn Resolver>>,
    pub http: Option<Arc<dyn Resolver>>,
    /// Custom resolvers, tried after the built-ins.
    pub custom: Vec<Arc<dyn Resolver>>,
}

impl ResolveOptions {
    /// Enabled resolvers in priority order.
    pub fn plugins(&self) -> Vec<Arc<dyn Resolver>> {
        [&self.file, &self.http]
            .into_iter()
            .flatten()
            .cloned()
            .chain(self.custom.iter().cloned())
            .collect()
    }
}

impl Default for ResolveOptions {
    fn default() -> Self {
        let (file, http) = default_resolvers();
        Self {
            external: true,
            file: Some(file),
            http,
            custom: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DereferenceOptions {
    pub circular: Circular,
}

/// Options for one top-level call.
#[derive(Clone)]
pub struct Options {
    pub parse: ParseOptions,
    pub resolve: ResolveOptions,
    pub dereference: DereferenceOptions,
    /// Timeout applied to each HTTP request.
    pub timeout: Duration,
    pub fetch: FetchOptions,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            parse: ParseOptions::default(),
            resolve: ResolveOptions::default(),
            dereference: DereferenceOptions::default(),
            timeout: HTTP_TIMEOUT,
            fetch: FetchOptions::default(),
        }
    }
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the circular reference policy.
    pub fn circular(mut self, circular: Circular) -> Self {
        self.dereference.circular = circular;
        self
    }

    /// Enable or disable following external refs.
    pub fn external(mut self, external: bool) -> Self {
        self.resolve.external = external;
        self
    }

    /// Set the per-request HTTP timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Add a request header for the HTTP resolver.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fetch.headers.push((name.into(), value.into()));
        self
    }

    /// Apply the fields present in `settings`.
    pub fn settings(mut self, settings: &Settings) -> Self {
        if let Some(circular) = settings.circular {
            self.dereference.circular = circular;
        }
        if let Some(external) = settings.external {
            self.resolve.external = external;
        }
        if let Some(secs) = settings.timeout {
            self.timeout = Duration::from_secs(secs);
        }
        if let Some(fetch) = &settings.fetch {
            self.fetch = fetch.clone();
        }
        self
    }

    /// Add a custom parser after the built-ins.
    pub fn with_parser(mut self, parser: Arc<dyn Parser>) -> Self {
        self.parse.custom.push(parser);
        self
    }

    /// Add a custom resolver after the built-ins.
    pub fn with_resolver(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.resolve.custom.push(resolver);
        self
    }
}

impl std::fmt::Debug for Options {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parsers: Vec<String> = self
            .parse
            .plugins()
            .iter()
            .map(|p| p.name().to_string())
            .collect();
        let resolvers: Vec<String> = self
            .resolve
            .plugins()
            .iter()
            .map(|r| r.name().to_string())
            .collect();
        f.debug_struct("Options")
            .field("parsers", &parsers)
            .field("resolvers", &resolvers)
            .field("external", &self.resolve.external)
            .field("circular", &self.dereference.circular)
            .field("timeout", &self.timeout)
            .field("fetch", &self.fetch)
            .finish()
    }
}
