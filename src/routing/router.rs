//! Route lookup.
//!
//! # Responsibilities
//! - Parse configured upstream base URLs once, at construction
//! - Resolve a request path to the longest matching prefix route
//! - Return the stripped path or an explicit no-match
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - Routes sorted by prefix length, longest first; the sort is stable so
//!   equal lengths keep declaration order
//! - O(n) prefix scan (acceptable for typical route counts)

use axum::http::uri::{Authority, PathAndQuery, Scheme};
use axum::http::{HeaderValue, Uri};
use indexmap::IndexMap;
use thiserror::Error;
use url::{Position, Url};

use crate::routing::matcher::PrefixMatcher;

/// Why an upstream base URL was rejected.
#[derive(Debug, Error)]
pub enum UpstreamUrlError {
    #[error("{0}")]
    Parse(#[from] url::ParseError),

    #[error("unsupported scheme {0:?}, expected http or https")]
    UnsupportedScheme(String),

    #[error("missing host")]
    MissingHost,

    #[error("invalid authority {0:?}")]
    InvalidAuthority(String),
}

/// Error building a [`RouteTable`].
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("no routes configured")]
    Empty,

    #[error("upstream for prefix {prefix:?} is invalid: {source}")]
    InvalidUpstream {
        prefix: String,
        #[source]
        source: UpstreamUrlError,
    },
}

/// A parsed upstream base URL.
#[derive(Debug, Clone)]
pub struct Upstream {
    scheme: Scheme,
    authority: Authority,
    /// Base path without a trailing slash; empty for a bare host.
    base_path: String,
    host_header: HeaderValue,
}

impl Upstream {
    pub fn scheme(&self) -> &Scheme {
        &self.scheme
    }

    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    /// Value for the outbound `Host` header.
    pub fn host_header(&self) -> &HeaderValue {
        &self.host_header
    }

    /// Build the upstream URI for an already-stripped path.
    pub fn uri_for(&self, path: &str, query: Option<&str>) -> Result<Uri, axum::http::Error> {
        let mut target = String::with_capacity(self.base_path.len() + path.len() + 1);
        target.push_str(&self.base_path);
        target.push_str(path);
        if let Some(q) = query {
            target.push('?');
            target.push_str(q);
        }
        let path_and_query = PathAndQuery::try_from(target)?;

        Ok(Uri::builder()
            .scheme(self.scheme.clone())
            .authority(self.authority.clone())
            .path_and_query(path_and_query)
            .build()?)
    }
}

/// Parse an upstream base URL. Requires an absolute http(s) URL with a host.
pub fn parse_upstream(raw: &str) -> Result<Upstream, UpstreamUrlError> {
    let url = Url::parse(raw)?;
    let scheme = match url.scheme() {
        "http" => Scheme::HTTP,
        "https" => Scheme::HTTPS,
        other => return Err(UpstreamUrlError::UnsupportedScheme(other.to_string())),
    };
    if url.host_str().map_or(true, str::is_empty) {
        return Err(UpstreamUrlError::MissingHost);
    }

    let host_port = &url[Position::BeforeHost..Position::AfterPort];
    let authority = Authority::try_from(host_port)
        .map_err(|_| UpstreamUrlError::InvalidAuthority(host_port.to_string()))?;
    let host_header = HeaderValue::from_str(host_port)
        .map_err(|_| UpstreamUrlError::InvalidAuthority(host_port.to_string()))?;

    Ok(Upstream {
        scheme,
        authority,
        base_path: url.path().trim_end_matches('/').to_string(),
        host_header,
    })
}

/// A prefix route.
#[derive(Debug, Clone)]
pub struct Route {
    matcher: PrefixMatcher,
    upstream: Upstream,
}

impl Route {
    pub fn prefix(&self) -> &str {
        self.matcher.prefix()
    }

    pub fn upstream(&self) -> &Upstream {
        &self.upstream
    }
}

/// Result of a successful lookup.
#[derive(Debug)]
pub struct Resolved<'a> {
    pub route: &'a Route,
    /// Request path with the prefix removed, always starting with `/`.
    pub path: String,
}

/// Immutable prefix → upstream table.
#[derive(Debug)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    /// Build the table from `path_map`, in declaration order.
    pub fn new(path_map: &IndexMap<String, String>) -> Result<Self, RouteError> {
        if path_map.is_empty() {
            return Err(RouteError::Empty);
        }

        let mut routes = path_map
            .iter()
            .map(|(prefix, raw)| {
                let upstream = parse_upstream(raw).map_err(|source| RouteError::InvalidUpstream {
                    prefix: prefix.clone(),
                    source,
                })?;
                Ok(Route {
                    matcher: PrefixMatcher::new(prefix.clone()),
                    upstream,
                })
            })
            .collect::<Result<Vec<_>, RouteError>>()?;

        routes.sort_by(|a, b| b.prefix().len().cmp(&a.prefix().len()));

        for route in &routes {
            tracing::debug!(
                prefix = %route.prefix(),
                upstream = %route.upstream.authority,
                "Route registered"
            );
        }

        Ok(Self { routes })
    }

    /// Find the longest prefix matching `path`.
    pub fn resolve(&self, path: &str) -> Option<Resolved<'_>> {
        self.routes.iter().find_map(|route| {
            route
                .matcher
                .strip(path)
                .map(|stripped| Resolved { route, path: stripped })
        })
    }

    /// Configured prefixes in match order, longest first.
    pub fn prefixes(&self) -> Vec<&str> {
        self.routes.iter().map(Route::prefix).collect()
    }
}
