//! Logical application URLs.
//!
//! An appliance-hosted application is addressed as
//! `stork+app://<domain>[:<port>]/<app>/<path>?<query>`. The domain and app name
//! together form the canonical application identifier used to pre-warm the app
//! and open channels to it; the remaining path and query become the HTTP
//! request target.

use std::fmt;

use url::Url;

use crate::error::{FetchError, FetchResult};

/// URL scheme of appliance-hosted applications.
pub const APP_SCHEME: &str = "stork+app";

/// Port used when the logical URL does not name one.
pub const DEFAULT_APP_PORT: u16 = 80;

/// A parsed logical application address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AppUrl {
    /// Application domain (lowercased).
    pub domain: String,
    /// Application name within the domain.
    pub app: String,
    /// Port on the application.
    pub port: u16,
    /// Request target: path plus query, always starting with `/`.
    pub path: String,
}

impl AppUrl {
    /// Parse `raw`.
    ///
    /// Returns `Ok(None)` when `raw` is not an appliance URL at all, so the
    /// caller can hand it to the native fetch unchanged.
    pub fn parse(raw: &str) -> FetchResult<Option<AppUrl>> {
        let claims_scheme = raw
            .get(..APP_SCHEME.len() + 1)
            .map(|prefix| prefix.eq_ignore_ascii_case(&format!("{APP_SCHEME}:")))
            .unwrap_or(false);

        let url = match Url::parse(raw) {
            Ok(url) => url,
            Err(e) if claims_scheme => return Err(malformed(raw, e.to_string())),
            Err(_) => return Ok(None),
        };

        if url.scheme() != APP_SCHEME {
            return Ok(None);
        }

        let domain = url
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| malformed(raw, "missing application domain"))?
            .to_ascii_lowercase();

        let mut segments = url.path().trim_start_matches('/').splitn(2, '/');
        let app = segments
            .next()
            .filter(|app| !app.is_empty())
            .ok_or_else(|| malformed(raw, "missing application name"))?
            .to_string();

        let mut path = format!("/{}", segments.next().unwrap_or(""));
        if let Some(query) = url.query() {
            path.push('?');
            path.push_str(query);
        }

        Ok(Some(AppUrl {
            domain,
            app,
            port: url.port().unwrap_or(DEFAULT_APP_PORT),
            path,
        }))
    }

    /// Canonical application identifier, e.g. `stork+app:photos.example.com/albums`.
    pub fn canonical_app(&self) -> String {
        format!("{}:{}/{}", APP_SCHEME, self.domain, self.app)
    }

    /// Value of the `Host` header sent to the application.
    pub fn host(&self) -> &str {
        &self.domain
    }
}

impl fmt::Display for AppUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", APP_SCHEME, self.domain)?;
        if self.port != DEFAULT_APP_PORT {
            write!(f, ":{}", self.port)?;
        }
        write!(f, "/{}{}", self.app, self.path)
    }
}

fn malformed(raw: &str, reason: impl Into<String>) -> FetchError {
    FetchError::MalformedTargetUrl {
        url: raw.to_string(),
        reason: reason.into(),
    }
}
