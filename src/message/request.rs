//! Caller-facing requests and their normalized descriptor.

use std::fmt;
use std::mem;

use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method};
use url::Url;

use crate::body::Body;
use crate::message::AppUrl;
use crate::progress::{PartialFn, ProgressFn};

/// How the dispatcher uses the response cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CacheMode {
    /// Look up, and store on a miss.
    #[default]
    Default,
    /// Never look up, never store.
    NoStore,
    /// Skip the lookup but store the fresh response.
    Reload,
    /// Look up and store; the cache decides about revalidation.
    NoCache,
    /// Prefer any stored response.
    ForceCache,
}

impl CacheMode {
    /// Whether a stored response may answer this request.
    pub fn consults_cache(&self) -> bool {
        !matches!(self, CacheMode::NoStore | CacheMode::Reload)
    }

    /// Whether the response may be stored.
    pub fn stores(&self) -> bool {
        !matches!(self, CacheMode::NoStore)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheMode::Default => "default",
            CacheMode::NoStore => "no-store",
            CacheMode::Reload => "reload",
            CacheMode::NoCache => "no-cache",
            CacheMode::ForceCache => "force-cache",
        }
    }
}

impl std::str::FromStr for CacheMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(CacheMode::Default),
            "no-store" => Ok(CacheMode::NoStore),
            "reload" => Ok(CacheMode::Reload),
            "no-cache" => Ok(CacheMode::NoCache),
            "force-cache" => Ok(CacheMode::ForceCache),
            other => Err(format!("unknown cache mode '{other}'")),
        }
    }
}

/// A request as issued by application code.
///
/// Besides the HTTP parts it carries the connection overrides (directory,
/// appliance, persona) and optional progress observers.
pub struct FetchRequest {
    pub url: String,
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Body,
    pub cache_mode: CacheMode,
    /// Directory to use instead of the configured default.
    pub flock: Option<Url>,
    /// Appliance to use instead of the directory default.
    pub appliance: Option<String>,
    /// Persona to use instead of the appliance default.
    pub persona: Option<String>,
    /// Install the named appliance as the directory default once resolved.
    pub make_default: bool,
    /// Fail instead of prompting when no default appliance is known.
    pub silent: bool,
    pub on_progress: Option<ProgressFn>,
    pub on_partial: Option<PartialFn>,
}

impl FetchRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method,
            headers: HeaderMap::new(),
            body: Body::Empty,
            cache_mode: CacheMode::Default,
            flock: None,
            appliance: None,
            persona: None,
            make_default: false,
            silent: false,
            on_progress: None,
            on_partial: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    pub fn cache_mode(mut self, mode: CacheMode) -> Self {
        self.cache_mode = mode;
        self
    }

    pub fn flock(mut self, flock: Url) -> Self {
        self.flock = Some(flock);
        self
    }

    pub fn appliance(mut self, name: impl Into<String>) -> Self {
        self.appliance = Some(name.into());
        self
    }

    pub fn persona(mut self, persona: impl Into<String>) -> Self {
        self.persona = Some(persona.into());
        self
    }

    pub fn make_default(mut self, make_default: bool) -> Self {
        self.make_default = make_default;
        self
    }

    pub fn silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    pub fn on_progress(mut self, observer: ProgressFn) -> Self {
        self.on_progress = Some(observer);
        self
    }

    pub fn on_partial(mut self, observer: PartialFn) -> Self {
        self.on_partial = Some(observer);
        self
    }
}

impl fmt::Debug for FetchRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchRequest")
            .field("url", &self.url)
            .field("method", &self.method)
            .field("body", &self.body)
            .field("cache_mode", &self.cache_mode)
            .field("flock", &self.flock)
            .field("appliance", &self.appliance)
            .field("persona", &self.persona)
            .finish_non_exhaustive()
    }
}

/// Normalized form of a request bound for an appliance application.
#[derive(Debug)]
pub struct RequestDescriptor {
    pub method: Method,
    pub target: AppUrl,
    pub headers: HeaderMap,
    pub body: Body,
    pub cache_mode: CacheMode,
}

impl RequestDescriptor {
    pub fn new(method: Method, target: AppUrl) -> Self {
        Self {
            method,
            target,
            headers: HeaderMap::new(),
            body: Body::Empty,
            cache_mode: CacheMode::Default,
        }
    }

    /// Move the body out, leaving [`Body::Empty`].
    pub fn take_body(&mut self) -> Body {
        mem::take(&mut self.body)
    }

    /// Replace the body.
    pub fn set_body(&mut self, body: Body) {
        self.body = body;
    }

    /// Copy of everything but the body.
    pub fn head(&self) -> RequestHead {
        RequestHead {
            method: self.method.clone(),
            target: self.target.clone(),
            headers: self.headers.clone(),
            cache_mode: self.cache_mode,
        }
    }
}

/// A request without its body, as matched and stored by response caches.
///
/// Unlike [`RequestDescriptor`] it is `Sync`, so it can be borrowed across
/// cache calls from a `Send` future.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    pub method: Method,
    pub target: AppUrl,
    pub headers: HeaderMap,
    pub cache_mode: CacheMode,
}
