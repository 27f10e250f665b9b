//! Registry of directories and entry point for client resolution.

use std::sync::Arc;

use arc_swap::ArcSwap;
use dashmap::DashMap;
use url::Url;

use crate::config::schema::{SessionConfig, DEFAULT_DIRECTORY_URL};
use crate::error::{FetchError, FetchResult};
use crate::session::chooser::{
    ApplianceChooser, FixedApplianceChooser, FixedPersonaChooser, HeadlessChooser, PersonaChooser,
};
use crate::session::directory::Directory;
use crate::session::SessionContext;
use crate::transport::{ApplianceClient, DirectoryConnector};

/// Which directory, appliance and persona a request wants.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSelector {
    /// Directory override; the first default directory otherwise.
    pub flock: Option<Url>,
    /// Appliance override; the directory default otherwise.
    pub appliance: Option<String>,
    /// Persona override; the appliance default otherwise.
    pub persona: Option<String>,
    /// Install the named appliance as the directory default.
    pub make_default: bool,
    /// Never prompt for a default appliance.
    pub silent: bool,
}

/// An authenticated client and where it came from.
#[derive(Clone)]
pub struct ResolvedSession {
    pub flock: Url,
    pub appliance: String,
    pub persona: Option<String>,
    pub client: Arc<dyn ApplianceClient>,
}

impl std::fmt::Debug for ResolvedSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSession")
            .field("flock", &self.flock.as_str())
            .field("appliance", &self.appliance)
            .field("persona", &self.persona)
            .field("logged_in", &self.client.is_logged_in())
            .finish()
    }
}

/// Owns every directory handle. Directories are created on first use and
/// live as long as the manager.
pub struct SessionManager {
    ctx: Arc<SessionContext>,
    flocks: DashMap<Url, Arc<Directory>>,
    default_directories: ArcSwap<Vec<Url>>,
}

impl SessionManager {
    pub fn builder(connector: Arc<dyn DirectoryConnector>) -> SessionManagerBuilder {
        SessionManagerBuilder::new(connector)
    }

    /// Handle for `url`, created if needed.
    pub fn directory(&self, url: &Url) -> Arc<Directory> {
        if let Some(directory) = self.flocks.get(url) {
            return directory.clone();
        }
        self.flocks
            .entry(url.clone())
            .or_insert_with(|| {
                tracing::debug!(flock = %url, "Directory registered");
                Arc::new(Directory::new(url.clone(), self.ctx.clone()))
            })
            .clone()
    }

    pub fn default_directories(&self) -> Arc<Vec<Url>> {
        self.default_directories.load_full()
    }

    /// Replace the default directory list. Not persisted.
    pub fn set_default_directories(&self, urls: Vec<Url>) {
        tracing::info!(count = urls.len(), "Default directories replaced");
        self.default_directories.store(Arc::new(urls));
    }

    /// First default directory.
    pub fn default_directory(&self) -> FetchResult<Url> {
        self.default_directories
            .load()
            .first()
            .cloned()
            .ok_or_else(|| FetchError::NoDefaultAppliance("no directory configured".into()))
    }

    /// Resolve an authenticated client for `selector`.
    pub async fn resolve_client(&self, selector: &SessionSelector) -> FetchResult<ResolvedSession> {
        let flock = match &selector.flock {
            Some(url) => url.clone(),
            None => self.default_directory()?,
        };
        let directory = self.directory(&flock);

        let appliance = match &selector.appliance {
            Some(name) => {
                let appliance = directory.appliance(name).await?;
                if selector.make_default {
                    directory.set_default(appliance.clone());
                }
                appliance
            }
            None => directory.default_appliance(selector.silent).await?,
        };

        let client = match &selector.persona {
            Some(persona) => appliance.persona_client(persona).await?,
            None => appliance.default_persona_client().await?,
        };

        Ok(ResolvedSession {
            flock,
            appliance: appliance.name().to_string(),
            persona: selector.persona.clone(),
            client,
        })
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("flocks", &self.flocks.len())
            .field("default_directories", &self.default_directories.load_full())
            .finish()
    }
}

/// Builder for [`SessionManager`]. Choosers default to [`HeadlessChooser`].
pub struct SessionManagerBuilder {
    connector: Arc<dyn DirectoryConnector>,
    appliance_chooser: Arc<dyn ApplianceChooser>,
    persona_chooser: Arc<dyn PersonaChooser>,
    permissions: Vec<String>,
    default_directories: Vec<Url>,
}

impl SessionManagerBuilder {
    pub fn new(connector: Arc<dyn DirectoryConnector>) -> Self {
        Self {
            connector,
            appliance_chooser: Arc::new(HeadlessChooser),
            persona_chooser: Arc::new(HeadlessChooser),
            permissions: Vec::new(),
            default_directories: Url::parse(DEFAULT_DIRECTORY_URL).into_iter().collect(),
        }
    }

    pub fn appliance_chooser(mut self, chooser: Arc<dyn ApplianceChooser>) -> Self {
        self.appliance_chooser = chooser;
        self
    }

    pub fn persona_chooser(mut self, chooser: Arc<dyn PersonaChooser>) -> Self {
        self.persona_chooser = chooser;
        self
    }

    /// Site permissions requested after each login.
    pub fn permissions(mut self, permissions: Vec<String>) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn default_directories(mut self, urls: Vec<Url>) -> Self {
        self.default_directories = urls;
        self
    }

    /// Fixed choosers and permissions from the `[session]` config section.
    pub fn session_config(self, config: &SessionConfig) -> Self {
        self.appliance_chooser(Arc::new(FixedApplianceChooser::new(config.appliance.clone())))
            .persona_chooser(Arc::new(FixedPersonaChooser::new(
                config.persona.clone(),
                config.password.clone(),
            )))
            .permissions(config.permissions.clone())
    }

    pub fn build(self) -> SessionManager {
        SessionManager {
            ctx: Arc::new(SessionContext {
                connector: self.connector,
                appliance_chooser: self.appliance_chooser,
                persona_chooser: self.persona_chooser,
                permissions: self.permissions,
            }),
            flocks: DashMap::new(),
            default_directories: ArcSwap::from_pointee(self.default_directories),
        }
    }
}
