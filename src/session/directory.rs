//! One directory (flock): its discovered appliances and default appliance.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use url::Url;

use crate::error::{FetchError, FetchResult};
use crate::observability::metrics;
use crate::session::appliance::Appliance;
use crate::session::chooser::ChooserEvent;
use crate::session::memo::MemoMap;
use crate::session::SessionContext;

pub struct Directory {
    url: Url,
    ctx: Arc<SessionContext>,
    appliances: MemoMap<String, Arc<Appliance>>,
    default: ArcSwapOption<Appliance>,
    chooser: MemoMap<(), Arc<Appliance>>,
}

impl Directory {
    pub fn new(url: Url, ctx: Arc<SessionContext>) -> Self {
        Self {
            url,
            ctx,
            appliances: MemoMap::new("appliances"),
            default: ArcSwapOption::empty(),
            chooser: MemoMap::new("appliance_chooser"),
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Discover `name`, sharing any attempt already in flight.
    pub async fn appliance(&self, name: &str) -> FetchResult<Arc<Appliance>> {
        let ctx = self.ctx.clone();
        let url = self.url.clone();
        let owned = name.to_string();

        self.appliances
            .resolve(name.to_string(), move || async move {
                match ctx.connector.connect(&url, &owned).await {
                    Ok(client) => {
                        metrics::record_discovery("success");
                        tracing::debug!(flock = %url, appliance = %owned, "Appliance discovered");
                        Ok(Arc::new(Appliance::new(url, owned, client, ctx)))
                    }
                    Err(e) => {
                        metrics::record_discovery("failure");
                        tracing::warn!(flock = %url, appliance = %owned, error = %e, "Discovery failed");
                        Err(FetchError::DiscoveryFailed {
                            flock: url.to_string(),
                            appliance: owned,
                            reason: e.to_string(),
                        })
                    }
                }
            })
            .await
    }

    /// Whether `name` has a pending or settled discovery.
    pub fn knows(&self, name: &str) -> bool {
        self.appliances.contains(&name.to_string())
    }

    pub fn current_default(&self) -> Option<Arc<Appliance>> {
        self.default.load_full()
    }

    pub fn set_default(&self, appliance: Arc<Appliance>) {
        tracing::info!(flock = %self.url, appliance = %appliance.name(), "Default appliance set");
        self.default.store(Some(appliance));
    }

    /// The default appliance, asking the chooser when none is set.
    ///
    /// With `silent` no chooser is shown and a missing default is an error.
    pub async fn default_appliance(self: &Arc<Self>, silent: bool) -> FetchResult<Arc<Appliance>> {
        if let Some(appliance) = self.current_default() {
            return Ok(appliance);
        }
        if silent {
            return Err(FetchError::NoDefaultAppliance(self.url.to_string()));
        }

        let this = self.clone();
        let (attempt, appliance) = self
            .chooser
            .resolve_attempt((), move || async move { this.choose_default().await })
            .await;
        let appliance = appliance?;
        // Later calls read the default directly.
        self.chooser.evict_attempt(&(), attempt);
        Ok(appliance)
    }

    async fn choose_default(&self) -> FetchResult<Arc<Appliance>> {
        let chooser = &self.ctx.appliance_chooser;
        let mut last_error = None;

        loop {
            match chooser.choose(&self.url).await {
                ChooserEvent::Chosen(name) => match self.appliance(&name).await {
                    Ok(appliance) => {
                        chooser.dismiss(&self.url);
                        self.set_default(appliance.clone());
                        return Ok(appliance);
                    }
                    Err(e) => {
                        chooser.show_error(&self.url, &e.to_string());
                        last_error = Some(e);
                    }
                },
                ChooserEvent::Canceled => return Err(FetchError::ChooserCanceled("appliance")),
                ChooserEvent::Failed(reason) => {
                    tracing::debug!(flock = %self.url, reason = %reason, "Appliance chooser gave up");
                    return Err(
                        last_error.unwrap_or_else(|| FetchError::NoDefaultAppliance(self.url.to_string()))
                    );
                }
            }
        }
    }
}

impl std::fmt::Debug for Directory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Directory")
            .field("url", &self.url.as_str())
            .field("appliances", &self.appliances)
            .field("default", &self.current_default().map(|a| a.name().to_string()))
            .finish()
    }
}
