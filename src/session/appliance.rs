//! A discovered appliance and its authenticated persona clients.

use std::future::Future;
use std::sync::Arc;

use url::Url;

use crate::error::{FetchError, FetchResult};
use crate::observability::metrics;
use crate::session::chooser::{ChooserEvent, PersonaPrompt};
use crate::session::memo::MemoMap;
use crate::session::SessionContext;
use crate::transport::ApplianceClient;

/// One appliance within a directory.
pub struct Appliance {
    flock: Url,
    name: String,
    default_client: Arc<dyn ApplianceClient>,
    /// Whether `default_client` was already logged in at discovery.
    preauthorized: bool,
    /// `None` is the default persona flow on `default_client`.
    personas: MemoMap<Option<String>, Arc<dyn ApplianceClient>>,
    ctx: Arc<SessionContext>,
}

impl Appliance {
    pub fn new(
        flock: Url,
        name: String,
        default_client: Arc<dyn ApplianceClient>,
        ctx: Arc<SessionContext>,
    ) -> Self {
        Self {
            flock,
            name,
            preauthorized: default_client.is_logged_in(),
            default_client,
            personas: MemoMap::new("personas"),
            ctx,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn flock(&self) -> &Url {
        &self.flock
    }

    /// The client created at discovery, logged in or not.
    pub fn default_client(&self) -> &Arc<dyn ApplianceClient> {
        &self.default_client
    }

    /// The discovery client, logging it in first if needed.
    ///
    /// A client that arrived logged in is used as is. Otherwise it counts as
    /// ready only once a login flow has granted the site permissions.
    pub async fn default_persona_client(&self) -> FetchResult<Arc<dyn ApplianceClient>> {
        if self.preauthorized && self.default_client.is_logged_in() {
            return Ok(self.default_client.clone());
        }
        self.logged_in_client(None).await
    }

    /// A dedicated client logged in as `persona`.
    pub async fn persona_client(&self, persona: &str) -> FetchResult<Arc<dyn ApplianceClient>> {
        self.logged_in_client(Some(persona.to_string())).await
    }

    async fn logged_in_client(
        &self,
        persona: Option<String>,
    ) -> FetchResult<Arc<dyn ApplianceClient>> {
        // A memoized client may have been logged out since; start over once.
        for _ in 0..2 {
            let (attempt, client) = self
                .personas
                .resolve_attempt(persona.clone(), || self.start_login(persona.clone()))
                .await;
            let client = client?;
            if client.is_logged_in() {
                return Ok(client);
            }
            tracing::debug!(
                appliance = %self.name,
                persona = ?persona,
                attempt,
                "Memoized client is no longer logged in"
            );
            self.personas.evict_attempt(&persona, attempt);
        }
        Err(FetchError::AuthenticationFailed(format!(
            "client for appliance '{}' did not stay logged in",
            self.name
        )))
    }

    fn start_login(
        &self,
        persona: Option<String>,
    ) -> impl Future<Output = FetchResult<Arc<dyn ApplianceClient>>> + Send + 'static {
        let ctx = self.ctx.clone();
        let prompt = PersonaPrompt {
            flock: self.flock.clone(),
            appliance: self.name.clone(),
            persona,
        };
        let default_client = self.default_client.clone();

        async move {
            let client = match &prompt.persona {
                None => default_client,
                Some(_) => ctx
                    .connector
                    .connect(&prompt.flock, &prompt.appliance)
                    .await
                    .map_err(|e| FetchError::DiscoveryFailed {
                        flock: prompt.flock.to_string(),
                        appliance: prompt.appliance.clone(),
                        reason: e.to_string(),
                    })?,
            };
            if client.is_logged_in() {
                // Logged in, but possibly by a flow whose permission grant failed.
                grant_permissions(&ctx, &prompt, client.as_ref()).await?;
                return Ok(client);
            }
            login_flow(&ctx, &prompt, client).await
        }
    }
}

impl std::fmt::Debug for Appliance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Appliance")
            .field("flock", &self.flock.as_str())
            .field("name", &self.name)
            .field("personas", &self.personas)
            .finish_non_exhaustive()
    }
}

/// Ask for a persona until a login succeeds, the user cancels, or the
/// chooser gives up. Site permissions are requested after the login.
async fn login_flow(
    ctx: &SessionContext,
    prompt: &PersonaPrompt,
    client: Arc<dyn ApplianceClient>,
) -> FetchResult<Arc<dyn ApplianceClient>> {
    let chooser = &ctx.persona_chooser;
    let mut last_error = None;

    loop {
        match chooser.choose(prompt).await {
            ChooserEvent::Chosen(selection) => {
                match client
                    .try_login(&selection.persona_id, &selection.credentials)
                    .await
                {
                    Ok(()) => {
                        chooser.dismiss(prompt);
                        grant_permissions(ctx, prompt, client.as_ref()).await?;
                        metrics::record_login("success");
                        tracing::info!(
                            appliance = %prompt.appliance,
                            persona = %selection.persona_id,
                            "Persona logged in"
                        );
                        return Ok(client);
                    }
                    Err(e) => {
                        metrics::record_login("rejected");
                        let err = FetchError::AuthenticationFailed(e.to_string());
                        tracing::warn!(
                            appliance = %prompt.appliance,
                            persona = %selection.persona_id,
                            error = %e,
                            "Login rejected"
                        );
                        chooser.show_error(prompt, &err.to_string());
                        last_error = Some(err);
                    }
                }
            }
            ChooserEvent::Canceled => {
                metrics::record_login("canceled");
                return Err(FetchError::ChooserCanceled("persona"));
            }
            ChooserEvent::Failed(reason) => {
                tracing::debug!(appliance = %prompt.appliance, reason = %reason, "Persona chooser gave up");
                return Err(last_error.unwrap_or(FetchError::AuthenticationFailed(reason)));
            }
        }
    }
}

/// Request the configured site permissions. A client is not handed out
/// until this succeeds.
async fn grant_permissions(
    ctx: &SessionContext,
    prompt: &PersonaPrompt,
    client: &dyn ApplianceClient,
) -> FetchResult<()> {
    client
        .request_permissions(&ctx.permissions)
        .await
        .map_err(|e| {
            metrics::record_login("permissions_denied");
            tracing::warn!(appliance = %prompt.appliance, error = %e, "Permission request failed");
            FetchError::AuthenticationFailed(format!("permission request failed: {e}"))
        })
}
