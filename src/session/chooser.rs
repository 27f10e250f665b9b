//! Appliance and persona selection.
//!
//! Interactive choosers are external; the session manager only decides when
//! to ask, when to show an error and when to dismiss. A chooser keeps waiting
//! after an error is shown, so the user can pick again.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use url::Url;

use crate::transport::Credentials;

/// Outcome of one selection round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChooserEvent<T> {
    Chosen(T),
    Canceled,
    /// The chooser cannot produce a selection at all.
    Failed(String),
}

/// Picks the default appliance of a directory.
#[async_trait]
pub trait ApplianceChooser: Send + Sync {
    async fn choose(&self, flock: &Url) -> ChooserEvent<String>;

    /// The last choice failed; the chooser stays open.
    fn show_error(&self, flock: &Url, message: &str);

    fn dismiss(&self, flock: &Url);
}

/// Context shown when asking for a persona.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonaPrompt {
    pub flock: Url,
    pub appliance: String,
    /// Persona requested by the caller, if it named one.
    pub persona: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonaSelection {
    pub persona_id: String,
    pub credentials: Credentials,
}

/// Picks a persona and collects its credentials.
#[async_trait]
pub trait PersonaChooser: Send + Sync {
    async fn choose(&self, prompt: &PersonaPrompt) -> ChooserEvent<PersonaSelection>;

    fn show_error(&self, prompt: &PersonaPrompt, message: &str);

    fn dismiss(&self, prompt: &PersonaPrompt);
}

/// Always picks the configured appliance. After an error it gives up once,
/// so each selection flow makes a single attempt.
#[derive(Debug, Default)]
pub struct FixedApplianceChooser {
    appliance: Option<String>,
    failed: AtomicBool,
}

impl FixedApplianceChooser {
    pub fn new(appliance: Option<String>) -> Self {
        Self {
            appliance,
            failed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl ApplianceChooser for FixedApplianceChooser {
    async fn choose(&self, _flock: &Url) -> ChooserEvent<String> {
        if self.failed.swap(false, Ordering::AcqRel) {
            return ChooserEvent::Failed("configured appliance was rejected".into());
        }
        match &self.appliance {
            Some(name) => ChooserEvent::Chosen(name.clone()),
            None => ChooserEvent::Failed("no appliance configured".into()),
        }
    }

    fn show_error(&self, flock: &Url, message: &str) {
        tracing::warn!(flock = %flock, error = message, "Configured appliance unusable");
        self.failed.store(true, Ordering::Release);
    }

    fn dismiss(&self, _flock: &Url) {}
}

/// Logs in with the configured persona and password.
///
/// A persona named by the request takes precedence over the configured one.
#[derive(Debug, Default)]
pub struct FixedPersonaChooser {
    persona: Option<String>,
    password: Option<String>,
    failed: AtomicBool,
}

impl FixedPersonaChooser {
    pub fn new(persona: Option<String>, password: Option<String>) -> Self {
        Self {
            persona,
            password,
            failed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl PersonaChooser for FixedPersonaChooser {
    async fn choose(&self, prompt: &PersonaPrompt) -> ChooserEvent<PersonaSelection> {
        if self.failed.swap(false, Ordering::AcqRel) {
            return ChooserEvent::Failed("configured credentials were rejected".into());
        }
        let persona = match prompt.persona.as_ref().or(self.persona.as_ref()) {
            Some(persona) => persona.clone(),
            None => return ChooserEvent::Failed("no persona configured".into()),
        };
        let credentials = match &self.password {
            Some(password) => Credentials::password(password.clone()),
            None => Credentials::none(),
        };
        ChooserEvent::Chosen(PersonaSelection {
            persona_id: persona,
            credentials,
        })
    }

    fn show_error(&self, prompt: &PersonaPrompt, message: &str) {
        tracing::warn!(
            appliance = %prompt.appliance,
            persona = ?prompt.persona,
            error = message,
            "Configured persona rejected"
        );
        self.failed.store(true, Ordering::Release);
    }

    fn dismiss(&self, _prompt: &PersonaPrompt) {}
}

/// Chooser for environments without a user: every selection is canceled.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeadlessChooser;

#[async_trait]
impl ApplianceChooser for HeadlessChooser {
    async fn choose(&self, _flock: &Url) -> ChooserEvent<String> {
        ChooserEvent::Canceled
    }

    fn show_error(&self, _flock: &Url, _message: &str) {}

    fn dismiss(&self, _flock: &Url) {}
}

#[async_trait]
impl PersonaChooser for HeadlessChooser {
    async fn choose(&self, _prompt: &PersonaPrompt) -> ChooserEvent<PersonaSelection> {
        ChooserEvent::Canceled
    }

    fn show_error(&self, _prompt: &PersonaPrompt, _message: &str) {}

    fn dismiss(&self, _prompt: &PersonaPrompt) {}
}
