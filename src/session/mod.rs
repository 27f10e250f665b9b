//! Appliance discovery, login and connection reuse.
//!
//! # Data Flow
//! ```text
//! SessionSelector (flock?, appliance?, persona?)
//!     → manager.rs (directory URL → Directory, created on first use)
//!     → directory.rs (appliance name → Appliance, or the default appliance
//!                     picked once through the ApplianceChooser)
//!     → appliance.rs (persona → logged-in client, via PersonaChooser + login)
//!     → ResolvedSession { client }
//! ```
//!
//! # Design Decisions
//! - Every lookup goes through `memo.rs`: concurrent callers share one
//!   pending attempt, successes are kept, failures are evicted
//! - No automatic retry; the next call after a failure starts from scratch
//! - Registries belong to a `SessionManager` value, never to globals

pub mod appliance;
pub mod chooser;
pub mod directory;
pub mod manager;
pub mod memo;

use std::sync::Arc;

use crate::transport::DirectoryConnector;

pub use appliance::Appliance;
pub use chooser::{
    ApplianceChooser, ChooserEvent, FixedApplianceChooser, FixedPersonaChooser, HeadlessChooser,
    PersonaChooser, PersonaPrompt, PersonaSelection,
};
pub use directory::Directory;
pub use manager::{ResolvedSession, SessionManager, SessionManagerBuilder, SessionSelector};
pub use memo::MemoMap;

/// Collaborators shared by every directory and appliance of a manager.
pub struct SessionContext {
    pub connector: Arc<dyn DirectoryConnector>,
    pub appliance_chooser: Arc<dyn ApplianceChooser>,
    pub persona_chooser: Arc<dyn PersonaChooser>,
    /// Site permissions requested after each login.
    pub permissions: Vec<String>,
}
