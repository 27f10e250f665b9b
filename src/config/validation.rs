//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check directory URLs and appliance names
//! - Check that persona passwords only appear alongside a persona
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: FetchConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;

use thiserror::Error;
use url::Url;

use crate::config::schema::FetchConfig;

/// A single semantic problem, located by its config path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

pub fn validate_config(config: &FetchConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.directories.default_urls.is_empty() {
        errors.push(ValidationError::new(
            "directories.default_urls",
            "at least one directory is required",
        ));
    }
    for (i, raw) in config.directories.default_urls.iter().enumerate() {
        if let Err(e) = Url::parse(raw) {
            errors.push(ValidationError::new(
                format!("directories.default_urls[{i}]"),
                format!("'{raw}' is not a URL: {e}"),
            ));
        }
    }

    if config.http.user_agent.trim().is_empty() {
        errors.push(ValidationError::new("http.user_agent", "must not be empty"));
    }

    if config.logging.level.trim().is_empty() {
        errors.push(ValidationError::new("logging.level", "must not be empty"));
    }

    if config.session.password.is_some() && config.session.persona.is_none() {
        errors.push(ValidationError::new(
            "session.password",
            "set without session.persona",
        ));
    }

    let mut names = HashSet::new();
    for (i, appliance) in config.appliances.iter().enumerate() {
        if appliance.name.trim().is_empty() {
            errors.push(ValidationError::new(
                format!("appliances[{i}].name"),
                "must not be empty",
            ));
        } else if !names.insert(appliance.name.as_str()) {
            errors.push(ValidationError::new(
                format!("appliances[{i}].name"),
                format!("duplicate appliance '{}'", appliance.name),
            ));
        }

        if appliance.host.trim().is_empty() {
            errors.push(ValidationError::new(
                format!("appliances[{i}].host"),
                "must not be empty",
            ));
        }

        let mut personas = HashSet::new();
        for (j, persona) in appliance.personas.iter().enumerate() {
            if !personas.insert(persona.id.as_str()) {
                errors.push(ValidationError::new(
                    format!("appliances[{i}].personas[{j}].id"),
                    format!("duplicate persona '{}'", persona.id),
                ));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
