use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::RelayRole;
use crate::error::{SporeHubError, ValidationError};
use crate::id::RelayId;

/// Override duration used when a definition does not set one.
pub const DEFAULT_OVERRIDE_TIMEOUT_SECS: u32 = 300;

/// Output line a relay drives on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutputChannel(u8);

impl OutputChannel {
    #[must_use]
    pub const fn new(channel: u8) -> Self {
        Self(channel)
    }

    #[must_use]
    pub fn get(self) -> u8 {
        self.0
    }
}

impl fmt::Display for OutputChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ch{}", self.0)
    }
}

/// Static description of one relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayDefinition {
    pub id: RelayId,
    pub display_name: String,
    pub output_channel: OutputChannel,
    pub default_visible: bool,
    pub depends_on: BTreeSet<RelayId>,
    pub override_timeout_secs: u32,
    pub role: RelayRole,
}

impl RelayDefinition {
    /// Create a builder for the relay with the given id.
    #[must_use]
    pub fn builder(id: RelayId) -> RelayDefinitionBuilder {
        RelayDefinitionBuilder {
            id,
            display_name: None,
            output_channel: None,
            default_visible: None,
            depends_on: BTreeSet::new(),
            override_timeout_secs: None,
            role: None,
        }
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`SporeHubError::Validation`] when `display_name` is empty.
    pub fn validate(&self) -> Result<(), SporeHubError> {
        if self.display_name.trim().is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        Ok(())
    }
}

/// Step-by-step builder for [`RelayDefinition`].
#[derive(Debug)]
pub struct RelayDefinitionBuilder {
    id: RelayId,
    display_name: Option<String>,
    output_channel: Option<OutputChannel>,
    default_visible: Option<bool>,
    depends_on: BTreeSet<RelayId>,
    override_timeout_secs: Option<u32>,
    role: Option<RelayRole>,
}

impl RelayDefinitionBuilder {
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn channel(mut self, channel: u8) -> Self {
        self.output_channel = Some(OutputChannel::new(channel));
        self
    }

    #[must_use]
    pub fn visible(mut self, visible: bool) -> Self {
        self.default_visible = Some(visible);
        self
    }

    #[must_use]
    pub fn depends_on(mut self, master: RelayId) -> Self {
        self.depends_on.insert(master);
        self
    }

    #[must_use]
    pub fn override_timeout_secs(mut self, secs: u32) -> Self {
        self.override_timeout_secs = Some(secs);
        self
    }

    #[must_use]
    pub fn role(mut self, role: RelayRole) -> Self {
        self.role = Some(role);
        self
    }

    /// Consume the builder, validate, and return a [`RelayDefinition`].
    ///
    /// The output channel defaults to the relay number, visibility to `true`,
    /// the role to [`RelayRole::Manual`].
    ///
    /// # Errors
    ///
    /// Returns [`SporeHubError::Validation`] if the name is missing or empty.
    pub fn build(self) -> Result<RelayDefinition, SporeHubError> {
        let definition = RelayDefinition {
            id: self.id,
            display_name: self.display_name.unwrap_or_default(),
            output_channel: self
                .output_channel
                .unwrap_or(OutputChannel::new(self.id.get())),
            default_visible: self.default_visible.unwrap_or(true),
            depends_on: self.depends_on,
            override_timeout_secs: self
                .override_timeout_secs
                .unwrap_or(DEFAULT_OVERRIDE_TIMEOUT_SECS),
            role: self.role.unwrap_or(RelayRole::Manual),
        };
        definition.validate()?;
        Ok(definition)
    }
}
