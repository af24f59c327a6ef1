//! Canonical event union for observers.
//!
//! Events are fire-and-forget: delivery is at most once, nothing is queued
//! for late subscribers and nothing is persisted.
//!
//! # Wire Format
//!
//! Events are serialized with a `type` tag:
//!
//! ```json
//! { "type": "repository", "action": "update", "repository": "owner/repo", "repository_id": "42" }
//! ```

use serde::{Deserialize, Serialize};

use crate::domain::{DisabledReason, Stage};

/// Channel an event is published on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventChannel {
    Repository,
    Config,
    Stage,
    Status,
    Shutdown,
}

/// Action carried by a repository event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepositoryAction {
    Update,
    Install,
    Uninstall,
    Registration,
}

/// Canonical event types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppEvent {
    // ========== Repository Events ==========
    /// A single repository changed.
    Repository {
        action: RepositoryAction,
        /// Full name of the repository.
        repository: String,
        repository_id: Option<String>,
    },

    /// The persisted repository set changed.
    RepositoriesChanged,

    // ========== System Events ==========
    /// Configuration or global lists changed.
    Config,

    /// The startup stage advanced.
    StageChanged { stage: Stage },

    /// The system was disabled.
    Disabled { reason: DisabledReason },

    /// The host platform is stopping.
    Shutdown,
}

impl AppEvent {
    pub fn repository(
        action: RepositoryAction,
        full_name: impl Into<String>,
        repository_id: Option<String>,
    ) -> Self {
        Self::Repository {
            action,
            repository: full_name.into(),
            repository_id,
        }
    }

    /// Channel this event belongs to.
    pub const fn channel(&self) -> EventChannel {
        match self {
            Self::Repository { .. } | Self::RepositoriesChanged => EventChannel::Repository,
            Self::Config => EventChannel::Config,
            Self::StageChanged { .. } => EventChannel::Stage,
            Self::Disabled { .. } => EventChannel::Status,
            Self::Shutdown => EventChannel::Shutdown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_repository_event_wire_format() {
        let event = AppEvent::repository(RepositoryAction::Update, "owner/repo", Some("42".into()));
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({
                "type": "repository",
                "action": "update",
                "repository": "owner/repo",
                "repository_id": "42"
            })
        );
        assert_eq!(event.channel(), EventChannel::Repository);
    }

    #[test]
    fn test_channels() {
        assert_eq!(AppEvent::Config.channel(), EventChannel::Config);
        assert_eq!(AppEvent::RepositoriesChanged.channel(), EventChannel::Repository);
        assert_eq!(
            AppEvent::Disabled {
                reason: DisabledReason::RateLimit
            }
            .channel(),
            EventChannel::Status
        );
        assert_eq!(AppEvent::Shutdown.channel(), EventChannel::Shutdown);
    }
}
