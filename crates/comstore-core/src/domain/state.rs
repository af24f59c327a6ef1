//! Process-level state: stage, status flags and disabled reason.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Startup stages. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Setup,
    Startup,
    Running,
    Background,
}

impl Stage {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Setup => "setup",
            Self::Startup => "startup",
            Self::Running => "running",
            Self::Background => "background",
        }
    }

    /// Stage that follows this one.
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Setup => Some(Self::Startup),
            Self::Startup => Some(Self::Running),
            Self::Running => Some(Self::Background),
            Self::Background => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the system is disabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisabledReason {
    InvalidToken,
    RateLimit,
    Constraints,
    Restore,
    Removed,
}

impl DisabledReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidToken => "invalid_token",
            Self::RateLimit => "rate_limit",
            Self::Constraints => "constraints",
            Self::Restore => "restore",
            Self::Removed => "removed",
        }
    }
}

impl fmt::Display for DisabledReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status flags observed by tasks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    /// The host platform has not finished starting.
    pub startup: bool,
    /// Fresh install, seeded from the bundled list.
    pub new: bool,
    /// A background reconciliation is running.
    pub background_task: bool,
}

/// System state: running flag, stage and disabled reason.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemState {
    pub running: bool,
    pub stage: Option<Stage>,
    pub disabled_reason: Option<DisabledReason>,
}

impl SystemState {
    pub const fn disabled(&self) -> bool {
        self.disabled_reason.is_some()
    }
}

/// Global lists persisted in the `hacs` document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommonLists {
    pub archived_repositories: Vec<String>,
    /// Old full name to new full name.
    pub renamed_repositories: IndexMap<String, String>,
    pub ignored_repositories: Vec<String>,
}

impl CommonLists {
    /// Rebuild from possibly duplicated input.
    ///
    /// Lists keep the first occurrence of each value. A rename whose target
    /// is itself a rename source is dropped.
    pub fn deduplicated(raw: &Self) -> Self {
        let mut lists = Self::default();

        for (source, target) in &raw.renamed_repositories {
            if !raw.renamed_repositories.contains_key(target) {
                lists
                    .renamed_repositories
                    .insert(source.clone(), target.clone());
            }
        }

        for entry in &raw.archived_repositories {
            if !lists.archived_repositories.contains(entry) {
                lists.archived_repositories.push(entry.clone());
            }
        }

        for entry in &raw.ignored_repositories {
            if !lists.ignored_repositories.contains(entry) {
                lists.ignored_repositories.push(entry.clone());
            }
        }

        lists
    }

    pub fn is_ignored(&self, full_name: &str) -> bool {
        self.ignored_repositories
            .iter()
            .any(|i| i.eq_ignore_ascii_case(full_name))
    }

    /// Follow a rename, if any.
    pub fn resolve_rename<'a>(&'a self, full_name: &'a str) -> &'a str {
        self.renamed_repositories
            .get(full_name)
            .map_or(full_name, String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order() {
        assert!(Stage::Setup < Stage::Startup);
        assert!(Stage::Running < Stage::Background);
        assert_eq!(Stage::Setup.next(), Some(Stage::Startup));
        assert_eq!(Stage::Background.next(), None);
    }

    #[test]
    fn test_deduplicate_lists() {
        let raw = CommonLists {
            archived_repositories: vec!["a".into(), "a".into(), "b".into()],
            renamed_repositories: IndexMap::new(),
            ignored_repositories: vec!["x".into(), "y".into(), "x".into()],
        };
        let lists = CommonLists::deduplicated(&raw);
        assert_eq!(lists.archived_repositories, vec!["a", "b"]);
        assert_eq!(lists.ignored_repositories, vec!["x", "y"]);
    }

    #[test]
    fn test_chained_rename_dropped() {
        let mut renamed = IndexMap::new();
        renamed.insert("old/a".to_string(), "mid/a".to_string());
        renamed.insert("mid/a".to_string(), "new/a".to_string());
        let raw = CommonLists {
            renamed_repositories: renamed,
            ..CommonLists::default()
        };

        let lists = CommonLists::deduplicated(&raw);
        assert_eq!(lists.renamed_repositories.len(), 1);
        assert_eq!(lists.resolve_rename("mid/a"), "new/a");
        assert_eq!(lists.resolve_rename("old/a"), "old/a");
    }

    #[test]
    fn test_disabled_reason_wire_names() {
        assert_eq!(
            serde_json::to_string(&DisabledReason::RateLimit).unwrap(),
            "\"rate_limit\""
        );
        assert_eq!(DisabledReason::InvalidToken.to_string(), "invalid_token");
    }
}
