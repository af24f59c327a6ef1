//! Shared process state.
//!
//! One [`SharedState`] exists per running instance. Readers get copies;
//! the lock is never held across an await point.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::domain::{CommonLists, DisabledReason, Stage, Status, SystemState};

#[derive(Debug, Default)]
struct Inner {
    status: Status,
    system: SystemState,
    common: CommonLists,
}

/// Status flags, system state and global lists.
#[derive(Debug, Default)]
pub struct SharedState {
    inner: RwLock<Inner>,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    // ========== Status ==========

    pub fn status(&self) -> Status {
        self.read().status.clone()
    }

    /// The host platform is still starting.
    pub fn startup(&self) -> bool {
        self.read().status.startup
    }

    pub fn set_startup(&self, startup: bool) {
        self.write().status.startup = startup;
    }

    pub fn is_new(&self) -> bool {
        self.read().status.new
    }

    pub fn set_new(&self, new: bool) {
        self.write().status.new = new;
    }

    pub fn set_background_task(&self, running: bool) {
        self.write().status.background_task = running;
    }

    // ========== System ==========

    pub fn system(&self) -> SystemState {
        self.read().system.clone()
    }

    pub fn disabled(&self) -> bool {
        self.read().system.disabled()
    }

    pub fn disabled_reason(&self) -> Option<DisabledReason> {
        self.read().system.disabled_reason
    }

    pub fn disable(&self, reason: DisabledReason) {
        self.write().system.disabled_reason = Some(reason);
    }

    pub fn enable(&self) {
        self.write().system.disabled_reason = None;
    }

    pub fn set_running(&self, running: bool) {
        self.write().system.running = running;
    }

    pub fn stage(&self) -> Option<Stage> {
        self.read().system.stage
    }

    /// Move to `stage`. Returns `false` and leaves the stage unchanged when
    /// `stage` is not after the current one.
    pub fn advance_stage(&self, stage: Stage) -> bool {
        let mut inner = self.write();
        match inner.system.stage {
            Some(current) if current >= stage => false,
            _ => {
                inner.system.stage = Some(stage);
                true
            }
        }
    }

    // ========== Global lists ==========

    pub fn common(&self) -> CommonLists {
        self.read().common.clone()
    }

    pub fn set_common(&self, common: CommonLists) {
        self.write().common = common;
    }

    pub fn is_ignored(&self, full_name: &str) -> bool {
        self.read().common.is_ignored(full_name)
    }

    /// Full name after following a rename.
    pub fn resolve_rename(&self, full_name: &str) -> String {
        self.read().common.resolve_rename(full_name).to_string()
    }

    pub fn mark_archived(&self, full_name: &str) {
        let mut inner = self.write();
        if !inner
            .common
            .archived_repositories
            .iter()
            .any(|a| a == full_name)
        {
            inner
                .common
                .archived_repositories
                .push(full_name.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disable_and_enable() {
        let state = SharedState::new();
        assert!(!state.disabled());

        state.disable(DisabledReason::RateLimit);
        assert!(state.disabled());
        assert_eq!(state.disabled_reason(), Some(DisabledReason::RateLimit));

        state.enable();
        assert!(!state.disabled());
    }

    #[test]
    fn test_stage_only_moves_forward() {
        let state = SharedState::new();
        assert_eq!(state.stage(), None);
        assert!(state.advance_stage(Stage::Setup));
        assert!(state.advance_stage(Stage::Running));
        assert!(!state.advance_stage(Stage::Startup));
        assert!(!state.advance_stage(Stage::Running));
        assert_eq!(state.stage(), Some(Stage::Running));
    }

    #[test]
    fn test_mark_archived_once() {
        let state = SharedState::new();
        state.mark_archived("owner/a");
        state.mark_archived("owner/a");
        assert_eq!(state.common().archived_repositories, vec!["owner/a"]);
    }
}
