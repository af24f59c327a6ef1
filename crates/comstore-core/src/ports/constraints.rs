//! Startup constraint check port.

use async_trait::async_trait;

/// Host-side preconditions checked once during setup.
#[async_trait]
pub trait ConstraintCheckPort: Send + Sync {
    /// `Ok(())` when every constraint holds, otherwise a description of the
    /// first violated one.
    async fn check(&self) -> Result<(), String>;
}

/// Accepts every host.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoConstraints;

#[async_trait]
impl ConstraintCheckPort for NoConstraints {
    async fn check(&self) -> Result<(), String> {
        Ok(())
    }
}
