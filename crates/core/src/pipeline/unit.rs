use crate::error::UnitError;
use crate::types::TaskDescriptor;
use async_trait::async_trait;

/// A single unit of scattered work. Units share no mutable state and
/// must not depend on each other's completion order.
#[async_trait]
pub trait WorkUnit: Send + Sync {
    /// Produce this unit's contribution
    async fn execute(&self, task: &TaskDescriptor) -> Result<i64, UnitError>;
}

/// Contributes a fixed amount (1 by default)
#[derive(Debug, Clone, Copy)]
pub struct IncrementUnit {
    step: i64,
}

impl IncrementUnit {
    pub fn new() -> Self {
        Self { step: 1 }
    }

    pub fn with_step(step: i64) -> Self {
        Self { step }
    }
}

impl Default for IncrementUnit {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkUnit for IncrementUnit {
    async fn execute(&self, _task: &TaskDescriptor) -> Result<i64, UnitError> {
        Ok(self.step)
    }
}

/// Adapts a plain closure into a unit
pub struct FnUnit<F> {
    f: F,
}

impl<F> FnUnit<F>
where
    F: Fn(&TaskDescriptor) -> Result<i64, UnitError> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> WorkUnit for FnUnit<F>
where
    F: Fn(&TaskDescriptor) -> Result<i64, UnitError> + Send + Sync,
{
    async fn execute(&self, task: &TaskDescriptor) -> Result<i64, UnitError> {
        (self.f)(task)
    }
}
