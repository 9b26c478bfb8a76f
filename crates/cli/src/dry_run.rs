use async_trait::async_trait;
use fieldmemo_pipeline::{Executor, Result};
use fieldmemo_protocol::{FieldDescriptor, ResolvedValue};

/// Logs every fill instead of touching a live form.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunExecutor;

#[async_trait]
impl Executor for DryRunExecutor {
    async fn fill(&self, field: &FieldDescriptor, value: &ResolvedValue) -> Result<()> {
        log::info!(
            "fill {} <- {} ({}, {:.2})",
            field.selector,
            value.value,
            value.source.as_str(),
            value.confidence
        );
        Ok(())
    }
}
