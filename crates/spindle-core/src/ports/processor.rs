//! TextProcessor port - the external processing function.
//!
//! From the engine's point of view this is one long-running call. It may be
//! internally concurrent; the engine never preempts it.

use async_trait::async_trait;

use crate::domain::{ProcessingError, TaskOptions, TaskPayload};

#[async_trait]
pub trait TextProcessor: Send + Sync {
    /// Run the analysis. The error's `FailureKind` decides retry vs dead-letter.
    async fn process(
        &self,
        payload: &TaskPayload,
        options: &TaskOptions,
    ) -> Result<serde_json::Value, ProcessingError>;
}
