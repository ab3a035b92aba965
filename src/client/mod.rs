//! Model-invocation clients.
//!
//! Everything that talks to a remote model goes through [`ModelClient`]:
//! a single `complete` call that takes a prompt and returns text plus token
//! counts. [`AnthropicClient`] is the production implementation;
//! [`RetryingModelClient`] wraps any client with the shared retry executor.
//!
//! Errors are classified by [`TalkWalkError::kind()`](crate::TalkWalkError::kind):
//! clients only need to pick the right variant.

mod anthropic;
mod retry;

use async_trait::async_trait;

use crate::Result;
use crate::types::{Completion, CompletionRequest};

pub use anthropic::AnthropicClient;
pub use retry::RetryingModelClient;

/// Remote text completion.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Client name for logging/debugging.
    fn name(&self) -> &str;

    /// Run one completion.
    ///
    /// Implementations must not emit more than `request.max_tokens` output
    /// tokens and must report the tokens actually consumed.
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion>;
}
