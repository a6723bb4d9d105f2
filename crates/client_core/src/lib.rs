use anyhow::{anyhow, Result};
use async_trait::async_trait;

pub mod config;
pub mod error;
pub mod gateway;
pub mod tabs;
pub mod timer;
mod workspace;

pub use config::{load_client_config, load_client_config_from, ClientConfig};
pub use error::{GatewayError, WorkspaceError};
pub use gateway::{DocumentGateway, GatewayConfig, HttpGateway, MissingDocumentGateway};
pub use timer::ElapsedTimer;
pub use workspace::{
    Workflow, Workspace, WorkspaceConfig, WorkspaceEvent, WorkspaceSnapshot,
    COPY_FEEDBACK_DURATION,
};

/// Yes/no question asked before a destructive action, such as discarding an
/// existing evaluation.
#[async_trait]
pub trait ConfirmationPrompt: Send + Sync {
    async fn confirm(&self, message: &str) -> bool;
}

/// Declines every confirmation.
pub struct DeclineAll;

#[async_trait]
impl ConfirmationPrompt for DeclineAll {
    async fn confirm(&self, _message: &str) -> bool {
        false
    }
}

/// Accepts every confirmation. Used by non-interactive front-ends.
pub struct AcceptAll;

#[async_trait]
impl ConfirmationPrompt for AcceptAll {
    async fn confirm(&self, _message: &str) -> bool {
        true
    }
}

#[async_trait]
pub trait ClipboardSink: Send + Sync {
    async fn write_text(&self, text: &str) -> Result<()>;
}

pub struct MissingClipboard;

#[async_trait]
impl ClipboardSink for MissingClipboard {
    async fn write_text(&self, _text: &str) -> Result<()> {
        Err(anyhow!("clipboard is unavailable"))
    }
}
