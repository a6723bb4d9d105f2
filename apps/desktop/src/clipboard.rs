use anyhow::Result;
use arboard::Clipboard;
use async_trait::async_trait;
use client_core::ClipboardSink;

/// System clipboard. arboard is blocking, so each write runs on the
/// blocking pool.
pub struct ArboardClipboard;

#[async_trait]
impl ClipboardSink for ArboardClipboard {
    async fn write_text(&self, text: &str) -> Result<()> {
        let text = text.to_string();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut clipboard = Clipboard::new()?;
            clipboard.set_text(text)?;
            Ok(())
        })
        .await?
    }
}
