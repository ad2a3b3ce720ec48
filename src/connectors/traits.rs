use crate::types::Tick;
use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Anything that can push live ticks for one instrument into a channel.
#[async_trait]
pub trait TickSource: Send + Sync {
    fn symbol(&self) -> &str;

    /// Starts producing ticks in the background. Production stops once the
    /// receiving side of `sender` is dropped.
    async fn subscribe_ticks(&mut self, sender: mpsc::Sender<Tick>) -> Result<()>;
}
