/*!
The outside world: where chat comes from and where replies are shown.
*/

pub mod compositor;
pub mod console;

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::{model::ChatMessage, Result};

pub use compositor::{Compositor, CompositorConfig, LogCompositor, TextFileCompositor};
pub use console::ConsoleChat;

/// A live chat to read viewer messages from.
#[async_trait]
pub trait ChatSource: Send {
    fn platform(&self) -> &str;

    async fn connect(&mut self) -> Result<()>;

    /// The next message, `None` once the chat has ended.
    async fn next_message(&mut self) -> Result<Option<ChatMessage>>;

    async fn disconnect(&mut self) {}
}

/// How often and how patiently a dropped chat is reconnected.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Multiplied by the attempt number.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(1),
        }
    }
}

/// A background task pumping a [ChatSource] into a bounded channel.
#[derive(Debug)]
pub struct ChatFeed {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl ChatFeed {
    pub fn spawn(
        source: Box<dyn ChatSource>,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<ChatMessage>) {
        Self::spawn_with_retry(source, capacity, RetryPolicy::default())
    }

    pub fn spawn_with_retry(
        source: Box<dyn ChatSource>,
        capacity: usize,
        retry: RetryPolicy,
    ) -> (Self, mpsc::Receiver<ChatMessage>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(pump(source, tx, cancel.clone(), retry));

        (Self { cancel, handle }, rx)
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Disconnect the source and wait for the task to end.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            error!("Chat feed task failed: {e}");
        }
    }
}

async fn pump(
    mut source: Box<dyn ChatSource>,
    tx: mpsc::Sender<ChatMessage>,
    cancel: CancellationToken,
    retry: RetryPolicy,
) {
    let mut failures = 0;

    loop {
        let connected = match source.connect().await {
            Ok(()) => true,
            Err(e) => {
                warn!("Unable to connect to {} chat: {e}", source.platform());
                false
            }
        };

        if connected {
            info!("Connected to {} chat", source.platform());

            loop {
                let message = tokio::select! {
                    _ = cancel.cancelled() => {
                        source.disconnect().await;
                        return;
                    }
                    v = source.next_message() => v.map_err(|e| e.to_string()),
                };

                let message = match message {
                    Ok(Some(v)) => v,
                    Ok(None) => {
                        info!("{} chat ended", source.platform());
                        source.disconnect().await;
                        return;
                    }
                    Err(e) => {
                        warn!("Lost {} chat: {e}", source.platform());
                        break;
                    }
                };

                failures = 0;
                tokio::select! {
                    _ = cancel.cancelled() => {
                        source.disconnect().await;
                        return;
                    }
                    v = tx.send(message) => if v.is_err() {
                        debug!("Chat receiver dropped");
                        source.disconnect().await;
                        return;
                    }
                }
            }

            source.disconnect().await;
        }

        failures += 1;
        if failures > retry.max_attempts {
            error!("Giving up on {} chat after {failures} attempts", source.platform());
            return;
        }

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(retry.delay * failures) => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamInfo {
    pub platform: String,
    pub video_id: Option<String>,
    pub obs_connected: bool,
}

/// Pushes replies to the compositor and tracks whether it is reachable.
pub struct StreamHandler {
    platform: String,
    video_id: Option<String>,
    compositor: Box<dyn Compositor>,
    connected: bool,
}

impl std::fmt::Debug for StreamHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHandler")
            .field("platform", &self.platform)
            .field("video_id", &self.video_id)
            .field("connected", &self.connected)
            .finish_non_exhaustive()
    }
}

impl StreamHandler {
    pub fn new(
        platform: impl Into<String>,
        video_id: Option<String>,
        compositor: Box<dyn Compositor>,
    ) -> Self {
        Self {
            platform: platform.into(),
            video_id,
            compositor,
            connected: false,
        }
    }

    pub async fn connect(&mut self) {
        match self.compositor.connect().await {
            Ok(()) => {
                debug!("Compositor connected");
                self.connected = true;
            }
            Err(e) => {
                warn!("Unable to connect to the compositor: {e}");
                self.connected = false;
            }
        }
    }

    pub async fn disconnect(&mut self) {
        if self.connected {
            self.compositor.disconnect().await;
            self.connected = false;
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Show `text` on stream. Failures are logged, never returned.
    pub async fn send(&mut self, text: &str) {
        if !self.connected {
            debug!("Compositor not connected, dropping message");
            return;
        }

        if let Err(e) = self.compositor.send(text).await {
            warn!("Unable to update the compositor: {e}");
        }
    }

    pub fn stream_info(&self) -> StreamInfo {
        StreamInfo {
            platform: self.platform.clone(),
            video_id: self.video_id.clone(),
            obs_connected: self.connected,
        }
    }
}
