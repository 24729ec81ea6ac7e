use std::time::Duration;
use thiserror::Error;

pub mod discord;

pub use discord::DiscordPlatform;

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Not connected")]
    NotConnected,
    #[error("Authentication rejected: {0}")]
    Unauthorized(String),
    #[error("Timed out after {0:?} waiting for the chat session to become ready")]
    ReadyTimeout(Duration),
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Unexpected response ({status}): {body}")]
    Api { status: u16, body: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub id: u64,
    pub name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Attachment {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// A chat service that can receive a message with an optional file.
#[async_trait::async_trait]
pub trait ChatPlatform: Send + Sync {
    async fn connect(&mut self) -> Result<(), ChatError>;

    /// Resolves once the platform can serve requests. May wait indefinitely;
    /// callers bound it with a timeout.
    async fn wait_until_ready(&self) -> Result<(), ChatError>;

    async fn resolve_channel(&self, id: u64) -> Result<Option<Channel>, ChatError>;

    async fn send(
        &self,
        channel: &Channel,
        content: &str,
        attachment: Option<Attachment>,
    ) -> Result<(), ChatError>;

    async fn close(&mut self) -> Result<(), ChatError>;
}

/// A connected, ready chat session. Dropping it without calling
/// [`ChatSession::close`] skips the orderly shutdown.
pub struct ChatSession<P: ChatPlatform> {
    platform: P,
}

impl<P: ChatPlatform> ChatSession<P> {
    pub async fn open(mut platform: P, ready_timeout: Duration) -> Result<Self, ChatError> {
        platform.connect().await?;

        let ready = tokio::time::timeout(ready_timeout, platform.wait_until_ready()).await;
        let failure = match ready {
            Ok(Ok(())) => return Ok(Self { platform }),
            Ok(Err(e)) => e,
            Err(_) => ChatError::ReadyTimeout(ready_timeout),
        };

        if let Err(e) = platform.close().await {
            tracing::warn!("Failed to close chat session: {}", e);
        }
        Err(failure)
    }

    pub async fn resolve_channel(&self, id: u64) -> Result<Option<Channel>, ChatError> {
        self.platform.resolve_channel(id).await
    }

    pub async fn send(
        &self,
        channel: &Channel,
        content: &str,
        attachment: Option<Attachment>,
    ) -> Result<(), ChatError> {
        self.platform.send(channel, content, attachment).await
    }

    pub async fn close(mut self) -> Result<(), ChatError> {
        self.platform.close().await
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone)]
    pub struct SentMessage {
        pub channel_id: u64,
        pub content: String,
        pub attachment: Option<(String, usize)>,
    }

    /// In-memory platform that records what it was asked to do.
    #[derive(Clone, Default)]
    pub struct FakePlatform {
        pub channels: Vec<u64>,
        pub never_ready: bool,
        pub fail_attachments: bool,
        pub sent: Arc<Mutex<Vec<SentMessage>>>,
        pub events: Arc<Mutex<Vec<&'static str>>>,
    }

    impl FakePlatform {
        pub fn with_channel(id: u64) -> Self {
            Self {
                channels: vec![id],
                ..Self::default()
            }
        }

        pub fn sent(&self) -> Vec<SentMessage> {
            self.sent.lock().unwrap().clone()
        }

        pub fn events(&self) -> Vec<&'static str> {
            self.events.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl ChatPlatform for FakePlatform {
        async fn connect(&mut self) -> Result<(), ChatError> {
            self.events.lock().unwrap().push("connect");
            Ok(())
        }

        async fn wait_until_ready(&self) -> Result<(), ChatError> {
            if self.never_ready {
                std::future::pending::<()>().await;
            }
            self.events.lock().unwrap().push("ready");
            Ok(())
        }

        async fn resolve_channel(&self, id: u64) -> Result<Option<Channel>, ChatError> {
            Ok(self
                .channels
                .contains(&id)
                .then(|| Channel { id, name: None }))
        }

        async fn send(
            &self,
            channel: &Channel,
            content: &str,
            attachment: Option<Attachment>,
        ) -> Result<(), ChatError> {
            if self.fail_attachments && attachment.is_some() {
                return Err(ChatError::Api {
                    status: 413,
                    body: "Request entity too large".to_string(),
                });
            }
            self.sent.lock().unwrap().push(SentMessage {
                channel_id: channel.id,
                content: content.to_string(),
                attachment: attachment.map(|a| (a.file_name, a.bytes.len())),
            });
            Ok(())
        }

        async fn close(&mut self) -> Result<(), ChatError> {
            self.events.lock().unwrap().push("close");
            Ok(())
        }
    }
}
