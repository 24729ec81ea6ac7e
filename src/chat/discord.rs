use super::{Attachment, Channel, ChatError, ChatPlatform};
use crate::constants::{
    APP_NAME, APP_VERSION, DISCORD_API_BASE, HTTP_TIMEOUT_SECONDS, READY_POLL_INTERVAL_MS,
};
use reqwest::{multipart, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
struct CurrentUser {
    username: String,
    #[serde(default)]
    discriminator: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChannelResponse {
    name: Option<String>,
}

/// Discord over its REST API, authenticated as a bot.
pub struct DiscordPlatform {
    token: String,
    api_base: String,
    client: Option<reqwest::Client>,
}

impl DiscordPlatform {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            api_base: DISCORD_API_BASE.to_string(),
            client: None,
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn client(&self) -> Result<&reqwest::Client, ChatError> {
        self.client.as_ref().ok_or(ChatError::NotConnected)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    fn auth_header(&self) -> String {
        format!("Bot {}", self.token)
    }

    async fn error_from(response: reqwest::Response) -> ChatError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        ChatError::Api { status, body }
    }
}

#[async_trait::async_trait]
impl ChatPlatform for DiscordPlatform {
    async fn connect(&mut self) -> Result<(), ChatError> {
        let client = reqwest::Client::builder()
            .user_agent(format!("DiscordBot ({}, {})", APP_NAME, APP_VERSION))
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECONDS))
            .build()?;
        self.client = Some(client);
        debug!("Discord HTTP client created");
        Ok(())
    }

    async fn wait_until_ready(&self) -> Result<(), ChatError> {
        let client = self.client()?;
        let url = self.url("/users/@me");

        loop {
            match client
                .get(&url)
                .header("Authorization", self.auth_header())
                .send()
                .await
            {
                Ok(response) if response.status().is_success() => {
                    let user: CurrentUser = response.json().await?;
                    match user.discriminator.as_deref() {
                        Some(tag) if tag != "0" => {
                            info!("Logged in as {}#{}", user.username, tag)
                        }
                        _ => info!("Logged in as {}", user.username),
                    }
                    return Ok(());
                }
                Ok(response) if response.status() == StatusCode::UNAUTHORIZED => {
                    let body = response.text().await.unwrap_or_default();
                    return Err(ChatError::Unauthorized(body));
                }
                Ok(response) => {
                    warn!("Discord not ready yet: {}", response.status());
                }
                Err(e) => {
                    warn!("Discord not reachable yet: {}", e);
                }
            }

            tokio::time::sleep(Duration::from_millis(READY_POLL_INTERVAL_MS)).await;
        }
    }

    async fn resolve_channel(&self, id: u64) -> Result<Option<Channel>, ChatError> {
        let response = self
            .client()?
            .get(self.url(&format!("/channels/{}", id)))
            .header("Authorization", self.auth_header())
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => {
                let channel: ChannelResponse = response.json().await?;
                Ok(Some(Channel {
                    id,
                    name: channel.name,
                }))
            }
            StatusCode::NOT_FOUND | StatusCode::FORBIDDEN => Ok(None),
            _ => Err(Self::error_from(response).await),
        }
    }

    async fn send(
        &self,
        channel: &Channel,
        content: &str,
        attachment: Option<Attachment>,
    ) -> Result<(), ChatError> {
        let url = self.url(&format!("/channels/{}/messages", channel.id));
        let request = self
            .client()?
            .post(&url)
            .header("Authorization", self.auth_header());

        let request = match attachment {
            Some(attachment) => {
                let payload = message_payload(content, Some(&attachment.file_name));
                let size = attachment.bytes.len();
                let part = multipart::Part::bytes(attachment.bytes)
                    .file_name(attachment.file_name.clone());
                let form = multipart::Form::new()
                    .text("payload_json", payload.to_string())
                    .part("files[0]", part);
                debug!("Uploading {} ({} bytes)", attachment.file_name, size);
                request.multipart(form)
            }
            None => request.json(&message_payload(content, None)),
        };

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ChatError> {
        if self.client.take().is_some() {
            info!("Discord session closed");
        }
        Ok(())
    }
}

fn message_payload(content: &str, file_name: Option<&str>) -> serde_json::Value {
    match file_name {
        Some(file_name) => json!({
            "content": content,
            "attachments": [{ "id": 0, "filename": file_name }],
        }),
        None => json!({ "content": content }),
    }
}
