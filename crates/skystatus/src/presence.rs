//! Slack のプロフィールステータスを更新する。

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use crate::classify::Status;
use crate::config::PresenceConfig;
use crate::version::user_agent;

#[derive(Error, Debug)]
pub enum PresenceError {
    #[error("Presence request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// プレゼンス API の応答。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceResponse {
    pub code: u16,
    pub body: String,
}

impl PresenceResponse {
    pub fn is_success(&self) -> bool {
        self.code == 200
    }
}

#[async_trait]
pub trait PresenceApi: Send + Sync {
    /// ステータスを設定する。HTTP ステータスに関わらず応答をそのまま返す。
    async fn set_status(&self, token: &str, status: &Status)
    -> Result<PresenceResponse, PresenceError>;
}

#[derive(Serialize)]
struct ProfileSetRequest<'a> {
    profile: Profile<'a>,
}

#[derive(Serialize)]
struct Profile<'a> {
    status_text: &'a str,
    status_emoji: &'a str,
    /// 0 は期限なし
    status_expiration: i64,
}

/// Slack Web API (`users.profile.set`) のクライアント。
pub struct SlackClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl SlackClient {
    pub fn new(config: &PresenceConfig) -> reqwest::Result<Self> {
        Self::with_timeout(&config.base_url, config.timeout)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> reqwest::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent())
            .build()?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl PresenceApi for SlackClient {
    async fn set_status(
        &self,
        token: &str,
        status: &Status,
    ) -> Result<PresenceResponse, PresenceError> {
        let request = ProfileSetRequest {
            profile: Profile {
                status_text: &status.text,
                status_emoji: &status.emoji,
                status_expiration: 0,
            },
        };

        let response = self
            .http_client
            .post(format!("{}/users.profile.set", self.base_url))
            .bearer_auth(token)
            .json(&request)
            .send()
            .await?;

        let code = response.status().as_u16();
        let body = response.text().await?;

        // Slack はエラーでも 200 を返すことがあるので、本文の ok も記録しておく
        if code == 200 {
            let ok = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| v.get("ok").and_then(serde_json::Value::as_bool));
            if ok == Some(false) {
                warn!(body = %body, "Slack accepted the request but reported an error");
            }
        }

        Ok(PresenceResponse { code, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_shape() {
        let status = Status::new(":sunny:", "Clear");
        let request = ProfileSetRequest {
            profile: Profile {
                status_text: &status.text,
                status_emoji: &status.emoji,
                status_expiration: 0,
            },
        };

        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            serde_json::json!({
                "profile": {
                    "status_text": "Clear",
                    "status_emoji": ":sunny:",
                    "status_expiration": 0
                }
            })
        );
    }

    #[test]
    fn only_200_is_success() {
        let response = |code| PresenceResponse {
            code,
            body: String::new(),
        };
        assert!(response(200).is_success());
        assert!(!response(201).is_success());
        assert!(!response(429).is_success());
        assert!(!response(500).is_success());
    }
}
