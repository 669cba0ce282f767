//! 天気からステータスを決め、前回反映した内容と異なる場合だけプレゼンスを更新する。
//!
//! 反映済みかどうかはパラメータストアに保存したフィンガープリントだけで判断する。
//! 同時に複数の呼び出しが走った場合の排他は行わない (スケジューラは各トリガーを
//! 一度ずつしか起動しない前提)。

use std::sync::Arc;

use chrono::{DateTime, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::classify::{Status, classify};
use crate::config::{Config, StatusLabels};
use crate::fingerprint::Fingerprint;
use crate::mode::{Mode, resolve_mode};
use crate::presence::PresenceApi;
use crate::store::{ParameterStore, StoreError};
use crate::weather::{ObservationFetchError, WeatherSource};

#[derive(Error, Debug)]
pub enum UpdateError {
    #[error("Failed to fetch weather observations: {0}")]
    Observation(#[from] ObservationFetchError),
    #[error("Failed to read presence credential {name}: {source}")]
    Credential {
        name: String,
        #[source]
        source: StoreError,
    },
    #[error("Failed to record status fingerprint: {0}")]
    RecordFingerprint(#[source] StoreError),
}

/// 呼び出し時の入力。`trigger` は `mode` の別名。
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Invocation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<String>,
}

impl Invocation {
    pub fn with_mode(mode: impl Into<String>) -> Self {
        Self {
            mode: Some(mode.into()),
            trigger: None,
        }
    }
}

/// 1 回の呼び出しの結果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// 前回と同じステータスなので何もしなかった
    Skipped(Status),
    /// ドライランとしてフィンガープリントだけ記録した
    DryRun(Status),
    /// プレゼンスに反映した
    Applied(Status),
    /// プレゼンス API が失敗した。通信自体に失敗した場合 `code` は `None`
    Failed { code: Option<u16>, body: String },
}

impl Outcome {
    pub fn is_ok(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }

    pub fn output(&self) -> InvocationOutput {
        let mut output = InvocationOutput {
            ok: self.is_ok(),
            ..Default::default()
        };
        match self {
            Self::Skipped(status) | Self::DryRun(status) | Self::Applied(status) => {
                output.skipped = matches!(self, Self::Skipped(_));
                output.dry_run = matches!(self, Self::DryRun(_));
                output.emoji = Some(status.emoji.clone());
                output.text = Some(status.text.clone());
            }
            Self::Failed { code, body } => {
                output.code = *code;
                output.body = Some(body.clone());
            }
        }
        output
    }
}

/// 呼び出し元に返す JSON。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InvocationOutput {
    pub ok: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub skipped: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub dry_run: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

/// 設定のうち更新処理で使う部分。
#[derive(Debug, Clone, PartialEq)]
pub struct UpdaterSettings {
    pub timezone: Tz,
    pub dry_run: bool,
    pub token_parameter: String,
    pub last_hash_parameter: String,
    pub labels: StatusLabels,
}

impl UpdaterSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            timezone: config.location.timezone,
            dry_run: config.dry_run,
            token_parameter: config.presence.token_parameter.clone(),
            last_hash_parameter: config.store.last_hash_parameter.clone(),
            labels: config.labels.clone(),
        }
    }
}

pub struct StatusUpdater {
    weather: Arc<dyn WeatherSource>,
    presence: Arc<dyn PresenceApi>,
    store: Arc<dyn ParameterStore>,
    settings: UpdaterSettings,
}

impl StatusUpdater {
    pub fn new(
        weather: Arc<dyn WeatherSource>,
        presence: Arc<dyn PresenceApi>,
        store: Arc<dyn ParameterStore>,
        settings: UpdaterSettings,
    ) -> Self {
        Self {
            weather,
            presence,
            store,
            settings,
        }
    }

    pub fn settings(&self) -> &UpdaterSettings {
        &self.settings
    }

    /// 現在時刻で呼び出しを処理する。
    pub async fn invoke(&self, invocation: &Invocation) -> Result<Outcome, UpdateError> {
        let now = Utc::now().with_timezone(&self.settings.timezone);
        self.invoke_at(invocation, now).await
    }

    /// 指定したローカル時刻で呼び出しを処理する。
    pub async fn invoke_at(
        &self,
        invocation: &Invocation,
        now: DateTime<Tz>,
    ) -> Result<Outcome, UpdateError> {
        let mode = resolve_mode(
            invocation.mode.as_deref(),
            invocation.trigger.as_deref(),
            &now,
        );

        let status = self.decide(&mode, &now).await?;
        info!(mode = %mode, emoji = %status.emoji, text = %status.text, "Decided status");

        let fingerprint = Fingerprint::of(&status);
        if fingerprint.matches(&self.last_fingerprint()) {
            info!(emoji = %status.emoji, text = %status.text, "Status unchanged, skipping");
            return Ok(Outcome::Skipped(status));
        }

        if self.settings.dry_run {
            self.record(&fingerprint)?;
            info!(emoji = %status.emoji, text = %status.text, "Dry run, status recorded");
            return Ok(Outcome::DryRun(status));
        }

        self.apply(status, &fingerprint).await
    }

    /// 天気を取得してステータスを決める。
    pub async fn decide(
        &self,
        mode: &Mode,
        now: &DateTime<Tz>,
    ) -> Result<Status, ObservationFetchError> {
        let forecast = self.weather.hourly_forecast().await?;
        let observation = forecast.observation_at(now)?;
        debug!(?observation, "Observation for current hour");

        let condition = classify(&observation, mode, now.hour());
        Ok(condition.status(&self.settings.labels))
    }

    /// 保存済みのフィンガープリント。読めなければ空文字列。
    fn last_fingerprint(&self) -> String {
        let name = &self.settings.last_hash_parameter;
        self.store.get(name, false).unwrap_or_else(|e| {
            match e {
                StoreError::NotFound(_) => {
                    debug!(parameter = %name, "No previous status recorded");
                }
                e => {
                    warn!(parameter = %name, error = %e, "Failed to read previous status");
                }
            }
            String::new()
        })
    }

    fn record(&self, fingerprint: &Fingerprint) -> Result<(), UpdateError> {
        self.store
            .put(&self.settings.last_hash_parameter, fingerprint.as_str())
            .map_err(UpdateError::RecordFingerprint)
    }

    async fn apply(
        &self,
        status: Status,
        fingerprint: &Fingerprint,
    ) -> Result<Outcome, UpdateError> {
        let name = &self.settings.token_parameter;
        let token = self
            .store
            .get(name, true)
            .map_err(|source| UpdateError::Credential {
                name: name.clone(),
                source,
            })?;

        let response = match self.presence.set_status(&token, &status).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Presence request failed");
                return Ok(Outcome::Failed {
                    code: None,
                    body: e.to_string(),
                });
            }
        };

        if !response.is_success() {
            warn!(code = response.code, body = %response.body, "Presence API rejected status");
            return Ok(Outcome::Failed {
                code: Some(response.code),
                body: response.body,
            });
        }

        self.record(fingerprint)?;
        info!(emoji = %status.emoji, text = %status.text, "Status applied");
        Ok(Outcome::Applied(status))
    }
}
