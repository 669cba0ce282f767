//! updater と scheduler のテストで共有するテスト用の実装。

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::classify::Status;
use crate::presence::{PresenceApi, PresenceError, PresenceResponse};
use crate::weather::{HourlyForecast, ObservationFetchError, WeatherSource};

pub const TOKEN_PARAMETER: &str = "/skystatus/slack-token";
pub const LAST_HASH_PARAMETER: &str = "/skystatus/last-status-hash";

/// 毎回同じ予報を返す。`None` なら取得失敗として扱う。
pub struct StaticWeather(pub Option<HourlyForecast>);

#[async_trait]
impl WeatherSource for StaticWeather {
    async fn hourly_forecast(&self) -> Result<HourlyForecast, ObservationFetchError> {
        self.0.clone().ok_or(ObservationFetchError::EmptySeries)
    }
}

/// 呼び出しを記録し、固定のステータスコードで応答するプレゼンス API。
pub struct RecordingPresence {
    code: u16,
    calls: Mutex<Vec<(String, Status)>>,
}

impl RecordingPresence {
    pub fn new(code: u16) -> Arc<Self> {
        Arc::new(Self {
            code,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<(String, Status)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PresenceApi for RecordingPresence {
    async fn set_status(
        &self,
        token: &str,
        status: &Status,
    ) -> Result<PresenceResponse, PresenceError> {
        self.calls
            .lock()
            .unwrap()
            .push((token.to_string(), status.clone()));
        Ok(PresenceResponse {
            code: self.code,
            body: format!(r#"{{"code":{}}}"#, self.code),
        })
    }
}

/// 2 時間分の予報。07:00 は晴れ、08:00 は指定した値になる。
pub fn forecast(precipitation: f64, snowfall: f64, cloudcover: f64) -> HourlyForecast {
    HourlyForecast {
        time: vec!["2025-09-13T07:00".to_string(), "2025-09-13T08:00".to_string()],
        precipitation: vec![Some(0.0), Some(precipitation)],
        snowfall: vec![Some(0.0), Some(snowfall)],
        cloudcover: vec![Some(0.0), Some(cloudcover)],
        weathercode: vec![Some(0.0), Some(3.0)],
    }
}
