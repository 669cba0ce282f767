//! Open-Meteo から毎時の気象データを取得し、対象時刻の観測値を取り出す。

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, TimeDelta};
use chrono_tz::Tz;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::config::{LocationConfig, WeatherConfig};
use crate::version::user_agent;

const HOURLY_VARIABLES: &str = "precipitation,snowfall,cloudcover,weathercode";
const HOUR_FORMAT: &str = "%Y-%m-%dT%H:00";
const SERIES_FORMAT: &str = "%Y-%m-%dT%H:%M";

#[derive(Error, Debug)]
pub enum ObservationFetchError {
    #[error("Weather request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Hourly series is empty")]
    EmptySeries,
    #[error("Invalid timestamp in hourly series: {0}")]
    InvalidTimestamp(String),
}

/// 対象時刻に最も近い 1 時間分の観測値。
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Observation {
    pub precipitation: f64,
    pub snowfall: f64,
    pub cloudcover: f64,
    /// 判定には使わない。整数以外が返っても読めるよう f64 で持つ
    pub weathercode: Option<f64>,
}

/// Open-Meteo の `hourly` ブロック。時刻は要求したタイムゾーンのローカル時刻 (オフセットなし)。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HourlyForecast {
    pub time: Vec<String>,
    #[serde(default)]
    pub precipitation: Vec<Option<f64>>,
    #[serde(default)]
    pub snowfall: Vec<Option<f64>>,
    #[serde(default)]
    pub cloudcover: Vec<Option<f64>>,
    #[serde(default)]
    pub weathercode: Vec<Option<f64>>,
}

impl HourlyForecast {
    /// 対象時刻に対応する観測値を返す。欠損している値は 0 として扱う。
    pub fn observation_at(
        &self,
        target: &DateTime<Tz>,
    ) -> Result<Observation, ObservationFetchError> {
        let index = nearest_index(&self.time, target)?;
        debug!(index, time = %self.time[index], "Selected hourly observation");

        let value = |series: &[Option<f64>]| series.get(index).copied().flatten().unwrap_or(0.0);
        Ok(Observation {
            precipitation: value(&self.precipitation),
            snowfall: value(&self.snowfall),
            cloudcover: value(&self.cloudcover),
            weathercode: self.weathercode.get(index).copied().flatten(),
        })
    }
}

/// 時系列の中から対象時刻に対応するインデックスを探す。
///
/// 対象時刻を時単位に切り捨てた文字列と完全一致するものがあればそれを返す。
/// なければ時系列をローカル時刻として解釈し、差の絶対値が最小のものを返す
/// (同差の場合は先頭側)。
pub fn nearest_index(
    times: &[String],
    target: &DateTime<Tz>,
) -> Result<usize, ObservationFetchError> {
    if times.is_empty() {
        return Err(ObservationFetchError::EmptySeries);
    }

    let hour_key = target.format(HOUR_FORMAT).to_string();
    if let Some(index) = times.iter().position(|t| *t == hour_key) {
        return Ok(index);
    }

    let target = target.naive_local();
    let mut best: Option<(usize, TimeDelta)> = None;
    for (index, time) in times.iter().enumerate() {
        let hour = NaiveDateTime::parse_from_str(time, SERIES_FORMAT)
            .map_err(|_| ObservationFetchError::InvalidTimestamp(time.clone()))?;
        let diff = (hour - target).abs();
        if best.is_none_or(|(_, best_diff)| diff < best_diff) {
            best = Some((index, diff));
        }
    }

    best.map(|(index, _)| index)
        .ok_or(ObservationFetchError::EmptySeries)
}

/// 観測データの取得元。
#[async_trait]
pub trait WeatherSource: Send + Sync {
    async fn hourly_forecast(&self) -> Result<HourlyForecast, ObservationFetchError>;
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    hourly: HourlyForecast,
}

/// Open-Meteo の `daily` ブロック (日の出・日の入り)。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DailySun {
    #[serde(default)]
    pub time: Vec<String>,
    pub sunrise: Vec<String>,
    pub sunset: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct DailyResponse {
    daily: DailySun,
}

/// Open-Meteo Forecast API のクライアント。
pub struct OpenMeteoClient {
    http_client: reqwest::Client,
    base_url: String,
    latitude: f64,
    longitude: f64,
    timezone: Tz,
}

impl OpenMeteoClient {
    pub fn new(weather: &WeatherConfig, location: &LocationConfig) -> reqwest::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(weather.timeout)
            .user_agent(user_agent())
            .build()?;

        Ok(Self {
            http_client,
            base_url: weather.base_url.trim_end_matches('/').to_string(),
            latitude: location.latitude,
            longitude: location.longitude,
            timezone: location.timezone,
        })
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    fn forecast_request(&self) -> reqwest::RequestBuilder {
        self.http_client
            .get(format!("{}/v1/forecast", self.base_url))
            .query(&[
                ("latitude", self.latitude.to_string()),
                ("longitude", self.longitude.to_string()),
                ("timezone", self.timezone.name().to_string()),
            ])
    }

    /// 今日の日の出・日の入り時刻を取得する。
    pub async fn daily_sun(&self) -> reqwest::Result<DailySun> {
        let response: DailyResponse = self
            .forecast_request()
            .query(&[("daily", "sunrise,sunset"), ("forecast_days", "1")])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.daily)
    }
}

#[async_trait]
impl WeatherSource for OpenMeteoClient {
    async fn hourly_forecast(&self) -> Result<HourlyForecast, ObservationFetchError> {
        let response: ForecastResponse = self
            .forecast_request()
            .query(&[("hourly", HOURLY_VARIABLES)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        debug!(
            hours = response.hourly.time.len(),
            first = ?response.hourly.time.first(),
            "Fetched hourly forecast"
        );
        Ok(response.hourly)
    }
}
