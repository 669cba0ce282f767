//! その日の日の出・正午・日の入りを求め、ステータス更新のトリガーを組み立てる。

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::mode::Mode;
use crate::updater::Invocation;
use crate::weather::{DailySun, OpenMeteoClient};

const SUN_FORMAT: &str = "%Y-%m-%dT%H:%M";

#[derive(Error, Debug)]
pub enum PlanError {
    #[error("Failed to fetch sunrise/sunset: {0}")]
    Fetch(#[from] reqwest::Error),
    #[error("Sunrise/sunset missing from response")]
    MissingDay,
    #[error("Invalid sunrise/sunset timestamp: {0}")]
    InvalidTimestamp(String),
    #[error("Local time {0} does not exist in {1}")]
    NonexistentLocalTime(NaiveDateTime, Tz),
}

/// その日の日の出・日の入り (ローカル時刻)。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SunTimes {
    pub sunrise: DateTime<Tz>,
    pub sunset: DateTime<Tz>,
}

impl SunTimes {
    /// Open-Meteo の daily ブロックの先頭日を、指定タイムゾーンのローカル時刻として解釈する。
    pub fn from_daily(daily: &DailySun, tz: Tz) -> Result<Self, PlanError> {
        let sunrise = daily.sunrise.first().ok_or(PlanError::MissingDay)?;
        let sunset = daily.sunset.first().ok_or(PlanError::MissingDay)?;
        Ok(Self {
            sunrise: parse_local(sunrise, tz)?,
            sunset: parse_local(sunset, tz)?,
        })
    }
}

fn parse_local(value: &str, tz: Tz) -> Result<DateTime<Tz>, PlanError> {
    let naive = NaiveDateTime::parse_from_str(value, SUN_FORMAT)
        .map_err(|_| PlanError::InvalidTimestamp(value.to_string()))?;
    localize(naive, tz)
}

/// ローカル時刻をタイムゾーン付きにする。夏時間で重複する時刻は早い方を採る。
fn localize(naive: NaiveDateTime, tz: Tz) -> Result<DateTime<Tz>, PlanError> {
    tz.from_local_datetime(&naive)
        .earliest()
        .ok_or(PlanError::NonexistentLocalTime(naive, tz))
}

/// 日の出・日の入りの取得元。
#[async_trait]
pub trait SunSource: Send + Sync {
    /// 今日の日の出・日の入りを返す。
    async fn sun_times(&self) -> Result<SunTimes, PlanError>;
}

#[async_trait]
impl SunSource for OpenMeteoClient {
    async fn sun_times(&self) -> Result<SunTimes, PlanError> {
        let daily = self.daily_sun().await?;
        debug!(
            sunrise = ?daily.sunrise.first(),
            sunset = ?daily.sunset.first(),
            "Fetched sun times"
        );
        SunTimes::from_daily(&daily, self.timezone())
    }
}

/// スケジューラに登録する一回限りのトリガー。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Trigger {
    /// `update-<mode>-YYYYMMDD`
    pub name: String,
    /// 分未満を切り捨てた UTC 時刻
    pub at: DateTime<Utc>,
    pub mode: Mode,
}

impl Trigger {
    fn new(mode: Mode, date: NaiveDate, at: DateTime<Tz>) -> Self {
        Self {
            name: format!("update-{}-{}", mode, date.format("%Y%m%d")),
            at: truncate_to_minute(at.with_timezone(&Utc)),
            mode,
        }
    }

    pub fn invocation(&self) -> Invocation {
        Invocation::with_mode(self.mode.as_str())
    }
}

fn truncate_to_minute(at: DateTime<Utc>) -> DateTime<Utc> {
    at.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(at)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// 今日 (UTC) のすでに過ぎた時刻
    PastTimeToday,
    /// 前日以前 (UTC)
    PastDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum TriggerDecision {
    Scheduled { trigger: Trigger },
    Skipped { trigger: Trigger, reason: SkipReason },
}

impl TriggerDecision {
    pub fn trigger(&self) -> &Trigger {
        match self {
            Self::Scheduled { trigger } | Self::Skipped { trigger, .. } => trigger,
        }
    }
}

/// 1 日分の予定。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyPlan {
    pub date: NaiveDate,
    pub sunrise: DateTime<Tz>,
    pub noon: DateTime<Tz>,
    pub sunset: DateTime<Tz>,
}

impl DailyPlan {
    pub fn build(date: NaiveDate, sun: &SunTimes, tz: Tz) -> Result<Self, PlanError> {
        let noon = localize(date.and_time(NaiveTime::MIN) + TimeDelta::hours(12), tz)?;
        Ok(Self {
            date,
            sunrise: sun.sunrise,
            noon,
            sunset: sun.sunset,
        })
    }

    /// sunrise / noon / sunset の順のトリガー。
    pub fn triggers(&self) -> [Trigger; 3] {
        [
            Trigger::new(Mode::Sunrise, self.date, self.sunrise),
            Trigger::new(Mode::Noon, self.date, self.noon),
            Trigger::new(Mode::Sunset, self.date, self.sunset),
        ]
    }

    /// 各トリガーを登録するか、過去の時刻として見送るかを決める。
    pub fn decide(&self, now: DateTime<Utc>) -> Vec<TriggerDecision> {
        let today = now.date_naive();
        self.triggers()
            .into_iter()
            .map(|trigger| {
                let day = trigger.at.date_naive();
                if day < today {
                    TriggerDecision::Skipped {
                        trigger,
                        reason: SkipReason::PastDate,
                    }
                } else if day == today && trigger.at < now {
                    TriggerDecision::Skipped {
                        trigger,
                        reason: SkipReason::PastTimeToday,
                    }
                } else {
                    TriggerDecision::Scheduled { trigger }
                }
            })
            .collect()
    }
}

/// 設定した地点の 1 日分の予定を作る。
pub struct Planner {
    sun: Arc<dyn SunSource>,
    timezone: Tz,
}

impl Planner {
    pub fn new(sun: Arc<dyn SunSource>, timezone: Tz) -> Self {
        Self { sun, timezone }
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub async fn plan(&self, now: DateTime<Utc>) -> Result<DailyPlan, PlanError> {
        let date = now.with_timezone(&self.timezone).date_naive();
        let sun = self.sun.sun_times().await?;
        DailyPlan::build(date, &sun, self.timezone)
    }
}
