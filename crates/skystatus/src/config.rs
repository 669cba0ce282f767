use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use chrono::NaiveTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};

/// 起動時に一度だけ読み込み、以降は各コンポーネントに参照で渡す設定。
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// true の場合はプレゼンス API を呼ばず、フィンガープリントの記録だけ行う
    #[serde(default)]
    pub dry_run: bool,
    pub location: LocationConfig,
    #[serde(default)]
    pub weather: WeatherConfig,
    #[serde(default)]
    pub presence: PresenceConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub labels: StatusLabels,
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LocationConfig {
    pub latitude: f64,
    pub longitude: f64,
    #[serde_as(as = "DisplayFromStr")]
    #[serde(default = "default_timezone")]
    pub timezone: Tz,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            latitude: 37.5665,
            longitude: 126.978,
            timezone: default_timezone(),
        }
    }
}

fn default_timezone() -> Tz {
    chrono_tz::Asia::Seoul
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WeatherConfig {
    #[serde(default = "default_weather_base_url")]
    pub base_url: String,
    #[serde(with = "humantime_serde", default = "default_timeout")]
    pub timeout: Duration,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            base_url: default_weather_base_url(),
            timeout: default_timeout(),
        }
    }
}

fn default_weather_base_url() -> String {
    "https://api.open-meteo.com".to_string()
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PresenceConfig {
    #[serde(default = "default_presence_base_url")]
    pub base_url: String,
    #[serde(with = "humantime_serde", default = "default_timeout")]
    pub timeout: Duration,
    /// API トークンを保持するパラメータ名
    #[serde(default = "default_token_parameter")]
    pub token_parameter: String,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            base_url: default_presence_base_url(),
            timeout: default_timeout(),
            token_parameter: default_token_parameter(),
        }
    }
}

fn default_presence_base_url() -> String {
    "https://slack.com/api".to_string()
}

fn default_token_parameter() -> String {
    "/skystatus/slack-token".to_string()
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
    /// 最後に反映したステータスのフィンガープリントを保持するパラメータ名
    #[serde(default = "default_last_hash_parameter")]
    pub last_hash_parameter: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            last_hash_parameter: default_last_hash_parameter(),
        }
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("parameters.json")
}

fn default_last_hash_parameter() -> String {
    "/skystatus/last-status-hash".to_string()
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ScheduleConfig {
    /// 毎日その日の予定を立てるローカル時刻 (日の出より前にする)
    #[serde_as(as = "DisplayFromStr")]
    #[serde(default = "default_plan_time")]
    pub plan_time: NaiveTime,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            plan_time: default_plan_time(),
        }
    }
}

fn default_plan_time() -> NaiveTime {
    NaiveTime::from_hms_opt(4, 0, 0).unwrap_or(NaiveTime::MIN)
}

fn default_timeout() -> Duration {
    Duration::from_secs(8)
}

/// ステータスとして表示する文言。絵文字は固定で、文言だけ差し替えられる。
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct StatusLabels {
    pub snow: String,
    pub rain: String,
    pub overcast: String,
    pub mostly_cloudy: String,
    pub slightly_cloudy: String,
    pub clear_night: String,
    pub clear: String,
}

impl Default for StatusLabels {
    fn default() -> Self {
        Self {
            snow: "Snow".to_string(),
            rain: "Rain".to_string(),
            overcast: "Overcast".to_string(),
            mostly_cloudy: "Mostly cloudy".to_string(),
            slightly_cloudy: "Slightly cloudy".to_string(),
            clear_night: "Clear night".to_string(),
            clear: "Clear".to_string(),
        }
    }
}

impl Config {
    /// 値の範囲やパラメータ名の妥当性を確認する。
    pub fn validate(&self) -> Result<()> {
        let location = &self.location;
        ensure!(
            (-90.0..=90.0).contains(&location.latitude),
            "latitude out of range: {}",
            location.latitude
        );
        ensure!(
            (-180.0..=180.0).contains(&location.longitude),
            "longitude out of range: {}",
            location.longitude
        );
        ensure!(
            !self.presence.token_parameter.trim().is_empty(),
            "presence.token_parameter must not be empty"
        );
        ensure!(
            !self.store.last_hash_parameter.trim().is_empty(),
            "store.last_hash_parameter must not be empty"
        );
        Ok(())
    }
}

pub fn open_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = fs::read_to_string(path.as_ref()).context("Failed to read configuration file")?;
    let config: Config = toml::from_str(&content).context("Failed to parse configuration file")?;
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

pub fn write_default_config<P: AsRef<Path>>(path: P) -> Result<()> {
    let content =
        toml::to_string_pretty(&Config::default()).context("Failed to serialize configuration")?;
    fs::write(path.as_ref(), content).context("Failed to write configuration file")?;
    Ok(())
}
