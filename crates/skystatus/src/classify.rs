//! 観測値と時間帯モードからステータス (絵文字と文言) を決める。
//!
//! 判定は [`RULES`] を先頭から評価し、最初に当てはまった規則を採用する。
//! 規則の順序がそのまま優先順位になる。

use serde::Serialize;

use crate::config::StatusLabels;
use crate::mode::Mode;
use crate::weather::Observation;

/// 雲量がこの値以上なら曇り。
const OVERCAST_THRESHOLD: f64 = 80.0;
/// 雲量がこの値以上なら薄曇り。
const CLOUDY_THRESHOLD: f64 = 40.0;
/// この時刻以降、または [`NIGHT_END_HOUR`] より前は夜として扱う。
const NIGHT_START_HOUR: u32 = 18;
const NIGHT_END_HOUR: u32 = 6;

/// プレゼンスに反映するステータス。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Status {
    pub emoji: String,
    pub text: String,
}

impl Status {
    pub fn new(emoji: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            emoji: emoji.into(),
            text: text.into(),
        }
    }
}

/// 判定結果の天気区分。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Condition {
    Snow,
    Rain,
    Overcast,
    MostlyCloudy,
    SlightlyCloudy,
    ClearNight,
    Clear,
}

impl Condition {
    pub fn emoji(self) -> &'static str {
        match self {
            Self::Snow => ":snowflake:",
            Self::Rain => ":rain_cloud:",
            Self::Overcast => ":cloud:",
            Self::MostlyCloudy | Self::SlightlyCloudy => ":partly_sunny:",
            Self::ClearNight => ":crescent_moon:",
            Self::Clear => ":sunny:",
        }
    }

    pub fn label(self, labels: &StatusLabels) -> &str {
        match self {
            Self::Snow => &labels.snow,
            Self::Rain => &labels.rain,
            Self::Overcast => &labels.overcast,
            Self::MostlyCloudy => &labels.mostly_cloudy,
            Self::SlightlyCloudy => &labels.slightly_cloudy,
            Self::ClearNight => &labels.clear_night,
            Self::Clear => &labels.clear,
        }
    }

    pub fn status(self, labels: &StatusLabels) -> Status {
        Status::new(self.emoji(), self.label(labels))
    }
}

/// 規則の評価に使う入力。
pub struct Conditions<'a> {
    pub observation: &'a Observation,
    pub mode: &'a Mode,
    /// ローカル時刻の時 (0-23)
    pub hour: u32,
}

pub type Predicate = fn(&Conditions<'_>) -> bool;

fn snowing(c: &Conditions<'_>) -> bool {
    c.observation.snowfall > 0.0
}

fn raining(c: &Conditions<'_>) -> bool {
    c.observation.precipitation > 0.0
}

fn overcast(c: &Conditions<'_>) -> bool {
    c.observation.cloudcover >= OVERCAST_THRESHOLD
}

fn cloudy_at_night(c: &Conditions<'_>) -> bool {
    c.observation.cloudcover >= CLOUDY_THRESHOLD && c.mode.is_night_leaning()
}

fn cloudy(c: &Conditions<'_>) -> bool {
    c.observation.cloudcover >= CLOUDY_THRESHOLD
}

fn night(c: &Conditions<'_>) -> bool {
    c.mode.is_sunset() || c.hour >= NIGHT_START_HOUR || c.hour < NIGHT_END_HOUR
}

/// 優先順位順の判定規則。どれにも当てはまらなければ [`Condition::Clear`]。
pub const RULES: &[(Predicate, Condition)] = &[
    (snowing as Predicate, Condition::Snow),
    (raining as Predicate, Condition::Rain),
    (overcast as Predicate, Condition::Overcast),
    (cloudy_at_night as Predicate, Condition::MostlyCloudy),
    (cloudy as Predicate, Condition::SlightlyCloudy),
    (night as Predicate, Condition::ClearNight),
];

pub fn classify(observation: &Observation, mode: &Mode, hour: u32) -> Condition {
    let conditions = Conditions {
        observation,
        mode,
        hour,
    };

    RULES
        .iter()
        .find(|(matches, _)| matches(&conditions))
        .map_or(Condition::Clear, |(_, condition)| *condition)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_MODES: [Mode; 5] = [Mode::Dawn, Mode::Sunrise, Mode::Noon, Mode::Sunset, Mode::Night];

    fn observation(precipitation: f64, snowfall: f64, cloudcover: f64) -> Observation {
        Observation {
            precipitation,
            snowfall,
            cloudcover,
            weathercode: None,
        }
    }

    #[test]
    fn heavy_cloud_is_overcast_regardless_of_mode_and_hour() {
        for cover in 80..=100 {
            for mode in &ALL_MODES {
                for hour in 0..24 {
                    let obs = observation(0.0, 0.0, cover as f64);
                    assert_eq!(classify(&obs, mode, hour), Condition::Overcast);
                }
            }
        }
    }

    #[test]
    fn moderate_cloud_depends_on_sunset_mode() {
        for cover in 40..80 {
            let obs = observation(0.0, 0.0, cover as f64);
            assert_eq!(
                classify(&obs, &Mode::Sunset, 12),
                Condition::MostlyCloudy
            );
            for mode in [Mode::Dawn, Mode::Sunrise, Mode::Noon] {
                assert_eq!(classify(&obs, &mode, 12), Condition::SlightlyCloudy);
                assert_eq!(classify(&obs, &mode, 22), Condition::SlightlyCloudy);
            }
        }
    }

    #[test]
    fn night_mode_leans_mostly_cloudy() {
        let obs = observation(0.0, 0.0, 50.0);
        assert_eq!(classify(&obs, &Mode::Night, 12), Condition::MostlyCloudy);
    }

    #[test]
    fn snow_beats_rain_beats_cloud() {
        let obs = observation(5.0, 0.1, 100.0);
        assert_eq!(classify(&obs, &Mode::Noon, 12), Condition::Snow);

        let obs = observation(0.1, 0.0, 100.0);
        assert_eq!(classify(&obs, &Mode::Sunset, 21), Condition::Rain);
    }

    #[test]
    fn clear_sunset_is_clear_night_at_any_hour() {
        let obs = observation(0.0, 0.0, 10.0);
        for hour in 0..24 {
            assert_eq!(classify(&obs, &Mode::Sunset, hour), Condition::ClearNight);
        }
    }

    #[test]
    fn clear_sky_uses_hour_for_other_modes() {
        let obs = observation(0.0, 0.0, 39.9);
        assert_eq!(classify(&obs, &Mode::Sunrise, 5), Condition::ClearNight);
        assert_eq!(classify(&obs, &Mode::Sunrise, 6), Condition::Clear);
        assert_eq!(classify(&obs, &Mode::Noon, 17), Condition::Clear);
        assert_eq!(classify(&obs, &Mode::Noon, 18), Condition::ClearNight);
        // night モードは時刻で判定される
        assert_eq!(classify(&obs, &Mode::Night, 12), Condition::Clear);
    }

    #[test]
    fn unknown_mode_leans_day() {
        let mode = Mode::Other("twilight".to_string());
        assert_eq!(
            classify(&observation(0.0, 0.0, 60.0), &mode, 20),
            Condition::SlightlyCloudy
        );
        assert_eq!(
            classify(&observation(0.0, 0.0, 0.0), &mode, 10),
            Condition::Clear
        );
    }

    #[test]
    fn sunrise_rain_status() {
        let labels = StatusLabels::default();
        let condition = classify(&observation(2.0, 0.0, 0.0), &Mode::Sunrise, 7);
        assert_eq!(condition.status(&labels), Status::new(":rain_cloud:", "Rain"));
    }

    #[test]
    fn labels_are_configurable() {
        let labels = StatusLabels {
            clear_night: "맑은 밤".to_string(),
            ..StatusLabels::default()
        };
        assert_eq!(
            Condition::ClearNight.status(&labels),
            Status::new(":crescent_moon:", "맑은 밤")
        );
    }
}
