//! 呼び出し元から渡される、あるいは現在時刻から導く時間帯モード。

use std::fmt;

use chrono::{DateTime, Timelike};
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// 時間帯モード。
///
/// 外部から渡された文字列は列挙値と照合せずに受け入れ、未知の値は
/// `Other` として保持する。`Other` は昼寄りの判定になる。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Mode {
    Dawn,
    Sunrise,
    Noon,
    Sunset,
    Night,
    Other(String),
}

impl Mode {
    /// 文字列をモードに変換する。大文字小文字は区別しないが、空白は取り除かない。
    pub fn parse(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "dawn" => Self::Dawn,
            "sunrise" => Self::Sunrise,
            "noon" => Self::Noon,
            "sunset" => Self::Sunset,
            "night" => Self::Night,
            other => Self::Other(other.to_string()),
        }
    }

    /// ローカル時刻の時から導くモード。`[6,12)` は sunrise、`[12,18)` は noon、それ以外は sunset。
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            6..=11 => Self::Sunrise,
            12..=17 => Self::Noon,
            _ => Self::Sunset,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Dawn => "dawn",
            Self::Sunrise => "sunrise",
            Self::Noon => "noon",
            Self::Sunset => "sunset",
            Self::Night => "night",
            Self::Other(value) => value,
        }
    }

    pub fn is_sunset(&self) -> bool {
        matches!(self, Self::Sunset)
    }

    /// 雲量が中程度のときに夜寄りの文言を選ぶモードかどうか。
    pub fn is_night_leaning(&self) -> bool {
        matches!(self, Self::Sunset | Self::Night)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Mode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Mode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(Self::parse(&value))
    }
}

/// 明示されたモード (`mode`、なければ `trigger`) を優先し、どちらも空なら現在時刻から導く。
///
/// 空白だけの文字列は空ではないので、未知のモードとして扱う。
pub fn resolve_mode(mode: Option<&str>, trigger: Option<&str>, now: &DateTime<Tz>) -> Mode {
    [mode, trigger]
        .into_iter()
        .flatten()
        .find(|value| !value.is_empty())
        .map(Mode::parse)
        .unwrap_or_else(|| Mode::from_hour(now.hour()))
}
