//! 反映済みステータスとの比較に使うフィンガープリント。

use std::fmt;

use sha2::{Digest, Sha256};

use crate::classify::Status;

/// 絵文字と文言の区切り。どちらにも含まれない想定の文字。
const SEPARATOR: &str = "|";

/// ステータスの SHA-256 ダイジェスト (16 進小文字)。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of(status: &Status) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(status.emoji.as_bytes());
        hasher.update(SEPARATOR.as_bytes());
        hasher.update(status.text.as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 保存済みの値と一致するかどうか。
    pub fn matches(&self, stored: &str) -> bool {
        self.0 == stored
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
