//! 日の出・正午・日の入りと現在の天気から、Slack のステータス (絵文字と文言) を更新する。
//!
//! 中心となるのは [`updater::StatusUpdater`] で、天気の判定結果をフィンガープリントで
//! 比較し、変化があったときだけプレゼンス API を呼ぶ。

pub mod classify;
pub mod config;
pub mod fingerprint;
pub mod mode;
pub mod planner;
pub mod presence;
pub mod scheduler;
pub mod store;
pub mod updater;
pub mod version;
pub mod weather;

#[cfg(test)]
mod test_utils;
