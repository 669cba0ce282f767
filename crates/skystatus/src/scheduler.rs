//! 毎日の予定立てと、一回限りのトリガーの実行。

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Days, NaiveTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::planner::{DailyPlan, PlanError, Planner, Trigger, TriggerDecision};
use crate::updater::{Invocation, InvocationOutput, StatusUpdater};

/// 指定時刻に一度だけステータス更新を起動するスケジューラ。
pub trait Scheduler: Send + Sync {
    /// トリガーを登録する。同じ名前のトリガーがあれば置き換える。
    fn register(&self, trigger: Trigger);
}

/// tokio のタイマーで動くプロセス内スケジューラ。
pub struct LocalScheduler {
    updater: Arc<StatusUpdater>,
    tasks: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl LocalScheduler {
    pub fn new(updater: Arc<StatusUpdater>) -> Self {
        Self {
            updater,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// まだ実行されていないトリガー名 (昇順)。
    pub fn pending(&self) -> Vec<String> {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.retain(|_, handle| !handle.is_finished());
        let mut names: Vec<String> = tasks.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Scheduler for LocalScheduler {
    fn register(&self, trigger: Trigger) {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.retain(|_, handle| !handle.is_finished());

        if let Some(previous) = tasks.remove(&trigger.name) {
            previous.abort();
            info!(name = %trigger.name, "Replaced existing trigger");
        }

        let name = trigger.name.clone();
        let updater = Arc::clone(&self.updater);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(duration_until(trigger.at, Utc::now())).await;
            info!(name = %trigger.name, mode = %trigger.mode, "Trigger fired");
            invoke_logged(&updater, &trigger.invocation()).await;
        });
        tasks.insert(name, handle);
    }
}

fn duration_until(at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (at - now).to_std().unwrap_or(Duration::ZERO)
}

/// 更新を実行し、結果をログに残して返す。致命的なエラーも失敗として返す。
async fn invoke_logged(updater: &StatusUpdater, invocation: &Invocation) -> InvocationOutput {
    match updater.invoke(invocation).await {
        Ok(outcome) => {
            let output = outcome.output();
            info!(ok = output.ok, skipped = output.skipped, "Status update finished");
            output
        }
        Err(e) => {
            error!(error = %e, "Status update failed");
            InvocationOutput {
                ok: false,
                body: Some(e.to_string()),
                ..Default::default()
            }
        }
    }
}

/// 1 回分の予定立ての結果。
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub plan: DailyPlan,
    /// ドライラン時は実行しない
    pub dawn: Option<InvocationOutput>,
    pub triggers: Vec<TriggerDecision>,
}

/// その日の予定を立て、dawn の更新を即時実行し、これからのトリガーを登録する。
pub async fn run_cycle(
    planner: &Planner,
    updater: &StatusUpdater,
    scheduler: &dyn Scheduler,
    now: DateTime<Utc>,
) -> Result<CycleReport, PlanError> {
    let plan = planner.plan(now).await?;
    info!(
        date = %plan.date,
        sunrise = %plan.sunrise,
        noon = %plan.noon,
        sunset = %plan.sunset,
        "Planned day"
    );

    let dawn = if updater.settings().dry_run {
        info!("Dry run, skipping dawn update");
        None
    } else {
        Some(invoke_logged(updater, &Invocation::with_mode("dawn")).await)
    };

    let triggers = plan.decide(now);
    for decision in &triggers {
        match decision {
            TriggerDecision::Scheduled { trigger } => {
                info!(name = %trigger.name, at = %trigger.at, "Scheduling trigger");
                scheduler.register(trigger.clone());
            }
            TriggerDecision::Skipped { trigger, reason } => {
                info!(name = %trigger.name, at = %trigger.at, ?reason, "Skipping past trigger");
            }
        }
    }

    Ok(CycleReport {
        plan,
        dawn,
        triggers,
    })
}

/// 次に予定を立てるローカル時刻。今日の `plan_time` を過ぎていれば翌日。
pub fn next_plan_time(now: DateTime<Tz>, plan_time: NaiveTime) -> DateTime<Tz> {
    let tz = now.timezone();
    (0..=2)
        .filter_map(|offset| now.date_naive().checked_add_days(Days::new(offset)))
        .filter_map(|date| tz.from_local_datetime(&date.and_time(plan_time)).earliest())
        .find(|candidate| *candidate > now)
        .unwrap_or_else(|| now + TimeDelta::days(1))
}

/// 毎日 `plan_time` に予定を立て続ける。予定立てに失敗した日は翌日に再試行する。
pub async fn run_daily(
    planner: &Planner,
    updater: Arc<StatusUpdater>,
    scheduler: &dyn Scheduler,
    plan_time: NaiveTime,
) {
    let tz = planner.timezone();
    loop {
        let now = Utc::now();
        if let Err(e) = run_cycle(planner, &updater, scheduler, now).await {
            error!(error = %e, "Failed to plan the day");
        }

        let next = next_plan_time(Utc::now().with_timezone(&tz), plan_time);
        let wait = duration_until(next.with_timezone(&Utc), Utc::now());
        info!(
            next = %next,
            wait = %humantime::format_duration(Duration::from_secs(wait.as_secs())),
            "Waiting for next planning cycle"
        );
        tokio::time::sleep(wait).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use chrono_tz::{America::New_York, Asia::Seoul};

    use crate::config::Config;
    use crate::mode::Mode;
    use crate::planner::{SkipReason, SunSource, SunTimes};
    use crate::store::MemoryParameterStore;
    use crate::test_utils::{RecordingPresence, StaticWeather, TOKEN_PARAMETER, forecast};
    use crate::updater::UpdaterSettings;

    struct FixedSun(SunTimes);

    #[async_trait]
    impl SunSource for FixedSun {
        async fn sun_times(&self) -> Result<SunTimes, PlanError> {
            Ok(self.0)
        }
    }

    #[derive(Default)]
    struct RecordingScheduler(Mutex<Vec<Trigger>>);

    impl Scheduler for RecordingScheduler {
        fn register(&self, trigger: Trigger) {
            self.0.lock().unwrap().push(trigger);
        }
    }

    fn planner(date: (i32, u32, u32)) -> Planner {
        let (y, m, d) = date;
        let sun = SunTimes {
            sunrise: Seoul.with_ymd_and_hms(y, m, d, 6, 5, 0).unwrap(),
            sunset: Seoul.with_ymd_and_hms(y, m, d, 18, 44, 0).unwrap(),
        };
        Planner::new(Arc::new(FixedSun(sun)), Seoul)
    }

    fn updater(presence: Arc<RecordingPresence>, dry_run: bool) -> Arc<StatusUpdater> {
        let settings = UpdaterSettings {
            dry_run,
            ..UpdaterSettings::from_config(&Config::default())
        };
        Arc::new(StatusUpdater::new(
            Arc::new(StaticWeather(Some(forecast(0.0, 0.0, 0.0)))),
            presence,
            Arc::new(MemoryParameterStore::with_values([(TOKEN_PARAMETER, "xoxp-1")])),
            settings,
        ))
    }

    #[tokio::test]
    async fn cycle_runs_dawn_and_registers_future_triggers() {
        let presence = RecordingPresence::new(200);
        let updater = updater(presence.clone(), false);
        let scheduler = RecordingScheduler::default();
        // 13:00 KST
        let now = Utc.with_ymd_and_hms(2025, 9, 13, 4, 0, 0).unwrap();

        let report = run_cycle(&planner((2025, 9, 13)), &updater, &scheduler, now)
            .await
            .unwrap();

        assert_eq!(presence.calls().len(), 1);
        assert!(report.dawn.as_ref().is_some_and(|d| d.ok));

        let registered = scheduler.0.lock().unwrap().clone();
        assert_eq!(registered.len(), 1);
        assert_eq!(registered[0].name, "update-sunset-20250913");
        assert_eq!(registered[0].mode, Mode::Sunset);

        assert!(matches!(
            &report.triggers[1],
            TriggerDecision::Skipped { reason: SkipReason::PastTimeToday, .. }
        ));
    }

    #[tokio::test]
    async fn dry_run_cycle_skips_dawn() {
        let presence = RecordingPresence::new(200);
        let updater = updater(presence.clone(), true);
        let scheduler = RecordingScheduler::default();
        // 03:30 KST
        let now = Utc.with_ymd_and_hms(2025, 9, 12, 18, 30, 0).unwrap();

        let report = run_cycle(&planner((2025, 9, 13)), &updater, &scheduler, now)
            .await
            .unwrap();

        assert!(report.dawn.is_none());
        assert!(presence.calls().is_empty());
        assert_eq!(scheduler.0.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn local_scheduler_fires_due_trigger() {
        let presence = RecordingPresence::new(200);
        let scheduler = LocalScheduler::new(updater(presence.clone(), false));

        scheduler.register(Trigger {
            name: "update-noon-20250913".to_string(),
            at: Utc::now() - TimeDelta::seconds(1),
            mode: Mode::Noon,
        });

        tokio::time::timeout(Duration::from_secs(5), async {
            while !scheduler.pending().is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(presence.calls().len(), 1);
    }

    #[tokio::test]
    async fn local_scheduler_replaces_trigger_with_same_name() {
        let presence = RecordingPresence::new(200);
        let scheduler = LocalScheduler::new(updater(presence.clone(), false));
        let trigger = Trigger {
            name: "update-sunset-20250913".to_string(),
            at: Utc::now() + TimeDelta::hours(1),
            mode: Mode::Sunset,
        };

        scheduler.register(trigger.clone());
        scheduler.register(trigger);

        assert_eq!(scheduler.pending(), vec!["update-sunset-20250913".to_string()]);
        assert!(presence.calls().is_empty());
    }

    #[test]
    fn next_plan_time_today_or_tomorrow() {
        let plan_time = NaiveTime::from_hms_opt(4, 0, 0).unwrap();

        let now = Seoul.with_ymd_and_hms(2025, 9, 13, 1, 0, 0).unwrap();
        assert_eq!(
            next_plan_time(now, plan_time),
            Seoul.with_ymd_and_hms(2025, 9, 13, 4, 0, 0).unwrap()
        );

        let now = Seoul.with_ymd_and_hms(2025, 9, 13, 4, 0, 0).unwrap();
        assert_eq!(
            next_plan_time(now, plan_time),
            Seoul.with_ymd_and_hms(2025, 9, 14, 4, 0, 0).unwrap()
        );
    }

    #[test]
    fn next_plan_time_skips_nonexistent_local_time() {
        // 2025-03-09 02:30 は New York では存在しない
        let plan_time = NaiveTime::from_hms_opt(2, 30, 0).unwrap();
        let now = New_York.with_ymd_and_hms(2025, 3, 8, 12, 0, 0).unwrap();
        assert_eq!(
            next_plan_time(now, plan_time),
            New_York.with_ymd_and_hms(2025, 3, 10, 2, 30, 0).unwrap()
        );
    }

    #[test]
    fn duration_until_past_is_zero() {
        let now = Utc.with_ymd_and_hms(2025, 9, 13, 4, 0, 0).unwrap();
        assert_eq!(duration_until(now - TimeDelta::minutes(5), now), Duration::ZERO);
        assert_eq!(
            duration_until(now + TimeDelta::minutes(5), now),
            Duration::from_secs(300)
        );
    }
}
