use std::{path::PathBuf, sync::Arc};

use anyhow::{Context as _, Result, bail};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::info;

use skystatus::{
    config::{Config, open_config, write_default_config},
    planner::Planner,
    presence::SlackClient,
    scheduler::{LocalScheduler, run_daily},
    store::{FileParameterStore, ParameterStore},
    updater::{Invocation, StatusUpdater, UpdaterSettings},
    version::short_version,
    weather::OpenMeteoClient,
};

#[derive(Parser)]
#[command(version = short_version())]
struct Args {
    #[arg(long, default_value = "config.toml", global = true)]
    config: PathBuf,

    #[arg(long)]
    init: bool,

    /// プレゼンスを更新せず、フィンガープリントの記録だけ行う
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// ステータスを一度だけ更新し、結果を JSON で出力する
    Update {
        #[arg(long)]
        mode: Option<String>,
        #[arg(long)]
        trigger: Option<String>,
    },
    /// 今日の予定を JSON で出力する (トリガーは登録しない)
    Plan,
    /// 毎日の予定立てとトリガー実行を続ける
    Run,
    /// パラメータストアの値を操作する
    Param {
        #[command(subcommand)]
        action: ParamAction,
    },
}

#[derive(Subcommand)]
enum ParamAction {
    Get { name: String },
    Put { name: String, value: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    if args.init {
        write_default_config(&args.config)?;
        info!(path = ?args.config, "Created default configuration");
        return Ok(());
    }

    let Some(command) = args.command else {
        bail!("No command given, see --help");
    };

    tracing::info!(version = short_version(), "skystatus version");

    let mut config = open_config(&args.config).context("Failed to load configuration")?;
    if args.dry_run {
        config.dry_run = true;
    }
    info!(
        timezone = %config.location.timezone,
        dry_run = config.dry_run,
        "Configuration loaded"
    );

    match command {
        Command::Update { mode, trigger } => update(&config, Invocation { mode, trigger }).await,
        Command::Plan => plan(&config).await,
        Command::Run => run(&config).await,
        Command::Param { action } => param(&config, action),
    }
}

fn weather_client(config: &Config) -> Result<Arc<OpenMeteoClient>> {
    let client = OpenMeteoClient::new(&config.weather, &config.location)
        .context("Failed to create weather client")?;
    Ok(Arc::new(client))
}

fn status_updater(config: &Config, weather: Arc<OpenMeteoClient>) -> Result<StatusUpdater> {
    let presence = SlackClient::new(&config.presence).context("Failed to create Slack client")?;
    let store = FileParameterStore::new(&config.store.path);

    Ok(StatusUpdater::new(
        weather,
        Arc::new(presence),
        Arc::new(store),
        UpdaterSettings::from_config(config),
    ))
}

async fn update(config: &Config, invocation: Invocation) -> Result<()> {
    let updater = status_updater(config, weather_client(config)?)?;

    let output = updater
        .invoke(&invocation)
        .await
        .context("Status update failed")?
        .output();
    println!("{}", serde_json::to_string(&output)?);

    if !output.ok {
        bail!("Presence API did not accept the status");
    }
    Ok(())
}

async fn plan(config: &Config) -> Result<()> {
    let planner = Planner::new(weather_client(config)?, config.location.timezone);

    let now = Utc::now();
    let plan = planner.plan(now).await.context("Failed to plan the day")?;
    let triggers = plan.decide(now);
    let report = serde_json::json!({
        "plan": plan,
        "triggers": triggers,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn run(config: &Config) -> Result<()> {
    let weather = weather_client(config)?;
    let updater = Arc::new(status_updater(config, Arc::clone(&weather))?);
    let planner = Planner::new(weather, config.location.timezone);
    let scheduler = LocalScheduler::new(Arc::clone(&updater));

    info!(plan_time = %config.schedule.plan_time, "Starting daily scheduler");
    run_daily(&planner, updater, &scheduler, config.schedule.plan_time).await;
    Ok(())
}

fn param(config: &Config, action: ParamAction) -> Result<()> {
    let store = FileParameterStore::new(&config.store.path);
    match action {
        ParamAction::Get { name } => {
            let value = store
                .get(&name, true)
                .with_context(|| format!("Failed to read parameter {name}"))?;
            println!("{value}");
        }
        ParamAction::Put { name, value } => {
            store
                .put(&name, &value)
                .with_context(|| format!("Failed to write parameter {name}"))?;
            info!(name = %name, path = ?store.path(), "Parameter stored");
        }
    }
    Ok(())
}
