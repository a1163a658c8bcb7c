//! Command-line host for the alarm core.
//!
//! # Responsibility
//! - Manage persisted alarms from a terminal.
//! - Run an in-process scheduler that rings alarms until interrupted.

use alarmclock_core::{
    format_alarm_time, init_from_config, next_trigger, open_db, AlarmAlert, AlarmCommandService,
    AlarmId, AlarmNotifier, AlarmRecord, AlarmRepository, CoreConfig, LifecycleSignal, LogNotifier,
    NotificationTask, NotifyError, SqliteAlarmStore, TimerWakeScheduler,
};
use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveTime, Timelike};
use clap::{Parser, Subcommand};
use log::{info, warn};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedSender};

#[derive(Debug, Parser)]
#[command(name = "alarmclock", version, about = "Daily alarm clock")]
struct Cli {
    /// Config file; defaults to the platform config directory.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Add an active alarm, e.g. `add Wake 07:30`.
    Add {
        title: String,
        #[arg(value_parser = parse_time)]
        time: NaiveTime,
    },
    /// List all alarms.
    List,
    /// Switch an alarm on or off.
    Toggle { id: AlarmId },
    /// Replace an alarm's title and time.
    Edit {
        id: AlarmId,
        title: String,
        #[arg(value_parser = parse_time)]
        time: NaiveTime,
    },
    /// Delete an alarm.
    Delete { id: AlarmId },
    /// Schedule active alarms and ring them until Ctrl-C.
    Run,
}

/// Prints fired alarms to the terminal and the log.
struct ConsoleNotifier;

impl AlarmNotifier for ConsoleNotifier {
    fn show_alarm(&self, alert: &AlarmAlert) -> Result<(), NotifyError> {
        println!(
            "\u{7}[{}] {} ({}); type `dismiss {}` or `snooze {}`",
            alert.id, alert.title, alert.content, alert.id, alert.id
        );
        LogNotifier.show_alarm(alert)
    }

    fn dismiss(&self, id: AlarmId) -> Result<(), NotifyError> {
        LogNotifier.dismiss(id)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;
    if let Err(err) = init_from_config(&config) {
        eprintln!("warning: file logging disabled: {err}");
    }

    let conn = open_db(&config.db_path)
        .with_context(|| format!("opening {}", config.db_path.display()))?;
    let store = Arc::new(SqliteAlarmStore::new(conn));
    let (fired_tx, fired_rx) = mpsc::unbounded_channel();
    let actions = fired_tx.clone();
    let scheduler = Arc::new(TimerWakeScheduler::new(
        tokio::runtime::Handle::current(),
        fired_tx,
    ));
    let repo = Arc::new(AlarmRepository::new(store, scheduler));

    match cli.command {
        Command::Add { title, time } => {
            let alarm = blocking(&repo, move |repo| {
                repo.add_alarm(AlarmRecord::new(title, time.hour(), time.minute()))
            })
            .await?;
            println!("added {}", describe(&alarm));
        }
        Command::List => {
            let alarms = blocking(&repo, |repo| repo.get_all_alarms()).await?;
            if alarms.is_empty() {
                println!("no alarms");
            }
            for alarm in &alarms {
                println!("{}", describe(alarm));
            }
        }
        Command::Toggle { id } => {
            let alarm = blocking(&repo, move |repo| repo.toggle_alarm(id)).await?;
            println!("updated {}", describe(&alarm));
        }
        Command::Edit { id, title, time } => {
            let alarm = blocking(&repo, move |repo| {
                repo.edit_alarm(id, title, time.hour(), time.minute())
            })
            .await?;
            println!("updated {}", describe(&alarm));
        }
        Command::Delete { id } => {
            let Some(alarm) = blocking(&repo, move |repo| repo.get_alarm_by_id(id)).await? else {
                bail!("alarm {id} does not exist");
            };
            blocking(&repo, move |repo| repo.delete_alarm(&alarm)).await?;
            println!("deleted {id}");
        }
        Command::Run => run(repo, fired_rx, actions).await?,
    }

    Ok(())
}

async fn run(
    repo: Arc<AlarmRepository>,
    signals: mpsc::UnboundedReceiver<LifecycleSignal>,
    actions: UnboundedSender<LifecycleSignal>,
) -> Result<()> {
    let service = AlarmCommandService::new(
        Arc::clone(&repo),
        Arc::new(ConsoleNotifier),
        tokio::runtime::Handle::current(),
    );

    // Nothing is registered yet in a fresh process, same as after boot.
    service
        .handle(LifecycleSignal::BootCompleted)
        .await
        .context("boot restart task failed")?;

    let alarms = blocking(&repo, |repo| repo.get_all_alarms()).await?;
    let active = alarms.iter().filter(|alarm| alarm.is_active).count();
    println!("{active} active alarm(s) scheduled; press Ctrl-C to stop");
    info!("event=cli_run module=cli status=start active={active}");
    spawn_action_reader(actions);

    tokio::select! {
        () = service.run(signals) => warn!("event=cli_run module=cli status=stopped reason=channel_closed"),
        signal = tokio::signal::ctrl_c() => {
            signal.context("listening for Ctrl-C")?;
            info!("event=cli_run module=cli status=stopped reason=interrupt");
        }
    }
    Ok(())
}

// A blocked stdin read on a runtime thread would stall runtime shutdown, so
// input gets its own detached OS thread.
fn spawn_action_reader(actions: UnboundedSender<LifecycleSignal>) {
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(err) => {
                    warn!("event=cli_input module=cli status=error error={err}");
                    return;
                }
            };
            match parse_action(&line) {
                Ok(Some(signal)) => {
                    if actions.send(signal).is_err() {
                        return;
                    }
                }
                Ok(None) => {}
                Err(message) => eprintln!("{message}"),
            }
        }
    });
}

/// Parses `dismiss <id>` or `snooze <id>`; blank lines yield `None`.
fn parse_action(line: &str) -> Result<Option<LifecycleSignal>, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let task = match verb.to_ascii_lowercase().as_str() {
        "dismiss" | "cancel" => NotificationTask::Cancel,
        "snooze" => NotificationTask::Snooze,
        other => return Err(format!("unknown action `{other}`; expected dismiss|snooze <id>")),
    };
    let id = match (words.next(), words.next()) {
        (Some(id), None) => id
            .parse::<AlarmId>()
            .map_err(|err| format!("invalid alarm id `{id}`: {err}"))?,
        _ => return Err(format!("usage: {verb} <id>")),
    };
    Ok(Some(LifecycleSignal::NotificationAction { id, task }))
}

async fn blocking<T, F>(repo: &Arc<AlarmRepository>, op: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&AlarmRepository) -> alarmclock_core::AlarmResult<T> + Send + 'static,
{
    let repo = Arc::clone(repo);
    let value = tokio::task::spawn_blocking(move || op(&repo)).await??;
    Ok(value)
}

fn load_config(path: Option<&PathBuf>) -> Result<CoreConfig> {
    if let Some(path) = path {
        return CoreConfig::load(path).with_context(|| format!("loading {}", path.display()));
    }
    match CoreConfig::default_path() {
        Some(path) => CoreConfig::load_or_default(&path)
            .with_context(|| format!("loading {}", path.display())),
        None => Ok(CoreConfig::default()),
    }
}

fn parse_time(value: &str) -> Result<NaiveTime, String> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .map_err(|err| format!("expected HH:MM (24-hour), got `{value}`: {err}"))
}

fn describe(alarm: &AlarmRecord) -> String {
    let state = if alarm.is_active {
        let at = next_trigger(alarm.hour, alarm.minute, &Local::now());
        format!("on, next {}", at.format("%a %Y-%m-%d %H:%M"))
    } else {
        "off".to_string()
    };
    format!(
        "#{} {:>8} {} [{state}]",
        alarm.id,
        format_alarm_time(alarm.hour, alarm.minute),
        alarm.title
    )
}
