use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveTime, TimeZone, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use routine_core::{
    collection::{group_by_period_label, Action, ItemCollection, ItemView, SortKey, StatusFilter},
    notifications::LogNotificationSink,
    resolve_period, ItemKind, JsonFileStore, Recurrence, RecurringItem, RoutineService,
    SweepToken,
};
use tracing::{debug, info};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub(crate) store_dir: PathBuf,
    pub(crate) owner_id: String,
    pub(crate) sweep_on_start: bool,
    pub(crate) reminder_hour: u32,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Ok(dir) = std::env::var("ROUTINE_STORE_DIR") {
            if !dir.trim().is_empty() {
                config.store_dir = PathBuf::from(dir);
            }
        }
        if let Ok(owner) = std::env::var("ROUTINE_OWNER_ID") {
            if !owner.trim().is_empty() {
                config.owner_id = owner.trim().to_string();
            }
        }
        if let Ok(flag) = std::env::var("ROUTINE_SWEEP_ON_START") {
            config.sweep_on_start = parse_flag(&flag).unwrap_or(config.sweep_on_start);
        }
        if let Ok(hour) = std::env::var("ROUTINE_REMINDER_HOUR") {
            if let Ok(value) = hour.trim().parse::<u32>() {
                if value < 24 {
                    config.reminder_hour = value;
                }
            }
        }
        Ok(config)
    }

    /// Command-line flags win over the environment.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(dir) = &cli.store_dir {
            self.store_dir = dir.clone();
        }
        if let Some(owner) = &cli.owner {
            self.owner_id = owner.clone();
        }
        if cli.no_sweep {
            self.sweep_on_start = false;
        }
    }

    fn reminder_time(&self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.reminder_hour, 0, 0).unwrap_or(NaiveTime::MIN)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store_dir: PathBuf::from(".routines"),
            owner_id: "local".to_string(),
            sweep_on_start: true,
            reminder_hour: 9,
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Track tasks and recurring routines.
#[derive(Debug, Parser)]
#[command(name = "routine", version)]
pub struct Cli {
    /// Directory holding tasks.json and routines.json.
    #[arg(long, global = true)]
    pub store_dir: Option<PathBuf>,

    /// Owner whose items are shown and changed.
    #[arg(long, global = true)]
    pub owner: Option<String>,

    /// Skip the overdue sweep that normally runs before each command.
    #[arg(long, global = true)]
    pub no_sweep: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List items with their derived status.
    List {
        #[arg(long, value_enum, default_value_t = KindArg::Routine)]
        kind: KindArg,
        #[arg(long, value_enum, default_value_t = FilterArg::All)]
        status: FilterArg,
        #[arg(long, value_enum, default_value_t = SortArg::Next)]
        sort: SortArg,
        /// Group rows by period label.
        #[arg(long)]
        grouped: bool,
        /// Print rows as JSON.
        #[arg(long)]
        json: bool,
        /// Keep running and reprint whenever the store files change.
        #[arg(long)]
        watch: bool,
    },
    /// Show the current period of a recurring item.
    Period { id: String },
    /// Add a task or routine.
    Add {
        id: String,
        title: String,
        #[arg(long, value_enum, default_value_t = KindArg::Routine)]
        kind: KindArg,
        /// none, daily, weekly, monthly or yearly.
        #[arg(long, default_value = "none", value_parser = parse_recurrence)]
        unit: Recurrence,
        #[arg(long, default_value_t = 1)]
        interval: u32,
    },
    /// Delete an item.
    Delete { id: String },
    /// Log a completion for a recurring item.
    Complete { id: String },
    /// Return a completed item to due.
    Uncomplete { id: String },
    /// Complete an active item or un-complete a completed one.
    Toggle { id: String },
    /// Repair recurring items whose due date is in the past.
    Sweep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KindArg {
    Task,
    Routine,
}

impl From<KindArg> for ItemKind {
    fn from(value: KindArg) -> Self {
        match value {
            KindArg::Task => ItemKind::Task,
            KindArg::Routine => ItemKind::Routine,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FilterArg {
    All,
    Active,
    Completed,
}

impl From<FilterArg> for StatusFilter {
    fn from(value: FilterArg) -> Self {
        match value {
            FilterArg::All => StatusFilter::All,
            FilterArg::Active => StatusFilter::Active,
            FilterArg::Completed => StatusFilter::Completed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SortArg {
    Next,
    Title,
    Created,
}

impl From<SortArg> for SortKey {
    fn from(value: SortArg) -> Self {
        match value {
            SortArg::Next => SortKey::NextOccurrence,
            SortArg::Title => SortKey::Title,
            SortArg::Created => SortKey::CreatedAt,
        }
    }
}

fn parse_recurrence(value: &str) -> std::result::Result<Recurrence, String> {
    Recurrence::parse(value).ok_or_else(|| format!("unknown recurrence unit `{value}`"))
}

pub fn run(config: AppConfig, command: Command) -> Result<()> {
    info!(
        store = %config.store_dir.display(),
        owner = %config.owner_id,
        "starting routine"
    );
    let mut store = JsonFileStore::open(&config.store_dir)
        .with_context(|| format!("failed to open store at {}", config.store_dir.display()))?;
    let reloads = match &command {
        Command::List { watch: true, .. } => {
            Some(store.watch().context("failed to watch store directory")?)
        }
        _ => None,
    };
    let service = RoutineService::builder()
        .owner(config.owner_id.clone())
        .with_store(Box::new(store))
        .with_notification_sink(Box::new(LogNotificationSink))
        .reminder_time(config.reminder_time())
        .build();

    let now = Local::now();
    if config.sweep_on_start && !matches!(command, Command::Sweep) {
        sweep(&service, &now)?;
    }
    match (command, reloads) {
        (
            Command::List {
                kind,
                status,
                sort,
                grouped,
                json,
                ..
            },
            Some(reloads),
        ) => {
            let options = ListOptions {
                kind: kind.into(),
                status: status.into(),
                sort: sort.into(),
                grouped,
                json,
            };
            print_list(&service, &options, &Local::now())?;
            info!(store = %config.store_dir.display(), "watching for changes");
            while reloads.recv().is_ok() {
                // One save often fires several events.
                while reloads.try_recv().is_ok() {}
                print_list(&service, &options, &Local::now())?;
            }
            Ok(())
        }
        (command, _) => execute(&service, command, &now),
    }
}

#[derive(Debug, Clone, Copy)]
struct ListOptions {
    kind: ItemKind,
    status: StatusFilter,
    sort: SortKey,
    grouped: bool,
    json: bool,
}

fn print_list<Tz: TimeZone>(
    service: &RoutineService,
    options: &ListOptions,
    now: &DateTime<Tz>,
) -> Result<()> {
    let mut collection = ItemCollection::for_kind(options.kind);
    collection.dispatch(Action::Loaded(
        service.items(options.kind).context("failed to load items")?,
    ));
    let views = collection.views(now, options.status, options.sort);
    if options.json {
        println!("{}", serde_json::to_string_pretty(&views)?);
    } else if options.grouped {
        for (label, rows) in group_by_period_label(views) {
            println!("[{label}]");
            for view in &rows {
                println!("  {}", format_row(view));
            }
        }
    } else {
        for view in &views {
            println!("{}", format_row(view));
        }
    }
    Ok(())
}

fn execute<Tz: TimeZone>(
    service: &RoutineService,
    command: Command,
    now: &DateTime<Tz>,
) -> Result<()> {
    match command {
        Command::List {
            kind,
            status,
            sort,
            grouped,
            json,
            ..
        } => {
            let options = ListOptions {
                kind: kind.into(),
                status: status.into(),
                sort: sort.into(),
                grouped,
                json,
            };
            print_list(service, &options, now)?;
        }
        Command::Period { id } => {
            let item = service.get_item(&id)?;
            match resolve_period(&item, now) {
                Some(period) => println!(
                    "{}: {} {} .. {} (bucket {})",
                    item.id,
                    period.period_label,
                    period.start_day_key,
                    period.end_day_key,
                    period.bucket_index
                ),
                None => println!("{}: not recurring", item.id),
            }
        }
        Command::Add {
            id,
            title,
            kind,
            unit,
            interval,
        } => {
            let item = RecurringItem::new(id, service.owner_id(), kind.into(), title, Utc::now())
                .with_recurrence(unit, interval);
            let added = service.add_item(item).context("failed to add item")?;
            println!("added {}", added.id);
        }
        Command::Delete { id } => {
            service.delete_item(&id).context("failed to delete item")?;
            println!("deleted {id}");
        }
        Command::Complete { id } => {
            let updated = service
                .log_completion(&id, now)
                .with_context(|| format!("failed to complete {id}"))?;
            println!("{}", format_row(&ItemView::evaluate(updated, now)));
        }
        Command::Uncomplete { id } => {
            let updated = service
                .uncomplete(&id, now)
                .with_context(|| format!("failed to uncomplete {id}"))?;
            println!("{}", format_row(&ItemView::evaluate(updated, now)));
        }
        Command::Toggle { id } => {
            let updated = service
                .toggle(&id, now)
                .with_context(|| format!("failed to toggle {id}"))?;
            println!("{}", format_row(&ItemView::evaluate(updated, now)));
        }
        Command::Sweep => {
            let report = sweep(service, now)?;
            println!(
                "repaired {}, failed {}",
                report.repaired.len(),
                report.failed.len()
            );
        }
    }
    Ok(())
}

fn sweep<Tz: TimeZone>(
    service: &RoutineService,
    now: &DateTime<Tz>,
) -> Result<routine_core::SweepReport> {
    let report = service
        .reschedule_overdue(now, &SweepToken::new())
        .context("overdue sweep failed")?;
    debug!(
        repaired = report.repaired.len(),
        failed = report.failed.len(),
        "overdue sweep finished"
    );
    Ok(report)
}

pub(crate) fn format_row(view: &ItemView) -> String {
    let due = view
        .next_occurrence
        .map(|next| next.with_timezone(&Local).format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "-".to_string());
    let cadence = if view.item.is_recurring() {
        if view.item.interval() > 1 {
            format!("every {} x{}", view.item.recurrence_unit, view.item.interval())
        } else {
            view.item.recurrence_unit.to_string()
        }
    } else {
        "once".to_string()
    };
    format!(
        "{:<9} {:<16} {:<12} due {:<10} {}",
        view.status, view.item.id, cadence, due, view.item.title
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_add_command_with_recurrence() {
        let cli = Cli::try_parse_from([
            "routine", "add", "gym", "Gym session", "--unit", "weekly", "--interval", "2",
        ])
        .expect("parse");
        match cli.command {
            Command::Add { unit, interval, kind, .. } => {
                assert_eq!(unit, Recurrence::Weekly);
                assert_eq!(interval, 2);
                assert_eq!(kind, KindArg::Routine);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_units() {
        assert!(Cli::try_parse_from(["routine", "add", "x", "X", "--unit", "hourly"]).is_err());
    }

    #[test]
    fn cli_flags_override_environment_defaults() {
        let cli = Cli::try_parse_from([
            "routine", "--store-dir", "/tmp/r", "--owner", "sam", "--no-sweep", "sweep",
        ])
        .expect("parse");
        let mut config = AppConfig::default();
        config.apply_cli(&cli);
        assert_eq!(config.store_dir, PathBuf::from("/tmp/r"));
        assert_eq!(config.owner_id, "sam");
        assert!(!config.sweep_on_start);
    }

    #[test]
    fn watch_is_a_list_option() {
        let cli = Cli::try_parse_from(["routine", "list", "--watch", "--status", "active"])
            .expect("parse");
        assert!(matches!(
            cli.command,
            Command::List {
                watch: true,
                status: FilterArg::Active,
                ..
            }
        ));
        assert!(Cli::try_parse_from(["routine", "--watch", "sweep"]).is_err());
    }

    #[test]
    fn flags_accept_common_spellings() {
        assert_eq!(parse_flag("Yes"), Some(true));
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    fn run_adds_and_completes_against_a_temp_store() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = AppConfig {
            store_dir: temp.path().to_path_buf(),
            owner_id: "me".into(),
            sweep_on_start: true,
            reminder_hour: 8,
        };
        run(
            config.clone(),
            Command::Add {
                id: "floss".into(),
                title: "Floss".into(),
                kind: KindArg::Routine,
                unit: Recurrence::Daily,
                interval: 1,
            },
        )
        .expect("add");
        run(config.clone(), Command::Complete { id: "floss".into() }).expect("complete");

        let raw = std::fs::read_to_string(temp.path().join("routines.json")).expect("read");
        assert!(raw.contains("\"lastCompletedAt\": \""));
        assert!(run(config, Command::Complete { id: "missing".into() }).is_err());
    }
}
