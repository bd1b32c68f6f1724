use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use services::{
    Clock, EngineConfig, FetchOutcome, HttpProgressBackend, LearningService, PreferenceService,
};
use storage::repository::Storage;
use study_core::model::{Curriculum, PreferenceKey, SubjectContext, TopicKey, Tristate};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingFlag { flag: &'static str },
    UnknownArg(String),
    InvalidNumber { flag: &'static str, raw: String },
    InvalidTopic { raw: String },
    InvalidDbUrl { raw: String },
    InvalidPreference { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingFlag { flag } => write!(f, "{flag} is required"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidNumber { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
            ArgsError::InvalidTopic { raw } => {
                write!(f, "invalid --from value: {raw} (expected <unit>.<topic>)")
            }
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidPreference { raw } => {
                write!(f, "invalid --set value: {raw} (expected <key>=<true|false>)")
            }
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn parse_number<T: std::str::FromStr>(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<T, ArgsError> {
    let value = require_value(args, flag)?;
    value
        .parse()
        .map_err(|_| ArgsError::InvalidNumber { flag, raw: value })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- status --curriculum <file.json> --subject <name> --year <n> --semester <n>");
    eprintln!("  cargo run -p app -- next   --curriculum <file.json> --subject <name> --year <n> --semester <n> [--from <unit>.<topic>]");
    eprintln!("  cargo run -p app -- prefs  [--db <sqlite_url>] [--set <key>=<true|false>]");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  STUDY_API_BASE_URL, STUDY_API_TOKEN, STUDY_DB_URL, RUST_LOG");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Status,
    Next,
    Prefs,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "status" => Some(Self::Status),
            "next" => Some(Self::Next),
            "prefs" => Some(Self::Prefs),
            _ => None,
        }
    }
}

struct SubjectArgs {
    curriculum: PathBuf,
    subject: String,
    year: u16,
    semester: u8,
    from: Option<TopicKey>,
}

impl SubjectArgs {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut curriculum = None;
        let mut subject = None;
        let mut year = None;
        let mut semester = None;
        let mut from = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--curriculum" => curriculum = Some(PathBuf::from(require_value(args, "--curriculum")?)),
                "--subject" => subject = Some(require_value(args, "--subject")?),
                "--year" => year = Some(parse_number(args, "--year")?),
                "--semester" => semester = Some(parse_number(args, "--semester")?),
                "--from" => {
                    let value = require_value(args, "--from")?;
                    let key = value
                        .parse::<TopicKey>()
                        .map_err(|_| ArgsError::InvalidTopic { raw: value.clone() })?;
                    from = Some(key);
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            curriculum: curriculum.ok_or(ArgsError::MissingFlag { flag: "--curriculum" })?,
            subject: subject.ok_or(ArgsError::MissingFlag { flag: "--subject" })?,
            year: year.ok_or(ArgsError::MissingFlag { flag: "--year" })?,
            semester: semester.ok_or(ArgsError::MissingFlag { flag: "--semester" })?,
            from,
        })
    }
}

struct PrefsArgs {
    db_url: String,
    set: Option<(PreferenceKey, bool)>,
}

impl PrefsArgs {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut db_url = std::env::var("STUDY_DB_URL")
            .ok()
            .map_or_else(|| "sqlite://study.sqlite3".into(), normalize_sqlite_url);
        let mut set = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--set" => {
                    let value = require_value(args, "--set")?;
                    set = Some(parse_preference(&value)?);
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self { db_url, set })
    }
}

fn parse_preference(raw: &str) -> Result<(PreferenceKey, bool), ArgsError> {
    let invalid = || ArgsError::InvalidPreference {
        raw: raw.to_string(),
    };
    let (key, value) = raw.split_once('=').ok_or_else(invalid)?;
    let key: PreferenceKey = key.trim().parse().map_err(|_| invalid())?;
    let value = key.parse_value(value).map_err(|_| invalid())?;
    Ok((key, value))
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(std::io::stderr);
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}

fn status_label(status: Tristate) -> &'static str {
    match status {
        Tristate::True => "done",
        Tristate::False => "open",
        Tristate::Unknown => "?",
    }
}

fn describe(curriculum: &Curriculum, key: Option<TopicKey>) -> String {
    key.and_then(|key| {
        curriculum
            .topic(key)
            .map(|topic| format!("{key} {}", topic.title()))
    })
    .unwrap_or_else(|| "-".into())
}

async fn load_service(
    parsed: &SubjectArgs,
) -> Result<(LearningService, Curriculum), Box<dyn std::error::Error>> {
    let config = EngineConfig::from_env()?;
    let backend = HttpProgressBackend::from_config(&config).ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "STUDY_API_BASE_URL is not set",
        )
    })?;
    let raw = std::fs::read_to_string(&parsed.curriculum)?;
    let curriculum: Curriculum = serde_json::from_str(&raw)?;
    let subject = SubjectContext::new(parsed.subject.clone(), parsed.year, parsed.semester)?;
    tracing::debug!(
        path = %parsed.curriculum.display(),
        topics = curriculum.topic_count(),
        "loaded curriculum"
    );

    let backend = Arc::new(backend);
    let service = LearningService::new(backend.clone(), backend, &config, Clock::default());
    if let FetchOutcome::Failed(error) = service.load_subject(subject, curriculum.clone()).await {
        eprintln!("completion unavailable ({error}); showing unknown state");
    }
    Ok((service, curriculum))
}

async fn run_status(parsed: &SubjectArgs) -> Result<(), Box<dyn std::error::Error>> {
    let (service, curriculum) = load_service(parsed).await?;
    for (index, unit) in curriculum.units().iter().enumerate() {
        let marker = if service.unit_complete(index) { " (complete)" } else { "" };
        println!("{index}. {}{marker}", unit.title());
        for (key, topic) in curriculum.entries().filter(|(key, _)| key.unit() == index) {
            let status = service.store().status(key);
            let lock = if topic.is_open() { "" } else { " [locked]" };
            println!("   [{:>4}] {key} {}{lock}", status_label(status), topic.title());
        }
    }
    let summary = service.summary();
    println!(
        "{}/{} complete, {} open, {} unknown",
        summary.completed, summary.total, summary.incomplete, summary.unknown
    );
    Ok(())
}

async fn run_next(parsed: &SubjectArgs) -> Result<(), Box<dyn std::error::Error>> {
    let (service, curriculum) = load_service(parsed).await?;
    if let Some(from) = parsed.from {
        service.select_topic(from).await?;
    }
    println!(
        "next uncompleted: {}",
        describe(&curriculum, service.next_uncompleted_topic())
    );
    println!(
        "next forward:     {}",
        describe(&curriculum, service.next_topic_forward())
    );
    println!(
        "latest completed: {}",
        describe(&curriculum, service.latest_completed_topic())
    );
    for index in 0..curriculum.units().len() {
        let end = service
            .sequential_completion_end(index)
            .map_or_else(|| "none".to_string(), |end| end.to_string());
        println!("unit {index} completed through topic: {end}");
    }
    Ok(())
}

async fn run_prefs(parsed: PrefsArgs) -> Result<(), Box<dyn std::error::Error>> {
    // Open + migrate SQLite here so services stay free of file handling.
    prepare_sqlite_file(&parsed.db_url)?;
    let storage = Storage::sqlite(&parsed.db_url).await?;
    let preferences = PreferenceService::new(Arc::clone(&storage.preferences));

    if let Some((key, value)) = parsed.set {
        preferences.set(key, value).await?;
    }
    let loaded = preferences.load().await?;
    for key in PreferenceKey::ALL {
        println!("{key} = {}", loaded.get(key));
    }
    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let argv: Vec<String> = std::env::args().skip(1).collect();
    let mut iter = argv.into_iter();

    let cmd = match iter.next() {
        None => {
            print_usage();
            return Ok(());
        }
        Some(first) if first == "--help" || first == "-h" => {
            print_usage();
            return Ok(());
        }
        Some(first) => Command::from_arg(&first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };

    let report = |e: ArgsError| {
        eprintln!("{e}");
        print_usage();
        e
    };

    match cmd {
        Command::Status => run_status(&SubjectArgs::parse(&mut iter).map_err(report)?).await,
        Command::Next => run_next(&SubjectArgs::parse(&mut iter).map_err(report)?).await,
        Command::Prefs => run_prefs(PrefsArgs::parse(&mut iter).map_err(report)?).await,
    }
}

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> std::vec::IntoIter<String> {
        list.iter()
            .map(|s| (*s).to_string())
            .collect::<Vec<_>>()
            .into_iter()
    }

    #[test]
    fn parses_subject_args() {
        let parsed = SubjectArgs::parse(&mut args(&[
            "--curriculum",
            "c.json",
            "--subject",
            "Physics",
            "--year",
            "2",
            "--semester",
            "1",
            "--from",
            "0.2",
        ]))
        .unwrap();
        assert_eq!(parsed.subject, "Physics");
        assert_eq!(parsed.year, 2);
        assert_eq!(parsed.semester, 1);
        assert_eq!(parsed.from, Some(TopicKey::new(0, 2)));
    }

    #[test]
    fn missing_subject_is_reported() {
        let err = SubjectArgs::parse(&mut args(&["--curriculum", "c.json", "--year", "1"]))
            .err()
            .unwrap();
        assert!(matches!(err, ArgsError::MissingFlag { flag: "--subject" }));
    }

    #[test]
    fn parses_preference_assignment() {
        assert_eq!(
            parse_preference("tour_dismissed=true").unwrap(),
            (PreferenceKey::TourDismissed, true)
        );
        assert!(parse_preference("tour_dismissed").is_err());
        assert!(parse_preference("nope=true").is_err());
    }

    #[test]
    fn memory_url_is_left_alone() {
        assert_eq!(normalize_sqlite_url("sqlite::memory:".into()), "sqlite::memory:");
        assert!(normalize_sqlite_url("data/study.db".into()).starts_with("sqlite:///"));
    }
}
