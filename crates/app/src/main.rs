use std::fmt;

use services::{Clock, Ledger, LedgerConfig, Session};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tutor_core::model::{InteractionEvent, Learner, LearnerId, LessonId, Role, Sender};

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingArg { what: &'static str },
    UnknownArg(String),
    InvalidLessonId { raw: String },
    InvalidDbUrl { raw: String },
    MissingLearner,
    AdminRequired,
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingArg { what } => write!(f, "missing {what}"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidLessonId { raw } => write!(f, "invalid lesson id: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::MissingLearner => {
                write!(f, "--learner (or TUTOR_LEARNER_ID) is required")
            }
            ArgsError::AdminRequired => write!(f, "overview requires --admin"),
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

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- lessons");
    eprintln!("  cargo run -p app -- chat <lesson> <text> [--concept <name>]...");
    eprintln!("  cargo run -p app -- history <lesson>");
    eprintln!("  cargo run -p app -- clear <lesson>");
    eprintln!("  cargo run -p app -- complete <lesson>");
    eprintln!("  cargo run -p app -- stats");
    eprintln!("  cargo run -p app -- overview --admin");
    eprintln!();
    eprintln!("Common flags:");
    eprintln!("  --db <sqlite_url>   default sqlite://tutor.sqlite3");
    eprintln!("  --learner <id>      learner to act as");
    eprintln!("  --admin             act with the admin role");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  TUTOR_DB_URL, TUTOR_LEARNER_ID, TUTOR_LATENCY_MS, RUST_LOG");
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Lessons,
    Chat { lesson: LessonId, text: String },
    History { lesson: LessonId },
    Clear { lesson: LessonId },
    Complete { lesson: LessonId },
    Stats,
    Overview,
}

struct Args {
    db_url: String,
    learner: Option<String>,
    admin: bool,
    concepts: Vec<String>,
    positional: Vec<String>,
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut db_url = std::env::var("TUTOR_DB_URL")
            .ok()
            .map_or_else(|| "sqlite://tutor.sqlite3".into(), normalize_sqlite_url);
        let mut learner = std::env::var("TUTOR_LEARNER_ID").ok();
        let mut admin = false;
        let mut concepts = Vec::new();
        let mut positional = Vec::new();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--learner" => learner = Some(require_value(args, "--learner")?),
                "--admin" => admin = true,
                "--concept" => concepts.push(require_value(args, "--concept")?),
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ if arg.starts_with("--") => return Err(ArgsError::UnknownArg(arg)),
                _ => positional.push(arg),
            }
        }

        Ok(Self {
            db_url,
            learner,
            admin,
            concepts,
            positional,
        })
    }

    fn learner(&self) -> Result<Learner, Box<dyn std::error::Error>> {
        let raw = self.learner.as_deref().ok_or(ArgsError::MissingLearner)?;
        let role = if self.admin { Role::Admin } else { Role::Student };
        Ok(Learner::new(LearnerId::new(raw)?, role))
    }
}

impl Command {
    fn parse(name: &str, positional: Vec<String>) -> Result<Self, ArgsError> {
        let mut rest = positional.into_iter();
        let cmd = match name {
            "lessons" => Self::Lessons,
            "chat" => {
                let lesson = parse_lesson(rest.next())?;
                let text = rest.collect::<Vec<_>>().join(" ");
                if text.trim().is_empty() {
                    return Err(ArgsError::MissingArg { what: "message text" });
                }
                return Ok(Self::Chat { lesson, text });
            }
            "history" => Self::History {
                lesson: parse_lesson(rest.next())?,
            },
            "clear" => Self::Clear {
                lesson: parse_lesson(rest.next())?,
            },
            "complete" => Self::Complete {
                lesson: parse_lesson(rest.next())?,
            },
            "stats" => Self::Stats,
            "overview" => Self::Overview,
            other => return Err(ArgsError::UnknownArg(other.to_string())),
        };
        match rest.next() {
            Some(extra) => Err(ArgsError::UnknownArg(extra)),
            None => Ok(cmd),
        }
    }
}

fn parse_lesson(raw: Option<String>) -> Result<LessonId, ArgsError> {
    let raw = raw.ok_or(ArgsError::MissingArg { what: "lesson id" })?;
    raw.parse::<LessonId>()
        .map_err(|_| ArgsError::InvalidLessonId { raw })
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
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
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

fn sender_label(sender: Sender) -> &'static str {
    match sender {
        Sender::Learner => "you",
        Sender::Tutor => "tutor",
    }
}

async fn report_error_slot(ledger: &Ledger, session: &Session) {
    if let Some(err) = ledger.take_error(session).await {
        eprintln!("warning: {err}");
    }
}

async fn run_learner_command(
    ledger: &Ledger,
    session: &mut Session,
    cmd: Command,
    concepts: Vec<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    match cmd {
        Command::Chat { lesson, text } => {
            let Some(selected) = ledger.select_lesson(session, lesson).await? else {
                return Err(ArgsError::InvalidLessonId {
                    raw: lesson.to_string(),
                }
                .into());
            };
            if !ledger.get_lesson_progress(session, lesson).await.started() {
                ledger
                    .record_interaction(session, lesson, InteractionEvent::Start)
                    .await?;
            }
            println!("[{}] {}", selected.id(), selected.title());
            if let Some(reply) = ledger.send_message_and_wait(session, &text).await? {
                println!("tutor: {}", reply.text());
            }
            let progress = ledger
                .record_interaction(session, lesson, InteractionEvent::message(concepts))
                .await?;
            println!("progress: {}%", progress.progress_percentage());
        }
        Command::History { lesson } => {
            for message in ledger.get_conversation(session, lesson).await {
                println!(
                    "{} {}: {}",
                    message.timestamp().format("%Y-%m-%d %H:%M:%S"),
                    sender_label(message.sender()),
                    message.text()
                );
            }
        }
        Command::Clear { lesson } => {
            ledger.clear_conversation(session, lesson).await?;
            println!("cleared conversation for lesson {lesson}");
        }
        Command::Complete { lesson } => {
            ledger
                .record_interaction(session, lesson, InteractionEvent::Complete)
                .await?;
            println!("lesson {lesson} marked complete");
        }
        Command::Stats => {
            let summary = ledger.progress_summary(session).await;
            println!("overall:     {}%", summary.overall);
            println!("completed:   {}", summary.completed);
            println!("in progress: {}", summary.in_progress.len());
            println!("not started: {}", summary.not_started);
            println!("remaining:   {}", summary.estimated_time_remaining());
            for lesson in ledger.lessons() {
                let progress = ledger.get_lesson_progress(session, lesson.id()).await;
                println!(
                    "  {:>2} {:<40} {:>3}%",
                    lesson.id().value(),
                    lesson.title(),
                    progress.progress_percentage()
                );
            }
        }
        Command::Lessons | Command::Overview => {}
    }
    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv = std::env::args().skip(1);

    let name = match argv.next() {
        None => {
            print_usage();
            return Ok(());
        }
        Some(first) if first == "--help" || first == "-h" => {
            print_usage();
            return Ok(());
        }
        Some(first) => first,
    };

    let parsed = Args::parse(&mut argv)
        .and_then(|args| {
            let positional = args.positional.clone();
            Command::parse(&name, positional).map(|cmd| (args, cmd))
        })
        .map_err(|e| {
            eprintln!("{e}");
            print_usage();
            e
        })?;
    let (args, cmd) = parsed;

    if cmd == Command::Lessons {
        for lesson in tutor_core::model::Lesson::catalog() {
            println!(
                "{:>2} {} {:<40} {}",
                lesson.id().value(),
                lesson.icon(),
                lesson.title(),
                lesson.description()
            );
        }
        return Ok(());
    }

    let learner = args.learner()?;
    if cmd == Command::Overview && !learner.is_admin() {
        return Err(ArgsError::AdminRequired.into());
    }

    prepare_sqlite_file(&args.db_url)?;
    let ledger = Ledger::sqlite(&args.db_url, LedgerConfig::from_env(), Clock::default()).await?;
    info!(db = %args.db_url, "ledger ready");

    let mut session = ledger.login(learner).await?;
    let outcome = if cmd == Command::Overview {
        for overview in ledger.learner_overviews().await? {
            let last = overview.last_active.map_or_else(
                || "never".to_string(),
                |at| at.format("%Y-%m-%d %H:%M").to_string(),
            );
            println!(
                "{:<20} {:>3}% {:>2} completed  last active {last}",
                overview.learner.as_str(),
                overview.overall,
                overview.completed
            );
        }
        Ok(())
    } else {
        run_learner_command(&ledger, &mut session, cmd, args.concepts).await
    };
    report_error_slot(&ledger, &session).await;
    ledger.logout(session).await;
    outcome
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn chat_joins_remaining_words() {
        let cmd = Command::parse("chat", strings(&["2", "what", "is", "a", "qubit?"])).unwrap();
        assert_eq!(
            cmd,
            Command::Chat {
                lesson: LessonId::new(2),
                text: "what is a qubit?".into(),
            }
        );
    }

    #[test]
    fn rejects_bad_lesson_ids_and_extra_args() {
        assert!(matches!(
            Command::parse("history", strings(&["two"])),
            Err(ArgsError::InvalidLessonId { .. })
        ));
        assert!(matches!(
            Command::parse("stats", strings(&["now"])),
            Err(ArgsError::UnknownArg(_))
        ));
        assert!(matches!(
            Command::parse("chat", strings(&["1"])),
            Err(ArgsError::MissingArg { .. })
        ));
    }

    #[test]
    fn flags_collect_concepts_and_positionals() {
        let mut argv = strings(&["3", "--concept", "entanglement", "--admin", "--concept", "bell"])
            .into_iter();
        let args = Args::parse(&mut argv).unwrap();
        assert!(args.admin);
        assert_eq!(args.concepts, ["entanglement", "bell"]);
        assert_eq!(args.positional, ["3"]);
    }

    #[test]
    fn sqlite_urls_keep_explicit_scheme() {
        assert_eq!(
            normalize_sqlite_url("sqlite://tmp/a.db".into()),
            "sqlite://tmp/a.db"
        );
        assert_eq!(normalize_sqlite_url("sqlite::memory:".into()), "sqlite::memory:");
        assert!(normalize_sqlite_url("tutor.sqlite3".into()).starts_with("sqlite:///"));
    }
}
