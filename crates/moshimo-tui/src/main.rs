use anyhow::{anyhow, Context, Result};
use clap::Parser;
use moshimo_core::{ai, BackendOverrides, Config, ConversationController, PersonaCatalog};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

mod app;
mod handler;
mod tui;
mod ui;

use app::App;
use tui::EventHandler;

#[derive(Parser)]
#[command(name = "moshimo")]
#[command(version, about = "Chat with AI personas in the terminal")]
struct Cli {
    /// Persona catalog (.toml or .json)
    #[arg(short, long, default_value = "personas.toml")]
    personas: PathBuf,

    /// Persona to start with (defaults to the last one used)
    #[arg(long)]
    persona: Option<String>,

    /// Backend provider: openai or claude
    #[arg(long)]
    provider: Option<String>,

    /// Model name
    #[arg(short, long)]
    model: Option<String>,

    /// API base URL, e.g. a local OpenAI-compatible server
    #[arg(long)]
    base_url: Option<String>,

    /// Request timeout in seconds (0 disables it)
    #[arg(long)]
    timeout: Option<u64>,
}

/// Log to a file: the terminal belongs to the UI.
fn init_logging() -> Option<WorkerGuard> {
    let dir = Config::config_dir().unwrap_or_else(|_| std::env::temp_dir());
    if let Err(e) = std::fs::create_dir_all(&dir) {
        eprintln!("Warning: logging disabled, cannot create {}: {}", dir.display(), e);
        return None;
    }

    let appender = tracing_appender::rolling::never(&dir, "moshimo.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("moshimo=info,moshimo_core=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false),
        )
        .init();

    Some(guard)
}

fn load_catalog(path: &Path) -> Result<PersonaCatalog> {
    PersonaCatalog::load(path)
        .with_context(|| format!("could not load personas from {}", path.display()))
}

/// CLI choice first, then the last persona used, then the first in the file.
fn initial_persona(catalog: &PersonaCatalog, cli: Option<&str>, config: &Config) -> Result<usize> {
    if let Some(name) = cli {
        return catalog.position(name).ok_or_else(|| {
            let known: Vec<&str> = catalog.list().iter().map(|p| p.name()).collect();
            anyhow!("unknown persona '{}' (available: {})", name, known.join(", "))
        });
    }

    let remembered = config
        .last_persona
        .as_deref()
        .and_then(|name| catalog.position(name));
    Ok(remembered.unwrap_or(0))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _log_guard = init_logging();

    let config = Config::load().unwrap_or_else(|e| {
        tracing::warn!("ignoring unreadable config: {:#}", e);
        eprintln!("Warning: could not read config, using defaults: {:#}", e);
        Config::default()
    });

    let overrides = BackendOverrides {
        provider: cli.provider,
        model: cli.model,
        base_url: cli.base_url,
        timeout_secs: cli.timeout,
    };
    let backend = config.resolve(&overrides)?;

    let catalog = Arc::new(load_catalog(&cli.personas)?);
    let persona_index = initial_persona(&catalog, cli.persona.as_deref(), &config)?;
    let generation = config.generation.unwrap_or_default();

    tracing::info!(
        provider = backend.provider.as_str(),
        model = %backend.model,
        personas = catalog.len(),
        "starting"
    );

    let controller = ConversationController::new(ai::connect(&backend));
    let mut app = App::new(catalog, controller, backend.provider, persona_index, generation);

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = EventHandler::new();

    let result = run(&mut terminal, &mut app, &mut events).await;

    tui::restore()?;
    result
}

async fn run(terminal: &mut tui::Tui, app: &mut App, events: &mut EventHandler) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        match events.next().await {
            Some(event) => handler::handle_event(app, event).await?,
            None => break,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> PersonaCatalog {
        PersonaCatalog::parse_json(
            r#"[{"name": "Socrates", "style": "questions"}, {"name": "Pirate", "style": "arr"}]"#,
        )
        .and_then(PersonaCatalog::from_records)
        .unwrap()
    }

    #[test]
    fn test_initial_persona_precedence() {
        let catalog = catalog();
        let config = Config {
            last_persona: Some("Pirate".to_string()),
            ..Config::default()
        };

        assert_eq!(initial_persona(&catalog, Some("Socrates"), &config).unwrap(), 0);
        assert_eq!(initial_persona(&catalog, None, &config).unwrap(), 1);
        assert_eq!(initial_persona(&catalog, None, &Config::default()).unwrap(), 0);
    }

    #[test]
    fn test_forgotten_persona_falls_back_to_first() {
        let config = Config {
            last_persona: Some("Removed".to_string()),
            ..Config::default()
        };
        assert_eq!(initial_persona(&catalog(), None, &config).unwrap(), 0);
    }

    #[test]
    fn test_unknown_cli_persona_lists_choices() {
        let err = initial_persona(&catalog(), Some("Plato"), &Config::default()).unwrap_err();
        assert!(err.to_string().contains("Socrates, Pirate"));
    }

    #[test]
    fn test_cli_parses_overrides() {
        let cli = Cli::parse_from([
            "moshimo",
            "--personas",
            "cast.json",
            "--provider",
            "claude",
            "--timeout",
            "0",
        ]);
        assert_eq!(cli.personas, PathBuf::from("cast.json"));
        assert_eq!(cli.provider.as_deref(), Some("claude"));
        assert_eq!(cli.timeout, Some(0));
        assert!(cli.persona.is_none());
    }
}
