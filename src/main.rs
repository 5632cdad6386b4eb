use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::Parser;
use crossterm::cursor::SetCursorStyle;
use crossterm::event::{DisableMouseCapture, EnableMouseCapture};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::prelude::*;

mod ai_client;
mod app;
mod assistant;
mod channel;
mod config;
mod diagnostics;
mod editor;
mod events;
mod language;
mod logging;
mod notice;
mod sandbox;
mod session;
mod terminal;
mod text_input;
mod theme;
mod ui;


use ai_client::HttpAiBackend;
use app::{App, AppOptions};
use channel::{ExecutionChannel, RemoteChannel};
use config::{CodepadConfig, SandboxMode};
use editor::TextBufferFactory;
use language::Language;
use sandbox::LocalSandbox;
use session::SessionRequest;
use theme::Theme;

/// Terminal code playground with per-tab editors, a shared run terminal and
/// an AI assistant.
#[derive(Debug, Parser)]
#[command(name = "codepad", version)]
struct Cli {
    /// Config file to read instead of ~/.codepad/config.toml.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Language for new tabs.
    #[arg(long)]
    language: Option<Language>,
    /// Open a source file in the first tab.
    #[arg(long, value_name = "FILE")]
    open: Option<PathBuf>,
    /// Use a remote execution server at HOST:PORT.
    #[arg(long, value_name = "ADDR")]
    remote: Option<String>,
    /// Print the effective configuration as JSON and exit.
    #[arg(long)]
    print_config: bool,
    /// List supported languages and exit.
    #[arg(long)]
    list_languages: bool,
}

fn main() -> io::Result<()> {
    let cli = Cli::parse();
    if cli.list_languages {
        for language in Language::ALL {
            println!("{language}\t{}", language.source_file_name());
        }
        return Ok(());
    }

    let config = effective_config(&cli)?;
    if cli.print_config {
        let json = serde_json::to_string_pretty(&config).map_err(io::Error::other)?;
        println!("{json}");
        return Ok(());
    }

    logging::init_logging(&config)?;
    let initial = initial_request(cli.open.as_deref(), cli.language, &config)?;
    let channel: Box<dyn ExecutionChannel> = match config.sandbox.mode {
        SandboxMode::Local => Box::new(LocalSandbox::new(config.scratch_dir()?)),
        SandboxMode::Remote => Box::new(RemoteChannel::connect(config.sandbox.address.clone())),
    };
    let backend = HttpAiBackend::new(config.assistant.endpoint.clone(), config.ai_timeout())?;
    let mut app = App::new(
        Box::new(TextBufferFactory),
        channel,
        Box::new(backend),
        AppOptions {
            default_language: config.editor.default_language,
            provider: config.assistant.provider,
            diagnostics_debounce: config.diagnostics_debounce(),
        },
    );
    app.open_session(initial);
    let theme = Theme::load_or_default(config.theme_file()?);
    tracing::info!(mode = ?config.sandbox.mode, "codepad started");

    enable_raw_mode()?;

    let mut stdout = io::stdout();
    execute!(
        stdout,
        EnterAlternateScreen,
        EnableMouseCapture,
        SetCursorStyle::SteadyBar
    )?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;
    let result = run_app(&mut terminal, app, &theme);

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        SetCursorStyle::DefaultUserShape,
        DisableMouseCapture,
        LeaveAlternateScreen
    )?;
    terminal.show_cursor()?;

    if let Err(err) = &result {
        tracing::error!("ui loop failed: {err}");
    }
    result
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    mut app: App,
    theme: &Theme,
) -> io::Result<()> {
    while app.running {
        terminal.draw(|frame| ui::render(frame, &app, theme))?;
        let event = events::next_event()?;
        app.handle_event(event, Instant::now());
    }
    Ok(())
}

/// Config file values with command-line overrides applied.
fn effective_config(cli: &Cli) -> io::Result<CodepadConfig> {
    let mut config = config::load_config(cli.config.as_deref())?;
    if let Some(address) = &cli.remote {
        config.sandbox.mode = SandboxMode::Remote;
        config.sandbox.address = address.clone();
    }
    if let Some(language) = cli.language {
        config.editor.default_language = language;
    }
    Ok(config)
}

fn initial_request(
    open: Option<&Path>,
    language: Option<Language>,
    config: &CodepadConfig,
) -> io::Result<SessionRequest> {
    let Some(path) = open else {
        return Ok(SessionRequest::new(config.editor.default_language));
    };
    let code = fs::read_to_string(path)?;
    let language = language
        .or_else(|| language_for_path(path))
        .unwrap_or(config.editor.default_language);
    Ok(SessionRequest {
        language,
        name: path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned()),
        initial_content: Some(code),
    })
}

/// Guesses the language from the file extension.
fn language_for_path(path: &Path) -> Option<Language> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    let alias = match extension.as_str() {
        "cc" | "cxx" | "hpp" | "h" => Some(Language::Cpp),
        "mjs" | "cjs" => Some(Language::Javascript),
        "bash" => Some(Language::Bash),
        _ => None,
    };
    alias.or_else(|| {
        Language::ALL.into_iter().find(|language| {
            Path::new(language.source_file_name())
                .extension()
                .and_then(|ext| ext.to_str())
                == Some(extension.as_str())
        })
    })
}

#[cfg(test)]
#[path = "../tests/unit/main_launch_tests.rs"]
mod launch_tests;
