use anyhow::Result;
use clap::Parser;
use crossterm::{
    event::{self, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use std::{io, path::PathBuf};

mod config;
mod dialog;
mod error;
mod logging;
mod rules;
mod session;
mod status;
mod ui;
mod ufw;
mod viewport;

use config::Config;
use session::Session;
use ufw::{CommandRunner, SimulatedRunner, SystemRunner};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Work against an in-memory firewall instead of ufw
    #[arg(short, long)]
    simulate: bool,

    /// Write the log here instead of a fresh file in the temp dir
    #[arg(short, long)]
    logfile: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long)]
    debug: bool,

    /// Read configuration from this JSON file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Seconds to wait for a single ufw call
    #[arg(long)]
    timeout: Option<u64>,

    /// Path of the ufw binary
    #[arg(long)]
    ufw: Option<String>,

    /// Re-sort the list after every add
    #[arg(long)]
    sort_on_add: bool,

    /// Print the effective configuration as JSON and exit
    #[arg(long)]
    print_config: bool,
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        if let Some(secs) = self.timeout {
            config.command_timeout_secs = secs;
        }
        if let Some(ufw) = &self.ufw {
            config.ufw_path = ufw.clone();
        }
        if let Some(path) = &self.logfile {
            config.log_file = Some(path.clone());
        }
        config.sort_on_add |= self.sort_on_add;
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    cli.apply(&mut config);

    if cli.print_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let log_path = config.log_file.clone().unwrap_or_else(logging::default_log_path);
    logging::init(&log_path, cli.debug)?;
    tracing::info!(user = %logging::current_user(), simulate = cli.simulate, ?config, "starting");

    // rules are read before the terminal is touched, so a bad listing
    // aborts with a plain error message
    if cli.simulate {
        let mut session = Session::load(SimulatedRunner::demo(), config.sort_on_add)?;
        run(&mut session)?;
        tracing::info!(commands = ?session.runner().history(), "simulated session finished");
        Ok(())
    } else {
        let mut runner = SystemRunner::new(config.ufw_path.clone(), config.elevation, config.timeout())?;
        runner.authenticate()?;
        let mut session = Session::load(runner, config.sort_on_add)?;
        run(&mut session)
    }
}

fn run<R: CommandRunner>(session: &mut Session<R>) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, session);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    match &res {
        Ok(()) => tracing::info!(rules = session.rules().len(), "session ended"),
        Err(err) => tracing::error!(error = %err, "session aborted"),
    }
    res
}

/// One redraw per key press; there is nothing to refresh in between.
fn run_app<B: Backend, R: CommandRunner>(terminal: &mut Terminal<B>, session: &mut Session<R>) -> Result<()> {
    loop {
        terminal.draw(|f| ui::draw(f, session))?;

        if let Event::Key(key) = event::read()? {
            if key.kind == KeyEventKind::Press {
                session.handle_key(key.code);
            }
        }

        if session.take_reauth_request() {
            // sudo prompts on the real terminal
            disable_raw_mode()?;
            execute!(io::stdout(), LeaveAlternateScreen)?;
            session.reauthenticate();
            execute!(io::stdout(), EnterAlternateScreen)?;
            enable_raw_mode()?;
            terminal.clear()?;
        }

        if session.should_quit() {
            return Ok(());
        }
    }
}
