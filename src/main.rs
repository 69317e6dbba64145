use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Mutex;

use clap::Parser;
use tracing::{error, info};
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod controller;
mod domain;
mod inputter;
mod model;
mod registry;
mod render;
mod session;
mod table;
mod ui;

use controller::Controller;
use domain::{SVConfig, SVError};
use model::{Model, Status};
use ui::ExplorerUI;

/// Browse survey responses in the terminal: all rows in a grid, one
/// respondent at a time, or every answer to one question.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// CSV or TSV file to open
    path: Option<String>,

    /// Start with the built-in example survey
    #[arg(long, conflicts_with = "path")]
    example: bool,

    /// Column used to label respondents
    #[arg(long, value_name = "NAME")]
    identifier: Option<String>,

    /// Maximum width of a grid column
    #[arg(long, value_name = "N", default_value_t = 40)]
    max_column_width: usize,

    /// Milliseconds to wait for terminal events
    #[arg(long, value_name = "N", default_value_t = 100)]
    poll_ms: u64,

    /// Write logs to this file, filtered by RUST_LOG
    #[arg(long, value_name = "PATH")]
    log_file: Option<String>,
}

impl Args {
    fn config(&self) -> SVConfig {
        let config = SVConfig::default()
            .with_event_poll_time(self.poll_ms)
            .with_max_column_width(self.max_column_width);
        match &self.identifier {
            Some(name) => config.with_identifier(name.clone()),
            None => config,
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    if let Some(log_file) = &args.log_file
        && let Err(e) = init_logging(log_file)
    {
        eprintln!("Error: {e}");
        return ExitCode::FAILURE;
    }

    let result = run(&args);
    ratatui::restore();
    match result {
        Err(e) => {
            error!("sv stopped: {e}");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
        Ok(_) => ExitCode::SUCCESS,
    }
}

fn init_logging(log_file: &str) -> Result<(), SVError> {
    let path = shellexpand::full(log_file)
        .map_err(|e| SVError::InvalidArgument(e.to_string()))?
        .to_string();
    let file = File::create(PathBuf::from(path))?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        )
        .with(ErrorLayer::default())
        .init();
    Ok(())
}

fn run(args: &Args) -> Result<(), SVError> {
    info!("Starting sv");
    let cfg = args.config();

    let mut terminal = ratatui::init();
    let size = terminal.size()?;
    let mut model = Model::init(&cfg, size.width as usize, size.height as usize)?;

    if let Some(path) = &args.path {
        // Failures are shown in the content area
        if let Err(e) = model.load_data_file(&PathBuf::from(path)) {
            error!("Could not open {path}: {e}");
        }
    } else if args.example {
        model.load_example()?;
    }

    let mut ui = ExplorerUI::new();
    let controller = Controller::new(&cfg);

    while model.status != Status::Quitting {
        terminal.draw(|f| ui.draw(&model, f))?;
        model.update(controller.handle_event(&model)?)?;
    }

    info!("Exiting sv");
    Ok(())
}
