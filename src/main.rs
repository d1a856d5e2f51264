use balance_sheet::args::{Args, Command};
use balance_sheet::{api, commands, Mode, Result, Settings};
use clap::Parser;
use std::process::ExitCode;
use tracing::{debug, error, trace};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let log_level = args.common().log_level();
    init_logger(log_level);
    debug!("Log level set to {}", log_level.to_string().to_lowercase());

    match main_inner(args).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Exiting with error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

pub async fn main_inner(args: Args) -> Result<()> {
    trace!("{args:?}");
    let home = args.common().home().path();

    // This allows for running the program without a backend. When BALANCE_SHEET_TEST_MODE is set
    // and non-zero in length, then the mode will be Mode::Testing, otherwise it will be Mode::Http.
    let mode = Mode::from_env();

    // Route to appropriate command handler
    let _: () = match args.command() {
        Command::Init(init_args) => commands::init(home, init_args.host(), init_args.port())
            .await?
            .print(),

        Command::Settings(settings_args) => {
            let settings = Settings::load(home).await?;
            commands::settings(settings, settings_args.clone())
                .await?
                .print()
        }

        Command::Summary => {
            let settings = Settings::load(home).await?;
            let backend = api::backend(&settings, mode)?;
            commands::summary(settings, backend).await?.print()
        }

        Command::List => {
            let settings = Settings::load(home).await?;
            let backend = api::backend(&settings, mode)?;
            commands::list(settings, backend).await?.print()
        }

        Command::Add(add_args) => {
            let settings = Settings::load(home).await?;
            let backend = api::backend(&settings, mode)?;
            commands::add(settings, backend, add_args.clone())
                .await?
                .print()
        }

        Command::Edit(edit_args) => {
            let settings = Settings::load(home).await?;
            let backend = api::backend(&settings, mode)?;
            commands::edit(settings, backend, edit_args.clone())
                .await?
                .print()
        }
    };
    Ok(())
}

/// Initializes the tracing subscriber.
pub fn init_logger(level: LevelFilter) {
    let filter = match std::env::var("RUST_LOG").ok() {
        Some(_) => {
            // RUST_LOG exists; use it.
            EnvFilter::from_default_env()
        }
        None => {
            // RUST_LOG does not exist; use default log level for the library and binary only.
            EnvFilter::new(format!(
                "{}={},{}={}",
                env!("CARGO_PKG_NAME").replace('-', "_"),
                level,
                env!("CARGO_BIN_NAME"),
                level
            ))
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
