//! These structs provide the CLI interface for the balancesheet CLI.

use crate::model::{ExportTo, Location, Position};
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::convert::Infallible;
use std::fmt::{Display, Formatter};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::error;
use tracing_subscriber::filter::LevelFilter;

/// balancesheet: A command-line client for a household income/expense backend.
///
/// Record incomes and expenses, look at this month's totals and the remaining food budget of each
/// person, and correct entries that have already been submitted.
///
/// Run `balancesheet init --host <host> --port <port>` first to point the program at your
/// backend.
#[derive(Debug, Parser, Clone)]
pub struct Args {
    #[clap(flatten)]
    common: Common,

    #[command(subcommand)]
    command: Command,
}

impl Args {
    pub fn new(common: Common, command: Command) -> Self {
        Self { common, command }
    }

    pub fn common(&self) -> &Common {
        &self.common
    }

    pub fn command(&self) -> &Command {
        &self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Create the home directory and the settings file.
    ///
    /// This is the first command you should run. By default the home directory is
    /// $HOME/balancesheet, pass --home or set BALANCE_SHEET_HOME to put it somewhere else.
    Init(InitArgs),
    /// Show the settings, or change them when any option is given.
    Settings(SettingsArgs),
    /// Fetch and print this month's totals, including the food budget left for each person.
    Summary,
    /// Fetch and print this month's transactions.
    List,
    /// Submit a new income or expense.
    Add(AddArgs),
    /// Change a transaction that was already submitted.
    Edit(EditArgs),
}

/// Arguments common to all subcommands.
#[derive(Debug, Parser, Clone)]
pub struct Common {
    /// The logging verbosity. One of, from least to most verbose:
    /// off, error, warn, info, debug, trace
    ///
    /// This can be overridden by RUST_LOG.
    #[arg(long, default_value_t = LevelFilter::INFO)]
    log_level: LevelFilter,

    /// The directory where the settings are held. Defaults to ~/balancesheet
    #[arg(long, env = "BALANCE_SHEET_HOME", default_value_t = default_home())]
    home: DisplayPath,
}

impl Common {
    pub fn new(log_level: LevelFilter, home: PathBuf) -> Self {
        Self {
            log_level,
            home: home.into(),
        }
    }

    pub fn log_level(&self) -> LevelFilter {
        self.log_level
    }

    pub fn home(&self) -> &DisplayPath {
        &self.home
    }
}

/// (Not shown): Args for the `balancesheet init` command.
#[derive(Debug, ClapArgs, Clone)]
pub struct InitArgs {
    /// The host name or IP address of the backend.
    #[arg(long)]
    host: String,

    /// The port of the backend.
    #[arg(long, default_value_t = 8080)]
    port: u16,
}

impl InitArgs {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

/// (Not shown): Args for the `balancesheet settings` command.
#[derive(Debug, Default, ClapArgs, Clone)]
pub struct SettingsArgs {
    #[arg(long)]
    pub host: Option<String>,

    #[arg(long)]
    pub port: Option<u16>,

    /// The persons of the household. Replaces the current list.
    #[arg(long, num_args = 1..)]
    pub persons: Option<Vec<String>>,

    /// The monthly food budget of each person.
    #[arg(long)]
    pub food_budget: Option<String>,

    /// The position preselected by `add`.
    #[arg(long)]
    pub default_position: Option<Position>,

    /// The location preselected by `add`.
    #[arg(long)]
    pub default_location: Option<Location>,
}

impl SettingsArgs {
    /// Whether any setting is to be changed.
    pub fn has_changes(&self) -> bool {
        self.host.is_some()
            || self.port.is_some()
            || self.persons.is_some()
            || self.food_budget.is_some()
            || self.default_position.is_some()
            || self.default_location.is_some()
    }
}

/// (Not shown): Args for the `balancesheet add` command.
#[derive(Debug, Default, ClapArgs, Clone)]
pub struct AddArgs {
    #[arg(long)]
    pub person: String,

    /// Defaults to the default position from the settings.
    #[arg(long)]
    pub position: Option<Position>,

    /// Defaults to the default location from the settings.
    #[arg(long)]
    pub location: Option<Location>,

    /// The date as dd/MM/yyyy. Defaults to today.
    #[arg(long)]
    pub date: Option<String>,

    #[arg(long, conflicts_with = "expense", required_unless_present = "expense")]
    pub income: Option<String>,

    #[arg(long)]
    pub expense: Option<String>,

    #[arg(long, default_value = "")]
    pub comment: String,

    /// Marks the entry as not relevant for taxes.
    #[arg(long)]
    pub not_taxable: bool,

    /// The tax report to export the entry to. Defaults to auto.
    #[arg(long)]
    pub export_to: Option<ExportTo>,
}

/// (Not shown): Args for the `balancesheet edit` command.
#[derive(Debug, Default, ClapArgs, Clone)]
pub struct EditArgs {
    /// A file holding the transaction as printed by `list`, or - to read it from stdin.
    #[arg(long)]
    pub record: PathBuf,

    /// The new date as dd/MM/yyyy.
    #[arg(long)]
    pub date: Option<String>,

    #[arg(long)]
    pub person: Option<String>,

    #[arg(long)]
    pub location: Option<String>,

    #[arg(long)]
    pub position: Option<String>,

    #[arg(long)]
    pub income: Option<String>,

    #[arg(long)]
    pub expense: Option<String>,

    #[arg(long)]
    pub comment: Option<String>,

    /// true or false.
    #[arg(long)]
    pub taxable: Option<String>,

    /// One of auto, hollgasse, arbeitnehmerveranlagung, both, none.
    #[arg(long)]
    pub export_to: Option<String>,
}

fn default_home() -> DisplayPath {
    DisplayPath(match dirs::home_dir() {
        Some(home) => home.join("balancesheet"),
        None => {
            error!(
                "There was an error when trying to get your home directory. You can get around \
                this by providing --home or BALANCE_SHEET_HOME instead of relying on the default \
                home directory. If you continue using the program right now, you may have \
                problems!",
            );
            PathBuf::from("balancesheet")
        }
    })
}

#[derive(Debug, Default, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct DisplayPath(PathBuf);

impl From<PathBuf> for DisplayPath {
    fn from(value: PathBuf) -> Self {
        DisplayPath(value)
    }
}

impl Deref for DisplayPath {
    type Target = Path;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<Path> for DisplayPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl Display for DisplayPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_string_lossy())
    }
}

impl FromStr for DisplayPath {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(PathBuf::from(s)))
    }
}

impl DisplayPath {
    pub fn new(path: PathBuf) -> Self {
        Self(path)
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}
