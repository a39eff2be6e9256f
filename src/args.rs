//! These structs provide the CLI interface for the bilancial CLI.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::convert::Infallible;
use std::fmt::{Display, Formatter};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::error;
use tracing_subscriber::filter::LevelFilter;

/// bilancial: hierarchical bookkeeping reports from a ledger file.
///
/// Entries are booked on accounts and on categories such as `Food:Drinks`. Reading points and
/// other separators cut the ledger into windows, and bilancial sums every window per category,
/// rolling the sums up to the parent categories, along with the balance of every account.
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
    /// Create the data directory with a default config and an empty ledger.
    ///
    /// By default the data directory is $HOME/bilancial. Pass --bilancial-home or set
    /// BILANCIAL_HOME to put it somewhere else.
    Init,
    /// Print the category sums of one window of the ledger.
    Report(ReportArgs),
    /// Print the category tree with the total of every category.
    Categories,
    /// Print the opening and closing balance of every account.
    Accounts,
    /// Show, hide or mask categories in reports.
    Overlay(OverlayArgs),
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

    /// The directory where the ledger and configuration are held. Defaults to ~/bilancial
    #[arg(long, env = "BILANCIAL_HOME", default_value_t = default_bilancial_home())]
    bilancial_home: DisplayPath,
}

impl Common {
    pub fn log_level(&self) -> LevelFilter {
        self.log_level
    }

    pub fn bilancial_home(&self) -> &DisplayPath {
        &self.bilancial_home
    }
}

/// Args for the `bilancial report` command.
#[derive(Debug, Parser, Clone, Default)]
pub struct ReportArgs {
    /// The id of the separator whose window is reported. Defaults to the last window.
    #[arg(long)]
    separator: Option<u64>,

    /// Only aggregate entries booked on this account.
    #[arg(long)]
    account: Option<String>,

    /// Only aggregate entries in this category, e.g. `Food:Drinks`, and its subcategories.
    #[arg(long)]
    category: Option<String>,

    /// With --category, leave out the subcategories.
    #[arg(long, requires = "category")]
    exclude_subcategories: bool,

    /// Only aggregate entries dated on or after this day (YYYY-MM-DD).
    #[arg(long)]
    from: Option<NaiveDate>,

    /// Only aggregate entries dated on or before this day (YYYY-MM-DD).
    #[arg(long)]
    to: Option<NaiveDate>,

    /// Only aggregate entries whose name contains this text, ignoring case.
    #[arg(long)]
    name: Option<String>,
}

impl ReportArgs {
    pub fn separator(&self) -> Option<u64> {
        self.separator
    }

    pub fn account(&self) -> Option<&str> {
        self.account.as_deref()
    }

    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    pub fn exclude_subcategories(&self) -> bool {
        self.exclude_subcategories
    }

    pub fn from(&self) -> Option<NaiveDate> {
        self.from
    }

    pub fn to(&self) -> Option<NaiveDate> {
        self.to
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn with_separator(mut self, separator: u64) -> Self {
        self.separator = Some(separator);
        self
    }

    pub fn with_account(mut self, account: impl Into<String>) -> Self {
        self.account = Some(account.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>, subcategories: bool) -> Self {
        self.category = Some(category.into());
        self.exclude_subcategories = !subcategories;
        self
    }

    pub fn with_dates(mut self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        self.from = from;
        self.to = to;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Args for the `bilancial overlay` command.
#[derive(Debug, Parser, Clone)]
pub struct OverlayArgs {
    #[command(subcommand)]
    action: OverlayAction,
}

impl OverlayArgs {
    pub fn new(action: OverlayAction) -> Self {
        Self { action }
    }

    pub fn action(&self) -> &OverlayAction {
        &self.action
    }
}

#[derive(Subcommand, Debug, Clone, Eq, PartialEq)]
pub enum OverlayAction {
    /// List every category that is hidden or masked.
    List,
    /// Hide a category. Its figures are shown in the nearest visible parent.
    Hide {
        /// The category path, e.g. `Food:Drinks`
        category: String,
    },
    /// Show a hidden category again.
    Show {
        /// The category path, e.g. `Food:Drinks`
        category: String,
    },
    /// Print a category under another label.
    Mask {
        /// The category path, e.g. `Food:Drinks`
        category: String,
        /// The label to print instead of the category name
        mask: String,
    },
    /// Remove the mask of a category.
    Unmask {
        /// The category path, e.g. `Food:Drinks`
        category: String,
    },
}

fn default_bilancial_home() -> DisplayPath {
    DisplayPath(match dirs::home_dir() {
        Some(home) => home.join("bilancial"),
        None => {
            error!(
                "There was an error when trying to get your home directory. You can get around \
                this by providing --bilancial-home or BILANCIAL_HOME instead of relying on the \
                default home directory. If you continue using the program right now, you may have \
                problems!",
            );
            PathBuf::from("bilancial")
        }
    })
}

#[derive(Debug, Default, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct DisplayPath(PathBuf);

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
    pub fn path(&self) -> &Path {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_report() {
        let args = Args::try_parse_from([
            "bilancial",
            "--bilancial-home",
            "/tmp/books",
            "--log-level",
            "debug",
            "report",
            "--category",
            "Food:Drinks",
            "--exclude-subcategories",
            "--from",
            "2024-03-01",
        ])
        .unwrap();
        assert_eq!(args.common().bilancial_home().path(), Path::new("/tmp/books"));
        assert_eq!(args.common().log_level(), LevelFilter::DEBUG);
        let Command::Report(report) = args.command() else {
            panic!("expected the report command");
        };
        assert_eq!(report.category(), Some("Food:Drinks"));
        assert!(report.exclude_subcategories());
        assert_eq!(report.from(), NaiveDate::from_ymd_opt(2024, 3, 1));
        assert_eq!(report.to(), None);
    }

    #[test]
    fn test_exclude_subcategories_requires_category() {
        let result = Args::try_parse_from(["bilancial", "report", "--exclude-subcategories"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_overlay_mask() {
        let args =
            Args::try_parse_from(["bilancial", "overlay", "mask", "Food:Drinks", "Beverages"])
                .unwrap();
        let Command::Overlay(overlay) = args.command() else {
            panic!("expected the overlay command");
        };
        assert_eq!(
            overlay.action(),
            &OverlayAction::Mask {
                category: "Food:Drinks".to_string(),
                mask: "Beverages".to_string()
            }
        );
    }
}
