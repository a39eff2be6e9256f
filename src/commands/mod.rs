//! Command handlers for the bilancial CLI.
//!
//! This module contains implementations for all CLI subcommands.

mod accounts;
mod categories;
mod init;
mod overlay;
mod report;

use crate::engine::Books;
use crate::error::Res;
use crate::model::{CategoryId, CategoryRegistry};
use crate::{loader, Config};
use anyhow::Context;
use serde::Serialize;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::{debug, info};

pub use accounts::{accounts, AccountLine};
pub use categories::{categories, CategoryLine};
pub use init::init;
pub use overlay::{overlay, OverlayLine};
pub use report::{report, Report, ReportWindow};

/// The output type for a command. This allows the command to return a consistent message and,
/// optionally, structured data.
#[derive(Debug, Clone, Serialize)]
pub struct Out<T>
where
    T: Serialize + Clone + Debug,
{
    /// A message that can be printed to the user regarding the outcome of the command execution.
    message: String,

    /// Any structured data that needs to be output from the call.
    structure: Option<T>,
}

impl<T, S> From<S> for Out<T>
where
    T: Debug + Clone + Serialize,
    S: Into<String>,
{
    fn from(value: S) -> Self {
        Out::new_message(value)
    }
}

impl<T> Out<T>
where
    T: Serialize + Clone + Debug,
{
    /// Create a new `Out` object that has `Some(structure)`.
    pub fn new<S>(message: S, structure: T) -> Self
    where
        S: Into<String>,
    {
        Self {
            message: message.into(),
            structure: Some(structure),
        }
    }

    /// Create a new `Out` object that has `None` for `structure`.
    pub fn new_message<S>(message: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            message: message.into(),
            structure: None,
        }
    }

    /// Get the `message`.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the structured data stored in `structure`.
    pub fn structure(&self) -> Option<&T> {
        self.structure.as_ref()
    }

    /// Print the message to `info!` and the structured data (if it exists) as JSON to `debug!`.
    pub fn print(&self) {
        info!("{}", self.message);
        if let Some(structure) = self.structure() {
            if let Ok(json) = serde_json::to_string_pretty(structure) {
                debug!("Command output:\n\n{json}\n\n");
            }
        }
    }
}

/// Loads the ledger named by `config` into a fresh registry.
async fn open_books(config: &Config) -> Res<Books> {
    let registry = Arc::new(CategoryRegistry::new());
    let ledger = loader::load(
        &config.ledger_path(),
        &registry,
        config.category_separator(),
    )
    .await?;
    Ok(Books::new(registry, ledger))
}

/// Resolves a category path given on the command line. Unknown paths are an error.
fn find_category(registry: &CategoryRegistry, path: &str, separator: &str) -> Res<CategoryId> {
    registry
        .find_str(path, separator)
        .with_context(|| format!("There is no category '{path}' in the ledger"))
}
