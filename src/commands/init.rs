use crate::commands::Out;
use crate::error::{ErrorType, IntoResult};
use crate::loader::LedgerFile;
use crate::{Config, Result};
use anyhow::Context;
use std::path::Path;
use tracing::debug;

/// Creates the data directory with an initial `config.json` and, unless one is already there, an
/// empty ledger file.
///
/// # Arguments
/// - `home` - The directory that will be the root of data directory, e.g. `$HOME/bilancial`
///
/// # Errors
/// - Returns an error if any file operations fail or the directory already holds a config.
pub async fn init(home: &Path) -> Result<Out<()>> {
    let config = Config::create(home)
        .await
        .context("Unable to create the data directory and configs")
        .pub_result(ErrorType::Config)?;

    let ledger_path = config.ledger_path();
    if ledger_path.is_file() {
        debug!("Keeping the existing ledger at {}", ledger_path.display());
    } else {
        LedgerFile::default()
            .save(&ledger_path)
            .await
            .context("Unable to create the ledger file")
            .pub_result(ErrorType::Ledger)?;
    }
    Ok(format!(
        "Successfully created the bilancial directory at {}",
        config.root().display()
    )
    .into())
}
