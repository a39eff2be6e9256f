use crate::commands::{open_books, Out};
use crate::error::{ErrorType, IntoResult};
use crate::model::Amount;
use crate::{Config, Result};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt::Write;

/// The balances of one account.
#[derive(Debug, Clone, Serialize, Eq, PartialEq)]
pub struct AccountLine {
    pub id: String,
    pub description: String,
    pub opening: Decimal,
    pub closing: Decimal,
}

/// Lists every account with its opening balance and its balance after every entry.
pub async fn accounts(config: Config) -> Result<Out<Vec<AccountLine>>> {
    let books = open_books(&config).await.pub_result(ErrorType::Ledger)?;
    let bilancial = books.refresh().pub_result(ErrorType::Engine)?;

    let lines: Vec<AccountLine> = books
        .ledger()
        .accounts()
        .iter()
        .map(|(id, account)| AccountLine {
            id: id.to_string(),
            description: account.account().describe(),
            opening: bilancial.account_before(id),
            closing: bilancial.account_after(id),
        })
        .collect();

    let mut message = String::new();
    for line in &lines {
        let _ = writeln!(
            message,
            "{}: {} -> {}",
            line.description,
            Amount::new(line.opening),
            Amount::new(line.closing)
        );
    }
    let _ = write!(message, "{} accounts", lines.len());
    Ok(Out::new(message, lines))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::{TestEnv, LEDGER_JSON};

    #[tokio::test]
    async fn test_accounts() {
        let env = TestEnv::new().await;
        env.write_ledger(LEDGER_JSON).await;
        let out = accounts(env.config()).await.unwrap();
        let lines = out.structure().unwrap();
        assert_eq!(lines.len(), 2);

        // Accounts are listed by id.
        assert_eq!(lines[0].id, "bank");
        assert_eq!(lines[0].opening, Decimal::ZERO);
        assert_eq!(lines[0].closing, Decimal::from(50));
        assert_eq!(lines[1].id, "cash");
        assert_eq!(lines[1].opening, Decimal::from(100));
        assert_eq!(lines[1].closing, Decimal::from(100));
        assert!(out.message().contains("-> 50.00"));
    }
}
