use crate::commands::{open_books, Out};
use crate::error::{ErrorType, IntoResult};
use crate::model::{CategoryId, CategoryLookup, CategoryTree};
use crate::{Config, Result};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write;

/// One category of the tree with the sum of every entry in it and its subcategories.
#[derive(Debug, Clone, Serialize, Eq, PartialEq)]
pub struct CategoryLine {
    pub path: String,
    pub depth: usize,
    pub total: Decimal,
}

/// Lists every category used by the ledger, depth first, with its total over all windows.
pub async fn categories(config: Config) -> Result<Out<Vec<CategoryLine>>> {
    let books = open_books(&config).await.pub_result(ErrorType::Ledger)?;
    let bilancial = books.refresh().pub_result(ErrorType::Engine)?;

    let mut totals: BTreeMap<CategoryId, Decimal> = BTreeMap::new();
    for checkpoint in bilancial.mapping().ordered_list() {
        for (id, sums) in checkpoint.information().categories() {
            *totals.entry(*id).or_default() += sums.cumulative().total();
        }
    }

    let mut lines = Vec::new();
    collect(
        bilancial.tree(),
        CategoryId::ROOT,
        &totals,
        config.category_separator(),
        &mut lines,
    );

    let mut message = String::new();
    for line in &lines {
        let _ = writeln!(
            message,
            "{}{} {}",
            "  ".repeat(line.depth - 1),
            line.path,
            line.total
        );
    }
    let _ = write!(message, "{} categories", lines.len());
    Ok(Out::new(message, lines))
}

fn collect(
    tree: &CategoryTree,
    parent: CategoryId,
    totals: &BTreeMap<CategoryId, Decimal>,
    separator: &str,
    lines: &mut Vec<CategoryLine>,
) {
    for &id in tree.children(parent) {
        lines.push(CategoryLine {
            path: tree.display(id, separator),
            depth: tree.depth(id),
            total: totals.get(&id).copied().unwrap_or_default(),
        });
        collect(tree, id, totals, separator, lines);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::{TestEnv, LEDGER_JSON};

    #[tokio::test]
    async fn test_categories() {
        let env = TestEnv::new().await;
        env.write_ledger(LEDGER_JSON).await;
        let out = categories(env.config()).await.unwrap();
        let lines: Vec<(&str, usize, Decimal)> = out
            .structure()
            .unwrap()
            .iter()
            .map(|l| (l.path.as_str(), l.depth, l.total))
            .collect();
        assert_eq!(
            lines,
            vec![
                ("Food", 1, Decimal::from(6)),
                ("Food:Drinks", 2, Decimal::from(-4)),
                ("Income", 1, Decimal::from(50)),
                ("Travel", 1, Decimal::from(-6)),
            ]
        );
        assert!(out.message().ends_with("4 categories"));
    }

    #[tokio::test]
    async fn test_categories_of_an_empty_ledger() {
        let env = TestEnv::new().await;
        let out = categories(env.config()).await.unwrap();
        assert!(out.structure().unwrap().is_empty());
    }
}
