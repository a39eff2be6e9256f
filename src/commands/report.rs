use crate::args::ReportArgs;
use crate::commands::{find_category, open_books, Out};
use crate::engine::{OverlayRow, OverlayState};
use crate::error::{Error, ErrorType, IntoResult, Res};
use crate::model::{AccountId, Amount, CategoryRegistry, EntryFilter, SeparatorId};
use crate::{Config, Result};
use anyhow::anyhow;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt::Write;

const LABEL_WIDTH: usize = 40;
const FIGURE_WIDTH: usize = 16;

/// The category sums of one window.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    /// The separator that closes the window.
    pub separator: SeparatorId,
    pub label: String,
    /// The ledger revision the report was computed from.
    pub revision: u64,
    pub entry_count: usize,
    pub window_sum: Decimal,
    /// The sum of every entry up to and including this window.
    pub overall_sum: Decimal,
    pub rows: Vec<OverlayRow>,
    /// Every visible window of the ledger, in timeline order.
    pub windows: Vec<ReportWindow>,
}

/// One window that can be reported, named by the separator that closes it.
#[derive(Debug, Clone, Serialize, Eq, PartialEq)]
pub struct ReportWindow {
    pub separator: SeparatorId,
    pub label: String,
    pub date: Option<NaiveDate>,
    pub window_sum: Decimal,
}

/// Aggregates the ledger with the filter described by `args` and reports one window, the last
/// one unless `args` names a separator. Hidden and masked categories follow the saved overlay.
pub async fn report(config: Config, args: ReportArgs) -> Result<Out<Report>> {
    let mut books = open_books(&config).await.pub_result(ErrorType::Ledger)?;
    let filter = build_filter(&args, books.registry(), config.category_separator())
        .pub_result(ErrorType::Request)?;
    let state = OverlayState::load(&config.overlay_path(), books.registry()).await;

    books.engine().set_filter(filter);
    books.start();
    let bilancial = books.settled().await.pub_result(ErrorType::Engine)?;

    let separator = args.separator().map(SeparatorId::new);
    let Some((overlay, checkpoint)) = bilancial.overlay(&state, separator) else {
        let id = args.separator().unwrap_or_default();
        return Err(Error::new(
            ErrorType::Request,
            anyhow!("There is no separator {id} in the ledger"),
        ));
    };
    let info = checkpoint.information();
    let report = Report {
        separator: checkpoint.separator().id(),
        label: checkpoint.separator().kind().label(),
        revision: bilancial.revision(),
        entry_count: info.entry_count(),
        window_sum: info.window_sum(),
        overall_sum: info.overall_sum(),
        rows: overlay.rows(info),
        windows: bilancial
            .mapping()
            .visible()
            .map(|c| ReportWindow {
                separator: c.separator().id(),
                label: c.separator().kind().label(),
                date: c.separator().kind().date(),
                window_sum: c.information().window_sum(),
            })
            .collect(),
    };
    Ok(Out::new(render(&report), report))
}

fn build_filter(
    args: &ReportArgs,
    registry: &CategoryRegistry,
    separator: &str,
) -> Res<EntryFilter> {
    let mut filters = Vec::new();
    if let Some(account) = args.account() {
        filters.push(EntryFilter::Account(AccountId::new(account)));
    }
    if let Some(path) = args.category() {
        filters.push(EntryFilter::Category {
            category: find_category(registry, path, separator)?,
            include_subcategories: !args.exclude_subcategories(),
        });
    }
    if args.from().is_some() || args.to().is_some() {
        filters.push(EntryFilter::DateRange {
            from: args.from(),
            to: args.to(),
        });
    }
    if let Some(name) = args.name() {
        filters.push(EntryFilter::NameContains(name.to_string()));
    }
    Ok(EntryFilter::all_of(filters))
}

fn render(report: &Report) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Window closed by {} ({} entries)",
        report.label, report.entry_count
    );
    let _ = writeln!(
        out,
        "{:<LABEL_WIDTH$}{:>FIGURE_WIDTH$}{:>FIGURE_WIDTH$}",
        "Category", "Individual", "Cumulative"
    );
    for row in &report.rows {
        let label = format!("{}{}", "  ".repeat(row.depth), row.label);
        let _ = writeln!(
            out,
            "{label:<LABEL_WIDTH$}{:>FIGURE_WIDTH$}{:>FIGURE_WIDTH$}",
            Amount::new(row.individual).to_string(),
            Amount::new(row.cumulative).to_string()
        );
    }
    let _ = writeln!(out, "Overall sum: {}", Amount::new(report.overall_sum));
    let windows: Vec<&str> = report.windows.iter().map(|w| w.label.as_str()).collect();
    let _ = write!(out, "Windows: {}", windows.join(", "));
    out
}
