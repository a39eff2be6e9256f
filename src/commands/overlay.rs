use crate::args::{OverlayAction, OverlayArgs};
use crate::commands::{find_category, open_books, Out};
use crate::engine::OverlayState;
use crate::error::{ErrorType, IntoResult};
use crate::model::CategoryLookup;
use crate::{Config, Result};
use anyhow::Context;
use serde::Serialize;
use std::fmt::Write;
use tracing::debug;

/// A category with non-default display flags.
#[derive(Debug, Clone, Serialize, Eq, PartialEq)]
pub struct OverlayLine {
    pub path: String,
    pub visible: bool,
    pub mask: Option<String>,
}

/// Lists or changes the saved display flags. Every action answers with the flags that remain.
pub async fn overlay(config: Config, args: OverlayArgs) -> Result<Out<Vec<OverlayLine>>> {
    let books = open_books(&config).await.pub_result(ErrorType::Ledger)?;
    let registry = books.registry();
    let separator = config.category_separator();
    let path = config.overlay_path();
    let mut state = OverlayState::load(&path, registry).await;

    let changed = match args.action() {
        OverlayAction::List => false,
        OverlayAction::Hide { category } => {
            let id = find_category(registry, category, separator).pub_result(ErrorType::Request)?;
            state.set_visible(id, false);
            true
        }
        OverlayAction::Show { category } => {
            let id = find_category(registry, category, separator).pub_result(ErrorType::Request)?;
            state.set_visible(id, true);
            true
        }
        OverlayAction::Mask { category, mask } => {
            let id = find_category(registry, category, separator).pub_result(ErrorType::Request)?;
            state.set_mask(id, Some(mask.clone()));
            true
        }
        OverlayAction::Unmask { category } => {
            let id = find_category(registry, category, separator).pub_result(ErrorType::Request)?;
            state.set_mask(id, None);
            true
        }
    };

    let tree = registry.tree();
    if changed {
        state
            .save(&path, &tree)
            .await
            .with_context(|| format!("Unable to save the overlay to {}", path.display()))
            .pub_result(ErrorType::Overlay)?;
        debug!("Saved {} overlay flags to {}", state.len(), path.display());
    }

    let mut lines: Vec<OverlayLine> = state
        .iter()
        .map(|(id, flags)| OverlayLine {
            path: tree.display(id, separator),
            visible: flags.visible,
            mask: flags.mask.clone(),
        })
        .collect();
    lines.sort_by(|a, b| a.path.cmp(&b.path));

    let mut message = String::new();
    for line in &lines {
        let _ = write!(message, "{}", line.path);
        if !line.visible {
            let _ = write!(message, " (hidden)");
        }
        if let Some(mask) = &line.mask {
            let _ = write!(message, " shown as '{mask}'");
        }
        message.push('\n');
    }
    let _ = write!(message, "{} categories with display flags", lines.len());
    Ok(Out::new(message, lines))
}
