// Status page tables -> header-keyed raw records.
// The page has a title row, a header row, then one row per channel.

use crate::models::ChannelKind;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use thiserror::Error;

/// Field name (header text) -> trimmed cell text, for one table row.
pub type RawRecord = HashMap<String, String>;

pub const DEFAULT_DOWNSTREAM_HEADER: &str =
    "#bg3 > div.container > div.content > form > center:nth-child(5) > table > tbody > tr:nth-child(2)";
pub const DEFAULT_DOWNSTREAM_ROWS: &str =
    "#bg3 > div.container > div.content > form > center:nth-child(5) > table > tbody > tr:nth-child(n+3)";
pub const DEFAULT_UPSTREAM_HEADER: &str =
    "#bg3 > div.container > div.content > form > center:nth-child(8) > table > tbody > tr:nth-child(2)";
pub const DEFAULT_UPSTREAM_ROWS: &str =
    "#bg3 > div.container > div.content > form > center:nth-child(8) > table > tbody > tr:nth-child(n+3)";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("invalid selector {selector:?}: {reason}")]
    InvalidSelector { selector: String, reason: String },
    #[error("found {rows} data rows but no header row")]
    MissingHeader { rows: usize },
}

/// Where one table's header row and data rows live in the document.
#[derive(Debug, Clone)]
pub struct TableLocator {
    header: Selector,
    rows: Selector,
}

impl TableLocator {
    pub fn new(header: Selector, rows: Selector) -> Self {
        Self { header, rows }
    }

    pub fn parse(header: &str, rows: &str) -> Result<Self, ExtractError> {
        Ok(Self::new(selector(header)?, selector(rows)?))
    }
}

fn selector(s: &str) -> Result<Selector, ExtractError> {
    Selector::parse(s).map_err(|e| ExtractError::InvalidSelector {
        selector: s.to_string(),
        reason: e.to_string(),
    })
}

/// Locators for both channel tables.
#[derive(Debug, Clone)]
pub struct PageLayout {
    pub downstream: TableLocator,
    pub upstream: TableLocator,
}

impl PageLayout {
    pub fn locator(&self, kind: ChannelKind) -> &TableLocator {
        match kind {
            ChannelKind::Downstream => &self.downstream,
            ChannelKind::Upstream => &self.upstream,
        }
    }
}

fn cell_texts(row: ElementRef<'_>) -> Vec<String> {
    row.children()
        .filter_map(ElementRef::wrap)
        .map(|cell| cell.text().collect::<String>().trim().to_string())
        .collect()
}

/// Reads the header row, then pairs each data row's cells with header names by
/// position. Cells past the last header column are dropped.
pub fn extract_records(doc: &Html, locator: &TableLocator) -> Result<Vec<RawRecord>, ExtractError> {
    let rows: Vec<ElementRef<'_>> = doc.select(&locator.rows).collect();
    let Some(header_row) = doc.select(&locator.header).next() else {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        return Err(ExtractError::MissingHeader { rows: rows.len() });
    };
    let names = cell_texts(header_row);

    Ok(rows
        .into_iter()
        .map(|row| names.iter().cloned().zip(cell_texts(row)).collect())
        .collect())
}
