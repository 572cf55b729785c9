//! Statement-to-ledger reconciliation
//!
//! Copies the category of a known ledger row onto each statement row that
//! shares its composite key: the exact `Date` string plus the `Amount` string
//! with thousands separators removed. No numeric parsing happens, so
//! "100.00" and "100" are different keys.
//!
//! The first ledger row with a given key wins. Rows with no match get an
//! empty category, which is distinct from a low-confidence prediction.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::models::{fields, normalize_amount, CategorizedTransaction, CategoryColumn, Transaction};

/// Composite key used to match rows across tables
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MatchKey {
    pub date: String,
    pub amount: String,
}

impl MatchKey {
    /// Key for a row; missing fields compare as empty strings
    pub fn for_row(tx: &Transaction) -> Self {
        Self {
            date: tx.date().unwrap_or_default().to_string(),
            amount: normalize_amount(tx.amount().unwrap_or_default()),
        }
    }
}

/// Match counts from one reconciliation run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub matched: usize,
    pub unmatched: usize,
}

/// Matches statement rows against a ledger
#[derive(Debug, Clone)]
pub struct Reconciler {
    column: CategoryColumn,
    index: HashMap<MatchKey, String>,
}

impl Reconciler {
    /// Index a ledger for matching
    ///
    /// Fails before any row is processed if the ledger carries none of the
    /// accepted category columns.
    pub fn new(ledger: &[Transaction]) -> Result<Self> {
        let column = detect_category_column(ledger)?;

        let mut index = HashMap::with_capacity(ledger.len());
        for row in ledger {
            index
                .entry(MatchKey::for_row(row))
                .or_insert_with(|| row.get(column.as_str()).unwrap_or_default().to_string());
        }

        debug!(
            column = %column,
            rows = ledger.len(),
            keys = index.len(),
            "Indexed ledger"
        );
        Ok(Self { column, index })
    }

    /// Ledger column categories are copied from
    pub fn column(&self) -> CategoryColumn {
        self.column
    }

    /// Category for a statement row, if its key appears in the ledger
    pub fn lookup(&self, tx: &Transaction) -> Option<&str> {
        self.index.get(&MatchKey::for_row(tx)).map(String::as_str)
    }

    /// Label every statement row, in order
    ///
    /// Unmatched rows get an empty category.
    pub fn reconcile(&self, statement: Vec<Transaction>) -> (Vec<CategorizedTransaction>, ReconcileStats) {
        let mut stats = ReconcileStats::default();
        let labelled = statement
            .into_iter()
            .map(|tx| {
                let category = match self.lookup(&tx) {
                    Some(category) => {
                        stats.matched += 1;
                        category.to_string()
                    }
                    None => {
                        stats.unmatched += 1;
                        String::new()
                    }
                };
                CategorizedTransaction::reconciled(tx, category)
            })
            .collect();

        info!(
            "Reconciled statement: {} matched, {} unmatched",
            stats.matched, stats.unmatched
        );
        (labelled, stats)
    }

    /// Label rows in place under the `Category` column
    pub fn label(&self, statement: &mut [Transaction]) -> ReconcileStats {
        let mut stats = ReconcileStats::default();
        for tx in statement.iter_mut() {
            let category = self.lookup(tx).map(str::to_string);
            match category {
                Some(category) => {
                    stats.matched += 1;
                    tx.set(fields::CATEGORY, category);
                }
                None => {
                    stats.unmatched += 1;
                    tx.set(fields::CATEGORY, "");
                }
            }
        }
        stats
    }
}

/// First accepted category column present on the ledger
///
/// Ledger rows share one key set, so the first row decides.
fn detect_category_column(ledger: &[Transaction]) -> Result<CategoryColumn> {
    let first = ledger.first();
    CategoryColumn::all()
        .iter()
        .copied()
        .find(|col| first.is_some_and(|row| row.contains(col.as_str())))
        .ok_or_else(|| Error::MissingCategoryColumn {
            allowed: CategoryColumn::all()
                .iter()
                .map(|c| c.as_str().to_string())
                .collect(),
        })
}
