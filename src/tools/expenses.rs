use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

use super::{ErrorShape, Tool};

#[derive(Debug, Error)]
enum ExpenseError {
    #[error("Expense data file missing at {}", .0.display())]
    Missing(PathBuf),

    #[error("Unable to read expenses: {0}")]
    Unreadable(String),

    #[error("Expense CSV must contain 'amount' and 'category' columns")]
    MissingColumns,
}

impl From<csv::Error> for ExpenseError {
    fn from(e: csv::Error) -> Self {
        Self::Unreadable(e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ExpensesResult {
    Summary {
        total: f64,
        by_category: BTreeMap<String, f64>,
    },
    Error {
        error: String,
    },
}

impl ErrorShape for ExpensesResult {
    fn from_error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
        }
    }
}

/// Totals the expense CSV, overall and per category.
pub struct ExpenseAnalyzer {
    path: PathBuf,
}

impl ExpenseAnalyzer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn analyze(&self) -> std::result::Result<(f64, BTreeMap<String, f64>), ExpenseError> {
        if !self.path.exists() {
            return Err(ExpenseError::Missing(self.path.clone()));
        }

        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(&self.path)?;

        let headers = reader.headers()?.clone();
        let column = |name: &str| headers.iter().position(|h| h == name);
        let (Some(amount_idx), Some(category_idx)) = (column("amount"), column("category")) else {
            return Err(ExpenseError::MissingColumns);
        };

        let mut total = 0.0;
        let mut by_category: BTreeMap<String, f64> = BTreeMap::new();

        // Blank cells are missing values: a row without an amount is skipped
        // entirely, a row without a category only counts toward the total.
        for (row, record) in reader.records().enumerate() {
            let record = record?;
            let raw_amount = record.get(amount_idx).unwrap_or_default();
            if raw_amount.is_empty() {
                log::debug!("ExpenseAnalyzer: row {} has no amount; skipped", row + 1);
                continue;
            }
            let amount: f64 = raw_amount.parse().map_err(|_| {
                ExpenseError::Unreadable(format!(
                    "invalid amount '{}' on row {}",
                    raw_amount,
                    row + 1
                ))
            })?;

            total += amount;
            match record.get(category_idx).filter(|c| !c.is_empty()) {
                Some(category) => *by_category.entry(category.to_string()).or_insert(0.0) += amount,
                None => log::debug!("ExpenseAnalyzer: row {} has no category", row + 1),
            }
        }

        Ok((total, by_category))
    }
}

#[async_trait::async_trait]
impl Tool for ExpenseAnalyzer {
    type Input = ();
    type Output = ExpensesResult;

    fn name(&self) -> &str {
        "expenses"
    }

    async fn run(&self, _input: ()) -> Result<ExpensesResult> {
        match self.analyze() {
            Ok((total, by_category)) => {
                log::debug!(
                    "ExpenseAnalyzer: total={} across {} categories",
                    total,
                    by_category.len()
                );
                Ok(ExpensesResult::Summary { total, by_category })
            }
            Err(e) => {
                log::error!("ExpenseAnalyzer: {} ({})", e, self.path.display());
                Ok(ExpensesResult::from_error(e.to_string()))
            }
        }
    }
}
