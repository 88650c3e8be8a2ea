//! # Weekly Fund Dashboard
//!
//! A library for turning weekly bank & cash balance spreadsheets into
//! per-currency summaries.
//!
//! ## Core Concepts
//!
//! - **Marker rows**: labels such as `Bank & Cash Balances`, `Cash Ins` and `Cash Outs` that open a section
//! - **Segments**: the rows between two marker rows, tagged with their section and week
//! - **Week records**: all segments parsed from one source for one week
//! - **Aggregation**: section totals, opening/closing balances and net cash flow per currency
//!
//! ## Example
//!
//! ```rust,ignore
//! use weekly_fund_dashboard::*;
//!
//! let config = DashboardConfig::default();
//! let rows = vec![
//!     RawRow::new("Bank & Cash Balances"),
//!     RawRow::new("Bank").with_amount("LKR", 100.0),
//!     RawRow::new("Cash in Hand").with_amount("LKR", 50.0),
//!     RawRow::new("Cash Ins"),
//!     RawRow::new("Customer Payments").with_amount("LKR", 30.0),
//!     RawRow::new("Cash Outs"),
//!     RawRow::new("Supplier Payments").with_amount("LKR", 10.0),
//! ];
//! let source = SourceTable::new("Fund_Balance_W1.xlsx", Some("W1".to_string()), rows);
//!
//! let dashboard = FundDashboard::load(config, &[source]).unwrap();
//! let closing = dashboard.aggregator().closing_balance("W1", &["LKR"]);
//! assert_eq!(closing["LKR"], 170.0);
//! ```

pub mod aggregator;
pub mod error;
#[cfg(feature = "fx")]
pub mod fx;
pub mod history;
pub mod ingestion;
pub mod parser;
pub mod report;
pub mod schema;
pub mod utils;

pub use aggregator::{RollingWindow, WeeklyAggregator};
pub use error::{FundDashboardError, Result, SourceError};
#[cfg(feature = "fx")]
pub use fx::{FxClient, FxRate};
pub use history::{UploadEntry, UploadHistory};
pub use ingestion::*;
pub use parser::{parse_table, SegmentParser};
pub use report::{BalanceLine, CategoryRow, CategoryTable, WeekSummary};
pub use schema::*;
pub use utils::*;

use chrono::NaiveDate;
use log::{debug, info};
use std::path::PathBuf;
use std::sync::Arc;

/// A loaded dataset plus the config it was loaded with.
pub struct FundDashboard {
    config: DashboardConfig,
    report: Arc<LoadReport>,
}

impl FundDashboard {
    pub fn load(config: DashboardConfig, sources: &[SourceTable]) -> Result<Self> {
        info!("Loading fund dashboard from {} sources", sources.len());
        let report = DatasetLoader::new(&config).load(sources)?;
        Ok(Self::from_report(config, Arc::new(report)))
    }

    pub fn from_files(config: DashboardConfig, paths: &[PathBuf]) -> Result<Self> {
        let report = DatasetLoader::new(&config).load_files(paths)?;
        Ok(Self::from_report(config, Arc::new(report)))
    }

    /// Reuses a previous load when the files and config are unchanged.
    pub fn from_cache(
        cache: &mut DatasetCache,
        config: DashboardConfig,
        paths: &[PathBuf],
    ) -> Result<Self> {
        let report = cache.load_files(paths, &config)?;
        Ok(Self::from_report(config, report))
    }

    pub fn from_report(config: DashboardConfig, report: Arc<LoadReport>) -> Self {
        for warning in &report.warnings {
            debug!("Load warning: {}", warning);
        }
        Self { config, report }
    }

    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }

    pub fn dataset(&self) -> &FundDataset {
        &self.report.dataset
    }

    pub fn warnings(&self) -> &[SourceError] {
        &self.report.warnings
    }

    pub fn aggregator(&self) -> WeeklyAggregator<'_> {
        WeeklyAggregator::from_config(self.dataset(), &self.config)
    }

    /// An aggregator whose "today" is `date`, for reproducible to-date windows.
    pub fn aggregator_at(&self, date: NaiveDate) -> WeeklyAggregator<'_> {
        WeeklyAggregator::new(self.dataset())
            .with_reference_date(date)
            .apply_config(&self.config)
    }

    pub fn weeks(&self) -> Vec<String> {
        self.aggregator().sorted_weeks()
    }

    pub fn week_summary<S: AsRef<str>>(&self, week_id: &str, currencies: &[S]) -> WeekSummary {
        WeekSummary::build(&self.aggregator(), week_id, currencies)
    }

    pub fn category_table<S: AsRef<str>>(&self, week_id: &str, currencies: &[S]) -> CategoryTable {
        CategoryTable::build(self.dataset(), week_id, currencies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(id: &str, week: &str, bank: f64, cash_in: f64) -> SourceTable {
        SourceTable::new(
            id,
            Some(week.to_string()),
            vec![
                RawRow::new(BANK_AND_CASH_BALANCES),
                RawRow::new("Bank").with_amount("LKR", bank),
                RawRow::new(CASH_INS),
                RawRow::new("Sales").with_amount("LKR", cash_in),
            ],
        )
    }

    #[test]
    fn test_end_to_end_processing() {
        let config = DashboardConfig {
            reference_year: Some(2025),
            ..DashboardConfig::default()
        };
        let sources = vec![
            source("b", "April_7_to_April_11", 120.0, 5.0),
            source("a", "March_31_to_April_4", 100.0, 20.0),
            SourceTable::new("empty", Some("W0".to_string()), vec![]),
        ];

        let dashboard = FundDashboard::load(config, &sources).unwrap();

        assert_eq!(dashboard.warnings().len(), 1);
        assert_eq!(
            dashboard.weeks(),
            vec!["March_31_to_April_4", "April_7_to_April_11"]
        );

        let summary = dashboard.week_summary("March_31_to_April_4", &["LKR"]);
        assert_eq!(summary.closing["LKR"], 120.0);

        let table = dashboard.category_table("April_7_to_April_11", &["LKR"]);
        assert_eq!(table.rows.len(), 2);
    }

    #[test]
    fn test_aggregator_at_keeps_configured_year() {
        let config = DashboardConfig {
            reference_year: Some(2024),
            ..DashboardConfig::default()
        };
        let dashboard =
            FundDashboard::load(config, &[source("a", "March_31_to_April_4", 1.0, 1.0)]).unwrap();

        let aggregator = dashboard.aggregator_at(NaiveDate::from_ymd_opt(2025, 4, 2).unwrap());
        assert_eq!(
            aggregator.week_start("March_31_to_April_4"),
            NaiveDate::from_ymd_opt(2024, 3, 31)
        );
    }

    #[test]
    fn test_custom_balances_marker_feeds_opening_balance() {
        let rows = vec![
            RawRow::new("Opening Balances"),
            RawRow::new("Bank").with_amount("LKR", 100.0),
            RawRow::new(CASH_INS),
            RawRow::new("S").with_amount("LKR", 5.0),
        ];
        let source = SourceTable::new("a", Some("W1".to_string()), rows);
        let patterns = vec![
            "Opening Balances".to_string(),
            CASH_INS.to_string(),
            CASH_OUTS.to_string(),
        ];

        let unmatched = DashboardConfig {
            marker_patterns: patterns.clone(),
            ..DashboardConfig::default()
        };
        assert!(matches!(
            FundDashboard::load(unmatched, std::slice::from_ref(&source)),
            Err(FundDashboardError::InvalidConfig(_))
        ));

        let config = DashboardConfig {
            marker_patterns: patterns,
            balances_marker: "Opening Balances".to_string(),
            ..DashboardConfig::default()
        };
        let dashboard = FundDashboard::load(config, &[source]).unwrap();
        let aggregator = dashboard.aggregator();
        assert_eq!(aggregator.total_opening_balance("W1", &["LKR"])["LKR"], 100.0);
        assert_eq!(aggregator.closing_balance("W1", &["LKR"])["LKR"], 105.0);
    }

    #[test]
    fn test_empty_dataset_halts() {
        let result = FundDashboard::load(DashboardConfig::default(), &[]);
        assert!(matches!(result, Err(FundDashboardError::EmptyDataset)));
    }
}
