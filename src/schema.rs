use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{FundDashboardError, Result};

pub const BANK_AND_CASH_BALANCES: &str = "Bank & Cash Balances";
pub const CASH_TRANSACTIONS: &str = "Cash Transactions During the Week";
pub const CASH_INS: &str = "Cash Ins";
pub const CASH_OUTS: &str = "Cash Outs";

/// Labels that open a new section. Matching is substring containment.
pub const MARKER_PATTERNS: [&str; 4] = [
    BANK_AND_CASH_BALANCES,
    CASH_TRANSACTIONS,
    CASH_INS,
    CASH_OUTS,
];

pub const CURRENCY_COLUMNS: [&str; 11] = [
    "LKR",
    "USD",
    "GBP",
    "AUD",
    "DKK",
    "EUR",
    "MXN",
    "INR",
    "AED",
    "Total in LKR",
    "Total in USD",
];

pub const OPENING_BALANCE_LABELS: [&str; 2] = ["Bank", "Cash in Hand"];

/// Currency code (or computed total column) to amount.
pub type CurrencyAmounts = BTreeMap<String, f64>;

/// Builds a mapping with every requested currency set to zero.
pub fn zero_amounts<S: AsRef<str>>(currencies: &[S]) -> CurrencyAmounts {
    currencies
        .iter()
        .map(|c| (c.as_ref().to_string(), 0.0))
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRow {
    pub label: String,
    /// `None` models an empty cell; it counts as zero in every sum.
    pub amounts: BTreeMap<String, Option<f64>>,
}

impl RawRow {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            amounts: BTreeMap::new(),
        }
    }

    pub fn with_amount(mut self, currency: impl Into<String>, amount: f64) -> Self {
        self.amounts.insert(currency.into(), Some(amount));
        self
    }

    pub fn amount(&self, currency: &str) -> f64 {
        self.amounts.get(currency).copied().flatten().unwrap_or(0.0)
    }

    pub fn has_label(&self) -> bool {
        !self.label.trim().is_empty()
    }

    pub fn has_amounts(&self) -> bool {
        self.amounts.values().any(Option::is_some)
    }

    /// A spacer or header row: no label and no amount in any currency column.
    pub fn is_blank(&self) -> bool {
        !self.has_label() && !self.has_amounts()
    }
}

/// Rows between two successive marker rows, tagged with the opening
/// marker's label (verbatim) and the week they were loaded for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub section: String,
    pub week: String,
    pub rows: Vec<RawRow>,
}

impl Segment {
    pub fn matches_section(&self, section: &str) -> bool {
        self.section.contains(section)
    }
}

/// All segments parsed from one source for one week.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeekRecord {
    pub week: String,
    pub source_id: String,
    pub segments: Vec<Segment>,
}

impl WeekRecord {
    pub fn rows(&self) -> impl Iterator<Item = (&Segment, &RawRow)> {
        self.segments
            .iter()
            .flat_map(|segment| segment.rows.iter().map(move |row| (segment, row)))
    }

    /// First row in a matching section carrying `label`. Later duplicates are ignored.
    pub fn lookup(&self, section: &str, label: &str) -> Option<&RawRow> {
        self.rows()
            .find(|(segment, row)| segment.matches_section(section) && row.label.trim() == label)
            .map(|(_, row)| row)
    }

    pub fn row_count(&self) -> usize {
        self.segments.iter().map(|s| s.rows.len()).sum()
    }
}

/// Every week record produced by one full load, in load order.
///
/// Records sharing a week identifier are all kept; aggregation sums across them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FundDataset {
    pub records: Vec<WeekRecord>,
}

impl FundDataset {
    pub fn new(records: Vec<WeekRecord>) -> Self {
        Self { records }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn records_for<'a>(&'a self, week_id: &'a str) -> impl Iterator<Item = &'a WeekRecord> {
        self.records.iter().filter(move |r| r.week == week_id)
    }

    pub fn contains_week(&self, week_id: &str) -> bool {
        self.records.iter().any(|r| r.week == week_id)
    }

    /// Distinct week identifiers in first-appearance order.
    pub fn week_ids(&self) -> Vec<String> {
        let mut weeks: Vec<String> = Vec::new();
        for record in &self.records {
            if !weeks.contains(&record.week) {
                weeks.push(record.week.clone());
            }
        }
        weeks
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DashboardConfig {
    #[serde(default)]
    #[schemars(
        description = "Header text of the column holding row labels (e.g. 'Details'). When omitted the first column is used."
    )]
    pub label_column: Option<String>,

    #[serde(default = "default_currency_columns")]
    #[schemars(
        description = "Currency columns to read. Columns missing from a source are tolerated."
    )]
    pub currency_columns: Vec<String>,

    #[serde(default = "default_marker_patterns")]
    #[schemars(
        description = "Label substrings that open a new section, e.g. 'Cash Ins'. Matching is case-sensitive containment."
    )]
    pub marker_patterns: Vec<String>,

    #[serde(default = "default_balances_marker")]
    #[schemars(
        description = "Section holding the opening balance rows. It also opens each week range in single-sheet workbooks."
    )]
    pub balances_marker: String,

    #[serde(default = "default_cash_in_marker")]
    #[schemars(description = "Section whose rows are summed as cash inflows.")]
    pub cash_in_marker: String,

    #[serde(default = "default_cash_out_marker")]
    #[schemars(description = "Section whose rows are summed as cash outflows.")]
    pub cash_out_marker: String,

    #[serde(default = "default_opening_balance_labels")]
    #[schemars(
        description = "Row labels in the 'Bank & Cash Balances' section that make up the opening balance."
    )]
    pub opening_balance_labels: Vec<String>,

    #[serde(default = "default_true")]
    #[schemars(
        description = "When true, sources yielding the same week identifier are all kept and summed. When false, later duplicates are skipped with a warning."
    )]
    pub allow_duplicate_week_merge: bool,

    #[serde(default = "default_true")]
    #[schemars(
        description = "Rows with a blank label but amounts inherit the label of the previous row in the same section."
    )]
    pub fill_blank_labels: bool,

    #[serde(default)]
    #[schemars(
        description = "Year assumed for week identifiers that carry no year, e.g. 'March_31_to_April_4'. Defaults to the current year."
    )]
    pub reference_year: Option<i32>,

    #[serde(default = "default_fx_timeout_ms")]
    #[schemars(description = "Timeout for a single live FX-rate request, in milliseconds.")]
    pub fx_timeout_ms: u64,
}

fn default_currency_columns() -> Vec<String> {
    CURRENCY_COLUMNS.iter().map(|c| c.to_string()).collect()
}

fn default_marker_patterns() -> Vec<String> {
    MARKER_PATTERNS.iter().map(|m| m.to_string()).collect()
}

fn default_balances_marker() -> String {
    BANK_AND_CASH_BALANCES.to_string()
}

fn default_cash_in_marker() -> String {
    CASH_INS.to_string()
}

fn default_cash_out_marker() -> String {
    CASH_OUTS.to_string()
}

fn default_opening_balance_labels() -> Vec<String> {
    OPENING_BALANCE_LABELS.iter().map(|l| l.to_string()).collect()
}

fn default_true() -> bool {
    true
}

fn default_fx_timeout_ms() -> u64 {
    3_000
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            label_column: None,
            currency_columns: default_currency_columns(),
            marker_patterns: default_marker_patterns(),
            balances_marker: default_balances_marker(),
            cash_in_marker: default_cash_in_marker(),
            cash_out_marker: default_cash_out_marker(),
            opening_balance_labels: default_opening_balance_labels(),
            allow_duplicate_week_merge: true,
            fill_blank_labels: true,
            reference_year: None,
            fx_timeout_ms: default_fx_timeout_ms(),
        }
    }
}

impl DashboardConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Every section the aggregator reads must be opened by some marker
    /// pattern, otherwise its rows never reach a segment.
    pub fn validate(&self) -> Result<()> {
        if self.marker_patterns.iter().all(|m| m.trim().is_empty()) {
            return Err(FundDashboardError::InvalidConfig(
                "marker_patterns is empty".to_string(),
            ));
        }

        for (field, section) in [
            ("balances_marker", &self.balances_marker),
            ("cash_in_marker", &self.cash_in_marker),
            ("cash_out_marker", &self.cash_out_marker),
        ] {
            if section.trim().is_empty() {
                return Err(FundDashboardError::InvalidConfig(format!(
                    "{} is empty",
                    field
                )));
            }
            let opened = self
                .marker_patterns
                .iter()
                .any(|m| !m.is_empty() && section.contains(m.as_str()));
            if !opened {
                return Err(FundDashboardError::InvalidConfig(format!(
                    "{} '{}' is not matched by any marker pattern",
                    field, section
                )));
            }
        }

        Ok(())
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(DashboardConfig)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}
