use crate::error::{FundDashboardError, Result, SourceError};
use crate::parser::SegmentParser;
use crate::schema::{DashboardConfig, FundDataset, RawRow, WeekRecord};
use crate::utils::{parse_amount, week_id_from_file_name, week_id_from_sheet_name};
use calamine::{open_workbook_auto, Data, Reader};
use log::{debug, info, warn};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Text(String),
    Number(f64),
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(text) => text.trim().is_empty(),
            CellValue::Number(_) => false,
        }
    }

    pub fn as_text(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Text(text) => text.trim().to_string(),
            CellValue::Number(value) => value.to_string(),
        }
    }

    pub fn as_amount(&self) -> Option<f64> {
        match self {
            CellValue::Empty => None,
            CellValue::Text(text) => parse_amount(text),
            CellValue::Number(value) => Some(*value),
        }
    }
}

impl From<&Data> for CellValue {
    fn from(cell: &Data) -> Self {
        match cell {
            Data::String(v) => CellValue::Text(v.to_string()),
            Data::Float(v) => CellValue::Number(*v),
            Data::Int(v) => CellValue::Number(*v as f64),
            Data::Error(_) | Data::Empty => CellValue::Empty,
            other => CellValue::Text(other.to_string()),
        }
    }
}

impl From<&str> for CellValue {
    fn from(text: &str) -> Self {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            CellValue::Empty
        } else if let Some(value) = parse_amount(trimmed) {
            CellValue::Number(value)
        } else {
            CellValue::Text(trimmed.to_string())
        }
    }
}

/// One table handed to the loader.
///
/// `week_id: None` means the table carries its own week ranges in the
/// trailing text of its `Bank & Cash Balances` rows.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceTable {
    pub source_id: String,
    pub week_id: Option<String>,
    pub rows: Vec<RawRow>,
}

impl SourceTable {
    pub fn new(source_id: impl Into<String>, week_id: Option<String>, rows: Vec<RawRow>) -> Self {
        Self {
            source_id: source_id.into(),
            week_id,
            rows,
        }
    }

    pub fn from_grid(
        source_id: impl Into<String>,
        week_id: Option<String>,
        grid: &[Vec<CellValue>],
        config: &DashboardConfig,
    ) -> Result<Self> {
        let source_id = source_id.into();
        let rows = grid_to_rows(&source_id, grid, config)?;
        Ok(Self::new(source_id, week_id, rows))
    }
}

/// Converts a 2-D grid into labelled rows. The first non-empty row is the header.
pub fn grid_to_rows(
    source_id: &str,
    grid: &[Vec<CellValue>],
    config: &DashboardConfig,
) -> Result<Vec<RawRow>> {
    let unreadable = |reason: String| FundDashboardError::UnreadableSource {
        source_id: source_id.to_string(),
        reason,
    };

    let header_idx = grid
        .iter()
        .position(|row| row.iter().any(|cell| !cell.is_empty()))
        .ok_or_else(|| unreadable("table has no header row".to_string()))?;

    let header: Vec<String> = grid[header_idx].iter().map(CellValue::as_text).collect();

    let label_idx = match &config.label_column {
        Some(name) => header
            .iter()
            .position(|h| h == name.trim())
            .ok_or_else(|| unreadable(format!("label column '{}' not found", name)))?,
        None => 0,
    };

    let currency_idx: Vec<(String, usize)> = config
        .currency_columns
        .iter()
        .filter_map(|currency| {
            header
                .iter()
                .position(|h| h == currency.trim())
                .map(|idx| (currency.clone(), idx))
        })
        .collect();

    if currency_idx.is_empty() {
        return Err(unreadable("no known currency columns in header".to_string()));
    }

    let rows = grid[header_idx + 1..]
        .iter()
        .map(|cells| {
            let label = cells.get(label_idx).map(CellValue::as_text).unwrap_or_default();
            let amounts: BTreeMap<String, Option<f64>> = currency_idx
                .iter()
                .map(|(currency, idx)| {
                    let amount = cells.get(*idx).and_then(CellValue::as_amount);
                    (currency.clone(), amount)
                })
                .collect();
            RawRow { label, amounts }
        })
        .collect();

    Ok(rows)
}

#[derive(Debug, Default)]
pub struct LoadReport {
    pub dataset: FundDataset,
    pub warnings: Vec<SourceError>,
}

impl LoadReport {
    pub fn warning_messages(&self) -> Vec<String> {
        self.warnings.iter().map(|w| w.to_string()).collect()
    }
}

pub struct DatasetLoader<'a> {
    config: &'a DashboardConfig,
    parser: SegmentParser,
}

impl<'a> DatasetLoader<'a> {
    pub fn new(config: &'a DashboardConfig) -> Self {
        Self {
            config,
            parser: SegmentParser::from_config(config),
        }
    }

    /// Parses one source into week records. Fails when the source yields
    /// no marker rows at all.
    pub fn load_source(
        &self,
        source: &SourceTable,
    ) -> std::result::Result<Vec<WeekRecord>, SourceError> {
        let tables: Vec<(String, Vec<RawRow>)> = match &source.week_id {
            Some(week_id) => vec![(week_id.clone(), source.rows.clone())],
            None => self.parser.split_week_ranges(&source.rows),
        };

        let records: Vec<WeekRecord> = tables
            .into_iter()
            .map(|(week, rows)| WeekRecord {
                segments: self.parser.parse_table(&rows, &week),
                week,
                source_id: source.source_id.clone(),
            })
            .filter(|record| !record.segments.is_empty())
            .collect();

        if records.is_empty() {
            return Err(SourceError::new(
                source.source_id.clone(),
                FundDashboardError::NoMarkersFound(source.source_id.clone()),
            ));
        }

        Ok(records)
    }

    /// Loads every source, skipping the ones that fail. Only an invalid
    /// config or an empty result is fatal.
    pub fn load(&self, sources: &[SourceTable]) -> Result<LoadReport> {
        self.config.validate()?;

        let mut report = LoadReport::default();
        let mut seen_weeks: HashSet<String> = HashSet::new();

        for source in sources {
            match self.load_source(source) {
                Ok(records) => {
                    for record in records {
                        if !self.config.allow_duplicate_week_merge
                            && !seen_weeks.insert(record.week.clone())
                        {
                            warn!(
                                "Skipping duplicate week '{}' from source '{}'",
                                record.week, record.source_id
                            );
                            report.warnings.push(SourceError::new(
                                record.source_id.clone(),
                                FundDashboardError::DuplicateWeek {
                                    source_id: record.source_id,
                                    week_id: record.week,
                                },
                            ));
                            continue;
                        }
                        debug!(
                            "Loaded week '{}' from '{}' ({} rows)",
                            record.week,
                            record.source_id,
                            record.row_count()
                        );
                        report.dataset.records.push(record);
                    }
                }
                Err(err) => {
                    warn!("Skipping source: {}", err);
                    report.warnings.push(err);
                }
            }
        }

        info!(
            "Loaded {} week records from {} sources ({} warnings)",
            report.dataset.len(),
            sources.len(),
            report.warnings.len()
        );

        if report.dataset.is_empty() {
            return Err(FundDashboardError::EmptyDataset);
        }

        Ok(report)
    }

    /// Reads and loads files. Unreadable files become warnings like any
    /// other per-source failure.
    pub fn load_files<P: AsRef<Path>>(&self, paths: &[P]) -> Result<LoadReport> {
        self.config.validate()?;

        let mut sources = Vec::new();
        let mut read_failures = Vec::new();

        for path in paths {
            let path = path.as_ref();
            match read_source_file(path, self.config) {
                Ok(sheets) => {
                    for sheet in sheets {
                        match sheet {
                            Ok(table) => sources.push(table),
                            Err(err) => read_failures.push(err),
                        }
                    }
                }
                Err(err) => read_failures.push(SourceError::new(path.display().to_string(), err)),
            }
        }

        for failure in &read_failures {
            warn!("Skipping unreadable source: {}", failure);
        }

        let mut report = self.load(&sources)?;
        read_failures.append(&mut report.warnings);
        report.warnings = read_failures;
        Ok(report)
    }
}

/// Outcome of reading one worksheet. A failed sheet never takes the rest
/// of its workbook down with it.
pub type SheetResult = std::result::Result<SourceTable, SourceError>;

/// Resolves the week of a worksheet: file name first, then sheet name.
/// `None` leaves the week ranges to be read from the table itself.
pub fn resolve_week_id(path: &Path, sheet_name: Option<&str>) -> Option<String> {
    week_id_from_file_name(path).or_else(|| sheet_name.and_then(week_id_from_sheet_name))
}

/// Reads every worksheet of an xlsx/xls/ods workbook as one source each.
///
/// Only a workbook that cannot be opened is an error; each sheet carries
/// its own result.
pub fn read_workbook(path: &Path, config: &DashboardConfig) -> Result<Vec<SheetResult>> {
    let mut workbook = open_workbook_auto(path)?;
    let mut sheets = Vec::new();

    for sheet_name in workbook.sheet_names() {
        let source_id = format!("{}#{}", path.display(), sheet_name);
        let range = match workbook.worksheet_range(&sheet_name) {
            Ok(range) => range,
            Err(err) => {
                sheets.push(Err(SourceError::new(source_id, err.into())));
                continue;
            }
        };
        if range.is_empty() {
            debug!("Skipping empty sheet '{}' in {}", sheet_name, path.display());
            continue;
        }
        let grid: Vec<Vec<CellValue>> = range
            .rows()
            .map(|r| r.iter().map(CellValue::from).collect())
            .collect();

        let week_id = resolve_week_id(path, Some(&sheet_name));
        sheets.push(
            SourceTable::from_grid(source_id.clone(), week_id, &grid, config)
                .map_err(|err| SourceError::new(source_id, err)),
        );
    }

    Ok(sheets)
}

pub fn read_csv(path: &Path, config: &DashboardConfig) -> Result<SourceTable> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;

    let mut grid: Vec<Vec<CellValue>> = Vec::new();
    for record in reader.records() {
        let record = record?;
        grid.push(record.iter().map(CellValue::from).collect());
    }

    SourceTable::from_grid(
        path.display().to_string(),
        resolve_week_id(path, None),
        &grid,
        config,
    )
}

pub fn read_source_file(path: &Path, config: &DashboardConfig) -> Result<Vec<SheetResult>> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "csv" => Ok(vec![Ok(read_csv(path, config)?)]),
        "xlsx" | "xlsm" | "xls" | "xlsb" | "ods" => read_workbook(path, config),
        _ => Err(FundDashboardError::UnreadableSource {
            source_id: path.display().to_string(),
            reason: format!("unsupported file extension '{}'", extension),
        }),
    }
}

/// Memoizes loads keyed by the content of the input files and the config.
#[derive(Default)]
pub struct DatasetCache {
    entries: HashMap<String, Arc<LoadReport>>,
}

impl DatasetCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn load_files(
        &mut self,
        paths: &[PathBuf],
        config: &DashboardConfig,
    ) -> Result<Arc<LoadReport>> {
        let key = fingerprint(paths, config)?;

        if let Some(report) = self.entries.get(&key) {
            debug!("Dataset cache hit for {} files", paths.len());
            return Ok(Arc::clone(report));
        }

        let report = Arc::new(DatasetLoader::new(config).load_files(paths)?);
        self.entries.insert(key, Arc::clone(&report));
        Ok(report)
    }
}

/// SHA-256 over the config and every file's path and bytes, as lowercase hex.
pub fn fingerprint(paths: &[PathBuf], config: &DashboardConfig) -> Result<String> {
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_vec(config)?);

    for path in paths {
        hasher.update(path.to_string_lossy().as_bytes());
        hasher.update([0u8]);
        // A missing file still gets a key; the loader reports it.
        match std::fs::read(path) {
            Ok(bytes) => hasher.update(&bytes),
            Err(_) => hasher.update(b"<unreadable>"),
        }
        hasher.update([0u8]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::CASH_INS;
    use std::io::Write;

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    fn scenario_grid() -> Vec<Vec<CellValue>> {
        vec![
            vec![CellValue::Empty, CellValue::Empty],
            vec![text("Details"), text("LKR"), text("USD"), text("Notes")],
            vec![text("Bank & Cash Balances")],
            vec![text("Bank"), CellValue::Number(100.0), CellValue::Number(1.0)],
            vec![text("Cash in Hand"), text("50"), CellValue::Empty],
            vec![text("Cash Ins")],
            vec![text("Customer Payments"), CellValue::Number(30.0)],
            vec![text("Cash Outs")],
            vec![text("Supplier Payments"), text("1,000.5"), text("x")],
        ]
    }

    #[test]
    fn test_grid_to_rows_reads_known_currencies() {
        let config = DashboardConfig::default();
        let rows = grid_to_rows("grid", &scenario_grid(), &config).unwrap();

        assert_eq!(rows.len(), 7);
        assert_eq!(rows[1].label, "Bank");
        assert_eq!(rows[1].amount("LKR"), 100.0);
        assert_eq!(rows[1].amount("USD"), 1.0);
        assert_eq!(rows[2].amount("LKR"), 50.0);
        assert_eq!(rows[2].amounts.get("USD"), Some(&None));
        assert_eq!(rows[6].amount("LKR"), 1000.5);
        assert!(!rows[1].amounts.contains_key("Notes"));
        assert!(!rows[1].amounts.contains_key("GBP"));
    }

    #[test]
    fn test_grid_with_named_label_column() {
        let config = DashboardConfig {
            label_column: Some("Details".to_string()),
            ..DashboardConfig::default()
        };
        let grid = vec![
            vec![text("LKR"), text("Details")],
            vec![CellValue::Empty, text("Cash Ins")],
            vec![CellValue::Number(5.0), text("Sales")],
        ];
        let rows = grid_to_rows("grid", &grid, &config).unwrap();
        assert_eq!(rows[1].label, "Sales");
        assert_eq!(rows[1].amount("LKR"), 5.0);

        let missing = DashboardConfig {
            label_column: Some("Category".to_string()),
            ..DashboardConfig::default()
        };
        assert!(matches!(
            grid_to_rows("grid", &grid, &missing),
            Err(FundDashboardError::UnreadableSource { .. })
        ));
    }

    #[test]
    fn test_structurally_invalid_grids() {
        let config = DashboardConfig::default();
        assert!(grid_to_rows("empty", &[], &config).is_err());

        let no_currencies = vec![vec![text("Details"), text("Amount")]];
        assert!(grid_to_rows("nocur", &no_currencies, &config).is_err());
    }

    #[test]
    fn test_load_skips_bad_sources_and_keeps_going() {
        let config = DashboardConfig::default();
        let good = SourceTable::from_grid("good", Some("W1".to_string()), &scenario_grid(), &config)
            .unwrap();
        let no_markers = SourceTable::new(
            "no-markers",
            Some("W2".to_string()),
            vec![RawRow::new("Bank").with_amount("LKR", 1.0)],
        );

        let report = DatasetLoader::new(&config).load(&[no_markers, good]).unwrap();

        assert_eq!(report.dataset.len(), 1);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].source_id, "no-markers");
        assert!(matches!(
            report.warnings[0].error,
            FundDashboardError::NoMarkersFound(_)
        ));
    }

    #[test]
    fn test_load_with_no_usable_sources_is_empty_dataset() {
        let config = DashboardConfig::default();
        let source = SourceTable::new("bad", Some("W1".to_string()), vec![]);

        let result = DatasetLoader::new(&config).load(&[source]);
        assert!(matches!(result, Err(FundDashboardError::EmptyDataset)));
    }

    #[test]
    fn test_duplicate_weeks_respect_config() {
        let table = |amount: f64| {
            vec![
                RawRow::new(CASH_INS),
                RawRow::new("Sales").with_amount("LKR", amount),
            ]
        };
        let sources = vec![
            SourceTable::new("a", Some("W1".to_string()), table(10.0)),
            SourceTable::new("b", Some("W1".to_string()), table(20.0)),
        ];

        let merged = DashboardConfig::default();
        let report = DatasetLoader::new(&merged).load(&sources).unwrap();
        assert_eq!(report.dataset.len(), 2);
        assert!(report.warnings.is_empty());

        let strict = DashboardConfig {
            allow_duplicate_week_merge: false,
            ..DashboardConfig::default()
        };
        let report = DatasetLoader::new(&strict).load(&sources).unwrap();
        assert_eq!(report.dataset.len(), 1);
        assert_eq!(report.dataset.records[0].source_id, "a");
        assert!(matches!(
            report.warnings[0].error,
            FundDashboardError::DuplicateWeek { .. }
        ));
    }

    #[test]
    fn test_source_without_week_splits_ranges() {
        let config = DashboardConfig::default();
        let rows = vec![
            RawRow::new("Bank & Cash Balances - March 31 to April 4"),
            RawRow::new("Bank").with_amount("LKR", 100.0),
            RawRow::new("Bank & Cash Balances - April 7 to April 11"),
            RawRow::new("Bank").with_amount("LKR", 120.0),
        ];
        let report = DatasetLoader::new(&config)
            .load(&[SourceTable::new("sheet", None, rows)])
            .unwrap();

        assert_eq!(
            report.dataset.week_ids(),
            vec!["March 31 to April 4", "April 7 to April 11"]
        );
    }

    #[test]
    fn test_read_csv_and_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Fund_Balance_March_31_to_April_4.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "Details,LKR,USD").unwrap();
        writeln!(file, "Bank & Cash Balances,,").unwrap();
        writeln!(file, "Bank,100,2").unwrap();
        writeln!(file, "Cash Ins,,").unwrap();
        writeln!(file, "Sales,\"1,500\",").unwrap();
        drop(file);

        let config = DashboardConfig::default();
        let table = read_csv(&path, &config).unwrap();
        assert_eq!(table.week_id.as_deref(), Some("March_31_to_April_4"));
        assert_eq!(table.rows[3].amount("LKR"), 1500.0);

        let missing = dir.path().join("missing.csv");
        let paths = vec![path.clone(), missing];
        let mut cache = DatasetCache::new();
        let first = cache.load_files(&paths, &config).unwrap();
        let second = cache.load_files(&paths, &config).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
        assert_eq!(first.dataset.len(), 1);
        assert_eq!(first.warnings.len(), 1);
    }

    #[test]
    fn test_bad_sheet_does_not_drop_good_sheets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Dummy_Bank_Cash_Balance_Data.xlsx");

        let mut workbook = rust_xlsxwriter::Workbook::new();
        let notes = workbook.add_worksheet();
        notes.set_name("Notes").unwrap();
        notes.write_string(0, 0, "Prepared by finance").unwrap();
        notes.write_string(1, 0, "Figures are unaudited").unwrap();

        let week = workbook.add_worksheet();
        week.set_name("March 31 to April 4").unwrap();
        week.write_string(0, 0, "Details").unwrap();
        week.write_string(0, 1, "LKR").unwrap();
        week.write_string(1, 0, "Bank & Cash Balances").unwrap();
        week.write_string(2, 0, "Bank").unwrap();
        week.write_number(2, 1, 100.0).unwrap();
        workbook.save(&path).unwrap();

        let config = DashboardConfig::default();
        let sheets = read_workbook(&path, &config).unwrap();
        assert_eq!(sheets.len(), 2);
        assert!(sheets[0].is_err());
        assert!(sheets[1].is_ok());

        let report = DatasetLoader::new(&config).load_files(&[&path]).unwrap();
        assert_eq!(report.dataset.len(), 1);
        assert_eq!(report.dataset.records[0].week, "March 31 to April 4");
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].source_id.ends_with("#Notes"));
        assert!(matches!(
            report.warnings[0].error,
            FundDashboardError::UnreadableSource { .. }
        ));
    }

    #[test]
    fn test_invalid_config_is_rejected_before_loading() {
        let config = DashboardConfig {
            marker_patterns: vec![CASH_INS.to_string()],
            ..DashboardConfig::default()
        };
        let source = SourceTable::new(
            "a",
            Some("W1".to_string()),
            vec![RawRow::new(CASH_INS), RawRow::new("S").with_amount("LKR", 1.0)],
        );

        let result = DatasetLoader::new(&config).load(&[source]);
        assert!(matches!(result, Err(FundDashboardError::InvalidConfig(_))));
    }

    #[test]
    fn test_unsupported_extension() {
        let config = DashboardConfig::default();
        let result = read_source_file(Path::new("notes.txt"), &config);
        assert!(matches!(
            result,
            Err(FundDashboardError::UnreadableSource { .. })
        ));
    }
}
