use thiserror::Error;

#[derive(Error, Debug)]
pub enum FundDashboardError {
    #[error("Unreadable source '{source_id}': {reason}")]
    UnreadableSource { source_id: String, reason: String },

    #[error("No section markers found in source: {0}")]
    NoMarkersFound(String),

    #[error("Source '{source_id}' repeats week '{week_id}' and duplicate week merging is disabled")]
    DuplicateWeek { source_id: String, week_id: String },

    #[error("No usable sources were loaded")]
    EmptyDataset,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid week identifier: {0}")]
    InvalidWeekId(String),

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(#[from] calamine::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[cfg(feature = "fx")]
    #[error("FX request failed: {0}")]
    FxRequest(#[from] reqwest::Error),

    #[cfg(feature = "fx")]
    #[error("FX rate unavailable: {0}")]
    FxUnavailable(String),
}

pub type Result<T> = std::result::Result<T, FundDashboardError>;

/// A failure scoped to one input source. The loader collects these as
/// warnings instead of aborting the whole load.
#[derive(Error, Debug)]
#[error("{source_id}: {error}")]
pub struct SourceError {
    pub source_id: String,
    #[source]
    pub error: FundDashboardError,
}

impl SourceError {
    pub fn new(source_id: impl Into<String>, error: FundDashboardError) -> Self {
        Self {
            source_id: source_id.into(),
            error,
        }
    }
}
