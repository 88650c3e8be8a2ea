use crate::schema::{DashboardConfig, RawRow, Segment, BANK_AND_CASH_BALANCES, MARKER_PATTERNS};
use log::debug;

/// Splits a flat table of labelled rows into sections at marker rows.
pub struct SegmentParser {
    markers: Vec<String>,
    balances_marker: String,
    fill_blank_labels: bool,
}

impl Default for SegmentParser {
    fn default() -> Self {
        Self::new(MARKER_PATTERNS.iter().map(|m| m.to_string()).collect())
    }
}

impl SegmentParser {
    pub fn new(markers: Vec<String>) -> Self {
        Self {
            markers,
            balances_marker: BANK_AND_CASH_BALANCES.to_string(),
            fill_blank_labels: true,
        }
    }

    pub fn from_config(config: &DashboardConfig) -> Self {
        Self::new(config.marker_patterns.clone())
            .with_balances_marker(config.balances_marker.clone())
            .with_fill_blank_labels(config.fill_blank_labels)
    }

    pub fn with_balances_marker(mut self, balances_marker: impl Into<String>) -> Self {
        self.balances_marker = balances_marker.into();
        self
    }

    pub fn with_fill_blank_labels(mut self, fill_blank_labels: bool) -> Self {
        self.fill_blank_labels = fill_blank_labels;
        self
    }

    pub fn is_marker(&self, label: &str) -> bool {
        self.markers.iter().any(|m| label.contains(m.as_str()))
    }

    pub fn marker_indices(&self, table: &[RawRow]) -> Vec<usize> {
        table
            .iter()
            .enumerate()
            .filter(|(_, row)| self.is_marker(&row.label))
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Produces one segment per marker row. The marker row itself is excluded
    /// from its segment body, and fully blank rows are dropped.
    ///
    /// A table without markers yields no segments; deciding what to do with
    /// such a source is up to the caller.
    pub fn parse_table(&self, table: &[RawRow], week_id: &str) -> Vec<Segment> {
        let markers = self.marker_indices(table);
        let mut segments = Vec::with_capacity(markers.len());

        for (i, &marker_idx) in markers.iter().enumerate() {
            let start = marker_idx + 1;
            let end = markers.get(i + 1).copied().unwrap_or(table.len());
            let section = table[marker_idx].label.clone();

            let mut rows: Vec<RawRow> = Vec::with_capacity(end.saturating_sub(start));
            let mut last_label: Option<String> = None;

            for row in &table[start..end] {
                if row.is_blank() {
                    continue;
                }

                let mut row = row.clone();
                if row.has_label() {
                    last_label = Some(row.label.clone());
                } else if self.fill_blank_labels {
                    if let Some(label) = &last_label {
                        row.label = label.clone();
                    }
                }
                rows.push(row);
            }

            debug!(
                "Week '{}': section '{}' has {} rows",
                week_id,
                section,
                rows.len()
            );

            segments.push(Segment {
                section,
                week: week_id.to_string(),
                rows,
            });
        }

        segments
    }

    /// Splits a table holding several week ranges, each opened by a balances
    /// marker row (`Bank & Cash Balances` by default) naming the range in its
    /// trailing text.
    ///
    /// Each returned table starts with its balances marker so it can be fed
    /// straight into [`SegmentParser::parse_table`]. Rows before the first
    /// balances marker are dropped.
    pub fn split_week_ranges(&self, table: &[RawRow]) -> Vec<(String, Vec<RawRow>)> {
        let starts: Vec<usize> = table
            .iter()
            .enumerate()
            .filter(|(_, row)| row.label.contains(self.balances_marker.as_str()))
            .map(|(idx, _)| idx)
            .collect();

        starts
            .iter()
            .enumerate()
            .map(|(i, &start)| {
                let end = starts.get(i + 1).copied().unwrap_or(table.len());
                let week_id = week_id_from_marker(&table[start].label, &self.balances_marker)
                    .unwrap_or_else(|| format!("Week {}", i + 1));
                (week_id, table[start..end].to_vec())
            })
            .collect()
    }
}

/// `"Bank & Cash Balances - March 31 to April 4"` -> `"March 31 to April 4"`.
pub fn week_id_from_marker(label: &str, balances_marker: &str) -> Option<String> {
    let (_, rest) = label.split_once(balances_marker)?;
    let week = rest
        .trim()
        .trim_matches(|c: char| c.is_whitespace() || "-–:()[],".contains(c))
        .trim();

    if week.is_empty() {
        None
    } else {
        Some(week.to_string())
    }
}

pub fn parse_table(table: &[RawRow], week_id: &str) -> Vec<Segment> {
    SegmentParser::default().parse_table(table, week_id)
}
