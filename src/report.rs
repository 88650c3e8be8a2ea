use crate::aggregator::WeeklyAggregator;
use crate::error::Result;
use crate::schema::{CurrencyAmounts, FundDataset};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceLine {
    pub label: String,
    /// False when the week has no such row; amounts are then all zero and
    /// renderers show a placeholder.
    pub found: bool,
    pub amounts: CurrencyAmounts,
}

/// Opening, movement and closing figures for one week.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeekSummary {
    pub week_id: String,
    pub currencies: Vec<String>,
    pub opening: Vec<BalanceLine>,
    pub opening_total: CurrencyAmounts,
    pub cash_in: CurrencyAmounts,
    pub cash_out: CurrencyAmounts,
    pub net_change: CurrencyAmounts,
    pub closing: CurrencyAmounts,
}

impl WeekSummary {
    pub fn build<S: AsRef<str>>(
        aggregator: &WeeklyAggregator<'_>,
        week_id: &str,
        currencies: &[S],
    ) -> Self {
        let opening = aggregator
            .opening_balance_labels()
            .iter()
            .map(|label| BalanceLine {
                label: label.clone(),
                found: aggregator.find_opening_row(week_id, label).is_some(),
                amounts: aggregator.opening_balance(week_id, label, currencies),
            })
            .collect();

        Self {
            week_id: week_id.to_string(),
            currencies: currencies.iter().map(|c| c.as_ref().to_string()).collect(),
            opening,
            opening_total: aggregator.total_opening_balance(week_id, currencies),
            cash_in: aggregator.section_totals(week_id, aggregator.cash_in_section(), currencies),
            cash_out: aggregator.section_totals(week_id, aggregator.cash_out_section(), currencies),
            net_change: aggregator.net_change(week_id, currencies),
            closing: aggregator.closing_balance(week_id, currencies),
        }
    }

    fn lines(&self) -> Vec<(String, Option<&CurrencyAmounts>)> {
        let mut lines: Vec<(String, Option<&CurrencyAmounts>)> = self
            .opening
            .iter()
            .map(|line| {
                let amounts = if line.found { Some(&line.amounts) } else { None };
                (format!("Opening {}", line.label), amounts)
            })
            .collect();

        lines.push(("Opening Balance".to_string(), Some(&self.opening_total)));
        lines.push(("Cash In".to_string(), Some(&self.cash_in)));
        lines.push(("Cash Out".to_string(), Some(&self.cash_out)));
        lines.push(("Net Change".to_string(), Some(&self.net_change)));
        lines.push(("Closing Balance".to_string(), Some(&self.closing)));
        lines
    }

    pub fn to_csv(&self) -> Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());

        let mut header = vec!["Week".to_string(), "Line".to_string()];
        header.extend(self.currencies.iter().cloned());
        writer.write_record(&header)?;

        for (line, amounts) in self.lines() {
            let mut record = vec![self.week_id.clone(), line];
            record.extend(self.currencies.iter().map(|c| cell(amounts, c)));
            writer.write_record(&record)?;
        }

        finish_csv(writer)
    }

    pub fn to_markdown(&self) -> String {
        let mut output = String::new();

        output.push_str(&format!("# Weekly Fund Summary - {}\n\n", self.week_id));
        output.push_str(&markdown_header("Line", &self.currencies));

        for (line, amounts) in self.lines() {
            output.push_str(&format!("| {} |", line));
            for currency in &self.currencies {
                output.push_str(&format!(" {} |", cell(amounts, currency)));
            }
            output.push('\n');
        }
        output.push('\n');

        output
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRow {
    pub section: String,
    pub label: String,
    pub amounts: CurrencyAmounts,
}

/// Every row of one week as section x label x currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryTable {
    pub week_id: String,
    pub currencies: Vec<String>,
    pub rows: Vec<CategoryRow>,
}

impl CategoryTable {
    pub fn build<S: AsRef<str>>(dataset: &FundDataset, week_id: &str, currencies: &[S]) -> Self {
        let rows = dataset
            .records_for(week_id)
            .flat_map(|record| record.rows())
            .map(|(segment, row)| CategoryRow {
                section: segment.section.clone(),
                label: row.label.clone(),
                amounts: currencies
                    .iter()
                    .map(|c| (c.as_ref().to_string(), row.amount(c.as_ref())))
                    .collect(),
            })
            .collect();

        Self {
            week_id: week_id.to_string(),
            currencies: currencies.iter().map(|c| c.as_ref().to_string()).collect(),
            rows,
        }
    }

    pub fn section(&self, section: &str) -> Vec<&CategoryRow> {
        self.rows
            .iter()
            .filter(|row| row.section.contains(section))
            .collect()
    }

    pub fn to_csv(&self) -> Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());

        let mut header = vec!["Week".to_string(), "Section".to_string(), "Details".to_string()];
        header.extend(self.currencies.iter().cloned());
        writer.write_record(&header)?;

        for row in &self.rows {
            let mut record = vec![self.week_id.clone(), row.section.clone(), row.label.clone()];
            record.extend(
                self.currencies
                    .iter()
                    .map(|c| cell(Some(&row.amounts), c)),
            );
            writer.write_record(&record)?;
        }

        finish_csv(writer)
    }

    pub fn to_markdown(&self) -> String {
        let mut output = String::new();

        output.push_str(&format!("# Fund Balances - {}\n\n", self.week_id));

        let mut current_section: Option<&str> = None;
        for row in &self.rows {
            if current_section != Some(row.section.as_str()) {
                if current_section.is_some() {
                    output.push('\n');
                }
                output.push_str(&format!("## {}\n\n", row.section));
                output.push_str(&markdown_header("Details", &self.currencies));
                current_section = Some(row.section.as_str());
            }

            output.push_str(&format!("| {} |", row.label));
            for currency in &self.currencies {
                output.push_str(&format!(" {} |", cell(Some(&row.amounts), currency)));
            }
            output.push('\n');
        }
        output.push('\n');

        output
    }
}

fn cell(amounts: Option<&CurrencyAmounts>, currency: &str) -> String {
    match amounts {
        Some(amounts) => format!("{:.2}", amounts.get(currency).copied().unwrap_or(0.0)),
        None => "-".to_string(),
    }
}

fn markdown_header(first: &str, currencies: &[String]) -> String {
    let mut header = format!("| {} |", first);
    let mut rule = String::from("|---|");
    for currency in currencies {
        header.push_str(&format!(" {} |", currency));
        rule.push_str("---:|");
    }
    format!("{}\n{}\n", header, rule)
}

fn finish_csv(writer: csv::Writer<Vec<u8>>) -> Result<String> {
    let bytes = writer
        .into_inner()
        .map_err(|e| std::io::Error::other(e.to_string()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
