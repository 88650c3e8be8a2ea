use crate::schema::{
    zero_amounts, CurrencyAmounts, DashboardConfig, FundDataset, RawRow, BANK_AND_CASH_BALANCES,
    CASH_INS, CASH_OUTS, OPENING_BALANCE_LABELS,
};
use crate::utils::{first_day_of_month, first_day_of_quarter, parse_week_start};
use chrono::{Datelike, Local, NaiveDate};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RollingWindow {
    /// The last N weeks of the chronologically sorted list.
    LastWeeks(usize),
    /// Weeks starting between the first of the current month and today.
    MonthToDate,
    /// Weeks starting between the first of the current quarter and today.
    QuarterToDate,
}

/// Read-only queries over a loaded [`FundDataset`].
///
/// Section lookups use substring containment, the same rule the parser
/// uses for markers. Absent labels, sections and currencies produce zeros.
pub struct WeeklyAggregator<'a> {
    dataset: &'a FundDataset,
    balances_section: String,
    cash_in_section: String,
    cash_out_section: String,
    opening_labels: Vec<String>,
    reference_date: NaiveDate,
    reference_year: i32,
}

impl<'a> WeeklyAggregator<'a> {
    pub fn new(dataset: &'a FundDataset) -> Self {
        let today = Local::now().date_naive();
        Self {
            dataset,
            balances_section: BANK_AND_CASH_BALANCES.to_string(),
            cash_in_section: CASH_INS.to_string(),
            cash_out_section: CASH_OUTS.to_string(),
            opening_labels: OPENING_BALANCE_LABELS.iter().map(|l| l.to_string()).collect(),
            reference_date: today,
            reference_year: today.year(),
        }
    }

    pub fn from_config(dataset: &'a FundDataset, config: &DashboardConfig) -> Self {
        Self::new(dataset).apply_config(config)
    }

    /// Takes section markers, opening labels and, when set, the reference
    /// year from `config`.
    pub fn apply_config(mut self, config: &DashboardConfig) -> Self {
        self.balances_section = config.balances_marker.clone();
        self.cash_in_section = config.cash_in_marker.clone();
        self.cash_out_section = config.cash_out_marker.clone();
        self.opening_labels = config.opening_balance_labels.clone();
        if let Some(year) = config.reference_year {
            self.reference_year = year;
        }
        self
    }

    /// Pins "today" for the to-date windows and the default year of week ids.
    pub fn with_reference_date(mut self, date: NaiveDate) -> Self {
        self.reference_date = date;
        self.reference_year = date.year();
        self
    }

    pub fn with_reference_year(mut self, year: i32) -> Self {
        self.reference_year = year;
        self
    }

    pub fn with_opening_balance_labels(mut self, labels: Vec<String>) -> Self {
        self.opening_labels = labels;
        self
    }

    pub fn dataset(&self) -> &FundDataset {
        self.dataset
    }

    pub fn opening_balance_labels(&self) -> &[String] {
        &self.opening_labels
    }

    pub fn balances_section(&self) -> &str {
        &self.balances_section
    }

    pub fn cash_in_section(&self) -> &str {
        &self.cash_in_section
    }

    pub fn cash_out_section(&self) -> &str {
        &self.cash_out_section
    }

    pub fn section_totals<S: AsRef<str>>(
        &self,
        week_id: &str,
        section: &str,
        currencies: &[S],
    ) -> CurrencyAmounts {
        let mut totals = zero_amounts(currencies);

        let rows = self
            .dataset
            .records_for(week_id)
            .flat_map(|record| record.rows())
            .filter(|(segment, _)| segment.matches_section(section));

        for (_, row) in rows {
            for (currency, total) in totals.iter_mut() {
                *total += row.amount(currency);
            }
        }

        totals
    }

    /// Amounts of the first balances row labelled `label`, zero-filled when absent.
    pub fn opening_balance<S: AsRef<str>>(
        &self,
        week_id: &str,
        label: &str,
        currencies: &[S],
    ) -> CurrencyAmounts {
        self.find_opening_row(week_id, label)
            .map(|row| {
                currencies
                    .iter()
                    .map(|c| (c.as_ref().to_string(), row.amount(c.as_ref())))
                    .collect()
            })
            .unwrap_or_else(|| zero_amounts(currencies))
    }

    pub fn find_opening_row(&self, week_id: &str, label: &str) -> Option<&'a RawRow> {
        self.dataset
            .records
            .iter()
            .filter(|record| record.week == week_id)
            .find_map(|record| record.lookup(&self.balances_section, label))
    }

    /// Sum of the opening rows for every configured opening label.
    pub fn total_opening_balance<S: AsRef<str>>(
        &self,
        week_id: &str,
        currencies: &[S],
    ) -> CurrencyAmounts {
        let mut totals = zero_amounts(currencies);
        for label in &self.opening_labels {
            let balance = self.opening_balance(week_id, label, currencies);
            add_into(&mut totals, &balance);
        }
        totals
    }

    /// Cash Ins minus Cash Outs, summed per raw currency column.
    pub fn net_change<S: AsRef<str>>(&self, week_id: &str, currencies: &[S]) -> CurrencyAmounts {
        let cash_in = self.section_totals(week_id, &self.cash_in_section, currencies);
        let cash_out = self.section_totals(week_id, &self.cash_out_section, currencies);

        cash_in
            .into_iter()
            .map(|(currency, inflow)| {
                let outflow = cash_out.get(&currency).copied().unwrap_or(0.0);
                (currency, inflow - outflow)
            })
            .collect()
    }

    pub fn closing_balance<S: AsRef<str>>(
        &self,
        week_id: &str,
        currencies: &[S],
    ) -> CurrencyAmounts {
        let mut closing = self.total_opening_balance(week_id, currencies);
        add_into(&mut closing, &self.net_change(week_id, currencies));
        closing
    }

    pub fn week_start(&self, week_id: &str) -> Option<NaiveDate> {
        parse_week_start(week_id, self.reference_year).ok()
    }

    /// Distinct weeks ordered by parsed start date. Weeks whose identifier
    /// does not parse sort first, keeping their load order.
    ///
    /// Identifiers without a year all resolve in the reference year, so a run
    /// crossing New Year (`December 29 to January 2`, `January 5 to January 9`)
    /// puts the January weeks first. Carry the year in the identifier
    /// (`December 29 2025 to January 2 2026`) to order such runs correctly.
    pub fn sorted_weeks(&self) -> Vec<String> {
        let mut weeks: Vec<(Option<NaiveDate>, String)> = self
            .dataset
            .week_ids()
            .into_iter()
            .map(|week| (self.week_start(&week), week))
            .collect();

        weeks.sort_by_key(|(start, _)| *start);
        weeks.into_iter().map(|(_, week)| week).collect()
    }

    pub fn time_series(&self, section: &str, currency: &str) -> Vec<(String, f64)> {
        self.sorted_weeks()
            .into_iter()
            .map(|week| {
                let total = self
                    .section_totals(&week, section, &[currency])
                    .get(currency)
                    .copied()
                    .unwrap_or(0.0);
                (week, total)
            })
            .collect()
    }

    /// Selects weeks from an already chronologically sorted list.
    pub fn rolling_window(&self, weeks: &[String], window: RollingWindow) -> Vec<String> {
        match window {
            RollingWindow::LastWeeks(n) => weeks[weeks.len().saturating_sub(n)..].to_vec(),
            RollingWindow::MonthToDate => {
                self.weeks_starting_between(weeks, first_day_of_month(self.reference_date))
            }
            RollingWindow::QuarterToDate => {
                self.weeks_starting_between(weeks, first_day_of_quarter(self.reference_date))
            }
        }
    }

    fn weeks_starting_between(&self, weeks: &[String], from: NaiveDate) -> Vec<String> {
        weeks
            .iter()
            .filter(|week| {
                self.week_start(week)
                    .map(|start| start >= from && start <= self.reference_date)
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }
}

fn add_into(target: &mut CurrencyAmounts, other: &CurrencyAmounts) {
    for (currency, amount) in other {
        *target.entry(currency.clone()).or_insert(0.0) += amount;
    }
}
