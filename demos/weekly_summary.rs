use chrono::NaiveDate;
use weekly_fund_dashboard::{
    DashboardConfig, FundDashboard, RawRow, RollingWindow, SourceTable, CASH_INS, CASH_OUTS,
};

fn week(source_id: &str, week_id: &str, bank: f64, receipts: f64, payments: f64) -> SourceTable {
    SourceTable::new(
        source_id,
        Some(week_id.to_string()),
        vec![
            RawRow::new("Bank & Cash Balances"),
            RawRow::new("Bank")
                .with_amount("LKR", bank)
                .with_amount("USD", 1_200.0),
            RawRow::new("Cash in Hand").with_amount("LKR", 25_000.0),
            RawRow::new("Petty Cash").with_amount("LKR", 5_000.0),
            RawRow::new(""),
            RawRow::new("Cash Ins"),
            RawRow::new("Customer Payments").with_amount("LKR", receipts),
            RawRow::new("Interest").with_amount("USD", 12.5),
            RawRow::new("Cash Outs"),
            RawRow::new("Supplier Payments").with_amount("LKR", payments),
            RawRow::new("Salaries").with_amount("LKR", 150_000.0),
        ],
    )
}

fn main() {
    env_logger::init();

    let sources = vec![
        week(
            "Fund_Balance_March_31_to_April_4.xlsx",
            "March_31_to_April_4",
            1_000_000.0,
            420_000.0,
            180_000.0,
        ),
        week(
            "Fund_Balance_April_7_to_April_11.xlsx",
            "April_7_to_April_11",
            1_090_000.0,
            310_000.0,
            95_000.0,
        ),
        week(
            "Fund_Balance_April_14_to_April_18.xlsx",
            "April_14_to_April_18",
            1_155_000.0,
            505_000.0,
            260_000.0,
        ),
    ];

    let config = DashboardConfig {
        reference_year: Some(2025),
        ..DashboardConfig::default()
    };
    let currencies = config.currency_columns.clone();
    let dashboard = FundDashboard::load(config, &sources).expect("sources should load");

    println!("Loaded {} weeks", dashboard.weeks().len());
    for warning in dashboard.warnings() {
        println!("  warning: {}", warning);
    }

    let latest = dashboard
        .weeks()
        .last()
        .cloned()
        .expect("at least one week is loaded");
    println!("\n{}", dashboard.week_summary(&latest, &currencies).to_markdown());
    println!("{}", dashboard.category_table(&latest, &["LKR", "USD"]).to_markdown());

    let aggregator = dashboard.aggregator_at(NaiveDate::from_ymd_opt(2025, 4, 20).unwrap());
    for section in [CASH_INS, CASH_OUTS] {
        println!("{} (LKR)", section);
        for (week_id, total) in aggregator.time_series(section, "LKR") {
            println!("  {:<24} {:>14.2}", week_id, total);
        }
    }

    let weeks = aggregator.sorted_weeks();
    for (name, window) in [
        ("Last 2 weeks", RollingWindow::LastWeeks(2)),
        ("Month to date", RollingWindow::MonthToDate),
        ("Quarter to date", RollingWindow::QuarterToDate),
    ] {
        let selected = aggregator.rolling_window(&weeks, window);
        let net: f64 = selected
            .iter()
            .map(|week_id| aggregator.net_change(week_id, &["LKR"])["LKR"])
            .sum();
        println!("{:<16} {:?} net LKR {:.2}", name, selected, net);
    }
}
