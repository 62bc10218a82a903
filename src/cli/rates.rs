use super::ui;
use crate::core::config::RatesConfig;
use crate::core::{RateService, RateSnapshot};
use anyhow::{Context, Result};
use chrono::DateTime;
use comfy_table::{Cell, CellAlignment};

fn format_fetched_at(fetched_at: i64) -> String {
    DateTime::from_timestamp_millis(fetched_at)
        .map_or("N/A".to_string(), |dt| {
            dt.format("%Y-%m-%d %H:%M:%S UTC").to_string()
        })
}

/// Renders a snapshot as a two-row rate table with a status footer.
pub fn render_snapshot(snapshot: &RateSnapshot, rates: &RatesConfig) -> String {
    let primary = &rates.primary_currency;
    let secondary = &rates.secondary_currency;

    let mut table = ui::new_styled_table();
    table.set_header(vec![ui::header_cell("Pair"), ui::header_cell("Rate")]);
    table.add_row(vec![
        Cell::new(format!("USDT/{primary}")),
        Cell::new(format!("1 USDT = {:.2} {primary}", snapshot.primary_rate()))
            .set_alignment(CellAlignment::Right),
    ]);
    table.add_row(vec![
        Cell::new(format!("{secondary}/{primary}")),
        Cell::new(format!(
            "1 {secondary} = {:.4} {primary}",
            snapshot.secondary_rate()
        ))
        .set_alignment(CellAlignment::Right),
    ]);

    let status = if snapshot.degraded() {
        ui::style_text("fallback rates in use", ui::StyleType::Warning)
    } else {
        ui::style_text("live", ui::StyleType::TotalValue)
    };

    let mut output = format!(
        "{}\n\n",
        ui::style_text("Exchange Rates", ui::StyleType::Title)
    );
    output.push_str(&table.to_string());
    output.push_str(&format!(
        "\n\n{} {}  {}",
        ui::style_text("Status:", ui::StyleType::TotalLabel),
        status,
        ui::style_text(
            &format!("updated {}", format_fetched_at(snapshot.fetched_at())),
            ui::StyleType::Subtle
        )
    ));
    output
}

pub async fn run(service: &RateService, rates: &RatesConfig, json: bool) -> Result<()> {
    let pb = ui::new_spinner("Fetching rates...");
    let snapshot = service.get_all_rates().await;
    pb.finish_and_clear();

    if json {
        let body =
            serde_json::to_string_pretty(&snapshot).context("Failed to serialize snapshot")?;
        println!("{body}");
    } else {
        println!("{}", render_snapshot(&snapshot, rates));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_fetched_at() {
        assert_eq!(format_fetched_at(0), "1970-01-01 00:00:00 UTC");
        assert_eq!(format_fetched_at(1_700_000_000_000), "2023-11-14 22:13:20 UTC");
    }
}
