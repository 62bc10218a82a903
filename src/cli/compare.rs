use super::ui;
use crate::core::RateService;
use crate::core::compare::{CityQuote, find_city};
use crate::core::config::CityConfig;
use anyhow::{Result, bail};
use comfy_table::Cell;

pub fn render_quote(quote: &CityQuote) -> String {
    let ccy = &quote.currency;
    let cmp = &quote.comparison;

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Channel"),
        ui::header_cell(&format!("You receive ({ccy})")),
    ]);
    table.add_row(vec![Cell::new("Bank (-3% rate)"), ui::amount_cell(cmp.bank_amount, ccy)]);
    table.add_row(vec![Cell::new("ATM (-5% rate)"), ui::amount_cell(cmp.atm_amount, ccy)]);
    table.add_row(vec![
        Cell::new("Cash exchange"),
        ui::best_amount_cell(cmp.exchange_amount, ccy),
    ]);

    let mut output = format!(
        "{}\n\n",
        ui::style_text(
            &format!("{} USDT in {}", quote.amount_usdt, quote.city),
            ui::StyleType::Title
        )
    );
    output.push_str(&format!(
        "1 USDT = {:.2} {ccy}, you receive {:.2} {ccy}\n\n",
        quote.rate, quote.receive
    ));
    output.push_str(&table.to_string());
    output.push_str(&format!(
        "\n\n{} {}",
        ui::style_text("Savings vs bank:", ui::StyleType::TotalLabel),
        ui::style_text(&format!("+{:.2} {ccy}", cmp.savings), ui::StyleType::TotalValue)
    ));

    if let Some(loss) = &quote.atm_loss {
        let mut atm = ui::new_styled_table();
        atm.set_header(vec![ui::header_cell("ATM losses"), ui::header_cell("")]);
        atm.add_row(vec![
            Cell::new(format!("ATM fees ({} withdrawals)", loss.withdrawals)),
            ui::loss_cell(loss.total_fees, ccy),
        ]);
        atm.add_row(vec![
            Cell::new("Conversion loss (~4% bank spread)"),
            ui::loss_cell(loss.conversion_loss, ccy),
        ]);
        atm.add_row(vec![Cell::new("Total loss"), ui::loss_cell(loss.total_loss, ccy)]);
        atm.add_row(vec![
            Cell::new("You receive via ATM"),
            ui::amount_cell(loss.received, ccy),
        ]);
        output.push_str("\n\n");
        output.push_str(&atm.to_string());
    }
    output
}

pub async fn run(
    service: &RateService,
    cities: &[CityConfig],
    amount: f64,
    city_slug: Option<&str>,
    fiat: bool,
) -> Result<()> {
    if !(amount.is_finite() && amount >= 0.0) {
        bail!("Amount must be a non-negative number, got {amount}");
    }
    let city = find_city(cities, city_slug)?;

    let pb = ui::new_spinner("Fetching rates...");
    let snapshot = service.get_all_rates().await;
    pb.finish_and_clear();

    let quote = if fiat {
        let quote = CityQuote::from_fiat(city, amount, snapshot.primary_rate());
        println!(
            "{}\n",
            ui::style_text(
                &format!("{amount:.2} {} = {:.2} USDT", quote.currency, quote.amount_usdt),
                ui::StyleType::Subtle
            )
        );
        quote
    } else {
        CityQuote::new(city, amount, snapshot.primary_rate())
    };
    println!("{}", render_quote(&quote));
    if snapshot.degraded() {
        println!(
            "\n{}",
            ui::style_text(
                "Live rates unavailable, figures use fallback rates",
                ui::StyleType::Warning
            )
        );
    }
    Ok(())
}
