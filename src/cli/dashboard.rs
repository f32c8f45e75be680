//! Renders the holdings table shared by the one-shot and live views.

use comfy_table::Cell;
use std::collections::HashMap;

use super::ui;
use crate::core::model::{Holding, PriceRecord};

/// Builds the portfolio table from current holdings and the latest price
/// records. Symbols without a record render as N/A and are excluded from
/// the total.
pub fn render(
    holdings: &[Holding],
    records: &HashMap<String, PriceRecord>,
    target_currency: &str,
) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Symbol"),
        ui::header_cell("Type"),
        ui::header_cell("Units"),
        ui::header_cell(&format!("Price ({target_currency})")),
        ui::header_cell(&format!("Value ({target_currency})")),
        ui::header_cell("PnL (%)"),
        ui::header_cell("Source"),
    ]);

    let mut total_value = 0.0;
    let mut missing = 0usize;

    for holding in holdings {
        let record = records.get(&holding.symbol);

        let price_cell = ui::format_optional_cell(record.map(|r| r.price), |p| format!("{p:.2}"));
        let value = record.map(|r| r.price * holding.quantity);
        let value_cell = ui::format_optional_cell(value, |v| format!("{v:.2}"));

        let pnl_cell = match record {
            Some(r) if holding.purchase_price > 0.0 => {
                ui::change_cell((r.price - holding.purchase_price) / holding.purchase_price * 100.0)
            }
            _ => ui::format_optional_cell(None::<f64>, |_| String::new()),
        };
        let source_cell = match record {
            Some(r) => ui::source_cell(r.source),
            None => ui::format_optional_cell(None::<f64>, |_| String::new()),
        };

        match value {
            Some(v) => total_value += v,
            None => missing += 1,
        }

        table.add_row(vec![
            Cell::new(&holding.symbol),
            Cell::new(holding.asset_type.to_string()),
            Cell::new(format!("{:.2}", holding.quantity)),
            price_cell,
            value_cell,
            pnl_cell,
            source_cell,
        ]);
    }

    let mut output = format!(
        "{}\n\n{}",
        ui::style_text("Portfolio", ui::StyleType::Title),
        table
    );

    output.push_str(&format!(
        "\n\nTotal Value ({}): {}",
        ui::style_text(target_currency, ui::StyleType::TotalLabel),
        ui::style_text(&format!("{total_value:.2}"), ui::StyleType::TotalValue),
    ));
    if missing > 0 {
        output.push_str(&format!(
            " {}",
            ui::style_text(
                &format!("({missing} symbols without a price)"),
                ui::StyleType::Subtle
            )
        ));
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{AssetType, PriceSource};
    use chrono::Utc;

    fn holding(symbol: &str, quantity: f64, purchase_price: f64) -> Holding {
        Holding {
            id: format!("crypto-{}", symbol.to_lowercase()),
            symbol: symbol.to_string(),
            asset_type: AssetType::Crypto,
            quantity,
            purchase_price,
            current_price: None,
        }
    }

    fn record(symbol: &str, price: f64) -> (String, PriceRecord) {
        (
            symbol.to_string(),
            PriceRecord {
                symbol: symbol.to_string(),
                price,
                source: PriceSource::Poll,
                observed_at: Utc::now(),
                asset_type: AssetType::Crypto,
            },
        )
    }

    #[test]
    fn test_render_includes_prices_and_total() {
        let holdings = vec![holding("BTC", 0.5, 30000.0)];
        let records: HashMap<_, _> = [record("BTC", 65000.0)].into();

        let output = render(&holdings, &records, "USD");
        assert!(output.contains("BTC"));
        assert!(output.contains("65000.00"));
        assert!(output.contains("32500.00"));
        assert!(output.contains("poll"));
    }

    #[test]
    fn test_render_missing_price_is_na() {
        let holdings = vec![holding("BTC", 0.5, 30000.0), holding("ETH", 2.0, 1800.0)];
        let records: HashMap<_, _> = [record("BTC", 65000.0)].into();

        let output = render(&holdings, &records, "USD");
        assert!(output.contains("N/A"));
        assert!(output.contains("1 symbols without a price"));
        // Total still counts the priced holding
        assert!(output.contains("32500.00"));
    }

    #[test]
    fn test_render_empty_portfolio() {
        let output = render(&[], &HashMap::new(), "USD");
        assert!(output.contains("Total Value"));
        assert!(output.contains("0.00"));
    }
}
