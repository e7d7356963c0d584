//! Terminal rendering of solver output.

use colored::Colorize;
use comfy_table::{Cell, CellAlignment, ContentArrangement, Table};

use crate::cards::{card_to_string, Card};

pub fn board_display(board: &[Card]) -> String {
    board
        .iter()
        .map(|&c| card_to_string(c))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "error:".red().bold(), msg);
}

/// Render per-hand action frequencies. Each row's weights are normalized to
/// percentages; heavy frequencies are highlighted.
pub fn strategy_table(actions: &[String], rows: &[(String, Vec<f32>)]) -> Table {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);

    let mut header = vec![Cell::new("Hand")];
    header.extend(actions.iter().map(Cell::new));
    table.set_header(header);

    for (hand, weights) in rows {
        let total: f32 = weights.iter().sum();
        let mut cells = vec![Cell::new(hand)];
        for &w in weights {
            let pct = if total > 0.0 { w / total * 100.0 } else { 0.0 };
            let text = format!("{:.0}%", pct);
            let text = if pct > 70.0 {
                text.green().to_string()
            } else if pct > 30.0 {
                text.yellow().to_string()
            } else {
                text
            };
            cells.push(Cell::new(text).set_alignment(CellAlignment::Right));
        }
        table.add_row(cells);
    }
    table
}
