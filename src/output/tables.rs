use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, CellAlignment, Color as TableColor, ContentArrangement, Table};

/// Table and cell creation helpers
pub fn create_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

pub fn header_cells(labels: &[&str]) -> Vec<Cell> {
    labels
        .iter()
        .map(|label| Cell::new(*label).fg(TableColor::Cyan))
        .collect()
}

/// Seconds with two decimals, or a greyed `n/a` when there is no value.
pub fn duration_cell(seconds: Option<f64>) -> Cell {
    match seconds {
        Some(seconds) => Cell::new(format_seconds(seconds)).set_alignment(CellAlignment::Right),
        None => Cell::new("n/a")
            .fg(TableColor::DarkGrey)
            .set_alignment(CellAlignment::Right),
    }
}

/// Colors the fastest value of a row green and the slowest red.
pub fn ranked_duration_cell(seconds: Option<f64>, row: &[Option<f64>]) -> Cell {
    let cell = duration_cell(seconds);
    let present: Vec<f64> = row.iter().flatten().copied().collect();
    let (Some(value), true) = (seconds, present.len() > 1) else {
        return cell;
    };

    let fastest = present.iter().copied().fold(f64::INFINITY, f64::min);
    let slowest = present.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if fastest == slowest {
        cell
    } else if value <= fastest {
        cell.fg(TableColor::Green)
    } else if value >= slowest {
        cell.fg(TableColor::Red)
    } else {
        cell
    }
}

pub fn format_seconds(seconds: f64) -> String {
    format!("{seconds:.2}s")
}
