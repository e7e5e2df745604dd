use anyhow::Result;
use comfy_table::{Cell, Table};
use otns_bridge_core::export::HistoryExport;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputFormat {
    Json,
    Table,
}

pub fn print_output<T: Serialize>(data: T, _format: OutputFormat) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&data)?);
    Ok(())
}

pub fn create_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(comfy_table::presets::UTF8_FULL)
        .apply_modifier(comfy_table::modifiers::UTF8_ROUND_CORNERS);
    table
}

/// Prints the session timeline, one column per node, followed by each
/// node's grouped history
pub fn print_history(export: &HistoryExport, format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        return print_output(export, format);
    }
    if export.is_empty() {
        println!("No topology changes recorded");
        return Ok(());
    }

    let mut table = create_table();
    let mut header = vec![Cell::new("Time")];
    header.extend(export.columns.iter().map(|id| Cell::new(format!("Node {id}"))));
    table.set_header(header);

    for row in &export.rows {
        let mut cells = vec![Cell::new(row.timestamp.format("%H:%M:%S%.3f"))];
        cells.extend(row.cells.iter().map(Cell::new));
        table.add_row(cells);
    }
    println!("{table}");

    for summary in &export.summaries {
        print!("\n{summary}");
    }
    Ok(())
}
