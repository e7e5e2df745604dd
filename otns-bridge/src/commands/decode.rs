use anyhow::{Context, Result};
use comfy_table::Cell;
use otns_bridge_core::Event;
use serde::Serialize;

use crate::output::{OutputFormat, create_table, print_output};

#[derive(Debug, Serialize)]
struct DecodedEvent {
    delay: u64,
    event_type: String,
    length: usize,
    message: Option<String>,
    data: String,
}

pub fn handle_decode(input: &str, format: OutputFormat) -> Result<()> {
    let cleaned: String = input
        .trim()
        .trim_start_matches("0x")
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect();
    let bytes = hex::decode(&cleaned).context("Datagram is not valid hex")?;
    let event = Event::decode(&bytes).context("Not an event datagram")?;

    let decoded = DecodedEvent {
        delay: event.delay,
        event_type: event.event_type.to_string(),
        length: event.data.len(),
        message: event.message().map(str::to_string),
        data: hex::encode(&event.data),
    };

    match format {
        OutputFormat::Json => print_output(decoded, format)?,
        OutputFormat::Table => {
            let mut table = create_table();
            table.set_header(vec!["Field", "Value"]);
            table.add_row(vec![Cell::new("Type"), Cell::new(&decoded.event_type)]);
            table.add_row(vec![Cell::new("Delay"), Cell::new(decoded.delay)]);
            table.add_row(vec![Cell::new("Length"), Cell::new(decoded.length)]);
            if let Some(message) = &decoded.message {
                table.add_row(vec![Cell::new("Message"), Cell::new(message)]);
            }
            table.add_row(vec![Cell::new("Data"), Cell::new(&decoded.data)]);
            println!("{table}");
        }
    }
    Ok(())
}
