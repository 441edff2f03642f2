//! Table formatting using comfy-table.

use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, Color, ContentArrangement, Table};

/// Builds a table with a bold header row.
pub fn styled_table(columns: &[&str], rows: &[Vec<String>]) -> Table {
    let mut table = Table::new();

    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);

    let header_cells: Vec<Cell> = columns
        .iter()
        .map(|col| {
            if super::no_color() {
                Cell::new(col)
            } else {
                Cell::new(col).add_attribute(Attribute::Bold).fg(Color::Cyan)
            }
        })
        .collect();
    table.set_header(header_cells);

    for row in rows {
        table.add_row(row);
    }

    table
}

pub fn print_table(columns: &[&str], rows: &[Vec<String>]) {
    println!("{}", styled_table(columns, rows));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_contains_cells() {
        crate::style::set_no_color(true);
        let rows = vec![vec!["smsg".to_string(), "2".to_string()]];
        let rendered = styled_table(&["Scenario", "Nodes"], &rows).to_string();
        assert!(rendered.contains("Scenario"));
        assert!(rendered.contains("smsg"));
    }
}
