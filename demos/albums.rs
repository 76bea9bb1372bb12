/// Albums Example
///
/// This example demonstrates:
/// - Collecting records from a content tree
/// - Loading a `.base` file with formulas and several views
/// - Rendering card, sorted and grouped views

use notequery::{BaseConfig, ContentTree, ViewRow};

fn main() -> notequery::Result<()> {
    println!("=== NoteQuery Albums Example ===\n");

    // 1. Collect records
    let tree = ContentTree::from_json_str(include_str!("../fixtures/content.json"))?;
    let records = tree.collect_records();
    println!("1. Collected {} records\n", records.len());

    // 2. Load the base
    let base = BaseConfig::from_yaml_str(include_str!("../fixtures/some-great-albums.base"))?;
    println!("2. Loaded base with {} views\n", base.views.len());

    // 3. Render every view
    for (i, result) in base.render(&records).iter().enumerate() {
        println!(
            "{}. View {:?} ({}), columns: {}",
            i + 3,
            result.name.as_deref().unwrap_or("unnamed"),
            result.view_type,
            result.columns.join(", ")
        );

        for row in &result.data {
            match row {
                ViewRow::GroupHeader { key, .. } => println!("   == {} ==", key),
                ViewRow::Record(record) => {
                    let cells: Vec<String> = result
                        .columns
                        .iter()
                        .map(|column| record.lookup(column).map(|v| v.to_display()).unwrap_or_default())
                        .collect();
                    println!("   {}", cells.join(" | "));
                }
            }
        }

        for (group, cells) in &result.summaries {
            for (column, value) in cells {
                match value {
                    Some(value) => println!("   {} {}: {:.2}", group, column, value),
                    None => println!("   {} {}: -", group, column),
                }
            }
        }
        println!();
    }

    Ok(())
}
