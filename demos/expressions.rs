/// Expressions Example
///
/// This example demonstrates:
/// - Evaluating predicate strings against a record
/// - Evaluating formulas, including ones with missing inputs
/// - Parsing an expression and listing the properties it reads

use notequery::{evaluate, evaluate_formula, extract_properties, parse_expr, Record, Value};

fn main() {
    println!("=== NoteQuery Expressions Example ===\n");

    let record: Record = [
        ("file.name", Value::from("Draw Down the Moon")),
        ("file.path", Value::from("Music/albums/Foxing - Draw Down the Moon.md")),
        ("artist", Value::from("Foxing")),
        ("rating", Value::Number(4.5)),
        ("track_scores", Value::Number(0.76)),
        ("package_score", Value::Number(5.0)),
        ("release_date", Value::from("2021-08-20")),
        ("image", Value::from("")),
    ]
    .into_iter()
    .collect();

    println!("1. Predicates");
    let predicates = [
        "file.hasProperty('rating')",
        "file.hasProperty('image')",
        "file.path.startsWith(\"Music\")",
        "artist contains 'FOX'",
        "artist.contains('FOX')",
        "rating >= 4",
        "rating * 2 > 10",
        "!image.isEmpty()",
        "year(release_date) > 2020 && rating > 4",
        "rating >= (",
    ];
    for predicate in predicates.iter() {
        println!("   {:<45} => {}", predicate, evaluate(&record, predicate));
    }

    println!("\n2. Formulas");
    let formulas = [
        "(track_scores * 10 + package_score) / 2",
        "round(rating * 2) / 2",
        "year(today()) - year(release_date)",
        "nostalgia_rating + 1",
        "artist * 2",
    ];
    for formula in formulas.iter() {
        match evaluate_formula(&record, formula) {
            Some(value) => println!("   {:<45} => {}", formula, value),
            None => println!("   {:<45} => null", formula),
        }
    }

    println!("\n3. Referenced properties");
    match parse_expr("max(rating, package_score) + file.name.length") {
        Ok(expr) => println!("   {:?}", extract_properties(&expr)),
        Err(err) => println!("   parse error: {}", err),
    }
}
