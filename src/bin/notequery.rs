/// NoteQuery command-line front end
///
/// Loads a content tree and a base, renders the base's views and prints the
/// results as JSON.

use clap::Parser;
use notequery::{BaseConfig, ContentTree, PropertyTypes, ViewResult};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "notequery")]
#[command(about = "Render note bases as JSON view results", long_about = None)]
struct Cli {
    /// Content tree JSON produced by the directory scanner
    #[arg(short, long)]
    content: PathBuf,

    /// Base file (.base YAML or .json), or the slug path of a base document in the content tree
    #[arg(short, long)]
    base: String,

    /// Render only the view with this name
    #[arg(short, long)]
    view: Option<String>,

    /// Property type hints (`.obsidian/types.json`)
    #[arg(short, long)]
    types: Option<PathBuf>,

    /// Pretty-print the JSON output
    #[arg(long)]
    pretty: bool,
}

#[derive(Deserialize)]
struct TypesFile {
    types: PropertyTypes,
}

fn main() {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let cli = Cli::parse();
    match run(&cli) {
        Ok(output) => println!("{}", output),
        Err(err) => {
            log::error!("{}", err);
            eprintln!("notequery: {}", err);
            std::process::exit(1);
        }
    }
}

fn run(cli: &Cli) -> notequery::Result<String> {
    let tree = ContentTree::from_json_str(&fs::read_to_string(&cli.content)?)?;

    let records = match &cli.types {
        Some(path) => {
            let types: TypesFile = serde_json::from_str(&fs::read_to_string(path)?)?;
            tree.collect_records_with_types(&types.types)
        }
        None => tree.collect_records(),
    };

    let base = if Path::new(&cli.base).is_file() {
        BaseConfig::from_path(&cli.base)?
    } else {
        BaseConfig::from_tree(&tree, &cli.base)?
    };

    let results: Vec<ViewResult> = match &cli.view {
        Some(name) => vec![base.render_view(&records, name)?],
        None => base.render(&records),
    };
    log::info!("Rendered {} view(s) over {} records", results.len(), records.len());

    let output = if cli.pretty {
        serde_json::to_string_pretty(&results)?
    } else {
        serde_json::to_string(&results)?
    };
    Ok(output)
}
