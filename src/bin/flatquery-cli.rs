//! flatquery command line
//!
//! Runs one query (positional argument) or an interactive shell over the
//! CSV relations in a data directory.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use flatquery::{execute_select_query, CsvStorage, EngineConfig, Row, Storage, Value};
use indexmap::IndexSet;
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "flatquery-cli")]
#[command(version)]
#[command(about = "Run SELECT queries over CSV files")]
struct Args {
    /// Directory holding `<table>.csv` files (overrides the config file)
    #[arg(short, long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// JSON engine config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,

    /// Persist the result rows as this relation
    #[arg(long, value_name = "TABLE")]
    save: Option<String>,

    /// Query to run; starts the interactive shell when omitted
    query: Option<String>,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("❌ Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(dir) = &args.data_dir {
        config.data_dir = dir.clone();
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.log_level.to_lowercase())),
        )
        .with_writer(std::io::stderr)
        .try_init()
        .ok();

    info!(data_dir = %config.data_dir.display(), "flatquery v{}", VERSION);
    let storage = CsvStorage::new(config)?;

    match &args.query {
        Some(query) => run_query(&storage, query, &args).await,
        None => interactive_mode(&storage, &args).await,
    }
}

async fn run_query(storage: &CsvStorage, query: &str, args: &Args) -> Result<()> {
    let rows = execute_select_query(storage, query).await?;
    display_rows(&rows, args.format)?;

    if let Some(table) = &args.save {
        storage
            .persist_relation(table, &rows)
            .await
            .with_context(|| format!("saving result as '{}'", table))?;
        println!("💾 Saved {} row(s) to '{}'", rows.len(), table);
    }
    Ok(())
}

async fn interactive_mode(storage: &CsvStorage, args: &Args) -> Result<()> {
    println!("🚀 flatquery v{}", VERSION);
    println!("📂 Data: {}", storage.config().data_dir.display());
    println!("💡 Type '.help' for help, '.exit' to quit\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut pending = String::new();

    loop {
        print!("{}", if pending.is_empty() { "flatquery> " } else { "        -> " });
        std::io::stdout().flush()?;

        let line = match lines.next_line().await? {
            Some(line) => line,
            None => break,
        };
        let input = line.trim();

        if input.starts_with('.') {
            if !pending.is_empty() {
                eprintln!("⚠️  Warning: Incomplete query discarded");
                pending.clear();
            }
            match input {
                ".exit" | ".quit" => {
                    println!("👋 Goodbye!");
                    break;
                }
                ".help" => print_interactive_help(),
                _ => {
                    eprintln!("❌ Unknown command: {}", input);
                    println!("💡 Type '.help' for available commands");
                }
            }
            continue;
        }

        if input.is_empty() {
            continue;
        }

        // Queries may span lines and end with ';'
        pending.push_str(input);
        pending.push(' ');
        if !input.ends_with(';') {
            continue;
        }

        if let Err(e) = run_query(storage, pending.trim(), args).await {
            eprintln!("❌ Error: {:#}", e);
        }
        pending.clear();
    }

    Ok(())
}

fn display_rows(rows: &[Row], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(rows)?);
        }
        OutputFormat::Table => display_table(rows),
    }
    Ok(())
}

fn display_table(rows: &[Row]) {
    if rows.is_empty() {
        println!("📊 No results");
        return;
    }

    // Rows need not share a schema
    let columns: IndexSet<&str> = rows
        .iter()
        .flat_map(|row| row.keys().map(String::as_str))
        .collect();

    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            columns
                .iter()
                .map(|col| match row.get(*col) {
                    None | Some(Value::Null) => "NULL".to_string(),
                    Some(Value::Text(s)) if s.chars().count() > 50 => {
                        format!("{}...", s.chars().take(47).collect::<String>())
                    }
                    Some(value) => value.to_string(),
                })
                .collect()
        })
        .collect();

    let widths: Vec<usize> = columns
        .iter()
        .enumerate()
        .map(|(i, col)| {
            cells
                .iter()
                .map(|row| row[i].chars().count())
                .chain(std::iter::once(col.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    print_rule(&widths, '┌', '┬', '┐');
    print_cells(columns.iter().copied(), &widths);
    print_rule(&widths, '├', '┼', '┤');
    for row in &cells {
        print_cells(row.iter().map(String::as_str), &widths);
    }
    print_rule(&widths, '└', '┴', '┘');

    println!("\n📊 {} row(s) returned", rows.len());
}

fn print_rule(widths: &[usize], left: char, mid: char, right: char) {
    let segments: Vec<String> = widths.iter().map(|w| "─".repeat(w + 2)).collect();
    println!("{}{}{}", left, segments.join(&mid.to_string()), right);
}

fn print_cells<'a>(cells: impl Iterator<Item = &'a str>, widths: &[usize]) {
    let padded: Vec<String> = cells
        .zip(widths)
        .map(|(cell, &width)| format!(" {:width$} ", cell, width = width))
        .collect();
    println!("│{}│", padded.join("│"));
}

fn print_interactive_help() {
    println!(
        r#"
Commands:
  .help              Show this help
  .exit, .quit       Leave the shell

Queries end with ';' and may span several lines:
  SELECT name, age FROM student WHERE age > 20 ORDER BY age DESC LIMIT 5;
  SELECT student.name, enrollment.course FROM student
    INNER JOIN enrollment ON student.id = enrollment.student_id;
  SELECT cust, SUM(amt) FROM orders GROUP BY cust;
  SELECT APPROXIMATE_COUNT(*) FROM student;
  SELECT COUNT(DISTINCT (name, age)) FROM student;
"#
    );
}
