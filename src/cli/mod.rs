//! Command-line interface for training runs and data inspection

use clap::{Parser, Subcommand};
use colored::*;
use std::path::PathBuf;
use std::time::Instant;

use crate::config::{SourceFile, TrainingRequest};
use crate::data;
use crate::models::ModelKind;
use crate::pipeline;
use crate::search::SearchMethod;
use crate::transform::{ScalerKind, YTransform};

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString {
    s.truecolor(100, 100, 100)
}
fn accent(s: &str) -> ColoredString {
    s.truecolor(120, 170, 255)
}
fn muted(s: &str) -> ColoredString {
    s.truecolor(140, 140, 140)
}
fn ok(s: &str) -> ColoredString {
    s.truecolor(100, 210, 120)
}

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

fn kv(key: &str, val: &str) {
    println!("  {:<22} {}", muted(key), val.white());
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "embedml")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Training orchestrator for embedding-based property regression")]
#[command(long_about = None)]
pub struct Cli {
    /// Print only the final JSON summary
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a training request end to end
    Train {
        /// Request description (JSON file)
        #[arg(short, long)]
        request: PathBuf,
    },

    /// Show shape and column information for a label table
    Inspect {
        /// Data file (CSV, Parquet, JSON, SMI, or HDF5)
        data: PathBuf,

        /// Override the format inferred from the extension
        #[arg(long)]
        filetype: Option<String>,

        /// Group key for HDF5 tables
        #[arg(long)]
        key: Option<String>,
    },

    /// List supported models, transforms, scalers and search methods
    Info,
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub fn cmd_train(request_path: &PathBuf, quiet: bool) -> anyhow::Result<()> {
    if !quiet {
        section("Train");
        step_run(&format!("Loading request {}", request_path.display()));
    }

    let raw: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(request_path)?)?;
    let request = match TrainingRequest::from_json_file(request_path) {
        Ok(r) => r,
        Err(e) => {
            println!(
                "{}",
                serde_json::to_string_pretty(&pipeline::failure_summary(&e.to_string()))?
            );
            std::process::exit(1);
        }
    };
    if !quiet {
        step_done(&request.model.to_string());
        step_run(&format!("Training {}", request.model.to_string().cyan()));
    }

    let start = Instant::now();
    match pipeline::run(&request, Some(&raw)) {
        Ok(summary) => {
            if !quiet {
                step_done(&format!("{:?}", start.elapsed()));
                println!();
                kv("Train R²", &format!("{:.4}", summary.train.r2));
                kv("Test R²", &format!("{:.4}", summary.test.r2));
                kv("Test RMSE", &format!("{:.4}", summary.test.rmse));
                kv("Artifacts", &summary.output_stem);
                println!();
            }
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
        Err(e) => {
            println!(
                "{}",
                serde_json::to_string_pretty(&pipeline::failure_summary(&e.to_string()))?
            );
            std::process::exit(1);
        }
    }
}

pub fn cmd_inspect(
    data_path: &PathBuf,
    filetype: Option<&str>,
    key: Option<&str>,
    quiet: bool,
) -> anyhow::Result<()> {
    let mut source = SourceFile::new(data_path);
    source.filetype = filetype.map(str::to_string);
    source.key = key.map(str::to_string);

    let info = data::inspect(&source)?;

    if quiet {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    section("Inspect");
    kv("File", &data_path.display().to_string());
    kv("Rows", &info.rows.to_string());
    kv("Columns", &info.columns.to_string());
    kv("Size", &format!("{} bytes", info.estimated_size_bytes));
    println!();
    for column in &info.column_info {
        println!("  {:<28} {}", column.name.white(), dim(&column.dtype));
    }
    println!();
    Ok(())
}

pub fn cmd_info() -> anyhow::Result<()> {
    section("Models");
    for name in ModelKind::all_names() {
        println!("  {}", name.white());
    }

    section("Y transformations");
    for name in YTransform::all_names() {
        println!("  {}", name.white());
    }

    section("Y scalers");
    for name in ScalerKind::all_names() {
        println!("  {}", name.white());
    }

    section("Search methods");
    for name in SearchMethod::all_names() {
        println!("  {}", name.white());
    }
    println!();
    Ok(())
}
