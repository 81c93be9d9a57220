use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use xmp_caption::{config, pipeline};

#[derive(Parser, Debug)]
#[command(
    name = "xmp-caption",
    version,
    about = "Read and write the XMP description (caption) of JPEG, PNG and WebP images"
)]
struct Cli {
    /// Image files or directories to process
    #[arg(value_name = "PATH")]
    paths: Vec<PathBuf>,

    /// Write TEXT as the description of every image
    #[arg(long, value_name = "TEXT")]
    set: Option<String>,

    /// Print the raw embedded XMP packet and exit
    #[arg(long = "show-xmp")]
    show_xmp: bool,

    /// Path to config file (default: config.json next to binary)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Initialize a default config.json and exit
    #[arg(long)]
    init: bool,

    /// Preview changes without writing to files
    #[arg(long)]
    dry_run: bool,

    /// Output results as JSON
    #[arg(long)]
    json: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Handle --init
    if cli.init {
        let config = config::Config::default();
        let path = cli.config.as_deref();
        config.save(path)?;
        let save_path = match path {
            Some(p) => p.to_path_buf(),
            None => config::Config::config_path()?,
        };
        println!("Default config written to {}", save_path.display());
        return Ok(());
    }

    if cli.paths.is_empty() {
        anyhow::bail!("No input files or directories specified. Use --help for usage.");
    }

    // Load config
    let mut config = config::Config::load(cli.config.as_deref())?;

    // Override dry_run from CLI flag
    if cli.dry_run {
        config.output.dry_run = true;
    }

    let images = pipeline::collect_images(&cli.paths, &config.scan);
    if images.is_empty() {
        anyhow::bail!("No supported image files found in the specified paths.");
    }

    match cli.set.as_deref() {
        Some(text) => write_all(&images, text, &config, cli.json),
        None => show_all(&images, cli.show_xmp, cli.json),
    }
}

/// Print the current description (or raw XMP) of every image.
fn show_all(images: &[PathBuf], show_xmp: bool, json: bool) -> Result<()> {
    let mut reports = Vec::new();
    for image_path in images {
        match pipeline::read_image(image_path) {
            Ok(report) => reports.push(report),
            Err(e) => log::error!("{e:#}"),
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
        return Ok(());
    }

    for report in &reports {
        println!();
        println!("{BOLD}File:{RESET} {} {DIM}({}){RESET}", report.path.display(), report.format);
        println!("{DIM}{}{RESET}", "─".repeat(72));
        if show_xmp {
            match report.xmp.as_deref() {
                Some(xmp) => println!("{}", xmp.trim_end()),
                None => println!("  {DIM}(no XMP packet){RESET}"),
            }
        } else if report.description.is_empty() {
            println!("  {DIM}(no description){RESET}");
        } else {
            print_row("dc:description", &report.description);
        }
    }
    println!();
    Ok(())
}

/// Write `text` into every image and report the outcome.
fn write_all(images: &[PathBuf], text: &str, config: &config::Config, json: bool) -> Result<()> {
    let total = images.len();
    log::info!("Found {total} image(s) to process");
    if config.output.dry_run {
        log::info!("DRY RUN: no files will be modified");
    }

    let mut results = Vec::new();
    for (i, image_path) in images.iter().enumerate() {
        log::info!("[{}/{}] Processing: {}", i + 1, total, image_path.display());

        let result = pipeline::write_image(image_path, text, config);
        if let Some(ref err) = result.error {
            log::error!("  Error: {err}");
        } else if config.output.dry_run {
            print_preview(&result, text);
        } else {
            if let Some(ref backup) = result.backup_path {
                log::info!("  Backup: {}", backup.display());
            }
            log::info!("  Wrote: description");
        }
        results.push(result);
    }

    // JSON output
    if json {
        let json_results: Vec<serde_json::Value> = results
            .iter()
            .map(|r| {
                serde_json::json!({
                    "path": r.path.display().to_string(),
                    "format": r.format,
                    "previous_description": r.previous_description,
                    "description_written": r.description_written,
                    "backup_path": r.backup_path.as_ref().map(|p| p.display().to_string()),
                    "error": r.error,
                })
            })
            .collect();

        println!("{}", serde_json::to_string_pretty(&json_results)?);
    }

    // Summary
    let success = results.iter().filter(|r| r.error.is_none()).count();
    let failed = results.len() - success;
    log::info!("Done: {success} succeeded, {failed} failed out of {total} images");

    Ok(())
}

// ANSI color codes
const GREEN: &str = "\x1b[32m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";

/// Width of the label column.
const TAG_WIDTH: usize = 22;
/// Max width for the value column before wrapping.
const VAL_WIDTH: usize = 46;

/// Dry-run table: the current description next to the one that would be written.
fn print_preview(result: &pipeline::ProcessResult, text: &str) {
    println!();
    println!("  {BOLD}XMP description:{RESET}");
    println!("  {DIM}{}{RESET}", "─".repeat(72));
    match result.previous_description.as_deref() {
        Some(previous) if !previous.is_empty() => print_row("Current", previous),
        _ => println!("  {DIM}{:<TAG_WIDTH$} : (none){RESET}", "Current"),
    }
    let lines = table_lines("New", text);
    let last = lines.len() - 1;
    for (i, line) in lines.iter().enumerate() {
        let mark = if i == last { " *" } else { "" };
        println!("  {GREEN}{line}{mark}{RESET}");
    }
    println!("  {DIM}{}{RESET}", "─".repeat(72));
    println!("  {GREEN}*{RESET} = new value to be written");
    println!();
}

/// Print a single row in the display table.
fn print_row(tag: &str, val: &str) {
    for line in table_lines(tag, val) {
        println!("  {line}");
    }
}

/// One table row: the label on the first line, wrapped value lines aligned under it.
fn table_lines(tag: &str, val: &str) -> Vec<String> {
    let indent = " ".repeat(TAG_WIDTH + 3);
    wrap_text(val, VAL_WIDTH)
        .into_iter()
        .enumerate()
        .map(|(i, line)| {
            if i == 0 {
                format!("{tag:<TAG_WIDTH$} : {line}")
            } else {
                format!("{indent}{line}")
            }
        })
        .collect()
}

/// Wrap text at word boundaries to fit within max_width.
fn wrap_text(s: &str, max_width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current_line = String::new();

    for word in s.split_whitespace() {
        if current_line.is_empty() {
            current_line = word.to_string();
        } else if current_line.len() + 1 + word.len() <= max_width {
            current_line.push(' ');
            current_line.push_str(word);
        } else {
            lines.push(current_line);
            current_line = word.to_string();
        }
    }

    if !current_line.is_empty() {
        lines.push(current_line);
    }

    if lines.is_empty() {
        lines.push(s.to_string());
    }

    lines
}
