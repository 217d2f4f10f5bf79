use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{ArgAction, Args, Parser, Subcommand};
use image::DynamicImage;
use serde_json::{json, Value};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use wait_timeout::ChildExt;

mod annotate;
mod glyphs;
mod serve;
mod table;
mod view;

use annotate::{alpha_composite, annotation_meta, builtin_labels, load_labels, render_overlay};
use glyphs::load_glyphs;
use serve::ServeConfig;
use view::TableView;

const DEFAULT_PORT: u16 = 8001;
const DEFAULT_GLYPHS: &str = "glyphnames.json";
const DEFAULT_TABLE: &str = "bravura_character_table.html";
const OPENER_WAIT: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(
    name = "glyphdesk",
    version,
    about = "Glyph name table server and score annotation overlay"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
#[allow(clippy::enum_variant_names)]
enum Commands {
    /// Print supported commands in JSON
    Commands,
    /// Overlay note-name labels on a score image
    Annotate(AnnotateArgs),
    /// Serve the glyph names as a searchable HTML table
    Serve(ServeArgs),
    /// Print glyph rows matching a search query
    List(ListArgs),
}

#[derive(Args, Debug)]
struct AnnotateArgs {
    /// Input score image
    #[arg(default_value = annotate::DEFAULT_SCORE_IMAGE)]
    input: PathBuf,
    /// Output PNG path (default: <input>-annotated.png)
    #[arg(long)]
    out: Option<PathBuf>,
    /// JSON label file replacing the built-in measure labels (or - for stdin)
    #[arg(long)]
    labels: Option<String>,
    /// Path to write label metadata sidecar (default: <output>.json)
    #[arg(long)]
    meta_out: Option<PathBuf>,
    /// Disable metadata sidecar output
    #[arg(long, action = ArgAction::SetTrue)]
    no_meta: bool,
    /// Open the annotated image in the system viewer
    #[arg(long, action = ArgAction::SetTrue)]
    show: bool,
}

#[derive(Args, Debug)]
struct ServeArgs {
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,
    /// Directory holding the glyph file, prebuilt table and static files
    #[arg(long, default_value = ".")]
    root: PathBuf,
    /// Glyph names JSON, relative to --root
    #[arg(long, default_value = DEFAULT_GLYPHS)]
    glyphs: PathBuf,
    /// Prebuilt HTML table served instead of the generated one when present
    #[arg(long, default_value = DEFAULT_TABLE)]
    table: PathBuf,
    /// Always generate the table from the glyph file
    #[arg(long, action = ArgAction::SetTrue)]
    no_prebuilt: bool,
    /// Do not open a browser window on start
    #[arg(long, action = ArgAction::SetTrue)]
    no_browser: bool,
}

#[derive(Args, Debug)]
struct ListArgs {
    /// Case-insensitive search over every column
    #[arg(default_value = "")]
    query: String,
    #[arg(long, default_value = ".")]
    root: PathBuf,
    #[arg(long, default_value = DEFAULT_GLYPHS)]
    glyphs: PathBuf,
    /// Select the first visible row with this glyph name and print its copy text
    #[arg(long)]
    select: Option<String>,
    /// Print visible rows as JSON
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Commands => print_commands(),
        Commands::Annotate(args) => command_annotate(args),
        Commands::Serve(args) => command_serve(args),
        Commands::List(args) => command_list(args),
    }
}

fn print_commands() -> Result<()> {
    let rows = vec![
        json!({
            "name": "annotate",
            "description": "Overlay note-name labels with background boxes on a score image.",
        }),
        json!({
            "name": "serve",
            "description": "Serve glyphnames.json as a searchable HTML table with static passthrough.",
        }),
        json!({
            "name": "list",
            "description": "Filter glyph rows in the terminal and print copy text for a selection.",
        }),
    ];

    println!(
        "{}",
        serde_json::to_string_pretty(&json!({ "commands": rows }))?
    );
    Ok(())
}

fn command_annotate(args: AnnotateArgs) -> Result<()> {
    if !args.input.exists() {
        bail!("input not found: {}", args.input.display());
    }

    let labels = match args.labels.as_deref() {
        Some(path) => load_labels(path)?,
        None => builtin_labels(),
    };

    let input_image = image::open(&args.input)
        .with_context(|| format!("failed to open input image: {}", args.input.display()))?;
    let mut rendered = input_image.to_rgba8();
    let (img_w, img_h) = rendered.dimensions();

    let (overlay, placed) = render_overlay(img_w, img_h, &labels);
    alpha_composite(&mut rendered, &overlay);

    let output = args
        .out
        .clone()
        .unwrap_or_else(|| default_output_for(&args.input));
    ensure_parent_dir(&output)?;
    DynamicImage::ImageRgba8(rendered)
        .save(&output)
        .with_context(|| format!("failed to save output image: {}", output.display()))?;

    if !args.no_meta {
        let meta_path = args
            .meta_out
            .clone()
            .unwrap_or_else(|| default_sidecar_for(&output));
        let mut payload = annotation_meta(&placed, img_w, img_h);
        if let Value::Object(obj) = &mut payload {
            obj.insert(
                "input_path".to_string(),
                json!(abs_path(&args.input).display().to_string()),
            );
            obj.insert(
                "output_path".to_string(),
                json!(abs_path(&output).display().to_string()),
            );
            obj.insert("generated_at".to_string(), json!(timestamp_iso()));
        }
        write_json_pretty(&meta_path, &payload)?;
    }

    let shown = abs_path(&output);
    println!("{}", shown.display());
    if args.show && !open_with_system(&shown.display().to_string()) {
        eprintln!("could not open an image viewer for {}", shown.display());
    }
    Ok(())
}

fn command_serve(args: ServeArgs) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServeConfig {
        port: args.port,
        glyphs: args.root.join(&args.glyphs),
        table: (!args.no_prebuilt).then(|| args.root.join(&args.table)),
        root: args.root,
        open_browser: !args.no_browser,
    };

    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    runtime.block_on(serve::serve(config))
}

fn command_list(args: ListArgs) -> Result<()> {
    let rows = load_glyphs(&args.root.join(&args.glyphs));
    let mut view = TableView::new(rows);
    view.filter(&args.query);

    if let Some(name) = args.select.as_deref() {
        if view.select_name(name).is_none() {
            bail!("no visible glyph named {name}");
        }
        println!("{}", view.copy_selected().unwrap_or_default());
        println!("{}", view.copy_row().unwrap_or_default());
        return Ok(());
    }

    if args.json {
        let visible: Vec<_> = view.visible_rows().map(|(_, row)| row).collect();
        println!("{}", serde_json::to_string_pretty(&visible)?);
        return Ok(());
    }

    for (_, row) in view.visible_rows() {
        println!(
            "{}\t{}\t{}",
            row.codepoint_display(),
            row.name,
            row.description
        );
    }
    println!("{}", view.counter());
    Ok(())
}

/// Hands a URL or file path to the platform opener. Best effort: returns
/// whether an opener could be started.
pub(crate) fn open_with_system(target: &str) -> bool {
    let mut cmd = opener_command(target);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(_) => return false,
    };
    match child.wait_timeout(OPENER_WAIT) {
        Ok(Some(status)) => status.success(),
        // Still running (some openers stay attached to the viewer).
        Ok(None) => true,
        Err(_) => false,
    }
}

#[cfg(target_os = "macos")]
fn opener_command(target: &str) -> Command {
    let mut cmd = Command::new("open");
    cmd.arg(target);
    cmd
}

#[cfg(target_os = "windows")]
fn opener_command(target: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.args(["/C", "start", ""]).arg(target);
    cmd
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn opener_command(target: &str) -> Command {
    let mut cmd = Command::new("xdg-open");
    cmd.arg(target);
    cmd
}

fn write_json_pretty(path: &Path, value: &Value) -> Result<()> {
    ensure_parent_dir(path)?;
    let raw = serde_json::to_string_pretty(value)?;
    fs::write(path, raw).with_context(|| format!("failed to write JSON: {}", path.display()))?;
    Ok(())
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create parent directory: {}", parent.display())
            })?;
        }
    }
    Ok(())
}

fn default_output_for(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("score")
        .to_string();
    let parent = input.parent().unwrap_or_else(|| Path::new(""));
    parent.join(format!("{stem}-annotated.png"))
}

fn default_sidecar_for(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output")
        .to_string();
    let parent = path.parent().unwrap_or_else(|| Path::new(""));
    parent.join(format!("{stem}.json"))
}

fn abs_path(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(path)
}

fn timestamp_iso() -> String {
    Utc::now().to_rfc3339()
}
