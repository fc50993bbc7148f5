// ============================================================================
// tilecanvas CLI: headless document inspection and conversion
// ============================================================================
//
// Usage examples:
//   tilecanvas --new 16 --output level.tcv
//   tilecanvas --new --output level.json               (tile size from settings)
//   tilecanvas -i level.tcv --info
//   tilecanvas -i level.tcv -o level.json              (format inferred from output ext)
//   tilecanvas -i "levels/*.tcv" --output-dir sheets/ --format png
//   tilecanvas -i level.json -o level.tcv --compact

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;

use crate::io;
use crate::project::Project;
use crate::settings::EditorSettings;

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// tilecanvas headless document tool.
///
/// Create, inspect and convert tile canvas documents without an editor window.
#[derive(Parser, Debug)]
#[command(
    name = "tilecanvas",
    about = "tilecanvas headless document tool",
    long_about = "Create, inspect and convert tile canvas documents (.tcv binary,\n\
                  .json text) and export their tile sheets as PNG.\n\n\
                  Example:\n  \
                  tilecanvas --input level.tcv --output level.json\n  \
                  tilecanvas -i \"levels/*.tcv\" --output-dir sheets/ --format png"
)]
pub struct CliArgs {
    /// Input document(s). Glob patterns accepted (e.g. "*.tcv", "levels/*.json").
    #[arg(short, long, num_args = 1.., required_unless_present = "new")]
    pub input: Vec<String>,

    /// Create an empty document and write it to --output.
    /// TILE_SIZE defaults to the `default_tile_size` setting.
    #[arg(long, value_name = "TILE_SIZE", num_args = 0..=1, conflicts_with = "input")]
    pub new: Option<Option<u32>>,

    /// Output file path. Only valid for single-file input.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output directory for batch conversion.
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Output format: tcv, json, png (tile sheet only).
    /// When omitted, the format is inferred from --output's extension, defaulting to tcv.
    #[arg(short, long, value_name = "FORMAT")]
    pub format: Option<String>,

    /// Print a summary of each input document.
    #[arg(long)]
    pub info: bool,

    /// Drop empty chunks before writing.
    #[arg(long)]
    pub compact: bool,

    /// Print per-file timing information.
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum OutputFormat {
    Tcv,
    Json,
    SheetPng,
}

impl OutputFormat {
    fn extension(self) -> &'static str {
        match self {
            OutputFormat::Tcv => "tcv",
            OutputFormat::Json => "json",
            OutputFormat::SheetPng => "png",
        }
    }

    fn parse(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "tcv" => Some(OutputFormat::Tcv),
            "json" => Some(OutputFormat::Json),
            "png" => Some(OutputFormat::SheetPng),
            _ => None,
        }
    }
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run all CLI processing and return an OS exit code.
/// `0` = all files succeeded, `1` = one or more files failed.
pub fn run(args: CliArgs, settings: &EditorSettings) -> ExitCode {
    let format = match parse_format(args.format.as_deref(), args.output.as_deref()) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let compact = args.compact || settings.compact_on_save;

    if let Some(tile_size) = args.new {
        let tile_size = tile_size.unwrap_or(settings.default_tile_size);
        return match create_new(tile_size, args.output.as_deref(), format, settings) {
            Ok(path) => {
                println!("created {}", path.display());
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("error: {}", e);
                ExitCode::FAILURE
            }
        };
    }

    // Resolve glob patterns / literal paths → concrete PathBufs
    let inputs = resolve_inputs(&args.input);
    if inputs.is_empty() {
        eprintln!("error: no input files matched the given pattern(s).");
        return ExitCode::FAILURE;
    }

    if inputs.len() > 1 && args.output.is_some() && args.output_dir.is_none() {
        eprintln!(
            "error: {} input files given but --output only accepts a single file path.\n\
             Use --output-dir to specify a destination directory for batch processing.",
            inputs.len()
        );
        return ExitCode::FAILURE;
    }

    if let Some(dir) = &args.output_dir {
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!(
                "error: could not create output directory '{}': {}",
                dir.display(),
                e
            );
            return ExitCode::FAILURE;
        }
    }

    // Inspection alone writes nothing unless an output was asked for.
    let convert = !args.info
        || args.output.is_some()
        || args.output_dir.is_some()
        || args.format.is_some();

    let total = inputs.len();
    let multi = total > 1;
    let mut any_failure = false;

    for (idx, input_path) in inputs.iter().enumerate() {
        if multi || args.verbose {
            println!("[{}/{}] {}", idx + 1, total, input_path.display());
        }
        let file_start = Instant::now();

        let output_path = if convert {
            match build_output_path(input_path, args.output.as_deref(), args.output_dir.as_deref(), format) {
                Some(p) => Some(p),
                None => {
                    eprintln!("  error: cannot determine output path for '{}'.", input_path.display());
                    any_failure = true;
                    continue;
                }
            }
        } else {
            None
        };

        match run_one(input_path, output_path.as_deref(), format, compact, args.info, settings) {
            Ok(()) => {
                if let Some(out) = output_path.filter(|_| args.verbose || multi) {
                    println!(
                        "  → {} ({:.0}ms)",
                        out.display(),
                        file_start.elapsed().as_secs_f64() * 1000.0
                    );
                }
            }
            Err(e) => {
                eprintln!("  error: {}", e);
                any_failure = true;
            }
        }
    }

    if any_failure { ExitCode::FAILURE } else { ExitCode::SUCCESS }
}

// ============================================================================
// Per-file processing
// ============================================================================

fn run_one(
    input: &Path,
    output: Option<&Path>,
    format: OutputFormat,
    compact: bool,
    info: bool,
    settings: &EditorSettings,
) -> Result<(), String> {
    let mut project = Project::open(input, settings).map_err(|e| format!("load failed: {}", e))?;

    if info {
        print!("{}", describe(&project));
    }

    let Some(output) = output else { return Ok(()) };
    match format {
        OutputFormat::SheetPng => io::export_sheet_png(&project.level, output)
            .map_err(|e| format!("export failed: {}", e)),
        OutputFormat::Tcv | OutputFormat::Json => project
            .save_as(output, compact)
            .map_err(|e| format!("save failed: {}", e)),
    }
}

fn create_new(
    tile_size: u32,
    output: Option<&Path>,
    format: OutputFormat,
    settings: &EditorSettings,
) -> Result<PathBuf, String> {
    let output = output.ok_or("--new requires --output")?;
    if format == OutputFormat::SheetPng {
        return Err("--new writes a document (.tcv or .json), not a PNG".to_string());
    }
    let mut project = Project::new_untitled(1, tile_size, settings).map_err(|e| e.to_string())?;
    project.path = Some(output.to_path_buf());
    project.update_name_from_path();
    project.save(false).map_err(|e| e.to_string())?;
    Ok(output.to_path_buf())
}

/// Multi-line human-readable summary of a document.
fn describe(project: &Project) -> String {
    let level = &project.level;
    let sheet = level.sheet();
    let mut out = format!(
        "{} ({})\n  tile size: {}px, sheet: {}x{} ({} of {} frames used)\n",
        project.name,
        project.id,
        sheet.tile_size(),
        sheet.canvas().width(),
        sheet.canvas().height(),
        sheet.frame_count(),
        sheet.capacity()
    );
    let bounds = level.opaque_bounds();
    if bounds.is_empty() {
        out.push_str("  sheet is fully transparent\n");
    } else {
        out.push_str(&format!(
            "  opaque region: ({}, {})..=({}, {})\n",
            bounds.min_x, bounds.min_y, bounds.max_x, bounds.max_y
        ));
    }
    for (idx, layer) in level.layers().iter().enumerate() {
        out.push_str(&format!(
            "  layer {} '{}'{}: {} tiles in {} chunks\n",
            idx,
            layer.name,
            if layer.visible { "" } else { " (hidden)" },
            layer.tile_count(),
            layer.chunk_count()
        ));
    }
    out
}

// ============================================================================
// Helpers
// ============================================================================

/// Expand glob patterns and literal paths into a deduplicated, ordered list.
fn resolve_inputs(patterns: &[String]) -> Vec<PathBuf> {
    let mut result: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        let as_path = Path::new(pattern);

        if as_path.exists() {
            if !result.iter().any(|p| p.as_path() == as_path) {
                result.push(as_path.to_path_buf());
            }
            continue;
        }

        match glob::glob(pattern) {
            Ok(entries) => {
                let mut matched = false;
                for entry in entries.flatten() {
                    if !result.contains(&entry) {
                        result.push(entry);
                    }
                    matched = true;
                }
                if !matched {
                    eprintln!("warning: pattern '{}' matched no files.", pattern);
                }
            }
            Err(e) => {
                eprintln!("warning: invalid glob '{}': {}", pattern, e);
            }
        }
    }

    result
}

/// Pick the output format from `--format`, else from the output extension.
/// Defaults to tcv.
fn parse_format(format_arg: Option<&str>, output: Option<&Path>) -> Result<OutputFormat, String> {
    if let Some(f) = format_arg {
        return OutputFormat::parse(f).ok_or_else(|| format!("unknown format '{}'", f));
    }
    let ext = output
        .and_then(|out| out.extension())
        .and_then(|e| e.to_str())
        .unwrap_or("");
    Ok(OutputFormat::parse(ext).unwrap_or(OutputFormat::Tcv))
}

/// Compute the output path for a single input file.
///
/// Priority:
/// 1. `--output` (explicit path, used for single-file input)
/// 2. `--output-dir` (batch directory, derives filename from input stem)
/// 3. Fallback: same directory as input, same stem, new extension
///    (appends `_out` to stem if it would collide with the input path)
fn build_output_path(
    input: &Path,
    output: Option<&Path>,
    output_dir: Option<&Path>,
    format: OutputFormat,
) -> Option<PathBuf> {
    if let Some(out) = output {
        return Some(out.to_path_buf());
    }

    let ext = format.extension();
    let stem = input.file_stem()?.to_string_lossy().into_owned();

    if let Some(dir) = output_dir {
        return Some(dir.join(format!("{}.{}", stem, ext)));
    }

    let parent = input.parent().unwrap_or(Path::new("."));
    let candidate = parent.join(format!("{}.{}", stem, ext));

    // Avoid silent overwrite of the input
    if candidate == input {
        Some(parent.join(format!("{}_out.{}", stem, ext)))
    } else {
        Some(candidate)
    }
}
