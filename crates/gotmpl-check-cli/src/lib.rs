mod config;
mod error;
mod graph;
pub mod logging;

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};
use gotmpl_check_analyzer::{Analysis, Analyzer, Context, DependencyEdge, Diagnostic, Severity};
use gotmpl_check_types::TypeManifest;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info};
use walkdir::{DirEntry, WalkDir};

pub use config::{CONFIG_FILE_NAME, Config};
pub use error::{CliError, CliResult};
pub use graph::TemplateGraph;
pub use logging::LogFormat;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "gotmpl-check",
    version,
    about = "Statically check variable references in Go templates"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[command(flatten)]
    pub log: LogArgs,
}

#[derive(Args, Debug, Clone)]
pub struct LogArgs {
    #[arg(long, global = true)]
    pub log_level: Option<tracing::metadata::Level>,

    #[arg(long, value_enum, global = true)]
    pub log_format: Option<LogFormat>,

    #[arg(long, value_enum, default_value_t = ColorArg::Auto, global = true)]
    pub color: ColorArg,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Check templates against a type manifest
    Check(CheckArgs),
}

#[derive(Args, Debug, Clone)]
pub struct CheckArgs {
    /// Template files or directories to search for templates
    #[arg(value_name = "PATH", default_value = ".")]
    pub paths: Vec<PathBuf>,

    /// Type manifest (JSON or YAML) describing the template data
    #[arg(short, long)]
    pub types: PathBuf,

    /// Config file, defaults to the nearest `.gotmpl-check.yaml`
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorArg {
    Auto,
    Always,
    Never,
}

impl From<ColorArg> for termcolor::ColorChoice {
    fn from(color: ColorArg) -> Self {
        match color {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}

/// Outcome of checking a batch of templates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Report {
    pub files: Vec<String>,
    /// Ordered by file, then position.
    pub diagnostics: Vec<Diagnostic>,
    pub edges: Vec<DependencyEdge>,
}

impl Report {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }
}

/// Runs `check` with the files and settings named by `args`.
///
/// # Errors
///
/// Returns an error if the manifest or config cannot be loaded or a template
/// file cannot be read. Template problems are diagnostics, not errors.
pub fn check(args: &CheckArgs) -> CliResult<Report> {
    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => match args.paths.first().and_then(|path| Config::find(search_dir(path))) {
            Some(path) => {
                debug!(path = %path.display(), "using config");
                Config::load(&path)?
            }
            None => Config::default(),
        },
    };
    let manifest = load_manifest(&args.types)?;
    check_paths(&args.paths, &manifest, &config)
}

fn search_dir(path: &Path) -> &Path {
    if path.is_file() {
        path.parent().unwrap_or(path)
    } else {
        path
    }
}

/// # Errors
///
/// Fails if the file cannot be read or describes an invalid type tree.
pub fn load_manifest(path: &Path) -> CliResult<TypeManifest> {
    let raw = std::fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let manifest = if path.extension().is_some_and(|ext| ext == "json") {
        TypeManifest::from_json_str(&raw)
    } else {
        TypeManifest::from_yaml_str(&raw)
    };
    manifest.map_err(|source| CliError::Manifest {
        path: path.to_path_buf(),
        source,
    })
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .is_some_and(|name| name.starts_with('.') && name != "." && name != "..")
}

/// Template files under `paths`. Explicit files are kept whatever their
/// extension; directories are searched for configured extensions, skipping
/// hidden entries.
///
/// # Errors
///
/// Fails for paths that do not exist or cannot be traversed.
pub fn discover(paths: &[PathBuf], config: &Config) -> CliResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_file() {
            files.push(path.clone());
            continue;
        }
        if !path.exists() {
            return Err(CliError::MissingPath { path: path.clone() });
        }
        let walker = WalkDir::new(path)
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry));
        for entry in walker {
            let entry = entry.map_err(|source| CliError::Walk {
                path: path.clone(),
                source,
            })?;
            if entry.file_type().is_file() && config.is_template(entry.path()) {
                files.push(entry.into_path());
            }
        }
    }
    files.sort();
    files.dedup();
    Ok(files)
}

fn display_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn check_file(
    analyzer: &Analyzer,
    manifest: &TypeManifest,
    path: &Path,
) -> CliResult<(String, Analysis)> {
    let source = std::fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let file = display_path(path);
    let root = manifest.root_for(&file);
    let analysis = analyzer.check(&source, &Context::new(file.clone(), &root));
    debug!(
        file,
        diagnostics = analysis.diagnostics.len(),
        actions = analysis.actions_checked,
        "checked"
    );
    Ok((file, analysis))
}

/// Checks every template under `paths` in parallel, then reports `template`
/// calls that no file in the batch defines.
///
/// # Errors
///
/// See [`check`].
pub fn check_paths(paths: &[PathBuf], manifest: &TypeManifest, config: &Config) -> CliResult<Report> {
    let files = discover(paths, config)?;
    if files.is_empty() {
        return Err(CliError::NoTemplates {
            paths: paths.to_vec(),
        });
    }
    let analyzer = Analyzer::new(config.analyzer_options());
    let analyses = files
        .par_iter()
        .map(|path| check_file(&analyzer, manifest, path))
        .collect::<CliResult<Vec<_>>>()?;

    let mut report = Report::default();
    for (file, analysis) in analyses {
        report.files.push(file);
        report.diagnostics.extend(analysis.diagnostics);
        report.edges.extend(analysis.edges);
    }
    let graph = TemplateGraph::new(report.edges.iter().cloned());
    report.diagnostics.extend(graph.unresolved());
    report
        .diagnostics
        .sort_by(|a, b| (&a.file, a.line, a.col).cmp(&(&b.file, b.line, b.col)));

    info!(
        files = report.files.len(),
        errors = report.count(Severity::Error),
        warnings = report.count(Severity::Warning),
        "check finished"
    );
    Ok(report)
}

/// Human readable report, one diagnostic per entry followed by its action.
pub fn render_text(report: &Report, color: bool) -> String {
    use owo_colors::{AnsiColors, OwoColorize};
    use std::fmt::{Display, Write};

    let mut out = String::new();
    for diagnostic in &report.diagnostics {
        let location = format!("{}:{}:{}", diagnostic.file, diagnostic.line, diagnostic.col);
        let severity = diagnostic.severity.to_string();
        let tint = match diagnostic.severity {
            Severity::Error => AnsiColors::Red,
            Severity::Warning => AnsiColors::Yellow,
        };
        let bold_location = location.bold();
        let tinted_severity = severity.color(tint);
        let bold_severity = tinted_severity.bold();
        let (location, severity): (&dyn Display, &dyn Display) = if color {
            (&bold_location, &bold_severity)
        } else {
            (&location, &severity)
        };
        let _ = writeln!(out, "{location}: {severity}: {}", diagnostic.message);

        let raw = diagnostic.raw.trim();
        if !raw.is_empty() {
            let dimmed_raw = raw.dimmed();
            let raw: &dyn Display = if color { &dimmed_raw } else { &raw };
            let _ = writeln!(out, "    {raw}");
        }
    }
    let _ = writeln!(
        out,
        "checked {} file(s): {} error(s), {} warning(s)",
        report.files.len(),
        report.count(Severity::Error),
        report.count(Severity::Warning),
    );
    out
}

/// # Errors
///
/// Fails only if serialization fails.
pub fn render_json(report: &Report) -> CliResult<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

/// Writes the report to `out`. A closed pipe is not an error.
///
/// # Errors
///
/// Fails if rendering or writing fails.
pub fn write_report(
    report: &Report,
    format: OutputFormat,
    color: bool,
    out: &mut impl std::io::Write,
) -> CliResult<()> {
    let rendered = match format {
        OutputFormat::Text => render_text(report, color),
        OutputFormat::Json => render_json(report)? + "\n",
    };
    if let Err(err) = out.write_all(rendered.as_bytes()) {
        if err.kind() != std::io::ErrorKind::BrokenPipe {
            return Err(err.into());
        }
    }
    Ok(())
}
