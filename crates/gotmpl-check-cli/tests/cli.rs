use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::{self, WrapErr, eyre};
use gotmpl_check_analyzer::{DependencyEdge, DependencyKind, DiagnosticKind, Severity};
use gotmpl_check_cli::{
    CheckArgs, Cli, CliError, ColorArg, Command, Config, OutputFormat, TemplateGraph, check,
    check_paths, discover, render_json, render_text,
};
use gotmpl_check_types::TypeManifest;
use indoc::indoc;
use test_util::prelude::*;

fn site() -> PathBuf {
    test_util::workspace_testdata().join("site")
}

fn site_args() -> CheckArgs {
    CheckArgs {
        paths: vec![site()],
        types: site().join("types.yaml"),
        config: None,
        format: OutputFormat::Text,
    }
}

fn check_args(cli: Cli) -> CheckArgs {
    match cli.command {
        Command::Check(args) => args,
    }
}

#[test]
fn cli_parses_defaults() -> eyre::Result<()> {
    let cli = Cli::try_parse_from(["gotmpl-check", "check", "--types", "types.yaml"])
        .map_err(|e| eyre!(e.to_string()))?;

    assert_eq!(cli.log.color, ColorArg::Auto);
    assert!(cli.log.log_level.is_none());
    assert!(cli.log.log_format.is_none());
    let args = check_args(cli);
    assert_eq!(args.paths, vec![PathBuf::from(".")]);
    assert_eq!(args.types, PathBuf::from("types.yaml"));
    assert!(args.config.is_none());
    assert_eq!(args.format, OutputFormat::Text);
    Ok(())
}

#[test]
fn cli_parses_flags() -> eyre::Result<()> {
    let cli = Cli::try_parse_from([
        "gotmpl-check",
        "check",
        "-t",
        "types.json",
        "--format",
        "json",
        "--color",
        "never",
        "--log-level",
        "debug",
        "views",
        "partials/base.html",
    ])
    .map_err(|e| eyre!(e.to_string()))?;

    assert_eq!(cli.log.color, ColorArg::Never);
    assert_eq!(cli.log.log_level, Some(tracing::Level::DEBUG));
    let args = check_args(cli);
    assert_eq!(
        args.paths,
        vec![PathBuf::from("views"), PathBuf::from("partials/base.html")]
    );
    assert_eq!(args.format, OutputFormat::Json);
    Ok(())
}

#[test]
fn cli_requires_types() {
    assert!(Cli::try_parse_from(["gotmpl-check", "check", "views"]).is_err());
}

#[test]
fn checks_fixture_site() -> eyre::Result<()> {
    Builder::default().build();
    let report = check(&site_args()).wrap_err("check fixture site")?;

    let names: Vec<&str> = report
        .files
        .iter()
        .filter_map(|file| file.rsplit('/').next())
        .collect();
    assert_eq!(names, vec!["drugs.html", "user.html", "layout.html"]);

    let found: Vec<_> = report
        .diagnostics
        .iter()
        .map(|d| (d.kind, d.line, d.col, d.variable.as_str()))
        .collect();
    sim_assert_eq!(
        found,
        vec![
            (DiagnosticKind::UndefinedField, 2, 35, ".Price"),
            (DiagnosticKind::UnresolvedTemplateCall, 3, 1, "footer"),
            (DiagnosticKind::UndefinedVariable, 1, 20, ".Name"),
        ]
    );
    assert!(report.diagnostics[0].file.ends_with("pages/drugs.html"));
    assert!(report.diagnostics[2].file.ends_with("pages/user.html"));
    assert!(report.has_errors());
    assert_eq!(report.count(Severity::Warning), 0);

    let defines: Vec<_> = report
        .edges
        .iter()
        .filter(|edge| edge.kind == DependencyKind::Define)
        .map(|edge| edge.name.as_str())
        .collect();
    assert_eq!(defines, vec!["header"]);
    Ok(())
}

#[test]
fn renders_text_report() -> eyre::Result<()> {
    let report = check(&site_args())?;
    let text = render_text(&report, false);

    assert_that!(
        text.as_str(),
        contains_substring("error: no template named \"footer\" is defined")
    );
    assert_that!(text.as_str(), contains_substring("    {{.Price}}"));
    assert_that!(
        text.as_str(),
        ends_with("checked 3 file(s): 3 error(s), 0 warning(s)\n")
    );
    assert_that!(text.as_str(), not(contains_substring("\u{1b}[")));

    let colored = render_text(&report, true);
    assert_that!(colored.as_str(), contains_substring("\u{1b}["));
    assert_that!(
        colored.as_str(),
        contains_substring("no template named \"footer\" is defined")
    );
    Ok(())
}

#[test]
fn renders_json_report() -> eyre::Result<()> {
    let report = check(&site_args())?;
    let json: serde_json::Value = serde_json::from_str(&render_json(&report)?)?;

    assert_eq!(json["diagnostics"][1]["kind"], "unresolved_template_call");
    assert_eq!(json["diagnostics"][1]["severity"], "error");
    assert_eq!(json["diagnostics"][1]["raw"], "template \"footer\" .");
    assert_eq!(json["files"].as_array().map(Vec::len), Some(3));
    Ok(())
}

#[test]
fn missing_manifest_is_an_error() {
    let args = CheckArgs {
        types: site().join("missing.yaml"),
        ..site_args()
    };
    assert!(matches!(check(&args), Err(CliError::Read { .. })));
}

#[test]
fn invalid_manifest_is_an_error() -> eyre::Result<()> {
    let dir = tempfile::tempdir()?;
    let types = test_util::write(
        dir.path().join("types.yaml"),
        "globals:\n  - { name: Bad, type: X, is_slice: true, is_map: true }\n",
    )?;
    test_util::write(dir.path().join("a.tmpl"), "{{ .Bad }}")?;

    let args = CheckArgs {
        paths: vec![dir.path().to_path_buf()],
        types,
        config: None,
        format: OutputFormat::Text,
    };
    assert!(matches!(check(&args), Err(CliError::Manifest { .. })));
    Ok(())
}

#[test]
fn discovery_skips_hidden_and_foreign_files() -> eyre::Result<()> {
    let dir = tempfile::tempdir()?;
    let root = dir.path();
    test_util::write(root.join("a.tmpl"), "")?;
    test_util::write(root.join("nested/b.gohtml"), "")?;
    test_util::write(root.join("nested/notes.md"), "")?;
    test_util::write(root.join(".cache/c.tmpl"), "")?;
    let explicit = test_util::write(root.join("other/page.txt"), "")?;

    let files = discover(&[root.to_path_buf(), explicit.clone()], &Config::default())?;
    assert_eq!(
        files,
        vec![root.join("a.tmpl"), root.join("nested/b.gohtml"), explicit]
    );

    let empty = tempfile::tempdir()?;
    assert!(matches!(
        check_paths(
            &[empty.path().to_path_buf()],
            &TypeManifest::default(),
            &Config::default()
        ),
        Err(CliError::NoTemplates { .. })
    ));
    assert!(matches!(
        discover(&[root.join("nope")], &Config::default()),
        Err(CliError::MissingPath { .. })
    ));
    Ok(())
}

#[test]
fn config_controls_delimiters_and_functions() -> eyre::Result<()> {
    Builder::default().build();
    let dir = tempfile::tempdir()?;
    test_util::write(
        dir.path().join("page.tmpl"),
        "[[ .Title ]] {{ .Nope }} [[ .Missing ]]\n[[ shout .Title ]] [[ upper .Title ]]\n",
    )?;

    let config = Config::from_yaml_str(indoc! {r#"
        delimiters: { left: "[[", right: "]]" }
        report_unknown_functions: true
        funcs:
          upper: { arity: 1, returns: string }
    "#})?;
    let manifest = TypeManifest::from_yaml_str("globals: [{ name: Title, type: string }]")?;
    let report = check_paths(&[dir.path().to_path_buf()], &manifest, &config)?;

    let found: Vec<_> = report
        .diagnostics
        .iter()
        .map(|d| (d.kind, d.severity, d.line, d.col))
        .collect();
    sim_assert_eq!(
        found,
        vec![
            (DiagnosticKind::UndefinedVariable, Severity::Error, 1, 26),
            (DiagnosticKind::UnknownFunction, Severity::Warning, 2, 1),
        ]
    );
    Ok(())
}

#[test]
fn config_defaults() -> eyre::Result<()> {
    let config = Config::from_yaml_str("")?;
    assert_eq!(config, Config::default());
    assert!(config.is_template(std::path::Path::new("views/index.gohtml")));
    assert!(!config.is_template(std::path::Path::new("README.md")));

    let options = config.analyzer_options();
    assert!(options.funcs.contains("printf"));
    assert!(!options.report_unknown_functions);

    assert_eq!(
        Config::find(&site().join("pages")),
        Some(site().join(".gotmpl-check.yaml"))
    );
    Ok(())
}

#[test]
fn config_rejects_bad_arity() {
    let err = Config::from_yaml_str("funcs:\n  f: { arity: lots, returns: string }\n");
    assert!(err.is_err());
}

fn edge(kind: DependencyKind, file: &str, name: &str) -> DependencyEdge {
    DependencyEdge {
        file: file.to_string(),
        name: name.to_string(),
        kind,
        context: ".".to_string(),
        context_type: None,
        line: 1,
        col: 1,
    }
}

#[test]
fn graph_resolves_across_files() {
    let graph = TemplateGraph::new([
        edge(DependencyKind::Define, "layout.html", "header"),
        edge(DependencyKind::Block, "base.html", "footer"),
        edge(DependencyKind::Template, "a.html", "header"),
        edge(DependencyKind::Template, "b.html", "header"),
        edge(DependencyKind::Template, "b.html", "footer"),
        edge(DependencyKind::Template, "b.html", "sidebar"),
    ]);

    assert!(graph.is_defined("header"));
    assert!(!graph.is_defined("sidebar"));
    assert_eq!(graph.defined_in("footer").collect::<Vec<_>>(), vec!["base.html"]);
    assert_eq!(graph.callers("header").count(), 2);

    let unresolved = graph.unresolved();
    assert_eq!(unresolved.len(), 1);
    assert_eq!(unresolved[0].variable, "sidebar");
    assert_eq!(unresolved[0].file, "b.html");
    assert_eq!(unresolved[0].raw, "template \"sidebar\" .");
    assert!(unresolved[0].is_error());
}
