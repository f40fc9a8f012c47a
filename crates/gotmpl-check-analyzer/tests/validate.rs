use color_eyre::eyre;
use gotmpl_check_analyzer::{
    Analysis, Analyzer, AnalyzerOptions, BlockContext, Context, DependencyKind, Diagnostic,
    DiagnosticKind, Severity, validate,
};
use gotmpl_check_expr::{Arity, FuncSignature};
use gotmpl_check_template::parse;
use gotmpl_check_types::TypeNode;
use indoc::indoc;
use test_util::prelude::*;

fn check(source: &str, root: &TypeNode) -> Analysis {
    Analyzer::default().check(source, &Context::new("page.tmpl", root))
}

fn kinds(analysis: &Analysis) -> Vec<DiagnosticKind> {
    analysis.diagnostics.iter().map(|d| d.kind).collect()
}

fn variables(analysis: &Analysis) -> Vec<&str> {
    analysis
        .diagnostics
        .iter()
        .map(|d| d.variable.as_str())
        .collect()
}

#[test]
fn deeply_nested_valid_template_is_clean() {
    Builder::default().build();
    let root = fixtures::company();
    let analysis = check(
        indoc! {r#"
            <h1>{{ .Company.Name }}</h1>
            {{ range .Company.Departments }}
              <h2>{{ .Name }}</h2>
              {{ range $t := .Teams }}
                {{ with .Members }}
                  {{ range $i, $m := . }}
                    {{ if gt $i 0 }}, {{ else if eq $m.Name "" }}?{{ else }}{{ $m.Email }}{{ end }}
                    {{ $t.Name }} {{ $.Title }} {{ len $m.Tags }}
                    {{ range .Tags }}{{ . }}{{ end }}
                  {{ else }}
                    {{ $.Company.Name }}
                  {{ end }}
                {{ end }}
              {{ end }}
            {{ end }}
            {{ with $first := index .Users 0 }}{{ $first.Name }}{{ index .Roles "admin" }}{{ end }}
        "#},
        &root,
    );
    sim_assert_eq!(analysis.diagnostics, Vec::<Diagnostic>::new());
    assert_that!(analysis.actions_checked, gt(15));
}

#[test]
fn drugs_scenario() {
    Builder::default().build();
    let root = fixtures::drugs();
    let clean = check("{{range .Drugs}}{{.Name}}{{end}}", &root);
    assert_that!(clean.diagnostics.len(), eq(0));

    let broken = check("{{range .Drugs}}{{.Price}}{{end}}", &root);
    sim_assert_eq!(kinds(&broken), vec![DiagnosticKind::UndefinedField]);
    let diagnostic = &broken.diagnostics[0];
    assert_that!(diagnostic.message.as_str(), contains_substring("Price"));
    assert_that!(diagnostic.variable.as_str(), eq(".Price"));
    assert_that!(diagnostic.raw.as_str(), eq("{{.Price}}"));
    assert_eq!((diagnostic.line, diagnostic.col), (1, 17));
    assert_eq!(diagnostic.severity, Severity::Error);
}

#[test]
fn only_the_access_outside_with_is_flagged() {
    Builder::default().build();
    let root = fixtures::user();
    let analysis = check("{{with .User}}{{.Age}}{{end}}{{.Name}}", &root);
    sim_assert_eq!(variables(&analysis), vec![".Name"]);
    sim_assert_eq!(kinds(&analysis), vec![DiagnosticKind::UndefinedVariable]);
    let diagnostic = &analysis.diagnostics[0];
    assert_eq!((diagnostic.line, diagnostic.col), (1, 30));
    assert_that!(
        diagnostic.to_string().as_str(),
        eq("page.tmpl:1:30: error: undefined variable `Name`")
    );
}

#[test]
fn every_unknown_identifier_is_reported_once() {
    Builder::default().build();
    let root = fixtures::company();
    let analysis = check(
        indoc! {r#"
            {{ .Nope }}
            {{ range .Items }}{{ .Name }}{{ .Missing }}{{ end }}
            {{ $undefined }}
            {{ printf "%s" .Ghost }}
            {{ .Company.Nmae }}
        "#},
        &root,
    );
    sim_assert_eq!(
        variables(&analysis),
        vec![".Nope", ".Missing", "$undefined", ".Ghost", ".Company.Nmae"]
    );
    sim_assert_eq!(
        kinds(&analysis),
        vec![
            DiagnosticKind::UndefinedVariable,
            DiagnosticKind::UndefinedField,
            DiagnosticKind::UndefinedVariable,
            DiagnosticKind::UndefinedVariable,
            DiagnosticKind::UndefinedField,
        ]
    );
    let lines: Vec<usize> = analysis.diagnostics.iter().map(|d| d.line).collect();
    sim_assert_eq!(lines, vec![1, 2, 3, 4, 5]);
    assert!(analysis.has_errors());
}

#[test]
fn field_errors_inside_compound_expressions_are_reported() {
    Builder::default().build();
    let root = fixtures::company();
    let analysis = check(
        indoc! {r#"
            {{ (.Company).Nmae }}
            {{ (index .Users 0).Nmae }}
            {{ index .Count 0 }}
            {{ (index .Users 0).Name }} {{ index .Title 0 }} {{ (.Company).Name | len }}
            {{ len .Items 1 }}
        "#},
        &root,
    );
    sim_assert_eq!(
        variables(&analysis),
        vec![".Nmae", ".Nmae", "index .Count 0"]
    );
    sim_assert_eq!(
        kinds(&analysis),
        vec![DiagnosticKind::UndefinedField; 3]
    );
    let lines: Vec<usize> = analysis.diagnostics.iter().map(|d| d.line).collect();
    sim_assert_eq!(lines, vec![1, 2, 3]);
    assert_that!(
        analysis.diagnostics[0].message.as_str(),
        eq("`Nmae` is not a field of `Company`")
    );
}

#[test]
fn dollar_resolves_against_the_original_root_at_any_depth() {
    Builder::default().build();
    let root = fixtures::company();
    let analysis = check(
        indoc! {r#"
            {{ range .Company.Departments }}{{ range .Teams }}{{ range .Members }}
              {{ $.Company.Name }} {{ .Email }} {{ $.Nope }}
              {{ with .Tags }}{{ block "inner" . }}{{ $.Count }}{{ end }}{{ end }}
            {{ end }}{{ end }}{{ end }}
            {{ define "row" }}{{ $.Company.Name }}{{ .Title }}{{ end }}
        "#},
        &root,
    );
    sim_assert_eq!(variables(&analysis), vec!["$.Nope"]);
    sim_assert_eq!(kinds(&analysis), vec![DiagnosticKind::UndefinedVariable]);
}

#[test]
fn conditional_group_closes_with_a_single_end() {
    Builder::default().build();
    let root = fixtures::company();
    let analysis = check(
        indoc! {r#"
            {{ range .Items }}
              {{ if .Qty }}a{{ else if gt .Price 1.5 }}b{{ else if .Name }}c{{ else }}d{{ end }}
              {{ .Name }}
            {{ end }}
            {{ .Title }}
        "#},
        &root,
    );
    sim_assert_eq!(analysis.diagnostics, Vec::<Diagnostic>::new());
}

#[test]
fn else_of_with_sees_the_enclosing_dot() {
    Builder::default().build();
    let root = fixtures::user();
    let clean = check(
        "{{ with .User }}{{ .Age }}{{ else }}{{ .User.Age }}{{ end }}",
        &root,
    );
    assert_that!(clean.diagnostics.len(), eq(0));

    let broken = check("{{ with .User }}{{ else }}{{ .Age }}{{ end }}", &root);
    sim_assert_eq!(variables(&broken), vec![".Age"]);
}

#[test]
fn ranging_over_a_scalar_is_not_iterable() {
    Builder::default().build();
    let root = fixtures::company();
    let analysis = check("{{ range .Count }}{{ .Anything.Goes }}{{ end }}", &root);
    sim_assert_eq!(kinds(&analysis), vec![DiagnosticKind::NotIterable]);
    assert_that!(analysis.diagnostics[0].message.as_str(), contains_substring("int"));

    // an unresolvable range target is reported once, its body is not checked
    let analysis = check("{{ range .Nope }}{{ .X }}{{ .Y.Z }}{{ end }}{{ .Title }}", &root);
    sim_assert_eq!(variables(&analysis), vec![".Nope"]);

    // anything typed interface{} is permissive
    let analysis = check("{{ range .Extra }}{{ .X }}{{ end }}", &root);
    assert_that!(analysis.diagnostics.len(), eq(0));
}

#[test]
fn ranging_over_a_map_yields_its_values() {
    Builder::default().build();
    let root = fixtures::company();
    let analysis = check(
        indoc! {r#"
            {{ range $k, $u := .Users }}{{ $u.Name }}{{ range .Roles }}{{ .Title }}{{ end }}{{ end }}
            {{ range $key, $value := .Meta }}{{ $key }}={{ $value }}{{ end }}
        "#},
        &root,
    );
    assert_that!(analysis.diagnostics.len(), eq(0));
}

#[test]
fn declarations_follow_block_scoping() {
    Builder::default().build();
    let root = fixtures::company();
    let analysis = check(
        indoc! {r#"
            {{ $n := len .Items }}{{ $n }}{{ $n = 3 }}
            {{ $m = 1 }}
            {{ with $c := .Company }}{{ $c.Name }}{{ end }}{{ $c }}
            {{ if $u := index .Users 0 }}{{ $u.Name }}{{ else }}{{ $u.Age }}{{ end }}{{ $u }}
            {{ range $i, $item := .Items }}{{ $item.Qty }}{{ end }}{{ $item }}
        "#},
        &root,
    );
    sim_assert_eq!(variables(&analysis), vec!["$m", "$c", "$u", "$item"]);
    assert!(
        analysis
            .diagnostics
            .iter()
            .all(|d| d.kind == DiagnosticKind::UndefinedVariable)
    );
}

#[test]
fn define_bodies_do_not_see_outer_locals() {
    Builder::default().build();
    let root = fixtures::company();
    let analysis = check(
        r#"{{ $x := .Title }}{{ define "row" }}{{ $x }}{{ .Count }}{{ end }}{{ $x }}"#,
        &root,
    );
    sim_assert_eq!(variables(&analysis), vec!["$x"]);
    assert_eq!(analysis.diagnostics[0].col, 37);
}

#[test]
fn block_without_context_defaults_to_the_root() {
    Builder::default().build();
    let root = fixtures::company();
    let source = r#"{{ range .Users }}{{ block "card" }}{{ .Name }}{{ end }}{{ end }}"#;

    let analysis = check(source, &root);
    sim_assert_eq!(variables(&analysis), vec![".Name"]);

    let inherit = Analyzer::new(AnalyzerOptions {
        block_context: BlockContext::Inherit,
        ..AnalyzerOptions::default()
    });
    let analysis = inherit.check(source, &Context::new("page.tmpl", &root));
    assert_that!(analysis.diagnostics.len(), eq(0));

    let explicit = check(
        r#"{{ block "card" .Company }}{{ .Name }}{{ range .Departments }}{{ .Name }}{{ end }}{{ end }}"#,
        &root,
    );
    assert_that!(explicit.diagnostics.len(), eq(0));
}

#[test]
fn dependency_edges_are_recorded() {
    Builder::default().build();
    let root = fixtures::company();
    let analysis = check(
        indoc! {r#"
            {{ define "item" }}{{ .Name }}{{ end }}
            {{ range .Items }}{{ template "item" . }}{{ end }}
            {{ template "list" .Items }}
            {{ block "footer" }}{{ .Title }}{{ end }}
        "#},
        &root,
    );
    let edges: Vec<(DependencyKind, &str, &str, Option<&str>)> = analysis
        .edges
        .iter()
        .map(|e| {
            (
                e.kind,
                e.name.as_str(),
                e.context.as_str(),
                e.context_type.as_deref(),
            )
        })
        .collect();
    sim_assert_eq!(
        edges,
        vec![
            (DependencyKind::Define, "item", "", None),
            (DependencyKind::Template, "item", ".", Some("Item")),
            (DependencyKind::Template, "list", ".Items", Some("[]Item")),
            (DependencyKind::Block, "footer", "", Some("root")),
        ]
    );
    assert!(analysis.edges.iter().all(|e| e.file == "page.tmpl"));
    assert_eq!((analysis.edges[2].line, analysis.edges[2].col), (3, 1));

    // the define body is checked against the root, where `.Name` does not exist
    sim_assert_eq!(variables(&analysis), vec![".Name"]);
}

#[test]
fn template_arguments_are_checked() {
    Builder::default().build();
    let root = fixtures::company();
    let analysis = check(r#"{{ template "x" .Itemz }}{{ template "y" }}"#, &root);
    sim_assert_eq!(variables(&analysis), vec![".Itemz"]);
}

#[test]
fn malformed_actions_do_not_hide_later_problems() {
    Builder::default().build();
    let root = fixtures::company();
    let analysis = check(
        indoc! {r#"
            {{ len ( }}
            {{ end }}
            {{ .Title | }}
            {{ .Nope }}
        "#},
        &root,
    );
    sim_assert_eq!(
        kinds(&analysis),
        vec![
            DiagnosticKind::MalformedExpression,
            DiagnosticKind::MalformedExpression,
            DiagnosticKind::MalformedExpression,
            DiagnosticKind::UndefinedVariable,
        ]
    );
    let lines: Vec<usize> = analysis.diagnostics.iter().map(|d| d.line).collect();
    sim_assert_eq!(lines, vec![1, 2, 3, 4]);
}

#[test]
fn unsupported_else_forms_are_warnings() {
    Builder::default().build();
    let root = fixtures::company();
    let analysis = check(
        "{{ with .Company }}{{ .Name }}{{ else with .Items }}x{{ end }}",
        &root,
    );
    sim_assert_eq!(kinds(&analysis), vec![DiagnosticKind::MalformedExpression]);
    assert_eq!(analysis.diagnostics[0].severity, Severity::Warning);
    assert!(!analysis.has_errors());
}

#[test]
fn unknown_functions_warn_only_when_asked() -> eyre::Result<()> {
    Builder::default().build();
    let root = fixtures::company();
    let source = "{{ .Title | upper }}{{ lower .Title | printf \"%s\" }}";

    assert_that!(check(source, &root).diagnostics.len(), eq(0));

    let mut options = AnalyzerOptions {
        report_unknown_functions: true,
        ..AnalyzerOptions::default()
    };
    let analysis = Analyzer::new(options.clone()).check(source, &Context::new("page.tmpl", &root));
    sim_assert_eq!(variables(&analysis), vec!["upper", "lower"]);
    assert!(analysis.diagnostics.iter().all(|d| d.severity == Severity::Warning));
    assert!(!analysis.has_errors());

    options
        .funcs
        .register("upper", FuncSignature::fixed(Arity::Exact(1), "string"))
        .register("lower", FuncSignature::fixed(Arity::Exact(1), "string"));
    let analysis = Analyzer::new(options).check(source, &Context::new("page.tmpl", &root));
    assert_that!(analysis.diagnostics.len(), eq(0));

    let json = serde_json::to_value(&check("{{ .Nope }}", &root).diagnostics)?;
    assert_eq!(json[0]["kind"], "undefined_variable");
    assert_eq!(json[0]["severity"], "error");
    Ok(())
}

#[test]
fn partial_reentry_uses_the_supplied_dot_and_locals() {
    Builder::default().build();
    let root = fixtures::company();
    let user = root
        .field("Users")
        .and_then(TypeNode::element)
        .cloned()
        .unwrap();
    let ctx = Context::new("card.tmpl", &root)
        .with_dot(&user)
        .with_local("limit", TypeNode::scalar("", "int"));
    let analysis = Analyzer::default().check(
        "{{ .Name }}{{ .Age }}{{ $limit }}{{ $.Title }}{{ .Title }}",
        &ctx,
    );
    sim_assert_eq!(variables(&analysis), vec![".Title"]);
    sim_assert_eq!(kinds(&analysis), vec![DiagnosticKind::UndefinedField]);
}

#[test]
fn free_validate_uses_default_options() {
    Builder::default().build();
    let root = fixtures::drugs();
    let parsed = parse("{{ range .Drugs }}{{ .Name }}{{ .Dose }}{{ end }}");
    let diagnostics = validate(&parsed, &root, "drugs.tmpl");
    assert_that!(diagnostics.len(), eq(1));
    assert_that!(diagnostics[0].file.as_str(), eq("drugs.tmpl"));
}
