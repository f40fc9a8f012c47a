use crate::lex::{TokenKind, tokenize};
use crate::{Arity, ExprError, ExprKind, FuncSignature, FuncTable, Literal, ReturnRule, parse_expr};
use gotmpl_check_template::{PathRoot, Segment};
use similar_asserts::assert_eq as sim_assert_eq;

fn kinds(src: &str) -> Vec<TokenKind> {
    tokenize(src)
        .unwrap()
        .into_iter()
        .map(|token| token.kind)
        .collect()
}

#[test]
fn lexes_fields_variables_and_literals() {
    sim_assert_eq!(
        kinds(r#".A.B $x $ . "s\t" `r\n` 'c' nil true"#),
        vec![
            TokenKind::Field("A".to_string()),
            TokenKind::Field("B".to_string()),
            TokenKind::Variable("x".to_string()),
            TokenKind::Variable(String::new()),
            TokenKind::Dot,
            TokenKind::Str("s\t".to_string()),
            TokenKind::Str("r\\n".to_string()),
            TokenKind::Char('c'),
            TokenKind::Nil,
            TokenKind::Bool(true),
        ]
    );
}

#[test]
fn lexes_go_number_forms() {
    sim_assert_eq!(
        kinds("42 -7 0x1F 0o17 017 0b101 1_000 1.5 .5 1e3"),
        vec![
            TokenKind::Int(42),
            TokenKind::Int(-7),
            TokenKind::Int(31),
            TokenKind::Int(15),
            TokenKind::Int(15),
            TokenKind::Int(5),
            TokenKind::Int(1000),
            TokenKind::Float(1.5),
            TokenKind::Float(0.5),
            TokenKind::Float(1000.0),
        ]
    );
}

#[test]
fn lexes_hex_floats_and_imaginary_literals() {
    sim_assert_eq!(
        kinds("0x1p-2 0x1.8p1 0X.8P+1 1i 2.5i 0123i 0x10i 1e-2i 0x1e"),
        vec![
            TokenKind::Float(0.25),
            TokenKind::Float(3.0),
            TokenKind::Float(1.0),
            TokenKind::Imaginary(1.0),
            TokenKind::Imaginary(2.5),
            TokenKind::Imaginary(123.0),
            TokenKind::Imaginary(16.0),
            TokenKind::Imaginary(0.01),
            TokenKind::Int(30),
        ]
    );
    assert!(matches!(tokenize("0x1.8"), Err(ExprError::Malformed { .. })));
}

#[test]
fn lexer_rejects_bad_input() {
    for src in ["12abc", "\"open", "'ab'", "''", ".A := 1", "#", "[0", "\"\\q\""] {
        assert!(
            matches!(tokenize(src), Err(ExprError::Malformed { .. })),
            "{src:?}"
        );
    }
}

#[test]
fn parses_calls_with_nested_arguments() {
    let expr = parse_expr("and (gt .Count 0) (lt .Count 100)").unwrap();
    let ExprKind::Call { func, args } = &expr.kind else {
        panic!("expected call, got {expr:?}");
    };
    assert_eq!(func, "and");
    assert_eq!(args.len(), 2);
    assert!(matches!(&args[0].kind, ExprKind::Call { func, args } if func == "gt" && args.len() == 2));
    assert_eq!(expr.span.end, 33);
}

#[test]
fn parses_pipelines_into_stages() {
    let expr = parse_expr(r#".Items | len | printf "%d""#).unwrap();
    let ExprKind::Pipeline(stages) = &expr.kind else {
        panic!("expected pipeline");
    };
    assert_eq!(stages.len(), 3);
    assert!(matches!(&stages[0].kind, ExprKind::Path(_)));
    assert!(matches!(&stages[1].kind, ExprKind::Call { func, args } if func == "len" && args.is_empty()));
    assert!(matches!(&stages[2].kind, ExprKind::Call { args, .. } if args.len() == 1));
}

#[test]
fn parses_field_access_on_parenthesised_pipelines() {
    let expr = parse_expr("(index .Users 0).Roles[\"admin\"]").unwrap();
    let ExprKind::Chain { base, segments } = &expr.kind else {
        panic!("expected chain, got {expr:?}");
    };
    assert!(matches!(&base.kind, ExprKind::Call { func, .. } if func == "index"));
    sim_assert_eq!(
        segments,
        &vec![
            Segment::Field("Roles".to_string()),
            Segment::Index("\"admin\"".to_string())
        ]
    );
}

#[test]
fn separates_adjacent_and_spaced_fields() {
    let chained = parse_expr("$u.Name").unwrap();
    let path = chained.as_path().unwrap();
    assert_eq!(path.root, PathRoot::Var("u".to_string()));
    assert_eq!(path.segments.len(), 1);

    // `.Format .Name` is a method call on dot with an argument
    let spaced = parse_expr(".Format .Name").unwrap();
    let ExprKind::Method {
        receiver, method, ..
    } = &spaced.kind
    else {
        panic!("expected method call");
    };
    assert_eq!(method, "Format");
    assert!(receiver.segments.is_empty());
}

#[test]
fn collects_paths_and_calls() {
    let expr = parse_expr("printf \"%s %d\" .User.Name (len $.Items) | html").unwrap();
    let paths: Vec<String> = expr.paths().iter().map(|(p, _)| p.to_string()).collect();
    sim_assert_eq!(paths, vec![".User.Name", "$.Items"]);
    let calls: Vec<&str> = expr.calls().iter().map(|(name, _)| *name).collect();
    sim_assert_eq!(calls, vec!["printf", "len", "html"]);

    let (_, span) = expr.paths()[0];
    assert_eq!(span.start, 15);
    assert_eq!(span.end, 25);
    let inner = expr.at(17).unwrap();
    assert!(inner.as_path().is_some());
}

#[test]
fn rejects_malformed_expressions() {
    for src in ["", "(", "(.A", ".A)", "| len", ".A |", "\"s\" .A", ".A | 1", "len.X", "$x 1"] {
        assert!(
            matches!(parse_expr(src), Err(ExprError::Malformed { .. })),
            "{src:?} parsed as {:?}",
            parse_expr(src)
        );
    }
}

#[test]
fn literals_keep_their_values() {
    let expr = parse_expr("'\\n'").unwrap();
    assert_eq!(expr.kind, ExprKind::Literal(Literal::Char('\n')));
    let expr = parse_expr("\"\\x41\\u00e9\\101\"").unwrap();
    assert_eq!(expr.kind, ExprKind::Literal(Literal::Str("AéA".to_string())));
}

#[test]
fn default_table_holds_builtins() {
    let table = FuncTable::default();
    for name in [
        "len", "index", "printf", "html", "js", "urlquery", "eq", "ne", "lt", "le", "gt", "ge",
        "and", "or", "not",
    ] {
        assert!(table.contains(name), "{name}");
    }
    assert_eq!(table.len(), 15);
    assert!(!table.contains("upper"));
    assert_eq!(
        table.get("index").map(|s| s.returns.clone()),
        Some(ReturnRule::IndexElement)
    );
}

#[test]
fn arity_parses_and_checks() {
    assert_eq!("2".parse::<Arity>(), Ok(Arity::Exact(2)));
    assert_eq!("1+".parse::<Arity>(), Ok(Arity::AtLeast(1)));
    assert_eq!("ANY".parse::<Arity>(), Ok(Arity::Any));
    assert!("x".parse::<Arity>().is_err());
    assert!(Arity::AtLeast(2).accepts(3));
    assert!(!Arity::Exact(1).accepts(2));
    assert_eq!(Arity::AtLeast(2).to_string(), "2+");
}

#[test]
fn register_replaces_entries() {
    let mut table = FuncTable::empty();
    table
        .register("upper", FuncSignature::fixed(Arity::Exact(1), "string"))
        .register("upper", FuncSignature::new(Arity::Any, ReturnRule::FirstArg));
    assert_eq!(table.len(), 1);
    assert_eq!(
        table.get("upper").map(|s| s.arity),
        Some(Arity::Any)
    );
}
