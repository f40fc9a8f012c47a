use std::borrow::Cow;

use gotmpl_check_expr::Scope;
use gotmpl_check_template::{Path, PathRoot, Segment, parse, parse_path};
use gotmpl_check_types::TypeNode;
use similar_asserts::assert_eq as sim_assert_eq;

use crate::scope::{FrameKind, ScopeStack};
use crate::validator::Walker;
use crate::{AnalyzerOptions, Context, DependencyEdge};

fn root() -> TypeNode {
    TypeNode::root([
        TypeNode::scalar("Title", "string"),
        TypeNode::slice(
            "Items",
            TypeNode::structure("", "Item", [TypeNode::scalar("Qty", "int")]),
        ),
    ])
}

fn path(text: &str) -> Path {
    parse_path(text).unwrap()
}

#[test]
fn root_frame_is_never_popped() {
    let root = root();
    let mut stack = ScopeStack::new(&root);
    assert!(stack.pop().is_none());
    stack.push(FrameKind::With, Cow::Owned(TypeNode::unknown()));
    assert_eq!(stack.depth(), 2);
    assert_eq!(stack.pop().map(|frame| frame.kind), Some(FrameKind::With));
    assert!(stack.pop().is_none());
    assert_eq!(stack.depth(), 1);
    assert!(stack.dot_is_root());
}

#[test]
fn dollar_ignores_the_current_dot() {
    let root = root();
    let item = root.field("Items").and_then(TypeNode::element).unwrap();
    let mut stack = ScopeStack::new(&root);
    stack.push(FrameKind::Range, Cow::Borrowed(item));
    stack.push_detached(FrameKind::Define, Cow::Borrowed(item));

    assert_eq!(stack.resolve(&path(".Qty")).unwrap().type_label, "int");
    assert_eq!(stack.resolve(&path("$.Title")).unwrap().type_label, "string");
    assert!(stack.resolve(&path(".Title")).is_err());
    assert_eq!(stack.root().type_label, "root");
    assert!(!stack.dot_is_root());
}

#[test]
fn detached_frames_hide_outer_locals() {
    let root = root();
    let mut stack = ScopeStack::new(&root);
    stack.bind("outer", Cow::Owned(TypeNode::scalar("", "string")));
    stack.push(FrameKind::With, Cow::Borrowed(&root));
    stack.bind("inner", Cow::Owned(TypeNode::scalar("", "int")));
    assert!(stack.is_visible("outer"));

    stack.push_detached(FrameKind::Block, Cow::Borrowed(&root));
    assert!(!stack.is_visible("outer"));
    assert!(!stack.is_visible("inner"));
    assert!(stack.lookup_var("outer").is_none());

    stack.pop();
    let names: Vec<&str> = stack
        .visible_locals()
        .into_iter()
        .map(|(name, _)| name)
        .collect();
    sim_assert_eq!(names, vec!["inner", "outer"]);
}

#[test]
fn inner_bindings_shadow_outer_ones() {
    let root = root();
    let mut stack = ScopeStack::new(&root);
    stack.bind("x", Cow::Owned(TypeNode::scalar("", "string")));
    stack.push(FrameKind::Range, Cow::Borrowed(&root));
    stack.bind("x", Cow::Owned(TypeNode::scalar("", "int")));

    let x = Path::new(PathRoot::Var("x".to_string()), Vec::new());
    assert_eq!(stack.resolve(&x).unwrap().type_label, "int");
    stack.pop();
    assert_eq!(stack.resolve(&x).unwrap().type_label, "string");
}

#[test]
fn else_restores_the_enclosing_dot() {
    let root = root();
    let items = root.field("Items").unwrap();
    let mut stack = ScopeStack::new(&root);
    stack.push(FrameKind::Range, Cow::Borrowed(items.element().unwrap()));
    assert_eq!(stack.top().dot.type_label, "Item");
    stack.enter_else();
    assert!(stack.dot_is_root());
    assert_eq!(stack.depth(), 2);
}

#[test]
fn resolving_keeps_borrows_into_the_tree() {
    let root = root();
    let stack = ScopeStack::new(&root);
    let items = stack
        .resolve(&Path::new(
            PathRoot::Dot,
            vec![Segment::Field("Items".to_string()), Segment::Index("0".to_string())],
        ))
        .unwrap();
    assert!(matches!(items, Cow::Borrowed(_)));
    assert_eq!(items.type_label, "Item");
}

fn depth_before(source: &str, stop: usize) -> usize {
    let root = root();
    let options = AnalyzerOptions::default();
    let ctx = Context::new("t", &root);
    let parsed = parse(source);
    let mut edges: Vec<DependencyEdge> = Vec::new();
    let mut walker = Walker::new(&options, &ctx, &mut edges);
    walker.walk(&parsed.nodes, Some(stop));
    walker.stack().depth()
}

#[test]
fn conditional_groups_push_nothing_per_branch() {
    // 0:if 1:text 2:else if 3:text 4:else 5:text 6:end 7:text
    let src = "{{ if .Title }}a{{ else if .Items }}b{{ else }}c{{ end }}d";
    for stop in 0..8 {
        assert_eq!(depth_before(src, stop), 1, "before node {stop}");
    }
}

#[test]
fn declaring_if_pushes_one_frame_for_the_whole_group() {
    // 0:if 1:text 2:else 3:text 4:end 5:text
    let src = "{{ if $t := .Title }}a{{ else }}b{{ end }}c";
    let depths: Vec<usize> = (0..6).map(|stop| depth_before(src, stop)).collect();
    sim_assert_eq!(depths, vec![1, 2, 2, 2, 2, 1]);
}

#[test]
fn range_frame_spans_its_else_branch() {
    // 0:range 1:action 2:else 3:action 4:end 5:text
    let src = "{{ range .Items }}{{ .Qty }}{{ else }}{{ .Title }}{{ end }}x";
    let depths: Vec<usize> = (0..6).map(|stop| depth_before(src, stop)).collect();
    sim_assert_eq!(depths, vec![1, 2, 2, 2, 2, 1]);
}
