//! Match coverage through whole-program checking.

use koral_common::{CompilerConfig, ModuleGraph, Span};
use koral_typeck::ast::{
    CaseDecl, Declaration, Expr, FunctionDecl, GlobalNode, Param, Pattern, PatternKind, ComparisonOp,
    Program, SourceRecord, TypeNode, UnionDecl,
};
use koral_typeck::{check_program, SemanticError, SemanticErrorKind};

// ── Helpers ────────────────────────────────────────────────────────────

fn color() -> Declaration {
    decl(GlobalNode::Union(UnionDecl::new(
        "Color",
        vec![],
        vec![
            CaseDecl::new("Red", vec![]),
            CaseDecl::new("Green", vec![]),
            CaseDecl::new("Blue", vec![]),
        ],
    )))
}

fn decl(node: GlobalNode) -> Declaration {
    Declaration::new(SourceRecord::new("main.koral", &[]), node)
}

/// `fn classify(value <subject>) Int { match value { arms } }`
fn classify(subject: TypeNode, arms: Vec<Pattern>) -> Declaration {
    let arms = arms
        .into_iter()
        .enumerate()
        .map(|(i, p)| (p, Expr::int(i as i64)))
        .collect();
    decl(GlobalNode::Function(FunctionDecl::new(
        "classify",
        vec![Param::new("value", subject)],
        Some(TypeNode::named("Int")),
        Some(Expr::match_on(Expr::ident("value"), arms).at(Span::new(40, 60))),
    )))
}

fn check(declarations: Vec<Declaration>) -> Result<(), SemanticError> {
    check_program(&Program { declarations }, &ModuleGraph::new(), &CompilerConfig::default()).map(|_| ())
}

fn above(value: i64) -> Pattern {
    Pattern::new(
        PatternKind::Comparison {
            op: ComparisonOp::Gt,
            value,
        },
        Span::DUMMY,
    )
}

// ── Unions ─────────────────────────────────────────────────────────────

#[test]
fn all_cases_covered() {
    let arms = vec![
        Pattern::case("Red", vec![]),
        Pattern::case("Green", vec![]),
        Pattern::case("Blue", vec![]),
    ];
    check(vec![color(), classify(TypeNode::named("Color"), arms)]).unwrap();
}

#[test]
fn missing_case_is_named() {
    let arms = vec![Pattern::case("Red", vec![]), Pattern::case("Green", vec![])];
    let err = check(vec![color(), classify(TypeNode::named("Color"), arms)]).unwrap_err();
    assert_eq!(err.code(), "E0014");
    assert!(matches!(
        &err.kind,
        SemanticErrorKind::NonExhaustiveMatch { missing } if missing == &vec![".Blue".to_string()]
    ));
    assert_eq!(err.span, Span::new(40, 60));
}

#[test]
fn or_pattern_covers_both_cases() {
    let arms = vec![
        Pattern::or(Pattern::case("Red", vec![]), Pattern::case("Blue", vec![])),
        Pattern::case("Green", vec![]),
    ];
    check(vec![color(), classify(TypeNode::named("Color"), arms)]).unwrap();
}

#[test]
fn arm_after_wildcard_is_unreachable() {
    let arms = vec![Pattern::wildcard(), Pattern::case("Red", vec![])];
    let err = check(vec![color(), classify(TypeNode::named("Color"), arms)]).unwrap_err();
    assert!(matches!(err.kind, SemanticErrorKind::UnreachablePattern { index: 1 }));
}

#[test]
fn repeated_case_is_unreachable() {
    let arms = vec![
        Pattern::case("Red", vec![]),
        Pattern::case("Red", vec![]),
        Pattern::wildcard(),
    ];
    let err = check(vec![color(), classify(TypeNode::named("Color"), arms)]).unwrap_err();
    assert_eq!(err.code(), "E0015");
}

// ── Primitives ─────────────────────────────────────────────────────────

#[test]
fn both_booleans_are_exhaustive() {
    let arms = vec![Pattern::bool(true), Pattern::bool(false)];
    check(vec![classify(TypeNode::named("Bool"), arms)]).unwrap();
}

#[test]
fn one_boolean_is_not() {
    let err = check(vec![classify(TypeNode::named("Bool"), vec![Pattern::bool(true)])]).unwrap_err();
    assert!(matches!(
        &err.kind,
        SemanticErrorKind::NonExhaustiveMatch { missing } if missing == &vec!["false".to_string()]
    ));
}

#[test]
fn integers_need_a_catch_all() {
    let arms = vec![Pattern::int(0), above(0)];
    let err = check(vec![classify(TypeNode::named("Int"), arms)]).unwrap_err();
    assert_eq!(err.code(), "E0016");
    assert!(err.help().unwrap().contains('_'));
}

#[test]
fn binding_pattern_is_a_catch_all() {
    let arms = vec![Pattern::int(0), Pattern::var("other")];
    check(vec![classify(TypeNode::named("Int"), arms)]).unwrap();
}
