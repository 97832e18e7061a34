//! Rendering of errors produced by real checking runs.
//!
//! Spans are attached by hand since there is no parser in this crate; the
//! offsets below point into the accompanying source strings.

use koral_common::{CompilerConfig, ModuleGraph, Span};
use koral_typeck::ast::{BinaryOp, Declaration, Expr, GlobalLet, GlobalNode, Program, SourceRecord};
use koral_typeck::diagnostics::{render_diagnostic, render_json, DiagnosticOptions};
use koral_typeck::{check_program, SemanticError};

// ── Helpers ────────────────────────────────────────────────────────────

fn first_error(name: &str, value: Expr) -> SemanticError {
    let program = Program {
        declarations: vec![Declaration::new(
            SourceRecord::new("main.koral", &[]),
            GlobalNode::Let(GlobalLet::new(name, None, value)),
        )],
    };
    check_program(&program, &ModuleGraph::new(), &CompilerConfig::default())
        .expect_err("program should not check")
}

fn render(err: &SemanticError, src: &str) -> String {
    render_diagnostic(err, src, "main.koral", &DiagnosticOptions::colorless())
}

// ── Reports ────────────────────────────────────────────────────────────

#[test]
fn undefined_variable_points_at_the_name() {
    let src = "let total = count + 1\n";
    let value = Expr::binary(BinaryOp::Add, Expr::ident("count").at(Span::new(12, 17)), Expr::int(1))
        .at(Span::new(12, 21));
    let err = first_error("total", value);
    let out = render(&err, src);
    assert!(out.contains("[E0003]"), "{}", out);
    assert!(out.contains("undefined variable `count`"), "{}", out);
    assert!(out.contains("not found in scope"), "{}", out);
}

#[test]
fn remainder_on_floats_names_the_trait() {
    let src = "let r = 1.5 % 2.0\n";
    let value = Expr::binary(BinaryOp::Rem, Expr::float(1.5), Expr::float(2.0)).at(Span::new(8, 17));
    let err = first_error("r", value);
    assert_eq!(err.code(), "E0023");
    let out = render(&err, src);
    assert!(out.contains("Rem"), "{}", out);
}

#[test]
fn color_follows_options() {
    let src = "let total = count\n";
    let err = first_error("total", Expr::ident("count").at(Span::new(12, 17)));
    let plain = render(&err, src);
    assert!(!plain.contains('\u{1b}'), "{}", plain);
    let colored = render_diagnostic(&err, src, "main.koral", &DiagnosticOptions { color: true });
    assert!(colored.contains('\u{1b}'));
}

// ── JSON ───────────────────────────────────────────────────────────────

#[test]
fn json_form_is_stable() {
    let src = "let total = count\n";
    let err = first_error("total", Expr::ident("count").at(Span::new(12, 17)));
    let json = render_json(&err, src, "main.koral");
    insta::assert_snapshot!(json, @r#"{"code":"E0003","message":"undefined variable `count`","file":"main.koral","start":{"line":1,"column":13},"end":{"line":1,"column":18},"kind":{"UndefinedVariable":{"name":"count"}}}"#);
}
