//! Whole-program checking tests: declarations, inference, generics and
//! module visibility, driven through `check_program`.

use koral_common::{CompilerConfig, ImportKind, ModuleGraph, Span};
use koral_typeck::ast::{
    BinaryOp, Declaration, Expr, ExprKind, FieldDecl, FunctionDecl, GivenDecl, GlobalLet, GlobalNode,
    Param, Program, SourceRecord, Stmt, StructDecl, TypeNode, TypeParam,
};
use koral_typeck::def_id::AccessModifier;
use koral_typeck::error::VisibilityError;
use koral_typeck::typed::TypedGlobal;
use koral_typeck::{check_program, CheckedProgram, InstantiationKind, SemanticError, SemanticErrorKind, Type};

// ── Helpers ────────────────────────────────────────────────────────────

fn main_file(node: GlobalNode) -> Declaration {
    Declaration::new(SourceRecord::new("main.koral", &[]), node)
}

fn check(declarations: Vec<Declaration>) -> Result<CheckedProgram, SemanticError> {
    check_in(declarations, &ModuleGraph::new())
}

fn check_in(declarations: Vec<Declaration>, graph: &ModuleGraph) -> Result<CheckedProgram, SemanticError> {
    check_program(&Program { declarations }, graph, &CompilerConfig::default())
}

fn global_let(name: &str, value: Expr) -> Declaration {
    main_file(GlobalNode::Let(GlobalLet::new(name, None, value)))
}

fn variable_type<'p>(checked: &'p CheckedProgram, name: &str) -> &'p Type {
    checked
        .globals
        .iter()
        .find_map(|g| match g {
            TypedGlobal::Variable { def, ty, .. } if checked.context.name_of(*def) == name => Some(ty),
            _ => None,
        })
        .unwrap_or_else(|| panic!("no global variable `{}`", name))
}

fn pair() -> Declaration {
    main_file(GlobalNode::Struct(StructDecl::new(
        "Pair",
        vec![TypeParam::new("A"), TypeParam::new("B")],
        vec![
            FieldDecl::new("first", TypeNode::named("A")),
            FieldDecl::new("second", TypeNode::named("B")),
        ],
    )))
}

fn point(access: AccessModifier) -> StructDecl {
    let mut decl = StructDecl::new("Point", vec![], vec![FieldDecl::new("x", TypeNode::named("Int"))]);
    decl.access = access;
    decl
}

// ── Inference ──────────────────────────────────────────────────────────

#[test]
fn integer_literal_global_is_int() {
    let checked = check(vec![global_let("x", Expr::int(1))]).unwrap();
    assert_eq!(variable_type(&checked, "x"), &Type::Int);
    assert!(checked.requests.is_empty());
}

#[test]
fn float_arithmetic_defaults_to_float64() {
    let checked = check(vec![global_let(
        "y",
        Expr::binary(BinaryOp::Mul, Expr::float(1.5), Expr::float(2.0)),
    )])
    .unwrap();
    assert_eq!(variable_type(&checked, "y"), &Type::Float64);
}

#[test]
fn later_globals_see_earlier_types() {
    let checked = check(vec![
        global_let("a", Expr::int(1)),
        global_let("b", Expr::binary(BinaryOp::Lt, Expr::ident("a"), Expr::int(2))),
    ])
    .unwrap();
    assert_eq!(variable_type(&checked, "b"), &Type::Bool);
}

#[test]
fn mismatched_operands_are_rejected() {
    let err = check(vec![global_let(
        "z",
        Expr::binary(BinaryOp::Add, Expr::int(1), Expr::bool(true)),
    )])
    .unwrap_err();
    assert!(matches!(err.kind, SemanticErrorKind::Solver(_)), "{:?}", err);
}

#[test]
fn literal_receiver_waits_for_annotation() {
    let body = Expr::block(
        vec![
            Stmt::let_("x", Expr::int(1)),
            Stmt::let_typed("y", TypeNode::named("UInt8"), Expr::ident("x")),
        ],
        Some(Expr::method(Expr::ident("x"), "equals", vec![Expr::ident("x")])),
    );
    let checked = check(vec![global_let("r", body)]).unwrap();
    assert_eq!(variable_type(&checked, "r"), &Type::Bool);
}

#[test]
fn literal_receiver_takes_later_annotation() {
    let body = Expr::block(
        vec![
            Stmt::let_("x", Expr::int(1)),
            Stmt::let_("order", Expr::method(Expr::ident("x"), "compare", vec![Expr::int(2)])),
            Stmt::let_typed("y", TypeNode::named("UInt8"), Expr::ident("x")),
        ],
        Some(Expr::ident("y")),
    );
    let checked = check(vec![global_let("r", body)]).unwrap();
    assert_eq!(variable_type(&checked, "r"), &Type::UInt8);
}

// ── Generics ───────────────────────────────────────────────────────────

#[test]
fn equal_instantiations_collapse_to_one_request() {
    let checked = check(vec![
        pair(),
        global_let("p", Expr::call(Expr::ident("Pair"), vec![Expr::int(1), Expr::bool(true)])),
        global_let("q", Expr::call(Expr::ident("Pair"), vec![Expr::int(2), Expr::bool(false)])),
    ])
    .unwrap();
    assert_eq!(checked.requests.len(), 1);
    let (key, request) = checked.requests.iter().next().unwrap();
    assert_eq!(key.args, vec!["I".to_string(), "B".to_string()]);
    assert!(matches!(
        &request.kind,
        InstantiationKind::Struct { args, .. } if args == &vec![Type::Int, Type::Bool]
    ));
    assert_eq!(checked.context.debug_name(variable_type(&checked, "p")), "Pair[Int, Bool]");
}

#[test]
fn explicit_type_arguments_pick_the_instantiation() {
    let identity = FunctionDecl::new(
        "identity",
        vec![Param::new("x", TypeNode::named("T"))],
        Some(TypeNode::named("T")),
        Some(Expr::ident("x")),
    )
    .generic(vec![TypeParam::new("T")]);
    let call = Expr::call(
        Expr::new(
            ExprKind::GenericInstantiation {
                name: "identity".into(),
                type_args: vec![TypeNode::named("Int8")],
            },
            Span::DUMMY,
        ),
        vec![Expr::int(3)],
    );
    let checked = check(vec![main_file(GlobalNode::Function(identity)), global_let("v", call)]).unwrap();
    assert_eq!(variable_type(&checked, "v"), &Type::Int8);
    let request = checked.requests.requests().next().unwrap();
    assert!(matches!(
        &request.kind,
        InstantiationKind::Function { args, .. } if args == &vec![Type::Int8]
    ));
}

#[test]
fn literal_argument_takes_later_annotation() {
    let identity = FunctionDecl::new(
        "identity",
        vec![Param::new("x", TypeNode::named("T"))],
        Some(TypeNode::named("T")),
        Some(Expr::ident("x")),
    )
    .generic(vec![TypeParam::new("T")]);
    let body = Expr::block(
        vec![
            Stmt::let_("x", Expr::int(1)),
            Stmt::let_("v", Expr::call(Expr::ident("identity"), vec![Expr::ident("x")])),
            Stmt::let_typed("y", TypeNode::named("UInt8"), Expr::ident("x")),
        ],
        Some(Expr::ident("v")),
    );
    let checked = check(vec![main_file(GlobalNode::Function(identity)), global_let("r", body)]).unwrap();
    assert_eq!(variable_type(&checked, "r"), &Type::UInt8);
    let request = checked.requests.requests().next().unwrap();
    assert!(matches!(
        &request.kind,
        InstantiationKind::Function { args, .. } if args == &vec![Type::UInt8]
    ));
}

#[test]
fn bounded_parameter_allows_comparison() {
    let larger = FunctionDecl::new(
        "larger",
        vec![
            Param::new("a", TypeNode::named("T")),
            Param::new("b", TypeNode::named("T")),
        ],
        Some(TypeNode::named("T")),
        Some(Expr::if_else(
            Expr::binary(BinaryOp::Gt, Expr::ident("a"), Expr::ident("b")),
            Expr::ident("a"),
            Some(Expr::ident("b")),
        )),
    )
    .generic(vec![TypeParam::bounded("T", &["Comparable"])]);
    let checked = check(vec![
        main_file(GlobalNode::Function(larger)),
        global_let("m", Expr::call(Expr::ident("larger"), vec![Expr::int(1), Expr::int(2)])),
    ])
    .unwrap();
    assert_eq!(variable_type(&checked, "m"), &Type::Int);
    assert_eq!(checked.requests.len(), 1);
}

#[test]
fn unbounded_parameter_rejects_comparison() {
    let larger = FunctionDecl::new(
        "larger",
        vec![
            Param::new("a", TypeNode::named("T")),
            Param::new("b", TypeNode::named("T")),
        ],
        Some(TypeNode::named("Bool")),
        Some(Expr::binary(BinaryOp::Gt, Expr::ident("a"), Expr::ident("b"))),
    )
    .generic(vec![TypeParam::new("T")]);
    let err = check(vec![main_file(GlobalNode::Function(larger))]).unwrap_err();
    assert_eq!(err.code(), "E0023");
}

// ── Methods ────────────────────────────────────────────────────────────

#[test]
fn concrete_method_checks_into_a_direct_function() {
    let norm = FunctionDecl::new(
        "norm",
        vec![],
        Some(TypeNode::named("Int")),
        Some(Expr::field(Expr::ident("self"), "x")),
    );
    let given = GivenDecl {
        type_params: vec![],
        target: "Point".into(),
        trait_name: None,
        methods: vec![norm],
        span: Span::DUMMY,
    };
    let call = Expr::method(Expr::call(Expr::ident("Point"), vec![Expr::int(3)]), "norm", vec![]);
    let checked = check(vec![
        main_file(GlobalNode::Struct(point(AccessModifier::Default))),
        main_file(GlobalNode::Given(given)),
        global_let("n", call),
    ])
    .unwrap();
    assert_eq!(variable_type(&checked, "n"), &Type::Int);
    assert!(checked.globals.iter().any(|g| matches!(
        g,
        TypedGlobal::Function { identifier, .. } if identifier == "Point_norm"
    )));
}

// ── Visibility ─────────────────────────────────────────────────────────

fn geo_graph() -> ModuleGraph {
    let mut graph = ModuleGraph::new();
    let root = graph.add_module(Vec::new());
    let geo = graph.add_module(vec!["geo".into()]);
    graph.add_import(root, geo, ImportKind::Module);
    graph
}

fn in_geo(node: GlobalNode) -> Declaration {
    Declaration::new(SourceRecord::new("geo.koral", &["geo"]), node)
}

#[test]
fn module_import_requires_prefix_for_types() {
    let err = check_in(
        vec![
            in_geo(GlobalNode::Struct(point(AccessModifier::Default))),
            global_let("p", Expr::call(Expr::ident("Point"), vec![Expr::int(1)])),
        ],
        &geo_graph(),
    )
    .unwrap_err();
    assert!(matches!(
        err.kind,
        SemanticErrorKind::Visibility(VisibilityError::RequiresModulePrefix { .. })
    ));
    assert_eq!(err.help().as_deref(), Some("write `geo.Point`"));
}

#[test]
fn prefixed_construction_is_accepted() {
    let checked = check_in(
        vec![
            in_geo(GlobalNode::Struct(point(AccessModifier::Default))),
            global_let(
                "p",
                Expr::method(Expr::ident("geo"), "Point", vec![Expr::int(1)]),
            ),
        ],
        &geo_graph(),
    )
    .unwrap();
    assert_eq!(checked.context.debug_name(variable_type(&checked, "p")), "Point");
}

#[test]
fn private_declaration_of_another_file_is_not_accessible() {
    let hidden = Declaration::new(
        SourceRecord::new("shapes.koral", &[]),
        GlobalNode::Struct(point(AccessModifier::Private)),
    );
    let err = check(vec![
        hidden,
        global_let("p", Expr::call(Expr::ident("Point"), vec![Expr::int(1)])),
    ])
    .unwrap_err();
    assert_eq!(err.code(), "E0031");
}
