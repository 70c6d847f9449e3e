//! Grammar load tests: every load-time code, weight normalization and the
//! constant / static classification.

#[cfg(test)]
mod tests {
    use crate::error::{Error, ErrorCode};
    use crate::grammar::statement::{Container, Define, Loop, Node, PathCommand, PathOp, Statement};
    use crate::grammar::{Grammar, GrammarBuilder, RuleWeight};
    use crate::path::{PathArg, PathFlags, PathOpKind};
    use crate::syntax::ast::{BinOp, ExpType, Expr, ModBundle, ModKind, ModTerm, Param, Primitive, ShapeSpec, Span};

    // ─── Helpers ─────────────────────────────────────────────────────────────

    fn circle() -> Statement {
        Statement::replace(ShapeSpec::primitive(Primitive::Circle), ModBundle::default())
    }

    fn call(shape: usize, args: Vec<Expr>) -> Statement {
        Statement::replace(ShapeSpec::shape(shape, args), ModBundle::default())
    }

    fn line_to(x: Expr) -> Statement {
        let op = PathOp::new(PathOpKind::LineTo, vec![(PathArg::X, x)], PathFlags::empty(), &Span::default())
            .expect("valid op");
        Statement::new(Node::PathOp(op))
    }

    fn body(statements: Vec<Statement>) -> Container { Container::new(statements) }

    fn build_err(b: GrammarBuilder) -> Vec<Error> {
        match b.build() {
            Ok(_) => panic!("expected build to fail"),
            Err(e) => e,
        }
    }

    fn build_ok(b: GrammarBuilder) -> Grammar {
        b.build().unwrap_or_else(|errs| panic!("build failed: {errs:#?}"))
    }

    fn has_code(errors: &[Error], code: ErrorCode) -> bool {
        errors.iter().any(|e| e.code == code)
    }

    // ─── References ──────────────────────────────────────────────────────────

    #[test]
    fn g004_unknown_shape() {
        let mut b = GrammarBuilder::new();
        let s = b.declare_shape("s", false, vec![]);
        b.add_rule(s, RuleWeight::Default, body(vec![call(9, vec![])]), Span::new(2, 1));
        b.add_rule(42, RuleWeight::Default, body(vec![]), Span::new(3, 1));
        let errs = build_err(b);
        assert_eq!(errs.iter().filter(|e| e.code == ErrorCode::G004).count(), 2);
    }

    #[test]
    fn g003_argument_count() {
        let mut b = GrammarBuilder::new();
        let leaf = b.declare_shape("leaf", false, vec![Param::number("n")]);
        b.add_rule(leaf, RuleWeight::Default, body(vec![circle()]), Span::default());
        let s = b.declare_shape("s", false, vec![]);
        b.add_rule(s, RuleWeight::Default, body(vec![call(leaf, vec![])]), Span::default());
        assert!(has_code(&build_err(b), ErrorCode::G003));
    }

    #[test]
    fn g008_referenced_shape_without_rules() {
        let mut b = GrammarBuilder::new();
        let empty = b.declare_shape("empty", false, vec![]);
        let s = b.declare_shape("s", false, vec![]);
        b.add_rule(s, RuleWeight::Default, body(vec![call(empty, vec![])]), Span::default());
        assert!(has_code(&build_err(b), ErrorCode::G008));
    }

    #[test]
    fn g011_duplicate_shape() {
        let mut b = GrammarBuilder::new();
        let a = b.declare_shape("a", false, vec![]);
        let again = b.declare_shape("a", false, vec![]);
        assert_eq!(a, again);
        assert!(has_code(&build_err(b), ErrorCode::G011));
    }

    // ─── Body kinds ──────────────────────────────────────────────────────────

    #[test]
    fn g006_replacement_in_path() {
        let mut b = GrammarBuilder::new();
        let p = b.declare_shape("p", true, vec![]);
        b.add_rule(p, RuleWeight::Default, body(vec![line_to(Expr::num(1.0)), circle()]), Span::default());
        assert!(has_code(&build_err(b), ErrorCode::G006));
    }

    #[test]
    fn g007_path_op_outside_path() {
        let mut b = GrammarBuilder::new();
        let s = b.declare_shape("s", false, vec![]);
        b.add_rule(s, RuleWeight::Default, body(vec![line_to(Expr::num(1.0))]), Span::default());
        assert!(has_code(&build_err(b), ErrorCode::G007));
    }

    #[test]
    fn g010_duplicate_define() {
        let mut b = GrammarBuilder::new();
        let s = b.declare_shape("s", false, vec![Param::number("k")]);
        let d = Statement::new(Node::Define(Define::number("k", Expr::num(1.0))));
        b.add_rule(s, RuleWeight::Default, body(vec![d, circle()]), Span::default());
        assert!(has_code(&build_err(b), ErrorCode::G010));
    }

    // ─── Names ───────────────────────────────────────────────────────────────

    fn circle_at(x: Expr) -> Statement {
        let mods = ModBundle::canonical(vec![ModTerm::new(ModKind::X, vec![x])]);
        Statement::replace(ShapeSpec::primitive(Primitive::Circle), mods)
    }

    #[test]
    fn g012_undefined_variable_and_function() {
        let mut b = GrammarBuilder::new();
        let s = b.declare_shape("s", false, vec![]);
        b.add_rule(s, RuleWeight::Default, body(vec![
            circle_at(Expr::Var("nope".into(), Span::new(3, 7))),
            circle_at(Expr::call("warp", vec![Expr::num(1.0)])),
            circle_at(Expr::call("sin", vec![Expr::num(30.0)])),
        ]), Span::default());
        let errs = build_err(b);
        let undefined: Vec<_> = errs.iter().filter(|e| e.code == ErrorCode::G012).collect();
        assert_eq!(undefined.len(), 2);
        assert_eq!((undefined[0].line, undefined[0].column), (3, 7));
        assert!(undefined[0].message.contains("'nope'"));
        assert!(undefined[1].message.contains("'warp'"));
    }

    #[test]
    fn g012_callee_cannot_name_caller_parameter() {
        let mut b = GrammarBuilder::new();
        let callee = b.declare_shape("callee", false, vec![]);
        b.add_rule(callee, RuleWeight::Default, body(vec![circle_at(Expr::var("k"))]), Span::default());
        let caller = b.declare_shape("caller", false, vec![Param::number("k")]);
        b.add_rule(caller, RuleWeight::Default, body(vec![call(callee, vec![])]), Span::default());
        let errs = build_err(b);
        assert_eq!(errs.iter().filter(|e| e.code == ErrorCode::G012).count(), 1);
    }

    #[test]
    fn g012_global_cannot_name_later_global() {
        let mut b = GrammarBuilder::new();
        b.add_global(Define::number("a", Expr::var("b")), Span::default());
        b.add_global(Define::number("b", Expr::num(1.0)), Span::default());
        let s = b.declare_shape("s", false, vec![]);
        b.add_rule(s, RuleWeight::Default, body(vec![circle_at(Expr::var("a"))]), Span::default());
        assert!(has_code(&build_err(b), ErrorCode::G012));
    }

    #[test]
    fn names_in_scope_are_accepted() {
        let mut b = GrammarBuilder::new();
        b.add_global(Define::number("g", Expr::num(1.0)), Span::default());
        // Refers to its own parameter and to itself.
        b.add_global(Define::function(
            "f",
            vec![Param::number("n")],
            ExpType::Numeric,
            1,
            Expr::binary(Expr::var("n"), BinOp::Add, Expr::call("f", vec![Expr::var("g")])),
        ), Span::default());
        let s = b.declare_shape("s", false, vec![Param::number("n")]);
        let lp = Loop::new(Param::number("i"), Expr::var("n"), body(vec![circle_at(Expr::var("i"))]), body(vec![]))
            .unwrap();
        b.add_rule(s, RuleWeight::Default, body(vec![
            Statement::new(Node::Define(Define::number("d", Expr::var("g")))),
            Statement::new(Node::Loop(lp)),
            circle_at(Expr::binary(Expr::var("d"), BinOp::Add, Expr::var("n"))),
        ]), Span::default());
        let top = b.declare_shape("top", false, vec![]);
        b.add_rule(top, RuleWeight::Default, body(vec![call(s, vec![Expr::num(2.0)])]), Span::default());
        build_ok(b);
    }

    // ─── Weights ─────────────────────────────────────────────────────────────

    #[test]
    fn w001_non_positive_weight_normalized() {
        let mut b = GrammarBuilder::new();
        let s = b.declare_shape("s", false, vec![]);
        b.add_rule(s, RuleWeight::Explicit(0.0), body(vec![circle()]), Span::new(4, 1));
        b.add_rule(s, RuleWeight::Explicit(-3.0), body(vec![circle()]), Span::new(5, 1));
        let g = build_ok(b);
        assert_eq!(g.warnings().len(), 2);
        assert!(g.warnings().iter().all(|w| w.code == ErrorCode::W001 && !w.code.is_error()));
        let shape = g.shape(s).unwrap();
        assert!(shape.rules().iter().all(|r| r.weight == 1.0));
        assert_eq!(shape.total_weight(), 2.0);
    }

    #[test]
    fn g005_percent_over_100() {
        let mut b = GrammarBuilder::new();
        let s = b.declare_shape("s", false, vec![]);
        b.add_rule(s, RuleWeight::Percent(70.0), body(vec![circle()]), Span::default());
        b.add_rule(s, RuleWeight::Percent(40.0), body(vec![circle()]), Span::default());
        assert!(has_code(&build_err(b), ErrorCode::G005));
    }

    #[test]
    fn percent_leaves_remainder_to_others() {
        let mut b = GrammarBuilder::new();
        let s = b.declare_shape("s", false, vec![]);
        b.add_rule(s, RuleWeight::Percent(50.0), body(vec![circle()]), Span::default());
        b.add_rule(s, RuleWeight::Default, body(vec![circle()]), Span::default());
        b.add_rule(s, RuleWeight::Explicit(3.0), body(vec![circle()]), Span::default());
        let g = build_ok(b);
        let weights: Vec<f64> = g.shape(s).unwrap().rules().iter().map(|r| r.weight).collect();
        assert_eq!(weights, vec![0.5, 0.125, 0.375]);
        assert!((g.shape(s).unwrap().total_weight() - 1.0).abs() < 1e-12);
    }

    // ─── Classification ──────────────────────────────────────────────────────

    #[test]
    fn constant_path_is_static() {
        let mut b = GrammarBuilder::new();
        b.add_global(Define::number("w", Expr::num(2.0)), Span::default());
        let p = b.declare_shape("p", true, vec![]);
        let lp = Loop::new(Param::number("i"), Expr::num(4.0), body(vec![line_to(Expr::var("i"))]), body(vec![]))
            .unwrap();
        b.add_rule(p, RuleWeight::Default, body(vec![
            Statement::new(Node::Loop(lp)),
            line_to(Expr::var("w")),
            Statement::new(Node::PathCommand(PathCommand::fill())),
        ]), Span::default());
        let g = build_ok(b);
        assert!(g.shape(p).unwrap().rules()[0].is_static());
        match &g.globals().statements[0].node {
            Node::Define(d) => assert!(d.is_constant()),
            other => panic!("expected define, got {other:?}"),
        }
    }

    #[test]
    fn parameter_or_random_path_is_not_static() {
        let mut b = GrammarBuilder::new();
        let p = b.declare_shape("p", true, vec![Param::number("n")]);
        b.add_rule(p, RuleWeight::Default, body(vec![line_to(Expr::var("n"))]), Span::default());
        let q = b.declare_shape("q", true, vec![]);
        b.add_rule(q, RuleWeight::Default, body(vec![line_to(Expr::call("rand", vec![]))]), Span::default());
        let g = build_ok(b);
        assert!(!g.shape(p).unwrap().rules()[0].is_static());
        assert!(!g.shape(q).unwrap().rules()[0].is_static());
    }

    #[test]
    fn loop_variable_defines_are_not_cached() {
        let mut b = GrammarBuilder::new();
        let s = b.declare_shape("s", false, vec![]);
        let inner = Statement::new(Node::Define(Define::number("k", Expr::var("i"))));
        let lp = Loop::new(Param::number("i"), Expr::num(2.0), body(vec![inner, circle()]), body(vec![]))
            .unwrap();
        b.add_rule(s, RuleWeight::Default, body(vec![Statement::new(Node::Loop(lp))]), Span::default());
        let g = build_ok(b);
        let Node::Loop(lp) = &g.shape(s).unwrap().rules()[0].body.statements[0].node else {
            panic!("expected loop");
        };
        let Node::Define(k) = &lp.body.statements[0].node else { panic!("expected define") };
        assert!(!k.is_constant());
    }

    #[test]
    fn grammar_is_shareable() {
        fn assert_sync<T: Send + Sync>() {}
        assert_sync::<Grammar>();
    }
}
