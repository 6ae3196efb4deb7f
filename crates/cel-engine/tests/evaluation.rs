//! End-to-end evaluation tests: compile through `Env`, run through `Program`.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use cel_engine::ext::string_extension;
use cel_engine::{
    AttributePattern, CancellationToken, CelType, CompileError, EmptyActivation, Env, EvalError,
    EvalErrorKind, FunctionDecl, MapActivation, MapKey, OverloadDecl, PartialActivation,
    ProgramOptions, Value,
};
use common::{eval_str, eval_with};
use pretty_assertions::assert_eq;

fn kind(result: Result<Value, EvalError>) -> Option<EvalErrorKind> {
    result.err().map(|e| e.kind)
}

// ============================================================================
// Literals
// ============================================================================

#[test]
fn literals_evaluate_to_their_value() {
    let cases: Vec<(&str, Value)> = vec![
        ("42", Value::Int(42)),
        ("-7", Value::Int(-7)),
        ("0x1F", Value::Int(31)),
        ("-9223372036854775808", Value::Int(i64::MIN)),
        ("42u", Value::UInt(42)),
        ("3.5", Value::Double(3.5)),
        ("1e3", Value::Double(1000.0)),
        ("'hello'", Value::from("hello")),
        ("\"hello\"", Value::from("hello")),
        ("'a\\nb'", Value::from("a\nb")),
        ("r'a\\nb'", Value::from("a\\nb")),
        ("b'ab'", Value::bytes(&b"ab"[..])),
        ("true", Value::Bool(true)),
        ("false", Value::Bool(false)),
        ("null", Value::Null),
    ];
    for (source, expected) in cases {
        assert_eq!(eval_str(source), Ok(expected), "literal {}", source);
    }
}

#[test]
fn literals_ignore_the_activation() {
    let env = Env::with_standard_library();
    let activation = MapActivation::new().with("x", 1i64);
    assert_eq!(eval_with(&env, "'x'", &activation), Ok(Value::from("x")));
}

// ============================================================================
// Short-circuit
// ============================================================================

#[test]
fn and_short_circuits_on_false() {
    assert_eq!(eval_str("false && (1 / 0 > 0)"), Ok(Value::Bool(false)));
    assert_eq!(eval_str("(1 / 0 > 0) && false"), Ok(Value::Bool(false)));
}

#[test]
fn or_short_circuits_on_true() {
    assert_eq!(eval_str("true || (1 / 0 > 0)"), Ok(Value::Bool(true)));
    assert_eq!(eval_str("(1 / 0 > 0) || true"), Ok(Value::Bool(true)));
}

#[test]
fn inconclusive_logic_propagates_errors() {
    assert_eq!(kind(eval_str("true && (1 / 0 > 0)")), Some(EvalErrorKind::DivisionByZero));
    assert_eq!(kind(eval_str("false || (1 / 0 > 0)")), Some(EvalErrorKind::DivisionByZero));
}

#[test]
fn ternary_evaluates_one_branch() {
    assert_eq!(eval_str("true ? 1 : 1 / 0"), Ok(Value::Int(1)));
    assert_eq!(eval_str("false ? 1 / 0 : 2"), Ok(Value::Int(2)));
}

// ============================================================================
// Comprehensions
// ============================================================================

fn guarded_env(calls: Arc<AtomicUsize>) -> Env {
    Env::with_standard_library().with_function(
        FunctionDecl::new("guard").with_overload(
            OverloadDecl::function("guard_int", vec![CelType::Int], CelType::Bool).with_impl(
                move |args| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    match args {
                        [Value::Int(3)] => Err(EvalError::new(
                            EvalErrorKind::InvalidArgument,
                            "guard reached element 3",
                        )),
                        [Value::Int(n)] => Ok(Value::Bool(*n == 2)),
                        _ => Err(EvalError::no_such_overload("guard", args)),
                    }
                },
            ),
        ),
    )
}

#[test]
fn exists_stops_at_first_match() {
    let calls = Arc::new(AtomicUsize::new(0));
    let env = guarded_env(Arc::clone(&calls));

    let result = eval_with(&env, "[1, 2, 3].exists(x, guard(x))", &MapActivation::new());
    assert_eq!(result, Ok(Value::Bool(true)));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn all_stops_at_first_failure() {
    // 20 fails the predicate before 0 is reached.
    assert_eq!(eval_str("[2, 20, 0].all(x, 10 / x > 1)"), Ok(Value::Bool(false)));
    assert_eq!(eval_str("[0, 1].all(x, x > 0 && 10 / x > 1)"), Ok(Value::Bool(false)));
}

#[test]
fn comprehension_macros() {
    assert_eq!(eval_str("[1, 2, 3].all(x, x > 0)"), Ok(Value::Bool(true)));
    assert_eq!(eval_str("[1, 2, 3].exists_one(x, x > 2)"), Ok(Value::Bool(true)));
    assert_eq!(eval_str("[1, 2, 3].exists_one(x, x > 1)"), Ok(Value::Bool(false)));
    assert_eq!(
        eval_str("[1, 2, 3].map(x, x * 2)"),
        Ok(Value::list(vec![Value::Int(2), Value::Int(4), Value::Int(6)]))
    );
    assert_eq!(
        eval_str("[1, 2, 3, 4].filter(x, x % 2 == 0)"),
        Ok(Value::list(vec![Value::Int(2), Value::Int(4)]))
    );
    assert_eq!(
        eval_str("[1, 2, 3, 4].map(x, x > 2, x * 10)"),
        Ok(Value::list(vec![Value::Int(30), Value::Int(40)]))
    );
    assert_eq!(eval_str("{'a': 1, 'b': 2}.exists(k, k == 'b')"), Ok(Value::Bool(true)));
}

// ============================================================================
// Overload resolution
// ============================================================================

fn describe_env() -> Env {
    Env::with_standard_library()
        .with_variable("x", CelType::Dyn)
        .with_function(
            FunctionDecl::new("describe")
                .with_overload(
                    OverloadDecl::function("describe_int", vec![CelType::Int], CelType::String)
                        .with_impl(|_| Ok(Value::from("int"))),
                )
                .with_overload(
                    OverloadDecl::function("describe_string", vec![CelType::String], CelType::String)
                        .with_impl(|_| Ok(Value::from("string"))),
                ),
        )
}

#[test]
fn dyn_argument_checks_and_dispatches_at_runtime() {
    let env = describe_env();
    let ast = env.compile("describe(x)").expect("dyn argument type-checks");
    assert_eq!(ast.result_type(), Some(&CelType::String));

    let program = env.program(&ast).expect("program");
    assert_eq!(
        program.eval(&MapActivation::new().with("x", 5i64)),
        Ok(Value::from("int"))
    );
    assert_eq!(
        program.eval(&MapActivation::new().with("x", "a")),
        Ok(Value::from("string"))
    );
}

#[test]
fn unmatched_runtime_type_is_no_such_overload() {
    let env = describe_env();
    let activation = MapActivation::new().with("x", Value::list(vec![Value::Int(1)]));
    let err = eval_with(&env, "describe(x)", &activation).expect_err("list has no overload");
    assert_eq!(err.kind, EvalErrorKind::NoSuchOverload);
    assert!(err.message.contains("describe"), "message: {}", err.message);
}

// ============================================================================
// Numeric semantics
// ============================================================================

#[test]
fn integer_overflow_is_an_error() {
    let err = eval_str("9223372036854775807 + 1").expect_err("overflow");
    assert_eq!(err.kind, EvalErrorKind::Overflow);
    assert!(err.node_id.is_some());

    assert_eq!(kind(eval_str("-9223372036854775808 - 1")), Some(EvalErrorKind::Overflow));
    assert_eq!(kind(eval_str("9223372036854775807 * 2")), Some(EvalErrorKind::Overflow));
    assert_eq!(kind(eval_str("0u - 1u")), Some(EvalErrorKind::Overflow));
}

#[test]
fn division_by_zero_is_an_error() {
    assert_eq!(kind(eval_str("1 / 0")), Some(EvalErrorKind::DivisionByZero));
    assert_eq!(kind(eval_str("1 % 0")), Some(EvalErrorKind::DivisionByZero));
}

#[test]
fn cross_type_numeric_comparisons() {
    assert_eq!(eval_str("1 < 1.5"), Ok(Value::Bool(true)));
    assert_eq!(eval_str("2u > 1"), Ok(Value::Bool(true)));
    assert_eq!(eval_str("1 == 1.0"), Ok(Value::Bool(true)));
    assert_eq!(eval_str("1 == 1u"), Ok(Value::Bool(true)));
}

// ============================================================================
// Lists and maps
// ============================================================================

#[test]
fn list_literal_keeps_order() {
    assert_eq!(
        eval_str("[3, 'a', 2.5, [1]]"),
        Ok(Value::list(vec![
            Value::Int(3),
            Value::from("a"),
            Value::Double(2.5),
            Value::list(vec![Value::Int(1)]),
        ]))
    );
}

#[test]
fn map_literal_ignores_declaration_order() {
    let expected = Value::map([
        (MapKey::from("a"), Value::Int(1)),
        (MapKey::from("b"), Value::Int(2)),
    ]);
    assert_eq!(eval_str("{'b': 2, 'a': 1}"), Ok(expected.clone()));
    assert_eq!(eval_str("{'a': 1, 'b': 2}"), Ok(expected));
    assert_eq!(eval_str("{'b': 2, 'a': 1} == {'a': 1, 'b': 2}"), Ok(Value::Bool(true)));
}

#[test]
fn missing_entries_are_errors() {
    assert_eq!(kind(eval_str("[1, 2][2]")), Some(EvalErrorKind::IndexOutOfRange));
    assert_eq!(kind(eval_str("[1, 2][-1]")), Some(EvalErrorKind::IndexOutOfRange));
    assert_eq!(kind(eval_str("{'a': 1}['b']")), Some(EvalErrorKind::NoSuchKey));
}

#[test]
fn duplicate_map_keys_are_errors() {
    assert_eq!(kind(eval_str("{'a': 1, 'a': 2}")), Some(EvalErrorKind::InvalidArgument));
}

// ============================================================================
// Standard library
// ============================================================================

#[test]
fn string_functions() {
    assert_eq!(eval_str("size('héllo')"), Ok(Value::Int(5)));
    assert_eq!(eval_str("'hello'.startsWith('he')"), Ok(Value::Bool(true)));
    assert_eq!(eval_str("'hello'.endsWith('lo')"), Ok(Value::Bool(true)));
    assert_eq!(eval_str("'hello'.contains('ell')"), Ok(Value::Bool(true)));
    assert_eq!(eval_str("'abc123'.matches('^[a-z]+[0-9]+$')"), Ok(Value::Bool(true)));
    assert_eq!(eval_str("'a' + 'b'"), Ok(Value::from("ab")));
}

#[test]
fn conversions() {
    assert_eq!(eval_str("int('42')"), Ok(Value::Int(42)));
    assert_eq!(eval_str("string(42)"), Ok(Value::from("42")));
    assert_eq!(eval_str("double(1)"), Ok(Value::Double(1.0)));
    assert_eq!(eval_str("uint(7)"), Ok(Value::UInt(7)));
    assert_eq!(kind(eval_str("int('forty')")), Some(EvalErrorKind::InvalidArgument));
    assert_eq!(kind(eval_str("int(1e100)")), Some(EvalErrorKind::Overflow));
}

#[test]
fn type_values() {
    assert_eq!(eval_str("type(1) == int"), Ok(Value::Bool(true)));
    assert_eq!(eval_str("type('a') == string"), Ok(Value::Bool(true)));
    assert_eq!(eval_str("type([1]) == list"), Ok(Value::Bool(true)));
}

#[test]
fn membership() {
    assert_eq!(eval_str("2 in [1, 2, 3]"), Ok(Value::Bool(true)));
    assert_eq!(eval_str("'z' in {'a': 1}"), Ok(Value::Bool(false)));
}

#[test]
fn exists_one_reports_errors_after_two_matches() {
    assert_eq!(
        kind(eval_str("[1, 1, 0].exists_one(x, 10 / x > 0)")),
        Some(EvalErrorKind::DivisionByZero)
    );
    assert_eq!(
        eval_str("[1, 1, 2].exists_one(x, 10 / x > 0)"),
        Ok(Value::Bool(false))
    );
}

// ============================================================================
// Program options
// ============================================================================

fn program_for(env: &Env, source: &str, options: ProgramOptions) -> cel_engine::Program {
    common::init_tracing();
    let ast = env
        .compile(source)
        .unwrap_or_else(|err| panic!("failed to compile '{}':\n{}", source, err.render(source)));
    env.program_with_options(&ast, options)
        .unwrap_or_else(|err| panic!("failed to create program for '{}': {}", source, err))
}

#[test]
fn cancelled_token_stops_comprehensions() {
    let env = Env::with_standard_library();
    let program = program_for(&env, "[1, 2, 3].all(x, x > 0)", ProgramOptions::new());

    let token = CancellationToken::new();
    assert_eq!(
        program.eval_with_cancellation(&EmptyActivation, &token),
        Ok(Value::Bool(true))
    );
    token.cancel();
    assert_eq!(
        kind(program.eval_with_cancellation(&EmptyActivation, &token)),
        Some(EvalErrorKind::Cancelled)
    );
    // Without the token the same program still runs.
    assert_eq!(program.eval_empty(), Ok(Value::Bool(true)));
}

#[test]
fn iteration_limit_applies_across_nested_comprehensions() {
    let env = Env::with_standard_library();
    let source = "[1, 2, 3].all(x, [1, 2, 3].all(y, x * y > 0))";

    let limited = program_for(&env, source, ProgramOptions::new().with_max_iterations(5));
    assert_eq!(
        kind(limited.eval_empty()),
        Some(EvalErrorKind::IterationLimitExceeded)
    );
    let enough = program_for(&env, source, ProgramOptions::new().with_max_iterations(12));
    assert_eq!(enough.eval_empty(), Ok(Value::Bool(true)));
}

#[test]
fn exhaustive_mode_records_skipped_branches() {
    let env = Env::with_standard_library().with_variable("x", CelType::Int);
    let source = "x > 0 || x / 0 > 1";
    let activation = MapActivation::new().with("x", 5i64);

    let normal = program_for(&env, source, ProgramOptions::new().with_track_state(true));
    let (result, state) = normal.eval_details(&activation);
    assert_eq!(result, Ok(Value::Bool(true)));
    let skipped = state.expect("state is tracked").len();

    let exhaustive = program_for(&env, source, ProgramOptions::new().with_exhaustive(true));
    let (result, state) = exhaustive.eval_details(&activation);
    assert_eq!(result, Ok(Value::Bool(true)));
    let state = state.expect("exhaustive evaluation records state");
    assert!(state.len() > skipped);
    assert!(state.iter().any(|(_, value)| matches!(
        value,
        Value::Error(err) if err.kind == EvalErrorKind::DivisionByZero
    )));
}

#[test]
fn unknown_result_is_an_error_without_partial_evaluation() {
    let env = Env::with_standard_library().with_variable("x", CelType::Int);
    let activation = PartialActivation::new(MapActivation::new(), [AttributePattern::new("x")]);

    let strict = program_for(&env, "x + 1", ProgramOptions::new());
    assert_eq!(kind(strict.eval(&activation)), Some(EvalErrorKind::UnknownValue));

    let partial = program_for(&env, "x + 1", ProgramOptions::new().with_partial_eval(true));
    assert!(partial.eval(&activation).expect("unknown is a value").is_unknown());
}

#[test]
fn partial_evaluation_absorbs_decided_unknowns() {
    let env = Env::with_standard_library()
        .with_variable("x", CelType::Int)
        .with_variable("y", CelType::String);
    let options = ProgramOptions::new().with_partial_eval(true);
    let activation = PartialActivation::new(
        MapActivation::new().with("y", "admin"),
        [AttributePattern::new("x")],
    );

    let decided = program_for(&env, "y == 'admin' || x > 10", options.clone());
    assert_eq!(decided.eval(&activation), Ok(Value::Bool(true)));
    let undecided = program_for(&env, "y == 'guest' || x > 10", options);
    assert!(undecided.eval(&activation).expect("unknown is a value").is_unknown());
}

#[test]
fn residual_of_partial_evaluation() {
    let env = Env::with_standard_library()
        .with_variable("x", CelType::Int)
        .with_variable("y", CelType::String);
    let program = program_for(
        &env,
        "y == 'admin' && x > size(y)",
        ProgramOptions::new()
            .with_partial_eval(true)
            .with_track_state(true),
    );
    let activation = PartialActivation::new(
        MapActivation::new().with("y", "admin"),
        [AttributePattern::new("x")],
    );

    let (result, state) = program.eval_details(&activation);
    assert!(result.expect("unknown is a value").is_unknown());
    let residual = program.residual(&state.expect("state is tracked"));
    assert_eq!(residual.to_cel_string(), "x > 5");

    // The residual is a plain expression again.
    let recompiled = program_for(&env, &residual.to_cel_string(), ProgramOptions::new());
    assert_eq!(
        recompiled.eval(&MapActivation::new().with("x", 6i64)),
        Ok(Value::Bool(true))
    );
}

#[test]
fn deep_operator_chain_fails_to_compile() {
    let source = format!("1{}", " + 1".repeat(20_000));
    match Env::with_standard_library().compile(&source) {
        Err(CompileError::Parse(errors)) => {
            assert!(errors.iter().any(|e| e.message.contains("nested too deeply")))
        }
        other => panic!("expected a parse error, got {:?}", other.map(|_| ())),
    }
}

// ============================================================================
// String extension
// ============================================================================

#[test]
fn string_extension_functions() {
    let env = Env::with_standard_library()
        .with_extension(string_extension())
        .with_variable("name", CelType::String);
    let activation = MapActivation::new().with("name", "  Ada Lovelace ");

    let cases: Vec<(&str, Value)> = vec![
        ("name.trim().charAt(0)", Value::from("A")),
        ("name.indexOf('a')", Value::Int(4)),
        ("name.lastIndexOf('a')", Value::Int(11)),
        ("name.trim().upperAscii()", Value::from("ADA LOVELACE")),
        ("name.trim().replace(' ', '_')", Value::from("Ada_Lovelace")),
        ("name.trim().split(' ').join('+')", Value::from("Ada+Lovelace")),
        ("name.trim().substring(4, 8)", Value::from("Love")),
        ("name.trim().lowerAscii().split('').size()", Value::Int(12)),
    ];
    for (source, expected) in cases {
        assert_eq!(eval_with(&env, source, &activation), Ok(expected), "{}", source);
    }
    assert_eq!(
        kind(eval_with(&env, "name.substring(5, 2)", &activation)),
        Some(EvalErrorKind::InvalidArgument)
    );
}
