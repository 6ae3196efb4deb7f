//! Environment: declarations plus the parse → check → program pipeline.
//!
//! An `Env` is built once with consuming builder methods and is read-only
//! afterwards; share it freely across threads. Derive a variant with
//! [`Env::extend`] instead of mutating a shared instance.

use std::collections::HashMap;
use std::sync::Arc;

use cel_engine_parser::{LineIndex, ParseError, ParseOptions, ParseResult};

use crate::checker::{CheckError, Checker, DEFAULT_MAX_ERRORS};
use crate::eval::{FunctionRegistry, Program, ProgramOptions, Value};
use crate::stdlib::{type_constants, STANDARD_LIBRARY};
use crate::types::{CelType, FunctionDecl, TypeRegistry, VariableDecl};
use crate::Ast;

/// Functions evaluated inline by the evaluator rather than dispatched.
const SPECIAL_FORMS: &[&str] = &["_&&_", "_||_", "_?_:_"];

/// Description used for the input in rendered error messages.
const INPUT_DESCRIPTION: &str = "<input>";

/// Failure to turn source text into a runnable program.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompileError {
    #[error("syntax error: {}", parse_messages(.0))]
    Parse(Vec<ParseError>),

    #[error("type error: {}", check_messages(.0))]
    Check(Vec<CheckError>),

    /// A checked call resolved to an overload declared without a runtime
    /// implementation.
    #[error("no implementation for overload '{overload_id}' of function '{function}'")]
    MissingImplementation { function: String, overload_id: String },
}

impl CompileError {
    /// Every error as `ERROR: <input>:LINE:COL: message`, followed by the
    /// offending source line and a caret under the column.
    pub fn render(&self, source: &str) -> String {
        let index = LineIndex::new(source);
        let blocks: Vec<String> = match self {
            CompileError::Parse(errors) => errors
                .iter()
                .map(|e| index.render(INPUT_DESCRIPTION, e.span.start, &e.message))
                .collect(),
            CompileError::Check(errors) => errors
                .iter()
                .map(|e| index.render(INPUT_DESCRIPTION, e.span.start, &e.message()))
                .collect(),
            other => vec![format!("ERROR: {}: {}", INPUT_DESCRIPTION, other)],
        };
        blocks.join("\n")
    }
}

fn parse_messages(errors: &[ParseError]) -> String {
    errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

fn check_messages(errors: &[CheckError]) -> String {
    errors
        .iter()
        .map(CheckError::message)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Declarations and options shared by parsing, checking and evaluation.
///
/// # Example
///
/// ```
/// use cel_engine::{CelType, Env, MapActivation, Value};
///
/// let env = Env::with_standard_library()
///     .with_variable("name", CelType::String);
///
/// let ast = env.compile("name.startsWith('a')").unwrap();
/// let program = env.program(&ast).unwrap();
/// let activation = MapActivation::new().with("name", "alice");
/// assert_eq!(program.eval(&activation), Ok(Value::Bool(true)));
/// ```
#[derive(Debug, Clone)]
pub struct Env {
    variables: HashMap<String, VariableDecl>,
    functions: HashMap<String, FunctionDecl>,
    /// Namespace for qualified name resolution.
    container: String,
    registry: Arc<TypeRegistry>,
    parse_options: ParseOptions,
    max_check_errors: usize,
}

impl Env {
    /// An environment with no declarations at all.
    pub fn new() -> Self {
        Self {
            variables: HashMap::new(),
            functions: HashMap::new(),
            container: String::new(),
            registry: Arc::new(TypeRegistry::new()),
            parse_options: ParseOptions::default(),
            max_check_errors: DEFAULT_MAX_ERRORS,
        }
    }

    /// Standard operators and functions, plus the type-name constants.
    pub fn with_standard_library() -> Self {
        let mut env = Self::new();
        for func in STANDARD_LIBRARY.iter() {
            env.add_function(func.clone());
        }
        for constant in type_constants() {
            env.add_variable_decl(constant);
        }
        env
    }

    /// A copy to build on; the original is left untouched.
    pub fn extend(&self) -> Self {
        self.clone()
    }

    pub fn with_variable(mut self, name: impl Into<String>, cel_type: CelType) -> Self {
        self.add_variable_decl(VariableDecl::new(name, cel_type));
        self
    }

    /// Declare a name bound to a fixed value. Activations may still shadow it.
    pub fn with_constant(mut self, name: impl Into<String>, cel_type: CelType, value: Value) -> Self {
        self.add_variable_decl(VariableDecl::constant(name, cel_type, value));
        self
    }

    pub fn with_variable_decl(mut self, decl: VariableDecl) -> Self {
        self.add_variable_decl(decl);
        self
    }

    fn add_variable_decl(&mut self, decl: VariableDecl) {
        self.variables.insert(decl.name.clone(), decl);
    }

    /// Declare a function. Overloads merge into an existing declaration of
    /// the same name; an overload with an existing id replaces it.
    pub fn with_function(mut self, decl: FunctionDecl) -> Self {
        self.add_function(decl);
        self
    }

    /// Declare every function of a library, such as
    /// [`string_extension`](crate::ext::string_extension).
    pub fn with_extension(mut self, decls: impl IntoIterator<Item = FunctionDecl>) -> Self {
        for decl in decls {
            self.add_function(decl);
        }
        self
    }

    fn add_function(&mut self, decl: FunctionDecl) {
        match self.functions.get_mut(&decl.name) {
            Some(existing) => existing.merge(decl),
            None => {
                self.functions.insert(decl.name.clone(), decl);
            }
        }
    }

    pub fn with_container(mut self, container: impl Into<String>) -> Self {
        self.container = container.into();
        self
    }

    pub fn with_type_registry(mut self, registry: TypeRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    pub fn with_parse_options(mut self, options: ParseOptions) -> Self {
        self.parse_options = options;
        self
    }

    pub fn with_max_check_errors(mut self, max_errors: usize) -> Self {
        self.max_check_errors = max_errors;
        self
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    pub fn variables(&self) -> &HashMap<String, VariableDecl> {
        &self.variables
    }

    pub fn functions(&self) -> &HashMap<String, FunctionDecl> {
        &self.functions
    }

    pub fn type_registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn parse_options(&self) -> &ParseOptions {
        &self.parse_options
    }

    /// Parse without type checking.
    pub fn parse(&self, source: &str) -> Result<Ast, CompileError> {
        tracing::debug!(len = source.len(), "parsing expression");
        let ParseResult {
            ast,
            errors,
            macro_calls,
            ..
        } = cel_engine_parser::parse_with_options(source, &self.parse_options);

        match ast {
            Some(expr) if errors.is_empty() => {
                Ok(Ast::new_unchecked(expr, source).with_macro_calls(macro_calls))
            }
            _ => {
                tracing::debug!(errors = errors.len(), "parse failed");
                Err(CompileError::Parse(errors))
            }
        }
    }

    /// Type check a parsed AST, returning a checked copy.
    pub fn check(&self, ast: &Ast) -> Result<Ast, CompileError> {
        let result = Checker::new(&self.variables, &self.functions, &self.container)
            .with_type_registry(&self.registry)
            .with_max_errors(self.max_check_errors)
            .check(ast.expr());

        tracing::debug!(errors = result.errors.len(), "type check finished");
        if result.is_ok() {
            Ok(ast.clone().into_checked(result))
        } else {
            Err(CompileError::Check(result.errors))
        }
    }

    /// Parse and type check.
    pub fn compile(&self, source: &str) -> Result<Ast, CompileError> {
        let ast = self.parse(source)?;
        self.check(&ast)
    }

    /// Build a program with default options.
    pub fn program(&self, ast: &Ast) -> Result<Program, CompileError> {
        self.program_with_options(ast, ProgramOptions::default())
    }

    /// Build a program. Checked ASTs are validated against the runtime
    /// function table; unchecked ones resolve everything at evaluation time.
    pub fn program_with_options(
        &self,
        ast: &Ast,
        options: ProgramOptions,
    ) -> Result<Program, CompileError> {
        if let Some(type_info) = ast.type_info() {
            for reference in type_info.reference_map.values() {
                self.ensure_implemented(&reference.name, &reference.overload_ids)?;
            }
        }

        let functions = FunctionRegistry::from_decls(self.functions.values());
        let constants: HashMap<String, Value> = self
            .variables
            .values()
            .filter_map(|decl| Some((decl.name.clone(), decl.const_value.clone()?)))
            .collect();

        tracing::debug!(
            functions = functions.len(),
            constants = constants.len(),
            checked = ast.is_checked(),
            "program created"
        );
        Ok(Program::new(Arc::new(ast.clone()), Arc::new(functions))
            .with_constants(Arc::new(constants))
            .with_type_registry(Arc::clone(&self.registry))
            .with_options(options))
    }

    fn ensure_implemented(&self, name: &str, overload_ids: &[String]) -> Result<(), CompileError> {
        if SPECIAL_FORMS.contains(&name) {
            return Ok(());
        }
        let Some(func) = self.functions.get(name) else {
            return Ok(());
        };
        for id in overload_ids {
            if func.overload(id).is_some_and(|o| o.implementation.is_none()) {
                return Err(CompileError::MissingImplementation {
                    function: name.to_string(),
                    overload_id: id.clone(),
                });
            }
        }
        Ok(())
    }
}

impl Default for Env {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::CheckErrorKind;
    use crate::eval::{EvalErrorKind, MapActivation};
    use crate::types::OverloadDecl;

    #[test]
    fn new_env_is_empty() {
        let env = Env::new();
        assert!(env.variables().is_empty());
        assert!(env.functions().is_empty());
        assert_eq!(env.container(), "");
    }

    #[test]
    fn standard_library() {
        let env = Env::with_standard_library();
        assert!(env.functions().contains_key("_+_"));
        assert!(env.functions().contains_key("size"));
        assert!(env.functions().contains_key("matches"));
        assert!(env.variables().contains_key("int"));
        assert!(env.variables()["int"].const_value.is_some());
    }

    #[test]
    fn extension_functions_are_opt_in() {
        let ast = Env::with_standard_library()
            .with_extension(crate::ext::string_extension())
            .compile("'a,b'.split(',').join('-')")
            .unwrap();
        assert_eq!(ast.result_type(), Some(&CelType::String));
        assert!(matches!(
            Env::with_standard_library().compile("'a,b'.split(',')"),
            Err(CompileError::Check(_))
        ));
    }

    #[test]
    fn with_variable() {
        let env = Env::with_standard_library().with_variable("x", CelType::Int);
        assert_eq!(env.variables().get("x").map(|d| &d.cel_type), Some(&CelType::Int));
    }

    #[test]
    fn extend_leaves_base_untouched() {
        let base = Env::with_standard_library();
        let extended = base.extend().with_variable("x", CelType::Int);
        assert!(extended.variables().contains_key("x"));
        assert!(!base.variables().contains_key("x"));
    }

    #[test]
    fn with_function_merges_overloads() {
        let env = Env::with_standard_library().with_function(
            FunctionDecl::new("size").with_overload(OverloadDecl::function(
                "size_bool",
                vec![CelType::Bool],
                CelType::Int,
            )),
        );
        let size = &env.functions()["size"];
        assert!(size.overload("size_bool").is_some());
        assert!(size.overload("size_string").is_some());
    }

    #[test]
    fn parse_error() {
        let env = Env::with_standard_library();
        let err = env.parse("1 +").expect_err("incomplete");
        assert!(matches!(err, CompileError::Parse(ref errors) if !errors.is_empty()));
    }

    #[test]
    fn check_error() {
        let env = Env::with_standard_library();
        let err = env.compile("x + 1").expect_err("x is undeclared");
        let CompileError::Check(errors) = &err else {
            panic!("expected check errors, got {:?}", err);
        };
        assert!(matches!(
            &errors[0].kind,
            CheckErrorKind::UndeclaredReference { name, .. } if name == "x"
        ));
    }

    #[test]
    fn render_points_at_error() {
        let env = Env::with_standard_library();
        let source = "1 + \n  foo";
        let err = env.compile(source).expect_err("foo is undeclared");
        let rendered = err.render(source);
        assert!(rendered.starts_with("ERROR: <input>:2:3: undeclared reference to 'foo'"));
        assert!(rendered.contains("\n |   foo\n | ..^"));
    }

    #[test]
    fn max_check_errors() {
        let env = Env::with_standard_library().with_max_check_errors(1);
        let err = env.compile("a + b + c").expect_err("undeclared");
        assert!(matches!(err, CompileError::Check(ref errors) if errors.len() == 1));
    }

    #[test]
    fn compile_and_run() {
        let env = Env::with_standard_library().with_variable("x", CelType::Int);
        let ast = env.compile("x * 2").expect("compiles");
        let program = env.program(&ast).expect("program");
        let activation = MapActivation::new().with("x", 21i64);
        assert_eq!(program.eval(&activation), Ok(Value::Int(42)));
    }

    #[test]
    fn constants_reach_the_program() {
        let env = Env::with_standard_library().with_constant("limit", CelType::Int, Value::Int(5));
        let ast = env.compile("limit + 1").expect("compiles");
        let program = env.program(&ast).expect("program");
        assert_eq!(program.eval_empty(), Ok(Value::Int(6)));
    }

    #[test]
    fn type_constants_evaluate() {
        let env = Env::with_standard_library();
        let ast = env.compile("type(1) == int").expect("compiles");
        let program = env.program(&ast).expect("program");
        assert_eq!(program.eval_empty(), Ok(Value::Bool(true)));
    }

    #[test]
    fn missing_implementation_is_reported() {
        let env = Env::with_standard_library().with_function(
            FunctionDecl::new("lookup").with_overload(OverloadDecl::function(
                "lookup_string",
                vec![CelType::String],
                CelType::Int,
            )),
        );
        let ast = env.compile("lookup('a')").expect("declared");
        let err = env.program(&ast).expect_err("no implementation");
        assert_eq!(
            err,
            CompileError::MissingImplementation {
                function: "lookup".to_string(),
                overload_id: "lookup_string".to_string(),
            }
        );

        // Unchecked programs defer the failure to evaluation.
        let unchecked = env.parse("lookup('a')").expect("parses");
        let program = env.program(&unchecked).expect("program");
        assert_eq!(
            program.eval_empty().map_err(|e| e.kind),
            Err(EvalErrorKind::NoSuchOverload)
        );
    }

    #[test]
    fn container_qualified_function() {
        let env = Env::with_standard_library()
            .with_container("acme")
            .with_function(
                FunctionDecl::new("acme.twice").with_overload(
                    OverloadDecl::function("acme_twice_int", vec![CelType::Int], CelType::Int)
                        .with_impl(|args| match args {
                            [Value::Int(n)] => Ok(Value::Int(n * 2)),
                            _ => Err(crate::eval::EvalError::no_such_overload("acme.twice", args)),
                        }),
                ),
            );
        let ast = env.compile("twice(4)").expect("resolves through the container");
        let program = env.program(&ast).expect("program");
        assert_eq!(program.eval_empty(), Ok(Value::Int(8)));
    }
}
