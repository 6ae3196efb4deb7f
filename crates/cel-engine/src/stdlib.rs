//! Standard library: operator and function declarations with their runtime
//! implementations, plus the type-name constants.

use std::sync::LazyLock;

use crate::eval::{builtins, EvalError, TypeValue, Value};
use crate::types::{CelType, FunctionDecl, OverloadDecl, VariableDecl};

/// Every built-in operator and function.
pub static STANDARD_LIBRARY: LazyLock<Vec<FunctionDecl>> = LazyLock::new(build_standard_library);

fn t() -> CelType {
    CelType::type_param("T")
}

fn list_t() -> CelType {
    CelType::list(t())
}

fn map_kv() -> CelType {
    CelType::map(CelType::type_param("K"), CelType::type_param("V"))
}

fn params(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

/// The numeric pairs ordered by `<`, `<=`, `>` and `>=`, with overload id suffixes.
const ORDERED: &[(&str, CelType, CelType)] = &[
    ("bool", CelType::Bool, CelType::Bool),
    ("int64", CelType::Int, CelType::Int),
    ("uint64", CelType::UInt, CelType::UInt),
    ("double", CelType::Double, CelType::Double),
    ("string", CelType::String, CelType::String),
    ("bytes", CelType::Bytes, CelType::Bytes),
    ("int64_uint64", CelType::Int, CelType::UInt),
    ("int64_double", CelType::Int, CelType::Double),
    ("uint64_int64", CelType::UInt, CelType::Int),
    ("uint64_double", CelType::UInt, CelType::Double),
    ("double_int64", CelType::Double, CelType::Int),
    ("double_uint64", CelType::Double, CelType::UInt),
];

fn comparison(
    name: &str,
    prefix: &str,
    implementation: fn(&[Value]) -> Result<Value, EvalError>,
) -> FunctionDecl {
    FunctionDecl::new(name).with_overloads(ORDERED.iter().map(|(suffix, a, b)| {
        OverloadDecl::function(
            format!("{}_{}", prefix, suffix),
            vec![a.clone(), b.clone()],
            CelType::Bool,
        )
        .with_impl(implementation)
    }))
}

fn build_standard_library() -> Vec<FunctionDecl> {
    let mut funcs = Vec::new();

    // Arithmetic
    funcs.push(
        FunctionDecl::new("_+_")
            .with_overload(OverloadDecl::function("add_int64", vec![CelType::Int, CelType::Int], CelType::Int).with_impl(builtins::add))
            .with_overload(OverloadDecl::function("add_uint64", vec![CelType::UInt, CelType::UInt], CelType::UInt).with_impl(builtins::add))
            .with_overload(OverloadDecl::function("add_double", vec![CelType::Double, CelType::Double], CelType::Double).with_impl(builtins::add))
            .with_overload(OverloadDecl::function("add_string", vec![CelType::String, CelType::String], CelType::String).with_impl(builtins::add))
            .with_overload(OverloadDecl::function("add_bytes", vec![CelType::Bytes, CelType::Bytes], CelType::Bytes).with_impl(builtins::add))
            .with_overload(
                OverloadDecl::function("add_list", vec![list_t(), list_t()], list_t())
                    .with_type_params(params(&["T"]))
                    .with_impl(builtins::add),
            ),
    );
    funcs.push(
        FunctionDecl::new("_-_")
            .with_overload(OverloadDecl::function("subtract_int64", vec![CelType::Int, CelType::Int], CelType::Int).with_impl(builtins::subtract))
            .with_overload(OverloadDecl::function("subtract_uint64", vec![CelType::UInt, CelType::UInt], CelType::UInt).with_impl(builtins::subtract))
            .with_overload(OverloadDecl::function("subtract_double", vec![CelType::Double, CelType::Double], CelType::Double).with_impl(builtins::subtract)),
    );
    funcs.push(
        FunctionDecl::new("_*_")
            .with_overload(OverloadDecl::function("multiply_int64", vec![CelType::Int, CelType::Int], CelType::Int).with_impl(builtins::multiply))
            .with_overload(OverloadDecl::function("multiply_uint64", vec![CelType::UInt, CelType::UInt], CelType::UInt).with_impl(builtins::multiply))
            .with_overload(OverloadDecl::function("multiply_double", vec![CelType::Double, CelType::Double], CelType::Double).with_impl(builtins::multiply)),
    );
    funcs.push(
        FunctionDecl::new("_/_")
            .with_overload(OverloadDecl::function("divide_int64", vec![CelType::Int, CelType::Int], CelType::Int).with_impl(builtins::divide))
            .with_overload(OverloadDecl::function("divide_uint64", vec![CelType::UInt, CelType::UInt], CelType::UInt).with_impl(builtins::divide))
            .with_overload(OverloadDecl::function("divide_double", vec![CelType::Double, CelType::Double], CelType::Double).with_impl(builtins::divide)),
    );
    funcs.push(
        FunctionDecl::new("_%_")
            .with_overload(OverloadDecl::function("modulo_int64", vec![CelType::Int, CelType::Int], CelType::Int).with_impl(builtins::modulo))
            .with_overload(OverloadDecl::function("modulo_uint64", vec![CelType::UInt, CelType::UInt], CelType::UInt).with_impl(builtins::modulo)),
    );
    funcs.push(
        FunctionDecl::new("-_")
            .with_overload(OverloadDecl::function("negate_int64", vec![CelType::Int], CelType::Int).with_impl(builtins::negate))
            .with_overload(OverloadDecl::function("negate_double", vec![CelType::Double], CelType::Double).with_impl(builtins::negate)),
    );

    // Equality and ordering
    funcs.push(
        FunctionDecl::new("_==_").with_overload(
            OverloadDecl::function("equals", vec![t(), t()], CelType::Bool)
                .with_type_params(params(&["T"]))
                .with_impl(builtins::equals),
        ),
    );
    funcs.push(
        FunctionDecl::new("_!=_").with_overload(
            OverloadDecl::function("not_equals", vec![t(), t()], CelType::Bool)
                .with_type_params(params(&["T"]))
                .with_impl(builtins::not_equals),
        ),
    );
    funcs.push(comparison("_<_", "less", builtins::less));
    funcs.push(comparison("_<=_", "less_equals", builtins::less_equals));
    funcs.push(comparison("_>_", "greater", builtins::greater));
    funcs.push(comparison("_>=_", "greater_equals", builtins::greater_equals));

    // Logical operators short-circuit inside the evaluator; no implementation.
    funcs.push(
        FunctionDecl::new("_&&_")
            .with_overload(OverloadDecl::function("logical_and", vec![CelType::Bool, CelType::Bool], CelType::Bool)),
    );
    funcs.push(
        FunctionDecl::new("_||_")
            .with_overload(OverloadDecl::function("logical_or", vec![CelType::Bool, CelType::Bool], CelType::Bool)),
    );
    funcs.push(
        FunctionDecl::new("!_")
            .with_overload(OverloadDecl::function("logical_not", vec![CelType::Bool], CelType::Bool).with_impl(builtins::not)),
    );
    funcs.push(
        FunctionDecl::new("_?_:_").with_overload(
            OverloadDecl::function("conditional", vec![CelType::Bool, t(), t()], t())
                .with_type_params(params(&["T"])),
        ),
    );

    // Membership and indexing
    funcs.push(
        FunctionDecl::new("@in")
            .with_overload(
                OverloadDecl::function("in_list", vec![t(), list_t()], CelType::Bool)
                    .with_type_params(params(&["T"]))
                    .with_impl(builtins::in_collection),
            )
            .with_overload(
                OverloadDecl::function("in_map", vec![CelType::type_param("K"), map_kv()], CelType::Bool)
                    .with_type_params(params(&["K", "V"]))
                    .with_impl(builtins::in_collection),
            ),
    );
    funcs.push(
        FunctionDecl::new("_[_]")
            .with_overload(
                OverloadDecl::function("index_list", vec![list_t(), CelType::Int], t())
                    .with_type_params(params(&["T"]))
                    .with_impl(builtins::index),
            )
            .with_overload(
                OverloadDecl::function("index_map", vec![map_kv(), CelType::type_param("K")], CelType::type_param("V"))
                    .with_type_params(params(&["K", "V"]))
                    .with_impl(builtins::index),
            ),
    );

    // Conversions
    funcs.push(
        FunctionDecl::new("int")
            .with_overload(OverloadDecl::function("int_to_int", vec![CelType::Int], CelType::Int).with_impl(builtins::to_int))
            .with_overload(OverloadDecl::function("uint_to_int", vec![CelType::UInt], CelType::Int).with_impl(builtins::to_int))
            .with_overload(OverloadDecl::function("double_to_int", vec![CelType::Double], CelType::Int).with_impl(builtins::to_int))
            .with_overload(OverloadDecl::function("string_to_int", vec![CelType::String], CelType::Int).with_impl(builtins::to_int)),
    );
    funcs.push(
        FunctionDecl::new("uint")
            .with_overload(OverloadDecl::function("uint_to_uint", vec![CelType::UInt], CelType::UInt).with_impl(builtins::to_uint))
            .with_overload(OverloadDecl::function("int_to_uint", vec![CelType::Int], CelType::UInt).with_impl(builtins::to_uint))
            .with_overload(OverloadDecl::function("double_to_uint", vec![CelType::Double], CelType::UInt).with_impl(builtins::to_uint))
            .with_overload(OverloadDecl::function("string_to_uint", vec![CelType::String], CelType::UInt).with_impl(builtins::to_uint)),
    );
    funcs.push(
        FunctionDecl::new("double")
            .with_overload(OverloadDecl::function("double_to_double", vec![CelType::Double], CelType::Double).with_impl(builtins::to_double))
            .with_overload(OverloadDecl::function("int_to_double", vec![CelType::Int], CelType::Double).with_impl(builtins::to_double))
            .with_overload(OverloadDecl::function("uint_to_double", vec![CelType::UInt], CelType::Double).with_impl(builtins::to_double))
            .with_overload(OverloadDecl::function("string_to_double", vec![CelType::String], CelType::Double).with_impl(builtins::to_double)),
    );
    funcs.push(
        FunctionDecl::new("string")
            .with_overload(OverloadDecl::function("string_to_string", vec![CelType::String], CelType::String).with_impl(builtins::to_string))
            .with_overload(OverloadDecl::function("bool_to_string", vec![CelType::Bool], CelType::String).with_impl(builtins::to_string))
            .with_overload(OverloadDecl::function("int_to_string", vec![CelType::Int], CelType::String).with_impl(builtins::to_string))
            .with_overload(OverloadDecl::function("uint_to_string", vec![CelType::UInt], CelType::String).with_impl(builtins::to_string))
            .with_overload(OverloadDecl::function("double_to_string", vec![CelType::Double], CelType::String).with_impl(builtins::to_string))
            .with_overload(OverloadDecl::function("bytes_to_string", vec![CelType::Bytes], CelType::String).with_impl(builtins::to_string)),
    );
    funcs.push(
        FunctionDecl::new("bytes")
            .with_overload(OverloadDecl::function("bytes_to_bytes", vec![CelType::Bytes], CelType::Bytes).with_impl(builtins::to_bytes))
            .with_overload(OverloadDecl::function("string_to_bytes", vec![CelType::String], CelType::Bytes).with_impl(builtins::to_bytes)),
    );
    funcs.push(
        FunctionDecl::new("bool")
            .with_overload(OverloadDecl::function("bool_to_bool", vec![CelType::Bool], CelType::Bool).with_impl(builtins::to_bool))
            .with_overload(OverloadDecl::function("string_to_bool", vec![CelType::String], CelType::Bool).with_impl(builtins::to_bool)),
    );
    funcs.push(
        FunctionDecl::new("dyn").with_overload(
            OverloadDecl::function("to_dyn", vec![t()], CelType::Dyn)
                .with_type_params(params(&["T"]))
                .with_impl(builtins::to_dyn),
        ),
    );
    funcs.push(
        FunctionDecl::new("type").with_overload(
            OverloadDecl::function("type", vec![t()], CelType::type_of(t()))
                .with_type_params(params(&["T"]))
                .with_impl(builtins::type_of),
        ),
    );

    // Size
    funcs.push(
        FunctionDecl::new("size")
            .with_overload(OverloadDecl::function("size_string", vec![CelType::String], CelType::Int).with_impl(builtins::size))
            .with_overload(OverloadDecl::function("size_bytes", vec![CelType::Bytes], CelType::Int).with_impl(builtins::size))
            .with_overload(
                OverloadDecl::function("size_list", vec![list_t()], CelType::Int)
                    .with_type_params(params(&["T"]))
                    .with_impl(builtins::size),
            )
            .with_overload(
                OverloadDecl::function("size_map", vec![map_kv()], CelType::Int)
                    .with_type_params(params(&["K", "V"]))
                    .with_impl(builtins::size),
            )
            .with_overload(OverloadDecl::method("string_size", vec![CelType::String], CelType::Int).with_impl(builtins::size))
            .with_overload(OverloadDecl::method("bytes_size", vec![CelType::Bytes], CelType::Int).with_impl(builtins::size))
            .with_overload(
                OverloadDecl::method("list_size", vec![list_t()], CelType::Int)
                    .with_type_params(params(&["T"]))
                    .with_impl(builtins::size),
            )
            .with_overload(
                OverloadDecl::method("map_size", vec![map_kv()], CelType::Int)
                    .with_type_params(params(&["K", "V"]))
                    .with_impl(builtins::size),
            ),
    );

    // Strings
    funcs.push(
        FunctionDecl::new("contains")
            .with_overload(OverloadDecl::method("string_contains_string", vec![CelType::String, CelType::String], CelType::Bool).with_impl(builtins::contains)),
    );
    funcs.push(
        FunctionDecl::new("startsWith")
            .with_overload(OverloadDecl::method("string_starts_with_string", vec![CelType::String, CelType::String], CelType::Bool).with_impl(builtins::starts_with)),
    );
    funcs.push(
        FunctionDecl::new("endsWith")
            .with_overload(OverloadDecl::method("string_ends_with_string", vec![CelType::String, CelType::String], CelType::Bool).with_impl(builtins::ends_with)),
    );
    funcs.push(
        FunctionDecl::new("matches")
            .with_overload(OverloadDecl::function("matches_string", vec![CelType::String, CelType::String], CelType::Bool).with_impl(builtins::matches))
            .with_overload(OverloadDecl::method("string_matches_string", vec![CelType::String, CelType::String], CelType::Bool).with_impl(builtins::matches)),
    );

    funcs
}

/// Identifiers naming the built-in types, usable as values: `type(x) == int`.
pub fn type_constants() -> Vec<VariableDecl> {
    [
        ("bool", CelType::Bool),
        ("int", CelType::Int),
        ("uint", CelType::UInt),
        ("double", CelType::Double),
        ("string", CelType::String),
        ("bytes", CelType::Bytes),
        ("list", CelType::list(CelType::Dyn)),
        ("map", CelType::map(CelType::Dyn, CelType::Dyn)),
        ("null_type", CelType::Null),
        ("type", CelType::type_of(CelType::Dyn)),
        ("dyn", CelType::Dyn),
    ]
    .into_iter()
    .map(|(name, cel_type)| {
        VariableDecl::constant(
            name,
            CelType::type_of(cel_type),
            Value::Type(TypeValue::new(name)),
        )
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn overload_ids_are_unique() {
        let mut seen = HashSet::new();
        for func in STANDARD_LIBRARY.iter() {
            for overload in &func.overloads {
                assert!(seen.insert(overload.id.clone()), "duplicate {}", overload.id);
            }
        }
    }

    #[test]
    fn short_circuit_operators_have_no_implementation() {
        for func in STANDARD_LIBRARY.iter() {
            let expected = !matches!(func.name.as_str(), "_&&_" | "_||_" | "_?_:_");
            for overload in &func.overloads {
                assert_eq!(overload.implementation.is_some(), expected, "{}", overload.id);
            }
        }
    }

    #[test]
    fn cross_numeric_ordering_is_declared() {
        let less = STANDARD_LIBRARY
            .iter()
            .find(|f| f.name == "_<_")
            .map(|f| f.overloads.len());
        assert_eq!(less, Some(ORDERED.len()));
    }

    #[test]
    fn type_constants_are_type_values() {
        let int = type_constants().into_iter().find(|v| v.name == "int");
        assert_eq!(
            int.map(|v| (v.cel_type, v.const_value)),
            Some((CelType::type_of(CelType::Int), Some(Value::new_type("int"))))
        );
    }
}
