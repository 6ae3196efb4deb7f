//! String extension library.
//!
//! - `charAt(index)` - character at a code point index, `""` at the end
//! - `indexOf(sub)` / `indexOf(sub, offset)` - first occurrence, or -1
//! - `lastIndexOf(sub)` / `lastIndexOf(sub, offset)` - last occurrence, or -1
//! - `lowerAscii()` / `upperAscii()` - ASCII-only case mapping
//! - `replace(old, new)` / `replace(old, new, n)` - replace all or the first n
//! - `split(sep)` / `split(sep, n)` - split into at most n parts
//! - `substring(start)` / `substring(start, end)` - code point range
//! - `trim()` - strip leading and trailing Unicode whitespace
//! - `join()` / `join(sep)` - concatenate a list of strings
//!
//! Indices count Unicode code points, not bytes.

use crate::eval::{EvalError, EvalErrorKind, Value};
use crate::types::{CelType, FunctionDecl, OverloadDecl};

type Result = std::result::Result<Value, EvalError>;

fn codepoint_len(s: &str) -> usize {
    s.chars().count()
}

/// Byte offset of a code point index; `len` maps to the end of the string.
fn byte_offset(s: &str, index: usize) -> usize {
    s.char_indices().nth(index).map_or(s.len(), |(b, _)| b)
}

/// Validate `index` as a position in `0..=len`.
fn position(s: &str, index: i64) -> std::result::Result<usize, EvalError> {
    let len = codepoint_len(s);
    usize::try_from(index)
        .ok()
        .filter(|i| *i <= len)
        .ok_or_else(|| EvalError::index_out_of_range(index, len))
}

fn to_index(index: usize) -> Value {
    Value::Int(i64::try_from(index).unwrap_or(i64::MAX))
}

fn string_list<'a>(parts: impl Iterator<Item = &'a str>) -> Value {
    Value::list(parts.map(Value::from).collect::<Vec<_>>())
}

fn char_at(args: &[Value]) -> Result {
    match args {
        [Value::String(s), Value::Int(index)] => {
            let index = position(s, *index)?;
            Ok(Value::from(
                s.chars().nth(index).map(String::from).unwrap_or_default(),
            ))
        }
        _ => Err(EvalError::no_such_overload("charAt", args)),
    }
}

fn find_from(s: &str, sub: &str, offset: usize) -> Value {
    if sub.is_empty() {
        return to_index(offset);
    }
    s.char_indices()
        .enumerate()
        .skip(offset)
        .find(|(_, (b, _))| s[*b..].starts_with(sub))
        .map_or(Value::Int(-1), |(i, _)| to_index(i))
}

fn rfind_from(s: &str, sub: &str, offset: usize) -> Value {
    if sub.is_empty() {
        return to_index(offset);
    }
    s.char_indices()
        .enumerate()
        .take(offset.saturating_add(1))
        .filter(|(_, (b, _))| s[*b..].starts_with(sub))
        .last()
        .map_or(Value::Int(-1), |(i, _)| to_index(i))
}

fn index_of(args: &[Value]) -> Result {
    match args {
        [Value::String(s), Value::String(sub)] => Ok(find_from(s, sub, 0)),
        [Value::String(s), Value::String(sub), Value::Int(offset)] => {
            Ok(find_from(s, sub, position(s, *offset)?))
        }
        _ => Err(EvalError::no_such_overload("indexOf", args)),
    }
}

fn last_index_of(args: &[Value]) -> Result {
    match args {
        [Value::String(s), Value::String(sub)] => Ok(rfind_from(s, sub, codepoint_len(s))),
        [Value::String(s), Value::String(sub), Value::Int(offset)] => {
            Ok(rfind_from(s, sub, position(s, *offset)?))
        }
        _ => Err(EvalError::no_such_overload("lastIndexOf", args)),
    }
}

fn lower_ascii(args: &[Value]) -> Result {
    match args {
        [Value::String(s)] => Ok(Value::from(s.to_ascii_lowercase())),
        _ => Err(EvalError::no_such_overload("lowerAscii", args)),
    }
}

fn upper_ascii(args: &[Value]) -> Result {
    match args {
        [Value::String(s)] => Ok(Value::from(s.to_ascii_uppercase())),
        _ => Err(EvalError::no_such_overload("upperAscii", args)),
    }
}

fn replace(args: &[Value]) -> Result {
    match args {
        [Value::String(s), Value::String(old), Value::String(new)] => {
            Ok(Value::from(s.replace(old.as_ref(), new)))
        }
        // A negative count replaces every occurrence.
        [Value::String(s), Value::String(old), Value::String(new), Value::Int(n)] => {
            Ok(Value::from(match usize::try_from(*n) {
                Ok(n) => s.replacen(old.as_ref(), new, n),
                Err(_) => s.replace(old.as_ref(), new),
            }))
        }
        _ => Err(EvalError::no_such_overload("replace", args)),
    }
}

/// Split into at most `limit` parts, the last holding the unsplit rest. An
/// empty separator splits between code points.
fn split_n(s: &str, sep: &str, limit: Option<usize>) -> Value {
    match (sep.is_empty(), limit) {
        (_, Some(0)) => Value::list(Vec::<Value>::new()),
        (true, None) => string_list(s.char_indices().map(|(b, c)| &s[b..b + c.len_utf8()])),
        (true, Some(limit)) => {
            let head = limit - 1;
            let rest = byte_offset(s, head);
            let mut parts: Vec<&str> = s
                .char_indices()
                .take(head)
                .map(|(b, c)| &s[b..b + c.len_utf8()])
                .collect();
            if rest < s.len() {
                parts.push(&s[rest..]);
            }
            string_list(parts.into_iter())
        }
        (false, None) => string_list(s.split(sep)),
        (false, Some(limit)) => string_list(s.splitn(limit, sep)),
    }
}

fn split(args: &[Value]) -> Result {
    match args {
        [Value::String(s), Value::String(sep)] => Ok(split_n(s, sep, None)),
        [Value::String(s), Value::String(sep), Value::Int(n)] => {
            Ok(split_n(s, sep, usize::try_from(*n).ok()))
        }
        _ => Err(EvalError::no_such_overload("split", args)),
    }
}

fn substring(args: &[Value]) -> Result {
    match args {
        [Value::String(s), Value::Int(start)] => {
            let start = byte_offset(s, position(s, *start)?);
            Ok(Value::from(&s[start..]))
        }
        [Value::String(s), Value::Int(start), Value::Int(end)] => {
            let (first, last) = (position(s, *start)?, position(s, *end)?);
            if first > last {
                return Err(EvalError::new(
                    EvalErrorKind::InvalidArgument,
                    format!("invalid substring range. start: {}, end: {}", first, last),
                ));
            }
            Ok(Value::from(&s[byte_offset(s, first)..byte_offset(s, last)]))
        }
        _ => Err(EvalError::no_such_overload("substring", args)),
    }
}

fn trim(args: &[Value]) -> Result {
    match args {
        [Value::String(s)] => Ok(Value::from(s.trim())),
        _ => Err(EvalError::no_such_overload("trim", args)),
    }
}

fn join(args: &[Value]) -> Result {
    let (list, sep) = match args {
        [Value::List(list)] => (list, ""),
        [Value::List(list), Value::String(sep)] => (list, sep.as_ref()),
        _ => return Err(EvalError::no_such_overload("join", args)),
    };
    let parts = list
        .iter()
        .map(|item| {
            item.as_string().ok_or_else(|| {
                EvalError::invalid_argument(format!(
                    "join() requires a list of strings, found '{}'",
                    item.type_name()
                ))
            })
        })
        .collect::<std::result::Result<Vec<&str>, EvalError>>()?;
    Ok(Value::from(parts.join(sep)))
}

/// Declarations and implementations of the string extension.
pub fn string_extension() -> Vec<FunctionDecl> {
    use CelType::{Int, String as Str};

    vec![
        FunctionDecl::new("charAt").with_overload(
            OverloadDecl::method("string_char_at_int", vec![Str, Int], Str).with_impl(char_at),
        ),
        FunctionDecl::new("indexOf")
            .with_overload(
                OverloadDecl::method("string_index_of_string", vec![Str, Str], Int)
                    .with_impl(index_of),
            )
            .with_overload(
                OverloadDecl::method("string_index_of_string_int", vec![Str, Str, Int], Int)
                    .with_impl(index_of),
            ),
        FunctionDecl::new("lastIndexOf")
            .with_overload(
                OverloadDecl::method("string_last_index_of_string", vec![Str, Str], Int)
                    .with_impl(last_index_of),
            )
            .with_overload(
                OverloadDecl::method("string_last_index_of_string_int", vec![Str, Str, Int], Int)
                    .with_impl(last_index_of),
            ),
        FunctionDecl::new("lowerAscii").with_overload(
            OverloadDecl::method("string_lower_ascii", vec![Str], Str).with_impl(lower_ascii),
        ),
        FunctionDecl::new("upperAscii").with_overload(
            OverloadDecl::method("string_upper_ascii", vec![Str], Str).with_impl(upper_ascii),
        ),
        FunctionDecl::new("replace")
            .with_overload(
                OverloadDecl::method("string_replace_string_string", vec![Str, Str, Str], Str)
                    .with_impl(replace),
            )
            .with_overload(
                OverloadDecl::method(
                    "string_replace_string_string_int",
                    vec![Str, Str, Str, Int],
                    Str,
                )
                .with_impl(replace),
            ),
        FunctionDecl::new("split")
            .with_overload(
                OverloadDecl::method("string_split_string", vec![Str, Str], CelType::list(Str))
                    .with_impl(split),
            )
            .with_overload(
                OverloadDecl::method(
                    "string_split_string_int",
                    vec![Str, Str, Int],
                    CelType::list(Str),
                )
                .with_impl(split),
            ),
        FunctionDecl::new("substring")
            .with_overload(
                OverloadDecl::method("string_substring_int", vec![Str, Int], Str)
                    .with_impl(substring),
            )
            .with_overload(
                OverloadDecl::method("string_substring_int_int", vec![Str, Int, Int], Str)
                    .with_impl(substring),
            ),
        FunctionDecl::new("trim").with_overload(
            OverloadDecl::method("string_trim", vec![Str], Str).with_impl(trim),
        ),
        FunctionDecl::new("join")
            .with_overload(
                OverloadDecl::method("list_string_join", vec![CelType::list(Str)], Str)
                    .with_impl(join),
            )
            .with_overload(
                OverloadDecl::method("list_string_join_string", vec![CelType::list(Str), Str], Str)
                    .with_impl(join),
            ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(value: &str) -> Value {
        Value::from(value)
    }

    fn strings(values: &[&str]) -> Value {
        Value::list(values.iter().map(|v| Value::from(*v)).collect::<Vec<_>>())
    }

    fn kind(result: Result) -> Option<EvalErrorKind> {
        result.err().map(|e| e.kind)
    }

    #[test]
    fn declares_every_function() {
        let names: Vec<String> = string_extension().into_iter().map(|f| f.name).collect();
        assert_eq!(
            names,
            [
                "charAt",
                "indexOf",
                "lastIndexOf",
                "lowerAscii",
                "upperAscii",
                "replace",
                "split",
                "substring",
                "trim",
                "join"
            ]
        );
        assert!(string_extension()
            .iter()
            .flat_map(|f| &f.overloads)
            .all(|o| o.is_member && o.implementation.is_some()));
    }

    #[test]
    fn char_at_counts_code_points() {
        assert_eq!(char_at(&[s("héllo"), Value::Int(1)]), Ok(s("é")));
        assert_eq!(char_at(&[s("abc"), Value::Int(3)]), Ok(s("")));
        assert_eq!(
            kind(char_at(&[s("abc"), Value::Int(4)])),
            Some(EvalErrorKind::IndexOutOfRange)
        );
        assert_eq!(
            kind(char_at(&[s("abc"), Value::Int(-1)])),
            Some(EvalErrorKind::IndexOutOfRange)
        );
    }

    #[test]
    fn index_of() {
        assert_eq!(super::index_of(&[s("hello"), s("l")]), Ok(Value::Int(2)));
        assert_eq!(super::index_of(&[s("hello"), s("z")]), Ok(Value::Int(-1)));
        assert_eq!(super::index_of(&[s("hello"), s("")]), Ok(Value::Int(0)));
        assert_eq!(super::index_of(&[s("héllo"), s("l"), Value::Int(3)]), Ok(Value::Int(3)));
        assert_eq!(super::index_of(&[s("abc"), s(""), Value::Int(3)]), Ok(Value::Int(3)));
        assert_eq!(
            kind(super::index_of(&[s("abc"), s("a"), Value::Int(4)])),
            Some(EvalErrorKind::IndexOutOfRange)
        );
    }

    #[test]
    fn last_index_of_searches_backwards() {
        assert_eq!(last_index_of(&[s("hello"), s("l")]), Ok(Value::Int(3)));
        assert_eq!(last_index_of(&[s("aaaa"), s("aa")]), Ok(Value::Int(2)));
        assert_eq!(last_index_of(&[s("aaaa"), s("aa"), Value::Int(1)]), Ok(Value::Int(1)));
        assert_eq!(last_index_of(&[s("abc"), s("")]), Ok(Value::Int(3)));
        assert_eq!(last_index_of(&[s("abc"), s("z")]), Ok(Value::Int(-1)));
    }

    #[test]
    fn ascii_case_mapping_leaves_other_characters() {
        assert_eq!(lower_ascii(&[s("HÉllo")]), Ok(s("hÉllo")));
        assert_eq!(upper_ascii(&[s("héllo")]), Ok(s("HéLLO")));
    }

    #[test]
    fn replace_with_count() {
        assert_eq!(super::replace(&[s("a.b.c"), s("."), s("-")]), Ok(s("a-b-c")));
        assert_eq!(super::replace(&[s("a.b.c"), s("."), s("-"), Value::Int(1)]), Ok(s("a-b.c")));
        assert_eq!(super::replace(&[s("a.b.c"), s("."), s("-"), Value::Int(0)]), Ok(s("a.b.c")));
        assert_eq!(super::replace(&[s("a.b.c"), s("."), s("-"), Value::Int(-1)]), Ok(s("a-b-c")));
    }

    #[test]
    fn split_with_limit() {
        assert_eq!(split(&[s("a,b,c"), s(",")]), Ok(strings(&["a", "b", "c"])));
        assert_eq!(split(&[s("a,b,c"), s(","), Value::Int(2)]), Ok(strings(&["a", "b,c"])));
        assert_eq!(split(&[s("a,b,c"), s(","), Value::Int(0)]), Ok(strings(&[])));
        assert_eq!(split(&[s("a,b,c"), s(","), Value::Int(-1)]), Ok(strings(&["a", "b", "c"])));
        assert_eq!(split(&[s("héy"), s("")]), Ok(strings(&["h", "é", "y"])));
        assert_eq!(split(&[s("héy"), s(""), Value::Int(2)]), Ok(strings(&["h", "éy"])));
    }

    #[test]
    fn substring_ranges() {
        assert_eq!(substring(&[s("héllo"), Value::Int(1)]), Ok(s("éllo")));
        assert_eq!(substring(&[s("héllo"), Value::Int(1), Value::Int(3)]), Ok(s("él")));
        assert_eq!(substring(&[s("abc"), Value::Int(3)]), Ok(s("")));
        assert_eq!(
            kind(substring(&[s("abc"), Value::Int(2), Value::Int(1)])),
            Some(EvalErrorKind::InvalidArgument)
        );
        assert_eq!(
            kind(substring(&[s("abc"), Value::Int(0), Value::Int(9)])),
            Some(EvalErrorKind::IndexOutOfRange)
        );
    }

    #[test]
    fn trim_and_join() {
        assert_eq!(trim(&[s(" \t hi \n")]), Ok(s("hi")));
        assert_eq!(join(&[strings(&["a", "b"])]), Ok(s("ab")));
        assert_eq!(join(&[strings(&["a", "b"]), s(", ")]), Ok(s("a, b")));
        assert_eq!(
            kind(join(&[Value::list(vec![Value::Int(1)])])),
            Some(EvalErrorKind::InvalidArgument)
        );
    }
}
