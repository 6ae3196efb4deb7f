//! Runtime implementations of the standard library.
//!
//! Each function takes the evaluated arguments (receiver first for member
//! overloads). Argument shapes no overload accepts are `NoSuchOverload`.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use regex::Regex;

use super::value::format_double;
use super::{EvalError, MapKey, Value};

type Result = std::result::Result<Value, EvalError>;

pub fn add(args: &[Value]) -> Result {
    match args {
        [Value::Int(a), Value::Int(b)] => a
            .checked_add(*b)
            .map(Value::Int)
            .ok_or_else(|| EvalError::overflow("integer addition")),
        [Value::UInt(a), Value::UInt(b)] => a
            .checked_add(*b)
            .map(Value::UInt)
            .ok_or_else(|| EvalError::overflow("unsigned addition")),
        [Value::Double(a), Value::Double(b)] => Ok(Value::Double(a + b)),
        [Value::String(a), Value::String(b)] => Ok(Value::from(format!("{}{}", a, b))),
        [Value::Bytes(a), Value::Bytes(b)] => Ok(Value::bytes([&a[..], &b[..]].concat())),
        [Value::List(a), Value::List(b)] => {
            let mut items = Vec::with_capacity(a.len() + b.len());
            items.extend(a.iter().cloned());
            items.extend(b.iter().cloned());
            Ok(Value::from(items))
        }
        _ => Err(EvalError::no_such_overload("_+_", args)),
    }
}

pub fn subtract(args: &[Value]) -> Result {
    match args {
        [Value::Int(a), Value::Int(b)] => a
            .checked_sub(*b)
            .map(Value::Int)
            .ok_or_else(|| EvalError::overflow("integer subtraction")),
        [Value::UInt(a), Value::UInt(b)] => a
            .checked_sub(*b)
            .map(Value::UInt)
            .ok_or_else(|| EvalError::overflow("unsigned subtraction")),
        [Value::Double(a), Value::Double(b)] => Ok(Value::Double(a - b)),
        _ => Err(EvalError::no_such_overload("_-_", args)),
    }
}

pub fn multiply(args: &[Value]) -> Result {
    match args {
        [Value::Int(a), Value::Int(b)] => a
            .checked_mul(*b)
            .map(Value::Int)
            .ok_or_else(|| EvalError::overflow("integer multiplication")),
        [Value::UInt(a), Value::UInt(b)] => a
            .checked_mul(*b)
            .map(Value::UInt)
            .ok_or_else(|| EvalError::overflow("unsigned multiplication")),
        [Value::Double(a), Value::Double(b)] => Ok(Value::Double(a * b)),
        _ => Err(EvalError::no_such_overload("_*_", args)),
    }
}

pub fn divide(args: &[Value]) -> Result {
    match args {
        [Value::Int(_), Value::Int(0)] | [Value::UInt(_), Value::UInt(0)] => {
            Err(EvalError::division_by_zero())
        }
        [Value::Int(a), Value::Int(b)] => a
            .checked_div(*b)
            .map(Value::Int)
            .ok_or_else(|| EvalError::overflow("integer division")),
        [Value::UInt(a), Value::UInt(b)] => Ok(Value::UInt(a / b)),
        [Value::Double(a), Value::Double(b)] => Ok(Value::Double(a / b)),
        _ => Err(EvalError::no_such_overload("_/_", args)),
    }
}

pub fn modulo(args: &[Value]) -> Result {
    match args {
        [Value::Int(_), Value::Int(0)] | [Value::UInt(_), Value::UInt(0)] => {
            Err(EvalError::modulus_by_zero())
        }
        [Value::Int(a), Value::Int(b)] => a
            .checked_rem(*b)
            .map(Value::Int)
            .ok_or_else(|| EvalError::overflow("integer modulus")),
        [Value::UInt(a), Value::UInt(b)] => Ok(Value::UInt(a % b)),
        _ => Err(EvalError::no_such_overload("_%_", args)),
    }
}

pub fn negate(args: &[Value]) -> Result {
    match args {
        [Value::Int(a)] => a
            .checked_neg()
            .map(Value::Int)
            .ok_or_else(|| EvalError::overflow("integer negation")),
        [Value::Double(a)] => Ok(Value::Double(-a)),
        _ => Err(EvalError::no_such_overload("-_", args)),
    }
}

pub fn not(args: &[Value]) -> Result {
    match args {
        [Value::Bool(b)] => Ok(Value::Bool(!b)),
        _ => Err(EvalError::no_such_overload("!_", args)),
    }
}

pub fn equals(args: &[Value]) -> Result {
    match args {
        [a, b] => Ok(Value::Bool(a.equals(b))),
        _ => Err(EvalError::no_such_overload("_==_", args)),
    }
}

pub fn not_equals(args: &[Value]) -> Result {
    match args {
        [a, b] => Ok(Value::Bool(!a.equals(b))),
        _ => Err(EvalError::no_such_overload("_!=_", args)),
    }
}

fn ordering(function: &str, args: &[Value], accept: fn(Ordering) -> bool) -> Result {
    match args {
        // NaN compares false against everything.
        [Value::Double(d), _] | [_, Value::Double(d)] if d.is_nan() => {
            if args.iter().all(|a| matches!(a, Value::Int(_) | Value::UInt(_) | Value::Double(_))) {
                Ok(Value::Bool(false))
            } else {
                Err(EvalError::no_such_overload(function, args))
            }
        }
        [a, b] => a
            .compare(b)
            .map(|o| Value::Bool(accept(o)))
            .ok_or_else(|| EvalError::no_such_overload(function, args)),
        _ => Err(EvalError::no_such_overload(function, args)),
    }
}

pub fn less(args: &[Value]) -> Result {
    ordering("_<_", args, Ordering::is_lt)
}

pub fn less_equals(args: &[Value]) -> Result {
    ordering("_<=_", args, Ordering::is_le)
}

pub fn greater(args: &[Value]) -> Result {
    ordering("_>_", args, Ordering::is_gt)
}

pub fn greater_equals(args: &[Value]) -> Result {
    ordering("_>=_", args, Ordering::is_ge)
}

pub fn in_collection(args: &[Value]) -> Result {
    match args {
        [needle, Value::List(items)] => Ok(Value::Bool(items.iter().any(|v| v.equals(needle)))),
        [needle, Value::Map(map)] => Ok(Value::Bool(
            MapKey::for_lookup(needle).is_some_and(|k| map.contains_key(&k)),
        )),
        _ => Err(EvalError::no_such_overload("@in", args)),
    }
}

/// `container[key]` for lists and maps.
pub fn index(args: &[Value]) -> Result {
    match args {
        [Value::List(items), key] => {
            let position = match key {
                Value::Int(i) => Some(*i),
                Value::UInt(u) => i64::try_from(*u).ok(),
                Value::Double(d) if d.fract() == 0.0 => Some(*d as i64),
                _ => return Err(EvalError::no_such_overload("_[_]", args)),
            };
            position
                .and_then(|i| usize::try_from(i).ok())
                .and_then(|i| items.get(i))
                .cloned()
                .ok_or_else(|| EvalError::index_out_of_range(key, items.len()))
        }
        [Value::Map(map), key] => {
            let lookup = MapKey::for_lookup(key)
                .ok_or_else(|| EvalError::no_such_overload("_[_]", args))?;
            map.get(&lookup)
                .cloned()
                .ok_or_else(|| EvalError::no_such_key(key))
        }
        _ => Err(EvalError::no_such_overload("_[_]", args)),
    }
}

pub fn size(args: &[Value]) -> Result {
    let len = match args {
        [Value::String(s)] => s.chars().count(),
        [Value::Bytes(b)] => b.len(),
        [Value::List(l)] => l.len(),
        [Value::Map(m)] => m.len(),
        _ => return Err(EvalError::no_such_overload("size", args)),
    };
    i64::try_from(len)
        .map(Value::Int)
        .map_err(|_| EvalError::overflow("size"))
}

fn string_predicate(function: &str, args: &[Value], test: fn(&str, &str) -> bool) -> Result {
    match args {
        [Value::String(s), Value::String(arg)] => Ok(Value::Bool(test(s, arg))),
        _ => Err(EvalError::no_such_overload(function, args)),
    }
}

pub fn contains(args: &[Value]) -> Result {
    string_predicate("contains", args, |s, sub| s.contains(sub))
}

pub fn starts_with(args: &[Value]) -> Result {
    string_predicate("startsWith", args, |s, prefix| s.starts_with(prefix))
}

pub fn ends_with(args: &[Value]) -> Result {
    string_predicate("endsWith", args, |s, suffix| s.ends_with(suffix))
}

/// Compiled patterns kept per thread, cleared once full.
const REGEX_CACHE_CAPACITY: usize = 64;

thread_local! {
    static REGEX_CACHE: RefCell<HashMap<Arc<str>, Regex>> = RefCell::new(HashMap::new());
}

/// Compile `pattern`, reusing an earlier compilation on this thread.
fn cached_regex(pattern: &Arc<str>) -> std::result::Result<Regex, EvalError> {
    REGEX_CACHE.with(|cache| {
        if let Some(re) = cache.borrow().get(pattern) {
            return Ok(re.clone());
        }
        let re = Regex::new(pattern).map_err(|e| {
            EvalError::invalid_argument(format!("invalid regex '{}': {}", pattern, e))
        })?;
        let mut cache = cache.borrow_mut();
        if cache.len() >= REGEX_CACHE_CAPACITY {
            tracing::trace!(capacity = REGEX_CACHE_CAPACITY, "clearing regex cache");
            cache.clear();
        }
        cache.insert(pattern.clone(), re.clone());
        Ok(re)
    })
}

pub fn matches(args: &[Value]) -> Result {
    match args {
        [Value::String(s), Value::String(pattern)] => {
            cached_regex(pattern).map(|re| Value::Bool(re.is_match(s)))
        }
        _ => Err(EvalError::no_such_overload("matches", args)),
    }
}

pub fn to_int(args: &[Value]) -> Result {
    match args {
        [Value::Int(i)] => Ok(Value::Int(*i)),
        [Value::UInt(u)] => i64::try_from(*u)
            .map(Value::Int)
            .map_err(|_| EvalError::overflow("uint to int conversion")),
        // Truncates toward zero; the range check keeps the cast exact.
        [Value::Double(d)] if *d >= -9_223_372_036_854_775_808.0 && *d < 9_223_372_036_854_775_808.0 => {
            Ok(Value::Int(*d as i64))
        }
        [Value::Double(_)] => Err(EvalError::overflow("double to int conversion")),
        [Value::String(s)] => s.parse::<i64>().map(Value::Int).map_err(|_| {
            EvalError::invalid_argument(format!("cannot convert string {:?} to int", s))
        }),
        _ => Err(EvalError::no_such_overload("int", args)),
    }
}

pub fn to_uint(args: &[Value]) -> Result {
    match args {
        [Value::UInt(u)] => Ok(Value::UInt(*u)),
        [Value::Int(i)] => u64::try_from(*i)
            .map(Value::UInt)
            .map_err(|_| EvalError::overflow("int to uint conversion")),
        [Value::Double(d)] if *d > -1.0 && *d < 18_446_744_073_709_551_616.0 => {
            Ok(Value::UInt(*d as u64))
        }
        [Value::Double(_)] => Err(EvalError::overflow("double to uint conversion")),
        [Value::String(s)] => s.parse::<u64>().map(Value::UInt).map_err(|_| {
            EvalError::invalid_argument(format!("cannot convert string {:?} to uint", s))
        }),
        _ => Err(EvalError::no_such_overload("uint", args)),
    }
}

pub fn to_double(args: &[Value]) -> Result {
    match args {
        [Value::Double(d)] => Ok(Value::Double(*d)),
        [Value::Int(i)] => Ok(Value::Double(*i as f64)),
        [Value::UInt(u)] => Ok(Value::Double(*u as f64)),
        [Value::String(s)] => s.parse::<f64>().map(Value::Double).map_err(|_| {
            EvalError::invalid_argument(format!("cannot convert string {:?} to double", s))
        }),
        _ => Err(EvalError::no_such_overload("double", args)),
    }
}

pub fn to_string(args: &[Value]) -> Result {
    match args {
        [Value::String(s)] => Ok(Value::String(s.clone())),
        [Value::Bool(b)] => Ok(Value::from(b.to_string())),
        [Value::Int(i)] => Ok(Value::from(i.to_string())),
        [Value::UInt(u)] => Ok(Value::from(u.to_string())),
        [Value::Double(d)] => Ok(Value::from(format_double(*d))),
        [Value::Bytes(b)] => std::str::from_utf8(b)
            .map(Value::from)
            .map_err(|_| EvalError::invalid_argument("bytes are not valid UTF-8")),
        _ => Err(EvalError::no_such_overload("string", args)),
    }
}

pub fn to_bytes(args: &[Value]) -> Result {
    match args {
        [Value::Bytes(b)] => Ok(Value::Bytes(b.clone())),
        [Value::String(s)] => Ok(Value::Bytes(Arc::from(s.as_bytes()))),
        _ => Err(EvalError::no_such_overload("bytes", args)),
    }
}

pub fn to_bool(args: &[Value]) -> Result {
    match args {
        [Value::Bool(b)] => Ok(Value::Bool(*b)),
        [Value::String(s)] => match s.as_ref() {
            "true" | "True" | "TRUE" | "t" | "1" => Ok(Value::Bool(true)),
            "false" | "False" | "FALSE" | "f" | "0" => Ok(Value::Bool(false)),
            _ => Err(EvalError::invalid_argument(format!(
                "cannot convert string {:?} to bool",
                s
            ))),
        },
        _ => Err(EvalError::no_such_overload("bool", args)),
    }
}

pub fn to_dyn(args: &[Value]) -> Result {
    match args {
        [value] => Ok(value.clone()),
        _ => Err(EvalError::no_such_overload("dyn", args)),
    }
}

pub fn type_of(args: &[Value]) -> Result {
    match args {
        [value] => Ok(Value::Type(value.type_value())),
        _ => Err(EvalError::no_such_overload("type", args)),
    }
}
