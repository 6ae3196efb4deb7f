//! Runtime values.
//!
//! `Value` is a closed set of tags. Composite values share their contents
//! through `Arc`, so cloning is cheap and values are never mutated once built.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use super::EvalError;
use crate::types::{CelType, MessageAccessor};

/// A runtime value.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Double(f64),
    String(Arc<str>),
    Bytes(Arc<[u8]>),
    List(Arc<[Value]>),
    Map(Arc<ValueMap>),
    /// Structured data supplied by the embedder.
    Message(Arc<dyn MessageAccessor>),
    /// A type used as a value, e.g. the result of `type(1)`.
    Type(TypeValue),
    /// Placeholder for a result that depends on unknown attributes.
    Unknown(Arc<UnknownSet>),
    /// An evaluation error travelling through the expression tree.
    Error(Arc<EvalError>),
}

/// Runtime representation of a type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeValue {
    pub name: Arc<str>,
}

impl TypeValue {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self { name: name.into() }
    }

    /// The runtime type of values of `cel_type`.
    pub fn of(cel_type: &CelType) -> Self {
        Self::new(cel_type.runtime_name())
    }
}

/// Ids of the expression nodes whose values were unknown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnknownSet {
    ids: BTreeSet<i64>,
}

impl UnknownSet {
    pub fn new(id: i64) -> Self {
        Self {
            ids: BTreeSet::from([id]),
        }
    }

    /// Union of both sets.
    pub fn merge(&self, other: &UnknownSet) -> Self {
        Self {
            ids: self.ids.union(&other.ids).copied().collect(),
        }
    }

    pub fn contains(&self, id: i64) -> bool {
        self.ids.contains(&id)
    }

    pub fn ids(&self) -> Vec<i64> {
        self.ids.iter().copied().collect()
    }
}

/// A map key. Only bool, int, uint and string values can be keys.
///
/// Int and uint keys with the same numeric value are the same key.
#[derive(Debug, Clone)]
pub enum MapKey {
    Bool(bool),
    Int(i64),
    UInt(u64),
    String(Arc<str>),
}

impl MapKey {
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(MapKey::Bool(*b)),
            Value::Int(i) => Some(MapKey::Int(*i)),
            Value::UInt(u) => Some(MapKey::UInt(*u)),
            Value::String(s) => Some(MapKey::String(s.clone())),
            _ => None,
        }
    }

    /// Key used to look up `value`. Doubles with an integral value find the
    /// matching int or uint key.
    pub fn for_lookup(value: &Value) -> Option<Self> {
        match value {
            Value::Double(d) if d.fract() == 0.0 && *d >= i64::MIN as f64 && *d < i64::MAX as f64 => {
                Some(MapKey::Int(*d as i64))
            }
            Value::Double(d) if d.fract() == 0.0 && *d >= 0.0 && *d < u64::MAX as f64 => {
                Some(MapKey::UInt(*d as u64))
            }
            other => Self::from_value(other),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            MapKey::Bool(b) => Value::Bool(*b),
            MapKey::Int(i) => Value::Int(*i),
            MapKey::UInt(u) => Value::UInt(*u),
            MapKey::String(s) => Value::String(s.clone()),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            MapKey::Bool(_) => 0,
            MapKey::Int(_) | MapKey::UInt(_) => 1,
            MapKey::String(_) => 2,
        }
    }
}

impl Ord for MapKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (MapKey::Bool(a), MapKey::Bool(b)) => a.cmp(b),
            (MapKey::Int(a), MapKey::Int(b)) => a.cmp(b),
            (MapKey::UInt(a), MapKey::UInt(b)) => a.cmp(b),
            (MapKey::Int(a), MapKey::UInt(b)) => compare_int_uint(*a, *b),
            (MapKey::UInt(a), MapKey::Int(b)) => compare_int_uint(*b, *a).reverse(),
            (MapKey::String(a), MapKey::String(b)) => a.cmp(b),
            (a, b) => a.rank().cmp(&b.rank()),
        }
    }
}

impl PartialOrd for MapKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for MapKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for MapKey {}

impl fmt::Display for MapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_value())
    }
}

impl From<&str> for MapKey {
    fn from(s: &str) -> Self {
        MapKey::String(Arc::from(s))
    }
}

impl From<i64> for MapKey {
    fn from(i: i64) -> Self {
        MapKey::Int(i)
    }
}

/// Map contents, iterated in key order.
#[derive(Debug, Clone, Default)]
pub struct ValueMap {
    entries: BTreeMap<MapKey, Value>,
}

impl ValueMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: impl IntoIterator<Item = (MapKey, Value)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    pub fn get(&self, key: &MapKey) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Insert an entry, returning the previous value for an equal key.
    pub fn insert(&mut self, key: MapKey, value: Value) -> Option<Value> {
        self.entries.insert(key, value)
    }

    pub fn contains_key(&self, key: &MapKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MapKey, &Value)> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &MapKey> {
        self.entries.keys()
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.entries.values()
    }
}

impl Value {
    pub fn string(s: impl Into<Arc<str>>) -> Self {
        Value::String(s.into())
    }

    pub fn bytes(b: impl Into<Arc<[u8]>>) -> Self {
        Value::Bytes(b.into())
    }

    pub fn list(elements: impl Into<Arc<[Value]>>) -> Self {
        Value::List(elements.into())
    }

    pub fn map(entries: impl IntoIterator<Item = (MapKey, Value)>) -> Self {
        Value::Map(Arc::new(ValueMap::from_entries(entries)))
    }

    pub fn message(message: impl MessageAccessor + 'static) -> Self {
        Value::Message(Arc::new(message))
    }

    pub fn new_type(name: impl Into<Arc<str>>) -> Self {
        Value::Type(TypeValue::new(name))
    }

    pub fn unknown(node_id: i64) -> Self {
        Value::Unknown(Arc::new(UnknownSet::new(node_id)))
    }

    pub fn error(err: EvalError) -> Self {
        Value::Error(Arc::new(err))
    }

    /// Zero value of a declared type: `false`, `0`, `""`, empty collections,
    /// and `null` for everything else.
    pub fn zero_of(cel_type: &CelType) -> Self {
        match cel_type {
            CelType::Bool => Value::Bool(false),
            CelType::Int => Value::Int(0),
            CelType::UInt => Value::UInt(0),
            CelType::Double => Value::Double(0.0),
            CelType::String => Value::string(""),
            CelType::Bytes => Value::bytes(Vec::<u8>::new()),
            CelType::List(_) => Value::list(Vec::<Value>::new()),
            CelType::Map(_, _) => Value::map(std::iter::empty()),
            _ => Value::Null,
        }
    }
}

impl Value {
    /// Name of this value's runtime type, as `type(x)` reports it.
    pub fn type_name(&self) -> String {
        match self {
            Value::Null => "null_type".to_string(),
            Value::Bool(_) => "bool".to_string(),
            Value::Int(_) => "int".to_string(),
            Value::UInt(_) => "uint".to_string(),
            Value::Double(_) => "double".to_string(),
            Value::String(_) => "string".to_string(),
            Value::Bytes(_) => "bytes".to_string(),
            Value::List(_) => "list".to_string(),
            Value::Map(_) => "map".to_string(),
            Value::Message(m) => m.type_name().to_string(),
            Value::Type(_) => "type".to_string(),
            Value::Unknown(_) => "unknown".to_string(),
            Value::Error(_) => "error".to_string(),
        }
    }

    pub fn type_value(&self) -> TypeValue {
        TypeValue::new(self.type_name())
    }

    /// Whether this value can be passed where `cel_type` is expected.
    ///
    /// Used for runtime overload dispatch. Type parameters and `dyn` accept
    /// anything; collection element types are checked element by element.
    pub fn is_instance_of(&self, cel_type: &CelType) -> bool {
        match (cel_type, self) {
            (
                CelType::Dyn | CelType::Error | CelType::TypeParam(_) | CelType::TypeVar(_),
                _,
            ) => true,
            (CelType::Null, Value::Null)
            | (CelType::Bool, Value::Bool(_))
            | (CelType::Int, Value::Int(_))
            | (CelType::UInt, Value::UInt(_))
            | (CelType::Double, Value::Double(_))
            | (CelType::String, Value::String(_))
            | (CelType::Bytes, Value::Bytes(_))
            | (CelType::Type(_), Value::Type(_)) => true,
            (CelType::List(elem), Value::List(items)) => {
                items.iter().all(|item| item.is_instance_of(elem))
            }
            (CelType::Map(key, value), Value::Map(map)) => map
                .iter()
                .all(|(k, v)| k.to_value().is_instance_of(key) && v.is_instance_of(value)),
            (CelType::Message(name), Value::Message(m)) => m.type_name() == name.as_ref(),
            (CelType::Wrapper(_), Value::Null) => true,
            (CelType::Wrapper(inner), value) => value.is_instance_of(inner),
            _ => false,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Value::Unknown(_))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl Value {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_uint(&self) -> Option<u64> {
        match self {
            Value::UInt(u) => Some(*u),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Double(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&ValueMap> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_error(&self) -> Option<&EvalError> {
        match self {
            Value::Error(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_unknown(&self) -> Option<&UnknownSet> {
        match self {
            Value::Unknown(u) => Some(u),
            _ => None,
        }
    }
}

/// Structural equality: same tag and same contents. `Int(1) != UInt(1)`.
///
/// Language-level `==` is [`Value::equals`].
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::UInt(a), Value::UInt(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .zip(b.iter())
                        .all(|((ka, va), (kb, vb))| ka.to_value() == kb.to_value() && va == vb)
            }
            (Value::Message(a), Value::Message(b)) => {
                a.type_name() == b.type_name() && a.equals(b.as_ref())
            }
            (Value::Type(a), Value::Type(b)) => a == b,
            (Value::Unknown(a), Value::Unknown(b)) => a == b,
            (Value::Error(a), Value::Error(b)) => a == b,
            _ => false,
        }
    }
}

impl Value {
    /// Language equality (`==`). Numbers compare by value across int, uint
    /// and double; lists and maps compare element-wise with the same rule.
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Int(_) | Value::UInt(_) | Value::Double(_), _) => {
                self.compare(other) == Some(Ordering::Equal)
            }
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.equals(y))
            }
            (Value::Map(a), Value::Map(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .all(|(k, v)| b.get(k).is_some_and(|other| v.equals(other)))
            }
            (Value::Unknown(_) | Value::Error(_), _) | (_, Value::Unknown(_) | Value::Error(_)) => {
                false
            }
            _ => self == other,
        }
    }

    /// Ordering between values of the same type, and across numeric types.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::UInt(a), Value::UInt(b)) => Some(a.cmp(b)),
            (Value::Double(a), Value::Double(b)) => a.partial_cmp(b),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Bytes(a), Value::Bytes(b)) => Some(a.cmp(b)),
            (Value::Int(a), Value::UInt(b)) => Some(compare_int_uint(*a, *b)),
            (Value::UInt(a), Value::Int(b)) => Some(compare_int_uint(*b, *a).reverse()),
            (Value::Int(a), Value::Double(b)) => (*a as f64).partial_cmp(b),
            (Value::Double(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Value::UInt(a), Value::Double(b)) => (*a as f64).partial_cmp(b),
            (Value::Double(a), Value::UInt(b)) => a.partial_cmp(&(*b as f64)),
            _ => None,
        }
    }
}

fn compare_int_uint(i: i64, u: u64) -> Ordering {
    if i < 0 {
        Ordering::Less
    } else {
        (i as u64).cmp(&u)
    }
}

pub(crate) fn format_double(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else if v.is_infinite() {
        if v.is_sign_positive() {
            "+infinity".to_string()
        } else {
            "-infinity".to_string()
        }
    } else if v.fract() == 0.0 && v.abs() < 1e16 {
        format!("{}.0", v)
    } else {
        format!("{}", v)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
            Value::UInt(v) => write!(f, "{}u", v),
            Value::Double(v) => write!(f, "{}", format_double(*v)),
            Value::String(v) => write!(f, "{:?}", v),
            Value::Bytes(v) => write!(f, "b\"{}\"", v.escape_ascii()),
            Value::List(v) => {
                write!(f, "[")?;
                for (i, elem) in v.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", elem)?;
                }
                write!(f, "]")
            }
            Value::Map(m) => {
                write!(f, "{{")?;
                for (i, (key, value)) in m.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", key, value)?;
                }
                write!(f, "}}")
            }
            Value::Message(m) => write!(f, "{}{{...}}", m.type_name()),
            Value::Type(t) => write!(f, "{}", t.name),
            Value::Unknown(u) => write!(f, "unknown{:?}", u.ids()),
            Value::Error(e) => write!(f, "error({})", e),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<u64> for Value {
    fn from(u: u64) -> Self {
        Value::UInt(u)
    }
}

impl From<u32> for Value {
    fn from(u: u32) -> Self {
        Value::UInt(u64::from(u))
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Double(d)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Value::Bytes(Arc::from(b))
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(Arc::from(items))
    }
}

impl From<ValueMap> for Value {
    fn from(map: ValueMap) -> Self {
        Value::Map(Arc::new(map))
    }
}

impl From<TypeValue> for Value {
    fn from(t: TypeValue) -> Self {
        Value::Type(t)
    }
}

impl From<EvalError> for Value {
    fn from(err: EvalError) -> Self {
        Value::error(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structural_equality_keeps_tags_apart() {
        assert_eq!(Value::Int(42), Value::Int(42));
        assert_ne!(Value::Int(42), Value::UInt(42));
        assert_eq!(Value::from("hello"), Value::string("hello"));
    }

    #[test]
    fn language_equality_crosses_numeric_types() {
        assert!(Value::Int(1).equals(&Value::UInt(1)));
        assert!(Value::Double(1.0).equals(&Value::Int(1)));
        assert!(!Value::Int(-1).equals(&Value::UInt(u64::MAX)));
        assert!(!Value::Double(f64::NAN).equals(&Value::Double(f64::NAN)));
        assert!(!Value::Int(1).equals(&Value::from("1")));

        let a = Value::from(vec![Value::Int(1), Value::Double(2.0)]);
        let b = Value::from(vec![Value::UInt(1), Value::Int(2)]);
        assert!(a.equals(&b));
    }

    #[test]
    fn numeric_comparison() {
        assert_eq!(Value::Int(1).compare(&Value::Int(2)), Some(Ordering::Less));
        assert_eq!(Value::Int(-1).compare(&Value::UInt(1)), Some(Ordering::Less));
        assert_eq!(Value::UInt(3).compare(&Value::Int(-3)), Some(Ordering::Greater));
        assert_eq!(Value::Int(1).compare(&Value::Double(1.5)), Some(Ordering::Less));
        assert_eq!(Value::from("a").compare(&Value::Int(1)), None);
    }

    #[test]
    fn int_and_uint_keys_collide() {
        let mut map = ValueMap::new();
        assert!(map.insert(MapKey::Int(1), Value::from("a")).is_none());
        assert!(map.insert(MapKey::UInt(1), Value::from("b")).is_some());
        assert_eq!(map.len(), 1);
        assert!(map.contains_key(&MapKey::UInt(1)));
    }

    #[test]
    fn key_order_is_bool_number_string() {
        let map = ValueMap::from_entries([
            (MapKey::from("z"), Value::Null),
            (MapKey::UInt(5), Value::Null),
            (MapKey::Int(-2), Value::Null),
            (MapKey::Bool(true), Value::Null),
        ]);
        let keys: Vec<_> = map.keys().map(|k| k.to_string()).collect();
        assert_eq!(keys, vec!["true", "-2", "5u", "\"z\""]);
    }

    #[test]
    fn integral_double_lookup() {
        let map = ValueMap::from_entries([(MapKey::Int(2), Value::Bool(true))]);
        let key = MapKey::for_lookup(&Value::Double(2.0));
        assert_eq!(key.as_ref().and_then(|k| map.get(k)), Some(&Value::Bool(true)));
        assert!(MapKey::for_lookup(&Value::Double(2.5)).is_none());
    }

    #[test]
    fn instance_of() {
        let list = Value::from(vec![Value::Int(1), Value::Int(2)]);
        assert!(list.is_instance_of(&CelType::list(CelType::Int)));
        assert!(!list.is_instance_of(&CelType::list(CelType::String)));
        assert!(list.is_instance_of(&CelType::list(CelType::type_param("T"))));
        assert!(Value::Null.is_instance_of(&CelType::wrapper(CelType::Int)));
        assert!(Value::Int(3).is_instance_of(&CelType::wrapper(CelType::Int)));
        assert!(!Value::Int(3).is_instance_of(&CelType::UInt));
    }

    #[test]
    fn zero_values() {
        assert_eq!(Value::zero_of(&CelType::Int), Value::Int(0));
        assert_eq!(Value::zero_of(&CelType::String), Value::from(""));
        assert_eq!(
            Value::zero_of(&CelType::list(CelType::Int)),
            Value::from(Vec::<Value>::new())
        );
        assert_eq!(Value::zero_of(&CelType::message("acme.User")), Value::Null);
    }

    #[test]
    fn unknown_sets_merge() {
        let merged = UnknownSet::new(3).merge(&UnknownSet::new(1));
        assert_eq!(merged.ids(), vec![1, 3]);
        assert!(merged.contains(3));
    }

    #[test]
    fn display() {
        assert_eq!(Value::Null.to_string(), "null");
        assert_eq!(Value::UInt(42).to_string(), "42u");
        assert_eq!(Value::Double(1.0).to_string(), "1.0");
        assert_eq!(Value::Double(f64::INFINITY).to_string(), "+infinity");
        assert_eq!(Value::from("hi").to_string(), "\"hi\"");
        assert_eq!(
            Value::map([(MapKey::from("k"), Value::Int(1))]).to_string(),
            "{\"k\": 1}"
        );
        assert_eq!(Value::type_value(&Value::Int(1)).name.as_ref(), "int");
    }
}
