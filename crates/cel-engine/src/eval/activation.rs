//! Variable bindings for evaluation.
//!
//! An [`Activation`] resolves variable names to values. Activations layer:
//! [`HierarchicalActivation`] puts local bindings in front of a parent, and
//! the innermost binding of a name wins. [`PartialActivation`] marks
//! attributes as unknown for partial evaluation.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::{MapKey, Value};

/// Resolves variable names during evaluation.
pub trait Activation: Send + Sync {
    /// Value bound to `name`, or `None` if unbound.
    fn resolve(&self, name: &str) -> Option<Value>;

    fn has(&self, name: &str) -> bool {
        self.resolve(name).is_some()
    }

    /// Whether the attribute `variable.path...` was declared unknown.
    fn is_unknown(&self, _variable: &str, _path: &[Qualifier]) -> bool {
        false
    }
}

/// One step of an attribute path: a field selection or a constant index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Qualifier {
    Field(String),
    Key(MapKey),
}

/// Bindings held in a `HashMap`.
#[derive(Debug, Clone, Default)]
pub struct MapActivation {
    bindings: HashMap<String, Value>,
}

impl MapActivation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.bindings.insert(name.into(), value.into());
    }

    /// Builder form of [`MapActivation::insert`].
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.bindings.remove(name)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for MapActivation {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            bindings: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl Activation for MapActivation {
    fn resolve(&self, name: &str) -> Option<Value> {
        self.bindings.get(name).cloned()
    }

    fn has(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }
}

/// Local bindings layered over a parent. Local names shadow the parent's.
pub struct HierarchicalActivation<'a> {
    parent: &'a dyn Activation,
    local: HashMap<String, Value>,
}

impl<'a> HierarchicalActivation<'a> {
    pub fn new(parent: &'a dyn Activation) -> Self {
        Self {
            parent,
            local: HashMap::new(),
        }
    }

    pub fn with_binding(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.local.insert(name.into(), value.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.local.insert(name.into(), value.into());
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.local.remove(name)
    }
}

impl Activation for HierarchicalActivation<'_> {
    fn resolve(&self, name: &str) -> Option<Value> {
        self.local
            .get(name)
            .cloned()
            .or_else(|| self.parent.resolve(name))
    }

    fn has(&self, name: &str) -> bool {
        self.local.contains_key(name) || self.parent.has(name)
    }

    fn is_unknown(&self, variable: &str, path: &[Qualifier]) -> bool {
        !self.local.contains_key(variable) && self.parent.is_unknown(variable, path)
    }
}

/// No bindings.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyActivation;

impl EmptyActivation {
    pub fn new() -> Self {
        Self
    }
}

impl Activation for EmptyActivation {
    fn resolve(&self, _name: &str) -> Option<Value> {
        None
    }

    fn has(&self, _name: &str) -> bool {
        false
    }
}

/// Resolves names lazily through a closure.
pub struct FnActivation<F> {
    resolver: F,
}

impl<F> FnActivation<F>
where
    F: Fn(&str) -> Option<Value> + Send + Sync,
{
    pub fn new(resolver: F) -> Self {
        Self { resolver }
    }
}

impl<F> fmt::Debug for FnActivation<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnActivation").finish_non_exhaustive()
    }
}

impl<F> Activation for FnActivation<F>
where
    F: Fn(&str) -> Option<Value> + Send + Sync,
{
    fn resolve(&self, name: &str) -> Option<Value> {
        (self.resolver)(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PatternQualifier {
    Exact(Qualifier),
    Wildcard,
}

impl PatternQualifier {
    fn matches(&self, qualifier: &Qualifier) -> bool {
        match (self, qualifier) {
            (PatternQualifier::Wildcard, _) => true,
            (PatternQualifier::Exact(a), b) if a == b => true,
            // `m.f` and `m["f"]` name the same attribute.
            (PatternQualifier::Exact(Qualifier::Field(f)), Qualifier::Key(MapKey::String(k)))
            | (PatternQualifier::Exact(Qualifier::Key(MapKey::String(k))), Qualifier::Field(f)) => {
                f.as_str() == k.as_ref()
            }
            _ => false,
        }
    }
}

/// An attribute, or family of attributes, whose value is not yet known.
///
/// `AttributePattern::new("request").field("auth")` matches `request.auth`,
/// anything selected from it, and `request` itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributePattern {
    variable: String,
    qualifiers: Vec<PatternQualifier>,
}

impl AttributePattern {
    pub fn new(variable: impl Into<String>) -> Self {
        Self {
            variable: variable.into(),
            qualifiers: Vec::new(),
        }
    }

    pub fn field(mut self, name: impl Into<String>) -> Self {
        self.qualifiers
            .push(PatternQualifier::Exact(Qualifier::Field(name.into())));
        self
    }

    pub fn key(mut self, key: impl Into<MapKey>) -> Self {
        self.qualifiers
            .push(PatternQualifier::Exact(Qualifier::Key(key.into())));
        self
    }

    /// Matches any single field or key.
    pub fn wildcard(mut self) -> Self {
        self.qualifiers.push(PatternQualifier::Wildcard);
        self
    }

    /// True when the attribute and the pattern agree on every qualifier they
    /// both have.
    pub fn matches(&self, variable: &str, path: &[Qualifier]) -> bool {
        self.variable == variable
            && self
                .qualifiers
                .iter()
                .zip(path)
                .all(|(pattern, qualifier)| pattern.matches(qualifier))
    }
}

/// Wraps an activation and marks attributes matching any pattern as unknown.
pub struct PartialActivation<A> {
    inner: A,
    patterns: Vec<AttributePattern>,
}

impl<A: Activation> PartialActivation<A> {
    pub fn new(inner: A, patterns: impl IntoIterator<Item = AttributePattern>) -> Self {
        Self {
            inner,
            patterns: patterns.into_iter().collect(),
        }
    }

    pub fn patterns(&self) -> &[AttributePattern] {
        &self.patterns
    }
}

impl<A: Activation> Activation for PartialActivation<A> {
    fn resolve(&self, name: &str) -> Option<Value> {
        self.inner.resolve(name)
    }

    fn has(&self, name: &str) -> bool {
        self.inner.has(name)
    }

    fn is_unknown(&self, variable: &str, path: &[Qualifier]) -> bool {
        self.patterns.iter().any(|p| p.matches(variable, path))
            || self.inner.is_unknown(variable, path)
    }
}

impl<T: Activation + ?Sized> Activation for Arc<T> {
    fn resolve(&self, name: &str) -> Option<Value> {
        (**self).resolve(name)
    }

    fn has(&self, name: &str) -> bool {
        (**self).has(name)
    }

    fn is_unknown(&self, variable: &str, path: &[Qualifier]) -> bool {
        (**self).is_unknown(variable, path)
    }
}

impl<T: Activation + ?Sized> Activation for Box<T> {
    fn resolve(&self, name: &str) -> Option<Value> {
        (**self).resolve(name)
    }

    fn has(&self, name: &str) -> bool {
        (**self).has(name)
    }

    fn is_unknown(&self, variable: &str, path: &[Qualifier]) -> bool {
        (**self).is_unknown(variable, path)
    }
}

impl<T: Activation + ?Sized> Activation for &T {
    fn resolve(&self, name: &str) -> Option<Value> {
        (**self).resolve(name)
    }

    fn has(&self, name: &str) -> bool {
        (**self).has(name)
    }

    fn is_unknown(&self, variable: &str, path: &[Qualifier]) -> bool {
        (**self).is_unknown(variable, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_activation() {
        let mut activation = MapActivation::new();
        activation.insert("x", 42i64);
        activation.insert("name", "hello");

        assert_eq!(activation.resolve("x"), Some(Value::Int(42)));
        assert_eq!(activation.resolve("name"), Some(Value::from("hello")));
        assert_eq!(activation.resolve("missing"), None);
        assert!(activation.has("x"));
        assert!(!activation.has("missing"));
    }

    #[test]
    fn local_bindings_shadow_parent() {
        let parent: MapActivation = [("x", 1i64), ("y", 2i64)].into_iter().collect();
        let child = HierarchicalActivation::new(&parent).with_binding("x", 10i64);
        let grandchild = HierarchicalActivation::new(&child).with_binding("y", 20i64);

        assert_eq!(child.resolve("x"), Some(Value::Int(10)));
        assert_eq!(child.resolve("y"), Some(Value::Int(2)));
        assert_eq!(grandchild.resolve("x"), Some(Value::Int(10)));
        assert_eq!(grandchild.resolve("y"), Some(Value::Int(20)));
        assert_eq!(grandchild.resolve("z"), None);
    }

    #[test]
    fn empty_activation() {
        let activation = EmptyActivation::new();
        assert_eq!(activation.resolve("anything"), None);
        assert!(!activation.has("anything"));
    }

    #[test]
    fn fn_activation_resolves_lazily() {
        let activation = FnActivation::new(|name| {
            name.strip_prefix("n").and_then(|n| n.parse::<i64>().ok()).map(Value::Int)
        });
        assert_eq!(activation.resolve("n7"), Some(Value::Int(7)));
        assert_eq!(activation.resolve("x"), None);
    }

    #[test]
    fn pattern_matching() {
        let pattern = AttributePattern::new("request").field("auth").wildcard();
        let auth = Qualifier::Field("auth".to_string());
        let claims = Qualifier::Field("claims".to_string());

        assert!(pattern.matches("request", &[]));
        assert!(pattern.matches("request", &[auth.clone()]));
        assert!(pattern.matches("request", &[auth.clone(), claims.clone()]));
        assert!(pattern.matches(
            "request",
            &[Qualifier::Key(MapKey::from("auth")), claims.clone()]
        ));
        assert!(!pattern.matches("request", &[claims]));
        assert!(!pattern.matches("response", &[auth]));
    }

    #[test]
    fn unknowns_respect_shadowing() {
        let partial = PartialActivation::new(
            MapActivation::new().with("y", 1i64),
            [AttributePattern::new("x")],
        );
        assert!(partial.is_unknown("x", &[]));
        assert!(!partial.is_unknown("y", &[]));
        assert_eq!(partial.resolve("y"), Some(Value::Int(1)));

        let local = HierarchicalActivation::new(&partial).with_binding("x", 5i64);
        assert!(!local.is_unknown("x", &[]));
        let other = HierarchicalActivation::new(&partial).with_binding("z", 5i64);
        assert!(other.is_unknown("x", &[]));
    }
}
