//! Message types supplied by the embedder.
//!
//! The engine never decodes messages itself. Field tables are declared in a
//! [`TypeRegistry`] for the checker and for zero values; message instances
//! reach the evaluator as [`MessageAccessor`] trait objects.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use super::CelType;
use crate::eval::Value;

/// Read access to a structured message backing a `Value::Message`.
pub trait MessageAccessor: fmt::Debug + Send + Sync {
    /// Fully qualified message type name.
    fn type_name(&self) -> &str;

    /// Whether the field is set.
    fn has_field(&self, field: &str) -> bool;

    /// Value of a set field; `None` when the field is unset or unknown.
    fn get_field(&self, field: &str) -> Option<Value>;

    /// Structural equality with another message of the same type name.
    /// The default only treats a message as equal to itself.
    fn equals(&self, other: &dyn MessageAccessor) -> bool {
        std::ptr::addr_eq(self as *const Self, other as *const dyn MessageAccessor)
    }
}

/// Field table of one message type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageType {
    pub name: String,
    pub fields: BTreeMap<String, CelType>,
}

impl MessageType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, cel_type: CelType) -> Self {
        self.fields.insert(name.into(), cel_type);
        self
    }

    pub fn field(&self, name: &str) -> Option<&CelType> {
        self.fields.get(name)
    }
}

/// Immutable set of message types, shared by `Env` and `Program`.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    messages: HashMap<String, MessageType>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_message(mut self, message: MessageType) -> Self {
        self.messages.insert(message.name.clone(), message);
        self
    }

    pub fn get(&self, name: &str) -> Option<&MessageType> {
        self.messages.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.messages.contains_key(name)
    }

    /// Declared type of `message.field`.
    pub fn field_type(&self, message: &str, field: &str) -> Option<&CelType> {
        self.get(message)?.field(field)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MessageType> {
        self.messages.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> TypeRegistry {
        TypeRegistry::new().with_message(
            MessageType::new("acme.User")
                .with_field("name", CelType::String)
                .with_field("tags", CelType::list(CelType::String)),
        )
    }

    #[test]
    fn field_lookup() {
        let reg = registry();
        assert!(reg.contains("acme.User"));
        assert_eq!(reg.field_type("acme.User", "name"), Some(&CelType::String));
        assert_eq!(reg.field_type("acme.User", "email"), None);
        assert_eq!(reg.field_type("acme.Group", "name"), None);
        assert_eq!(reg.len(), 1);
    }

    #[derive(Debug)]
    struct Empty(u8);

    impl MessageAccessor for Empty {
        fn type_name(&self) -> &str {
            "acme.Empty"
        }
        fn has_field(&self, _: &str) -> bool {
            false
        }
        fn get_field(&self, _: &str) -> Option<Value> {
            None
        }
    }

    #[test]
    fn default_equality_is_identity() {
        let a = Empty(0);
        let b = Empty(0);
        assert!(a.equals(&a));
        assert!(!a.equals(&b));
    }
}
