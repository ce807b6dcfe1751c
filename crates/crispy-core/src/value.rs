//! # The state tree
//!
//! A store holds one [`Value`]: a nested composite of maps and lists whose
//! leaves are scalars or *atomic* host values. Atomic values (dates, blobs,
//! files and opaque handles) are composite in memory but are never descended
//! into by path traversal.
//!
//! ```rust
//! use crispy_core::Value;
//!
//! let tree = Value::map([
//!     ("user", Value::map([("name", Value::from("Ada")), ("age", Value::from(36))])),
//!     ("tags", Value::list(["admin", "ops"])),
//! ]);
//! assert!(tree.is_container());
//! ```

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use std::time::SystemTime;

pub type Map = BTreeMap<String, Value>;

/// Immutable binary blob. Cloning shares the bytes.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Blob(Rc<[u8]>);

impl Blob {
    pub fn new(bytes: impl Into<Rc<[u8]>>) -> Self {
        Self(bytes.into())
    }
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
    pub fn len(&self) -> usize {
        self.0.len()
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Blob({} bytes)", self.0.len())
    }
}

/// A file picked by the user: name, modification time and contents.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileHandle {
    pub name: String,
    pub last_modified: SystemTime,
    pub contents: Blob,
}

#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Map(Map),
    Date(SystemTime),
    Blob(Blob),
    File(Rc<FileHandle>),
    /// Host value the store carries around without looking inside.
    Opaque(Rc<dyn Any>),
}

impl Value {
    pub fn map<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn list<V: Into<Value>>(items: impl IntoIterator<Item = V>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }

    pub fn opaque<T: Any>(value: T) -> Self {
        Value::Opaque(Rc::new(value))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Date(_) => "date",
            Value::Blob(_) => "blob",
            Value::File(_) => "file",
            Value::Opaque(_) => "opaque",
        }
    }

    /// Maps and lists. Everything else, atomic host values included, is a leaf.
    pub fn is_container(&self) -> bool {
        matches!(self, Value::Map(_) | Value::List(_))
    }

    pub fn is_atomic(&self) -> bool {
        matches!(
            self,
            Value::Date(_) | Value::Blob(_) | Value::File(_) | Value::Opaque(_)
        )
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// `false` for null, `false`, zero, NaN and the empty string.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0 && !f.is_nan(),
            Value::Str(s) => !s.is_empty(),
            _ => true,
        }
    }

    /// Child lookup by key. Lists accept decimal indices; leaves have no children.
    pub fn child(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(m) => m.get(key),
            Value::List(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        }
    }

    pub fn child_mut(&mut self, key: &str) -> Option<&mut Value> {
        match self {
            Value::Map(m) => m.get_mut(key),
            Value::List(items) => key.parse::<usize>().ok().and_then(|i| items.get_mut(i)),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
    pub fn as_map(&self) -> Option<&Map> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Value::Opaque(v) => v.downcast_ref::<T>(),
            _ => None,
        }
    }
}

// Opaque values compare by identity, everything else structurally.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Blob(a), Value::Blob(b)) => a == b,
            (Value::File(a), Value::File(b)) => Rc::ptr_eq(a, b) || a == b,
            (Value::Opaque(a), Value::Opaque(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x:?}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::List(l) => f.debug_list().entries(l).finish(),
            Value::Map(m) => f.debug_map().entries(m).finish(),
            Value::Date(d) => write!(f, "Date({d:?})"),
            Value::Blob(b) => b.fmt(f),
            Value::File(file) => write!(f, "File({:?})", file.name),
            Value::Opaque(_) => f.write_str("Opaque(..)"),
        }
    }
}

macro_rules! impl_from {
    ($($t:ty => $variant:ident $(as $cast:ty)?),* $(,)?) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Value::$variant(v $(as $cast)?)
                }
            }
        )*
    };
}

impl_from! {
    bool => Bool,
    i64 => Int,
    i32 => Int as i64,
    u32 => Int as i64,
    usize => Int as i64,
    f64 => Float,
    f32 => Float as f64,
    String => Str,
    Map => Map,
    SystemTime => Date,
    Blob => Blob,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<FileHandle> for Value {
    fn from(v: FileHandle) -> Self {
        Value::File(Rc::new(v))
    }
}

impl From<Rc<FileHandle>> for Value {
    fn from(v: Rc<FileHandle>) -> Self {
        Value::File(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::list(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Conversion out of a stored value for typed paths.
pub trait FromValue: Sized {
    /// Name used in [`StoreError::TypeMismatch`](crate::StoreError::TypeMismatch).
    const EXPECTED: &'static str;

    fn from_value(value: &Value) -> Option<Self>;
}

impl FromValue for Value {
    const EXPECTED: &'static str = "value";
    fn from_value(value: &Value) -> Option<Self> {
        Some(value.clone())
    }
}

impl FromValue for bool {
    const EXPECTED: &'static str = "bool";
    fn from_value(value: &Value) -> Option<Self> {
        value.as_bool()
    }
}

impl FromValue for i64 {
    const EXPECTED: &'static str = "int";
    fn from_value(value: &Value) -> Option<Self> {
        value.as_i64()
    }
}

impl FromValue for i32 {
    const EXPECTED: &'static str = "i32";
    fn from_value(value: &Value) -> Option<Self> {
        value.as_i64().and_then(|i| i32::try_from(i).ok())
    }
}

impl FromValue for u32 {
    const EXPECTED: &'static str = "u32";
    fn from_value(value: &Value) -> Option<Self> {
        value.as_i64().and_then(|i| u32::try_from(i).ok())
    }
}

impl FromValue for usize {
    const EXPECTED: &'static str = "usize";
    fn from_value(value: &Value) -> Option<Self> {
        value.as_i64().and_then(|i| usize::try_from(i).ok())
    }
}

impl FromValue for f64 {
    const EXPECTED: &'static str = "float";
    fn from_value(value: &Value) -> Option<Self> {
        value.as_f64()
    }
}

impl FromValue for String {
    const EXPECTED: &'static str = "string";
    fn from_value(value: &Value) -> Option<Self> {
        value.as_str().map(str::to_string)
    }
}

impl FromValue for SystemTime {
    const EXPECTED: &'static str = "date";
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }
}

impl FromValue for Blob {
    const EXPECTED: &'static str = "blob";
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Blob(b) => Some(b.clone()),
            _ => None,
        }
    }
}

impl FromValue for Rc<FileHandle> {
    const EXPECTED: &'static str = "file";
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::File(f) => Some(f.clone()),
            _ => None,
        }
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    const EXPECTED: &'static str = "list";
    fn from_value(value: &Value) -> Option<Self> {
        value.as_list()?.iter().map(T::from_value).collect()
    }
}

impl<T: FromValue> FromValue for Option<T> {
    const EXPECTED: &'static str = T::EXPECTED;
    fn from_value(value: &Value) -> Option<Self> {
        if value.is_null() {
            Some(None)
        } else {
            T::from_value(value).map(Some)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness_follows_empty_equivalents() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(Value::map::<&str, Value>([]).is_truthy());
        assert!(Value::Float(0.5).is_truthy());
    }

    #[test]
    fn atomic_leaves_have_no_children() {
        let file = Value::from(FileHandle {
            name: "report.pdf".into(),
            last_modified: SystemTime::UNIX_EPOCH,
            contents: Blob::new(vec![1u8, 2, 3]),
        });
        assert!(file.is_atomic());
        assert!(file.child("name").is_none());
        assert!(Value::Date(SystemTime::UNIX_EPOCH).child("0").is_none());
    }

    #[test]
    fn opaque_values_compare_by_identity() {
        let a = Value::opaque(5u8);
        let b = a.clone();
        assert_eq!(a, b);
        assert_ne!(a, Value::opaque(5u8));
        assert_eq!(a.downcast_ref::<u8>(), Some(&5));
    }

    #[test]
    fn list_children_use_decimal_keys() {
        let v = Value::list([10, 20]);
        assert_eq!(v.child("1"), Some(&Value::Int(20)));
        assert_eq!(v.child("x"), None);
    }

    #[test]
    fn typed_conversions() {
        assert_eq!(Vec::<i64>::from_value(&Value::list([1, 2])), Some(vec![1, 2]));
        assert_eq!(Option::<String>::from_value(&Value::Null), Some(None));
        assert_eq!(u32::from_value(&Value::Int(-1)), None);
    }
}
