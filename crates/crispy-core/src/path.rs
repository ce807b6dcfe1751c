//! # Dotted paths
//!
//! A path such as `"user.profile.name"` is compiled once into its keys and
//! then used to read from, or write into, a [`Value`] tree.
//!
//! - Reads are safe‑navigating: a missing key, `null`, or a leaf anywhere
//!   along the way yields `None`.
//! - Writes never create structure: every container above the final key must
//!   already exist (and be non‑empty), otherwise the write fails with
//!   [`StoreError::PathNotInitialized`] and the tree is left untouched.
//!
//! ```rust
//! use crispy_core::{Path, Value, resolve_read, resolve_write};
//!
//! let mut tree = Value::map([("a", Value::map([("b", 1)]))]);
//! let path = Path::parse("a.b").unwrap();
//!
//! resolve_write(&mut tree, &path, Value::from(2)).unwrap();
//! assert_eq!(resolve_read(&tree, &path), Some(&Value::Int(2)));
//! ```

use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use smallvec::SmallVec;

use crate::error::{Result, StoreError};
use crate::value::{FromValue, Value};

type Keys = SmallVec<[Box<str>; 4]>;

#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Path {
    raw: Rc<str>,
    keys: Keys,
}

impl Path {
    /// Splits `raw` on `.`. Empty paths and empty segments are rejected.
    pub fn parse(raw: &str) -> Result<Self> {
        let keys: Keys = raw.split('.').map(Box::from).collect();
        if keys.iter().any(|k| k.is_empty()) {
            return Err(StoreError::InvalidPath {
                path: raw.to_string(),
            });
        }
        Ok(Self {
            raw: Rc::from(raw),
            keys,
        })
    }

    // Backs `store_path!`, whose identifier segments are never empty.
    #[doc(hidden)]
    pub fn from_static(raw: &'static str) -> Self {
        Self {
            raw: Rc::from(raw),
            keys: raw.split('.').map(Box::from).collect(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn keys(&self) -> impl ExactSizeIterator<Item = &str> {
        self.keys.iter().map(|k| &**k)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Always `false`: parsing rejects empty paths.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    fn split_last(&self) -> (&str, &[Box<str>]) {
        match self.keys.split_last() {
            Some((last, parents)) => (&**last, parents),
            None => ("", &[]),
        }
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl fmt::Debug for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Path({:?})", &*self.raw)
    }
}

impl TryFrom<&str> for Path {
    type Error = StoreError;
    fn try_from(raw: &str) -> Result<Self> {
        Path::parse(raw)
    }
}

/// Builds a [`Path`] from identifier segments: `store_path!(user.profile.name)`.
///
/// Numeric (list index) segments are not identifiers; use [`Path::parse`] for
/// those.
#[macro_export]
macro_rules! store_path {
    ($first:ident $(. $rest:ident)*) => {
        $crate::path::Path::from_static(concat!(stringify!($first) $(, ".", stringify!($rest))*))
    };
}

/// A path that also names the type stored at its slot.
pub struct TypedPath<T> {
    path: Path,
    _ty: PhantomData<fn() -> T>,
}

impl<T: FromValue> TypedPath<T> {
    /// Unchecked against any shape. See `StoreContext::path` for the validated builder.
    pub fn parse(raw: &str) -> Result<Self> {
        Path::parse(raw).map(Self::from)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<T> From<Path> for TypedPath<T> {
    fn from(path: Path) -> Self {
        Self {
            path,
            _ty: PhantomData,
        }
    }
}

impl<T> Clone for TypedPath<T> {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            _ty: PhantomData,
        }
    }
}

impl<T> fmt::Debug for TypedPath<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypedPath<{}>({:?})", std::any::type_name::<T>(), self.path.as_str())
    }
}

/// Reads the value at `path`, or `None` if anything along the way is absent.
pub fn resolve_read<'a>(root: &'a Value, path: &Path) -> Option<&'a Value> {
    path.keys().try_fold(root, |cur, key| cur.child(key))
}

/// Assigns `value` at `path`, in place inside its existing parent container.
///
/// Lists take a decimal index; the index one past the end appends. Nothing is
/// mutated when the write fails.
pub fn resolve_write(root: &mut Value, path: &Path, value: Value) -> Result<()> {
    let (last, parents) = path.split_last();

    let mut cur = root;
    for key in parents {
        let Some(next) = cur.child_mut(key).filter(|v| v.is_truthy()) else {
            return Err(not_initialized(path, key));
        };
        cur = next;
    }

    match cur {
        Value::Map(m) => {
            m.insert(last.to_string(), value);
        }
        Value::List(items) => match last.parse::<usize>() {
            Ok(i) if i < items.len() => items[i] = value,
            Ok(i) if i == items.len() => items.push(value),
            _ => return Err(not_initialized(path, last)),
        },
        _ => return Err(not_initialized(path, last)),
    }
    Ok(())
}

/// Checks that `path` exists in the shape described by `shape`.
///
/// Below a `null` the shape is unknown and anything is accepted. A list's
/// element shape is taken from its first element.
pub fn check_shape(shape: &Value, path: &Path) -> Result<()> {
    let unknown = || StoreError::UnknownPath {
        path: path.to_string(),
    };

    let mut cur = shape;
    for key in path.keys() {
        cur = match cur {
            Value::Null => return Ok(()),
            Value::Map(m) => m.get(key).ok_or_else(unknown)?,
            Value::List(items) => {
                key.parse::<usize>().map_err(|_| unknown())?;
                match items.first() {
                    Some(first) => first,
                    None => return Ok(()),
                }
            }
            _ => return Err(unknown()),
        };
    }
    Ok(())
}

fn not_initialized(path: &Path, segment: &str) -> StoreError {
    StoreError::PathNotInitialized {
        path: path.to_string(),
        segment: segment.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    fn tree() -> Value {
        Value::map([
            ("a", Value::map([("b", Value::from(1))])),
            ("empty", Value::Null),
            ("items", Value::list([Value::map([("done", false)])])),
            ("when", Value::Date(SystemTime::UNIX_EPOCH)),
            ("zero", Value::from(0)),
        ])
    }

    fn p(s: &str) -> Path {
        Path::parse(s).unwrap()
    }

    #[test]
    fn parse_rejects_empty_segments() {
        assert!(Path::parse("").is_err());
        assert!(Path::parse("a..b").is_err());
        assert!(Path::parse(".a").is_err());
        assert_eq!(p("a.b.c").keys().collect::<Vec<_>>(), ["a", "b", "c"]);
    }

    #[test]
    fn macro_builds_dotted_path() {
        let path = crate::store_path!(user.profile.name);
        assert_eq!(path, p("user.profile.name"));
        assert_eq!(path.len(), 3);
    }

    #[test]
    fn read_short_circuits_on_missing_and_null() {
        let t = tree();
        assert_eq!(resolve_read(&t, &p("a.b")), Some(&Value::Int(1)));
        assert_eq!(resolve_read(&t, &p("missing.b.c")), None);
        assert_eq!(resolve_read(&t, &p("empty.b")), None);
        assert_eq!(resolve_read(&t, &p("a.b.c")), None);
    }

    #[test]
    fn read_never_descends_into_atomic_leaves() {
        let t = tree();
        assert!(resolve_read(&t, &p("when")).is_some());
        assert_eq!(resolve_read(&t, &p("when.secs")), None);
    }

    #[test]
    fn single_segment_targets_root() {
        let mut t = tree();
        resolve_write(&mut t, &p("fresh"), Value::from("x")).unwrap();
        assert_eq!(resolve_read(&t, &p("fresh")), Some(&Value::from("x")));
    }

    #[test]
    fn write_refuses_to_create_intermediates() {
        let mut t = tree();
        let before = t.clone();
        for path in ["empty.b", "missing.b", "zero.b", "a.b.c", "when.secs"] {
            let err = resolve_write(&mut t, &p(path), Value::from(5)).unwrap_err();
            assert!(
                matches!(err, StoreError::PathNotInitialized { .. }),
                "{path}: {err:?}"
            );
        }
        assert_eq!(t, before);
    }

    #[test]
    fn write_reports_failing_segment() {
        let mut t = tree();
        let err = resolve_write(&mut t, &p("a.x.y"), Value::Null).unwrap_err();
        assert_eq!(
            err,
            StoreError::PathNotInitialized {
                path: "a.x.y".into(),
                segment: "x".into()
            }
        );
    }

    #[test]
    fn list_writes_assign_or_append() {
        let mut t = tree();
        resolve_write(&mut t, &p("items.0.done"), Value::from(true)).unwrap();
        resolve_write(&mut t, &p("items.1"), Value::map([("done", false)])).unwrap();
        assert_eq!(resolve_read(&t, &p("items.0.done")), Some(&Value::Bool(true)));
        assert_eq!(resolve_read(&t, &p("items.1.done")), Some(&Value::Bool(false)));
        assert!(resolve_write(&mut t, &p("items.5"), Value::Null).is_err());
        assert!(resolve_write(&mut t, &p("items.first"), Value::Null).is_err());
    }

    #[test]
    fn shape_check() {
        let t = tree();
        assert!(check_shape(&t, &p("a.b")).is_ok());
        assert!(check_shape(&t, &p("empty.anything.below")).is_ok());
        assert!(check_shape(&t, &p("items.7.done")).is_ok());
        assert!(check_shape(&t, &p("items.x")).is_err());
        assert!(check_shape(&t, &p("a.c")).is_err());
        assert!(check_shape(&t, &p("when.secs")).is_err());
    }
}
