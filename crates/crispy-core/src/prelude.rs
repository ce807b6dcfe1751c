pub use crate::context::{StoreContext, StoreOptions, StorePath, StoreScope};
pub use crate::error::{Result, StoreError};
pub use crate::host::{Consumer, ConsumerOptions};
pub use crate::path::{Path, TypedPath};
pub use crate::registry::Unsubscribe;
pub use crate::store::{Setter, Store};
pub use crate::store_path;
pub use crate::sync::{ExternalSync, with_external_sync};
pub use crate::value::{Blob, FileHandle, FromValue, Value};
