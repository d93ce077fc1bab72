use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;

use crate::error::{SchemaError, TranscribeError};
use crate::schema::{ModelSchema, ModelSchemaBuilder};
use crate::value::FieldValue;

/// A value type persisted as one row of its own table.
///
/// `Default` is the empty constructor: zero numbers, `false`, unset text and bytes.
pub trait Model: Default + Clone + Send + 'static {
    /// Declare the table, database, version and fields of this type.
    fn describe() -> ModelSchemaBuilder;

    /// Current value of a declared field. `None` for undeclared names;
    /// a declared field answered with `None` is [`TranscribeError::MissingAccessor`].
    fn field(&self, name: &str) -> Option<FieldValue>;

    /// # Errors
    /// Returns [`TranscribeError::UnknownField`] for undeclared names and
    /// [`TranscribeError::KindMismatch`] when `value` has the wrong kind.
    fn set_field(&mut self, name: &str, value: FieldValue) -> Result<(), TranscribeError>;

    /// Row id; zero until the value has been stored.
    fn identity(&self) -> i64;

    fn set_identity(&mut self, identity: i64);

    /// Validated schema, built once per type and shared afterwards.
    ///
    /// # Errors
    /// Returns the [`SchemaError`] from [`ModelSchemaBuilder::build`].
    fn schema() -> Result<Arc<ModelSchema>, SchemaError> {
        schema_of::<Self>()
    }
}

type SchemaCache = RwLock<HashMap<TypeId, Arc<ModelSchema>>>;

fn schema_cache() -> &'static SchemaCache {
    static CACHE: OnceLock<SchemaCache> = OnceLock::new();
    CACHE.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Look up or build the schema of `M`.
///
/// # Errors
/// Returns the [`SchemaError`] from `M::describe().build()`. Failures are not cached.
pub fn schema_of<M: Model>() -> Result<Arc<ModelSchema>, SchemaError> {
    let key = TypeId::of::<M>();
    if let Some(schema) = schema_cache().read().get(&key) {
        return Ok(Arc::clone(schema));
    }

    let built = Arc::new(M::describe().build()?);
    let mut cache = schema_cache().write();
    Ok(Arc::clone(cache.entry(key).or_insert(built)))
}
