use std::marker::PhantomData;
use std::sync::Arc;

use modelsync_core::{Model, ModelSchema, Param};

use crate::config::StoreConfig;
use crate::error::StoreResult;
use crate::migrate::SchemaStatus;
use crate::observer::ObserverRegistry;
use crate::query::Query;
use crate::source::{LocalDataSource, SaveOutcome};

/// Persistence capability for one model type.
///
/// Every call opens a data source, runs, notifies observers after a
/// successful write, and closes the source again.
pub struct Store<M: Model> {
    schema: Arc<ModelSchema>,
    config: Arc<StoreConfig>,
    observers: Arc<ObserverRegistry>,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model> Clone for Store<M> {
    fn clone(&self) -> Self {
        Self {
            schema: Arc::clone(&self.schema),
            config: Arc::clone(&self.config),
            observers: Arc::clone(&self.observers),
            _model: PhantomData,
        }
    }
}

impl<M: Model> std::fmt::Debug for Store<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("table", &self.schema.table_name())
            .field("database", &self.config.database_path(&self.schema))
            .finish_non_exhaustive()
    }
}

impl<M: Model> Store<M> {
    /// # Errors
    /// Returns [`crate::StoreError::Schema`] when the model's schema is invalid.
    pub fn new(config: Arc<StoreConfig>, observers: Arc<ObserverRegistry>) -> StoreResult<Self> {
        Ok(Self { schema: M::schema()?, config, observers, _model: PhantomData })
    }

    #[must_use]
    pub fn schema(&self) -> &Arc<ModelSchema> {
        &self.schema
    }

    #[must_use]
    pub fn config(&self) -> &Arc<StoreConfig> {
        &self.config
    }

    #[must_use]
    pub fn observers(&self) -> &Arc<ObserverRegistry> {
        &self.observers
    }

    /// A closed data source over this store's database.
    #[must_use]
    pub fn data_source(&self) -> LocalDataSource<M> {
        LocalDataSource::new(Arc::clone(&self.schema), Arc::clone(&self.config))
    }

    /// # Errors
    /// Returns an error when the database cannot be opened or migrated.
    pub fn open(&self) -> StoreResult<LocalDataSource<M>> {
        let mut source = self.data_source();
        source.open()?;
        Ok(source)
    }

    #[must_use]
    pub fn query(&self) -> Query<M> {
        Query::new(self.clone())
    }

    /// # Errors
    /// Returns an error when the database fails or the model cannot be projected.
    pub fn create(&self, model: &mut M) -> StoreResult<()> {
        self.write(|source| source.create(model))
    }

    /// # Errors
    /// Returns an error when the database fails or the model cannot be projected.
    pub fn update(&self, model: &mut M) -> StoreResult<usize> {
        self.write(|source| source.update(model))
    }

    /// # Errors
    /// Returns an error when the database fails or the model cannot be projected.
    pub fn save(&self, model: &mut M) -> StoreResult<SaveOutcome> {
        self.write(|source| source.save(model))
    }

    /// # Errors
    /// Returns an error when the database fails or the model cannot be projected.
    pub fn delete(&self, model: &M) -> StoreResult<usize> {
        self.write(|source| source.delete(model))
    }

    /// # Errors
    /// Returns an error for an undeclared column or a database failure.
    pub fn delete_where(&self, params: &[Param]) -> StoreResult<usize> {
        self.write(|source| source.delete_where(params))
    }

    /// Transactional delete-then-save; see [`LocalDataSource::replace_matching`].
    ///
    /// # Errors
    /// Returns an error for an undeclared column, a database failure, or a
    /// model that cannot be projected. Nothing is written on error.
    pub fn replace_matching(&self, params: &[Param], models: &mut [M]) -> StoreResult<usize> {
        self.write(|source| source.replace_matching(params, models))
    }

    /// # Errors
    /// Returns an error when the database fails.
    pub fn drop_table(&self) -> StoreResult<()> {
        let mut source = self.open()?;
        source.drop_table()?;
        source.close()
    }

    /// # Errors
    /// Returns an error when the database fails.
    pub fn schema_status(&self) -> StoreResult<SchemaStatus> {
        self.read(LocalDataSource::schema_status)
    }

    /// # Errors
    /// Returns an error when the database fails or a row cannot be inflated.
    pub fn get_all(&self, order_by: Option<&str>) -> StoreResult<Vec<M>> {
        self.read(|source| source.get_all(order_by))
    }

    pub fn notify(&self) {
        tracing::debug!("Notifying observers for {}", self.schema.type_name());
        self.observers.notify::<M>();
    }

    pub(crate) fn read<T>(
        &self,
        op: impl FnOnce(&LocalDataSource<M>) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut source = self.open()?;
        let result = op(&source)?;
        source.close()?;
        Ok(result)
    }

    fn write<T>(&self, op: impl FnOnce(&mut LocalDataSource<M>) -> StoreResult<T>) -> StoreResult<T> {
        let mut source = self.open()?;
        let result = op(&mut source)?;
        self.notify();
        source.close()?;
        Ok(result)
    }
}
