use std::fmt::{Display, Formatter};

use modelsync_core::{debug_clause, inflate_from_params, FieldValue, Model, Param};

use crate::error::StoreResult;
use crate::source::{ModelCursor, Page};
use crate::store::Store;

/// Equality-conjunction query over one model table.
///
/// Terminals open a data source, run, and close it again; only `insert`
/// and `delete` write.
#[derive(Debug, Clone)]
pub struct Query<M: Model> {
    store: Store<M>,
    params: Vec<Param>,
    order_by: Option<String>,
    page: Page,
}

impl<M: Model> Query<M> {
    #[must_use]
    pub fn new(store: Store<M>) -> Self {
        Self { store, params: Vec::new(), order_by: None, page: Page::default() }
    }

    #[must_use]
    pub fn where_eq(self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.param(Param::new(key, value))
    }

    #[must_use]
    pub fn param(mut self, param: Param) -> Self {
        self.params.push(param);
        self
    }

    #[must_use]
    pub fn params(mut self, params: impl IntoIterator<Item = Param>) -> Self {
        self.params.extend(params);
        self
    }

    /// Raw `ORDER BY` body, e.g. `my_int DESC`.
    #[must_use]
    pub fn order_by(mut self, order: impl Into<String>) -> Self {
        self.order_by = Some(order.into());
        self
    }

    /// Negative values are rejected by the terminals.
    #[must_use]
    pub fn limit(mut self, limit: i64) -> Self {
        self.page.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn offset(mut self, offset: i64) -> Self {
        self.page.offset = Some(offset);
        self
    }

    #[must_use]
    pub fn store(&self) -> &Store<M> {
        &self.store
    }

    #[must_use]
    pub fn predicates(&self) -> &[Param] {
        &self.params
    }

    #[must_use]
    pub fn ordering(&self) -> Option<&str> {
        self.order_by.as_deref()
    }

    #[must_use]
    pub fn page(&self) -> Page {
        self.page
    }

    /// Rows matching the predicates; the page window is ignored.
    ///
    /// # Errors
    /// Returns an error for an undeclared column or a database failure.
    pub fn count(&self) -> StoreResult<usize> {
        self.store.read(|source| source.count(&self.params))
    }

    /// # Errors
    /// Returns an error for an undeclared column, a negative page bound, a
    /// database failure, or a row that cannot be inflated.
    pub fn all(&self) -> StoreResult<Vec<M>> {
        self.store.read(|source| source.query(self.ordering(), &self.params, self.page))
    }

    /// # Errors
    /// Same as [`Query::all`].
    pub fn first(&self) -> StoreResult<Option<M>> {
        self.page.validate()?;
        if self.page.limit == Some(0) {
            return Ok(None);
        }
        let page = Page::new(Some(1), self.page.offset);
        self.store
            .read(|source| source.query(self.ordering(), &self.params, page))
            .map(|rows| rows.into_iter().next())
    }

    /// Lazy results; the cursor keeps its own connection open until dropped.
    ///
    /// # Errors
    /// Returns an error for an undeclared column, a negative page bound, or
    /// when the database cannot be opened.
    pub fn cursor(&self) -> StoreResult<ModelCursor<M>> {
        self.store.open()?.cursor(self.ordering(), self.params.clone(), self.page)
    }

    /// Build a model from the predicates and save it.
    ///
    /// # Errors
    /// Returns [`crate::StoreError::Transcribe`] when a predicate names an
    /// undeclared field or does not parse as its kind, or a database failure.
    pub fn insert(&self) -> StoreResult<M> {
        let mut model: M = inflate_from_params(self.store.schema(), &self.params)?;
        self.store.save(&mut model)?;
        Ok(model)
    }

    /// Remove every row matching the predicates.
    ///
    /// # Errors
    /// Returns an error for an undeclared column or a database failure.
    pub fn delete(&self) -> StoreResult<usize> {
        self.store.delete_where(&self.params)
    }

    /// Predicates with literals inlined, for logs.
    #[must_use]
    pub fn describe(&self) -> String {
        debug_clause(&self.params)
    }
}

impl<M: Model> Display for Query<M> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.store.schema().table_name())?;
        if !self.params.is_empty() {
            write!(f, " WHERE {}", self.describe())?;
        }
        if let Some(order) = &self.order_by {
            write!(f, " ORDER BY {order}")?;
        }
        if let Some(limit) = self.page.sql() {
            write!(f, " {limit}")?;
        }
        Ok(())
    }
}
