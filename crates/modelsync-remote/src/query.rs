use std::slice;

use modelsync_core::{
    inflate_from_json, project_json, FieldDescriptor, FieldValue, Model, Param, Projection, IDENTITY_COLUMN,
};
use modelsync_store_sqlite::Query;
use serde_json::Value;

use crate::error::SyncError;
use crate::sync::{join_path, Callback, RemoteSync};

/// A local [`Query`] whose results can be refreshed from the server.
///
/// Every terminal returns the local answer first. With a callback it also
/// asks the server, reconciles the cache, and calls back with the server's
/// answer.
#[derive(Debug, Clone)]
pub struct RemoteQuery<M: Model> {
    sync: RemoteSync<M>,
    query: Query<M>,
}

impl<M: Model> RemoteQuery<M> {
    #[must_use]
    pub fn new(sync: RemoteSync<M>) -> Self {
        let query = sync.store().query();
        Self { sync, query }
    }

    #[must_use]
    pub fn where_eq(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.query = self.query.where_eq(key, value);
        self
    }

    #[must_use]
    pub fn param(mut self, param: Param) -> Self {
        self.query = self.query.param(param);
        self
    }

    #[must_use]
    pub fn params(mut self, params: impl IntoIterator<Item = Param>) -> Self {
        self.query = self.query.params(params);
        self
    }

    #[must_use]
    pub fn order_by(mut self, order: impl Into<String>) -> Self {
        self.query = self.query.order_by(order);
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: i64) -> Self {
        self.query = self.query.limit(limit);
        self
    }

    #[must_use]
    pub fn offset(mut self, offset: i64) -> Self {
        self.query = self.query.offset(offset);
        self
    }

    #[must_use]
    pub fn local(&self) -> &Query<M> {
        &self.query
    }

    #[must_use]
    pub fn sync(&self) -> &RemoteSync<M> {
        &self.sync
    }

    /// Cached rows now; with a callback, the server's list once the cache
    /// has been reconciled.
    ///
    /// # Errors
    /// [`SyncError::Configuration`] when a callback is given without a URL,
    /// or the local query's error.
    pub fn all(&self, callback: Option<Callback<Vec<M>>>) -> Result<Vec<M>, SyncError> {
        if callback.is_some() {
            self.sync.require_url()?;
        }
        let cached = self.query.all()?;
        match callback {
            Some(callback) => {
                let this = self.clone();
                self.sync.dispatch(async move { this.fetch_all().await }, callback);
            }
            None => self.warn_local_only("all"),
        }
        Ok(cached)
    }

    /// Single-row variant of [`RemoteQuery::all`].
    ///
    /// # Errors
    /// Same as [`RemoteQuery::all`].
    pub fn first(&self, callback: Option<Callback<Option<M>>>) -> Result<Option<M>, SyncError> {
        if callback.is_some() {
            self.sync.require_url()?;
        }
        let cached = self.query.first()?;
        match callback {
            Some(callback) => {
                let this = self.clone();
                self.sync.dispatch(async move { this.fetch_first().await }, callback);
            }
            None => self.warn_local_only("first"),
        }
        Ok(cached)
    }

    /// Save a placeholder built from the predicates. Without a callback the
    /// placeholder is returned; with one it is POSTed, `None` is returned,
    /// and the placeholder is later swapped for the server's model.
    ///
    /// # Errors
    /// [`SyncError::Configuration`] when a callback is given without a URL
    /// (nothing is written), or the local insert's error.
    pub fn insert(&self, callback: Option<Callback<M>>) -> Result<Option<M>, SyncError> {
        if callback.is_some() {
            self.sync.require_url()?;
        }
        let placeholder = self.query.insert()?;
        let Some(callback) = callback else {
            self.warn_local_only("insert");
            return Ok(Some(placeholder));
        };
        let this = self.clone();
        self.sync.dispatch(async move { this.reconcile_insert(placeholder).await }, callback);
        Ok(None)
    }

    /// `GET url?k=v..`, then replace the cached rows matching the
    /// predicates with the response in one transaction.
    ///
    /// # Errors
    /// Configuration, transport, payload or store failures; the cache is
    /// untouched on error.
    pub async fn fetch_all(&self) -> Result<Vec<M>, SyncError> {
        let url = self.sync.require_url()?.to_string();
        let params = self.query.predicates().iter().map(Param::form_field).collect::<Vec<_>>();
        let items = self.sync.server().get(&url, &params).await?.items()?;

        let store = self.query.store().clone();
        let predicates = self.query.predicates().to_vec();
        self.sync
            .main_context()
            .run(move || {
                let mut models = items
                    .iter()
                    .map(|item| inflate_from_json(store.schema(), item))
                    .collect::<Result<Vec<M>, _>>()?;
                let removed = store.replace_matching(&predicates, &mut models)?;
                tracing::debug!(
                    "Reconciled {}: {} cached, {} from server",
                    store.schema().table_name(),
                    removed,
                    models.len()
                );
                Ok(models)
            })
            .await
    }

    /// Like [`RemoteQuery::fetch_all`] for one object. An empty array clears
    /// the matching cache and yields `None`.
    ///
    /// # Errors
    /// Same as [`RemoteQuery::fetch_all`].
    pub async fn fetch_first(&self) -> Result<Option<M>, SyncError> {
        let (url, params) = self.resource_target()?;
        let item = self.sync.server().get(&url, &params).await?.items()?.into_iter().next();

        let store = self.query.store().clone();
        let predicates = self.query.predicates().to_vec();
        self.sync
            .main_context()
            .run(move || match item {
                Some(item) => {
                    let mut model: M = inflate_from_json(store.schema(), &item)?;
                    store.replace_matching(&predicates, slice::from_mut(&mut model))?;
                    Ok(Some(model))
                }
                None => {
                    store.delete_where(&predicates)?;
                    Ok(None)
                }
            })
            .await
    }

    /// Save a placeholder and reconcile it against the server's response.
    ///
    /// # Errors
    /// Configuration, transport, payload or store failures. A placeholder
    /// already saved stays in the cache when the request fails.
    pub async fn push_insert(&self) -> Result<M, SyncError> {
        self.sync.require_url()?;
        let placeholder = self.query.insert()?;
        self.reconcile_insert(placeholder).await
    }

    async fn reconcile_insert(&self, placeholder: M) -> Result<M, SyncError> {
        let url = self.sync.require_url()?.to_string();
        let store = self.query.store().clone();
        let body = Value::Object(project_json(store.schema(), &placeholder, Projection::Insert)?);
        let payload = self.sync.server().post(&url, body).await?.as_value()?;

        self.sync
            .main_context()
            .run(move || {
                let mut model: M = inflate_from_json(store.schema(), &payload)?;
                let placeholder_key = [Param::new(IDENTITY_COLUMN, placeholder.identity())];
                store.replace_matching(&placeholder_key, slice::from_mut(&mut model))?;
                Ok(model)
            })
            .await
    }

    fn warn_local_only(&self, operation: &str) {
        tracing::warn!(
            "No callback set; skipping remote {} of {}",
            operation,
            self.query.store().schema().type_name()
        );
    }

    /// `url/{value}` when exactly one predicate addresses a single resource,
    /// with that predicate left out of the query string.
    fn resource_target(&self) -> Result<(String, Vec<(String, String)>), SyncError> {
        let url = self.sync.require_url()?;
        let schema = self.query.store().schema();
        let predicates = self.query.predicates();
        let addresses_resource = |param: &Param| {
            param.is_primary() || schema.field(param.key()).is_some_and(FieldDescriptor::is_unique)
        };

        let mut keyed = predicates.iter().enumerate().filter(|&(_, param)| addresses_resource(param));
        match (keyed.next(), keyed.next()) {
            (Some((index, key)), None) => {
                let params = predicates
                    .iter()
                    .enumerate()
                    .filter(|(other, _)| *other != index)
                    .map(|(_, param)| param.form_field())
                    .collect();
                Ok((join_path(url, &key.wire_value())?, params))
            }
            _ => Ok((url.to_string(), predicates.iter().map(Param::form_field).collect())),
        }
    }
}
