use std::future::Future;
use std::sync::Arc;

use modelsync_core::{merge_json, project_json, read_field, Model, ModelSchema, Projection};
use modelsync_store_sqlite::Store;
use serde_json::Value;
use tokio::runtime::Handle;
use url::Url;

use crate::dispatch::MainContext;
use crate::error::SyncError;
use crate::query::RemoteQuery;
use crate::server::Server;

/// Completion handler; always invoked on the [`MainContext`].
pub type Callback<T> = Box<dyn FnOnce(Result<T, SyncError>) + Send + 'static>;

/// Box a closure as an optional [`Callback`].
pub fn callback<T>(f: impl FnOnce(Result<T, SyncError>) + Send + 'static) -> Option<Callback<T>> {
    Some(Box::new(f))
}

/// A [`Store`] mirrored against a remote JSON resource.
///
/// Network I/O runs on `runtime`; completions and every cache write caused
/// by a response run on the main context.
#[derive(Clone)]
pub struct RemoteSync<M: Model> {
    store: Store<M>,
    url: Option<String>,
    server: Arc<dyn Server>,
    runtime: Handle,
    main: Arc<MainContext>,
}

impl<M: Model> std::fmt::Debug for RemoteSync<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteSync")
            .field("store", &self.store)
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

impl<M: Model> RemoteSync<M> {
    #[must_use]
    pub fn new(store: Store<M>, server: Arc<dyn Server>, runtime: Handle, main: Arc<MainContext>) -> Self {
        Self { store, url: None, server, runtime, main }
    }

    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    #[must_use]
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    #[must_use]
    pub fn store(&self) -> &Store<M> {
        &self.store
    }

    #[must_use]
    pub fn server(&self) -> &Arc<dyn Server> {
        &self.server
    }

    #[must_use]
    pub fn main_context(&self) -> &Arc<MainContext> {
        &self.main
    }

    #[must_use]
    pub fn query(&self) -> RemoteQuery<M> {
        RemoteQuery::new(self.clone())
    }

    /// # Errors
    /// [`SyncError::Configuration`] when no resource URL is set.
    pub fn require_url(&self) -> Result<&str, SyncError> {
        self.url.as_deref().ok_or_else(|| {
            SyncError::Configuration(format!("no remote URL set for {}", self.store.schema().type_name()))
        })
    }

    /// POST `model` and save the merged response locally. Returns at once;
    /// `callback` receives the merged model.
    ///
    /// # Errors
    /// [`SyncError::Configuration`] when no resource URL is set.
    pub fn save(&self, model: &M, callback: Option<Callback<M>>) -> Result<(), SyncError> {
        self.require_url()?;
        let Some(callback) = callback else {
            tracing::warn!("No callback set; skipping remote save of {}", self.store.schema().type_name());
            return Ok(());
        };
        let this = self.clone();
        let model = model.clone();
        self.dispatch(async move { this.push_save(model).await }, callback);
        Ok(())
    }

    /// PUT `model` to its resource and save the merged response locally.
    ///
    /// # Errors
    /// [`SyncError::Configuration`] when no resource URL is set.
    pub fn update(&self, model: &M, callback: Option<Callback<M>>) -> Result<(), SyncError> {
        self.require_url()?;
        let Some(callback) = callback else {
            tracing::warn!("No callback set; skipping remote update of {}", self.store.schema().type_name());
            return Ok(());
        };
        let this = self.clone();
        let model = model.clone();
        self.dispatch(async move { this.push_update(model).await }, callback);
        Ok(())
    }

    /// DELETE the model's resource, then its local row.
    ///
    /// # Errors
    /// [`SyncError::Configuration`] when no resource URL is set.
    pub fn delete(&self, model: &M, callback: Option<Callback<()>>) -> Result<(), SyncError> {
        self.require_url()?;
        let Some(callback) = callback else {
            tracing::warn!("No callback set; skipping remote delete of {}", self.store.schema().type_name());
            return Ok(());
        };
        let this = self.clone();
        let model = model.clone();
        self.dispatch(async move { this.push_delete(model).await }, callback);
        Ok(())
    }

    /// # Errors
    /// Configuration, transport, payload or store failures.
    pub async fn push_save(&self, model: M) -> Result<M, SyncError> {
        let url = self.require_url()?.to_string();
        let body = Value::Object(project_json(self.store.schema(), &model, Projection::Full)?);
        let response = self.server.post(&url, body).await?;
        self.merge_and_save(model, response.as_value()?).await
    }

    /// # Errors
    /// Configuration, transport, payload or store failures.
    pub async fn push_update(&self, model: M) -> Result<M, SyncError> {
        let url = join_path(self.require_url()?, &resource_key(self.store.schema(), &model)?)?;
        let body = Value::Object(project_json(self.store.schema(), &model, Projection::Full)?);
        let response = self.server.put(&url, body).await?;
        self.merge_and_save(model, response.as_value()?).await
    }

    /// # Errors
    /// Configuration, transport or store failures. The local row is kept
    /// when the server refuses the delete.
    pub async fn push_delete(&self, model: M) -> Result<(), SyncError> {
        let url = join_path(self.require_url()?, &resource_key(self.store.schema(), &model)?)?;
        self.server.delete(&url).await?;

        let store = self.store.clone();
        self.main
            .run(move || {
                store.delete(&model)?;
                Ok(())
            })
            .await
    }

    async fn merge_and_save(&self, mut model: M, payload: Value) -> Result<M, SyncError> {
        let store = self.store.clone();
        self.main
            .run(move || {
                merge_json(store.schema(), &mut model, &payload)?;
                store.save(&mut model)?;
                Ok(model)
            })
            .await
    }

    /// Drive `work` on the runtime and hand its result to `callback` on the
    /// main context.
    pub(crate) fn dispatch<T, F>(&self, work: F, callback: Callback<T>)
    where
        F: Future<Output = Result<T, SyncError>> + Send + 'static,
        T: Send + 'static,
    {
        let main = Arc::clone(&self.main);
        let type_name = self.store.schema().type_name().to_string();
        self.runtime.spawn(async move {
            let result = work.await;
            if let Err(err) = &result {
                tracing::error!("Remote request for {} failed: {}", type_name, err);
            }
            if main.post(move || callback(result)).is_err() {
                tracing::error!("Main context stopped; dropping callback for {}", type_name);
            }
        });
    }
}

/// Path segment naming `model` on the server: the first set unique field,
/// else the identity.
pub(crate) fn resource_key<M: Model>(schema: &ModelSchema, model: &M) -> Result<String, SyncError> {
    for field in schema.unique_fields() {
        let value = read_field(model, field)?;
        if !value.is_unset() {
            return Ok(value.wire_string());
        }
    }
    Ok(model.identity().to_string())
}

pub(crate) fn join_path(url: &str, segment: &str) -> Result<String, SyncError> {
    let mut resource = Url::parse(url).map_err(|err| SyncError::Configuration(format!("invalid URL `{url}`: {err}")))?;
    resource
        .path_segments_mut()
        .map_err(|()| SyncError::Configuration(format!("URL `{url}` cannot take a path segment")))?
        .pop_if_empty()
        .push(segment);
    Ok(resource.into())
}
