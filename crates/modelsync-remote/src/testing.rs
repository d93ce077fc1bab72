use std::io;
use std::sync::Arc;

use modelsync_core::{
    FieldDescriptor, FieldKind, FieldValue, Model, ModelSchema, ModelSchemaBuilder, TranscribeError,
};
use modelsync_store_sqlite::{JournalMode, ObserverRegistry, Store, StoreConfig};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::runtime::Handle;

use crate::dispatch::MainContext;
use crate::server::{Server, ServerFuture};
use crate::sync::RemoteSync;

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Note {
    pub id: i64,
    pub slug: Option<String>,
    pub body: Option<String>,
}

impl Model for Note {
    fn describe() -> ModelSchemaBuilder {
        ModelSchema::builder("modelsync.tests.Note")
            .table_name("Note")
            .database_name("notes")
            .field(FieldDescriptor::new("slug", FieldKind::String).unique())
            .field(FieldDescriptor::new("body", FieldKind::String))
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "slug" => Some(self.slug.clone().into()),
            "body" => Some(self.body.clone().into()),
            _ => None,
        }
    }

    fn set_field(&mut self, name: &str, value: FieldValue) -> Result<(), TranscribeError> {
        match name {
            "slug" => self.slug = value.into_text(name)?,
            "body" => self.body = value.into_text(name)?,
            _ => {
                return Err(TranscribeError::UnknownField { model: "Note".to_string(), field: name.to_string() })
            }
        }
        Ok(())
    }

    fn identity(&self) -> i64 {
        self.id
    }

    fn set_identity(&mut self, identity: i64) {
        self.id = identity;
    }
}

/// Server for paths that must never reach the network.
pub(crate) struct Unreachable;

impl Server for Unreachable {
    fn get(&self, url: &str, _params: &[(String, String)]) -> ServerFuture {
        unreachable!("unexpected GET {url}")
    }

    fn post(&self, url: &str, _body: Value) -> ServerFuture {
        unreachable!("unexpected POST {url}")
    }

    fn put(&self, url: &str, _body: Value) -> ServerFuture {
        unreachable!("unexpected PUT {url}")
    }

    fn delete(&self, url: &str) -> ServerFuture {
        unreachable!("unexpected DELETE {url}")
    }
}

/// Note sync without a URL over a fresh database in `dir`.
pub(crate) fn remote_notes(
    dir: &tempfile::TempDir,
    server: Arc<dyn Server>,
    runtime: Handle,
) -> anyhow::Result<RemoteSync<Note>> {
    let config = StoreConfig { journal_mode: JournalMode::Delete, ..StoreConfig::new(dir.path()) };
    let store = Store::new(Arc::new(config), Arc::new(ObserverRegistry::new()))?;
    Ok(RemoteSync::new(store, server, runtime, Arc::new(MainContext::new()?)))
}

/// Log lines emitted on the current thread while [`CapturedLogs::during`] runs.
#[derive(Debug, Clone, Default)]
pub(crate) struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    pub(crate) fn during<T>(&self, f: impl FnOnce() -> T) -> T {
        let writer = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .without_time()
            .finish();
        tracing::subscriber::with_default(subscriber, f)
    }

    pub(crate) fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
