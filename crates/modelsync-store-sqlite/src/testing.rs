use modelsync_core::{
    FieldDescriptor, FieldKind, FieldValue, Model, ModelSchema, ModelSchemaBuilder, TranscribeError,
};

use crate::config::{JournalMode, StoreConfig};

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Sample {
    pub id: i64,
    pub title: Option<String>,
    pub my_int: i32,
    pub my_bool: bool,
    pub my_bytes: Option<Vec<u8>>,
}

impl Sample {
    pub fn titled(title: &str) -> Self {
        Self { title: Some(title.to_string()), ..Self::default() }
    }
}

impl Model for Sample {
    fn describe() -> ModelSchemaBuilder {
        ModelSchema::builder("modelsync.tests.Sample")
            .table_name("Sample")
            .database_name("sample")
            .field(FieldDescriptor::new("title", FieldKind::String).unique())
            .field(FieldDescriptor::new("my_int", FieldKind::Int32))
            .field(FieldDescriptor::new("my_bool", FieldKind::Bool))
            .field(FieldDescriptor::new("my_bytes", FieldKind::Bytes))
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "title" => Some(self.title.clone().into()),
            "my_int" => Some(self.my_int.into()),
            "my_bool" => Some(self.my_bool.into()),
            "my_bytes" => Some(self.my_bytes.clone().into()),
            _ => None,
        }
    }

    fn set_field(&mut self, name: &str, value: FieldValue) -> Result<(), TranscribeError> {
        match name {
            "title" => self.title = value.into_text(name)?,
            "my_int" => self.my_int = value.into_i32(name)?,
            "my_bool" => self.my_bool = value.into_bool(name)?,
            "my_bytes" => self.my_bytes = value.into_bytes(name)?,
            _ => {
                return Err(TranscribeError::UnknownField {
                    model: "Sample".to_string(),
                    field: name.to_string(),
                })
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

pub(crate) fn sample_store_config(dir: &tempfile::TempDir) -> StoreConfig {
    StoreConfig { journal_mode: JournalMode::Delete, ..StoreConfig::new(dir.path()) }
}
