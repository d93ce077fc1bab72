use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::SchemaError;
use crate::value::FieldKind;

/// Name of the autoincrement primary key every table carries.
pub const IDENTITY_COLUMN: &str = "_id";

/// One persisted field of a model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldDescriptor {
    name: String,
    kind: FieldKind,
    #[serde(default)]
    unique: bool,
    #[serde(default)]
    introduced_in: Option<u32>,
}

impl FieldDescriptor {
    #[must_use]
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self { name: name.into(), kind, unique: false, introduced_in: None }
    }

    /// Part of the natural key used by `update` and remote deletes.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Column is added by an in-place migration to `version`.
    #[must_use]
    pub fn since_version(mut self, version: u32) -> Self {
        self.introduced_in = Some(version);
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    #[must_use]
    pub fn is_unique(&self) -> bool {
        self.unique
    }

    #[must_use]
    pub fn introduced_in(&self) -> Option<u32> {
        self.introduced_in
    }

    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.name == IDENTITY_COLUMN
    }
}

/// Immutable persistence description of one model type.
///
/// Deserialization goes through [`ModelSchemaBuilder::build`], so a stored
/// schema is validated like a declared one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(try_from = "ModelSchemaBuilder")]
pub struct ModelSchema {
    type_name: String,
    table_name: String,
    database_name: String,
    version: u32,
    retain_data_on_upgrade: bool,
    fields: Vec<FieldDescriptor>,
    #[serde(skip_serializing)]
    identity_index: usize,
}

impl ModelSchema {
    #[must_use]
    pub fn builder(type_name: impl Into<String>) -> ModelSchemaBuilder {
        ModelSchemaBuilder::new(type_name.into())
    }

    /// Builder seeded with the Rust type path of `M`, which drives the
    /// default table and database names.
    #[must_use]
    pub fn for_type<M: ?Sized>() -> ModelSchemaBuilder {
        Self::builder(std::any::type_name::<M>())
    }

    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    #[must_use]
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    #[must_use]
    pub fn database_name(&self) -> &str {
        &self.database_name
    }

    #[must_use]
    pub fn version(&self) -> u32 {
        self.version
    }

    #[must_use]
    pub fn retain_data_on_upgrade(&self) -> bool {
        self.retain_data_on_upgrade
    }

    /// Declared fields in order, identity included.
    #[must_use]
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|field| field.name == name)
    }

    #[must_use]
    pub fn identity(&self) -> &FieldDescriptor {
        &self.fields[self.identity_index]
    }

    pub fn unique_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(|field| field.unique)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|field| field.name.as_str())
    }

    pub fn fields_introduced_in(&self, version: u32) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(move |field| field.introduced_in == Some(version))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelSchemaBuilder {
    type_name: String,
    #[serde(default)]
    table_name: Option<String>,
    #[serde(default)]
    database_name: Option<String>,
    #[serde(default = "first_version")]
    version: u32,
    #[serde(default)]
    retain_data_on_upgrade: bool,
    #[serde(default)]
    fields: Vec<FieldDescriptor>,
}

fn first_version() -> u32 {
    1
}

impl TryFrom<ModelSchemaBuilder> for ModelSchema {
    type Error = SchemaError;

    /// Accepts both a declaration and a serialized schema, whose database
    /// name already carries the `.db` suffix.
    fn try_from(mut builder: ModelSchemaBuilder) -> Result<Self, Self::Error> {
        if let Some(stem) = builder.database_name.as_deref().and_then(|name| name.strip_suffix(".db")) {
            builder.database_name = Some(stem.to_string());
        }
        builder.build()
    }
}

impl ModelSchemaBuilder {
    fn new(type_name: String) -> Self {
        Self {
            type_name,
            table_name: None,
            database_name: None,
            version: 1,
            retain_data_on_upgrade: false,
            fields: Vec::new(),
        }
    }

    #[must_use]
    pub fn table_name(mut self, name: impl Into<String>) -> Self {
        self.table_name = Some(name.into());
        self
    }

    /// File name stem; `.db` is appended.
    #[must_use]
    pub fn database_name(mut self, name: impl Into<String>) -> Self {
        self.database_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    #[must_use]
    pub fn retain_data_on_upgrade(mut self, retain: bool) -> Self {
        self.retain_data_on_upgrade = retain;
        self
    }

    #[must_use]
    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    /// Validate and freeze the schema, appending `_id` when undeclared.
    ///
    /// # Errors
    /// Returns a [`SchemaError`] for bad identifiers, duplicate columns, a
    /// zero version, out-of-range field versions, or a malformed identity field.
    pub fn build(self) -> Result<ModelSchema, SchemaError> {
        if self.version == 0 {
            return Err(SchemaError::InvalidVersion);
        }

        let type_path = self.type_name.split('<').next().unwrap_or_default();
        let table_name = self
            .table_name
            .unwrap_or_else(|| type_path.rsplit("::").next().unwrap_or_default().to_string());
        if !is_identifier(&table_name) {
            return Err(SchemaError::InvalidTableName(table_name));
        }

        let database_stem = self.database_name.unwrap_or_else(|| type_path.replace("::", "."));
        if !is_database_stem(&database_stem) {
            return Err(SchemaError::InvalidDatabaseName(database_stem));
        }

        let mut seen = BTreeSet::new();
        let mut fields = Vec::with_capacity(self.fields.len() + 1);
        for field in self.fields {
            if !is_identifier(&field.name) {
                return Err(SchemaError::InvalidColumnName(field.name));
            }
            if !seen.insert(field.name.clone()) {
                return Err(SchemaError::DuplicateColumn(field.name));
            }
            if field.is_identity() {
                if field.kind != FieldKind::Int64 {
                    return Err(SchemaError::InvalidIdentityKind(field.kind));
                }
                if field.unique || field.introduced_in.is_some() {
                    return Err(SchemaError::InvalidIdentityAttributes);
                }
            }
            if let Some(version) = field.introduced_in {
                if version == 0 || version > self.version {
                    return Err(SchemaError::InvalidFieldVersion {
                        column: field.name,
                        version,
                        schema_version: self.version,
                    });
                }
            }
            fields.push(field);
        }

        let identity_index = match fields.iter().position(FieldDescriptor::is_identity) {
            Some(index) => index,
            None => {
                fields.push(FieldDescriptor::new(IDENTITY_COLUMN, FieldKind::Int64));
                fields.len() - 1
            }
        };

        Ok(ModelSchema {
            type_name: self.type_name,
            table_name,
            database_name: format!("{database_stem}.db"),
            version: self.version,
            retain_data_on_upgrade: self.retain_data_on_upgrade,
            fields,
            identity_index,
        })
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_database_stem(name: &str) -> bool {
    !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Sample;

    #[test]
    fn defaults_follow_type_path() -> Result<(), SchemaError> {
        let schema = ModelSchema::for_type::<Sample>()
            .field(FieldDescriptor::new("my_int", FieldKind::Int32))
            .build()?;

        assert_eq!(schema.table_name(), "Sample");
        assert_eq!(schema.database_name(), "modelsync_core.schema.tests.Sample.db");
        assert_eq!(schema.version(), 1);
        assert!(!schema.retain_data_on_upgrade());
        assert_eq!(schema.columns().collect::<Vec<_>>(), vec!["my_int", "_id"]);
        assert_eq!(schema.identity().kind(), FieldKind::Int64);
        Ok(())
    }

    #[test]
    fn overrides_append_db_suffix() -> Result<(), SchemaError> {
        let schema = ModelSchema::builder("app::Note")
            .table_name("notes")
            .database_name("local")
            .build()?;
        assert_eq!(schema.table_name(), "notes");
        assert_eq!(schema.database_name(), "local.db");
        Ok(())
    }

    #[test]
    fn declared_identity_keeps_its_position() -> Result<(), SchemaError> {
        let schema = ModelSchema::builder("Row")
            .field(FieldDescriptor::new(IDENTITY_COLUMN, FieldKind::Int64))
            .field(FieldDescriptor::new("name", FieldKind::String).unique())
            .build()?;
        assert_eq!(schema.columns().collect::<Vec<_>>(), vec!["_id", "name"]);
        assert_eq!(schema.unique_fields().count(), 1);
        Ok(())
    }

    #[test]
    fn rejects_malformed_declarations() {
        let bad_identity = ModelSchema::builder("Row")
            .field(FieldDescriptor::new(IDENTITY_COLUMN, FieldKind::String))
            .build();
        assert_eq!(bad_identity, Err(SchemaError::InvalidIdentityKind(FieldKind::String)));

        let duplicate = ModelSchema::builder("Row")
            .field(FieldDescriptor::new("a", FieldKind::Int32))
            .field(FieldDescriptor::new("a", FieldKind::Int64))
            .build();
        assert_eq!(duplicate, Err(SchemaError::DuplicateColumn("a".to_string())));

        let bad_column =
            ModelSchema::builder("Row").field(FieldDescriptor::new("a b", FieldKind::Bool)).build();
        assert_eq!(bad_column, Err(SchemaError::InvalidColumnName("a b".to_string())));

        assert_eq!(ModelSchema::builder("Row").version(0).build(), Err(SchemaError::InvalidVersion));

        let future_field = ModelSchema::builder("Row")
            .version(2)
            .field(FieldDescriptor::new("extra", FieldKind::Int32).since_version(3))
            .build();
        assert!(matches!(future_field, Err(SchemaError::InvalidFieldVersion { version: 3, .. })));
    }

    #[test]
    fn deserializing_validates_and_completes_the_schema() -> anyhow::Result<()> {
        let schema: ModelSchema = serde_json::from_value(serde_json::json!({
            "type_name": "app::Note",
            "fields": [{"name": "slug", "kind": "string", "unique": true}]
        }))?;
        assert_eq!(schema.columns().collect::<Vec<_>>(), vec!["slug", "_id"]);
        assert_eq!(schema.identity().name(), IDENTITY_COLUMN);
        assert_eq!(schema.database_name(), "app.Note.db");

        let restored: ModelSchema = serde_json::from_value(serde_json::to_value(&schema)?)?;
        assert_eq!(restored, schema);

        let bad_identity = serde_json::from_value::<ModelSchema>(serde_json::json!({
            "type_name": "Row",
            "fields": [{"name": "_id", "kind": "string"}]
        }));
        assert!(bad_identity.is_err());
        let zero_version =
            serde_json::from_value::<ModelSchema>(serde_json::json!({"type_name": "Row", "version": 0}));
        assert!(zero_version.is_err());
        Ok(())
    }

    #[test]
    fn fields_are_grouped_by_introduced_version() -> Result<(), SchemaError> {
        let schema = ModelSchema::builder("Row")
            .version(3)
            .field(FieldDescriptor::new("a", FieldKind::Int32))
            .field(FieldDescriptor::new("b", FieldKind::Int32).since_version(2))
            .field(FieldDescriptor::new("c", FieldKind::Int32).since_version(3))
            .field(FieldDescriptor::new("d", FieldKind::Int32).since_version(3))
            .build()?;
        let names = |v| schema.fields_introduced_in(v).map(FieldDescriptor::name).collect::<Vec<_>>();
        assert_eq!(names(2), vec!["b"]);
        assert_eq!(names(3), vec!["c", "d"]);
        assert!(names(1).is_empty());
        Ok(())
    }
}
