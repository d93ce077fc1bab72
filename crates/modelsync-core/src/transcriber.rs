use std::collections::{BTreeMap, HashMap};

use serde_json::{Map, Value};

use crate::error::TranscribeError;
use crate::model::Model;
use crate::param::Param;
use crate::schema::{FieldDescriptor, ModelSchema};
use crate::value::{FieldValue, StoredValue};

/// Column lookup over one result row.
pub trait RowSource {
    fn column(&self, name: &str) -> Option<StoredValue>;
}

impl RowSource for BTreeMap<String, StoredValue> {
    fn column(&self, name: &str) -> Option<StoredValue> {
        self.get(name).cloned()
    }
}

impl RowSource for HashMap<String, StoredValue> {
    fn column(&self, name: &str) -> Option<StoredValue> {
        self.get(name).cloned()
    }
}

/// Ordered `(column, value)` pairs ready to bind into a statement.
pub type RowValues = Vec<(String, StoredValue)>;

/// Which fields a projection carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Projection {
    /// Every field except the identity; the store assigns it.
    Insert,
    Full,
}

impl Projection {
    fn includes(self, field: &FieldDescriptor) -> bool {
        !(self == Self::Insert && field.is_identity())
    }
}

/// Build a model from a row that carries every declared column.
///
/// # Errors
/// [`TranscribeError::RowShape`] when a column is absent or unreadable as its kind.
pub fn inflate_from_row<M, R>(schema: &ModelSchema, row: &R) -> Result<M, TranscribeError>
where
    M: Model,
    R: RowSource + ?Sized,
{
    let mut model = M::default();
    for field in schema.fields() {
        let stored = row
            .column(field.name())
            .ok_or_else(|| TranscribeError::row_shape(field.name(), "column missing from row"))?;
        let value = FieldValue::from_stored(field.kind(), field.name(), &stored)?;
        write_field(&mut model, field, value)?;
    }
    Ok(model)
}

/// Build a model from a JSON object. See [`merge_json`].
///
/// # Errors
/// [`TranscribeError::Payload`] when `payload` is not an object or a field has the wrong type.
pub fn inflate_from_json<M: Model>(schema: &ModelSchema, payload: &Value) -> Result<M, TranscribeError> {
    let mut model = M::default();
    merge_json(schema, &mut model, payload)?;
    Ok(model)
}

/// Overwrite the fields of `model` present in `payload`. Absent keys and
/// explicit nulls leave the current value alone; unknown keys are ignored.
///
/// # Errors
/// [`TranscribeError::Payload`] when `payload` is not an object or a field has the wrong type.
pub fn merge_json<M: Model>(
    schema: &ModelSchema,
    model: &mut M,
    payload: &Value,
) -> Result<(), TranscribeError> {
    let Value::Object(object) = payload else {
        return Err(TranscribeError::payload(schema.type_name(), "expected a JSON object"));
    };

    for field in schema.fields() {
        match object.get(field.name()) {
            None | Some(Value::Null) => {}
            Some(raw) => {
                let value = FieldValue::from_json(field.kind(), field.name(), raw)?;
                write_field(model, field, value)?;
            }
        }
    }
    Ok(())
}

/// Build a model whose fields are the predicate values.
///
/// # Errors
/// [`TranscribeError::UnknownField`] for a key that is not a declared column,
/// [`TranscribeError::InvalidParam`] for a value that does not parse as the field's kind.
pub fn inflate_from_params<M: Model>(schema: &ModelSchema, params: &[Param]) -> Result<M, TranscribeError> {
    let mut model = M::default();
    for param in params {
        let field = schema.field(param.key()).ok_or_else(|| TranscribeError::UnknownField {
            model: schema.type_name().to_string(),
            field: param.key().to_string(),
        })?;
        let value = FieldValue::from_param(field.kind(), field.name(), param.value())?;
        write_field(&mut model, field, value)?;
    }
    Ok(model)
}

/// # Errors
/// [`TranscribeError::KindMismatch`] when the model reports a value of the wrong kind.
pub fn project_row<M: Model>(
    schema: &ModelSchema,
    model: &M,
    projection: Projection,
) -> Result<RowValues, TranscribeError> {
    schema
        .fields()
        .iter()
        .filter(|field| projection.includes(field))
        .map(|field| Ok((field.name().to_string(), read_field(model, field)?.to_stored())))
        .collect()
}

/// Unset text and byte fields are omitted rather than written as null.
///
/// # Errors
/// [`TranscribeError::KindMismatch`] for a wrongly kinded value and
/// [`TranscribeError::Payload`] for a float JSON cannot represent.
pub fn project_json<M: Model>(
    schema: &ModelSchema,
    model: &M,
    projection: Projection,
) -> Result<Map<String, Value>, TranscribeError> {
    let mut object = Map::new();
    for field in schema.fields().iter().filter(|field| projection.includes(field)) {
        if let Some(value) = read_field(model, field)?.to_json(field.name())? {
            object.insert(field.name().to_string(), value);
        }
    }
    Ok(object)
}

/// Current value of `field` on `model`, with the identity read through
/// [`Model::identity`].
///
/// # Errors
/// [`TranscribeError::MissingAccessor`] when the model has no value for a
/// declared field, [`TranscribeError::KindMismatch`] when it reports one of
/// the wrong kind.
pub fn read_field<M: Model>(model: &M, field: &FieldDescriptor) -> Result<FieldValue, TranscribeError> {
    if field.is_identity() {
        return Ok(FieldValue::Int64(model.identity()));
    }

    let value = model
        .field(field.name())
        .ok_or_else(|| TranscribeError::MissingAccessor { field: field.name().to_string() })?;
    if value.kind() != field.kind() {
        return Err(TranscribeError::KindMismatch {
            field: field.name().to_string(),
            expected: field.kind(),
            found: value.kind(),
        });
    }
    Ok(value)
}

fn write_field<M: Model>(
    model: &mut M,
    field: &FieldDescriptor,
    value: FieldValue,
) -> Result<(), TranscribeError> {
    if field.is_identity() {
        model.set_identity(value.into_i64(field.name())?);
        return Ok(());
    }
    model.set_field(field.name(), value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldDescriptor, ModelSchemaBuilder};
    use crate::value::FieldKind;
    use serde_json::json;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Sample {
        id: i64,
        my_int: i32,
        my_bool: bool,
        my_string: Option<String>,
        my_bytes: Option<Vec<u8>>,
    }

    impl Model for Sample {
        fn describe() -> ModelSchemaBuilder {
            ModelSchema::for_type::<Self>()
                .field(FieldDescriptor::new("my_int", FieldKind::Int32))
                .field(FieldDescriptor::new("my_bool", FieldKind::Bool))
                .field(FieldDescriptor::new("my_string", FieldKind::String).unique())
                .field(FieldDescriptor::new("my_bytes", FieldKind::Bytes))
        }

        fn field(&self, name: &str) -> Option<FieldValue> {
            match name {
                "my_int" => Some(self.my_int.into()),
                "my_bool" => Some(self.my_bool.into()),
                "my_string" => Some(self.my_string.clone().into()),
                "my_bytes" => Some(self.my_bytes.clone().into()),
                _ => None,
            }
        }

        fn set_field(&mut self, name: &str, value: FieldValue) -> Result<(), TranscribeError> {
            match name {
                "my_int" => self.my_int = value.into_i32(name)?,
                "my_bool" => self.my_bool = value.into_bool(name)?,
                "my_string" => self.my_string = value.into_text(name)?,
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

    /// Declares `my_bytes` through `Sample`'s schema but never reports it.
    #[derive(Debug, Clone, Default)]
    struct Forgetful(Sample);

    impl Model for Forgetful {
        fn describe() -> ModelSchemaBuilder {
            Sample::describe()
        }

        fn field(&self, name: &str) -> Option<FieldValue> {
            match name {
                "my_bytes" => None,
                _ => self.0.field(name),
            }
        }

        fn set_field(&mut self, name: &str, value: FieldValue) -> Result<(), TranscribeError> {
            self.0.set_field(name, value)
        }

        fn identity(&self) -> i64 {
            self.0.id
        }

        fn set_identity(&mut self, identity: i64) {
            self.0.id = identity;
        }
    }

    #[test]
    fn undeclared_accessor_is_an_error() -> anyhow::Result<()> {
        let schema = Forgetful::schema()?;
        let forgetful = Forgetful(Sample { my_int: 1, ..Sample::default() });
        let missing = |result: Result<_, TranscribeError>| {
            matches!(result, Err(TranscribeError::MissingAccessor { field }) if field == "my_bytes")
        };

        assert!(missing(project_row(&schema, &forgetful, Projection::Insert).map(drop)));
        assert!(missing(project_json(&schema, &forgetful, Projection::Full).map(drop)));
        let my_int = schema.field("my_int").ok_or_else(|| anyhow::anyhow!("my_int missing"))?;
        assert_eq!(read_field(&forgetful, my_int)?, FieldValue::Int32(1));
        Ok(())
    }

    #[test]
    fn insert_projection_drops_identity() -> anyhow::Result<()> {
        let schema = Sample::schema()?;
        let sample = Sample { id: 9, my_int: 3, ..Sample::default() };

        let insert = project_row(&schema, &sample, Projection::Insert)?;
        assert!(insert.iter().all(|(column, _)| column != "_id"));

        let full = project_row(&schema, &sample, Projection::Full)?;
        assert!(full.contains(&("_id".to_string(), StoredValue::Integer(9))));
        assert!(full.contains(&("my_bytes".to_string(), StoredValue::Null)));
        Ok(())
    }

    #[test]
    fn row_round_trip_restores_every_field() -> anyhow::Result<()> {
        let schema = Sample::schema()?;
        let sample = Sample {
            id: 4,
            my_int: -12,
            my_bool: true,
            my_string: Some("Hello".to_string()),
            my_bytes: Some(vec![0, 0, 0, 1, 1, 1]),
        };
        let row: BTreeMap<String, StoredValue> =
            project_row(&schema, &sample, Projection::Full)?.into_iter().collect();
        let restored: Sample = inflate_from_row(&schema, &row)?;
        assert_eq!(restored, sample);
        Ok(())
    }

    #[test]
    fn missing_row_column_is_row_shape_error() -> anyhow::Result<()> {
        let schema = Sample::schema()?;
        let row: BTreeMap<String, StoredValue> =
            BTreeMap::from([("my_int".to_string(), StoredValue::Integer(1))]);
        let result: Result<Sample, _> = inflate_from_row(&schema, &row);
        assert!(matches!(result, Err(TranscribeError::RowShape { .. })));
        Ok(())
    }

    #[test]
    fn json_omits_unset_fields_and_skips_nulls() -> anyhow::Result<()> {
        let schema = Sample::schema()?;
        let sample = Sample { my_int: 5, ..Sample::default() };
        let object = project_json(&schema, &sample, Projection::Insert)?;
        assert_eq!(Value::Object(object), json!({"my_int": 5, "my_bool": false}));

        let inflated: Sample = inflate_from_json(
            &schema,
            &json!({"my_int": "7", "my_bool": "false", "my_string": null, "extra": 1}),
        )?;
        assert_eq!(inflated, Sample { my_int: 7, ..Sample::default() });
        Ok(())
    }

    #[test]
    fn merge_keeps_identity_when_payload_lacks_it() -> anyhow::Result<()> {
        let schema = Sample::schema()?;
        let mut sample = Sample { id: 3, my_int: 1, ..Sample::default() };
        merge_json(&schema, &mut sample, &json!({"my_int": 2, "my_string": "x"}))?;
        assert_eq!(sample.id, 3);
        assert_eq!(sample.my_int, 2);
        assert_eq!(sample.my_string.as_deref(), Some("x"));

        merge_json(&schema, &mut sample, &json!({"_id": 11}))?;
        assert_eq!(sample.id, 11);
        Ok(())
    }

    #[test]
    fn json_type_mismatch_and_non_object_fail() -> anyhow::Result<()> {
        let schema = Sample::schema()?;
        let mismatch: Result<Sample, _> = inflate_from_json(&schema, &json!({"my_int": [1]}));
        assert!(matches!(mismatch, Err(TranscribeError::Payload { .. })));
        let array: Result<Sample, _> = inflate_from_json(&schema, &json!([]));
        assert!(matches!(array, Err(TranscribeError::Payload { .. })));
        Ok(())
    }

    #[test]
    fn params_inflate_declared_fields_only() -> anyhow::Result<()> {
        let schema = Sample::schema()?;
        let sample: Sample = inflate_from_params(
            &schema,
            &[Param::new("my_string", "Hello"), Param::new("my_int", "42")],
        )?;
        assert_eq!(sample.my_string.as_deref(), Some("Hello"));
        assert_eq!(sample.my_int, 42);

        let unknown: Result<Sample, _> = inflate_from_params(&schema, &[Param::new("nope", 1)]);
        assert!(matches!(unknown, Err(TranscribeError::UnknownField { .. })));
        Ok(())
    }
}
