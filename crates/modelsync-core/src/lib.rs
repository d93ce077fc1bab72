//! Model schema, value coercion and transcription shared by the local store
//! and the remote sync layer.

mod error;
mod model;
mod param;
mod schema;
mod transcriber;
mod value;

pub use error::{SchemaError, TranscribeError};
pub use model::{schema_of, Model};
pub use param::{debug_clause, sql_arguments, where_clause, Param};
pub use schema::{FieldDescriptor, ModelSchema, ModelSchemaBuilder, IDENTITY_COLUMN};
pub use transcriber::{
    inflate_from_json, inflate_from_params, inflate_from_row, merge_json, project_json,
    project_row, read_field, Projection, RowSource, RowValues,
};
pub use value::{FieldKind, FieldValue, StoredValue};

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use proptest::prelude::*;
    use serde_json::Value;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Everything {
        id: i64,
        small: i32,
        large: i64,
        ratio: f32,
        flag: bool,
        label: Option<String>,
        blob: Option<Vec<u8>>,
    }

    impl Model for Everything {
        fn describe() -> ModelSchemaBuilder {
            ModelSchema::for_type::<Self>()
                .field(FieldDescriptor::new("small", FieldKind::Int32))
                .field(FieldDescriptor::new("large", FieldKind::Int64))
                .field(FieldDescriptor::new("ratio", FieldKind::Float32))
                .field(FieldDescriptor::new("flag", FieldKind::Bool))
                .field(FieldDescriptor::new("label", FieldKind::String))
                .field(FieldDescriptor::new("blob", FieldKind::Bytes))
        }

        fn field(&self, name: &str) -> Option<FieldValue> {
            match name {
                "small" => Some(self.small.into()),
                "large" => Some(self.large.into()),
                "ratio" => Some(self.ratio.into()),
                "flag" => Some(self.flag.into()),
                "label" => Some(self.label.clone().into()),
                "blob" => Some(self.blob.clone().into()),
                _ => None,
            }
        }

        fn set_field(&mut self, name: &str, value: FieldValue) -> Result<(), TranscribeError> {
            match name {
                "small" => self.small = value.into_i32(name)?,
                "large" => self.large = value.into_i64(name)?,
                "ratio" => self.ratio = value.into_f32(name)?,
                "flag" => self.flag = value.into_bool(name)?,
                "label" => self.label = value.into_text(name)?,
                "blob" => self.blob = value.into_bytes(name)?,
                _ => {
                    return Err(TranscribeError::UnknownField {
                        model: "Everything".to_string(),
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

    prop_compose! {
        fn everything()(
            id in any::<i64>(),
            small in any::<i32>(),
            large in any::<i64>(),
            ratio in -1.0e6_f32..1.0e6_f32,
            flag in any::<bool>(),
            label in proptest::option::of(".{0,16}"),
            blob in proptest::option::of(proptest::collection::vec(any::<u8>(), 0..32)),
        ) -> Everything {
            Everything { id, small, large, ratio, flag, label, blob }
        }
    }

    proptest! {
        #[test]
        fn property_row_projection_round_trips(sample in everything()) {
            let schema = Everything::schema();
            prop_assert!(schema.is_ok());
            let schema = schema.unwrap_or_else(|_| unreachable!());

            let row = project_row(&schema, &sample, Projection::Full);
            prop_assert!(row.is_ok());
            let row: BTreeMap<String, StoredValue> =
                row.unwrap_or_else(|_| unreachable!()).into_iter().collect();

            let restored: Result<Everything, _> = inflate_from_row(&schema, &row);
            prop_assert_eq!(restored, Ok(sample));
        }

        #[test]
        fn property_json_projection_round_trips(sample in everything()) {
            let schema = Everything::schema();
            prop_assert!(schema.is_ok());
            let schema = schema.unwrap_or_else(|_| unreachable!());

            let object = project_json(&schema, &sample, Projection::Full);
            prop_assert!(object.is_ok());
            let object = object.unwrap_or_else(|_| unreachable!());
            prop_assert_eq!(object.contains_key("blob"), sample.blob.is_some());
            prop_assert!(object.values().all(|value| !value.is_null()));

            let restored: Result<Everything, _> =
                inflate_from_json(&schema, &Value::Object(object));
            prop_assert_eq!(restored, Ok(sample));
        }
    }

    #[test]
    fn unset_bytes_are_absent_from_json_but_null_in_rows() -> anyhow::Result<()> {
        let schema = Everything::schema()?;
        let sample = Everything::default();

        let object = project_json(&schema, &sample, Projection::Insert)?;
        assert!(!object.contains_key("blob"));
        assert!(!object.contains_key("label"));
        assert!(!object.contains_key(IDENTITY_COLUMN));

        let row = project_row(&schema, &sample, Projection::Insert)?;
        assert!(row.contains(&("blob".to_string(), StoredValue::Null)));
        Ok(())
    }
}
