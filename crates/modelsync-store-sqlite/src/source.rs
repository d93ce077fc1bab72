use std::collections::{BTreeMap, VecDeque};
use std::fs;
use std::marker::PhantomData;
use std::sync::Arc;

use rusqlite::types::{Value, ValueRef};
use rusqlite::{params_from_iter, Connection, OptionalExtension};

use modelsync_core::{
    debug_clause, inflate_from_row, project_row, read_field, where_clause, Model, ModelSchema,
    Param, Projection, StoredValue, IDENTITY_COLUMN,
};

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::migrate::{self, SchemaStatus};

const CURSOR_BATCH: i64 = 64;

/// Which path `save` took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Created,
    Updated,
}

/// `LIMIT`/`OFFSET` window of a query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Page {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl Page {
    #[must_use]
    pub fn new(limit: Option<i64>, offset: Option<i64>) -> Self {
        Self { limit, offset }
    }

    /// # Errors
    /// [`StoreError::InvalidArgument`] for a negative limit or offset.
    pub fn validate(&self) -> StoreResult<()> {
        if let Some(limit) = self.limit.filter(|limit| *limit < 0) {
            return Err(StoreError::InvalidArgument(format!("negative limit {limit}")));
        }
        if let Some(offset) = self.offset.filter(|offset| *offset < 0) {
            return Err(StoreError::InvalidArgument(format!("negative offset {offset}")));
        }
        Ok(())
    }

    /// `LIMIT <offset>,<limit>`; an offset alone is rendered with an unbounded limit.
    #[must_use]
    pub fn sql(&self) -> Option<String> {
        match (self.offset, self.limit) {
            (Some(offset), Some(limit)) => Some(format!("LIMIT {offset},{limit}")),
            (None, Some(limit)) => Some(format!("LIMIT {limit}")),
            (Some(offset), None) => Some(format!("LIMIT {offset},-1")),
            (None, None) => None,
        }
    }
}

/// Connection-holding access to the table of one model type.
///
/// Closed until [`LocalDataSource::open`]; every operation on a closed
/// source fails with [`StoreError::Closed`].
pub struct LocalDataSource<M: Model> {
    schema: Arc<ModelSchema>,
    config: Arc<StoreConfig>,
    conn: Option<Connection>,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model> LocalDataSource<M> {
    #[must_use]
    pub fn new(schema: Arc<ModelSchema>, config: Arc<StoreConfig>) -> Self {
        Self { schema, config, conn: None, _model: PhantomData }
    }

    #[must_use]
    pub fn schema(&self) -> &Arc<ModelSchema> {
        &self.schema
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    /// Open the database file, apply pragmas and migrate the model table.
    /// Opening an open source replaces its connection.
    ///
    /// # Errors
    /// Returns an error when the data directory, the database or a migration step fails.
    pub fn open(&mut self) -> StoreResult<()> {
        if self.conn.take().is_some() {
            tracing::warn!(
                "Data source for {} opened twice; replacing the previous connection",
                self.schema.table_name()
            );
        }

        fs::create_dir_all(&self.config.data_dir)?;
        let path = self.config.database_path(&self.schema);
        let mut conn = Connection::open(&path)?;
        conn.execute_batch(&self.config.pragmas())?;
        migrate::migrate(&mut conn, &self.schema)?;

        self.conn = Some(conn);
        Ok(())
    }

    /// # Errors
    /// Returns an error when SQLite fails to close the connection.
    pub fn close(&mut self) -> StoreResult<()> {
        if let Some(conn) = self.conn.take() {
            conn.close().map_err(|(_, err)| StoreError::Storage(err))?;
        }
        Ok(())
    }

    /// Insert `model` with the store assigning its identity.
    ///
    /// # Errors
    /// [`StoreError::Closed`], or a storage or transcription failure.
    pub fn create(&mut self, model: &mut M) -> StoreResult<()> {
        insert_row(self.conn()?, &self.schema, model)
    }

    /// Update the row matching the natural key of `model`. The row keeps its
    /// `_id` and `model` takes it over.
    ///
    /// # Errors
    /// [`StoreError::Closed`], or a storage or transcription failure.
    pub fn update(&mut self, model: &mut M) -> StoreResult<usize> {
        update_row(self.conn()?, &self.schema, model)
    }

    /// Create `model` when no row matches its natural key, update otherwise.
    ///
    /// # Errors
    /// [`StoreError::Closed`], or a storage or transcription failure.
    pub fn save(&mut self, model: &mut M) -> StoreResult<SaveOutcome> {
        save_row(self.conn()?, &self.schema, model)
    }

    /// Delete the row matching the natural key of `model`. The value itself
    /// is left untouched.
    ///
    /// # Errors
    /// [`StoreError::Closed`], or a storage or transcription failure.
    pub fn delete(&mut self, model: &M) -> StoreResult<usize> {
        let key = natural_key(&self.schema, model)?;
        delete_rows(self.conn()?, &self.schema, &key)
    }

    /// # Errors
    /// [`StoreError::InvalidArgument`] for an undeclared column, [`StoreError::Closed`],
    /// or a storage failure.
    pub fn delete_where(&mut self, params: &[Param]) -> StoreResult<usize> {
        self.check_params(params)?;
        delete_rows(self.conn()?, &self.schema, params)
    }

    /// # Errors
    /// [`StoreError::InvalidArgument`] for an undeclared column, [`StoreError::Closed`],
    /// or a storage failure.
    pub fn count(&self, params: &[Param]) -> StoreResult<usize> {
        self.check_params(params)?;
        count_rows(self.conn()?, &self.schema, params)
    }

    /// # Errors
    /// [`StoreError::InvalidArgument`] for an undeclared column or a negative
    /// page bound, [`StoreError::Closed`], or a storage or transcription failure.
    pub fn query(&self, order_by: Option<&str>, params: &[Param], page: Page) -> StoreResult<Vec<M>> {
        self.check_params(params)?;
        page.validate()?;
        select_rows(self.conn()?, &self.schema, order_by, params, page)
    }

    /// # Errors
    /// Same as [`LocalDataSource::query`].
    pub fn first(&self, order_by: Option<&str>, params: &[Param]) -> StoreResult<Option<M>> {
        let page = Page::new(Some(1), None);
        Ok(self.query(order_by, params, page)?.into_iter().next())
    }

    /// # Errors
    /// Same as [`LocalDataSource::query`].
    pub fn get_all(&self, order_by: Option<&str>) -> StoreResult<Vec<M>> {
        self.query(order_by, &[], Page::default())
    }

    /// Lazy iteration over the matching rows. The cursor owns this source
    /// and its connection until dropped.
    ///
    /// # Errors
    /// [`StoreError::InvalidArgument`] for an undeclared column or a negative
    /// page bound, [`StoreError::Closed`].
    pub fn cursor(
        self,
        order_by: Option<&str>,
        params: Vec<Param>,
        page: Page,
    ) -> StoreResult<ModelCursor<M>> {
        self.conn()?;
        self.check_params(&params)?;
        page.validate()?;

        let order_by = match order_by {
            Some(order) => format!("{order}, {IDENTITY_COLUMN}"),
            None => IDENTITY_COLUMN.to_string(),
        };
        Ok(ModelCursor {
            source: self,
            order_by,
            params,
            next_offset: page.offset.unwrap_or(0),
            remaining: page.limit,
            buffer: VecDeque::new(),
            exhausted: false,
        })
    }

    /// # Errors
    /// [`StoreError::Closed`] or a storage failure.
    pub fn drop_table(&mut self) -> StoreResult<()> {
        migrate::drop_table(self.conn()?, &self.schema)
    }

    /// # Errors
    /// [`StoreError::Closed`] or a storage failure.
    pub fn schema_status(&self) -> StoreResult<SchemaStatus> {
        migrate::schema_status(self.conn()?, &self.schema)
    }

    /// Delete every row matching `params`, then save each of `models`, in
    /// one transaction. Returns the number of rows removed.
    ///
    /// # Errors
    /// [`StoreError::InvalidArgument`] for an undeclared column, [`StoreError::Closed`],
    /// or a storage or transcription failure; nothing is written on error.
    pub fn replace_matching(&mut self, params: &[Param], models: &mut [M]) -> StoreResult<usize> {
        self.check_params(params)?;
        let schema = Arc::clone(&self.schema);
        let conn = self.conn.as_mut().ok_or(StoreError::Closed)?;

        let tx = conn.transaction()?;
        let removed = delete_rows(&tx, &schema, params)?;
        for model in models.iter_mut() {
            save_row(&tx, &schema, model)?;
        }
        tx.commit()?;
        Ok(removed)
    }

    fn conn(&self) -> StoreResult<&Connection> {
        self.conn.as_ref().ok_or(StoreError::Closed)
    }

    fn check_params(&self, params: &[Param]) -> StoreResult<()> {
        match params.iter().find(|param| self.schema.field(param.key()).is_none()) {
            Some(param) => Err(StoreError::InvalidArgument(format!(
                "{} has no column `{}`",
                self.schema.table_name(),
                param.key()
            ))),
            None => Ok(()),
        }
    }
}

/// Iterator over query results, fetched in pages through the owned source.
pub struct ModelCursor<M: Model> {
    source: LocalDataSource<M>,
    order_by: String,
    params: Vec<Param>,
    next_offset: i64,
    remaining: Option<i64>,
    buffer: VecDeque<M>,
    exhausted: bool,
}

impl<M: Model> ModelCursor<M> {
    fn fill(&mut self) -> StoreResult<()> {
        let batch = match self.remaining {
            Some(remaining) if remaining <= 0 => {
                self.exhausted = true;
                return Ok(());
            }
            Some(remaining) => remaining.min(CURSOR_BATCH),
            None => CURSOR_BATCH,
        };

        let rows = self.source.query(
            Some(&self.order_by),
            &self.params,
            Page::new(Some(batch), Some(self.next_offset)),
        )?;
        let fetched = i64::try_from(rows.len()).unwrap_or(i64::MAX);
        if fetched < batch {
            self.exhausted = true;
        }
        self.next_offset += fetched;
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= fetched;
        }
        self.buffer.extend(rows);
        Ok(())
    }
}

impl<M: Model> Iterator for ModelCursor<M> {
    type Item = StoreResult<M>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            if let Err(err) = self.fill() {
                self.exhausted = true;
                return Some(Err(err));
            }
        }
        self.buffer.pop_front().map(Ok)
    }
}

/// Unique fields with a set value, or the identity when there are none.
pub(crate) fn natural_key<M: Model>(schema: &ModelSchema, model: &M) -> StoreResult<Vec<Param>> {
    let mut key = Vec::new();
    for field in schema.unique_fields() {
        let value = read_field(model, field)?;
        if !value.is_unset() {
            key.push(Param::new(field.name(), value));
        }
    }
    if key.is_empty() {
        key.push(Param::new(IDENTITY_COLUMN, model.identity()));
    }
    Ok(key)
}

fn insert_row<M: Model>(conn: &Connection, schema: &ModelSchema, model: &mut M) -> StoreResult<()> {
    let table = schema.table_name();
    let row = project_row(schema, model, Projection::Insert)?;
    let sql = if row.is_empty() {
        format!("INSERT INTO {table} DEFAULT VALUES")
    } else {
        let columns = row.iter().map(|(column, _)| column.as_str()).collect::<Vec<_>>();
        let placeholders = vec!["?"; columns.len()].join(", ");
        format!("INSERT OR REPLACE INTO {table} ({}) VALUES ({placeholders})", columns.join(", "))
    };

    conn.execute(&sql, params_from_iter(row.iter().map(|(_, value)| sql_value(value))))?;
    model.set_identity(conn.last_insert_rowid());
    tracing::debug!("Inserted row {} into {}", model.identity(), table);
    Ok(())
}

fn update_row<M: Model>(conn: &Connection, schema: &ModelSchema, model: &mut M) -> StoreResult<usize> {
    let table = schema.table_name();
    let key = natural_key(schema, model)?;
    // The matched row keeps its own identity; the model adopts it.
    let row = project_row(schema, model, Projection::Insert)?;
    if row.is_empty() {
        return Ok(0);
    }

    let assignments =
        row.iter().map(|(column, _)| format!("{column} = ?")).collect::<Vec<_>>().join(", ");
    let sql = format!("UPDATE OR REPLACE {table} SET {assignments} WHERE {}", where_clause(&key));
    tracing::debug!("Updating {} where {}", table, debug_clause(&key));

    let arguments = row
        .iter()
        .map(|(_, value)| sql_value(value))
        .chain(bound(&key))
        .collect::<Vec<_>>();
    let changed = conn.execute(&sql, params_from_iter(arguments))?;

    if changed > 0 {
        let lookup = format!("SELECT {IDENTITY_COLUMN} FROM {table} WHERE {} LIMIT 1", where_clause(&key));
        let identity = conn
            .query_row(&lookup, params_from_iter(bound(&key)), |row| row.get::<_, i64>(0))
            .optional()?;
        if let Some(identity) = identity {
            model.set_identity(identity);
        }
    }
    Ok(changed)
}

fn save_row<M: Model>(conn: &Connection, schema: &ModelSchema, model: &mut M) -> StoreResult<SaveOutcome> {
    let key = natural_key(schema, model)?;
    if count_rows(conn, schema, &key)? == 0 {
        insert_row(conn, schema, model)?;
        Ok(SaveOutcome::Created)
    } else {
        update_row(conn, schema, model)?;
        Ok(SaveOutcome::Updated)
    }
}

fn delete_rows(conn: &Connection, schema: &ModelSchema, params: &[Param]) -> StoreResult<usize> {
    let table = schema.table_name();
    let sql = with_where(format!("DELETE FROM {table}"), params);
    tracing::debug!("Deleting from {} where {}", table, debug_clause(params));
    let removed = conn.execute(&sql, params_from_iter(bound(params)))?;
    tracing::info!("Removed {} rows from {}", removed, table);
    Ok(removed)
}

fn count_rows(conn: &Connection, schema: &ModelSchema, params: &[Param]) -> StoreResult<usize> {
    let sql = with_where(format!("SELECT COUNT(*) FROM {}", schema.table_name()), params);
    let count = conn.query_row(&sql, params_from_iter(bound(params)), |row| row.get::<_, i64>(0))?;
    Ok(usize::try_from(count).unwrap_or_default())
}

fn select_rows<M: Model>(
    conn: &Connection,
    schema: &ModelSchema,
    order_by: Option<&str>,
    params: &[Param],
    page: Page,
) -> StoreResult<Vec<M>> {
    let mut sql = with_where(format!("SELECT * FROM {}", schema.table_name()), params);
    if let Some(order) = order_by.filter(|order| !order.trim().is_empty()) {
        sql.push_str(" ORDER BY ");
        sql.push_str(order);
    }
    if let Some(limit) = page.sql() {
        sql.push(' ');
        sql.push_str(&limit);
    }
    tracing::debug!("Querying {} where {} ({})", schema.table_name(), debug_clause(params), sql);

    let mut stmt = conn.prepare(&sql)?;
    let columns = stmt.column_names().into_iter().map(String::from).collect::<Vec<_>>();
    let rows = stmt.query_map(params_from_iter(bound(params)), |row| {
        let mut values = BTreeMap::new();
        for (index, column) in columns.iter().enumerate() {
            values.insert(column.clone(), stored_value(row.get_ref(index)?));
        }
        Ok(values)
    })?;

    let mut models = Vec::new();
    for row in rows {
        models.push(inflate_from_row(schema, &row?)?);
    }
    Ok(models)
}

fn with_where(mut sql: String, params: &[Param]) -> String {
    if !params.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&where_clause(params));
    }
    sql
}

fn bound(params: &[Param]) -> Vec<Value> {
    params.iter().map(|param| sql_value(&param.sql_argument())).collect()
}

fn sql_value(value: &StoredValue) -> Value {
    match value {
        StoredValue::Null => Value::Null,
        StoredValue::Integer(value) => Value::Integer(*value),
        StoredValue::Real(value) => Value::Real(*value),
        StoredValue::Text(value) => Value::Text(value.clone()),
        StoredValue::Blob(value) => Value::Blob(value.clone()),
    }
}

fn stored_value(value: ValueRef<'_>) -> StoredValue {
    match value {
        ValueRef::Null => StoredValue::Null,
        ValueRef::Integer(value) => StoredValue::Integer(value),
        ValueRef::Real(value) => StoredValue::Real(value),
        ValueRef::Text(bytes) => StoredValue::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => StoredValue::Blob(bytes.to_vec()),
    }
}
