// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

mod render;
pub mod validation;

use anyhow::{Context, Result, anyhow, bail};
use log::{debug, info};
use rusqlite::functions::FunctionFlags;
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tabula_app::{
    ConfigPayload, Field, FieldId, FieldType, Filter, FilterId, FilterInput, FilterOperator,
    FilterSpec, JoinType, OrderSpec, Predicate, RecordCount, RecordId, RecordsPage, Row, RowCell,
    Sort, SortId, SortInput, SortOperator, TableId, View, ViewId, ViewQuery, compile_predicate,
    contains_ignore_case, fold_case,
};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::render::{FOLD_CASE_FN, SqlFragment, order_clause, where_clause};
use crate::validation::{
    BULK_INSERT_BATCH, count_from_sql, num_value_for, page_window, required_name,
};

pub const APP_NAME: &str = "tabula";

const CELL_QUERY_CHUNK: usize = 900;

const REQUIRED_SCHEMA: &[(&str, &[&str])] = &[
    ("tables", &["id", "name", "next_row_num", "created_at"]),
    (
        "fields",
        &["id", "table_id", "name", "field_type", "column_number"],
    ),
    ("views", &["id", "table_id", "name", "created_at"]),
    ("view_hidden_fields", &["view_id", "field_id"]),
    (
        "filters",
        &[
            "id",
            "view_id",
            "field_id",
            "operator",
            "join_type",
            "compare_val",
            "position",
        ],
    ),
    (
        "sorts",
        &["id", "view_id", "field_id", "operator", "position"],
    ),
    ("records", &["id", "table_id", "row_num", "created_at"]),
    (
        "cells",
        &["id", "record_id", "field_id", "value", "num_value"],
    ),
];

#[derive(Debug, Clone, Copy)]
struct RequiredIndex {
    name: &'static str,
    create_sql: &'static str,
}

const REQUIRED_INDEXES: &[RequiredIndex] = &[
    RequiredIndex {
        name: "idx_fields_table_column",
        create_sql: "CREATE INDEX IF NOT EXISTS idx_fields_table_column ON fields (table_id, column_number)",
    },
    RequiredIndex {
        name: "idx_records_table_row_num",
        create_sql: "CREATE INDEX IF NOT EXISTS idx_records_table_row_num ON records (table_id, row_num)",
    },
    RequiredIndex {
        name: "idx_cells_field_num_value",
        create_sql: "CREATE INDEX IF NOT EXISTS idx_cells_field_num_value ON cells (field_id, num_value)",
    },
    RequiredIndex {
        name: "idx_filters_view_position",
        create_sql: "CREATE INDEX IF NOT EXISTS idx_filters_view_position ON filters (view_id, position)",
    },
    RequiredIndex {
        name: "idx_sorts_view_position",
        create_sql: "CREATE INDEX IF NOT EXISTS idx_sorts_view_position ON sorts (view_id, position)",
    },
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSummary {
    pub id: TableId,
    pub name: String,
    pub field_count: usize,
    pub record_count: usize,
}

/// Cell values for one new record, keyed by field. Fields left out have no
/// cell and read as empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewRecord {
    pub values: BTreeMap<FieldId, String>,
}

impl NewRecord {
    pub fn with_value(mut self, field_id: FieldId, value: impl Into<String>) -> Self {
        self.values.insert(field_id, value.into());
        self
    }
}

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        let printable = path.to_string_lossy().to_string();
        validate_db_path(&printable)?;
        let conn = Connection::open(path)
            .with_context(|| format!("open database at {}", path.display()))?;
        configure_connection(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory database")?;
        configure_connection(&conn)?;
        Ok(Self { conn })
    }

    pub fn raw_connection(&self) -> &Connection {
        &self.conn
    }

    pub fn bootstrap(&self) -> Result<()> {
        if has_user_tables(&self.conn)? {
            validate_schema(&self.conn)?;
        } else {
            self.conn
                .execute_batch(include_str!("sql/schema.sql"))
                .context("create schema")?;
        }

        ensure_required_indexes(&self.conn)?;
        Ok(())
    }

    pub fn create_table(&self, name: &str) -> Result<TableId> {
        let name = required_name(name).context("create table")?;
        self.conn
            .execute(
                "INSERT INTO tables (name, created_at) VALUES (?, ?)",
                params![name, now_rfc3339()?],
            )
            .with_context(|| format!("insert table {name:?}"))?;
        Ok(TableId::new(self.conn.last_insert_rowid()))
    }

    /// Append a field after the table's last column.
    pub fn create_field(
        &self,
        table_id: TableId,
        name: &str,
        field_type: FieldType,
    ) -> Result<FieldId> {
        let name = required_name(name).context("create field")?;
        self.require_table(table_id)?;
        self.conn
            .execute(
                "
                INSERT INTO fields (table_id, name, field_type, column_number)
                VALUES (
                  ?, ?, ?,
                  (SELECT COALESCE(MAX(column_number), -1) + 1 FROM fields WHERE table_id = ?)
                )
                ",
                params![table_id.get(), name, field_type.as_str(), table_id.get()],
            )
            .with_context(|| format!("insert field {name:?}"))?;
        Ok(FieldId::new(self.conn.last_insert_rowid()))
    }

    pub fn create_view(&self, table_id: TableId, name: &str) -> Result<ViewId> {
        let name = required_name(name).context("create view")?;
        self.require_table(table_id)?;
        self.conn
            .execute(
                "INSERT INTO views (table_id, name, created_at) VALUES (?, ?, ?)",
                params![table_id.get(), name, now_rfc3339()?],
            )
            .with_context(|| format!("insert view {name:?}"))?;
        Ok(ViewId::new(self.conn.last_insert_rowid()))
    }

    pub fn list_tables(&self) -> Result<Vec<TableSummary>> {
        let mut stmt = self
            .conn
            .prepare(
                "
                SELECT
                  t.id,
                  t.name,
                  (SELECT COUNT(*) FROM fields f WHERE f.table_id = t.id),
                  (SELECT COUNT(*) FROM records r WHERE r.table_id = t.id)
                FROM tables t
                ORDER BY t.id ASC
                ",
            )
            .context("prepare tables query")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(TableSummary {
                    id: TableId::new(row.get(0)?),
                    name: row.get(1)?,
                    field_count: count_from_sql(row.get(2)?),
                    record_count: count_from_sql(row.get(3)?),
                })
            })
            .context("query tables")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("collect tables")
    }

    pub fn list_fields(&self, table_id: TableId) -> Result<Vec<Field>> {
        let mut stmt = self
            .conn
            .prepare(
                "
                SELECT id, table_id, name, field_type, column_number
                FROM fields
                WHERE table_id = ?
                ORDER BY column_number ASC, id ASC
                ",
            )
            .context("prepare fields query")?;
        let rows = stmt
            .query_map(params![table_id.get()], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            })
            .context("query fields")?;

        let mut fields = Vec::new();
        for row in rows {
            let (id, table_id, name, field_type, column_number) =
                row.context("decode field row")?;
            let field_type = FieldType::parse(&field_type)
                .ok_or_else(|| anyhow!("field {id} has unknown type {field_type:?}"))?;
            fields.push(Field {
                id: FieldId::new(id),
                table_id: TableId::new(table_id),
                name,
                field_type,
                column_number,
            });
        }
        Ok(fields)
    }

    pub fn list_views(&self, table_id: TableId) -> Result<Vec<View>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM views WHERE table_id = ? ORDER BY id ASC")
            .context("prepare views query")?;
        let ids = stmt
            .query_map(params![table_id.get()], |row| row.get::<_, i64>(0))
            .context("query views")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("collect view ids")?;
        ids.into_iter()
            .map(|id| self.get_view(ViewId::new(id)))
            .collect()
    }

    /// A view with its hidden fields, filters and sorts in stored order.
    pub fn get_view(&self, view_id: ViewId) -> Result<View> {
        let (table_id, name) = self
            .conn
            .query_row(
                "SELECT table_id, name FROM views WHERE id = ?",
                params![view_id.get()],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()
            .with_context(|| format!("load view {view_id}"))?
            .ok_or_else(|| anyhow!("view {view_id} not found -- pick an existing view"))?;

        Ok(View {
            id: view_id,
            table_id: TableId::new(table_id),
            name,
            hidden_field_ids: self.hidden_field_ids(view_id)?,
            filters: self.view_filters(view_id)?,
            sorts: self.view_sorts(view_id)?,
        })
    }

    /// Compile a stored view against its table's current fields.
    pub fn view_query(&self, view_id: ViewId) -> Result<ViewQuery> {
        let view = self.get_view(view_id)?;
        let fields = self.list_fields(view.table_id)?;
        ViewQuery::compile(&view, &fields).with_context(|| format!("compile view {view_id}"))
    }

    /// Number of records `predicate` admits.
    pub fn count_records(&self, predicate: &Predicate) -> Result<usize> {
        let filter = where_clause(predicate);
        let sql = format!("SELECT COUNT(*) FROM records r WHERE {}", filter.sql);
        debug!("count query: {sql}");
        let count: i64 = self
            .conn
            .query_row(&sql, params_from_iter(filter.params.iter()), |row| {
                row.get(0)
            })
            .with_context(|| format!("count records in table {}", predicate.table_id))?;
        Ok(count_from_sql(count))
    }

    /// Rows `[skip, skip + take)` of the view in order, with one cell per
    /// visible column. Missing cells read as empty.
    pub fn fetch_page(&self, query: &ViewQuery, skip: usize, take: usize) -> Result<Vec<Row>> {
        let (limit, offset) = page_window(skip, take).context("fetch page")?;
        let mut statement = ordered_records_sql(query);
        statement.sql.push_str(" LIMIT ? OFFSET ?");
        statement.params.push(Value::Integer(limit));
        statement.params.push(Value::Integer(offset));

        let records = self.ordered_records(&statement)?;
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let ids = records.iter().map(|(id, _)| *id).collect::<Vec<_>>();
        let mut values = self.cell_values(&ids)?;

        Ok(records
            .into_iter()
            .map(|(id, row_num)| {
                let mut cells = values.remove(&id).unwrap_or_default();
                Row {
                    id,
                    row_num,
                    cells: query
                        .columns()
                        .iter()
                        .map(|field| RowCell {
                            field_id: field.id,
                            value: cells.remove(&field.id).unwrap_or_default(),
                        })
                        .collect(),
                }
            })
            .collect())
    }

    /// Every row of the view in order, each carrying only its visible cells
    /// that contain `text`. Rows without a match stay in the list with no
    /// cells, so positions line up with the paged result.
    pub fn search(&self, query: &ViewQuery, text: &str) -> Result<Vec<Row>> {
        if text.is_empty() {
            return Ok(Vec::new());
        }
        let records = self.ordered_records(&ordered_records_sql(query))?;

        let mut stmt = self
            .conn
            .prepare(
                "
                SELECT c.record_id, c.field_id, c.value
                FROM cells c
                JOIN records r ON r.id = c.record_id
                WHERE r.table_id = ? AND instr(fold_case(c.value), fold_case(?)) > 0
                ",
            )
            .context("prepare search query")?;
        let hits = stmt
            .query_map(params![query.table_id().get(), text], |row| {
                Ok((
                    RecordId::new(row.get(0)?),
                    FieldId::new(row.get(1)?),
                    row.get::<_, String>(2)?,
                ))
            })
            .context("search cells")?;

        let mut matches: HashMap<RecordId, Vec<(usize, RowCell)>> = HashMap::new();
        for hit in hits {
            let (record_id, field_id, value) = hit.context("decode search hit")?;
            let Some(column) = query.column_index(field_id) else {
                continue;
            };
            if !contains_ignore_case(&value, text) {
                continue;
            }
            matches
                .entry(record_id)
                .or_default()
                .push((column, RowCell { field_id, value }));
        }
        debug!(
            "search {text:?} matched cells in {} of {} records",
            matches.len(),
            records.len()
        );

        Ok(records
            .into_iter()
            .map(|(id, row_num)| {
                let mut cells = matches.remove(&id).unwrap_or_default();
                cells.sort_by_key(|(column, _)| *column);
                Row {
                    id,
                    row_num,
                    cells: cells.into_iter().map(|(_, cell)| cell).collect(),
                }
            })
            .collect())
    }

    pub fn get_num_records(&self, filter_spec: &FilterSpec) -> Result<RecordCount> {
        let fields = self.list_fields(filter_spec.table_id)?;
        let predicate = compile_predicate(filter_spec.table_id, &fields, &filter_spec.filters)
            .with_context(|| format!("compile filters for table {}", filter_spec.table_id))?;
        Ok(RecordCount {
            total_records_in_view: self.count_records(&predicate)?,
        })
    }

    pub fn get_records(
        &self,
        view_id: ViewId,
        skip: usize,
        take: usize,
        filter_spec: &FilterSpec,
        order_spec: &OrderSpec,
    ) -> Result<RecordsPage> {
        let view = self.get_view(view_id)?;
        if view.table_id != filter_spec.table_id {
            bail!(
                "view {view_id} belongs to table {}, not table {}",
                view.table_id,
                filter_spec.table_id
            );
        }
        let fields = self.list_fields(view.table_id)?;
        let query = ViewQuery::from_specs(filter_spec, order_spec, &view.hidden_field_ids, &fields)
            .with_context(|| format!("compile query for view {view_id}"))?;
        Ok(RecordsPage {
            records: self.fetch_page(&query, skip, take)?,
        })
    }

    /// Search the view's stored configuration for `search_str`.
    pub fn search_in_view(&self, view_id: ViewId, search_str: &str) -> Result<RecordsPage> {
        let query = self.view_query(view_id)?;
        Ok(RecordsPage {
            records: self.search(&query, search_str)?,
        })
    }

    pub fn update_cell(&self, record_id: RecordId, field_id: FieldId, value: &str) -> Result<()> {
        let field_type = self
            .conn
            .query_row(
                "
                SELECT f.field_type
                FROM records r
                JOIN fields f ON f.table_id = r.table_id
                WHERE r.id = ? AND f.id = ?
                ",
                params![record_id.get(), field_id.get()],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .context("look up cell field")?
            .ok_or_else(|| {
                anyhow!(
                    "record {record_id} has no field {field_id} -- both must exist in the same table"
                )
            })?;
        let field_type = FieldType::parse(&field_type)
            .ok_or_else(|| anyhow!("field {field_id} has unknown type {field_type:?}"))?;

        upsert_cell(&self.conn, record_id, field_id, field_type, value)
            .with_context(|| format!("update cell for record {record_id}, field {field_id}"))
    }

    pub fn add_new_record(&self, table_id: TableId, record: &NewRecord) -> Result<RecordId> {
        let field_types = self.field_types(table_id)?;
        let tx = self
            .conn
            .unchecked_transaction()
            .context("begin insert record")?;
        let first = allocate_row_nums(&tx, table_id, 1)?;
        let id = insert_record(&tx, table_id, first, record, &field_types, &now_rfc3339()?)?;
        tx.commit().context("commit insert record")?;
        Ok(id)
    }

    /// Insert `records` in batches of [`BULK_INSERT_BATCH`], each committed
    /// on its own. A failure keeps every batch committed before it.
    pub fn add_x_records<I>(&self, table_id: TableId, records: I) -> Result<usize>
    where
        I: IntoIterator<Item = NewRecord>,
    {
        let field_types = self.field_types(table_id)?;
        let mut records = records.into_iter().peekable();
        let mut inserted = 0usize;

        while records.peek().is_some() {
            let batch = records.by_ref().take(BULK_INSERT_BATCH).collect::<Vec<_>>();
            let now = now_rfc3339()?;
            let tx = self
                .conn
                .unchecked_transaction()
                .context("begin bulk insert batch")?;
            let first = allocate_row_nums(&tx, table_id, batch.len())?;
            for (offset, record) in batch.iter().enumerate() {
                let row_num = first + i64::try_from(offset).context("row number overflow")?;
                insert_record(&tx, table_id, row_num, record, &field_types, &now)
                    .with_context(|| format!("bulk insert after {inserted} records"))?;
            }
            tx.commit()
                .with_context(|| format!("commit bulk insert after {inserted} records"))?;
            inserted += batch.len();
            info!("bulk insert into table {table_id}: {inserted} records committed");
        }
        Ok(inserted)
    }

    /// Delete records and their cells. Remaining rows keep their row numbers.
    pub fn delete_records(&self, record_ids: &[RecordId]) -> Result<usize> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("begin delete records")?;
        let mut deleted = 0usize;
        for record_id in record_ids {
            deleted += tx
                .execute("DELETE FROM records WHERE id = ?", params![record_id.get()])
                .with_context(|| format!("delete record {record_id}"))?;
        }
        tx.commit().context("commit delete records")?;
        Ok(deleted)
    }

    /// Replace the view's filters with `filters`, in order.
    pub fn update_filters(&self, view_id: ViewId, filters: &[FilterInput]) -> Result<()> {
        self.validate_config(view_id, &ConfigPayload::Filters(filters.to_vec()))?;
        let tx = self
            .conn
            .unchecked_transaction()
            .context("begin update filters")?;
        tx.execute("DELETE FROM filters WHERE view_id = ?", params![view_id.get()])
            .context("clear filters")?;
        for (position, filter) in filters.iter().enumerate() {
            tx.execute(
                "
                INSERT INTO filters (view_id, field_id, operator, join_type, compare_val, position)
                VALUES (?, ?, ?, ?, ?, ?)
                ",
                params![
                    view_id.get(),
                    filter.field_id.get(),
                    filter.operator.as_str(),
                    filter.join_type.as_str(),
                    filter.compare_val,
                    i64::try_from(position).context("filter position overflow")?,
                ],
            )
            .with_context(|| format!("insert filter {}", position + 1))?;
        }
        tx.commit().context("commit update filters")
    }

    /// Replace the view's sorts with `sorts`; earlier entries take priority.
    pub fn update_sorts(&self, view_id: ViewId, sorts: &[SortInput]) -> Result<()> {
        self.validate_config(view_id, &ConfigPayload::Sorts(sorts.to_vec()))?;
        let tx = self
            .conn
            .unchecked_transaction()
            .context("begin update sorts")?;
        tx.execute("DELETE FROM sorts WHERE view_id = ?", params![view_id.get()])
            .context("clear sorts")?;
        for (position, sort) in sorts.iter().enumerate() {
            tx.execute(
                "INSERT INTO sorts (view_id, field_id, operator, position) VALUES (?, ?, ?, ?)",
                params![
                    view_id.get(),
                    sort.field_id.get(),
                    sort.operator.as_str(),
                    i64::try_from(position).context("sort position overflow")?,
                ],
            )
            .with_context(|| format!("insert sort {}", position + 1))?;
        }
        tx.commit().context("commit update sorts")
    }

    pub fn update_view_hidden_fields(
        &self,
        view_id: ViewId,
        hidden_field_ids: &BTreeSet<FieldId>,
    ) -> Result<()> {
        self.validate_config(view_id, &ConfigPayload::HiddenFields(hidden_field_ids.clone()))?;
        let tx = self
            .conn
            .unchecked_transaction()
            .context("begin update hidden fields")?;
        tx.execute(
            "DELETE FROM view_hidden_fields WHERE view_id = ?",
            params![view_id.get()],
        )
        .context("clear hidden fields")?;
        for field_id in hidden_field_ids {
            tx.execute(
                "INSERT INTO view_hidden_fields (view_id, field_id) VALUES (?, ?)",
                params![view_id.get(), field_id.get()],
            )
            .with_context(|| format!("hide field {field_id}"))?;
        }
        tx.commit().context("commit update hidden fields")
    }

    fn validate_config(&self, view_id: ViewId, payload: &ConfigPayload) -> Result<()> {
        let table_id = self
            .conn
            .query_row(
                "SELECT table_id FROM views WHERE id = ?",
                params![view_id.get()],
                |row| row.get::<_, i64>(0),
            )
            .optional()
            .with_context(|| format!("load view {view_id}"))?
            .ok_or_else(|| anyhow!("view {view_id} not found -- pick an existing view"))?;
        let fields = self.list_fields(TableId::new(table_id))?;
        payload
            .validate(&fields)
            .with_context(|| format!("update {} for view {view_id}", payload.label()))
    }

    fn require_table(&self, table_id: TableId) -> Result<()> {
        let exists = self
            .conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM tables WHERE id = ?)",
                params![table_id.get()],
                |row| row.get::<_, i64>(0),
            )
            .with_context(|| format!("check table {table_id}"))?;
        if exists != 1 {
            bail!("table {table_id} not found -- create it first");
        }
        Ok(())
    }

    fn field_types(&self, table_id: TableId) -> Result<HashMap<FieldId, FieldType>> {
        self.require_table(table_id)?;
        Ok(self
            .list_fields(table_id)?
            .into_iter()
            .map(|field| (field.id, field.field_type))
            .collect())
    }

    fn hidden_field_ids(&self, view_id: ViewId) -> Result<BTreeSet<FieldId>> {
        let mut stmt = self
            .conn
            .prepare("SELECT field_id FROM view_hidden_fields WHERE view_id = ?")
            .context("prepare hidden fields query")?;
        let rows = stmt
            .query_map(params![view_id.get()], |row| {
                row.get::<_, i64>(0).map(FieldId::new)
            })
            .context("query hidden fields")?;
        rows.collect::<rusqlite::Result<BTreeSet<_>>>()
            .context("collect hidden fields")
    }

    fn view_filters(&self, view_id: ViewId) -> Result<Vec<Filter>> {
        let mut stmt = self
            .conn
            .prepare(
                "
                SELECT id, field_id, operator, join_type, compare_val
                FROM filters
                WHERE view_id = ?
                ORDER BY position ASC, id ASC
                ",
            )
            .context("prepare filters query")?;
        let rows = stmt
            .query_map(params![view_id.get()], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })
            .context("query filters")?;

        let mut filters = Vec::new();
        for row in rows {
            let (id, field_id, operator, join_type, compare_val) =
                row.context("decode filter row")?;
            filters.push(Filter {
                id: FilterId::new(id),
                view_id,
                field_id: FieldId::new(field_id),
                operator: FilterOperator::parse(&operator)
                    .ok_or_else(|| anyhow!("filter {id} has unknown operator {operator:?}"))?,
                join_type: JoinType::parse(&join_type)
                    .ok_or_else(|| anyhow!("filter {id} has unknown join type {join_type:?}"))?,
                compare_val,
            });
        }
        Ok(filters)
    }

    fn view_sorts(&self, view_id: ViewId) -> Result<Vec<Sort>> {
        let mut stmt = self
            .conn
            .prepare(
                "
                SELECT id, field_id, operator
                FROM sorts
                WHERE view_id = ?
                ORDER BY position ASC, id ASC
                ",
            )
            .context("prepare sorts query")?;
        let rows = stmt
            .query_map(params![view_id.get()], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .context("query sorts")?;

        let mut sorts = Vec::new();
        for row in rows {
            let (id, field_id, operator) = row.context("decode sort row")?;
            sorts.push(Sort {
                id: SortId::new(id),
                view_id,
                field_id: FieldId::new(field_id),
                operator: SortOperator::parse(&operator)
                    .ok_or_else(|| anyhow!("sort {id} has unknown operator {operator:?}"))?,
            });
        }
        Ok(sorts)
    }

    fn ordered_records(&self, statement: &SqlFragment) -> Result<Vec<(RecordId, i64)>> {
        debug!("page query: {}", statement.sql);
        let mut stmt = self
            .conn
            .prepare(&statement.sql)
            .context("prepare page query")?;
        let rows = stmt
            .query_map(params_from_iter(statement.params.iter()), |row| {
                Ok((RecordId::new(row.get(0)?), row.get::<_, i64>(1)?))
            })
            .context("query page records")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("collect page records")
    }

    /// Cells for `record_ids`, loaded in chunks that stay under SQLite's
    /// bound-parameter limit.
    fn cell_values(
        &self,
        record_ids: &[RecordId],
    ) -> Result<HashMap<RecordId, HashMap<FieldId, String>>> {
        let mut values: HashMap<RecordId, HashMap<FieldId, String>> = HashMap::new();
        for chunk in record_ids.chunks(CELL_QUERY_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!(
                "SELECT record_id, field_id, value FROM cells WHERE record_id IN ({placeholders})"
            );
            let mut stmt = self.conn.prepare_cached(&sql).context("prepare cells query")?;
            let rows = stmt
                .query_map(params_from_iter(chunk.iter().map(|id| id.get())), |row| {
                    Ok((
                        RecordId::new(row.get(0)?),
                        FieldId::new(row.get(1)?),
                        row.get::<_, String>(2)?,
                    ))
                })
                .context("query page cells")?;
            for row in rows {
                let (record_id, field_id, value) = row.context("decode cell row")?;
                values.entry(record_id).or_default().insert(field_id, value);
            }
        }
        Ok(values)
    }
}

fn ordered_records_sql(query: &ViewQuery) -> SqlFragment {
    let filter = where_clause(&query.predicate);
    let order = order_clause(&query.ordering);
    let mut statement = SqlFragment {
        sql: format!(
            "SELECT r.id, r.row_num FROM records r WHERE {} ORDER BY {}",
            filter.sql, order.sql
        ),
        params: filter.params,
    };
    statement.params.extend(order.params);
    statement
}

/// Reserve `count` consecutive row numbers for `table_id`. Numbers are never
/// handed out twice, even after deletes.
fn allocate_row_nums(conn: &Connection, table_id: TableId, count: usize) -> Result<i64> {
    let first = conn
        .query_row(
            "SELECT next_row_num FROM tables WHERE id = ?",
            params![table_id.get()],
            |row| row.get::<_, i64>(0),
        )
        .optional()
        .with_context(|| format!("read next row number for table {table_id}"))?
        .ok_or_else(|| anyhow!("table {table_id} not found -- create it first"))?;
    let count = i64::try_from(count).context("row count overflow")?;
    conn.execute(
        "UPDATE tables SET next_row_num = ? WHERE id = ?",
        params![first + count, table_id.get()],
    )
    .with_context(|| format!("advance row numbers for table {table_id}"))?;
    Ok(first)
}

fn insert_record(
    conn: &Connection,
    table_id: TableId,
    row_num: i64,
    record: &NewRecord,
    field_types: &HashMap<FieldId, FieldType>,
    now: &str,
) -> Result<RecordId> {
    conn.execute(
        "INSERT INTO records (table_id, row_num, created_at) VALUES (?, ?, ?)",
        params![table_id.get(), row_num, now],
    )
    .context("insert record")?;
    let record_id = RecordId::new(conn.last_insert_rowid());

    for (field_id, value) in &record.values {
        let field_type = field_types.get(field_id).copied().ok_or_else(|| {
            anyhow!("field {field_id} does not belong to table {table_id} -- drop it from the record")
        })?;
        upsert_cell(conn, record_id, *field_id, field_type, value)?;
    }
    Ok(record_id)
}

fn upsert_cell(
    conn: &Connection,
    record_id: RecordId,
    field_id: FieldId,
    field_type: FieldType,
    value: &str,
) -> Result<()> {
    conn.execute(
        "
        INSERT INTO cells (record_id, field_id, value, num_value)
        VALUES (?, ?, ?, ?)
        ON CONFLICT (record_id, field_id)
        DO UPDATE SET value = excluded.value, num_value = excluded.num_value
        ",
        params![
            record_id.get(),
            field_id.get(),
            value,
            num_value_for(field_type, value),
        ],
    )
    .context("write cell")?;
    Ok(())
}

pub fn default_db_path() -> Result<PathBuf> {
    if let Some(override_path) = env::var_os("TABULA_DB_PATH") {
        return Ok(PathBuf::from(override_path));
    }

    let data_root = dirs::data_local_dir().ok_or_else(|| {
        anyhow!("cannot resolve data directory; set TABULA_DB_PATH to a writable database path")
    })?;

    let app_dir = data_root.join(APP_NAME);
    fs::create_dir_all(&app_dir)
        .with_context(|| format!("create data directory {}", app_dir.display()))?;
    Ok(app_dir.join("tabula.db"))
}

pub fn validate_db_path(path: &str) -> Result<()> {
    if path.is_empty() {
        bail!("database path must not be empty");
    }
    if path == ":memory:" {
        return Ok(());
    }

    if let Some(index) = path.find("://")
        && index > 0
    {
        let scheme = &path[..index];
        if scheme.chars().all(char::is_alphabetic) {
            bail!(
                "database path {path:?} looks like a URI ({scheme}://); pass a filesystem path instead"
            );
        }
    }

    if path.starts_with("file:") {
        bail!("database path {path:?} uses file: URI syntax; pass a plain filesystem path");
    }

    if path.contains('?') {
        bail!(
            "database path {path:?} contains '?'; remove query parameters and use a plain file path"
        );
    }

    Ok(())
}

fn has_user_tables(conn: &Connection) -> Result<bool> {
    let count: i64 = conn
        .query_row(
            "
            SELECT COUNT(*)
            FROM sqlite_master
            WHERE type = 'table'
              AND name NOT LIKE 'sqlite_%'
            ",
            [],
            |row| row.get(0),
        )
        .context("count user tables")?;
    Ok(count > 0)
}

fn validate_schema(conn: &Connection) -> Result<()> {
    for (table, required_columns) in REQUIRED_SCHEMA {
        if !table_exists(conn, table)? {
            bail!(
                "database is missing required table `{table}`; point TABULA_DB_PATH at a tabula database"
            );
        }

        let columns = table_columns(conn, table)?;
        let missing: Vec<&str> = required_columns
            .iter()
            .copied()
            .filter(|column| !columns.contains(*column))
            .collect();

        if !missing.is_empty() {
            bail!(
                "table `{table}` is missing required columns: {}; recreate the database",
                missing.join(", ")
            );
        }
    }

    Ok(())
}

fn ensure_required_indexes(conn: &Connection) -> Result<()> {
    for index in REQUIRED_INDEXES {
        conn.execute_batch(index.create_sql)
            .with_context(|| format!("ensure required index `{}`", index.name))?;
    }

    let existing_indexes = index_names(conn)?;
    let missing = REQUIRED_INDEXES
        .iter()
        .filter(|index| !existing_indexes.contains(index.name))
        .map(|index| index.name)
        .collect::<Vec<_>>();
    if !missing.is_empty() {
        bail!(
            "database is missing required indexes: {}; recreate the database",
            missing.join(", ")
        );
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let exists = conn
        .query_row(
            "
            SELECT EXISTS(
              SELECT 1
              FROM sqlite_master
              WHERE type = 'table' AND name = ?
            )
            ",
            params![table],
            |row| row.get::<_, i64>(0),
        )
        .with_context(|| format!("check table existence for {table}"))?;
    Ok(exists == 1)
}

fn table_columns(conn: &Connection, table: &str) -> Result<BTreeSet<String>> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({table})"))
        .with_context(|| format!("inspect columns for {table}"))?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .with_context(|| format!("query column info for {table}"))?;

    rows.collect::<rusqlite::Result<BTreeSet<_>>>()
        .with_context(|| format!("collect columns for {table}"))
}

fn index_names(conn: &Connection) -> Result<BTreeSet<String>> {
    let mut stmt = conn
        .prepare(
            "
            SELECT name
            FROM sqlite_master
            WHERE type = 'index'
              AND name NOT LIKE 'sqlite_%'
            ORDER BY name ASC
            ",
        )
        .context("prepare index names query")?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .context("query index names")?;
    rows.collect::<rusqlite::Result<BTreeSet<_>>>()
        .context("collect index names")
}

fn configure_connection(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        PRAGMA foreign_keys = ON;
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA busy_timeout = 5000;
        ",
    )
    .context("configure sqlite pragmas")?;
    conn.create_scalar_function(
        FOLD_CASE_FN,
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| Ok(ctx.get::<Option<String>>(0)?.map(|value| fold_case(&value))),
    )
    .context("register case folding function")
}

fn now_rfc3339() -> Result<String> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .context("format current timestamp")
}

#[cfg(test)]
mod tests {
    use super::{Store, validate_db_path};
    use anyhow::Result;
    use tabula_app::FieldType;

    #[test]
    fn bootstrap_is_idempotent() -> Result<()> {
        let store = Store::open_memory()?;
        store.bootstrap()?;
        store.bootstrap()?;
        Ok(())
    }

    #[test]
    fn bootstrap_rejects_foreign_schema() -> Result<()> {
        let store = Store::open_memory()?;
        store
            .raw_connection()
            .execute_batch("CREATE TABLE notes (id INTEGER PRIMARY KEY)")?;
        let error = store.bootstrap().expect_err("foreign schema should fail");
        assert!(error.to_string().contains("missing required table"));
        Ok(())
    }

    #[test]
    fn fields_append_in_column_order() -> Result<()> {
        let store = Store::open_memory()?;
        store.bootstrap()?;
        let table = store.create_table("People")?;
        store.create_field(table, "Name", FieldType::Text)?;
        store.create_field(table, "Age", FieldType::Number)?;

        let fields = store.list_fields(table)?;
        let columns = fields
            .iter()
            .map(|field| (field.name.as_str(), field.column_number))
            .collect::<Vec<_>>();
        assert_eq!(columns, vec![("Name", 0), ("Age", 1)]);
        Ok(())
    }

    #[test]
    fn blank_names_are_rejected() -> Result<()> {
        let store = Store::open_memory()?;
        store.bootstrap()?;
        let error = store.create_table("  ").expect_err("blank table name");
        assert!(format!("{error:#}").contains("name must not be blank"));
        Ok(())
    }

    #[test]
    fn validate_db_path_rejects_uris() {
        assert!(validate_db_path("").is_err());
        assert!(validate_db_path("https://example.com/db").is_err());
        assert!(validate_db_path("file:test.db").is_err());
        assert!(validate_db_path("/tmp/tabula.db?mode=ro").is_err());
        assert!(validate_db_path(":memory:").is_ok());
        assert!(validate_db_path("/tmp/tabula.db").is_ok());
    }
}
