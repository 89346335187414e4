// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::collections::BTreeSet;

use crate::{
    CompileError, Field, FieldId, FilterSpec, OrderSpec, Ordering, Predicate, TableId, View,
    compile_ordering, compile_predicate,
};

/// Everything needed to count, page and search one view configuration.
///
/// Count and page fetches for a configuration must share one `ViewQuery`
/// so the scroll extent and the page contents agree.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewQuery {
    pub predicate: Predicate,
    pub ordering: Ordering,
    columns: Vec<Field>,
}

impl ViewQuery {
    pub fn compile(view: &View, fields: &[Field]) -> Result<Self, CompileError> {
        Self::from_specs(
            &view.filter_spec(),
            &view.order_spec(),
            &view.hidden_field_ids,
            fields,
        )
    }

    pub fn from_specs(
        filter_spec: &FilterSpec,
        order_spec: &OrderSpec,
        hidden_field_ids: &BTreeSet<FieldId>,
        fields: &[Field],
    ) -> Result<Self, CompileError> {
        let table_id = filter_spec.table_id;
        let predicate = compile_predicate(table_id, fields, &filter_spec.filters)?;
        let ordering = compile_ordering(table_id, fields, &order_spec.sorts)?;
        Ok(Self {
            predicate,
            ordering,
            columns: visible_columns(table_id, fields, hidden_field_ids),
        })
    }

    pub const fn table_id(&self) -> TableId {
        self.predicate.table_id
    }

    /// Visible fields in column order.
    pub fn columns(&self) -> &[Field] {
        &self.columns
    }

    pub fn column_index(&self, field_id: FieldId) -> Option<usize> {
        self.columns.iter().position(|field| field.id == field_id)
    }
}

fn visible_columns(
    table_id: TableId,
    fields: &[Field],
    hidden_field_ids: &BTreeSet<FieldId>,
) -> Vec<Field> {
    let mut columns = fields
        .iter()
        .filter(|field| field.table_id == table_id && !hidden_field_ids.contains(&field.id))
        .cloned()
        .collect::<Vec<_>>();
    columns.sort_by(|left, right| {
        left.column_number
            .cmp(&right.column_number)
            .then(left.id.cmp(&right.id))
    });
    columns
}
