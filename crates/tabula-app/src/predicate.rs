// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Compiles a view's filter list into a structured predicate.
//!
//! The predicate is plain data. Comparison values travel inside the tree and
//! are bound as statement parameters by the store, never spliced into SQL.

use crate::{Field, FieldId, FieldType, Filter, FilterId, FilterOperator, JoinType, TableId};

#[derive(Debug, Clone, PartialEq)]
pub enum TextCondition {
    Contains(String),
    NotContains(String),
    EqualTo(String),
    Empty,
    NotEmpty,
}

/// A `None` bound is a compare value that did not parse as a number. The
/// condition stays in the predicate and matches no row.
#[derive(Debug, Clone, PartialEq)]
pub enum NumberCondition {
    GreaterThan(Option<f64>),
    SmallerThan(Option<f64>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Text {
        field_id: FieldId,
        test: TextCondition,
    },
    Number {
        field_id: FieldId,
        test: NumberCondition,
    },
}

impl Condition {
    pub const fn field_id(&self) -> FieldId {
        match self {
            Self::Text { field_id, .. } | Self::Number { field_id, .. } => *field_id,
        }
    }
}

/// Boolean shape of the compiled filters, evaluated inside the table scope.
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    /// No active filters: every record of the table.
    Always,
    All(Vec<Condition>),
    Any(Vec<Condition>),
    /// `ALL(all) OR ANY(any)`, each side already scoped to the table.
    Either {
        all: Vec<Condition>,
        any: Vec<Condition>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub table_id: TableId,
    pub clause: Clause,
}

impl Predicate {
    pub const fn scope(table_id: TableId) -> Self {
        Self {
            table_id,
            clause: Clause::Always,
        }
    }

    pub fn conditions(&self) -> impl Iterator<Item = &Condition> {
        let (first, second): (&[Condition], &[Condition]) = match &self.clause {
            Clause::Always => (&[], &[]),
            Clause::All(conditions) | Clause::Any(conditions) => (conditions, &[]),
            Clause::Either { all, any } => (all, any),
        };
        first.iter().chain(second.iter())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    UnknownField {
        field_id: FieldId,
    },
    FieldTableMismatch {
        field_id: FieldId,
        table_id: TableId,
    },
    OperatorTypeMismatch {
        filter_id: FilterId,
        operator: FilterOperator,
        field_type: FieldType,
    },
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownField { field_id } => {
                write!(f, "field {field_id} does not exist in this table")
            }
            Self::FieldTableMismatch { field_id, table_id } => {
                write!(f, "field {field_id} does not belong to table {table_id}")
            }
            Self::OperatorTypeMismatch {
                filter_id,
                operator,
                field_type,
            } => write!(
                f,
                "filter {filter_id} uses operator {} which is not valid for {} fields",
                operator.as_str(),
                field_type.as_str()
            ),
        }
    }
}

impl std::error::Error for CompileError {}

pub(crate) fn lookup_field(
    table_id: TableId,
    fields: &[Field],
    field_id: FieldId,
) -> Result<&Field, CompileError> {
    let field = fields
        .iter()
        .find(|field| field.id == field_id)
        .ok_or(CompileError::UnknownField { field_id })?;
    if field.table_id != table_id {
        return Err(CompileError::FieldTableMismatch { field_id, table_id });
    }
    Ok(field)
}

/// Build the predicate for `filters` over records of `table_id`.
///
/// Inactive filters are skipped. Filters that name a missing field or pair an
/// operator with the wrong field type are rejected before any query runs.
pub fn compile_predicate(
    table_id: TableId,
    fields: &[Field],
    filters: &[Filter],
) -> Result<Predicate, CompileError> {
    let mut all = Vec::new();
    let mut any = Vec::new();

    for filter in filters {
        let field = lookup_field(table_id, fields, filter.field_id)?;
        if filter.operator.field_type() != field.field_type {
            return Err(CompileError::OperatorTypeMismatch {
                filter_id: filter.id,
                operator: filter.operator,
                field_type: field.field_type,
            });
        }
        if !filter.is_active() {
            continue;
        }

        let condition = condition_for(field.id, filter.operator, &filter.compare_val);
        match filter.join_type {
            JoinType::And => all.push(condition),
            JoinType::Or => any.push(condition),
        }
    }

    let clause = match (all.is_empty(), any.is_empty()) {
        (true, true) => Clause::Always,
        (false, true) => Clause::All(all),
        (true, false) => Clause::Any(any),
        (false, false) => Clause::Either { all, any },
    };
    Ok(Predicate { table_id, clause })
}

fn condition_for(field_id: FieldId, operator: FilterOperator, compare_val: &str) -> Condition {
    let text = |test| Condition::Text { field_id, test };
    let number = |test| Condition::Number { field_id, test };
    match operator {
        FilterOperator::Contains => text(TextCondition::Contains(compare_val.to_owned())),
        FilterOperator::NotContains => text(TextCondition::NotContains(compare_val.to_owned())),
        FilterOperator::EqualTo => text(TextCondition::EqualTo(compare_val.to_owned())),
        FilterOperator::Empty => text(TextCondition::Empty),
        FilterOperator::NotEmpty => text(TextCondition::NotEmpty),
        FilterOperator::GreaterThan => number(NumberCondition::GreaterThan(parse_number(
            compare_val,
        ))),
        FilterOperator::SmallerThan => number(NumberCondition::SmallerThan(parse_number(
            compare_val,
        ))),
    }
}

/// Numeric projection of a cell or compare value. Blank, non-numeric and
/// non-finite input has no numeric value.
pub fn parse_number(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|value| value.is_finite())
}
