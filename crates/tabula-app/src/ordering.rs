// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use crate::predicate::lookup_field;
use crate::{CompileError, Field, FieldId, FieldType, Sort, SortOperator, TableId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

impl From<SortOperator> for SortDirection {
    fn from(operator: SortOperator) -> Self {
        match operator {
            SortOperator::Increasing => Self::Asc,
            SortOperator::Decreasing => Self::Desc,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortExpr {
    /// Raw text value of the record's cell for this field.
    Text(FieldId),
    /// Numeric projection of the cell, with a stored zero read as no value.
    Number(FieldId),
    RowNum,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub expr: SortExpr,
    pub direction: SortDirection,
}

/// Total order over a view's records. The last key is always `rowNum ASC`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ordering {
    keys: Vec<SortKey>,
}

impl Ordering {
    pub fn insertion() -> Self {
        Self {
            keys: vec![SortKey {
                expr: SortExpr::RowNum,
                direction: SortDirection::Asc,
            }],
        }
    }

    pub fn keys(&self) -> &[SortKey] {
        &self.keys
    }
}

pub fn compile_ordering(
    table_id: TableId,
    fields: &[Field],
    sorts: &[Sort],
) -> Result<Ordering, CompileError> {
    let mut keys = Vec::with_capacity(sorts.len() + 1);
    for sort in sorts {
        let field = lookup_field(table_id, fields, sort.field_id)?;
        let expr = match field.field_type {
            FieldType::Text => SortExpr::Text(field.id),
            FieldType::Number => SortExpr::Number(field.id),
        };
        keys.push(SortKey {
            expr,
            direction: sort.operator.into(),
        });
    }
    keys.push(SortKey {
        expr: SortExpr::RowNum,
        direction: SortDirection::Asc,
    });
    Ok(Ordering { keys })
}

#[cfg(test)]
mod tests {
    use super::{Ordering, SortDirection, SortExpr, SortKey, compile_ordering};
    use crate::{
        CompileError, Field, FieldId, FieldType, Sort, SortId, SortOperator, TableId, ViewId,
    };

    const TABLE: TableId = TableId::new(3);

    fn fields() -> Vec<Field> {
        vec![
            Field {
                id: FieldId::new(1),
                table_id: TABLE,
                name: "Name".to_owned(),
                field_type: FieldType::Text,
                column_number: 0,
            },
            Field {
                id: FieldId::new(2),
                table_id: TABLE,
                name: "Age".to_owned(),
                field_type: FieldType::Number,
                column_number: 1,
            },
        ]
    }

    fn sort(id: i64, field_id: i64, operator: SortOperator) -> Sort {
        Sort {
            id: SortId::new(id),
            view_id: ViewId::new(1),
            field_id: FieldId::new(field_id),
            operator,
        }
    }

    #[test]
    fn empty_sort_list_orders_by_row_num() -> Result<(), CompileError> {
        let ordering = compile_ordering(TABLE, &fields(), &[])?;
        assert_eq!(ordering, Ordering::insertion());
        Ok(())
    }

    #[test]
    fn keys_follow_declared_order_and_end_with_row_num() -> Result<(), CompileError> {
        let sorts = [
            sort(1, 2, SortOperator::Decreasing),
            sort(2, 1, SortOperator::Increasing),
        ];
        let ordering = compile_ordering(TABLE, &fields(), &sorts)?;
        assert_eq!(
            ordering.keys(),
            &[
                SortKey {
                    expr: SortExpr::Number(FieldId::new(2)),
                    direction: SortDirection::Desc,
                },
                SortKey {
                    expr: SortExpr::Text(FieldId::new(1)),
                    direction: SortDirection::Asc,
                },
                SortKey {
                    expr: SortExpr::RowNum,
                    direction: SortDirection::Asc,
                },
            ]
        );
        Ok(())
    }

    #[test]
    fn sort_on_unknown_field_is_rejected() {
        let error = compile_ordering(TABLE, &fields(), &[sort(1, 77, SortOperator::Increasing)])
            .expect_err("unknown field should fail");
        assert_eq!(
            error,
            CompileError::UnknownField {
                field_id: FieldId::new(77)
            }
        );
    }
}
