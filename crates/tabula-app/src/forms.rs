// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, bail};
use std::collections::BTreeSet;

use crate::{Field, FieldId, FilterOperator, JoinType, SortOperator};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterInput {
    pub field_id: FieldId,
    pub operator: FilterOperator,
    pub join_type: JoinType,
    pub compare_val: String,
}

impl FilterInput {
    /// A fresh filter on `field` with that field type's default operator.
    pub fn blank_for(field: &Field) -> Self {
        Self {
            field_id: field.id,
            operator: FilterOperator::for_field_type(field.field_type)[0],
            join_type: JoinType::And,
            compare_val: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortInput {
    pub field_id: FieldId,
    pub operator: SortOperator,
}

/// A replacement for one part of a view's configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigPayload {
    Filters(Vec<FilterInput>),
    Sorts(Vec<SortInput>),
    HiddenFields(BTreeSet<FieldId>),
}

impl ConfigPayload {
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Filters(_) => "filters",
            Self::Sorts(_) => "sorts",
            Self::HiddenFields(_) => "hidden fields",
        }
    }

    /// Check every referenced field exists in `fields` and every filter
    /// operator suits its field's type.
    pub fn validate(&self, fields: &[Field]) -> Result<()> {
        match self {
            Self::Filters(filters) => {
                for (index, filter) in filters.iter().enumerate() {
                    let field = find_field(fields, filter.field_id, "filter", index)?;
                    if filter.operator.field_type() != field.field_type {
                        bail!(
                            "filter {} uses {} on {} field {:?}; pick one of: {}",
                            index + 1,
                            filter.operator.as_str(),
                            field.field_type.as_str(),
                            field.name,
                            operator_names(field),
                        );
                    }
                }
            }
            Self::Sorts(sorts) => {
                let mut seen = BTreeSet::new();
                for (index, sort) in sorts.iter().enumerate() {
                    find_field(fields, sort.field_id, "sort", index)?;
                    if !seen.insert(sort.field_id) {
                        bail!(
                            "sort {} repeats field {}; each field can be sorted once",
                            index + 1,
                            sort.field_id
                        );
                    }
                }
            }
            Self::HiddenFields(hidden) => {
                for field_id in hidden {
                    if !fields.iter().any(|field| field.id == *field_id) {
                        bail!("cannot hide field {field_id}: it does not exist in this table");
                    }
                }
            }
        }
        Ok(())
    }
}

fn find_field<'a>(
    fields: &'a [Field],
    field_id: FieldId,
    kind: &str,
    index: usize,
) -> Result<&'a Field> {
    match fields.iter().find(|field| field.id == field_id) {
        Some(field) => Ok(field),
        None => bail!(
            "{kind} {} references field {field_id}, which does not exist in this table",
            index + 1
        ),
    }
}

fn operator_names(field: &Field) -> String {
    FilterOperator::for_field_type(field.field_type)
        .iter()
        .map(|operator| operator.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::{ConfigPayload, FilterInput, SortInput};
    use crate::{Field, FieldId, FieldType, FilterOperator, JoinType, SortOperator, TableId};
    use std::collections::BTreeSet;

    fn fields() -> Vec<Field> {
        vec![
            Field {
                id: FieldId::new(1),
                table_id: TableId::new(1),
                name: "Name".to_owned(),
                field_type: FieldType::Text,
                column_number: 0,
            },
            Field {
                id: FieldId::new(2),
                table_id: TableId::new(1),
                name: "Age".to_owned(),
                field_type: FieldType::Number,
                column_number: 1,
            },
        ]
    }

    #[test]
    fn blank_filter_uses_type_default_operator() {
        let fields = fields();
        assert_eq!(
            FilterInput::blank_for(&fields[0]).operator,
            FilterOperator::Contains
        );
        assert_eq!(
            FilterInput::blank_for(&fields[1]).operator,
            FilterOperator::GreaterThan
        );
    }

    #[test]
    fn filter_validation_rejects_operator_type_mismatch() {
        let payload = ConfigPayload::Filters(vec![FilterInput {
            field_id: FieldId::new(2),
            operator: FilterOperator::Contains,
            join_type: JoinType::And,
            compare_val: "4".to_owned(),
        }]);
        let error = payload
            .validate(&fields())
            .expect_err("text operator on number field should fail");
        let message = error.to_string();
        assert!(message.contains("CONTAINS"));
        assert!(message.contains("GREATERTHAN, SMALLERTHAN"));
    }

    #[test]
    fn filter_validation_accepts_inactive_filters() {
        let payload = ConfigPayload::Filters(vec![FilterInput::blank_for(&fields()[0])]);
        assert!(payload.validate(&fields()).is_ok());
    }

    #[test]
    fn sort_validation_rejects_unknown_and_repeated_fields() {
        let unknown = ConfigPayload::Sorts(vec![SortInput {
            field_id: FieldId::new(9),
            operator: SortOperator::Increasing,
        }]);
        let error = unknown.validate(&fields()).expect_err("unknown field");
        assert!(error.to_string().contains("does not exist"));

        let repeated = ConfigPayload::Sorts(vec![
            SortInput {
                field_id: FieldId::new(1),
                operator: SortOperator::Increasing,
            },
            SortInput {
                field_id: FieldId::new(1),
                operator: SortOperator::Decreasing,
            },
        ]);
        let error = repeated.validate(&fields()).expect_err("repeated field");
        assert!(error.to_string().contains("sorted once"));
    }

    #[test]
    fn hidden_field_validation_requires_known_fields() {
        let payload = ConfigPayload::HiddenFields(BTreeSet::from([FieldId::new(5)]));
        assert!(payload.validate(&fields()).is_err());
        let payload = ConfigPayload::HiddenFields(BTreeSet::from([FieldId::new(2)]));
        assert!(payload.validate(&fields()).is_ok());
    }
}
