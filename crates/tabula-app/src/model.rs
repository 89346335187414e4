// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::ids::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    Text,
    Number,
}

impl FieldType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Number => "number",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "text" => Some(Self::Text),
            "number" => Some(Self::Number),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterOperator {
    Contains,
    NotContains,
    EqualTo,
    Empty,
    NotEmpty,
    GreaterThan,
    SmallerThan,
}

const TEXT_OPERATORS: [FilterOperator; 5] = [
    FilterOperator::Contains,
    FilterOperator::NotContains,
    FilterOperator::EqualTo,
    FilterOperator::Empty,
    FilterOperator::NotEmpty,
];

const NUMBER_OPERATORS: [FilterOperator; 2] =
    [FilterOperator::GreaterThan, FilterOperator::SmallerThan];

impl FilterOperator {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Contains => "CONTAINS",
            Self::NotContains => "NOTCONTAINS",
            Self::EqualTo => "EQUALTO",
            Self::Empty => "EMPTY",
            Self::NotEmpty => "NOTEMPTY",
            Self::GreaterThan => "GREATERTHAN",
            Self::SmallerThan => "SMALLERTHAN",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "CONTAINS" => Some(Self::Contains),
            "NOTCONTAINS" => Some(Self::NotContains),
            "EQUALTO" => Some(Self::EqualTo),
            "EMPTY" => Some(Self::Empty),
            "NOTEMPTY" => Some(Self::NotEmpty),
            "GREATERTHAN" => Some(Self::GreaterThan),
            "SMALLERTHAN" => Some(Self::SmallerThan),
            _ => None,
        }
    }

    /// Operators offered for a field of the given type, first one is the default.
    pub const fn for_field_type(field_type: FieldType) -> &'static [FilterOperator] {
        match field_type {
            FieldType::Text => &TEXT_OPERATORS,
            FieldType::Number => &NUMBER_OPERATORS,
        }
    }

    pub const fn field_type(self) -> FieldType {
        match self {
            Self::Contains | Self::NotContains | Self::EqualTo | Self::Empty | Self::NotEmpty => {
                FieldType::Text
            }
            Self::GreaterThan | Self::SmallerThan => FieldType::Number,
        }
    }

    pub const fn requires_value(self) -> bool {
        !matches!(self, Self::Empty | Self::NotEmpty)
    }

    pub fn label(self, in_dropdown: bool) -> String {
        let ellipsis = if in_dropdown { "..." } else { "" };
        match self {
            Self::Contains => format!("contains{ellipsis}"),
            Self::NotContains => format!("does not contain{ellipsis}"),
            Self::EqualTo => format!("is{ellipsis}"),
            Self::Empty => "is empty".to_owned(),
            Self::NotEmpty => "is not empty".to_owned(),
            Self::GreaterThan => ">".to_owned(),
            Self::SmallerThan => "<".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JoinType {
    And,
    Or,
}

impl JoinType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "AND" => Some(Self::And),
            "OR" => Some(Self::Or),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortOperator {
    Increasing,
    Decreasing,
}

impl SortOperator {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Increasing => "INCREASING",
            Self::Decreasing => "DECREASING",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "INCREASING" => Some(Self::Increasing),
            "DECREASING" => Some(Self::Decreasing),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    pub id: FieldId,
    pub table_id: TableId,
    pub name: String,
    pub field_type: FieldType,
    pub column_number: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    pub id: FilterId,
    pub view_id: ViewId,
    pub field_id: FieldId,
    pub operator: FilterOperator,
    pub join_type: JoinType,
    pub compare_val: String,
}

impl Filter {
    /// A value-requiring operator with nothing to compare against is a no-op.
    pub fn is_active(&self) -> bool {
        !self.operator.requires_value() || !self.compare_val.is_empty()
    }

    /// Point the filter at another field. Crossing field types resets the
    /// operator to the new type's default and drops the comparison value.
    pub fn retarget(&mut self, field: &Field) {
        let same_type = self.operator.field_type() == field.field_type;
        self.field_id = field.id;
        if !same_type {
            self.operator = FilterOperator::for_field_type(field.field_type)[0];
            self.compare_val.clear();
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sort {
    pub id: SortId,
    pub view_id: ViewId,
    pub field_id: FieldId,
    pub operator: SortOperator,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct View {
    pub id: ViewId,
    pub table_id: TableId,
    pub name: String,
    pub hidden_field_ids: BTreeSet<FieldId>,
    pub filters: Vec<Filter>,
    pub sorts: Vec<Sort>,
}

impl View {
    pub fn filter_spec(&self) -> FilterSpec {
        FilterSpec {
            table_id: self.table_id,
            filters: self.filters.clone(),
        }
    }

    pub fn order_spec(&self) -> OrderSpec {
        OrderSpec {
            sorts: self.sorts.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: RecordId,
    pub table_id: TableId,
    pub row_num: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cell {
    pub id: CellId,
    pub record_id: RecordId,
    pub field_id: FieldId,
    pub value: String,
    pub num_value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowCell {
    pub field_id: FieldId,
    pub value: String,
}

/// One record as served to the grid: visible cells only, in column order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Row {
    pub id: RecordId,
    pub row_num: i64,
    pub cells: Vec<RowCell>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterSpec {
    pub table_id: TableId,
    pub filters: Vec<Filter>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSpec {
    pub sorts: Vec<Sort>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordCount {
    pub total_records_in_view: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RecordsPage {
    pub records: Vec<Row>,
}

#[cfg(test)]
mod tests {
    use super::{Field, FieldType, Filter, FilterOperator, JoinType};
    use crate::{FieldId, FilterId, TableId, ViewId};

    fn filter(operator: FilterOperator, compare_val: &str) -> Filter {
        Filter {
            id: FilterId::new(1),
            view_id: ViewId::new(1),
            field_id: FieldId::new(1),
            operator,
            join_type: JoinType::And,
            compare_val: compare_val.to_owned(),
        }
    }

    #[test]
    fn empty_compare_value_deactivates_value_operators_only() {
        assert!(!filter(FilterOperator::Contains, "").is_active());
        assert!(!filter(FilterOperator::GreaterThan, "").is_active());
        assert!(filter(FilterOperator::Empty, "").is_active());
        assert!(filter(FilterOperator::NotEmpty, "").is_active());
        assert!(filter(FilterOperator::EqualTo, "x").is_active());
    }

    #[test]
    fn operator_strings_round_trip() {
        for field_type in [FieldType::Text, FieldType::Number] {
            for operator in FilterOperator::for_field_type(field_type) {
                assert_eq!(FilterOperator::parse(operator.as_str()), Some(*operator));
                assert_eq!(operator.field_type(), field_type);
            }
        }
        assert_eq!(FilterOperator::parse("LIKE"), None);
    }

    #[test]
    fn labels_match_filter_menu_text() {
        assert_eq!(FilterOperator::Contains.label(true), "contains...");
        assert_eq!(FilterOperator::NotContains.label(false), "does not contain");
        assert_eq!(FilterOperator::EqualTo.label(true), "is...");
        assert_eq!(FilterOperator::Empty.label(true), "is empty");
        assert_eq!(FilterOperator::GreaterThan.label(false), ">");
    }

    #[test]
    fn retarget_across_types_resets_operator_and_value() {
        let age = Field {
            id: FieldId::new(9),
            table_id: TableId::new(1),
            name: "Age".to_owned(),
            field_type: FieldType::Number,
            column_number: 2,
        };
        let mut filter = filter(FilterOperator::Contains, "ali");
        filter.retarget(&age);
        assert_eq!(filter.field_id, age.id);
        assert_eq!(filter.operator, FilterOperator::GreaterThan);
        assert!(filter.compare_val.is_empty());
    }

    #[test]
    fn retarget_within_type_keeps_operator_and_value() {
        let city = Field {
            id: FieldId::new(4),
            table_id: TableId::new(1),
            name: "City".to_owned(),
            field_type: FieldType::Text,
            column_number: 3,
        };
        let mut filter = filter(FilterOperator::NotContains, "port");
        filter.retarget(&city);
        assert_eq!(filter.field_id, city.id);
        assert_eq!(filter.operator, FilterOperator::NotContains);
        assert_eq!(filter.compare_val, "port");
    }
}
