// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Render compiled predicates and orderings into SQLite text with bound
//! parameters. User input is only ever bound, never spliced.

use rusqlite::types::Value;
use tabula_app::{
    Clause, Condition, NumberCondition, Ordering, Predicate, SortExpr, SortKey, TextCondition,
};

/// Unicode lowercase, registered on every connection the store opens.
pub(crate) const FOLD_CASE_FN: &str = "fold_case";

#[derive(Debug, Default, Clone, PartialEq)]
pub(crate) struct SqlFragment {
    pub sql: String,
    pub params: Vec<Value>,
}

impl SqlFragment {
    fn push(&mut self, sql: &str) {
        self.sql.push_str(sql);
    }

    fn bind(&mut self, value: impl Into<Value>) {
        self.sql.push('?');
        self.params.push(value.into());
    }

    fn append(&mut self, other: Self) {
        self.sql.push_str(&other.sql);
        self.params.extend(other.params);
    }
}

/// `WHERE` body selecting the records of `r` matched by `predicate`.
pub(crate) fn where_clause(predicate: &Predicate) -> SqlFragment {
    let mut fragment = SqlFragment::default();
    fragment.push("r.table_id = ");
    fragment.bind(predicate.table_id.get());

    match &predicate.clause {
        Clause::Always => {}
        Clause::All(conditions) => {
            fragment.push(" AND ");
            fragment.append(joined(conditions, " AND "));
        }
        Clause::Any(conditions) => {
            fragment.push(" AND ");
            fragment.append(joined(conditions, " OR "));
        }
        Clause::Either { all, any } => {
            fragment.push(" AND (");
            fragment.append(joined(all, " AND "));
            fragment.push(" OR ");
            fragment.append(joined(any, " OR "));
            fragment.push(")");
        }
    }
    fragment
}

fn joined(conditions: &[Condition], separator: &str) -> SqlFragment {
    let mut fragment = SqlFragment::default();
    fragment.push("(");
    for (index, condition) in conditions.iter().enumerate() {
        if index > 0 {
            fragment.push(separator);
        }
        fragment.append(condition_sql(condition));
    }
    fragment.push(")");
    fragment
}

fn condition_sql(condition: &Condition) -> SqlFragment {
    let mut fragment = SqlFragment::default();
    match condition {
        Condition::Text { field_id, test } => {
            let (negated, test_sql, operand) = match test {
                TextCondition::Contains(value) => {
                    (false, "instr(fold_case(c.value), fold_case(?)) > 0", Some(value))
                }
                TextCondition::NotContains(value) => {
                    (true, "instr(fold_case(c.value), fold_case(?)) > 0", Some(value))
                }
                TextCondition::EqualTo(value) => (false, "c.value = ?", Some(value)),
                TextCondition::Empty => (true, "c.value <> ''", None),
                TextCondition::NotEmpty => (false, "c.value <> ''", None),
            };
            fragment.push(if negated { "NOT EXISTS (" } else { "EXISTS (" });
            fragment.push("SELECT 1 FROM cells c WHERE c.record_id = r.id AND c.field_id = ");
            fragment.bind(field_id.get());
            fragment.push(" AND ");
            fragment.push(test_sql);
            if let Some(value) = operand {
                fragment.params.push(Value::Text(value.clone()));
            }
            fragment.push(")");
        }
        Condition::Number { field_id, test } => {
            let (comparison, bound) = match test {
                NumberCondition::GreaterThan(bound) => (" > ", bound),
                NumberCondition::SmallerThan(bound) => (" < ", bound),
            };
            let Some(bound) = bound else {
                // Unparseable bound: matches nothing.
                fragment.push("0");
                return fragment;
            };
            fragment.push("EXISTS (");
            fragment.push("SELECT 1 FROM cells c WHERE c.record_id = r.id AND c.field_id = ");
            fragment.bind(field_id.get());
            fragment.push(" AND c.num_value");
            fragment.push(comparison);
            fragment.bind(*bound);
            fragment.push(")");
        }
    }
    fragment
}

/// `ORDER BY` body for `ordering`. Missing cells read as empty text, and
/// numeric keys read zero as no value so they sort after every number.
pub(crate) fn order_clause(ordering: &Ordering) -> SqlFragment {
    let mut fragment = SqlFragment::default();
    for (index, key) in ordering.keys().iter().enumerate() {
        if index > 0 {
            fragment.push(", ");
        }
        fragment.append(sort_key_sql(key));
    }
    fragment
}

fn sort_key_sql(key: &SortKey) -> SqlFragment {
    let mut fragment = SqlFragment::default();
    let direction = key.direction.as_sql();
    match key.expr {
        SortExpr::Text(field_id) => {
            fragment.push(
                "COALESCE((SELECT c.value FROM cells c WHERE c.record_id = r.id AND c.field_id = ",
            );
            fragment.bind(field_id.get());
            fragment.push("), '') ");
            fragment.push(direction);
        }
        SortExpr::Number(field_id) => {
            fragment.push(
                "(SELECT NULLIF(c.num_value, 0) FROM cells c WHERE c.record_id = r.id AND c.field_id = ",
            );
            fragment.bind(field_id.get());
            fragment.push(") ");
            fragment.push(direction);
            fragment.push(" NULLS LAST");
        }
        SortExpr::RowNum => {
            fragment.push("r.row_num ");
            fragment.push(direction);
        }
    }
    fragment
}

#[cfg(test)]
mod tests {
    use super::{order_clause, where_clause};
    use rusqlite::types::Value;
    use tabula_app::{
        Clause, Condition, FieldId, NumberCondition, Ordering, Predicate, SortDirection, SortExpr,
        SortKey, TableId, TextCondition,
    };

    fn contains(field: i64, value: &str) -> Condition {
        Condition::Text {
            field_id: FieldId::new(field),
            test: TextCondition::Contains(value.to_owned()),
        }
    }

    #[test]
    fn unfiltered_predicate_only_scopes_the_table() {
        let fragment = where_clause(&Predicate::scope(TableId::new(4)));
        assert_eq!(fragment.sql, "r.table_id = ?");
        assert_eq!(fragment.params, vec![Value::Integer(4)]);
    }

    #[test]
    fn mixed_clause_keeps_or_inside_table_scope() {
        let predicate = Predicate {
            table_id: TableId::new(1),
            clause: Clause::Either {
                all: vec![contains(2, "a")],
                any: vec![contains(3, "b"), contains(4, "c")],
            },
        };
        let fragment = where_clause(&predicate);
        assert!(fragment.sql.starts_with("r.table_id = ? AND (("));
        assert!(fragment.sql.ends_with("))"));
        assert_eq!(fragment.sql.matches("EXISTS").count(), 3);
        assert_eq!(fragment.sql.matches(" OR ").count(), 2);
        assert_eq!(fragment.params.len(), 7);
        assert_eq!(fragment.params.len(), fragment.sql.matches('?').count());
    }

    #[test]
    fn malformed_number_bound_renders_false() {
        let predicate = Predicate {
            table_id: TableId::new(1),
            clause: Clause::All(vec![Condition::Number {
                field_id: FieldId::new(2),
                test: NumberCondition::GreaterThan(None),
            }]),
        };
        let fragment = where_clause(&predicate);
        assert_eq!(fragment.sql, "r.table_id = ? AND (0)");
        assert_eq!(fragment.params.len(), 1);
    }

    #[test]
    fn search_text_is_bound_not_spliced() {
        let predicate = Predicate {
            table_id: TableId::new(1),
            clause: Clause::All(vec![contains(2, "x'); DROP TABLE cells; --")]),
        };
        let fragment = where_clause(&predicate);
        assert!(!fragment.sql.contains("DROP"));
        assert_eq!(
            fragment.params.last(),
            Some(&Value::Text("x'); DROP TABLE cells; --".to_owned()))
        );
    }

    #[test]
    fn ordering_ends_with_row_num() {
        let ordering = Ordering::insertion();
        assert_eq!(order_clause(&ordering).sql, "r.row_num ASC");

        let key = SortKey {
            expr: SortExpr::Number(FieldId::new(5)),
            direction: SortDirection::Desc,
        };
        let fragment = super::sort_key_sql(&key);
        assert!(fragment.sql.contains("NULLIF(c.num_value, 0)"));
        assert!(fragment.sql.ends_with("DESC NULLS LAST"));
        assert_eq!(fragment.params, vec![Value::Integer(5)]);
    }
}
