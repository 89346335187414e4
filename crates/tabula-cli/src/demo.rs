// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use log::info;
use std::collections::BTreeSet;
use tabula_app::{FilterInput, FilterOperator, JoinType, SortInput, SortOperator, ViewId};
use tabula_db::{NewRecord, Store};
use tabula_testkit::{PEOPLE_FIELDS, RecordFaker};

pub const DEMO_SEED: u64 = 2026;
pub const DEMO_PEOPLE: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DemoViews {
    pub everyone: ViewId,
    pub seniors: ViewId,
}

/// Seed a "People" table with synthetic rows and two views over it: one
/// plain grid and one filtered, sorted view with the email column hidden.
pub fn seed_demo(store: &Store, people: usize) -> Result<DemoViews> {
    let table = store.create_table("People").context("seed demo table")?;
    let mut fields = Vec::with_capacity(PEOPLE_FIELDS.len());
    for (name, field_type) in PEOPLE_FIELDS {
        fields.push(store.create_field(table, name, field_type)?);
    }

    let mut faker = RecordFaker::new(DEMO_SEED);
    let records = faker.people(people).into_iter().map(|person| {
        fields
            .iter()
            .zip(person.cells())
            .fold(NewRecord::default(), |record, (field, value)| {
                record.with_value(*field, value)
            })
    });
    let inserted = store.add_x_records(table, records)?;

    let everyone = store.create_view(table, "All people")?;
    let seniors = store.create_view(table, "Over 30, oldest first")?;
    store.update_filters(
        seniors,
        &[FilterInput {
            field_id: fields[1],
            operator: FilterOperator::GreaterThan,
            join_type: JoinType::And,
            compare_val: "30".to_owned(),
        }],
    )?;
    store.update_sorts(
        seniors,
        &[
            SortInput {
                field_id: fields[1],
                operator: SortOperator::Decreasing,
            },
            SortInput {
                field_id: fields[0],
                operator: SortOperator::Increasing,
            },
        ],
    )?;
    store.update_view_hidden_fields(seniors, &BTreeSet::from([fields[3]]))?;

    info!("seeded {inserted} demo people (seed {DEMO_SEED})");
    Ok(DemoViews { everyone, seniors })
}
