// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use std::path::PathBuf;
use tabula_app::FieldType;

/// Column layout of the synthetic "People" table, in column order.
pub const PEOPLE_FIELDS: [(&str, FieldType); 4] = [
    ("Name", FieldType::Text),
    ("Age", FieldType::Number),
    ("City", FieldType::Text),
    ("Email", FieldType::Text),
];

const FIRST_NAMES: [&str; 24] = [
    "Alice", "Bob", "Carmen", "Dmitri", "Eve", "Farah", "Igor", "Joe", "Kenji", "Lily", "Maria",
    "Nadia", "Omer", "Priya", "Quinn", "Ruth", "Santiago", "Tom", "Uma", "Viktor", "Wendy",
    "Xochitl", "Yuki", "Zane",
];

const LAST_NAMES: [&str; 20] = [
    "Adams", "Brown", "Chen", "Doe", "Eriksen", "Fox", "Garcia", "Holt", "Ito", "Jones", "Kim",
    "Li", "Moreau", "Novak", "Ortiz", "Patel", "Quist", "Rossi", "Wu", "Young",
];

const CITIES: [&str; 16] = [
    "Austin", "Boston", "Chicago", "Denver", "Lisbon", "Madrid", "Nairobi", "Osaka", "Oslo",
    "Perth", "Quito", "Reno", "Seoul", "Tulsa", "Utrecht", "Zurich",
];

const EMAIL_DOMAINS: [&str; 4] = ["example.com", "example.org", "mail.test", "corp.test"];

const MIN_AGE: u32 = 16;
const MAX_AGE: u32 = 90;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Person {
    pub name: String,
    pub age: u32,
    pub city: String,
    pub email: String,
}

impl Person {
    /// Cell values in [`PEOPLE_FIELDS`] order.
    pub fn cells(&self) -> [String; 4] {
        [
            self.name.clone(),
            self.age.to_string(),
            self.city.clone(),
            self.email.clone(),
        ]
    }
}

#[derive(Debug, Clone)]
struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    fn new(seed: u64) -> Self {
        let mut state = seed ^ 0x9E37_79B9_7F4A_7C15;
        if state == 0 {
            state = 0xA409_3822_299F_31D0;
        }
        Self { state }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);

        let mut x = self.state;
        x ^= x >> 13;
        x ^= x << 7;
        x ^= x >> 17;
        x
    }

    fn int_n(&mut self, n: usize) -> usize {
        if n <= 1 {
            return 0;
        }
        (self.next_u64() % (n as u64)) as usize
    }
}

/// Seeded source of synthetic records. The same seed always yields the same
/// sequence.
#[derive(Debug, Clone)]
pub struct RecordFaker {
    rng: DeterministicRng,
    seed: u64,
}

impl RecordFaker {
    pub fn new(seed: u64) -> Self {
        let normalized = if seed == 0 { 1 } else { seed };
        Self {
            rng: DeterministicRng::new(normalized),
            seed: normalized,
        }
    }

    pub const fn seed(&self) -> u64 {
        self.seed
    }

    pub fn int_n(&mut self, n: usize) -> usize {
        self.rng.int_n(n)
    }

    pub fn person(&mut self) -> Person {
        let first = self.pick(&FIRST_NAMES);
        let last = self.pick(&LAST_NAMES);
        let span = (MAX_AGE - MIN_AGE + 1) as usize;
        let age = MIN_AGE + self.int_n(span) as u32;
        let city = self.pick(&CITIES).to_owned();
        let domain = self.pick(&EMAIL_DOMAINS);
        Person {
            name: format!("{first} {last}"),
            age,
            city,
            email: format!(
                "{}.{}@{domain}",
                first.to_ascii_lowercase(),
                last.to_ascii_lowercase()
            ),
        }
    }

    pub fn people(&mut self, count: usize) -> Vec<Person> {
        (0..count).map(|_| self.person()).collect()
    }

    fn pick<'a>(&mut self, items: &'a [&'a str]) -> &'a str {
        items[self.rng.int_n(items.len())]
    }
}

pub fn temp_db_path() -> Result<(tempfile::TempDir, PathBuf)> {
    let dir = tempfile::tempdir().context("create temp dir")?;
    let db_path = dir.path().join("tabula.db");
    Ok((dir, db_path))
}

#[cfg(test)]
mod tests {
    use super::{CITIES, MAX_AGE, MIN_AGE, PEOPLE_FIELDS, RecordFaker, temp_db_path};
    use anyhow::Result;
    use tabula_app::FieldType;

    #[test]
    fn same_seed_same_people() {
        let mut left = RecordFaker::new(42);
        let mut right = RecordFaker::new(42);
        assert_eq!(left.people(20), right.people(20));
    }

    #[test]
    fn zero_seed_is_normalized() {
        assert_eq!(RecordFaker::new(0).seed(), 1);
    }

    #[test]
    fn person_values_are_in_range() {
        let mut faker = RecordFaker::new(3);
        for person in faker.people(200) {
            assert!((MIN_AGE..=MAX_AGE).contains(&person.age));
            assert!(CITIES.contains(&person.city.as_str()));
            assert!(person.name.contains(' '));
            assert!(person.email.contains('@'));
        }
    }

    #[test]
    fn cells_follow_people_field_order() {
        let person = RecordFaker::new(9).person();
        let cells = person.cells();
        assert_eq!(cells.len(), PEOPLE_FIELDS.len());
        assert_eq!(cells[0], person.name);
        assert_eq!(cells[1].parse::<u32>().ok(), Some(person.age));
        assert_eq!(PEOPLE_FIELDS[1].1, FieldType::Number);
    }

    #[test]
    fn variety_across_seeds() {
        let first = RecordFaker::new(1).people(10);
        let second = RecordFaker::new(2).people(10);
        assert_ne!(first, second);
    }

    #[test]
    fn int_n() {
        let mut faker = RecordFaker::new(5);
        for _ in 0..100 {
            assert!(faker.int_n(7) < 7);
        }
        assert_eq!(faker.int_n(0), 0);
        assert_eq!(faker.int_n(1), 0);
    }

    #[test]
    fn temp_db_path_lives_in_temp_dir() -> Result<()> {
        let (dir, path) = temp_db_path()?;
        assert!(path.starts_with(dir.path()));
        assert!(!path.exists());
        Ok(())
    }
}
