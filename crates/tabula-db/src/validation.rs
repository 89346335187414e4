// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use tabula_app::{FieldType, parse_number};

/// Rows committed per transaction during a bulk insert.
pub const BULK_INSERT_BATCH: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    ZeroTake,
    OffsetTooLarge,
    NameRequired,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ZeroTake => f.write_str("page size must be positive"),
            Self::OffsetTooLarge => f.write_str("page offset is out of range"),
            Self::NameRequired => f.write_str("name must not be blank"),
        }
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult<T> = std::result::Result<T, ValidationError>;

/// The stored numeric projection of `value` for a field of `field_type`.
/// Text fields and non-numeric input have none.
pub fn num_value_for(field_type: FieldType, value: &str) -> Option<f64> {
    match field_type {
        FieldType::Text => None,
        FieldType::Number => parse_number(value),
    }
}

/// `(LIMIT, OFFSET)` bind values for a `skip`/`take` window.
pub fn page_window(skip: usize, take: usize) -> ValidationResult<(i64, i64)> {
    if take == 0 {
        return Err(ValidationError::ZeroTake);
    }
    let limit = i64::try_from(take).map_err(|_| ValidationError::OffsetTooLarge)?;
    let offset = i64::try_from(skip).map_err(|_| ValidationError::OffsetTooLarge)?;
    Ok((limit, offset))
}

pub fn required_name(input: &str) -> ValidationResult<&str> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::NameRequired);
    }
    Ok(trimmed)
}

pub fn count_from_sql(raw: i64) -> usize {
    usize::try_from(raw).unwrap_or_default()
}
