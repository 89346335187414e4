// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Find-in-view: a flattened match sequence with wraparound navigation.

use log::debug;

use crate::{Field, FieldId, Generation, RecordId, Row};

pub const DEFAULT_ROW_HEIGHT: u32 = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellMatch {
    pub record_index: usize,
    pub cell_index: usize,
    pub record_id: RecordId,
    pub field_id: FieldId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub generation: Generation,
    pub query: String,
}

/// Where a navigation step landed and how far to scroll to show it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchTarget {
    pub global_index: usize,
    pub cell: CellMatch,
    pub scroll_offset: u64,
}

pub const fn next_index(current: usize, len: usize) -> usize {
    if current + 1 >= len { 0 } else { current + 1 }
}

pub const fn previous_index(current: usize, len: usize) -> usize {
    if current == 0 {
        len.saturating_sub(1)
    } else {
        current - 1
    }
}

/// Unicode lowercase. The store registers this as its SQL case folding so
/// filters, search queries and the navigator agree on what matches.
pub fn fold_case(value: &str) -> String {
    value.to_lowercase()
}

pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    fold_case(haystack).contains(&fold_case(needle))
}

/// Flatten search rows into matches, in result order then column order.
/// Cells on columns outside `columns` (hidden fields) never match.
pub fn collect_matches(rows: &[Row], columns: &[Field], query: &str) -> Vec<CellMatch> {
    let mut matches = Vec::new();
    if query.is_empty() {
        return matches;
    }
    for (record_index, row) in rows.iter().enumerate() {
        let mut hits = row
            .cells
            .iter()
            .filter(|cell| contains_ignore_case(&cell.value, query))
            .filter_map(|cell| {
                let cell_index = columns.iter().position(|field| field.id == cell.field_id)?;
                Some(CellMatch {
                    record_index,
                    cell_index,
                    record_id: row.id,
                    field_id: cell.field_id,
                })
            })
            .collect::<Vec<_>>();
        hits.sort_by_key(|hit| hit.cell_index);
        matches.extend(hits);
    }
    matches
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchNavigator {
    row_height: u32,
    generation: Generation,
    query: String,
    pending: bool,
    matches: Vec<CellMatch>,
    current: Option<usize>,
}

impl Default for SearchNavigator {
    fn default() -> Self {
        Self::new(DEFAULT_ROW_HEIGHT)
    }
}

impl SearchNavigator {
    pub const fn new(row_height: u32) -> Self {
        Self {
            row_height,
            generation: 0,
            query: String::new(),
            pending: false,
            matches: Vec::new(),
            current: None,
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub const fn generation(&self) -> Generation {
        self.generation
    }

    pub const fn is_pending(&self) -> bool {
        self.pending
    }

    pub fn matches(&self) -> &[CellMatch] {
        &self.matches
    }

    pub fn match_count(&self) -> usize {
        self.matches.len()
    }

    pub const fn current_index(&self) -> Option<usize> {
        self.current
    }

    /// Navigation is possible once the current query's results are in and
    /// at least one cell matched.
    pub fn is_enabled(&self) -> bool {
        !self.pending && self.current.is_some()
    }

    /// Replace the query. Any match state, including a result still on the
    /// wire for the previous query, is invalidated. An empty query only
    /// clears.
    pub fn set_query(&mut self, query: &str) -> Option<SearchRequest> {
        self.generation += 1;
        self.query = query.to_owned();
        self.matches.clear();
        self.current = None;
        self.pending = !query.is_empty();
        if !self.pending {
            return None;
        }
        Some(SearchRequest {
            generation: self.generation,
            query: self.query.clone(),
        })
    }

    /// Re-run the current query against a changed view.
    pub fn rerun(&mut self) -> Option<SearchRequest> {
        let query = std::mem::take(&mut self.query);
        self.set_query(&query)
    }

    pub fn clear(&mut self) {
        self.set_query("");
    }

    pub fn complete(&mut self, generation: Generation, rows: &[Row], columns: &[Field]) -> bool {
        if generation != self.generation || !self.pending {
            debug!(
                "discarding stale search result for generation {generation} (current {})",
                self.generation
            );
            return false;
        }
        self.pending = false;
        self.matches = collect_matches(rows, columns, &self.query);
        self.current = if self.matches.is_empty() { None } else { Some(0) };
        true
    }

    pub fn fail(&mut self, generation: Generation) -> bool {
        if generation != self.generation {
            return false;
        }
        self.pending = false;
        true
    }

    pub fn current_target(&self) -> Option<MatchTarget> {
        let index = self.current?;
        let cell = *self.matches.get(index)?;
        Some(MatchTarget {
            global_index: index,
            cell,
            scroll_offset: cell.record_index as u64 * u64::from(self.row_height),
        })
    }

    pub fn move_next(&mut self) -> Option<MatchTarget> {
        self.step(next_index)
    }

    pub fn move_previous(&mut self) -> Option<MatchTarget> {
        self.step(previous_index)
    }

    fn step(&mut self, transition: fn(usize, usize) -> usize) -> Option<MatchTarget> {
        if !self.is_enabled() {
            return None;
        }
        let current = self.current?;
        self.current = Some(transition(current, self.matches.len()));
        self.current_target()
    }

    pub fn is_current_cell(&self, record_index: usize, cell_index: usize) -> bool {
        self.current_target().is_some_and(|target| {
            target.cell.record_index == record_index && target.cell.cell_index == cell_index
        })
    }
}
