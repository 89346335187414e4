// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Client-side page cache behind a scroll-virtualized grid.
//!
//! The cache never performs I/O. It hands out [`PageRequest`]s and
//! [`CountRequest`]s tagged with the current generation, and accepts their
//! results in whatever order they complete. Results from an older generation
//! are dropped.

use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

use log::debug;

use crate::Row;

pub const DEFAULT_PAGE_SIZE: usize = 100;
pub const DEFAULT_PREFETCH_PAGES: usize = 1;
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(150);

pub type Generation = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowConfig {
    pub page_size: usize,
    pub prefetch_pages: usize,
    pub debounce: Duration,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            prefetch_pages: DEFAULT_PREFETCH_PAGES,
            debounce: DEFAULT_DEBOUNCE,
        }
    }
}

/// Inclusive range of row indexes currently on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisibleRange {
    pub start: usize,
    pub end: usize,
}

impl VisibleRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self {
            start: start.min(end),
            end: start.max(end),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub generation: Generation,
    pub page_index: usize,
    pub skip: usize,
    pub take: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountRequest {
    pub generation: Generation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowSlot<'a> {
    Loaded(&'a Row),
    /// The row's page has not arrived yet; render a skeleton at `index`.
    Placeholder { index: usize },
}

impl RowSlot<'_> {
    pub const fn is_placeholder(&self) -> bool {
        matches!(self, Self::Placeholder { .. })
    }
}

/// A single pending value that fires once its quiet period has elapsed.
/// Scheduling again replaces the pending value and restarts the delay.
#[derive(Debug, Clone)]
pub struct Debouncer<T> {
    delay: Duration,
    pending: Option<(Instant, T)>,
}

impl<T> Debouncer<T> {
    pub const fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
        }
    }

    pub fn schedule(&mut self, value: T, now: Instant) {
        self.pending = Some((now + self.delay, value));
    }

    pub fn cancel(&mut self) {
        self.pending = None;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|(deadline, _)| *deadline)
    }

    pub fn poll(&mut self, now: Instant) -> Option<T> {
        let ready = self
            .pending
            .as_ref()
            .is_some_and(|(deadline, _)| *deadline <= now);
        if !ready {
            return None;
        }
        self.pending.take().map(|(_, value)| value)
    }
}

#[derive(Debug, Clone)]
pub struct WindowCache {
    config: WindowConfig,
    generation: Generation,
    total_rows: Option<usize>,
    count_in_flight: bool,
    pages: BTreeMap<usize, Vec<Row>>,
    in_flight: BTreeSet<usize>,
    visible: Option<VisibleRange>,
    debounce: Debouncer<VisibleRange>,
}

impl WindowCache {
    pub fn new(config: WindowConfig) -> Self {
        let config = WindowConfig {
            page_size: config.page_size.max(1),
            ..config
        };
        Self {
            config,
            generation: 0,
            total_rows: None,
            count_in_flight: false,
            pages: BTreeMap::new(),
            in_flight: BTreeSet::new(),
            visible: None,
            debounce: Debouncer::new(config.debounce),
        }
    }

    pub const fn config(&self) -> WindowConfig {
        self.config
    }

    pub const fn generation(&self) -> Generation {
        self.generation
    }

    pub const fn total_rows(&self) -> Option<usize> {
        self.total_rows
    }

    pub const fn visible_range(&self) -> Option<VisibleRange> {
        self.visible
    }

    pub fn debounce_deadline(&self) -> Option<Instant> {
        self.debounce.deadline()
    }

    pub fn is_cached(&self, page_index: usize) -> bool {
        self.pages.contains_key(&page_index)
    }

    pub fn is_in_flight(&self, page_index: usize) -> bool {
        self.in_flight.contains(&page_index)
    }

    pub fn cached_pages(&self) -> impl Iterator<Item = usize> + '_ {
        self.pages.keys().copied()
    }

    pub fn is_idle(&self) -> bool {
        !self.count_in_flight && self.in_flight.is_empty() && self.debounce.deadline().is_none()
    }

    /// Start a new generation: drop every cached page and forget in-flight
    /// work. Responses still on the wire for the old generation are ignored
    /// when they land.
    pub fn invalidate(&mut self) -> CountRequest {
        self.generation += 1;
        self.total_rows = None;
        self.count_in_flight = true;
        self.pages.clear();
        self.in_flight.clear();
        self.debounce.cancel();
        debug!("window cache invalidated, generation {}", self.generation);
        CountRequest {
            generation: self.generation,
        }
    }

    /// Re-request the last visible range without waiting for the debounce.
    pub fn refresh(&mut self) -> Vec<PageRequest> {
        match self.visible {
            Some(range) => self.request_range(range),
            None => Vec::new(),
        }
    }

    pub fn set_visible_range(&mut self, range: VisibleRange, now: Instant) {
        self.visible = Some(range);
        self.debounce.schedule(range, now);
    }

    /// Move the viewport programmatically and fetch without waiting.
    pub fn jump_to(&mut self, range: VisibleRange) -> Vec<PageRequest> {
        self.visible = Some(range);
        self.debounce.cancel();
        self.request_range(range)
    }

    /// Fire the debounced range change if its quiet period is over.
    pub fn poll(&mut self, now: Instant) -> Vec<PageRequest> {
        match self.debounce.poll(now) {
            Some(range) => self.request_range(range),
            None => Vec::new(),
        }
    }

    /// Requests for every page covering `range` plus the prefetch margin
    /// that is neither cached nor already in flight.
    pub fn request_range(&mut self, range: VisibleRange) -> Vec<PageRequest> {
        let Some((first, last)) = self.page_span(range) else {
            return Vec::new();
        };

        let mut requests = Vec::new();
        for page_index in first..=last {
            if self.pages.contains_key(&page_index) || !self.in_flight.insert(page_index) {
                continue;
            }
            requests.push(PageRequest {
                generation: self.generation,
                page_index,
                skip: page_index * self.config.page_size,
                take: self.config.page_size,
            });
        }
        requests
    }

    fn page_span(&self, range: VisibleRange) -> Option<(usize, usize)> {
        let page_size = self.config.page_size;
        let margin = self.config.prefetch_pages;
        let first = (range.start / page_size).saturating_sub(margin);
        let mut last = (range.end / page_size).saturating_add(margin);

        if let Some(total) = self.total_rows {
            if total == 0 {
                return None;
            }
            let last_page = (total - 1) / page_size;
            if first > last_page {
                return None;
            }
            last = last.min(last_page);
        }
        Some((first, last))
    }

    pub fn complete_count(&mut self, generation: Generation, total_rows: usize) -> bool {
        if generation != self.generation {
            debug!(
                "discarding stale count for generation {generation} (current {})",
                self.generation
            );
            return false;
        }
        self.count_in_flight = false;
        self.total_rows = Some(total_rows);
        true
    }

    pub fn fail_count(&mut self, generation: Generation) -> bool {
        if generation != self.generation {
            return false;
        }
        self.count_in_flight = false;
        true
    }

    pub fn complete_page(&mut self, request: PageRequest, rows: Vec<Row>) -> bool {
        if request.generation != self.generation {
            debug!(
                "discarding stale page {} for generation {} (current {})",
                request.page_index, request.generation, self.generation
            );
            return false;
        }
        self.in_flight.remove(&request.page_index);
        self.pages.insert(request.page_index, rows);
        true
    }

    /// Forget a failed fetch so the page is requested again on the next
    /// range change.
    pub fn fail_page(&mut self, request: PageRequest) -> bool {
        if request.generation != self.generation {
            return false;
        }
        self.in_flight.remove(&request.page_index)
    }

    /// Slot for one row index, or `None` past the known end of the view.
    pub fn row(&self, index: usize) -> Option<RowSlot<'_>> {
        if let Some(total) = self.total_rows
            && index >= total
        {
            return None;
        }
        let page_size = self.config.page_size;
        let slot = self
            .pages
            .get(&(index / page_size))
            .and_then(|rows| rows.get(index % page_size))
            .map_or(RowSlot::Placeholder { index }, RowSlot::Loaded);
        Some(slot)
    }

    /// One slot per index in `range`, clipped to the known row count.
    pub fn rows(&self, range: VisibleRange) -> Vec<RowSlot<'_>> {
        (range.start..=range.end)
            .map_while(|index| self.row(index))
            .collect()
    }
}
