// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::time::Instant;

use log::warn;

use crate::{
    CountRequest, Generation, MatchTarget, PageRequest, Row, SearchNavigator, SearchRequest,
    ViewQuery, VisibleRange, WindowCache, WindowConfig,
};

/// Client-side state for one open view: the compiled query, the page cache
/// and the find-in-view navigator. Mutated only through [`ViewState::dispatch`].
#[derive(Debug, Clone)]
pub struct ViewState {
    pub query: Option<ViewQuery>,
    pub window: WindowCache,
    pub search: SearchNavigator,
    pub status_line: Option<String>,
}

impl Default for ViewState {
    fn default() -> Self {
        Self::new(WindowConfig::default(), crate::DEFAULT_ROW_HEIGHT)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewCommand {
    /// A new or edited configuration (filters, sorts or hidden fields).
    Load(ViewQuery),
    /// Rows were written: cell edit, insert, delete, or a finished bulk insert.
    RecordsChanged,
    Scroll {
        range: VisibleRange,
        at: Instant,
    },
    Tick(Instant),
    CountLoaded {
        generation: Generation,
        total: usize,
    },
    CountFailed {
        generation: Generation,
        error: String,
    },
    PageLoaded {
        request: PageRequest,
        rows: Vec<Row>,
    },
    PageFailed {
        request: PageRequest,
        error: String,
    },
    Search(String),
    SearchLoaded {
        generation: Generation,
        rows: Vec<Row>,
    },
    SearchFailed {
        generation: Generation,
        error: String,
    },
    NextMatch,
    PreviousMatch,
    ClearStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewEvent {
    FetchCount(CountRequest),
    FetchPage(PageRequest),
    RunSearch(SearchRequest),
    TotalChanged(usize),
    PageReady(usize),
    MatchesReady(usize),
    ScrollTo(MatchTarget),
    StatusUpdated(String),
    StatusCleared,
}

impl ViewState {
    pub fn new(window: WindowConfig, row_height: u32) -> Self {
        Self {
            query: None,
            window: WindowCache::new(window),
            search: SearchNavigator::new(row_height),
            status_line: None,
        }
    }

    pub fn dispatch(&mut self, command: ViewCommand) -> Vec<ViewEvent> {
        match command {
            ViewCommand::Load(query) => {
                self.query = Some(query);
                self.invalidate()
            }
            ViewCommand::RecordsChanged => {
                if self.query.is_none() {
                    return Vec::new();
                }
                self.invalidate()
            }
            ViewCommand::Scroll { range, at } => {
                self.window.set_visible_range(range, at);
                Vec::new()
            }
            ViewCommand::Tick(now) => self
                .window
                .poll(now)
                .into_iter()
                .map(ViewEvent::FetchPage)
                .collect(),
            ViewCommand::CountLoaded { generation, total } => {
                if !self.window.complete_count(generation, total) {
                    return Vec::new();
                }
                vec![ViewEvent::TotalChanged(total)]
            }
            ViewCommand::CountFailed { generation, error } => {
                if !self.window.fail_count(generation) {
                    return Vec::new();
                }
                warn!("count for generation {generation} failed: {error}");
                vec![self.set_status(&format!("count failed: {error}; scroll to retry"))]
            }
            ViewCommand::PageLoaded { request, rows } => {
                if !self.window.complete_page(request, rows) {
                    return Vec::new();
                }
                vec![ViewEvent::PageReady(request.page_index)]
            }
            ViewCommand::PageFailed { request, error } => {
                if !self.window.fail_page(request) {
                    return Vec::new();
                }
                warn!("page {} failed: {error}", request.page_index);
                vec![self.set_status(&format!(
                    "rows {}-{} failed to load: {error}; scroll to retry",
                    request.skip + 1,
                    request.skip + request.take
                ))]
            }
            ViewCommand::Search(text) => match self.search.set_query(&text) {
                // Without a view the query is kept and runs on the next load.
                Some(request) if self.query.is_none() => {
                    self.search.fail(request.generation);
                    Vec::new()
                }
                Some(request) => vec![ViewEvent::RunSearch(request)],
                None => Vec::new(),
            },
            ViewCommand::SearchLoaded { generation, rows } => {
                let Some(query) = &self.query else {
                    self.search.fail(generation);
                    return Vec::new();
                };
                if !self.search.complete(generation, &rows, query.columns()) {
                    return Vec::new();
                }
                let count = self.search.match_count();
                let label = match count {
                    0 => "no matches".to_owned(),
                    1 => "1 match".to_owned(),
                    n => format!("{n} matches"),
                };
                let mut events = vec![ViewEvent::MatchesReady(count), self.set_status(&label)];
                if let Some(target) = self.search.current_target() {
                    events.extend(self.scroll_to(target));
                }
                events
            }
            ViewCommand::SearchFailed { generation, error } => {
                if !self.search.fail(generation) {
                    return Vec::new();
                }
                warn!("search for generation {generation} failed: {error}");
                vec![self.set_status(&format!("search failed: {error}"))]
            }
            ViewCommand::NextMatch => match self.search.move_next() {
                Some(target) => self.scroll_to(target),
                None => Vec::new(),
            },
            ViewCommand::PreviousMatch => match self.search.move_previous() {
                Some(target) => self.scroll_to(target),
                None => Vec::new(),
            },
            ViewCommand::ClearStatus => {
                self.status_line = None;
                vec![ViewEvent::StatusCleared]
            }
        }
    }

    fn invalidate(&mut self) -> Vec<ViewEvent> {
        let mut events = vec![ViewEvent::FetchCount(self.window.invalidate())];
        events.extend(self.window.refresh().into_iter().map(ViewEvent::FetchPage));
        if let Some(request) = self.search.rerun() {
            events.push(ViewEvent::RunSearch(request));
        }
        events
    }

    fn scroll_to(&mut self, target: MatchTarget) -> Vec<ViewEvent> {
        let height = self
            .window
            .visible_range()
            .map_or(0, |range| range.end - range.start);
        let start = target.cell.record_index;
        let range = VisibleRange::new(start, start + height);

        let mut events = vec![ViewEvent::ScrollTo(target)];
        events.extend(
            self.window
                .jump_to(range)
                .into_iter()
                .map(ViewEvent::FetchPage),
        );
        events
    }

    fn set_status(&mut self, message: &str) -> ViewEvent {
        self.status_line = Some(message.to_owned());
        ViewEvent::StatusUpdated(message.to_owned())
    }
}
