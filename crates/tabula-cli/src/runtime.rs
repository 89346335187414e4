// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use log::{debug, warn};
use serde::Serialize;
use std::io::Write;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tabula_app::{
    CountRequest, FieldId, MatchTarget, PageRequest, RecordId, Row, RowSlot, SearchRequest,
    TableId, ViewCommand, ViewEvent, ViewId, ViewQuery, ViewState, VisibleRange, WindowConfig,
};
use tabula_db::Store;

const IDLE_WAIT: Duration = Duration::from_millis(250);

/// Query execution behind the fetch workers.
pub trait ViewRuntime {
    fn count(&mut self, query: &ViewQuery) -> Result<usize>;
    fn fetch_page(&mut self, query: &ViewQuery, skip: usize, take: usize) -> Result<Vec<Row>>;
    fn search(&mut self, query: &ViewQuery, text: &str) -> Result<Vec<Row>>;

    /// Run one job and turn its outcome into the completion command.
    fn run_job(&mut self, job: FetchJob) -> ViewCommand {
        match job {
            FetchJob::Count { request, query } => match self.count(&query) {
                Ok(total) => ViewCommand::CountLoaded {
                    generation: request.generation,
                    total,
                },
                Err(error) => ViewCommand::CountFailed {
                    generation: request.generation,
                    error: format!("{error:#}"),
                },
            },
            FetchJob::Page { request, query } => {
                match self.fetch_page(&query, request.skip, request.take) {
                    Ok(rows) => ViewCommand::PageLoaded { request, rows },
                    Err(error) => ViewCommand::PageFailed {
                        request,
                        error: format!("{error:#}"),
                    },
                }
            }
            FetchJob::Search { request, query } => match self.search(&query, &request.query) {
                Ok(rows) => ViewCommand::SearchLoaded {
                    generation: request.generation,
                    rows,
                },
                Err(error) => ViewCommand::SearchFailed {
                    generation: request.generation,
                    error: format!("{error:#}"),
                },
            },
        }
    }
}

pub struct DbRuntime {
    store: Store,
}

impl DbRuntime {
    pub fn new(store: Store) -> Self {
        Self { store }
    }
}

impl ViewRuntime for DbRuntime {
    fn count(&mut self, query: &ViewQuery) -> Result<usize> {
        self.store.count_records(&query.predicate)
    }

    fn fetch_page(&mut self, query: &ViewQuery, skip: usize, take: usize) -> Result<Vec<Row>> {
        self.store.fetch_page(query, skip, take)
    }

    fn search(&mut self, query: &ViewQuery, text: &str) -> Result<Vec<Row>> {
        self.store.search(query, text)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FetchJob {
    Count {
        request: CountRequest,
        query: ViewQuery,
    },
    Page {
        request: PageRequest,
        query: ViewQuery,
    },
    Search {
        request: SearchRequest,
        query: ViewQuery,
    },
}

/// Worker threads, each with its own runtime, pulling jobs from one queue.
/// Completions come back in the order jobs finish.
pub struct FetchPool {
    jobs: Option<Sender<FetchJob>>,
    completions: Receiver<ViewCommand>,
    workers: Vec<JoinHandle<()>>,
}

impl FetchPool {
    pub fn spawn<R, F>(workers: usize, mut factory: F) -> Result<Self>
    where
        R: ViewRuntime + Send + 'static,
        F: FnMut() -> Result<R>,
    {
        if workers == 0 {
            bail!("fetch pool needs at least one worker");
        }
        let (job_tx, job_rx) = mpsc::channel::<FetchJob>();
        let (done_tx, done_rx) = mpsc::channel();
        let job_rx = Arc::new(Mutex::new(job_rx));

        let mut handles = Vec::with_capacity(workers);
        for index in 0..workers {
            let mut runtime =
                factory().with_context(|| format!("start fetch worker {}", index + 1))?;
            let jobs = Arc::clone(&job_rx);
            let done: Sender<ViewCommand> = done_tx.clone();
            handles.push(thread::spawn(move || {
                loop {
                    let next = match jobs.lock() {
                        Ok(receiver) => receiver.recv(),
                        Err(_) => return,
                    };
                    let Ok(job) = next else {
                        return;
                    };
                    if done.send(runtime.run_job(job)).is_err() {
                        return;
                    }
                }
            }));
        }

        Ok(Self {
            jobs: Some(job_tx),
            completions: done_rx,
            workers: handles,
        })
    }

    pub fn submit(&self, job: FetchJob) -> Result<()> {
        let Some(jobs) = &self.jobs else {
            bail!("fetch pool is shut down");
        };
        jobs.send(job)
            .map_err(|_| anyhow!("fetch workers stopped; restart to continue"))
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<ViewCommand>> {
        match self.completions.recv_timeout(timeout) {
            Ok(command) => Ok(Some(command)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => bail!("fetch workers stopped unexpectedly"),
        }
    }
}

impl Drop for FetchPool {
    fn drop(&mut self) {
        self.jobs.take();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                warn!("fetch worker panicked");
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum OutputLine<'a> {
    #[serde(rename_all = "camelCase")]
    Count { total_records_in_view: usize },
    Row { index: usize, row: &'a Row },
    Placeholder { index: usize },
    #[serde(rename_all = "camelCase")]
    Matches {
        query: &'a str,
        count: usize,
        cells: Vec<MatchLine>,
    },
    #[serde(rename_all = "camelCase")]
    Navigate { step: usize, target: MatchLine },
    Status { message: &'a str },
    #[serde(rename_all = "camelCase")]
    Table {
        id: TableId,
        name: &'a str,
        field_count: usize,
        record_count: usize,
    },
    #[serde(rename_all = "camelCase")]
    View {
        id: ViewId,
        table_id: TableId,
        name: &'a str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchLine {
    pub global_index: usize,
    pub record_index: usize,
    pub cell_index: usize,
    pub record_id: RecordId,
    pub field_id: FieldId,
    pub scroll_offset: u64,
}

impl From<MatchTarget> for MatchLine {
    fn from(target: MatchTarget) -> Self {
        Self {
            global_index: target.global_index,
            record_index: target.cell.record_index,
            cell_index: target.cell.cell_index,
            record_id: target.cell.record_id,
            field_id: target.cell.field_id,
            scroll_offset: target.scroll_offset,
        }
    }
}

pub fn write_line<W: Write>(out: &mut W, line: &OutputLine<'_>) -> Result<()> {
    serde_json::to_writer(&mut *out, line).context("encode output line")?;
    writeln!(out).context("write output line")
}

/// Drives one [`ViewState`] against a [`FetchPool`], turning fetch events
/// into jobs and printing what the user would see.
pub struct ViewSession {
    state: ViewState,
    pool: FetchPool,
    row_height: u32,
    outstanding: usize,
    steps: usize,
}

impl ViewSession {
    pub fn new(config: WindowConfig, row_height: u32, pool: FetchPool) -> Self {
        Self {
            state: ViewState::new(config, row_height),
            pool,
            row_height,
            outstanding: 0,
            steps: 0,
        }
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    pub fn dispatch<W: Write>(&mut self, command: ViewCommand, out: &mut W) -> Result<()> {
        let events = self.state.dispatch(command);
        self.execute(events, out)
    }

    /// Run until no fetch is outstanding and no scroll is waiting out its
    /// debounce.
    pub fn settle<W: Write>(&mut self, out: &mut W) -> Result<()> {
        loop {
            let now = Instant::now();
            self.dispatch(ViewCommand::Tick(now), out)?;

            let deadline = self.state.window.debounce_deadline();
            if self.outstanding == 0 && deadline.is_none() {
                return Ok(());
            }

            let wait = deadline.map_or(IDLE_WAIT, |deadline| {
                deadline.saturating_duration_since(now)
            });
            if let Some(completion) = self.pool.recv_timeout(wait)? {
                self.outstanding = self.outstanding.saturating_sub(1);
                self.dispatch(completion, out)?;
            }
        }
    }

    pub fn write_rows<W: Write>(&self, range: VisibleRange, out: &mut W) -> Result<()> {
        for index in range.start..=range.end {
            match self.state.window.row(index) {
                Some(RowSlot::Loaded(row)) => {
                    write_line(out, &OutputLine::Row { index, row })?;
                }
                Some(RowSlot::Placeholder { index }) => {
                    write_line(out, &OutputLine::Placeholder { index })?;
                }
                None => break,
            }
        }
        Ok(())
    }

    fn execute<W: Write>(&mut self, events: Vec<ViewEvent>, out: &mut W) -> Result<()> {
        for event in events {
            match event {
                ViewEvent::FetchCount(request) => {
                    let query = self.query()?;
                    self.submit(FetchJob::Count { request, query })?;
                }
                ViewEvent::FetchPage(request) => {
                    let query = self.query()?;
                    self.submit(FetchJob::Page { request, query })?;
                }
                ViewEvent::RunSearch(request) => {
                    let query = self.query()?;
                    self.submit(FetchJob::Search { request, query })?;
                }
                ViewEvent::TotalChanged(total) => {
                    write_line(
                        out,
                        &OutputLine::Count {
                            total_records_in_view: total,
                        },
                    )?;
                }
                ViewEvent::PageReady(page_index) => {
                    debug!("page {page_index} ready");
                }
                ViewEvent::MatchesReady(count) => {
                    let cells = (0..count)
                        .filter_map(|index| {
                            let cell = *self.state.search.matches().get(index)?;
                            Some(MatchLine {
                                global_index: index,
                                record_index: cell.record_index,
                                cell_index: cell.cell_index,
                                record_id: cell.record_id,
                                field_id: cell.field_id,
                                scroll_offset: cell.record_index as u64
                                    * u64::from(self.row_height),
                            })
                        })
                        .collect();
                    write_line(
                        out,
                        &OutputLine::Matches {
                            query: self.state.search.query(),
                            count,
                            cells,
                        },
                    )?;
                }
                ViewEvent::ScrollTo(target) => {
                    write_line(
                        out,
                        &OutputLine::Navigate {
                            step: self.steps,
                            target: target.into(),
                        },
                    )?;
                    self.steps += 1;
                }
                ViewEvent::StatusUpdated(message) => {
                    write_line(out, &OutputLine::Status { message: &message })?;
                }
                ViewEvent::StatusCleared => {}
            }
        }
        Ok(())
    }

    fn query(&self) -> Result<ViewQuery> {
        self.state
            .query
            .clone()
            .ok_or_else(|| anyhow!("no view loaded; load a view before fetching"))
    }

    fn submit(&mut self, job: FetchJob) -> Result<()> {
        self.pool.submit(job)?;
        self.outstanding += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{DbRuntime, FetchPool, ViewRuntime, ViewSession};
    use anyhow::{Result, bail};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};
    use tabula_app::{
        FieldType, FilterInput, FilterOperator, JoinType, RecordId, Row, RowCell, ViewCommand,
        ViewQuery, VisibleRange, WindowConfig,
    };
    use tabula_db::{NewRecord, Store};
    use tabula_testkit::temp_db_path;

    struct Synthetic {
        total: usize,
        fetches: Arc<AtomicUsize>,
        fail_pages: bool,
    }

    impl ViewRuntime for Synthetic {
        fn count(&mut self, _query: &ViewQuery) -> Result<usize> {
            Ok(self.total)
        }

        fn fetch_page(&mut self, query: &ViewQuery, skip: usize, take: usize) -> Result<Vec<Row>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if self.fail_pages {
                bail!("database is locked");
            }
            let end = (skip + take).min(self.total);
            Ok((skip..end)
                .map(|index| Row {
                    id: RecordId::new(index as i64 + 1),
                    row_num: index as i64 + 1,
                    cells: query
                        .columns()
                        .iter()
                        .map(|field| RowCell {
                            field_id: field.id,
                            value: format!("r{index}"),
                        })
                        .collect(),
                })
                .collect())
        }

        fn search(&mut self, query: &ViewQuery, text: &str) -> Result<Vec<Row>> {
            let mut rows = self.fetch_page(query, 0, self.total)?;
            for row in &mut rows {
                row.cells.retain(|cell| cell.value.ends_with(text));
            }
            Ok(rows)
        }
    }

    fn window() -> WindowConfig {
        WindowConfig {
            page_size: 10,
            prefetch_pages: 0,
            debounce: Duration::from_millis(5),
        }
    }

    fn name_only_query() -> Result<ViewQuery> {
        let store = Store::open_memory()?;
        store.bootstrap()?;
        let table = store.create_table("People")?;
        store.create_field(table, "Name", FieldType::Text)?;
        let view = store.create_view(table, "Grid view")?;
        store.view_query(view)
    }

    fn synthetic_session(total: usize, fail_pages: bool) -> Result<(ViewSession, Arc<AtomicUsize>)> {
        let fetches = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fetches);
        let pool = FetchPool::spawn(2, move || {
            Ok(Synthetic {
                total,
                fetches: Arc::clone(&counter),
                fail_pages,
            })
        })?;
        Ok((ViewSession::new(window(), 20, pool), fetches))
    }

    fn scroll(session: &mut ViewSession, range: VisibleRange, out: &mut Vec<u8>) -> Result<()> {
        session.dispatch(
            ViewCommand::Scroll {
                range,
                at: Instant::now(),
            },
            out,
        )
    }

    fn lines(out: &[u8]) -> Vec<serde_json::Value> {
        String::from_utf8_lossy(out)
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }

    fn of_kind<'a>(lines: &'a [serde_json::Value], kind: &str) -> Vec<&'a serde_json::Value> {
        lines.iter().filter(|line| line["kind"] == kind).collect()
    }

    #[test]
    fn zero_workers_is_rejected() {
        let result = FetchPool::spawn(0, || {
            Ok(Synthetic {
                total: 0,
                fetches: Arc::new(AtomicUsize::new(0)),
                fail_pages: false,
            })
        });
        assert!(result.is_err());
    }

    #[test]
    fn failing_factory_names_the_worker() {
        let result = FetchPool::spawn(1, || -> Result<Synthetic> { bail!("no database") });
        let Err(error) = result else {
            panic!("factory failure should surface");
        };
        assert!(format!("{error:#}").contains("start fetch worker 1"));
    }

    #[test]
    fn session_loads_count_and_visible_rows() -> Result<()> {
        let (mut session, fetches) = synthetic_session(35, false)?;
        let mut out = Vec::new();
        session.dispatch(ViewCommand::Load(name_only_query()?), &mut out)?;
        let range = VisibleRange::new(12, 21);
        scroll(&mut session, range, &mut out)?;
        session.settle(&mut out)?;
        session.write_rows(range, &mut out)?;

        let lines = lines(&out);
        let counts = of_kind(&lines, "count");
        assert_eq!(counts.len(), 1);
        assert_eq!(counts[0]["totalRecordsInView"], 35);
        let rows = of_kind(&lines, "row");
        assert_eq!(rows.len(), 10);
        assert_eq!(rows[0]["index"], 12);
        assert_eq!(rows[0]["row"]["cells"][0]["value"], "r12");
        assert_eq!(rows[9]["row"]["rowNum"], 22);
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
        assert!(session.state().window.is_idle());
        Ok(())
    }

    #[test]
    fn rows_past_the_end_are_not_printed() -> Result<()> {
        let (mut session, _fetches) = synthetic_session(4, false)?;
        let mut out = Vec::new();
        session.dispatch(ViewCommand::Load(name_only_query()?), &mut out)?;
        let range = VisibleRange::new(0, 9);
        scroll(&mut session, range, &mut out)?;
        session.settle(&mut out)?;
        session.write_rows(range, &mut out)?;

        let lines = lines(&out);
        assert_eq!(of_kind(&lines, "row").len(), 4);
        assert!(of_kind(&lines, "placeholder").is_empty());
        Ok(())
    }

    #[test]
    fn failed_pages_report_status_and_leave_placeholders() -> Result<()> {
        let (mut session, _fetches) = synthetic_session(5, true)?;
        let mut out = Vec::new();
        session.dispatch(ViewCommand::Load(name_only_query()?), &mut out)?;
        let range = VisibleRange::new(0, 4);
        scroll(&mut session, range, &mut out)?;
        session.settle(&mut out)?;
        session.write_rows(range, &mut out)?;

        let lines = lines(&out);
        let statuses = of_kind(&lines, "status");
        assert_eq!(statuses.len(), 1);
        assert_eq!(
            statuses[0]["message"],
            "rows 1-10 failed to load: database is locked; scroll to retry"
        );
        assert_eq!(of_kind(&lines, "placeholder").len(), 5);
        Ok(())
    }

    #[test]
    fn search_prints_matches_and_navigation() -> Result<()> {
        let (mut session, _fetches) = synthetic_session(25, false)?;
        let mut out = Vec::new();
        session.dispatch(ViewCommand::Load(name_only_query()?), &mut out)?;
        session.settle(&mut out)?;
        session.dispatch(ViewCommand::Search("3".to_owned()), &mut out)?;
        session.settle(&mut out)?;
        session.dispatch(ViewCommand::NextMatch, &mut out)?;
        session.settle(&mut out)?;

        let lines = lines(&out);
        let matches = of_kind(&lines, "matches");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0]["query"], "3");
        assert_eq!(matches[0]["count"], 3);
        assert_eq!(matches[0]["cells"][1]["recordIndex"], 13);
        assert_eq!(matches[0]["cells"][1]["scrollOffset"], 13 * 20);

        let steps = of_kind(&lines, "navigate")
            .into_iter()
            .map(|line| line["target"]["recordIndex"].clone())
            .collect::<Vec<_>>();
        assert_eq!(steps, vec![3, 13]);
        Ok(())
    }

    #[test]
    fn session_reads_a_filtered_view_from_disk() -> Result<()> {
        let (_dir, path) = temp_db_path()?;
        let store = Store::open(&path)?;
        store.bootstrap()?;
        let table = store.create_table("People")?;
        let name = store.create_field(table, "Name", FieldType::Text)?;
        let view = store.create_view(table, "Grid view")?;
        for value in ["Alice", "Bob", "Malia", "Alina"] {
            store.add_new_record(table, &NewRecord::default().with_value(name, value))?;
        }
        let filter = FilterInput {
            field_id: name,
            operator: FilterOperator::Contains,
            join_type: JoinType::And,
            compare_val: "ali".to_owned(),
        };
        store.update_filters(view, &[filter])?;
        let query = store.view_query(view)?;

        let pool = FetchPool::spawn(2, || {
            let store = Store::open(&path)?;
            Ok(DbRuntime::new(store))
        })?;
        let mut session = ViewSession::new(window(), 20, pool);
        let mut out = Vec::new();
        session.dispatch(ViewCommand::Load(query), &mut out)?;
        let range = VisibleRange::new(0, 9);
        scroll(&mut session, range, &mut out)?;
        session.settle(&mut out)?;
        session.write_rows(range, &mut out)?;

        let lines = lines(&out);
        assert_eq!(of_kind(&lines, "count")[0]["totalRecordsInView"], 3);
        let values = of_kind(&lines, "row")
            .into_iter()
            .map(|line| line["row"]["cells"][0]["value"].clone())
            .collect::<Vec<_>>();
        assert_eq!(values, vec!["Alice", "Malia", "Alina"]);
        Ok(())
    }
}
