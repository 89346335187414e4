// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

mod config;
mod demo;
mod runtime;

use anyhow::{Context, Result, anyhow};
use config::Config;
use runtime::{DbRuntime, FetchPool, OutputLine, ViewSession, write_line};
use std::env;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Instant;
use tabula_app::{ViewCommand, ViewId, VisibleRange};
use tabula_db::Store;

const FETCH_WORKERS: usize = 2;
const DEFAULT_TAKE: usize = 20;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    if let Err(error) = run() {
        eprintln!("{error:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = parse_cli_args(env::args().skip(1), Config::default_path()?)?;
    if options.show_help {
        print_help();
        return Ok(());
    }

    if options.print_config_path {
        println!("{}", options.config_path.display());
        return Ok(());
    }

    if options.print_example {
        print!("{}", Config::example_config(&options.config_path));
        return Ok(());
    }

    let config = Config::load(&options.config_path).with_context(|| {
        format!(
            "load config {}; run `tabula --print-example-config` to generate a v1 template",
            options.config_path.display()
        )
    })?;
    let window = config.window_config()?;

    // Fetch workers open their own connections, so the demo needs a real file.
    let demo_dir = if options.demo {
        Some(tempfile::tempdir().context("create demo database dir")?)
    } else {
        None
    };
    let db_path = match &demo_dir {
        Some(dir) => dir.path().join("tabula-demo.db"),
        None => config.db_path()?,
    };
    if options.print_db_path {
        println!("{}", db_path.display());
        return Ok(());
    }

    let store = Store::open(&db_path).with_context(|| {
        format!(
            "open database {} -- if this path is wrong, set [storage].db_path or TABULA_DB_PATH",
            db_path.display()
        )
    })?;
    store.bootstrap()?;
    if options.demo {
        demo::seed_demo(&store, demo::DEMO_PEOPLE)?;
    }

    if options.check_only {
        if let Some(view_id) = options.view {
            store.view_query(view_id)?;
        }
        return Ok(());
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let Some(view_id) = options.view else {
        return list_views(&store, &mut out);
    };

    let query = store.view_query(view_id)?;
    let pool = FetchPool::spawn(FETCH_WORKERS, || {
        let store = Store::open(&db_path)?;
        Ok(DbRuntime::new(store))
    })?;
    let mut session = ViewSession::new(window, config.row_height(), pool);

    session.dispatch(ViewCommand::Load(query), &mut out)?;
    let range = VisibleRange::new(options.skip, options.skip.saturating_add(options.take - 1));
    session.dispatch(
        ViewCommand::Scroll {
            range,
            at: Instant::now(),
        },
        &mut out,
    )?;
    session.settle(&mut out)?;
    session.write_rows(range, &mut out)?;

    if let Some(text) = options.search {
        session.dispatch(ViewCommand::Search(text), &mut out)?;
        session.settle(&mut out)?;
        // The first match is already on screen; step through the rest and
        // wrap back to it.
        for _ in 0..session.state().search.match_count() {
            session.dispatch(ViewCommand::NextMatch, &mut out)?;
            session.settle(&mut out)?;
        }
    }

    out.flush().context("flush output")
}

fn list_views<W: Write>(store: &Store, out: &mut W) -> Result<()> {
    for table in store.list_tables()? {
        write_line(
            out,
            &OutputLine::Table {
                id: table.id,
                name: &table.name,
                field_count: table.field_count,
                record_count: table.record_count,
            },
        )?;
        for view in store.list_views(table.id)? {
            write_line(
                out,
                &OutputLine::View {
                    id: view.id,
                    table_id: view.table_id,
                    name: &view.name,
                },
            )?;
        }
    }
    out.flush().context("flush output")
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CliOptions {
    config_path: PathBuf,
    print_config_path: bool,
    print_db_path: bool,
    demo: bool,
    print_example: bool,
    check_only: bool,
    show_help: bool,
    view: Option<ViewId>,
    skip: usize,
    take: usize,
    search: Option<String>,
}

fn parse_cli_args<I, S>(args: I, default_config_path: PathBuf) -> Result<CliOptions>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut options = CliOptions {
        config_path: default_config_path,
        print_config_path: false,
        print_db_path: false,
        demo: false,
        print_example: false,
        check_only: false,
        show_help: false,
        view: None,
        skip: 0,
        take: DEFAULT_TAKE,
        search: None,
    };

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_ref() {
            "--config" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("--config requires a file path"))?;
                options.config_path = PathBuf::from(value.as_ref());
            }
            "--print-config-path" => {
                options.print_config_path = true;
            }
            "--print-path" => {
                options.print_db_path = true;
            }
            "--print-example-config" => {
                options.print_example = true;
            }
            "--demo" => {
                options.demo = true;
            }
            "--check" => {
                options.check_only = true;
            }
            "--view" => {
                let id = number_arg(&mut iter, "--view", "a view id")?;
                options.view = Some(ViewId::new(id));
            }
            "--skip" => {
                options.skip = number_arg(&mut iter, "--skip", "a row offset")?;
            }
            "--take" => {
                let take: usize = number_arg(&mut iter, "--take", "a row count")?;
                if take == 0 {
                    return Err(anyhow!("--take must be at least 1"));
                }
                options.take = take;
            }
            "--search" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("--search requires the text to find"))?;
                options.search = Some(value.as_ref().to_owned());
            }
            "--help" | "-h" => {
                options.show_help = true;
            }
            unknown => {
                return Err(anyhow!(
                    "unknown argument {unknown:?}; run with --help to see supported options"
                ));
            }
        }
    }

    Ok(options)
}

fn number_arg<I, S, N>(iter: &mut I, flag: &str, what: &str) -> Result<N>
where
    I: Iterator<Item = S>,
    S: AsRef<str>,
    N: std::str::FromStr,
{
    let value = iter
        .next()
        .ok_or_else(|| anyhow!("{flag} requires {what}"))?;
    let raw = value.as_ref();
    raw.parse()
        .map_err(|_| anyhow!("{flag} expects {what}, got {raw:?}"))
}

fn print_help() {
    println!("tabula");
    println!("  --config <path>          Use a specific config path");
    println!("  --print-config-path      Print resolved config path");
    println!("  --print-path             Print resolved database path");
    println!("  --print-example-config   Print a v1 config template");
    println!("  --demo                   Run against seeded demo data (temporary)");
    println!("  --check                  Validate config + DB (+ --view if given)");
    println!("  --view <id>              Print a window of rows from a view");
    println!("  --skip <n>               First row of the window (default 0)");
    println!("  --take <n>               Rows in the window (default {DEFAULT_TAKE})");
    println!("  --search <text>          Find text in the view and step through matches");
    println!("  --help                   Show this help");
}
