// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! CLI tool for running SQL against a catalog directory

use clap::{ArgAction, Parser};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::PathBuf;
use table_engine::{Engine, Response};
use tracing_subscriber::{
    filter::{EnvFilter, LevelFilter},
    prelude::*,
    registry::Registry,
};

macro_rules! die {
    ($fmt:literal, $($arg:tt)*) => {{
        eprintln!($fmt, $($arg)*);
        std::process::exit(1);
    }};

    ($msg:literal) => {{
        eprintln!($msg);
        std::process::exit(1);
    }};
}

#[allow(unused_imports)]
use tracing::{debug, error, info, trace, warn};

fn init_tracing(quiet: bool, verbose: u8) {
    let level_filter = if quiet {
        LevelFilter::ERROR
    } else {
        match verbose {
            0 => LevelFilter::WARN,
            1 => LevelFilter::INFO,
            2 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    };

    // Bridge log crate macros to tracing (the library logs through log::*)
    tracing_log::LogTracer::init().expect("Failed to set log tracer");

    let registry = Registry::default();

    let env_filter = EnvFilter::builder()
        .with_default_directive(level_filter.into())
        .with_env_var("TSQL_LOG")
        .from_env_lossy()
        .add_directive(
            "rustyline=warn"
                .parse()
                .expect("Failed to parse rustyline directive"),
        );

    let subscriber = registry.with(env_filter).with(
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .compact(),
    );

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        die!("INTERNAL ERROR: setting default tracing::subscriber failed");
    }

    let prev_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        tracing_panic::panic_hook(info);
        prev_hook(info); // daisy-chain to old panic hook
    }));
}

/// CLI tool for running SQL against a catalog directory
#[derive(Parser, Debug)]
#[command(name = "tsql")]
#[command(about = "CLI tool for running SQL against a table-engine catalog")]
struct ToolArgs {
    /// Suppress all output except for errors. This overrides the -v flag.
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Turn on verbose output. Supply -v multiple times to increase verbosity.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to the catalog directory (will be created if it doesn't exist)
    catalog_path: PathBuf,

    /// Execute a single statement and exit (if omitted, starts interactive shell)
    #[arg(short = 'e', long)]
    execute: Option<String>,
}

fn print_response(response: &Response) {
    match serde_json::to_string_pretty(response) {
        Ok(json) => println!("{json}"),
        Err(e) => die!("INTERNAL ERROR: response not serializable: {}", e),
    }
}

fn repl(engine: &Engine) {
    let mut editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(e) => die!("could not start shell: {}", e),
    };

    println!("table-engine shell; end with 'exit'");

    loop {
        match editor.readline("tsql> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
                    break;
                }
                let _ = editor.add_history_entry(line);
                print_response(&engine.execute(line));
            }
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => die!("input error: {}", e),
        }
    }
}

fn main() {
    let args = ToolArgs::parse();
    init_tracing(args.quiet, args.verbose);

    let engine = match Engine::open(&args.catalog_path) {
        Ok(engine) => engine,
        Err(e) => die!("could not open catalog at {:?}: {}", args.catalog_path, e),
    };

    info!("opened catalog at {:?}", args.catalog_path);

    match args.execute {
        Some(sql) => {
            let response = engine.execute(&sql);
            let failed = response.status != 200;
            print_response(&response);
            if failed {
                std::process::exit(1);
            }
        }
        None => repl(&engine),
    }
}
