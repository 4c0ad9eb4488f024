//! todocache demo - a line-driven front end for the optimistic todo
//! client.
//!
//! The loop plays the role of the presentation layer: it renders cache
//! contents, submits mutations, and polls settlement results. Commands
//! print the cache state as it is at that moment, so the placeholder row
//! of an unsettled create and the rollback after a failure are both
//! visible.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use todocache::client::{ClientEvent, TodoClient};
use todocache::config::Config;
use todocache::models::Todo;
use todocache::store::TodoStore;

// ============================================================================
// Constants
// ============================================================================

/// Timeout for polling input (in milliseconds) so background results
/// keep flowing while the prompt is idle
const EVENT_POLL_TIMEOUT_MS: u64 = 100;

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

fn starter_todos() -> Vec<Todo> {
    let seeds = [
        ("1", "Learn Rust", true),
        ("2", "Learn tokio", false),
        ("3", "Build a todo app", false),
    ];
    seeds
        .iter()
        .map(|(id, title, completed)| Todo {
            id: id.to_string(),
            title: title.to_string(),
            completed: *completed,
        })
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();
    info!("todocache demo starting");

    let mut config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            warn!(error = %e, "Failed to load config, using defaults");
            Config::default()
        }
    };

    if let Ok(rate) = std::env::var("TODOCACHE_FAIL_RATE") {
        match rate.parse() {
            Ok(rate) => config.fail_rate = rate,
            Err(e) => warn!(rate = %rate, error = %e, "Ignoring invalid TODOCACHE_FAIL_RATE"),
        }
    }

    let store = Arc::new(
        TodoStore::with_todos(starter_todos())
            .with_latency(
                Duration::from_millis(config.read_latency_ms),
                Duration::from_millis(config.write_latency_ms),
            )
            .with_fail_rate(config.fail_rate),
    );
    let mut client = TodoClient::with_page_size(store, config.page_size);

    // Initial load before handing the prompt over.
    client.list();
    client.settle().await;
    print_list(&mut client);
    print_help();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        // Report completed background work first
        for event in client.poll() {
            report_event(&mut client, event);
        }

        // Wait for input with a timeout to allow background updates
        tokio::select! {
            line = lines.next_line() => {
                match line? {
                    Some(line) => {
                        if !handle_command(&mut client, line.trim()) {
                            break;
                        }
                    }
                    None => break,
                }
            }
            _ = tokio::time::sleep(Duration::from_millis(EVENT_POLL_TIMEOUT_MS)) => {}
        }
    }

    info!("todocache demo shutting down");
    Ok(())
}

/// Handle one input line. Returns false to quit.
fn handle_command(client: &mut TodoClient, line: &str) -> bool {
    let (command, rest) = match line.split_once(' ') {
        Some((command, rest)) => (command, rest.trim()),
        None => (line, ""),
    };

    match command {
        "" => {}
        "quit" | "q" | "exit" => return false,
        "help" => print_help(),
        "list" | "ls" => print_list_filtered(client, rest),
        "more" => {
            client.fetch_next_page();
            println!("loading more...");
        }
        "refresh" => {
            client.refetch_list();
            println!("refreshing...");
        }
        "add" => {
            if rest.is_empty() {
                println!("usage: add <title>");
            } else {
                client.set_draft_title(rest);
                match client.submit_create(rest) {
                    Ok(_) => print_list(client),
                    Err(e) => println!("{}", e),
                }
            }
        }
        "toggle" => {
            if rest.is_empty() {
                println!("usage: toggle <id>");
            } else {
                client.submit_toggle(rest);
                print_list(client);
            }
        }
        "rm" | "delete" => {
            if rest.is_empty() {
                println!("usage: rm <id>");
            } else {
                client.submit_delete(rest);
                print_list(client);
            }
        }
        "edit" => match rest.split_once(' ') {
            Some((id, title)) if !title.trim().is_empty() => {
                match client.todo(id).map(|cached| cached.data.clone()) {
                    Some(mut todo) => {
                        todo.title = title.trim().to_string();
                        match client.submit_update(todo) {
                            Ok(_) => print_list(client),
                            Err(e) => println!("{}", e),
                        }
                    }
                    None => println!("todo {} is not loaded yet; try 'show {}' first", id, id),
                }
            }
            _ => println!("usage: edit <id> <title>"),
        },
        "show" => {
            if rest.is_empty() {
                println!("usage: show <id>");
            } else {
                client.open_detail(rest);
                print_detail(client, rest);
            }
        }
        "status" => print_status(client),
        _ => println!("unknown command: {} (try 'help')", command),
    }

    true
}

fn report_event(client: &mut TodoClient, event: ClientEvent) {
    match event {
        ClientEvent::MutationSucceeded(op) => println!("({} confirmed)", op),
        ClientEvent::MutationFailed(op) => println!("{}", op.failure_message()),
        ClientEvent::ListRefreshed | ClientEvent::PageLoaded => print_list(client),
        ClientEvent::ListRefreshFailed => {
            if let Some(error) = client.list_status().error {
                println!("Error: {}", error);
            }
        }
        ClientEvent::TodoRefreshed(id) => {
            if client.detail() == Some(id.as_str()) {
                print_detail(client, &id);
            }
        }
        ClientEvent::TodoRefreshFailed(id) => println!("Error loading todo {}", id),
    }
}

fn print_list(client: &mut TodoClient) {
    match client.list() {
        Some(cached) => {
            let pages = &cached.data;
            println!("{} tasks total (showing {})", pages.total_count(), pages.len());
            for todo in pages.flatten() {
                let mark = if todo.completed { "x" } else { " " };
                println!("  [{}] {}  {}", mark, todo.id, todo.title);
            }
            if pages.next_page().is_some() {
                println!("  ('more' to load the next page)");
            }
        }
        None => println!("loading todos..."),
    }
}

fn print_list_filtered(client: &mut TodoClient, filter: &str) {
    match filter {
        "" => print_list(client),
        "done" | "open" => match client.list() {
            Some(cached) => {
                let todos = if filter == "done" {
                    cached.data.completed()
                } else {
                    cached.data.incomplete()
                };
                println!("{} {} tasks", todos.len(), filter);
                for todo in todos {
                    println!("  {}  {}", todo.id, todo.title);
                }
            }
            None => println!("loading todos..."),
        },
        _ => println!("usage: list [done|open]"),
    }
}

fn print_detail(client: &mut TodoClient, id: &str) {
    match client.todo(id) {
        Some(cached) => {
            let mark = if cached.data.completed { "x" } else { " " };
            println!(
                "  [{}] {}  {} (fetched {})",
                mark,
                cached.data.id,
                cached.data.title,
                cached.age_display()
            );
        }
        None => println!("loading todo {}...", id),
    }
}

fn print_status(client: &mut TodoClient) {
    let status = client.list_status();
    let age = client
        .cached_list()
        .map(|cached| cached.age_display())
        .unwrap_or_else(|| "never".to_string());
    println!(
        "list fetched {}{}",
        age,
        if status.fetching { ", refresh in flight" } else { "" }
    );
    if let Some(error) = status.error {
        println!("last error: {}", error);
    }
    if client.any_mutation_pending() {
        println!("mutations in flight");
    }
}

fn print_help() {
    println!("commands:");
    println!("  list [done|open]   show cached todos");
    println!("  more               load the next page");
    println!("  refresh            force a refetch");
    println!("  add <title>        create a todo");
    println!("  toggle <id>        flip completion");
    println!("  edit <id> <title>  rename a todo");
    println!("  rm <id>            delete a todo");
    println!("  show <id>          open the detail view");
    println!("  status             cache and mutation status");
    println!("  quit               exit");
}
