// Employee Directory Client
// Console front end over the directory and the live search

use anyhow::{Context, Result};
use client::{
    ClientConfig, DirectorySync, IncrementalSearch, NotificationLog, RemoteCollection,
    SearchPhase, WsCollection,
};
use protocol::Employee;
use std::io::{self, Write};
use std::sync::Arc;
use std::task::Poll;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so they do not interleave with the console
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let config = ClientConfig::from_env()?;

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                     Tour of Employees                        ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
    println!("Connecting to {}...", config.server_url);

    let remote: Arc<dyn RemoteCollection> = Arc::new(
        WsCollection::connect(&config.server_url, config.request_timeout)
            .await
            .context("Failed to connect to server")?,
    );
    println!("✓ Connected!");
    println!();

    let log = NotificationLog::new();
    let directory = DirectorySync::new(remote.clone(), log.clone());
    let mut search = IncrementalSearch::new(remote, log.clone(), config.debounce);

    // Render settled search results as they arrive
    let mut search_rx = search.subscribe();
    let render_task = tokio::spawn(async move {
        while search_rx.changed().await.is_ok() {
            let state = search_rx.borrow_and_update().clone();
            if let SearchPhase::Settled(_) = state.phase() {
                println!();
                println!("[search] \"{}\":", state.query());
                print_names(state.results());
                print!("> ");
                io::stdout().flush().ok();
            }
        }
    });

    if let Err(e) = directory.load_all().await {
        println!("[error] {}", e);
    }
    print_dashboard(&directory);
    print_help();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        io::stdout().flush().ok();

        let Some(input) = lines.next_line().await? else {
            break;
        };
        let trimmed = input.trim();
        if trimmed.is_empty() {
            continue;
        }

        let (cmd, args) = match trimmed.split_once(' ') {
            Some((cmd, args)) => (cmd.to_lowercase(), args),
            None => (trimmed.to_lowercase(), ""),
        };

        match cmd.as_str() {
            "help" | "h" | "?" => print_help(),

            "dashboard" | "top" => print_dashboard(&directory),

            "list" | "ls" => match directory.load_all().await {
                Ok(_) => print_list(&directory.snapshot()),
                Err(e) => println!("[error] {}", e),
            },

            "show" | "s" => match parse_id(args) {
                Ok(id) => match directory.select(id).await {
                    Ok(draft) => print_detail(&draft.original, &draft.name),
                    Err(e) => println!("[error] {}", e),
                },
                Err(e) => println!("[error] {}", e),
            },

            "name" | "n" => match directory.edit_name(args) {
                Ok(()) => {
                    if let Some(draft) = directory.selection() {
                        print_detail(&draft.original, &draft.name);
                    }
                }
                Err(e) => println!("[error] {}", e),
            },

            "save" => match directory.save().await {
                Ok(employee) => println!("[info] Saved {}", employee),
                Err(e) => println!("[error] {}", e),
            },

            "cancel" | "back" => {
                if directory.cancel().is_some() {
                    println!("[info] Changes discarded");
                }
                print_dashboard(&directory);
            }

            "add" | "a" => match directory.create(args).await {
                Ok(Some(employee)) => println!("[info] Added {}", employee),
                Ok(None) => {}
                Err(e) => println!("[error] {}", e),
            },

            "rm" | "x" => match parse_id(args) {
                Ok(id) => {
                    // The first poll removes the entry locally and sends the delete
                    let pending = directory.remove(id);
                    tokio::pin!(pending);
                    let result = match futures_util::poll!(&mut pending) {
                        Poll::Ready(result) => result,
                        Poll::Pending => {
                            print_list(&directory.snapshot());
                            pending.await
                        }
                    };
                    if let Err(e) = result {
                        println!("[error] {}", e);
                    }
                }
                Err(e) => println!("[error] {}", e),
            },

            // One query event per character, as typed into the search box
            "type" | "t" => {
                let mut query = search.snapshot().query().to_string();
                for ch in args.chars() {
                    query.push(ch);
                    search.on_query_changed(&query);
                }
            }

            "search" | "/" => search.on_query_changed(args),

            "clear" => {
                search.clear();
                println!("[info] Search cleared");
            }

            "results" | "r" => print_names(&search.results()),

            "log" | "messages" => {
                let limit = args.parse::<usize>().unwrap_or(20);
                for notification in log.recent(limit).await {
                    println!("  {}", notification);
                }
            }

            "clear-log" => {
                log.clear().await;
                println!("[info] Messages cleared");
            }

            "quit" | "exit" | "q" => {
                println!("[info] Goodbye!");
                break;
            }

            _ => {
                println!(
                    "[error] Unknown command '{}'. Type 'help' for available commands.",
                    cmd
                );
            }
        }
    }

    render_task.abort();
    Ok(())
}

fn parse_id(args: &str) -> Result<i64> {
    args.trim()
        .parse::<i64>()
        .with_context(|| format!("Invalid employee id '{}'", args.trim()))
}

fn print_help() {
    println!("┌─────────────────────────────────────────────────────────────┐");
    println!("│                      Available Commands                     │");
    println!("├─────────────────────────────────────────────────────────────┤");
    println!("│  dashboard                  - Show top employees            │");
    println!("│  list                       - Reload and show all employees │");
    println!("│  add <name>                 - Add an employee               │");
    println!("│  rm <id>                    - Delete an employee            │");
    println!("├─────────────────────────────────────────────────────────────┤");
    println!("│  show <id>                  - Open employee details         │");
    println!("│  name <text>                - Edit the name in details      │");
    println!("│  save                       - Save the edited name          │");
    println!("│  cancel                     - Discard edits and go back     │");
    println!("├─────────────────────────────────────────────────────────────┤");
    println!("│  type <text>                - Type into the search box      │");
    println!("│  search <text>              - Replace the search query      │");
    println!("│  clear                      - Clear the search box          │");
    println!("│  results                    - Show current search results   │");
    println!("├─────────────────────────────────────────────────────────────┤");
    println!("│  log [n]                    - Show recent messages          │");
    println!("│  clear-log                  - Clear messages                │");
    println!("│  help                       - Show this help                │");
    println!("│  quit                       - Exit client                   │");
    println!("└─────────────────────────────────────────────────────────────┘");
    println!();
    println!("Shortcuts: s=show, n=name, a=add, x=rm, t=type, /=search, r=results, q=quit");
    println!();
}

fn print_dashboard(directory: &DirectorySync) {
    println!("─────────────────── Top Employees ───────────────────");
    for employee in directory.dashboard() {
        println!("  {}", employee.name);
    }
    println!("─────────────────────────────────────────────────────");
}

fn print_list(employees: &[Employee]) {
    println!("───────────────────── Employees ─────────────────────");
    for employee in employees {
        println!("  {:>4}  {}", employee.id, employee.name);
    }
    println!("─────────────────────────────────────────────────────");
}

fn print_detail(original: &Employee, name: &str) {
    println!("─────────────────────────────────────────");
    println!("{} Details", name.to_uppercase());
    println!("id: {}", original.id);
    println!("name: {}", name);
    println!("─────────────────────────────────────────");
}

fn print_names(employees: &[Employee]) {
    if employees.is_empty() {
        println!("  (no matches)");
    }
    for employee in employees {
        println!("  {}", employee.name);
    }
}
