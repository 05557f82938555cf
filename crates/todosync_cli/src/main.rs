//! todosync CLI
//!
//! Command-line client for a todosync task file, plus the reference
//! server.
//!
//! # Commands
//!
//! - `add` - Create a task
//! - `list` - Show live tasks
//! - `edit` - Change fields of a task
//! - `delete` - Delete a task
//! - `sync` - Synchronize the task file with a server
//! - `serve` - Run the reference server

mod commands;

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use todosync_protocol::ConflictPolicy;
use tracing_subscriber::EnvFilter;

/// Offline-first todo list with server sync.
#[derive(Parser)]
#[command(name = "todosync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the task file
    #[arg(global = true, short, long, default_value = "todosync.json")]
    file: PathBuf,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a task
    Add {
        /// Task title
        title: String,

        /// Deadline (YYYY-MM-DD)
        #[arg(short, long)]
        deadline: String,

        /// Priority
        #[arg(short, long, default_value = "1")]
        priority: i32,

        /// Status
        #[arg(short, long, default_value = "open")]
        status: String,

        /// Free-form description
        #[arg(long, default_value = "")]
        description: String,
    },

    /// Show live tasks
    List {
        /// Output format (text, json)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Change fields of a task
    Edit {
        /// Task identifier
        id: i64,

        /// New title
        #[arg(long)]
        title: Option<String>,

        /// New deadline (YYYY-MM-DD)
        #[arg(long)]
        deadline: Option<String>,

        /// New priority
        #[arg(long)]
        priority: Option<i32>,

        /// New status
        #[arg(long)]
        status: Option<String>,

        /// New description
        #[arg(long)]
        description: Option<String>,
    },

    /// Delete a task
    Delete {
        /// Task identifier
        id: i64,
    },

    /// Synchronize the task file with a server
    Sync {
        /// Server address
        #[arg(long, default_value = "127.0.0.1:50001")]
        server: SocketAddr,

        /// Client identifier
        #[arg(long)]
        client_id: i32,

        /// Answer every conflict with this side (local, remote) instead of asking
        #[arg(long)]
        prefer: Option<ConflictPolicy>,
    },

    /// Run the reference server until interrupted
    Serve {
        /// Address to bind to
        #[arg(long, default_value = "0.0.0.0:50001")]
        bind: SocketAddr,

        /// Never acknowledge registrations
        #[arg(long)]
        decline: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Add {
            title,
            deadline,
            priority,
            status,
            description,
        } => {
            let task = commands::tasks::add(
                &cli.file,
                commands::tasks::NewTask {
                    title,
                    deadline,
                    priority,
                    status,
                    description,
                },
            )?;
            println!("Added task {}", task.id);
        }
        Commands::List { format } => {
            let output = commands::tasks::list(&cli.file, &format)?;
            print!("{output}");
        }
        Commands::Edit {
            id,
            title,
            deadline,
            priority,
            status,
            description,
        } => {
            let task = commands::tasks::edit(
                &cli.file,
                id,
                commands::tasks::TaskChanges {
                    title,
                    deadline,
                    priority,
                    status,
                    description,
                },
            )?;
            println!("Updated task {} (revision {})", task.id, task.revision);
        }
        Commands::Delete { id } => {
            commands::tasks::delete(&cli.file, id)?;
            println!("Deleted task {id}");
        }
        Commands::Sync {
            server,
            client_id,
            prefer,
        } => {
            let report = commands::sync::run(&cli.file, server, client_id, prefer).await?;
            println!("{}", commands::sync::summary(&report));
        }
        Commands::Serve { bind, decline } => {
            commands::serve::run(bind, decline).await?;
        }
    }

    Ok(())
}
