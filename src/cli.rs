use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use dialoguer::{Confirm, Select};

#[cfg(feature = "server")]
use upnflow::serve::{ServeArgs, run_serve};
use upnflow::{
    Database, DatabaseConfig, DEFAULT_FLOW_NAME, FlowStore, FlowSummary, FlowTemplate, NewFlow,
    SqliteFlowStore, delete_flow, duplicate_flow, template_flow_data,
};

#[derive(Debug, Parser)]
#[command(
    name = "upnflow",
    about = "Manage hierarchical process flows and serve the flow editor API."
)]
pub struct Cli {
    /// Path to the flow database (defaults to UPNFLOW_DB_PATH or the user data directory).
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Start the HTTP API.
    #[cfg(feature = "server")]
    Serve(ServeArgs),

    /// List flows, most recently updated first.
    List {
        /// Include drill-down flows, not just roots.
        #[arg(long)]
        all: bool,
    },

    /// Print one flow record as JSON.
    Show { id: String },

    /// Create a root flow.
    New {
        name: Option<String>,

        /// Starting graph. Asked for interactively when omitted.
        #[arg(long, value_enum)]
        template: Option<FlowTemplate>,
    },

    /// Copy a flow and every drill-down below it.
    Duplicate {
        id: String,

        /// Name for the copy.
        #[arg(long)]
        name: String,
    },

    /// Delete a flow and every drill-down below it.
    Delete {
        id: String,

        /// Skip the confirmation prompt.
        #[arg(long, short = 'y')]
        yes: bool,
    },
}

pub async fn dispatch() -> Result<()> {
    let cli = Cli::parse();
    let config = match cli.db {
        Some(path) => DatabaseConfig::at(path),
        None => DatabaseConfig::default(),
    };

    match cli.command {
        #[cfg(feature = "server")]
        Commands::Serve(args) => run_serve(args, config).await,
        Commands::List { all } => run_list(config, all).await,
        Commands::Show { id } => run_show(config, &id).await,
        Commands::New { name, template } => run_new(config, name, template).await,
        Commands::Duplicate { id, name } => run_duplicate(config, &id, &name).await,
        Commands::Delete { id, yes } => run_delete(config, &id, yes).await,
    }
}

async fn open_store(config: DatabaseConfig) -> Result<SqliteFlowStore> {
    let db = Database::new(config).await?;
    Ok(SqliteFlowStore::new(db))
}

async fn run_list(config: DatabaseConfig, all: bool) -> Result<()> {
    let store = open_store(config).await?;
    let flows = if all {
        store.list_all().await?
    } else {
        store.list_roots().await?
    };

    if flows.is_empty() {
        println!("No flows yet. Create one with 'upnflow new'.");
        return Ok(());
    }
    for flow in &flows {
        print_summary(flow);
    }
    Ok(())
}

fn print_summary(flow: &FlowSummary) {
    println!(
        "{}  {}  (updated {})",
        flow.id,
        flow.name,
        flow.updated_at.format("%Y-%m-%d %H:%M")
    );
}

async fn run_show(config: DatabaseConfig, id: &str) -> Result<()> {
    let store = open_store(config).await?;
    let record = store.fetch(id).await?;
    let json = serde_json::to_string_pretty(&record).context("failed to encode flow")?;
    println!("{json}");
    Ok(())
}

fn select_template() -> Result<FlowTemplate> {
    let variants = FlowTemplate::value_variants();

    let options: Vec<String> = variants
        .iter()
        .map(|variant| format!("{} flow", variant.label()))
        .collect();

    let selection = Select::new()
        .with_prompt("Select a starting template")
        .items(&options)
        .default(0)
        .interact()
        .context("template selection was cancelled")?;

    Ok(variants[selection])
}

async fn run_new(
    config: DatabaseConfig,
    name: Option<String>,
    template: Option<FlowTemplate>,
) -> Result<()> {
    let template = match template {
        Some(template) => template,
        None => select_template()?,
    };
    let name = name.unwrap_or_else(|| DEFAULT_FLOW_NAME.to_string());

    let store = open_store(config).await?;
    let record = store
        .create(NewFlow {
            flow_data: template_flow_data(template),
            ..NewFlow::named(name)
        })
        .await?;

    println!("Created flow '{}' ({})", record.name, record.id);
    Ok(())
}

async fn run_duplicate(config: DatabaseConfig, id: &str, name: &str) -> Result<()> {
    let store = open_store(config).await?;
    let record = duplicate_flow(&store, id, name).await?;
    println!("Duplicated '{}' into '{}' ({})", id, record.name, record.id);
    Ok(())
}

async fn run_delete(config: DatabaseConfig, id: &str, yes: bool) -> Result<()> {
    let store = open_store(config).await?;
    let record = store.fetch(id).await?;

    if !yes {
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Delete '{}' and all of its drill-down flows?",
                record.name
            ))
            .default(false)
            .interact()
            .context("confirmation was cancelled")?;
        if !confirmed {
            bail!("deletion aborted");
        }
    }

    let deleted = delete_flow(&store, id).await?;
    println!("Deleted {} flow(s)", deleted.len());
    Ok(())
}
