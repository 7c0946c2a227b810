//! Command-line dispatcher for GeoGPT tools.
//!
//! Loads configuration, installs logging, builds a registry from every
//! `#[register_function]` linked into the binary and lets the user list,
//! inspect and invoke the registered tools.
//!
//! # Available Commands
//!
//! - `list` - List registered tools, optionally filtered by tag
//! - `describe` - Print a tool's metadata as JSON
//! - `call` - Invoke a tool with JSON arguments
//! - `drivers` - List the vector format drivers, or look one up by name

use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use geogpt::FunctionRegistry;
use geogpt::config::{GeoGptConfig, LOG_LEVEL_VAR};
use geogpt::conversion::{DRIVERS, Driver, find_driver};
use serde_json::Value;
use tabled::{Table, Tabled};
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "geogpt", version, about = "Discover and run GeoGPT tools")]
struct Cli {
    /// Configuration file; defaults are used when it does not exist.
    #[arg(short, long, global = true, value_name = "FILE", default_value = "geogpt.toml")]
    config: PathBuf,

    /// Enable verbose (INFO level) logging output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug (DEBUG level) logging output.
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists registered tools.
    List {
        /// Only show tools carrying this tag.
        #[arg(short, long)]
        tag: Option<String>,

        /// Print descriptors as JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Prints one tool's metadata as JSON.
    Describe {
        /// Registered tool name.
        name: String,
    },

    /// Invokes a tool and prints its JSON result.
    ///
    /// Tools that accept `working_dir` receive the configured working
    /// directory unless the arguments name one; `csv_to_gpkg` likewise gets
    /// its column names and CRS from the `[conversion]` section.
    Call {
        /// Registered tool name.
        name: String,

        /// Tool arguments as a JSON object.
        #[arg(short, long, value_name = "JSON", default_value = "{}")]
        args: String,
    },

    /// Lists the vector format drivers used by the conversion tools.
    Drivers {
        /// Only show the driver with this short name, e.g. `gpkg`.
        #[arg(short, long)]
        name: Option<String>,
    },
}

#[derive(Tabled)]
struct ToolRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Tags")]
    tags: String,
    #[tabled(rename = "Description")]
    description: String,
}

#[derive(Tabled)]
struct DriverRow {
    #[tabled(rename = "Short Name")]
    short_name: String,
    #[tabled(rename = "Long Name")]
    long_name: String,
    #[tabled(rename = "Extensions")]
    extensions: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = GeoGptConfig::load_from(&cli.config)?;
    // Keep stdout clean for command output unless asked otherwise.
    if cli.debug {
        config.logging.level = "debug".to_string();
    } else if cli.verbose {
        config.logging.level = "info".to_string();
    } else if std::env::var_os(LOG_LEVEL_VAR).is_none() {
        config.logging.level = "warn".to_string();
    }
    let _logging = geogpt::telemetry::initialize(&config.logging)?;
    debug!(config = %cli.config.display(), "configuration loaded");

    let registry = geogpt::registry();
    info!(tools = registry.len(), "registry ready");

    match cli.command {
        Commands::List { tag, json } => handle_list(&registry, tag.as_deref(), json)?,
        Commands::Describe { name } => handle_describe(&registry, &name)?,
        Commands::Call { name, args } => handle_call(&registry, &config, &name, &args).await?,
        Commands::Drivers { name } => handle_drivers(name.as_deref())?,
    }
    Ok(())
}

fn handle_list(registry: &FunctionRegistry, tag: Option<&str>, json: bool) -> Result<()> {
    let functions = match tag {
        Some(tag) => registry.get_functions_by_tag(tag),
        None => registry.get_all_functions().into_values().collect(),
    };

    if json {
        let descriptors: Vec<_> = functions.iter().map(|f| f.descriptor()).collect();
        println!("{}", serde_json::to_string_pretty(&descriptors)?);
        return Ok(());
    }

    println!("\nRegistered Tools ({} total):\n", functions.len());
    let rows: Vec<ToolRow> = functions
        .iter()
        .map(|f| ToolRow {
            name: f.name().to_string(),
            tags: f.tags().iter().cloned().collect::<Vec<_>>().join(", "),
            description: f.description().to_string(),
        })
        .collect();
    println!("{}", Table::new(rows));
    Ok(())
}

fn handle_describe(registry: &FunctionRegistry, name: &str) -> Result<()> {
    let metadata = registry
        .get_function(name)
        .ok_or_else(|| anyhow!("Tool '{name}' is not registered. Run `geogpt list` to see available tools."))?;
    println!("{}", serde_json::to_string_pretty(&metadata.descriptor())?);
    Ok(())
}

async fn handle_call(
    registry: &FunctionRegistry,
    config: &GeoGptConfig,
    name: &str,
    args: &str,
) -> Result<()> {
    let metadata = registry
        .get_function(name)
        .ok_or_else(|| anyhow!("Tool '{name}' is not registered. Run `geogpt list` to see available tools."))?;

    let mut input: Value =
        serde_json::from_str(args).with_context(|| format!("--args is not valid JSON: {args}"))?;
    let Value::Object(arguments) = &mut input else {
        return Err(anyhow!("--args must be a JSON object"));
    };
    for (key, value) in configured_arguments(config) {
        let declared = metadata.inputs().iter().any(|input| input == key);
        if declared && !arguments.contains_key(key) {
            debug!(tool = name, argument = key, "filled from configuration");
            arguments.insert(key.to_string(), Value::String(value));
        }
    }

    info!(tool = name, "invoking tool");
    let output = metadata
        .invoke(input)
        .await
        .with_context(|| format!("Tool '{name}' failed"))?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Tool arguments the configuration can supply when `--args` leaves them out.
fn configured_arguments(config: &GeoGptConfig) -> Vec<(&'static str, String)> {
    let conversion = &config.conversion;
    let mut defaults = vec![
        ("working_dir", config.working_dir.display().to_string()),
        ("x_col", conversion.x_column.clone()),
        ("y_col", conversion.y_column.clone()),
        ("crs", conversion.default_crs.clone()),
    ];
    if let Some(z_column) = &conversion.z_column {
        defaults.push(("z_col", z_column.clone()));
    }
    defaults
}

fn handle_drivers(name: Option<&str>) -> Result<()> {
    let drivers: Vec<&Driver> = match name {
        Some(name) => vec![find_driver(name).ok_or_else(|| {
            anyhow!("Driver '{name}' not found. Run `geogpt drivers` to see available drivers.")
        })?],
        None => DRIVERS.iter().collect(),
    };
    println!("\nAvailable Drivers ({} total):\n", drivers.len());
    let rows: Vec<DriverRow> = drivers
        .iter()
        .map(|d| DriverRow {
            short_name: d.short_name.to_string(),
            long_name: d.long_name.to_string(),
            extensions: d
                .extensions
                .iter()
                .map(|ext| format!(".{ext}"))
                .collect::<Vec<_>>()
                .join(", "),
        })
        .collect();
    println!("{}", Table::new(rows));
    Ok(())
}
