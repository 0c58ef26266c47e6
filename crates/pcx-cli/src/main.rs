mod commands;
mod connect;
mod render;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use pcx_core::Config;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::connect::Target;

#[derive(Parser)]
#[command(name = "pcx")]
#[command(about = "Reconstruct structures in a remote process", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, global = true, default_value = "pcx.toml")]
    config: PathBuf,

    /// Address to listen on for the memory agent
    #[arg(short, long, global = true)]
    listen: Option<String>,

    /// Attach to this process id
    #[arg(long, global = true, conflicts_with = "name")]
    pid: Option<u32>,

    /// Attach to the first process with this executable name
    #[arg(short, long, global = true)]
    name: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Keep a region refreshed and redraw it until Ctrl+C
    Watch {
        /// Address expression (e.g. "game.exe+0x1A0")
        address: String,

        /// Number of pointer-sized fields
        #[arg(short, long)]
        fields: Option<usize>,

        /// Field type overrides as INDEX:KIND (e.g. 2:Float)
        #[arg(short = 't', long = "type", value_name = "INDEX:KIND")]
        types: Vec<String>,

        /// Redraw interval in milliseconds
        #[arg(long, default_value_t = 250)]
        refresh_ms: u64,
    },

    /// Read a region once and print its decoded fields
    Dump {
        /// Address expression
        address: String,

        /// Number of pointer-sized fields
        #[arg(short, long)]
        fields: Option<usize>,

        /// Field type overrides as INDEX:KIND
        #[arg(short = 't', long = "type", value_name = "INDEX:KIND")]
        types: Vec<String>,

        /// Print as JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show raw bytes
    Hexdump {
        /// Address expression
        address: String,

        /// Number of bytes
        #[arg(short, long, default_value_t = 256)]
        size: usize,

        /// Include an ASCII column
        #[arg(short, long)]
        ascii: bool,
    },

    /// Search a module for a byte pattern
    Scan {
        /// Module name (e.g. game.exe)
        module: String,

        /// IDA signature ("48 8B ?? ??") or byte pattern ("\x48\x8B\x?")
        pattern: String,

        /// Treat the pattern as literal text
        #[arg(long)]
        text: bool,

        /// Let the agent scan (first match only)
        #[arg(long)]
        remote: bool,
    },

    /// List loaded modules
    Modules {
        /// Include section tables
        #[arg(short, long)]
        sections: bool,

        /// Include exported symbols
        #[arg(short, long)]
        exports: bool,
    },

    /// Print a C++ class declaration for a region
    Export {
        /// Address expression
        address: String,

        /// Class name
        #[arg(long, default_value = "Class_0")]
        class: String,

        /// Number of pointer-sized fields
        #[arg(short, long)]
        fields: Option<usize>,

        /// Field type overrides as INDEX:KIND
        #[arg(short = 't', long = "type", value_name = "INDEX:KIND")]
        types: Vec<String>,

        /// Field names as INDEX:NAME
        #[arg(long = "field-name", value_name = "INDEX:NAME")]
        names: Vec<String>,
    },
}

fn load_config(cli: &Cli) -> Config {
    let base = match Config::load(&cli.config) {
        Ok(config) => {
            info!("Loaded config from {:?}", cli.config);
            config
        }
        Err(e) if e.is_not_found() => {
            info!("No config at {:?}, using defaults", cli.config);
            Config::default()
        }
        Err(e) => {
            warn!("Failed to load config: {}, using defaults", e);
            Config::default()
        }
    };

    let mut builder = Config::builder().base(base);
    if let Some(listen) = &cli.listen {
        builder = builder.listen(listen.clone());
    }
    builder.build()
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("pcx=info".parse()?))
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli);
    let target = Target::from_args(cli.pid, cli.name.clone());

    match cli.command {
        Commands::Watch {
            address,
            fields,
            types,
            refresh_ms,
        } => commands::watch::run(config, &target, &address, fields, &types, refresh_ms),
        Commands::Dump {
            address,
            fields,
            types,
            json,
        } => commands::dump::run(config, &target, &address, fields, &types, json),
        Commands::Hexdump {
            address,
            size,
            ascii,
        } => commands::hexdump::run(config, &target, &address, size, ascii),
        Commands::Scan {
            module,
            pattern,
            text,
            remote,
        } => commands::scan::run(config, &target, &module, &pattern, text, remote),
        Commands::Modules { sections, exports } => {
            commands::modules::run(config, &target, sections, exports)
        }
        Commands::Export {
            address,
            class,
            fields,
            types,
            names,
        } => commands::export::run(config, &target, &address, &class, fields, &types, &names),
    }
}
