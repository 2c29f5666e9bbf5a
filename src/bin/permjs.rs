use std::path::PathBuf;
use std::process;

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::{error, info};

use permjs::cfg::ModuleDef;
use permjs::compile::{self, JjsOptions};
use permjs::js::writer::JsOutputStyle;
use permjs::link;

#[derive(Parser)]
#[command(
    name = "permjs",
    version,
    about = "Deferred-binding permutation compiler for JavaScript"
)]
struct Cli {
    /// Module definition file (TOML)
    #[arg(short, long, default_value = "module.toml")]
    module: PathBuf,

    /// Directory for intermediate files
    #[arg(short, long, default_value = "work")]
    work_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse and optimize the sources, enumerate the permutation space
    Precompile {
        /// Skip the static-evaluation optimizer
        #[arg(long)]
        no_optimize: bool,

        /// Emit human-readable JavaScript
        #[arg(long)]
        pretty: bool,
    },
    /// Compile permutations into per-index JavaScript files
    CompilePerms {
        /// Comma-separated permutation ids; all when omitted
        #[arg(long, value_delimiter = ',')]
        perms: Vec<usize>,
    },
    /// Assemble the deployable output directory
    Link {
        #[arg(short, long, default_value = "out")]
        out_dir: PathBuf,
    },
    /// Precompile, compile every permutation, and link
    Build {
        #[arg(long)]
        no_optimize: bool,

        #[arg(long)]
        pretty: bool,

        #[arg(short, long, default_value = "out")]
        out_dir: PathBuf,
    },
}

fn options(no_optimize: bool, pretty: bool) -> JjsOptions {
    JjsOptions {
        optimize: !no_optimize,
        output: if pretty {
            JsOutputStyle::Pretty
        } else {
            JsOutputStyle::Compact
        },
    }
}

fn run(cli: &Cli) -> Result<()> {
    let module = ModuleDef::load(&cli.module)?;
    match &cli.command {
        Command::Precompile {
            no_optimize,
            pretty,
        } => {
            compile::precompile(&module, options(*no_optimize, *pretty), &cli.work_dir)?;
        }
        Command::CompilePerms { perms } => {
            compile::compile_perms(&cli.work_dir, &module.name, perms)?;
        }
        Command::Link { out_dir } => {
            link::link(&module, &cli.work_dir, out_dir)?;
        }
        Command::Build {
            no_optimize,
            pretty,
            out_dir,
        } => {
            compile::precompile(&module, options(*no_optimize, *pretty), &cli.work_dir)?;
            compile::compile_perms(&cli.work_dir, &module.name, &[])?;
            link::link(&module, &cli.work_dir, out_dir)?;
        }
    }
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => info!("permjs: success"),
        Err(e) => {
            error!("permjs: failed: {:#}", e);
            process::exit(1);
        }
    }
}
