mod commands;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use kodos_core::concurrency::install_signal_handler;
use kodos_core::RebuildOptions;
use kodos_exec::{DirectSink, ExecutionContext, FileSink, ShellRunner, StagingSink};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "kodos",
    version,
    about = "Declarative, generation-based system installer and rebuilder"
)]
struct Cli {
    /// Path to the system configuration.
    #[arg(short, long, default_value = "/kod/kodos.toml", global = true)]
    config: PathBuf,

    /// Log every command and write files into a staging tree instead of
    /// touching the system.
    #[arg(long, default_value_t = false, global = true)]
    dry_run: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Install the configured system onto prepared partitions as generation 0.
    Install,
    /// Build a new generation from the configuration and make it the default.
    Rebuild {
        /// Switch into the new generation without rebooting when the kernel
        /// is unchanged.
        #[arg(short, long, default_value_t = false)]
        switch: bool,
        /// Upgrade carried-over packages to their latest versions while
        /// building.
        #[arg(short, long, default_value_t = false)]
        upgrade: bool,
        /// Reboot once the new generation is committed.
        #[arg(short, long, default_value_t = false)]
        reboot: bool,
    },
    /// Inspect or prune generations.
    Generations {
        #[command(subcommand)]
        action: GenerationsAction,
    },
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

#[derive(Debug, Subcommand)]
enum GenerationsAction {
    /// List generations on disk with their recorded kernels.
    List,
    /// Delete a generation's boot entry, subvolume, and record.
    Remove {
        /// Generation id to remove.
        id: u32,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("KODOS_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .init();

    if let Err(e) = install_signal_handler() {
        tracing::warn!("could not install signal handler: {e}");
    }

    let ctx = ExecutionContext::new(cli.dry_run, false, cli.verbose || cli.trace);
    let runner = ShellRunner::new(ctx);
    let direct;
    let staging;
    let sink: &dyn FileSink = if cli.dry_run {
        staging = StagingSink::new(std::env::temp_dir().join("kodos-dry-run"));
        &staging
    } else {
        direct = DirectSink::new();
        &direct
    };

    let result = match cli.command {
        Commands::Install => commands::install::run(&cli.config, &runner, sink),
        Commands::Rebuild {
            switch,
            upgrade,
            reboot,
        } => commands::rebuild::run(
            &cli.config,
            &runner,
            sink,
            &RebuildOptions {
                upgrade,
                live_switch: switch,
                reboot,
            },
        ),
        Commands::Generations { action } => match action {
            GenerationsAction::List => commands::generations::list(&cli.config),
            GenerationsAction::Remove { id } => {
                commands::generations::remove(&cli.config, &runner, id)
            }
        },
        Commands::Completions { shell } => return commands::completions::run::<Cli>(shell),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(commands::exit_code_for(&err))
        }
    }
}
