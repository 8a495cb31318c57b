//! dexvm command-line tool
//!
//! Runs the `main` method of a class in a DEX module on the green-thread
//! VM, or prints the structure of a module.

mod commands;
mod config;

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "dexvm")]
#[command(about = "Dalvik bytecode interpreter", long_about = None)]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// VM configuration file (defaults to ./dexvm.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the main method of a class
    Run {
        /// DEX module
        file: PathBuf,
        /// Class holding `main(String[])`, e.g. `com.example.Main`
        main_class: String,
        /// Arguments passed to the program
        #[arg(trailing_var_arg = true)]
        args: Vec<String>,
        /// Instructions per scheduler turn for each priority level
        #[arg(long)]
        instructions_per_priority: Option<usize>,
        /// Frames per thread before StackOverflowError
        #[arg(long)]
        max_stack_depth: Option<usize>,
        /// Keep idling instead of failing when every thread is blocked
        #[arg(long)]
        no_deadlock_detection: bool,
    },

    /// Print the header, tables and classes of a module
    Inspect {
        /// DEX module
        file: PathBuf,
        /// Print the parsed module as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Run {
            file,
            main_class,
            args,
            instructions_per_priority,
            max_stack_depth,
            no_deadlock_detection,
        } => config::load(cli.config.as_deref()).and_then(|config| {
            let mut options = config.vm;
            if let Some(value) = instructions_per_priority {
                options.instructions_per_priority = value;
            }
            if let Some(value) = max_stack_depth {
                options.max_stack_depth = value;
            }
            if no_deadlock_detection {
                options.detect_deadlock = false;
            }
            commands::run::execute(&commands::run::RunArgs {
                file,
                main_class,
                args,
                options,
            })
        }),
        Commands::Inspect { file, json } => commands::inspect::execute(&file, json, &mut std::io::stdout()),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
