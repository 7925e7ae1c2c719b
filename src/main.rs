//! `michelson` command line: run contracts and convert, pack or hash values.

use clap::{Parser, Subcommand, ValueEnum};
use michelson::micheline::{script_expr_hash, Micheline};
use michelson::runtime::{ChainEnv, Config, Context, Mode, Script, Type, Value};
use michelson::text::read;
use serde_json::json;
use std::error::Error;
use std::fs;
use std::path::PathBuf;
use std::process;
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

/// Syntax of an expression given on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Syntax {
    Text,
    Json,
}

/// Michelson interpreter and codec.
#[derive(Parser)]
#[command(name = "michelson", version, about = "Michelson interpreter and codec")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a contract once and print the new storage, operations and big-map diff
    Run {
        /// Path to the contract source (`parameter ...; storage ...; code ...`)
        script: PathBuf,
        /// Parameter value, in Michelson syntax
        #[arg(long)]
        parameter: String,
        /// Storage value, in Michelson syntax
        #[arg(long)]
        storage: String,
        /// Entrypoint to call
        #[arg(long)]
        entrypoint: Option<String>,
        /// Amount sent with the call, in mutez
        #[arg(long, default_value_t = 0)]
        amount: u64,
        /// Balance of the contract, in mutez
        #[arg(long, default_value_t = 0)]
        balance: u64,
        /// JSON file with gas limit, cost schedule and trace flag
        #[arg(long)]
        config: Option<PathBuf>,
        /// Print the per-instruction trace
        #[arg(long)]
        trace: bool,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Pack a typed value and print the bytes as hex
    Pack {
        /// Type of the value, in Michelson syntax
        #[arg(long = "type")]
        ty: String,
        /// The value, in Michelson syntax
        value: String,
    },

    /// Unpack hex bytes as a value of the given type
    Unpack {
        #[arg(long = "type")]
        ty: String,
        /// Packed bytes as hex, with or without a 0x prefix
        bytes: String,
    },

    /// Convert an expression between Michelson syntax and Micheline JSON
    Convert {
        /// The expression to convert
        expression: String,
        #[arg(long, default_value = "text", value_enum)]
        from: Syntax,
        #[arg(long, default_value = "json", value_enum)]
        to: Syntax,
    },

    /// Print the script expression hash of a typed value (big-map key hash)
    Hash {
        #[arg(long = "type")]
        ty: String,
        value: String,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn typed_value(ty: &str, value: &str) -> Result<(Type, Value), Box<dyn Error>> {
    let ty = Type::from_micheline(&read(ty)?)?;
    let value = Value::from_micheline(&read(value)?, &ty)?;
    Ok((ty, value))
}

#[allow(clippy::too_many_arguments)]
fn run(
    script: PathBuf,
    parameter: &str,
    storage: &str,
    entrypoint: Option<&str>,
    amount: u64,
    balance: u64,
    config: Option<PathBuf>,
    trace: bool,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    let source = fs::read_to_string(&script)?;
    let script = Script::from_text(&source)?;
    let mut config = match config {
        Some(path) => Config::from_json(&fs::read_to_string(path)?)?,
        None => Config::default(),
    };
    config.trace |= trace;
    debug!(?config, "running contract");

    let env = ChainEnv {
        amount,
        balance,
        ..ChainEnv::default()
    };
    let mut ctx = Context::new(config).with_env(env);
    let result = script.run(entrypoint, &read(parameter)?, &read(storage)?, &mut ctx)?;

    if as_json {
        let output = json!({
            "storage": result.storage.to_micheline(Mode::Readable),
            "operations": result.operations.iter().map(|op| op.to_json()).collect::<Vec<_>>(),
            "big_map_diff": result.big_map_diff,
            "consumed_gas": result.consumed_gas,
            "trace": result.trace,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    for line in &result.trace {
        println!("{line}");
    }
    println!("storage: {}", result.storage);
    for op in &result.operations {
        println!("operation: {}", op.to_micheline(Mode::Readable));
    }
    for diff in &result.big_map_diff {
        println!("big_map_diff: {}", serde_json::to_string(diff)?);
    }
    println!("consumed gas: {}", result.consumed_gas);
    Ok(())
}

fn execute(command: Commands) -> Result<(), Box<dyn Error>> {
    match command {
        Commands::Run {
            script,
            parameter,
            storage,
            entrypoint,
            amount,
            balance,
            config,
            trace,
            json,
        } => run(
            script,
            &parameter,
            &storage,
            entrypoint.as_deref(),
            amount,
            balance,
            config,
            trace,
            json,
        ),

        Commands::Pack { ty, value } => {
            let (_, value) = typed_value(&ty, &value)?;
            println!("0x{}", hex::encode(value.pack()?));
            Ok(())
        }

        Commands::Unpack { ty, bytes } => {
            let ty = Type::from_micheline(&read(&ty)?)?;
            let bytes = hex::decode(bytes.trim_start_matches("0x"))?;
            println!("{}", Value::unpack(&bytes, &ty)?);
            Ok(())
        }

        Commands::Convert { expression, from, to } => {
            let node = match from {
                Syntax::Text => read(&expression)?,
                Syntax::Json => Micheline::from_json(&expression)?,
            };
            match to {
                Syntax::Text => println!("{node:#}"),
                Syntax::Json => println!("{}", node.to_json()),
            }
            Ok(())
        }

        Commands::Hash { ty, value } => {
            let (_, value) = typed_value(&ty, &value)?;
            println!("{}", script_expr_hash(&value.to_micheline(Mode::Optimized))?);
            Ok(())
        }
    }
}

fn main() {
    init_logging();
    let cli = Cli::parse();
    if let Err(e) = execute(cli.command) {
        eprintln!("error: {e}");
        process::exit(1);
    }
}
