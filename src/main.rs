use clap::{Parser, Subcommand};
use ssbf::container::{Container, DecodeOptions};
use ssbf::crypto::SecretKey;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ssbf", about = "Inspect and decode SSBF secure containers")]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Describe every structure in a container
    Explain {
        input: PathBuf,
        /// Key file (first 32 bytes are used); opens the encrypted header
        #[arg(short, long)]
        key: Option<PathBuf>,
        /// Emit the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Decode the data stream of a container
    Decode {
        input: PathBuf,
        #[arg(short, long)]
        key: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Skip block payload and stream checksum checks
        #[arg(long)]
        no_verify: bool,
        /// Transform blocks on the Rayon pool (needs the `parallel` feature)
        #[arg(long)]
        parallel: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {

        // ── Explain ──────────────────────────────────────────────────────────
        Commands::Explain { input, key, json } => {
            let data   = std::fs::read(&input)?;
            let key    = key.map(SecretKey::from_file).transpose()?;
            let report = ssbf::explain(&data, key.as_ref())?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("── {} ──", input.display());
                print!("{report}");
            }
        }

        // ── Decode ───────────────────────────────────────────────────────────
        Commands::Decode { input, key, output, no_verify, parallel } => {
            let data = std::fs::read(&input)?;
            let key  = SecretKey::from_file(&key)?;
            let opts = DecodeOptions {
                verify_block_checksums: !no_verify,
                verify_stream_checksum: !no_verify,
                parallel,
            };
            let container = Container::parse(&data, Some(&key))?;
            let plaintext = container.decode_payload_with(&opts)?;
            std::fs::write(&output, &plaintext)?;
            println!("Decoded {} B → {}", plaintext.len(), output.display());
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "ssbf=debug",
        _ => "ssbf=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
