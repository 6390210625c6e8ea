//! export-archive: key provisioning and offline verification of export archives

use clap::{Args, Parser, Subcommand};
use export_archive::{ArchiveValidator, Limits};
use export_cert::{SigningKey, VerifyingKey};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Parser)]
#[command(name = "export-archive", version, about = "Export archive tooling")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate an Ed25519 signing key (writes PATH and PATH.pub)
    Keygen {
        path: PathBuf,
        /// Overwrite existing files
        #[arg(long)]
        force: bool,
    },
    /// Print the public key PEM of a signing key
    PublicKey { path: PathBuf },
    /// Verify a guild data archive and print its document
    VerifyData(VerifyArgs),
    /// Verify a transcript archive, optionally extracting the transcripts
    VerifyTranscripts {
        #[command(flatten)]
        args: VerifyArgs,
        /// Directory to write verified transcripts into
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
}

#[derive(Args)]
struct VerifyArgs {
    /// Public key PEM of the exporting worker
    #[arg(long, env = "EXPORT_PUBLIC_KEY")]
    key: PathBuf,
    /// Archive to verify
    archive: PathBuf,
    /// Maximum total uncompressed bytes
    #[arg(long, default_value_t = Limits::default().max_total_size)]
    max_total: u64,
    /// Maximum uncompressed bytes per entry
    #[arg(long, default_value_t = Limits::default().max_entry_size)]
    max_entry: u64,
}

impl VerifyArgs {
    fn validator(&self) -> Result<ArchiveValidator, BoxError> {
        let key = VerifyingKey::from_file(&self.key)?;
        let limits = Limits {
            max_total_size: self.max_total,
            max_entry_size: self.max_entry,
        };
        Ok(ArchiveValidator::new(key, limits))
    }

    fn open(&self) -> Result<BufReader<File>, BoxError> {
        Ok(BufReader::new(File::open(&self.archive)?))
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "export_archive=warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command) -> Result<(), BoxError> {
    match command {
        Command::Keygen { path, force } => keygen(&path, force),
        Command::PublicKey { path } => {
            let key = SigningKey::from_file(&path)?;
            print!("{}", key.verifying_key().to_pem());
            Ok(())
        }
        Command::VerifyData(args) => {
            let data = args.validator()?.validate_guild_data(args.open()?)?;
            println!("{}", serde_json::to_string_pretty(&data)?);
            Ok(())
        }
        Command::VerifyTranscripts { args, out_dir } => {
            let result = args.validator()?.validate_transcripts(args.open()?)?;
            println!(
                "guild {}: {} transcripts verified, {} failed",
                result.guild_id,
                result.transcripts.len(),
                result.failed.len()
            );
            if !result.failed.is_empty() {
                let ids: Vec<String> = result.failed.iter().map(i32::to_string).collect();
                println!("failed tickets: {}", ids.join(", "));
            }
            if let Some(dir) = out_dir {
                std::fs::create_dir_all(&dir)?;
                for (ticket_id, content) in &result.transcripts {
                    std::fs::write(dir.join(format!("{ticket_id}.json")), content)?;
                }
            }
            Ok(())
        }
    }
}

fn keygen(path: &Path, force: bool) -> Result<(), BoxError> {
    let mut pub_path = path.as_os_str().to_owned();
    pub_path.push(".pub");
    let pub_path = PathBuf::from(pub_path);

    if !force && (path.exists() || pub_path.exists()) {
        return Err(format!("{} already exists (use --force)", path.display()).into());
    }

    let pem = SigningKey::generate_pem()?;
    let key = SigningKey::from_pem(&pem)?;
    std::fs::write(path, pem.as_bytes())?;
    std::fs::write(&pub_path, key.verifying_key().to_pem())?;

    println!("private key: {}", path.display());
    println!("public key:  {}", pub_path.display());
    Ok(())
}
