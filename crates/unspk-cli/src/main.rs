//! unspk: recover the tar stream from ADBEEF encrypted archives
//!
//! Commands:
//!   recover <archive>   - find the master key and write the decrypted tar
//!   list <archive>      - decrypt in memory and list the tar entries
//!   inspect <archive>   - show container structure (no keys needed)
//!   config show         - display current configuration

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use zeroize::Zeroize;

use unspk_archive::{Container, EntrySummary, MasterKey, ProgressFn, Recovered, RecoveryOptions};
use unspk_core::config::{expand_tilde, UnspkConfig};
use unspk_core::keys::{load_key_file, parse_key_list};
use unspk_core::output::{default_output_path, write_atomic};

/// Environment variable holding extra candidate keys (same syntax as a key file)
const KEYS_ENV: &str = "UNSPK_KEYS";

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "unspk",
    version,
    about = "Decrypt ADBEEF encrypted archives back into tar streams",
    long_about = "unspk: try candidate master keys against an encrypted archive and rebuild the original tar"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(long, short = 'c', env = "UNSPK_CONFIG", default_value = "~/.config/unspk/config.toml")]
    config: PathBuf,

    /// Log level or filter directive (overrides config)
    #[arg(long, env = "UNSPK_LOG")]
    log: Option<String>,

    /// Log format (overrides config)
    #[arg(long, env = "UNSPK_LOG_FORMAT", value_enum)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Decrypt an archive and write the recovered tar file
    Recover {
        /// Encrypted archive
        archive: PathBuf,
        /// Output path (default: archive path + configured suffix)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
        #[command(flatten)]
        keys: KeyArgs,
        #[command(flatten)]
        search: SearchArgs,
        /// Replace an existing output file
        #[arg(long)]
        force: bool,
    },

    /// Decrypt an archive in memory and list its entries
    List {
        /// Encrypted archive
        archive: PathBuf,
        #[command(flatten)]
        keys: KeyArgs,
        #[command(flatten)]
        search: SearchArgs,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show the container layout without decrypting anything
    Inspect {
        /// Encrypted archive
        archive: PathBuf,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

/// Where candidate master keys come from.
///
/// Order: `--key` flags, then `UNSPK_KEYS`, then the key file. The first
/// candidate that decrypts the archive wins.
#[derive(Args, Debug)]
struct KeyArgs {
    /// Candidate master key as 64 hex characters (repeatable)
    #[arg(long = "key", short = 'k', value_name = "HEX")]
    keys: Vec<String>,

    /// File with one hex master key per line (overrides keys.key_file)
    #[arg(long)]
    key_file: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct SearchArgs {
    /// Try candidate keys concurrently
    #[arg(long)]
    parallel: bool,

    /// Worker threads for --parallel (0 = one per CPU)
    #[arg(long)]
    threads: Option<usize>,

    /// Fail if any file lacks a recorded hash
    #[arg(long)]
    require_hashes: bool,
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = expand_tilde(&cli.config);
    let config = UnspkConfig::load(&config_path).context("loading config")?;

    let level = cli.log.clone().unwrap_or_else(|| config.log.level.clone());
    let format = cli.log_format.clone().unwrap_or_else(|| {
        LogFormat::from_str(&config.log.format, true).unwrap_or(LogFormat::Text)
    });
    init_logging(&level, &format);

    match cli.command {
        Commands::Recover { archive, output, keys, search, force } => {
            cmd_recover(&config, &archive, output.as_deref(), keys, &search, force)
        }
        Commands::List { archive, keys, search, json } => {
            cmd_list(&config, &archive, keys, &search, json)
        }
        Commands::Inspect { archive, json } => cmd_inspect(&archive, json),
        Commands::Config { action: ConfigAction::Show } => cmd_config_show(&config, &config_path),
    }
}

// ── Logging ───────────────────────────────────────────────────────────────────

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // stdout carries command output (tables, JSON)
    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

// ── Candidate keys ────────────────────────────────────────────────────────────

fn collect_candidates(args: KeyArgs, config: &UnspkConfig) -> Result<Vec<MasterKey>> {
    let mut texts: Vec<SecretString> = args.keys.into_iter().map(SecretString::from).collect();

    if let Ok(mut env_keys) = std::env::var(KEYS_ENV) {
        texts.extend(parse_key_list(&env_keys));
        env_keys.zeroize();
    }

    if let Some(path) = args.key_file.or_else(|| config.keys.key_file.clone()) {
        let path = expand_tilde(&path);
        texts.extend(load_key_file(&path)?);
    }

    let mut candidates: Vec<MasterKey> = Vec::with_capacity(texts.len());
    for (position, text) in texts.iter().enumerate() {
        let key = MasterKey::from_hex(text.expose_secret())
            .with_context(|| format!("candidate key #{position} is not 64 hex characters"))?;
        if candidates.contains(&key) {
            tracing::debug!(position, "dropping duplicate candidate key");
            continue;
        }
        candidates.push(key);
    }

    if candidates.is_empty() {
        anyhow::bail!(
            "no candidate keys\n\
             Pass --key <HEX>, set {KEYS_ENV}, or point --key-file (or keys.key_file) at a key file."
        );
    }
    tracing::debug!(count = candidates.len(), "candidate keys ready");
    Ok(candidates)
}

// ── Progress helpers ──────────────────────────────────────────────────────────

fn make_spinner(prefix: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{prefix:.bold} {spinner} {msg}")
            .context("building spinner style")?,
    );
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    Ok(pb)
}

// ── Shared recovery ───────────────────────────────────────────────────────────

fn read_archive(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("reading archive: {}", path.display()))
}

fn run_recovery(
    config: &UnspkConfig,
    archive: &Path,
    raw: &[u8],
    keys: KeyArgs,
    search: &SearchArgs,
) -> Result<Recovered> {
    let container = Container::parse(raw)
        .with_context(|| format!("parsing archive: {}", archive.display()))?;
    let candidates = collect_candidates(keys, config)?;

    let options = RecoveryOptions {
        require_hashes: search.require_hashes || config.recovery.require_hashes,
        parallel: search.parallel || config.recovery.parallel,
        threads: search.threads.unwrap_or(config.recovery.threads),
    };

    let spinner = make_spinner("recover")?;
    let pb = spinner.clone();
    let progress: ProgressFn = Box::new(move |done, total, msg| {
        pb.set_message(format!("[{done}/{total}] {msg}"));
    });

    let result = unspk_archive::recover_with(&container, &candidates, &options, Some(&progress));
    spinner.finish_and_clear();

    result.with_context(|| format!("recovering {}", archive.display()))
}

// ── `unspk recover` ───────────────────────────────────────────────────────────

fn cmd_recover(
    config: &UnspkConfig,
    archive: &Path,
    output: Option<&Path>,
    keys: KeyArgs,
    search: &SearchArgs,
    force: bool,
) -> Result<()> {
    let dest = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_output_path(archive, &config.output.suffix));
    let overwrite = force || config.output.overwrite;
    if !overwrite && dest.exists() {
        anyhow::bail!("{} already exists (use --force to replace it)", dest.display());
    }

    let raw = read_archive(archive)?;
    let recovered = run_recovery(config, archive, &raw, keys, search)?;

    write_atomic(&dest, &recovered.tar, overwrite)
        .with_context(|| format!("writing {}", dest.display()))?;

    println!(
        "recovered {} with candidate #{} (fingerprint {})",
        archive.display(),
        recovered.key_index,
        recovered.key.fingerprint()
    );
    println!(
        "  {} entries, {} bytes → {}",
        recovered.entries.len(),
        recovered.tar.len(),
        dest.display()
    );
    Ok(())
}

// ── `unspk list` ──────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ListReport<'a> {
    key_index: usize,
    fingerprint: String,
    entries: &'a [EntrySummary],
}

fn cmd_list(
    config: &UnspkConfig,
    archive: &Path,
    keys: KeyArgs,
    search: &SearchArgs,
    json: bool,
) -> Result<()> {
    let raw = read_archive(archive)?;
    let recovered = run_recovery(config, archive, &raw, keys, search)?;

    if json {
        let report = ListReport {
            key_index: recovered.key_index,
            fingerprint: recovered.key.fingerprint(),
            entries: &recovered.entries,
        };
        println!("{}", serde_json::to_string_pretty(&report).context("serializing entries")?);
        return Ok(());
    }

    println!("{:>14}  {:>14}  name", "declared", "body bytes");
    for entry in &recovered.entries {
        let declared = entry
            .declared_size
            .map_or_else(|| "-".to_string(), |size| size.to_string());
        println!(
            "{:>14}  {:>14}  {}",
            declared,
            entry.body_len,
            entry.name.as_deref().unwrap_or("<unparsed header>")
        );
    }
    println!(
        "{} entries (candidate #{}, fingerprint {})",
        recovered.entries.len(),
        recovered.key_index,
        recovered.key.fingerprint()
    );
    Ok(())
}

// ── `unspk inspect` ───────────────────────────────────────────────────────────

#[derive(Serialize)]
struct InspectReport {
    version: u8,
    meta_len: usize,
    subkey_id: u64,
    file_count: usize,
    files: Vec<InspectFile>,
    signature: String,
    signature_verified: bool,
}

#[derive(Serialize)]
struct InspectFile {
    index: usize,
    length: u64,
    hash: Option<String>,
}

fn cmd_inspect(archive: &Path, json: bool) -> Result<()> {
    let raw = read_archive(archive)?;
    let container = Container::parse(&raw)
        .with_context(|| format!("parsing archive: {}", archive.display()))?;

    let report = InspectReport {
        version: container.version(),
        meta_len: container.meta_len(),
        subkey_id: unspk_archive::keys::subkey_id(&container.metadata().header_context),
        file_count: container.file_count(),
        files: container
            .files()
            .enumerate()
            .map(|(index, (descriptor, _))| InspectFile {
                index,
                length: descriptor.length,
                hash: descriptor.expected_hash.map(hex::encode),
            })
            .collect(),
        signature: hex::encode(container.signature()),
        signature_verified: false,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report).context("serializing report")?);
        return Ok(());
    }

    println!("archive:    {}", archive.display());
    println!("version:    {:#04x}", report.version);
    println!("metadata:   {} bytes", report.meta_len);
    println!("subkey id:  {:#018x}", report.subkey_id);
    println!("files:      {}", report.file_count);
    for file in &report.files {
        println!(
            "  [{:>3}] {:>14} bytes  hash {}",
            file.index,
            file.length,
            file.hash.as_deref().unwrap_or("(none)")
        );
    }
    println!("signature:  {} (NOT verified)", report.signature);
    Ok(())
}

// ── `unspk config show` ───────────────────────────────────────────────────────

fn cmd_config_show(config: &UnspkConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    print!("{}", config.to_toml().context("serializing config to TOML")?);
    Ok(())
}
