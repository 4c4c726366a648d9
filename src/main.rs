use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use ed25519_dalek::SigningKey;
use rand::{rngs::OsRng, RngCore};
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use mailbox::{Identity, LedgerStore};

#[derive(Parser)]
#[command(name = "mailbox")]
#[command(about = "Append-only mailbox: deposit letters, read them back with their senders", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Ledger file
    #[arg(long, global = true, env = "MAILBOX_LEDGER", default_value = "mailbox.json")]
    ledger: PathBuf,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Args)]
struct KeyArgs {
    /// 32-byte ed25519 secret key in hex (64 hex chars)
    #[arg(long, env = "MAILBOX_PRIVATE_KEY", hide_env_values = true)]
    sk_hex: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a keypair and print its identity
    Keygen {
        #[arg(long)]
        out_dir: PathBuf,
    },
    /// Print the identity of the configured key
    Whoami {
        #[command(flatten)]
        key: KeyArgs,
    },
    /// Deposit a letter
    Write {
        content: String,
        /// Deposit as this identity; overrides the configured key
        #[arg(long)]
        from: Option<Identity>,
        #[command(flatten)]
        key: KeyArgs,
    },
    /// List every letter in deposit order
    Read {
        #[arg(long)]
        json: bool,
    },
    /// Print the number of letters
    Total,
    /// Check ledger integrity and print its root
    Verify,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let store = LedgerStore::new(&cli.ledger);
    match cli.command {
        Commands::Keygen { out_dir } => keygen_cmd(&out_dir),
        Commands::Whoami { key } => {
            println!("{}", key.identity()?);
            Ok(())
        }
        Commands::Write { content, from, key } => {
            let sender = key.sender(from)?;
            let total = store
                .deposit(sender, content)
                .with_context(|| format!("deposit into {}", store.path().display()))?;
            println!("letter #{} from {sender}", total - 1);
            Ok(())
        }
        Commands::Read { json } => read_cmd(&store, json),
        Commands::Total => {
            println!("{}", load(&store)?.total_letters());
            Ok(())
        }
        Commands::Verify => {
            let ledger = load(&store)?;
            println!(
                "verify: OK ({} letters, root {})",
                ledger.total_letters(),
                hex::encode(ledger.root())
            );
            Ok(())
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

impl KeyArgs {
    fn signing_key(&self) -> Result<SigningKey> {
        let Some(sk_hex) = &self.sk_hex else {
            bail!("no key configured: pass --sk-hex or set MAILBOX_PRIVATE_KEY");
        };
        let sk_bytes = hex::decode(sk_hex.trim()).context("invalid --sk-hex")?;
        let arr: [u8; 32] = sk_bytes
            .as_slice()
            .try_into()
            .map_err(|_| anyhow::anyhow!("sk-hex must be 32 bytes (64 hex chars)"))?;
        Ok(SigningKey::from_bytes(&arr))
    }

    fn identity(&self) -> Result<Identity> {
        let sk = self.signing_key()?;
        Ok(Identity::from_verifying_key(&sk.verifying_key()))
    }

    /// An explicit `--from` wins over the key, which is then never parsed.
    fn sender(&self, from: Option<Identity>) -> Result<Identity> {
        match from {
            Some(identity) => Ok(identity),
            None => self.identity(),
        }
    }
}

fn load(store: &LedgerStore) -> Result<mailbox::Ledger> {
    store
        .load()
        .with_context(|| format!("load {}", store.path().display()))
}

#[derive(Serialize)]
struct LetterView<'a> {
    index: usize,
    content: &'a str,
    sender: Identity,
}

fn read_cmd(store: &LedgerStore, json: bool) -> Result<()> {
    let ledger = load(store)?;
    debug!(total_letters = ledger.total_letters(), "enumerating letters");
    let views: Vec<LetterView<'_>> = ledger
        .read_all()
        .iter()
        .enumerate()
        .map(|(index, letter)| LetterView {
            index,
            content: letter.content(),
            sender: letter.sender(),
        })
        .collect();

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    if json {
        serde_json::to_writer_pretty(&mut out, &views)?;
        writeln!(out)?;
    } else if views.is_empty() {
        writeln!(out, "mailbox is empty")?;
    } else {
        for view in &views {
            writeln!(out, "#{} {} {}", view.index, view.sender, view.content)?;
        }
    }
    Ok(())
}

fn keygen_cmd(out_dir: &Path) -> Result<()> {
    fs::create_dir_all(out_dir).with_context(|| format!("mkdir {}", out_dir.display()))?;

    let mut sk_bytes = [0u8; 32];
    OsRng.fill_bytes(&mut sk_bytes);
    let sk = SigningKey::from_bytes(&sk_bytes);
    let pk = sk.verifying_key();

    let sk_path = out_dir.join("sk.hex");
    write_secret(&sk_path, hex::encode(sk_bytes).as_bytes())
        .with_context(|| format!("write {}", sk_path.display()))?;
    let pk_path = out_dir.join("pk.hex");
    fs::write(&pk_path, hex::encode(pk.as_bytes()))
        .with_context(|| format!("write {}", pk_path.display()))?;

    println!("keypair written → {}", out_dir.display());
    println!("identity: {}", Identity::from_verifying_key(&pk));
    Ok(())
}

/// Writes key material readable by the owner only (0600 on unix).
fn write_secret(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}
