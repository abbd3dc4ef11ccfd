pub mod commands;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::AppConfig;
use crate::error::Result;
use crate::paths::Paths;

#[derive(Parser)]
#[command(name = "fdev")]
#[command(version)]
#[command(about = "Manage SSH identities and keys locally")]
#[command(long_about = "Keep ~/.ssh/config in sync with your identities.\n\nEvery change can be previewed, is backed up first and is written atomically.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage managed Host blocks in ~/.ssh/config
    Ssh {
        #[command(subcommand)]
        command: SshCommands,
    },

    /// Generate, regenerate and import key pairs
    Key {
        #[command(subcommand)]
        command: KeyCommands,
    },

    /// Check the local SSH setup
    Doctor,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

/// The identity to write as a managed Host block.
#[derive(Args, Debug, Clone)]
pub struct IdentityArgs {
    /// Host alias (a-z, 0-9, - and _)
    #[arg(short, long)]
    pub alias: String,

    /// Real host name, optionally with :port
    #[arg(long)]
    pub hostname: String,

    /// Private key file to use
    #[arg(short, long, conflicts_with = "key_alias", required_unless_present = "key_alias")]
    pub key: Option<PathBuf>,

    /// Use the managed key pair stored under this alias
    #[arg(long)]
    pub key_alias: Option<String>,

    /// Algorithm of the managed key (default: the one present on disk)
    #[arg(long, requires = "key_alias")]
    pub key_type: Option<String>,
}

#[derive(Subcommand)]
pub enum SshCommands {
    /// Back up ~/.ssh/config and write the identity's Host block
    Apply {
        #[command(flatten)]
        identity: IdentityArgs,

        /// Apply without confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Show what apply would change, without writing
    Preview {
        #[command(flatten)]
        identity: IdentityArgs,
    },

    /// List Host blocks in ~/.ssh/config
    List,

    /// List hand-written Host blocks that could become identities
    Importable,

    /// List ~/.ssh/config backups
    Backups,
}

#[derive(Subcommand)]
pub enum KeyCommands {
    /// Generate a new key pair
    Generate {
        /// Alias the key is stored under
        alias: String,

        /// Key type: ed25519, rsa or ecdsa (default from config)
        #[arg(short = 't', long = "type")]
        key_type: Option<String>,

        /// Key size (rsa: 2048-16384, ecdsa: 256, 384 or 521)
        #[arg(short, long, default_value = "0")]
        bits: u32,

        /// Comment stored in the public key
        #[arg(short = 'C', long)]
        comment: Option<String>,

        /// Prompt for a passphrase to encrypt the private key
        #[arg(short, long)]
        passphrase: bool,

        /// Overwrite an existing key without asking
        #[arg(short, long)]
        force: bool,
    },

    /// Rewrite the public key from the private key
    Regen {
        /// Alias of the key pair
        alias: String,

        /// Key type (default: the one present on disk)
        #[arg(short = 't', long = "type")]
        key_type: Option<String>,

        /// Prompt for the private key passphrase
        #[arg(short, long)]
        passphrase: bool,
    },

    /// Find existing id_* key pairs (default: ~/.ssh)
    Scan {
        /// Directory to scan
        dir: Option<PathBuf>,
    },

    /// Copy an existing key pair into the key store
    Import {
        /// File name of the private key, e.g. id_ed25519
        name: String,

        /// Directory containing the key (default: ~/.ssh)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Alias to store it under (default: derived from the name)
        #[arg(short, long)]
        alias: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Set a configuration value
    Set {
        /// Configuration key
        key: String,
        /// Configuration value
        value: String,
    },

    /// Print the configuration file path
    Path,
}

/// Resolved layout and settings shared by every command.
pub struct Context {
    pub paths: Paths,
    pub config: AppConfig,
    pub json: bool,
}

impl Context {
    pub fn load(json: bool) -> Result<Self> {
        let paths = Paths::discover()?;
        let config = AppConfig::load(&paths)?;
        let paths = config.apply_to(paths);
        Ok(Self {
            paths,
            config,
            json,
        })
    }
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        let ctx = Context::load(self.json)?;

        match self.command {
            Commands::Ssh { command } => match command {
                SshCommands::Apply { identity, yes } => {
                    commands::ssh::apply(&ctx, identity, yes).await
                }
                SshCommands::Preview { identity } => commands::ssh::preview(&ctx, identity).await,
                SshCommands::List => commands::ssh::list(&ctx).await,
                SshCommands::Importable => commands::ssh::importable(&ctx).await,
                SshCommands::Backups => commands::ssh::backups(&ctx).await,
            },
            Commands::Key { command } => match command {
                KeyCommands::Generate {
                    alias,
                    key_type,
                    bits,
                    comment,
                    passphrase,
                    force,
                } => {
                    commands::key::generate(&ctx, alias, key_type, bits, comment, passphrase, force)
                        .await
                }
                KeyCommands::Regen {
                    alias,
                    key_type,
                    passphrase,
                } => commands::key::regen(&ctx, alias, key_type, passphrase).await,
                KeyCommands::Scan { dir } => commands::key::scan(&ctx, dir).await,
                KeyCommands::Import { name, dir, alias } => {
                    commands::key::import(&ctx, name, dir, alias).await
                }
            },
            Commands::Doctor => commands::doctor::execute(&ctx).await,
            Commands::Config { command } => match command {
                ConfigCommands::Show => commands::config::show(&ctx).await,
                ConfigCommands::Set { key, value } => commands::config::set(ctx, key, value).await,
                ConfigCommands::Path => commands::config::path(&ctx).await,
            },
        }
    }
}
