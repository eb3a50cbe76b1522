//! Admin CLI surface.
//!
//! Thin handlers over the store operations: mint codes and batches, inspect
//! counts, run the cascade delete, resolve a code the way the web layer
//! would, and trigger a reconciliation sweep by hand.

use std::ffi::OsString;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

pub use commands::run;

#[derive(Parser, Debug)]
#[command(
    name = "taplink",
    version,
    about = "Resolve-code identity platform admin tool",
    infer_subcommands = true,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Machine-readable JSON output.
    #[arg(long, global = true, default_value_t = false)]
    pub json: bool,

    /// Database path (default: from config, then the data dir).
    #[arg(long, global = true, value_name = "PATH")]
    pub db: Option<PathBuf>,

    /// More logging (-v debug, -vv trace).
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Manage individual resolve codes.
    #[command(subcommand)]
    Code(CodeCommand),

    /// Manage code batches.
    #[command(subcommand)]
    Batch(BatchCommand),

    /// Manage profiles.
    #[command(subcommand)]
    Profile(ProfileCommand),

    /// Resolve a code string the way the web layer would.
    Resolve {
        /// The scanned code string.
        code: String,
        /// Resolve as this authenticated user (anonymous when omitted).
        #[arg(long, value_name = "USER")]
        user: Option<String>,
    },

    /// Run one batch-count reconciliation sweep.
    Reconcile,
}

#[derive(Subcommand, Debug)]
pub enum CodeCommand {
    /// Mint a single code (generated when CODE is omitted).
    Create {
        code: Option<String>,
        #[arg(long, value_name = "KIND")]
        kind: Option<String>,
        /// Batch to mint into.
        #[arg(long, value_name = "ID")]
        batch: Option<i64>,
        #[arg(long, value_name = "ADMIN")]
        by: String,
    },

    /// Show a code.
    Show {
        code: String,
        #[arg(long, default_value_t = false)]
        include_deleted: bool,
    },

    /// List codes in a batch (or unbatched codes).
    List {
        #[arg(long, value_name = "ID")]
        batch: Option<i64>,
        #[arg(long, default_value_t = false)]
        deleted: bool,
    },

    /// Record that the code was copied to a physical medium (idempotent).
    Copy { code: String },

    /// Repair an orphaned assignment if present.
    Fix { code: String },

    /// Cascade-delete a code (soft unless --hard).
    Delete {
        code: String,
        #[arg(long, default_value_t = false)]
        hard: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum BatchCommand {
    /// Create an empty batch.
    Create {
        name: String,
        prefix: String,
        #[arg(long, value_name = "ADMIN")]
        by: String,
    },

    /// Bulk-generate codes into a batch.
    Generate {
        #[arg(value_name = "ID")]
        batch: i64,
        quantity: u32,
        #[arg(long, value_name = "KIND")]
        kind: Option<String>,
        #[arg(long, value_name = "ADMIN")]
        by: String,
    },

    /// List batches with cached vs live counts.
    List,

    /// Delete a batch row (codes are kept and read as unbatched).
    Delete {
        #[arg(value_name = "ID")]
        batch: i64,
    },
}

#[derive(Subcommand, Debug)]
pub enum ProfileCommand {
    /// Claim a code: create a profile against it.
    Create {
        code: String,
        #[arg(long, value_name = "USER")]
        user: String,
        #[arg(long)]
        first: String,
        #[arg(long, default_value = "")]
        last: String,
        #[arg(long)]
        bio: Option<String>,
        #[arg(long, default_value_t = false)]
        private: bool,
    },

    /// Show a profile by slug.
    Show { slug: String },

    /// Delete a profile; its code survives and becomes claimable again.
    Delete {
        #[arg(value_name = "ID")]
        profile: i64,
        #[arg(long, default_value_t = false)]
        hard: bool,
    },
}

pub fn parse_from<I, T>(args: I) -> Cli
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    Cli::parse_from(args)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_resolve_with_user() {
        let cli = Cli::parse_from(["taplink", "resolve", "AB0001", "--user", "u-1"]);
        match cli.command {
            Command::Resolve { code, user } => {
                assert_eq!(code, "AB0001");
                assert_eq!(user.as_deref(), Some("u-1"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_batch_generate() {
        let cli = Cli::parse_from([
            "taplink", "batch", "generate", "3", "100", "--by", "admin", "--json",
        ]);
        assert!(cli.json);
        match cli.command {
            Command::Batch(BatchCommand::Generate {
                batch, quantity, ..
            }) => {
                assert_eq!(batch, 3);
                assert_eq!(quantity, 100);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_code_delete_hard() {
        let cli = Cli::parse_from(["taplink", "code", "delete", "AB0001", "--hard"]);
        match cli.command {
            Command::Code(CodeCommand::Delete { code, hard }) => {
                assert_eq!(code, "AB0001");
                assert!(hard);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
