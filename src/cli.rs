// Command-line front end for ipspatch.
//
//   ipspatch DATAFILE IPSFILE                     apply IPSFILE to DATAFILE in place
//   ipspatch --create=OUTFILE ORIGINAL MODIFIED   write a patch to OUTFILE
//
// Help and usage errors exit with status 1, as does any I/O or patch error.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process;

use clap::error::ErrorKind;
use clap::{ArgAction, CommandFactory, Parser, ValueHint};
use thiserror::Error;

use crate::io::{self, hex_digest};

// ---------------------------------------------------------------------------
// Clap CLI definition
// ---------------------------------------------------------------------------

/// IPS patch applier and creator.
#[derive(Parser, Debug)]
#[command(
    name = "ipspatch",
    version,
    about = "IPS patch applier/creator",
    disable_help_flag = true,
    override_usage = "ipspatch [OPTIONS] DATAFILE IPSFILE\n       \
                      ipspatch [OPTIONS] --create=OUTFILE ORIGINAL MODIFIED"
)]
struct Cli {
    /// Create a patch in OUTFILE from ORIGINAL and MODIFIED.
    #[arg(short = 'c', long = "create", value_name = "OUTFILE", value_hint = ValueHint::FilePath)]
    create: Option<PathBuf>,

    /// Trace record offsets, lengths and bytes to stdout.
    #[arg(short = 'd', long)]
    debug: bool,

    /// Output stats as JSON to stderr.
    #[arg(long = "json")]
    json_output: bool,

    /// Print this help and exit.
    #[arg(short = 'h', long = "help", short_alias = '?', action = ArgAction::SetTrue)]
    help: bool,

    /// DATAFILE to patch, or ORIGINAL with --create.
    #[arg(value_name = "DATAFILE|ORIGINAL", value_hint = ValueHint::FilePath)]
    first: Option<PathBuf>,

    /// IPSFILE to apply, or MODIFIED with --create.
    #[arg(value_name = "IPSFILE|MODIFIED", value_hint = ValueHint::FilePath)]
    second: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Resolved command + options (flattened from Cli)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Apply {
        target: PathBuf,
        patch: PathBuf,
    },
    Create {
        original: PathBuf,
        modified: PathBuf,
        output: PathBuf,
    },
}

#[derive(Debug)]
struct Options {
    command: Command,
    debug: bool,
    json_output: bool,
}

#[derive(Debug, Error)]
enum UsageError {
    #[error("help requested")]
    HelpRequested,
    #[error("missing required argument {0}")]
    MissingArgument(&'static str),
    #[error(transparent)]
    Invalid(#[from] clap::Error),
}

fn resolve_options(cli: Cli) -> Result<Options, UsageError> {
    if cli.help {
        return Err(UsageError::HelpRequested);
    }

    let command = match cli.create {
        Some(output) => Command::Create {
            original: cli.first.ok_or(UsageError::MissingArgument("ORIGINAL"))?,
            modified: cli.second.ok_or(UsageError::MissingArgument("MODIFIED"))?,
            output,
        },
        None => Command::Apply {
            target: cli.first.ok_or(UsageError::MissingArgument("DATAFILE"))?,
            patch: cli.second.ok_or(UsageError::MissingArgument("IPSFILE"))?,
        },
    };

    Ok(Options {
        command,
        debug: cli.debug,
        json_output: cli.json_output,
    })
}

fn parse_args<I, T>(args: I) -> Result<Options, UsageError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::try_parse_from(args)?;
    resolve_options(cli)
}

fn usage() -> String {
    Cli::command().render_help().to_string()
}

#[cfg(any(test, feature = "fuzzing"))]
pub fn fuzz_try_parse_args(args: &[String]) {
    let argv: Vec<String> = std::iter::once("ipspatch".to_string())
        .chain(args.iter().cloned())
        .collect();
    let _ = parse_args(argv);
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

fn init_logging(debug: bool) {
    let mut builder = if debug {
        let mut b = env_logger::Builder::new();
        b.filter_level(log::LevelFilter::Trace)
            .target(env_logger::Target::Stdout);
        b
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
    };
    builder.format_timestamp(None).format_target(false).init();
}

// ---------------------------------------------------------------------------
// Apply command
// ---------------------------------------------------------------------------

fn cmd_apply(target: &Path, patch: &Path, opts: &Options) -> i32 {
    let stats = match io::apply_file(target, patch) {
        Ok(stats) => stats,
        Err(e) => {
            eprintln!(
                "ipspatch: applying {} to {}: {e}",
                patch.display(),
                target.display()
            );
            return 1;
        }
    };

    log::info!(
        "ipspatch: applied {} records ({} RLE), {} -> {} bytes",
        stats.records,
        stats.rle_records,
        stats.original_size,
        stats.patched_size
    );

    if opts.json_output {
        let json = serde_json::json!({
            "command": "apply",
            "patch_size": stats.patch_size,
            "original_size": stats.original_size,
            "patched_size": stats.patched_size,
            "records": stats.records,
            "rle_records": stats.rle_records,
            "bytes_written": stats.bytes_written,
            "truncated_to": stats.truncated_to,
            "sha256": stats.patched_sha256.as_ref().map(hex_digest),
        });
        eprintln!("{json:#}");
    }

    0
}

// ---------------------------------------------------------------------------
// Create command
// ---------------------------------------------------------------------------

fn cmd_create(original: &Path, modified: &Path, output: &Path, opts: &Options) -> i32 {
    let stats = match io::create_file(original, modified, output) {
        Ok(stats) => stats,
        Err(e) => {
            eprintln!("ipspatch: creating {}: {e}", output.display());
            return 1;
        }
    };

    log::info!(
        "ipspatch: wrote {} records, {} payload bytes, patch {} bytes",
        stats.records,
        stats.payload_bytes,
        stats.patch_size
    );

    if opts.json_output {
        let json = serde_json::json!({
            "command": "create",
            "original_size": stats.original_size,
            "modified_size": stats.modified_size,
            "patch_size": stats.patch_size,
            "records": stats.records,
            "payload_bytes": stats.payload_bytes,
            "truncated_to": stats.truncated_to,
            "sha256": stats.modified_sha256.as_ref().map(hex_digest),
        });
        eprintln!("{json:#}");
    }

    0
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Main CLI entry point. Parses arguments via clap, dispatches commands.
pub fn run() -> ! {
    let opts = match parse_args(std::env::args_os()) {
        Ok(opts) => opts,
        Err(UsageError::Invalid(e)) if e.kind() == ErrorKind::DisplayVersion => e.exit(),
        Err(UsageError::Invalid(e)) => {
            let _ = e.print();
            process::exit(1);
        }
        Err(UsageError::HelpRequested) => {
            println!("{}", usage());
            process::exit(1);
        }
        Err(e) => {
            eprintln!("ipspatch: {e}");
            eprintln!("{}", usage());
            process::exit(1);
        }
    };

    init_logging(opts.debug);

    let exit_code = match &opts.command {
        Command::Apply { target, patch } => cmd_apply(target, patch, &opts),
        Command::Create {
            original,
            modified,
            output,
        } => cmd_create(original, modified, output, &opts),
    };

    process::exit(exit_code);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
