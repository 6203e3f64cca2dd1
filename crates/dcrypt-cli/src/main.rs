#![deny(warnings)]
#![deny(clippy::all)]

mod report;

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use clap::{Parser, ValueEnum};
use dcrypt_core::crypto::public_key::PrivateKey;
use dcrypt_core::crypto::CryptoError;
use dcrypt_format::{decode, DecodeOptions, DecodeRequest, FormatError, SaltSource};
use thiserror::Error;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use zeroize::Zeroizing;

const EXIT_SUCCESS: i32 = 0;
const EXIT_CLI: i32 = 2;
const EXIT_FORMAT: i32 = 3;
const EXIT_IO: i32 = 4;
const EXIT_CRYPTO: i32 = 5;
const EXIT_KEY: i32 = 6;

#[derive(Parser, Debug)]
#[command(
    name = "dcrypt",
    version,
    about = "Inspect and decrypt CRYPTED mail containers"
)]
struct Cli {
    /// Container to read (default: stdin)
    #[arg(short = 'f', long = "file")]
    file: Option<PathBuf>,
    /// Print header and key derivation details to stderr
    #[arg(short = 'i', long = "info")]
    info: bool,
    /// PEM private key (PKCS#8, SEC1 or PKCS#1)
    #[arg(short = 'k', long = "key", env = "DCRYPT_KEY")]
    key: Option<PathBuf>,
    /// Plaintext destination (default: stdout)
    #[arg(short = 'w', long = "write")]
    write: Option<PathBuf>,
    /// Emit the payload even when its HMAC does not verify
    #[arg(long)]
    warn: bool,
    /// Fail when the v2 content key digest does not verify
    #[arg(long)]
    strict: bool,
    /// Recipient whose ephemeral key salts the v2 key derivation
    #[arg(long, value_enum, default_value_t = SaltArg::First)]
    salt: SaltArg,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum SaltArg {
    First,
    Matched,
}

impl From<SaltArg> for SaltSource {
    fn from(arg: SaltArg) -> Self {
        match arg {
            SaltArg::First => SaltSource::FirstRecipient,
            SaltArg::Matched => SaltSource::MatchedRecipient,
        }
    }
}

#[derive(Debug, Error)]
enum CliError {
    #[error("format error: {0}")]
    Format(#[from] FormatError),
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Cli(String),
}

fn main() {
    let exit_code = run();
    std::process::exit(exit_code);
}

fn run() -> i32 {
    init_tracing();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return if err.use_stderr() { EXIT_CLI } else { EXIT_SUCCESS };
        }
    };

    match cmd_decode(&cli) {
        Ok(()) => EXIT_SUCCESS,
        Err(err) => {
            report_error(&err);
            map_exit_code(&err)
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn report_error(err: &CliError) {
    error!(error = %err, "command failed");
    eprintln!("error: {err}");
}

fn map_exit_code(err: &CliError) -> i32 {
    match err {
        CliError::Format(FormatError::Io(_)) => EXIT_IO,
        CliError::Io(_) => EXIT_IO,
        CliError::Format(
            FormatError::Crypto(_) | FormatError::TagMismatch | FormatError::IntegrityMismatch,
        ) => EXIT_CRYPTO,
        CliError::Crypto(_) => EXIT_CRYPTO,
        CliError::Format(
            FormatError::RecipientNotFound
            | FormatError::HeaderLengthMismatch { .. }
            | FormatError::KeyVerification
            | FormatError::MissingPrivateKey,
        ) => EXIT_KEY,
        CliError::Cli(_) => EXIT_CLI,
        CliError::Format(_) => EXIT_FORMAT,
    }
}

fn cmd_decode(cli: &Cli) -> Result<(), CliError> {
    if cli.key.is_none() && !cli.info {
        return Err(CliError::Cli(
            "nothing to do: pass --key to decrypt or --info to inspect".to_string(),
        ));
    }

    let key = cli.key.as_deref().map(load_private_key).transpose()?;
    let mut input: Box<dyn Read> = match &cli.file {
        Some(path) => Box::new(BufReader::new(File::open(path)?)),
        None => Box::new(io::stdin().lock()),
    };

    info!(
        input = %display_path(cli.file.as_deref(), "<stdin>"),
        output = %display_path(cli.write.as_deref(), "<stdout>"),
        decrypt = key.is_some(),
        "decoding container"
    );

    match (key.as_ref(), cli.write.as_deref()) {
        (None, _) => decode_stream(cli, None, input.as_mut(), &mut io::sink()),
        (Some(key), Some(output)) => {
            let tmp_path = temp_path_for(output);
            let result = File::create(&tmp_path)
                .map_err(CliError::from)
                .and_then(|file| {
                    let mut writer = BufWriter::new(file);
                    decode_stream(cli, Some(key), input.as_mut(), &mut writer)?;
                    writer.flush()?;
                    Ok(())
                });
            if result.is_err() {
                let _ = fs::remove_file(&tmp_path);
            }
            result?;

            finalize_output(&tmp_path, output)?;
            Ok(())
        }
        (Some(key), None) => {
            let stdout = io::stdout();
            let mut writer = stdout.lock();
            decode_stream(cli, Some(key), input.as_mut(), &mut writer)
        }
    }
}

fn decode_stream(
    cli: &Cli,
    key: Option<&PrivateKey>,
    input: &mut dyn Read,
    output: &mut dyn Write,
) -> Result<(), CliError> {
    let mut result = decode(DecodeRequest {
        private_key: key,
        want_info: cli.info,
        input,
        output,
        options: DecodeOptions {
            salt_source: cli.salt.into(),
            strict_key_digest: cli.strict,
            warn_on_integrity_failure: cli.warn,
        },
    })?;

    if cli.info {
        report::write_report(&result, &mut io::stderr().lock())?;
    }

    for warning in &result.warnings {
        warn!(warning = %warning, "container warning");
        eprintln!("warning: {warning}");
    }

    match result.decrypt_error.take() {
        Some(err) => Err(err.into()),
        None => {
            if key.is_some() {
                info!(bytes = result.bytes_written, "payload decrypted");
            }
            Ok(())
        }
    }
}

fn load_private_key(path: &Path) -> Result<PrivateKey, CliError> {
    let pem = Zeroizing::new(fs::read_to_string(path)?);
    let key = PrivateKey::from_pem(&pem)?;
    info!(key = %path.display(), algorithm = key.algorithm(), "loaded private key");
    Ok(key)
}

fn display_path(path: Option<&Path>, fallback: &str) -> String {
    path.map(|p| p.display().to_string())
        .unwrap_or_else(|| fallback.to_string())
}

fn temp_path_for(output: &Path) -> PathBuf {
    output.with_extension("tmp")
}

fn finalize_output(tmp_path: &Path, output: &Path) -> Result<(), std::io::Error> {
    if output.exists() {
        std::fs::remove_file(output)?;
    }
    std::fs::rename(tmp_path, output)
}
