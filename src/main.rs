use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use imap_sweep::args::Args;
use imap_sweep::config::Configuration;
use imap_sweep::error::{ConfigError, Error, SweepError};
use imap_sweep::mailbox::{ImapConfig, ImapMailbox, Mailbox};
use imap_sweep::message::SeqId;
use imap_sweep::parser::ParserRegistry;
use imap_sweep::processor::{MailProcessor, RunReport};
use imap_sweep::retry::Retry;

/// Namespace for environment overrides: `IMAP_FETCH_IMAP_SERVER` etc.
const ENV_PREFIX: &str = "IMAP_FETCH_";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    let args = Args::parse();
    let config = Configuration::load(args.overrides(), ENV_PREFIX, args.config.as_deref())?;
    let _log_guard = init_tracing(&config)?;

    run(&config).await
}

/// Install the tracing subscriber once: stderr by default, a non-blocking
/// file appender when `log_file` is configured. The returned guard keeps
/// the appender's worker alive for the process lifetime.
fn init_tracing(
    config: &Configuration,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>, Error> {
    let default_level = if config.get_bool("verbose")? {
        "debug"
    } else {
        "info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    match config.get_optional("log_file") {
        Some(path) => {
            let path = PathBuf::from(path);
            let dir = match path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                _ => PathBuf::from("."),
            };
            let file_name = path
                .file_name()
                .map(|n| n.to_os_string())
                .unwrap_or_else(|| "imap-sweep.log".into());
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
            Ok(None)
        }
    }
}

/// Dispatch exactly one run mode. Modes are configuration keys, so they
/// can come from the environment or the config file as well as the CLI.
async fn run(config: &Configuration) -> anyhow::Result<()> {
    let registry = ParserRegistry::with_builtins();

    if config.get_bool("process_all")? {
        return process_all(config, &registry).await;
    }
    if config.get_bool("list")? {
        return list(config).await;
    }
    if config.exists("download") {
        return download(config, &registry).await;
    }
    if config.exists("archive") {
        return archive(config).await;
    }
    anyhow::bail!(
        "no run mode given; pass --list, --process-all, --download <seq> or --archive <seq>"
    )
}

/// Dial and authenticate, with login retried on transient failures.
fn open_session(imap: ImapConfig) -> Result<ImapMailbox, Error> {
    let mut mailbox = ImapMailbox::dial(imap)?;
    Retry::default().run("login", || mailbox.login())?;
    Ok(mailbox)
}

async fn process_all(config: &Configuration, registry: &ParserRegistry) -> anyhow::Result<()> {
    let parser = registry.resolve(&config.get("parser_strategy")?)?;
    let error_dir = PathBuf::from(config.get("error_dir")?);
    let imap = ImapConfig::resolve(config)?;

    let result = tokio::task::spawn_blocking(move || {
        let mut mailbox = open_session(imap)?;
        let outcome = MailProcessor::new(&mut mailbox, parser.as_ref(), error_dir).process_all();
        mailbox.disconnect();
        outcome
    })
    .await
    .context("sweep task panicked")?;

    // The report is complete either way; the aggregate failure only adds
    // a non-zero exit and a pointer at the quarantine directory.
    match result {
        Ok(report) => {
            print_report(&report);
            Ok(())
        }
        Err(Error::Sweep(SweepError::Partial { report, error_dir })) => {
            print_report(&report);
            anyhow::bail!(
                "{} message(s) quarantined; raw copies kept in {}",
                report.failed,
                error_dir.display()
            )
        }
        Err(e) => Err(e.into()),
    }
}

async fn list(config: &Configuration) -> anyhow::Result<()> {
    let imap = ImapConfig::resolve(config)?;

    let overview = tokio::task::spawn_blocking(move || -> Result<_, Error> {
        let mut mailbox = open_session(imap)?;
        mailbox.select_inbox()?;
        let overview = mailbox.list_overview();
        mailbox.disconnect();
        Ok(overview?)
    })
    .await
    .context("list task panicked")??;

    if overview.is_empty() {
        println!("No pending messages.");
    }
    for (seq, headers) in overview {
        println!("\nID: {seq}\n{headers}");
    }
    Ok(())
}

async fn download(config: &Configuration, registry: &ParserRegistry) -> anyhow::Result<()> {
    let seq = SeqId(parse_seq(config, "download")?);
    let parser = registry.resolve(&config.get("parser_strategy")?)?;
    let verbose = config.get_bool("verbose")?;
    let imap = ImapConfig::resolve(config)?;

    tokio::task::spawn_blocking(move || -> Result<(), Error> {
        let mut mailbox = open_session(imap)?;
        mailbox.select_inbox()?;
        let message = mailbox.fetch(seq);
        mailbox.disconnect();
        let message = message?;
        if verbose {
            println!("{}", String::from_utf8_lossy(&message.raw));
        }
        parser.parse(&message)?;
        Ok(())
    })
    .await
    .context("download task panicked")??;
    Ok(())
}

async fn archive(config: &Configuration) -> anyhow::Result<()> {
    let seq = SeqId(parse_seq(config, "archive")?);
    let imap = ImapConfig::resolve(config)?;

    tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
        let mut mailbox = open_session(imap)?;
        mailbox.select_inbox()?;
        let outcome = archive_one(&mut mailbox, seq);
        mailbox.disconnect();
        outcome
    })
    .await
    .context("archive task panicked")??;

    println!("Message {seq} archived.");
    Ok(())
}

/// Fetch the message to establish its UID, then archive by it. Sequence
/// ids are read-only handles here, same as in the sweep.
fn archive_one(mailbox: &mut ImapMailbox, seq: SeqId) -> anyhow::Result<()> {
    let message = mailbox.fetch(seq)?;
    let uid = match message.uid {
        Some(uid) => uid,
        None => {
            let stable_id = message
                .stable_id()
                .ok_or_else(|| anyhow::anyhow!("message {seq} has no Message-ID header"))?;
            mailbox
                .resolve_uid(&stable_id)?
                .ok_or_else(|| anyhow::anyhow!("no UID found for stable id '{stable_id}'"))?
        }
    };
    mailbox.archive_by_uid(uid)?;
    Ok(())
}

fn parse_seq(config: &Configuration, key: &str) -> Result<u32, Error> {
    let value = config.get_int(key)?;
    u32::try_from(value).map_err(|_| {
        ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            expected: "a positive sequence id",
        }
        .into()
    })
}

fn print_report(report: &RunReport) {
    println!(
        "Examined {}, archived {}, failed {}",
        report.examined, report.archived, report.failed
    );
}
