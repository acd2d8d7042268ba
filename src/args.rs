//! Command-line arguments. Values land in the explicit-override layer of
//! the configuration resolver; nothing reads them directly.

use std::collections::HashMap;
use std::path::PathBuf;

use clap::Parser;

/// Batch IMAP ingestion: fetch, classify and archive inbox messages.
#[derive(Debug, Parser)]
#[command(name = "imap-sweep", author, version, about)]
pub struct Args {
    /// TOML configuration file (default: config.toml, if present).
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub imap_server: Option<String>,
    #[arg(long)]
    pub imap_port: Option<u16>,
    #[arg(long)]
    pub username: Option<String>,
    #[arg(long)]
    pub password: Option<String>,
    #[arg(long)]
    pub inbox_folder: Option<String>,
    #[arg(long)]
    pub archive_folder: Option<String>,
    /// Directory for raw copies of failed messages.
    #[arg(long)]
    pub error_dir: Option<String>,
    /// Parser strategy name (see the registry for what's available).
    #[arg(long)]
    pub parser_strategy: Option<String>,
    /// Log to this file instead of stderr.
    #[arg(long)]
    pub log_file: Option<String>,

    /// List pending messages and exit.
    #[arg(long)]
    pub list: bool,
    /// Process every pending message: classify, then archive or quarantine.
    #[arg(long)]
    pub process_all: bool,
    /// Download one message by sequence id and feed it to the parser.
    #[arg(long, value_name = "SEQ")]
    pub download: Option<u32>,
    /// Archive one message by sequence id.
    #[arg(long, value_name = "SEQ")]
    pub archive: Option<u32>,
    /// Debug-level logging.
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Collapse everything actually passed into the override layer.
    /// Unset flags stay out of the map so they cannot mask env or file
    /// values for the same key.
    pub fn overrides(&self) -> HashMap<String, String> {
        let mut map = HashMap::new();
        insert_value(&mut map, "imap_server", &self.imap_server);
        insert_value(&mut map, "imap_port", &self.imap_port);
        insert_value(&mut map, "username", &self.username);
        insert_value(&mut map, "password", &self.password);
        insert_value(&mut map, "inbox_folder", &self.inbox_folder);
        insert_value(&mut map, "archive_folder", &self.archive_folder);
        insert_value(&mut map, "error_dir", &self.error_dir);
        insert_value(&mut map, "parser_strategy", &self.parser_strategy);
        insert_value(&mut map, "log_file", &self.log_file);
        insert_value(&mut map, "download", &self.download);
        insert_value(&mut map, "archive", &self.archive);
        insert_flag(&mut map, "list", self.list);
        insert_flag(&mut map, "process_all", self.process_all);
        insert_flag(&mut map, "verbose", self.verbose);
        map
    }
}

fn insert_value<T: ToString>(map: &mut HashMap<String, String>, key: &str, value: &Option<T>) {
    if let Some(v) = value {
        map.insert(key.to_string(), v.to_string());
    }
}

fn insert_flag(map: &mut HashMap<String, String>, key: &str, set: bool) {
    if set {
        map.insert(key.to_string(), "true".to_string());
    }
}
