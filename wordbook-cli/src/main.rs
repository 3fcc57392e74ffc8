//! `wordbook` — manage a word list from the command line.
//!
//! Talks to a document server (`--server ws://...`) or, without one, to a
//! local RocksDB database under `--data-dir`. `wordbook serve` runs the
//! document server itself.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;
use wordbook_sync::record::TIME_STAMP_FIELD;
use wordbook_sync::{
    DocumentServer, DocumentStore, Fields, LoadOrder, LocalCollection, RemoteClient,
    RemoteCollection, ServerConfig, StoreConfig, WordDraft, WordId, WordRecord, WordStore,
    WordStoreConfig,
};

type CliResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

#[derive(Parser, Debug)]
#[command(name = "wordbook", version, about = "Word list backed by a document collection")]
struct Cli {
    /// Document server to use instead of the local database
    #[arg(long, global = true, env = "WORDBOOK_SERVER")]
    server: Option<String>,

    /// Local database directory
    #[arg(long, global = true, env = "WORDBOOK_DATA_DIR", default_value = "wordbook_data")]
    data_dir: PathBuf,

    /// Collection holding the words
    #[arg(long, global = true, default_value = "words")]
    collection: String,

    /// Order of listed words
    #[arg(long, global = true, value_enum, default_value_t = Order::Ascending)]
    order: Order,

    /// Verbose logging (-v for debug, -vv for trace)
    #[arg(long, short, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a document server
    Serve {
        #[arg(long, env = "WORDBOOK_BIND", default_value = "127.0.0.1:9191")]
        bind: String,
        /// Keep documents in memory only
        #[arg(long)]
        memory: bool,
    },
    /// Print every word, one JSON object per line
    List,
    /// Add a word from a JSON object or key=value pairs
    Add { fields: Vec<String> },
    /// Change fields of an existing word
    Update { id: String, fields: Vec<String> },
    /// Delete a word
    Delete { id: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Order {
    /// Oldest first
    Ascending,
    /// Newest first
    Descending,
    /// As listed by the collection
    Remote,
}

impl From<Order> for LoadOrder {
    fn from(order: Order) -> Self {
        match order {
            Order::Ascending => LoadOrder::Ascending,
            Order::Descending => LoadOrder::Descending,
            Order::Remote => LoadOrder::Remote,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default)).init();
}

async fn run(cli: Cli) -> CliResult<()> {
    let Cli {
        server,
        data_dir,
        collection,
        order,
        command,
        ..
    } = cli;

    if let Command::Serve { bind, memory } = command {
        return serve(&bind, (!memory).then_some(data_dir)).await;
    }

    let collection = open_collection(server.as_deref(), data_dir, &collection).await?;
    let config = WordStoreConfig {
        order: order.into(),
        ..WordStoreConfig::default()
    };
    let store = WordStore::with_config(collection, config);

    match command {
        Command::List => {
            for word in store.load_all().await? {
                println!("{}", serde_json::to_string(&word)?);
            }
        }
        Command::Add { fields } => {
            let mut fields = parse_fields(&fields)?;
            fields
                .entry(TIME_STAMP_FIELD)
                .or_insert_with(|| Value::from(now_millis()));
            let word = store.create(WordDraft::from_fields(fields)?).await?;
            println!("{}", serde_json::to_string(&word)?);
        }
        Command::Update { id, fields } => {
            let changes = parse_fields(&fields)?;
            store.load_all().await?;

            // Only the given fields change; the rest are kept.
            let id = WordId::new(id);
            let word = match store.state().word(&id) {
                Some(existing) => {
                    let mut merged = existing.fields().clone();
                    merged.extend(changes);
                    existing.with_fields(merged)
                }
                None => WordRecord::new(id, changes),
            };
            let word = store.update(word).await?;
            println!("{}", serde_json::to_string(&word)?);
        }
        Command::Delete { id } => {
            store.load_all().await?;
            let id = store.delete(WordId::new(id)).await?;
            println!("deleted {id}");
        }
        Command::Serve { .. } => {}
    }

    Ok(())
}

async fn open_collection(
    server: Option<&str>,
    data_dir: PathBuf,
    name: &str,
) -> CliResult<Arc<dyn RemoteCollection>> {
    match server {
        Some(url) => {
            let client = RemoteClient::connect(url).await?;
            Ok(Arc::new(client.collection(name)))
        }
        None => {
            let store = DocumentStore::open(StoreConfig {
                path: data_dir,
                ..StoreConfig::default()
            })?;
            Ok(Arc::new(LocalCollection::new(Arc::new(store), name)?))
        }
    }
}

async fn serve(bind: &str, storage_path: Option<PathBuf>) -> CliResult<()> {
    let server = DocumentServer::new(ServerConfig {
        bind_addr: bind.to_string(),
        storage_path,
        ..ServerConfig::default()
    })?;

    tokio::select! {
        result = server.run() => result,
        _ = tokio::signal::ctrl_c() => {
            log::info!("Shutting down");
            Ok(())
        }
    }
}

/// Parse either a single JSON object or `key=value` pairs. Values that are
/// valid JSON keep their type; anything else is taken as a string.
fn parse_fields(args: &[String]) -> CliResult<Fields> {
    if let [single] = args {
        if single.trim_start().starts_with('{') {
            return match serde_json::from_str::<Value>(single)? {
                Value::Object(fields) => Ok(fields),
                _ => Err("expected a JSON object".into()),
            };
        }
    }

    let mut fields = Fields::new();
    for arg in args {
        let (key, raw) = arg
            .split_once('=')
            .ok_or_else(|| format!("expected key=value, got `{arg}`"))?;
        let value = serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::from(raw));
        fields.insert(key.to_string(), value);
    }
    Ok(fields)
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_key_value_pairs() {
        let fields = parse_fields(&args(&["word=tide", "timeStamp=42", "tags=[\"sea\"]"])).unwrap();
        assert_eq!(fields["word"], json!("tide"));
        assert_eq!(fields["timeStamp"], json!(42));
        assert_eq!(fields["tags"], json!(["sea"]));
    }

    #[test]
    fn test_parse_json_object() {
        let fields = parse_fields(&args(&[r#"{"word": "gale", "strength": 8}"#])).unwrap();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields["strength"], json!(8));
    }

    #[test]
    fn test_parse_rejects_bare_words() {
        assert!(parse_fields(&args(&["gale"])).is_err());
        assert!(parse_fields(&args(&["[1, 2]"])).is_err());
    }

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["wordbook", "--order", "descending", "delete", "w1"]).unwrap();
        assert_eq!(cli.order, Order::Descending);
        assert!(matches!(cli.command, Command::Delete { ref id } if id == "w1"));
        assert_eq!(LoadOrder::from(cli.order), LoadOrder::Descending);
    }
}
