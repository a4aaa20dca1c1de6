use clap::{Args, Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use directus_cache::cache::DEFAULT_ORDER_BY;
use directus_cache::config::EXAMPLE_CONFIG;
use directus_cache::{
  Config, ContextFactory, ContextOptions, DirectusClient, Document, LocalDisk, LocalStore,
  QueryBuilder, Repository, SqliteStore,
};

#[derive(Parser, Debug)]
#[command(name = "directus-cache")]
#[command(about = "Mirror Directus collections into a local cache")]
#[command(version)]
struct Cli {
  /// Path to config file (default: $XDG_CONFIG_HOME/directus-cache/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Write logs to this file instead of stderr
  #[arg(long, global = true)]
  log_file: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Write the example configuration file
  InitConfig {
    /// Destination (default: $XDG_CONFIG_HOME/directus-cache/config.yaml)
    #[arg(long)]
    path: Option<PathBuf>,
    /// Overwrite an existing file
    #[arg(long)]
    force: bool,
  },

  /// Query a collection directly, without touching the cache
  Items {
    collection: String,
    /// Fetch a single item
    #[arg(long)]
    id: Option<String>,
    #[arg(long, value_delimiter = ',')]
    fields: Vec<String>,
    /// Filter as field:operator:value (value parsed as JSON when possible)
    #[arg(long = "filter", value_parser = parse_filter)]
    filters: Vec<(String, String, Value)>,
    /// Extra query parameter as key=value
    #[arg(long = "param", value_parser = parse_param)]
    params: Vec<(String, String)>,
  },

  /// Show the metadata of a file, or download it
  Asset {
    id: String,
    /// Destination relative to the assets root (default: assets/<name from Content-Disposition>)
    #[arg(long)]
    out: Option<String>,
    /// Print metadata instead of downloading
    #[arg(long)]
    meta: bool,
  },

  /// List cached records, fetching the collection when the cache is empty
  List(RepoArgs),

  /// Get one record through the cache
  Get {
    #[command(flatten)]
    repo: RepoArgs,
    /// Local primary key
    #[arg(long, conflicts_with = "cms_id", required_unless_present = "cms_id")]
    id: Option<i64>,
    /// Identifier in Directus
    #[arg(long)]
    cms_id: Option<String>,
  },

  /// Reconcile records from Directus into the cache
  Sync {
    #[command(flatten)]
    repo: RepoArgs,
    /// Only reconcile this item
    #[arg(long)]
    cms_id: Option<String>,
  },
}

#[derive(Args, Debug)]
struct RepoArgs {
  /// Local entity type, e.g. Article
  entity: String,
  /// Remote collection (default: lowercase plural of the entity type)
  #[arg(long)]
  collection: Option<String>,
  #[arg(long, value_delimiter = ',')]
  fields: Vec<String>,
  /// Field ordering local listings (default: sort)
  #[arg(long)]
  order_by: Option<String>,
  /// Keep insertion order
  #[arg(long, conflicts_with = "order_by")]
  no_order: bool,
  /// Bypass the cache; only honored when enable_force_sync is on
  #[arg(long)]
  force_new: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let cli = Cli::parse();
  let _guard = init_tracing(cli.log_file.as_deref())?;

  match cli.command {
    Command::InitConfig { path, force } => init_config(path, force),
    command => {
      let config = Config::load(cli.config.as_deref())?;
      run(command, config).await
    }
  }
}

async fn run(command: Command, config: Config) -> Result<()> {
  let client = DirectusClient::connect(&config.directus)?;

  match command {
    Command::InitConfig { path, force } => init_config(path, force)?,

    Command::Items {
      collection,
      id,
      fields,
      filters,
      params,
    } => {
      let mut query = client.items(collection);
      if !fields.is_empty() {
        query = query.fields(fields);
      }
      for (field, operator, value) in filters {
        query = query.filter(field, operator, value);
      }
      for (key, value) in params {
        query = query.add_query_parameter(key, value);
      }

      match id {
        Some(id) => print_json(&query.find(&id).await?)?,
        None => print_json(&query.get().await?)?,
      }
    }

    Command::Asset { id, out, meta } => {
      let assets = client.assets();
      if meta {
        print_json(&assets.find(&id).await?)?;
      } else {
        let disk = LocalDisk::new(config.storage.assets_root()?);
        let path = assets.download(&id, &disk, out.as_deref()).await?;
        println!("{}", path.display());
      }
    }

    Command::List(args) => {
      let cache = repository(&config, client, &args)?;
      print_json(&cache.get_list().await?)?;
    }

    Command::Get { repo, id, cms_id } => {
      let cache = repository(&config, client, &repo)?;
      let record = match (id, cms_id) {
        (Some(id), _) => cache.get(id).await?,
        (None, Some(cms_id)) => cache.get_by_cms_id(&cms_id).await?,
        (None, None) => return Err(eyre!("Either --id or --cms-id is required")),
      };
      print_json(&record)?;
    }

    Command::Sync { repo, cms_id } => {
      let cache = repository(&config, client, &repo)?;
      let records = cache.fetch_from_remote(cms_id.as_deref()).await?;
      println!(
        "Reconciled {} {} record(s) from '{}'",
        records.len(),
        cache.context().entity_type(),
        cache.context().collection_name()
      );
    }
  }

  Ok(())
}

fn repository(config: &Config, client: DirectusClient, args: &RepoArgs) -> Result<Repository<Document>> {
  let store = Arc::new(SqliteStore::open(&config.storage.database_path()?)?);
  store.register(&args.entity)?;

  if args.force_new && !config.directus.enable_force_sync {
    warn!("--force-new ignored: enable_force_sync is off");
  }

  let order_by = if args.no_order {
    None
  } else {
    Some(
      args
        .order_by
        .clone()
        .unwrap_or_else(|| DEFAULT_ORDER_BY.to_string()),
    )
  };

  let options = ContextOptions {
    fields: args.fields.clone(),
    collection_name: args.collection.clone(),
    order_by,
  };
  let context = ContextFactory::from_config(&config.directus).create(&args.entity, options, || args.force_new);

  Ok(Repository::new(context, client, store)?)
}

fn init_config(path: Option<PathBuf>, force: bool) -> Result<()> {
  let path = path
    .or_else(Config::default_path)
    .ok_or_else(|| eyre!("Could not determine config directory; pass --path"))?;

  if path.exists() && !force {
    return Err(eyre!(
      "{} already exists; pass --force to overwrite",
      path.display()
    ));
  }

  if let Some(parent) = path.parent() {
    std::fs::create_dir_all(parent)
      .map_err(|e| eyre!("Failed to create config directory: {}", e))?;
  }
  std::fs::write(&path, EXAMPLE_CONFIG)
    .map_err(|e| eyre!("Failed to write {}: {}", path.display(), e))?;

  println!("Wrote {}", path.display());
  Ok(())
}

fn init_tracing(log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
  let filter =
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("directus_cache=info"));

  match log_file {
    Some(path) => {
      let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
      let file_name = path
        .file_name()
        .ok_or_else(|| eyre!("Invalid log file path: {}", path.display()))?;

      let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));
      tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();
      Ok(Some(guard))
    }
    None => {
      tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
      Ok(None)
    }
  }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}

fn parse_filter(raw: &str) -> Result<(String, String, Value), String> {
  let mut parts = raw.splitn(3, ':');
  match (parts.next(), parts.next(), parts.next()) {
    (Some(field), Some(operator), Some(value)) if !field.is_empty() && !operator.is_empty() => {
      let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
      Ok((field.to_string(), operator.to_string(), value))
    }
    _ => Err(format!("expected field:operator:value, got '{}'", raw)),
  }
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
  raw
    .split_once('=')
    .filter(|(key, _)| !key.is_empty())
    .map(|(key, value)| (key.to_string(), value.to_string()))
    .ok_or_else(|| format!("expected key=value, got '{}'", raw))
}
