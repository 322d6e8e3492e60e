use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
#[cfg(feature = "mock")]
use sift_embed::mock::MockEmbedder;
use sift_embed::EmbeddingProvider;
use sift_embed::any::AnyEmbedder;
use sift_embed::ollama::OllamaEmbedder;
use sift_embed::openai::OpenAiEmbedder;
use sift_index::config::{Config, ProviderKind, StoreBackend};
use sift_index::{SearchQuery, SemanticIndex};
use sift_store::{
    ChunkKind, InMemoryVectorStore, QdrantVectorStore, Significance, SqliteVectorStore,
    VectorStore,
};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Parser)]
#[command(name = "sift", version, about = "Semantic search over source trees")]
struct Cli {
    /// Config file; falls back to `SIFT_CONFIG`, then `config/default.toml`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Project (store collection) to operate on.
    #[arg(long, global = true, default_value = sift_index::engine::DEFAULT_PROJECT)]
    project: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Index every supported file under a directory.
    Index {
        root: PathBuf,
        /// Keep running and re-index files as they change.
        #[arg(long)]
        watch: bool,
    },
    /// Re-index specific files.
    Update {
        root: PathBuf,
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Drop specific files from the index.
    Remove {
        root: PathBuf,
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    Search {
        text: String,
        #[arg(long)]
        max_results: Option<usize>,
        #[arg(long)]
        min_similarity: Option<f32>,
        #[arg(long)]
        language: Option<String>,
        #[arg(long)]
        kind: Option<ChunkKind>,
        /// Only files whose path contains this fragment.
        #[arg(long)]
        path: Option<String>,
        #[arg(long)]
        min_significance: Option<Significance>,
    },
    Stats,
    /// Delete everything stored for the project.
    Clear,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_subscriber();

    let config_path = resolve_config_path(cli.config.as_deref());
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    tracing::debug!(path = %config_path.display(), "configuration loaded");

    let embedder = create_embedder(&config)?;
    let store = create_store(&config).await?;
    tracing::info!(
        provider = embedder.name(),
        model = %config.embedding.model,
        backend = %config.store.backend,
        "semantic index ready"
    );
    let index = SemanticIndex::new(embedder, store, config)?.with_default_project(&cli.project);

    let cancel = CancellationToken::new();
    let signal = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("failed to listen for ctrl-c: {e}");
            return;
        }
        tracing::info!("received shutdown signal");
        signal.cancel();
    });

    match cli.command {
        Command::Index { root, watch } => {
            let report = index
                .initialize_project_with_cancel(&cli.project, &root, &cancel)
                .await
                .with_context(|| format!("failed to index {}", root.display()))?;
            print_json(&report)?;
            if watch && !report.cancelled {
                let _watcher = index.watch(&cli.project, &root)?;
                tracing::info!(root = %root.display(), "watching for changes, ctrl-c to stop");
                cancel.cancelled().await;
            }
        }
        Command::Update { root, paths } => {
            let report = index.update_files(&cli.project, &root, &paths).await?;
            print_json(&report)?;
        }
        Command::Remove { root, paths } => {
            let removed = index.remove_files(&cli.project, &root, &paths).await?;
            print_json(&serde_json::json!({ "chunks_removed": removed }))?;
        }
        Command::Search {
            text,
            max_results,
            min_similarity,
            language,
            kind,
            path,
            min_significance,
        } => {
            let mut query = SearchQuery::new(text).in_project(&cli.project);
            if let Some(n) = max_results {
                query = query.with_max_results(n);
            }
            if let Some(threshold) = min_similarity {
                query = query.with_min_similarity(threshold);
            }
            if let Some(language) = language {
                query = query.with_language(language);
            }
            if let Some(kind) = kind {
                query = query.with_kind(kind);
            }
            if let Some(fragment) = path {
                query = query.with_path_containing(fragment);
            }
            if let Some(significance) = min_significance {
                query = query.with_min_significance(significance);
            }
            let response = index.search(&query).await?;
            print_json(&response)?;
        }
        Command::Stats => {
            let stats = index.stats(&cli.project).await?;
            print_json(&serde_json::json!({
                "project": cli.project,
                "index": stats,
                "cache": index.cache_stats(),
            }))?;
        }
        Command::Clear => {
            index.clear_index(&cli.project).await?;
            tracing::info!(project = %cli.project, "index cleared");
        }
    }

    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn create_embedder(config: &Config) -> anyhow::Result<AnyEmbedder> {
    let cfg = &config.embedding;
    match cfg.provider {
        ProviderKind::Ollama => Ok(OllamaEmbedder::new(
            &cfg.base_url,
            cfg.model.clone(),
            cfg.dimensions,
        )
        .into()),
        ProviderKind::OpenAi => {
            let api_key = cfg
                .api_key
                .clone()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok())
                .context("openai provider requires embedding.api_key or OPENAI_API_KEY")?;
            Ok(OpenAiEmbedder::new(
                &cfg.base_url,
                api_key,
                cfg.model.clone(),
                cfg.dimensions,
                config.embedding_timeout(),
            )
            .with_max_retries(cfg.max_retries)
            .into())
        }
        #[cfg(feature = "mock")]
        ProviderKind::Mock => Ok(MockEmbedder::new(cfg.dimensions)
            .with_model(cfg.model.clone())
            .into()),
        #[cfg(not(feature = "mock"))]
        ProviderKind::Mock => bail!("mock provider requires a build with the `mock` feature"),
    }
}

async fn create_store(config: &Config) -> anyhow::Result<Arc<dyn VectorStore>> {
    let cfg = &config.store;
    let store: Arc<dyn VectorStore> = match cfg.backend {
        StoreBackend::Memory => Arc::new(InMemoryVectorStore::new()),
        StoreBackend::Sqlite => {
            let path = Path::new(&cfg.sqlite_path);
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            let Some(path) = path.to_str() else {
                bail!("store.sqlite_path is not valid UTF-8");
            };
            Arc::new(
                SqliteVectorStore::new(path)
                    .await
                    .with_context(|| format!("failed to open {path}"))?,
            )
        }
        StoreBackend::Qdrant => Arc::new(
            QdrantVectorStore::new(&cfg.qdrant_url)
                .with_context(|| format!("failed to connect to qdrant at {}", cfg.qdrant_url))?,
        ),
    };
    Ok(store)
}

fn resolve_config_path(flag: Option<&Path>) -> PathBuf {
    if let Some(path) = flag {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var("SIFT_CONFIG") {
        return PathBuf::from(path);
    }
    PathBuf::from("config/default.toml")
}

fn init_subscriber() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> Config {
        Config::load(Path::new("/nonexistent/sift.toml")).unwrap()
    }

    #[test]
    fn cli_parses_search_filters() {
        let cli = Cli::try_parse_from([
            "sift",
            "--project",
            "web",
            "search",
            "login handler",
            "--kind",
            "function",
            "--min-significance",
            "high",
            "--max-results",
            "3",
        ])
        .unwrap();
        assert_eq!(cli.project, "web");
        match cli.command {
            Command::Search {
                text,
                kind,
                min_significance,
                max_results,
                ..
            } => {
                assert_eq!(text, "login handler");
                assert_eq!(kind, Some(ChunkKind::Function));
                assert_eq!(min_significance, Some(Significance::High));
                assert_eq!(max_results, Some(3));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn cli_requires_paths_for_update() {
        assert!(Cli::try_parse_from(["sift", "update", "."]).is_err());
    }

    #[test]
    fn config_flag_wins() {
        let path = resolve_config_path(Some(Path::new("/tmp/custom.toml")));
        assert_eq!(path, PathBuf::from("/tmp/custom.toml"));
    }

    #[test]
    fn create_embedder_ollama_by_default() {
        let embedder = create_embedder(&defaults()).unwrap();
        assert!(matches!(embedder, AnyEmbedder::Ollama(_)));
        assert_eq!(embedder.model(), "nomic-embed-text");
        assert_eq!(embedder.dimensions(), 768);
    }

    #[test]
    fn create_embedder_openai_with_key() {
        let mut config = defaults();
        config.embedding.provider = ProviderKind::OpenAi;
        config.embedding.api_key = Some("sk-test".into());
        config.embedding.model = "text-embedding-3-small".into();
        config.embedding.dimensions = 1536;
        let embedder = create_embedder(&config).unwrap();
        assert!(matches!(embedder, AnyEmbedder::OpenAi(_)));
        assert_eq!(embedder.dimensions(), 1536);
    }

    #[tokio::test]
    async fn create_store_sqlite_creates_parent_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = defaults();
        config.store.backend = StoreBackend::Sqlite;
        config.store.sqlite_path = dir
            .path()
            .join("nested/index.db")
            .to_string_lossy()
            .into_owned();
        let store = create_store(&config).await.unwrap();
        assert_eq!(store.stats("sift_default").await.unwrap().total_vectors, 0);
        assert!(dir.path().join("nested").is_dir());
    }
}
