//! End-to-end indexing and search against the mock provider, on every local store backend.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use sift_embed::EmbeddingProvider;
use sift_embed::mock::MockEmbedder;
use sift_index::config::Config;
use sift_index::{IndexError, SearchQuery, SemanticIndex};
use sift_store::{InMemoryVectorStore, SqliteVectorStore, VectorStore};
use tempfile::TempDir;

const PROJECT: &str = "proj";
const DIMS: usize = 64;

struct Backend {
    name: &'static str,
    store: Arc<dyn VectorStore>,
    _dir: Option<TempDir>,
}

async fn backends() -> Vec<Backend> {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.db");
    let sqlite = SqliteVectorStore::new(path.to_str().unwrap()).await.unwrap();
    vec![
        Backend {
            name: "memory",
            store: Arc::new(InMemoryVectorStore::new()),
            _dir: None,
        },
        Backend {
            name: "sqlite",
            store: Arc::new(sqlite),
            _dir: Some(dir),
        },
    ]
}

fn config() -> Config {
    let mut config = Config::default();
    config.embedding.model = "mock-embed".into();
    config.embedding.dimensions = DIMS;
    config
}

fn index(mock: &MockEmbedder, store: &Arc<dyn VectorStore>) -> SemanticIndex<MockEmbedder> {
    SemanticIndex::new(mock.clone(), Arc::clone(store), config())
        .unwrap()
        .with_default_project(PROJECT)
}

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

/// 15 lines of 100 characters each.
fn fifteen_hundred_chars() -> String {
    (0..15)
        .map(|i| format!("{i:0>4}{}\n", "x".repeat(95)))
        .collect()
}

#[tokio::test]
async fn small_file_is_one_chunk_large_file_is_two() {
    for backend in backends().await {
        let dir = tempfile::tempdir().unwrap();
        let file_a = format!("{}\n", "a".repeat(499));
        let file_b = fifteen_hundred_chars();
        assert_eq!(file_a.chars().count(), 500);
        assert_eq!(file_b.chars().count(), 1500);
        write(dir.path(), "file_a.rs", &file_a);
        write(dir.path(), "file_b.rs", &file_b);

        let mock = MockEmbedder::new(DIMS);
        let idx = index(&mock, &backend.store);
        let report = idx.initialize_project(PROJECT, dir.path()).await.unwrap();
        assert_eq!(report.files_indexed, 2, "{}", backend.name);
        assert_eq!(report.chunks_stored, 3, "{}", backend.name);

        let anything = mock.embed("anything").await.unwrap();
        let all = backend
            .store
            .search(&config().collection_name(PROJECT), anything, 100, -1.0)
            .await
            .unwrap();
        assert_eq!(all.len(), 3, "{}", backend.name);

        let a: Vec<_> = all.iter().filter(|s| s.chunk.file_path == "file_a.rs").collect();
        assert_eq!(a.len(), 1);
        assert!(a[0].chunk.is_full_file);

        let mut b: Vec<_> = all.iter().filter(|s| s.chunk.file_path == "file_b.rs").collect();
        b.sort_by_key(|s| s.chunk.chunk_index);
        assert_eq!(b.len(), 2);
        assert_eq!(b[0].chunk.content, file_b[..1000]);
        assert_eq!(b[1].chunk.content, file_b[800..]);
        assert_eq!(b[1].chunk.start_line, 9);
        assert_eq!(b[1].chunk.end_line, 15);
    }
}

#[tokio::test]
async fn one_failing_file_is_skipped_without_error() {
    for backend in backends().await {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..10 {
            let body = if i == 4 {
                "fn broken() { EXPLODE }".to_string()
            } else {
                format!("fn handler_{i}() {{}}")
            };
            write(dir.path(), &format!("src/f{i}.rs"), &body);
        }

        let mock = MockEmbedder::new(DIMS).failing_on("EXPLODE");
        let idx = index(&mock, &backend.store);
        let report = idx.initialize_project(PROJECT, dir.path()).await.unwrap();

        assert_eq!(report.files_indexed, 9, "{}", backend.name);
        assert_eq!(report.files_skipped, 1, "{}", backend.name);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].starts_with("src/f4.rs:"));
        assert_eq!(idx.stats(PROJECT).await.unwrap().total_files, 9, "{}", backend.name);
    }
}

#[tokio::test]
async fn query_embedding_failure_is_an_error_not_an_empty_result() {
    for backend in backends().await {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "foo.rs", "fn foo() {}");
        let mock = MockEmbedder::new(DIMS);
        let idx = index(&mock, &backend.store);
        idx.initialize_project(PROJECT, dir.path()).await.unwrap();

        mock.set_failing(true);
        let err = idx.search(&SearchQuery::new("foo")).await.unwrap_err();
        assert!(matches!(err, IndexError::Embed(_)), "{}", backend.name);
    }
}

#[tokio::test]
async fn removed_file_is_no_longer_found() {
    for backend in backends().await {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "file_a.md", "alpha bravo charlie");
        write(dir.path(), "file_b.md", "zebra yankee xray");
        let mock = MockEmbedder::new(DIMS);
        let idx = index(&mock, &backend.store);
        idx.initialize_project(PROJECT, dir.path()).await.unwrap();

        let before = idx.search(&SearchQuery::new("zebra")).await.unwrap();
        assert_eq!(before.total_results, 1, "{}", backend.name);
        assert_eq!(before.results[0].chunk.file_path, "file_b.md");
        assert_eq!(before.results[0].highlights, ["zebra yankee xray"]);

        let removed = idx
            .remove_files(PROJECT, dir.path(), &[PathBuf::from("file_b.md")])
            .await
            .unwrap();
        assert_eq!(removed, 1);

        let after = idx.search(&SearchQuery::new("zebra")).await.unwrap();
        assert_eq!(after.total_results, 0, "{}", backend.name);
        assert!(after.results.is_empty());
        assert_eq!(after.stats.total_files, 1);
    }
}

#[tokio::test]
async fn reindexing_unchanged_files_does_not_duplicate() {
    for backend in backends().await {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.rs", &"fn repeated() {}\n".repeat(150));
        write(dir.path(), "b.rs", "fn b() {}");
        let mock = MockEmbedder::new(DIMS);
        let idx = index(&mock, &backend.store);

        idx.initialize_project(PROJECT, dir.path()).await.unwrap();
        let first = idx.stats(PROJECT).await.unwrap();
        let report = idx.initialize_project(PROJECT, dir.path()).await.unwrap();
        let second = idx.stats(PROJECT).await.unwrap();
        idx.update_files(PROJECT, dir.path(), &[PathBuf::from("a.rs")])
            .await
            .unwrap();
        let third = idx.stats(PROJECT).await.unwrap();

        assert_eq!(report.files_unchanged, 2, "{}", backend.name);
        assert_eq!(first.total_chunks, second.total_chunks, "{}", backend.name);
        assert_eq!(first.total_chunks, third.total_chunks, "{}", backend.name);
    }
}

#[tokio::test]
async fn removal_leaves_other_files_untouched() {
    for backend in backends().await {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "keep.rs", &"fn keep() {}\n".repeat(200));
        write(dir.path(), "drop.rs", "fn drop_me() {}");
        let mock = MockEmbedder::new(DIMS);
        let idx = index(&mock, &backend.store);
        idx.initialize_project(PROJECT, dir.path()).await.unwrap();
        let before = idx.stats(PROJECT).await.unwrap();

        idx.remove_files(PROJECT, dir.path(), &[PathBuf::from("drop.rs")])
            .await
            .unwrap();
        let after = idx.stats(PROJECT).await.unwrap();

        assert_eq!(after.total_chunks, before.total_chunks - 1, "{}", backend.name);
        assert_eq!(after.total_files, 1);
        let files = backend
            .store
            .indexed_files(&config().collection_name(PROJECT))
            .await
            .unwrap();
        assert_eq!(files, ["keep.rs"]);
    }
}

#[tokio::test]
async fn empty_index_search_is_not_an_error() {
    for backend in backends().await {
        let idx = index(&MockEmbedder::new(DIMS), &backend.store);
        let response = idx.search(&SearchQuery::new("anything")).await.unwrap();
        assert_eq!(response.total_results, 0, "{}", backend.name);
        assert!(response.results.is_empty());
        assert_eq!(response.stats.total_chunks, 0);
    }
}

#[tokio::test]
async fn results_respect_ranking_and_threshold() {
    for backend in backends().await {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "one.md", "cache eviction policy");
        write(dir.path(), "two.md", "cache warmup");
        write(dir.path(), "three.md", "unrelated gardening notes");
        let idx = index(&MockEmbedder::new(DIMS), &backend.store);
        idx.initialize_project(PROJECT, dir.path()).await.unwrap();

        let query = SearchQuery::new("cache eviction").with_min_similarity(0.3);
        let response = idx.search(&query).await.unwrap();
        assert!(response.total_results >= 1, "{}", backend.name);
        assert_eq!(response.results[0].chunk.file_path, "one.md");
        for pair in response.results.windows(2) {
            assert!(pair[0].similarity >= pair[1].similarity);
        }
        assert!(response.results.iter().all(|r| r.similarity >= 0.3));
        assert!(response.results.iter().all(|r| r.chunk.file_path != "three.md"));
    }
}

#[tokio::test]
async fn sqlite_index_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("persist.db");
    let project = dir.path().join("src");
    std::fs::create_dir_all(&project).unwrap();
    write(&project, "lib.rs", "fn persisted() {}");

    {
        let store: Arc<dyn VectorStore> =
            Arc::new(SqliteVectorStore::new(db.to_str().unwrap()).await.unwrap());
        let idx = index(&MockEmbedder::new(DIMS), &store);
        idx.initialize_project(PROJECT, &project).await.unwrap();
    }

    let store: Arc<dyn VectorStore> =
        Arc::new(SqliteVectorStore::new(db.to_str().unwrap()).await.unwrap());
    let mock = MockEmbedder::new(DIMS);
    let idx = index(&mock, &store);
    assert_eq!(idx.stats(PROJECT).await.unwrap().total_chunks, 1);

    let report = idx.initialize_project(PROJECT, &project).await.unwrap();
    assert_eq!(report.files_unchanged, 1);
    assert_eq!(mock.texts_embedded(), 0);
}

#[tokio::test]
async fn switching_models_is_rejected() {
    for backend in backends().await {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.rs", "fn a() {}");
        let idx = index(&MockEmbedder::new(DIMS), &backend.store);
        idx.initialize_project(PROJECT, dir.path()).await.unwrap();

        let mut other = config();
        other.embedding.model = "other-embed".into();
        let idx = SemanticIndex::new(
            MockEmbedder::new(DIMS).with_model("other-embed"),
            Arc::clone(&backend.store),
            other,
        )
        .unwrap();
        let err = idx
            .initialize_project(PROJECT, dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::Store(_)), "{}", backend.name);

        idx.clear_index(PROJECT).await.unwrap();
        idx.initialize_project(PROJECT, dir.path()).await.unwrap();
    }
}

#[tokio::test]
async fn partly_embedded_file_is_completed_once_the_provider_recovers() {
    for backend in backends().await {
        let dir = tempfile::tempdir().unwrap();
        let content = format!("{}fn FLAKY() {{}}\n", "let x = 1;\n".repeat(110));
        write(dir.path(), "a.rs", &content);

        let flaky = MockEmbedder::new(DIMS).failing_on("FLAKY");
        let report = index(&flaky, &backend.store)
            .initialize_project(PROJECT, dir.path())
            .await
            .unwrap();
        assert_eq!(report.chunks_stored, 1, "{}", backend.name);
        assert_eq!(report.chunks_skipped, 1, "{}", backend.name);

        let idx = index(&MockEmbedder::new(DIMS), &backend.store);
        let report = idx.initialize_project(PROJECT, dir.path()).await.unwrap();
        assert_eq!(report.files_unchanged, 0, "{}", backend.name);
        assert_eq!(report.files_indexed, 1, "{}", backend.name);
        assert_eq!(idx.stats(PROJECT).await.unwrap().total_chunks, 2, "{}", backend.name);

        let report = idx.initialize_project(PROJECT, dir.path()).await.unwrap();
        assert_eq!(report.files_unchanged, 1, "{}", backend.name);
    }
}
