#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// Integration tests that require a local Ollama instance
// Run with: cargo test --test integration_ollama -- --ignored

use docs_rag::config::{Config, OllamaConfig};
use docs_rag::embeddings::{Embedder, OllamaClient};
use std::env;
use std::time::Duration;
use tempfile::TempDir;
use tracing::{debug, info};

const TEST_MODEL: &str = "nomic-embed-text:latest";
const DEFAULT_OLLAMA_HOST: &str = "localhost";
const DEFAULT_OLLAMA_PORT: u16 = 11434;

fn create_integration_test_client(temp_dir: &TempDir) -> OllamaClient {
    let host = env::var("OLLAMA_HOST").unwrap_or_else(|_| DEFAULT_OLLAMA_HOST.to_string());
    let port = env::var("OLLAMA_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_OLLAMA_PORT);
    let model = env::var("OLLAMA_MODEL").unwrap_or_else(|_| TEST_MODEL.to_string());

    let mut config = Config::with_base_dir(temp_dir.path());
    config.ollama = OllamaConfig {
        host,
        port,
        model,
        batch_size: 5, // Smaller batch size for testing
        ..OllamaConfig::default()
    };

    OllamaClient::new(&config)
        .expect("Failed to create Ollama client")
        .with_timeout(Duration::from_secs(60)) // Longer timeout for embedding generation
        .with_retry_attempts(3)
}

fn init_test_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init()
        .ok(); // Ignore error if already initialized
}

#[test]
#[ignore = "requires a running Ollama server"]
fn real_ollama_health_check() {
    init_test_tracing();
    let temp_dir = TempDir::new().expect("should create temp dir");
    let client = create_integration_test_client(&temp_dir);

    info!("Testing health check against real Ollama instance");
    let result = client.health_check();

    assert!(
        result.is_ok(),
        "Health check should succeed with local Ollama: {:?}",
        result
    );
}

#[test]
#[ignore = "requires a running Ollama server"]
fn real_ollama_list_models() {
    init_test_tracing();
    let temp_dir = TempDir::new().expect("should create temp dir");
    let client = create_integration_test_client(&temp_dir);

    let models = client.list_models().expect("model listing should succeed");
    assert!(
        !models.is_empty(),
        "Should have at least one model available"
    );

    for model in &models {
        debug!("Available model: {} (size: {:?})", model.name, model.size);
    }
}

#[test]
#[ignore = "requires a running Ollama server"]
fn real_ollama_probe_pins_dimension() {
    init_test_tracing();
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut client = create_integration_test_client(&temp_dir);

    let dimension = client.probe().expect("probe should succeed");

    assert!(dimension > 0);
    assert_eq!(client.dimension(), Some(dimension));
    assert_eq!(
        client.identity(),
        format!("ollama/{}/{}", client.model(), dimension)
    );
    info!("Model {} has {} dimensions", client.model(), dimension);
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires a running Ollama server"]
async fn real_ollama_batch_embeddings_are_consistent() {
    init_test_tracing();
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut client = create_integration_test_client(&temp_dir);
    let dimension = client.probe().expect("probe should succeed");

    // More texts than the batch size, so several requests are made
    let texts: Vec<String> = (0..12)
        .map(|i| format!("Paragraph {} about vector search and document retrieval.", i))
        .collect();

    let vectors = client
        .embed_documents(&texts)
        .await
        .expect("batch embedding should succeed");

    assert_eq!(vectors.len(), texts.len());
    assert!(vectors.iter().all(|v| v.len() == dimension));

    let query = client
        .embed_query("vector search")
        .await
        .expect("query embedding should succeed");
    assert_eq!(query.len(), dimension);
}
