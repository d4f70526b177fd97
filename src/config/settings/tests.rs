use super::*;
use serial_test::serial;
use tempfile::TempDir;

fn test_config() -> Config {
    Config::with_base_dir("/tmp/docs-rag-test")
}

#[test]
fn default_config() {
    let config = test_config();
    assert_eq!(config.ollama.protocol, "http");
    assert_eq!(config.ollama.host, "localhost");
    assert_eq!(config.ollama.port, 11434);
    assert_eq!(config.ollama.model, "nomic-embed-text:latest");
    assert_eq!(config.ollama.batch_size, 16);
    assert_eq!(config.generator.model, "llama3-8b-8192");
    assert_eq!(config.retrieval.default_k, 5);
    assert_eq!(config.retrieval.max_query_length, 5000);
    assert_eq!(config.index.rebuild_attempts, 3);
    assert_eq!(config.index.retry_delay_ms, 500);
    assert_eq!(config.chunking.chunk_size, 1000);
    assert_eq!(config.chunking.chunk_overlap, 200);
}

#[test]
fn config_validation() {
    let config = test_config();
    assert!(config.validate().is_ok());

    let mut invalid_config = config.clone();
    invalid_config.ollama.protocol = "ftp".to_string();
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.ollama.port = 0;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.ollama.model = String::new();
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.ollama.batch_size = 1001;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.generator.temperature = 3.5;
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::InvalidTemperature(_))
    ));

    let mut invalid_config = config.clone();
    invalid_config.generator.base_url = "not a url".to_string();
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::InvalidUrl(_))
    ));

    let mut invalid_config = config.clone();
    invalid_config.retrieval.default_k = 0;
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::InvalidDefaultK(0))
    ));

    let mut invalid_config = config.clone();
    invalid_config.retrieval.min_score = Some(1.5);
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config;
    invalid_config.index.rebuild_attempts = 0;
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::InvalidRebuildAttempts(0))
    ));
}

#[test]
fn chunk_overlap_must_be_smaller_than_chunk_size() {
    let mut config = test_config();
    config.chunking.chunk_size = 500;
    config.chunking.chunk_overlap = 500;

    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidChunkOverlap(500, 500))
    ));
}

#[test]
fn ollama_url_generation() {
    let config = test_config();
    let url = config
        .ollama_url()
        .expect("should generate ollama_url successfully");
    assert_eq!(url.as_str(), "http://localhost:11434/");
}

#[test]
fn derived_paths_follow_base_dir() {
    let mut config = test_config();
    assert_eq!(
        config.documents_path(),
        PathBuf::from("/tmp/docs-rag-test/documents")
    );
    assert_eq!(
        config.vector_database_path(),
        PathBuf::from("/tmp/docs-rag-test/vectors")
    );

    config.corpus.documents_dir = Some(PathBuf::from("/srv/corpus"));
    config.index.directory = Some(PathBuf::from("/srv/index"));
    assert_eq!(config.documents_path(), PathBuf::from("/srv/corpus"));
    assert_eq!(config.vector_database_path(), PathBuf::from("/srv/index"));
}

#[test]
fn retry_policy_from_index_config() {
    let config = test_config();
    let policy = config.index.retry_policy();
    assert_eq!(policy.max_attempts, 3);
    assert_eq!(policy.delay, Duration::from_millis(500));
}

#[test]
fn toml_serialization() {
    let config = test_config();
    let toml_str = toml::to_string(&config).expect("should serialize toml correctly");
    let mut parsed_config: Config = toml::from_str(&toml_str).expect("should parse toml correctly");
    parsed_config.base_dir = config.base_dir.clone();
    assert_eq!(config, parsed_config);
}

#[test]
fn partial_toml_uses_defaults() {
    let partial = r#"
        [generator]
        model = "mixtral-8x7b-32768"

        [retrieval]
        default_k = 3
    "#;

    let config: Config = toml::from_str(partial).expect("should parse partial toml");
    assert_eq!(config.generator.model, "mixtral-8x7b-32768");
    assert_eq!(config.generator.temperature, 0.1);
    assert_eq!(config.retrieval.default_k, 3);
    assert_eq!(config.retrieval.max_query_length, 5000);
    assert_eq!(config.ollama.port, 11434);
}

#[test]
fn setter_validation() {
    let mut config = OllamaConfig::default();

    assert!(config.set_protocol("https".to_string()).is_ok());
    assert!(config.set_host("example.com".to_string()).is_ok());
    assert!(config.set_port(8080).is_ok());
    assert!(config.set_model("new-model".to_string()).is_ok());
    assert!(config.set_batch_size(128).is_ok());

    assert!(config.set_protocol("ftp".to_string()).is_err());
    assert!(config.set_port(0).is_err());
    assert!(config.set_model(String::new()).is_err());
    assert!(config.set_batch_size(0).is_err());
    assert!(config.set_batch_size(1001).is_err());

    let mut generator = GeneratorConfig::default();
    assert!(generator.set_base_url("http://localhost:11434/v1".to_string()).is_ok());
    assert!(generator.set_base_url("nope".to_string()).is_err());
    assert!(generator.set_model("llama3-70b-8192".to_string()).is_ok());
    assert!(generator.set_model("  ".to_string()).is_err());
    assert!(generator.set_temperature(0.0).is_ok());
    assert!(generator.set_temperature(-0.1).is_err());
}

#[test]
fn load_missing_config_returns_defaults() {
    let temp_dir = TempDir::new().expect("should create temp dir");

    let config = Config::load(temp_dir.path()).expect("missing config should load defaults");

    assert_eq!(config.get_base_dir(), temp_dir.path());
    assert_eq!(config.ollama, OllamaConfig::default());
    assert_eq!(config.retrieval, RetrievalConfig::default());
}

#[test]
fn save_then_load_round_trip() {
    let temp_dir = TempDir::new().expect("should create temp dir");

    let mut config = Config::with_base_dir(temp_dir.path());
    config.retrieval.default_k = 8;
    config.index.retry_delay_ms = 0;
    config.save().expect("config should save");

    let loaded = Config::load(temp_dir.path()).expect("config should load");
    assert_eq!(loaded, config);
}

#[test]
fn load_rejects_invalid_values() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    fs::write(
        temp_dir.path().join("config.toml"),
        "[chunking]\nchunk_size = 200\nchunk_overlap = 400\n",
    )
    .expect("should write config");

    assert!(Config::load(temp_dir.path()).is_err());
}

#[test]
#[serial]
fn api_key_falls_back_to_environment() {
    let generator = GeneratorConfig::default();

    // SAFETY: serialized with every other test that touches the environment
    unsafe { std::env::set_var(API_KEY_ENV, "env-key") };
    assert_eq!(generator.resolved_api_key().as_deref(), Some("env-key"));

    let configured = GeneratorConfig {
        api_key: Some("file-key".to_string()),
        ..GeneratorConfig::default()
    };
    assert_eq!(configured.resolved_api_key().as_deref(), Some("file-key"));

    // SAFETY: see above
    unsafe { std::env::remove_var(API_KEY_ENV) };
    assert_eq!(generator.resolved_api_key(), None);
}

#[test]
#[serial]
fn blank_api_key_is_treated_as_missing() {
    // SAFETY: serialized with every other test that touches the environment
    unsafe { std::env::remove_var(API_KEY_ENV) };

    let generator = GeneratorConfig {
        api_key: Some("   ".to_string()),
        ..GeneratorConfig::default()
    };
    assert_eq!(generator.resolved_api_key(), None);
}
