// Configuration management module
// TOML settings for the embedding endpoint, generator, corpus, retrieval and index

pub mod interactive;
pub mod settings;


pub use interactive::{run_interactive_config, show_config};
pub use settings::{
    API_KEY_ENV, Config, ConfigError, CorpusConfig, GeneratorConfig, IndexConfig, OllamaConfig,
    RetrievalConfig,
};
