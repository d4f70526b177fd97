use super::*;

#[test]
fn io_errors_convert() {
    let error: RagError = std::io::Error::from(std::io::ErrorKind::PermissionDenied).into();

    assert!(matches!(error, RagError::Io(_)));
    assert!(error.to_string().starts_with("IO error: "));
}

#[test]
fn anyhow_errors_keep_their_message() {
    let error: RagError = anyhow::anyhow!("model not found").into();

    assert_eq!(error.to_string(), "Other error: model not found");
}

#[test]
fn component_errors_name_their_component() {
    assert_eq!(
        RagError::Generation("GROQ_API_KEY not configured".to_string()).to_string(),
        "Generation error: GROQ_API_KEY not configured"
    );
    assert_eq!(
        RagError::Index("No chunks provided for vector store".to_string()).to_string(),
        "Index error: No chunks provided for vector store"
    );
}
