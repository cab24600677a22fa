use super::*;

#[test]
fn client_configuration() {
    let config = OllamaConfig {
        host: "test-host".to_string(),
        port: 1234,
        embedding_model: "test-model".to_string(),
        batch_size: 128,
        ..OllamaConfig::default()
    };
    let client = OllamaEmbedder::new(&config).expect("Failed to create client");

    assert_eq!(client.model(), "test-model");
    assert_eq!(client.model_name(), "test-model");
    assert_eq!(client.batch_size(), 128);
    assert_eq!(client.transport.base_url().host_str(), Some("test-host"));
    assert_eq!(client.transport.base_url().port(), Some(1234));
    assert_eq!(
        client.transport.retry_policy().max_attempts,
        config.embedding_retry_attempts
    );
}

#[test]
fn client_builder_methods() {
    let client = OllamaEmbedder::new(&OllamaConfig::default())
        .expect("Failed to create client")
        .with_timeout(Duration::from_secs(60))
        .with_retry(RetryPolicy::exponential(5));

    assert_eq!(client.transport.retry_policy().max_attempts, 5);
}

#[test]
fn invalid_url_is_config_error() {
    let config = OllamaConfig {
        host: "bad host name".to_string(),
        ..OllamaConfig::default()
    };

    assert!(matches!(
        OllamaEmbedder::new(&config),
        Err(RagError::InvalidConfig(_))
    ));
}

#[test]
fn empty_batch_makes_no_request() {
    // Port 9 (discard) would fail any real request
    let config = OllamaConfig {
        port: 9,
        ..OllamaConfig::default()
    };
    let client = OllamaEmbedder::new(&config).expect("Failed to create client");

    let embeddings = client.embed_batch(&[]).expect("empty batch should succeed");
    assert!(embeddings.is_empty());
}

#[test]
fn embed_request_serialization() {
    let inputs = vec!["first".to_string(), "second".to_string()];
    let request = EmbedRequest {
        model: "mxbai-embed-large",
        input: &inputs,
    };

    let json = serde_json::to_value(&request).expect("should serialize");
    assert_eq!(
        json,
        serde_json::json!({"model": "mxbai-embed-large", "input": ["first", "second"]})
    );
}
