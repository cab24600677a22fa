use super::*;

fn generator() -> OllamaGenerator {
    OllamaGenerator::new(&OllamaConfig::default(), &GenerationConfig::default())
        .expect("Failed to create generator")
}

#[test]
fn generator_configuration() {
    let ollama = OllamaConfig {
        host: "chat-host".to_string(),
        chat_model: "llama3".to_string(),
        ..OllamaConfig::default()
    };
    let generation = GenerationConfig {
        temperature: 0.9,
        retry_attempts: 3,
    };

    let client = OllamaGenerator::new(&ollama, &generation).expect("Failed to create generator");

    assert_eq!(client.model(), "llama3");
    assert!((client.temperature() - 0.9).abs() < f32::EPSILON);
    assert_eq!(client.transport.base_url().host_str(), Some("chat-host"));
    assert_eq!(client.transport.retry_policy().max_attempts, 3);
}

#[test]
fn no_retry_by_default() {
    assert_eq!(generator().transport.retry_policy().max_attempts, 1);
}

#[test]
fn builder_methods() {
    let client = generator()
        .with_timeout(Duration::from_secs(5))
        .with_retry(RetryPolicy::exponential(4));

    assert_eq!(client.transport.retry_policy().max_attempts, 4);
}

#[test]
fn invalid_url_is_config_error() {
    let ollama = OllamaConfig {
        host: "bad host name".to_string(),
        ..OllamaConfig::default()
    };

    assert!(matches!(
        OllamaGenerator::new(&ollama, &GenerationConfig::default()),
        Err(RagError::InvalidConfig(_))
    ));
}

#[test]
fn text_request_body() {
    let client = generator();
    let request = GenerationRequest::new("Why is the sky blue?");

    let json = serde_json::to_value(client.chat_request(&request)).expect("should serialize");

    assert_eq!(
        json,
        serde_json::json!({
            "model": client.model(),
            "messages": [{"role": "user", "content": "Why is the sky blue?"}],
            "stream": false,
            "options": {"temperature": client.temperature()}
        })
    );
}

#[test]
fn json_request_body_overrides_temperature() {
    let client = generator();
    let request = GenerationRequest::new("{}")
        .with_temperature(0.0)
        .with_format(ResponseFormat::Json);

    let json = serde_json::to_value(client.chat_request(&request)).expect("should serialize");

    assert_eq!(json["format"], "json");
    assert_eq!(json["options"]["temperature"], 0.0);
}

#[test]
fn unreachable_server_is_generation_error() {
    let ollama = OllamaConfig {
        port: 9,
        timeout_seconds: 2,
        ..OllamaConfig::default()
    };
    let client = OllamaGenerator::new(&ollama, &GenerationConfig::default())
        .expect("Failed to create generator");

    let error = client.generate("hello").expect_err("should fail");

    assert_eq!(error.kind(), "GenerationServiceError");
}
