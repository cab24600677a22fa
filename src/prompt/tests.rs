use super::*;

fn chunk(id: usize, text: &str) -> Chunk {
    Chunk {
        id,
        text: text.to_string(),
        source_offset: 0,
    }
}

#[test]
fn parse_lists_variables_in_order() {
    let template =
        PromptTemplate::parse("Tell me a {adjective} joke about {content}. Make it {adjective}.")
            .expect("should parse");

    assert_eq!(template.variables(), vec!["adjective", "content"]);
}

#[test]
fn render_substitutes_values() {
    let template = PromptTemplate::parse("Tell me a {adjective} joke about {content}.")
        .expect("should parse");

    let rendered = template
        .render(&[("adjective", "funny"), ("content", "chickens"), ("unused", "x")])
        .expect("should render");

    assert_eq!(rendered, "Tell me a funny joke about chickens.");
}

#[test]
fn escaped_braces_are_literal() {
    let template = PromptTemplate::parse("Return {{\"answer\": {value}}}").expect("should parse");

    assert_eq!(template.variables(), vec!["value"]);
    assert_eq!(
        template.render(&[("value", "42")]).expect("should render"),
        "Return {\"answer\": 42}"
    );
}

#[test]
fn values_are_not_reparsed() {
    let template = PromptTemplate::parse("Q: {question}").expect("should parse");

    let rendered = template
        .render(&[("question", "what is {context}?")])
        .expect("should render");

    assert_eq!(rendered, "Q: what is {context}?");
}

#[test]
fn missing_value_is_invalid_config() {
    let template = PromptTemplate::parse("{a} and {b}").expect("should parse");

    let error = template.render(&[("a", "1")]).expect_err("should fail");

    assert!(matches!(error, RagError::InvalidConfig(ref msg) if msg.contains("'b'")));
}

#[test]
fn malformed_templates_are_rejected() {
    for template in ["unclosed {name", "stray } brace", "empty {} name", "bad {two words}"] {
        assert!(
            matches!(
                PromptTemplate::parse(template),
                Err(RagError::InvalidConfig(_))
            ),
            "{template:?} should be rejected"
        );
    }
}

#[test]
fn partial_fills_some_variables() {
    let template = PromptTemplate::parse("{greeting}, {name}!").expect("should parse");

    let partial = template.partial(&[("greeting", "Hello")]);

    assert_eq!(partial.variables(), vec!["name"]);
    assert_eq!(
        partial,
        PromptTemplate::parse("Hello, {name}!").expect("should parse")
    );
    assert_eq!(
        partial.render(&[("name", "Ada")]).expect("should render"),
        "Hello, Ada!"
    );
}

#[test]
fn default_assembler_matches_rag_template() {
    let parsed = PromptTemplate::parse(RAG_TEMPLATE).expect("should parse");

    assert_eq!(PromptAssembler::default().template(), &parsed);
}

#[test]
fn assemble_orders_context_and_question() {
    let assembler = PromptAssembler::default();
    let first = chunk(3, "Tokyo is the capital of Japan.\n\n");
    let second = chunk(0, "Paris is the capital of France.");

    let prompt = assembler.assemble([&first, &second], "What is the capital of Japan?");

    let expected_context =
        "Context:\nTokyo is the capital of Japan.\n\nParis is the capital of France.\n\nQuestion:\n";
    assert!(prompt.contains(expected_context));
    assert!(prompt.ends_with("What is the capital of Japan?\n"));
    assert!(prompt.contains(UNKNOWN_ANSWER));
    assert!(prompt.find("Tokyo") < prompt.find("Paris"));
}

#[test]
fn assemble_with_no_chunks() {
    let prompt = PromptAssembler::default().assemble([], "Anything?");

    assert!(prompt.contains("Context:\n\n\nQuestion:\nAnything?"));
}

#[test]
fn custom_template_requires_both_placeholders() {
    assert!(PromptAssembler::with_template("Only {question}").is_err());
    assert!(PromptAssembler::with_template("{context} {question} {extra}").is_err());

    let assembler = PromptAssembler::with_template("Q={question}; C={context}")
        .expect("should accept template");
    let c = chunk(0, "fact");
    assert_eq!(assembler.assemble([&c], "why"), "Q=why; C=fact");
}
