use super::*;

fn assert_chunk_invariants(text: &str, chunks: &[Chunk], chunk_size: usize, overlap: usize) {
    let chars: Vec<char> = text.chars().collect();

    for (i, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.id, i);
        assert!(
            chunk.char_len() <= chunk_size,
            "chunk {} has {} characters, limit {}",
            i,
            chunk.char_len(),
            chunk_size
        );
        let expected: String = chars[chunk.source_offset..chunk.source_offset + chunk.char_len()]
            .iter()
            .collect();
        assert_eq!(chunk.text, expected, "chunk {i} does not match its source span");
    }

    for pair in chunks.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        assert_eq!(
            next.source_offset,
            prev.source_offset + prev.char_len() - overlap,
            "chunk {} should start {} characters before the end of chunk {}",
            next.id,
            overlap,
            prev.id
        );

        let tail: String = prev.text.chars().skip(prev.char_len() - overlap).collect();
        assert!(next.text.starts_with(&tail));
    }

    if let Some(last) = chunks.last() {
        assert_eq!(last.source_offset + last.char_len(), chars.len());
    }
}

#[test]
fn rejects_zero_chunk_size() {
    let error = split("text", 0, 0).expect_err("zero chunk size should fail");
    assert!(matches!(error, RagError::InvalidConfig(_)));
}

#[test]
fn rejects_overlap_not_smaller_than_chunk_size() {
    assert!(matches!(
        split("text", 10, 10),
        Err(RagError::InvalidConfig(_))
    ));
    assert!(matches!(
        split("text", 10, 25),
        Err(RagError::InvalidConfig(_))
    ));
}

#[test]
fn empty_text_has_no_chunks() {
    let chunks = split("", 30, 5).expect("split should succeed");
    assert!(chunks.is_empty());
}

#[test]
fn short_text_is_single_chunk() {
    let chunks = split("Small document.", 100, 10).expect("split should succeed");

    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].text, "Small document.");
    assert_eq!(chunks[0].source_offset, 0);
}

#[test]
fn hard_cut_without_boundaries() {
    let text = "abcdefghijklmnopqrstuvwxyz";
    let chunks = split(text, 10, 2).expect("split should succeed");

    let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
    assert_eq!(texts, vec!["abcdefghij", "ijklmnopqr", "qrstuvwxyz"]);
    assert_chunk_invariants(text, &chunks, 10, 2);
}

#[test]
fn prefers_paragraph_break() {
    let text = "aaaa bbbb\n\ncccc dddd eeee";
    let chunks = split(text, 15, 0).expect("split should succeed");

    assert_eq!(chunks[0].text, "aaaa bbbb\n\n");
    assert_chunk_invariants(text, &chunks, 15, 0);
}

#[test]
fn prefers_sentence_end_over_later_whitespace() {
    let text = "Hi. One two three four";
    let chunks = split(text, 12, 0).expect("split should succeed");

    assert_eq!(chunks[0].text, "Hi. ");
    assert_chunk_invariants(text, &chunks, 12, 0);
}

#[test]
fn falls_back_to_whitespace() {
    let text = "alpha beta gamma delta epsilon";
    let chunks = split(text, 12, 0).expect("split should succeed");

    assert_eq!(chunks[0].text, "alpha beta ");
    assert_chunk_invariants(text, &chunks, 12, 0);
}

#[test]
fn ignores_boundaries_inside_overlap_window() {
    // The only whitespace sits within the overlap, so the splitter must hard cut
    let text = "a bcdefghijklmnopqrstuvwxyz";
    let chunks = split(text, 8, 3).expect("split should succeed");

    assert_eq!(chunks[0].text, "a bcdefg");
    assert_chunk_invariants(text, &chunks, 8, 3);
}

#[test]
fn capitals_scenario_chunks() {
    let text = "Paris is the capital of France. Tokyo is the capital of Japan.";
    let chunks = split(text, 30, 5).expect("split should succeed");

    let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
    assert_eq!(
        texts,
        vec![
            "Paris is the capital of ",
            "l of France. ",
            "nce. Tokyo is the capital of ",
            "l of Japan.",
        ]
    );
    assert_chunk_invariants(text, &chunks, 30, 5);
}

#[test]
fn counts_characters_not_bytes() {
    let text = "héllo wörld ñandú çà et là über straße";
    let chunks = split(text, 10, 3).expect("split should succeed");

    assert!(chunks.len() > 1);
    assert_chunk_invariants(text, &chunks, 10, 3);
}

#[test]
fn invariants_hold_across_parameters() {
    let text = "Retrieval-Augmented Generation combines search with generation.\n\n\
                It retrieves relevant passages first! Then a model answers using them.\n\
                Why is this useful? Answers stay grounded in the source material. \
                Hallucinations become rarer, and citations become possible.";

    for chunk_size in [1, 7, 16, 40, 97, 500] {
        for overlap in [0, 1, 3, 6, 15, 39] {
            if overlap >= chunk_size {
                continue;
            }
            let chunks = split(text, chunk_size, overlap).expect("split should succeed");
            assert!(!chunks.is_empty());
            assert_chunk_invariants(text, &chunks, chunk_size, overlap);
        }
    }
}
