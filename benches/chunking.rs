use criterion::{Criterion, criterion_group, criterion_main};
use ollama_rag::internal::split;
use std::hint::black_box;

fn sample_document() -> String {
    let paragraph = "Retrieval-augmented generation grounds a model's answer in text \
                     pulled from a document. The document is split into overlapping \
                     chunks, each chunk is embedded, and the closest chunks are placed \
                     in the prompt.\nShort lines like this one also appear.\n\n";
    paragraph.repeat(200)
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let document = sample_document();
    c.bench_function("split 400/50", |b| {
        b.iter(|| split(black_box(&document), black_box(400), black_box(50)))
    });
    c.bench_function("split 120/20", |b| {
        b.iter(|| split(black_box(&document), black_box(120), black_box(20)))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
