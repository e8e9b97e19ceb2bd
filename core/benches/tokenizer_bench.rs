use criterion::{criterion_group, criterion_main, Criterion};
use resonant_core::{EngineConfig, Index, SearchOptions};

const TEXT: &str = "Prime numbers are the atoms of arithmetic. Every token in the corpus \
is assigned its own prime, and documents become sparse vectors over those primes. \
Resonance between a query and a document is the overlap of their vectors, while \
entropy measures how spread out the words of a document are.";

fn bench_tokenize(c: &mut Criterion) {
    let index = Index::new(EngineConfig::default());
    c.bench_function("tokenize_paragraph", |b| b.iter(|| index.tokenizer().tokenize(TEXT)));
}

fn bench_search(c: &mut Criterion) {
    let index = Index::new(EngineConfig::default());
    for i in 0..500 {
        let body = format!("{TEXT} document number {i}");
        index.add_document(&format!("doc {i}"), &format!("mem://{i}"), &body).ok();
    }
    let options = SearchOptions { apply_feedback: false, ..SearchOptions::default() };
    c.bench_function("search_500_docs", |b| b.iter(|| index.search("prime resonance entropy", 10, &options)));
}

criterion_group!(benches, bench_tokenize, bench_search);
criterion_main!(benches);
