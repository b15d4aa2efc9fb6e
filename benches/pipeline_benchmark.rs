//! Benchmarks for unocr cleaning performance.
//!
//! Run with: cargo bench
//!
//! These benchmarks run the offline stages at various document sizes.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use unocr::{Chunker, CleaningConfiguration, ContentShield, Pipeline};

/// Creates a synthetic OCR'd book with the given number of chapters.
fn create_test_book(chapter_count: usize) -> String {
    let mut book = String::from("THE BENCHMARK BOOK\n\nby A. Writer\n\nCopyright © 2001\n\n");

    book.push_str("CONTENTS\n\n");
    for i in 1..=chapter_count {
        book.push_str(&format!("Chapter {} .......... {}\n", i, i * 10));
    }
    book.push('\n');

    for i in 1..=chapter_count {
        book.push_str(&format!("Chapter {}\n\n", i));
        for p in 0..20 {
            book.push_str(&format!(
                "Paragraph {} of chapter {} has a ﬁne line of text that wraps\n\
                 across two lines, mentions a source (Smith, 2001) and a note.¹\n\n",
                p, i
            ));
        }
        book.push_str(&format!("{}\n\n", i * 10));
    }

    book.push_str("INDEX\n\n");
    for c in b'a'..=b'z' {
        book.push_str(&format!("{}term, 12, 45, 98\n", c as char));
    }
    book
}

/// Benchmark character normalization.
fn bench_normalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("normalize");

    for chapters in [5, 50, 200].iter() {
        let book = create_test_book(*chapters);
        group.throughput(Throughput::Bytes(book.len() as u64));
        group.bench_with_input(BenchmarkId::new("chapters", chapters), &book, |b, book| {
            b.iter(|| unocr::normalize_text(black_box(book)));
        });
    }

    group.finish();
}

/// Benchmark the shared pattern-detection pass.
fn bench_detect(c: &mut Criterion) {
    let mut group = c.benchmark_group("detect_structure");
    let config = CleaningConfiguration::default();

    for chapters in [5, 50, 200].iter() {
        let book = create_test_book(*chapters);
        group.throughput(Throughput::Bytes(book.len() as u64));
        group.bench_with_input(BenchmarkId::new("chapters", chapters), &book, |b, book| {
            b.iter(|| unocr::detect_structure(black_box(book), &config));
        });
    }

    group.finish();
}

/// Benchmark chunking and shielding.
fn bench_chunk_and_shield(c: &mut Criterion) {
    let book = create_test_book(200);
    let chunker = Chunker::new(2500, 200);

    c.bench_function("chunk_200_chapters", |b| {
        b.iter(|| chunker.chunk(black_box(&book)));
    });

    c.bench_function("shield_200_chapters", |b| {
        b.iter(|| {
            let (shielded, shield) = ContentShield::extract(black_box(&book));
            shield.restore(&shielded)
        });
    });
}

/// Benchmark a full offline run.
fn bench_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("heuristic_pipeline");
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    let pipeline = Pipeline::offline();
    let config = CleaningConfiguration::heuristic_only();

    for chapters in [5, 50].iter() {
        let book = create_test_book(*chapters);
        group.throughput(Throughput::Bytes(book.len() as u64));
        group.bench_with_input(BenchmarkId::new("chapters", chapters), &book, |b, book| {
            b.iter(|| runtime.block_on(pipeline.run(black_box(book), &config)).unwrap());
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_normalize,
    bench_detect,
    bench_chunk_and_shield,
    bench_pipeline,
);
criterion_main!(benches);
