use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use qregex::{MatchFlags, Pattern};

fn bench_compile(c: &mut Criterion) {
    c.bench_function("compile simple", |b| {
        b.iter(|| Pattern::compile(black_box(r"a(.)c")).unwrap())
    });
    c.bench_function("compile class-heavy", |b| {
        b.iter(|| Pattern::compile(black_box(r"[a-z0-9_-[aeiou]]+@[a-z.]+")).unwrap())
    });
}

fn bench_match(c: &mut Criterion) {
    let word = Pattern::compile(r"[a-zA-Z]+").unwrap();
    let subject = b"the quick brown fox jumps over the lazy dog";
    c.bench_function("match word search", |b| {
        b.iter(|| word.exec(black_box(subject), MatchFlags::empty()).unwrap())
    });

    let quantified = Pattern::compile(r"a(..)+z").unwrap();
    let long_subject = "bc".repeat(50) + "z";
    let long_subject = format!("a{long_subject}");
    c.bench_function("match bounded repetition", |b| {
        b.iter(|| {
            quantified
                .exec(black_box(long_subject.as_bytes()), MatchFlags::empty())
                .unwrap()
        })
    });
}

criterion_group!(benches, bench_compile, bench_match);
criterion_main!(benches);
