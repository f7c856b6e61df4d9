use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;

use jpl::lexer::Lexer;

/// A synthetic program exercising every token class.
fn sample_program(commands: usize) -> String {
    let mut src = String::new();
    for i in 0..commands {
        src.push_str(&format!("let x{i} = [1, 2, 3][{}] * 4 + 2\n", i % 3));
        src.push_str(&format!(
            "show sum[i{i}: 10] to_float(i{i}) / 2.0 // comment {i}\n"
        ));
        src.push_str("assert 1 <= 2 && true, \"impossible\" /* block */\n");
    }
    src
}

fn bench_lexer(c: &mut Criterion) {
    let src = sample_program(200);
    c.bench_function("lex_sample_program", |b| {
        b.iter(|| {
            let count = Lexer::new(black_box(&src)).count();
            black_box(count)
        })
    });
}

criterion_group!(benches, bench_lexer);
criterion_main!(benches);
