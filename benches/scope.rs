use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tracescope::trace::{CurrentTraceContext, SpanId, TraceContext, TraceId};

fn criterion_benchmark(c: &mut Criterion) {
    benchmark_group(c, BenchmarkParameter::NoActiveContext);
    benchmark_group(c, BenchmarkParameter::WithActiveContext);
}

fn benchmark_group(c: &mut Criterion, p: BenchmarkParameter) {
    let current = CurrentTraceContext::new();
    let context = TraceContext::builder()
        .trace_id(TraceId::from(0x4bf9_2f35_77b3_4da6u128))
        .span_id(SpanId::from(0x00f0_67aa_0ba9_02b7u64))
        .sampled(true)
        .build()
        .unwrap();

    let _guard = match p {
        BenchmarkParameter::NoActiveContext => None,
        BenchmarkParameter::WithActiveContext => Some(current.new_scope(Some(context.clone()))),
    };

    let mut group = c.benchmark_group("scope");

    group.bench_function(BenchmarkId::new("get", p), |b| {
        b.iter(|| {
            black_box(current.get());
        })
    });

    group.bench_function(BenchmarkId::new("new_scope + close", p), |b| {
        b.iter(|| {
            let scope = current.new_scope(Some(black_box(context.clone())));
            scope.close();
        })
    });

    group.bench_function(BenchmarkId::new("maybe_scope same context", p), |b| {
        let inner = current.new_scope(Some(context.clone()));
        b.iter(|| {
            let scope = current.maybe_scope(Some(black_box(context.clone())));
            scope.close();
        });
        inner.close();
    });

    group.finish();
}

#[derive(Copy, Clone)]
enum BenchmarkParameter {
    NoActiveContext,
    WithActiveContext,
}

impl std::fmt::Display for BenchmarkParameter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BenchmarkParameter::NoActiveContext => write!(f, "no-active-context"),
            BenchmarkParameter::WithActiveContext => write!(f, "with-active-context"),
        }
    }
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
