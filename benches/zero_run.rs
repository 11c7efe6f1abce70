use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use pixl_ingest::output::zero_run;

/// XRF-like spectrum: a noisy low-energy region, sparse peaks, then zeros
fn generate_spectrum(channels: usize) -> Vec<i64> {
    (0..channels)
        .map(|i| match i {
            _ if i < channels / 8 => ((i * 7919) % 13) as i64,
            _ if i % 97 == 0 => 250 + (i % 31) as i64,
            _ if i < channels / 2 && i % 5 == 0 => 1,
            _ => 0,
        })
        .collect()
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("zero_run_encode");

    for channels in [2048, 4096, 8192] {
        let spectrum = generate_spectrum(channels);
        group.throughput(Throughput::Elements(channels as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{channels}ch")),
            &spectrum,
            |b, spectrum| b.iter(|| black_box(zero_run::encode(black_box(spectrum)))),
        );
    }

    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("zero_run_decode");

    for channels in [2048, 4096, 8192] {
        let encoded = zero_run::encode(&generate_spectrum(channels));
        group.throughput(Throughput::Elements(channels as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{channels}ch")),
            &encoded,
            |b, encoded| {
                b.iter(|| black_box(zero_run::decode(black_box(encoded)).expect("valid stream")))
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
