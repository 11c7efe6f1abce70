use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use pixl_ingest::readers::read_msa_lines;

/// Generate a dual-detector MSA file with `channels` rows
fn generate_msa(channels: usize) -> Vec<String> {
    let mut lines: Vec<String> = [
        "#FORMAT      : EMSA/MAS Spectral Data File",
        "#VERSION     : TC202v2.0 PIXL",
        "#TITLE       : Control Program",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    lines.push(format!("#NPOINTS     : {channels}"));
    lines.extend(
        [
            "#NCOLUMNS    : 2",
            "#XPERCHAN    : 7.9226, 7.9273",
            "#OFFSET      : -25.0, -25.7",
            "#LIVETIME    : 9.4, 9.5",
            "#REALTIME    : 10.0, 10.0",
            "#DATATYPE    : YY",
            "#SPECTRUM    :",
        ]
        .iter()
        .map(|s| s.to_string()),
    );
    for i in 0..channels {
        let a = if i % 3 == 0 { 0 } else { (i * 31) % 977 };
        let b = if i % 4 == 0 { 0 } else { (i * 17) % 953 };
        lines.push(format!("{a}, {b}"));
    }
    lines.push("#ENDOFDATA   :".to_string());
    lines
}

fn bench_msa(c: &mut Criterion) {
    let mut group = c.benchmark_group("msa_parsing");

    for channels in [1024, 4096] {
        let lines = generate_msa(channels);
        group.throughput(Throughput::Elements(channels as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{channels}ch")),
            &lines,
            |b, lines| {
                b.iter(|| {
                    let samples =
                        read_msa_lines(black_box(lines), false, false, false).expect("valid MSA");
                    black_box(samples)
                })
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_msa);
criterion_main!(benches);
