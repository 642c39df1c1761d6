//! Benchmarks for the frame codec and topology mapping.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use rand::{Rng, SeedableRng, rngs::StdRng};

use pixel_show::{
    schema::{PIXELS_PER_UNIVERSE, Topology},
    show::{Rgb, decode_frame, decode_metadata, encode_frame, encode_metadata},
};

fn random_pixels(rng: &mut StdRng, count: usize) -> Vec<Rgb> {
    (0..count)
        .map(|_| Rgb::new(rng.r#gen(), rng.r#gen(), rng.r#gen()))
        .collect()
}

fn bench_encode_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_frame");
    let mut rng = StdRng::seed_from_u64(7);

    for pixels in [10, 85, PIXELS_PER_UNIVERSE] {
        let frame = random_pixels(&mut rng, pixels);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}_pixels", pixels)),
            &frame,
            |b, frame| {
                b.iter(|| encode_frame(black_box(12.345678), black_box(frame)));
            },
        );
    }

    group.finish();
}

fn bench_decode_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_frame");
    let mut rng = StdRng::seed_from_u64(11);

    for pixels in [10, 85, PIXELS_PER_UNIVERSE] {
        let line = encode_frame(12.345678, &random_pixels(&mut rng, pixels));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}_pixels", pixels)),
            &line,
            |b, line| {
                b.iter(|| decode_frame(black_box(line)));
            },
        );
    }

    group.finish();
}

fn bench_topology(c: &mut Criterion) {
    let mut group = c.benchmark_group("topology");

    for counts in [vec![20], vec![680, 680, 680, 680]] {
        let label = format!("{}_outputs", counts.len());
        group.bench_with_input(
            BenchmarkId::new("from_pixel_counts", &label),
            &counts,
            |b, counts| {
                b.iter(|| Topology::from_pixel_counts(black_box(counts)));
            },
        );

        let (topology, _) = Topology::from_pixel_counts(&counts);
        let metadata = encode_metadata(&topology);
        group.bench_with_input(
            BenchmarkId::new("decode_metadata", &label),
            &metadata,
            |b, metadata| {
                b.iter(|| decode_metadata(black_box(metadata)));
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_encode_frame, bench_decode_frame, bench_topology);
criterion_main!(benches);
