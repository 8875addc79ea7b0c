use bambu_camera::frame::{END_MARKER, START_MARKER};
use bambu_camera::{ExtractPolicy, FrameExtractor};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

fn create_test_jpeg(size: usize) -> Vec<u8> {
    let mut jpeg = START_MARKER.to_vec();
    // Avoid 0xFF so no marker appears inside the payload
    jpeg.extend((0..size).map(|i| (i % 255) as u8));
    jpeg.extend(&END_MARKER);
    jpeg
}

fn benchmark_extract_stream(c: &mut Criterion) {
    let mut group = c.benchmark_group("extract_stream");

    // Typical printer frame sizes, delivered in 4 KiB reads
    for size in [20_000, 60_000, 150_000].iter() {
        let mut stream = Vec::new();
        for _ in 0..10 {
            stream.extend(create_test_jpeg(*size));
        }
        group.throughput(Throughput::Bytes(stream.len() as u64));

        group.bench_with_input(BenchmarkId::new("frame_size", size), &stream, |b, stream| {
            b.iter(|| {
                let mut extractor = FrameExtractor::default();
                let mut frames = 0;
                for chunk in stream.chunks(4096) {
                    frames += extractor.ingest(black_box(chunk), ExtractPolicy::OnePerRead).len();
                }
                frames
            });
        });
    }

    group.finish();
}

fn benchmark_drain_single_read(c: &mut Criterion) {
    let mut stream = Vec::new();
    for _ in 0..32 {
        stream.extend(create_test_jpeg(2_000));
    }

    c.bench_function("drain_32_frames_one_read", |b| {
        b.iter(|| {
            let mut extractor = FrameExtractor::default();
            extractor.ingest(black_box(&stream), ExtractPolicy::Drain).len()
        });
    });
}

criterion_group!(benches, benchmark_extract_stream, benchmark_drain_single_read);
criterion_main!(benches);
