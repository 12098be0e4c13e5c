//! Performance benchmarks for the AT codec and the PN532 frame parser.
//!
//! Run benchmarks with:
//! ```sh
//! cargo bench --bench codec_bench
//! ```

use bopbox_core::constants::{PN532_ACK_FRAME, PN532_DEVICE_TO_HOST};
use bopbox_protocol::{
    FrameParser, build_command_frame, build_parameter_list, encode_frame, escape_parameter,
    find_terminator, response_prefix,
};
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;

/// ACK plus InListPassiveTarget response, as the PN532 sends them.
fn passive_target_exchange() -> Vec<u8> {
    let mut bytes = PN532_ACK_FRAME.to_vec();
    bytes.extend(
        encode_frame(
            PN532_DEVICE_TO_HOST,
            0x4B,
            &[0x01, 0x00, 0x00, 0x44, 0x00, 0x04, 0xDE, 0xAD, 0xBE, 0xEF],
        )
        .unwrap(),
    );
    bytes
}

/// Benchmark escaping and joining access point credentials.
fn bench_build_parameters(c: &mut Criterion) {
    let mut group = c.benchmark_group("at_parameters");
    group.throughput(Throughput::Elements(1));

    group.bench_function("escape_plain", |b| {
        b.iter(|| black_box(escape_parameter(black_box(b"bopbox"))));
    });

    group.bench_function("escape_special", |b| {
        b.iter(|| black_box(escape_parameter(black_box(b"my \"home\" wifi, 2.4\\5"))));
    });

    let required: [&[u8]; 2] = [b"home wifi", b"s3cr3t,pass"];
    let optional: [Option<&[u8]>; 2] = [None, Some(b"aa:bb:cc:dd:ee:ff")];

    group.bench_function("build_parameter_list", |b| {
        b.iter(|| black_box(build_parameter_list(black_box(&required), black_box(&optional))));
    });

    group.bench_function("response_prefix", |b| {
        b.iter(|| black_box(response_prefix(black_box(b"AT+CWJAP=\"home wifi\",pass"))));
    });

    group.finish();
}

/// Benchmark scanning a response for its terminal marker.
fn bench_find_terminator(c: &mut Criterion) {
    let mut group = c.benchmark_group("at_terminator");
    group.throughput(Throughput::Elements(1));

    let response = b"AT+CWJAP=\"home wifi\",\"pass\"\r\nWIFI CONNECTED\r\nWIFI GOT IP\r\n\r\nOK\r\n";

    group.bench_function("find_terminator", |b| {
        b.iter(|| black_box(find_terminator(black_box(response))));
    });

    group.finish();
}

/// Benchmark building a command frame.
fn bench_build_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("pn532_build");
    group.throughput(Throughput::Elements(1));

    group.bench_function("in_list_passive_target", |b| {
        b.iter(|| black_box(build_command_frame(black_box(0x4A), black_box(&[0x01, 0x00]))));
    });

    group.finish();
}

/// Benchmark parsing an ACK + data exchange at different read sizes.
fn bench_parse_chunked(c: &mut Criterion) {
    let mut group = c.benchmark_group("pn532_parse");
    let bytes = passive_target_exchange();

    for chunk_size in [1usize, 4, 64].iter() {
        group.throughput(Throughput::Bytes(bytes.len() as u64));

        group.bench_with_input(
            BenchmarkId::from_parameter(chunk_size),
            chunk_size,
            |b, &size| {
                b.iter(|| {
                    let mut parser = FrameParser::new();
                    for chunk in bytes.chunks(size) {
                        parser.feed(black_box(chunk));
                    }
                    black_box(parser.drain_frames().count());
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_build_parameters,
    bench_find_terminator,
    bench_build_frame,
    bench_parse_chunked
);
criterion_main!(benches);
