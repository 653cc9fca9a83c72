// ABOUTME: Benchmarks for frame codec throughput and whole-request latency
// ABOUTME: Measures encode/parse of maximum frames and a full device cycle

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use ntcp::codec::Frame;
use ntcp::device::{HTTP_STREAM_ID, HttpAccelerator};
use std::io::Cursor;

fn bench_frame_codec(c: &mut Criterion) {
    let frame = Frame::data(1, &[0x5A; 255]).unwrap();
    let wire = frame.to_bytes();

    c.bench_function("frame_encode_max_body", |b| {
        b.iter(|| black_box(frame.to_bytes()))
    });

    c.bench_function("frame_parse_max_body", |b| {
        b.iter(|| {
            let mut cursor = Cursor::new(black_box(wire.as_ref()));
            Frame::parse(&mut cursor).unwrap()
        })
    });
}

fn session_wire(request: &[u8]) -> Vec<u8> {
    let mut wire = Vec::new();
    wire.extend_from_slice(&Frame::start(HTTP_STREAM_ID).to_bytes());
    for piece in request.chunks(200) {
        wire.extend_from_slice(&Frame::data(HTTP_STREAM_ID, piece).unwrap().to_bytes());
    }
    wire.extend_from_slice(&Frame::end(HTTP_STREAM_ID).to_bytes());
    wire
}

fn run_session(device: &mut HttpAccelerator, wire: &[u8]) -> usize {
    let mut emitted = 0;
    for &byte in wire {
        while !device.serial_in().offer(byte) {
            device.run_until_idle();
            while device.serial_out().poll().is_some() {
                emitted += 1;
            }
        }
    }
    loop {
        device.run_until_idle();
        let before = emitted;
        while device.serial_out().poll().is_some() {
            emitted += 1;
        }
        if emitted == before {
            return emitted;
        }
    }
}

fn bench_request_cycle(c: &mut Criterion) {
    let led = session_wire(b"POST /led HTTP/1.0\r\nHost: bench\r\n\r\n123456\r\n");
    let count = session_wire(b"GET /count HTTP/1.0\r\n\r\n");

    c.bench_function("led_request_cycle", |b| {
        let mut device = HttpAccelerator::new();
        b.iter(|| black_box(run_session(&mut device, &led)))
    });

    c.bench_function("count_request_cycle", |b| {
        let mut device = HttpAccelerator::new();
        b.iter(|| black_box(run_session(&mut device, &count)))
    });
}

criterion_group!(benches, bench_frame_codec, bench_request_cycle);
criterion_main!(benches);
