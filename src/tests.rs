//! End-to-end scenarios: whole sessions over the serial wire, the
//! multi-stop bus, and the host proxy talking to the simulated device.

use crate::bus::{Bus, ConnState};
use crate::codec::{Frame, HEADER_LEN};
use crate::device::{HTTP_STREAM_ID, HttpAccelerator};
use crate::host;
use crate::session::BidiSession;
use crate::stream::BytePipe;

const OK_200: &[u8] = "HTTP/1.0 200 OK\r\nHost: Fomu\r\nContent-Type: text/plain; charset=utf-8\r\n\r\n\r\n\u{1F44D}\r\n".as_bytes();
const NOT_FOUND_404: &[u8] = "HTTP/1.0 404 Not Found\r\nHost: Fomu\r\nContent-Type: text/plain; charset=utf-8\r\n\r\n\r\n\u{1F44E}\r\n".as_bytes();
const METHOD_NOT_ALLOWED_405: &[u8] = "HTTP/1.0 405 Method Not Allowed\r\nHost: Fomu\r\nContent-Type: text/plain; charset=utf-8\r\n\r\n\r\n\u{1F6D1}\r\n".as_bytes();
const TEAPOT_418: &[u8] = "HTTP/1.0 418 I'm a teapot\r\nHost: Fomu\r\nContent-Type: text/plain; charset=utf-8\r\n\r\n\r\nshort and stout\r\n".as_bytes();

/// Frame a request as one session: START, data frames of `chunk` bytes,
/// END.
fn session_wire(request: &[u8], chunk: usize) -> Vec<u8> {
    let mut wire = Vec::new();
    wire.extend_from_slice(&Frame::start(HTTP_STREAM_ID).to_bytes());
    for piece in request.chunks(chunk.max(1)) {
        wire.extend_from_slice(&Frame::data(HTTP_STREAM_ID, piece).unwrap().to_bytes());
    }
    wire.extend_from_slice(&Frame::end(HTTP_STREAM_ID).to_bytes());
    wire
}

/// Push a wire image through the device, collecting everything it emits.
fn pump(device: &mut HttpAccelerator, wire: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    for &byte in wire {
        while !device.serial_in().offer(byte) {
            device.run_until_idle();
            while let Some(b) = device.serial_out().poll() {
                out.push(b);
            }
        }
    }
    loop {
        device.run_until_idle();
        let before = out.len();
        while let Some(b) = device.serial_out().poll() {
            out.push(b);
        }
        if out.len() == before {
            break;
        }
    }
    out
}

/// Parse the egress into frames, checking the per-session invariants, and
/// return the concatenated body.
fn collect_response(out: &[u8]) -> Vec<u8> {
    let mut cursor = std::io::Cursor::new(out);
    let mut body = Vec::new();
    let mut starts = 0;
    let mut ends = 0;
    while let Ok(frame) = Frame::parse(&mut cursor) {
        assert_eq!(frame.stream_id(), HTTP_STREAM_ID);
        assert!(frame.flags().to_host, "device frames must set TO_HOST");
        assert!(ends == 0, "no frames may follow END");
        if frame.flags().start {
            assert_eq!(body.len(), 0, "START must be the first frame");
            starts += 1;
        }
        if frame.flags().end {
            ends += 1;
        }
        body.extend_from_slice(&frame.body);
    }
    assert_eq!(cursor.position() as usize, out.len(), "trailing garbage");
    assert_eq!(starts, 1, "exactly one START per session");
    assert_eq!(ends, 1, "exactly one END per session");
    body
}

fn run_http(device: &mut HttpAccelerator, request: &[u8]) -> Vec<u8> {
    let out = pump(device, &session_wire(request, 60));
    collect_response(&out)
}

#[test]
fn led_post_round_trip() {
    let mut device = HttpAccelerator::new();
    let response = run_http(
        &mut device,
        b"POST /led HTTP/1.0\r\nHost: t\r\n\r\n123456\r\n",
    );
    assert_eq!(response, OK_200);
    assert_eq!(device.led(), (0x12, 0x34, 0x56));
    assert_eq!(device.counts(), (1, 1, 0));
}

#[test]
fn unknown_uri_gets_404() {
    let mut device = HttpAccelerator::new();
    let response = run_http(&mut device, b"POST /bad_uri HTTP/1.0\r\n\r\n123456\r\n");
    assert_eq!(response, NOT_FOUND_404);
    assert_eq!(device.counts(), (1, 0, 1));
}

#[test]
fn wrong_method_gets_405() {
    let mut device = HttpAccelerator::new();
    let response = run_http(&mut device, b"GET /led HTTP/1.0\r\n\r\n");
    assert_eq!(response, METHOD_NOT_ALLOWED_405);
    assert_eq!(device.counts(), (1, 0, 1));
}

#[test]
fn coffee_gets_418() {
    let mut device = HttpAccelerator::new();
    let response = run_http(&mut device, b"BREW /coffee HTTP/1.0\r\n\r\n");
    assert_eq!(response, TEAPOT_418);
    assert_eq!(device.counts(), (1, 0, 1));
}

#[test]
fn counter_report_after_three_sessions() {
    let mut device = HttpAccelerator::new();

    let first = run_http(
        &mut device,
        b"POST /led HTTP/1.0\r\nHost: t\r\n\r\nABCDEF\r\n",
    );
    assert_eq!(first, OK_200);

    let second = run_http(&mut device, b"BREW /cocoa HTTP/1.0\r\n\r\n");
    assert_eq!(second, NOT_FOUND_404);

    let third = run_http(&mut device, b"GET /count HTTP/1.0\r\n\r\n");
    assert!(third.starts_with(OK_200));
    assert!(
        third.ends_with(b"requests: 0003 ok_responses: 0002 error_responses: 0001\r\n"),
        "unexpected tail: {:?}",
        String::from_utf8_lossy(&third)
    );
    assert_eq!(device.counts(), (3, 2, 1));
}

#[test]
fn single_byte_data_frames_still_parse() {
    let mut device = HttpAccelerator::new();
    let out = pump(
        &mut device,
        &session_wire(b"GET /coffee HTTP/1.0\r\n\r\n", 1),
    );
    assert_eq!(collect_response(&out), TEAPOT_418);
}

#[test]
fn foreign_frames_between_sessions_are_harmless() {
    let mut device = HttpAccelerator::new();

    let mut wire = Vec::new();
    wire.extend_from_slice(&Frame::data(9, b"noise").unwrap().to_bytes());
    wire.extend_from_slice(&session_wire(b"GET /coffee HTTP/1.0\r\n\r\n", 60));
    wire.extend_from_slice(&Frame::data(200, &[0xAA; 255]).unwrap().to_bytes());

    let out = pump(&mut device, &wire);
    assert_eq!(collect_response(&out), TEAPOT_418);
    assert_eq!(device.counts(), (1, 0, 1));
    assert_eq!(device.connection_state(), ConnState::Closed);
}

#[test]
fn consecutive_sessions_reset_cleanly() {
    let mut device = HttpAccelerator::new();
    for round in 1..=5u32 {
        let response = run_http(
            &mut device,
            b"POST /led HTTP/1.0\r\nHost: t\r\n\r\n010203\r\n",
        );
        assert_eq!(response, OK_200);
        assert_eq!(device.counts(), (round, round, 0));
        assert_eq!(device.connection_state(), ConnState::Closed);
    }
}

#[test]
fn back_to_back_sessions_in_one_wire_image() {
    // The second session's START lands while the first is still
    // flushing; it must wait on the wire, not be treated as a duplicate.
    let mut device = HttpAccelerator::new();
    let mut wire = session_wire(b"GET /coffee HTTP/1.0\r\n\r\n", 60);
    wire.extend_from_slice(&session_wire(b"GET /count HTTP/1.0\r\n\r\n", 60));

    let out = pump(&mut device, &wire);

    // Two sessions' worth of frames: split at the first END.
    let mut cursor = std::io::Cursor::new(out.as_slice());
    let mut first = Vec::new();
    let mut second = Vec::new();
    let mut in_first = true;
    while let Ok(frame) = Frame::parse(&mut cursor) {
        let target = if in_first { &mut first } else { &mut second };
        target.extend_from_slice(&frame.body);
        if frame.flags().end {
            in_first = false;
        }
    }
    assert_eq!(first, TEAPOT_418);
    assert!(second.starts_with(OK_200));
    assert!(second.ends_with(b"requests: 0002 ok_responses: 0001 error_responses: 0001\r\n"));
}

#[test]
fn egress_backpressure_loses_nothing() {
    // Drain the device's output one byte per settle: the response must
    // come out intact anyway.
    let mut device = HttpAccelerator::new();
    let wire = session_wire(b"GET /coffee HTTP/1.0\r\n\r\n", 60);

    let mut out = Vec::new();
    for &byte in &wire {
        while !device.serial_in().offer(byte) {
            device.run_until_idle();
            if let Some(b) = device.serial_out().poll() {
                out.push(b);
            }
        }
    }
    loop {
        let progressed = device.run_until_idle();
        match device.serial_out().poll() {
            Some(b) => out.push(b),
            None if !progressed => break,
            None => {}
        }
    }

    assert_eq!(collect_response(&out), TEAPOT_418);
}

#[test]
fn bus_demultiplexes_interleaved_streams() {
    // Frames for two stops interleaved on one wire: each stop sees only
    // its own bodies, in order.
    let mut bus = Bus::new(&[3, 5]);
    let mut sessions = vec![BidiSession::new(256), BidiSession::new(256)];
    let mut rx = BytePipe::with_capacity(1024);
    let mut tx = BytePipe::with_capacity(1024);

    let b5 = b"BBBBB";
    let b3 = b"ccc";

    let mut first5 = Frame::data(5, b5).unwrap();
    first5.header.flags.start = true;
    let mut first3 = Frame::data(3, b3).unwrap();
    first3.header.flags.start = true;

    for frame in [
        first5,
        first3,
        Frame::data(5, b5).unwrap(),
        Frame::end(5),
        Frame::end(3),
    ] {
        for &byte in frame.to_bytes().iter() {
            assert!(rx.offer(byte));
        }
    }

    let mut received = vec![Vec::new(), Vec::new()];
    for _ in 0..1024 {
        let mut progress = bus.step(&mut rx, &mut tx, &mut sessions);
        for (session, sink) in sessions.iter_mut().zip(received.iter_mut()) {
            if session.inbound.active && !session.outbound.active {
                session.outbound.active = true;
                progress = true;
            }
            while let Some(b) = session.inbound.data.poll() {
                sink.push(b);
                progress = true;
            }
            if session.outbound.active && !session.inbound.active {
                session.outbound.active = false;
                progress = true;
            }
        }
        while tx.poll().is_some() {
            progress = true;
        }
        if !progress {
            break;
        }
    }

    assert_eq!(received[0], b3);
    assert_eq!(
        received[1],
        b5.iter().chain(b5.iter()).copied().collect::<Vec<u8>>()
    );
    assert_eq!(bus.stop(0).state(), ConnState::Closed);
    assert_eq!(bus.stop(1).state(), ConnState::Closed);
}

#[test]
fn frame_header_size_is_pinned() {
    // The wire contract everything above depends on.
    assert_eq!(HEADER_LEN, 3);
    let frame = Frame::data(1, b"x").unwrap();
    assert_eq!(frame.to_bytes().len(), 4);
}

mod proxy {
    use super::*;
    use crate::host::{FrameReader, PROXY_STREAM_ID};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    #[tokio::test]
    async fn simulated_device_answers_frames() {
        let (mut host_io, device_io) = tokio::io::duplex(1024);
        tokio::spawn(host::sim::attach(HttpAccelerator::new(), device_io));

        let wire = session_wire(b"GET /coffee HTTP/1.0\r\n\r\n", 60);
        host_io.write_all(&wire).await.unwrap();
        host_io.flush().await.unwrap();

        let mut reader = FrameReader::new(host_io);
        let mut body = Vec::new();
        loop {
            let frame = reader.read_frame().await.unwrap().expect("device closed");
            assert_eq!(frame.stream_id(), PROXY_STREAM_ID);
            assert!(frame.flags().to_host);
            body.extend_from_slice(&frame.body);
            if frame.flags().end {
                break;
            }
        }
        assert_eq!(body, TEAPOT_418);
    }

    #[tokio::test]
    async fn frame_reader_handles_partial_arrival() {
        let (mut wr, rd) = tokio::io::duplex(64);
        let mut reader = FrameReader::new(rd);

        let frame = Frame::data(1, b"split me").unwrap();
        let wire = frame.to_bytes();

        let (head, tail) = wire.split_at(4);
        wr.write_all(head).await.unwrap();
        let head_owned = tail.to_vec();
        let reads = tokio::spawn(async move { reader.read_frame().await.unwrap() });
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        wr.write_all(&head_owned).await.unwrap();

        let parsed = reads.await.unwrap().expect("frame expected");
        assert_eq!(parsed, frame);
    }

    #[tokio::test]
    async fn tcp_proxy_end_to_end() {
        let (proxy_io, device_io) = tokio::io::duplex(4096);
        tokio::spawn(host::sim::attach(HttpAccelerator::new(), device_io));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = host::serve(listener, proxy_io).await;
        });

        // First client: set the LEDs.
        let mut client = TcpStream::connect(addr).await.unwrap();
        client
            .write_all(b"POST /led HTTP/1.0\r\nHost: t\r\n\r\n123456\r\n")
            .await
            .unwrap();
        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();
        assert_eq!(response, OK_200);

        // Second client on the same device session stream: the counters
        // saw the first request.
        let mut client = TcpStream::connect(addr).await.unwrap();
        client
            .write_all(b"GET /count HTTP/1.0\r\n\r\n")
            .await
            .unwrap();
        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();
        assert!(response.starts_with(OK_200));
        assert!(
            response.ends_with(b"requests: 0002 ok_responses: 0002 error_responses: 0000\r\n"),
            "unexpected tail: {:?}",
            String::from_utf8_lossy(&response)
        );
    }

    #[tokio::test]
    async fn tcp_client_eof_closes_the_session() {
        let (proxy_io, device_io) = tokio::io::duplex(4096);
        tokio::spawn(host::sim::attach(HttpAccelerator::new(), device_io));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = host::serve(listener, proxy_io).await;
        });

        // Client half-closes after the request; the proxy must still
        // deliver the response before closing.
        let mut client = TcpStream::connect(addr).await.unwrap();
        client
            .write_all(b"GET /coffee HTTP/1.0\r\n\r\n")
            .await
            .unwrap();
        let (mut rd, mut wr) = client.split();
        wr.shutdown().await.unwrap();
        let mut response = Vec::new();
        rd.read_to_end(&mut response).await.unwrap();
        assert_eq!(response, TEAPOT_418);
    }
}
