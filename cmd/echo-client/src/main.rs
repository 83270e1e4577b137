//! netlane echo client
//!
//! Opens `clients` connections. Each one sends ten frames
//! `"hello" + 10^i`, writing every frame in two halves so the server has to
//! reassemble it, then decodes the echoes with the same codec.
//!
//! Usage:
//!     ./target/release/netlane-echo-client [addr] [clients]
//!
//! Exits non-zero if any echo is missing or differs.

use std::io::Write;
use std::net::TcpStream;
use std::process::ExitCode;
use std::thread;
use std::time::Duration;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use netlane::{Buffer, Decoder, Encoder, HeapBuffers, LengthPrefixCodec};

const FRAMES: u32 = 10;

fn payload(i: u32) -> String {
    format!("hello{}", 10u64.pow(i))
}

/// Returns the decoded echoes in arrival order.
fn run_client(addr: &str, index: usize) -> netlane::Result<Vec<String>> {
    let codec = LengthPrefixCodec::new(2, 1024)?;
    let pool = HeapBuffers::new(1024);

    let mut stream = TcpStream::connect(addr)?;
    stream.set_nodelay(true)?;
    stream.set_read_timeout(Some(Duration::from_secs(5)))?;

    for i in 0..FRAMES {
        let wire = codec.encode(payload(i).as_bytes())?;
        let (head, tail) = wire.split_at(wire.len() / 2);
        stream.write_all(head)?;
        stream.flush()?;
        thread::sleep(Duration::from_millis(5));
        stream.write_all(tail)?;
    }

    let mut buffer = Buffer::with_provider(&pool);
    let mut echoed: Vec<String> = Vec::new();
    while echoed.len() < FRAMES as usize {
        let n = buffer.read_from(&mut stream, &pool)?;
        if n == 0 {
            break;
        }
        codec.decode(&mut buffer, &mut |bytes: &[u8]| {
            let msg = String::from_utf8_lossy(bytes).into_owned();
            info!(client = index, %msg, "echo");
            echoed.push(msg);
        })?;
    }

    Ok(echoed)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = std::env::args().collect();
    let addr = args.get(1).cloned().unwrap_or_else(|| "127.0.0.1:8080".into());
    let clients: usize = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(1);

    let handles: Vec<_> = (0..clients)
        .map(|index| {
            let addr = addr.clone();
            thread::spawn(move || run_client(&addr, index))
        })
        .collect();

    let expected: Vec<String> = (0..FRAMES).map(payload).collect();
    let mut failed = 0;
    for (index, handle) in handles.into_iter().enumerate() {
        match handle.join() {
            Ok(Ok(echoed)) if echoed == expected => {}
            Ok(Ok(echoed)) => {
                error!(client = index, got = ?echoed, "echo mismatch");
                failed += 1;
            }
            Ok(Err(e)) => {
                error!(client = index, error = %e, "client failed");
                failed += 1;
            }
            Err(_) => {
                error!(client = index, "client panicked");
                failed += 1;
            }
        }
    }

    if failed > 0 {
        return ExitCode::FAILURE;
    }
    info!(clients, frames = FRAMES, "all echoes verified");
    ExitCode::SUCCESS
}
