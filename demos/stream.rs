//! Stream gaze points from the first attached eye tracker to stdout.
//!
//! Usage: cargo run --example stream
//! Press Ctrl+C to stop.

use std::time::{Duration, Instant};
use stream_engine::{
    DeviceGenerations, EngineConfig, FailureKind, GazePointStream, NativeLibrary, RootContext,
};

fn main() {
    env_logger::init();

    let config = EngineConfig::from_env();
    let ctx = match NativeLibrary::load(&config).and_then(|lib| RootContext::open_with_config(lib, &config)) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("Failed to open context: {}", e);
            std::process::exit(1);
        }
    };

    let url = match ctx.enumerate_device_urls(DeviceGenerations::all()) {
        Ok(urls) if !urls.is_empty() => urls[0].clone(),
        Ok(_) => {
            eprintln!("No eye tracker found");
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let mut session = match ctx.open_device(&url) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to open device: {}", e);
            std::process::exit(1);
        }
    };

    let samples = match session.subscribe_channel::<GazePointStream>(1024) {
        Ok((_, rx)) => rx,
        Err(e) => {
            eprintln!("Failed to subscribe: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = session.on_user_presence(|p| println!("presence: {:?}", p.status)) {
        log::warn!("User presence unavailable: {}", e);
    }

    println!("Streaming gaze from {} (Ctrl+C to stop)...", url);

    let start = Instant::now();
    let mut count: u64 = 0;
    let mut last_report = Instant::now();
    let mut last_timesync = Instant::now();

    loop {
        match ctx.wait_for_callbacks(&[&session]) {
            Ok(true) => {}
            Ok(false) => continue,
            Err(e) => {
                eprintln!("Wait failed: {}", e);
                break;
            }
        }

        match session.process_callbacks() {
            Ok(()) => {}
            Err(e) if e.kind() == Some(FailureKind::ConnectionLost) => {
                eprintln!("Connection lost, reconnecting...");
                if let Err(e) = session.reconnect() {
                    eprintln!("Reconnect failed: {}", e);
                    break;
                }
                continue;
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                break;
            }
        }

        for p in samples.try_iter() {
            count += 1;
            // Print every ~60th sample to avoid flooding the terminal
            if count % 60 == 1 {
                println!(
                    "ts={:<14}  gaze=[{:+.4}, {:+.4}]  valid={}",
                    p.timestamp,
                    p.position_xy[0],
                    p.position_xy[1],
                    p.validity.is_valid(),
                );
            }
        }

        let now = Instant::now();
        if now.duration_since(last_timesync) >= Duration::from_secs(30) {
            match session.update_timesync() {
                Ok(()) => last_timesync = now,
                Err(e) if e.kind() == Some(FailureKind::OperationAborted) => {
                    log::debug!("Timesync busy, retrying later");
                }
                Err(e) => log::warn!("Timesync failed: {}", e),
            }
        }

        // Report rate every 3 seconds
        if now.duration_since(last_report) >= Duration::from_secs(3) {
            let elapsed = start.elapsed().as_secs_f64();
            println!("--- {} samples in {:.1}s ({:.1} Hz) ---", count, elapsed, count as f64 / elapsed);
            last_report = now;
        }
    }

    if let Err(e) = session.close() {
        eprintln!("Failed to close device: {}", e);
    }
}
