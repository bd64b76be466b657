//! List all locally attached eye trackers.

use stream_engine::{DeviceGenerations, EngineConfig, NativeLibrary, RootContext};

fn main() {
    env_logger::init();

    let config = EngineConfig::from_env();
    let result = NativeLibrary::load(&config)
        .and_then(|lib| RootContext::open_with_config(lib, &config))
        .and_then(|ctx| {
            println!("Library version: {}", ctx.version());
            ctx.enumerate_device_urls(DeviceGenerations::all())
        });

    match result {
        Ok(urls) => {
            println!("Found {} device(s):", urls.len());
            for (i, url) in urls.iter().enumerate() {
                println!("  [{}] {}", i, url);
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
