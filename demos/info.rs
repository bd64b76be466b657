//! Print detailed info about the first attached eye tracker.

use stream_engine::{
    Capability, DeviceGenerations, DeviceSession, EngineConfig, NativeLibrary, RootContext,
    StreamId,
};

fn print_info(session: &DeviceSession<'_>) -> stream_engine::Result<()> {
    let info = session.info()?;
    println!("URL:       {}", session.url());
    println!("Serial:    {}", info.serial_number);
    println!("Model:     {}", info.model);
    println!("Gen:       {}", info.generation);
    println!("Firmware:  {}", info.firmware_version);
    if let Some(runtime) = &info.runtime_build_version {
        println!("Runtime:   {}", runtime);
    }

    match session.track_box() {
        Ok(tb) => println!("Track box: front upper right {:?}", tb.front_upper_right),
        Err(e) if e.is_unsupported() => println!("Track box: n/a"),
        Err(e) => return Err(e),
    }
    println!("Display:   {:?}", session.display_area()?);
    println!("Eye:       {:?}", session.enabled_eye()?);
    println!("Calib id:  {}", session.calibration_id()?);

    for capability in [Capability::Calibration2d, Capability::Calibration3d, Capability::PersistentStorage] {
        match session.capability_supported(capability) {
            Ok(yes) => println!("{:?}: {}", capability, yes),
            Err(e) if e.is_unsupported() => println!("{:?}: unknown to this library", capability),
            Err(e) => return Err(e),
        }
    }
    for stream in [StreamId::GazePoint, StreamId::GazeOrigin, StreamId::HeadPose] {
        println!("{:?} stream: {}", stream, session.stream_supported(stream).unwrap_or(false));
    }
    Ok(())
}

fn main() {
    env_logger::init();

    let config = EngineConfig::from_env();
    let lib = match NativeLibrary::load(&config) {
        Ok(lib) => lib,
        Err(e) => {
            eprintln!("Failed to load library: {}", e);
            std::process::exit(1);
        }
    };
    let ctx = match RootContext::open_with_config(lib, &config) {
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

    let result = ctx.open_device(&url).and_then(|session| print_info(&session));
    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
