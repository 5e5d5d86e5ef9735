use std::cell::Cell;
use std::rc::Rc;
use tick_engine::{BlockDriver, EngineConfig, EngineResult, Transport};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

// Length of the offline render
const BARS: u64 = 4;

fn main() {
    setup_tracing();

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn setup_tracing() {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_env("TICK_ENGINE_LOG"))
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("Logging already initialized");
    }
}

fn run() -> EngineResult<()> {
    // Optional RON configuration path as the only argument
    let config = match std::env::args().nth(1) {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };

    println!("=== tick_engine ===");
    println!(
        "{} BPM, {} at {} ppq, {} Hz / {} frames\n",
        config.bpm, config.time_signature, config.ppq, config.sample_rate, config.block_size
    );

    let mut transport = Transport::from_config(&config)?;
    let signature = transport.time_signature();
    let ppq = transport.context().ppq();
    let beat = signature.ticks_per_beat(ppq);
    let bar = signature.ticks_per_bar(ppq);
    let beats_per_bar = signature.numerator as u64;

    // Metronome: accent on the downbeat
    let count = Rc::new(Cell::new(0u64));
    let counter = Rc::clone(&count);
    transport.schedule_repeat(
        move |time| {
            let n = counter.get();
            counter.set(n + 1);
            let accent = if n % beats_per_bar == 0 { "TICK" } else { "tock" };
            println!(
                "{:>3}.{} {} @ {:.4}s",
                n / beats_per_bar + 1,
                n % beats_per_bar + 1,
                accent,
                time
            );
            Ok(())
        },
        beat as f64,
        0.0,
        Some((bar * BARS) as f64),
    );

    let mut driver = BlockDriver::new(*transport.context());
    transport.start(None);
    let end = transport.ticks_to_seconds((bar * BARS) as f64);
    driver.run_until(end, |now| transport.process(now))?;

    println!(
        "\nRendered {} beats, stopped at {} ({:.3}s)",
        count.get(),
        transport.position(),
        transport.seconds()
    );
    Ok(())
}
