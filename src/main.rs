use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use stepwire::{
    EngineCommand, Settings, SoundEngineControl, audio, dispatch::LoggingEngine,
    midi::{MidiDeviceInterface, MidirDevices}, spawn_engine,
};
use tracing_subscriber::EnvFilter;

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("stepwire.ron"));
    let settings = match Settings::load_or_default(&path) {
        Ok(settings) => settings,
        Err(e) => {
            tracing::error!(path = %path.display(), "{e}");
            std::process::exit(1);
        }
    };

    let (synth, renderer) = audio::Synth::new(settings.adsr.clone(), settings.output_volume);
    // Held until exit; dropping the stream stops audio.
    let mut _stream = None;
    let sound: Arc<dyn SoundEngineControl> =
        match audio::start_output(renderer, settings.sample_rate) {
            Ok(stream) => {
                _stream = Some(stream);
                Arc::new(synth)
            }
            Err(e) => {
                tracing::warn!("running silent: {e}");
                Arc::new(LoggingEngine)
            }
        };

    let bpm = settings.bpm;
    let engine = spawn_engine(
        settings,
        sound,
        Box::new(|| -> Box<dyn MidiDeviceInterface + Send> {
            Box::new(MidirDevices::default())
        }),
    );

    let activity = engine.observers.activity.subscribe();
    std::thread::spawn(move || {
        while let Some(active) = activity.recv() {
            tracing::debug!(active, "midi activity");
        }
    });

    engine.send(EngineCommand::ConnectMidi);
    engine.send(EngineCommand::Start);
    println!("q quit | s stop | r run | p panic | c clear | + / - tempo");

    let mut bpm = bpm;
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        match line.trim() {
            "q" => break,
            "s" => engine.send(EngineCommand::Stop),
            "r" => engine.send(EngineCommand::Start),
            "p" => engine.send(EngineCommand::Panic),
            "c" => engine.send(EngineCommand::Clear),
            "+" => {
                bpm += 5.0;
                engine.send(EngineCommand::SetBpm(bpm));
            }
            "-" => {
                bpm = (bpm - 5.0).max(1.0);
                engine.send(EngineCommand::SetBpm(bpm));
            }
            other => println!("unknown command {other:?}"),
        }
        while let Ok(update) = engine.update_rx.recv_timeout(Duration::from_millis(20)) {
            tracing::info!(?update, "engine");
        }
    }

    engine.shutdown();
}
