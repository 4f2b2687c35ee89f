use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use voicecast_extras::config::DispatchConfig;
use voicecast_sdk::{ConnectionState, DispatchEvent, PcmSender, PcmSource, Player, UdpTransport};

/// Queued PCM chunks ahead of the encoder.
const PCM_QUEUE: usize = 8;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 3 {
        eprintln!("Usage: wav_dispatch <config.toml> <wav_file>");
        eprintln!("Example: wav_dispatch wav_dispatch.toml music.wav");
        std::process::exit(1);
    }

    let config = DispatchConfig::load(&args[1])?;
    let wav_file = &args[2];

    info!("Voice server: {}", config.voice_server);
    info!("Encryption mode: {}, ssrc: {}", config.mode, config.ssrc);
    info!("WAV file: {}", wav_file);

    let reader = hound::WavReader::open(wav_file)?;
    let spec = reader.spec();

    if spec.bits_per_sample != 16 || spec.sample_format != hound::SampleFormat::Int {
        error!("Invalid sample format: {} bits {:?}. Expected 16-bit integer", spec.bits_per_sample, spec.sample_format);
        return Err("Invalid sample format".into());
    }

    let samples: Vec<i16> = reader.into_samples::<i16>().collect::<Result<Vec<_>, _>>()?;
    let mono = downmix(&samples, usize::from(spec.channels.max(1)));

    info!(
        "WAV file loaded: {} Hz, {} channels, {} mono samples",
        spec.sample_rate,
        spec.channels,
        mono.len()
    );

    let connection = Arc::new(ConnectionState::new());
    connection.set_encryption(config.encryption_context()?);

    let transport = UdpTransport::connect(&config.voice_server).await?;
    let (pcm_tx, source) = PcmSource::channel(spec.sample_rate, PCM_QUEUE)?;

    let mut player = Player::new(connection, transport, config.options.clone());
    let mut events = player.events().subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(DispatchEvent::Debug(message)) => debug!("{}", message),
                Ok(DispatchEvent::Error(e)) => warn!("Frame dropped: {}", e),
                Ok(DispatchEvent::Exception(e)) => error!("Stream failed: {}", e),
                Ok(other) => info!("{:?}", other),
                Err(RecvError::Lagged(n)) => warn!("Event logger lagged, skipped {} events", n),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let dispatcher = player.play(source).await;

    // 20 ms of input per chunk
    let chunk = (spec.sample_rate / 50).max(1) as usize;
    tokio::spawn(feed(pcm_tx, mono, chunk));

    dispatcher.finished().await?;
    info!("Audio stream completed!");

    Ok(())
}

/// Average interleaved channels into one.
fn downmix(samples: &[i16], channels: usize) -> Vec<f32> {
    samples
        .chunks(channels)
        .map(|frame| {
            let sum: f32 = frame.iter().map(|&s| f32::from(s) / 32768.0).sum();
            sum / frame.len() as f32
        })
        .collect()
}

/// The bounded queue paces this at the dispatcher's rate.
async fn feed(pcm_tx: PcmSender, samples: Vec<f32>, chunk: usize) {
    for frame in samples.chunks(chunk) {
        if pcm_tx.send(Ok(frame.to_vec())).await.is_err() {
            info!("PCM channel closed, stopping feed");
            return;
        }
    }
    debug!("All samples queued");
}
