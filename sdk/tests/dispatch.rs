use std::sync::Arc;
use std::time::Duration;

use async_channel::{bounded, unbounded, Receiver};
use tokio::sync::broadcast;
use tokio::time::{sleep, timeout, Instant};
use voicecast_protocol::PacketCipher;
use voicecast_sdk::voice::PcmSource;
use voicecast_sdk::{
    BroadcastClock, ChannelSource, ConnectionState, DispatchError, DispatchEvent, DispatchOptions,
    Dispatcher, DispatcherId, EncryptionContext, EncryptionMode, EventEmitter, Pacing, Player,
    SilenceSource,
    StreamError, StreamStage, SILENCE_FRAME,
};

const KEY: [u8; 32] = [3; 32];
const SSRC: u32 = 0x0bad_cafe;

fn keyed_connection() -> Arc<ConnectionState> {
    let connection = Arc::new(ConnectionState::new());
    let context = EncryptionContext::new(&KEY, EncryptionMode::Normal, SSRC)
        .expect("Failed to create encryption context");
    connection.set_encryption(context);
    connection
}

fn open(packet: &[u8]) -> Vec<u8> {
    let cipher = PacketCipher::new(&KEY, EncryptionMode::Normal).expect("Failed to create cipher");
    cipher.open(packet).expect("Failed to open packet").1
}

fn no_trailing_silence() -> DispatchOptions {
    DispatchOptions {
        trailing_silence_frames: 0,
        ..DispatchOptions::default()
    }
}

fn drain<T>(rx: &Receiver<T>) -> Vec<T> {
    let mut out = Vec::new();
    while let Ok(item) = rx.try_recv() {
        out.push(item);
    }
    out
}

fn drain_events(rx: &mut broadcast::Receiver<DispatchEvent>) -> Vec<DispatchEvent> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event);
    }
    out
}

/// Frames leave exactly every 20 ms, starting with the first frame
#[tokio::test(start_paused = true)]
async fn test_frames_are_paced_at_20ms() {
    let (frame_tx, source) = ChannelSource::bounded(16);
    for n in 0..5u8 {
        frame_tx.send(Ok(vec![n])).await.expect("Failed to queue frame");
    }
    drop(frame_tx);

    let (packet_tx, packet_rx) = unbounded();
    let mut player = Player::new(keyed_connection(), packet_tx, no_trailing_silence());
    let dispatcher = player.play(source).await;
    let start = Instant::now();

    let mut arrivals = Vec::new();
    for n in 0..5u8 {
        let packet = packet_rx.recv().await.expect("Missing packet");
        assert_eq!(open(&packet), vec![n]);
        arrivals.push(start.elapsed());
    }
    dispatcher.finished().await.expect("Dispatcher failed");

    let expected: Vec<_> = (0..5).map(|i| Duration::from_millis(20 * i)).collect();
    assert_eq!(arrivals, expected);
}

/// A hard pause stops sending and shifts the schedule by the pause length
#[tokio::test(start_paused = true)]
async fn test_hard_pause_shifts_schedule() {
    let (frame_tx, source) = ChannelSource::bounded(128);
    for _ in 0..100 {
        frame_tx.send(Ok(vec![1])).await.expect("Failed to queue frame");
    }

    let (packet_tx, packet_rx) = unbounded();
    let mut player = Player::new(keyed_connection(), packet_tx, DispatchOptions::default());
    let dispatcher = player.play(source).await;
    let handle = dispatcher.handle();
    let start = Instant::now();

    for _ in 0..3 {
        packet_rx.recv().await.expect("Missing packet");
    }
    handle.pause(false).await.expect("Pause failed");
    sleep(Duration::from_millis(100)).await;

    assert!(handle.is_paused());
    assert!(packet_rx.is_empty());
    assert_eq!(handle.total_pause_time(), Duration::from_millis(100));
    assert_eq!(handle.stream_time(), Duration::from_millis(60));

    handle.resume().await.expect("Resume failed");
    packet_rx.recv().await.expect("Missing packet after resume");
    assert_eq!(start.elapsed(), Duration::from_millis(160));

    let session = handle.session();
    assert_eq!(session.accumulated_pause, Duration::from_millis(100));
    assert_eq!(session.sequence, 4);
    assert_eq!(handle.total_pause_time_ms(), 100);

    handle.destroy().await;
    dispatcher.finished().await.expect("Dispatcher failed");
}

/// A silent pause keeps the stream alive with silence frames
#[tokio::test(start_paused = true)]
async fn test_silent_pause_sends_silence() {
    let (frame_tx, source) = ChannelSource::bounded(16);
    for _ in 0..4 {
        frame_tx.send(Ok(vec![7])).await.expect("Failed to queue frame");
    }

    let (packet_tx, packet_rx) = unbounded();
    let mut player = Player::new(keyed_connection(), packet_tx, DispatchOptions::default());
    let dispatcher = player.play(source).await;
    let handle = dispatcher.handle();

    packet_rx.recv().await.expect("Missing packet");
    handle.pause(true).await.expect("Pause failed");

    for _ in 0..3 {
        let packet = packet_rx.recv().await.expect("Missing silence packet");
        assert_eq!(open(&packet), SILENCE_FRAME.to_vec());
    }
    handle.resume().await.expect("Resume failed");

    let packet = packet_rx.recv().await.expect("Missing packet after resume");
    assert_eq!(open(&packet), vec![7]);

    let session = handle.session();
    assert_eq!(session.frame_count, 5);
    assert_eq!(session.accumulated_pause, Duration::ZERO);
    assert_eq!(session.accumulated_silent_pause, Duration::from_millis(60));
    assert_eq!(handle.stream_time(), Duration::from_millis(100));

    handle.destroy().await;
    dispatcher.finished().await.expect("Dispatcher failed");
}

/// Starting a new source tears down the previous dispatcher first
#[tokio::test(start_paused = true)]
async fn test_player_replaces_active_dispatcher() {
    let connection = keyed_connection();
    let (packet_tx, _packet_rx) = unbounded();
    let mut player = Player::new(connection.clone(), packet_tx, DispatchOptions::default());

    let (first_tx, first_source) = ChannelSource::bounded(1);
    let first = player.play(first_source).await;
    let (_second_tx, second_source) = ChannelSource::bounded(1);
    let second = player.play(second_source).await;

    assert_eq!(connection.active_dispatcher(), Some(second.id()));
    assert_eq!(player.current().map(|h| h.id()), Some(second.id()));
    assert!(first_tx.send(Ok(vec![1])).await.is_err());
    first.finished().await.expect("First dispatcher failed");

    player.stop().await;
    assert_eq!(connection.active_dispatcher(), None);
    second.finished().await.expect("Second dispatcher failed");
}

/// A source failure on the active dispatcher is fatal and reported
#[tokio::test(start_paused = true)]
async fn test_fatal_stream_error_surfaces_from_finished() {
    let (frame_tx, source) = ChannelSource::bounded(4);
    frame_tx
        .send(Err(StreamError::new(StreamStage::Input, "decoder crashed")))
        .await
        .expect("Failed to queue error");

    let (packet_tx, _packet_rx) = unbounded();
    let mut player = Player::new(keyed_connection(), packet_tx, DispatchOptions::default());
    let mut events = player.events().subscribe();
    let dispatcher = player.play(source).await;

    let result = dispatcher.finished().await;
    assert!(matches!(result, Err(DispatchError::Stream(ref e)) if e.stage == StreamStage::Input));
    assert!(drain_events(&mut events)
        .iter()
        .any(|e| matches!(e, DispatchEvent::Exception(_))));
}

/// Destroy can be repeated; commands afterwards report the dispatcher gone
#[tokio::test(start_paused = true)]
async fn test_destroy_is_idempotent() {
    let (_frame_tx, source) = ChannelSource::bounded(1);
    let (packet_tx, _packet_rx) = unbounded();
    let mut player = Player::new(keyed_connection(), packet_tx, DispatchOptions::default());
    let dispatcher = player.play(source).await;
    let handle = dispatcher.handle();

    handle.destroy().await;
    handle.destroy().await;

    assert!(matches!(handle.pause(false).await, Err(DispatchError::Destroyed)));
    assert!(!handle.set_volume(0.5).await);
    dispatcher.finished().await.expect("Dispatcher failed");
}

/// Without a key nothing is sent, but sequencing still advances
#[tokio::test(start_paused = true)]
async fn test_frames_without_key_are_suppressed() {
    let (frame_tx, source) = ChannelSource::bounded(4);
    for _ in 0..3 {
        frame_tx.send(Ok(vec![1])).await.expect("Failed to queue frame");
    }
    drop(frame_tx);

    let connection = Arc::new(ConnectionState::new());
    let (packet_tx, packet_rx) = unbounded();
    let mut player = Player::new(connection.clone(), packet_tx, no_trailing_silence());
    let mut events = player.events().subscribe();
    let dispatcher = player.play(source).await;
    let handle = dispatcher.handle();

    dispatcher.finished().await.expect("Dispatcher failed");

    assert!(packet_rx.is_empty());
    assert_eq!(handle.session().frame_count, 3);
    assert!(!connection.is_speaking());
    assert!(!drain_events(&mut events)
        .iter()
        .any(|e| matches!(e, DispatchEvent::Speaking(_))));
}

/// Trailing silence follows the last frame, then Finish is emitted
#[tokio::test(start_paused = true)]
async fn test_finish_after_trailing_silence() {
    let (frame_tx, source) = ChannelSource::bounded(4);
    frame_tx.send(Ok(vec![5])).await.expect("Failed to queue frame");
    drop(frame_tx);

    let options = DispatchOptions {
        trailing_silence_frames: 2,
        ..DispatchOptions::default()
    };
    let (packet_tx, packet_rx) = unbounded();
    let mut player = Player::new(keyed_connection(), packet_tx, options);
    let mut events = player.events().subscribe();
    let dispatcher = player.play(source).await;

    dispatcher.finished().await.expect("Dispatcher failed");

    let payloads: Vec<_> = drain(&packet_rx).iter().map(|p| open(p)).collect();
    assert_eq!(payloads, vec![vec![5], SILENCE_FRAME.to_vec(), SILENCE_FRAME.to_vec()]);

    let events = drain_events(&mut events);
    assert!(matches!(events.first(), Some(DispatchEvent::Start)));
    assert!(matches!(events.last(), Some(DispatchEvent::Finish)));
}

/// Volume and encoder settings reach a PCM source
#[tokio::test(start_paused = true)]
async fn test_controls_reach_pcm_source() {
    let (_pcm_tx, source) = PcmSource::channel(48_000, 4).expect("Failed to create source");
    let (packet_tx, _packet_rx) = unbounded();
    let mut player = Player::new(keyed_connection(), packet_tx, DispatchOptions::default());
    let dispatcher = player.play(source).await;
    let handle = dispatcher.handle();
    let mut events = handle.subscribe();

    assert!(handle.set_volume(0.5).await);
    assert!(!handle.set_volume(-1.0).await);
    assert!(handle.set_bitrate(48_000).await);
    assert!(handle.set_fec(true).await);
    assert!(handle.set_plp(10).await);
    assert!(!handle.set_plp(150).await);

    let changes: Vec<_> = drain_events(&mut events)
        .into_iter()
        .filter_map(|e| match e {
            DispatchEvent::VolumeChange { old, new } => Some((old, new)),
            _ => None,
        })
        .collect();
    assert_eq!(changes, vec![(1.0, 0.5)]);

    handle.destroy().await;
    dispatcher.finished().await.expect("Dispatcher failed");
}

/// Dispatchers on a shared clock each pull one frame per tick
#[tokio::test(start_paused = true)]
async fn test_broadcast_clock_paces_dispatchers() {
    let clock = BroadcastClock::start();
    let mut dispatchers = Vec::new();
    let mut receivers = Vec::new();

    for _ in 0..2 {
        let connection = keyed_connection();
        let id = DispatcherId::next();
        connection.activate(id);

        let (packet_tx, packet_rx) = unbounded();
        dispatchers.push(Dispatcher::spawn_with(
            id,
            SilenceSource,
            packet_tx,
            connection,
            Pacing::Broadcast(clock.clone()),
            EventEmitter::new(),
            DispatchOptions::default(),
        ));
        receivers.push(packet_rx);
    }

    for rx in &receivers {
        for _ in 0..3 {
            rx.recv().await.expect("Missing broadcast packet");
        }
    }
    assert_eq!(clock.subscriber_count(), 2);

    for dispatcher in dispatchers {
        dispatcher.handle().destroy().await;
        dispatcher.finished().await.expect("Dispatcher failed");
    }
    assert_eq!(clock.subscriber_count(), 0);
}

/// Destroy returns even while a send is stuck on a transport nobody drains
#[tokio::test(start_paused = true)]
async fn test_destroy_interrupts_stalled_send() {
    let connection = keyed_connection();
    let (packet_tx, packet_rx) = bounded(1);
    let mut player = Player::new(connection.clone(), packet_tx, DispatchOptions::default());
    let dispatcher = player.play(SilenceSource).await;
    let handle = dispatcher.handle();

    sleep(Duration::from_millis(100)).await;
    assert!(packet_rx.is_full());
    assert_eq!(handle.session().frame_count, 1);

    timeout(Duration::from_secs(5), player.stop())
        .await
        .expect("Stop hung on a stalled transport");
    assert_eq!(connection.active_dispatcher(), None);
    assert!(!connection.is_speaking());
    dispatcher.finished().await.expect("Dispatcher failed");

    let next = player.play(SilenceSource).await;
    assert_eq!(connection.active_dispatcher(), Some(next.id()));
    timeout(Duration::from_secs(5), next.handle().destroy())
        .await
        .expect("Destroy hung on a stalled transport");
    drop(packet_rx);
}

/// Every subscriber gets its own copy of each event
#[tokio::test(start_paused = true)]
async fn test_every_subscriber_sees_start() {
    let (frame_tx, source) = ChannelSource::bounded(4);
    frame_tx.send(Ok(vec![1])).await.expect("Failed to queue frame");
    drop(frame_tx);

    let (packet_tx, _packet_rx) = unbounded();
    let mut player = Player::new(keyed_connection(), packet_tx, no_trailing_silence());
    let mut first = player.events().subscribe();
    let mut second = player.events().subscribe();
    let dispatcher = player.play(source).await;

    dispatcher.finished().await.expect("Dispatcher failed");

    for events in [&mut first, &mut second] {
        let events = drain_events(events);
        assert!(matches!(events.first(), Some(DispatchEvent::Start)));
        assert!(matches!(events.last(), Some(DispatchEvent::Finish)));
    }
}

/// Wall-clock totals stop advancing once the dispatcher is destroyed
#[tokio::test(start_paused = true)]
async fn test_total_stream_time_freezes_after_destroy() {
    let (packet_tx, packet_rx) = unbounded();
    let mut player = Player::new(keyed_connection(), packet_tx, DispatchOptions::default());
    let dispatcher = player.play(SilenceSource).await;
    let handle = dispatcher.handle();

    for _ in 0..3 {
        packet_rx.recv().await.expect("Missing packet");
    }
    sleep(Duration::from_millis(10)).await;
    handle.destroy().await;
    let total = handle.total_stream_time();
    assert_eq!(total, Duration::from_millis(50));

    sleep(Duration::from_secs(10)).await;
    assert_eq!(handle.total_stream_time(), total);
    assert_eq!(handle.total_stream_time_ms(), 50);
    dispatcher.finished().await.expect("Dispatcher failed");
}
