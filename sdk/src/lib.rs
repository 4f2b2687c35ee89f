pub mod broadcast;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod network;
pub mod player;
pub mod scheduler;
pub mod session;
pub mod source;
pub mod speaking;
pub mod voice;

pub use broadcast::{BroadcastClock, BroadcastLink};
pub use config::DispatchOptions;
pub use connection::{ConnectionState, DispatcherId, EncryptionContext, VoiceConnection};
pub use dispatcher::{Dispatcher, DispatcherHandle, Pacing};
pub use error::{DispatchError, StreamError, StreamStage, TransportError};
pub use events::{DispatchEvent, EventEmitter};
pub use network::{Transport, UdpTransport};
pub use player::Player;
pub use session::{DispatchSession, PauseKind, FRAME_DURATION, TIMESTAMP_STEP};
pub use source::{ChannelSource, EncoderControl, Frame, FrameSource, SilenceSource, VolumeControl, SILENCE_FRAME};
pub use voice::{PcmSender, PcmSource};

// Protocol types that appear in this crate's public API
pub use voicecast_protocol::{EncryptionMode, ProtocolError};
