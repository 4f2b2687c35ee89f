//! The voice connection a dispatcher sends through.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tracing::debug;
use voicecast_protocol::{EncryptionMode, PacketCipher, ProtocolError, RtpHeader};

static NEXT_DISPATCHER_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one dispatcher, unique within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DispatcherId(u64);

impl DispatcherId {
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_DISPATCHER_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for DispatcherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Session key material for an authenticated voice session. Read-only once
/// created; shared by every dispatcher on the connection.
#[derive(Debug)]
pub struct EncryptionContext {
    cipher: PacketCipher,
    ssrc: u32,
}

impl EncryptionContext {
    /// # Errors
    /// Returns error if the key is not 32 bytes.
    pub fn new(secret_key: &[u8], mode: EncryptionMode, ssrc: u32) -> Result<Self, ProtocolError> {
        Ok(Self {
            cipher: PacketCipher::new(secret_key, mode)?,
            ssrc,
        })
    }

    #[must_use]
    pub fn ssrc(&self) -> u32 {
        self.ssrc
    }

    #[must_use]
    pub fn mode(&self) -> EncryptionMode {
        self.cipher.mode()
    }

    /// # Errors
    /// Returns [`ProtocolError::Encryption`] if sealing fails.
    pub fn seal(&self, header: &RtpHeader, lite_nonce: u32, payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
        self.cipher.seal(header, lite_nonce, payload)
    }
}

/// What a dispatcher needs from the connection that owns it.
pub trait VoiceConnection: Send + Sync {
    /// `None` until the session description arrived.
    fn encryption(&self) -> Option<Arc<EncryptionContext>>;

    fn is_active_dispatcher(&self, id: DispatcherId) -> bool;

    fn set_speaking(&self, speaking: bool);

    /// Clears the active slot if `id` holds it.
    fn detach_dispatcher(&self, id: DispatcherId);
}

/// Connection state shared between the player and its dispatchers.
#[derive(Default)]
pub struct ConnectionState {
    encryption: ArcSwapOption<EncryptionContext>,
    active: AtomicU64,
    speaking: AtomicBool,
}

impl ConnectionState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_encryption(&self, context: EncryptionContext) {
        debug!("Voice session secured: mode={}, ssrc={}", context.mode(), context.ssrc);
        self.encryption.store(Some(Arc::new(context)));
    }

    pub fn clear_encryption(&self) {
        self.encryption.store(None);
    }

    /// Makes `id` the only dispatcher allowed to send.
    pub fn activate(&self, id: DispatcherId) {
        self.active.store(id.as_u64(), Ordering::SeqCst);
    }

    #[must_use]
    pub fn active_dispatcher(&self) -> Option<DispatcherId> {
        match self.active.load(Ordering::SeqCst) {
            0 => None,
            id => Some(DispatcherId(id)),
        }
    }

    #[must_use]
    pub fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::Relaxed)
    }
}

impl VoiceConnection for ConnectionState {
    fn encryption(&self) -> Option<Arc<EncryptionContext>> {
        self.encryption.load_full()
    }

    fn is_active_dispatcher(&self, id: DispatcherId) -> bool {
        self.active.load(Ordering::SeqCst) == id.as_u64()
    }

    fn set_speaking(&self, speaking: bool) {
        if self.speaking.swap(speaking, Ordering::Relaxed) != speaking {
            debug!("Speaking state changed: {}", speaking);
        }
    }

    fn detach_dispatcher(&self, id: DispatcherId) {
        let _ = self
            .active
            .compare_exchange(id.as_u64(), 0, Ordering::SeqCst, Ordering::SeqCst);
    }
}
