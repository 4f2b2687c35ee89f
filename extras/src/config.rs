//! File configuration for the dispatch tools.

use std::env;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use voicecast_sdk::{DispatchOptions, EncryptionContext, EncryptionMode, ProtocolError};

/// Default UDP voice endpoint.
pub const DEFAULT_VOICE_SERVER: &str = "127.0.0.1:9002";

/// Overrides `voice_server` when set.
pub const VOICE_SERVER_ADDR_ENV: &str = "VOICE_SERVER_ADDR";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid secret key: {0}")]
    Key(#[from] hex::FromHexError),

    #[error("Invalid encryption settings: {0}")]
    Encryption(#[from] ProtocolError),
}

/// Voice session parameters as negotiated out of band.
#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    #[serde(default = "default_voice_server")]
    pub voice_server: String,
    pub ssrc: u32,
    #[serde(default = "default_mode")]
    pub mode: String,
    /// 32-byte key as hex.
    pub secret_key: String,
    #[serde(default)]
    pub options: DispatchOptions,
}

fn default_voice_server() -> String {
    DEFAULT_VOICE_SERVER.to_string()
}

fn default_mode() -> String {
    EncryptionMode::Lite.as_str().to_string()
}

impl DispatchConfig {
    /// Reads the file and applies the environment override.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let mut config = Self::from_toml(&contents)?;

        if let Ok(addr) = env::var(VOICE_SERVER_ADDR_ENV) {
            tracing::info!("Voice server overridden by {}: {}", VOICE_SERVER_ADDR_ENV, addr);
            config.voice_server = addr;
        }
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn encryption_mode(&self) -> Result<EncryptionMode, ConfigError> {
        Ok(self.mode.parse()?)
    }

    pub fn secret_key(&self) -> Result<Vec<u8>, ConfigError> {
        Ok(hex::decode(self.secret_key.trim())?)
    }

    pub fn encryption_context(&self) -> Result<EncryptionContext, ConfigError> {
        let key = self.secret_key()?;
        Ok(EncryptionContext::new(&key, self.encryption_mode()?, self.ssrc)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY_HEX: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

    #[test]
    fn parses_full_config() {
        let config = DispatchConfig::from_toml(&format!(
            r#"
            voice_server = "10.0.0.1:50000"
            ssrc = 1234
            mode = "xsalsa20_poly1305_suffix"
            secret_key = "{KEY_HEX}"

            [options]
            bitrate = 96000
            trailing_silence_frames = 3
            "#
        ))
        .unwrap();

        assert_eq!(config.voice_server, "10.0.0.1:50000");
        assert_eq!(config.encryption_mode().unwrap(), EncryptionMode::Suffix);
        assert_eq!(config.options.bitrate, Some(96_000));
        assert_eq!(config.options.trailing_silence_frames, 3);

        let key = config.secret_key().unwrap();
        assert_eq!(key.len(), 32);
        assert_eq!(key[31], 0x1f);
        assert_eq!(config.encryption_context().unwrap().ssrc(), 1234);
    }

    #[test]
    fn defaults_apply() {
        let config =
            DispatchConfig::from_toml(&format!("ssrc = 1\nsecret_key = \"{KEY_HEX}\"")).unwrap();
        assert_eq!(config.voice_server, DEFAULT_VOICE_SERVER);
        assert_eq!(config.encryption_mode().unwrap(), EncryptionMode::Lite);
        assert_eq!(config.options, DispatchOptions::default());
    }

    #[test]
    fn bad_keys_are_rejected() {
        let odd = DispatchConfig::from_toml("ssrc = 1\nsecret_key = \"abc\"").unwrap();
        assert!(matches!(
            odd.secret_key(),
            Err(ConfigError::Key(hex::FromHexError::OddLength))
        ));

        let short = DispatchConfig::from_toml("ssrc = 1\nsecret_key = \"abcd\"").unwrap();
        assert!(matches!(
            short.encryption_context(),
            Err(ConfigError::Encryption(ProtocolError::InvalidKeyLength { .. }))
        ));

        let junk = DispatchConfig::from_toml("ssrc = 1\nsecret_key = \"zz\"").unwrap();
        assert!(matches!(
            junk.secret_key(),
            Err(ConfigError::Key(hex::FromHexError::InvalidHexCharacter { c: 'z', index: 0 }))
        ));

        let padded =
            DispatchConfig::from_toml(&format!("ssrc = 1\nsecret_key = \"  {KEY_HEX} \"")).unwrap();
        assert_eq!(padded.secret_key().unwrap().len(), 32);
    }

    #[test]
    fn unknown_mode_is_rejected() {
        let config = DispatchConfig::from_toml(&format!(
            "ssrc = 1\nmode = \"aes256_gcm\"\nsecret_key = \"{KEY_HEX}\""
        ))
        .unwrap();
        assert!(matches!(
            config.encryption_mode(),
            Err(ConfigError::Encryption(ProtocolError::UnknownMode(_)))
        ));
    }
}
