use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;
use tracing::debug;

use super::session::Session;

/// Session file name in the data directory
pub const SESSION_FILE: &str = "session.json";

/// ChaCha20-Poly1305 nonce length in bytes
const NONCE_LEN: usize = 12;

/// Key length in bytes
pub const SESSION_KEY_LEN: usize = 32;

/// Seals persisted sessions with ChaCha20-Poly1305.
/// Output layout is `nonce || ciphertext`.
#[derive(Clone)]
pub struct SessionCipher {
    key: [u8; SESSION_KEY_LEN],
}

impl SessionCipher {
    pub fn new(key: [u8; SESSION_KEY_LEN]) -> Self {
        Self { key }
    }

    pub fn generate_key() -> [u8; SESSION_KEY_LEN] {
        let mut key = [0u8; SESSION_KEY_LEN];
        rand::thread_rng().fill_bytes(&mut key);
        key
    }

    fn cipher(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new(Key::from_slice(&self.key))
    }

    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher()
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| anyhow!("Failed to encrypt session"))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>> {
        if sealed.len() < NONCE_LEN {
            return Err(anyhow!("Encrypted session is truncated"));
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        self.cipher()
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| anyhow!("Failed to decrypt session - key mismatch or corrupted file"))
    }
}

/// Persists the current session on disk, optionally encrypted
pub struct SessionFile {
    path: PathBuf,
    cipher: Option<SessionCipher>,
}

impl SessionFile {
    pub fn new(dir: &Path) -> Self {
        Self {
            path: dir.join(SESSION_FILE),
            cipher: None,
        }
    }

    pub fn encrypted(dir: &Path, cipher: SessionCipher) -> Self {
        Self {
            path: dir.join(SESSION_FILE),
            cipher: Some(cipher),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the session from disk. Expired sessions that cannot be refreshed are discarded.
    pub fn load(&self) -> Result<Option<Session>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let bytes = std::fs::read(&self.path).context("Failed to read session file")?;
        let bytes = match self.cipher {
            Some(ref cipher) => cipher.open(&bytes)?,
            None => bytes,
        };
        let session: Session =
            serde_json::from_slice(&bytes).context("Failed to parse session file")?;

        if session.is_expired() && !session.can_refresh() {
            debug!("Discarding expired session from disk");
            return Ok(None);
        }
        Ok(Some(session))
    }

    /// Save session to disk
    pub fn save(&self, session: &Session) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_vec_pretty(session)?;
        let contents = match self.cipher {
            Some(ref cipher) => cipher.seal(&contents)?,
            None => contents,
        };
        std::fs::write(&self.path, contents).context("Failed to write session file")?;
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path).context("Failed to remove session file")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::session::test_session;
    use chrono::{Duration, Utc};

    #[test]
    fn test_plain_save_load_clear() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = SessionFile::new(dir.path());
        assert!(file.load().expect("load").is_none());

        let session = test_session("tok", "u1");
        file.save(&session).expect("save");
        assert_eq!(file.load().expect("load"), Some(session));

        file.clear().expect("clear");
        assert!(!file.path().exists());
        file.clear().expect("clearing twice is fine");
    }

    #[test]
    fn test_encrypted_file_is_not_plaintext() {
        let dir = tempfile::tempdir().expect("tempdir");
        let key = SessionCipher::generate_key();
        let file = SessionFile::encrypted(dir.path(), SessionCipher::new(key));

        let session = test_session("secret-access-token", "u1");
        file.save(&session).expect("save");

        let raw = std::fs::read(file.path()).expect("read");
        assert!(!String::from_utf8_lossy(&raw).contains("secret-access-token"));
        assert_eq!(file.load().expect("load"), Some(session));
    }

    #[test]
    fn test_wrong_key_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        SessionFile::encrypted(dir.path(), SessionCipher::new([1u8; SESSION_KEY_LEN]))
            .save(&test_session("t", "u1"))
            .expect("save");

        let other = SessionFile::encrypted(dir.path(), SessionCipher::new([2u8; SESSION_KEY_LEN]));
        assert!(other.load().is_err());
    }

    #[test]
    fn test_expired_session_without_refresh_is_dropped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = SessionFile::new(dir.path());

        let mut session = test_session("t", "u1");
        session.expires_at = Some(Utc::now() - Duration::minutes(5));
        file.save(&session).expect("save");
        assert!(file.load().expect("load").is_some(), "refreshable session is kept");

        session.refresh_token = None;
        file.save(&session).expect("save");
        assert!(file.load().expect("load").is_none());
    }

    #[test]
    fn test_open_rejects_truncated_input() {
        let cipher = SessionCipher::new([0u8; SESSION_KEY_LEN]);
        assert!(cipher.open(&[1, 2, 3]).is_err());
    }
}
