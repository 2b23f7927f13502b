//! Decryption collaborators for entry data.
//!
//! Header parsers describe how an entry is protected with an [`Encryption`]
//! tag; the reader turns that tag into a byte-for-byte transform applied
//! before the codec sees the data. Only the AES-256 + SHA-256 iterated key
//! scheme is implemented here (feature `aes`); other schemes are reported as
//! [`Error::UnsupportedEncryption`](crate::Error::UnsupportedEncryption).
//!
//! # Key Derivation Caching
//!
//! Key derivation is computationally expensive (e.g., 524,288 SHA-256 iterations
//! for num_cycles_power=19). [`KeyCache`] avoids re-deriving the same key
//! when many entries share one password/salt combination.

mod password;

#[cfg(feature = "aes")]
mod properties;

use std::io::Read;

use crate::{Error, Result};

pub use password::Password;

#[cfg(feature = "aes")]
pub use aes_impl::{Aes256Decoder, CacheStats, KeyCache, MAX_NUM_CYCLES_POWER, derive_key};
#[cfg(feature = "aes")]
pub use properties::AesProperties;

/// Encryption applied to an entry's data.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Encryption {
    /// AES-256-CBC with a SHA-256 iterated key (properties: cycles, salt, IV).
    Aes256Sha256 {
        /// Raw coder properties, parsed by [`AesProperties`] when enabled.
        properties: Vec<u8>,
    },
    /// Traditional PKWARE stream cipher.
    ZipCrypto,
    /// WinZip AES with the given key strength code (1-3).
    WinZipAes {
        /// Key strength code.
        strength: u8,
    },
    /// RAR's own scheme for the given format generation.
    Rar {
        /// Format generation (e.g. 3 or 5).
        version: u8,
    },
}

impl Encryption {
    /// Short scheme name used in error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Aes256Sha256 { .. } => "AES-256/SHA-256",
            Self::ZipCrypto => "ZipCrypto",
            Self::WinZipAes { .. } => "WinZip AES",
            Self::Rar { .. } => "RAR",
        }
    }
}

impl std::fmt::Display for Encryption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WinZipAes { strength } => write!(f, "WinZip AES (strength {})", strength),
            Self::Rar { version } => write!(f, "RAR{} encryption", version),
            other => f.write_str(other.name()),
        }
    }
}

/// Turns encrypted entry bytes into plaintext for the codec.
///
/// One instance lives for the whole archive so derived keys are reused
/// across entries.
pub struct Decryptor {
    password: Option<Password>,
    #[cfg(feature = "aes")]
    keys: KeyCache,
}

impl std::fmt::Debug for Decryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Decryptor")
            .field("has_password", &self.password.is_some())
            .finish_non_exhaustive()
    }
}

impl Decryptor {
    /// Number of derived keys kept per archive.
    const KEY_CACHE_CAPACITY: usize = 8;

    /// Creates a decryptor using the given password, if any.
    pub fn new(password: Option<Password>) -> Self {
        Self {
            password,
            #[cfg(feature = "aes")]
            keys: KeyCache::new(Self::KEY_CACHE_CAPACITY),
        }
    }

    /// Returns true if a password was supplied.
    pub fn has_password(&self) -> bool {
        self.password.is_some()
    }

    /// Wraps `input` in the decrypting transform for `encryption`.
    ///
    /// # Errors
    ///
    /// * [`Error::PasswordRequired`] when no password was supplied
    /// * [`Error::UnsupportedEncryption`] for schemes without an implementation
    /// * [`Error::UnsupportedFeature`] when the `aes` feature is disabled
    pub fn wrap<R: Read + Send + 'static>(
        &self,
        input: R,
        encryption: &Encryption,
    ) -> Result<Box<dyn Read + Send>> {
        let Some(password) = self.password.as_ref() else {
            return Err(Error::PasswordRequired);
        };

        match encryption {
            #[cfg(feature = "aes")]
            Encryption::Aes256Sha256 { properties } => {
                let props = AesProperties::parse(properties)?;
                let key = self
                    .keys
                    .derive_key(password, &props.salt, props.num_cycles_power)?;
                let mut iv = [0u8; 16];
                iv.copy_from_slice(&props.iv[..16]);
                Ok(Box::new(Aes256Decoder::with_key_iv(input, key, iv)))
            }
            #[cfg(not(feature = "aes"))]
            Encryption::Aes256Sha256 { .. } => {
                let _ = (password, input);
                Err(Error::UnsupportedFeature { feature: "aes" })
            }
            other => {
                let _ = password;
                Err(Error::UnsupportedEncryption(other.to_string()))
            }
        }
    }
}

#[cfg(feature = "aes")]
mod aes_impl {
    use aes::Aes256;
    use cbc::cipher::{BlockDecryptMut, KeyIvInit};
    use lru::LruCache;
    use sha2::{Digest, Sha256};
    use std::io::{self, Read};
    use std::num::NonZeroUsize;
    use std::sync::Mutex;

    use super::{AesProperties, Password};
    use crate::Result;

    type Aes256CbcDec = cbc::Decryptor<Aes256>;

    /// Acquires a mutex lock, recovering from poisoned state if necessary.
    ///
    /// Cached keys are deterministically derivable from password/salt, so a
    /// poisoned cache is still valid.
    fn lock_or_recover<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
        mutex.lock().unwrap_or_else(|poisoned| {
            log::warn!("KeyCache mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// AES block size in bytes.
    const BLOCK_SIZE: usize = 16;

    /// Ciphertext read per refill (a multiple of the block size).
    const CHUNK_SIZE: usize = 4096;

    /// Maximum allowed value for `num_cycles_power` in key derivation.
    ///
    /// 2^30 iterations take several seconds; anything above is rejected so a
    /// hostile header cannot stall the reader.
    pub const MAX_NUM_CYCLES_POWER: u8 = 30;

    /// Derives an AES-256 key from a password using the SHA-256 iteration scheme.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::ResourceLimitExceeded`] if `num_cycles_power`
    /// exceeds [`MAX_NUM_CYCLES_POWER`].
    pub fn derive_key(
        password: &Password,
        salt: &[u8],
        num_cycles_power: u8,
    ) -> Result<[u8; 32]> {
        if num_cycles_power > MAX_NUM_CYCLES_POWER {
            log::warn!(
                "Key derivation cycles_power {} exceeds maximum {}, rejecting",
                num_cycles_power,
                MAX_NUM_CYCLES_POWER
            );
            return Err(crate::Error::ResourceLimitExceeded(format!(
                "key derivation cycles_power {} exceeds maximum {}",
                num_cycles_power, MAX_NUM_CYCLES_POWER
            )));
        }

        let iterations = 1u64 << num_cycles_power;
        let password_bytes = password.as_utf16_le();

        let mut hash_input = Vec::with_capacity(salt.len() + password_bytes.len() + 8);
        let mut sha = Sha256::new();

        for i in 0..iterations {
            hash_input.clear();
            hash_input.extend_from_slice(salt);
            hash_input.extend_from_slice(&password_bytes);
            hash_input.extend_from_slice(&i.to_le_bytes());
            sha.update(&hash_input);
        }

        Ok(sha.finalize().into())
    }

    #[derive(Debug, Clone, PartialEq, Eq, Hash)]
    struct CacheKey {
        /// Hash of the password; the plaintext is never stored.
        password_hash: [u8; 32],
        salt: Vec<u8>,
        num_cycles_power: u8,
    }

    impl CacheKey {
        fn new(password: &Password, salt: &[u8], num_cycles_power: u8) -> Self {
            let password_hash: [u8; 32] = Sha256::digest(&*password.as_utf16_le()).into();
            Self {
                password_hash,
                salt: salt.to_vec(),
                num_cycles_power,
            }
        }
    }

    /// Cache for derived AES keys.
    ///
    /// Thread-safe; share it with `Arc<KeyCache>` if several readers decrypt
    /// the same archive set.
    pub struct KeyCache {
        cache: Mutex<LruCache<CacheKey, [u8; 32]>>,
        stats: Mutex<CacheStats>,
    }

    impl std::fmt::Debug for KeyCache {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("KeyCache")
                .field("len", &self.len())
                .finish_non_exhaustive()
        }
    }

    /// Statistics for key cache usage.
    #[derive(Debug, Clone, Default)]
    pub struct CacheStats {
        /// Number of cache hits.
        pub hits: u64,
        /// Number of cache misses.
        pub misses: u64,
        /// Total iterations avoided by caching.
        pub iterations_saved: u64,
    }

    impl CacheStats {
        /// Returns the cache hit ratio (0.0 to 1.0).
        pub fn hit_ratio(&self) -> f64 {
            let total = self.hits + self.misses;
            if total == 0 {
                0.0
            } else {
                self.hits as f64 / total as f64
            }
        }
    }

    impl KeyCache {
        /// Creates a new key cache holding at most `capacity` keys.
        pub fn new(capacity: usize) -> Self {
            let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
            Self {
                cache: Mutex::new(LruCache::new(cap)),
                stats: Mutex::new(CacheStats::default()),
            }
        }

        /// Derives a key, using the cache if available.
        ///
        /// # Errors
        ///
        /// Returns an error if `num_cycles_power` exceeds [`MAX_NUM_CYCLES_POWER`].
        pub fn derive_key(
            &self,
            password: &Password,
            salt: &[u8],
            num_cycles_power: u8,
        ) -> Result<[u8; 32]> {
            let cache_key = CacheKey::new(password, salt, num_cycles_power);

            if let Some(&key) = lock_or_recover(&self.cache).get(&cache_key) {
                let mut stats = lock_or_recover(&self.stats);
                stats.hits += 1;
                stats.iterations_saved += 1u64 << num_cycles_power;
                return Ok(key);
            }

            let key = derive_key(password, salt, num_cycles_power)?;

            lock_or_recover(&self.cache).put(cache_key, key);
            lock_or_recover(&self.stats).misses += 1;

            Ok(key)
        }

        /// Returns the cache statistics.
        pub fn stats(&self) -> CacheStats {
            lock_or_recover(&self.stats).clone()
        }

        /// Clears all cached keys.
        pub fn clear(&self) {
            lock_or_recover(&self.cache).clear();
        }

        /// Returns the current number of cached keys.
        pub fn len(&self) -> usize {
            lock_or_recover(&self.cache).len()
        }

        /// Returns true if the cache is empty.
        pub fn is_empty(&self) -> bool {
            lock_or_recover(&self.cache).is_empty()
        }
    }

    /// AES-256-CBC decoder for reading encrypted streams.
    ///
    /// Output keeps any block padding; the codec (or the declared entry size)
    /// decides where the plaintext ends.
    ///
    /// A short read from the input is not the end of the stream: ciphertext
    /// that does not fill a whole block is held until more arrives. Solid
    /// streams rely on this, since their input pauses at every entry boundary.
    pub struct Aes256Decoder<R> {
        inner: R,
        /// Ciphertext bytes not yet forming a whole block.
        pending: Vec<u8>,
        buffer: Vec<u8>,
        pos: usize,
        key: [u8; 32],
        iv: [u8; 16],
    }

    impl<R> std::fmt::Debug for Aes256Decoder<R> {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("Aes256Decoder")
                .field("pending", &self.pending.len())
                .finish_non_exhaustive()
        }
    }

    impl<R: Read + Send> Aes256Decoder<R> {
        /// Creates a new AES-256 decoder, deriving the key from `password`.
        ///
        /// # Errors
        ///
        /// Returns an error if properties are invalid or if `num_cycles_power`
        /// exceeds [`MAX_NUM_CYCLES_POWER`].
        pub fn new(input: R, properties: &[u8], password: &Password) -> Result<Self> {
            let props = AesProperties::parse(properties)?;
            let key = derive_key(password, &props.salt, props.num_cycles_power)?;

            let mut iv = [0u8; 16];
            iv.copy_from_slice(&props.iv[..16]);

            Ok(Self::with_key_iv(input, key, iv))
        }

        /// Creates a decoder with explicit key and IV.
        pub fn with_key_iv(input: R, key: [u8; 32], iv: [u8; 16]) -> Self {
            Self {
                inner: input,
                pending: Vec::with_capacity(BLOCK_SIZE),
                buffer: Vec::new(),
                pos: 0,
                key,
                iv,
            }
        }

        /// Reads until `buf` is full or the input pauses.
        fn fill(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let mut filled = 0;
            while filled < buf.len() {
                match self.inner.read(&mut buf[filled..]) {
                    Ok(0) => break,
                    Ok(n) => filled += n,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e),
                }
            }
            Ok(filled)
        }

        /// Decrypts the next run of whole blocks. Leaves `buffer` empty when
        /// the input has nothing more to give right now.
        fn decrypt_buffer(&mut self) -> io::Result<()> {
            let held = self.pending.len();
            let mut encrypted = vec![0u8; CHUNK_SIZE];
            encrypted[..held].copy_from_slice(&self.pending);
            let n = held + self.fill(&mut encrypted[held..])?;

            let aligned = n - n % BLOCK_SIZE;
            self.pending.clear();
            self.pending.extend_from_slice(&encrypted[aligned..n]);
            self.buffer.clear();
            self.pos = 0;
            if aligned == 0 {
                return Ok(());
            }
            encrypted.truncate(aligned);

            // The last ciphertext block is the IV of the next run
            let mut next_iv = [0u8; 16];
            next_iv.copy_from_slice(&encrypted[aligned - BLOCK_SIZE..]);

            let decryptor = Aes256CbcDec::new(&self.key.into(), &self.iv.into());
            let decrypted = decryptor
                .decrypt_padded_mut::<cbc::cipher::block_padding::NoPadding>(&mut encrypted)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;

            self.iv = next_iv;
            self.buffer = decrypted.to_vec();
            Ok(())
        }
    }

    impl<R: Read + Send> Read for Aes256Decoder<R> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if buf.is_empty() {
                return Ok(0);
            }
            if self.pos >= self.buffer.len() {
                self.decrypt_buffer()?;
            }

            if self.pos >= self.buffer.len() {
                return Ok(0);
            }

            let available = &self.buffer[self.pos..];
            let to_copy = available.len().min(buf.len());
            buf[..to_copy].copy_from_slice(&available[..to_copy]);
            self.pos += to_copy;

            Ok(to_copy)
        }
    }

}
