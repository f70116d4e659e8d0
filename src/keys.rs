//! Keys name every node of the roster tree. New entities get their keys from a
//! [`KeyAllocator`], which is injected into the roster so tests can mint
//! deterministic keys.

use std::fmt::{Display, Formatter};
use std::sync::{Mutex, PoisonError};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::store::Path;

/// Longest key (in bytes) the store accepts.
pub const MAX_KEY_LENGTH: usize = 768;

const FORBIDDEN_KEY_CHARS: [char; 6] = ['.', '$', '#', '[', ']', '/'];

/// Alphabet of push keys, ordered by ASCII value so keys sort by creation time.
const PUSH_CHARS: &[u8; 64] = b"-0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("key can't be empty")]
    Empty,
    #[error("key is {0} bytes long, keys are limited to 768 bytes")]
    TooLong(usize),
    #[error("key '{key}' contains forbidden character {ch:?}")]
    Forbidden { key: String, ch: char },
    #[error("unable to allocate a new key under '{0}'")]
    Exhausted(String),
}

/// A single validated path segment.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Key(String);

impl Key {
    pub fn new(key: impl Into<String>) -> Result<Key, KeyError> {
        let key = key.into();
        if key.is_empty() {
            return Err(KeyError::Empty);
        }
        if key.len() > MAX_KEY_LENGTH {
            return Err(KeyError::TooLong(key.len()));
        }
        if let Some(ch) = key
            .chars()
            .find(|c| FORBIDDEN_KEY_CHARS.contains(c) || c.is_ascii_control())
        {
            return Err(KeyError::Forbidden { key, ch });
        }
        Ok(Key(key))
    }

    /// Field names of the persisted layout. They are compile time constants, so
    /// validation is only asserted in debug builds.
    pub(crate) fn field(name: &'static str) -> Key {
        debug_assert!(Key::new(name).is_ok(), "invalid field name '{}'", name);
        Key(name.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl Display for Key {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Key {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Key {
    type Error = KeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Key::new(value)
    }
}

impl TryFrom<&str> for Key {
    type Error = KeyError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Key::new(value)
    }
}

impl From<Key> for String {
    fn from(key: Key) -> Self {
        key.0
    }
}

/// Mints keys for new records. Allocation reserves nothing; the caller writes a
/// record at the returned key.
pub trait KeyAllocator: std::fmt::Debug + Send + Sync {
    fn allocate(&self, scope: &Path) -> Result<Key, KeyError>;
}

#[derive(Debug, Default)]
struct PushState {
    last_millis: i64,
    last_random: [u8; 12],
}

/// Push-style keys: 8 characters of millisecond timestamp followed by 12
/// random characters. Keys minted by one allocator are strictly increasing;
/// keys from different allocators collide only if the 72 random bits do.
#[derive(Debug, Default)]
pub struct PushKeyAllocator {
    state: Mutex<PushState>,
}

impl PushKeyAllocator {
    pub fn new() -> PushKeyAllocator {
        PushKeyAllocator::default()
    }

    fn mint(&self, now: i64) -> Option<String> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        if now == state.last_millis {
            // Same millisecond: increment the random suffix to keep ordering.
            let digit = state.last_random.iter().rposition(|it| *it < 63)?;
            state.last_random[digit] += 1;
            for it in state.last_random[digit + 1..].iter_mut() {
                *it = 0;
            }
        } else {
            state.last_millis = now;
            for it in state.last_random.iter_mut() {
                *it = rand::random::<u8>() % 64;
            }
        }

        let mut key = String::with_capacity(20);
        let mut stamp = [0u8; 8];
        let mut remaining = now;
        for it in stamp.iter_mut().rev() {
            *it = PUSH_CHARS[remaining.rem_euclid(64) as usize];
            remaining = remaining.div_euclid(64);
        }
        key.extend(stamp.iter().map(|it| *it as char));
        key.extend(
            state
                .last_random
                .iter()
                .map(|it| PUSH_CHARS[*it as usize] as char),
        );

        Some(key)
    }
}

impl KeyAllocator for PushKeyAllocator {
    fn allocate(&self, scope: &Path) -> Result<Key, KeyError> {
        let key = self
            .mint(Utc::now().timestamp_millis())
            .ok_or_else(|| KeyError::Exhausted(scope.to_string()))?;
        tracing::trace!("allocated key {} under {}", key, scope);
        Ok(Key(key))
    }
}

/// Random v4 UUID keys. Unordered, useful where creation order doesn't matter.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidKeyAllocator;

impl KeyAllocator for UuidKeyAllocator {
    fn allocate(&self, _scope: &Path) -> Result<Key, KeyError> {
        Ok(Key(Uuid::new_v4().to_string()))
    }
}

/// Key under which a student record lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StudentKey {
    /// The external student ID is the key; a second record with the same ID
    /// targets the same node.
    External(Key),
    Minted(Key),
}

impl StudentKey {
    pub fn key(&self) -> &Key {
        match self {
            StudentKey::External(key) | StudentKey::Minted(key) => key,
        }
    }

    pub fn into_key(self) -> Key {
        match self {
            StudentKey::External(key) | StudentKey::Minted(key) => key,
        }
    }
}

/// Picks the key of a student record: the trimmed external ID when it is
/// present and usable as a key, a freshly minted key otherwise.
pub fn choose_student_key(
    external_id: Option<&str>,
    keys: &dyn KeyAllocator,
    students: &Path,
) -> Result<StudentKey, KeyError> {
    match external_id.map(str::trim).filter(|it| !it.is_empty()) {
        Some(id) => match Key::new(id) {
            Ok(key) => Ok(StudentKey::External(key)),
            Err(err) => {
                tracing::warn!("student ID '{}' can't be used as a key ({}), minting one", id, err);
                keys.allocate(students).map(StudentKey::Minted)
            }
        },
        None => keys.allocate(students).map(StudentKey::Minted),
    }
}
