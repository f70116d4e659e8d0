use std::path::{Path, PathBuf};
use std::{env, fs};

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey};

use crate::error::BackendError;
use crate::util;

const USER_AUTH_PUBLIC: &str = "user_auth.pem.pub";
const USER_AUTH_PRIVATE: &str = "user_auth.pem";

/// Keys professor tokens are verified with.
#[derive(Clone)]
pub enum JwtKeys {
    /// Shared HS256 secret.
    Secret(Vec<u8>),
    /// PS256 key pair. Only the public key is needed to verify tokens.
    Rsa {
        public: Vec<u8>,
        private: Option<Vec<u8>>,
    },
}

impl std::fmt::Debug for JwtKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JwtKeys::Secret(_) => f.write_str("JwtKeys::Secret(..)"),
            JwtKeys::Rsa { private, .. } => write!(
                f,
                "JwtKeys::Rsa {{ private: {} }}",
                if private.is_some() { "loaded" } else { "absent" }
            ),
        }
    }
}

impl JwtKeys {
    pub fn algorithm(&self) -> Algorithm {
        match self {
            JwtKeys::Secret(_) => Algorithm::HS256,
            JwtKeys::Rsa { .. } => Algorithm::PS256,
        }
    }

    pub fn decoding_key(&self) -> Result<DecodingKey, jsonwebtoken::errors::Error> {
        match self {
            JwtKeys::Secret(secret) => Ok(DecodingKey::from_secret(secret)),
            JwtKeys::Rsa { public, .. } => DecodingKey::from_rsa_pem(public),
        }
    }

    /// `None` when only the public key is known.
    pub fn encoding_key(&self) -> Option<Result<EncodingKey, jsonwebtoken::errors::Error>> {
        match self {
            JwtKeys::Secret(secret) => Some(Ok(EncodingKey::from_secret(secret))),
            JwtKeys::Rsa { private, .. } => private.as_deref().map(EncodingKey::from_rsa_pem),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Security {
    pub jwt_keys: JwtKeys,
}

#[inline]
fn security_dir() -> PathBuf {
    PathBuf::from(env::var("SECURITY_DIR").unwrap_or("./security".to_string()))
}

impl Security {
    pub fn with_secret(secret: impl Into<Vec<u8>>) -> Security {
        Security {
            jwt_keys: JwtKeys::Secret(secret.into()),
        }
    }

    pub fn load() -> Result<Security, BackendError> {
        if let Ok(secret) = env::var("JWT_SECRET") {
            if !secret.is_empty() {
                tracing::info!("Using HS256 JWT secret from environment.");
                return Ok(Security::with_secret(secret));
            }
        }

        let dir = security_dir();
        tracing::info!("Loading JWT signing keys from '{}'...", dir.display());
        let public = util::read_first(&dir, &[USER_AUTH_PUBLIC]);
        let private = util::read_first(&dir, &[USER_AUTH_PRIVATE]);

        let jwt_keys = match (public, private) {
            (Some(public), private) => {
                tracing::info!("Loaded JWT keys.");
                JwtKeys::Rsa { public, private }
            }
            (None, _) => generate_keys(&dir)?,
        };

        Ok(Security { jwt_keys })
    }
}

#[cfg(feature = "generate-security")]
fn failed(e: impl std::fmt::Display) -> BackendError {
    BackendError::KeyGeneration(e.to_string())
}

#[cfg(feature = "generate-security")]
fn generate_keys(dir: &Path) -> Result<JwtKeys, BackendError> {
    use rsa::pkcs1::{EncodeRsaPrivateKey, LineEnding};
    use rsa::pkcs8::EncodePublicKey;

    tracing::info!("Unable to load user auth public key. Generating a new pair.");
    fs::create_dir_all(dir).map_err(failed)?;

    tracing::info!("Generating a private RSA key. This will take a while...");
    let mut rng = rand::thread_rng();
    let rsa_sk = rsa::RsaPrivateKey::new(&mut rng, 4096).map_err(failed)?;

    let private = rsa_sk
        .to_pkcs1_pem(LineEnding::LF)
        .map_err(failed)?
        .to_string()
        .into_bytes();
    fs::write(dir.join(USER_AUTH_PRIVATE), &private).map_err(failed)?;

    let public = rsa_sk
        .to_public_key()
        .to_public_key_pem(LineEnding::LF)
        .map_err(failed)?
        .into_bytes();
    fs::write(dir.join(USER_AUTH_PUBLIC), &public).map_err(failed)?;

    tracing::info!("Done generating JWT keys.");
    Ok(JwtKeys::Rsa {
        public,
        private: Some(private),
    })
}

#[cfg(not(feature = "generate-security"))]
fn generate_keys(dir: &Path) -> Result<JwtKeys, BackendError> {
    Err(BackendError::MissingKeys(dir.to_path_buf()))
}
