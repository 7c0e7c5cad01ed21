use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::AuthConfig;
use crate::db::models::{Role, User};

/// Claims carried by a bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: i64,
    pub username: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

/// A century. Longer lifetimes overflow the timestamp arithmetic.
const MAX_TTL_HOURS: u64 = 24 * 365 * 100;

/// HS256 signing and verification keys.
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenKeys {
    pub fn new(secret: &[u8], ttl_hours: u64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            ttl: Duration::hours(ttl_hours.min(MAX_TTL_HOURS) as i64),
        }
    }

    pub fn from_config(auth: &AuthConfig) -> Self {
        match auth.jwt_secret.as_deref() {
            Some(secret) => Self::new(secret.as_bytes(), auth.token_ttl_hours),
            None => {
                tracing::warn!(
                    "No JWT secret configured; using a random one. Tokens will not survive a restart."
                );
                Self::new(generate_secret().as_bytes(), auth.token_ttl_hours)
            }
        }
    }

    pub fn issue(&self, user: &User) -> Result<String, jsonwebtoken::errors::Error> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.id,
            username: user.username.clone(),
            role: user.role,
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
    }

    /// Check signature, algorithm and expiry.
    pub fn verify(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        jsonwebtoken::decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
    }
}

/// Generate a cryptographically random 32-byte hex secret.
fn generate_secret() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.gen();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
