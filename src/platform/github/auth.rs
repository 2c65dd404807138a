use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::Serialize;
use std::path::Path;

use crate::error::{AppError, Result};

#[derive(Debug, Serialize)]
struct JwtClaims {
    iat: i64,
    exp: i64,
    iss: String,
}

/// GitHub App identity, with the private key parsed once at startup.
pub struct AppCredentials {
    app_id: u64,
    encoding_key: EncodingKey,
}

impl AppCredentials {
    pub fn load(app_id: u64, private_key_path: &Path) -> Result<Self> {
        let key_pem = std::fs::read(private_key_path).map_err(|e| {
            AppError::Config(format!(
                "Failed to read private key at {}: {e}",
                private_key_path.display()
            ))
        })?;

        let encoding_key = EncodingKey::from_rsa_pem(&key_pem)
            .map_err(|e| AppError::Config(format!("Invalid RSA private key: {e}")))?;

        Ok(Self {
            app_id,
            encoding_key,
        })
    }

    /// Short-lived JWT for the app-level endpoints (installation tokens).
    pub fn jwt(&self) -> Result<String> {
        let now = chrono::Utc::now().timestamp();
        let claims = JwtClaims {
            iat: now - 60,      // clock drift
            exp: now + 10 * 60, // GitHub's maximum
            iss: self.app_id.to_string(),
        };

        encode(&Header::new(Algorithm::RS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::Config(format!("Failed to generate JWT: {e}")))
    }
}
