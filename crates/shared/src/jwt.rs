//! Signed session tokens for admins and kiosks.
//!
//! Production deployments sign with RS256 (RSA key pair in PEM format).
//! Single-node and test setups may use an HS256 shared secret instead.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Error type for JWT operations.
#[derive(Debug, Error)]
pub enum JwtError {
    #[error("Failed to encode token: {0}")]
    EncodingError(String),

    #[error("Failed to decode token: {0}")]
    DecodingError(String),

    #[error("Token has expired")]
    TokenExpired,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Invalid key: {0}")]
    InvalidKey(String),
}

/// JWT token claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (admin account ID or kiosk session ID)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// JWT ID, used to revoke admin sessions on sign-out
    pub jti: String,
    /// Which surface the token admits
    pub token_type: TokenType,
}

/// Surface a token was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Admin,
    Kiosk,
}

/// A freshly signed token with its metadata.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub jti: String,
    pub expires_at: DateTime<Utc>,
    pub expires_in: i64,
}

/// Configuration for token generation and validation.
#[derive(Clone)]
pub struct JwtConfig {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    algorithm: Algorithm,
    /// Admin token lifetime in seconds
    pub admin_token_expiry_secs: i64,
    /// Kiosk token lifetime in seconds
    pub kiosk_token_expiry_secs: i64,
    /// Leeway in seconds for clock skew tolerance
    pub leeway_secs: u64,
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("algorithm", &self.algorithm)
            .field("admin_token_expiry_secs", &self.admin_token_expiry_secs)
            .field("kiosk_token_expiry_secs", &self.kiosk_token_expiry_secs)
            .field("leeway_secs", &self.leeway_secs)
            .field("encoding_key", &"[REDACTED]")
            .field("decoding_key", &"[REDACTED]")
            .finish()
    }
}

/// Default leeway in seconds for clock skew tolerance
pub const DEFAULT_LEEWAY_SECS: u64 = 30;

impl JwtConfig {
    /// Creates an RS256 config from an RSA key pair in PEM format.
    pub fn from_rsa_pem(
        private_key_pem: &str,
        public_key_pem: &str,
        admin_token_expiry_secs: i64,
        kiosk_token_expiry_secs: i64,
        leeway_secs: u64,
    ) -> Result<Self, JwtError> {
        let encoding_key = EncodingKey::from_rsa_pem(private_key_pem.as_bytes())
            .map_err(|e| JwtError::InvalidKey(format!("Invalid private key: {}", e)))?;

        let decoding_key = DecodingKey::from_rsa_pem(public_key_pem.as_bytes())
            .map_err(|e| JwtError::InvalidKey(format!("Invalid public key: {}", e)))?;

        Ok(Self {
            encoding_key,
            decoding_key,
            algorithm: Algorithm::RS256,
            admin_token_expiry_secs,
            kiosk_token_expiry_secs,
            leeway_secs,
        })
    }

    /// Creates an HS256 config from a shared secret.
    pub fn from_secret(
        secret: &str,
        admin_token_expiry_secs: i64,
        kiosk_token_expiry_secs: i64,
        leeway_secs: u64,
    ) -> Result<Self, JwtError> {
        if secret.len() < 32 {
            return Err(JwtError::InvalidKey(
                "Shared secret must be at least 32 bytes".to_string(),
            ));
        }

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            algorithm: Algorithm::HS256,
            admin_token_expiry_secs,
            kiosk_token_expiry_secs,
            leeway_secs,
        })
    }

    /// Signs an admin session token for the given account.
    pub fn generate_admin_token(&self, admin_id: Uuid) -> Result<IssuedToken, JwtError> {
        self.generate_token(admin_id, TokenType::Admin, self.admin_token_expiry_secs)
    }

    /// Signs a kiosk token for the given kiosk session.
    pub fn generate_kiosk_token(&self, kiosk_id: Uuid) -> Result<IssuedToken, JwtError> {
        self.generate_token(kiosk_id, TokenType::Kiosk, self.kiosk_token_expiry_secs)
    }

    fn generate_token(
        &self,
        subject: Uuid,
        token_type: TokenType,
        expiry_secs: i64,
    ) -> Result<IssuedToken, JwtError> {
        let now = Utc::now();
        let jti = Uuid::new_v4().to_string();
        let expires_at = now + Duration::seconds(expiry_secs);

        let claims = Claims {
            sub: subject.to_string(),
            exp: expires_at.timestamp(),
            iat: now.timestamp(),
            jti: jti.clone(),
            token_type,
        };

        let token = encode(&Header::new(self.algorithm), &claims, &self.encoding_key)
            .map_err(|e| JwtError::EncodingError(e.to_string()))?;

        Ok(IssuedToken {
            token,
            jti,
            expires_at,
            expires_in: expiry_secs,
        })
    }

    /// Validates a token and returns its claims.
    pub fn validate_token(&self, token: &str) -> Result<Claims, JwtError> {
        let mut validation = Validation::new(self.algorithm);
        validation.validate_exp = true;
        validation.leeway = self.leeway_secs;

        let token_data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::TokenExpired,
                jsonwebtoken::errors::ErrorKind::InvalidToken
                | jsonwebtoken::errors::ErrorKind::InvalidSignature => JwtError::InvalidToken,
                _ => JwtError::DecodingError(e.to_string()),
            }
        })?;

        Ok(token_data.claims)
    }

    /// Validates a token and requires it to be an admin token.
    pub fn validate_admin_token(&self, token: &str) -> Result<Claims, JwtError> {
        self.validate_typed(token, TokenType::Admin)
    }

    /// Validates a token and requires it to be a kiosk token.
    pub fn validate_kiosk_token(&self, token: &str) -> Result<Claims, JwtError> {
        self.validate_typed(token, TokenType::Kiosk)
    }

    fn validate_typed(&self, token: &str, expected: TokenType) -> Result<Claims, JwtError> {
        let claims = self.validate_token(token)?;
        if claims.token_type != expected {
            return Err(JwtError::InvalidToken);
        }
        Ok(claims)
    }
}

/// Extracts the subject UUID from validated claims.
pub fn extract_subject(claims: &Claims) -> Result<Uuid, JwtError> {
    Uuid::parse_str(&claims.sub).map_err(|_| JwtError::InvalidToken)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test_secret_key_for_jwt_testing_12345";

    fn create_test_config() -> JwtConfig {
        JwtConfig::from_secret(SECRET, 3600, 43200, 0).unwrap()
    }

    #[test]
    fn test_short_secret_rejected() {
        let result = JwtConfig::from_secret("short", 3600, 3600, 0);
        assert!(matches!(result, Err(JwtError::InvalidKey(_))));
    }

    #[test]
    fn test_invalid_rsa_pem_rejected() {
        let result = JwtConfig::from_rsa_pem("not a key", "not a key", 3600, 3600, 30);
        assert!(matches!(result, Err(JwtError::InvalidKey(_))));
    }

    #[test]
    fn test_admin_token_roundtrip() {
        let config = create_test_config();
        let admin_id = Uuid::new_v4();

        let issued = config.generate_admin_token(admin_id).unwrap();
        let claims = config.validate_admin_token(&issued.token).unwrap();

        assert_eq!(claims.sub, admin_id.to_string());
        assert_eq!(claims.jti, issued.jti);
        assert_eq!(claims.token_type, TokenType::Admin);
        assert_eq!(issued.expires_in, 3600);
    }

    #[test]
    fn test_kiosk_token_roundtrip() {
        let config = create_test_config();
        let kiosk_id = Uuid::new_v4();

        let issued = config.generate_kiosk_token(kiosk_id).unwrap();
        let claims = config.validate_kiosk_token(&issued.token).unwrap();

        assert_eq!(extract_subject(&claims).unwrap(), kiosk_id);
        assert_eq!(claims.exp - claims.iat, 43200);
    }

    #[test]
    fn test_kiosk_token_rejected_as_admin() {
        let config = create_test_config();
        let issued = config.generate_kiosk_token(Uuid::new_v4()).unwrap();

        let result = config.validate_admin_token(&issued.token);
        assert!(matches!(result, Err(JwtError::InvalidToken)));
    }

    #[test]
    fn test_admin_token_rejected_as_kiosk() {
        let config = create_test_config();
        let issued = config.generate_admin_token(Uuid::new_v4()).unwrap();

        let result = config.validate_kiosk_token(&issued.token);
        assert!(matches!(result, Err(JwtError::InvalidToken)));
    }

    #[test]
    fn test_expired_token() {
        let mut config = create_test_config();
        config.admin_token_expiry_secs = -120;

        let issued = config.generate_admin_token(Uuid::new_v4()).unwrap();
        let result = config.validate_admin_token(&issued.token);

        assert!(
            matches!(result, Err(JwtError::TokenExpired)),
            "Expected TokenExpired, got: {:?}",
            result
        );
    }

    #[test]
    fn test_token_signed_with_other_secret_rejected() {
        let config = create_test_config();
        let other = JwtConfig::from_secret("another_secret_key_that_is_long_enough", 3600, 3600, 0)
            .unwrap();

        let issued = other.generate_admin_token(Uuid::new_v4()).unwrap();
        let result = config.validate_admin_token(&issued.token);
        assert!(matches!(result, Err(JwtError::InvalidToken)));
    }

    #[test]
    fn test_malformed_token() {
        let config = create_test_config();
        assert!(config.validate_token("not_a_jwt").is_err());
    }

    #[test]
    fn test_unique_jti_per_token() {
        let config = create_test_config();
        let admin_id = Uuid::new_v4();

        let first = config.generate_admin_token(admin_id).unwrap();
        let second = config.generate_admin_token(admin_id).unwrap();

        assert_ne!(first.jti, second.jti);
    }

    #[test]
    fn test_debug_redacts_keys() {
        let debug = format!("{:?}", create_test_config());
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains(SECRET));
    }

    #[test]
    fn test_token_type_serialization() {
        assert_eq!(serde_json::to_string(&TokenType::Admin).unwrap(), "\"admin\"");
        assert_eq!(serde_json::to_string(&TokenType::Kiosk).unwrap(), "\"kiosk\"");
    }
}
