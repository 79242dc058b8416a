use argon2::password_hash::{Error as PasswordHashError, SaltString};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use base64::Engine;
use chrono::Utc;
use common::Role;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use rand::thread_rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// HS256 signing material and the one validation every token passes.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl JwtKeys {
    pub fn from_secret(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    fn encode(&self, claims: &Claims) -> Result<String, AuthError> {
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|_| AuthError::InvalidToken)
    }

    fn decode(&self, token: &str) -> Result<Claims, AuthError> {
        jsonwebtoken::decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|d| d.claims)
            .map_err(|_| AuthError::InvalidToken)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub role: Role,
    pub typ: TokenKind,
    pub iat: i64,
    pub exp: i64,
    pub jti: String, // ties refresh tokens to stored records
}

#[derive(thiserror::Error, Debug)]
pub enum AuthError {
    #[error("invalid token")]
    InvalidToken,
    #[error("wrong token kind")]
    WrongKind,
    #[error("password hashing failed")]
    Hash,
}

pub fn now_ts() -> i64 {
    Utc::now().timestamp()
}

fn random_token(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    thread_rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

pub fn new_jti() -> String {
    random_token(16)
}

/// Opaque single-use secret, e.g. for password reset links.
pub fn new_opaque_token() -> String {
    random_token(32)
}

fn sign(
    keys: &JwtKeys,
    user_id: Uuid,
    role: Role,
    typ: TokenKind,
    ttl_secs: i64,
) -> Result<(String, Claims), AuthError> {
    let iat = now_ts();
    let claims = Claims {
        sub: user_id,
        role,
        typ,
        iat,
        exp: iat + ttl_secs,
        jti: new_jti(),
    };
    let token = keys.encode(&claims)?;
    Ok((token, claims))
}

pub fn sign_access(
    keys: &JwtKeys,
    user_id: Uuid,
    role: Role,
    ttl_secs: i64,
) -> Result<String, AuthError> {
    sign(keys, user_id, role, TokenKind::Access, ttl_secs).map(|(token, _)| token)
}

pub fn sign_refresh(
    keys: &JwtKeys,
    user_id: Uuid,
    role: Role,
    ttl_secs: i64,
) -> Result<(String, Claims), AuthError> {
    sign(keys, user_id, role, TokenKind::Refresh, ttl_secs)
}

pub fn verify(keys: &JwtKeys, token: &str) -> Result<Claims, AuthError> {
    keys.decode(token)
}

pub fn verify_kind(keys: &JwtKeys, token: &str, kind: TokenKind) -> Result<Claims, AuthError> {
    let claims = verify(keys, token)?;
    if claims.typ != kind {
        return Err(AuthError::WrongKind);
    }
    Ok(claims)
}

pub fn hash_password(raw: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut thread_rng());
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(raw.as_bytes(), &salt)
        .map_err(|_: PasswordHashError| AuthError::Hash)?
        .to_string();
    Ok(hash)
}

/// False for a wrong password and for a hash that is not a PHC string.
pub fn verify_password(raw: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .and_then(|parsed| Argon2::default().verify_password(raw.as_bytes(), &parsed))
        .is_ok()
}

pub fn sha256_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

/// Stored form of any bearer secret we must recognise later.
pub fn fingerprint(token: &str) -> String {
    format!("sha256:{}", sha256_hex(token))
}
