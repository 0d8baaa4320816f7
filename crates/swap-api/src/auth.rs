//! Token handling for the external session provider.
//!
//! Sign-up, passwords and sessions live with the provider. This server only
//! needs to turn a bearer token into an [`Identity`], and (for local
//! development and tests) to mint tokens with the shared secret.

use anyhow::Context;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};

use swap_types::api::Claims;
use swap_types::models::Identity;

pub fn issue_token(secret: &str, identity: &Identity, ttl: chrono::Duration) -> anyhow::Result<String> {
    let expires = chrono::Utc::now()
        .checked_add_signed(ttl)
        .context("token lifetime is out of range")?;
    let claims = Claims {
        sub: identity.user_id,
        username: identity.name.clone(),
        exp: expires.timestamp().max(0) as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

pub fn verify_token(secret: &str, token: &str) -> anyhow::Result<Identity> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;

    Ok(token_data.claims.into())
}
