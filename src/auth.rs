use crate::schemas::UserId;
use actix_web::dev::Payload;
use actix_web::http::header::{HeaderValue, AUTHORIZATION};
use actix_web::{error, web, FromRequest, HttpRequest};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::future::{ready, Ready};
use std::num::ParseIntError;
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

/// Shared with the front-end that issues caller tokens. Without a secret the
/// `Authorization` header is trusted as a bare user id.
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    pub secret: Option<String>,
}

/// The user on whose behalf a request is made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller(pub UserId);

impl FromRequest for Caller {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(request: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let secret = request
            .app_data::<web::Data<AuthConfig>>()
            .and_then(|config| config.secret.clone());
        let caller = request
            .headers()
            .get(AUTHORIZATION)
            .map(HeaderValue::to_str)
            .and_then(Result::ok)
            .and_then(|authorization| check_caller(authorization, secret.as_deref()));

        ready(match caller {
            Some(user) => Ok(Caller(user)),
            None => {
                warn!(path = request.path(), "request without a valid caller");
                Err(error::ErrorUnauthorized("missing or invalid caller identity"))
            }
        })
    }
}

/// Resolves the caller from an `Authorization` value: `<userId>` when no
/// secret is configured, `<userId>:<hex hmac>` otherwise.
pub fn check_caller(authorization: &str, secret: Option<&str>) -> Option<UserId> {
    let authorization = authorization.trim();
    let Some(secret) = secret else {
        if authorization.is_empty() || authorization.contains(':') {
            return None;
        }
        return Some(UserId::from(authorization));
    };

    let (user_id, signature) = authorization.split_once(':')?;
    if user_id.is_empty() {
        return None;
    }
    let signature = signature
        .chars()
        .collect::<Vec<_>>()
        .chunks(2)
        .map(|n| u8::from_str_radix(&String::from_iter(n), 16))
        .collect::<Result<Vec<u8>, ParseIntError>>()
        .ok()?;

    let mut mac = keyed_mac(secret)?;
    mac.update(user_id.as_bytes());
    mac.verify_slice(&signature).ok()?;
    Some(UserId::from(user_id))
}

/// Produces the `Authorization` value a trusted front-end sends for `user`.
pub fn sign_caller(user: &UserId, secret: &str) -> Option<String> {
    let mut mac = keyed_mac(secret)?;
    mac.update(user.as_str().as_bytes());
    let signature: String = mac
        .finalize()
        .into_bytes()
        .iter()
        .map(|byte| format!("{:02x}", byte))
        .collect();
    Some(format!("{}:{}", user, signature))
}

// The MAC key is the SHA-256 digest of the shared secret.
fn keyed_mac(secret: &str) -> Option<HmacSha256> {
    let key = Sha256::digest(secret.as_bytes());
    HmacSha256::new_from_slice(&key).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_user_id_without_secret() {
        assert_eq!(check_caller(" u-1 ", None), Some(UserId::from("u-1")));
        assert_eq!(check_caller("", None), None);
        assert_eq!(check_caller("u-1:abcd", None), None);
    }

    #[test]
    fn signed_caller_round_trip() {
        let user = UserId::from("b6f1c1e4-user");
        let header = sign_caller(&user, "s3cret").unwrap();
        assert_eq!(check_caller(&header, Some("s3cret")), Some(user));
    }

    #[test]
    fn rejects_forged_or_malformed_signatures() {
        let header = sign_caller(&UserId::from("alice"), "s3cret").unwrap();
        assert_eq!(check_caller(&header, Some("other")), None);

        let forged = header.replacen("alice", "mallory", 1);
        assert_eq!(check_caller(&forged, Some("s3cret")), None);

        assert_eq!(check_caller("alice", Some("s3cret")), None);
        assert_eq!(check_caller("alice:zz", Some("s3cret")), None);
        assert_eq!(check_caller(":00", Some("s3cret")), None);
    }
}
