use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};

use crate::error::TokenError;
use crate::types::{Role, UserId};

// Bearer credential signed by the API server, presented on every
// authenticated request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessToken {
    pub user_id: UserId,
    pub role: Role,
    pub valid_until: DateTime<Utc>,
    /// Hex-encoded Ed25519 signature over the claims.
    pub signature: String,
}

// payload = user_id (16 bytes) || role || valid_until (rfc3339)
fn signing_payload(user_id: &UserId, role: Role, valid_until: &DateTime<Utc>) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(user_id.0.as_bytes());
    payload.extend_from_slice(role.as_str().as_bytes());
    payload.extend_from_slice(valid_until.to_rfc3339().as_bytes());
    payload
}

pub fn issue_token(
    user_id: UserId,
    role: Role,
    valid_until: DateTime<Utc>,
    signing_key: &SigningKey,
) -> AccessToken {
    let payload = signing_payload(&user_id, role, &valid_until);
    let signature = signing_key.sign(&payload);

    AccessToken {
        user_id,
        role,
        valid_until,
        signature: hex::encode(signature.to_bytes()),
    }
}

pub fn verify_token(token: &AccessToken, verifying_key: &VerifyingKey) -> Result<(), TokenError> {
    if Utc::now() > token.valid_until {
        return Err(TokenError::Expired);
    }

    let sig_bytes = hex::decode(&token.signature).map_err(|_| TokenError::BadSignature)?;
    let signature = Signature::from_slice(&sig_bytes).map_err(|_| TokenError::BadSignature)?;

    let payload = signing_payload(&token.user_id, token.role, &token.valid_until);
    verifying_key
        .verify(&payload, &signature)
        .map_err(|_| TokenError::BadSignature)
}

impl AccessToken {
    /// Compact transport form used in the `Authorization: Bearer` header.
    pub fn encode(&self) -> String {
        // serializing a plain struct of strings cannot fail
        let json = serde_json::to_vec(self).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    pub fn decode(raw: &str) -> Result<Self, TokenError> {
        let json = URL_SAFE_NO_PAD
            .decode(raw.trim())
            .map_err(|e| TokenError::Malformed(e.to_string()))?;
        serde_json::from_slice(&json).map_err(|e| TokenError::Malformed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rand::rngs::OsRng;

    #[test]
    fn test_token_valid() {
        let key = SigningKey::generate(&mut OsRng);
        let user = UserId::new();

        let token = issue_token(user, Role::Curator, Utc::now() + Duration::days(7), &key);

        assert!(verify_token(&token, &key.verifying_key()).is_ok());
    }

    #[test]
    fn test_token_expired() {
        let key = SigningKey::generate(&mut OsRng);
        let token = issue_token(
            UserId::new(),
            Role::Admin,
            Utc::now() - Duration::hours(1),
            &key,
        );

        assert!(matches!(
            verify_token(&token, &key.verifying_key()),
            Err(TokenError::Expired)
        ));
    }

    #[test]
    fn test_token_wrong_key() {
        let key = SigningKey::generate(&mut OsRng);
        let other = SigningKey::generate(&mut OsRng);
        let token = issue_token(UserId::new(), Role::Viewer, Utc::now() + Duration::days(1), &key);

        assert!(matches!(
            verify_token(&token, &other.verifying_key()),
            Err(TokenError::BadSignature)
        ));
    }

    #[test]
    fn test_role_escalation_breaks_signature() {
        let key = SigningKey::generate(&mut OsRng);
        let mut token =
            issue_token(UserId::new(), Role::Viewer, Utc::now() + Duration::days(1), &key);
        token.role = Role::Admin;

        assert!(verify_token(&token, &key.verifying_key()).is_err());
    }

    #[test]
    fn test_bearer_encoding() {
        let key = SigningKey::generate(&mut OsRng);
        let token = issue_token(UserId::new(), Role::Cataloger, Utc::now() + Duration::days(1), &key);

        let decoded = AccessToken::decode(&token.encode()).unwrap();
        assert_eq!(decoded.user_id, token.user_id);
        assert!(verify_token(&decoded, &key.verifying_key()).is_ok());

        assert!(AccessToken::decode("not a token!").is_err());
    }
}
