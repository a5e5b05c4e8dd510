/*
[INPUT]:  API credentials and a UTC timestamp
[OUTPUT]: Base64 HMAC-SHA256 login signatures and login args
[POS]:    Auth layer - signing of the WebSocket login request
[UPDATE]: When changing signing algorithm or the signed request line
*/

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::config::Credentials;
use crate::error::{OkxWsError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Request line the venue expects to be signed for WebSocket login
const LOGIN_REQUEST_PATH: &str = "GET/users/self/verify";

/// One element of the login `args` array
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginArgs {
    pub api_key: String,
    pub passphrase: String,
    pub timestamp: String,
    pub sign: String,
}

/// Signs login requests with the account secret key
#[derive(Debug, Clone)]
pub struct LoginSigner {
    credentials: Credentials,
}

impl LoginSigner {
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }

    /// Sign `{timestamp}GET/users/self/verify`
    ///
    /// Returns base64-encoded signature
    pub fn sign(&self, timestamp: &str) -> Result<String> {
        let mut mac = HmacSha256::new_from_slice(self.credentials.secret_key.as_bytes())
            .map_err(|e| OkxWsError::Signature(e.to_string()))?;
        mac.update(timestamp.as_bytes());
        mac.update(LOGIN_REQUEST_PATH.as_bytes());
        Ok(BASE64.encode(mac.finalize().into_bytes()))
    }

    /// Build login args bound to `now` (unix seconds)
    pub fn login_args(&self, now: DateTime<Utc>) -> Result<LoginArgs> {
        let timestamp = now.timestamp().to_string();
        let sign = self.sign(&timestamp)?;
        Ok(LoginArgs {
            api_key: self.credentials.api_key.clone(),
            passphrase: self.credentials.passphrase.clone(),
            timestamp,
            sign,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> LoginSigner {
        LoginSigner::new(Credentials {
            api_key: "985d5b66-57ce-40fb-b714-afc0b9787083".to_string(),
            secret_key: "secret".to_string(),
            passphrase: "123456".to_string(),
        })
    }

    #[test]
    fn test_sign_is_base64_sha256() {
        let signature = signer().sign("1538054050").unwrap();
        let decoded = BASE64.decode(&signature).unwrap();
        assert_eq!(decoded.len(), 32);
    }

    #[test]
    fn test_sign_is_deterministic_and_timestamp_bound() {
        let signer = signer();
        assert_eq!(signer.sign("1538054050").unwrap(), signer.sign("1538054050").unwrap());
        assert_ne!(signer.sign("1538054050").unwrap(), signer.sign("1538054051").unwrap());
    }

    #[test]
    fn test_login_args_uses_unix_seconds() {
        let now = DateTime::from_timestamp(1_538_054_050, 975_000_000).unwrap();
        let args = signer().login_args(now).unwrap();
        assert_eq!(args.timestamp, "1538054050");
        assert_eq!(args.passphrase, "123456");
        assert_eq!(args.sign, signer().sign("1538054050").unwrap());

        let wire = serde_json::to_value(&args).unwrap();
        assert!(wire.get("apiKey").is_some());
        assert!(wire.get("api_key").is_none());
    }
}
