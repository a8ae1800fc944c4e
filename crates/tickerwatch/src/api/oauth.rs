//! OAuth 1.0a user-context request signing (HMAC-SHA1)
//!
//! Signature base string: `METHOD&enc(url)&enc(sorted params)`, keyed with
//! `enc(consumer_secret)&enc(token_secret)`. Every parameter that travels in
//! the query string or a form body must be passed in for signing.

use crate::config::WatchConfig;
use crate::error::{Result, WatchError};
use base64::Engine;
use hmac::{Hmac, Mac};
use rand::Rng;
use rand::distributions::Alphanumeric;
use sha1::Sha1;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use urlencoding::encode;

const SIGNATURE_METHOD: &str = "HMAC-SHA1";
const VERSION: &str = "1.0";
const NONCE_LEN: usize = 32;

/// Consumer and access token pairs for one user
#[derive(Clone)]
pub struct OAuthCredentials {
    pub consumer_key: String,
    consumer_secret: String,
    pub access_token: String,
    access_token_secret: String,
}

impl fmt::Debug for OAuthCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthCredentials")
            .field("consumer_key", &self.consumer_key)
            .field("consumer_secret", &"<redacted>")
            .field("access_token", &self.access_token)
            .field("access_token_secret", &"<redacted>")
            .finish()
    }
}

impl OAuthCredentials {
    pub fn new(
        consumer_key: impl Into<String>,
        consumer_secret: impl Into<String>,
        access_token: impl Into<String>,
        access_token_secret: impl Into<String>,
    ) -> Self {
        Self {
            consumer_key: consumer_key.into(),
            consumer_secret: consumer_secret.into(),
            access_token: access_token.into(),
            access_token_secret: access_token_secret.into(),
        }
    }

    /// Load the four platform credentials from the watch configuration
    pub fn from_config(config: &WatchConfig) -> Result<Self> {
        fn required(value: Option<&String>, name: &str) -> Result<String> {
            value
                .cloned()
                .ok_or_else(|| WatchError::ConfigError(format!("{name} not set")))
        }

        Ok(Self::new(
            required(config.twitter_consumer_key.as_ref(), "TWITTER_CONSUMER_KEY")?,
            required(config.twitter_consumer_secret.as_ref(), "TWITTER_CONSUMER_SECRET")?,
            required(config.twitter_access_token.as_ref(), "TWITTER_ACCESS_TOKEN")?,
            required(
                config.twitter_access_token_secret.as_ref(),
                "TWITTER_ACCESS_TOKEN_SECRET",
            )?,
        ))
    }

    /// `Authorization` header value for a request, with a fresh nonce and timestamp
    pub fn authorization(&self, method: &str, url: &str, params: &[(&str, &str)]) -> String {
        let nonce: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(NONCE_LEN)
            .map(char::from)
            .collect();
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
            .to_string();

        self.authorization_with(method, url, params, &nonce, &timestamp)
    }

    fn authorization_with(
        &self,
        method: &str,
        url: &str,
        params: &[(&str, &str)],
        nonce: &str,
        timestamp: &str,
    ) -> String {
        let mut oauth_params = vec![
            ("oauth_consumer_key", self.consumer_key.as_str()),
            ("oauth_nonce", nonce),
            ("oauth_signature_method", SIGNATURE_METHOD),
            ("oauth_timestamp", timestamp),
            ("oauth_token", self.access_token.as_str()),
            ("oauth_version", VERSION),
        ];

        let mut all_params = oauth_params.clone();
        all_params.extend_from_slice(params);
        let signature = self.signature(&base_string(method, url, &all_params));

        oauth_params.push(("oauth_signature", signature.as_str()));
        oauth_params.sort_unstable();

        let fields = oauth_params
            .iter()
            .map(|(key, value)| format!("{}=\"{}\"", encode(key), encode(value)))
            .collect::<Vec<_>>()
            .join(", ");
        format!("OAuth {fields}")
    }

    fn signature(&self, base_string: &str) -> String {
        let key = format!(
            "{}&{}",
            encode(&self.consumer_secret),
            encode(&self.access_token_secret)
        );
        // HMAC accepts keys of any length
        let Ok(mut mac) = Hmac::<Sha1>::new_from_slice(key.as_bytes()) else {
            return String::new();
        };
        mac.update(base_string.as_bytes());
        base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes())
    }
}

/// Signature base string over the request line and every parameter
fn base_string(method: &str, url: &str, params: &[(&str, &str)]) -> String {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(key, value)| (encode(key).into_owned(), encode(value).into_owned()))
        .collect();
    encoded.sort_unstable();

    let param_string = encoded
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&");

    format!(
        "{}&{}&{}",
        method.to_uppercase(),
        encode(url),
        encode(&param_string)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    // Worked example from the platform's "creating a signature" guide
    const URL: &str = "https://api.twitter.com/1.1/statuses/update.json";
    const NONCE: &str = "kYjzVBB8Y0ZFabxSWbWovY3uYSQ2pTgmZeNu2VS4cg";
    const TIMESTAMP: &str = "1318622958";
    const STATUS: &str = "Hello Ladies + Gentlemen, a signed OAuth request!";

    fn credentials() -> OAuthCredentials {
        OAuthCredentials::new(
            "xvz1evFS4wEEPTGEFPHBog",
            "kAcSOqF21Fu85e7zjz7ZN2U4ZRhfV3WpwPAoE3Z7kBw",
            "370773112-GmHxMAgYyLbNEtIKZeRNFsMKPR9EyMZeS9weJAEb",
            "LswwdoUaIvS8ltyTt5jkRh4J50vUPVVHtR2YPi5kE",
        )
    }

    #[test]
    fn test_base_string_encodes_and_sorts() {
        let base = base_string(
            "post",
            URL,
            &[("status", STATUS), ("include_entities", "true"), ("oauth_nonce", NONCE)],
        );
        assert_eq!(
            base,
            "POST&https%3A%2F%2Fapi.twitter.com%2F1.1%2Fstatuses%2Fupdate.json&\
             include_entities%3Dtrue%26oauth_nonce%3DkYjzVBB8Y0ZFabxSWbWovY3uYSQ2pTgmZeNu2VS4cg\
             %26status%3DHello%2520Ladies%2520%252B%2520Gentlemen%252C%2520a%2520signed\
             %2520OAuth%2520request%2521"
        );
    }

    #[test]
    fn test_signature_matches_reference() {
        let header = credentials().authorization_with(
            "POST",
            URL,
            &[("include_entities", "true"), ("status", STATUS)],
            NONCE,
            TIMESTAMP,
        );

        assert!(header.starts_with("OAuth oauth_consumer_key=\"xvz1evFS4wEEPTGEFPHBog\", "));
        assert!(header.contains("oauth_signature=\"hCtSmYh%2BiHYCEqBWrE7C7hYmtUk%3D\""));
        assert!(header.contains("oauth_signature_method=\"HMAC-SHA1\""));
        assert!(!header.contains("status"));
    }

    #[test]
    fn test_fresh_nonce_per_request() {
        let credentials = credentials();
        let first = credentials.authorization("POST", URL, &[("status", "hi")]);
        let second = credentials.authorization("POST", URL, &[("status", "hi")]);
        assert_ne!(first, second);
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let rendered = format!("{:?}", credentials());
        assert!(rendered.contains("xvz1evFS4wEEPTGEFPHBog"));
        assert!(!rendered.contains("kAcSOqF21Fu85e7zjz7ZN2U4ZRhfV3WpwPAoE3Z7kBw"));
        assert!(!rendered.contains("LswwdoUaIvS8ltyTt5jkRh4J50vUPVVHtR2YPi5kE"));
    }

    #[test]
    fn test_from_config_requires_all_four() {
        assert!(OAuthCredentials::from_config(&WatchConfig::default()).is_err());

        let config = WatchConfig::builder()
            .twitter_consumer_key("ck")
            .twitter_consumer_secret("cs")
            .twitter_access_token("at")
            .build()
            .unwrap();
        assert!(OAuthCredentials::from_config(&config).is_err());

        let config = WatchConfig::builder()
            .twitter_consumer_key("ck")
            .twitter_consumer_secret("cs")
            .twitter_access_token("at")
            .twitter_access_token_secret("ats")
            .build()
            .unwrap();
        assert_eq!(OAuthCredentials::from_config(&config).unwrap().access_token, "at");
    }
}
