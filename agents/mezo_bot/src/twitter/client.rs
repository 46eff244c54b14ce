//! Twitter API v2 client signed with OAuth 1.0a (HMAC-SHA1).

use base64::{Engine, prelude::BASE64_STANDARD};
use hmac::{Hmac, Mac};
use mezo_core::{BoxError, BoxPinFut};
use rand::{Rng, distr::Alphanumeric};
use serde_json::json;
use sha1::Sha1;
use std::time::Duration;

use super::{CharacterCredentials, TweetPoster};

pub static TWEETS_ENDPOINT: &str = "https://api.twitter.com/2/tweets";

type HmacSha1 = Hmac<Sha1>;

/// RFC 3986 percent-encoding, as OAuth requires.
fn encode(s: &str) -> String {
    urlencoding::encode(s).into_owned()
}

/// Computes the `oauth_signature` of a request.
///
/// `params` holds the oauth_* parameters plus any query or form parameters;
/// JSON bodies are not part of the signature.
pub fn oauth_signature(
    method: &str,
    url: &str,
    params: &[(&str, &str)],
    consumer_secret: &str,
    token_secret: &str,
) -> Result<String, BoxError> {
    let mut pairs: Vec<(String, String)> =
        params.iter().map(|(k, v)| (encode(k), encode(v))).collect();
    pairs.sort();
    let param_str = pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");
    let base = format!(
        "{}&{}&{}",
        method.to_ascii_uppercase(),
        encode(url),
        encode(&param_str)
    );
    let key = format!("{}&{}", encode(consumer_secret), encode(token_secret));

    let mut mac = HmacSha1::new_from_slice(key.as_bytes())
        .map_err(|err| format!("invalid signing key: {}", err))?;
    mac.update(base.as_bytes());
    Ok(BASE64_STANDARD.encode(mac.finalize().into_bytes()))
}

/// Posts tweets for one character.
#[derive(Clone)]
pub struct TwitterClient {
    http: reqwest::Client,
    creds: CharacterCredentials,
}

impl TwitterClient {
    pub fn new(creds: CharacterCredentials) -> Result<Self, BoxError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(mezo_engine::APP_USER_AGENT)
            .build()?;
        Ok(Self { http, creds })
    }

    fn authorization(&self, method: &str, url: &str) -> Result<String, BoxError> {
        let nonce: String = rand::rng()
            .sample_iter(Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let mut params = vec![
            ("oauth_consumer_key", self.creds.api_key.as_str()),
            ("oauth_nonce", nonce.as_str()),
            ("oauth_signature_method", "HMAC-SHA1"),
            ("oauth_timestamp", timestamp.as_str()),
            ("oauth_token", self.creds.access_token.as_str()),
            ("oauth_version", "1.0"),
        ];
        let signature = oauth_signature(
            method,
            url,
            &params,
            &self.creds.api_secret,
            &self.creds.access_secret,
        )?;
        params.push(("oauth_signature", signature.as_str()));
        let header = params
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", encode(k), encode(v)))
            .collect::<Vec<_>>()
            .join(", ");
        Ok(format!("OAuth {}", header))
    }
}

impl TweetPoster for TwitterClient {
    fn post(&self, text: String) -> BoxPinFut<Result<(), BoxError>> {
        let this = self.clone();
        Box::pin(async move {
            let auth = this.authorization("POST", TWEETS_ENDPOINT)?;
            let res = this
                .http
                .post(TWEETS_ENDPOINT)
                .header(http::header::AUTHORIZATION, auth)
                .json(&json!({ "text": text }))
                .send()
                .await?;
            if res.status().is_success() {
                return Ok(());
            }
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            Err(format!("tweet failed, status: {}, body: {}", status, body).into())
        })
    }
}
