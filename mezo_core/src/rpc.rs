//! JSON over HTTP POST calls to remote services
//!
//! The indexing service used by the tools speaks GraphQL over a single
//! `POST` with a JSON body, so this module only needs:
//! - [`http_json_post`]: POST a serializable body and decode the JSON reply
//! - [`HttpRPCError`]: the possible failures of such a call

use http::header;
use reqwest::Client;
use serde::{Serialize, de::DeserializeOwned};

pub static CONTENT_TYPE_JSON: &str = "application/json";
pub static CONTENT_TYPE_TEXT: &str = "text/plain";

/// Possible errors when working with http_json_post
#[derive(Debug, thiserror::Error)]
pub enum HttpRPCError {
    #[error("http_rpc({endpoint:?}): send error: {error}")]
    RequestError { endpoint: String, error: String },

    #[error("http_rpc({endpoint:?}): response status {status}, error: {error}")]
    ResponseError {
        endpoint: String,
        status: u16,
        error: String,
    },

    #[error("http_rpc({endpoint:?}): parse result error: {error}")]
    ResultError { endpoint: String, error: String },
}

impl HttpRPCError {
    /// Returns the HTTP status when the endpoint answered with a non-success status.
    pub fn status(&self) -> Option<u16> {
        match self {
            HttpRPCError::ResponseError { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Makes an HTTP POST call with a JSON body and returns the decoded JSON response
///
/// # Arguments
/// * `client` - HTTP client to use for the request
/// * `endpoint` - URL endpoint to send the request to
/// * `body` - Body to serialize as JSON
///
/// # Returns
/// Result with either the deserialized response or an HttpRPCError
pub async fn http_json_post<T>(
    client: &Client,
    endpoint: &str,
    body: &impl Serialize,
) -> Result<T, HttpRPCError>
where
    T: DeserializeOwned,
{
    let res = client
        .post(endpoint)
        .header(header::CONTENT_TYPE, CONTENT_TYPE_JSON)
        .header(header::ACCEPT, CONTENT_TYPE_JSON)
        .json(body)
        .send()
        .await
        .map_err(|e| HttpRPCError::RequestError {
            endpoint: endpoint.to_string(),
            error: format!("{e:?}"),
        })?;
    let status = res.status().as_u16();
    if status != 200 {
        return Err(HttpRPCError::ResponseError {
            endpoint: endpoint.to_string(),
            status,
            error: res.text().await.unwrap_or_default(),
        });
    }

    res.json::<T>()
        .await
        .map_err(|e| HttpRPCError::ResultError {
            endpoint: endpoint.to_string(),
            error: format!("{e:?}"),
        })
}
