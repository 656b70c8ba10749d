//! Anthropic models on AWS Bedrock. Same Messages body, model in the URL,
//! requests signed with SigV4.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use tracing::debug;

use super::anthropic::{self, MessagesBody, MessagesProvider, MessagesResponse, MessagesTransport};
use super::http::HttpClient;
use super::{EnvLookup, required};
use crate::error::ProviderError;

pub const DEFAULT_MODEL: &str = "us.anthropic.claude-3-7-sonnet-20250219-v1:0";
pub const DEFAULT_REGION: &str = "us-west-2";
pub const BEDROCK_VERSION: &str = "bedrock-2023-05-31";
const SERVICE: &str = "bedrock";

type HmacSha256 = Hmac<Sha256>;

pub type BedrockProvider = MessagesProvider<BedrockTransport>;

#[derive(Debug, Clone)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

pub struct BedrockTransport {
    http: HttpClient,
    credentials: AwsCredentials,
    region: String,
    model: String,
    /// `scheme://host` of the runtime endpoint.
    endpoint: String,
}

impl BedrockTransport {
    pub fn new(http: HttpClient, credentials: AwsCredentials, region: String, model: String) -> Self {
        let endpoint = format!("https://bedrock-runtime.{region}.amazonaws.com");
        Self {
            http,
            credentials,
            region,
            model,
            endpoint,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    /// Standard AWS variables plus optional `BEDROCK_MODEL` and
    /// `BEDROCK_ENDPOINT`.
    pub fn from_env(http: HttpClient, env: EnvLookup<'_>) -> Result<Self, ProviderError> {
        let credentials = AwsCredentials {
            access_key_id: required(env, "AWS_ACCESS_KEY_ID")?,
            secret_access_key: required(env, "AWS_SECRET_ACCESS_KEY")?,
            session_token: env("AWS_SESSION_TOKEN"),
        };
        let region = env("AWS_REGION")
            .or_else(|| env("AWS_DEFAULT_REGION"))
            .unwrap_or_else(|| DEFAULT_REGION.to_string());
        let model = env("BEDROCK_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let transport = Self::new(http, credentials, region, model);
        Ok(match env("BEDROCK_ENDPOINT") {
            Some(endpoint) => transport.with_endpoint(endpoint),
            None => transport,
        })
    }

    /// Path as sent on the wire: the model id is percent-encoded once.
    fn request_path(&self) -> String {
        format!("/model/{}/invoke", uri_encode(&self.model))
    }

    fn host(&self) -> &str {
        self.endpoint
            .split_once("://")
            .map_or(self.endpoint.as_str(), |(_, rest)| rest)
    }

    /// Headers to attach for a signed POST of `body` at `now`.
    pub fn sign(&self, body: &[u8], now: DateTime<Utc>) -> Vec<(&'static str, String)> {
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();
        let host = self.host().to_string();

        let mut headers: Vec<(&'static str, String)> = vec![
            ("content-type", "application/json".to_string()),
            ("host", host),
            ("x-amz-date", amz_date.clone()),
        ];
        if let Some(token) = &self.credentials.session_token {
            headers.push(("x-amz-security-token", token.clone()));
        }

        let canonical_headers: String = headers
            .iter()
            .map(|(name, value)| format!("{name}:{}\n", value.trim()))
            .collect();
        let signed_headers = headers
            .iter()
            .map(|(name, _)| *name)
            .collect::<Vec<_>>()
            .join(";");

        // Non-S3 services sign the path encoded a second time.
        let canonical_uri = self
            .request_path()
            .split('/')
            .map(uri_encode)
            .collect::<Vec<_>>()
            .join("/");
        let canonical_request = format!(
            "POST\n{canonical_uri}\n\n{canonical_headers}\n{signed_headers}\n{}",
            hex::encode(Sha256::digest(body))
        );

        let scope = format!("{date}/{}/{SERVICE}/aws4_request", self.region);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{amz_date}\n{scope}\n{}",
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        let k_date = hmac(
            format!("AWS4{}", self.credentials.secret_access_key).as_bytes(),
            date.as_bytes(),
        );
        let k_region = hmac(&k_date, self.region.as_bytes());
        let k_service = hmac(&k_region, SERVICE.as_bytes());
        let k_signing = hmac(&k_service, b"aws4_request");
        let signature = hex::encode(hmac(&k_signing, string_to_sign.as_bytes()));

        headers.push((
            "authorization",
            format!(
                "AWS4-HMAC-SHA256 Credential={}/{scope}, SignedHeaders={signed_headers}, Signature={signature}",
                self.credentials.access_key_id
            ),
        ));
        // reqwest sets host itself
        headers.retain(|(name, _)| *name != "host" && *name != "content-type");
        headers
    }
}

#[async_trait]
impl MessagesTransport for BedrockTransport {
    fn name(&self) -> &'static str {
        "bedrock"
    }

    async fn send(&self, mut body: MessagesBody) -> Result<MessagesResponse, ProviderError> {
        body.model = None;
        body.anthropic_version = Some(BEDROCK_VERSION.to_string());
        body.anthropic_beta = vec![anthropic::COMPUTER_USE_BETA.to_string()];

        let bytes = serde_json::to_vec(&body)
            .map_err(|e| ProviderError::Decode(format!("encoding request: {e}")))?;
        let url = format!("{}{}", self.endpoint, self.request_path());
        debug!(%url, region = %self.region, "bedrock invoke");
        let headers = self.sign(&bytes, Utc::now());
        anthropic::decode_response(self.http.post_bytes(&url, &headers, bytes).await?)
    }
}

fn hmac(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key).expect("hmac takes keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// RFC 3986 encoding as SigV4 expects: everything but unreserved characters.
fn uri_encode(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}
