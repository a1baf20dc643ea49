//! openQA client scheduling tests of freshly uploaded installer images.
//!
//! Requests are authenticated the way the openQA API expects: an
//! `X-API-Hash` HMAC-SHA1 of the request path and query followed by the
//! `X-API-Microtime` value, keyed with the API secret.

use crate::config::OpenQaConfig;
use crate::error::{OpenQaError, Result};
use sha1::{Digest, Sha1};
use std::time::Duration;
use url::Url;

const SHA1_BLOCK: usize = 64;

/// Client for one openQA instance
#[derive(Debug, Clone)]
pub struct OpenQaClient {
    http: reqwest::Client,
    isos: Url,
    overview: Url,
    api_key: String,
    api_secret: String,
    distri: String,
    flavor: String,
    arch: String,
    group_id: u32,
}

impl OpenQaClient {
    /// Create a client for the configured instance
    pub fn new(config: &OpenQaConfig) -> Result<Self> {
        let invalid = |reason: String| OpenQaError::InvalidUrl {
            url: config.url.clone(),
            reason,
        };
        let base = Url::parse(&format!("{}/", config.url.trim_end_matches('/')))
            .map_err(|e| invalid(e.to_string()))?;
        let isos = base.join("api/v1/isos").map_err(|e| invalid(e.to_string()))?;
        let overview = base.join("tests/overview").map_err(|e| invalid(e.to_string()))?;

        let http = reqwest::Client::builder()
            .user_agent(concat!("build_notify/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| OpenQaError::Request {
                reason: e.to_string(),
            })?;

        Ok(Self {
            http,
            isos,
            overview,
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
            distri: config.distri.clone(),
            flavor: config.flavor.clone(),
            arch: config.arch.clone(),
            group_id: config.group_id,
        })
    }

    /// Image `Qubes-{build}-{arch}.iso` published under `repository`
    pub fn image_url(&self, repository: &Url, build: &str) -> Result<Url> {
        repository
            .join(&format!("Qubes-{}-{}.iso", build, self.arch))
            .map_err(|e| {
                OpenQaError::InvalidUrl {
                    url: repository.to_string(),
                    reason: e.to_string(),
                }
                .into()
            })
    }

    /// Result overview of the jobs scheduled for `build`
    pub fn overview_url(&self, version: &str, build: &str) -> Url {
        let mut url = self.overview.clone();
        url.query_pairs_mut()
            .append_pair("distri", &self.distri)
            .append_pair("version", version)
            .append_pair("build", build)
            .append_pair("groupid", &self.group_id.to_string());
        url
    }

    /// Schedule the tests of one image, returning the result overview link
    pub async fn schedule_iso(&self, version: &str, build: &str, iso_url: &Url) -> Result<Url> {
        let mut url = self.isos.clone();
        url.query_pairs_mut()
            .append_pair("DISTRI", &self.distri)
            .append_pair("VERSION", version)
            .append_pair("FLAVOR", &self.flavor)
            .append_pair("ARCH", &self.arch)
            .append_pair("BUILD", build)
            .append_pair("ISO_URL", iso_url.as_str());
        log::debug!("openQA request: {}", url);

        let microtime = microtime();
        let hash = sign(&self.api_secret, &url, &microtime);
        let response = self
            .http
            .post(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .header("X-API-Microtime", &microtime)
            .header("X-API-Key", &self.api_key)
            .header("X-API-Hash", hash)
            .send()
            .await
            .map_err(|e| OpenQaError::Request {
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OpenQaError::Status {
                status: status.as_u16(),
                body: body.chars().take(800).collect(),
            }
            .into());
        }
        Ok(self.overview_url(version, build))
    }
}

fn microtime() -> String {
    let now = chrono::Utc::now();
    format!("{}.{:06}", now.timestamp(), now.timestamp_subsec_micros())
}

fn sign(secret: &str, url: &Url, microtime: &str) -> String {
    let path = match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    };
    hex::encode(hmac_sha1(
        secret.as_bytes(),
        format!("{}{}", path, microtime).as_bytes(),
    ))
}

/// RFC 2104 HMAC over SHA-1
fn hmac_sha1(key: &[u8], message: &[u8]) -> Vec<u8> {
    let mut block = [0u8; SHA1_BLOCK];
    if key.len() > SHA1_BLOCK {
        let digest = Sha1::digest(key);
        block[..digest.len()].copy_from_slice(&digest);
    } else {
        block[..key.len()].copy_from_slice(key);
    }

    let mut inner = Sha1::new();
    inner.update(block.map(|b| b ^ 0x36));
    inner.update(message);
    let inner = inner.finalize();

    let mut outer = Sha1::new();
    outer.update(block.map(|b| b ^ 0x5c));
    outer.update(inner);
    outer.finalize().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn config(url: &str) -> OpenQaConfig {
        OpenQaConfig {
            url: url.to_string(),
            api_key: "KEY".to_string(),
            api_secret: "SECRET".to_string(),
            distri: "qubesos".to_string(),
            flavor: "install-iso".to_string(),
            arch: "x86_64".to_string(),
            group_id: 1,
        }
    }

    #[test]
    fn test_hmac_sha1_reference_vectors() {
        assert_eq!(
            hex::encode(hmac_sha1(&[0x0b; 20], b"Hi There")),
            "b617318655057264e28bc0b6fb378c8ef146be00"
        );
        assert_eq!(
            hex::encode(hmac_sha1(b"Jefe", b"what do ya want for nothing?")),
            "effcdf6ae5eb2fa2d27416d5f184df9c259a7c79"
        );
        // keys longer than a block are hashed first
        assert_eq!(
            hex::encode(hmac_sha1(
                &[0xaa; 80],
                b"Test Using Larger Than Block-Size Key - Hash Key First"
            )),
            "aa4ae5e15272d00e95705637ce8a3b55ed402112"
        );
    }

    #[test]
    fn test_urls() {
        let client = OpenQaClient::new(&config("https://openqa.example.org/")).unwrap();
        assert_eq!(
            client.overview_url("4.2", "4.2.20240101").as_str(),
            "https://openqa.example.org/tests/overview?distri=qubesos&version=4.2&build=4.2.20240101&groupid=1"
        );
        let repository = Url::parse("https://ftp.example.org/iso/iso-testing/").unwrap();
        assert_eq!(
            client.image_url(&repository, "4.2.20240101").unwrap().as_str(),
            "https://ftp.example.org/iso/iso-testing/Qubes-4.2.20240101-x86_64.iso"
        );
        assert!(OpenQaClient::new(&config("not a url")).is_err());
    }

    #[tokio::test]
    async fn test_schedule_iso_sends_signed_request() {
        let server = MockServer::start_async().await;
        let isos = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/v1/isos")
                    .query_param("DISTRI", "qubesos")
                    .query_param("VERSION", "4.2")
                    .query_param("FLAVOR", "install-iso")
                    .query_param("ARCH", "x86_64")
                    .query_param("BUILD", "4.2.20240101")
                    .query_param(
                        "ISO_URL",
                        "https://ftp.example.org/iso/Qubes-4.2.20240101-x86_64.iso",
                    )
                    .header("X-API-Key", "KEY")
                    .header_exists("X-API-Hash")
                    .header_exists("X-API-Microtime");
                then.status(200).json_body(serde_json::json!({"count": 1, "ids": [42]}));
            })
            .await;

        let client = OpenQaClient::new(&config(&server.base_url())).unwrap();
        let iso = Url::parse("https://ftp.example.org/iso/Qubes-4.2.20240101-x86_64.iso").unwrap();
        let overview = client.schedule_iso("4.2", "4.2.20240101", &iso).await.unwrap();

        isos.assert_async().await;
        assert_eq!(overview.path(), "/tests/overview");
        assert!(overview.as_str().contains("build=4.2.20240101"));
    }

    #[tokio::test]
    async fn test_schedule_iso_rejected() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/v1/isos");
                then.status(403).body("{\"error\":\"no api key\"}");
            })
            .await;

        let client = OpenQaClient::new(&config(&server.base_url())).unwrap();
        let iso = Url::parse("https://ftp.example.org/iso/Qubes-4.2.20240101-x86_64.iso").unwrap();
        let err = client.schedule_iso("4.2", "4.2.20240101", &iso).await.unwrap_err();
        assert!(err.to_string().contains("status 403"));
    }
}
