//! HTTP driver for the handshake and the encrypted file channel.

use crate::keystore::KeyStore;
use crate::session::Session;
use crate::types::{ClientConfig, ClientError, FileRecord};
use coffer_common::category::determine_file_category;
use coffer_common::helpers::encode_filename;
use seal_crypto::handshake::{FinalizeResponse, InitResponse};
use seal_crypto::{derive_keys, envelope, HandshakeClient};
use std::sync::Arc;
use tracing::{debug, info};

const HANDSHAKE_INIT_PATH: &str = "/handshake/init";
const HANDSHAKE_FINALIZE_PATH: &str = "/handshake/finalize";
pub(crate) const SESSION_TEST_PATH: &str = "/session/test";
const UPLOAD_PATH: &str = "/files/one/encrypted";

pub(crate) const CLIENT_ID_HEADER: &str = "X-Client-ID";
const FILENAME_HEADER: &str = "X-Orig-Filename";
const MIME_HEADER: &str = "X-Orig-Mime";
const CATEGORY_HEADER: &str = "X-File-Category";

/// Coffer API client.
///
/// Cheap to clone; clones share the HTTP connection pool and the key store.
/// A client starts without session keys: run [`CofferClient::handshake`]
/// first, then upload and download freely until the keys expire.
#[derive(Clone)]
pub struct CofferClient {
    http: reqwest::Client,
    config: ClientConfig,
    keystore: Arc<KeyStore>,
}

impl CofferClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| ClientError::Network(e.to_string()))?;

        Ok(Self {
            http,
            config,
            keystore: Arc::new(KeyStore::new()),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn keystore(&self) -> &KeyStore {
        &self.keystore
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    pub(crate) fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.access_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// Run the full two-round handshake and cache the derived keys.
    ///
    /// A failure anywhere leaves no partial state; simply call again to
    /// retry with fresh keys and nonces.
    pub async fn handshake(&self) -> Result<Session, ClientError> {
        let mut machine = HandshakeClient::new()?;

        let init = machine.init_request()?;
        debug!("sending handshake init");
        let response = self
            .authorize(self.http.post(self.url(HANDSHAKE_INIT_PATH)))
            .timeout(self.config.request_timeout)
            .json(&init)
            .send()
            .await?;
        let init_resp: InitResponse = expect_ok(response)?.json().await?;

        machine.verify_init(&init_resp)?;
        let client_id = machine
            .client_id()
            .map(str::to_owned)
            .ok_or_else(|| ClientError::InvalidResponse("missing client id".into()))?;

        let finalize = machine.finalize_request()?;
        debug!(client_id = %client_id, "sending handshake finalize");
        let response = self
            .authorize(self.http.post(self.url(HANDSHAKE_FINALIZE_PATH)))
            .header(CLIENT_ID_HEADER, &client_id)
            .timeout(self.config.request_timeout)
            .json(&finalize)
            .send()
            .await?;
        let fin_resp: FinalizeResponse = expect_ok(response)?.json().await?;

        let outcome = machine.establish(&fin_resp)?;
        self.keystore
            .put(derive_keys(&outcome.shared_secret), self.config.key_ttl);
        info!(client_id = %outcome.client_id, "secure channel established");

        Ok(Session::new(self.clone(), outcome.client_id, outcome.signer))
    }

    /// Encrypt and upload one file. Returns the stored-file metadata,
    /// including the presigned download URL.
    pub async fn upload_file(
        &self,
        data: &[u8],
        filename: &str,
        mime_type: &str,
    ) -> Result<FileRecord, ClientError> {
        let keys = self.keystore.get().ok_or(ClientError::NoSessionKeys)?;
        let blob = envelope::seal_file(&keys, data);
        let category = determine_file_category(mime_type);
        debug!(filename, category = %category, bytes = blob.len(), "uploading encrypted blob");

        let response = self
            .authorize(self.http.post(self.url(UPLOAD_PATH)))
            .header("Content-Type", "application/octet-stream")
            .header(FILENAME_HEADER, encode_filename(filename))
            .header(MIME_HEADER, mime_type)
            .header(CATEGORY_HEADER, category.as_str())
            .timeout(self.config.upload_timeout)
            .body(blob)
            .send()
            .await?;

        Ok(expect_ok(response)?.json().await?)
    }

    /// Fetch a blob from its presigned URL and decrypt it.
    ///
    /// A tag mismatch aborts the whole download; no partial plaintext is
    /// ever returned.
    pub async fn download_file(&self, presigned_url: &str) -> Result<Vec<u8>, ClientError> {
        let keys = self.keystore.get().ok_or(ClientError::NoSessionKeys)?;

        let response = self
            .http
            .get(presigned_url)
            .timeout(self.config.upload_timeout)
            .send()
            .await?;
        let blob = expect_ok(response)?.bytes().await?;

        Ok(envelope::open_file(&keys, &blob)?)
    }
}

pub(crate) fn expect_ok(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(ClientError::TransportStatus(status.as_u16()))
    }
}
