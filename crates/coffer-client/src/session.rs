//! An established secure channel.

use crate::client::{expect_ok, CofferClient, CLIENT_ID_HEADER, SESSION_TEST_PATH};
use crate::types::{ClientError, SessionMessageRequest, SessionMessageResponse};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use coffer_common::helpers::now_millis;
use seal_crypto::{envelope, ChannelSigner};
use tracing::debug;

/// Handle to a session created by a successful handshake.
///
/// Holds the assigned client id and the ECDSA key that survived the
/// handshake; the symmetric keys stay in the shared [`crate::KeyStore`] so
/// their TTL applies uniformly.
#[derive(Clone)]
pub struct Session {
    client: CofferClient,
    client_id: String,
    signer: ChannelSigner,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

impl Session {
    pub(crate) fn new(client: CofferClient, client_id: String, signer: ChannelSigner) -> Self {
        Self {
            client,
            client_id,
            signer,
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Round-trip a plaintext through the server's session-test endpoint.
    ///
    /// The message goes out as a signed session envelope; the server
    /// decrypts it and echoes the plaintext back, proving both ends hold
    /// the same keys.
    pub async fn send_test_message(&self, plaintext: &str) -> Result<String, ClientError> {
        let keys = self
            .client
            .keystore()
            .get()
            .ok_or(ClientError::NoSessionKeys)?;

        let message = envelope::seal_message(&keys, now_millis(), plaintext.as_bytes());
        let signature = self.signer.sign_der(&message);
        let body = SessionMessageRequest {
            encrypted_message: BASE64.encode(&message),
            client_signature: BASE64.encode(signature),
        };

        debug!(client_id = %self.client_id, "sending session test message");
        let response = self
            .client
            .authorize(self.client.http().post(self.client.url(SESSION_TEST_PATH)))
            .header(CLIENT_ID_HEADER, &self.client_id)
            .timeout(self.client.config().request_timeout)
            .json(&body)
            .send()
            .await?;

        let out: SessionMessageResponse = expect_ok(response)?.json().await?;
        Ok(out.plaintext)
    }
}
