//! End-to-end tests against an in-process server implementing the wire
//! contract: handshake, session test, encrypted upload and download.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use coffer_client::{ClientConfig, ClientError, CofferClient};
use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::pkcs8::{DecodePublicKey, EncodePublicKey};
use rand::rngs::OsRng;
use rand::RngCore;
use rsa::{Oaep, RsaPrivateKey};
use seal_crypto::handshake::{FinalizeRequest, FinalizeResponse, InitRequest, InitResponse};
use seal_crypto::{derive_keys, envelope, sigcodec, HandshakeError, SessionKeys};
use serde_json::{json, Value};
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

const CLIENT_ID: &str = "it-client-1";

struct ServerState {
    rsa: RsaPrivateKey,
    ecdsa: SigningKey,
    rsa_pub_der: Vec<u8>,
    ecdsa_pub_der: Vec<u8>,
    tamper_signature2: bool,
    base_url: Mutex<String>,
    nonce2: Mutex<[u8; 8]>,
    client_ecdsa: Mutex<Option<VerifyingKey>>,
    session_keys: Mutex<Option<SessionKeys>>,
    files: Mutex<HashMap<String, Vec<u8>>>,
}

impl ServerState {
    fn new(tamper_signature2: bool) -> Self {
        let rsa = RsaPrivateKey::new(&mut OsRng, 2048).unwrap();
        let ecdsa = SigningKey::random(&mut OsRng);
        let rsa_pub_der = rsa.to_public_key().to_public_key_der().unwrap().into_vec();
        let ecdsa_pub_der = ecdsa
            .verifying_key()
            .to_public_key_der()
            .unwrap()
            .into_vec();

        Self {
            rsa,
            ecdsa,
            rsa_pub_der,
            ecdsa_pub_der,
            tamper_signature2,
            base_url: Mutex::new(String::new()),
            nonce2: Mutex::new([0u8; 8]),
            client_ecdsa: Mutex::new(None),
            session_keys: Mutex::new(None),
            files: Mutex::new(HashMap::new()),
        }
    }

    fn keys(&self) -> SessionKeys {
        self.session_keys.lock().unwrap().clone().unwrap()
    }
}

async fn handle_init(
    State(st): State<Arc<ServerState>>,
    Json(req): Json<InitRequest>,
) -> Json<InitResponse> {
    let rsa_pub = BASE64.decode(&req.rsa_pub_client).unwrap();
    let ecdsa_pub = BASE64.decode(&req.ecdsa_pub_client).unwrap();
    let nonce1 = BASE64.decode(&req.nonce1).unwrap();

    let client_key = VerifyingKey::from_public_key_der(&ecdsa_pub).unwrap();
    let sig1 = Signature::from_der(&BASE64.decode(&req.signature1).unwrap()).unwrap();
    let mut signed = rsa_pub.clone();
    signed.extend_from_slice(&ecdsa_pub);
    signed.extend_from_slice(&nonce1);
    client_key.verify(&signed, &sig1).unwrap();
    *st.client_ecdsa.lock().unwrap() = Some(client_key);

    let mut nonce2 = [0u8; 8];
    OsRng.fill_bytes(&mut nonce2);
    *st.nonce2.lock().unwrap() = nonce2;

    let mut verify_data = st.rsa_pub_der.clone();
    verify_data.extend_from_slice(&st.ecdsa_pub_der);
    verify_data.extend_from_slice(&nonce2);
    verify_data.extend_from_slice(&nonce1);
    verify_data.extend_from_slice(CLIENT_ID.as_bytes());
    let sig2: Signature = st.ecdsa.sign(&verify_data);

    let mut signature2 = sig2.to_der().as_bytes().to_vec();
    if st.tamper_signature2 {
        signature2[8] ^= 0x01;
    }

    Json(InitResponse {
        rsa_pub_server: BASE64.encode(&st.rsa_pub_der),
        ecdsa_pub_server: BASE64.encode(&st.ecdsa_pub_der),
        nonce2: BASE64.encode(nonce2),
        signature2: BASE64.encode(signature2),
        client_id: CLIENT_ID.to_string(),
    })
}

async fn handle_finalize(
    State(st): State<Arc<ServerState>>,
    headers: HeaderMap,
    Json(req): Json<FinalizeRequest>,
) -> Json<FinalizeResponse> {
    assert_eq!(headers.get("X-Client-ID").unwrap(), CLIENT_ID);

    let encrypted = BASE64.decode(&req.encrypted).unwrap();
    let payload = st.rsa.decrypt(Oaep::new::<Sha256>(), &encrypted).unwrap();
    assert_eq!(payload.len(), 48);
    assert_eq!(&payload[40..], &st.nonce2.lock().unwrap()[..]);

    let sig3 = Signature::from_der(&BASE64.decode(&req.signature3).unwrap()).unwrap();
    let client_key = st.client_ecdsa.lock().unwrap().clone().unwrap();
    client_key.verify(&payload, &sig3).unwrap();

    let mut ks = [0u8; 32];
    ks.copy_from_slice(&payload[..32]);
    *st.session_keys.lock().unwrap() = Some(derive_keys(&ks));

    let sig4: Signature = st.ecdsa.sign(&payload);
    Json(FinalizeResponse {
        signature4: BASE64.encode(sig4.to_der().as_bytes()),
    })
}

async fn handle_session_test(
    State(st): State<Arc<ServerState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    assert_eq!(headers.get("X-Client-ID").unwrap(), CLIENT_ID);
    assert_eq!(headers.get("Authorization").unwrap(), "Bearer test-token");

    let message = BASE64
        .decode(body["encrypted_message"].as_str().unwrap())
        .unwrap();
    let sig_der = BASE64
        .decode(body["client_signature"].as_str().unwrap())
        .unwrap();

    let (r, s) = sigcodec::der_to_raw(&sig_der).unwrap();
    let mut raw = [0u8; 64];
    raw[..32].copy_from_slice(&r);
    raw[32..].copy_from_slice(&s);
    let sig = Signature::from_slice(&raw).unwrap();
    let client_key = st.client_ecdsa.lock().unwrap().clone().unwrap();
    client_key.verify(&message, &sig).unwrap();

    let opened = envelope::open_message(&st.keys(), &message).unwrap();
    Json(json!({ "plaintext": String::from_utf8(opened.payload).unwrap() }))
}

async fn handle_upload(
    State(st): State<Arc<ServerState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Json<Value> {
    let name_b64 = headers.get("X-Orig-Filename").unwrap().to_str().unwrap();
    let name = String::from_utf8(BASE64.decode(name_b64).unwrap()).unwrap();
    let mime = headers.get("X-Orig-Mime").unwrap().to_str().unwrap();
    let category = headers.get("X-File-Category").unwrap().to_str().unwrap();
    assert!(["photo", "video", "text", "unknown"].contains(&category));

    let obj_id = format!("obj-{}", st.files.lock().unwrap().len());
    st.files.lock().unwrap().insert(obj_id.clone(), body.to_vec());
    let url = format!("{}/download/{}", st.base_url.lock().unwrap(), obj_id);

    Json(json!({
        "name": name,
        "created_at": "2026-01-01T00:00:00Z",
        "obj_id": obj_id,
        "url": url,
        "mime_type": mime,
    }))
}

async fn handle_download(
    State(st): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<Vec<u8>, StatusCode> {
    st.files
        .lock()
        .unwrap()
        .get(&id)
        .cloned()
        .ok_or(StatusCode::NOT_FOUND)
}

async fn spawn_server(tamper_signature2: bool) -> (String, Arc<ServerState>) {
    let state = Arc::new(ServerState::new(tamper_signature2));
    let app = Router::new()
        .route("/handshake/init", post(handle_init))
        .route("/handshake/finalize", post(handle_finalize))
        .route("/session/test", post(handle_session_test))
        .route("/files/one/encrypted", post(handle_upload))
        .route("/download/:id", get(handle_download))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    *state.base_url.lock().unwrap() = base.clone();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (base, state)
}

fn test_client(base_url: String) -> CofferClient {
    CofferClient::new(ClientConfig {
        base_url,
        access_token: Some("test-token".to_string()),
        ..ClientConfig::default()
    })
    .unwrap()
}

#[tokio::test]
async fn test_full_flow_over_http() {
    let (base, state) = spawn_server(false).await;
    let client = test_client(base);

    let session = client.handshake().await.unwrap();
    assert_eq!(session.client_id(), CLIENT_ID);

    let echoed = session.send_test_message("ping through the channel").await.unwrap();
    assert_eq!(echoed, "ping through the channel");

    let content = b"the quick brown fox jumps over the lazy dog";
    let record = client
        .upload_file(content, "fox.txt", "text/plain")
        .await
        .unwrap();
    assert_eq!(record.name, "fox.txt");
    assert_eq!(record.mime_type, "text/plain");

    let downloaded = client.download_file(&record.url).await.unwrap();
    assert_eq!(downloaded, content);

    // A corrupted blob must abort decryption entirely.
    {
        let mut files = state.files.lock().unwrap();
        let blob = files.get_mut(&record.obj_id).unwrap();
        let mid = blob.len() / 2;
        blob[mid] ^= 0x01;
    }
    let err = client.download_file(&record.url).await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::Envelope(seal_crypto::EnvelopeError::AuthenticationFailed)
    ));
}

#[tokio::test]
async fn test_rejects_forged_server_signature() {
    let (base, _state) = spawn_server(true).await;
    let client = test_client(base);

    let err = client.handshake().await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::Handshake(HandshakeError::ServerSignatureInvalid)
    ));
    // Nothing was cached from the failed attempt.
    assert!(client.keystore().get().is_none());
}

#[tokio::test]
async fn test_channel_calls_require_session_keys() {
    let (base, _state) = spawn_server(false).await;
    let client = test_client(base.clone());

    assert!(matches!(
        client
            .upload_file(b"data", "a.bin", "application/octet-stream")
            .await,
        Err(ClientError::NoSessionKeys)
    ));
    assert!(matches!(
        client.download_file(&format!("{base}/download/obj-0")).await,
        Err(ClientError::NoSessionKeys)
    ));
}
