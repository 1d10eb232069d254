use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use reqwest::{Certificate, Client, Identity, Method, StatusCode};
use serde::de::DeserializeOwned;
use zeroize::Zeroizing;

use crate::{
    models::{HostConfig, TlsMaterial},
    utils, ChallengeboxError, ChallengeboxResult,
};

use super::{
    ContainerEngine, ContainerSummary, CreateContainerRequest, CreateContainerResponse,
    EngineResponse, ImageInspect, ImageSummary,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A container engine client speaking the engine's HTTP API.
///
/// Plain-HTTP hosts share one connection pool. Mutual-TLS hosts each get a client built in memory
/// from the host's PEM material; the built client is cached per host config id and rebuilt when
/// the material changes or [`HttpEngine::invalidate`] is called.
pub struct HttpEngine {
    /// Timeout applied to every call.
    timeout: Duration,

    /// Client for hosts without TLS.
    plain: Client,

    /// mTLS clients keyed by host config id.
    tls_clients: Mutex<HashMap<i64, CachedClient>>,
}

struct CachedClient {
    fingerprint: String,
    client: Client,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl HttpEngine {
    /// Creates a client whose calls time out after `timeout`.
    pub fn new(timeout: Duration) -> ChallengeboxResult<Self> {
        let plain = Client::builder()
            .no_proxy()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| ChallengeboxError::custom(anyhow::anyhow!("http client: {e}")))?;

        Ok(Self {
            timeout,
            plain,
            tls_clients: Mutex::new(HashMap::new()),
        })
    }

    /// Issues one request against `host` and returns the status and parsed JSON body.
    ///
    /// An empty body parses as `Null`. Connection failures and timeouts are
    /// [`ChallengeboxError::EngineUnreachable`]; a body that is not JSON is
    /// [`ChallengeboxError::EngineProtocolError`]. Non-2xx statuses are returned, not raised.
    pub async fn request(
        &self,
        host: &HostConfig,
        path: &str,
        method: Method,
        body: Option<&serde_json::Value>,
    ) -> ChallengeboxResult<EngineResponse> {
        let client = self.client_for(host)?;
        let url = format!("{}{}", host.base_url(), path);
        tracing::debug!("engine request: {} {}", method, url);

        let mut request = client.request(method, &url);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| transport_error(&url, e))?;
        let status = response.status().as_u16();
        let bytes = response.bytes().await.map_err(|e| transport_error(&url, e))?;

        let body = if bytes.iter().all(u8::is_ascii_whitespace) {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).map_err(|e| {
                ChallengeboxError::EngineProtocolError(format!(
                    "{url} returned {status} with a non-json body: {e}"
                ))
            })?
        };

        tracing::debug!("engine response: {} {}", status, url);
        Ok(EngineResponse { status, body })
    }

    /// Drops the cached TLS client of a host config so the next call rebuilds it.
    pub fn invalidate(&self, host_id: i64) {
        if self.lock_clients().remove(&host_id).is_some() {
            tracing::debug!("dropped cached tls client for host config {}", host_id);
        }
    }

    fn client_for(&self, host: &HostConfig) -> ChallengeboxResult<Client> {
        let Some(tls) = host.get_tls() else {
            return Ok(self.plain.clone());
        };

        let fingerprint = utils::sha256_hex(&[
            host.get_hostname().as_bytes(),
            tls.ca_cert(),
            tls.client_cert(),
            tls.client_key(),
        ]);

        if let Some(cached) = self.lock_clients().get(host.get_id()) {
            if cached.fingerprint == fingerprint {
                return Ok(cached.client.clone());
            }
        }

        let client = self.build_tls_client(tls)?;
        self.lock_clients().insert(
            *host.get_id(),
            CachedClient {
                fingerprint,
                client: client.clone(),
            },
        );

        Ok(client)
    }

    fn build_tls_client(&self, tls: &TlsMaterial) -> ChallengeboxResult<Client> {
        let ca = Certificate::from_pem(tls.ca_cert()).map_err(|e| {
            ChallengeboxError::InvalidHostConfig(format!("unreadable ca certificate: {e}"))
        })?;

        let mut identity_pem = Zeroizing::new(Vec::with_capacity(
            tls.client_cert().len() + tls.client_key().len() + 1,
        ));
        identity_pem.extend_from_slice(tls.client_cert());
        identity_pem.push(b'\n');
        identity_pem.extend_from_slice(tls.client_key());

        let identity = Identity::from_pem(&identity_pem).map_err(|e| {
            ChallengeboxError::InvalidHostConfig(format!("unreadable client certificate or key: {e}"))
        })?;

        Client::builder()
            .use_rustls_tls()
            .no_proxy()
            .tls_built_in_root_certs(false)
            .add_root_certificate(ca)
            .identity(identity)
            .timeout(self.timeout)
            .connect_timeout(self.timeout)
            .build()
            .map_err(|e| ChallengeboxError::InvalidHostConfig(format!("tls setup failed: {e}")))
    }

    fn lock_clients(&self) -> MutexGuard<'_, HashMap<i64, CachedClient>> {
        self.tls_clients
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn call<T: DeserializeOwned>(
        &self,
        host: &HostConfig,
        path: &str,
        method: Method,
        body: Option<&serde_json::Value>,
    ) -> ChallengeboxResult<T> {
        let response = self.request(host, path, method, body).await?;
        let response = expect_success(response)?;
        serde_json::from_value(response.body).map_err(|e| {
            ChallengeboxError::EngineProtocolError(format!("unexpected response to {path}: {e}"))
        })
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

#[async_trait::async_trait]
impl ContainerEngine for HttpEngine {
    async fn list_images(&self, host: &HostConfig) -> ChallengeboxResult<Vec<ImageSummary>> {
        self.call(host, "/images/json?all=1", Method::GET, None).await
    }

    async fn inspect_image(
        &self,
        host: &HostConfig,
        reference: &str,
    ) -> ChallengeboxResult<ImageInspect> {
        self.call(host, &format!("/images/{reference}/json"), Method::GET, None)
            .await
    }

    async fn list_containers(
        &self,
        host: &HostConfig,
    ) -> ChallengeboxResult<Vec<ContainerSummary>> {
        self.call(host, "/containers/json?all=1", Method::GET, None)
            .await
    }

    async fn create_container(
        &self,
        host: &HostConfig,
        name: &str,
        request: &CreateContainerRequest,
    ) -> ChallengeboxResult<String> {
        let body = serde_json::to_value(request)?;
        let created: CreateContainerResponse = self
            .call(
                host,
                &format!("/containers/create?name={name}"),
                Method::POST,
                Some(&body),
            )
            .await?;

        for warning in created.warnings.iter().flatten() {
            tracing::warn!("engine warning creating {}: {}", name, warning);
        }

        Ok(created.id)
    }

    async fn start_container(&self, host: &HostConfig, id: &str) -> ChallengeboxResult<()> {
        let response = self
            .request(host, &format!("/containers/{id}/start"), Method::POST, None)
            .await?;

        // 304: already started
        if response.status == StatusCode::NOT_MODIFIED.as_u16() {
            return Ok(());
        }

        expect_success(response).map(|_| ())
    }

    async fn remove_container(&self, host: &HostConfig, id: &str) -> ChallengeboxResult<()> {
        let response = self
            .request(
                host,
                &format!("/containers/{id}?force=true"),
                Method::DELETE,
                None,
            )
            .await?;

        if response.status == StatusCode::NOT_FOUND.as_u16() {
            tracing::debug!("container {} already gone", id);
            return Ok(());
        }

        expect_success(response).map(|_| ())
    }

    fn invalidate_host(&self, host_id: i64) {
        self.invalidate(host_id);
    }
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

fn expect_success(response: EngineResponse) -> ChallengeboxResult<EngineResponse> {
    if response.is_success() {
        return Ok(response);
    }

    Err(ChallengeboxError::EngineRejected {
        status: response.status,
        message: response.message(),
    })
}

fn transport_error(url: &str, error: reqwest::Error) -> ChallengeboxError {
    if error.is_decode() {
        return ChallengeboxError::EngineProtocolError(format!("{url}: {error}"));
    }

    ChallengeboxError::EngineUnreachable(format!("{url}: {error}"))
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    const CA_PEM: &[u8] = include_bytes!("../../tests/fixtures/tls/ca.pem");
    const CLIENT_PEM: &[u8] = include_bytes!("../../tests/fixtures/tls/client.pem");
    const CLIENT_KEY: &[u8] = include_bytes!("../../tests/fixtures/tls/client.key");
    const OTHER_CLIENT_PEM: &[u8] = include_bytes!("../../tests/fixtures/tls/other-client.pem");
    const OTHER_CLIENT_KEY: &[u8] = include_bytes!("../../tests/fixtures/tls/other-client.key");

    fn tls_host(key: &str) -> HostConfig {
        host_with(TlsMaterial::new(
            b"not a certificate".to_vec(),
            b"not a certificate".to_vec(),
            key.as_bytes().to_vec(),
        ))
    }

    fn host_with(tls: TlsMaterial) -> HostConfig {
        HostConfig::from_parts(
            7,
            "7".to_string(),
            "127.0.0.1:1".to_string(),
            Some(tls),
            BTreeSet::new(),
        )
    }

    fn cached_fingerprint(engine: &HttpEngine, host_id: i64) -> Option<String> {
        engine
            .lock_clients()
            .get(&host_id)
            .map(|cached| cached.fingerprint.clone())
    }

    #[tokio::test]
    async fn test_tls_client_is_cached_per_host() -> anyhow::Result<()> {
        let engine = HttpEngine::new(Duration::from_secs(1))?;
        let host = host_with(TlsMaterial::new(
            CA_PEM.to_vec(),
            CLIENT_PEM.to_vec(),
            CLIENT_KEY.to_vec(),
        ));

        // Valid material gets as far as the network.
        let result = engine.request(&host, "/_ping", Method::GET, None).await;
        assert!(matches!(
            result,
            Err(ChallengeboxError::EngineUnreachable(_))
        ));
        assert_eq!(engine.lock_clients().len(), 1);
        let first = cached_fingerprint(&engine, 7).expect("cached client");

        let _ = engine.request(&host, "/_ping", Method::GET, None).await;
        assert_eq!(engine.lock_clients().len(), 1);
        assert_eq!(cached_fingerprint(&engine, 7), Some(first.clone()));

        let rotated = host_with(TlsMaterial::new(
            CA_PEM.to_vec(),
            OTHER_CLIENT_PEM.to_vec(),
            OTHER_CLIENT_KEY.to_vec(),
        ));
        let result = engine.request(&rotated, "/_ping", Method::GET, None).await;
        assert!(matches!(
            result,
            Err(ChallengeboxError::EngineUnreachable(_))
        ));
        assert_eq!(engine.lock_clients().len(), 1);
        let second = cached_fingerprint(&engine, 7).expect("cached client");
        assert_ne!(first, second);

        engine.invalidate_host(7);
        assert!(engine.lock_clients().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_unreadable_tls_material_is_a_config_error() -> anyhow::Result<()> {
        let engine = HttpEngine::new(Duration::from_secs(1))?;
        let result = engine
            .request(&tls_host("not a key"), "/_ping", Method::GET, None)
            .await;

        assert!(matches!(
            result,
            Err(ChallengeboxError::InvalidHostConfig(_))
        ));
        assert!(engine.lock_clients().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_unreachable_host() -> anyhow::Result<()> {
        let engine = HttpEngine::new(Duration::from_millis(500))?;
        let host = HostConfig::from_parts(
            1,
            "1".to_string(),
            "127.0.0.1:1".to_string(),
            None,
            BTreeSet::new(),
        );

        let result = engine.list_images(&host).await;
        assert!(matches!(
            result,
            Err(ChallengeboxError::EngineUnreachable(_))
        ));
        Ok(())
    }

    #[test]
    fn test_expect_success_maps_engine_message() {
        let response = EngineResponse {
            status: 409,
            body: serde_json::json!({ "message": "name already in use" }),
        };

        match expect_success(response) {
            Err(ChallengeboxError::EngineRejected { status, message }) => {
                assert_eq!(status, 409);
                assert_eq!(message, "name already in use");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
