use actix_web::web::{Bytes, BytesMut};
use futures::future::try_join_all;
use futures::stream::{self, LocalBoxStream};
use futures::StreamExt;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::cache::store::{CacheStorage, RequestKey, ResponseKind, StoredResponse};
use crate::config::ProxyConfig;
use crate::error::{InstallError, NetworkError};

#[derive(Debug, Clone, PartialEq)]
pub struct ProxyRequest {
    pub method: String,
    /// Path and query for same-origin requests, absolute URL otherwise.
    pub url: String,
    pub cross_origin: bool,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl ProxyRequest {
    pub fn get(path: &str) -> Self {
        ProxyRequest {
            method: "GET".to_owned(),
            url: path.to_owned(),
            cross_origin: false,
            headers: vec![],
            body: Bytes::new(),
        }
    }

    pub fn key(&self) -> RequestKey {
        RequestKey::new(self.url.clone())
    }

    fn is_get(&self) -> bool {
        self.method.eq_ignore_ascii_case("GET")
    }
}

pub type BodyStream = LocalBoxStream<'static, Result<Bytes, NetworkError>>;

/// Response body as handed back by the network.
pub enum Body {
    Full(Bytes),
    Stream(BodyStream),
}

pub enum Buffered {
    Complete(Bytes),
    /// The body went past the limit. Holds everything read so far followed
    /// by the unread remainder.
    Overflow(Body),
}

impl Body {
    /// Reads the body into memory as long as it stays within `limit` bytes.
    pub async fn buffer(self, limit: usize) -> Result<Buffered, NetworkError> {
        let mut chunks = match self {
            Body::Full(bytes) if bytes.len() > limit => {
                return Ok(Buffered::Overflow(Body::Full(bytes)))
            }
            Body::Full(bytes) => return Ok(Buffered::Complete(bytes)),
            Body::Stream(chunks) => chunks,
        };

        let mut buffered = BytesMut::new();

        while let Some(chunk) = chunks.next().await {
            buffered.extend_from_slice(&chunk?);

            if buffered.len() > limit {
                let head = stream::once(async move { Ok(buffered.freeze()) });
                return Ok(Buffered::Overflow(Body::Stream(
                    head.chain(chunks).boxed_local(),
                )));
            }
        }

        Ok(Buffered::Complete(buffered.freeze()))
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Full(bytes) => f.debug_tuple("Full").field(&bytes.len()).finish(),
            Body::Stream(_) => f.write_str("Stream"),
        }
    }
}

#[derive(Debug)]
pub struct NetworkResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub kind: ResponseKind,
    pub body: Body,
}

impl NetworkResponse {
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    fn qualifies(&self) -> bool {
        self.status == 200 && self.kind == ResponseKind::Basic
    }
}

/// Where outbound requests go on a cache miss.
pub trait Network {
    fn fetch(
        &self,
        request: &ProxyRequest,
    ) -> impl Future<Output = Result<NetworkResponse, NetworkError>>;
}

#[derive(Debug)]
pub enum Served {
    Cache(StoredResponse),
    Network(NetworkResponse),
}

impl Served {
    pub fn from_cache(&self) -> bool {
        matches!(self, Served::Cache(_))
    }

    pub fn status(&self) -> u16 {
        match self {
            Served::Cache(response) => response.status,
            Served::Network(response) => response.status,
        }
    }

    pub fn into_parts(self) -> (u16, Vec<(String, String)>, Body) {
        match self {
            Served::Cache(response) => (
                response.status,
                response.headers,
                Body::Full(response.body),
            ),
            Served::Network(response) => (response.status, response.headers, response.body),
        }
    }
}

/// Cache-first interception of outbound requests backed by a single current
/// cache generation.
pub struct OfflineCacheProxy<N> {
    storage: Arc<CacheStorage>,
    current: String,
    manifest: Vec<String>,
    bypass_prefixes: Vec<String>,
    max_entry_bytes: usize,
    network: N,
    /// Held for writing while stale generations are removed.
    activated: RwLock<bool>,
}

impl<N: Network> OfflineCacheProxy<N> {
    pub fn new(storage: Arc<CacheStorage>, config: &ProxyConfig, network: N) -> Self {
        OfflineCacheProxy {
            storage,
            current: config.cache_name.clone(),
            manifest: config.manifest.clone(),
            bypass_prefixes: config.bypass_prefixes.clone(),
            max_entry_bytes: config.max_entry_bytes,
            network,
            activated: RwLock::new(false),
        }
    }

    pub fn current_generation(&self) -> &str {
        &self.current
    }

    /// Fetches every manifest asset into the current generation. Nothing is
    /// stored unless all of them succeed.
    pub async fn install(&self) -> Result<(), InstallError> {
        self.storage.open(&self.current);

        log::info!(
            "[{}] installing {} shell assets",
            self.current,
            self.manifest.len()
        );

        let entries = try_join_all(self.manifest.iter().map(|path| async move {
            let request = ProxyRequest::get(path);
            let network_err = |source| InstallError::Network {
                path: path.clone(),
                source,
            };

            let response = self.network.fetch(&request).await.map_err(network_err)?;

            if !response.is_ok() {
                return Err(InstallError::Status {
                    path: path.clone(),
                    status: response.status,
                });
            }

            let NetworkResponse {
                status,
                headers,
                kind,
                body,
            } = response;

            let body = match body.buffer(self.max_entry_bytes).await.map_err(network_err)? {
                Buffered::Complete(bytes) => bytes,
                Buffered::Overflow(_) => {
                    return Err(InstallError::TooLarge {
                        path: path.clone(),
                        limit: self.max_entry_bytes,
                    })
                }
            };

            Ok::<_, InstallError>((
                request.key(),
                StoredResponse {
                    status,
                    headers,
                    body,
                    kind,
                },
            ))
        }))
        .await?;

        self.storage.put_all(&self.current, entries);

        log::info!(
            "[{}] installed, {} entries cached",
            self.current,
            self.storage.len_of(&self.current).unwrap_or(0)
        );

        Ok(())
    }

    /// Deletes every generation other than the current one and starts
    /// serving from the cache. Returns the deleted names.
    pub async fn activate(&self) -> Vec<String> {
        let mut activated = self.activated.write().await;

        let stale: Vec<String> = self
            .storage
            .keys()
            .into_iter()
            .filter(|name| *name != self.current)
            .collect();

        for name in &stale {
            log::info!("[{}] deleting stale cache generation {}", self.current, name);
            self.storage.delete(name);
        }

        *activated = true;

        stale
    }

    fn bypasses(&self, request: &ProxyRequest) -> bool {
        !request.is_get()
            || (!request.cross_origin
                && self
                    .bypass_prefixes
                    .iter()
                    .any(|prefix| request.url.starts_with(prefix.as_str())))
    }

    /// Bypassed and non-qualifying responses come back with the body exactly
    /// as the network produced it. Only cacheable bodies within the entry
    /// size limit are read into memory.
    pub async fn handle(&self, request: ProxyRequest) -> Result<Served, NetworkError> {
        let activated = self.activated.read().await;

        if !*activated || self.bypasses(&request) {
            return self.network.fetch(&request).await.map(Served::Network);
        }

        let key = request.key();

        if let Some(hit) = self.storage.match_any(&key) {
            log::debug!("[{}] cache hit {}", self.current, key.as_str());
            return Ok(Served::Cache(hit));
        }

        let response = self.network.fetch(&request).await?;

        if !response.qualifies() {
            log::debug!(
                "[{}] not caching {} (status {}, {:?})",
                self.current,
                request.url,
                response.status,
                response.kind
            );
            return Ok(Served::Network(response));
        }

        let NetworkResponse {
            status,
            headers,
            kind,
            body,
        } = response;

        let body = match body.buffer(self.max_entry_bytes).await? {
            Buffered::Complete(bytes) => bytes,
            Buffered::Overflow(body) => {
                log::debug!(
                    "[{}] not caching {}: larger than {} bytes",
                    self.current,
                    request.url,
                    self.max_entry_bytes
                );
                return Ok(Served::Network(NetworkResponse {
                    status,
                    headers,
                    kind,
                    body,
                }));
            }
        };

        let stored = StoredResponse {
            status,
            headers: headers.clone(),
            body: body.clone(),
            kind,
        };

        if !self.storage.put(&self.current, key, stored) {
            log::warn!(
                "[{}] generation is full, not caching {}",
                self.current,
                request.url
            );
        }

        Ok(Served::Network(NetworkResponse {
            status,
            headers,
            kind,
            body: Body::Full(body),
        }))
    }
}
