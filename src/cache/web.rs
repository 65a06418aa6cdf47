use actix_web::{
    http::{Method, StatusCode},
    web, App, HttpMessage, HttpRequest, HttpResponse, HttpServer,
};
use futures::StreamExt;
use std::sync::Arc;
use url::Url;

use crate::cache::proxy::{Body, Network, NetworkResponse, OfflineCacheProxy, ProxyRequest, Served};
use crate::cache::store::{CacheStorage, ResponseKind};
use crate::config::Config;
use crate::error::NetworkError;

const HOP_BY_HOP: [&str; 9] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "content-length",
];

fn forwardable(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    name != "host" && !HOP_BY_HOP.contains(&name.as_str())
}

// awc negotiates and decodes content codings itself, so the client's
// preference is not passed on and the upstream coding is not passed back.
fn forwardable_upstream(name: &str) -> bool {
    forwardable(name) && !name.eq_ignore_ascii_case("accept-encoding")
}

fn forwardable_downstream(name: &str) -> bool {
    forwardable(name) && !name.eq_ignore_ascii_case("content-encoding")
}

fn io_err(message: &str) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, message.to_string())
}

/// Forwards misses to the backend with `awc`.
pub struct AwcNetwork {
    upstream: Url,
}

impl AwcNetwork {
    pub fn new(upstream: Url) -> Self {
        AwcNetwork { upstream }
    }

    fn target(&self, request: &ProxyRequest) -> String {
        if request.cross_origin {
            request.url.clone()
        } else {
            format!(
                "{}{}",
                self.upstream.as_str().trim_end_matches('/'),
                request.url
            )
        }
    }
}

impl Network for AwcNetwork {
    async fn fetch(&self, request: &ProxyRequest) -> Result<NetworkResponse, NetworkError> {
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|e| NetworkError::Request(e.to_string()))?;

        let mut outbound = awc::Client::default().request(method, self.target(request));

        for (name, value) in request
            .headers
            .iter()
            .filter(|(n, _)| forwardable_upstream(n))
        {
            outbound = outbound.insert_header((name.as_str(), value.as_str()));
        }

        let mut res = outbound
            .send_body(request.body.clone())
            .await
            .map_err(|e| NetworkError::Request(format!("{} failed: {}", request.url, e)))?;

        let headers = res
            .headers()
            .iter()
            .filter(|(name, _)| forwardable_downstream(name.as_str()))
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_owned(), value.to_owned()))
            })
            .collect();

        let body = res
            .take_payload()
            .map(|chunk| chunk.map_err(|e| NetworkError::Request(e.to_string())))
            .boxed_local();

        Ok(NetworkResponse {
            status: res.status().as_u16(),
            headers,
            kind: if request.cross_origin {
                ResponseKind::Opaque
            } else {
                ResponseKind::Basic
            },
            body: Body::Stream(body),
        })
    }
}

/// Shared by every worker of the proxy server.
pub struct ProxyState<N> {
    pub proxy: OfflineCacheProxy<N>,
    upstream_authority: String,
}

impl<N: Network> ProxyState<N> {
    pub fn new(proxy: OfflineCacheProxy<N>, upstream: &Url) -> Self {
        ProxyState {
            proxy,
            upstream_authority: authority_of(upstream),
        }
    }
}

fn authority_of(url: &Url) -> String {
    match (url.host_str(), url.port_or_known_default()) {
        (Some(host), Some(port)) => format!("{host}:{port}"),
        (Some(host), None) => host.to_owned(),
        _ => String::new(),
    }
}

fn to_proxy_request(req: &HttpRequest, body: web::Bytes, upstream_authority: &str) -> ProxyRequest {
    let uri = req.uri();

    let path = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_owned())
        .unwrap_or_else(|| "/".to_owned());

    // absolute-form requests for another origin are forwarded as-is
    let cross_origin = match Url::parse(&uri.to_string()) {
        Ok(absolute) => authority_of(&absolute) != upstream_authority,
        Err(_) => false,
    };

    ProxyRequest {
        method: req.method().as_str().to_owned(),
        url: if cross_origin { uri.to_string() } else { path },
        cross_origin,
        headers: req
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_owned(), value.to_owned()))
            })
            .collect(),
        body,
    }
}

fn to_http_response(served: Served) -> HttpResponse {
    let cache_status = if served.from_cache() { "HIT" } else { "MISS" };
    let (status, headers, body) = served.into_parts();

    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut builder = HttpResponse::build(status);

    for (name, value) in headers.iter().filter(|(n, _)| forwardable(n)) {
        builder.append_header((name.as_str(), value.as_str()));
    }

    builder.insert_header(("x-cache", cache_status));

    match body {
        Body::Full(bytes) => builder.body(bytes),
        Body::Stream(chunks) => builder.streaming(chunks),
    }
}

async fn proxy_request<N: Network + 'static>(
    req: HttpRequest,
    body: web::Bytes,
    data: web::Data<ProxyState<N>>,
) -> HttpResponse {
    let request = to_proxy_request(&req, body, &data.upstream_authority);
    let descriptor = format!("{} {}", request.method, request.url);

    match data.proxy.handle(request).await {
        Ok(served) => {
            log::debug!(
                "[{}] {} from {}",
                descriptor,
                served.status(),
                if served.from_cache() { "cache" } else { "network" }
            );
            to_http_response(served)
        }
        Err(err) => {
            log::warn!("[{}] {}", descriptor, err);
            HttpResponse::build(StatusCode::BAD_GATEWAY).body(err.to_string())
        }
    }
}

/// Routes every request through the proxy held in `web::Data<ProxyState<N>>`.
pub fn configure_proxy<N: Network + 'static>(cfg: &mut web::ServiceConfig) {
    cfg.default_service(web::to(proxy_request::<N>));
}

pub async fn start_proxy_server(config: &Config) -> std::io::Result<()> {
    let storage = Arc::new(CacheStorage::bounded(config.proxy.max_entries));
    let proxy = OfflineCacheProxy::new(
        storage,
        &config.proxy,
        AwcNetwork::new(config.backend.clone()),
    );

    proxy
        .install()
        .await
        .map_err(|e| io_err(&format!("install failed: {e}")))?;

    let deleted = proxy.activate().await;
    log::info!(
        "[{}] active, removed {} stale generation(s)",
        proxy.current_generation(),
        deleted.len()
    );

    let app_state = web::Data::new(ProxyState::new(proxy, &config.backend));
    let port = config.proxy.port;

    log::info!(
        "Starting offline cache proxy at 0.0.0.0:{port} in front of {}...",
        config.backend
    );

    HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .configure(configure_proxy::<AwcNetwork>)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
