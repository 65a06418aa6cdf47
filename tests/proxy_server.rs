use actix_web::{test, web, App};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use url::Url;

use vidfetch::cache::proxy::{Body, Network, NetworkResponse, OfflineCacheProxy, ProxyRequest};
use vidfetch::cache::store::{CacheStorage, RequestKey, ResponseKind};
use vidfetch::cache::web::{configure_proxy, ProxyState};
use vidfetch::config::ProxyConfig;
use vidfetch::error::NetworkError;

/// Handles stay with the test after the network moves into the proxy.
#[derive(Clone, Default)]
struct ScriptedNetwork {
    offline: Arc<AtomicBool>,
    calls: Arc<AtomicUsize>,
    routes: Arc<Mutex<HashMap<String, (u16, &'static str)>>>,
}

impl Network for ScriptedNetwork {
    async fn fetch(&self, request: &ProxyRequest) -> Result<NetworkResponse, NetworkError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.offline.load(Ordering::SeqCst) {
            return Err(NetworkError::Offline);
        }

        let (status, body) = self
            .routes
            .lock()
            .unwrap()
            .get(&request.url)
            .copied()
            .unwrap_or((404, "not found"));

        Ok(NetworkResponse {
            status,
            headers: vec![("content-type".to_owned(), "text/plain".to_owned())],
            kind: ResponseKind::Basic,
            body: Body::Full(body.into()),
        })
    }
}

fn shell_network() -> ScriptedNetwork {
    let network = ScriptedNetwork::default();
    {
        let mut routes = network.routes.lock().unwrap();
        routes.insert("/".to_owned(), (200, "<html>"));
        routes.insert("/static/css/style.css".to_owned(), (200, "body{}"));
        routes.insert("/static/js/app.js".to_owned(), (200, "app()"));
        routes.insert("/static/manifest.json".to_owned(), (200, "{}"));
        routes.insert("/api/progress/t1".to_owned(), (200, r#"{"status":"preparing"}"#));
    }
    network
}

async fn state(
    storage: Arc<CacheStorage>,
) -> (web::Data<ProxyState<ScriptedNetwork>>, ScriptedNetwork) {
    let network = shell_network();
    let proxy = OfflineCacheProxy::new(storage, &ProxyConfig::default(), network.clone());
    proxy.install().await.unwrap();
    proxy.activate().await;

    let data = web::Data::new(ProxyState::new(
        proxy,
        &Url::parse("http://127.0.0.1:5000").unwrap(),
    ));

    (data, network)
}

#[actix_web::test]
async fn shell_assets_survive_going_offline() {
    let (data, network) = state(Arc::new(CacheStorage::new())).await;
    let app = test::init_service(
        App::new()
            .app_data(data.clone())
            .configure(configure_proxy::<ScriptedNetwork>),
    )
    .await;

    network.offline.store(true, Ordering::SeqCst);

    let req = test::TestRequest::get().uri("/static/js/app.js").to_request();
    let res = test::call_service(&app, req).await;

    assert!(res.status().is_success());
    assert_eq!(res.headers().get("x-cache").unwrap(), "HIT");
    assert_eq!(test::read_body(res).await, "app()");
}

#[actix_web::test]
async fn offline_miss_is_a_bad_gateway() {
    let (data, network) = state(Arc::new(CacheStorage::new())).await;
    let app = test::init_service(
        App::new()
            .app_data(data.clone())
            .configure(configure_proxy::<ScriptedNetwork>),
    )
    .await;

    network.offline.store(true, Ordering::SeqCst);

    let req = test::TestRequest::get().uri("/static/img/logo.png").to_request();
    let res = test::call_service(&app, req).await;

    assert_eq!(res.status().as_u16(), 502);
}

#[actix_web::test]
async fn job_endpoints_always_reach_the_backend() {
    let storage = Arc::new(CacheStorage::new());
    let (data, network) = state(storage.clone()).await;
    let app = test::init_service(
        App::new()
            .app_data(data.clone())
            .configure(configure_proxy::<ScriptedNetwork>),
    )
    .await;

    for _ in 0..2 {
        let req = test::TestRequest::get().uri("/api/progress/t1").to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.headers().get("x-cache").unwrap(), "MISS");
    }

    assert!(storage
        .match_any(&RequestKey::new("/api/progress/t1"))
        .is_none());
    // four manifest fetches plus two progress requests
    assert_eq!(network.calls.load(Ordering::SeqCst), 6);
}
