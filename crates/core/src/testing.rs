//! Scripted network used by unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{Mutex, watch};
use url::Url;

use crate::Error;
use crate::http::{Request, Response, ResponseType};
use crate::network::Network;

#[derive(Clone)]
enum Reply {
    Respond { status: u16, body: Bytes },
    Fail,
}

/// In-process stand-in for the network.
///
/// Same-origin routes are keyed by path (plus query); anything else by the
/// full URL. Unknown routes answer 404.
pub struct FakeNetwork {
    origin: Url,
    routes: Mutex<HashMap<String, Reply>>,
    offline: AtomicBool,
    calls: AtomicUsize,
    gate: watch::Sender<bool>,
}

impl FakeNetwork {
    pub fn new(origin: Url) -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            origin,
            routes: Mutex::new(HashMap::new()),
            offline: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            gate,
        }
    }

    fn route_key(&self, url: &Url) -> String {
        if url.origin() == self.origin.origin() {
            match url.query() {
                Some(q) => format!("{}?{q}", url.path()),
                None => url.path().to_string(),
            }
        } else {
            url.to_string()
        }
    }

    pub async fn serve(&self, route: &str, body: &'static str) {
        self.serve_status(route, 200, body).await;
    }

    pub async fn serve_status(&self, route: &str, status: u16, body: &'static str) {
        self.routes
            .lock()
            .await
            .insert(route.to_string(), Reply::Respond { status, body: Bytes::from_static(body.as_bytes()) });
    }

    pub async fn fail(&self, route: &str) {
        self.routes.lock().await.insert(route.to_string(), Reply::Fail);
    }

    pub async fn body_for(&self, route: &str) -> Option<Bytes> {
        match self.routes.lock().await.get(route) {
            Some(Reply::Respond { body, .. }) => Some(body.clone()),
            _ => None,
        }
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Block every fetch until [`FakeNetwork::release`].
    pub fn hold(&self) {
        self.gate.send_replace(false);
    }

    pub fn release(&self) {
        self.gate.send_replace(true);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Network for FakeNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let mut gate = self.gate.subscribe();
        let _ = gate.wait_for(|open| *open).await;

        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::Network("offline".into()));
        }

        let key = self.route_key(&request.url);
        let reply = self.routes.lock().await.get(&key).cloned();
        let response_type =
            if request.url.origin() == self.origin.origin() { ResponseType::Basic } else { ResponseType::Cors };

        match reply {
            Some(Reply::Respond { status, body }) => Ok(Response::new(status, response_type, body)),
            Some(Reply::Fail) => Err(Error::Network(format!("connection reset: {key}"))),
            None => Ok(Response::new(404, response_type, "not found")),
        }
    }
}
