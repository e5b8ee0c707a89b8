//! The cache lifecycle controller and event-dispatch surface.
//!
//! The host delivers lifecycle events (`install`, `activate`), one `fetch`
//! per intercepted request and `message`s from pages. [`Agent`] turns them
//! into lifecycle transitions, cache work and responses.

use std::sync::Arc;

use schemars::JsonSchema;
use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard};
use url::Url;

use crate::Error;
use crate::cache::CacheStore;
use crate::clients::{AgentMessage, ClientMessage, ClientRegistry};
use crate::http::{Request, RequestKey};
use crate::lifecycle::{Effect, Lifecycle, LifecycleEvent, Phase, Transition};
use crate::network::Network;
use crate::precache;
use crate::router::{Route, classify};
use crate::strategy::{self, Served, StrategyContext};
use crate::tasks::BackgroundTasks;
use crate::version::{AgentManifest, CacheName};

/// Outcome of an intercepted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Not handled; the host performs the request itself.
    Passthrough,
    /// Answered by the agent.
    Respond { route: Route, served: Served },
}

/// Result of a successful install.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
pub struct InstallReport {
    pub version: String,
    pub precached: usize,
    /// Phase after install; `active` when skip-waiting was requested.
    pub phase: Phase,
    pub activation: Option<ActivationReport>,
}

/// What activation did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
pub struct ActivationReport {
    pub version: String,
    pub evicted: Vec<CacheName>,
    pub claimed: usize,
    pub notified: usize,
}

/// Agent status for hosts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
pub struct AgentStatus {
    pub version: String,
    pub phase: Phase,
    pub clients: usize,
    pub pending_tasks: usize,
}

/// One deployed agent instance.
pub struct Agent {
    ctx: StrategyContext,
    lifecycle: Mutex<Lifecycle>,
    clients: Arc<ClientRegistry>,
}

/// Who hears about an activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Announce {
    /// Every open page.
    All,
    /// Only pages the claim moved to this version.
    Claimed,
}

impl Agent {
    /// Create an agent in `installing`.
    ///
    /// `clients` is the host's page registry, shared by every version it
    /// deploys. `skip_waiting` makes a successful install activate at once
    /// instead of waiting for pages controlled by an older version to close.
    pub fn new(
        manifest: AgentManifest, origin: Url, store: Arc<dyn CacheStore>, network: Arc<dyn Network>,
        clients: Arc<ClientRegistry>, skip_waiting: bool,
    ) -> Result<Self, Error> {
        if origin.cannot_be_a_base() {
            return Err(Error::InvalidUrl(format!("origin cannot be a base URL: {origin}")));
        }
        let shell_key = RequestKey::for_path(&origin, manifest.shell_document())?;

        let ctx = StrategyContext {
            store,
            network,
            manifest: Arc::new(manifest),
            origin,
            shell_key,
            background: BackgroundTasks::new(),
        };

        Ok(Self { ctx, lifecycle: Mutex::new(Lifecycle::new(skip_waiting)), clients })
    }

    pub fn manifest(&self) -> &AgentManifest {
        &self.ctx.manifest
    }

    pub fn origin(&self) -> &Url {
        &self.ctx.origin
    }

    pub fn clients(&self) -> &ClientRegistry {
        &self.clients
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.ctx.store
    }

    pub async fn phase(&self) -> Phase {
        self.lifecycle().await.phase()
    }

    pub async fn status(&self) -> AgentStatus {
        AgentStatus {
            version: self.manifest().version().to_string(),
            phase: self.phase().await,
            clients: self.clients.len().await,
            pending_tasks: self.ctx.background.pending().await,
        }
    }

    /// Handle the `install` event: populate the precache, then move to
    /// `waiting` (or straight through activation when skip-waiting is set).
    ///
    /// A failed population leaves the agent `redundant` and nothing cached.
    pub async fn install(&self) -> Result<InstallReport, Error> {
        let phase = self.phase().await;
        if phase != Phase::Installing {
            return Err(Error::InvalidState(format!("install requested while {phase:?}")));
        }

        let manifest = &self.ctx.manifest;
        tracing::info!(version = manifest.version(), entries = manifest.precache_urls().len(), "installing");

        let populated = precache::populate(
            self.ctx.store.as_ref(),
            self.ctx.network.as_ref(),
            &self.ctx.origin,
            manifest.precache_urls(),
            &manifest.precache_cache(),
        )
        .await;

        let mut lifecycle = self.lifecycle().await;
        let precached = match populated {
            Ok(n) => n,
            Err(e) => {
                lifecycle.apply(LifecycleEvent::InstallFailed)?;
                tracing::warn!(version = manifest.version(), error = %e, "install failed");
                return Err(e);
            }
        };

        let transition = lifecycle.apply(LifecycleEvent::Installed)?;
        log_transition(&transition);
        let activation = self.run_effects(&mut lifecycle, &transition).await?;

        Ok(InstallReport {
            version: manifest.version().to_string(),
            precached,
            phase: lifecycle.phase(),
            activation,
        })
    }

    /// Handle the `activate` event.
    ///
    /// From `waiting` this is the host reporting that no older instance
    /// controls pages any more. In `activating` it completes the pending
    /// activation. In `active` it re-runs eviction and claim, leaving cache
    /// contents unchanged, and announces itself only to newly claimed pages.
    pub async fn activate(&self) -> Result<ActivationReport, Error> {
        let mut lifecycle = self.lifecycle().await;
        match lifecycle.phase() {
            Phase::Waiting => {
                let transition = lifecycle.apply(LifecycleEvent::ControllerReleased)?;
                log_transition(&transition);
                self.run_effects(&mut lifecycle, &transition)
                    .await?
                    .ok_or_else(|| Error::InvalidState("activation did not start".into()))
            }
            Phase::Activating => self.finish_activation(&mut lifecycle).await,
            Phase::Active => self.activation_steps(Announce::Claimed).await,
            phase => Err(Error::InvalidState(format!("activate requested while {phase:?}"))),
        }
    }

    /// Handle a `message` posted by a page.
    ///
    /// `SKIP_WAITING` forces a waiting instance to activate now and is
    /// ignored once the instance is redundant. Returns the transition it
    /// caused, if any.
    pub async fn handle_message(&self, message: ClientMessage) -> Result<Option<Transition>, Error> {
        match message {
            ClientMessage::SkipWaiting => {
                let mut lifecycle = self.lifecycle().await;
                let transition = lifecycle.apply(LifecycleEvent::SkipWaiting)?;
                log_transition(&transition);
                self.run_effects(&mut lifecycle, &transition).await?;
                Ok(Some(transition))
            }
            ClientMessage::Unknown => {
                tracing::debug!("ignoring unknown client message");
                Ok(None)
            }
        }
    }

    /// Handle a `fetch` event.
    ///
    /// Only an active agent intercepts; once another version has claimed the
    /// pages this one passes everything through. Errors are returned only
    /// when the network failed and no cached copy or fallback exists.
    pub async fn handle_fetch(&self, request: &Request) -> Result<FetchOutcome, Error> {
        if self.phase().await != Phase::Active {
            return Ok(FetchOutcome::Passthrough);
        }

        let route = classify(request, &self.ctx.origin, &self.ctx.manifest);
        tracing::debug!(method = %request.method, url = %request.url, ?route, "intercepted");

        let served = match route {
            Route::Passthrough => return Ok(FetchOutcome::Passthrough),
            Route::Navigation => strategy::network_first_with_shell(&self.ctx, request).await,
            Route::ShellAsset => strategy::cache_first(&self.ctx, request).await?,
            Route::Runtime => strategy::stale_while_revalidate(&self.ctx, request).await?,
        };

        Ok(FetchOutcome::Respond { route, served })
    }

    /// Wait for detached cache refreshes to finish.
    pub async fn settle(&self) {
        self.ctx.background.settle().await;
    }

    /// Lock the lifecycle, first retiring this instance if another version
    /// claimed the pages after it activated.
    async fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.phase() != Phase::Active {
            return lifecycle;
        }

        let version = self.ctx.manifest.version();
        if let Some(controller) = self.clients.controller().await
            && controller != version
            && let Ok(transition) = lifecycle.apply(LifecycleEvent::Superseded)
        {
            tracing::info!(version, by = %controller, "superseded");
            log_transition(&transition);
        }
        lifecycle
    }

    async fn run_effects(
        &self, lifecycle: &mut Lifecycle, transition: &Transition,
    ) -> Result<Option<ActivationReport>, Error> {
        let mut report = None;
        for effect in &transition.effects {
            match effect {
                Effect::BeginActivation => report = Some(self.finish_activation(lifecycle).await?),
            }
        }
        Ok(report)
    }

    async fn finish_activation(&self, lifecycle: &mut Lifecycle) -> Result<ActivationReport, Error> {
        let report = self.activation_steps(Announce::All).await?;
        let transition = lifecycle.apply(LifecycleEvent::Activated)?;
        log_transition(&transition);
        Ok(report)
    }

    /// Evict stale caches, claim every page, announce the new version.
    async fn activation_steps(&self, announce: Announce) -> Result<ActivationReport, Error> {
        let manifest = &self.ctx.manifest;
        let allowed = manifest.allowed_caches();

        let mut evicted = Vec::new();
        for name in self.ctx.store.list_names().await? {
            if !allowed.contains(&name) {
                self.ctx.store.delete(&name).await?;
                tracing::info!(cache = %name, "evicted stale cache");
                evicted.push(name);
            }
        }

        self.ctx.store.open(&manifest.runtime_cache()).await?;

        let version = manifest.version().to_string();
        let claimed_ids = self.clients.claim(&version).await;
        let message = AgentMessage::Activated { version: version.clone() };
        let notified = match announce {
            Announce::All => self.clients.broadcast(&message).await,
            Announce::Claimed => self.clients.post(&claimed_ids, &message).await,
        };
        let claimed = claimed_ids.len();

        tracing::info!(version = %version, evicted = evicted.len(), claimed, notified, "activated");
        Ok(ActivationReport { version, evicted, claimed, notified })
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("version", &self.ctx.manifest.version())
            .field("origin", &self.ctx.origin.as_str())
            .finish_non_exhaustive()
    }
}

fn log_transition(transition: &Transition) {
    if transition.changed() {
        tracing::info!(from = ?transition.from, to = ?transition.to, "lifecycle transition");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheDb;
    use crate::http::RequestMode;
    use crate::testing::FakeNetwork;

    const ORIGIN: &str = "https://app.example";

    struct Fixture {
        agent: Agent,
        db: CacheDb,
        net: Arc<FakeNetwork>,
    }

    async fn fixture(version: &str, skip_waiting: bool) -> Fixture {
        let db = CacheDb::open_in_memory().await.unwrap();
        fixture_with(version, skip_waiting, db).await
    }

    async fn fixture_with(version: &str, skip_waiting: bool, db: CacheDb) -> Fixture {
        fixture_shared(version, skip_waiting, db, Arc::new(ClientRegistry::new())).await
    }

    async fn fixture_shared(version: &str, skip_waiting: bool, db: CacheDb, clients: Arc<ClientRegistry>) -> Fixture {
        let origin = Url::parse(ORIGIN).unwrap();
        let net = Arc::new(FakeNetwork::new(origin.clone()));
        net.serve("/", "<html>root</html>").await;
        net.serve("/index.html", "<html>shell</html>").await;
        net.serve("/manifest.json", "{\"name\":\"zerolog\"}").await;
        let manifest = AgentManifest::new(version, ["/", "/index.html", "/manifest.json"], "/index.html").unwrap();
        let agent = Agent::new(manifest, origin, Arc::new(db.clone()), net.clone(), clients, skip_waiting).unwrap();
        Fixture { agent, db, net }
    }

    fn request(method: &str, url: &str, mode: RequestMode) -> Request {
        Request::parse(method, url, mode, &Url::parse(ORIGIN).unwrap()).unwrap()
    }

    fn served(outcome: FetchOutcome) -> Served {
        match outcome {
            FetchOutcome::Respond { served, .. } => served,
            FetchOutcome::Passthrough => panic!("expected a response"),
        }
    }

    #[tokio::test]
    async fn test_install_round_trips_manifest() {
        let f = fixture("v1", false).await;
        let report = f.agent.install().await.unwrap();
        assert_eq!(report.precached, 3);
        assert_eq!(report.phase, Phase::Waiting);

        let cache = f.agent.manifest().precache_cache();
        for path in f.agent.manifest().precache_urls() {
            let key = RequestKey::for_path(f.agent.origin(), path).unwrap();
            let entry = f.db.match_entry(&cache, &key).await.unwrap().unwrap();
            assert_eq!(Some(entry.response.body), f.net.body_for(path).await);
        }
    }

    #[tokio::test]
    async fn test_failed_install_is_redundant() {
        let f = fixture("v1", true).await;
        f.net.fail("/manifest.json").await;

        let result = f.agent.install().await;
        assert!(matches!(result, Err(Error::PrecacheFailed { .. })));
        assert_eq!(f.agent.phase().await, Phase::Redundant);
        assert!(f.db.list_names().await.unwrap().is_empty());
        assert!(matches!(f.agent.activate().await, Err(Error::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_install_twice_rejected() {
        let f = fixture("v1", false).await;
        f.agent.install().await.unwrap();
        assert!(matches!(f.agent.install().await, Err(Error::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_skip_waiting_install_activates() {
        let f = fixture("v1", true).await;
        let (_client, mut rx) = f.agent.clients().connect().await;

        let report = f.agent.install().await.unwrap();
        assert_eq!(report.phase, Phase::Active);
        let activation = report.activation.unwrap();
        assert_eq!(activation.claimed, 1);
        assert_eq!(activation.notified, 1);
        assert_eq!(rx.recv().await, Some(AgentMessage::Activated { version: "v1".into() }));
    }

    #[tokio::test]
    async fn test_activation_evicts_previous_version() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.open(&"v0-precache".into()).await.unwrap();
        db.open(&"v0-runtime".into()).await.unwrap();
        db.open(&"unrelated".into()).await.unwrap();

        let f = fixture_with("v1", false, db).await;
        f.agent.install().await.unwrap();
        let report = f.agent.activate().await.unwrap();

        assert_eq!(report.evicted.len(), 3);
        let names: Vec<_> = f.db.list_names().await.unwrap().into_iter().collect();
        assert_eq!(names, vec![CacheName::from("v1-precache"), CacheName::from("v1-runtime")]);
        assert_eq!(f.agent.phase().await, Phase::Active);
    }

    #[tokio::test]
    async fn test_activate_is_idempotent() {
        let f = fixture("v1", true).await;
        f.agent.install().await.unwrap();
        f.net.serve("/data.json", "[1]").await;
        f.agent.handle_fetch(&request("GET", "/data.json", RequestMode::SameOrigin)).await.unwrap();
        f.agent.settle().await;

        let before = f.db.keys(&f.agent.manifest().runtime_cache()).await.unwrap();
        let report = f.agent.activate().await.unwrap();
        assert!(report.evicted.is_empty());
        assert_eq!(report.claimed, 0);
        assert_eq!(f.db.keys(&f.agent.manifest().runtime_cache()).await.unwrap(), before);
        assert_eq!(f.db.list_names().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_repeat_activate_notifies_only_new_pages() {
        let f = fixture("v1", true).await;
        let (_first, mut rx_first) = f.agent.clients().connect().await;
        f.agent.install().await.unwrap();
        assert_eq!(rx_first.recv().await, Some(AgentMessage::Activated { version: "v1".into() }));

        let report = f.agent.activate().await.unwrap();
        assert_eq!((report.claimed, report.notified), (0, 0));
        assert!(rx_first.try_recv().is_err());

        let (second, mut rx_second) = f.agent.clients().connect().await;
        let report = f.agent.activate().await.unwrap();
        assert_eq!((report.claimed, report.notified), (1, 1));
        assert!(f.agent.clients().is_controlled(&second, "v1").await);
        assert_eq!(rx_second.recv().await, Some(AgentMessage::Activated { version: "v1".into() }));
        assert!(rx_first.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_newer_version_supersedes_active_agent() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let clients = Arc::new(ClientRegistry::new());
        let v1 = fixture_shared("v1", true, db.clone(), clients.clone()).await;
        v1.agent.install().await.unwrap();
        let (page, mut rx) = clients.connect().await;
        v1.agent.activate().await.unwrap();
        assert_eq!(rx.recv().await, Some(AgentMessage::Activated { version: "v1".into() }));

        let v2 = fixture_shared("v2", true, db.clone(), clients.clone()).await;
        let activation = v2.agent.install().await.unwrap().activation.unwrap();
        assert_eq!(activation.claimed, 1);
        assert!(clients.is_controlled(&page, "v2").await);
        assert_eq!(rx.recv().await, Some(AgentMessage::Activated { version: "v2".into() }));

        assert_eq!(v1.agent.phase().await, Phase::Redundant);
        let outcome = v1.agent.handle_fetch(&request("GET", "/data.json", RequestMode::SameOrigin)).await.unwrap();
        assert_eq!(outcome, FetchOutcome::Passthrough);
        assert!(matches!(v1.agent.activate().await, Err(Error::InvalidState(_))));

        let names: Vec<_> = db.list_names().await.unwrap().into_iter().collect();
        assert_eq!(names, vec![CacheName::from("v2-precache"), CacheName::from("v2-runtime")]);
    }

    #[tokio::test]
    async fn test_same_version_redeploy_is_not_superseded() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let clients = Arc::new(ClientRegistry::new());
        let first = fixture_shared("v1", true, db.clone(), clients.clone()).await;
        first.agent.install().await.unwrap();
        let second = fixture_shared("v1", true, db, clients).await;
        second.agent.install().await.unwrap();

        assert_eq!(first.agent.phase().await, Phase::Active);
        assert_eq!(second.agent.phase().await, Phase::Active);
    }

    #[tokio::test]
    async fn test_skip_waiting_message_activates_waiting_agent() {
        let f = fixture("v1", false).await;
        let (client, _rx) = f.agent.clients().connect().await;
        f.agent.install().await.unwrap();
        assert_eq!(f.agent.phase().await, Phase::Waiting);
        assert!(!f.agent.clients().is_controlled(&client, "v1").await);

        let transition = f.agent.handle_message(ClientMessage::SkipWaiting).await.unwrap().unwrap();
        assert_eq!((transition.from, transition.to), (Phase::Waiting, Phase::Activating));
        assert_eq!(f.agent.phase().await, Phase::Active);
        assert!(f.agent.clients().is_controlled(&client, "v1").await);
    }

    #[tokio::test]
    async fn test_skip_waiting_ignored_when_redundant() {
        let f = fixture("v1", false).await;
        f.net.fail("/manifest.json").await;
        assert!(f.agent.install().await.is_err());

        let transition = f.agent.handle_message(ClientMessage::SkipWaiting).await.unwrap().unwrap();
        assert!(!transition.changed());
        assert_eq!(f.agent.phase().await, Phase::Redundant);
        assert!(f.db.list_names().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_message_ignored() {
        let f = fixture("v1", false).await;
        f.agent.install().await.unwrap();
        assert_eq!(f.agent.handle_message(ClientMessage::Unknown).await.unwrap(), None);
        assert_eq!(f.agent.phase().await, Phase::Waiting);
    }

    #[tokio::test]
    async fn test_waiting_agent_does_not_intercept() {
        let f = fixture("v1", false).await;
        f.agent.install().await.unwrap();
        let outcome = f.agent.handle_fetch(&request("GET", "/index.html", RequestMode::SameOrigin)).await.unwrap();
        assert_eq!(outcome, FetchOutcome::Passthrough);
    }

    #[tokio::test]
    async fn test_offline_navigation_serves_shell() {
        let f = fixture("v1", true).await;
        f.agent.install().await.unwrap();
        f.net.set_offline(true);

        let outcome = f.agent.handle_fetch(&request("GET", "/", RequestMode::Navigate)).await.unwrap();
        let served = served(outcome);
        assert_eq!(served.response.status, 200);
        assert_eq!(served.response.text(), "<html>shell</html>");
    }

    #[tokio::test]
    async fn test_online_navigation_updates_runtime_shell() {
        let f = fixture("v1", true).await;
        f.agent.install().await.unwrap();
        f.net.serve("/", "<html>v1.1</html>").await;

        let outcome = f.agent.handle_fetch(&request("GET", "/", RequestMode::Navigate)).await.unwrap();
        let served = served(outcome);
        assert_eq!(served.response.text(), "<html>v1.1</html>");

        f.agent.settle().await;
        let key = RequestKey::for_path(f.agent.origin(), "/index.html").unwrap();
        let entry = f
            .db
            .match_entry(&f.agent.manifest().runtime_cache(), &key)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.response.text(), "<html>v1.1</html>");
    }

    #[tokio::test]
    async fn test_cross_origin_never_cached() {
        let f = fixture("v1", true).await;
        f.agent.install().await.unwrap();

        let outcome = f
            .agent
            .handle_fetch(&request("GET", "https://ads.example/pixel.gif", RequestMode::NoCors))
            .await
            .unwrap();
        assert_eq!(outcome, FetchOutcome::Passthrough);
        assert!(f.db.keys(&f.agent.manifest().runtime_cache()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_post_passes_through() {
        let f = fixture("v1", true).await;
        f.agent.install().await.unwrap();
        let outcome = f.agent.handle_fetch(&request("POST", "/api/log", RequestMode::SameOrigin)).await.unwrap();
        assert_eq!(outcome, FetchOutcome::Passthrough);
    }

    #[tokio::test]
    async fn test_shell_asset_served_from_precache() {
        let f = fixture("v1", true).await;
        f.agent.install().await.unwrap();
        f.net.set_offline(true);

        let outcome = f.agent.handle_fetch(&request("GET", "/manifest.json", RequestMode::SameOrigin)).await.unwrap();
        match outcome {
            FetchOutcome::Respond { route, served } => {
                assert_eq!(route, Route::ShellAsset);
                assert_eq!(served.response.text(), "{\"name\":\"zerolog\"}");
            }
            FetchOutcome::Passthrough => panic!("expected a response"),
        }
    }

    #[tokio::test]
    async fn test_status_reports_phase() {
        let f = fixture("v1", false).await;
        let status = f.agent.status().await;
        assert_eq!(status.phase, Phase::Installing);
        assert_eq!(status.version, "v1");
    }
}
