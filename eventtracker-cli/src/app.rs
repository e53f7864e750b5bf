//! Wiring of config, stores and collaborators for one CLI invocation.

use std::sync::Arc;

use anyhow::{Context, Result};
use eventtracker_core::cache::LocalCache;
use eventtracker_core::collab::{AuthProvider, GrantStore, LocalAccounts, OutboxSms, Session};
use eventtracker_core::digest::DigestService;
use eventtracker_core::error::RemoteReadError;
use eventtracker_core::remote::{AccessRules, RealtimeStore};
use eventtracker_core::{SyncCoordinator, TrackerConfig};

use crate::permission::PromptingGate;

pub struct App {
    pub config: TrackerConfig,
    pub accounts: LocalAccounts,
    pub store: Arc<RealtimeStore>,
    pub session: Option<Session>,
}

impl App {
    pub async fn load() -> Result<Self> {
        let config = TrackerConfig::load().context("Failed to load configuration")?;
        let accounts = LocalAccounts::new(config.accounts_file(), config.session_file());

        let rules = AccessRules {
            require_auth: config.remote.require_auth,
        };
        let store = RealtimeStore::open(&config.remote_file(), config.root_path()?, rules)
            .context("Failed to open the event store")?;

        let session = accounts.current_session().await;
        store.set_session(session.as_ref());

        Ok(App {
            config,
            accounts,
            store: Arc::new(store),
            session,
        })
    }

    pub async fn open_cache(&self) -> Result<LocalCache> {
        let path = self.config.cache_file();
        LocalCache::open(&path, self.config.cache.workers)
            .await
            .with_context(|| format!("Failed to open cache at {}", path.display()))
    }

    /// Start a coordinator and wait for the first snapshot.
    pub async fn coordinator(&self) -> Result<SyncCoordinator> {
        let cache = self.open_cache().await?;
        let coordinator =
            SyncCoordinator::start(self.store.clone(), Some(cache), self.config.cache.policy)
                .await
                .map_err(explain_read_error)?;
        coordinator.ready().await.map_err(explain_read_error)?;
        Ok(coordinator)
    }

    pub fn digest_service(&self) -> DigestService {
        DigestService::new(
            Arc::new(OutboxSms::new(self.config.sms_outbox_file())),
            Arc::new(PromptingGate::new(GrantStore::new(
                self.config.permissions_file(),
            ))),
            self.config.sms.phone_number.clone(),
        )
    }
}

fn explain_read_error(err: RemoteReadError) -> anyhow::Error {
    match err {
        RemoteReadError::PermissionDenied => anyhow::anyhow!(
            "{}\n\nSign in first with:\n  eventtracker auth login\n\nOr create an account:\n  eventtracker auth register",
            err
        ),
        other => other.into(),
    }
}
