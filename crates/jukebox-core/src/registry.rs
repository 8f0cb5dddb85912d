//! In-memory session registry.
//!
//! Maps a server to its live playback session. Entries are created by
//! [`SessionRegistry::open`] and removed on explicit leave or when the voice
//! connection is lost.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use jukebox_types::{ChannelId, ServerId};

use crate::events::EventBus;
use crate::resolver::ResourceResolver;
use crate::session::Session;
use crate::voice::{JoinError, VoiceGateway, join_with_timeout};

/// Owned, cloneable registry handle. Clones share the same map.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<Mutex<HashMap<ServerId, Session>>>,
    events: EventBus,
    shuffle_seed: Option<u64>,
}

impl SessionRegistry {
    pub fn new(events: EventBus) -> Self {
        Self {
            sessions: Arc::default(),
            events,
            shuffle_seed: None,
        }
    }

    /// Seed every session's random source with `seed`.
    pub fn with_shuffle_seed(mut self, seed: Option<u64>) -> Self {
        self.shuffle_seed = seed;
        self
    }

    fn store(&self) -> MutexGuard<'_, HashMap<ServerId, Session>> {
        self.sessions.lock().unwrap_or_else(|err| err.into_inner())
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn get(&self, server: ServerId) -> Option<Session> {
        self.store().get(&server).cloned()
    }

    /// Register `session`, returning any session it replaced.
    pub fn insert(&self, session: Session) -> Option<Session> {
        self.store().insert(session.server(), session)
    }

    pub fn remove(&self, server: ServerId) -> Option<Session> {
        self.store().remove(&server)
    }

    /// Remove and destroy the session for `server`. Returns whether one existed.
    pub fn close(&self, server: ServerId) -> bool {
        match self.remove(server) {
            Some(session) => {
                session.destroy();
                true
            }
            None => false,
        }
    }

    /// Destroy every session.
    pub fn close_all(&self) -> usize {
        let sessions: Vec<Session> = self.store().drain().map(|(_, session)| session).collect();
        for session in &sessions {
            session.destroy();
        }
        sessions.len()
    }

    pub fn servers(&self) -> Vec<ServerId> {
        let mut servers: Vec<ServerId> = self.store().keys().copied().collect();
        servers.sort_by_key(|server| server.0);
        servers
    }

    pub fn len(&self) -> usize {
        self.store().len()
    }

    pub fn is_empty(&self) -> bool {
        self.store().is_empty()
    }

    /// Return the session for `server`, joining `channel` first if there is none.
    ///
    /// A new session gets a sink driver and a connection watcher; the watcher
    /// drops the registry entry when the connection is lost.
    pub async fn open(
        &self,
        gateway: &dyn VoiceGateway,
        resolver: Arc<dyn ResourceResolver>,
        server: ServerId,
        channel: ChannelId,
        timeout: Duration,
    ) -> Result<Session, JoinError> {
        if let Some(existing) = self.get(server) {
            return Ok(existing);
        }

        let connection = join_with_timeout(gateway, server, channel, timeout).await?;
        let session = Session::new(
            server,
            connection,
            resolver,
            self.events.clone(),
            self.shuffle_seed,
        );

        let raced = {
            let mut store = self.store();
            match store.get(&server).cloned() {
                Some(existing) => Some(existing),
                None => {
                    store.insert(server, session.clone());
                    None
                }
            }
        };
        if let Some(existing) = raced {
            // A concurrent open for the same server finished first.
            session.destroy();
            return Ok(existing);
        }

        session.spawn_driver();
        let registry = self.clone();
        let watched = session.clone();
        session.spawn_connection_watcher(move |server| {
            let mut store = registry.store();
            // A later session for the same server must survive.
            if store
                .get(&server)
                .is_some_and(|current| current.ptr_eq(&watched))
            {
                store.remove(&server);
            }
        });
        tracing::info!(server = %server, channel = %channel, "joined voice channel");
        Ok(session)
    }
}
