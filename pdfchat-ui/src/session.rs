use std::{collections::HashMap, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use pdfchat_rag::{PdfDocument, ProcessOutcome, ProcessStats, RagPipeline, VectorIndex};
use tokio::sync::{Mutex, RwLock, broadcast};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};
use uuid::Uuid;

use crate::protocol::{ProgressEvent, SessionId};

const CHANNEL_CAPACITY: usize = 64;

/// Everything one browser session owns. Nothing here is shared across sessions.
#[derive(Debug)]
pub struct SessionState {
    pub id: SessionId,
    pub created_at: DateTime<Utc>,
    query: RwLock<Option<String>>,
    index: RwLock<Option<Arc<dyn VectorIndex>>>,
    last_stats: RwLock<Option<ProcessStats>>,
    // Held for the whole of a Process action so two actions in one session never interleave.
    process_lock: Mutex<()>,
    tx: broadcast::Sender<ProgressEvent>,
    last_touched: RwLock<Instant>,
}

impl SessionState {
    fn new(id: SessionId) -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            id,
            created_at: Utc::now(),
            query: RwLock::new(None),
            index: RwLock::new(None),
            last_stats: RwLock::new(None),
            process_lock: Mutex::new(()),
            tx,
            last_touched: RwLock::new(Instant::now()),
        }
    }

    async fn touch(&self) {
        *self.last_touched.write().await = Instant::now();
    }

    /// Time since the session was last looked up.
    pub async fn idle_for(&self) -> Duration {
        self.last_touched.read().await.elapsed()
    }

    /// A page is listening for progress, or a Process action is running.
    fn is_active(&self) -> bool {
        self.tx.receiver_count() > 0 || self.process_lock.try_lock().is_err()
    }

    pub async fn query(&self) -> Option<String> {
        self.query.read().await.clone()
    }

    pub async fn set_query(&self, query: String) {
        *self.query.write().await = Some(query);
    }

    pub async fn current_index(&self) -> Option<Arc<dyn VectorIndex>> {
        self.index.read().await.clone()
    }

    pub async fn last_stats(&self) -> Option<ProcessStats> {
        self.last_stats.read().await.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: ProgressEvent) {
        // No subscribers is fine; the page may not have opened the stream.
        let _ = self.tx.send(event);
    }

    /// Swap in a fully built index, dropping the previous one.
    pub async fn replace_index(&self, index: Arc<dyn VectorIndex>, stats: ProcessStats) {
        let chunks = stats.chunks;
        *self.index.write().await = Some(index);
        *self.last_stats.write().await = Some(stats);
        info!(session_id = %self.id, chunks, "session index replaced");
    }

    /// Run the pipeline over `documents` and, on success, replace this session's index.
    ///
    /// The previous index stays visible until the new one is fully built.
    pub async fn process(
        &self,
        pipeline: &RagPipeline,
        documents: Vec<PdfDocument>,
    ) -> pdfchat_rag::Result<ProcessOutcome> {
        let _guard = self.process_lock.lock().await;

        let tx = self.tx.clone();
        let result = pipeline
            .process_with_progress(documents, move |stage| {
                let _ = tx.send(ProgressEvent::stage(stage));
            })
            .await;

        match &result {
            Ok(outcome) => {
                self.replace_index(Arc::clone(&outcome.index), outcome.stats.clone()).await;
            }
            Err(e) => self.publish(ProgressEvent::failed(e)),
        }
        result
    }
}

#[derive(Debug, Default, Clone)]
pub struct SessionManager {
    sessions: Arc<RwLock<HashMap<SessionId, Arc<SessionState>>>>,
}

impl SessionManager {
    pub async fn create_session(&self) -> SessionId {
        let session_id = Uuid::new_v4().to_string();
        let state = Arc::new(SessionState::new(session_id.clone()));
        self.sessions.write().await.insert(session_id.clone(), state);
        info!(session_id = %session_id, "session created");
        session_id
    }

    /// Look up a session and mark it as used.
    pub async fn get(&self, session_id: &str) -> Option<Arc<SessionState>> {
        let session = self.sessions.read().await.get(session_id).cloned()?;
        session.touch().await;
        Some(session)
    }

    pub async fn has_session(&self, session_id: &str) -> bool {
        self.sessions.read().await.contains_key(session_id)
    }

    /// End a session, dropping its index once in-flight requests release it.
    pub async fn remove_session(&self, session_id: &str) -> bool {
        let removed = self.sessions.write().await.remove(session_id).is_some();
        if removed {
            info!(session_id, "session ended");
        }
        removed
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Drop every session unused for at least `max_idle` that has no open
    /// progress stream and no Process action running. Returns how many went.
    pub async fn evict_idle(&self, max_idle: Duration) -> usize {
        let mut sessions = self.sessions.write().await;
        let mut stale = Vec::new();
        for (id, session) in sessions.iter() {
            if !session.is_active() && session.idle_for().await >= max_idle {
                stale.push(id.clone());
            }
        }
        for id in &stale {
            sessions.remove(id);
            info!(session_id = %id, "idle session evicted");
        }
        debug!(evicted = stale.len(), remaining = sessions.len(), "idle sweep finished");
        stale.len()
    }

    /// Run [`evict_idle`](Self::evict_idle) periodically until the task is aborted.
    pub fn spawn_idle_sweeper(&self, max_idle: Duration) -> JoinHandle<()> {
        let manager = self.clone();
        let period = (max_idle / 4).max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                manager.evict_idle(max_idle).await;
            }
        })
    }
}
