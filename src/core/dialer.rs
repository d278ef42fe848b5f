//! The dialer value (C5 + top-level orchestrator): owns the ARI adapter,
//! call state store, number queue, and configuration as one explicit
//! value, the way [`crate::core`] replaces the ambient global state an
//! earlier design would have scattered across module-level statics.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::DialerConfig;
use crate::protocols::ari::{AriClient, AriEventStream};
use crate::services::correlator::Correlator;
use crate::services::recording::RecordingManager;
use crate::services::state::{Call, CallStore};
use crate::services::summary::SummaryStore;
use crate::Result;

pub struct Dialer<A: AriClient> {
    config: RwLock<DialerConfig>,
    ari: Arc<A>,
    store: Arc<CallStore>,
    correlator: Arc<Correlator<A>>,
    recordings: Arc<RecordingManager<A>>,
    summaries: Arc<SummaryStore>,

    numbers_queue: Mutex<VecDeque<String>>,
    in_flight: Mutex<HashSet<Uuid>>,
    completed_rx: Mutex<Option<mpsc::UnboundedReceiver<Uuid>>>,

    started: AtomicBool,
    watchdogs: dashmap::DashMap<Uuid, JoinHandle<()>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<A: AriClient + 'static> Dialer<A> {
    pub fn new(config: DialerConfig, ari: Arc<A>) -> Self {
        let store = Arc::new(CallStore::new());
        let recordings = Arc::new(RecordingManager::new(ari.clone(), store.clone(), config.clone()));
        let summaries = Arc::new(SummaryStore::new(config.mysql.clone()));
        let (completed_tx, completed_rx) = mpsc::unbounded_channel();

        let correlator = Arc::new(Correlator::new(
            store.clone(),
            ari.clone(),
            config.clone(),
            recordings.clone(),
            summaries.clone(),
            completed_tx,
        ));

        Self {
            config: RwLock::new(config),
            ari,
            store,
            correlator,
            recordings,
            summaries,
            numbers_queue: Mutex::new(VecDeque::new()),
            in_flight: Mutex::new(HashSet::new()),
            completed_rx: Mutex::new(Some(completed_rx)),
            started: AtomicBool::new(false),
            watchdogs: dashmap::DashMap::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn has_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub async fn is_idle(&self) -> bool {
        self.numbers_queue.lock().await.is_empty() && self.in_flight.lock().await.is_empty()
    }

    pub async fn reload_config(&self, config: DialerConfig) {
        *self.config.write().await = config;
    }

    /// First-time startup: connects the ARI event stream, wires it to the
    /// correlator, starts the call-completion drain loop, and queues the
    /// first run's numbers.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let ari_config = self.config.read().await.ari.clone();
        let mut event_rx = AriEventStream::connect(&ari_config).await?;

        let correlator = self.correlator.clone();
        let event_task = tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                correlator.handle_event(event).await;
            }
            warn!("ARI event stream ended");
        });
        self.tasks.lock().await.push(event_task);

        if let Some(mut completed_rx) = self.completed_rx.lock().await.take() {
            let this = self.clone();
            let completion_task = tokio::spawn(async move {
                while let Some(call_id) = completed_rx.recv().await {
                    this.mark_call_completed(call_id).await;
                }
            });
            self.tasks.lock().await.push(completion_task);
        }

        self.queue_numbers().await?;
        self.drive_queue().await;

        info!("dialer started");
        Ok(())
    }

    async fn queue_numbers(&self) -> Result<()> {
        let numbers = self.config.read().await.load_numbers()?;
        let mut queue = self.numbers_queue.lock().await;
        queue.clear();
        queue.extend(numbers);
        Ok(())
    }

    /// Pops from the number queue while the concurrency limit allows,
    /// originating each one.
    pub async fn drive_queue(self: &Arc<Self>) {
        loop {
            let max_cc = self.config.read().await.max_cc;
            let number = {
                let in_flight = self.in_flight.lock().await;
                if in_flight.len() >= max_cc {
                    None
                } else {
                    self.numbers_queue.lock().await.pop_front()
                }
            };

            let Some(number) = number else { break };
            self.originate(number).await;
        }

        if self.numbers_queue.lock().await.is_empty() && self.in_flight.lock().await.is_empty() {
            info!("outbound number queue depleted");
        }
    }

    async fn originate(self: &Arc<Self>, number: String) {
        let call_id = Uuid::new_v4();
        self.in_flight.lock().await.insert(call_id);

        let call = Call::new(call_id, number.clone());
        self.store.insert(call);

        let call_timeout = self.config.read().await.call_timeout;
        let watchdog_delay = Duration::from_millis(
            ((call_timeout as u64) * 1000 + 15_000).max(45_000),
        );

        let this = self.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(watchdog_delay).await;
            if this.store.get(call_id).is_some() {
                warn!(call_id = %call_id, "cleanup watchdog fired");
                this.correlator.cleanup_call(call_id).await;
            }
        });
        self.watchdogs.insert(call_id, handle);

        let endpoint_config = self.config.read().await;
        let endpoint = format!("PJSIP/{number}@{}", endpoint_config.ari.trunk);
        let caller_id = endpoint_config.caller_id.clone();
        let timeout = endpoint_config.call_timeout;
        let app = endpoint_config.ari.stasis_app.clone();
        drop(endpoint_config);

        match self
            .ari
            .originate(&endpoint, &app, &["dialer".to_string(), call_id.to_string()], caller_id.as_deref(), timeout)
            .await
        {
            Ok(_) => {}
            Err(err) => {
                warn!(error = %err, number = %number, "origination failed");
                if let Some(handle) = self.watchdogs.remove(&call_id) {
                    handle.1.abort();
                }
                self.store.remove(call_id);
                self.mark_call_completed(call_id).await;
            }
        }
    }

    pub async fn mark_call_completed(self: &Arc<Self>, call_id: Uuid) {
        self.in_flight.lock().await.remove(&call_id);
        if let Some((_, handle)) = self.watchdogs.remove(&call_id) {
            handle.abort();
        }
        Box::pin(self.drive_queue()).await;
    }

    /// Invoked by the control surface for a non-first `/start` hit while
    /// idle: reloads the number list and begins a new run.
    pub async fn restart_run(self: &Arc<Self>) -> Result<()> {
        self.queue_numbers().await?;
        self.drive_queue().await;
        Ok(())
    }

    pub fn active_call_count(&self) -> usize {
        self.store.len()
    }

    pub async fn reset_persistence(&self) {
        self.summaries.reset().await;
    }
}

impl<A: AriClient> Drop for Dialer<A> {
    fn drop(&mut self) {
        if let Ok(mut tasks) = self.tasks.try_lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
        for entry in self.watchdogs.iter() {
            entry.value().abort();
        }
    }
}
