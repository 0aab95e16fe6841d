// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/safefall-rs

//! Live views kept fresh by change subscriptions

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::stream::{self, select_all, StreamExt};
use parking_lot::RwLock;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{ChangeSignal, Subscription};
use crate::error::{Result, SafeFallError};

/// Current contents of a live view
#[derive(Debug, Clone)]
pub struct ViewState<T> {
    pub data: T,
    pub loading: bool,
    /// Last fetch or subscription error; `data` is stale while set
    pub last_error: Option<String>,
    pub refreshed_at: Option<DateTime<Utc>>,
}

/// In-memory view re-fetched in full whenever a subscription fires
///
/// Dropping the view aborts its task, which drops every subscription it owns.
pub struct LiveView<T> {
    name: String,
    state: Arc<RwLock<ViewState<T>>>,
    generation: watch::Receiver<u64>,
    refresh_tx: mpsc::UnboundedSender<()>,
    task: Option<JoinHandle<()>>,
}

impl<T> LiveView<T>
where
    T: Clone + Default + Send + Sync + 'static,
{
    pub fn spawn<F>(name: impl Into<String>, subscriptions: Vec<Subscription>, fetch: F) -> Self
    where
        F: Fn() -> Result<T> + Send + Sync + 'static,
    {
        let name = name.into();
        let state = Arc::new(RwLock::new(ViewState {
            data: T::default(),
            loading: true,
            last_error: None,
            refreshed_at: None,
        }));
        let (generation_tx, generation) = watch::channel(0u64);
        let (refresh_tx, refresh_rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(run_view(
            name.clone(),
            subscriptions,
            fetch,
            state.clone(),
            generation_tx,
            refresh_rx,
        ));

        Self {
            name,
            state,
            generation,
            refresh_tx,
            task: Some(task),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn snapshot(&self) -> ViewState<T> {
        self.state.read().clone()
    }

    pub fn data(&self) -> T {
        self.state.read().data.clone()
    }

    /// Number of completed fetch attempts
    pub fn generation(&self) -> u64 {
        *self.generation.borrow()
    }

    /// Request a full re-fetch
    pub fn refresh(&self) {
        let _ = self.refresh_tx.send(());
    }

    /// Wait for the next fetch attempt to complete
    pub async fn changed(&mut self) -> Result<u64> {
        self.generation
            .changed()
            .await
            .map_err(|_| SafeFallError::Subscription(format!("view {} stopped", self.name)))?;
        Ok(*self.generation.borrow_and_update())
    }

    /// Wait until loaded data satisfies `predicate`
    pub async fn wait_until<P>(&mut self, predicate: P) -> Result<T>
    where
        P: Fn(&T) -> bool,
    {
        loop {
            self.generation.borrow_and_update();
            {
                let state = self.state.read();
                if !state.loading && predicate(&state.data) {
                    return Ok(state.data.clone());
                }
            }
            self.changed().await?;
        }
    }

    /// Tear the view down and wait for its task to finish
    pub async fn close(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
    }
}

impl<T> Drop for LiveView<T> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn run_view<T, F>(
    name: String,
    subscriptions: Vec<Subscription>,
    fetch: F,
    state: Arc<RwLock<ViewState<T>>>,
    generation: watch::Sender<u64>,
    mut refresh_rx: mpsc::UnboundedReceiver<()>,
) where
    F: Fn() -> Result<T>,
{
    // A failed subscription yields its error once, then leaves the merged stream
    let mut signals = select_all(subscriptions.into_iter().map(|sub| {
        Box::pin(stream::unfold(Some(sub), |sub| async move {
            let mut sub = sub?;
            match sub.changed().await {
                Ok(signal) => Some((Ok(signal), Some(sub))),
                Err(e) => Some((Err(e), None)),
            }
        }))
    }));

    reload(&name, &fetch, &state, &generation);

    loop {
        tokio::select! {
            Some(signal) = signals.next() => match signal {
                Ok(ChangeSignal::Change(event)) => {
                    debug!("View {} invalidated by {} {:?}", name, event.table, event.kind);
                    reload(&name, &fetch, &state, &generation);
                }
                Ok(ChangeSignal::Resync) => reload(&name, &fetch, &state, &generation),
                Err(e) => {
                    warn!("View {} lost a subscription: {}", name, e);
                    state.write().last_error = Some(e.to_string());
                    generation.send_modify(|g| *g += 1);
                }
            },
            Some(()) = refresh_rx.recv() => reload(&name, &fetch, &state, &generation),
            else => break,
        }
    }
}

fn reload<T, F>(
    name: &str,
    fetch: &F,
    state: &RwLock<ViewState<T>>,
    generation: &watch::Sender<u64>,
) where
    F: Fn() -> Result<T>,
{
    let result = fetch();
    {
        let mut state = state.write();
        state.loading = false;
        match result {
            Ok(data) => {
                state.data = data;
                state.last_error = None;
                state.refreshed_at = Some(Utc::now());
            }
            Err(e) => {
                warn!("Refreshing view {} failed: {}", name, e);
                state.last_error = Some(e.to_string());
            }
        }
    }
    generation.send_modify(|g| *g += 1);
}
