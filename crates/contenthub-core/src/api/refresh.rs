//! Single-flight access-token refresh.
//!
//! `TokenManager` owns the in-memory session, the `TokenStore` behind it, and
//! the Idle/Refreshing state. The first caller to hit a 401 drives the
//! refresh; every caller arriving while it is in flight parks a oneshot
//! waiter and is completed with the same outcome once the cycle settles.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;

use tokio::sync::{broadcast, oneshot};
use tracing::{debug, info, warn};

use crate::auth::{SessionData, SessionEvent, TokenStore};

use super::ApiError;

/// Capacity of the session event channel. Slow subscribers skip old events.
const EVENT_CHANNEL_CAPACITY: usize = 16;

/// What every participant of a refresh cycle receives: the new access token
/// or the reason the session ended.
type RefreshOutcome = Result<String, String>;

enum RefreshState {
    Idle,
    Refreshing {
        waiters: Vec<oneshot::Sender<RefreshOutcome>>,
    },
}

/// What a caller does after inspecting the state under the lock.
enum Role {
    /// The token was rotated after the caller's request went out.
    UseCurrent(String),
    Wait(oneshot::Receiver<RefreshOutcome>),
    Drive,
}

pub struct TokenManager {
    store: Arc<dyn TokenStore>,
    session: RwLock<Option<SessionData>>,
    state: Mutex<RefreshState>,
    events: broadcast::Sender<SessionEvent>,
    refresh_timeout: Duration,
}

impl TokenManager {
    /// Create a manager and load any persisted session from the store.
    pub fn new(store: Arc<dyn TokenStore>, refresh_timeout: Duration) -> Self {
        let session = match store.load() {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "Failed to load stored session, starting signed out");
                None
            }
        };
        debug!(has_session = session.is_some(), "Token manager initialized");
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            store,
            session: RwLock::new(session),
            state: Mutex::new(RefreshState::Idle),
            events,
            refresh_timeout,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn session(&self) -> Option<SessionData> {
        match self.session.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn access_token(&self) -> Option<String> {
        self.session().map(|s| s.access_token)
    }

    pub fn is_refreshing(&self) -> bool {
        matches!(*self.lock_state(), RefreshState::Refreshing { .. })
    }

    /// Persist a freshly issued session (login) and announce it.
    pub fn establish(&self, data: SessionData) -> Result<(), ApiError> {
        self.persist(data)?;
        self.emit(SessionEvent::LoggedIn);
        Ok(())
    }

    /// Drop the session locally and announce why.
    pub fn end(&self, event: SessionEvent) {
        self.set_session(None);
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Failed to clear stored session");
        }
        self.emit(event);
    }

    /// Obtain a usable access token after a request sent with `stale` was
    /// rejected with 401.
    ///
    /// `refresh` performs the network exchange for a refresh token and is
    /// only invoked by the caller that drives the cycle. It is never called
    /// when no refresh token is stored.
    pub async fn refresh_after_unauthorized<F, Fut>(
        &self,
        stale: Option<&str>,
        refresh: F,
    ) -> Result<String, ApiError>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<SessionData, ApiError>>,
    {
        let mut refresh = Some(refresh);
        loop {
            let role = {
                let mut state = self.lock_state();
                match &mut *state {
                    RefreshState::Refreshing { waiters } => {
                        let (tx, rx) = oneshot::channel();
                        waiters.push(tx);
                        debug!(queued = waiters.len(), "Refresh in flight, queuing request");
                        Role::Wait(rx)
                    }
                    RefreshState::Idle => match self.access_token() {
                        Some(current) if stale != Some(current.as_str()) => {
                            Role::UseCurrent(current)
                        }
                        _ => {
                            *state = RefreshState::Refreshing {
                                waiters: Vec::new(),
                            };
                            Role::Drive
                        }
                    },
                }
            };

            match role {
                Role::UseCurrent(token) => {
                    debug!("Access token already rotated, retrying with current token");
                    return Ok(token);
                }
                Role::Wait(rx) => match rx.await {
                    Ok(outcome) => {
                        return outcome.map_err(|reason| ApiError::SessionEnded { reason })
                    }
                    // The driving task was dropped before finishing; start over.
                    Err(_) => continue,
                },
                Role::Drive => {
                    let Some(refresh) = refresh.take() else {
                        return Err(ApiError::SessionEnded {
                            reason: "refresh cycle interrupted".to_string(),
                        });
                    };
                    return self.drive_cycle(refresh).await;
                }
            }
        }
    }

    async fn drive_cycle<F, Fut>(&self, refresh: F) -> Result<String, ApiError>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<SessionData, ApiError>>,
    {
        let mut guard = CycleGuard {
            manager: self,
            settled: false,
        };

        let previous = self.session();
        let outcome: RefreshOutcome = match previous.as_ref().filter(|s| s.can_refresh()) {
            None => Err("no refresh token available".to_string()),
            Some(session) => {
                info!("Access token rejected, refreshing session");
                match tokio::time::timeout(
                    self.refresh_timeout,
                    refresh(session.refresh_token.clone()),
                )
                .await
                {
                    Ok(Ok(data)) => {
                        let token = data.access_token.clone();
                        match self.persist(data) {
                            Ok(()) => Ok(token),
                            Err(e) => Err(format!("failed to store refreshed tokens: {}", e)),
                        }
                    }
                    Ok(Err(e)) => Err(format!("token refresh failed: {}", e)),
                    Err(_) => Err(format!(
                        "token refresh timed out after {:?}",
                        self.refresh_timeout
                    )),
                }
            }
        };

        match &outcome {
            Ok(_) => {
                info!("Session refreshed");
                self.emit(SessionEvent::Refreshed);
            }
            Err(reason) => {
                warn!(%reason, "Session ended");
                self.end(SessionEvent::Ended {
                    reason: reason.clone(),
                });
            }
        }

        // The session is already updated (or cleared) before going Idle, so a
        // late 401 carrying the old token sees the rotation instead of
        // starting another cycle.
        let waiters = guard.settle();
        debug!(waiters = waiters.len(), "Completing queued requests");
        for waiter in waiters {
            let _ = waiter.send(outcome.clone());
        }

        outcome.map_err(|reason| ApiError::SessionEnded { reason })
    }

    fn persist(&self, data: SessionData) -> Result<(), ApiError> {
        self.store
            .save(&data)
            .map_err(|e| ApiError::Storage(e.to_string()))?;
        self.set_session(Some(data));
        Ok(())
    }

    fn set_session(&self, data: Option<SessionData>) {
        match self.session.write() {
            Ok(mut guard) => *guard = data,
            Err(poisoned) => *poisoned.into_inner() = data,
        }
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn lock_state(&self) -> MutexGuard<'_, RefreshState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Returns the state to Idle even if the driving future is dropped mid-cycle.
/// Waiters of an abandoned cycle see their sender dropped and re-enter.
struct CycleGuard<'a> {
    manager: &'a TokenManager,
    settled: bool,
}

impl CycleGuard<'_> {
    fn settle(&mut self) -> Vec<oneshot::Sender<RefreshOutcome>> {
        self.settled = true;
        let mut state = self.manager.lock_state();
        match std::mem::replace(&mut *state, RefreshState::Idle) {
            RefreshState::Refreshing { waiters } => waiters,
            RefreshState::Idle => Vec::new(),
        }
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            warn!("Refresh cycle abandoned before completion");
            let mut state = self.manager.lock_state();
            *state = RefreshState::Idle;
        }
    }
}
