use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use livefeed_protocol::{FeedEvent, NotificationCount};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::broker::BrokerHandle;
use crate::broker::hub::Port;
use crate::config::FeedConfig;
use crate::errors::FeedError;
use crate::fetch::{Fetcher, require_ok};
use crate::poll::run_poll_loop;
use crate::seq::{SequenceGuard, fragment_sequence_number};
use crate::surface::SurfaceState;

/// The unread-count indicator in the navigation bar.
pub trait BadgeSink: Send + Sync + 'static {
    /// Whether the indicator exists on this page. Coordinators never start
    /// for absent indicators.
    fn present(&self) -> bool;

    fn set_count(&self, count: u64);

    fn set_visible(&self, visible: bool);
}

/// The detailed notification table (only present on the notifications
/// page). Receives the fetched HTML fragment verbatim; re-parsing it is
/// the DOM layer's concern.
pub trait TableSink: Send + Sync + 'static {
    fn present(&self) -> bool;

    fn replace(&self, fragment: &str);
}

/// Status change applied to one notification row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationStatus {
    Read,
    Unread,
    Pinned,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Read => "read",
            NotificationStatus::Unread => "unread",
            NotificationStatus::Pinned => "pinned",
        }
    }
}

/// Keeps the notification badge and table synchronized with server state.
///
/// Push-first: attaches to the session broker and follows its events;
/// falls back to the polling loop on `no-event-source`, transport error,
/// or a dead broker. Table content is only ever replaced through the
/// sequence guard, so a slow stale response can never clobber a newer one.
pub struct NotificationCoordinator<F: Fetcher> {
    config: FeedConfig,
    fetcher: Arc<F>,
    badge: Arc<dyn BadgeSink>,
    table: Arc<dyn TableSink>,
    guard: SequenceGuard,
    last_count: AtomicU64,
    state: Mutex<SurfaceState>,
    cancel: CancellationToken,
}

impl<F: Fetcher> NotificationCoordinator<F> {
    pub fn new(
        config: FeedConfig,
        fetcher: Arc<F>,
        badge: Arc<dyn BadgeSink>,
        table: Arc<dyn TableSink>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            fetcher,
            badge,
            table,
            guard: SequenceGuard::new(),
            last_count: AtomicU64::new(0),
            state: Mutex::new(SurfaceState::Idle),
            cancel: CancellationToken::new(),
        })
    }

    pub fn state(&self) -> SurfaceState {
        *self.state.lock().unwrap()
    }

    /// Stop whichever delivery path is active.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Drive the surface until shutdown or teardown.
    ///
    /// Returns immediately (state stays `Idle`) when the badge indicator
    /// is absent from this page.
    pub async fn run(self: Arc<Self>, broker: BrokerHandle) {
        if !self.badge.present() {
            debug!(event = "feed.surface.indicator_absent", surface = "notification");
            return;
        }
        self.set_state(SurfaceState::Attaching);

        match broker.attach().await {
            Ok(mut port) => {
                let torn_down = match port.start(&self.config.push_url) {
                    Ok(()) => self.run_push(&mut port).await,
                    Err(e) => {
                        warn!(
                            event = "feed.surface.start_failed",
                            surface = "notification",
                            error = %e,
                        );
                        false
                    }
                };
                port.close();
                if torn_down {
                    self.set_state(SurfaceState::TornDown);
                    return;
                }
            }
            Err(e) => {
                warn!(
                    event = "feed.surface.attach_failed",
                    surface = "notification",
                    error = %e,
                );
            }
        }

        info!(event = "feed.surface.fallback_to_polling", surface = "notification");
        self.set_state(SurfaceState::PollingActive);
        self.run_polling().await;
        self.set_state(SurfaceState::TornDown);
    }

    /// Follow push events. Returns true when the surface is finished
    /// (logout, close, shutdown), false to fall back to polling.
    async fn run_push(&self, port: &mut Port) -> bool {
        let mut push_active = false;
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return true,
                event = port.recv() => match event {
                    Some(FeedEvent::NoEventSource) => return false,
                    Some(FeedEvent::Error { data }) => {
                        warn!(
                            event = "feed.surface.push_error",
                            surface = "notification",
                            error = %data,
                        );
                        return false;
                    }
                    Some(FeedEvent::Logout) | Some(FeedEvent::Close) | None => return true,
                    Some(event) => {
                        if !push_active {
                            push_active = true;
                            self.set_state(SurfaceState::PushActive);
                        }
                        if let FeedEvent::NotificationCount { data } = event {
                            self.apply_count(data.new).await;
                        }
                    }
                }
            }
        }
    }

    async fn run_polling(&self) {
        let this = self;
        let initial = self.last_count.load(Ordering::SeqCst);
        run_poll_loop(
            self.config.poll,
            self.cancel.clone(),
            initial,
            move || {
                let this = this;
                async move {
                    let url = &this.config.count_url;
                    let response = require_ok(this.fetcher.get(url).await?, url)?;
                    Ok(response.json::<NotificationCount>()?.new)
                }
            },
            move |count| {
                let this = this;
                async move { this.apply_count(count).await }
            },
        )
        .await;
    }

    /// Apply a fresh count to the badge and, when the table is on this
    /// page, re-fetch its content through the sequence guard.
    async fn apply_count(&self, count: u64) {
        debug!(event = "feed.surface.count_updated", surface = "notification", count = count);
        self.last_count.store(count, Ordering::SeqCst);
        self.badge.set_count(count);
        self.badge.set_visible(count > 0);

        if self.table.present()
            && let Err(e) = self.refresh_table().await
        {
            warn!(
                event = "feed.surface.table_refresh_failed",
                error = %e,
                code = e.error_code(),
            );
        }
    }

    /// Re-fetch the notification table fragment. Returns whether the
    /// response was current and applied; a stale response is dropped
    /// silently (not an error).
    pub async fn refresh_table(&self) -> Result<bool, FeedError> {
        let token = self.guard.next();
        let url = format!("{}?sequence-number={}", self.config.table_url, token);
        let response = require_ok(self.fetcher.get(&url).await?, &url)?;
        Ok(self.apply_fragment(token, response.text()))
    }

    /// Change one notification's status (mark read/unread/pin). The server
    /// responds with the refreshed table fragment, applied through the
    /// same guard as push-triggered refreshes so the two can never race
    /// the table into staleness.
    pub async fn update_status(
        &self,
        notification_id: u64,
        status: NotificationStatus,
    ) -> Result<bool, FeedError> {
        let token = self.guard.next();
        let body = format!(
            "notification_id={}&status={}&sequence-number={}",
            notification_id,
            status.as_str(),
            token,
        );
        let url = &self.config.table_url;
        let response = require_ok(self.fetcher.post(url, &body).await?, url)?;
        Ok(self.apply_fragment(token, response.text()))
    }

    fn apply_fragment(&self, token: u64, fragment: &str) -> bool {
        // The fragment echoes the token; if it doesn't, fall back to the
        // token we sent.
        let echoed = fragment_sequence_number(fragment).unwrap_or(token);
        if self.guard.is_current(echoed) {
            self.table.replace(fragment);
            true
        } else {
            debug!(
                event = "feed.surface.stale_fragment_dropped",
                token = echoed,
            );
            false
        }
    }

    fn set_state(&self, next: SurfaceState) {
        let mut state = self.state.lock().unwrap();
        debug!(
            event = "feed.surface.state_changed",
            surface = "notification",
            from = state.as_str(),
            to = next.as_str(),
        );
        *state = next;
    }
}
