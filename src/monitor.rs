use crate::{
    logs::{now_nanos, Direction, LogQuery, LogSource, LogWindow},
    presence::{
        self, PresenceSet, DISCONNECTED_PLAYER, FULLY_CONNECTED, SERVER_EXITED, SERVER_STARTED,
    },
    render::StatusView,
};
use anyhow::Result;
use std::{future::Future, sync::Arc, time::Duration};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

/// Upper bound on presence lines replayed per poll.
pub const PRESENCE_LIMIT: u32 = 500;

/// State observed in one poll.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub online: bool,
    pub players: PresenceSet,
}

/// Destination for rendered status, e.g. a Discord channel.
pub trait StatusSink: Send + Sync {
    fn publish(&self, view: &StatusView) -> impl Future<Output = Result<()>> + Send;
}

pub struct Monitor<L> {
    logs: L,
    lookback: Duration,
}

impl<L: LogSource> Monitor<L> {
    pub fn new(logs: L, lookback: Duration) -> Self {
        Self { logs, lookback }
    }

    pub async fn fetch_server_online(&self, window: LogWindow) -> Result<bool> {
        let query = LogQuery::new([SERVER_STARTED, SERVER_EXITED], window)
            .limit(1)
            .direction(Direction::Backward);
        let lines = self.logs.query_range(&query).await?;
        Ok(presence::server_online(&lines))
    }

    pub async fn fetch_last_server_start(&self, window: LogWindow) -> Result<Option<u64>> {
        let query = LogQuery::new([SERVER_STARTED], window)
            .limit(1)
            .direction(Direction::Backward);
        let lines = self.logs.query_range(&query).await?;
        Ok(presence::last_server_start(&lines))
    }

    pub async fn fetch_connected_players(&self, window: LogWindow) -> Result<PresenceSet> {
        let query = LogQuery::new([FULLY_CONNECTED, DISCONNECTED_PLAYER], window)
            .limit(PRESENCE_LIMIT)
            .direction(Direction::Forward);
        let lines = self.logs.query_range(&query).await?;
        if lines.len() >= PRESENCE_LIMIT as usize {
            warn!(
                "presence query hit its {PRESENCE_LIMIT} line limit, events after {} are missing",
                lines.last().map_or(window.start, |l| l.timestamp)
            );
        }
        Ok(presence::presence_from_lines(&lines))
    }

    /// Players connected since the most recent server start within the lookback.
    async fn players_since_last_start(&self, lookback: LogWindow) -> Result<PresenceSet> {
        let Some(started) = self.fetch_last_server_start(lookback).await? else {
            info!("no server start within lookback");
            return Ok(PresenceSet::default());
        };
        self.fetch_connected_players(LogWindow::new(started, lookback.end))
            .await
    }

    /// Observes the server as of `now`. Query failures read as offline / nobody connected.
    pub async fn snapshot_at(&self, now: u64) -> Snapshot {
        let window = LogWindow::trailing(now, self.lookback);
        let online = self.fetch_server_online(window).await.unwrap_or_else(|e| {
            warn!("server status query failed: {e:#}");
            false
        });
        if !online {
            return Snapshot::default();
        }
        let players = self
            .players_since_last_start(window)
            .await
            .unwrap_or_else(|e| {
                warn!("player query failed: {e:#}");
                PresenceSet::default()
            });
        Snapshot { online, players }
    }

    pub async fn snapshot(&self) -> Snapshot {
        self.snapshot_at(now_nanos()).await
    }
}

/// One fetch, reduce and render pass. Publishing is best-effort.
pub async fn cycle<L: LogSource, S: StatusSink>(monitor: &Monitor<L>, sink: &S, now: u64) -> Snapshot {
    let snapshot = monitor.snapshot_at(now).await;
    info!(online = snapshot.online, players = snapshot.players.len(), "polled server");
    let view = StatusView::from_snapshot(&snapshot);
    if let Err(e) = sink.publish(&view).await {
        warn!("failed to publish status: {e:#}");
    }
    snapshot
}

/// Polls forever. A slow cycle delays the next tick instead of overlapping it.
pub async fn run<L: LogSource, S: StatusSink>(monitor: Arc<Monitor<L>>, sink: S, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        cycle(&monitor, &sink, now_nanos()).await;
    }
}
