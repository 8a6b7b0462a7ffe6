//! Poller
//!
//! Two loops share one set of state: the feed loop refreshes the shift
//! schedule and decides which weeks each room's grid tracks, the grid loop
//! refreshes every grid and runs change detection once a room's refresh has
//! completed.

use chrono::Local;
use futures::future::join_all;
use rw_calendar::{FeedClient, ScheduleStore};
use rw_core::{Config, Room, ShiftEvent, WeekNumber};
use rw_matcher::{AvailabilityMatcher, ChangeEvent, MatchResult};
use rw_venue::{AvailabilityGrid, FetchError, RefreshError, VenueClient, WeekSource};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, PoisonError};
use std::time::Duration;
use tokio::sync::{RwLock, broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval, interval_at};
use tracing::{debug, error, info, warn};

use crate::error::Result;

/// Builds the week source for a room the first time it needs a grid
pub type SourceFactory =
    Arc<dyn Fn(Room) -> std::result::Result<Arc<dyn WeekSource>, FetchError> + Send + Sync>;

type GridMap = HashMap<Room, Arc<AvailabilityGrid>>;

const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// Handle to a running poller
pub struct PollerHandle {
    shutdown_tx: broadcast::Sender<()>,
    changes_tx: broadcast::Sender<ChangeEvent>,
    results_rx: watch::Receiver<Vec<MatchResult>>,
    handle: JoinHandle<()>,
}

impl PollerHandle {
    /// Stop both loops and wait for them to finish
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.handle.await {
            error!("Poller task failed: {}", e);
        }
    }

    /// Receive every change event detected from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.changes_tx.subscribe()
    }

    /// Latest per-shift match results
    pub fn results(&self) -> watch::Receiver<Vec<MatchResult>> {
        self.results_rx.clone()
    }
}

/// Keeps shifts and venue availability up to date
pub struct Poller {
    feed: FeedClient,
    feed_interval: Duration,
    poll_interval: Duration,
    store: Arc<RwLock<ScheduleStore>>,
    grids: Arc<std::sync::RwLock<GridMap>>,
    matcher: Arc<AvailabilityMatcher>,
    source_factory: SourceFactory,
    changes_tx: broadcast::Sender<ChangeEvent>,
    results_tx: watch::Sender<Vec<MatchResult>>,
}

impl Poller {
    /// Create a poller from configuration
    ///
    /// Fails when no feed URL can be resolved.
    pub fn new(config: &Config) -> Result<Self> {
        let url = config.feed.resolve_url()?;
        let feed = FeedClient::new(&url, config.feed.request_timeout())?;

        // One client per room: each holds its own booking session
        let venue = config.venue.clone();
        let source_factory: SourceFactory = Arc::new(move |_room| {
            let client: Arc<dyn WeekSource> = Arc::new(VenueClient::new(&venue)?);
            Ok(client)
        });

        let (changes_tx, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        let (results_tx, _) = watch::channel(Vec::new());

        Ok(Self {
            feed,
            feed_interval: config.feed.refresh_interval(),
            poll_interval: config.poll.interval(),
            store: Arc::new(RwLock::new(ScheduleStore::new())),
            grids: Arc::new(std::sync::RwLock::new(HashMap::new())),
            matcher: Arc::new(AvailabilityMatcher::new()),
            source_factory,
            changes_tx,
            results_tx,
        })
    }

    /// Replace how week sources are created for new rooms
    pub fn with_source_factory(mut self, factory: SourceFactory) -> Self {
        self.source_factory = factory;
        self
    }

    pub fn store(&self) -> Arc<RwLock<ScheduleStore>> {
        Arc::clone(&self.store)
    }

    pub fn matcher(&self) -> Arc<AvailabilityMatcher> {
        Arc::clone(&self.matcher)
    }

    /// Grid tracked for `room`, if any
    pub fn grid(&self, room: Room) -> Option<Arc<AvailabilityGrid>> {
        self.grids
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&room)
            .cloned()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.changes_tx.subscribe()
    }

    /// Match results published by the last grid refresh
    pub fn latest_matches(&self) -> Vec<MatchResult> {
        self.results_tx.borrow().clone()
    }

    /// Refresh the shift schedule and retarget the grids
    ///
    /// Grids are retargeted from whatever shifts are held, so a failed
    /// fetch still prunes ended shifts from the tracked weeks.
    pub async fn refresh_feed(&self) -> Result<()> {
        // Fetch unlocked so grid tasks can keep reading the store
        let fetched = self.feed.fetch().await;

        let (outcome, room_weeks) = {
            let mut store = self.store.write().await;
            let outcome = store.ingest_fetched(fetched).map(|events| events.len());
            store.prune_now();
            (outcome, store.list_room_weeks())
        };

        self.track_rooms(room_weeks);
        self.matcher.forget_before(Local::now().date_naive());

        let count = outcome?;
        debug!("Schedule holds {} upcoming shift(s)", count);
        Ok(())
    }

    fn track_rooms(&self, room_weeks: BTreeMap<Room, BTreeSet<WeekNumber>>) {
        let mut grids = self.grids.write().unwrap_or_else(PoisonError::into_inner);

        for (room, grid) in grids.iter() {
            if !room_weeks.contains_key(room) {
                debug!(room = %room, "No upcoming shifts, clearing tracked weeks");
                grid.track_weeks(BTreeSet::new());
            }
        }

        for (room, weeks) in room_weeks {
            if !room.is_known() {
                debug!("Ignoring shifts in {} week(s) with no known room", weeks.len());
                continue;
            }

            if let Some(grid) = grids.get(&room) {
                grid.track_weeks(weeks);
                continue;
            }

            match (self.source_factory)(room) {
                Ok(source) => {
                    info!(room = %room, "Tracking {} week(s)", weeks.len());
                    grids.insert(room, Arc::new(AvailabilityGrid::new(room, weeks, source)));
                }
                Err(e) => error!(room = %room, "Could not create venue client: {}", e),
            }
        }
    }

    /// Refresh every grid and detect status changes
    ///
    /// Rooms refresh in parallel. Detected changes are broadcast to
    /// subscribers and returned; match results are published afterwards.
    pub async fn refresh_grids(&self) -> Vec<ChangeEvent> {
        let grids: GridMap = self
            .grids
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let tasks: Vec<_> = grids
            .values()
            .map(|grid| {
                tokio::spawn(refresh_room(
                    Arc::clone(grid),
                    grids.clone(),
                    Arc::clone(&self.store),
                    Arc::clone(&self.matcher),
                ))
            })
            .collect();

        let mut changes = Vec::new();
        for result in join_all(tasks).await {
            match result {
                Ok(room_changes) => changes.extend(room_changes),
                Err(e) => error!("Grid refresh task failed: {}", e),
            }
        }

        for change in &changes {
            // No subscribers is fine
            let _ = self.changes_tx.send(change.clone());
        }

        self.publish_matches(&grids).await;
        changes
    }

    async fn publish_matches(&self, grids: &GridMap) {
        let results: Vec<MatchResult> = {
            let store = self.store.read().await;
            store
                .sort_by_end()
                .into_iter()
                .map(|event| self.matcher.match_shift(event, grids))
                .collect()
        };
        self.results_tx.send_replace(results);
    }

    /// One feed refresh followed by one grid refresh
    ///
    /// A failed feed fetch is tolerated while earlier shifts are cached.
    pub async fn run_once(&self) -> Result<Vec<MatchResult>> {
        if let Err(e) = self.refresh_feed().await {
            if self.store.read().await.is_empty() {
                return Err(e);
            }
            warn!("Using cached shifts: {}", e);
        }

        self.refresh_grids().await;
        Ok(self.latest_matches())
    }

    /// Start the feed and grid loops
    pub fn start(self) -> PollerHandle {
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel::<()>(1);
        let feed_rx = shutdown_rx.resubscribe();
        let grid_rx = shutdown_rx.resubscribe();

        let changes_tx = self.changes_tx.clone();
        let results_rx = self.results_tx.subscribe();
        let poller = Arc::new(self);

        let handle = tokio::spawn(async move {
            info!(
                feed_secs = poller.feed_interval.as_secs(),
                poll_secs = poller.poll_interval.as_secs(),
                "Poller started"
            );

            // Grids are created by the feed, so load it before polling them
            tokio::select! {
                result = poller.refresh_feed() => {
                    if let Err(e) = result {
                        error!("Initial feed refresh failed: {}", e);
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Poller stopped");
                    return;
                }
            }

            let feed_loop = tokio::spawn(run_feed_loop(Arc::clone(&poller), feed_rx));
            let grid_loop = tokio::spawn(run_grid_loop(Arc::clone(&poller), grid_rx));
            let (feed_result, grid_result) = tokio::join!(feed_loop, grid_loop);
            if let Err(e) = feed_result {
                error!("Feed loop failed: {}", e);
            }
            if let Err(e) = grid_result {
                error!("Grid loop failed: {}", e);
            }

            info!("Poller stopped");
        });

        PollerHandle {
            shutdown_tx,
            changes_tx,
            results_rx,
            handle,
        }
    }
}

/// Refresh one room's grid, then compare its shifts' slots with the last poll
async fn refresh_room(
    grid: Arc<AvailabilityGrid>,
    grids: GridMap,
    store: Arc<RwLock<ScheduleStore>>,
    matcher: Arc<AvailabilityMatcher>,
) -> Vec<ChangeEvent> {
    let room = grid.room();

    match grid.refresh().await {
        Ok(()) => {}
        Err(RefreshError::Busy) => {
            debug!(room = %room, "Refresh already running, skipping");
            return Vec::new();
        }
        Err(e) => warn!(room = %room, "Grid refresh incomplete: {}", e),
    }

    let events: Vec<ShiftEvent> = store.read().await.events_for_room(room).cloned().collect();
    events
        .iter()
        .flat_map(|event| matcher.detect_changes(event, &grids))
        .collect()
}

async fn run_feed_loop(poller: Arc<Poller>, mut shutdown_rx: broadcast::Receiver<()>) {
    let period = poller.feed_interval;
    // The first refresh already happened in `start`
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = poller.refresh_feed().await {
                    warn!("Feed refresh failed: {}", e);
                }
            }
            _ = shutdown_rx.recv() => {
                debug!("Feed loop received shutdown");
                break;
            }
        }
    }
}

async fn run_grid_loop(poller: Arc<Poller>, mut shutdown_rx: broadcast::Receiver<()>) {
    let mut ticker = interval(poller.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let changes = poller.refresh_grids().await;
                if !changes.is_empty() {
                    info!("Detected {} slot change(s)", changes.len());
                }
            }
            _ = shutdown_rx.recv() => {
                debug!("Grid loop received shutdown");
                break;
            }
        }
    }
}
