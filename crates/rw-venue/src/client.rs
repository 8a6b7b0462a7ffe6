//! Venue booking site client

use async_trait::async_trait;
use reqwest::Client;
use rw_core::{Room, VenueConfig};
use tracing::{debug, error};

use crate::error::{FetchError, Result};

/// Raw HTML of one weekly booking page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawWeekPage {
    pub room: Room,
    /// Weeks from the current week (0 = this week)
    pub week_offset: i64,
    pub html: String,
}

/// Source of weekly booking pages
///
/// `open_session` is called once per refresh before any `fetch_week`.
#[async_trait]
pub trait WeekSource: Send + Sync {
    async fn open_session(&self, room: Room) -> Result<()>;

    async fn fetch_week(&self, room: Room, week_offset: i64) -> Result<RawWeekPage>;
}

/// HTTP client for the venue's reservation pages
///
/// Holds its own cookie jar: the slot page is only served to a session that
/// has visited the first booking step.
pub struct VenueClient {
    client: Client,
    base_url: String,
    group_size: u32,
}

impl VenueClient {
    /// Create a new venue client
    pub fn new(config: &VenueConfig) -> Result<Self> {
        let client = Client::builder()
            .cookie_store(true)
            .timeout(config.request_timeout())
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            group_size: config.group_size,
        })
    }

    fn step_url(&self, room: Room, step: u8) -> Result<String> {
        let game = room.game_slug().ok_or(FetchError::UnknownRoom(room))?;
        Ok(format!(
            "{}/reservation/index/game/{}/step/{}",
            self.base_url, game, step
        ))
    }
}

#[async_trait]
impl WeekSource for VenueClient {
    async fn open_session(&self, room: Room) -> Result<()> {
        let url = self.step_url(room, 1)?;
        debug!(room = %room, "Opening booking session: {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        if !response.status().is_success() {
            error!(room = %room, "Booking session request failed: {}", response.status());
            return Err(FetchError::BadStatus(response.status().as_u16()));
        }

        Ok(())
    }

    async fn fetch_week(&self, room: Room, week_offset: i64) -> Result<RawWeekPage> {
        let game = room.game_slug().ok_or(FetchError::UnknownRoom(room))?;
        let url = format!(
            "{}/group/{}/week/{}",
            self.step_url(room, 2)?,
            self.group_size,
            week_offset
        );
        let group = self.group_size.to_string();

        debug!(room = %room, week_offset, "Fetching booking page: {}", url);

        let response = self
            .client
            .post(&url)
            .form(&[("game", game), ("group", group.as_str())])
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        if !response.status().is_success() {
            error!(room = %room, week_offset, "Booking page request failed: {}", response.status());
            return Err(FetchError::BadStatus(response.status().as_u16()));
        }

        let html = response
            .text()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        Ok(RawWeekPage {
            room,
            week_offset,
            html,
        })
    }
}
