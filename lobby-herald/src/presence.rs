//! Normalized presence input.
//!
//! The gateway adapter turns raw activity payloads into [`Activity`] values.
//! Nothing past this boundary deals with payload shapes.

use crate::session::PartyOccupancy;
use tokio::sync::RwLock;

/// One activity from a presence update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activity {
    pub name: String,
    /// `(current, max)` when the activity carries a party size.
    pub party_size: Option<(u32, u32)>,
}

impl Activity {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            party_size: None,
        }
    }

    pub fn with_party(mut self, current: u32, max: u32) -> Self {
        self.party_size = Some((current, max));
        self
    }
}

/// Occupancy read from the first activity that matches the tracked title and
/// carries a party size. Later matches are ignored.
pub fn party_from_activities(activities: &[Activity], tracked_game: &str) -> Option<PartyOccupancy> {
    let (current, max) = activities
        .iter()
        .filter(|a| a.name == tracked_game)
        .find_map(|a| a.party_size)?;
    PartyOccupancy::new(current, max)
}

/// Name of the owner's first activity, or "none".
pub fn activity_label(activities: &[Activity]) -> String {
    activities
        .first()
        .map_or_else(|| crate::render::NONE_TEXT.to_string(), |a| a.name.clone())
}

/// Last known activity label of the owner, shown by `status`.
#[derive(Debug, Default)]
pub struct OwnerPresence {
    label: RwLock<Option<String>>,
}

impl OwnerPresence {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn update(&self, activities: &[Activity]) {
        *self.label.write().await = Some(activity_label(activities));
    }

    pub async fn label(&self) -> String {
        self.label
            .read()
            .await
            .clone()
            .unwrap_or_else(|| crate::render::NONE_TEXT.to_string())
    }
}
