//! Channel configuration consumed by the scheduler.
//!
//! The scheduler never owns channel data. It only asks which channels are
//! active, whether a channel is independently schedulable, and the focus offset
//! to apply when acquiring it.

use serde::{Deserialize, Serialize};

/// Display color of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Rgb {
    /// Red component
    pub r: u8,
    /// Green component
    pub g: u8,
    /// Blue component
    pub b: u8,
}

impl Rgb {
    /// Create a color from components.
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Pure white, used when no color is configured.
    pub const WHITE: Rgb = Rgb::new(255, 255, 255);
}

/// One configured channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSetting {
    /// Channel name shown in the viewer
    pub name: String,
    /// Display color
    #[serde(default = "default_color")]
    pub color: Rgb,
    /// Focus offset (same units as the focus drive) added to the slice z
    #[serde(default)]
    pub offset: f64,
    /// Whether this channel is acquired at all
    #[serde(default = "default_true")]
    pub active: bool,
    /// Whether this channel gets its own acquisition event.
    ///
    /// Channels captured simultaneously with another channel (one exposure,
    /// several outputs) set this to false so only one representative event is
    /// scheduled per physical exposure.
    #[serde(default = "default_true")]
    pub unique_event: bool,
}

fn default_color() -> Rgb {
    Rgb::WHITE
}

fn default_true() -> bool {
    true
}

impl ChannelSetting {
    /// Active, independently scheduled channel with no offset.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color: Rgb::WHITE,
            offset: 0.0,
            active: true,
            unique_event: true,
        }
    }

    /// Set the focus offset.
    pub fn with_offset(mut self, offset: f64) -> Self {
        self.offset = offset;
        self
    }

    /// Set the display color.
    pub fn with_color(mut self, color: Rgb) -> Self {
        self.color = color;
        self
    }

    /// Mark the channel as captured together with another channel.
    pub fn shared_exposure(mut self) -> Self {
        self.unique_event = false;
        self
    }
}

/// The set of channels configured for an acquisition.
///
/// Indices used by the scheduler are indices into the *active* channels.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelSpec {
    channels: Vec<ChannelSetting>,
}

impl ChannelSpec {
    /// Build a channel set from a list of settings.
    pub fn new(channels: Vec<ChannelSetting>) -> Self {
        Self { channels }
    }

    /// No channels configured; acquisitions then schedule a single channel 0.
    pub fn empty() -> Self {
        Self::default()
    }

    fn active(&self) -> impl Iterator<Item = &ChannelSetting> {
        self.channels.iter().filter(|c| c.active)
    }

    /// Number of active channels.
    pub fn num_active_channels(&self) -> usize {
        self.active().count()
    }

    /// Active channel by index.
    pub fn active_channel(&self, index: usize) -> Option<&ChannelSetting> {
        self.active().nth(index)
    }

    /// Names of the active channels.
    pub fn active_channel_names(&self) -> Vec<String> {
        self.active().map(|c| c.name.clone()).collect()
    }

    /// Colors of the active channels.
    pub fn active_channel_colors(&self) -> Vec<Rgb> {
        self.active().map(|c| c.color).collect()
    }

    /// Number of channel indices the scheduler iterates over.
    ///
    /// At least one, so an acquisition without channel configuration still
    /// acquires a single image per tile.
    pub fn schedulable_count(&self) -> usize {
        self.num_active_channels().max(1)
    }

    /// Whether channel `index` gets its own event. Missing channels are
    /// schedulable with zero offset.
    pub fn is_unique_event(&self, index: usize) -> bool {
        self.active_channel(index).map_or(true, |c| c.unique_event)
    }

    /// Focus offset for channel `index` (zero if not configured).
    pub fn offset(&self, index: usize) -> f64 {
        self.active_channel(index).map_or(0.0, |c| c.offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inactive_channels_are_skipped_in_indexing() {
        let mut dapi = ChannelSetting::new("DAPI");
        dapi.active = false;
        let channels = ChannelSpec::new(vec![
            dapi,
            ChannelSetting::new("GFP").with_offset(1.5),
            ChannelSetting::new("RFP").shared_exposure(),
        ]);

        assert_eq!(channels.num_active_channels(), 2);
        assert_eq!(channels.active_channel_names(), vec!["GFP", "RFP"]);
        assert_eq!(channels.offset(0), 1.5);
        assert!(channels.is_unique_event(0));
        assert!(!channels.is_unique_event(1));
    }

    #[test]
    fn empty_channel_set_schedules_one_channel() {
        let channels = ChannelSpec::empty();
        assert_eq!(channels.schedulable_count(), 1);
        assert!(channels.is_unique_event(0));
        assert_eq!(channels.offset(0), 0.0);
    }

    #[test]
    fn deserializes_with_defaults() {
        let spec: ChannelSpec =
            serde_json::from_str(r#"[{"name": "Cy5", "offset": -0.5}]"#).unwrap();
        let ch = spec.active_channel(0).unwrap();
        assert!(ch.active);
        assert!(ch.unique_event);
        assert_eq!(ch.color, Rgb::WHITE);
        assert_eq!(ch.offset, -0.5);
    }
}
