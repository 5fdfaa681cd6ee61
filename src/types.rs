use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;
use serde::Deserialize;

bitflags! {
    /// Set of event kinds a caller wants reported for a path.
    ///
    /// The bit values are internal to this crate; kernel backends translate
    /// their native flags into this set.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EventSet: u32 {
        /// Item was renamed.
        const RENAME = 1 << 0;
        /// Item contents changed.
        const WRITE = 1 << 1;
        /// Item was removed.
        const DELETE = 1 << 2;
        /// Item attributes changed.
        const ATTRIBUTE_CHANGE = 1 << 3;
        /// Item size increased.
        const SIZE_INCREASE = 1 << 4;
        /// Item's link count changed.
        const LINK_COUNT_CHANGED = 1 << 5;
        /// Access to item was revoked.
        const ACCESS_REVOCATION = 1 << 6;

        const ALL = Self::RENAME.bits()
            | Self::WRITE.bits()
            | Self::DELETE.bits()
            | Self::ATTRIBUTE_CHANGE.bits()
            | Self::SIZE_INCREASE.bits()
            | Self::LINK_COUNT_CHANGED.bits()
            | Self::ACCESS_REVOCATION.bits();
    }
}

impl Default for EventSet {
    fn default() -> Self {
        EventSet::ALL
    }
}

impl EventSet {
    /// Expand the set into individual events, in delivery order.
    pub fn events(self) -> impl Iterator<Item = QueueEvent> {
        QueueEvent::ORDERED
            .into_iter()
            .filter(move |event| self.contains(event.flag()))
    }
}

impl FromIterator<QueueEvent> for EventSet {
    fn from_iter<I: IntoIterator<Item = QueueEvent>>(iter: I) -> Self {
        iter.into_iter()
            .fold(EventSet::empty(), |set, event| set | event.flag())
    }
}

/// A single named event kind, as delivered to delegates and subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum QueueEvent {
    Rename,
    Write,
    Delete,
    AttributeChange,
    SizeIncrease,
    LinkCountChanged,
    AccessRevocation,
}

impl QueueEvent {
    /// Every event kind, in the order a multi-flag event is delivered.
    pub const ORDERED: [QueueEvent; 7] = [
        QueueEvent::Rename,
        QueueEvent::Write,
        QueueEvent::Delete,
        QueueEvent::AttributeChange,
        QueueEvent::SizeIncrease,
        QueueEvent::LinkCountChanged,
        QueueEvent::AccessRevocation,
    ];

    pub fn flag(self) -> EventSet {
        match self {
            QueueEvent::Rename => EventSet::RENAME,
            QueueEvent::Write => EventSet::WRITE,
            QueueEvent::Delete => EventSet::DELETE,
            QueueEvent::AttributeChange => EventSet::ATTRIBUTE_CHANGE,
            QueueEvent::SizeIncrease => EventSet::SIZE_INCREASE,
            QueueEvent::LinkCountChanged => EventSet::LINK_COUNT_CHANGED,
            QueueEvent::AccessRevocation => EventSet::ACCESS_REVOCATION,
        }
    }

    /// Broadcast topic name. Subscribers match on these strings, so they
    /// must never change.
    pub fn topic(self) -> &'static str {
        match self {
            QueueEvent::Rename => "Rename",
            QueueEvent::Write => "Write",
            QueueEvent::Delete => "Delete",
            QueueEvent::AttributeChange => "AttributeChange",
            QueueEvent::SizeIncrease => "SizeIncrease",
            QueueEvent::LinkCountChanged => "LinkCountChanged",
            QueueEvent::AccessRevocation => "AccessRevocation",
        }
    }
}

impl fmt::Display for QueueEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.topic())
    }
}

impl FromStr for QueueEvent {
    type Err = String;

    /// Accepts the topic name in any case, with or without `_` / `-`
    /// separators (`"Write"`, `"size_increase"`, `"link-count-changed"`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_lowercase();

        QueueEvent::ORDERED
            .into_iter()
            .find(|event| event.topic().to_lowercase() == normalized)
            .ok_or_else(|| {
                format!(
                    "invalid event name: {s} (expected one of rename, write, delete, \
                     attribute_change, size_increase, link_count_changed, access_revocation)"
                )
            })
    }
}

impl TryFrom<String> for QueueEvent {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
