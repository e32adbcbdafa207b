//! Day sections for message display.
//!
//! Messages are grouped by the calendar day of their timestamp in a fixed
//! display offset. Sections come newest day first and messages inside a
//! section newest first. The grouping is recomputed from the message list on
//! every publish; it is never stored.

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone};
use sync_types::Message;

/// Messages of one calendar day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaySection {
    /// The calendar day, in the display offset.
    pub day: NaiveDate,
    /// Messages of that day, newest first.
    pub messages: Vec<Message>,
}

impl DaySection {
    /// Start of the section's day (local midnight in `offset`).
    pub fn starts_at(&self, offset: FixedOffset) -> Option<DateTime<FixedOffset>> {
        let midnight = self.day.and_hms_opt(0, 0, 0)?;
        offset.from_local_datetime(&midnight).single()
    }

    /// Number of messages in the section.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// True if the section holds no messages.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Group messages into calendar-day sections.
///
/// The input order does not matter. Equal timestamps keep their input order.
pub fn group_by_day(messages: &[Message], offset: FixedOffset) -> Vec<DaySection> {
    let mut sorted = messages.to_vec();
    sorted.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    let mut sections: Vec<DaySection> = Vec::new();
    for message in sorted {
        let day = message.timestamp.with_timezone(&offset).date_naive();
        match sections.last_mut() {
            Some(section) if section.day == day => section.messages.push(message),
            _ => sections.push(DaySection {
                day,
                messages: vec![message],
            }),
        }
    }
    sections
}
