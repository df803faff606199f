//! Read-side filtering and consumption statistics over recorded sessions.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::session::{Session, per_attendee_ml};

/// Optional filters for listing sessions.
///
/// Text filters are case-insensitive substring matches; blank strings are
/// ignored. `from`/`to` bound the session date inclusively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionFilter {
    /// Matches presiding, topic or readings.
    pub q: Option<String>,
    pub presiding: Option<String>,
    pub topic: Option<String>,
    pub readings: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

fn needle(filter: &Option<String>) -> Option<String> {
    filter
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase)
}

fn contains(haystack: &str, needle: &Option<String>) -> bool {
    match needle {
        Some(n) => haystack.to_lowercase().contains(n.as_str()),
        None => true,
    }
}

impl SessionFilter {
    pub fn matches(&self, session: &Session) -> bool {
        let s = &session.record;

        if self.from.is_some_and(|from| s.session_date < from) {
            return false;
        }
        if self.to.is_some_and(|to| s.session_date > to) {
            return false;
        }

        let any = needle(&self.q);
        if any.is_some()
            && !(contains(&s.presiding, &any) || contains(&s.topic, &any) || contains(&s.readings, &any))
        {
            return false;
        }

        contains(&s.presiding, &needle(&self.presiding))
            && contains(&s.topic, &needle(&self.topic))
            && contains(&s.readings, &needle(&self.readings))
    }

    /// Matching sessions, most recently registered first.
    pub fn apply(&self, sessions: impl IntoIterator<Item = Session>) -> Vec<Session> {
        let mut out: Vec<Session> = sessions.into_iter().filter(|s| self.matches(s)).collect();
        sort_newest_first(&mut out);
        out
    }
}

/// Order by registration time descending, newest id first on ties.
pub fn sort_newest_first(sessions: &mut [Session]) {
    sessions.sort_by(|a, b| {
        b.record
            .registered_at
            .cmp(&a.record.registered_at)
            .then_with(|| b.id.cmp(&a.id))
    });
}

/// Aggregate consumption over a set of sessions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionSummary {
    pub sessions: usize,
    pub attendees: i64,
    pub consumed_volume: f64,
    /// Attendee-weighted average (total consumed / total attendees), in ml.
    pub average_per_attendee_ml: f64,
}

impl ConsumptionSummary {
    pub fn from_sessions<'a>(sessions: impl IntoIterator<Item = &'a Session>) -> Self {
        let mut summary = Self::default();
        for s in sessions {
            summary.sessions += 1;
            summary.attendees += s.record.attendees.max(0);
            summary.consumed_volume += s.record.consumed_volume;
        }
        summary.average_per_attendee_ml = per_attendee_ml(summary.consumed_volume, summary.attendees);
        summary
    }
}
