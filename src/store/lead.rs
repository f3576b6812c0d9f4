//! Lead record: one outreach target, one CSV row.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Column headers, in the order they must appear.
pub const COLUMNS: [&str; 7] = [
    "Company Name",
    "Contact Email",
    "Role",
    "Context/JD",
    "Why I Love Them",
    "Sent Status",
    "Sent Time",
];

/// Text written to the status column on commit.
pub const SENT_YES: &str = "Yes";

/// Text format of the sent timestamp column.
pub const SENT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

/// One outreach target.
///
/// The sent columns are private: they are only ever changed through
/// `LeadStore::commit`, which keeps the flag and the timestamp in step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadRecord {
    #[serde(rename = "Company Name", default)]
    pub company: String,
    #[serde(rename = "Contact Email", default)]
    pub email: String,
    #[serde(rename = "Role", default)]
    pub role: String,
    #[serde(rename = "Context/JD", default)]
    pub context: String,
    #[serde(rename = "Why I Love Them", default)]
    pub affinity_note: String,
    #[serde(rename = "Sent Status", default)]
    sent_status: String,
    #[serde(rename = "Sent Time", default)]
    sent_time: String,
}

impl LeadRecord {
    /// A fresh, unsent lead.
    pub fn new(
        company: impl Into<String>,
        email: impl Into<String>,
        role: impl Into<String>,
        context: impl Into<String>,
        affinity_note: impl Into<String>,
    ) -> Self {
        Self {
            company: company.into(),
            email: email.into(),
            role: role.into(),
            context: context.into(),
            affinity_note: affinity_note.into(),
            sent_status: "No".to_string(),
            sent_time: String::new(),
        }
    }

    /// Empty or `No` (any case) means unsent; anything else means sent.
    pub fn is_sent(&self) -> bool {
        let status = self.sent_status.trim();
        !(status.is_empty() || status.eq_ignore_ascii_case("no"))
    }

    /// Eligible for the next drip: unsent and addressable.
    pub fn is_eligible(&self) -> bool {
        !self.is_sent() && self.has_address()
    }

    pub fn has_address(&self) -> bool {
        !self.email.trim().is_empty()
    }

    /// Raw sent-time text, empty when unsent.
    pub fn sent_time(&self) -> &str {
        self.sent_time.trim()
    }

    /// Parsed sent timestamp, if present and readable.
    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        parse_sent_time(self.sent_time())
    }

    pub fn sent_on(&self, date: NaiveDate) -> bool {
        self.is_sent() && self.sent_at().is_some_and(|at| at.date_naive() == date)
    }

    /// Flag and timestamp must agree.
    pub(crate) fn check_invariant(&self) -> Result<(), String> {
        match (self.is_sent(), self.sent_time().is_empty()) {
            (true, true) => Err(format!(
                "'{}' is marked sent ({}) but has no sent time",
                self.company, self.sent_status
            )),
            (false, false) => Err(format!(
                "'{}' is unsent but has sent time '{}'",
                self.company,
                self.sent_time()
            )),
            _ => Ok(()),
        }
    }

    pub(crate) fn mark_sent(&mut self, at: DateTime<Utc>) {
        self.sent_status = SENT_YES.to_string();
        self.sent_time = at.format(SENT_TIME_FORMAT).to_string();
    }
}

pub(crate) fn parse_sent_time(text: &str) -> Option<DateTime<Utc>> {
    if text.is_empty() {
        return None;
    }
    NaiveDateTime::parse_from_str(text, SENT_TIME_FORMAT)
        .map(|naive| naive.and_utc())
        .or_else(|_| DateTime::parse_from_rfc3339(text).map(|dt| dt.with_timezone(&Utc)))
        .ok()
}
