/*
Natural-language -> task draft pipeline.
One extraction call, then local date resolution. Never fails: any extraction
problem degrades to a draft whose title is the raw input.
*/

use chrono::{DateTime, FixedOffset, NaiveDateTime};
use tracing::{debug, warn};

use crate::extraction::{ExtractionContext, Extractor, RawExtraction};
use crate::models::{TaskDraft, TaskStatus};
use crate::temporal::{self, LocalDateTime};

pub const SUMMARY_FALLBACK: &str = "Great work today!";
pub const SUMMARY_EMPTY: &str = "Keep pushing!";

pub struct Normalizer<E> {
    extractor: E,
}

impl<E: Extractor> Normalizer<E> {
    pub const fn new(extractor: E) -> Self {
        Self { extractor }
    }

    /// Normalize free text into a draft, anchored at `reference`.
    ///
    /// The returned draft may still carry `priority: auto`; call
    /// [`TaskDraft::resolve_placeholders`] (the store does) before persisting.
    pub async fn normalize(&self, text: &str, reference: DateTime<FixedOffset>) -> TaskDraft {
        let context = ExtractionContext::from_reference(reference);
        match self.extractor.extract(text, &context).await {
            Ok(raw) => draft_from_extraction(raw, reference.naive_local()),
            Err(err) => {
                warn!(error = %err, "extraction failed, using fallback draft");
                TaskDraft::fallback(text)
            }
        }
    }

    pub async fn daily_summary(&self, completed: usize, pending: usize) -> String {
        match self.extractor.motivate(completed, pending).await {
            Ok(line) if !line.trim().is_empty() => line.trim().to_string(),
            Ok(_) => SUMMARY_EMPTY.to_string(),
            Err(err) => {
                debug!(error = %err, "summary unavailable");
                SUMMARY_FALLBACK.to_string()
            }
        }
    }
}

// Build the draft from a validated extraction. Dates go through the resolver
// only when a day or month was extracted.
pub fn draft_from_extraction(raw: RawExtraction, now: NaiveDateTime) -> TaskDraft {
    let due_date = raw
        .date_components
        .as_ref()
        .filter(|c| c.has_date())
        .map(|c| temporal::resolve(c, now));

    // Reminders pass through only when explicitly supplied.
    let reminder = raw.reminder.as_deref().and_then(|value| {
        let parsed = LocalDateTime::parse(value);
        if parsed.is_none() {
            warn!(reminder = value, "dropping unreadable reminder");
        }
        parsed
    });

    TaskDraft {
        title: raw.title.trim().to_string(),
        description: Some(raw.description).filter(|d| !d.trim().is_empty()),
        status: TaskStatus::Todo,
        priority: raw.priority,
        category: raw.category,
        tags: dedup_preserving_order(raw.tags),
        subtasks: raw.subtasks,
        due_date,
        reminder,
        duration_minutes: raw.duration_minutes,
        ai_generated: true,
    }
}

// Tags are a set; keep first occurrence order for display.
fn dedup_preserving_order(tags: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim().to_string();
        if !tag.is_empty() && !out.contains(&tag) {
            out.push(tag);
        }
    }
    out
}
