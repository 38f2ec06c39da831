/*
Task query engine: filter -> sort -> group.
Pure function of (tasks, filters, now); written independently from HTTP so
it can be called on every filter change and tested directly.
*/

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

use chrono::{Duration, NaiveDate, NaiveDateTime};
use icu_collator::options::CollatorOptions;
use icu_collator::{Collator, CollatorPreferences};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::models::{DEFAULT_CATEGORY, Priority, Task, TaskStatus};
use crate::temporal::start_of_day;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateRange {
    #[default]
    All,
    Today,
    Week,
    Overdue,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    #[default]
    Latest,
    Oldest,
    PriorityDesc,
    PriorityAsc,
    DueSoon,
    DueLate,
    Alphabetical,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupBy {
    #[default]
    None,
    Status,
    Priority,
    Category,
    DueDate,
}

/// Filter / sort / group selection. Empty sets mean "no constraint".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FilterSpec {
    pub status: BTreeSet<TaskStatus>,
    pub priority: BTreeSet<Priority>,
    pub category: BTreeSet<String>,
    pub tags: BTreeSet<String>,
    pub search: String,
    pub date_range: DateRange,
    pub sort_by: SortBy,
    pub group_by: GroupBy,
}

impl FilterSpec {
    // Logical AND across dimensions, OR within each set.
    pub fn matches(&self, task: &Task, now: NaiveDateTime) -> bool {
        self.matches_search(task)
            && (self.status.is_empty() || self.status.contains(&task.status))
            && (self.priority.is_empty() || self.priority.contains(&task.priority))
            && (self.category.is_empty() || self.category.contains(&task.category))
            && (self.tags.is_empty() || task.tags.iter().any(|t| self.tags.contains(t)))
            && self.matches_date_range(task, now)
    }

    fn matches_search(&self, task: &Task) -> bool {
        // Whitespace-only counts as empty; otherwise the needle is used as typed.
        if self.search.trim().is_empty() {
            return true;
        }
        let needle = self.search.to_lowercase();
        let contains = |field: &str| field.to_lowercase().contains(&needle);

        contains(task.title.as_str())
            || task.description.as_deref().is_some_and(contains)
            || task.tags.iter().any(|tag| contains(tag.as_str()))
    }

    fn matches_date_range(&self, task: &Task, now: NaiveDateTime) -> bool {
        if self.date_range == DateRange::All {
            return true;
        }
        // Every other range requires a due date.
        let Some(due) = task.due_date.map(|d| d.naive()) else {
            return false;
        };
        let today = now.date();
        let today_start = start_of_day(today);

        match self.date_range {
            DateRange::All => true,
            DateRange::Today => due.date() == today,
            DateRange::Week => due >= today_start && due <= today_start + Duration::days(7),
            DateRange::Overdue => due < today_start && task.status != TaskStatus::Done,
        }
    }
}

/// Named bucket of a grouped result. Members keep their sorted order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskGroup<'a> {
    pub key: String,
    pub tasks: Vec<&'a Task>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", content = "items", rename_all = "snake_case")]
pub enum QueryResult<'a> {
    Flat(Vec<&'a Task>),
    Grouped(Vec<TaskGroup<'a>>),
}

#[cfg(test)]
impl<'a> QueryResult<'a> {
    pub fn len(&self) -> usize {
        match self {
            Self::Flat(tasks) => tasks.len(),
            Self::Grouped(groups) => groups.iter().map(|g| g.tasks.len()).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Bucket contents concatenated in bucket order.
    pub fn flatten(self) -> Vec<&'a Task> {
        match self {
            Self::Flat(tasks) => tasks,
            Self::Grouped(groups) => groups.into_iter().flat_map(|g| g.tasks).collect(),
        }
    }
}

/// Evaluate `filters` against `tasks` as of `now` (local wall clock).
pub fn evaluate<'a>(tasks: &'a [Task], filters: &FilterSpec, now: NaiveDateTime) -> QueryResult<'a> {
    let mut selected: Vec<&Task> = tasks.iter().filter(|t| filters.matches(t, now)).collect();
    sort_tasks(&mut selected, filters.sort_by);
    group_tasks(selected, filters.group_by, now.date())
}

// Stable sort: equal keys keep their input order.
pub fn sort_tasks(tasks: &mut [&Task], sort_by: SortBy) {
    match sort_by {
        SortBy::Latest => tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
        SortBy::Oldest => tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at)),
        SortBy::PriorityDesc => tasks.sort_by(|a, b| b.priority.rank().cmp(&a.priority.rank())),
        SortBy::PriorityAsc => tasks.sort_by(|a, b| a.priority.rank().cmp(&b.priority.rank())),
        SortBy::DueSoon => tasks.sort_by(|a, b| cmp_due(a, b, false)),
        SortBy::DueLate => tasks.sort_by(|a, b| cmp_due(a, b, true)),
        SortBy::Alphabetical => sort_alphabetical(tasks),
    }
}

// Locale-aware title order (root collation), so accented initials sort with
// their base letter instead of after "z".
fn sort_alphabetical(tasks: &mut [&Task]) {
    match Collator::try_new(CollatorPreferences::default(), CollatorOptions::default()) {
        Ok(collator) => tasks.sort_by(|a, b| collator.compare(&a.title, &b.title)),
        Err(err) => {
            warn!(error = %err, "collation data unavailable, sorting by lowercase title");
            tasks.sort_by_cached_key(|t| t.title.to_lowercase());
        }
    }
}

// Missing due dates go last in both directions.
fn cmp_due(a: &Task, b: &Task, descending: bool) -> Ordering {
    match (a.due_date, b.due_date) {
        (Some(x), Some(y)) if descending => y.cmp(&x),
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DueBucket {
    NoDate,
    Overdue,
    Today,
    Later,
}

impl DueBucket {
    // Calendar-day comparison only; status is not considered.
    pub fn classify(task: &Task, today: NaiveDate) -> Self {
        match task.due_date.map(|d| d.date()) {
            None => Self::NoDate,
            Some(day) => match day.cmp(&today) {
                Ordering::Less => Self::Overdue,
                Ordering::Equal => Self::Today,
                Ordering::Greater => Self::Later,
            },
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::NoDate => "No Date",
            Self::Overdue => "Overdue",
            Self::Today => "Today",
            Self::Later => "Later",
        }
    }
}

fn group_key(task: &Task, group_by: GroupBy, today: NaiveDate) -> String {
    match group_by {
        GroupBy::None => String::new(),
        GroupBy::Status => task.status.as_str().to_string(),
        GroupBy::Priority => task.priority.as_str().to_string(),
        GroupBy::Category if task.category.trim().is_empty() => DEFAULT_CATEGORY.to_string(),
        GroupBy::Category => task.category.clone(),
        GroupBy::DueDate => DueBucket::classify(task, today).label().to_string(),
    }
}

// Buckets appear in order of first occurrence in the sorted sequence.
fn group_tasks(sorted: Vec<&Task>, group_by: GroupBy, today: NaiveDate) -> QueryResult<'_> {
    if group_by == GroupBy::None {
        return QueryResult::Flat(sorted);
    }

    let mut groups: Vec<TaskGroup<'_>> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for task in sorted {
        let key = group_key(task, group_by, today);
        let slot = *index.entry(key.clone()).or_insert_with(|| {
            groups.push(TaskGroup {
                key,
                tasks: Vec::new(),
            });
            groups.len() - 1
        });
        groups[slot].tasks.push(task);
    }
    QueryResult::Grouped(groups)
}
