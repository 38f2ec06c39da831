// Dashboard and calendar read models.
// Unlike the query engine's `overdue` range, the dashboard counts a task as
// overdue as soon as its due instant has passed.

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::models::{Task, TaskStatus};

const UPCOMING_LIMIT: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardStats {
    pub total: usize,
    pub done: usize,
    pub pending: usize,
    pub overdue: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardSummary<'a> {
    pub stats: DashboardStats,
    pub today: Vec<&'a Task>,
    pub overdue: Vec<&'a Task>,
    pub upcoming: Vec<&'a Task>,
}

pub fn summarize(tasks: &[Task], now: NaiveDateTime) -> DashboardSummary<'_> {
    let today = now.date();
    // Open tasks with a due date; the sections only look at these.
    let open_dated = || {
        tasks
            .iter()
            .filter(|t| t.status != TaskStatus::Done)
            .filter_map(|t| t.due_date.map(|due| (t, due.naive())))
    };

    let today_tasks: Vec<&Task> = open_dated().filter(|(_, due)| due.date() == today).map(|(t, _)| t).collect();
    let overdue: Vec<&Task> = open_dated().filter(|(_, due)| *due < now).map(|(t, _)| t).collect();
    let upcoming: Vec<&Task> = open_dated()
        .filter(|(_, due)| due.date() > today)
        .map(|(t, _)| t)
        .take(UPCOMING_LIMIT)
        .collect();

    let total = tasks.len();
    let done = tasks.iter().filter(|t| t.status == TaskStatus::Done).count();

    DashboardSummary {
        stats: DashboardStats {
            total,
            done,
            pending: total - done,
            overdue: overdue.len(),
        },
        today: today_tasks,
        overdue,
        upcoming,
    }
}

// Calendar day view: every task due on `date`, regardless of status.
pub fn tasks_on(tasks: &[Task], date: NaiveDate) -> Vec<&Task> {
    tasks
        .iter()
        .filter(|t| t.due_date.is_some_and(|due| due.date() == date))
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use uuid::Uuid;

    use super::*;
    use crate::models::TaskDraft;
    use crate::temporal::{LocalDateTime, now_fixed_offset};

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 7, 10)
            .and_then(|d| d.and_hms_opt(12, 0, 0))
            .unwrap_or_else(|| panic!("valid now"))
    }

    fn task(title: &str, offset_hours: Option<i64>, status: TaskStatus) -> Task {
        let mut task = TaskDraft::fallback(title).into_task(Uuid::new_v4(), now_fixed_offset());
        task.status = status;
        task.due_date = offset_hours.map(|h| LocalDateTime::new(now() + Duration::hours(h)));
        task
    }

    fn titles(tasks: &[&Task]) -> Vec<String> {
        tasks.iter().map(|t| t.title.clone()).collect()
    }

    #[test]
    fn stats_and_sections() {
        let tasks = vec![
            task("this morning", Some(-3), TaskStatus::Todo),
            task("tonight", Some(6), TaskStatus::InProgress),
            task("last week", Some(-24 * 7), TaskStatus::Todo),
            task("finished yesterday", Some(-24), TaskStatus::Done),
            task("in two days", Some(48), TaskStatus::Todo),
            task("someday", None, TaskStatus::Todo),
        ];
        let summary = summarize(&tasks, now());

        assert_eq!(
            summary.stats,
            DashboardStats {
                total: 6,
                done: 1,
                pending: 5,
                overdue: 2,
            }
        );
        assert_eq!(titles(&summary.today), vec!["this morning", "tonight"]);
        assert_eq!(titles(&summary.overdue), vec!["this morning", "last week"]);
        assert_eq!(titles(&summary.upcoming), vec!["in two days"]);
    }

    #[test]
    fn upcoming_is_capped() {
        let tasks: Vec<Task> = (1..=8)
            .map(|i| task(&format!("later {i}"), Some(24 * i), TaskStatus::Todo))
            .collect();
        let summary = summarize(&tasks, now());
        assert_eq!(summary.upcoming.len(), UPCOMING_LIMIT);
        assert_eq!(summary.upcoming[0].title, "later 1");
    }

    #[test]
    fn calendar_day_includes_done_tasks() {
        let tasks = vec![
            task("done today", Some(1), TaskStatus::Done),
            task("tomorrow", Some(24), TaskStatus::Todo),
            task("undated", None, TaskStatus::Todo),
        ];
        assert_eq!(titles(&tasks_on(&tasks, now().date())), vec!["done today"]);
    }
}
