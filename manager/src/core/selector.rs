//! Task selection for the executor and the launch schedule.

use chrono::{DateTime, Duration, Utc};

use crate::task::Task;

/// Indices of active tasks due before `now + lookahead`, earliest first.
///
/// Ties keep table order.
pub fn due_tasks(tasks: &[Task], now: DateTime<Utc>, lookahead: Duration) -> Vec<usize> {
    let horizon = now + lookahead;
    let mut due: Vec<usize> = tasks
        .iter()
        .enumerate()
        .filter(|(_, task)| task.is_active() && task.next_run < horizon)
        .map(|(index, _)| index)
        .collect();
    due.sort_by_key(|&index| tasks[index].next_run);
    due
}

/// Earliest `next_run` among active tasks.
pub fn earliest_next_run(tasks: &[Task]) -> Option<DateTime<Utc>> {
    tasks
        .iter()
        .filter(|task| task.is_active())
        .map(|task| task.next_run)
        .min()
}

/// When the executor must next wake: the earliest active `next_run` or the
/// earliest pending status change date, whichever comes first.
///
/// Paused tasks count through their change date so a scheduled resume is
/// not missed.
pub fn next_wake(tasks: &[Task]) -> Option<DateTime<Utc>> {
    let changes = tasks.iter().filter_map(|task| task.status_change_date);
    earliest_next_run(tasks).into_iter().chain(changes).min()
}

/// Flip the status of every task whose status change date has been reached.
///
/// The date is consumed, so each change happens once. Returns changed indices.
pub fn apply_status_changes(tasks: &mut [Task], now: DateTime<Utc>) -> Vec<usize> {
    let mut changed = Vec::new();
    for (index, task) in tasks.iter_mut().enumerate() {
        let Some(change_at) = task.status_change_date else {
            continue;
        };
        if change_at <= now {
            task.status = task.status.toggled();
            task.status_change_date = None;
            changed.push(index);
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskStatus;
    use crate::test_support::task_at;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, h, m, 0).unwrap()
    }

    #[test]
    fn due_tasks_orders_by_next_run_and_respects_lookahead() {
        let now = at(9, 0);
        let tasks = vec![
            task_at("later", at(9, 4)),
            task_at("overdue", at(8, 0)),
            task_at("outside", at(9, 5)),
            task_at("now", at(9, 0)),
        ];

        let due = due_tasks(&tasks, now, Duration::minutes(5));
        assert_eq!(due, vec![1, 3, 0]);
    }

    #[test]
    fn due_tasks_skips_paused() {
        let now = at(9, 0);
        let mut paused = task_at("paused", at(8, 0));
        paused.status = TaskStatus::Paused;
        let tasks = vec![paused, task_at("active", at(8, 30))];

        assert_eq!(due_tasks(&tasks, now, Duration::minutes(5)), vec![1]);
    }

    #[test]
    fn earliest_ignores_paused_tasks() {
        let mut paused = task_at("paused", at(1, 0));
        paused.status = TaskStatus::Paused;
        let tasks = vec![paused, task_at("b", at(5, 0)), task_at("a", at(3, 0))];
        assert_eq!(earliest_next_run(&tasks), Some(at(3, 0)));
        assert_eq!(earliest_next_run(&tasks[..1]), None);
    }

    #[test]
    fn next_wake_includes_pending_status_changes() {
        let mut resuming = task_at("resuming", at(1, 0));
        resuming.status = TaskStatus::Paused;
        resuming.status_change_date = Some(at(6, 0));
        assert_eq!(next_wake(std::slice::from_ref(&resuming)), Some(at(6, 0)));

        let mut expiring = task_at("expiring", at(8, 0));
        expiring.status_change_date = Some(at(7, 0));
        let tasks = vec![resuming, expiring, task_at("active", at(5, 0))];
        assert_eq!(next_wake(&tasks), Some(at(5, 0)));
        assert_eq!(next_wake(&tasks[1..2]), Some(at(7, 0)));
    }

    #[test]
    fn next_wake_is_none_without_active_tasks_or_changes() {
        let mut paused = task_at("paused", at(1, 0));
        paused.status = TaskStatus::Paused;
        assert_eq!(next_wake(&[paused]), None);
        assert_eq!(next_wake(&[]), None);
    }

    #[test]
    fn status_changes_fire_once() {
        let mut reached = task_at("reached", at(10, 0));
        reached.status_change_date = Some(at(8, 59));
        let mut pending = task_at("pending", at(10, 0));
        pending.status_change_date = Some(at(23, 59));
        let mut tasks = vec![reached, pending];

        let changed = apply_status_changes(&mut tasks, at(9, 0));
        assert_eq!(changed, vec![0]);
        assert_eq!(tasks[0].status, TaskStatus::Paused);
        assert_eq!(tasks[0].status_change_date, None);
        assert_eq!(tasks[1].status, TaskStatus::Active);

        assert!(apply_status_changes(&mut tasks, at(9, 30)).is_empty());
    }
}
