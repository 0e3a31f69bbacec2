use crate::controller::ControllerId;
use crate::dom::NodeId;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerKind {
    /// Deferred `scrollIntoView` after marker classes were applied.
    ScrollIntoView(NodeId),
    /// Deferred first resolution when the page loaded on a random token.
    StartupResolve,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TimerTask {
    pub(crate) controller: ControllerId,
    pub(crate) kind: TimerKind,
}

#[derive(Debug, Clone)]
pub(crate) struct ScheduledTask {
    pub(crate) id: i64,
    pub(crate) due_at: i64,
    order: i64,
    pub(crate) task: TimerTask,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTimer {
    pub id: i64,
    pub due_at: i64,
    pub order: i64,
    pub label: String,
}

/// One-shot timers on a virtual clock. Time only moves when the page is told
/// to advance it.
#[derive(Debug, Clone)]
pub(crate) struct TimerQueue {
    now_ms: i64,
    tasks: Vec<ScheduledTask>,
    next_timer_id: i64,
    next_task_order: i64,
    step_limit: usize,
}

impl Default for TimerQueue {
    fn default() -> Self {
        Self {
            now_ms: 0,
            tasks: Vec::new(),
            next_timer_id: 1,
            next_task_order: 0,
            step_limit: 10_000,
        }
    }
}

impl TimerQueue {
    pub(crate) fn now_ms(&self) -> i64 {
        self.now_ms
    }

    pub(crate) fn step_limit(&self) -> usize {
        self.step_limit
    }

    pub(crate) fn set_step_limit(&mut self, max_steps: usize) -> Result<()> {
        if max_steps == 0 {
            return Err(Error::Runtime(
                "set_timer_step_limit requires at least 1 step".into(),
            ));
        }
        self.step_limit = max_steps;
        Ok(())
    }

    pub(crate) fn schedule(&mut self, delay_ms: i64, task: TimerTask) -> i64 {
        let id = self.next_timer_id;
        self.next_timer_id += 1;
        let order = self.next_task_order;
        self.next_task_order += 1;
        self.tasks.push(ScheduledTask {
            id,
            due_at: self.now_ms.saturating_add(delay_ms.max(0)),
            order,
            task,
        });
        id
    }

    pub(crate) fn advance_to(&mut self, target_ms: i64) -> Result<()> {
        if target_ms < self.now_ms {
            return Err(Error::Runtime(format!(
                "advance_time_to requires target >= now_ms (target={target_ms}, now_ms={})",
                self.now_ms
            )));
        }
        self.now_ms = target_ms;
        Ok(())
    }

    pub(crate) fn clear(&mut self, timer_id: i64) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|task| task.id != timer_id);
        self.tasks.len() != before
    }

    pub(crate) fn clear_all(&mut self) -> usize {
        let cleared = self.tasks.len();
        self.tasks.clear();
        cleared
    }

    pub(crate) fn clear_for(&mut self, controller: ControllerId) -> usize {
        let before = self.tasks.len();
        self.tasks.retain(|task| task.task.controller != controller);
        before - self.tasks.len()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.tasks.len()
    }

    pub(crate) fn pending(&self) -> Vec<PendingTimer> {
        let mut timers = self
            .tasks
            .iter()
            .map(|task| PendingTimer {
                id: task.id,
                due_at: task.due_at,
                order: task.order,
                label: task_label(&task.task),
            })
            .collect::<Vec<_>>();
        timers.sort_by_key(|timer| (timer.due_at, timer.order));
        timers
    }

    /// Removes the earliest task due at or before `due_limit` (any task when
    /// `None`). With `advance_clock`, the clock jumps forward to its due time.
    pub(crate) fn take_next(
        &mut self,
        due_limit: Option<i64>,
        advance_clock: bool,
    ) -> Option<ScheduledTask> {
        let next_idx = self.next_task_index(due_limit)?;
        let task = self.tasks.remove(next_idx);
        if advance_clock && task.due_at > self.now_ms {
            self.now_ms = task.due_at;
        }
        Some(task)
    }

    pub(crate) fn has_next(&self, due_limit: Option<i64>) -> bool {
        self.next_task_index(due_limit).is_some()
    }

    fn next_task_index(&self, due_limit: Option<i64>) -> Option<usize> {
        self.tasks
            .iter()
            .enumerate()
            .filter(|(_, task)| due_limit.is_none_or(|limit| task.due_at <= limit))
            .min_by_key(|(_, task)| (task.due_at, task.order))
            .map(|(idx, _)| idx)
    }

    pub(crate) fn step_limit_error(&self, steps: usize, due_limit: Option<i64>) -> Error {
        let due_limit_desc = due_limit
            .map(|value| value.to_string())
            .unwrap_or_else(|| "none".into());
        let next_task_desc = self
            .next_task_index(due_limit)
            .and_then(|idx| self.tasks.get(idx))
            .map(|task| {
                format!(
                    "id={},due_at={},order={},task={}",
                    task.id,
                    task.due_at,
                    task.order,
                    task_label(&task.task)
                )
            })
            .unwrap_or_else(|| "none".into());

        Error::Runtime(format!(
            "timer queue exceeded max task steps: limit={}, steps={steps}, now_ms={}, due_limit={}, pending_tasks={}, next_task={}",
            self.step_limit,
            self.now_ms,
            due_limit_desc,
            self.tasks.len(),
            next_task_desc
        ))
    }
}

pub(crate) fn task_label(task: &TimerTask) -> String {
    match task.kind {
        TimerKind::ScrollIntoView(node) => {
            format!("scroll-into-view(controller={},node={})", task.controller.0, node.0)
        }
        TimerKind::StartupResolve => format!("startup-resolve(controller={})", task.controller.0),
    }
}
