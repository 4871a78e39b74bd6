//! Per-task and per-thread context stacks.
//!
//! Every stack has three backing stores, tried in order:
//!
//! 1. Inside [`scope`] (or [`sync_scope`]) the task-local store, so a future
//!    sees its own stack no matter which worker thread polls it.
//! 2. Inside any other tokio task a shared map keyed by the task id. A task
//!    started with plain `tokio::spawn` still gets a stack of its own, and
//!    keeps it when the scheduler moves it to another worker.
//! 3. Everywhere else (plain threads, `block_on`) the thread-local store.
//!
//! [`spawn`] starts a task inside its own [`scope`], which avoids the shared
//! map and its lock.

use super::{AppContext, RequestContext};
use crate::error::{ContextError, ContextKind, Result};
use std::cell::RefCell;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, LazyLock, Mutex, PoisonError};
use tokio::task::Id as TaskId;

type TaskStacks<T> = LazyLock<Mutex<HashMap<TaskId, Vec<T>>>>;

tokio::task_local! {
    static TASK_APP: RefCell<Vec<Arc<AppContext>>>;
    static TASK_REQUEST: RefCell<Vec<Arc<RequestContext>>>;
}

static SPAWNED_APP: TaskStacks<Arc<AppContext>> = LazyLock::new(|| Mutex::new(HashMap::new()));
static SPAWNED_REQUEST: TaskStacks<Arc<RequestContext>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

thread_local! {
    static THREAD_APP: RefCell<Vec<Arc<AppContext>>> = const { RefCell::new(Vec::new()) };
    static THREAD_REQUEST: RefCell<Vec<Arc<RequestContext>>> = const { RefCell::new(Vec::new()) };
}

/// The application context stack.
pub static APP_STACK: ContextStack<Arc<AppContext>> =
    ContextStack::new(ContextKind::Application, &TASK_APP, &SPAWNED_APP, &THREAD_APP);

/// The request context stack.
pub static REQUEST_STACK: ContextStack<Arc<RequestContext>> =
    ContextStack::new(ContextKind::Request, &TASK_REQUEST, &SPAWNED_REQUEST, &THREAD_REQUEST);

/// A LIFO stack of contexts, private to the current task or thread.
pub struct ContextStack<T: 'static> {
    kind: ContextKind,
    task: &'static tokio::task::LocalKey<RefCell<Vec<T>>>,
    spawned: &'static TaskStacks<T>,
    thread: &'static std::thread::LocalKey<RefCell<Vec<T>>>,
}

impl<T: 'static> std::fmt::Debug for ContextStack<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextStack")
            .field("kind", &self.kind)
            .field("len", &self.len())
            .finish()
    }
}

impl<T: 'static> ContextStack<T> {
    const fn new(
        kind: ContextKind,
        task: &'static tokio::task::LocalKey<RefCell<Vec<T>>>,
        spawned: &'static TaskStacks<T>,
        thread: &'static std::thread::LocalKey<RefCell<Vec<T>>>,
    ) -> Self {
        Self {
            kind,
            task,
            spawned,
            thread,
        }
    }

    /// Which context kind this stack holds.
    #[must_use]
    pub const fn kind(&self) -> ContextKind {
        self.kind
    }

    fn with<R>(&self, mut f: impl FnMut(&mut Vec<T>) -> R) -> R {
        if let Ok(result) = self.task.try_with(|cell| f(&mut *cell.borrow_mut())) {
            return result;
        }
        match tokio::task::try_id() {
            Some(id) => self.with_spawned(id, f),
            None => self.thread.with(|cell| f(&mut *cell.borrow_mut())),
        }
    }

    fn with_spawned<R>(&self, id: TaskId, f: impl FnOnce(&mut Vec<T>) -> R) -> R {
        let mut stacks = self.spawned.lock().unwrap_or_else(PoisonError::into_inner);
        let stack = stacks.entry(id).or_default();
        let result = f(stack);
        // Drop emptied entries so finished tasks leave nothing behind.
        if stack.is_empty() {
            stacks.remove(&id);
        }
        result
    }

    /// Push `item` on top.
    pub fn push(&self, item: T) {
        let mut item = Some(item);
        self.with(|stack| {
            if let Some(item) = item.take() {
                stack.push(item);
            }
        });
    }

    /// Remove and return the top item.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::EmptyStack`] if the stack is empty.
    pub fn pop(&self) -> Result<T> {
        self.with(Vec::pop)
            .ok_or(ContextError::EmptyStack { stack: self.kind })
    }

    /// Remove and return the top item if `expected` accepts it.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::EmptyStack`] if the stack is empty and
    /// [`ContextError::ContextMismatch`] if the top is rejected. The stack is
    /// left unchanged in both cases.
    pub fn pop_if(&self, expected: impl Fn(&T) -> bool) -> Result<T> {
        self.with(|stack| match stack.last() {
            None => Err(ContextError::EmptyStack { stack: self.kind }),
            Some(top) if !expected(top) => Err(ContextError::ContextMismatch { stack: self.kind }),
            Some(_) => stack
                .pop()
                .ok_or(ContextError::EmptyStack { stack: self.kind }),
        })
    }

    /// Number of items on the stack.
    #[must_use]
    pub fn len(&self) -> usize {
        self.with(|stack| stack.len())
    }

    /// Whether the stack is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone + 'static> ContextStack<T> {
    /// The top item, or `None` on an empty stack.
    #[must_use]
    pub fn top(&self) -> Option<T> {
        self.with(|stack| stack.last().cloned())
    }
}

/// Run `fut` with fresh, empty task-local stacks.
pub async fn scope<F: Future>(fut: F) -> F::Output {
    TASK_APP
        .scope(
            RefCell::new(Vec::new()),
            TASK_REQUEST.scope(RefCell::new(Vec::new()), fut),
        )
        .await
}

/// Run `f` with fresh, empty task-local stacks.
pub fn sync_scope<R>(f: impl FnOnce() -> R) -> R {
    TASK_APP.sync_scope(RefCell::new(Vec::new()), || {
        TASK_REQUEST.sync_scope(RefCell::new(Vec::new()), f)
    })
}

/// Spawn `fut` on the tokio runtime inside its own [`scope`].
pub fn spawn<F>(fut: F) -> tokio::task::JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::spawn(scope(fut))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    tokio::task_local! {
        static TASK_NUMBERS: RefCell<Vec<u32>>;
    }

    static SPAWNED_NUMBERS: TaskStacks<u32> = LazyLock::new(|| Mutex::new(HashMap::new()));

    thread_local! {
        static THREAD_NUMBERS: RefCell<Vec<u32>> = const { RefCell::new(Vec::new()) };
    }

    static NUMBERS: ContextStack<u32> = ContextStack::new(
        ContextKind::Request,
        &TASK_NUMBERS,
        &SPAWNED_NUMBERS,
        &THREAD_NUMBERS,
    );

    #[test]
    fn test_lifo_order() {
        NUMBERS.push(1);
        NUMBERS.push(2);
        assert_eq!(NUMBERS.top(), Some(2));
        assert_eq!(NUMBERS.pop().unwrap(), 2);
        assert_eq!(NUMBERS.pop().unwrap(), 1);
        assert_eq!(NUMBERS.top(), None);
    }

    #[test]
    fn test_pop_empty_fails() {
        assert_eq!(
            NUMBERS.pop(),
            Err(ContextError::EmptyStack {
                stack: ContextKind::Request
            })
        );
    }

    #[test]
    fn test_pop_if_leaves_stack_on_mismatch() {
        NUMBERS.push(7);
        assert!(matches!(
            NUMBERS.pop_if(|n| *n == 8),
            Err(ContextError::ContextMismatch { .. })
        ));
        assert_eq!(NUMBERS.len(), 1);
        assert_eq!(NUMBERS.pop_if(|n| *n == 7).unwrap(), 7);
        assert!(NUMBERS.is_empty());
    }

    #[test]
    fn test_threads_do_not_share() {
        NUMBERS.push(1);
        let seen = std::thread::spawn(|| NUMBERS.top()).join().unwrap();
        assert_eq!(seen, None);
        assert_eq!(NUMBERS.pop().unwrap(), 1);
    }

    #[test]
    fn test_sync_scope_hides_thread_stack() {
        THREAD_NUMBERS.with(|cell| cell.borrow_mut().push(5));
        TASK_NUMBERS.sync_scope(RefCell::new(Vec::new()), || {
            assert!(NUMBERS.is_empty());
            NUMBERS.push(9);
            assert_eq!(NUMBERS.top(), Some(9));
        });
        assert_eq!(NUMBERS.pop().unwrap(), 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_scoped_tasks_do_not_share() {
        let tasks: Vec<_> = (0..8u32)
            .map(|n| {
                tokio::spawn(TASK_NUMBERS.scope(RefCell::new(Vec::new()), async move {
                    NUMBERS.push(n);
                    tokio::task::yield_now().await;
                    let top = NUMBERS.top();
                    let len = NUMBERS.len();
                    NUMBERS.pop().unwrap();
                    (n, top, len)
                }))
            })
            .collect();

        for task in tasks {
            let (n, top, len) = task.await.unwrap();
            assert_eq!(top, Some(n));
            assert_eq!(len, 1);
        }
    }

    #[tokio::test]
    async fn test_unscoped_tasks_on_one_thread_do_not_share() {
        let tasks: Vec<_> = (0..4u32)
            .map(|n| {
                tokio::spawn(async move {
                    NUMBERS.push(n);
                    tokio::task::yield_now().await;
                    tokio::task::yield_now().await;
                    let seen = (NUMBERS.top(), NUMBERS.len());
                    NUMBERS.pop_if(|top| *top == n).unwrap();
                    (seen, NUMBERS.is_empty())
                })
            })
            .collect();

        for (n, task) in (0..4u32).zip(tasks) {
            assert_eq!(task.await.unwrap(), ((Some(n), 1), true));
        }
        assert!(NUMBERS.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_unscoped_task_keeps_stack_across_workers() {
        let tasks: Vec<_> = (0..8u32)
            .map(|n| {
                tokio::spawn(async move {
                    NUMBERS.push(n);
                    for _ in 0..4 {
                        tokio::task::yield_now().await;
                        assert_eq!(NUMBERS.top(), Some(n));
                    }
                    NUMBERS.pop().unwrap()
                })
            })
            .collect();

        for (n, task) in (0..8u32).zip(tasks) {
            assert_eq!(task.await.unwrap(), n);
        }
    }
}
