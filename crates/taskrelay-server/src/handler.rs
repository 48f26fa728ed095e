use std::future::Future;
use std::sync::Arc;

use taskrelay_task::{HandlerError, Task};

use crate::completion::Completion;

/// Receives every normalized task together with its reply channel.
///
/// `handle` runs on the connection's reader; it must not block. Long-running
/// work should be moved onto its own task and complete from there. Dropping
/// the [`Completion`] without calling it skips the reply.
pub trait TaskHandler: Send + Sync + 'static {
    fn handle(&self, task: Task, completion: Completion);
}

impl<F> TaskHandler for F
where
    F: Fn(Task, Completion) + Send + Sync + 'static,
{
    fn handle(&self, task: Task, completion: Completion) {
        self(task, completion)
    }
}

/// A handler shared by every connection of a server.
pub type SharedHandler = Arc<dyn TaskHandler>;

/// Adapts an async function into a [`TaskHandler`].
///
/// Each task runs on its own tokio task; the future's output becomes the reply.
pub struct AsyncHandler<F> {
    f: F,
}

impl<F, Fut> TaskHandler for AsyncHandler<F>
where
    F: Fn(Task) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Task, HandlerError>> + Send + 'static,
{
    fn handle(&self, task: Task, completion: Completion) {
        let fut = (self.f)(task);
        tokio::spawn(async move {
            completion.complete(fut.await);
        });
    }
}

/// Wrap an async function as a [`SharedHandler`].
pub fn from_async<F, Fut>(f: F) -> SharedHandler
where
    F: Fn(Task) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Task, HandlerError>> + Send + 'static,
{
    Arc::new(AsyncHandler { f })
}
