//! Request lifecycle tracking.
//!
//! Every request moves Pending -> Running -> one of Completed, Cancelled or
//! Failed. Cancellation of a finished request is ignored. A running request
//! whose future is dropped (the protocol layer does this on
//! `$/cancelRequest`) ends up Cancelled.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::workspace::EngineError;

/// Finished requests remembered for late cancellations and state queries.
const FINISHED_CAPACITY: usize = 256;

pub type RequestId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Pending,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl RequestState {
    pub fn is_finished(self) -> bool {
        matches!(
            self,
            RequestState::Completed | RequestState::Cancelled | RequestState::Failed
        )
    }
}

struct Active {
    state: RequestState,
    token: CancellationToken,
}

#[derive(Default)]
struct RequestTable {
    next_id: RequestId,
    active: HashMap<RequestId, Active>,
    finished: VecDeque<(RequestId, RequestState)>,
}

pub struct Dispatcher {
    requests: Mutex<RequestTable>,
    /// Serializes workspace mutations.
    mutations: Mutex<()>,
    timeout: Option<Duration>,
}

/// Marks a running request Cancelled if its future is dropped before it
/// finishes.
struct RunGuard<'d> {
    dispatcher: &'d Dispatcher,
    id: RequestId,
    token: CancellationToken,
    done: bool,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.token.cancel();
            self.dispatcher.finish(self.id, RequestState::Cancelled);
        }
    }
}

impl Dispatcher {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            requests: Mutex::new(RequestTable::default()),
            mutations: Mutex::new(()),
            timeout,
        }
    }

    /// Registers a new request in the Pending state.
    pub fn register(&self) -> RequestId {
        let mut table = self.requests.lock();
        let id = table.next_id;
        table.next_id += 1;
        table.active.insert(
            id,
            Active {
                state: RequestState::Pending,
                token: CancellationToken::new(),
            },
        );
        id
    }

    pub fn state(&self, id: RequestId) -> Option<RequestState> {
        let table = self.requests.lock();
        if let Some(active) = table.active.get(&id) {
            return Some(active.state);
        }
        table
            .finished
            .iter()
            .find(|(finished, _)| *finished == id)
            .map(|(_, state)| *state)
    }

    /// Cancels a Pending or Running request. Returns false when the request
    /// is unknown or already finished.
    pub fn cancel(&self, id: RequestId) -> bool {
        let token = {
            let table = self.requests.lock();
            match table.active.get(&id) {
                Some(active) => active.token.clone(),
                None => {
                    debug!(request = id, "late cancellation ignored");
                    return false;
                }
            }
        };
        token.cancel();
        self.finish(id, RequestState::Cancelled);
        true
    }

    /// Applies a workspace mutation. Mutations run one at a time, in call
    /// order.
    pub fn apply<R>(&self, mutation: impl FnOnce() -> R) -> R {
        let _serial = self.mutations.lock();
        mutation()
    }

    /// Runs request `id`, handing the query its cancellation token.
    pub async fn run<T, F, Fut>(&self, id: RequestId, query: F) -> Result<T, EngineError>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T, EngineError>>,
    {
        let Some(token) = self.start(id) else {
            return Err(EngineError::Cancelled);
        };
        let mut guard = RunGuard {
            dispatcher: self,
            id,
            token: token.clone(),
            done: false,
        };

        let work = query(token.clone());
        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => Err(EngineError::Cancelled),
            result = with_deadline(self.timeout, work) => result,
        };

        guard.done = true;
        let state = match &outcome {
            Ok(_) => RequestState::Completed,
            Err(EngineError::Cancelled) => RequestState::Cancelled,
            Err(_) => RequestState::Failed,
        };
        self.finish(id, state);
        outcome
    }

    /// Registers and runs a request in one step.
    pub async fn dispatch<T, F, Fut>(&self, query: F) -> Result<T, EngineError>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T, EngineError>>,
    {
        let id = self.register();
        self.run(id, query).await
    }

    /// Pending -> Running. `None` if the request was cancelled meanwhile.
    fn start(&self, id: RequestId) -> Option<CancellationToken> {
        let mut table = self.requests.lock();
        let active = table.active.get_mut(&id)?;
        if active.state != RequestState::Pending || active.token.is_cancelled() {
            return None;
        }
        active.state = RequestState::Running;
        Some(active.token.clone())
    }

    fn finish(&self, id: RequestId, state: RequestState) {
        let mut table = self.requests.lock();
        if table.active.remove(&id).is_none() {
            return;
        }
        debug!(request = id, ?state, "request finished");
        table.finished.push_back((id, state));
        if table.finished.len() > FINISHED_CAPACITY {
            table.finished.pop_front();
        }
    }
}

async fn with_deadline<T>(
    timeout: Option<Duration>,
    work: impl Future<Output = Result<T, EngineError>>,
) -> Result<T, EngineError> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, work)
            .await
            .unwrap_or(Err(EngineError::Timeout(limit))),
        None => work.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn completed_requests_ignore_late_cancellation() {
        let dispatcher = Dispatcher::new(None);
        let id = dispatcher.register();
        assert_eq!(dispatcher.state(id), Some(RequestState::Pending));

        let value = dispatcher.run(id, |_| async { Ok(7) }).await;
        assert_eq!(value, Ok(7));
        assert_eq!(dispatcher.state(id), Some(RequestState::Completed));

        assert!(!dispatcher.cancel(id));
        assert_eq!(dispatcher.state(id), Some(RequestState::Completed));
        assert!(RequestState::Completed.is_finished());
        assert!(!RequestState::Running.is_finished());
    }

    #[tokio::test]
    async fn pending_requests_can_be_cancelled_before_running() {
        let dispatcher = Dispatcher::new(None);
        let id = dispatcher.register();
        assert!(dispatcher.cancel(id));

        let ran = std::sync::atomic::AtomicBool::new(false);
        let result = dispatcher
            .run(id, |_| async {
                ran.store(true, std::sync::atomic::Ordering::SeqCst);
                Ok(())
            })
            .await;
        assert_eq!(result, Err(EngineError::Cancelled));
        assert!(!ran.load(std::sync::atomic::Ordering::SeqCst));
        assert_eq!(dispatcher.state(id), Some(RequestState::Cancelled));
    }

    #[tokio::test]
    async fn failing_queries_end_failed() {
        let dispatcher = Dispatcher::new(None);
        let result: Result<(), _> = dispatcher
            .dispatch(|_| async {
                Err(EngineError::Resolution(
                    crate::build::ResolutionError::NotFound("x".to_string()),
                ))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(dispatcher.state(0), Some(RequestState::Failed));
    }

    #[tokio::test]
    async fn deadline_turns_slow_requests_into_failures() {
        let dispatcher = Dispatcher::new(Some(Duration::from_millis(50)));
        let result: Result<(), _> = dispatcher
            .dispatch(|_| async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            })
            .await;
        assert_eq!(
            result,
            Err(EngineError::Timeout(Duration::from_millis(50)))
        );
        assert_eq!(dispatcher.state(0), Some(RequestState::Failed));
    }

    #[tokio::test]
    async fn dropped_requests_end_cancelled() {
        let dispatcher = Dispatcher::new(None);
        let id = dispatcher.register();
        {
            let running = dispatcher.run(id, |token| async move {
                token.cancelled().await;
                Ok::<_, EngineError>(())
            });
            // Polling once moves the request to Running.
            let mut running = Box::pin(running);
            assert!(futures::poll!(running.as_mut()).is_pending());
            assert_eq!(dispatcher.state(id), Some(RequestState::Running));
        }
        assert_eq!(dispatcher.state(id), Some(RequestState::Cancelled));
    }

    #[test]
    fn finished_history_is_bounded() {
        let dispatcher = Dispatcher::new(None);
        for _ in 0..FINISHED_CAPACITY + 10 {
            let id = dispatcher.register();
            dispatcher.cancel(id);
        }
        assert_eq!(dispatcher.state(0), None);
        assert_eq!(
            dispatcher.state((FINISHED_CAPACITY + 9) as RequestId),
            Some(RequestState::Cancelled)
        );
    }
}
