//! Execution ledger: single-flight memo of tool outcomes per owner.

use concierge_tools::ToolError;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use tracing::error;

pub type Outcome = Result<Value, ToolError>;

type LedgerKey = (String, String);
type SharedOutcome = Shared<BoxFuture<'static, Outcome>>;

struct LedgerInner {
    entries: HashMap<LedgerKey, SharedOutcome>,
    order: VecDeque<LedgerKey>,
}

/// Memoizes tool executions by `(owner_key, tool_call_id)`.
///
/// The first caller for a key spawns the execution; everyone else, including
/// a retried request arriving after it finished, awaits the same outcome.
/// The execution runs in its own task, so it completes even if every caller
/// stops waiting.
pub struct ExecutionLedger {
    capacity: usize,
    inner: Mutex<LedgerInner>,
}

impl ExecutionLedger {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(LedgerInner {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    /// Returns the outcome and whether this call started the execution.
    pub async fn run_once<F, Fut>(
        &self,
        owner_key: &str,
        tool_call_id: &str,
        execute: F,
    ) -> (Outcome, bool)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Outcome> + Send + 'static,
    {
        let key = (owner_key.to_string(), tool_call_id.to_string());
        let (shared, fresh) = {
            let mut inner = self.inner.lock();
            match inner.entries.get(&key) {
                Some(existing) => (existing.clone(), false),
                None => {
                    let handle = tokio::spawn(execute());
                    let shared = async move {
                        handle.await.unwrap_or_else(|e| {
                            error!("Execution task failed: {}", e);
                            Err(ToolError::Internal)
                        })
                    }
                    .boxed()
                    .shared();
                    inner.entries.insert(key.clone(), shared.clone());
                    inner.order.push_back(key);
                    while inner.order.len() > self.capacity {
                        if let Some(oldest) = inner.order.pop_front() {
                            inner.entries.remove(&oldest);
                        }
                    }
                    (shared, true)
                }
            }
        };
        (shared.await, fresh)
    }

    pub fn contains(&self, owner_key: &str, tool_call_id: &str) -> bool {
        self.inner
            .lock()
            .entries
            .contains_key(&(owner_key.to_string(), tool_call_id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
