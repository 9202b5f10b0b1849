//! Join handles for the reader and writer loops.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::task::JoinHandle;

use crate::core::RpcError;

/// A spawned loop whose result can be awaited.
///
/// A panicked or aborted task resolves to [`RpcError::Task`].
#[derive(Debug)]
pub struct LoopHandle {
    name: &'static str,
    handle: JoinHandle<Result<(), RpcError>>,
}

impl LoopHandle {
    /// Spawn `future` on the current runtime.
    pub fn spawn<F>(name: &'static str, future: F) -> Self
    where
        F: Future<Output = Result<(), RpcError>> + Send + 'static,
    {
        Self {
            name,
            handle: tokio::spawn(future),
        }
    }

    /// Loop name used in logs.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Abort the loop at its next suspension point.
    pub fn abort(&self) {
        self.handle.abort();
    }
}

impl Future for LoopHandle {
    type Output = Result<(), RpcError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.handle).poll(cx).map(|joined| match joined {
            Ok(result) => result,
            Err(e) => Err(RpcError::Task(e.to_string())),
        })
    }
}
