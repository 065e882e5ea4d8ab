//! Per-call invocation context.
//!
//! An [`InvocationContext`] carries one in-flight call: it hands the
//! [`Invocation`] to the chosen [`InvocationReceiver`], then consumes the
//! receiver's [`Reply`] stream. Replies may update the owning handler's weak
//! affinity, strong affinity or session before the call settles; a
//! `ProceedAsync` reply tells a synchronous caller to stop waiting and take the
//! asynchronous path instead.
//!
//! # Lifecycle
//!
//! ```text
//! new -> send_request -> await_response -> (Completed | Pending)
//!                      \-> future_response | discard_result
//! ```

use crate::handler::InvocationHandler;
use crate::sticky::{AuthConfig, TlsContext};
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use relay_core::{
    Affinity, ComponentLocator, MethodDescriptor, RelayError, Result, SessionId, TransactionId,
};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Result of waiting synchronously on a call.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    /// The call finished with this value.
    Completed(T),
    /// The remote side accepted the call and will finish it later.
    Pending,
}

/// Shared "is the caller blocked on this call" flag.
///
/// The flag starts set and is cleared once the client moves to the
/// asynchronous path, so the serving side can observe the change mid-call.
#[derive(Debug, Clone)]
pub struct BlockingCaller(Arc<AtomicBool>);

impl BlockingCaller {
    pub fn new(blocking: bool) -> Self {
        Self(Arc::new(AtomicBool::new(blocking)))
    }

    pub fn is_blocking(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn set(&self, blocking: bool) {
        self.0.store(blocking, Ordering::Release);
    }
}

/// Everything a receiver needs to carry out one call.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub id: u64,
    /// Locator rewritten to the affinity resolved for this call.
    pub locator: ComponentLocator,
    pub method: MethodDescriptor,
    pub arguments: Vec<Value>,
    /// Advisory hint for the serving side.
    pub weak_affinity: Affinity,
    pub authentication: AuthConfig,
    pub tls: Option<TlsContext>,
    pub transaction: Option<TransactionId>,
    pub attachments: HashMap<String, Value>,
    pub blocking_caller: BlockingCaller,
}

/// A message from the serving side about an in-flight call.
#[derive(Debug)]
pub enum Reply {
    /// Where the call actually landed.
    WeakAffinity(Affinity),
    /// Commit a new strong affinity to the proxy.
    StrongAffinity(Affinity),
    /// The call created (or joined) a session.
    Session(SessionId),
    /// Stop blocking; the result follows later.
    ProceedAsync,
    /// Final result.
    Done(Result<Value>),
}

/// Sending half of a call's reply stream.
#[derive(Debug, Clone)]
pub struct ResponseSink {
    tx: mpsc::UnboundedSender<Reply>,
}

impl ResponseSink {
    /// A sink and the stream of replies sent through it.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Reply>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Send a reply. Returns false if the caller no longer listens.
    pub fn send(&self, reply: Reply) -> bool {
        self.tx.send(reply).is_ok()
    }

    pub fn weak_affinity(&self, affinity: Affinity) -> bool {
        self.send(Reply::WeakAffinity(affinity))
    }

    pub fn strong_affinity(&self, affinity: Affinity) -> bool {
        self.send(Reply::StrongAffinity(affinity))
    }

    pub fn session(&self, session: SessionId) -> bool {
        self.send(Reply::Session(session))
    }

    pub fn proceed_async(&self) -> bool {
        self.send(Reply::ProceedAsync)
    }

    pub fn complete(&self, result: Result<Value>) -> bool {
        self.send(Reply::Done(result))
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// A concrete endpoint that can carry out invocations.
///
/// Transports implement this; the located-action runner picks one per call.
#[async_trait]
pub trait InvocationReceiver: Send + Sync + 'static {
    /// Node name of the endpoint.
    fn name(&self) -> &str;

    /// Carry out `invocation`, reporting through `sink`.
    ///
    /// Must end with exactly one `complete` unless the caller went away.
    async fn process_invocation(&self, invocation: Invocation, sink: ResponseSink);
}

/// A value that will be available once the remote call completes.
pub struct ResponseFuture {
    inner: BoxFuture<'static, Result<Value>>,
}

impl ResponseFuture {
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = Result<Value>> + Send + 'static,
    {
        Self {
            inner: future.boxed(),
        }
    }

    /// An already-completed future.
    pub fn ready(result: Result<Value>) -> Self {
        Self::new(futures::future::ready(result))
    }
}

impl Future for ResponseFuture {
    type Output = Result<Value>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.poll_unpin(cx)
    }
}

impl fmt::Debug for ResponseFuture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseFuture").finish_non_exhaustive()
    }
}

enum Step {
    Continue,
    ProceedAsync,
    Done(Result<Value>),
}

fn apply(handler: &InvocationHandler, reply: Reply) -> Step {
    match reply {
        Reply::WeakAffinity(affinity) => {
            handler.set_weak_affinity(affinity);
            Step::Continue
        }
        Reply::StrongAffinity(affinity) => {
            handler.set_strong_affinity(affinity);
            Step::Continue
        }
        Reply::Session(session) => match handler.set_session_id(session) {
            Ok(()) => Step::Continue,
            Err(e) => Step::Done(Err(e)),
        },
        Reply::ProceedAsync => Step::ProceedAsync,
        Reply::Done(result) => Step::Done(result),
    }
}

fn receiver_gone(id: u64) -> RelayError {
    RelayError::Transport {
        message: format!("Receiver closed invocation {} without a response", id),
    }
}

/// Drain replies until the final result, ignoring proceed-async markers.
async fn drain(
    handler: &InvocationHandler,
    replies: &mut mpsc::UnboundedReceiver<Reply>,
    id: u64,
) -> Result<Value> {
    while let Some(reply) = replies.recv().await {
        if let Step::Done(result) = apply(handler, reply) {
            return result;
        }
    }
    Err(receiver_gone(id))
}

/// Lifecycle of a single in-flight call.
pub struct InvocationContext {
    handler: Arc<InvocationHandler>,
    receiver: Arc<dyn InvocationReceiver>,
    invocation: Invocation,
    sink: Option<ResponseSink>,
    replies: mpsc::UnboundedReceiver<Reply>,
    timeout: Duration,
}

impl InvocationContext {
    /// Create a context for `invocation`, bound to the endpoint `receiver`.
    pub fn new(
        handler: Arc<InvocationHandler>,
        receiver: Arc<dyn InvocationReceiver>,
        invocation: Invocation,
        timeout: Duration,
    ) -> Self {
        let (sink, replies) = ResponseSink::channel();
        Self {
            handler,
            receiver,
            invocation,
            sink: Some(sink),
            replies,
            timeout,
        }
    }

    pub fn invocation(&self) -> &Invocation {
        &self.invocation
    }

    pub fn receiver_name(&self) -> &str {
        self.receiver.name()
    }

    pub fn set_blocking_caller(&self, blocking: bool) {
        self.invocation.blocking_caller.set(blocking);
    }

    /// Hand the invocation to the receiver. Can only be done once.
    ///
    /// The receiver runs on its own task so the caller is never tied to
    /// transport I/O.
    pub fn send_request(&mut self) -> Result<()> {
        let sink = self.sink.take().ok_or_else(|| {
            RelayError::Other(format!("Invocation {} was already sent", self.invocation.id))
        })?;
        let receiver = self.receiver.clone();
        let invocation = self.invocation.clone();

        debug!(
            "Sending invocation {} ({}) to {}",
            invocation.id,
            invocation.method.name(),
            receiver.name()
        );

        tokio::spawn(async move {
            receiver.process_invocation(invocation, sink).await;
        });
        Ok(())
    }

    /// Wait for the call to settle, bounded by the invocation timeout.
    pub async fn await_response(&mut self) -> Result<Outcome<Value>> {
        let timeout = self.timeout;
        let id = self.invocation.id;
        let handler = &self.handler;
        let replies = &mut self.replies;

        let waited = tokio::time::timeout(timeout, async {
            while let Some(reply) = replies.recv().await {
                match apply(handler, reply) {
                    Step::Continue => continue,
                    Step::ProceedAsync => return Ok(Outcome::Pending),
                    Step::Done(result) => return result.map(Outcome::Completed),
                }
            }
            Err(receiver_gone(id))
        })
        .await;

        waited.map_err(|_| RelayError::Timeout(timeout))?
    }

    /// Consume the remaining replies on a separate task.
    ///
    /// Affinity and session updates reach the handler as they arrive, whether
    /// or not anyone waits for the result.
    fn settle(self) -> JoinHandle<Result<Value>> {
        let InvocationContext {
            handler,
            invocation,
            mut replies,
            ..
        } = self;
        let id = invocation.id;
        tokio::spawn(async move { drain(&handler, &mut replies, id).await })
    }

    /// Future of the eventual result.
    ///
    /// Dropping the future does not stop the call from settling.
    pub fn future_response(self) -> ResponseFuture {
        let id = self.invocation.id;
        let settling = self.settle();
        ResponseFuture::new(async move {
            settling.await.map_err(|e| {
                RelayError::Other(format!("Invocation {} was abandoned: {}", id, e))
            })?
        })
    }

    /// Let the call finish in the background. Failures are logged, not returned.
    pub fn discard_result(self) {
        let method = self.invocation.method.name().to_string();
        let settling = self.settle();
        tokio::spawn(async move {
            match settling.await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => warn!("Discarded result of {} failed: {}", method, e),
                Err(e) => warn!("Discarded call to {} was abandoned: {}", method, e),
            }
        });
    }
}

impl fmt::Debug for InvocationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvocationContext")
            .field("id", &self.invocation.id)
            .field("method", &self.invocation.method.name())
            .field("receiver", &self.receiver.name())
            .field("sent", &self.sink.is_none())
            .finish()
    }
}
