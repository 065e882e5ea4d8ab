//! Integration tests for client-side invocation dispatch.
//!
//! These tests drive proxies end to end through a `ReceiverRegistry` backed by
//! scripted in-process receivers.

use futures::future::BoxFuture;
use futures::FutureExt;
use relay_client::{
    take_future_result, Argument, AuthConfig, ClientContext, Invocation, InvocationReceiver,
    InvocationReturn, Proxy, ReceiverRegistry, ResponseSink, Sticky, TlsContext,
    TransactionSource,
};
use relay_core::{
    Affinity, ComponentHandle, ComponentIdentifier, ComponentLocator, FaultKind,
    InvocationTimeout, MethodDescriptor, MethodKind, RelayError, ReturnShape, SessionId,
    TransactionId, ViewType,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use url::Url;

type Behavior = Arc<dyn Fn(Invocation, ResponseSink) -> BoxFuture<'static, ()> + Send + Sync>;

/// Receiver that records every invocation and replies with a scripted behavior.
struct TestReceiver {
    name: String,
    seen: Mutex<Vec<Invocation>>,
    behavior: Behavior,
}

impl TestReceiver {
    fn new(name: &str, behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            seen: Mutex::new(Vec::new()),
            behavior,
        })
    }

    /// Reports itself as weak affinity and echoes the first argument.
    fn echo(name: &'static str) -> Arc<Self> {
        Self::new(
            name,
            Arc::new(move |invocation: Invocation, sink: ResponseSink| {
                async move {
                    sink.weak_affinity(Affinity::node(name));
                    let first = invocation.arguments.first().cloned().unwrap_or(Value::Null);
                    sink.complete(Ok(first));
                }
                .boxed()
            }),
        )
    }

    fn seen(&self) -> Vec<Invocation> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl InvocationReceiver for TestReceiver {
    fn name(&self) -> &str {
        &self.name
    }

    async fn process_invocation(&self, invocation: Invocation, sink: ResponseSink) {
        self.seen.lock().unwrap().push(invocation.clone());
        (self.behavior)(invocation, sink).await;
    }
}

fn teller(affinity: Affinity) -> ComponentLocator {
    let identifier = ComponentIdentifier::new("bank", "accounts", "Teller", "").unwrap();
    ComponentLocator::stateless(ViewType::new("bank.Teller"), identifier, affinity)
}

async fn context_with(receivers: Vec<Arc<TestReceiver>>) -> (Arc<ReceiverRegistry>, Arc<ClientContext>) {
    let registry = Arc::new(ReceiverRegistry::new());
    for receiver in receivers {
        registry.register_node(receiver).await;
    }
    let context = ClientContext::builder(registry.clone()).build();
    (registry, context)
}

fn method(name: &str) -> MethodDescriptor {
    MethodDescriptor::business(name)
}

// ========================================
// Local calls
// ========================================

#[tokio::test]
async fn test_equality_through_proxies() {
    let (_registry, context) = context_with(vec![TestReceiver::echo("a")]).await;
    let first = context.create_proxy(teller(Affinity::node("a")));
    let same = context.create_proxy(teller(Affinity::node("a")));
    let elsewhere = context.create_proxy(teller(Affinity::node("b")));

    let equals = MethodDescriptor::with_kind("equals", MethodKind::Equals);
    let result = first
        .invoke(&equals, vec![Argument::Proxy(same.clone())])
        .await
        .unwrap();
    assert!(matches!(result, InvocationReturn::Bool(true)));

    let result = first
        .invoke(&equals, vec![Argument::Proxy(elsewhere)])
        .await
        .unwrap();
    assert!(matches!(result, InvocationReturn::Bool(false)));

    let result = first
        .invoke(&equals, vec![Argument::Proxy(first.asynchronous())])
        .await
        .unwrap();
    assert!(matches!(result, InvocationReturn::Bool(false)));

    let result = first.invoke(&equals, vec![Argument::Value(json!(1))]).await.unwrap();
    assert!(matches!(result, InvocationReturn::Bool(false)));

    let hash = MethodDescriptor::with_kind("hashCode", MethodKind::HashCode);
    let a = first.invoke(&hash, vec![]).await.unwrap();
    let b = same.invoke(&hash, vec![]).await.unwrap();
    match (a, b) {
        (InvocationReturn::Hash(a), InvocationReturn::Hash(b)) => assert_eq!(a, b),
        other => panic!("Expected hashes, got: {:?}", other),
    }
}

#[tokio::test]
async fn test_handles_and_primary_key() {
    let (_registry, context) = context_with(vec![TestReceiver::echo("a")]).await;
    let proxy = context.create_proxy(teller(Affinity::None));

    let get_handle = MethodDescriptor::with_kind("getHandle", MethodKind::GetHandle);
    match proxy.invoke(&get_handle, vec![]).await.unwrap() {
        InvocationReturn::Handle(handle) => assert_eq!(handle.locator(), &*proxy.locator()),
        other => panic!("Expected handle, got: {:?}", other),
    }

    let get_home = MethodDescriptor::with_kind("getHomeHandle", MethodKind::GetHomeHandle);
    let err = proxy.invoke(&get_home, vec![]).await.unwrap_err();
    assert!(matches!(err, RelayError::WrongComponentKind { .. }));

    let get_key = MethodDescriptor::with_kind("getPrimaryKey", MethodKind::GetPrimaryKey);
    let err = proxy.invoke(&get_key, vec![]).await.unwrap_err();
    assert!(matches!(err, RelayError::WrongComponentKind { .. }));

    let to_string = MethodDescriptor::with_kind("toString", MethodKind::ToString);
    match proxy.invoke(&to_string, vec![]).await.unwrap() {
        InvocationReturn::Text(text) => assert!(text.contains("Teller")),
        other => panic!("Expected text, got: {:?}", other),
    }
}

// ========================================
// Business calls
// ========================================

#[tokio::test]
async fn test_sync_call_returns_value_and_tracks_weak_affinity() {
    let receiver = TestReceiver::echo("a");
    let (_registry, context) = context_with(vec![receiver.clone()]).await;
    let proxy = context.create_proxy(teller(Affinity::None));

    let value = proxy
        .call(&method("echo"), vec![json!("hello")])
        .await
        .unwrap()
        .into_value()
        .unwrap();
    assert_eq!(value, json!("hello"));
    assert_eq!(proxy.handler().weak_affinity(), Affinity::node("a"));

    let seen = receiver.seen();
    assert_eq!(seen.len(), 1);
    // Resolved affinity is applied to this call only
    assert_eq!(*seen[0].locator.affinity(), Affinity::node("a"));
    assert_eq!(*proxy.locator().affinity(), Affinity::None);
    assert!(seen[0].blocking_caller.is_blocking());
}

#[tokio::test]
async fn test_proxy_argument_travels_as_handle() {
    let (_registry, context) = context_with(vec![TestReceiver::echo("a")]).await;
    let proxy = context.create_proxy(teller(Affinity::None));
    let other = context.create_proxy(teller(Affinity::node("b")));

    let value = proxy
        .invoke(&method("echo"), vec![Argument::Proxy(other.clone())])
        .await
        .unwrap()
        .into_value()
        .unwrap();
    let handle = ComponentHandle::from_value(value).unwrap();
    assert_eq!(handle.locator(), &*other.locator());
}

#[tokio::test]
async fn test_session_and_strong_affinity_replies_update_locator() {
    let session = SessionId::random();
    let reply_session = session.clone();
    let receiver = TestReceiver::new(
        "a",
        Arc::new(move |_invocation: Invocation, sink: ResponseSink| {
            let session = reply_session.clone();
            async move {
                sink.session(session);
                sink.strong_affinity(Affinity::node("a"));
                sink.complete(Ok(Value::Null));
            }
            .boxed()
        }),
    );
    let (_registry, context) = context_with(vec![receiver]).await;
    let proxy = context.create_proxy(teller(Affinity::None));

    proxy.call(&method("create"), vec![]).await.unwrap();

    let locator = proxy.locator();
    assert_eq!(locator.session_id(), Some(&session));
    assert_eq!(*locator.affinity(), Affinity::node("a"));

    // Replaying the same session is harmless
    proxy.call(&method("create"), vec![]).await.unwrap();
    assert_eq!(proxy.locator().session_id(), Some(&session));
}

#[tokio::test]
async fn test_conflicting_session_reply_fails_call() {
    let receiver = TestReceiver::new(
        "a",
        Arc::new(|_invocation: Invocation, sink: ResponseSink| {
            async move {
                sink.session(SessionId::random());
                sink.complete(Ok(Value::Null));
            }
            .boxed()
        }),
    );
    let (_registry, context) = context_with(vec![receiver]).await;
    let proxy = context.create_proxy(teller(Affinity::None));

    proxy.call(&method("create"), vec![]).await.unwrap();
    let committed = proxy.locator().session_id().cloned();

    let err = proxy.call(&method("create"), vec![]).await.unwrap_err();
    assert!(matches!(err, RelayError::AlreadyStateful { .. }));
    assert_eq!(proxy.locator().session_id().cloned(), committed);
}

#[tokio::test]
async fn test_proceed_async_does_not_block_again() {
    let gate = Arc::new(Notify::new());
    let receiver_gate = gate.clone();
    let receiver = TestReceiver::new(
        "a",
        Arc::new(move |invocation: Invocation, sink: ResponseSink| {
            let gate = receiver_gate.clone();
            async move {
                sink.proceed_async();
                gate.notified().await;
                sink.complete(Ok(json!(invocation.blocking_caller.is_blocking())));
            }
            .boxed()
        }),
    );
    let (_registry, context) = context_with(vec![receiver]).await;
    let proxy = context.create_proxy(teller(Affinity::None));
    let later = method("later").returning(ReturnShape::Future);

    let returned = tokio::time::timeout(Duration::from_secs(5), proxy.call(&later, vec![]))
        .await
        .expect("sync call must not wait for the result")
        .unwrap();
    let future = returned.into_future().expect("future return shape");

    gate.notify_one();
    // The caller was released before the result was produced
    assert_eq!(future.await.unwrap(), json!(false));
}

#[tokio::test]
async fn test_async_value_call_parks_future() {
    let (_registry, context) = context_with(vec![TestReceiver::echo("a")]).await;
    let proxy = context.create_proxy(teller(Affinity::None)).asynchronous();
    assert!(proxy.handler().is_async_handler());

    let returned = proxy.call(&method("echo"), vec![json!(5)]).await.unwrap();
    assert!(matches!(returned, InvocationReturn::Value(Value::Null)));

    let future = take_future_result().expect("parked future");
    assert_eq!(future.await.unwrap(), json!(5));
}

#[tokio::test]
async fn test_client_async_method_on_sync_proxy() {
    let (_registry, context) = context_with(vec![TestReceiver::echo("a")]).await;
    let proxy = context.create_proxy(teller(Affinity::None));
    let fire = method("audit").returning(ReturnShape::Future).client_async(true);

    let future = proxy
        .call(&fire, vec![json!("entry")])
        .await
        .unwrap()
        .into_future()
        .unwrap();
    assert_eq!(future.await.unwrap(), json!("entry"));
}

#[tokio::test]
async fn test_async_unit_call_discards_result() {
    let done = Arc::new(Notify::new());
    let receiver_done = done.clone();
    let receiver = TestReceiver::new(
        "a",
        Arc::new(move |_invocation: Invocation, sink: ResponseSink| {
            let done = receiver_done.clone();
            async move {
                sink.complete(Err(RelayError::Other("ignored".into())));
                done.notify_one();
            }
            .boxed()
        }),
    );
    let (_registry, context) = context_with(vec![receiver.clone()]).await;
    let proxy = context.create_proxy(teller(Affinity::None)).asynchronous();
    let notify = method("notify").returning(ReturnShape::Unit);

    let returned = proxy.call(&notify, vec![]).await.unwrap();
    assert!(returned.is_unit());

    tokio::time::timeout(Duration::from_secs(5), done.notified())
        .await
        .unwrap();
    assert_eq!(receiver.seen().len(), 1);
}

/// Wait until `check` holds, polling the shared state the handler exposes.
async fn eventually(check: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition never held");
}

/// Reports where the call landed and opens a session before completing.
fn landing(session: SessionId) -> Arc<TestReceiver> {
    TestReceiver::new(
        "a",
        Arc::new(move |_invocation: Invocation, sink: ResponseSink| {
            let session = session.clone();
            async move {
                sink.weak_affinity(Affinity::node("landed"));
                sink.session(session);
                sink.complete(Ok(json!(1)));
            }
            .boxed()
        }),
    )
}

#[tokio::test]
async fn test_dropped_future_still_applies_replies() {
    let session = SessionId::random();
    let (_registry, context) = context_with(vec![landing(session.clone())]).await;
    let proxy = context.create_proxy(teller(Affinity::None)).asynchronous();
    let later = method("later").returning(ReturnShape::Future);

    let returned = proxy.call(&later, vec![]).await.unwrap();
    drop(returned);

    let handler = proxy.handler().clone();
    eventually(|| handler.locator().session_id().is_some()).await;
    assert_eq!(proxy.locator().session_id(), Some(&session));
    assert_eq!(proxy.handler().weak_affinity(), Affinity::node("landed"));
}

#[tokio::test]
async fn test_untaken_parked_future_still_applies_replies() {
    let session = SessionId::random();
    let (_registry, context) = context_with(vec![landing(session.clone())]).await;
    let proxy = context.create_proxy(teller(Affinity::None)).asynchronous();

    let returned = proxy.call(&method("create"), vec![]).await.unwrap();
    assert!(matches!(returned, InvocationReturn::Value(Value::Null)));

    let handler = proxy.handler().clone();
    eventually(|| handler.weak_affinity() == Affinity::node("landed")).await;
    eventually(|| handler.locator().session_id() == Some(&session)).await;

    // The parked result is still there for a late taker
    let future = take_future_result().expect("parked future");
    assert_eq!(future.await.unwrap(), json!(1));
}

#[tokio::test]
async fn test_invocation_timeout_override() {
    let receiver = TestReceiver::new(
        "a",
        Arc::new(|_invocation: Invocation, _sink: ResponseSink| std::future::pending::<()>().boxed()),
    );
    let (_registry, context) = context_with(vec![receiver]).await;
    let proxy = context.create_proxy(teller(Affinity::None));
    proxy
        .handler()
        .set_invocation_timeout(InvocationTimeout::After(Duration::from_millis(50)));

    let err = proxy.call(&method("stall"), vec![]).await.unwrap_err();
    assert!(matches!(err, RelayError::Timeout(d) if d == Duration::from_millis(50)));
}

#[tokio::test]
async fn test_unresolvable_affinity_fails() {
    let (_registry, context) = context_with(vec![TestReceiver::echo("a")]).await;
    let proxy = context.create_proxy(teller(Affinity::node("missing")));
    let declares_io = method("echo").declaring(FaultKind::io());

    let err = proxy.call(&declares_io, vec![]).await.unwrap_err();
    assert!(matches!(err, RelayError::Transport { .. }));
}

#[tokio::test]
async fn test_resolution_failure_is_not_translated() {
    let (_registry, context) = context_with(vec![]).await;
    let proxy = context.create_proxy(teller(Affinity::node("missing")));

    let err = proxy.call(&method("echo"), vec![]).await.unwrap_err();
    assert!(
        matches!(err, RelayError::Transport { .. }),
        "Expected raw transport failure, got: {:?}",
        err
    );
}

// ========================================
// Failure translation
// ========================================

fn failing(kind: FaultKind) -> Arc<TestReceiver> {
    TestReceiver::new(
        "a",
        Arc::new(move |_invocation: Invocation, sink: ResponseSink| {
            let kind = kind.clone();
            async move {
                sink.complete(Err(RelayError::fault(kind, "balance is 3")));
            }
            .boxed()
        }),
    )
}

#[tokio::test]
async fn test_remote_declaration_wraps_checked_fault() {
    let overdrawn = FaultKind::checked("Overdrawn");
    let (_registry, context) = context_with(vec![failing(overdrawn)]).await;
    let proxy = context.create_proxy(teller(Affinity::None));
    let withdraw = method("withdraw").declaring(FaultKind::remote());

    match proxy.call(&withdraw, vec![json!(10)]).await.unwrap_err() {
        RelayError::Remote { cause, .. } => match *cause {
            RelayError::Application(fault) => assert_eq!(fault.kind().name(), "Overdrawn"),
            other => panic!("Expected application cause, got: {:?}", other),
        },
        other => panic!("Expected Remote, got: {:?}", other),
    }
}

#[tokio::test]
async fn test_declared_fault_and_unchecked_pass_through() {
    let banking = FaultKind::checked("Banking");
    let (_registry, context) = context_with(vec![failing(banking.extend("Overdrawn"))]).await;
    let proxy = context.create_proxy(teller(Affinity::None));

    let declared = method("withdraw").declaring(banking);
    let err = proxy.call(&declared, vec![]).await.unwrap_err();
    assert!(matches!(err, RelayError::Application(_)));

    let undeclared = method("withdraw");
    let err = proxy.call(&undeclared, vec![]).await.unwrap_err();
    assert!(matches!(err, RelayError::Business { .. }));

    let (_registry, context) =
        context_with(vec![failing(FaultKind::unchecked("IllegalState"))]).await;
    let proxy = context.create_proxy(teller(Affinity::None));
    let err = proxy.call(&undeclared, vec![]).await.unwrap_err();
    assert!(matches!(err, RelayError::Unchecked(_)));
}

// ========================================
// Credentials, attachments, transactions
// ========================================

struct FixedTransaction(TransactionId);

impl TransactionSource for FixedTransaction {
    fn current(&self) -> Option<TransactionId> {
        Some(self.0)
    }
}

#[tokio::test]
async fn test_invocation_carries_credentials_attachments_and_transaction() {
    let receiver = TestReceiver::echo("secure");
    let registry = Arc::new(ReceiverRegistry::new());
    registry.register_node(receiver.clone()).await;
    let uri = Url::parse("relays://clerk@bank.example:4447").unwrap();
    registry.bind_uri("secure", uri.clone()).await.unwrap();

    let transaction = TransactionId::random();
    let context = ClientContext::builder(registry)
        .transactions(Arc::new(FixedTransaction(transaction)))
        .build();

    let dynamic = context.create_proxy(teller(Affinity::Uri(uri.clone())));
    dynamic.handler().put_attachment("tenant", json!("acme"));
    dynamic.call(&method("echo"), vec![]).await.unwrap();

    let fixed = context.create_proxy_with(
        teller(Affinity::Uri(uri)),
        Sticky::Fixed(AuthConfig::principal("auditor", "DIGEST")),
        Sticky::Fixed(TlsContext::new("pinned").with_verify_peer(false)),
    );
    fixed.call(&method("echo"), vec![]).await.unwrap();

    let seen = receiver.seen();
    assert_eq!(seen[0].authentication.principal_name(), Some("clerk"));
    assert_eq!(seen[0].tls.as_ref().unwrap().profile(), "relays-default");
    assert_eq!(seen[0].attachments.get("tenant"), Some(&json!("acme")));
    assert_eq!(seen[0].transaction, Some(transaction));

    assert_eq!(seen[1].authentication.principal_name(), Some("auditor"));
    assert_eq!(seen[1].tls.as_ref().unwrap().profile(), "pinned");
    assert!(seen[1].attachments.is_empty());
}

#[tokio::test]
async fn test_weak_affinity_hint_reaches_receiver() {
    let a = TestReceiver::echo("a");
    let b = TestReceiver::echo("b");
    let (_registry, context) = context_with(vec![a.clone(), b.clone()]).await;
    let proxy = context.create_proxy(teller(Affinity::None));
    proxy.handler().set_weak_affinity(Affinity::node("b"));

    proxy.call(&method("echo"), vec![]).await.unwrap();

    assert!(a.seen().is_empty());
    assert_eq!(b.seen()[0].weak_affinity, Affinity::node("b"));
}

// ========================================
// Concurrency
// ========================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_strong_affinity_updates() {
    let (_registry, context) = context_with(vec![TestReceiver::echo("a")]).await;
    let proxy = context.create_proxy(teller(Affinity::node("start")));

    let mut tasks = Vec::new();
    for i in 0..32 {
        let handler = proxy.handler().clone();
        tasks.push(tokio::spawn(async move {
            handler.set_strong_affinity(Affinity::node(format!("n{}", i)));
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let fin = proxy.locator().affinity().clone();
    let candidates: Vec<Affinity> = (0..32).map(|i| Affinity::node(format!("n{}", i))).collect();
    assert!(candidates.contains(&fin));

    // Stale expectations lose
    assert!(!proxy
        .handler()
        .compare_and_set_strong_affinity(&Affinity::node("start"), &Affinity::node("late")));
    assert_eq!(*proxy.locator().affinity(), fin);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_compare_and_set_has_single_winner() {
    let (_registry, context) = context_with(vec![TestReceiver::echo("a")]).await;
    let proxy = context.create_proxy(teller(Affinity::node("a")));

    let mut tasks = Vec::new();
    for i in 0..16 {
        let handler = proxy.handler().clone();
        tasks.push(tokio::spawn(async move {
            handler.compare_and_set_strong_affinity(
                &Affinity::node("a"),
                &Affinity::node(format!("w{}", i)),
            )
        }));
    }
    let mut winners = 0;
    for task in tasks {
        if task.await.unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_calls_through_one_proxy() {
    let (_registry, context) = context_with(vec![TestReceiver::echo("a"), TestReceiver::echo("b")]).await;
    let proxy: Proxy = context.create_proxy(teller(Affinity::None));

    let mut tasks = Vec::new();
    for i in 0..64 {
        let proxy = proxy.clone();
        tasks.push(tokio::spawn(async move {
            proxy
                .call(&method("echo"), vec![json!(i)])
                .await
                .and_then(|r| r.into_value())
        }));
    }
    for (i, task) in tasks.into_iter().enumerate() {
        assert_eq!(task.await.unwrap().unwrap(), json!(i));
    }
}
