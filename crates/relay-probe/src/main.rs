//! Relay Probe - drives proxies against loopback nodes.
//!
//! Deploys a stateful counter and a stateless echo component on a handful of
//! in-process nodes, then fires concurrent calls through one proxy of each and
//! reports where the proxies ended up.

mod components;

use anyhow::{Context, Result};
use clap::Parser;
use futures::stream::{self, StreamExt};
use relay_client::{ClientContext, InvocationReturn, Proxy, ReceiverRegistry};
use relay_core::{Affinity, MethodDescriptor, ReturnShape};
use relay_server::{LocalTransactionCoordinator, LoopbackReceiver};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

const CLUSTER: &str = "probe";

#[derive(Parser, Debug)]
#[command(name = "relay-probe")]
#[command(about = "Exercise relay proxies over in-process loopback nodes")]
struct Args {
    /// Number of loopback nodes
    #[arg(short, long, default_value = "3")]
    nodes: usize,

    /// Calls issued through each proxy
    #[arg(short, long, default_value = "100")]
    calls: usize,

    /// Calls in flight at once
    #[arg(short = 'k', long, default_value = "8")]
    concurrency: usize,

    /// Use asynchronous proxies
    #[arg(long = "async")]
    asynchronous: bool,

    /// Invocation timeout in seconds
    #[arg(long, default_value = "10")]
    timeout_secs: u64,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    info!("Starting relay probe with {} node(s)", args.nodes);

    let coordinator = Arc::new(LocalTransactionCoordinator::new());
    let registry = Arc::new(ReceiverRegistry::new());
    let mut receivers = Vec::with_capacity(args.nodes);
    for i in 0..args.nodes {
        let name = format!("node-{}", i);
        let deployment = components::deploy(&name, coordinator.clone())?;
        let receiver = Arc::new(LoopbackReceiver::new(deployment));
        registry.register_node(receiver.clone()).await;
        registry.join_cluster(&name, CLUSTER).await?;
        receivers.push(receiver);
    }
    let home = receivers.first().context("--nodes must be at least 1")?;

    let context = ClientContext::builder(registry.clone())
        .invocation_timeout(Duration::from_secs(args.timeout_secs))
        .build();

    // Stateful counter through an explicit session
    let counter_locator = home
        .open_session(&components::counter_locator()?, None)
        .await?;
    info!("Opened {}", counter_locator);
    let counter = context.create_proxy(counter_locator);
    let increment = business("increment", args.asynchronous);
    let counted = drive(&counter, &increment, &args, |_| json!(1)).await;

    let total = counter
        .call(&MethodDescriptor::business("get"), vec![])
        .await?
        .into_value()?;
    info!("Counter total: {} (expected {})", total, counted);
    report("counter", &counter);

    // Stateless echo addressed at the cluster
    let echo = context.create_proxy(components::echo_locator(Affinity::cluster(CLUSTER))?);
    let echo_method = business("echo", args.asynchronous);
    drive(&echo, &echo_method, &args, |i| json!(i)).await;
    report("echo", &echo);

    Ok(())
}

fn business(name: &str, asynchronous: bool) -> MethodDescriptor {
    let shape = if asynchronous {
        ReturnShape::Future
    } else {
        ReturnShape::Value
    };
    MethodDescriptor::business(name).returning(shape)
}

/// Issue `args.calls` calls with bounded concurrency. Returns the number that succeeded.
async fn drive(
    proxy: &Proxy,
    method: &MethodDescriptor,
    args: &Args,
    argument: impl Fn(usize) -> Value,
) -> usize {
    let proxy = if args.asynchronous {
        proxy.asynchronous()
    } else {
        proxy.clone()
    };
    let started = Instant::now();

    let results: Vec<relay_core::Result<Value>> = stream::iter(0..args.calls)
        .map(|i| {
            let proxy = proxy.clone();
            let arguments = vec![argument(i)];
            async move {
                match proxy.call(method, arguments).await? {
                    InvocationReturn::Future(future) => future.await,
                    other => other.into_value(),
                }
            }
        })
        .buffer_unordered(args.concurrency.max(1))
        .collect()
        .await;

    let mut succeeded = 0;
    for result in &results {
        match result {
            Ok(value) => {
                debug!("{} -> {}", method.name(), value);
                succeeded += 1;
            }
            Err(e) => warn!("{} failed: {}", method.name(), e),
        }
    }
    info!(
        "{}: {}/{} succeeded in {:?}",
        method.name(),
        succeeded,
        results.len(),
        started.elapsed()
    );
    succeeded
}

fn report(label: &str, proxy: &Proxy) {
    let handler = proxy.handler();
    info!("{} locator: {}", label, handler.locator());
    info!("{} weak affinity: {}", label, handler.weak_affinity());
}
