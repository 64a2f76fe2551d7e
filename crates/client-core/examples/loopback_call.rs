//! Loopback Call Example
//!
//! Two endpoints register with an in-process rendezvous service, one calls
//! the other, they stay connected for a moment and then hang up.
//!
//! Run with: cargo run --example loopback_call

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use peerlink_client_core::media::{MediaKind, MockMediaProvider};
use peerlink_client_core::signaling::LoopbackRendezvous;
use peerlink_client_core::{ConnectionEvent, ConnectionManager, ConnectionManagerBuilder};

fn endpoint(rendezvous: &Arc<LoopbackRendezvous>, label: &str) -> Result<ConnectionManager, Box<dyn std::error::Error>> {
    Ok(ConnectionManagerBuilder::new()
        .label(label)
        .media_provider(Arc::new(MockMediaProvider::new()))
        .signaling(Arc::new(rendezvous.identity()))
        .build()?)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    println!("📞 Loopback Call Example");
    println!("========================");

    let rendezvous = LoopbackRendezvous::new();
    let alice = endpoint(&rendezvous, "alice")?;
    let bob = endpoint(&rendezvous, "bob")?;

    let alice_id = alice.open().await?;
    let bob_id = bob.open().await?;
    println!("🆔 alice = {}", alice_id);
    println!("🆔 bob   = {}", bob_id);

    // print everything bob sees
    let mut bob_events = bob.events();
    let printer = tokio::spawn(async move {
        while let Some(Ok(event)) = bob_events.next().await {
            match event {
                ConnectionEvent::StatusChanged { previous, current } => {
                    println!("   bob: {} → {}", previous, current)
                }
                ConnectionEvent::IncomingCall { from, .. } => println!("   bob: incoming call from {}", from),
                ConnectionEvent::CallClosed { reason, .. } => println!("   bob: call closed ({})", reason),
                _ => {}
            }
        }
    });

    println!("\n▶️  alice shares her screen with bob...");
    let mut alice_events = alice.events();
    alice.connect_with(bob_id.as_str(), MediaKind::Screen).await?;

    while let Some(Ok(event)) = alice_events.next().await {
        if let ConnectionEvent::RemoteStreamAvailable { handle, .. } = event {
            let labels: Vec<String> = handle.tracks().iter().map(|t| t.label().to_string()).collect();
            println!("✅ alice receives: {}", labels.join(", "));
            break;
        }
    }

    tokio::time::sleep(Duration::from_millis(500)).await;
    println!("📊 alice stats: {}", serde_json::to_string(&alice.stats())?);

    println!("\n⏹️  alice hangs up");
    alice.disconnect();
    tokio::time::sleep(Duration::from_millis(100)).await;

    alice.dispose().await?;
    bob.dispose().await?;
    printer.abort();
    println!("👋 done");
    Ok(())
}
