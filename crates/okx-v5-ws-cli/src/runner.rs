/*
[INPUT]:  Connected client, configured topics, shutdown token
[OUTPUT]: Topics subscribed on every session with pushes logged
[POS]:    Runtime layer - subscription supervisor
[UPDATE]: When changing what the runner does per session
*/

use anyhow::Result;
use okx_v5_ws::{ChannelMessage, OkxV5Ws, SubscriptionTopic};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Subscribe `topics` on every completed session until `shutdown` fires.
///
/// Reconnects drop server-side subscriptions and local handlers, so both are
/// restored each time the session counter moves. A session that completed
/// before this call is treated as new.
pub async fn run_subscriptions(
    client: OkxV5Ws,
    topics: Vec<SubscriptionTopic>,
    shutdown: CancellationToken,
) -> Result<()> {
    let mut sessions = client.subscribe_sessions();
    if *sessions.borrow() > 0 {
        sessions.mark_changed();
    }
    let mut current: Option<JoinHandle<()>> = None;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            changed = sessions.changed() => {
                if changed.is_err() {
                    warn!("client dropped; stopping subscriptions");
                    break;
                }
                let session = *sessions.borrow_and_update();
                if let Some(previous) = current.take() {
                    previous.abort();
                }
                info!(session, topic_count = topics.len(), "session ready; subscribing");
                current = Some(tokio::spawn(subscribe_all(client.clone(), topics.clone())));
            }
        }
    }

    if let Some(task) = current.take() {
        task.abort();
    }
    Ok(())
}

async fn subscribe_all(client: OkxV5Ws, topics: Vec<SubscriptionTopic>) {
    for topic in topics {
        match client.subscribe_channel(&topic).await {
            Ok(_) => {
                client.on_channel_message(&topic, log_push);
                info!(%topic, "subscribed");
            }
            Err(err) => warn!(%topic, error = %err, "subscribe failed"),
        }
    }
}

fn log_push(message: &ChannelMessage) {
    info!(
        channel = %message.arg.channel,
        inst_id = message.arg.inst_id.as_deref().unwrap_or_default(),
        action = message.action.as_deref().unwrap_or_default(),
        data = %message.data,
        "channel push"
    );
}
