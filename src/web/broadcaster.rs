//! Periodic process-list push for one authenticated session.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::{Outbound, ServerEvent};
use crate::commands::gateway::CommandGateway;
use crate::error::ApiError;

/// Spawns the push loop for `session_id`.
///
/// The first snapshot is taken immediately, then one per `period`. The loop
/// ends when `token` is cancelled or the outbound channel closes. A listing
/// already in flight when the token is cancelled runs to completion and its
/// result is thrown away.
pub fn spawn_update_loop(
    session_id: String,
    gateway: Arc<CommandGateway>,
    period: Duration,
    outbound: mpsc::Sender<Outbound>,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        log::debug!("Update loop started for session {} every {:?}", session_id, period);

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let snapshot = match gateway.snapshot().await {
                Ok(snapshot) => snapshot,
                Err(ApiError::Parse(e)) => {
                    log::warn!("Session {}: skipping update, unparsable pm2 output: {}", session_id, e);
                    continue;
                }
                Err(e) => {
                    log::debug!("Session {}: skipping update: {}", session_id, e);
                    continue;
                }
            };

            if token.is_cancelled() {
                break;
            }

            let count = snapshot.len();
            let frame = Outbound::guarded(ServerEvent::ProcessUpdate(snapshot), token.clone());
            if outbound.send(frame).await.is_err() {
                break;
            }
            log::trace!("Session {}: pushed {} processes", session_id, count);
        }

        log::debug!("Update loop stopped for session {}", session_id);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::executor::testing::FakeExecutor;

    fn gateway(fake: Arc<FakeExecutor>) -> Arc<CommandGateway> {
        Arc::new(CommandGateway::new("pw", fake))
    }

    #[tokio::test]
    async fn pushes_snapshots_until_cancelled() {
        let fake = Arc::new(FakeExecutor::new().respond("jlist", 0, r#"[{"name":"api"}]"#));
        let (tx, mut rx) = mpsc::channel(8);
        let token = CancellationToken::new();
        let period = Duration::from_millis(30);

        let handle = spawn_update_loop("s".into(), gateway(fake.clone()), period, tx, token.clone());

        for _ in 0..2 {
            let frame = rx.recv().await.unwrap();
            assert!(matches!(frame.event, ServerEvent::ProcessUpdate(ref s) if s.len() == 1));
        }

        token.cancel();
        handle.await.unwrap();
        let calls = fake.calls().len();

        tokio::time::sleep(period * 3).await;
        assert_eq!(fake.calls().len(), calls);
        while let Ok(frame) = rx.try_recv() {
            assert!(frame.is_stale());
        }
    }

    #[tokio::test]
    async fn failing_ticks_are_skipped_silently() {
        let fake = Arc::new(FakeExecutor::new().respond("jlist", 0, "oops"));
        let (tx, mut rx) = mpsc::channel(8);
        let token = CancellationToken::new();

        let handle = spawn_update_loop(
            "s".into(),
            gateway(fake.clone()),
            Duration::from_millis(10),
            tx,
            token.clone(),
        );

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(fake.calls().len() >= 2);
        assert!(rx.try_recv().is_err());

        token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn closed_channel_ends_the_loop() {
        let fake = Arc::new(FakeExecutor::new().respond("jlist", 0, "[]"));
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        let handle = spawn_update_loop(
            "s".into(),
            gateway(fake),
            Duration::from_millis(10),
            tx,
            CancellationToken::new(),
        );
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("loop should stop once the receiver is gone")
            .unwrap();
    }
}
