// ABOUTME: Integration tests for the poll timers.
// ABOUTME: Ticks feed the queue; the watch shutdown stops every timer.

mod support;

use std::sync::Arc;
use std::time::Duration;

use caravel::poller::Poller;
use caravel::queue::ConcurrencyPolicy;
use caravel::store::DeploymentStatus;
use support::Harness;

const MEDIA_URL: &str = "https://example.com/media.git";

const CONFIG: &str = r#"
projects:
  homelab:
    repositories:
      media:
        git_url: https://example.com/media.git
        local_path: /srv/test/media
        poll_interval: 100ms
"#;

/// A poll tick alone gets a changed repository deployed; nothing triggers
/// manually.
#[tokio::test]
async fn poll_tick_deploys_without_manual_trigger() {
    let h = Harness::new(CONFIG);
    h.git.set_remote(MEDIA_URL, "c1c1c1");
    h.queue.start(ConcurrencyPolicy::Sequential);

    let poller = Poller::start(Arc::clone(&h.queue));
    let record = h.wait_terminal("media", None).await;
    assert_eq!(record.status, DeploymentStatus::Success);
    assert_eq!(h.compose.runs_for("media").len(), 1);

    poller.stop().await;
    h.queue.stop().await;
}

/// After stop() no timer ticks again: a new commit sits undeployed while
/// the queue itself is still running.
#[tokio::test]
async fn stopped_poller_enqueues_nothing_more() {
    let h = Harness::new(CONFIG);
    h.git.set_remote(MEDIA_URL, "c1c1c1");
    h.queue.start(ConcurrencyPolicy::Sequential);

    let poller = Poller::start(Arc::clone(&h.queue));
    h.wait_terminal("media", None).await;
    poller.stop().await;

    // Let anything admitted before the stop settle, then take the baseline.
    tokio::time::sleep(Duration::from_millis(150)).await;
    let baseline = h.store().list(None, 100).len();

    // A live timer would pick this up within a tick or two.
    h.git.set_remote(MEDIA_URL, "c2c2c2");
    tokio::time::sleep(Duration::from_millis(350)).await;
    assert_eq!(h.store().list(None, 100).len(), baseline);

    h.queue.stop().await;
}
