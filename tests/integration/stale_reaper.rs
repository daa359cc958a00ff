//! Stale-entry reaper, driven entirely by a paused virtual clock — no
//! network mocking needed since this only exercises `Inbox`/
//! `spawn_stale_reaper` wiring.

use std::time::Duration;

use bytes::Bytes;

use notetun_core::RequestId;
use notetun_transport::{spawn_stale_reaper, Inbox};

#[tokio::test(start_paused = true)]
async fn streaming_chunks_older_than_ten_minutes_are_reaped_but_fresh_ones_survive() {
    let inbox = Inbox::new();
    let start = tokio::time::Instant::now();
    let _reaper = spawn_stale_reaper(inbox.clone(), move || start.elapsed().as_millis());

    let old_rid = RequestId::new(0);
    let fresh_rid = RequestId::new(600_500);
    inbox.put_data_chunk(&format!("{old_rid}:DATA"), 1, Bytes::from_static(b"old"));
    inbox.put_data_chunk(&format!("{fresh_rid}:DATA"), 1, Bytes::from_static(b"fresh"));

    tokio::time::advance(Duration::from_secs(11 * 60)).await;
    tokio::task::yield_now().await;

    assert!(!inbox.head_chunk(&format!("{old_rid}:DATA"), 1));
    assert!(inbox.head_chunk(&format!("{fresh_rid}:DATA"), 1));
}
