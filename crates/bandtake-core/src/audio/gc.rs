//! Deferred deallocation of buffers played on the audio thread
//!
//! Every buffer handed to a voice is a `basedrop::Shared`. When a voice ends
//! on the audio thread its reference is queued, and the `audio-gc` thread
//! frees it later. A take can be tens of megabytes.

use std::sync::{mpsc, OnceLock};
use std::thread;
use std::time::Duration;

use basedrop::{Collector, Handle};

/// How often queued buffers are freed
const COLLECT_INTERVAL: Duration = Duration::from_millis(100);

static GC_HANDLE: OnceLock<Handle> = OnceLock::new();

fn spawn_collector() -> Handle {
    let (handle_tx, handle_rx) = mpsc::sync_channel(1);

    thread::Builder::new()
        .name("audio-gc".to_string())
        .spawn(move || {
            // Collector is !Sync and stays on this thread
            let mut collector = Collector::new();
            handle_tx.send(collector.handle()).expect("GC handle receiver dropped");

            loop {
                let before = collector.alloc_count();
                collector.collect();
                let freed = before.saturating_sub(collector.alloc_count());
                if freed > 0 {
                    log::debug!("Audio GC freed {} buffer(s)", freed);
                }
                thread::sleep(COLLECT_INTERVAL);
            }
        })
        .expect("Failed to spawn audio GC thread");

    handle_rx.recv().expect("Audio GC thread exited before sending its handle")
}

/// Handle for wrapping buffers in `Shared`, starting the collector on first use
pub fn gc_handle() -> Handle {
    GC_HANDLE.get_or_init(spawn_collector).clone()
}
