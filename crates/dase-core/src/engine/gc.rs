//! RT-safe deferred deallocation
//!
//! Global `basedrop` collector for values retired by the audio thread.
//! Coupling-matrix snapshots and preset payloads are swapped in via the
//! command queue; the outgoing value is wrapped in `Shared<T>` so its
//! final drop on the audio thread only enqueues a pointer. The actual
//! free happens on the GC thread, where a slow munmap cannot cause an
//! xrun.

use basedrop::{Collector, Handle};
use std::sync::mpsc;
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;

static GC_HANDLE: OnceLock<Handle> = OnceLock::new();

fn init_gc() -> Handle {
    let (tx, rx) = mpsc::channel();

    thread::Builder::new()
        .name("dase-gc".to_string())
        .spawn(move || {
            // Collector is !Sync, so it lives on this thread
            let mut collector = Collector::new();
            let handle = collector.handle();
            if tx.send(handle).is_err() {
                log::error!("GC thread could not hand back its handle");
                return;
            }

            log::info!("Audio GC thread started");
            loop {
                collector.collect();
                // 100ms is fast enough for memory reclamation
                thread::sleep(Duration::from_millis(100));
            }
        })
        .expect("Failed to spawn audio GC thread");

    rx.recv().expect("Failed to receive GC handle")
}

/// Get a handle for creating `Shared<T>` allocations
///
/// The handle is lightweight and can be cloned.
pub fn gc_handle() -> Handle {
    GC_HANDLE.get_or_init(init_gc).clone()
}
