//! RT-safe deferred deallocation for chains and effects
//!
//! Replacing a loaded chain happens on the audio thread, which means the
//! old chain handle and the displaced effect instances are dropped there.
//! Freeing memory on the audio thread can blow the callback deadline, so
//! chains are held as `basedrop::Shared<T>` and effects as
//! `basedrop::Owned<T>`: dropping either on the audio thread only enqueues
//! a pointer (~50ns); the actual deallocation runs on a background
//! collector thread where latency does not matter.

use std::sync::mpsc;
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;

use basedrop::{Collector, Handle};

/// Global handle for creating `Shared<T>` / `Owned<T>` allocations
///
/// Initialized once; cloning the handle is cheap. The collector itself
/// lives on a dedicated thread.
static GC_HANDLE: OnceLock<Handle> = OnceLock::new();

/// How often the collector sweeps deferred drops
const COLLECT_INTERVAL: Duration = Duration::from_millis(100);

fn init_gc() -> Handle {
    let (tx, rx) = mpsc::channel();

    thread::Builder::new()
        .name("fxrack-gc".to_string())
        .spawn(move || {
            // Collector is !Sync, so it is created on its own thread
            let mut collector = Collector::new();
            let handle = collector.handle();
            tx.send(handle).expect("Failed to send GC handle");

            log::info!("fxrack GC thread started");

            loop {
                collector.collect();
                thread::sleep(COLLECT_INTERVAL);
            }
        })
        .expect("Failed to spawn fxrack GC thread");

    rx.recv().expect("Failed to receive GC handle")
}

/// Get a handle for creating `Shared<T>` / `Owned<T>` allocations
pub fn gc_handle() -> Handle {
    GC_HANDLE.get_or_init(init_gc).clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use basedrop::{Owned, Shared};

    #[test]
    fn test_deferred_drop_does_not_panic() {
        let handle = gc_handle();
        let shared = Shared::new(&handle, vec![1u8, 2, 3]);
        let clone = shared.clone();
        drop(shared);
        drop(clone);

        let owned = Owned::new(&handle, String::from("displaced"));
        drop(owned);
    }
}
