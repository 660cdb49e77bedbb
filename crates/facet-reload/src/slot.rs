//! Single-slot handoff between a producer thread and the render loop.

use parking_lot::Mutex;

/// A mutex-guarded slot holding at most one pending value.
///
/// The watcher thread publishes a freshly built pipeline here; the render
/// loop consumes it at a safe point once per frame. Publishing over an
/// unconsumed value displaces it: the displaced value was never installed,
/// so the publisher is free to destroy it immediately.
pub struct SwapSlot<T> {
    pending: Mutex<Option<T>>,
}

impl<T> Default for SwapSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SwapSlot<T> {
    /// Create an empty slot.
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(None),
        }
    }

    /// Store `value` as the pending swap, returning the displaced value if
    /// the previous one was never consumed.
    pub fn publish(&self, value: T) -> Option<T> {
        self.pending.lock().replace(value)
    }

    /// Remove and return the pending value.
    pub fn take(&self) -> Option<T> {
        self.pending.lock().take()
    }

    /// Whether a value is waiting to be consumed.
    pub fn is_pending(&self) -> bool {
        self.pending.lock().is_some()
    }

    /// Consume the pending value at a safe point.
    ///
    /// If nothing is pending this returns `Ok(false)` without running
    /// `quiesce`. Otherwise `quiesce` runs first (the render loop waits on
    /// all in-flight fences there) and only after it returns successfully is
    /// the value taken and handed to `install`. A value published while
    /// `quiesce` is running is picked up by this same drain.
    pub fn drain_with<E>(
        &self,
        quiesce: impl FnOnce() -> Result<(), E>,
        install: impl FnOnce(T),
    ) -> Result<bool, E> {
        if !self.is_pending() {
            return Ok(false);
        }

        quiesce()?;

        match self.take() {
            Some(value) => {
                install(value);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn publish_then_take() {
        let slot = SwapSlot::new();
        assert!(!slot.is_pending());

        assert!(slot.publish(7).is_none());
        assert!(slot.is_pending());

        assert_eq!(slot.take(), Some(7));
        assert!(!slot.is_pending());
        assert_eq!(slot.take(), None);
    }

    #[test]
    fn publish_displaces_unconsumed_value() {
        let slot = SwapSlot::new();

        assert!(slot.publish("first").is_none());
        assert_eq!(slot.publish("second"), Some("first"));
        assert_eq!(slot.take(), Some("second"));
    }

    #[test]
    fn drain_skips_quiesce_when_empty() {
        let slot: SwapSlot<u32> = SwapSlot::new();
        let mut quiesced = false;

        let drained = slot
            .drain_with(
                || {
                    quiesced = true;
                    Ok::<(), ()>(())
                },
                |_| {},
            )
            .unwrap();

        assert!(!drained);
        assert!(!quiesced);
    }

    #[test]
    fn quiesce_completes_before_install() {
        let slot = SwapSlot::new();
        slot.publish(1);

        let order = Mutex::new(Vec::new());
        slot.drain_with(
            || {
                order.lock().push("quiesce");
                Ok::<(), ()>(())
            },
            |_| order.lock().push("install"),
        )
        .unwrap();

        assert_eq!(*order.lock(), vec!["quiesce", "install"]);
    }

    #[test]
    fn quiesce_error_leaves_value_pending() {
        let slot = SwapSlot::new();
        slot.publish(1);

        let result = slot.drain_with(|| Err("fence wait failed"), |_| {});

        assert_eq!(result, Err("fence wait failed"));
        assert!(slot.is_pending());
    }

    /// Pending swap set while both fences are unsignaled: the swap happens
    /// only after both signal, and exactly one install runs.
    #[test]
    fn swap_defers_until_all_fences_signal() {
        let slot = SwapSlot::new();
        slot.publish("new-pipeline");

        let fences = Mutex::new([false, false]);
        let installed = Mutex::new(Vec::new());

        let drained = slot
            .drain_with(
                || {
                    // Waiting on the fences is what signals them here.
                    for fence in fences.lock().iter_mut() {
                        *fence = true;
                    }
                    Ok::<(), ()>(())
                },
                |value| {
                    assert!(
                        fences.lock().iter().all(|signaled| *signaled),
                        "installed while a fence was still unsignaled"
                    );
                    installed.lock().push(value);
                },
            )
            .unwrap();

        assert!(drained);
        assert_eq!(installed.lock().len(), 1);

        // Nothing left for the next frame.
        let drained_again = slot.drain_with(|| Ok::<(), ()>(()), |_| {}).unwrap();
        assert!(!drained_again);
    }

    #[test]
    fn cross_thread_publish_is_observed() {
        let slot = Arc::new(SwapSlot::new());
        let publisher = Arc::clone(&slot);

        let handle = std::thread::spawn(move || {
            publisher.publish(42);
        });

        let mut received = None;
        for _ in 0..100 {
            if let Some(value) = slot.take() {
                received = Some(value);
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }

        handle.join().unwrap();
        assert_eq!(received, Some(42));
    }
}
