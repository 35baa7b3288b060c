use crate::property::Property;
use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use std::cell::Cell;
use std::sync::Arc;

/// Whether a binding mirrors changes in one or both directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingMode {
    OneWay,
    TwoWay,
}

/// A live link between two properties.
///
/// Dropping the binding (or calling [`Binding::unbind`]) stops propagation.
/// The binding only holds weak references to its endpoints.
#[must_use = "dropping a Binding detaches it immediately"]
pub struct Binding {
    mode: BindingMode,
    detach: Vec<Detach>,
}

type Detach = Box<dyn FnOnce() + Send>;

impl std::fmt::Debug for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Binding").field("mode", &self.mode).finish()
    }
}

impl Binding {
    pub fn mode(&self) -> BindingMode {
        self.mode
    }

    /// Detach the binding. Both endpoints keep their current values.
    pub fn unbind(mut self) {
        self.detach_all();
    }

    fn detach_all(&mut self) {
        for detach in self.detach.drain(..) {
            detach();
        }
    }
}

impl Drop for Binding {
    fn drop(&mut self) {
        self.detach_all();
    }
}

/// Serializes a binding's propagation. The lock is re-entrant so the echo
/// coming back on the propagating thread can see the flag and stop there,
/// while a change made on another thread waits its turn instead of being lost.
type Gate = Arc<ReentrantMutex<Cell<bool>>>;

struct PropagationGuard<'a>(ReentrantMutexGuard<'a, Cell<bool>>);

impl<'a> PropagationGuard<'a> {
    fn enter(gate: &'a Gate) -> Option<Self> {
        let guard = gate.lock();
        if guard.replace(true) {
            None
        } else {
            Some(Self(guard))
        }
    }
}

impl Drop for PropagationGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

fn forward<T>(from: &Property<T>, to: &Property<T>, gate: &Gate, mode: BindingMode) -> Detach
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    let source = from.downgrade();
    let target = to.downgrade();
    let gate = Arc::clone(gate);
    let id = from.subscribe(move |value| {
        let Some(_guard) = PropagationGuard::enter(&gate) else {
            return;
        };
        let (Some(source), Some(target)) = (source.upgrade(), target.upgrade()) else {
            return;
        };
        match mode {
            // The source may have moved on while this call waited for the gate.
            BindingMode::OneWay => {
                target.set(source.get());
            }
            // The target's listeners may coerce the value; both sides settle
            // on whatever the target kept.
            BindingMode::TwoWay => {
                target.set(value.clone());
                source.set(target.get());
            }
        }
    });

    let source = from.downgrade();
    Box::new(move || {
        if let Some(source) = source.upgrade() {
            source.unsubscribe(id);
        }
    })
}

/// Mirror `source` into `target`. `target` takes the source value immediately.
pub fn bind_one_way<T>(source: &Property<T>, target: &Property<T>) -> Binding
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    let gate = Gate::default();
    target.set(source.get());
    let detach = forward(source, target, &gate, BindingMode::OneWay);
    Binding {
        mode: BindingMode::OneWay,
        detach: vec![detach],
    }
}

/// Keep `source` and `target` equal, whichever side changes.
///
/// `target` takes the source value immediately. Propagation in either
/// direction is serialized: a change forwarded on one thread is not echoed
/// back on that thread, and a change made concurrently on another thread is
/// forwarded once the first one has settled. Listeners on either side must
/// not block on a thread that may itself be writing to the bound pair.
pub fn bind_two_way<T>(source: &Property<T>, target: &Property<T>) -> Binding
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    let gate = Gate::default();
    target.set(source.get());
    let to_target = forward(source, target, &gate, BindingMode::TwoWay);
    let to_source = forward(target, source, &gate, BindingMode::TwoWay);
    Binding {
        mode: BindingMode::TwoWay,
        detach: vec![to_target, to_source],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn one_way_copies_initial_and_later_values() {
        let source = Property::new(3);
        let target = Property::new(0);
        let binding = bind_one_way(&source, &target);
        assert_eq!(binding.mode(), BindingMode::OneWay);
        assert_eq!(target.get(), 3);

        source.set(4);
        assert_eq!(target.get(), 4);

        target.set(9);
        assert_eq!(source.get(), 4);
    }

    #[test]
    fn two_way_propagates_both_directions() {
        let provider = Property::new(100_i64);
        let control = Property::new(0_i64);
        let _binding = bind_two_way(&provider, &control);
        assert_eq!(control.get(), 100);

        control.set(2500);
        assert_eq!(provider.get(), 2500);

        provider.set(3000);
        assert_eq!(control.get(), 3000);
    }

    #[test]
    fn two_way_does_not_echo() {
        let a = Property::new(0);
        let b = Property::new(0);
        let _binding = bind_two_way(&a, &b);

        let a_changes = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&a_changes);
        a.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        b.set(5);
        assert_eq!(a.get(), 5);
        assert_eq!(a_changes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn listener_that_clamps_terminates() {
        // A listener rewriting the value mid-propagation must not loop forever.
        let a = Property::new(0);
        let b = Property::new(0);
        let _binding = bind_two_way(&a, &b);

        let clamp_target = b.clone();
        b.subscribe(move |v| {
            if *v > 100 {
                clamp_target.set(100);
            }
        });

        a.set(250);
        assert_eq!(b.get(), 100);
        assert_eq!(a.get(), 100);
    }

    #[test]
    fn change_from_another_thread_is_not_lost() {
        let provider = Property::new(0_i64);
        let control = Property::new(0_i64);
        let _binding = bind_two_way(&provider, &control);

        // Hold the first forwarded value inside a control-side listener until
        // the other thread has written to the control.
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let release_rx = Mutex::new(release_rx);
        let held = AtomicBool::new(false);
        control.subscribe(move |_| {
            if !held.swap(true, Ordering::SeqCst) {
                entered_tx.send(()).unwrap();
                let _ = release_rx.lock().recv_timeout(Duration::from_secs(5));
            }
        });

        let engine = {
            let provider = provider.clone();
            thread::spawn(move || provider.set(1_000))
        };
        entered_rx.recv().unwrap();

        let ui = {
            let control = control.clone();
            thread::spawn(move || control.set(30_500))
        };
        thread::sleep(Duration::from_millis(50));
        release_tx.send(()).unwrap();

        engine.join().unwrap();
        ui.join().unwrap();
        assert_eq!(provider.get(), control.get());
        assert_eq!(control.get(), 30_500);
    }

    #[test]
    fn concurrent_writers_settle_on_one_value() {
        let provider = Property::new(0_i64);
        let control = Property::new(0_i64);
        let _binding = bind_two_way(&provider, &control);

        let writers: Vec<_> = [provider.clone(), control.clone()]
            .into_iter()
            .enumerate()
            .map(|(side, property)| {
                thread::spawn(move || {
                    for i in 0..500_i64 {
                        property.set(i * 2 + side as i64);
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        assert_eq!(provider.get(), control.get());
    }

    #[test]
    fn coerced_value_is_mirrored_back() {
        let provider = Property::new(50);
        let control = Property::new(0);
        let _binding = bind_two_way(&provider, &control);

        let floor = provider.clone();
        provider.subscribe(move |v| {
            if *v < 0 {
                floor.set(0);
            }
        });

        control.set(-10);
        assert_eq!(provider.get(), 0);
        assert_eq!(control.get(), 0);
    }

    #[test]
    fn dropped_binding_stops_propagation() {
        let source = Property::new(1);
        let target = Property::new(0);
        let binding = bind_two_way(&source, &target);
        binding.unbind();

        source.set(2);
        target.set(7);
        assert_eq!(source.get(), 2);
        assert_eq!(target.get(), 7);
    }

    #[test]
    fn binding_does_not_keep_endpoints_alive() {
        let source = Property::new(String::from("a"));
        let target = Property::new(String::new());
        let _binding = bind_one_way(&source, &target);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        target.subscribe(move |v: &String| sink.lock().push(v.clone()));

        drop(target);
        source.set(String::from("b"));
        assert!(seen.lock().is_empty());
    }
}
