//! Background polling loop that drives a set of observers
//!
//! A running scheduler owns exactly one named OS thread. Each cycle polls
//! every registered observer in registration order and then sleeps on a
//! condition variable, so `stop` can cut the sleep short.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};

use crate::error::{MonitorError, Result};
use crate::listener::panic_message;
use crate::observer::Observer;
use crate::registry::CowRegistry;

const DEFAULT_THREAD_NAME: &str = "io-monitor";

/// Runs [`Observer::check_and_notify`] on a fixed interval
pub struct PollingScheduler {
    interval: Duration,
    thread_name: String,
    observers: Arc<CowRegistry<Arc<dyn Observer>>>,
    current: Mutex<Option<RunningLoop>>,
}

/// Handle to the thread of one `start`..`stop` cycle
struct RunningLoop {
    control: Arc<RunControl>,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct RunControl {
    state: Mutex<RunState>,
    changed: Condvar,
}

#[derive(Default)]
struct RunState {
    stop_requested: bool,
    exited: bool,
}

impl PollingScheduler {
    /// Create an idle scheduler with no observers
    pub fn new(interval: Duration) -> Self {
        Self::with_observers(interval, Vec::<Arc<dyn Observer>>::new())
    }

    /// Create an idle scheduler polling `observers` in the given order
    pub fn with_observers(
        interval: Duration,
        observers: impl IntoIterator<Item = Arc<dyn Observer>>,
    ) -> Self {
        Self {
            interval,
            thread_name: DEFAULT_THREAD_NAME.to_string(),
            observers: Arc::new(CowRegistry::from_vec(observers.into_iter().collect())),
            current: Mutex::new(None),
        }
    }

    /// Name given to the polling thread
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Delay between the end of one cycle and the start of the next
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Register an observer. It is polled from the next cycle on; a running
    /// scheduler does not initialize it.
    pub fn add_observer(&self, observer: Arc<dyn Observer>) {
        debug!("Adding observer for {}", observer.directory().display());
        self.observers.push(observer);
    }

    /// Unregister an observer by identity
    pub fn remove_observer(&self, observer: &Arc<dyn Observer>) -> bool {
        let removed = self.observers.remove(observer);
        if removed {
            debug!("Removed observer for {}", observer.directory().display());
        }
        removed
    }

    /// Observers currently registered, in polling order
    pub fn observers(&self) -> Arc<Vec<Arc<dyn Observer>>> {
        self.observers.snapshot()
    }

    pub fn is_running(&self) -> bool {
        self.current.lock().is_some()
    }

    /// Initialize every observer and start the polling thread
    pub fn start(&self) -> Result<()> {
        let mut current = self.current.lock();
        if current.is_some() {
            return Err(MonitorError::AlreadyRunning);
        }

        let observers = self.observers.snapshot();
        for observer in observers.iter() {
            observer.initialize()?;
        }

        let control = Arc::new(RunControl::default());
        let handle = thread::Builder::new()
            .name(self.thread_name.clone())
            .spawn({
                let control = control.clone();
                let observers = self.observers.clone();
                let interval = self.interval;
                move || run_loop(&control, &observers, interval)
            })
            .map_err(MonitorError::ThreadSpawn)?;

        info!(
            "Started polling {} observers every {:?}",
            observers.len(),
            self.interval
        );
        *current = Some(RunningLoop { control, handle });
        Ok(())
    }

    /// Stop polling, waiting up to one interval for the thread to exit
    pub fn stop(&self) -> Result<()> {
        self.stop_with_timeout(self.interval)
    }

    /// Stop polling, waiting up to `timeout` for the thread to exit.
    ///
    /// Observers are destroyed even when the wait times out; in that case the
    /// thread is detached and finishes its current cycle on its own.
    pub fn stop_with_timeout(&self, timeout: Duration) -> Result<()> {
        let running = self
            .current
            .lock()
            .take()
            .ok_or(MonitorError::NotRunning)?;

        let exited = {
            let mut state = running.control.state.lock();
            state.stop_requested = true;
            running.control.changed.notify_all();
            running
                .control
                .changed
                .wait_while_for(&mut state, |state| !state.exited, timeout);
            state.exited
        };

        if exited {
            if running.handle.join().is_err() {
                warn!("Polling thread terminated abnormally");
            }
        } else {
            warn!(
                "Polling thread did not exit within {:?}; detaching it",
                timeout
            );
        }

        let mut first_error = None;
        for observer in self.observers.snapshot().iter() {
            if let Err(e) = observer.destroy() {
                warn!(
                    "Failed to destroy observer for {}: {}",
                    observer.directory().display(),
                    e
                );
                first_error.get_or_insert(e);
            }
        }

        info!("Stopped polling");
        first_error.map_or(Ok(()), Err)
    }
}

fn run_loop(control: &RunControl, observers: &CowRegistry<Arc<dyn Observer>>, interval: Duration) {
    debug!("Polling thread started");

    'polling: loop {
        for observer in observers.snapshot().iter() {
            if control.state.lock().stop_requested {
                break 'polling;
            }
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| observer.check_and_notify())) {
                warn!(
                    "Observer for {} panicked: {}",
                    observer.directory().display(),
                    panic_message(panic.as_ref())
                );
            }
        }

        let mut state = control.state.lock();
        if !state.stop_requested {
            control
                .changed
                .wait_while_for(&mut state, |state| !state.stop_requested, interval);
        }
        if state.stop_requested {
            break;
        }
    }

    control.state.lock().exited = true;
    control.changed.notify_all();
    debug!("Polling thread exiting");
}

impl Drop for PollingScheduler {
    fn drop(&mut self) {
        if self.is_running() {
            if let Err(e) = self.stop() {
                warn!("Error while stopping scheduler on drop: {}", e);
            }
        }
    }
}

impl fmt::Debug for PollingScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollingScheduler")
            .field("interval", &self.interval)
            .field("thread_name", &self.thread_name)
            .field("observers", &self.observers.len())
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::{ChannelListener, EventKind, MonitorEvent};
    use crate::observer::DirectoryObserver;
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;
    use tempfile::TempDir;

    #[derive(Default)]
    struct CountingObserver {
        directory: PathBuf,
        initialized: AtomicUsize,
        checked: AtomicUsize,
        destroyed: AtomicUsize,
        log: Option<Arc<Mutex<Vec<&'static str>>>>,
        label: &'static str,
    }

    impl CountingObserver {
        fn labelled(label: &'static str, log: Arc<Mutex<Vec<&'static str>>>) -> Self {
            Self {
                label,
                log: Some(log),
                ..Default::default()
            }
        }

        fn checks(&self) -> usize {
            self.checked.load(Ordering::SeqCst)
        }
    }

    impl Observer for CountingObserver {
        fn directory(&self) -> &Path {
            &self.directory
        }

        fn initialize(&self) -> Result<()> {
            self.initialized.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn check_and_notify(&self) {
            self.checked.fetch_add(1, Ordering::SeqCst);
            if let Some(log) = &self.log {
                log.lock().push(self.label);
            }
        }

        fn destroy(&self) -> Result<()> {
            self.destroyed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct PanickingObserver {
        directory: PathBuf,
    }

    impl Observer for PanickingObserver {
        fn directory(&self) -> &Path {
            &self.directory
        }

        fn initialize(&self) -> Result<()> {
            Ok(())
        }

        fn check_and_notify(&self) {
            panic!("observer failure");
        }

        fn destroy(&self) -> Result<()> {
            Ok(())
        }
    }

    struct FailingInit;

    impl Observer for FailingInit {
        fn directory(&self) -> &Path {
            Path::new("/nowhere")
        }

        fn initialize(&self) -> Result<()> {
            Err(MonitorError::invalid_root("/nowhere", "refused"))
        }

        fn check_and_notify(&self) {}

        fn destroy(&self) -> Result<()> {
            Ok(())
        }
    }

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        condition()
    }

    #[test]
    fn test_lifecycle_errors() {
        let scheduler = PollingScheduler::new(Duration::from_millis(10));
        assert!(!scheduler.is_running());
        assert!(matches!(scheduler.stop(), Err(MonitorError::NotRunning)));

        scheduler.start().unwrap();
        assert!(scheduler.is_running());
        assert!(matches!(scheduler.start(), Err(MonitorError::AlreadyRunning)));

        scheduler.stop().unwrap();
        assert!(!scheduler.is_running());
        assert!(matches!(scheduler.stop(), Err(MonitorError::NotRunning)));
    }

    #[test_log::test]
    fn test_observer_lifecycle_calls() {
        let observer = Arc::new(CountingObserver::default());
        let scheduler = PollingScheduler::with_observers(
            Duration::from_millis(5),
            [observer.clone() as Arc<dyn Observer>],
        );

        scheduler.start().unwrap();
        assert_eq!(observer.initialized.load(Ordering::SeqCst), 1);
        assert!(wait_until(|| observer.checks() >= 3));

        scheduler.stop_with_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(observer.destroyed.load(Ordering::SeqCst), 1);

        let settled = observer.checks();
        thread::sleep(Duration::from_millis(30));
        assert_eq!(observer.checks(), settled);
    }

    #[test]
    fn test_restart_after_stop() {
        let observer = Arc::new(CountingObserver::default());
        let scheduler = PollingScheduler::new(Duration::from_millis(5));
        scheduler.add_observer(observer.clone());

        scheduler.start().unwrap();
        scheduler.stop_with_timeout(Duration::from_secs(5)).unwrap();
        scheduler.start().unwrap();
        scheduler.stop_with_timeout(Duration::from_secs(5)).unwrap();

        assert_eq!(observer.initialized.load(Ordering::SeqCst), 2);
        assert_eq!(observer.destroyed.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_initialize_error_keeps_scheduler_idle() {
        let scheduler = PollingScheduler::with_observers(
            Duration::from_millis(5),
            [Arc::new(FailingInit) as Arc<dyn Observer>],
        );

        assert!(matches!(
            scheduler.start(),
            Err(MonitorError::InvalidRoot { .. })
        ));
        assert!(!scheduler.is_running());
    }

    #[test_log::test]
    fn test_panicking_observer_does_not_stop_others() {
        let healthy = Arc::new(CountingObserver::default());
        let scheduler = PollingScheduler::with_observers(
            Duration::from_millis(5),
            [
                Arc::new(PanickingObserver {
                    directory: PathBuf::from("/broken"),
                }) as Arc<dyn Observer>,
                healthy.clone(),
            ],
        );

        scheduler.start().unwrap();
        assert!(wait_until(|| healthy.checks() >= 3));
        assert!(scheduler.is_running());
        scheduler.stop_with_timeout(Duration::from_secs(5)).unwrap();
    }

    #[test]
    fn test_observers_polled_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let first = Arc::new(CountingObserver::labelled("first", log.clone()));
        let second = Arc::new(CountingObserver::labelled("second", log.clone()));
        let scheduler = PollingScheduler::new(Duration::from_millis(5));
        scheduler.add_observer(first.clone());
        scheduler.add_observer(second.clone());

        scheduler.start().unwrap();
        assert!(wait_until(|| second.checks() >= 2));
        scheduler.stop_with_timeout(Duration::from_secs(5)).unwrap();

        let log = log.lock();
        for pair in log.chunks_exact(2) {
            assert_eq!(pair, ["first", "second"]);
        }
    }

    #[test]
    fn test_stop_interrupts_long_sleep() {
        let observer = Arc::new(CountingObserver::default());
        let scheduler = PollingScheduler::new(Duration::from_secs(3600));
        scheduler.add_observer(observer.clone());

        scheduler.start().unwrap();
        assert!(wait_until(|| observer.checks() == 1));

        let started = Instant::now();
        scheduler.stop_with_timeout(Duration::from_secs(30)).unwrap();
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(observer.checks(), 1);
    }

    #[test]
    fn test_remove_observer() {
        let observer: Arc<dyn Observer> = Arc::new(CountingObserver::default());
        let scheduler = PollingScheduler::new(Duration::from_millis(5));
        scheduler.add_observer(observer.clone());
        assert_eq!(scheduler.observers().len(), 1);

        assert!(scheduler.remove_observer(&observer));
        assert!(!scheduler.remove_observer(&observer));
        assert!(scheduler.observers().is_empty());
    }

    #[test]
    fn test_observer_added_while_running_is_polled_without_initialize() {
        let scheduler = PollingScheduler::new(Duration::from_millis(5));
        scheduler.start().unwrap();

        let late = Arc::new(CountingObserver::default());
        scheduler.add_observer(late.clone());
        assert!(wait_until(|| late.checks() >= 1));
        assert_eq!(late.initialized.load(Ordering::SeqCst), 0);

        scheduler.stop_with_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(late.destroyed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_stops_running_scheduler() {
        let observer = Arc::new(CountingObserver::default());
        {
            let scheduler = PollingScheduler::new(Duration::from_millis(5));
            scheduler.add_observer(observer.clone());
            scheduler.start().unwrap();
            assert!(wait_until(|| observer.checks() >= 1));
        }
        assert!(wait_until(|| observer.destroyed.load(Ordering::SeqCst) == 1));
    }

    #[test]
    fn test_thread_name_and_debug() {
        let scheduler =
            PollingScheduler::new(Duration::from_millis(250)).with_thread_name("docs-poller");
        assert_eq!(scheduler.interval(), Duration::from_millis(250));

        let debug = format!("{:?}", scheduler);
        assert!(debug.contains("docs-poller"));
        assert!(debug.contains("running: false"));
    }

    #[test_log::test]
    fn test_end_to_end_with_directory_observer() {
        let temp_dir = TempDir::new().unwrap();
        let observer = DirectoryObserver::new(temp_dir.path()).unwrap();
        let (listener, mut receiver) = ChannelListener::channel();
        observer.add_listener(Arc::new(listener));

        let scheduler = PollingScheduler::new(Duration::from_millis(10));
        scheduler.add_observer(Arc::new(observer));
        scheduler.start().unwrap();

        let file = temp_dir.path().join("a.txt");
        fs::write(&file, b"hello").unwrap();

        let mut seen = Vec::new();
        let found = wait_until(|| {
            while let Ok(event) = receiver.try_recv() {
                seen.push(event);
            }
            seen.contains(&MonitorEvent::new(EventKind::FileCreate, &file))
        });
        scheduler.stop_with_timeout(Duration::from_secs(5)).unwrap();

        assert!(found, "no create event in {:?}", seen);
        let creates = seen
            .iter()
            .filter(|event| event.kind == EventKind::FileCreate)
            .count();
        assert_eq!(creates, 1);
    }
}
