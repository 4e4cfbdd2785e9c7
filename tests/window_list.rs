use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use capture_sample::window_events::{LocalEventSource, WindowEvent, WindowEventKind};
use capture_sample::window_filter::{CloakReason, WindowProbe};
use capture_sample::window_list::WindowListObserver;
use capture_sample::{WindowHandle, WindowInfo, WindowList};

#[derive(Default)]
struct DesktopProbe {
    titles: Mutex<HashMap<WindowHandle, String>>,
    order: Mutex<Vec<WindowHandle>>,
}

impl DesktopProbe {
    fn open(&self, handle: isize, title: &str) -> WindowHandle {
        let handle = WindowHandle(handle);
        self.titles.lock().unwrap().insert(handle, title.to_string());
        self.order.lock().unwrap().push(handle);
        handle
    }
}

impl WindowProbe for DesktopProbe {
    fn top_level_windows(&self) -> Result<Vec<WindowHandle>> {
        Ok(self.order.lock().unwrap().clone())
    }

    fn shell_window(&self) -> Option<WindowHandle> {
        None
    }

    fn title(&self, window: WindowHandle) -> String {
        self.titles.lock().unwrap().get(&window).cloned().unwrap_or_default()
    }

    fn is_visible(&self, _window: WindowHandle) -> bool {
        true
    }

    fn root_ancestor(&self, window: WindowHandle) -> Option<WindowHandle> {
        Some(window)
    }

    fn is_disabled(&self, _window: WindowHandle) -> bool {
        false
    }

    fn cloak_reason(&self, _window: WindowHandle) -> Option<CloakReason> {
        None
    }
}

#[derive(Default)]
struct RecordingObserver {
    calls: Mutex<Vec<String>>,
}

impl RecordingObserver {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl WindowListObserver for RecordingObserver {
    fn append(&self, title: &str) -> Result<()> {
        self.calls.lock().unwrap().push(format!("append {}", title));
        Ok(())
    }

    fn remove_at(&self, index: usize) -> Result<()> {
        self.calls.lock().unwrap().push(format!("remove_at {}", index));
        Ok(())
    }

    fn reset_and_repopulate(&self, windows: &[WindowInfo]) -> Result<()> {
        let titles: Vec<_> = windows.iter().map(|w| w.title.as_str()).collect();
        self.calls
            .lock()
            .unwrap()
            .push(format!("reset [{}]", titles.join(", ")));
        Ok(())
    }
}

fn titles(list: &WindowList) -> Vec<String> {
    list.windows().into_iter().map(|w| w.title).collect()
}

fn empty_list() -> WindowList {
    WindowList::new(Arc::new(DesktopProbe::default()), &LocalEventSource::new()).unwrap()
}

#[test]
fn add_then_remove_keeps_display_order() {
    let list = empty_list();
    let notepad = WindowInfo::new(WindowHandle(0x10), "Notepad");
    let calculator = WindowInfo::new(WindowHandle(0x20), "Calculator");

    assert!(list.add_window(notepad.clone()).unwrap());
    assert!(list.add_window(calculator.clone()).unwrap());
    assert_eq!(titles(&list), vec!["Notepad", "Calculator"]);

    assert!(list.remove_window(&notepad).unwrap());
    assert_eq!(titles(&list), vec!["Calculator"]);
    assert!(!list.contains(notepad.handle));
}

#[test]
fn adding_a_known_handle_is_a_no_op() {
    let list = empty_list();
    list.add_window(WindowInfo::new(WindowHandle(7), "Editor")).unwrap();

    // Same handle, new title: still the first entry.
    assert!(!list.add_window(WindowInfo::new(WindowHandle(7), "Editor - saved")).unwrap());
    assert_eq!(titles(&list), vec!["Editor"]);
}

#[test]
fn removing_an_unknown_handle_changes_nothing() {
    let list = empty_list();
    list.add_window(WindowInfo::new(WindowHandle(1), "Terminal")).unwrap();

    assert!(!list.remove_handle(WindowHandle(99)).unwrap());
    assert_eq!(titles(&list), vec!["Terminal"]);
}

#[test]
fn observer_mirrors_every_change() {
    let list = empty_list();
    list.add_window(WindowInfo::new(WindowHandle(1), "Mail")).unwrap();

    let observer = Arc::new(RecordingObserver::default());
    list.attach_observer(observer.clone()).unwrap();
    list.add_window(WindowInfo::new(WindowHandle(2), "Browser")).unwrap();
    list.add_window(WindowInfo::new(WindowHandle(2), "Browser")).unwrap();
    list.remove_handle(WindowHandle(1)).unwrap();
    list.remove_handle(WindowHandle(1)).unwrap();

    assert_eq!(
        observer.calls(),
        vec!["reset [Mail]", "append Browser", "remove_at 0"]
    );

    let dyn_observer: Arc<dyn WindowListObserver> = observer.clone();
    assert!(list.detach_observer(&dyn_observer).unwrap());
    list.add_window(WindowInfo::new(WindowHandle(3), "Music")).unwrap();
    assert_eq!(observer.calls().len(), 3);
}

#[test]
fn events_keep_the_list_in_sync_with_the_desktop() {
    let probe = Arc::new(DesktopProbe::default());
    probe.open(1, "Notepad");
    let events = LocalEventSource::new();
    let list = WindowList::new(probe.clone(), &events).unwrap();

    let calculator = probe.open(2, "Calculator");
    events.emit(WindowEvent::for_window(calculator, WindowEventKind::Show));
    events.emit(WindowEvent::for_window(calculator, WindowEventKind::Uncloaked));
    assert_eq!(titles(&list), vec!["Notepad", "Calculator"]);

    events.emit(WindowEvent::for_window(WindowHandle(1), WindowEventKind::Destroy));
    assert_eq!(titles(&list), vec!["Calculator"]);
}

#[test]
fn random_add_remove_sequences_keep_handles_unique() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let list = empty_list();
    let mut expected: Vec<isize> = Vec::new();

    for step in 0..500 {
        let handle = rng.gen_range(1..=24isize);
        if rng.gen_bool(0.6) {
            let added = list
                .add_window(WindowInfo::new(WindowHandle(handle), format!("Window {}", step)))
                .unwrap();
            assert_eq!(added, !expected.contains(&handle));
            if added {
                expected.push(handle);
            }
        } else {
            let removed = list.remove_handle(WindowHandle(handle)).unwrap();
            assert_eq!(removed, expected.contains(&handle));
            expected.retain(|h| *h != handle);
        }

        let handles: Vec<isize> = list.windows().iter().map(|w| w.handle.0).collect();
        assert_eq!(handles, expected);
        let unique: HashSet<_> = handles.iter().collect();
        assert_eq!(unique.len(), handles.len());
    }
}

#[test]
fn notification_thread_and_caller_mutations_are_serialized() {
    let probe = Arc::new(DesktopProbe::default());
    for handle in 1..=40 {
        probe.open(handle, &format!("Window {}", handle));
    }
    let events = LocalEventSource::new();
    let list = WindowList::new(probe, &events).unwrap();

    let notifier = {
        let events = events.clone();
        std::thread::spawn(move || {
            let mut rng = StdRng::seed_from_u64(1);
            for _ in 0..2000 {
                let handle = WindowHandle(rng.gen_range(1..=40isize));
                let kind = if rng.gen_bool(0.5) {
                    WindowEventKind::Show
                } else {
                    WindowEventKind::Destroy
                };
                events.emit(WindowEvent::for_window(handle, kind));
            }
        })
    };

    let mut rng = StdRng::seed_from_u64(2);
    for _ in 0..2000 {
        let handle = rng.gen_range(1..=40isize);
        if rng.gen_bool(0.5) {
            list.add_window(WindowInfo::new(WindowHandle(handle), format!("Window {}", handle)))
                .unwrap();
        } else {
            list.remove_handle(WindowHandle(handle)).unwrap();
        }
    }
    notifier.join().unwrap();

    let windows = list.windows();
    let unique: HashSet<_> = windows.iter().map(|w| w.handle).collect();
    assert_eq!(unique.len(), windows.len());
    assert_eq!(list.len(), windows.len());
    for handle in 1..=40 {
        let handle = WindowHandle(handle);
        assert_eq!(list.contains(handle), unique.contains(&handle));
    }
}
