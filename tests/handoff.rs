//! Second launch hands its request to the lock holder, which answers with the
//! URL from its live settings.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tempfile::TempDir;
use weblauncher::config::{ConfigStore, Settings};
use weblauncher::instance::{InstanceError, InstanceLock};
use weblauncher::ipc::{self, Command, Endpoint, IpcServer};

fn wait_for<T>(opened: &Mutex<Vec<T>>, count: usize) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if opened.lock().unwrap().len() >= count {
            return true;
        }
        thread::sleep(Duration::from_millis(20));
    }
    false
}

#[test]
fn second_launch_signals_first_instance() {
    let identity = format!("WebLauncherHandoff_{}", std::process::id());
    let dir = TempDir::new().unwrap();
    let defaults = Settings {
        url: "http://first.example".into(),
        ..Settings::default()
    };

    // First launch: wins the lock, loads settings, listens.
    let mut primary = InstanceLock::acquire(&identity).unwrap();
    let store = ConfigStore::with_defaults(dir.path(), defaults, false).unwrap();
    let opened = Arc::new(Mutex::new(Vec::new()));
    let endpoint = Endpoint::for_app(&format!("{identity}_IPC"));
    let server = {
        let store = store.clone();
        let opened = opened.clone();
        IpcServer::listen(endpoint.clone(), move |command| {
            assert_eq!(command, Command::OpenUrl);
            opened.lock().unwrap().push(store.url());
        })
        .unwrap()
    };

    // Second launch: loses the lock and notifies instead.
    match InstanceLock::acquire(&identity) {
        Err(InstanceError::AlreadyRunning) => {}
        other => panic!("expected contention, got {:?}", other),
    }
    ipc::notify(&endpoint, Command::OpenUrl).unwrap();

    assert!(wait_for(&opened, 1));
    assert_eq!(opened.lock().unwrap()[0], "http://first.example");

    // Shutdown frees both the endpoint and the lock for the next launch.
    drop(server);
    primary.release();
    assert!(ipc::notify(&endpoint, Command::OpenUrl).is_err());
    let next = InstanceLock::acquire(&identity).unwrap();
    assert!(next.is_held());
}
