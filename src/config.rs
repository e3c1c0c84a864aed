use std::ffi::OsStr;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use log::{debug, info, warn};
use notify::{Event as NotifyEvent, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE_NAME: &str = "config.json";
const TEMP_SUFFIX: &str = ".tmp";
const WRITE_PROBE_NAME: &str = ".write_test";

/// How long watch events are treated as echoes of our own save. Longer than
/// the slowest notification latency seen in practice (Windows).
pub const SELF_WRITE_WINDOW: Duration = Duration::from_millis(500);

static EMBEDDED_CONFIG: &str = include_str!("../assets/config.json");

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub title: String,
    pub url: String,
    /// External icon path; empty means the built-in icon.
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub auto_start: bool,
    #[serde(default = "default_tray_mode")]
    pub tray_mode: bool,
}

fn default_tray_mode() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            title: "WebLauncher".to_string(),
            url: "https://www.example.com".to_string(),
            icon: String::new(),
            auto_start: false,
            tray_mode: default_tray_mode(),
        }
    }
}

impl Settings {
    /// Hard-coded defaults overlaid with the config embedded at build time.
    pub fn builtin() -> Self {
        let mut settings = Self::default();
        match serde_json::from_str::<SettingsOverride>(EMBEDDED_CONFIG) {
            Ok(embedded) => settings.merge(embedded),
            Err(e) => warn!("Ignoring malformed embedded config: {}", e),
        }
        settings
    }

    /// Present, non-empty fields replace; absent or empty ones keep the
    /// current value. `title` and `url` therefore never become empty.
    pub fn merge(&mut self, other: SettingsOverride) {
        if let Some(title) = other.title.filter(|s| !s.is_empty()) {
            self.title = title;
        }
        if let Some(url) = other.url.filter(|s| !s.is_empty()) {
            self.url = url;
        }
        if let Some(icon) = other.icon.filter(|s| !s.is_empty()) {
            self.icon = icon;
        }
        if let Some(auto_start) = other.auto_start {
            self.auto_start = auto_start;
        }
        if let Some(tray_mode) = other.tray_mode {
            self.tray_mode = tray_mode;
        }
    }
}

/// On-disk shape: every field optional, unknown fields ignored.
#[derive(Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct SettingsOverride {
    pub title: Option<String>,
    pub url: Option<String>,
    pub icon: Option<String>,
    pub auto_start: Option<bool>,
    pub tray_mode: Option<bool>,
}

// ============================================================================
// Data directory
// ============================================================================

/// Candidate directories for the config file, most preferred first:
/// next to the executable, the per-user data dir, then the temp dir.
pub fn data_dir_candidates(app_name: &str) -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(exe_dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        candidates.push(exe_dir);
    }
    if let Some(data_dir) = dirs::data_dir() {
        candidates.push(data_dir.join(app_name));
    }
    candidates.push(std::env::temp_dir().join(app_name));
    candidates
}

/// Errors only when no candidate is writable; nothing can be persisted then.
pub fn resolve_data_dir(app_name: &str) -> Result<PathBuf> {
    first_writable_dir(data_dir_candidates(app_name))
}

pub fn first_writable_dir(candidates: impl IntoIterator<Item = PathBuf>) -> Result<PathBuf> {
    for dir in candidates {
        match ensure_writable(&dir) {
            Ok(()) => {
                debug!("Using data directory {}", dir.display());
                return Ok(dir);
            }
            Err(e) => debug!("Data directory {} not usable: {}", dir.display(), e),
        }
    }
    Err(anyhow!("no writable data directory available"))
}

fn ensure_writable(dir: &Path) -> io::Result<()> {
    fs::create_dir_all(dir)?;
    let probe = dir.join(WRITE_PROBE_NAME);
    File::create(&probe)?;
    fs::remove_file(&probe)
}

// ============================================================================
// Store
// ============================================================================

type ChangeCallback = Arc<dyn Fn(&Settings) + Send + Sync>;

struct StoreState {
    settings: Settings,
    static_mode: bool,
}

struct StoreInner {
    state: RwLock<StoreState>,
    path: PathBuf,
    temp_path: PathBuf,
    /// Saves whose echo window is still open. Non-zero means suppressed.
    self_writes: AtomicUsize,
    /// Bytes last written by us or last loaded; identical content on disk is
    /// never treated as an external edit.
    last_seen: Mutex<Option<Vec<u8>>>,
    save_lock: Mutex<()>,
    watcher: Mutex<Option<RecommendedWatcher>>,
    on_change: RwLock<Option<ChangeCallback>>,
    self_write_window: Duration,
}

/// Shared handle to the live settings. Clones refer to the same state.
#[derive(Clone)]
pub struct ConfigStore {
    inner: Arc<StoreInner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ConfigStore {
    /// Loads `config.json` from `dir` over the built-in defaults.
    pub fn open(dir: &Path, static_mode: bool) -> Result<Self> {
        Self::with_defaults(dir, Settings::builtin(), static_mode)
    }

    pub fn with_defaults(dir: &Path, defaults: Settings, static_mode: bool) -> Result<Self> {
        Self::build(dir, defaults, static_mode, SELF_WRITE_WINDOW)
    }

    fn build(
        dir: &Path,
        defaults: Settings,
        static_mode: bool,
        self_write_window: Duration,
    ) -> Result<Self> {
        let path = dir.join(CONFIG_FILE_NAME);
        let store = Self {
            inner: Arc::new(StoreInner {
                state: RwLock::new(StoreState {
                    settings: defaults,
                    static_mode,
                }),
                temp_path: dir.join(format!("{CONFIG_FILE_NAME}{TEMP_SUFFIX}")),
                path,
                self_writes: AtomicUsize::new(0),
                last_seen: Mutex::new(None),
                save_lock: Mutex::new(()),
                watcher: Mutex::new(None),
                on_change: RwLock::new(None),
                self_write_window,
            }),
        };

        if static_mode {
            debug!("Static config mode, skipping {}", store.path().display());
            return Ok(store);
        }

        store.load_or_create();
        Ok(store)
    }

    /// Merges an existing file over memory, or writes memory out when there is
    /// none. A file that cannot be read or parsed is left as is.
    fn load_or_create(&self) -> bool {
        match read_override(self.path()) {
            Ok(Some((external, bytes))) => {
                self.inner.write_state().settings.merge(external);
                *lock(&self.inner.last_seen) = Some(bytes);
                info!("Loaded config from {}", self.path().display());
                true
            }
            Ok(None) => {
                info!("Creating default config at {}", self.path().display());
                if let Err(e) = self.save() {
                    warn!("Failed to create default config: {:#}", e);
                }
                false
            }
            Err(e) => {
                warn!("Using default settings, config unreadable: {:#}", e);
                false
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn snapshot(&self) -> Settings {
        self.inner.read_state().settings.clone()
    }

    pub fn title(&self) -> String {
        self.inner.read_state().settings.title.clone()
    }

    pub fn url(&self) -> String {
        self.inner.read_state().settings.url.clone()
    }

    pub fn icon(&self) -> String {
        self.inner.read_state().settings.icon.clone()
    }

    pub fn auto_start(&self) -> bool {
        self.inner.read_state().settings.auto_start
    }

    pub fn tray_mode(&self) -> bool {
        self.inner.read_state().settings.tray_mode
    }

    pub fn is_static(&self) -> bool {
        self.inner.read_state().static_mode
    }

    /// Updates memory immediately; the file is written in the background.
    pub fn set_auto_start(&self, enabled: bool) {
        self.inner.write_state().settings.auto_start = enabled;
        self.persist_in_background();
    }

    /// Leaving static mode loads the file (or creates it when missing) and
    /// starts the watch; entering it stops the watch.
    pub fn set_static(&self, enabled: bool) -> Result<()> {
        {
            let mut state = self.inner.write_state();
            if state.static_mode == enabled {
                return Ok(());
            }
            state.static_mode = enabled;
        }

        if enabled {
            self.stop_watching();
            return Ok(());
        }

        if self.load_or_create() {
            self.inner.fire_change(&self.snapshot());
        }
        self.start_watching()
    }

    /// Invoked from the watcher thread after an external edit, and from
    /// [`ConfigStore::reload`].
    pub fn set_on_change<F>(&self, callback: F)
    where
        F: Fn(&Settings) + Send + Sync + 'static,
    {
        *self
            .inner
            .on_change
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(callback));
    }

    /// Writes the current settings atomically. No-op in static mode.
    pub fn save(&self) -> Result<()> {
        self.inner.save()
    }

    /// Re-reads the file, merges it and notifies. Used for manual reloads;
    /// in static mode returns the in-memory settings untouched.
    pub fn reload(&self) -> Result<Settings> {
        if self.is_static() {
            return Ok(self.snapshot());
        }
        let (external, bytes) = read_override(self.path())?
            .ok_or_else(|| anyhow!("{} does not exist", self.path().display()))?;
        *lock(&self.inner.last_seen) = Some(bytes);
        let settings = self.inner.merge_external(external);
        self.inner.fire_change(&settings);
        Ok(settings)
    }

    /// Watches the containing directory (per-file watches are unreliable on
    /// some platforms) and applies external edits of the config file.
    pub fn start_watching(&self) -> Result<()> {
        if self.is_static() {
            debug!("Static config mode, not watching");
            return Ok(());
        }
        let mut slot = lock(&self.inner.watcher);
        if slot.is_some() {
            return Ok(());
        }

        let dir = self
            .path()
            .parent()
            .ok_or_else(|| anyhow!("config path has no parent directory"))?
            .to_path_buf();
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<NotifyEvent>| {
                let _ = tx.send(res);
            },
            notify::Config::default(),
        )
        .context("failed to create config watcher")?;
        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("failed to watch {}", dir.display()))?;

        // Weak so the watcher thread never keeps the store alive. The loop
        // ends when the watcher (and with it the sender) is dropped.
        let store = Arc::downgrade(&self.inner);
        thread::Builder::new()
            .name("config-watch".into())
            .spawn(move || {
                for result in rx {
                    match result {
                        Ok(event) => {
                            let Some(inner) = store.upgrade() else { break };
                            inner.handle_event(&event);
                        }
                        Err(e) => warn!("Config watch error: {}", e),
                    }
                }
                debug!("Config watcher stopped");
            })
            .context("failed to spawn config watcher thread")?;

        debug!("Config watcher started for {}", dir.display());
        *slot = Some(watcher);
        Ok(())
    }

    pub fn stop_watching(&self) {
        if lock(&self.inner.watcher).take().is_some() {
            debug!("Stopping config watcher");
        }
    }

    pub fn is_watching(&self) -> bool {
        lock(&self.inner.watcher).is_some()
    }

    fn persist_in_background(&self) {
        if self.is_static() {
            return;
        }
        let inner = self.inner.clone();
        let spawned = thread::Builder::new()
            .name("config-save".into())
            .spawn(move || {
                if let Err(e) = inner.save() {
                    warn!("Failed to save config, keeping in-memory settings: {:#}", e);
                }
            });
        if let Err(e) = spawned {
            warn!("Failed to spawn config save thread: {}", e);
        }
    }
}

impl StoreInner {
    fn read_state(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn save(self: &Arc<Self>) -> Result<()> {
        let _serialized = lock(&self.save_lock);
        let data = {
            let state = self.read_state();
            if state.static_mode {
                return Ok(());
            }
            serde_json::to_vec_pretty(&state.settings).context("failed to serialize config")?
        };

        // Suppression starts before the temp file exists.
        self.self_writes.fetch_add(1, Ordering::SeqCst);
        let previous = lock(&self.last_seen).replace(data.clone());

        if let Err(e) = write_atomically(&self.path, &self.temp_path, &data) {
            *lock(&self.last_seen) = previous;
            self.self_writes.fetch_sub(1, Ordering::SeqCst);
            let _ = fs::remove_file(&self.temp_path);
            return Err(e);
        }
        debug!("Saved config to {}", self.path.display());

        let inner = Arc::downgrade(self);
        let window = self.self_write_window;
        let cleared = thread::Builder::new()
            .name("config-echo".into())
            .spawn(move || {
                thread::sleep(window);
                if let Some(inner) = inner.upgrade() {
                    inner.self_writes.fetch_sub(1, Ordering::SeqCst);
                }
            });
        if cleared.is_err() {
            // Without the timer nothing would ever end the window.
            self.self_writes.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn handle_event(&self, event: &NotifyEvent) {
        if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
            return;
        }
        let file_name = OsStr::new(CONFIG_FILE_NAME);
        if !event.paths.iter().any(|p| p.file_name() == Some(file_name)) {
            return;
        }
        if self.self_writes.load(Ordering::SeqCst) > 0 {
            debug!("Ignoring config event from our own save");
            return;
        }
        self.apply_external_edit();
    }

    fn apply_external_edit(&self) {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!("Config vanished or unreadable during reload: {}", e);
                return;
            }
        };
        // Editors truncate before writing; the follow-up event carries data.
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return;
        }
        if lock(&self.last_seen).as_deref() == Some(bytes.as_slice()) {
            debug!("Config content unchanged, skipping reload");
            return;
        }

        let external: SettingsOverride = match serde_json::from_slice(&bytes) {
            Ok(external) => external,
            Err(e) => {
                warn!("Ignoring malformed config edit: {}", e);
                return;
            }
        };
        *lock(&self.last_seen) = Some(bytes);

        if self.read_state().static_mode {
            return;
        }
        info!("Config changed on disk, reloading");
        let settings = self.merge_external(external);
        self.fire_change(&settings);
    }

    fn merge_external(&self, external: SettingsOverride) -> Settings {
        let mut state = self.write_state();
        state.settings.merge(external);
        state.settings.clone()
    }

    fn fire_change(&self, settings: &Settings) {
        let callback = self
            .on_change
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(callback) = callback {
            callback(settings);
        }
    }
}

/// `Ok(None)` when the file does not exist.
fn read_override(path: &Path) -> Result<Option<(SettingsOverride, Vec<u8>)>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(e).with_context(|| format!("failed to read {}", path.display()));
        }
    };
    let parsed = serde_json::from_slice(&bytes)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(Some((parsed, bytes)))
}

/// Temp file then rename, so readers see either the old or the new document.
fn write_atomically(path: &Path, temp_path: &Path, data: &[u8]) -> Result<()> {
    let mut file = File::create(temp_path)
        .with_context(|| format!("failed to create {}", temp_path.display()))?;
    file.write_all(data)
        .and_then(|()| file.sync_all())
        .with_context(|| format!("failed to write {}", temp_path.display()))?;
    drop(file);
    fs::rename(temp_path, path)
        .with_context(|| format!("failed to replace {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use std::time::Instant;
    use tempfile::TempDir;

    fn defaults() -> Settings {
        Settings {
            title: "D".into(),
            url: "http://d".into(),
            ..Settings::default()
        }
    }

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(25));
        }
        false
    }

    fn recorder(store: &ConfigStore) -> Arc<StdMutex<Vec<Settings>>> {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = seen.clone();
        store.set_on_change(move |s| sink.lock().unwrap().push(s.clone()));
        seen
    }

    #[test]
    fn merge_keeps_defaults_for_absent_and_empty_fields() {
        let mut settings = defaults();
        settings.merge(serde_json::from_str(r#"{"url": "http://o", "title": ""}"#).unwrap());
        assert_eq!(settings.title, "D");
        assert_eq!(settings.url, "http://o");
        assert!(!settings.auto_start);
        assert!(settings.tray_mode);
    }

    #[test]
    fn override_ignores_unknown_fields() {
        let parsed: SettingsOverride =
            serde_json::from_str(r#"{"autoStart": true, "theme": "dark", "nested": {"a": 1}}"#)
                .unwrap();
        assert_eq!(parsed.auto_start, Some(true));
        assert!(parsed.title.is_none());
    }

    #[test]
    fn builtin_matches_embedded_config() {
        let settings = Settings::builtin();
        assert!(!settings.title.is_empty());
        assert!(!settings.url.is_empty());
        assert!(settings.tray_mode);
    }

    #[test]
    fn open_merges_existing_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(CONFIG_FILE_NAME), r#"{"url": "http://o"}"#).unwrap();

        let store = ConfigStore::with_defaults(dir.path(), defaults(), false).unwrap();
        assert_eq!(store.title(), "D");
        assert_eq!(store.url(), "http://o");
    }

    #[test]
    fn open_creates_missing_file_with_two_space_indent() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::with_defaults(dir.path(), defaults(), false).unwrap();

        let written = fs::read_to_string(store.path()).unwrap();
        assert!(written.contains("\n  \"title\": \"D\""));
        assert!(written.contains("\"autoStart\": false"));
        assert!(written.contains("\"trayMode\": true"));
        assert!(!dir.path().join("config.json.tmp").exists());
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "{ not json").unwrap();

        let store = ConfigStore::with_defaults(dir.path(), defaults(), false).unwrap();
        assert_eq!(store.snapshot(), defaults());
        // The broken file is left for the user to fix.
        assert_eq!(fs::read_to_string(&path).unwrap(), "{ not json");
    }

    #[test]
    fn saved_settings_survive_restart() {
        let dir = TempDir::new().unwrap();
        let first_run = Settings {
            title: "X".into(),
            url: "http://a".into(),
            ..Settings::default()
        };
        let store = ConfigStore::with_defaults(dir.path(), first_run, false).unwrap();
        store.set_auto_start(true);
        store.save().unwrap();
        drop(store);

        let reopened = ConfigStore::with_defaults(dir.path(), defaults(), false).unwrap();
        assert_eq!(reopened.title(), "X");
        assert_eq!(reopened.url(), "http://a");
        assert!(reopened.auto_start());
    }

    #[test]
    fn set_auto_start_persists_in_background() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::with_defaults(dir.path(), defaults(), false).unwrap();

        store.set_auto_start(true);
        assert!(store.auto_start());
        assert!(wait_until(|| {
            fs::read_to_string(store.path())
                .map(|s| s.contains("\"autoStart\": true"))
                .unwrap_or(false)
        }));
    }

    #[test]
    fn static_mode_never_touches_disk() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::with_defaults(dir.path(), defaults(), true).unwrap();
        assert!(!store.path().exists());

        store.start_watching().unwrap();
        assert!(!store.is_watching());

        store.set_auto_start(true);
        assert!(store.auto_start());
        thread::sleep(Duration::from_millis(300));
        assert!(!store.path().exists());
        assert!(!dir.path().join("config.json.tmp").exists());
    }

    #[test]
    fn leaving_static_mode_creates_file_and_watches() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::with_defaults(dir.path(), defaults(), true).unwrap();

        store.set_static(false).unwrap();
        assert!(store.path().exists());
        assert!(store.is_watching());

        store.set_static(true).unwrap();
        assert!(!store.is_watching());
    }

    #[test]
    fn leaving_static_mode_keeps_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, r#"{"title":"Mine","url":"http://mine"}"#).unwrap();
        let store = ConfigStore::with_defaults(dir.path(), defaults(), true).unwrap();
        assert_eq!(store.title(), "D");

        store.set_static(false).unwrap();
        assert_eq!(store.title(), "Mine");
        assert_eq!(store.url(), "http://mine");

        store.set_auto_start(true);
        assert!(wait_until(|| {
            fs::read_to_string(&path)
                .map(|s| s.contains("\"autoStart\": true"))
                .unwrap_or(false)
        }));
        let saved: Settings = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved.title, "Mine");
        assert_eq!(saved.url, "http://mine");
        assert!(saved.auto_start);
    }

    #[test]
    fn own_save_does_not_fire_change() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::with_defaults(dir.path(), defaults(), false).unwrap();
        let seen = recorder(&store);
        store.start_watching().unwrap();

        store.set_auto_start(true);
        assert!(wait_until(|| {
            fs::read_to_string(store.path())
                .map(|s| s.contains("\"autoStart\": true"))
                .unwrap_or(false)
        }));
        thread::sleep(SELF_WRITE_WINDOW + Duration::from_millis(500));

        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn echo_after_window_is_recognised_by_content() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::build(dir.path(), defaults(), false, Duration::ZERO).unwrap();
        let seen = recorder(&store);
        store.start_watching().unwrap();

        store.save().unwrap();
        store.set_auto_start(true);
        thread::sleep(Duration::from_millis(800));

        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn external_edit_fires_change_with_merged_settings() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::with_defaults(dir.path(), defaults(), false).unwrap();
        let seen = recorder(&store);
        store.start_watching().unwrap();
        thread::sleep(SELF_WRITE_WINDOW + Duration::from_millis(100));

        fs::write(
            store.path(),
            r#"{"title": "Edited", "autoStart": true, "extra": 1}"#,
        )
        .unwrap();

        assert!(wait_until(|| !seen.lock().unwrap().is_empty()));
        let latest = seen.lock().unwrap().last().cloned().unwrap();
        assert_eq!(latest.title, "Edited");
        assert_eq!(latest.url, "http://d");
        assert!(latest.auto_start);
        assert_eq!(store.title(), "Edited");
    }

    #[test]
    fn malformed_external_edit_keeps_last_good_state() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::with_defaults(dir.path(), defaults(), false).unwrap();
        let seen = recorder(&store);
        store.start_watching().unwrap();
        thread::sleep(SELF_WRITE_WINDOW + Duration::from_millis(100));

        fs::write(store.path(), r#"{"title": 42"#).unwrap();
        thread::sleep(Duration::from_millis(500));

        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(store.snapshot(), defaults());
    }

    #[test]
    fn stopped_watcher_ignores_edits() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::with_defaults(dir.path(), defaults(), false).unwrap();
        let seen = recorder(&store);
        store.start_watching().unwrap();
        store.stop_watching();
        thread::sleep(SELF_WRITE_WINDOW + Duration::from_millis(100));

        fs::write(store.path(), r#"{"title": "Late"}"#).unwrap();
        thread::sleep(Duration::from_millis(500));

        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(store.title(), "D");
    }

    #[test]
    fn manual_reload_merges_and_notifies() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::with_defaults(dir.path(), defaults(), false).unwrap();
        let seen = recorder(&store);

        fs::write(store.path(), r#"{"url": "http://reloaded"}"#).unwrap();
        let settings = store.reload().unwrap();

        assert_eq!(settings.url, "http://reloaded");
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn save_failure_keeps_memory_authoritative() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::build(dir.path(), defaults(), false, Duration::ZERO).unwrap();
        // A directory where the temp file should go makes File::create fail.
        fs::create_dir(dir.path().join("config.json.tmp")).unwrap();
        thread::sleep(Duration::from_millis(100));

        store.inner.write_state().settings.auto_start = true;
        assert!(store.save().is_err());
        assert!(store.auto_start());
        assert_eq!(store.inner.self_writes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn first_writable_dir_skips_unusable_candidates() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "").unwrap();
        let good = dir.path().join("nested").join("data");

        let chosen = first_writable_dir(vec![blocker.join("sub"), good.clone()]).unwrap();
        assert_eq!(chosen, good);
        assert!(!good.join(WRITE_PROBE_NAME).exists());

        assert!(first_writable_dir(vec![blocker.join("sub")]).is_err());
    }
}
