use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use tray_icon::menu::MenuEvent;
use tray_icon::{TrayIcon, TrayIconBuilder, TrayIconEvent};
use winit::event::{Event, StartCause};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop, EventLoopProxy};

use crate::browser::open_url;
use crate::config::{ConfigStore, Settings, data_dir_candidates, resolve_data_dir};
use crate::instance::{InstanceError, InstanceLock};
use crate::ipc::{self, Command, Endpoint, IpcServer};
use crate::launch::{
    disable_launch_at_login, enable_launch_at_login, is_launch_at_login_enabled,
};
use crate::model::*;
use crate::ui::icon::load_tray_icon;
use crate::ui::menu::{TrayMenu, build_menu, build_tooltip, parse_menu_action};

/// Application identity. Lock and rendezvous names derive from it, so it must
/// not change between builds that should recognise each other.
pub const APP_NAME: &str = "WebLauncher";

const MENU_POLL_INTERVAL: Duration = Duration::from_millis(100);

type SharedProxy = Arc<Mutex<EventLoopProxy<UserEvent>>>;

#[derive(Clone, Copy, Debug, Default)]
pub struct LaunchOptions {
    /// Stay resident in the tray regardless of `trayMode`.
    pub force_tray: bool,
    /// Open the page and exit regardless of `trayMode`. Wins over `force_tray`.
    pub open_once: bool,
    /// Built-in defaults only: no config file, no live reload.
    pub static_config: bool,
}

pub fn lock_name() -> String {
    format!("{APP_NAME}_SingleInstance")
}

pub fn ipc_endpoint() -> Endpoint {
    Endpoint::for_app(&format!("{APP_NAME}_IPC"))
}

pub fn run(options: LaunchOptions) -> Result<()> {
    let instance = match InstanceLock::acquire(&lock_name()) {
        Ok(lock) => Some(lock),
        Err(InstanceError::AlreadyRunning) => {
            hand_off_to_running_instance();
            return Ok(());
        }
        Err(e) => {
            warn!("{}; continuing without single-instance protection", e);
            None
        }
    };

    let data_dir = config_dir(options.static_config, || resolve_data_dir(APP_NAME))?;
    let store = ConfigStore::open(&data_dir, options.static_config)
        .context("failed to load configuration")?;

    if !resolve_tray_mode(options, store.tray_mode()) {
        return open_url(&store.url());
    }

    if let Err(e) = apply_auto_start(&store) {
        warn!("Failed to apply launch-at-login setting: {:#}", e);
    }

    run_tray(store, instance)
}

/// Static mode never touches the disk, so it does not need a writable
/// directory; the path is only shown, never written.
fn config_dir(
    static_config: bool,
    resolve: impl FnOnce() -> Result<PathBuf>,
) -> Result<PathBuf> {
    if static_config {
        return Ok(data_dir_candidates(APP_NAME)
            .into_iter()
            .next()
            .unwrap_or_else(std::env::temp_dir));
    }
    resolve().context("no writable location for the config file")
}

fn resolve_tray_mode(options: LaunchOptions, configured: bool) -> bool {
    if options.open_once {
        false
    } else {
        options.force_tray || configured
    }
}

fn hand_off_to_running_instance() {
    match ipc::notify(&ipc_endpoint(), Command::OpenUrl) {
        Ok(()) => info!("{} is already running; asked it to open the page", APP_NAME),
        Err(e) => warn!("{} is already running but did not respond: {:#}", APP_NAME, e),
    }
}

/// Writes the login item to match `autoStart`, then records what the system
/// actually reports.
fn apply_auto_start(store: &ConfigStore) -> Result<()> {
    let wanted = store.auto_start();
    if wanted {
        enable_launch_at_login(APP_NAME)?;
    } else {
        disable_launch_at_login(APP_NAME)?;
    }

    let actual = is_launch_at_login_enabled(APP_NAME)?;
    if actual != wanted {
        warn!("Launch-at-login is {} despite request", if actual { "on" } else { "off" });
        store.set_auto_start(actual);
    }
    Ok(())
}

fn post(proxy: &SharedProxy, event: UserEvent) {
    let proxy = proxy.lock().unwrap_or_else(PoisonError::into_inner);
    if proxy.send_event(event).is_err() {
        debug!("Event loop closed, dropping event");
    }
}

fn run_tray(store: ConfigStore, instance: Option<InstanceLock>) -> Result<()> {
    let event_loop = EventLoop::<UserEvent>::with_user_event()
        .build()
        .context("failed to create event loop")?;
    let proxy: SharedProxy = Arc::new(Mutex::new(event_loop.create_proxy()));

    let mut startup_feedback = None;
    let ipc_server = {
        let proxy = proxy.clone();
        match IpcServer::listen(ipc_endpoint(), move |command| match command {
            Command::OpenUrl => post(&proxy, UserEvent::OpenUrlRequested),
        }) {
            Ok(server) => Some(server),
            Err(e) => {
                warn!("Second-launch hand-off unavailable: {:#}", e);
                startup_feedback = Some(Feedback::warning(
                    "Second-launch hand-off unavailable".to_string(),
                ));
                None
            }
        }
    };

    {
        let proxy = proxy.clone();
        store.set_on_change(move |settings| {
            post(&proxy, UserEvent::ConfigChanged(settings.clone()))
        });
    }
    if let Err(e) = store.start_watching() {
        warn!("Live config reload disabled: {:#}", e);
    }

    #[cfg(target_os = "linux")]
    gtk::init().context("failed to initialize GTK")?;

    let mut app = TrayApp::new(store, startup_feedback)?;
    app.open_page();

    let menu_receiver = MenuEvent::receiver().clone();
    let tray_receiver = TrayIconEvent::receiver().clone();
    let mut ipc_server = ipc_server;
    let mut instance = instance;

    #[allow(deprecated)]
    let run_result = event_loop.run(move |event, event_loop| match event {
        Event::NewEvents(StartCause::Init) => {
            event_loop
                .set_control_flow(ControlFlow::WaitUntil(Instant::now() + MENU_POLL_INTERVAL));
        }
        Event::NewEvents(StartCause::ResumeTimeReached { .. }) => {
            #[cfg(target_os = "linux")]
            while gtk::events_pending() {
                gtk::main_iteration_do(false);
            }

            while let Ok(event) = menu_receiver.try_recv() {
                if let Some(action) = parse_menu_action(event.id()) {
                    app.handle_menu_action(action, event_loop);
                }
            }
            while let Ok(event) = tray_receiver.try_recv() {
                if matches!(event, TrayIconEvent::DoubleClick { .. }) {
                    app.open_page();
                }
            }
            event_loop
                .set_control_flow(ControlFlow::WaitUntil(Instant::now() + MENU_POLL_INTERVAL));
        }
        Event::UserEvent(user_event) => match user_event {
            UserEvent::OpenUrlRequested => {
                info!("Second launch requested the page");
                app.open_page();
            }
            UserEvent::ConfigChanged(settings) => app.apply_settings(settings),
        },
        Event::LoopExiting => {
            app.store.stop_watching();
            if let Some(mut server) = ipc_server.take() {
                server.shutdown();
            }
            if let Some(mut lock) = instance.take() {
                lock.release();
            }
            info!("{} exiting", APP_NAME);
        }
        _ => {}
    });

    run_result.context("event loop terminated with error")?;
    Ok(())
}

/// UI-thread state. Background threads reach it only through `UserEvent`s.
struct TrayApp {
    store: ConfigStore,
    settings: Settings,
    tray_icon: TrayIcon,
    menu: TrayMenu,
    last_feedback: Option<Feedback>,
}

impl TrayApp {
    fn new(store: ConfigStore, last_feedback: Option<Feedback>) -> Result<Self> {
        let settings = store.snapshot();
        let menu = build_menu(&settings, store.is_static()).context("failed to build menu")?;
        let icon = load_tray_icon(&settings.icon).context("failed to create tray icon image")?;
        let tray_icon = TrayIconBuilder::new()
            .with_icon(icon)
            .with_menu(Box::new(menu.menu.clone()))
            .with_tooltip(build_tooltip(&settings.title, last_feedback.as_ref()))
            .with_title(&settings.title)
            .build()
            .context("failed to create tray icon")?;
        tray_icon
            .set_visible(true)
            .context("failed to show tray icon")?;

        Ok(Self {
            store,
            settings,
            tray_icon,
            menu,
            last_feedback,
        })
    }

    fn handle_menu_action(&mut self, action: MenuAction, event_loop: &ActiveEventLoop) {
        match action {
            MenuAction::OpenUrl => self.open_page(),
            MenuAction::ToggleAutoStart => self.toggle_auto_start(),
            MenuAction::ReloadConfig => {
                // Success comes back through the change callback.
                if let Err(e) = self.store.reload() {
                    warn!("Manual reload failed: {:#}", e);
                    self.set_feedback(Feedback::error(format!("Reload failed: {}", e)));
                }
            }
            MenuAction::EditConfig => {
                let path = self.store.path().to_path_buf();
                let feedback = match open::that_detached(&path) {
                    Ok(()) => Feedback::info(format!("Opened {}", path.display())),
                    Err(e) => Feedback::error(format!("Failed to open {}: {}", path.display(), e)),
                };
                self.set_feedback(feedback);
            }
            MenuAction::Quit => event_loop.exit(),
        }
    }

    fn open_page(&mut self) {
        if let Err(e) = open_url(&self.store.url()) {
            warn!("{:#}", e);
            self.set_feedback(Feedback::error(format!("{:#}", e)));
        }
    }

    fn toggle_auto_start(&mut self) {
        let enabled = !self.store.auto_start();
        self.store.set_auto_start(enabled);

        let feedback = match apply_auto_start(&self.store) {
            Ok(()) if self.store.auto_start() == enabled => Feedback::info(if enabled {
                "Start at login enabled".to_string()
            } else {
                "Start at login disabled".to_string()
            }),
            Ok(()) => Feedback::warning("Login item needs approval in system settings".to_string()),
            Err(e) => {
                warn!("Failed to toggle launch-at-login: {:#}", e);
                Feedback::error(format!("Failed to toggle start at login: {}", e))
            }
        };
        self.settings = self.store.snapshot();
        self.set_feedback(feedback);
    }

    fn apply_settings(&mut self, settings: Settings) {
        let previous = std::mem::replace(&mut self.settings, settings);
        if previous.auto_start != self.settings.auto_start {
            if let Err(e) = apply_auto_start(&self.store) {
                warn!("Failed to apply launch-at-login setting: {:#}", e);
            }
        }
        if previous.icon != self.settings.icon {
            match load_tray_icon(&self.settings.icon) {
                Ok(icon) => {
                    if let Err(e) = self.tray_icon.set_icon(Some(icon)) {
                        error!("Failed to update tray icon: {}", e);
                    }
                }
                Err(e) => error!("Failed to load tray icon: {:#}", e),
            }
        }
        self.set_feedback(Feedback::info("Configuration reloaded".to_string()));
    }

    fn set_feedback(&mut self, feedback: Feedback) {
        self.last_feedback = Some(feedback);
        self.refresh();
    }

    fn refresh(&self) {
        self.menu.sync(&self.settings, self.store.is_static());
        let tooltip = build_tooltip(&self.settings.title, self.last_feedback.as_ref());
        if let Err(e) = self.tray_icon.set_tooltip(Some(tooltip.as_str())) {
            error!("Failed to update tooltip: {}", e);
        }
        self.tray_icon.set_title(Some(self.settings.title.as_str()));
    }
}
