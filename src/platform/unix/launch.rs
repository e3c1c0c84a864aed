//! Launch-at-login for Linux (XDG autostart entry) and macOS (SMAppService on
//! 13+, LaunchAgent before that).

use anyhow::Result;
#[cfg(target_os = "macos")]
use log::{debug, warn};

/// Arguments the login item starts us with: always resident.
const LOGIN_ARGS: &[&str] = &["--tray"];

#[cfg(target_os = "macos")]
fn get_macos_version() -> Result<(u32, u32)> {
    let output = std::process::Command::new("sw_vers")
        .arg("-productVersion")
        .output()?;

    let version_string = String::from_utf8(output.stdout)?;
    let mut parts = version_string.trim().split('.');
    match (parts.next(), parts.next()) {
        (Some(major), minor) => Ok((major.parse()?, minor.unwrap_or("0").parse()?)),
        _ => Err(anyhow::anyhow!("Unable to parse macOS version")),
    }
}

#[cfg(target_os = "macos")]
fn should_use_smappservice() -> bool {
    match get_macos_version() {
        Ok((major, _minor)) => {
            debug!("Detected macOS version: {}.x", major);
            major >= 13
        }
        Err(e) => {
            warn!(
                "Failed to detect macOS version: {}, falling back to LaunchAgent",
                e
            );
            false
        }
    }
}

// ============================================================================
// SMAppService (macOS 13.0+)
// ============================================================================

#[cfg(target_os = "macos")]
mod smapp {
    use anyhow::Result;
    use log::{debug, info, warn};
    use smappservice_rs::{AppService, ServiceStatus, ServiceType};

    pub fn enable() -> Result<()> {
        debug!("Enabling launch-at-login via SMAppService");
        let app_service = AppService::new(ServiceType::MainApp);
        app_service
            .register()
            .map_err(|e| anyhow::anyhow!("Failed to register with SMAppService: {}", e))?;
        info!("Registered with SMAppService");

        if app_service.status() == ServiceStatus::RequiresApproval {
            warn!("Launch-at-login requires user approval in System Settings");
            AppService::open_system_settings_login_items();
        }
        Ok(())
    }

    pub fn disable() -> Result<()> {
        debug!("Disabling launch-at-login via SMAppService");
        AppService::new(ServiceType::MainApp)
            .unregister()
            .map_err(|e| anyhow::anyhow!("Failed to unregister from SMAppService: {}", e))
    }

    pub fn is_enabled() -> Result<bool> {
        let status = AppService::new(ServiceType::MainApp).status();
        Ok(status == ServiceStatus::Enabled || status == ServiceStatus::RequiresApproval)
    }
}

// ============================================================================
// auto-launch (LaunchAgent on macOS, XDG autostart on Linux)
// ============================================================================

mod login_item {
    use anyhow::Result;
    use auto_launch::AutoLaunchBuilder;
    use log::{debug, info};

    fn get_auto_launch(app_name: &str) -> Result<auto_launch::AutoLaunch> {
        let exe_path = std::env::current_exe()?;
        let app_path = exe_path
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid executable path"))?;

        let mut builder = AutoLaunchBuilder::new();
        builder
            .set_app_name(app_name)
            .set_app_path(app_path)
            .set_args(super::LOGIN_ARGS);
        #[cfg(target_os = "macos")]
        builder.set_use_launch_agent(true);

        builder
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create auto-launch config: {}", e))
    }

    pub fn enable(app_name: &str) -> Result<()> {
        debug!("Enabling launch-at-login for {}", app_name);
        get_auto_launch(app_name)?
            .enable()
            .map_err(|e| anyhow::anyhow!("Failed to enable login item: {}", e))?;
        info!("Enabled launch-at-login for {}", app_name);
        Ok(())
    }

    pub fn disable(app_name: &str) -> Result<()> {
        let auto = get_auto_launch(app_name)?;
        if !auto.is_enabled().unwrap_or(false) {
            return Ok(());
        }
        auto.disable()
            .map_err(|e| anyhow::anyhow!("Failed to disable login item: {}", e))?;
        info!("Disabled launch-at-login for {}", app_name);
        Ok(())
    }

    pub fn is_enabled(app_name: &str) -> Result<bool> {
        get_auto_launch(app_name)?
            .is_enabled()
            .map_err(|e| anyhow::anyhow!("Failed to check login item status: {}", e))
    }
}

// ============================================================================
// Public API
// ============================================================================

pub fn enable_launch_at_login(app_name: &str) -> Result<()> {
    #[cfg(target_os = "macos")]
    if should_use_smappservice() {
        return smapp::enable();
    }
    login_item::enable(app_name)
}

pub fn disable_launch_at_login(app_name: &str) -> Result<()> {
    #[cfg(target_os = "macos")]
    if should_use_smappservice() {
        return smapp::disable();
    }
    login_item::disable(app_name)
}

pub fn is_launch_at_login_enabled(app_name: &str) -> Result<bool> {
    #[cfg(target_os = "macos")]
    if should_use_smappservice() {
        return smapp::is_enabled();
    }
    login_item::is_enabled(app_name)
}
