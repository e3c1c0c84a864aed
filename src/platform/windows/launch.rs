//! Windows launch-at-login using the registry Run key

use anyhow::Result;
use winreg::RegKey;
use winreg::enums::*;

const RUN_KEY: &str = r"Software\Microsoft\Windows\CurrentVersion\Run";

fn run_command() -> Result<String> {
    let exe_path = std::env::current_exe()?;
    Ok(format!("\"{}\" --tray", exe_path.to_string_lossy()))
}

/// Enables launch-at-login by adding a value named after the app to the Run key
pub fn enable_launch_at_login(app_name: &str) -> Result<()> {
    let command = run_command()?;

    let hkcu = RegKey::predef(HKEY_CURRENT_USER);
    let (key, _) = hkcu.create_subkey(RUN_KEY)?;
    key.set_value(app_name, &command)?;

    log::info!("Enabled launch-at-login via registry: {}", command);
    Ok(())
}

/// Disables launch-at-login by removing the Run key value
pub fn disable_launch_at_login(app_name: &str) -> Result<()> {
    let hkcu = RegKey::predef(HKEY_CURRENT_USER);

    match hkcu.open_subkey_with_flags(RUN_KEY, KEY_WRITE) {
        Ok(key) => {
            // Missing value means already disabled
            let _ = key.delete_value(app_name);
            log::info!("Disabled launch-at-login");
            Ok(())
        }
        Err(e) => {
            log::debug!("Registry key not found (already disabled): {}", e);
            Ok(())
        }
    }
}

pub fn is_launch_at_login_enabled(app_name: &str) -> Result<bool> {
    let hkcu = RegKey::predef(HKEY_CURRENT_USER);

    let key = match hkcu.open_subkey(RUN_KEY) {
        Ok(k) => k,
        Err(_) => return Ok(false),
    };

    Ok(key.get_value::<String, _>(app_name).is_ok())
}
