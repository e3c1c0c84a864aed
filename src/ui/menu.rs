use anyhow::Result;
use tray_icon::menu::{CheckMenuItem, Menu, MenuId, MenuItem, PredefinedMenuItem};

use crate::config::Settings;
use crate::model::{Feedback, FeedbackSeverity, MenuAction};

const MENU_ID_OPEN_URL: &str = "open_url";
const MENU_ID_AUTO_START: &str = "auto_start";
const MENU_ID_RELOAD_CONFIG: &str = "reload_config";
const MENU_ID_EDIT_CONFIG: &str = "edit_config";
const MENU_ID_QUIT: &str = "quit";

/// Windows truncates tray tooltips at 128 UTF-16 units.
const MAX_TOOLTIP_CHARS: usize = 120;

/// The tray menu plus handles to the items that change at runtime.
pub struct TrayMenu {
    pub menu: Menu,
    auto_start: CheckMenuItem,
    reload: MenuItem,
    edit_config: MenuItem,
}

/// Static mode has no config file, so the items that change, reload or open
/// it are disabled.
pub fn build_menu(settings: &Settings, static_mode: bool) -> Result<TrayMenu> {
    let menu = Menu::new();

    let open = MenuItem::with_id(MENU_ID_OPEN_URL, "Open Web Page", true, None);
    let auto_start = CheckMenuItem::with_id(
        MENU_ID_AUTO_START,
        "Start at Login",
        !static_mode,
        settings.auto_start,
        None,
    );
    let reload = MenuItem::with_id(MENU_ID_RELOAD_CONFIG, "Reload Config", !static_mode, None);
    let edit_config = MenuItem::with_id(MENU_ID_EDIT_CONFIG, "Edit Config", !static_mode, None);
    let quit = MenuItem::with_id(MENU_ID_QUIT, "Quit", true, None);

    menu.append(&open)?;
    menu.append(&auto_start)?;
    menu.append(&PredefinedMenuItem::separator())?;
    menu.append(&reload)?;
    menu.append(&edit_config)?;
    menu.append(&PredefinedMenuItem::separator())?;
    menu.append(&quit)?;

    Ok(TrayMenu {
        menu,
        auto_start,
        reload,
        edit_config,
    })
}

impl TrayMenu {
    pub fn sync(&self, settings: &Settings, static_mode: bool) {
        self.auto_start.set_checked(settings.auto_start);
        self.auto_start.set_enabled(!static_mode);
        self.reload.set_enabled(!static_mode);
        self.edit_config.set_enabled(!static_mode);
    }
}

pub fn parse_menu_action(id: &MenuId) -> Option<MenuAction> {
    let raw: &str = id.as_ref();
    match raw {
        MENU_ID_OPEN_URL => Some(MenuAction::OpenUrl),
        MENU_ID_AUTO_START => Some(MenuAction::ToggleAutoStart),
        MENU_ID_RELOAD_CONFIG => Some(MenuAction::ReloadConfig),
        MENU_ID_EDIT_CONFIG => Some(MenuAction::EditConfig),
        MENU_ID_QUIT => Some(MenuAction::Quit),
        _ => None,
    }
}

pub fn build_tooltip(title: &str, feedback: Option<&Feedback>) -> String {
    let mut tooltip = title.to_string();
    if let Some(feedback) = feedback {
        let prefix = match feedback.severity {
            FeedbackSeverity::Info => "",
            FeedbackSeverity::Warning => "⚠️ ",
            FeedbackSeverity::Error => "⛔ ",
        };
        tooltip.push('\n');
        tooltip.push_str(prefix);
        tooltip.push_str(&feedback.message);
    }

    if tooltip.chars().count() > MAX_TOOLTIP_CHARS {
        let mut truncated: String = tooltip.chars().take(MAX_TOOLTIP_CHARS - 1).collect();
        truncated.push('…');
        truncated
    } else {
        tooltip
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_known_actions() {
        assert_eq!(
            parse_menu_action(&MenuId::new("open_url")),
            Some(MenuAction::OpenUrl)
        );
        assert_eq!(
            parse_menu_action(&MenuId::new("auto_start")),
            Some(MenuAction::ToggleAutoStart)
        );
        assert_eq!(
            parse_menu_action(&MenuId::new("reload_config")),
            Some(MenuAction::ReloadConfig)
        );
        assert_eq!(
            parse_menu_action(&MenuId::new("edit_config")),
            Some(MenuAction::EditConfig)
        );
        assert_eq!(parse_menu_action(&MenuId::new("quit")), Some(MenuAction::Quit));
    }

    #[test]
    fn parse_unknown_action() {
        assert_eq!(parse_menu_action(&MenuId::new("separator")), None);
        assert_eq!(parse_menu_action(&MenuId::new("")), None);
    }

    #[test]
    fn tooltip_is_title_without_feedback() {
        assert_eq!(build_tooltip("WebLauncher", None), "WebLauncher");
    }

    #[test]
    fn tooltip_appends_feedback_with_severity() {
        let info = Feedback::info("Start at login enabled".to_string());
        assert_eq!(
            build_tooltip("App", Some(&info)),
            "App\nStart at login enabled"
        );

        let warning = Feedback::warning("Second-launch hand-off unavailable".to_string());
        assert_eq!(
            build_tooltip("App", Some(&warning)),
            "App\n⚠️ Second-launch hand-off unavailable"
        );
    }

    #[test]
    fn tooltip_is_truncated() {
        let error = Feedback::error("x".repeat(500));
        let tooltip = build_tooltip("App", Some(&error));
        assert_eq!(tooltip.chars().count(), MAX_TOOLTIP_CHARS);
        assert!(tooltip.ends_with('…'));
    }
}
