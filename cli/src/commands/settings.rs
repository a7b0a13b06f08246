use anyhow::{Context, Result, bail};

use larder_core::models::{AppSettings, Appearance};
use larder_core::service::LarderService;

use super::helpers::parse_switch;

const SETTING_KEYS: &[&str] = &[
    "notifications",
    "notify-days-before",
    "notify-hour",
    "notify-minute",
    "cloud-sync",
    "cloud-sync-prompted",
    "appearance",
    "show-consumed",
];

fn parse_number(key: &str, value: &str) -> Result<i64> {
    value
        .trim()
        .parse()
        .with_context(|| format!("{key} must be a whole number (got '{value}')"))
}

/// Apply `key = value` to `settings`. Range checks happen when saving.
pub(crate) fn apply_setting(settings: &mut AppSettings, key: &str, value: &str) -> Result<()> {
    match key.trim().to_lowercase().replace('_', "-").as_str() {
        "notifications" => settings.notifications_enabled = parse_switch(value)?,
        "notify-days-before" => settings.notify_days_before = parse_number(key, value)?,
        "notify-hour" => settings.notify_hour = parse_number(key, value)?,
        "notify-minute" => settings.notify_minute = parse_number(key, value)?,
        "cloud-sync" => settings.cloud_sync_enabled = parse_switch(value)?,
        "cloud-sync-prompted" => settings.cloud_sync_prompted = parse_switch(value)?,
        "appearance" => settings.appearance = value.parse::<Appearance>()?,
        "show-consumed" => settings.show_consumed = parse_switch(value)?,
        _ => bail!(
            "Unknown setting '{key}'. Use one of: {}",
            SETTING_KEYS.join(", ")
        ),
    }
    Ok(())
}

fn on_off(value: bool) -> &'static str {
    if value { "on" } else { "off" }
}

fn print_settings(settings: &AppSettings) {
    println!("notifications        {}", on_off(settings.notifications_enabled));
    println!("notify-days-before   {}", settings.notify_days_before);
    println!(
        "notify-time          {:02}:{:02}",
        settings.notify_hour, settings.notify_minute
    );
    println!("cloud-sync           {}", on_off(settings.cloud_sync_enabled));
    println!("cloud-sync-prompted  {}", on_off(settings.cloud_sync_prompted));
    println!("appearance           {}", settings.appearance.as_str());
    println!("show-consumed        {}", on_off(settings.show_consumed));
}

pub(crate) fn cmd_settings_show(svc: &LarderService, json: bool) -> Result<()> {
    let settings = svc.current_settings()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&settings)?);
    } else {
        print_settings(&settings);
    }

    Ok(())
}

pub(crate) fn cmd_settings_set(
    svc: &LarderService,
    key: &str,
    value: &str,
    json: bool,
) -> Result<()> {
    let mut settings = svc.get_settings()?;
    apply_setting(&mut settings, key, value)?;
    let saved = svc.save_settings(settings)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&saved)?);
    } else {
        println!("Set {key} to {value}");
    }

    Ok(())
}
