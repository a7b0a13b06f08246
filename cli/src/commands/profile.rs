use anyhow::{Result, bail};
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use larder_core::service::LarderService;

use super::helpers::{local_day, parse_uuid};

pub(crate) fn cmd_profile_add(
    svc: &LarderService,
    name: &str,
    household_size: i64,
    json: bool,
) -> Result<()> {
    let profile = svc.add_profile(name, household_size)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&profile)?);
    } else {
        println!(
            "Added profile {} (household of {}) [{}]",
            profile.name, profile.household_size, profile.id
        );
    }

    Ok(())
}

pub(crate) fn cmd_profile_list(svc: &LarderService, json: bool) -> Result<()> {
    let profiles = svc.list_profiles()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&profiles)?);
    } else if profiles.is_empty() {
        eprintln!("No profiles yet. Use `larder profile add` to create one.");
    } else {
        #[derive(Tabled)]
        struct ProfileRow {
            #[tabled(rename = "ID")]
            id: String,
            #[tabled(rename = "Name")]
            name: String,
            #[tabled(rename = "Household")]
            household: i64,
            #[tabled(rename = "Created")]
            created: String,
        }

        let rows: Vec<ProfileRow> = profiles
            .iter()
            .map(|p| ProfileRow {
                id: p.id.to_string(),
                name: p.name.clone(),
                household: p.household_size,
                created: local_day(p.created_at),
            })
            .collect();

        let table = Table::new(&rows)
            .with(Style::rounded())
            .with(Modify::new(Columns::new(2..3)).with(Alignment::right()))
            .to_string();
        println!("{table}");
    }

    Ok(())
}

pub(crate) fn cmd_profile_delete(svc: &LarderService, id: &str, json: bool) -> Result<()> {
    let id = parse_uuid(id)?;
    if !svc.delete_profile(id)? {
        bail!("Profile {id} not found");
    }

    if json {
        println!("{}", serde_json::json!({ "deleted": id }));
    } else {
        println!("Deleted profile {id}");
    }

    Ok(())
}

pub(crate) fn cmd_food_type_add(
    svc: &LarderService,
    name: &str,
    emoji: Option<&str>,
    json: bool,
) -> Result<()> {
    let food_type = svc.add_food_type(name, emoji)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&food_type)?);
    } else {
        let emoji = food_type.emoji.as_deref().unwrap_or("");
        println!("Added food type {emoji} {} [{}]", food_type.name, food_type.id);
    }

    Ok(())
}

pub(crate) fn cmd_food_type_list(svc: &LarderService, json: bool) -> Result<()> {
    let food_types = svc.list_food_types()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&food_types)?);
    } else if food_types.is_empty() {
        eprintln!("No custom food types. Use `larder food-type add` to create one.");
    } else {
        #[derive(Tabled)]
        struct FoodTypeRow {
            #[tabled(rename = "ID")]
            id: String,
            #[tabled(rename = "")]
            emoji: String,
            #[tabled(rename = "Name")]
            name: String,
        }

        let rows: Vec<FoodTypeRow> = food_types
            .iter()
            .map(|t| FoodTypeRow {
                id: t.id.to_string(),
                emoji: t.emoji.clone().unwrap_or_default(),
                name: t.name.clone(),
            })
            .collect();

        let table = Table::new(&rows).with(Style::rounded()).to_string();
        println!("{table}");
    }

    Ok(())
}

pub(crate) fn cmd_food_type_delete(svc: &LarderService, id: &str, json: bool) -> Result<()> {
    let id = parse_uuid(id)?;
    if !svc.delete_food_type(id)? {
        bail!("Food type {id} not found");
    }

    if json {
        println!("{}", serde_json::json!({ "deleted": id }));
    } else {
        println!("Deleted food type {id}");
    }

    Ok(())
}
