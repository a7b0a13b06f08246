mod backup;
mod helpers;
mod item;
mod profile;
mod settings;

pub(crate) use backup::{cmd_backup_export, cmd_backup_import};
pub(crate) use item::{
    AddArgs, UpdateArgs, cmd_expiring, cmd_item_add, cmd_item_consume, cmd_item_delete,
    cmd_item_list, cmd_item_open, cmd_item_show, cmd_item_update,
};
pub(crate) use profile::{
    cmd_food_type_add, cmd_food_type_delete, cmd_food_type_list, cmd_profile_add,
    cmd_profile_delete, cmd_profile_list,
};
pub(crate) use settings::{cmd_settings_set, cmd_settings_show};
