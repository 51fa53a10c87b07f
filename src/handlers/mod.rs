//! Command handler modules
//!
//! One module per top-level subcommand of the `malexport` binary.

pub mod config;
pub mod parse;
pub mod recover;
pub mod update;

pub use config::{handle_config_interactive, handle_config_show};
pub use parse::{
    handle_parse_api_list, handle_parse_combine, handle_parse_forum, handle_parse_friends, handle_parse_history,
    handle_parse_list, handle_parse_messages, handle_parse_xml,
};
pub use recover::{handle_approved_ids_stats, handle_recover};
pub use update::{handle_update, UpdateTarget};
