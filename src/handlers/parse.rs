//! `malexport parse` handlers: print stored data as JSON

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

use crate::list_type::ListType;
use crate::localdir::LocalDir;
use crate::parse::{
    infer_list_type, iter_forum_posts, iter_friends, iter_history, iter_threads, parse_api_list_file,
    parse_list_file, parse_xml_export,
};
use crate::recover::{Combiner, StoreCombiner};

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn handle_parse_history(username: &str, only: Option<ListType>) -> Result<()> {
    let localdir = LocalDir::from_username(username)?;
    let mut items = Vec::new();
    for list_type in ListType::selected(only) {
        items.extend(iter_history(&localdir, list_type)?);
    }
    log::info!("{} history items", items.len());
    print_json(&items)
}

pub fn handle_parse_forum(username: &str) -> Result<()> {
    let localdir = LocalDir::from_username(username)?;
    print_json(&iter_forum_posts(&localdir, username)?)
}

pub fn handle_parse_messages(username: &str) -> Result<()> {
    let localdir = LocalDir::from_username(username)?;
    let threads: Vec<_> = iter_threads(&localdir)?
        .into_iter()
        .map(|(id, thread)| serde_json::json!({ "thread_id": id, "thread": thread }))
        .collect();
    print_json(&threads)
}

/// The combined view of the account's current data
pub fn handle_parse_combine(username: &str) -> Result<()> {
    let localdir = LocalDir::from_username(username)?;
    print_json(&StoreCombiner.combine(&localdir.account_dir, username)?)
}

pub fn handle_parse_friends(username: &str) -> Result<()> {
    let localdir = LocalDir::from_username(username)?;
    print_json(&iter_friends(&localdir)?)
}

/// A saved `load.json` list; the type is guessed from the file name unless given
pub fn handle_parse_list(file: &Path, list_type: Option<ListType>) -> Result<()> {
    let list_type = list_type.unwrap_or_else(|| infer_list_type(file));
    let rows = parse_list_file(file, list_type).with_context(|| format!("Failed to parse {}", file.display()))?;
    print_json(&rows)
}

pub fn handle_parse_api_list(file: &Path, list_type: Option<ListType>) -> Result<()> {
    let list_type = list_type.unwrap_or_else(|| infer_list_type(file));
    let entries =
        parse_api_list_file(file, list_type).with_context(|| format!("Failed to parse {}", file.display()))?;
    print_json(&entries)
}

pub fn handle_parse_xml(file: &Path) -> Result<()> {
    let export = parse_xml_export(file).with_context(|| format!("Failed to parse {}", file.display()))?;
    print_json(&export)
}
