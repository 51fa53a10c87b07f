//! `malexport update` handler

use anyhow::Result;
use colored::Colorize;

use crate::account::{Account, UpdateOptions};
use crate::transport::DriverType;

/// Which resource an `update` run refreshes
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum UpdateTarget {
    Lists,
    ApiLists,
    History,
    Forum,
    Friends,
    Messages,
    All,
}

/// Run one update, or all of them.
///
/// A single update that fails is an error. `all` reports failed steps but
/// still succeeds, since whatever did complete has been saved.
pub fn handle_update(
    target: UpdateTarget,
    username: &str,
    options: &UpdateOptions,
    driver_type: Option<DriverType>,
) -> Result<()> {
    let mut account = Account::from_username(username)?;
    if let Some(driver_type) = driver_type {
        account.config.driver_type = driver_type;
    }
    println!(
        "{} {} into {}",
        "Updating".cyan().bold(),
        username.bold(),
        account.localdir.data_dir().display()
    );

    let reports = match target {
        UpdateTarget::Lists => account.update_lists(options.only)?,
        UpdateTarget::ApiLists => account.update_api_lists(options.only)?,
        UpdateTarget::History => account.update_history(options.only, options.count, options.use_merged_file)?,
        UpdateTarget::Forum => account.update_forum_posts()?,
        UpdateTarget::Friends => account.update_friends()?,
        UpdateTarget::Messages => account.update_messages(options.start_page, options.thread_count)?,
        UpdateTarget::All => {
            let summary = account.update_all(options);
            summary.print();
            if !summary.is_success() {
                let failed: Vec<&str> = summary.failures.iter().map(|(step, _)| step.as_str()).collect();
                println!("{} {}", "Some updates failed:".yellow(), failed.join(", "));
            }
            return Ok(());
        }
    };

    for report in &reports {
        report.print_summary();
    }
    Ok(())
}
