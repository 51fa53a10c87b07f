use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use malexport::account::UpdateOptions;
use malexport::handlers::{self, UpdateTarget};
use malexport::list_type::ListType;
use malexport::logger;
use malexport::transport::DriverType;

#[derive(Parser)]
#[command(name = "malexport")]
#[command(about = "Incrementally mirror MyAnimeList data into a local JSON store", long_about = None)]
#[command(version)]
struct Cli {
    /// MAL username
    #[arg(short, long, global = true, env = "MAL_USERNAME")]
    username: Option<String>,

    /// Show debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum ParseTarget {
    /// Stored episode/chapter history
    History {
        #[arg(long)]
        only: Option<ListType>,
    },
    /// Forum posts written by the user
    Forum,
    /// Stored message threads
    Messages,
    /// Lists, API lists, exports and history joined per entry
    Combine,
    /// The saved friends list
    Friends,
    /// A saved list file
    List {
        file: PathBuf,

        /// Anime or manga; guessed from the file name when left out
        #[arg(long = "type")]
        list_type: Option<ListType>,
    },
    /// A saved API list file
    ApiList {
        file: PathBuf,

        #[arg(long = "type")]
        list_type: Option<ListType>,
    },
    /// An XML list export
    Xml { file: PathBuf },
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch what changed since the last run
    Update {
        #[arg(value_enum)]
        target: UpdateTarget,

        /// Only update the anime or the manga side
        #[arg(long)]
        only: Option<ListType>,

        /// How many ids to take from the recent history page
        #[arg(short, long)]
        count: Option<usize>,

        /// Stop after this many already-seen message threads
        #[arg(long)]
        thread_count: Option<usize>,

        /// First page of messages to read
        #[arg(long)]
        start_page: Option<usize>,

        /// Browser to drive (overrides config.toml)
        #[arg(long, value_enum)]
        driver_type: Option<DriverType>,

        /// Keep history in one file per list type instead of one per entry
        #[arg(long, env = "MALEXPORT_USE_MERGED_FILE")]
        use_merged_file: bool,
    },

    /// Find entries that were deleted from MAL in a series of backups
    Recover {
        /// Directories holding extracted backups of the account directory
        #[arg(short, long, required = true, num_args = 1..)]
        backups: Vec<PathBuf>,

        /// Skip entries that never had any history
        #[arg(long)]
        only_with_history: bool,

        /// Write JSON here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print stored data as JSON
    Parse {
        #[command(subcommand)]
        target: ParseTarget,
    },

    /// Show how many ids the approved id cache holds
    ApprovedIdsStats,

    /// Show or edit sync settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

fn require_username(username: Option<String>) -> Result<String> {
    username.ok_or_else(|| anyhow!("a username is required (-u/--username or MAL_USERNAME)"))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logger::init_logger(cli.verbose)?;

    match cli.command {
        Commands::Update {
            target,
            only,
            count,
            thread_count,
            start_page,
            driver_type,
            use_merged_file,
        } => {
            let username = require_username(cli.username)?;
            let options = UpdateOptions {
                only,
                count,
                use_merged_file,
                start_page,
                thread_count,
            };
            handlers::handle_update(target, &username, &options, driver_type)?;
        }
        Commands::Recover {
            backups,
            only_with_history,
            output,
        } => {
            let username = require_username(cli.username)?;
            handlers::handle_recover(&username, &backups, only_with_history, output.as_deref())?;
        }
        Commands::Parse { target } => match target {
            ParseTarget::History { only } => handlers::handle_parse_history(&require_username(cli.username)?, only)?,
            ParseTarget::Forum => handlers::handle_parse_forum(&require_username(cli.username)?)?,
            ParseTarget::Messages => handlers::handle_parse_messages(&require_username(cli.username)?)?,
            ParseTarget::Combine => handlers::handle_parse_combine(&require_username(cli.username)?)?,
            ParseTarget::Friends => handlers::handle_parse_friends(&require_username(cli.username)?)?,
            ParseTarget::List { file, list_type } => handlers::handle_parse_list(&file, list_type)?,
            ParseTarget::ApiList { file, list_type } => handlers::handle_parse_api_list(&file, list_type)?,
            ParseTarget::Xml { file } => handlers::handle_parse_xml(&file)?,
        },
        Commands::ApprovedIdsStats => handlers::handle_approved_ids_stats()?,
        Commands::Config { show } => {
            if show {
                handlers::handle_config_show()?;
            } else {
                handlers::handle_config_interactive()?;
            }
        }
    }

    Ok(())
}
