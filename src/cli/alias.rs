use anyhow::Result;
use clap::Subcommand;
use mnemo::config::MnemoConfig;
use mnemo::records::aliases::{self, AliasRegistration};

#[derive(Subcommand)]
pub enum AliasAction {
    /// Make records stored under OLD reachable when querying NEW
    Add { old: String, new: String },
    /// List registered aliases
    List {
        /// Only aliases pointing at this project
        #[arg(long)]
        project: Option<String>,
    },
    /// Delete aliases older than the given number of days
    Cleanup {
        #[arg(long, default_value_t = 365)]
        days: u32,
    },
}

pub fn run(config: &MnemoConfig, action: AliasAction) -> Result<()> {
    let conn = super::open(config)?;

    match action {
        AliasAction::Add { old, new } => match aliases::register_alias(&conn, &old, &new)? {
            AliasRegistration::Created => println!("Alias added: {old} -> {new}"),
            AliasRegistration::AlreadyExisted => println!("Alias already exists: {old} -> {new}"),
            AliasRegistration::NoOp => println!("Nothing to do: old and new names are the same"),
        },
        AliasAction::List { project } => {
            let list = aliases::list_aliases(&conn, project.as_deref())?;
            if list.is_empty() {
                println!("No project aliases.");
            }
            for alias in list {
                println!("{:<40} -> {:<40} ({})", alias.old_project, alias.new_project, alias.created_at);
            }
        }
        AliasAction::Cleanup { days } => {
            let removed = aliases::cleanup_aliases(&conn, days)?;
            println!("Removed {removed} alias(es) older than {days} days.");
        }
    }

    Ok(())
}
