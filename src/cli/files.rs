use anyhow::Result;
use clap::Args;
use mnemo::config::MnemoConfig;
use mnemo::records::search::{find_by_file, FileQuery};

#[derive(Args)]
pub struct FilesArgs {
    /// File path, or folder with --folder
    pub path: String,
    #[arg(long)]
    pub project: Option<String>,
    /// Match everything beneath PATH
    #[arg(long)]
    pub folder: bool,
    /// With --folder, only files directly inside PATH
    #[arg(long, requires = "folder")]
    pub direct: bool,
    #[arg(long)]
    pub limit: Option<usize>,
}

pub fn files(config: &MnemoConfig, args: FilesArgs) -> Result<()> {
    let conn = super::open(config)?;
    let ctx = super::caller(&conn, config)?.access();

    let query = FileQuery {
        project: args.project,
        folder: args.folder,
        direct_children_only: args.direct,
        limit: args.limit,
    };
    let matches = find_by_file(&conn, &ctx, &args.path, &query, &config.query)?;

    println!("Observations ({}):", matches.observations.len());
    for o in &matches.observations {
        println!(
            "  #{} [{}] {}",
            o.id,
            o.obs_type,
            super::search::preview(o.title.as_deref().unwrap_or("(untitled)"))
        );
    }
    println!();
    println!("Summaries ({}):", matches.summaries.len());
    for s in &matches.summaries {
        println!(
            "  #{} {}",
            s.id,
            super::search::preview(s.request.as_deref().unwrap_or("(no request)"))
        );
    }

    Ok(())
}
