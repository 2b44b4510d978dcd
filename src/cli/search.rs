use anyhow::Result;
use clap::Args;
use mnemo::config::MnemoConfig;
use mnemo::records::search::{search_observations, search_prompts, search_summaries};
use mnemo::records::{DateRange, OrderBy, SearchFilters, SearchOptions};

#[derive(Args)]
pub struct SearchArgs {
    /// Keywords matched against the full-text index
    pub query: Option<String>,
    #[arg(long)]
    pub project: Option<String>,
    /// Comma-separated observation types
    #[arg(long)]
    pub types: Option<String>,
    /// Comma-separated concepts (any of)
    #[arg(long)]
    pub concepts: Option<String>,
    /// Comma-separated file paths (any of)
    #[arg(long)]
    pub files: Option<String>,
    /// Earliest creation time, epoch milliseconds
    #[arg(long)]
    pub since: Option<i64>,
    /// Latest creation time, epoch milliseconds
    #[arg(long)]
    pub until: Option<i64>,
    /// date_desc, date_asc or relevance
    #[arg(long, default_value = "date_desc")]
    pub order_by: String,
    #[arg(long)]
    pub limit: Option<usize>,
    #[arg(long, default_value_t = 0)]
    pub offset: usize,
    /// Search session summaries instead of observations
    #[arg(long, conflicts_with = "prompts")]
    pub summaries: bool,
    /// Search user prompts instead of observations
    #[arg(long)]
    pub prompts: bool,
}

/// Run a search from the terminal as the configured caller.
pub fn search(config: &MnemoConfig, args: SearchArgs) -> Result<()> {
    let conn = super::open(config)?;
    let ctx = super::caller(&conn, config)?.access();

    let date_range = (args.since.is_some() || args.until.is_some()).then_some(DateRange {
        start: args.since,
        end: args.until,
    });
    let options = SearchOptions {
        filters: SearchFilters {
            project: args.project,
            types: SearchFilters::split_list(args.types.as_deref()),
            date_range,
            concepts: SearchFilters::split_list(args.concepts.as_deref()),
            files: SearchFilters::split_list(args.files.as_deref()),
        },
        limit: args.limit,
        offset: args.offset,
        order_by: args.order_by.parse::<OrderBy>()?,
        query: args.query,
    };

    if args.summaries {
        let results = search_summaries(&conn, &ctx, &options, &config.query)?;
        if results.is_empty() {
            println!("No results found.");
        }
        for (i, s) in results.iter().enumerate() {
            println!("  {}. #{} [{}] {}", i + 1, s.id, s.project, s.created_at);
            if let Some(request) = &s.request {
                println!("     request: {}", preview(request));
            }
            if let Some(learned) = &s.learned {
                println!("     learned: {}", preview(learned));
            }
            println!();
        }
    } else if args.prompts {
        let results = search_prompts(&conn, &ctx, &options, &config.query)?;
        if results.is_empty() {
            println!("No results found.");
        }
        for (i, p) in results.iter().enumerate() {
            println!("  {}. #{} [{}] {}", i + 1, p.id, p.project, p.created_at);
            println!("     {}", preview(&p.prompt_text));
            println!();
        }
    } else {
        let results = search_observations(&conn, &ctx, &options, &config.query)?;
        if results.is_empty() {
            println!("No results found.");
        }
        for (i, o) in results.iter().enumerate() {
            println!(
                "  {}. #{} [{}] {} ({}, {})",
                i + 1,
                o.id,
                o.obs_type,
                o.title.as_deref().unwrap_or("(untitled)"),
                o.project,
                o.visibility,
            );
            if let Some(narrative) = o.narrative.as_deref().or(o.text.as_deref()) {
                println!("     {}", preview(narrative));
            }
            println!();
        }
    }

    Ok(())
}

pub(super) fn preview(text: &str) -> String {
    const MAX: usize = 120;
    match text.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
