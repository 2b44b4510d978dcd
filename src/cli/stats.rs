use anyhow::Result;
use mnemo::config::MnemoConfig;
use mnemo::records::stats::record_stats;
use mnemo::records::Visibility;

const OBSERVATION_TYPES: [&str; 6] = ["decision", "bugfix", "feature", "refactor", "discovery", "change"];

/// Display record statistics in the terminal, as seen by the configured caller.
pub fn stats(config: &MnemoConfig, project: Option<&str>) -> Result<()> {
    let db_path = config.resolved_db_path();
    let conn = mnemo::db::open_database(&db_path)?;
    let ctx = super::caller(&conn, config)?.access();

    let response = record_stats(&conn, &ctx, project, &config.query, Some(&db_path))?;

    println!("Record Statistics");
    println!("{}", "=".repeat(40));
    if let Some(project) = project {
        println!("  Project:             {project}");
    }
    println!("  Observations:        {}", response.observations);
    println!("  Summaries:           {}", response.summaries);
    println!("  Prompts:             {}", response.prompts);
    println!();

    println!("By Type:");
    for t in OBSERVATION_TYPES {
        let count = response.by_type.get(t).copied().unwrap_or(0);
        println!("  {:<12} {}", t, count);
    }
    println!();

    println!("By Visibility:");
    for v in Visibility::ALL {
        let count = response.by_visibility.get(v.as_str()).copied().unwrap_or(0);
        println!("  {:<12} {}", v.as_str(), count);
    }
    println!();

    println!("Agents:                {}", response.agents);
    println!("Project aliases:       {}", response.project_aliases);
    println!("Database size:         {} bytes", response.db_size_bytes);

    if let Some(ref oldest) = response.oldest_observation {
        println!("Oldest observation:    {oldest}");
    }
    if let Some(ref newest) = response.newest_observation {
        println!("Newest observation:    {newest}");
    }

    Ok(())
}
