//! CLI `doctor` command: run database diagnostics and print a health report.

use anyhow::{Context, Result};
use mnemo::config::MnemoConfig;
use mnemo::db;
use mnemo::records::project::{self, GitProbe};

/// Run database diagnostics and print a health report.
pub fn doctor(config: &MnemoConfig) -> Result<()> {
    let db_path = config.resolved_db_path();

    if !db_path.exists() {
        println!("Database: not found at {}", db_path.display());
        println!("Run `mnemo serve` to initialize.");
        return Ok(());
    }

    let file_size = std::fs::metadata(&db_path)
        .map(|m| m.len())
        .unwrap_or(0);

    let conn = db::open_database(&db_path)
        .context("failed to open database (may be corrupt)")?;

    let report = db::check_database_health(&conn)
        .context("failed to run health check")?;

    println!("mnemo Health Report");
    println!("===================");
    println!();
    println!("Database:          {}", db_path.display());
    println!("File size:         {}", format_bytes(file_size));
    println!("Schema version:    {}", report.schema_version);
    println!();
    println!("Row counts:");
    println!("  Observations:    {}", report.observation_count);
    println!("  Summaries:       {}", report.summary_count);
    println!("  Prompts:         {}", report.prompt_count);
    println!("  Agents:          {}", report.agent_count);
    println!("  Audit log:       {}", report.audit_count);
    println!("  Aliases:         {}", report.alias_count);
    if report.alias_count > config.query.max_project_aliases as u64 {
        println!("  WARNING: more aliases than query.max_project_aliases; run `mnemo alias cleanup`.");
    }
    println!();

    let mut probe = GitProbe::new();
    if let Ok(cwd) = std::env::current_dir() {
        let identity = project::resolve(&cwd, &mut probe);
        println!("Current project:   {} ({:?})", identity.canonical, identity.source);
    }
    println!("git available:     {}", if probe.is_available() { "yes" } else { "no" });
    println!();

    if report.integrity_ok {
        println!("Integrity check:   PASSED");
    } else {
        println!("Integrity check:   FAILED ({})", report.integrity_details);
        println!();
        println!("Recovery steps:");
        println!("  1. Stop any running `mnemo serve` process");
        println!("  2. Restore from a backup: cp backup.db {}", db_path.display());
    }

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
