use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use fileview::vfs::{ContentType, FileRef, FileTypeTable, Language, MemoryFileSystem};
use fileview::view::ProjectContext;
use fileview::{
    Collaborators, Config, ConsistencyReport, FileManager, Lifecycle, MemoryPressure, TrimReport,
};

/// Exercise the file view cache against an in-memory project
#[derive(Parser, Debug)]
#[command(name = "fileview", version, about)]
struct Args {
    /// Configuration file (toml, yaml or json)
    #[arg(short, long, env = "FILEVIEW_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Source files created per demo directory
    #[arg(long, default_value_t = 4)]
    files: usize,
}

#[derive(Debug, Serialize)]
struct Summary {
    lifecycle: Lifecycle,
    views: usize,
    pinned_views: usize,
    directories: usize,
    modification_count: u64,
    trimmed: TrimReport,
    consistency: ConsistencyReport,
}

fn file_types() -> FileTypeTable {
    FileTypeTable::new()
        .with_extension("rs", ContentType::language("RUST", Language::new("Rust")))
        .with_extension("sql", ContentType::language("SQL", Language::new("Sql")))
        .with_extension("md", ContentType::plain_text())
        .with_extension("png", ContentType::binary("IMAGE"))
}

fn init_logging(config: &Config, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.filter.as_str()));

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer()))
        .init();
}

fn populate(fs: &MemoryFileSystem, files: usize) -> anyhow::Result<Vec<FileRef>> {
    let mut created = Vec::new();
    for dir in ["/src/cache", "/src/manager", "/migrations", "/docs"] {
        let parent = fs.create_dirs(dir)?;
        for index in 0..files {
            let name = match dir {
                "/migrations" => format!("{:04}_init.sql", index),
                "/docs" => format!("chapter{}.md", index),
                _ => format!("module{}.rs", index),
            };
            created.push(fs.create_file(&parent, &name)?);
        }
    }
    created.push(fs.create_file(&fs.find_by_path("/docs").context("docs missing")?, "logo.png")?);
    Ok(created)
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Config::load(args.config.as_deref())?;
    init_logging(&config, args.json_logs || config.logging.json);

    tracing::info!("Starting fileview demo");

    let fs = MemoryFileSystem::with_file_types(file_types());
    let project = Arc::new(ProjectContext::new("demo"));
    let collaborators = Collaborators { project: project.clone(), ..Default::default() };
    collaborators.substitutors.register(
        Language::new("Sql"),
        Arc::new(|_: &Language, _: &FileRef, project: &ProjectContext| {
            project.setting("sql.dialect").map(Language::new)
        }),
    );

    let manager = FileManager::new(config, collaborators)?;
    manager.mark_initialized();

    let files = populate(&fs, args.files)?;
    for file in &files {
        if let Some(parent) = file.parent() {
            manager.find_directory(&parent);
        }
        manager.find_file(file);
    }
    let scratch = fs.create_in_memory_file("scratch.rs", ContentType::plain_text());
    manager.set_view(&scratch, Some(manager.create_view(&scratch, true)));

    // Markdown becomes a language: the plain-text views no longer match.
    let markdown = ContentType::language("MARKDOWN", Language::new("Markdown"));
    fs.set_file_types(file_types().with_extension("md", markdown));
    manager.process_file_types_changed();

    // Switching the SQL dialect changes the base language of every migration.
    project.set_setting("sql.dialect", "PostgreSql");
    manager.update_all_views();

    let manager_dir = fs.find_by_path("/src/manager").context("manager dir missing")?;
    fs.delete(&manager_dir)?;
    manager.process_subtree_removed(&manager_dir);

    let trimmed = manager.trim_collectable(MemoryPressure::Moderate);
    let consistency = manager.check_consistency()?;

    let summary = Summary {
        lifecycle: manager.lifecycle(),
        views: manager.view_cache().len(),
        pinned_views: manager.view_cache().pinned_len(),
        directories: manager.directory_cache().len(),
        modification_count: manager.modification_count(),
        trimmed,
        consistency,
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);

    manager.set_view(&scratch, None);
    fs.discard(&scratch)?;
    manager.dispose();
    Ok(())
}
