use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use colored::Colorize;
use stratus_refs::{InMemoryRefStore, RefSnapshot};
use stratus_store::{Backend, BackendConfig, NoopOracle};
use stratus_types::ObjectId;

use crate::cli::*;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = BackendConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    let backend = Backend::from_config(config, Arc::new(NoopOracle))?;
    let result = match cli.command {
        Command::Put(args) => cmd_put(&backend, args).await,
        Command::Cat(args) => cmd_cat(&backend, args).await,
        Command::Header(args) => cmd_header(&backend, args).await,
        Command::Exists(args) => cmd_exists(&backend, args).await,
        Command::PushPack(args) => cmd_push_pack(&backend, args).await,
        Command::RefsExport(args) => cmd_refs_export(&backend, args).await,
        Command::RefsImport(args) => cmd_refs_import(&backend, args).await,
    };
    backend.free()?;
    result
}

fn parse_id(hex: &str) -> anyhow::Result<ObjectId> {
    ObjectId::from_hex(hex).with_context(|| format!("invalid object id {hex:?}"))
}

async fn cmd_put(backend: &Backend, args: PutArgs) -> anyhow::Result<()> {
    let data = std::fs::read(&args.file).with_context(|| format!("reading {}", args.file.display()))?;
    let id = ObjectId::hash_object(args.object_type, &data);
    backend.write(&id, &data, args.object_type).await?;
    println!("{}", id.to_hex());
    Ok(())
}

async fn cmd_cat(backend: &Backend, args: ObjectArgs) -> anyhow::Result<()> {
    let object = backend.read(&parse_id(&args.id)?).await?;
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&object.data)?;
    stdout.flush()?;
    Ok(())
}

async fn cmd_header(backend: &Backend, args: ObjectArgs) -> anyhow::Result<()> {
    let header = backend.read_header(&parse_id(&args.id)?).await?;
    println!("{} {}", header.object_type.to_string().cyan(), header.length);
    Ok(())
}

async fn cmd_exists(backend: &Backend, args: ObjectArgs) -> anyhow::Result<()> {
    let id = parse_id(&args.id)?;
    if backend.exists(&id).await? {
        println!("{} {}", "✓".green().bold(), id.short_hex().yellow());
    } else {
        println!("{} {} not found", "✗".red().bold(), id.short_hex().yellow());
    }
    Ok(())
}

async fn cmd_push_pack(backend: &Backend, args: PushPackArgs) -> anyhow::Result<()> {
    anyhow::ensure!(args.chunk_size > 0, "chunk size must be positive");
    let bytes = std::fs::read(&args.file).with_context(|| format!("reading {}", args.file.display()))?;
    let mut session = backend.write_pack();
    for chunk in bytes.chunks(args.chunk_size) {
        session.add(chunk).await?;
    }
    let packs = session.commit().await?;
    for pack in &packs {
        println!(
            "{} pack {} ({} objects)",
            "✓".green().bold(),
            pack.pack_id.short_hex().yellow(),
            pack.object_count
        );
    }
    if packs.is_empty() {
        println!("No packs in {}.", args.file.display());
    }
    Ok(())
}

async fn cmd_refs_export(backend: &Backend, args: RefsArgs) -> anyhow::Result<()> {
    let refs = InMemoryRefStore::new();
    let count = backend.restore_refs(&refs).await?;
    let json = RefSnapshot::capture(&refs)?.to_json()?;
    std::fs::write(&args.file, json).with_context(|| format!("writing {}", args.file.display()))?;
    println!("Exported {} refs to {}", count.to_string().bold(), args.file.display());
    Ok(())
}

async fn cmd_refs_import(backend: &Backend, args: RefsArgs) -> anyhow::Result<()> {
    let json = std::fs::read(&args.file).with_context(|| format!("reading {}", args.file.display()))?;
    let refs = InMemoryRefStore::new();
    RefSnapshot::from_json(&json)?.restore(&refs)?;
    let count = backend.snapshot_refs(&refs).await?;
    println!("{} Published {} refs", "✓".green().bold(), count.to_string().bold());
    Ok(())
}
