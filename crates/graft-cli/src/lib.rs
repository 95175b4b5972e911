//! Graft CLI - command definitions and handlers
//!
//! Every subcommand reads and writes datasets through [`JsonCodec`] and
//! prints its result as JSON:
//! - `migrate`: run a configured migration
//! - `check`: verify an implanted range after the fact
//! - `map`: print the relocation map downstream tooling consumes
//! - `grep`, `refs`, `trace`: locate values and references
//! - `shift`: move a block of records further up the same store

#![warn(unreachable_pub)]
#![allow(missing_docs)]

use anyhow::{bail, Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use graft_core::{
    check, collect_references, grep_value, shift, slot_id, trace_references, MigrationConfig,
    Orchestrator, ShiftRequest,
};
use graft_store::{Dataset, JsonCodec, RecordKind, Schema, StoreCodec};
use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Build the command tree
#[must_use]
pub fn cli() -> Command {
    let file = |name: &'static str, help: &'static str| {
        Arg::new(name)
            .long(name)
            .required(true)
            .value_parser(value_parser!(PathBuf))
            .help(help)
    };
    let kind = || {
        Arg::new("kind")
            .long("kind")
            .default_value("unit")
            .value_parser(parse_kind)
            .help("Record kind: unit, unit_header, tech, effect, graphic or sound")
    };
    let slot = |name: &'static str, help: &'static str| {
        Arg::new(name)
            .long(name)
            .required(true)
            .value_parser(value_parser!(usize))
            .help(help)
    };

    Command::new("graft")
        .version(graft_core::VERSION)
        .about("Relocate ID-indexed records between game-data stores")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("migrate")
                .about("Run a configured migration")
                .arg(file("source", "Dataset holding the records to move"))
                .arg(file("baseline", "Dataset the records are moved into"))
                .arg(file("config", "Migration plan (TOML)"))
                .arg(file("output", "Where to write the migrated dataset"))
                .arg(
                    Arg::new("report")
                        .long("report")
                        .value_parser(value_parser!(PathBuf))
                        .help("Also write the migration report as JSON"),
                ),
        )
        .subcommand(
            Command::new("check")
                .about("Verify self-ids and stale references of an implanted range")
                .arg(file("data", "Migrated dataset"))
                .arg(kind())
                .arg(slot("start", "First implanted slot"))
                .arg(slot("end", "Last implanted slot"))
                .arg(slot("old-start", "Source slot the range was moved from")),
        )
        .subcommand(
            Command::new("map")
                .about("Print the relocation map a plan implies")
                .arg(file("config", "Migration plan (TOML)"))
                .arg(file("source", "Dataset holding the records to move"))
                .arg(kind()),
        )
        .subcommand(
            Command::new("grep")
                .about("Find every integer equal to a value")
                .arg(file("data", "Dataset to search"))
                .arg(
                    Arg::new("value")
                        .long("value")
                        .required(true)
                        .allow_negative_numbers(true)
                        .value_parser(value_parser!(i64))
                        .help("Integer to look for"),
                ),
        )
        .subcommand(
            Command::new("refs")
                .about("List reference fields holding any of the given IDs")
                .arg(file("data", "Dataset to search"))
                .arg(kind())
                .arg(
                    Arg::new("ids")
                        .long("ids")
                        .required(true)
                        .value_delimiter(',')
                        .value_parser(value_parser!(i64))
                        .help("Comma-separated IDs to watch"),
                ),
        )
        .subcommand(
            Command::new("trace")
                .about("Follow same-kind references from one record")
                .arg(file("data", "Dataset to search"))
                .arg(kind())
                .arg(slot("slot", "Record to start from")),
        )
        .subcommand(
            Command::new("shift")
                .about("Move a block of records further up the same store")
                .arg(file("data", "Dataset to edit"))
                .arg(file("output", "Where to write the edited dataset"))
                .arg(kind())
                .arg(slot("start", "First slot of the block"))
                .arg(slot("offset", "Distance to move the block"))
                .arg(
                    Arg::new("count")
                        .long("count")
                        .value_parser(value_parser!(usize))
                        .help("Block length; defaults to the rest of the store"),
                )
                .arg(
                    Arg::new("no-rewrite")
                        .long("no-rewrite")
                        .action(ArgAction::SetTrue)
                        .help("Leave references pointing at the old slots"),
                ),
        )
}

fn parse_kind(s: &str) -> Result<RecordKind, String> {
    s.parse().map_err(|e| format!("{e}"))
}

/// Run the selected subcommand, writing results to `out`
///
/// Returns `false` when the command ran but found consistency issues.
///
/// # Errors
/// Returns an error if a file cannot be read or written, the plan is
/// invalid, or the engine rejects the request.
pub fn execute(matches: &ArgMatches, out: &mut impl Write) -> Result<bool> {
    let schema = Schema::builtin();
    match matches.subcommand() {
        Some(("migrate", args)) => migrate(&schema, args, out),
        Some(("check", args)) => check_range(&schema, args, out),
        Some(("map", args)) => {
            let config = load_config(path(args, "config"))?;
            let source = load(path(args, "source"))?;
            let kind = kind(args);
            let len = source.store(kind)?.len();
            let Some(map) = config.external_relocation_map(kind, len) else {
                bail!("plan has no {kind} entry");
            };
            print_json(out, &map)?;
            Ok(true)
        }
        Some(("grep", args)) => {
            let data = load(path(args, "data"))?;
            let value = *args.get_one::<i64>("value").context("missing --value")?;
            print_json(out, &grep_value(&data, value))?;
            Ok(true)
        }
        Some(("refs", args)) => {
            let data = load(path(args, "data"))?;
            let kind = kind(args);
            let entry = schema.kind(kind).context("kind has no schema entry")?;
            let watch: BTreeSet<i64> = args.get_many::<i64>("ids").into_iter().flatten().copied().collect();
            print_json(out, &collect_references(data.store(kind)?, entry, &watch))?;
            Ok(true)
        }
        Some(("trace", args)) => {
            let data = load(path(args, "data"))?;
            let root = slot(args, "slot")?;
            print_json(out, &trace_references(&data, &schema, kind(args), root)?)?;
            Ok(true)
        }
        Some(("shift", args)) => {
            let mut data = load(path(args, "data"))?;
            let mut request = ShiftRequest::new(kind(args), slot(args, "start")?, slot(args, "offset")?);
            if let Some(&count) = args.get_one::<usize>("count") {
                request = request.with_count(count);
            }
            if args.get_flag("no-rewrite") {
                request = request.without_rewrite();
            }
            let outcome = shift(&mut data, &schema, &request)?;
            save(&data, path(args, "output"))?;
            print_json(out, &outcome)?;
            Ok(true)
        }
        Some((other, _)) => bail!("unknown subcommand '{other}'"),
        None => bail!("no subcommand given"),
    }
}

fn migrate(schema: &Schema, args: &ArgMatches, out: &mut impl Write) -> Result<bool> {
    let config = load_config(path(args, "config"))?;
    let source = load(path(args, "source"))?;
    let baseline = load(path(args, "baseline"))?;

    let report = Orchestrator::new(schema, config)?.run(&source, &baseline)?;
    let consistent = report.is_consistent();
    for (kind, issue) in report.issues() {
        writeln!(out, "{kind}: {issue}")?;
    }
    if let Some(report_path) = args.get_one::<PathBuf>("report") {
        let text = serde_json::to_string_pretty(&report)?;
        std::fs::write(report_path, text)
            .with_context(|| format!("failed to write report {}", report_path.display()))?;
    }
    save(&report.into_dataset(), path(args, "output"))?;
    Ok(consistent)
}

fn check_range(schema: &Schema, args: &ArgMatches, out: &mut impl Write) -> Result<bool> {
    let data = load(path(args, "data"))?;
    let kind = kind(args);
    let entry = schema.kind(kind).context("kind has no schema entry")?;
    let (start, end, old_start) = (slot(args, "start")?, slot(args, "end")?, slot(args, "old-start")?);
    if end < start {
        bail!("--end {end} is before --start {start}");
    }
    let implanted: BTreeSet<usize> = (start..=end).collect();
    let stale: BTreeSet<i64> = (old_start..old_start + implanted.len())
        .filter(|s| !implanted.contains(s))
        .map(slot_id)
        .collect();

    let issues = check(data.store(kind)?, entry, &implanted, &stale);
    tracing::info!("{} {}..={}: {} consistency issues", kind, start, end, issues.len());
    print_json(out, &issues)?;
    Ok(issues.is_empty())
}

fn path<'a>(args: &'a ArgMatches, name: &str) -> &'a Path {
    args.get_one::<PathBuf>(name)
        .map_or_else(|| Path::new(""), PathBuf::as_path)
}

fn kind(args: &ArgMatches) -> RecordKind {
    args.get_one::<RecordKind>("kind")
        .copied()
        .unwrap_or(RecordKind::Unit)
}

fn slot(args: &ArgMatches, name: &str) -> Result<usize> {
    args.get_one::<usize>(name)
        .copied()
        .with_context(|| format!("missing --{name}"))
}

fn load(path: &Path) -> Result<Dataset> {
    JsonCodec::new()
        .decode(path)
        .with_context(|| format!("failed to load dataset {}", path.display()))
}

fn save(dataset: &Dataset, path: &Path) -> Result<()> {
    JsonCodec::new()
        .encode(dataset, path)
        .with_context(|| format!("failed to write dataset {}", path.display()))
}

fn load_config(path: &Path) -> Result<MigrationConfig> {
    MigrationConfig::from_path(path)
        .with_context(|| format!("failed to load migration plan {}", path.display()))
}

fn print_json(out: &mut impl Write, value: &impl serde::Serialize) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}
