//! Command handlers: thin glue from parsed arguments to store operations.

use serde::Serialize;

use crate::config;
use crate::core::{
    BatchId, BatchPrefix, CodeString, ProfileFields, ProfileId, ResolveCode, Slug, UserId,
};
use crate::resolve::AuthState;
use crate::store::{DeleteMode, DeletedFilter, Store};
use crate::{Error, Result};

use super::{BatchCommand, Cli, CodeCommand, Command, ProfileCommand};

pub fn run(cli: Cli) -> Result<()> {
    let cfg = config::load()?;
    let db_path = cli
        .db
        .clone()
        .unwrap_or_else(|| cfg.database.resolved_path());
    let mut store = Store::open(&db_path).map_err(Error::from)?;

    match cli.command {
        Command::Code(cmd) => run_code(&mut store, cmd, &cfg, cli.json),
        Command::Batch(cmd) => run_batch(&mut store, cmd, &cfg, cli.json),
        Command::Profile(cmd) => run_profile(&mut store, cmd, cli.json),
        Command::Resolve { code, user } => {
            let auth = match user {
                Some(u) => AuthState::Authenticated(UserId::new(u).map_err(Error::from)?),
                None => AuthState::Anonymous,
            };
            let resolution = store.resolve(&code, &auth)?;
            emit(&resolution, cli.json, |r| format!("{r:?}"));
            Ok(())
        }
        Command::Reconcile => {
            let report = store.reconcile_batches()?;
            emit(&report, cli.json, |r| {
                format!(
                    "checked {} batches, corrected {} counts, detached {} dangling codes",
                    r.batches_checked, r.drift_corrected, r.dangling_detached
                )
            });
            Ok(())
        }
    }
}

fn run_code(
    store: &mut Store,
    cmd: CodeCommand,
    cfg: &config::Config,
    json: bool,
) -> Result<()> {
    match cmd {
        CodeCommand::Create {
            code,
            kind,
            batch,
            by,
        } => {
            let code = match code {
                Some(raw) => CodeString::parse(&raw).map_err(Error::from)?,
                None => CodeString::generate(cfg.codes.generated_length),
            };
            let kind = kind.unwrap_or_else(|| cfg.codes.default_kind.clone());
            let by = UserId::new(by).map_err(Error::from)?;
            let created = store.create_code(&code, &kind, batch.map(BatchId), &by)?;
            emit(&created, json, render_code);
            Ok(())
        }
        CodeCommand::Show {
            code,
            include_deleted,
        } => {
            let code = CodeString::parse(&code).map_err(Error::from)?;
            let filter = if include_deleted {
                DeletedFilter::IncludeDeleted
            } else {
                DeletedFilter::ExcludeDeleted
            };
            match store.get_code(&code, filter)? {
                Some(row) => emit(&row, json, render_code),
                None => println!("not found"),
            }
            Ok(())
        }
        CodeCommand::List { batch, deleted } => {
            let filter = if deleted {
                DeletedFilter::OnlyDeleted
            } else {
                DeletedFilter::ExcludeDeleted
            };
            let rows = store.list_codes(batch.map(BatchId), filter)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&rows).expect("serialize"));
            } else {
                for row in &rows {
                    println!("{}", render_code(row));
                }
            }
            Ok(())
        }
        CodeCommand::Copy { code } => {
            let code = CodeString::parse(&code).map_err(Error::from)?;
            let row = store.mark_copied(&code)?;
            emit(&row, json, render_code);
            Ok(())
        }
        CodeCommand::Fix { code } => {
            let code = CodeString::parse(&code).map_err(Error::from)?;
            let repaired = store.check_and_fix_orphaned_state(&code)?;
            if json {
                println!("{{\"repaired\": {repaired}}}");
            } else if repaired {
                println!("repaired orphaned assignment on {code}");
            } else {
                println!("{code} is consistent");
            }
            Ok(())
        }
        CodeCommand::Delete { code, hard } => {
            let code = CodeString::parse(&code).map_err(Error::from)?;
            let mode = if hard { DeleteMode::Hard } else { DeleteMode::Soft };
            let outcome = store.delete_code(&code, mode)?;
            emit(&outcome, json, |o| {
                format!(
                    "deleted {} (profile: {}, visits: {}, detached from batch: {})",
                    o.code,
                    o.profile_deleted
                        .map_or_else(|| "none".to_string(), |p| p.to_string()),
                    o.visits_removed,
                    o.detached_from
                        .map_or_else(|| "none".to_string(), |b| b.to_string()),
                )
            });
            Ok(())
        }
    }
}

fn run_batch(
    store: &mut Store,
    cmd: BatchCommand,
    cfg: &config::Config,
    json: bool,
) -> Result<()> {
    match cmd {
        BatchCommand::Create { name, prefix, by } => {
            let prefix = BatchPrefix::parse(&prefix).map_err(Error::from)?;
            let by = UserId::new(by).map_err(Error::from)?;
            let batch = store.create_batch(&name, &prefix, &by)?;
            emit(&batch, json, |b| {
                format!("batch {} `{}` prefix {} ({} codes)", b.id, b.name, b.prefix, b.count)
            });
            Ok(())
        }
        BatchCommand::Generate {
            batch,
            quantity,
            kind,
            by,
        } => {
            let kind = kind.unwrap_or_else(|| cfg.codes.default_kind.clone());
            let by = UserId::new(by).map_err(Error::from)?;
            let created = store.create_batch_codes(BatchId(batch), quantity, &kind, &by)?;
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&created).expect("serialize")
                );
            } else {
                println!("generated {} codes:", created.len());
                for row in &created {
                    println!("  {}", row.code);
                }
            }
            Ok(())
        }
        BatchCommand::List => {
            let batches = store.list_batches()?;
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&batches).expect("serialize")
                );
            } else {
                for entry in &batches {
                    let drift = if entry.is_drifted() { "  DRIFT" } else { "" };
                    println!(
                        "{}  {}  prefix={}  cached={}  live={}{}",
                        entry.batch.id,
                        entry.batch.name,
                        entry.batch.prefix,
                        entry.batch.count,
                        entry.live_count,
                        drift,
                    );
                }
            }
            Ok(())
        }
        BatchCommand::Delete { batch } => {
            store.delete_batch(BatchId(batch))?;
            println!("deleted batch {batch} (member codes kept, now unbatched)");
            Ok(())
        }
    }
}

fn run_profile(store: &mut Store, cmd: ProfileCommand, json: bool) -> Result<()> {
    match cmd {
        ProfileCommand::Create {
            code,
            user,
            first,
            last,
            bio,
            private,
        } => {
            let code = CodeString::parse(&code).map_err(Error::from)?;
            let user = UserId::new(user).map_err(Error::from)?;
            let mut fields = ProfileFields::new(first, last);
            fields.bio = bio;
            fields.is_public = !private;
            let profile = store.create_profile(&code, &user, &fields)?;
            emit(&profile, json, |p| {
                format!("profile {} `{}` for {}", p.id, p.slug, p.user_id)
            });
            Ok(())
        }
        ProfileCommand::Show { slug } => {
            let slug = Slug::parse(&slug).map_err(Error::from)?;
            match store.get_profile_by_slug(&slug, DeletedFilter::ExcludeDeleted)? {
                Some(profile) => emit(&profile, json, |p| {
                    format!(
                        "profile {} `{}` {} (public: {})",
                        p.id,
                        p.slug,
                        p.fields.display_name(),
                        p.fields.is_public
                    )
                }),
                None => println!("not found"),
            }
            Ok(())
        }
        ProfileCommand::Delete { profile, hard } => {
            let mode = if hard { DeleteMode::Hard } else { DeleteMode::Soft };
            store.delete_profile(ProfileId(profile), mode)?;
            println!("deleted profile {profile}");
            Ok(())
        }
    }
}

fn render_code(code: &ResolveCode) -> String {
    let batch = code
        .batch_id
        .map_or_else(|| "-".to_string(), |b| b.to_string());
    let owner = code
        .user_id
        .as_ref()
        .map_or_else(|| "-".to_string(), |u| u.to_string());
    format!(
        "{}  {}  kind={}  batch={}  owner={}  copied={}",
        code.code,
        code.status.as_str(),
        code.kind,
        batch,
        owner,
        code.copied_at.map_or_else(|| "-".to_string(), |t| t.to_rfc3339()),
    )
}

fn emit<T: Serialize>(value: &T, json: bool, render: impl Fn(&T) -> String) {
    if json {
        println!("{}", serde_json::to_string_pretty(value).expect("serialize"));
    } else {
        println!("{}", render(value));
    }
}
