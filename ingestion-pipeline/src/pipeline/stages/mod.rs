use std::{fs::File, future::Future, io::BufWriter, sync::Arc};

use common::{
    error::AppError,
    storage::{
        store::Placement,
        types::{
            item::{Item, ItemKind},
            link::Link,
        },
    },
    utils::{
        identity::ContentId,
        normalize::{is_bare_extension, normalize_extension, normalize_name, split_file_name},
    },
};
use state_machines::core::GuardError;
use tokio::{task, time::Duration};
use tokio_retry::{
    strategy::{jitter, ExponentialBackoff},
    RetryIf,
};
use tracing::{debug, info, instrument, warn};

use crate::walker::NodeKind;

use super::{
    config::IngestionTuning,
    context::{DirectoryContext, FileContext},
    state::{directory, file},
    stats::FileOutcome,
};

/// A file that made it into the graph, either as new content or as another sighting of known content.
pub enum Placed {
    Stored(file::FileMachine<(), file::StoredAndLinked>),
    Discarded(file::FileMachine<(), file::DiscardedAndLinked>),
}

impl Placed {
    pub fn outcome(&self) -> FileOutcome {
        match self {
            Placed::Stored(_) => FileOutcome::Stored,
            Placed::Discarded(_) => FileOutcome::Duplicate,
        }
    }
}

#[instrument(level = "trace", skip_all, fields(path = %ctx.event.path.display()))]
pub fn normalize_file(
    machine: file::FileMachine<(), file::Discovered>,
    ctx: &mut FileContext<'_>,
) -> Result<file::FileMachine<(), file::Normalized>, AppError> {
    let file_name = ctx.event.file_name();

    if let NodeKind::File { len: 0 } = ctx.event.kind {
        return Err(AppError::Validation(format!("{file_name} is empty")));
    }
    if is_bare_extension(&file_name) {
        return Err(AppError::Validation(format!(
            "{file_name} has no name besides its extension"
        )));
    }

    let (stem, extension) = split_file_name(&file_name);
    let name = normalize_name(stem);
    if name.is_empty() {
        return Err(AppError::Validation(format!(
            "{file_name} has a blank name"
        )));
    }

    ctx.name = name;
    ctx.extension = normalize_extension(extension);
    ctx.encoding = ctx.codec.plan(&ctx.extension);

    debug!(
        name = %ctx.name,
        extension = %ctx.extension,
        encoding = ?ctx.encoding,
        "file name normalized"
    );

    machine
        .normalize()
        .map_err(|(_, guard)| map_guard_error("normalize", &guard))
}

/// Copies (and possibly compresses) the source bytes into a private staging file.
#[instrument(level = "trace", skip_all, fields(path = %ctx.event.path.display()))]
pub async fn materialize(
    machine: file::FileMachine<(), file::Normalized>,
    ctx: &mut FileContext<'_>,
) -> Result<file::FileMachine<(), file::Materialized>, AppError> {
    let store = Arc::clone(ctx.store);
    let codec = Arc::clone(ctx.codec);
    let source = ctx.event.path.clone();
    let encoding = ctx.encoding;

    let (staged, source_len, stored_len) = task::spawn_blocking(move || {
        let mut staged = store.stage()?;
        let mut input = File::open(&source)?;
        let source_len = codec.encode(encoding, &mut input, BufWriter::new(staged.as_file_mut()))?;
        let stored_len = staged.as_file().metadata()?.len();
        Ok::<_, AppError>((staged, source_len, stored_len))
    })
    .await??;

    if source_len == 0 {
        return Err(AppError::Validation(format!(
            "{} was emptied before it could be read",
            ctx.event.path.display()
        )));
    }

    ctx.staged = Some(staged);
    ctx.source_len = source_len;
    ctx.stored_len = stored_len;

    machine
        .materialize()
        .map_err(|(_, guard)| map_guard_error("materialize", &guard))
}

/// Hashes the staged bytes, i.e. exactly what would land in the store.
#[instrument(level = "trace", skip_all, fields(path = %ctx.event.path.display()))]
pub async fn identify_file(
    machine: file::FileMachine<(), file::Materialized>,
    ctx: &mut FileContext<'_>,
) -> Result<file::FileMachine<(), file::Identified>, AppError> {
    let staged = ctx.take_staged()?;
    let (staged, identity) = task::spawn_blocking(move || {
        let identity = ContentId::of_file(staged.path())?;
        Ok::<_, AppError>((staged, identity))
    })
    .await??;

    ctx.staged = Some(staged);
    ctx.identity = Some(identity);

    machine
        .identify()
        .map_err(|(_, guard)| map_guard_error("identify", &guard))
}

/// Reserves the item, moves the blob into place and records the discovery link.
///
/// The item is written before the blob so a graph failure never leaves an unreferenced blob.
#[instrument(level = "trace", skip_all, fields(path = %ctx.event.path.display()))]
pub async fn place(
    machine: file::FileMachine<(), file::Identified>,
    ctx: &mut FileContext<'_>,
) -> Result<Placed, AppError> {
    let identity = ctx.identity()?;
    let source = ctx.event.path.to_string_lossy().into_owned();
    let candidate = Item::file(
        identity,
        ctx.name.clone(),
        ctx.encoding.stored_extension(&ctx.extension),
        ctx.encoding,
        ctx.registered_at(),
        &ctx.event.path,
    );

    let created = graph_write(ctx, "ensure_item", || {
        ctx.graph.ensure_item(candidate.clone())
    })
    .await?;

    // Known identities keep the representation recorded when they were first seen.
    let stored_extension = if created {
        candidate.extension.clone()
    } else {
        let existing = ctx
            .graph
            .get_item(identity)
            .await
            .map_err(|err| persistence_failure(ctx, err))?
            .ok_or_else(|| AppError::NotFound(format!("item {identity} vanished after ensure")))?;
        if existing.kind != ItemKind::File {
            return Err(AppError::InternalError(format!(
                "content identity {identity} is already held by a {:?} item",
                existing.kind
            )));
        }
        existing.extension
    };

    let staged = ctx.take_staged()?;
    let store = Arc::clone(ctx.store);
    let placement =
        task::spawn_blocking(move || store.commit(staged, identity, &stored_extension)).await??;

    if placement == Placement::Written {
        ctx.stats.record_stored_bytes(ctx.stored_len);
        if !created {
            warn!(item_id = %identity, path = %source, "restored missing blob for known item");
        }
    }

    if !created {
        graph_write(ctx, "merge_comment", || {
            ctx.graph.merge_comment(identity, &source)
        })
        .await?;
    }

    let link_path = ctx.parent.relative_path(&ctx.event.path);
    let link = Link::new(ctx.parent.id, identity, link_path);
    graph_write(ctx, "add_link", || ctx.graph.add_link(link.clone())).await?;

    if created {
        info!(
            item_id = %identity,
            path = %source,
            bytes = ctx.source_len,
            stored_bytes = ctx.stored_len,
            "stored new content"
        );
        machine
            .store()
            .map(Placed::Stored)
            .map_err(|(_, guard)| map_guard_error("store", &guard))
    } else {
        info!(item_id = %identity, path = %source, "duplicate content; linked existing item");
        machine
            .discard()
            .map(Placed::Discarded)
            .map_err(|(_, guard)| map_guard_error("discard", &guard))
    }
}

#[instrument(level = "trace", skip_all, fields(path = %ctx.event.path.display()))]
pub async fn remove_source(
    placed: Placed,
    ctx: &mut FileContext<'_>,
) -> Result<file::FileMachine<(), file::SourceRemoved>, AppError> {
    tokio::fs::remove_file(&ctx.event.path).await?;
    debug!("source file removed");

    match placed {
        Placed::Stored(machine) => machine
            .remove_source()
            .map_err(|(_, guard)| map_guard_error("remove_source", &guard)),
        Placed::Discarded(machine) => machine
            .remove_source()
            .map_err(|(_, guard)| map_guard_error("remove_source", &guard)),
    }
}

#[instrument(level = "trace", skip_all, fields(path = %ctx.event.path.display()))]
pub fn normalize_directory(
    machine: directory::DirectoryMachine<(), directory::Discovered>,
    ctx: &mut DirectoryContext<'_>,
) -> Result<directory::DirectoryMachine<(), directory::Normalized>, AppError> {
    let name = normalize_name(&ctx.event.file_name());
    ctx.name = if name.is_empty() {
        ctx.event.file_name()
    } else {
        name
    };

    machine
        .normalize()
        .map_err(|(_, guard)| map_guard_error("normalize", &guard))
}

#[instrument(level = "trace", skip_all, fields(path = %ctx.event.path.display()))]
pub fn identify_directory(
    machine: directory::DirectoryMachine<(), directory::Normalized>,
    ctx: &mut DirectoryContext<'_>,
) -> Result<directory::DirectoryMachine<(), directory::Identified>, AppError> {
    ctx.identity = Some(ContentId::of_directory(&ctx.event.path));

    machine
        .identify()
        .map_err(|(_, guard)| map_guard_error("identify", &guard))
}

#[instrument(level = "trace", skip_all, fields(path = %ctx.event.path.display()))]
pub async fn link_directory(
    machine: directory::DirectoryMachine<(), directory::Identified>,
    ctx: &mut DirectoryContext<'_>,
) -> Result<directory::DirectoryMachine<(), directory::Linked>, AppError> {
    let identity = ctx.identity()?;
    let tuning = &ctx.pipeline_config.tuning;
    let item = Item::directory(
        identity,
        ctx.name.clone(),
        ctx.registered_at(),
        &ctx.event.path,
    );

    let created = with_graph_retry(tuning, "ensure_item", || ctx.graph.ensure_item(item.clone()))
        .await
        .inspect_err(|_| ctx.stats.record_persistence_error())?;

    let link = Link::new(
        ctx.parent.id,
        identity,
        ctx.parent.relative_path(&ctx.event.path),
    );
    with_graph_retry(tuning, "add_link", || ctx.graph.add_link(link.clone()))
        .await
        .inspect_err(|_| ctx.stats.record_persistence_error())?;

    info!(
        item_id = %identity,
        path = %ctx.event.path.display(),
        depth = ctx.event.depth,
        new = created,
        "visited directory"
    );

    machine
        .link()
        .map_err(|(_, guard)| map_guard_error("link", &guard))
}

pub fn recurse(
    machine: directory::DirectoryMachine<(), directory::Linked>,
) -> Result<directory::DirectoryMachine<(), directory::Recursed>, AppError> {
    machine
        .recurse()
        .map_err(|(_, guard)| map_guard_error("recurse", &guard))
}

async fn graph_write<T, F, Fut>(
    ctx: &FileContext<'_>,
    operation: &'static str,
    action: F,
) -> Result<T, AppError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    with_graph_retry(&ctx.pipeline_config.tuning, operation, action)
        .await
        .map_err(|err| persistence_failure(ctx, err))
}

fn persistence_failure(ctx: &FileContext<'_>, err: AppError) -> AppError {
    ctx.stats.record_persistence_error();
    err
}

/// Retries transient transaction conflicts with jittered exponential backoff.
pub async fn with_graph_retry<T, F, Fut>(
    tuning: &IngestionTuning,
    operation: &'static str,
    action: F,
) -> Result<T, AppError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    let strategy = ExponentialBackoff::from_millis(2)
        .factor(tuning.graph_initial_backoff_ms.saturating_div(2).max(1))
        .max_delay(Duration::from_millis(tuning.graph_max_backoff_ms))
        .map(jitter)
        .take(tuning.graph_store_attempts.saturating_sub(1));

    RetryIf::spawn(strategy, action, |err: &AppError| {
        let retry = err.is_retryable_conflict();
        if retry {
            warn!(operation, "Transient SurrealDB conflict while writing the graph; retrying");
        }
        retry
    })
    .await
}

fn map_guard_error(event: &str, guard: &GuardError) -> AppError {
    AppError::InternalError(format!(
        "invalid ingestion pipeline transition during {event}: {guard:?}"
    ))
}
