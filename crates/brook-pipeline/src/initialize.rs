//! The merge-and-initialize pipeline run once load and commit rendezvous.

use std::sync::{Arc, Mutex};

use brook_bencode::Value;
use brook_torrent_core::{
    keys, resume, InfoHash, PipelineContext, PipelineError, PipelineResult, SharedDownload,
};
use rand::Rng;
use tracing::debug;

use crate::factory::{self, FactoryState};
use crate::resolver;

const STATE_POISONED: &str = "factory state mutex poisoned";
const DOWNLOAD_POISONED: &str = "download mutex poisoned";
const COMMANDS_POISONED: &str = "command layer mutex poisoned";
const REGISTRY_POISONED: &str = "registry mutex poisoned";

/// Everything the factory needs from its state, captured before any
/// collaborator lock is taken.
struct CreationRequest {
    uri: String,
    variables: std::collections::BTreeMap<String, Value>,
    commands: Vec<String>,
    session: bool,
    start: bool,
    print_log: bool,
    is_file: bool,
    immediate: bool,
}

/// Values read out of the merged document under the download lock, applied
/// to the engine afterwards without holding it.
struct DocSnapshot {
    priority: i64,
    tracker_key: u32,
    total_uploaded: u64,
    total_downloaded: u64,
    chunks: Option<(i64, i64)>,
    throttle_name: Option<String>,
    directory_override: Option<Value>,
    complete: bool,
    resume: Value,
}

/// Drive a rendezvoused factory to a registered, initialized download.
///
/// Failures anywhere along the way route through the factory's single
/// failure path; a download that fails a post-creation command stays
/// registered, flagged, with the remaining commands already applied.
pub(crate) fn run(ctx: &PipelineContext, state: &Arc<Mutex<FactoryState>>) {
    let (request, source) = {
        let mut state = state.lock().expect(STATE_POISONED);
        let source = state
            .source
            .take()
            .expect("rendezvous completed without a source");
        (
            CreationRequest {
                uri: state.uri.clone(),
                variables: state.variables.clone(),
                commands: state.commands.clone(),
                session: state.session,
                start: state.start,
                print_log: state.print_log,
                is_file: state.is_file,
                immediate: state.immediate,
            },
            source,
        )
    };

    let constructed = ctx
        .registry
        .lock()
        .expect(REGISTRY_POISONED)
        .construct(source);
    let download = match constructed {
        Ok(download) => download,
        Err(error) => {
            factory::receive_failed(ctx, state, error);
            return;
        }
    };

    let snapshot = prepare_document(ctx, &request, &download);
    if let Err(error) = apply_defaults(ctx, &request, &download, &snapshot) {
        // The unregistered download is dropped with the handle.
        factory::receive_failed(ctx, state, error);
        return;
    }

    let info_hash = download.lock().expect(DOWNLOAD_POISONED).info_hash();
    let inserted = ctx
        .registry
        .lock()
        .expect(REGISTRY_POISONED)
        .insert(download.clone());
    if !inserted {
        factory::fire_outcome(state);
        return;
    }

    log_created(&request, &download, info_hash);

    if request.immediate {
        state.lock().expect(STATE_POISONED).result = Some(info_hash);
    }

    apply_commands(ctx, &request, &download, info_hash);

    factory::fire_outcome(state);
}

/// Merge sidecars and normalize the bookkeeping section, all under the
/// download lock, and snapshot what the engine setup needs.
fn prepare_document(
    ctx: &PipelineContext,
    request: &CreationRequest,
    download: &SharedDownload,
) -> DocSnapshot {
    let mut download = download.lock().expect(DOWNLOAD_POISONED);
    let now = ctx.clock.seconds();

    if download.is_meta_download() {
        let mut stash = Value::map();
        stash.insert_key("start", request.start);
        stash.insert_key("print_log", request.print_log);
        stash.insert_key(
            "commands",
            request
                .commands
                .iter()
                .map(|command| Value::from(command.as_str()))
                .collect::<Vec<_>>(),
        );
        download.bencode_mut().insert_key(keys::META_STASH, stash);
    }

    let root = download.bencode_mut();
    if request.session {
        merge_sidecar(root, &request.uri, keys::BOOKKEEPING, keys::BOOKKEEPING_SIDECAR_SUFFIX);
        merge_sidecar(root, &request.uri, keys::RESUME, keys::RESUME_SIDECAR_SUFFIX);
    } else {
        // Bookkeeping from a foreign client must never leak into a fresh
        // addition.
        root.erase_key(keys::BOOKKEEPING);
    }
    root.insert_preserve(keys::BOOKKEEPING, Value::map());
    root.insert_preserve(keys::RESUME, Value::map());

    let bookkeeping = root
        .get_key_mut(keys::BOOKKEEPING)
        .expect("bookkeeping section just ensured");
    initialize_bookkeeping(bookkeeping, now, request);

    let priority = bookkeeping
        .get_key_value("priority")
        .map_or(2, |value| value.rem_euclid(4));
    bookkeeping.insert_key("priority", priority);

    let tracker_key = bookkeeping
        .get_key_value("key")
        .and_then(|value| u32::try_from(value).ok())
        .filter(|key| *key != 0)
        .unwrap_or_else(|| rand::rng().random_range(1..=u32::MAX));
    bookkeeping.insert_key("key", i64::from(tracker_key));

    let total_uploaded = bookkeeping
        .get_key_value("total_uploaded")
        .and_then(|value| u64::try_from(value).ok())
        .unwrap_or(0);
    let total_downloaded = bookkeeping
        .get_key_value("total_downloaded")
        .and_then(|value| u64::try_from(value).ok())
        .unwrap_or(0);
    let chunks = match (
        bookkeeping.get_key_value("chunks_done"),
        bookkeeping.get_key_value("chunks_wanted"),
    ) {
        (Some(done), Some(wanted)) => Some((done, wanted)),
        _ => None,
    };
    let throttle_name = bookkeeping
        .get_key_str("throttle_name")
        .map(str::to_string);
    let directory_override = bookkeeping.get_key("directory").cloned();
    let complete = bookkeeping.get_key_value("complete").unwrap_or(0) != 0;
    let resume = root
        .get_key(keys::RESUME)
        .cloned()
        .expect("resume section just ensured");

    DocSnapshot {
        priority,
        tracker_key,
        total_uploaded,
        total_downloaded,
        chunks,
        throttle_name,
        directory_override,
        complete,
        resume,
    }
}

/// Merge one persisted sidecar section into the root document, wholesale.
/// Missing or unreadable sidecars are skipped.
fn merge_sidecar(root: &mut Value, uri: &str, key: &str, suffix: &str) {
    let path = resolver::expand_path(&format!("{uri}{suffix}"));
    let Ok(bytes) = std::fs::read(&path) else {
        return;
    };
    let Ok(section) = brook_bencode::decode(&bytes) else {
        return;
    };
    if section.as_map().is_some() {
        root.insert_key(key, section);
    }
}

/// Normalize the bookkeeping section: validate persisted state, then fill
/// every missing key with its default.
fn initialize_bookkeeping(root: &mut Value, now: i64, request: &CreationRequest) {
    let state_valid = root
        .get_key_value("state")
        .is_some_and(|state| (0..=1).contains(&state));
    let changed_valid = root
        .get_key_value("state_changed")
        .is_some_and(|changed| changed > 0 && changed <= now);
    let counter_valid = root
        .get_key_value("state_counter")
        .is_some_and(|counter| (0..=keys::STATE_COUNTER_LIMIT).contains(&counter));

    if !state_valid {
        root.insert_key("state", i64::from(request.start));
        root.insert_key("state_changed", now);
        root.insert_key("state_counter", 0_i64);
    } else if !changed_valid || !counter_valid {
        root.insert_key("state_changed", now);
        root.insert_key("state_counter", 0_i64);
    }

    root.insert_preserve("complete", 0_i64);
    root.insert_preserve("hashing", keys::HASHING_STOPPED);
    root.insert_preserve("timestamp.started", 0_i64);
    root.insert_preserve("timestamp.finished", 0_i64);
    root.insert_preserve("timestamp.last_active", 0_i64);
    root.insert_preserve("tied_to_file", "");
    root.insert_key(
        "loaded_file",
        if request.is_file {
            request.uri.as_str()
        } else {
            ""
        },
    );
    root.insert_preserve("ignore_commands", 0_i64);
    root.insert_preserve("views", Value::list());

    let leech = request
        .variables
        .get("connection_leech")
        .cloned()
        .unwrap_or_else(|| Value::from(""));
    let seed = request
        .variables
        .get("connection_seed")
        .cloned()
        .unwrap_or_else(|| Value::from(""));
    root.insert_preserve_type("connection_leech", leech);
    root.insert_preserve_type("connection_seed", seed);

    root.insert_preserve("choke_heuristics.up.leech", "");
    root.insert_preserve("choke_heuristics.up.seed", "");
    root.insert_preserve("choke_heuristics.down.leech", "");
    root.insert_preserve("choke_heuristics.down.seed", "");

    for key in ["custom1", "custom2", "custom3", "custom4", "custom5"] {
        root.insert_preserve(key, "");
    }
}

/// Apply session settings and the persisted snapshot to the still
/// unregistered download.
fn apply_defaults(
    ctx: &PipelineContext,
    request: &CreationRequest,
    download: &SharedDownload,
    snapshot: &DocSnapshot,
) -> PipelineResult<()> {
    {
        let mut download = download.lock().expect(DOWNLOAD_POISONED);
        download.total_uploaded = snapshot.total_uploaded;
        download.total_downloaded = snapshot.total_downloaded;
        download.chunks = snapshot.chunks;
        if let Some(name) = &snapshot.throttle_name {
            download.throttle_name = name.clone();
        }
    }

    {
        let mut commands = ctx.commands.lock().expect(COMMANDS_POISONED);
        let target = Some(download);

        commands.execute(
            "d.priority.set",
            &[Value::from(snapshot.priority)],
            target,
        )?;
        commands.execute(
            "d.tracker_key.set",
            &[Value::from(i64::from(snapshot.tracker_key))],
            target,
        )?;

        for (query, setter) in [
            ("throttle.min_uploads", "d.uploads_min.set"),
            ("throttle.max_uploads", "d.uploads_max.set"),
            ("throttle.min_downloads", "d.downloads_min.set"),
            ("throttle.max_downloads", "d.downloads_max.set"),
            ("throttle.min_peers.normal", "d.peers_min.set"),
            ("throttle.max_peers.normal", "d.peers_max.set"),
            ("trackers.numwant", "d.tracker_numwant.set"),
            ("system.file.max_size", "d.max_file_size.set"),
        ] {
            let value = commands.execute(query, &[], None)?;
            commands.execute(setter, &[value], target)?;
        }

        if snapshot.complete {
            let min_seed = commands
                .execute("throttle.min_peers.seed", &[], None)?
                .as_int()
                .unwrap_or(-1);
            if min_seed >= 0 {
                commands.execute("d.peers_min.set", &[Value::from(min_seed)], target)?;
            }
            let max_seed = commands
                .execute("throttle.max_peers.seed", &[], None)?
                .as_int()
                .unwrap_or(-1);
            if max_seed >= 0 {
                commands.execute("d.peers_max.set", &[Value::from(max_seed)], target)?;
            }
        }

        let use_udp = commands
            .execute("trackers.use_udp", &[], None)?
            .as_int()
            .unwrap_or(1);
        if use_udp == 0 {
            download.lock().expect(DOWNLOAD_POISONED).udp_trackers = false;
        }

        let split_size = commands
            .execute("system.file.split_size", &[], None)?
            .as_int()
            .unwrap_or(-1);
        if split_size >= 0 {
            let suffix = commands.execute("system.file.split_suffix", &[], None)?;
            let suffix = suffix.as_str().unwrap_or(".part").to_string();
            download
                .lock()
                .expect(DOWNLOAD_POISONED)
                .split_files(split_size, &suffix);
        }

        match &snapshot.directory_override {
            Some(directory) => {
                commands.execute("d.directory_base.set", &[directory.clone()], target)?;
            }
            None => {
                let directory = request
                    .variables
                    .get("directory")
                    .cloned()
                    .unwrap_or_else(|| Value::from(""));
                commands.execute("d.directory.set", &[directory], target)?;
            }
        }

        let tied = request
            .variables
            .get("tied_to_file")
            .and_then(Value::as_int)
            .unwrap_or(0);
        if !request.session && tied != 0 {
            let tied_file = if request.uri.is_empty() {
                request
                    .variables
                    .get("tied_file")
                    .cloned()
                    .unwrap_or_else(|| Value::from(""))
            } else {
                Value::from(request.uri.as_str())
            };
            commands.execute("d.tied_to_file.set", &[tied_file], target)?;
        }

        let pex = commands.execute("protocol.pex", &[], None)?;
        commands.execute("d.peer_exchange.set", &[pex], target)?;
    }

    {
        let mut download = download.lock().expect(DOWNLOAD_POISONED);
        resume::load_addresses(&mut download, &snapshot.resume);
        resume::load_file_priorities(&mut download, &snapshot.resume);
        resume::load_tracker_settings(&mut download, &snapshot.resume);
    }

    Ok(())
}

/// Run the caller's post-creation commands, set the initial state, and fire
/// the insertion event.
///
/// A failing command flags the download and moves on; the remaining
/// commands still run, and the pipeline never rolls earlier ones back.
fn apply_commands(
    ctx: &PipelineContext,
    request: &CreationRequest,
    download: &SharedDownload,
    info_hash: InfoHash,
) {
    for command in &request.commands {
        let result = ctx
            .commands
            .lock()
            .expect(COMMANDS_POISONED)
            .execute_raw(command, Some(download));
        if let Err(error) = result {
            command_failed(ctx, request, info_hash, &error);
        }
    }

    if !request.session {
        // A command may have erased its own download.
        if !ctx
            .registry
            .lock()
            .expect(REGISTRY_POISONED)
            .contains(&info_hash)
        {
            command_failed(ctx, request, info_hash, &PipelineError::Vanished);
            return;
        }

        let result = ctx.commands.lock().expect(COMMANDS_POISONED).execute(
            "d.state.set",
            &[Value::from(i64::from(request.start))],
            Some(download),
        );
        if let Err(error) = result {
            command_failed(ctx, request, info_hash, &error);
        }
    }

    let event = if request.session {
        "event.download.inserted_session"
    } else {
        "event.download.inserted_new"
    };
    ctx.commands
        .lock()
        .expect(COMMANDS_POISONED)
        .execute_catching(event, Some(download), "Download event action failed: ");
}

/// Log a post-creation failure and flag the download when it is still
/// registered. Nothing is removed or rolled back.
fn command_failed(
    ctx: &PipelineContext,
    request: &CreationRequest,
    info_hash: InfoHash,
    error: &PipelineError,
) {
    let message = format!("Command on torrent creation failed: {error}");
    tracing::warn!(info_hash = %info_hash, error = %error, "post-creation command failed");
    if request.print_log {
        ctx.log.push(ctx.clock.seconds(), message.clone());
    }

    let registered = ctx
        .registry
        .lock()
        .expect(REGISTRY_POISONED)
        .find(&info_hash);
    if let Some(download) = registered {
        download
            .lock()
            .expect(DOWNLOAD_POISONED)
            .set_hash_failed(message);
    }
}

fn log_created(request: &CreationRequest, download: &SharedDownload, info_hash: InfoHash) {
    let download = download.lock().expect(DOWNLOAD_POISONED);
    debug!(
        info_hash = %info_hash,
        session = request.session,
        magnet = download.is_meta_download(),
        directory = %download.directory,
        directory_base = download.directory_base.as_deref().unwrap_or(""),
        commands = request.commands.len(),
        "download created"
    );
}
