//! Scriptable command layer double.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use brook_bencode::Value;
use brook_torrent_core::{
    keys, CommandLayer, DownloadRegistry, InfoHash, PipelineError, PipelineResult, SharedDownload,
    Settings,
};

/// One recorded command execution.
#[derive(Debug, Clone)]
pub struct ExecutedCommand {
    pub name: String,
    pub args: Vec<Value>,
    pub target: Option<InfoHash>,
}

/// Command layer double backed by a settings table.
///
/// Global queries answer from the table; `d.*` setters write straight into
/// the target download's fields. Every execution is recorded, and any
/// command name can be scripted to fail.
pub struct StubCommandLayer {
    settings: BTreeMap<String, Value>,
    registry: Arc<Mutex<dyn DownloadRegistry>>,
    executed: Vec<ExecutedCommand>,
    fail_on: BTreeMap<String, String>,
}

impl StubCommandLayer {
    #[must_use]
    pub fn new(settings: &Settings, registry: Arc<Mutex<dyn DownloadRegistry>>) -> Self {
        let mut table = BTreeMap::new();
        table.insert(
            "directory.default".to_string(),
            Value::from(settings.directory_default.as_str()),
        );
        table.insert(
            "throttle.min_uploads".to_string(),
            Value::from(settings.min_uploads),
        );
        table.insert(
            "throttle.max_uploads".to_string(),
            Value::from(settings.max_uploads),
        );
        table.insert(
            "throttle.min_downloads".to_string(),
            Value::from(settings.min_downloads),
        );
        table.insert(
            "throttle.max_downloads".to_string(),
            Value::from(settings.max_downloads),
        );
        table.insert(
            "throttle.min_peers.normal".to_string(),
            Value::from(settings.min_peers),
        );
        table.insert(
            "throttle.max_peers.normal".to_string(),
            Value::from(settings.max_peers),
        );
        table.insert(
            "throttle.min_peers.seed".to_string(),
            Value::from(settings.min_peers_seed),
        );
        table.insert(
            "throttle.max_peers.seed".to_string(),
            Value::from(settings.max_peers_seed),
        );
        table.insert(
            "trackers.numwant".to_string(),
            Value::from(settings.tracker_numwant),
        );
        table.insert(
            "trackers.use_udp".to_string(),
            Value::from(settings.use_udp_trackers),
        );
        table.insert(
            "system.file.max_size".to_string(),
            Value::from(settings.max_file_size),
        );
        table.insert(
            "system.file.split_size".to_string(),
            Value::from(settings.split_size),
        );
        table.insert(
            "system.file.split_suffix".to_string(),
            Value::from(settings.split_suffix.as_str()),
        );
        table.insert(
            "protocol.pex".to_string(),
            Value::from(settings.peer_exchange),
        );

        Self {
            settings: table,
            registry,
            executed: Vec::new(),
            fail_on: BTreeMap::new(),
        }
    }

    /// Override a settings-table entry.
    pub fn set_setting(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.settings.insert(name.into(), value.into());
    }

    /// Script `name` to fail with `message` on every execution.
    pub fn fail_on(&mut self, name: impl Into<String>, message: impl Into<String>) {
        self.fail_on.insert(name.into(), message.into());
    }

    /// Every execution recorded so far, in order.
    #[must_use]
    pub fn executed(&self) -> &[ExecutedCommand] {
        &self.executed
    }

    /// Names of every execution recorded so far, in order.
    #[must_use]
    pub fn executed_names(&self) -> Vec<String> {
        self.executed.iter().map(|call| call.name.clone()).collect()
    }

    fn int_arg(args: &[Value]) -> PipelineResult<i64> {
        args.first()
            .and_then(Value::as_int)
            .ok_or_else(|| PipelineError::command("integer argument expected"))
    }

    fn str_arg(args: &[Value]) -> PipelineResult<String> {
        args.first()
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| PipelineError::command("string argument expected"))
    }
}

fn require<'a>(target: Option<&'a SharedDownload>, name: &str) -> PipelineResult<&'a SharedDownload> {
    target.ok_or_else(|| PipelineError::command(format!("{name} requires a download target")))
}

impl CommandLayer for StubCommandLayer {
    fn execute(
        &mut self,
        name: &str,
        args: &[Value],
        target: Option<&SharedDownload>,
    ) -> PipelineResult<Value> {
        self.executed.push(ExecutedCommand {
            name: name.to_string(),
            args: args.to_vec(),
            target: target.map(|download| {
                download.lock().expect("download mutex poisoned").info_hash()
            }),
        });

        if let Some(message) = self.fail_on.get(name) {
            return Err(PipelineError::command(message.clone()));
        }

        if let Some(value) = self.settings.get(name) {
            return Ok(value.clone());
        }

        match name {
            "d.priority.set" => {
                require(target, name)?.lock().unwrap().priority = Self::int_arg(args)?;
            }
            "d.uploads_min.set" => {
                require(target, name)?.lock().unwrap().uploads_min = Self::int_arg(args)?;
            }
            "d.uploads_max.set" => {
                require(target, name)?.lock().unwrap().uploads_max = Self::int_arg(args)?;
            }
            "d.downloads_min.set" => {
                require(target, name)?.lock().unwrap().downloads_min = Self::int_arg(args)?;
            }
            "d.downloads_max.set" => {
                require(target, name)?.lock().unwrap().downloads_max = Self::int_arg(args)?;
            }
            "d.peers_min.set" => {
                require(target, name)?.lock().unwrap().peers_min = Self::int_arg(args)?;
            }
            "d.peers_max.set" => {
                require(target, name)?.lock().unwrap().peers_max = Self::int_arg(args)?;
            }
            "d.tracker_key.set" => {
                let key = u32::try_from(Self::int_arg(args)?)
                    .map_err(|_| PipelineError::command("tracker key out of range"))?;
                require(target, name)?.lock().unwrap().tracker_key = key;
            }
            "d.tracker_numwant.set" => {
                require(target, name)?.lock().unwrap().tracker_numwant = Self::int_arg(args)?;
            }
            "d.max_file_size.set" => {
                require(target, name)?.lock().unwrap().max_file_size = Self::int_arg(args)?;
            }
            "d.directory.set" => {
                require(target, name)?.lock().unwrap().directory = Self::str_arg(args)?;
            }
            "d.directory_base.set" => {
                require(target, name)?.lock().unwrap().directory_base = Some(Self::str_arg(args)?);
            }
            "d.tied_to_file.set" => {
                require(target, name)?.lock().unwrap().tied_to_file = Self::str_arg(args)?;
            }
            "d.peer_exchange.set" => {
                require(target, name)?.lock().unwrap().peer_exchange = Self::int_arg(args)? != 0;
            }
            "d.state.set" => {
                require(target, name)?.lock().unwrap().started = Self::int_arg(args)? != 0;
            }
            "d.start" => {
                require(target, name)?.lock().unwrap().started = true;
            }
            "d.stop" => {
                require(target, name)?.lock().unwrap().started = false;
            }
            "d.complete" => {
                let complete = require(target, name)?
                    .lock()
                    .unwrap()
                    .bencode()
                    .get_key(keys::BOOKKEEPING)
                    .and_then(|section| section.get_key_value("complete"))
                    .unwrap_or(0);
                return Ok(Value::from(complete));
            }
            "d.erase" => {
                let hash = require(target, name)?.lock().unwrap().info_hash();
                self.registry
                    .lock()
                    .expect("registry mutex poisoned")
                    .erase(&hash);
            }
            "event.download.inserted_new" | "event.download.inserted_session" => {}
            _ => {
                return Err(PipelineError::command(format!("unknown command: {name}")));
            }
        }
        Ok(Value::Integer(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::StubRegistry;
    use brook_bencode::Value;
    use brook_torrent_core::{Download, InfoHash};

    fn layer() -> (StubCommandLayer, Arc<Mutex<StubRegistry>>) {
        let registry = Arc::new(Mutex::new(StubRegistry::new()));
        let layer = StubCommandLayer::new(&Settings::default(), registry.clone());
        (layer, registry)
    }

    fn download() -> SharedDownload {
        Download::new(InfoHash::from_bytes([9; 20]), Value::map(), false, Vec::new()).into_shared()
    }

    #[test]
    fn global_queries_answer_from_the_settings_table() {
        let (mut layer, _registry) = layer();
        let value = layer.execute("throttle.max_peers.normal", &[], None).unwrap();
        assert_eq!(value.as_int(), Some(100));
    }

    #[test]
    fn setters_write_through_to_the_target() {
        let (mut layer, _registry) = layer();
        let target = download();
        layer
            .execute("d.priority.set", &[Value::from(3_i64)], Some(&target))
            .unwrap();
        layer
            .execute("d.directory.set", &[Value::from("/data")], Some(&target))
            .unwrap();

        let target = target.lock().unwrap();
        assert_eq!(target.priority, 3);
        assert_eq!(target.directory, "/data");
    }

    #[test]
    fn setters_without_a_target_fail() {
        let (mut layer, _registry) = layer();
        let err = layer
            .execute("d.priority.set", &[Value::from(1_i64)], None)
            .unwrap_err();
        assert!(matches!(err, PipelineError::Command { .. }));
    }

    #[test]
    fn scripted_failures_fire_before_dispatch() {
        let (mut layer, _registry) = layer();
        layer.fail_on("d.start", "scripted");
        let target = download();
        let err = layer.execute("d.start", &[], Some(&target)).unwrap_err();
        assert_eq!(err.to_string(), "scripted");
        assert_eq!(layer.executed().len(), 1);
    }

    #[test]
    fn erase_removes_the_download_from_the_registry() {
        let (mut layer, registry) = layer();
        let target = download();
        registry.lock().unwrap().insert(target.clone());
        assert_eq!(registry.lock().unwrap().len(), 1);

        layer.execute("d.erase", &[], Some(&target)).unwrap();
        assert!(registry.lock().unwrap().is_empty());
    }
}
