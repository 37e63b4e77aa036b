//! Runs plugin chains: ADD and CHECK forward, DEL in reverse, plus the
//! network level GC and STATUS fan-out.
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use log::{debug, error, info, warn};
use serde_json::{Map, Value};

use crate::error::{NetchainError, NetchainErrorList, NetchainResult, Phase};
use crate::invoke::{self, Command, Context, Exec, InvocationArgs, RawExec};
use crate::types::{
    AnyResult, Capability, CapabilityArgs, GcArgs, NetConf, NetworkConfig, NetworkConfigList,
    RuntimeConf,
};
use crate::validation;
use crate::version::{self, PluginInfo, IMPLICIT_VERSION, MIN_CHECK_VERSION, MIN_GC_VERSION};

pub mod cache;

/// Key under which GC passes the attachments that must survive.
pub const VALID_ATTACHMENTS_KEY: &str = "cni.dev/valid-attachments";

/// What happens to the plugins that already succeeded when an ADD chain fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RollbackPolicy {
    /// Send DEL to them in reverse order before returning the error.
    #[default]
    Rollback,
    /// Leave them, the caller is expected to DEL the attachment itself.
    LeaveInPlace,
}

/// Entry point for running network config lists against plugin executables.
pub struct CniConfig<E: Exec = RawExec> {
    paths: Vec<PathBuf>,
    exec: E,
    cache_dir: Option<PathBuf>,
    rollback: RollbackPolicy,
    negotiate: bool,
}

impl CniConfig<RawExec> {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        CniConfig::with_exec(paths, RawExec::new())
    }
}

impl<E: Exec> CniConfig<E> {
    pub fn with_exec(paths: Vec<PathBuf>, exec: E) -> Self {
        CniConfig {
            paths,
            exec,
            cache_dir: None,
            rollback: RollbackPolicy::default(),
            negotiate: true,
        }
    }

    /// Store ADD results below `dir`, needed for CHECK.
    pub fn cache_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    pub fn rollback(mut self, policy: RollbackPolicy) -> Self {
        self.rollback = policy;
        self
    }

    /// Query every plugin with VERSION before ADD, DEL and CHECK. On by default.
    pub fn negotiate(mut self, negotiate: bool) -> Self {
        self.negotiate = negotiate;
        self
    }

    pub fn exec(&self) -> &E {
        &self.exec
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    fn cache_for<'a>(&'a self, rt: &'a RuntimeConf) -> Option<&'a Path> {
        rt.cache_dir.as_deref().or(self.cache_dir.as_deref())
    }

    /// Run ADD on every plugin of the list in order and return the result of
    /// the last one, in the list's version.
    pub fn add_network_list(
        &self,
        ctx: &Context,
        list: &NetworkConfigList,
        rt: &RuntimeConf,
    ) -> NetchainResult<AnyResult> {
        validate_runtime(rt)?;
        let version = list_version(list);
        let paths = self.prepare(ctx, list, version)?;

        let mut prev: Option<AnyResult> = None;
        for (i, path) in paths.iter().enumerate() {
            let res = check_cancelled(ctx)
                .and_then(|_| self.add_one(ctx, list, i, path, prev.as_ref(), rt));
            match res {
                Ok(result) => prev = Some(result),
                Err(e) => {
                    if self.rollback == RollbackPolicy::Rollback {
                        self.roll_back(list, &paths[..i], prev.as_ref(), rt);
                    }
                    return Err(e);
                }
            }
        }

        let result = prev.ok_or_else(|| NetchainError::msg("network list has no plugins"))?;
        if let Some(dir) = self.cache_for(rt) {
            cache::write_result(dir, &list.name, rt, &result).map_err(|e| {
                NetchainError::wrap(
                    format!("failed to set network {:?} cached result", list.name),
                    e,
                )
            })?;
        }
        info!(
            "added container {} to network {} as {}",
            rt.container_id, list.name, rt.if_name
        );
        Ok(result)
    }

    fn add_one(
        &self,
        ctx: &Context,
        list: &NetworkConfigList,
        position: usize,
        path: &Path,
        prev: Option<&AnyResult>,
        rt: &RuntimeConf,
    ) -> NetchainResult<AnyResult> {
        let version = list_version(list);
        let conf = &list.plugins[position];
        let plugin = &conf.network.plugin_type;
        let stdin = build_one_config(&list.name, version, conf, prev, rt)
            .map_err(|e| NetchainError::stage(plugin, position, Phase::Conversion, e))?;
        let args = self.invocation(Command::Add, rt);

        debug!("executing ADD of plugin {} (position {})", plugin, position);
        let result =
            invoke::exec_plugin_with_result(ctx, &self.exec, path, &stdin, &args, version)
                .map_err(|e| NetchainError::stage(plugin, position, Phase::Execution, e))?;
        result
            .convert_to(version)
            .map_err(|e| NetchainError::stage(plugin, position, Phase::Conversion, e))
    }

    /// DEL the plugins that already succeeded, newest first. Errors are only
    /// logged, the caller gets the error that caused the rollback.
    fn roll_back(
        &self,
        list: &NetworkConfigList,
        done: &[PathBuf],
        prev: Option<&AnyResult>,
        rt: &RuntimeConf,
    ) {
        // cleanup has to happen even when the operation itself was cancelled
        let ctx = Context::background();
        for (i, path) in done.iter().enumerate().rev() {
            if let Err(e) = self.del_one(&ctx, list, i, path, prev, rt) {
                error!(
                    "failed to cleanup previous plugins after ADD failed: {}",
                    e
                );
            }
        }
    }

    /// Run DEL on every plugin of the list in reverse order. All plugins are
    /// called even if some fail, the errors are returned together.
    pub fn del_network_list(
        &self,
        ctx: &Context,
        list: &NetworkConfigList,
        rt: &RuntimeConf,
    ) -> NetchainResult<()> {
        validate_runtime(rt)?;
        let version = list_version(list);

        let cached = match self.cached_result(list, rt) {
            Ok(r) => r,
            Err(e) => {
                warn!("ignoring cached result of {}: {}", list.name, e);
                None
            }
        };

        let mut errors = NetchainErrorList::new();
        // a plugin that cannot be found or negotiated with must not stop the
        // others from releasing what they hold
        for i in (0..list.plugins.len()).rev() {
            if let Err(e) = check_cancelled(ctx) {
                errors.push(e);
                break;
            }
            let res = self
                .resolve(ctx, list, i, version)
                .and_then(|path| self.del_one(ctx, list, i, &path, cached.as_ref(), rt));
            if let Err(e) = res {
                errors.push(e);
            }
        }

        if errors.is_empty() {
            if let Some(dir) = self.cache_for(rt) {
                if let Err(e) =
                    cache::remove_result(dir, &list.name, &rt.container_id, &rt.if_name)
                {
                    errors.push(e);
                }
            }
        }
        errors.into_result()
    }

    fn del_one(
        &self,
        ctx: &Context,
        list: &NetworkConfigList,
        position: usize,
        path: &Path,
        prev: Option<&AnyResult>,
        rt: &RuntimeConf,
    ) -> NetchainResult<()> {
        let plugin = &list.plugins[position].network.plugin_type;
        let conf = &list.plugins[position];
        let stdin = build_one_config(&list.name, list_version(list), conf, prev, rt)
            .map_err(|e| NetchainError::stage(plugin, position, Phase::Conversion, e))?;
        let args = self.invocation(Command::Del, rt);
        debug!("executing DEL of plugin {} (position {})", plugin, position);
        invoke::exec_plugin_without_result(ctx, &self.exec, path, &stdin, &args)
            .map_err(|e| NetchainError::stage(plugin, position, Phase::Execution, e))
    }

    /// Run CHECK on every plugin of the list against the cached ADD result.
    pub fn check_network_list(
        &self,
        ctx: &Context,
        list: &NetworkConfigList,
        rt: &RuntimeConf,
    ) -> NetchainResult<()> {
        let version = list_version(list);
        if !version::greater_than_or_equal_to(version, MIN_CHECK_VERSION)? {
            return Err(NetchainError::invalid_config(format!(
                "configuration version \"{}\" does not support the CHECK command",
                version
            )));
        }
        if list.disable_check {
            debug!("CHECK is disabled for network {}", list.name);
            return Ok(());
        }
        validate_runtime(rt)?;

        let cached = self.cached_result(list, rt)?.ok_or_else(|| {
            NetchainError::msg(format!(
                "no cached result found for container {} on network {} ({})",
                rt.container_id, list.name, rt.if_name
            ))
        })?;
        let paths = self.prepare(ctx, list, version)?;

        for (i, (conf, path)) in list.plugins.iter().zip(&paths).enumerate() {
            check_cancelled(ctx)?;
            let plugin = &conf.network.plugin_type;
            let stdin = build_one_config(&list.name, version, conf, Some(&cached), rt)
                .map_err(|e| NetchainError::stage(plugin, i, Phase::Conversion, e))?;
            let args = self.invocation(Command::Check, rt);
            debug!("executing CHECK of plugin {} (position {})", plugin, i);
            invoke::exec_plugin_without_result(ctx, &self.exec, path, &stdin, &args)
                .map_err(|e| NetchainError::stage(plugin, i, Phase::Execution, e))?;
        }
        Ok(())
    }

    /// Ask every plugin to release whatever it holds for attachments not in
    /// `args.valid_attachments`. Like DEL this tries all plugins.
    pub fn gc_network_list(
        &self,
        ctx: &Context,
        list: &NetworkConfigList,
        args: &GcArgs,
    ) -> NetchainResult<()> {
        let version = list_version(list);
        if !version::greater_than_or_equal_to(version, MIN_GC_VERSION)? {
            debug!(
                "skipping GC for network {}, version {} does not support it",
                list.name, version
            );
            return Ok(());
        }
        if list.disable_gc {
            debug!("GC is disabled for network {}", list.name);
            return Ok(());
        }

        let mut errors = NetchainErrorList::new();

        // stale cache entries go first, they describe attachments that are gone
        if let (Some(dir), Some(valid)) = (&self.cache_dir, &args.valid_attachments) {
            match cache::network_entries(dir, &list.name) {
                Ok(entries) => {
                    for entry in entries {
                        if valid.contains(&entry.attachment()) {
                            continue;
                        }
                        debug!(
                            "removing stale cache entry of {} ({})",
                            entry.container_id, entry.if_name
                        );
                        if let Err(e) = cache::remove_result(
                            dir,
                            &list.name,
                            &entry.container_id,
                            &entry.if_name,
                        ) {
                            errors.push(e);
                        }
                    }
                }
                Err(e) => errors.push(e),
            }
        }

        for (i, conf) in list.plugins.iter().enumerate() {
            if let Err(e) = check_cancelled(ctx) {
                errors.push(e);
                break;
            }
            let plugin = &conf.network.plugin_type;
            let path = match self.exec.find_in_path(plugin, &self.paths) {
                Ok(p) => p,
                Err(e) => {
                    errors.push(NetchainError::stage(plugin, i, Phase::Discovery, e));
                    continue;
                }
            };
            let res = build_gc_config(&list.name, version, conf, args).and_then(|stdin| {
                let inv = InvocationArgs::new(Command::Gc, self.paths.clone());
                debug!("executing GC of plugin {} (position {})", plugin, i);
                invoke::exec_plugin_without_result(ctx, &self.exec, &path, &stdin, &inv)
            });
            if let Err(e) = res {
                errors.push(NetchainError::stage(plugin, i, Phase::Execution, e));
            }
        }
        errors.into_result()
    }

    /// Ask every plugin whether it is ready to serve ADD requests.
    pub fn get_status_network_list(
        &self,
        ctx: &Context,
        list: &NetworkConfigList,
    ) -> NetchainResult<()> {
        let version = list_version(list);
        if !version::greater_than_or_equal_to(version, MIN_GC_VERSION)? {
            debug!(
                "skipping STATUS for network {}, version {} does not support it",
                list.name, version
            );
            return Ok(());
        }

        for (i, conf) in list.plugins.iter().enumerate() {
            check_cancelled(ctx)?;
            let plugin = &conf.network.plugin_type;
            let path = self
                .exec
                .find_in_path(plugin, &self.paths)
                .map_err(|e| NetchainError::stage(plugin, i, Phase::Discovery, e))?;
            let stdin = build_one_config(&list.name, version, conf, None, &RuntimeConf::default())
                .map_err(|e| NetchainError::stage(plugin, i, Phase::Conversion, e))?;
            let args = InvocationArgs::new(Command::Status, self.paths.clone());
            invoke::exec_plugin_without_result(ctx, &self.exec, &path, &stdin, &args)
                .map_err(|e| NetchainError::stage(plugin, i, Phase::Execution, e))?;
        }
        Ok(())
    }

    /// Check that every plugin exists and speaks the list's version, returns
    /// the capabilities the plugins ask for.
    pub fn validate_network_list(
        &self,
        ctx: &Context,
        list: &NetworkConfigList,
    ) -> NetchainResult<Vec<String>> {
        let version = list_version(list);
        let mut caps = BTreeSet::new();
        for (i, conf) in list.plugins.iter().enumerate() {
            let plugin = &conf.network.plugin_type;
            let path = self
                .exec
                .find_in_path(plugin, &self.paths)
                .map_err(|e| NetchainError::stage(plugin, i, Phase::Discovery, e))?;
            invoke::get_version_info(ctx, &self.exec, &path, &self.paths)
                .and_then(|info| info.confirm(version))
                .map_err(|e| NetchainError::stage(plugin, i, Phase::Negotiation, e))?;
            caps.extend(
                conf.network
                    .capabilities
                    .iter()
                    .filter(|(_, enabled)| **enabled)
                    .map(|(name, _)| name.clone()),
            );
        }
        Ok(caps.into_iter().collect())
    }

    /// VERSION info of a single plugin found by type.
    pub fn get_version_info(&self, ctx: &Context, plugin_type: &str) -> NetchainResult<PluginInfo> {
        let path = self.exec.find_in_path(plugin_type, &self.paths)?;
        invoke::get_version_info(ctx, &self.exec, &path, &self.paths)
    }

    /// The result stored by the last successful ADD of this attachment.
    pub fn get_cached_result(
        &self,
        list: &NetworkConfigList,
        rt: &RuntimeConf,
    ) -> NetchainResult<Option<AnyResult>> {
        self.cached_result(list, rt)
    }

    fn cached_result(
        &self,
        list: &NetworkConfigList,
        rt: &RuntimeConf,
    ) -> NetchainResult<Option<AnyResult>> {
        let dir = match self.cache_for(rt) {
            Some(d) => d,
            None => return Ok(None),
        };
        match cache::read_result(dir, &list.name, &rt.container_id, &rt.if_name)? {
            Some(entry) => Ok(Some(entry.parse_result()?)),
            None => Ok(None),
        }
    }

    pub fn add_network(
        &self,
        ctx: &Context,
        conf: &NetworkConfig,
        rt: &RuntimeConf,
    ) -> NetchainResult<AnyResult> {
        let list = NetworkConfigList::from_single(conf.clone())?;
        self.add_network_list(ctx, &list, rt)
    }

    pub fn check_network(
        &self,
        ctx: &Context,
        conf: &NetworkConfig,
        rt: &RuntimeConf,
    ) -> NetchainResult<()> {
        let list = NetworkConfigList::from_single(conf.clone())?;
        self.check_network_list(ctx, &list, rt)
    }

    pub fn del_network(
        &self,
        ctx: &Context,
        conf: &NetworkConfig,
        rt: &RuntimeConf,
    ) -> NetchainResult<()> {
        let list = NetworkConfigList::from_single(conf.clone())?;
        self.del_network_list(ctx, &list, rt)
    }

    /// Resolve every plugin and, unless disabled, confirm it speaks `version`.
    /// Runs before anything is mutated so these failures leave no state behind.
    fn prepare(
        &self,
        ctx: &Context,
        list: &NetworkConfigList,
        version: &str,
    ) -> NetchainResult<Vec<PathBuf>> {
        (0..list.plugins.len())
            .map(|i| self.resolve(ctx, list, i, version))
            .collect()
    }

    /// Find the plugin at `position` and, unless disabled, confirm it speaks `version`.
    fn resolve(
        &self,
        ctx: &Context,
        list: &NetworkConfigList,
        position: usize,
        version: &str,
    ) -> NetchainResult<PathBuf> {
        let plugin = &list.plugins[position].network.plugin_type;
        let path = self
            .exec
            .find_in_path(plugin, &self.paths)
            .map_err(|e| NetchainError::stage(plugin, position, Phase::Discovery, e))?;
        if self.negotiate {
            invoke::get_version_info(ctx, &self.exec, &path, &self.paths)
                .and_then(|info| info.confirm(version))
                .map_err(|e| NetchainError::stage(plugin, position, Phase::Negotiation, e))?;
        }
        Ok(path)
    }

    fn invocation(&self, command: Command, rt: &RuntimeConf) -> InvocationArgs {
        InvocationArgs {
            command,
            container_id: rt.container_id.clone(),
            netns: rt.netns.clone(),
            if_name: rt.if_name.clone(),
            plugin_args: rt.args.clone(),
            path: self.paths.clone(),
        }
    }
}

fn validate_runtime(rt: &RuntimeConf) -> NetchainResult<()> {
    validation::validate_container_id(&rt.container_id)?;
    validation::validate_interface_name(&rt.if_name)
}

fn list_version(list: &NetworkConfigList) -> &str {
    if list.cni_version.is_empty() {
        IMPLICIT_VERSION
    } else {
        &list.cni_version
    }
}

fn check_cancelled(ctx: &Context) -> NetchainResult<()> {
    if ctx.is_cancelled() {
        return Err(NetchainError::Cancelled {
            stderr: String::new(),
        });
    }
    Ok(())
}

/// The capabilities `conf` asks for that the runtime supplied.
fn runtime_config(conf: &NetConf, caps: &CapabilityArgs) -> Map<String, Value> {
    let mut rc = Map::new();
    for (name, enabled) in &conf.capabilities {
        if !enabled {
            continue;
        }
        if let Ok(cap) = name.parse::<Capability>() {
            if let Some(value) = caps.get(cap) {
                rc.insert(name.clone(), value.clone());
            }
        }
    }
    rc
}

/// The stdin payload of one plugin: its own config with the list's name and
/// version, the previous result and the requested capabilities spliced in.
pub fn build_one_config(
    name: &str,
    version: &str,
    conf: &NetworkConfig,
    prev: Option<&AnyResult>,
    rt: &RuntimeConf,
) -> NetchainResult<Vec<u8>> {
    let mut obj = conf.to_object()?;
    obj.insert("name".to_string(), Value::String(name.to_string()));
    obj.insert("cniVersion".to_string(), Value::String(version.to_string()));
    if let Some(prev) = prev {
        obj.insert("prevResult".to_string(), prev.convert_to(version)?.to_value()?);
    }
    let rc = runtime_config(&conf.network, &rt.capability_args);
    if !rc.is_empty() {
        obj.insert("runtimeConfig".to_string(), Value::Object(rc));
    }
    Ok(serde_json::to_vec(&obj)?)
}

fn build_gc_config(
    name: &str,
    version: &str,
    conf: &NetworkConfig,
    args: &GcArgs,
) -> NetchainResult<Vec<u8>> {
    let mut obj = conf.to_object()?;
    obj.insert("name".to_string(), Value::String(name.to_string()));
    obj.insert("cniVersion".to_string(), Value::String(version.to_string()));
    if let Some(valid) = &args.valid_attachments {
        obj.insert(VALID_ATTACHMENTS_KEY.to_string(), serde_json::to_value(valid)?);
    }
    Ok(serde_json::to_vec(&obj)?)
}
