//! Plugin lifecycle host.
//!
//! [`PluginHost`] owns every loaded plugin, the [`CommandRouter`] and the
//! [`BackendRegistry`]. Loading drives the two-phase protocol:
//!
//! declare -> validate -> merge options -> activate -> gate on `is_active`
//! -> register TTS backends -> index commands.
//!
//! A plugin that fails to load is skipped; the host keeps going.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::PluginError;
use crate::manifest::Manifest;
use crate::options::{EffectiveOptions, OptionMap, merge};
use crate::router::{CommandRouter, CommandTarget, ConflictPolicy};
use crate::traits::{CommandContext, SkillPlugin, SpeechSink};
use crate::voice::{ActiveBackend, BackendRegistry, TtsBackend};

/// Where a loaded plugin ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginState {
    /// `is_active` was false: no commands registered.
    Suppressed,
    Active,
    /// Commands registered, but the plugin has no working backend and
    /// its handlers fail fast.
    ActiveWithWarning,
}

impl std::fmt::Display for PluginState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Suppressed => "suppressed",
            Self::Active => "active",
            Self::ActiveWithWarning => "active (not configured)",
        })
    }
}

/// Result of loading one plugin.
#[derive(Debug)]
pub struct LoadReport {
    pub plugin: String,
    pub state: PluginState,
    /// Aliases indexed for this plugin.
    pub commands: usize,
    pub backends: Vec<String>,
    /// Aliases another plugin already held.
    pub conflicts: Vec<PluginError>,
}

/// The handler a dispatched utterance reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub plugin: String,
    pub command: String,
    pub alias: String,
    pub residual: String,
}

/// Listing entry for a loaded plugin.
#[derive(Debug, Clone, Serialize)]
pub struct PluginSummary {
    pub id: String,
    pub name: String,
    pub version: String,
    pub description: String,
    pub requires_online: bool,
    pub state: PluginState,
    /// Command patterns left after activation.
    pub commands: Vec<String>,
    pub backends: Vec<String>,
}

struct LoadedPlugin {
    plugin: Arc<dyn SkillPlugin>,
    manifest: Manifest,
    options: EffectiveOptions,
    state: PluginState,
}

/// Owner of plugins, router and TTS backends.
pub struct PluginHost {
    plugins: BTreeMap<String, LoadedPlugin>,
    router: CommandRouter,
    backends: BackendRegistry,
    speech: Arc<dyn SpeechSink>,
    dispatch_gate: Mutex<()>,
}

impl PluginHost {
    pub fn new(speech: Arc<dyn SpeechSink>) -> Self {
        Self {
            plugins: BTreeMap::new(),
            router: CommandRouter::new(),
            backends: BackendRegistry::new(),
            speech,
            dispatch_gate: Mutex::new(()),
        }
    }

    /// Use `policy` for alias conflicts. Call before loading plugins.
    pub fn with_conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.router = CommandRouter::with_policy(policy);
        self
    }

    /// Load and activate `plugin` with its persisted options.
    pub async fn load(
        &mut self,
        plugin: Arc<dyn SkillPlugin>,
        persisted: &OptionMap,
    ) -> Result<LoadReport, PluginError> {
        let id = plugin.id().to_string();
        if id.trim().is_empty() {
            return Err(PluginError::InvalidManifest("plugin id is required".into()));
        }
        if self.plugins.contains_key(&id) {
            return Err(PluginError::InvalidManifest(format!(
                "plugin '{id}' is already loaded"
            )));
        }

        let declared = plugin.declare();
        declared.validate()?;
        let options = merge(&declared.default_options, persisted);

        let mut degraded = false;
        let activated = match plugin
            .activate(self.speech.as_ref(), &options, declared.clone())
            .await
        {
            Ok(manifest) => manifest,
            Err(e) if e.is_fatal_for_plugin() => return Err(e),
            Err(e) => {
                warn!(plugin = %id, kind = e.kind(), error = %e, "activation incomplete");
                degraded = true;
                declared.clone()
            }
        };
        activated.validate()?;
        // Enforced here too, in case the plugin skipped the gate.
        let activated = activated.gated(&options);

        let backends = self.collect_backends(&id, plugin.as_ref(), &activated)?;
        let backend_names: Vec<String> = backends.iter().map(|b| b.name().to_string()).collect();
        for backend in backends {
            self.backends.register(&id, backend, &options)?;
        }

        let mut commands = 0;
        let mut conflicts = Vec::new();
        for (pattern, spec) in &activated.commands {
            let registration = self
                .router
                .register(pattern, CommandTarget::new(id.clone(), spec.id.clone()));
            commands += registration.registered;
            conflicts.extend(registration.conflicts);
        }

        let state = if !options.is_active() {
            PluginState::Suppressed
        } else if degraded || !plugin.is_ready() {
            PluginState::ActiveWithWarning
        } else {
            PluginState::Active
        };
        info!(
            plugin = %id,
            version = %activated.version,
            state = %state,
            commands,
            conflicts = conflicts.len(),
            "plugin loaded"
        );

        self.plugins.insert(
            id.clone(),
            LoadedPlugin {
                plugin,
                manifest: activated,
                options,
                state,
            },
        );
        Ok(LoadReport {
            plugin: id,
            state,
            commands,
            backends: backend_names,
            conflicts,
        })
    }

    /// Resolve every declared backend before registering any of them.
    fn collect_backends(
        &self,
        id: &str,
        plugin: &dyn SkillPlugin,
        manifest: &Manifest,
    ) -> Result<Vec<Arc<dyn TtsBackend>>, PluginError> {
        let mut backends = Vec::with_capacity(manifest.tts_backends.len());
        for (name, declared) in &manifest.tts_backends {
            let backend = plugin.tts_backend(name).ok_or_else(|| {
                PluginError::InvalidManifest(format!(
                    "plugin '{id}' declares tts backend '{name}' without an implementation"
                ))
            })?;
            if backend.name() != name {
                return Err(PluginError::InvalidBackend(format!(
                    "plugin '{id}' returned backend '{}' for '{name}'",
                    backend.name()
                )));
            }
            if backend.capabilities() != *declared {
                return Err(PluginError::InvalidBackend(format!(
                    "backend '{name}' does not match its declared capabilities"
                )));
            }
            if let Some(owner) = self.backends.owner(name) {
                return Err(PluginError::InvalidBackend(format!(
                    "backend '{name}' is already provided by '{owner}'"
                )));
            }
            backends.push(backend);
        }
        Ok(backends)
    }

    /// Match `utterance` and run the owning plugin's handler.
    ///
    /// One dispatch at a time: a second call waits until the first
    /// handler has returned.
    pub async fn dispatch(
        &self,
        utterance: &str,
        addressed_name: &str,
    ) -> Result<DispatchOutcome, PluginError> {
        let _gate = self.dispatch_gate.lock().await;

        let (target, invocation) = self
            .router
            .resolve(utterance)
            .ok_or_else(|| PluginError::NoMatch(utterance.trim().to_string()))?;
        let loaded = self.plugins.get(&target.owner).ok_or_else(|| {
            PluginError::ExecutionFailed(format!("plugin '{}' is not loaded", target.owner))
        })?;

        debug!(
            plugin = %target.owner,
            command = %target.command,
            alias = %invocation.alias,
            residual = %invocation.residual,
            "dispatching"
        );
        let ctx = CommandContext {
            speech: self.speech.as_ref(),
            options: &loaded.options,
            addressed_name,
        };
        if let Err(e) = loaded.plugin.invoke(&target.command, &ctx, &invocation).await {
            warn!(
                plugin = %target.owner,
                command = %target.command,
                kind = e.kind(),
                error = %e,
                "command failed"
            );
            return Err(e);
        }

        Ok(DispatchOutcome {
            plugin: target.owner.clone(),
            command: target.command.clone(),
            alias: invocation.alias,
            residual: invocation.residual,
        })
    }

    pub fn router(&self) -> &CommandRouter {
        &self.router
    }

    pub fn backends(&self) -> &BackendRegistry {
        &self.backends
    }

    /// Mutable access for wiring the audio player and numeral expander.
    pub fn backends_mut(&mut self) -> &mut BackendRegistry {
        &mut self.backends
    }

    pub async fn activate_backend(&self, name: &str) -> Result<Arc<ActiveBackend>, PluginError> {
        self.backends.activate(name).await
    }

    pub fn speech(&self) -> Arc<dyn SpeechSink> {
        self.speech.clone()
    }

    pub fn options(&self, id: &str) -> Option<&EffectiveOptions> {
        self.plugins.get(id).map(|loaded| &loaded.options)
    }

    pub fn manifest(&self, id: &str) -> Option<&Manifest> {
        self.plugins.get(id).map(|loaded| &loaded.manifest)
    }

    pub fn state(&self, id: &str) -> Option<PluginState> {
        self.plugins.get(id).map(|loaded| loaded.state)
    }

    /// Loaded plugins ordered by id.
    pub fn loaded(&self) -> Vec<PluginSummary> {
        self.plugins
            .iter()
            .map(|(id, loaded)| PluginSummary {
                id: id.clone(),
                name: loaded.manifest.name.clone(),
                version: loaded.manifest.version.clone(),
                description: loaded.manifest.description.clone(),
                requires_online: loaded.manifest.requires_online,
                state: loaded.state,
                commands: loaded.manifest.commands.keys().cloned().collect(),
                backends: loaded.manifest.tts_backends.keys().cloned().collect(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use serde_json::json;

    use crate::manifest::BackendCapabilities;
    use crate::traits::Invocation;
    use crate::voice::SpeechRequest;

    #[derive(Default)]
    struct Lines(StdMutex<Vec<String>>);

    impl SpeechSink for Lines {
        fn emit_speech(&self, text: &str) {
            self.0.lock().unwrap().push(text.to_string());
        }
    }

    impl Lines {
        fn take(&self) -> Vec<String> {
            std::mem::take(&mut *self.0.lock().unwrap())
        }
    }

    struct Echo {
        id: &'static str,
        pattern: &'static str,
    }

    #[async_trait]
    impl SkillPlugin for Echo {
        fn id(&self) -> &str {
            self.id
        }

        fn declare(&self) -> Manifest {
            Manifest::new("Echo", "1.0")
                .with_option("is_active", true)
                .with_option("prefix", "эхо")
                .with_command(self.pattern, "echo", "Repeat the argument")
        }

        async fn invoke(
            &self,
            command: &str,
            ctx: &CommandContext<'_>,
            invocation: &Invocation,
        ) -> Result<(), PluginError> {
            assert_eq!(command, "echo");
            let prefix = ctx.options.str("prefix").unwrap_or_default();
            ctx.say(format!("{prefix}: {}", invocation.residual));
            Ok(())
        }
    }

    struct Unconfigured;

    #[async_trait]
    impl SkillPlugin for Unconfigured {
        fn id(&self) -> &str {
            "unconfigured"
        }

        fn declare(&self) -> Manifest {
            Manifest::new("Unconfigured", "1.0")
                .with_option("token", "")
                .with_command("статус", "status", "")
        }

        async fn activate(
            &self,
            speech: &dyn SpeechSink,
            options: &EffectiveOptions,
            manifest: Manifest,
        ) -> Result<Manifest, PluginError> {
            speech.emit_speech("Не настроен");
            let _ = manifest;
            Err(PluginError::ConfigurationMissing(format!(
                "token ({} options)",
                options.len()
            )))
        }

        async fn invoke(
            &self,
            _command: &str,
            _ctx: &CommandContext<'_>,
            _invocation: &Invocation,
        ) -> Result<(), PluginError> {
            Err(PluginError::ConfigurationMissing("token".into()))
        }
    }

    struct Mute;

    #[async_trait]
    impl TtsBackend for Mute {
        fn name(&self) -> &str {
            "mute"
        }

        fn capabilities(&self) -> BackendCapabilities {
            BackendCapabilities::SPEAK_ONLY
        }

        async fn speak(&self, _request: &SpeechRequest<'_>) -> Result<(), PluginError> {
            Ok(())
        }
    }

    struct Voices {
        provide: bool,
    }

    #[async_trait]
    impl SkillPlugin for Voices {
        fn id(&self) -> &str {
            "voices"
        }

        fn declare(&self) -> Manifest {
            Manifest::new("Voices", "1.0").with_backend("mute", BackendCapabilities::SPEAK_ONLY)
        }

        fn tts_backend(&self, name: &str) -> Option<Arc<dyn TtsBackend>> {
            (self.provide && name == "mute").then(|| Arc::new(Mute) as Arc<dyn TtsBackend>)
        }
    }

    fn host() -> (PluginHost, Arc<Lines>) {
        let lines = Arc::new(Lines::default());
        (PluginHost::new(lines.clone()), lines)
    }

    #[tokio::test]
    async fn load_and_dispatch_with_residual() {
        let (mut host, lines) = host();
        let report = host
            .load(Arc::new(Echo { id: "echo", pattern: "повтори|скажи" }), &OptionMap::new())
            .await
            .unwrap();
        assert_eq!(report.state, PluginState::Active);
        assert_eq!(report.commands, 2);

        let outcome = host.dispatch("Скажи привет мир", "").await.unwrap();
        assert_eq!(outcome.plugin, "echo");
        assert_eq!(outcome.alias, "скажи");
        assert_eq!(outcome.residual, "привет мир");
        assert_eq!(lines.take(), vec!["эхо: привет мир"]);
    }

    #[tokio::test]
    async fn handlers_see_merged_options() {
        let (mut host, lines) = host();
        let persisted = json!({"prefix": "ответ", "stale": 1});
        host.load(
            Arc::new(Echo { id: "echo", pattern: "повтори" }),
            persisted.as_object().unwrap(),
        )
        .await
        .unwrap();
        host.dispatch("повтори да", "").await.unwrap();
        assert_eq!(lines.take(), vec!["ответ: да"]);
        assert!(host.options("echo").unwrap().get("stale").is_none());
    }

    #[tokio::test]
    async fn suppressed_plugin_registers_nothing() {
        let (mut host, _lines) = host();
        let persisted = json!({"is_active": false});
        let report = host
            .load(Arc::new(Echo { id: "echo", pattern: "повтори" }), persisted.as_object().unwrap())
            .await
            .unwrap();
        assert_eq!(report.state, PluginState::Suppressed);
        assert_eq!(report.commands, 0);
        assert!(host.router().is_empty());
        assert!(matches!(
            host.dispatch("повтори", "").await,
            Err(PluginError::NoMatch(_))
        ));
    }

    #[tokio::test]
    async fn unconfigured_plugin_stays_loaded_and_fails_fast() {
        let (mut host, lines) = host();
        let report = host.load(Arc::new(Unconfigured), &OptionMap::new()).await.unwrap();
        assert_eq!(report.state, PluginState::ActiveWithWarning);
        assert_eq!(lines.take(), vec!["Не настроен"]);

        let err = host.dispatch("статус", "").await.unwrap_err();
        assert!(matches!(err, PluginError::ConfigurationMissing(_)));
    }

    #[tokio::test]
    async fn conflicts_are_reported_and_first_wins() {
        let (mut host, _lines) = host();
        host.load(Arc::new(Echo { id: "first", pattern: "повтори" }), &OptionMap::new())
            .await
            .unwrap();
        let report = host
            .load(Arc::new(Echo { id: "second", pattern: "повтори|эхо" }), &OptionMap::new())
            .await
            .unwrap();
        assert_eq!(report.commands, 1);
        assert_eq!(report.conflicts.len(), 1);
        assert_eq!(report.conflicts[0].kind(), "registration_conflict");
        assert_eq!(host.dispatch("повтори", "").await.unwrap().plugin, "first");
        assert_eq!(host.dispatch("эхо", "").await.unwrap().plugin, "second");
    }

    #[tokio::test]
    async fn overwrite_policy_lets_last_plugin_win() {
        let lines = Arc::new(Lines::default());
        let mut host = PluginHost::new(lines).with_conflict_policy(ConflictPolicy::Overwrite);
        host.load(Arc::new(Echo { id: "first", pattern: "повтори" }), &OptionMap::new())
            .await
            .unwrap();
        let report = host
            .load(Arc::new(Echo { id: "second", pattern: "повтори" }), &OptionMap::new())
            .await
            .unwrap();
        assert_eq!(report.conflicts.len(), 1);
        assert_eq!(host.dispatch("повтори", "").await.unwrap().plugin, "second");
    }

    #[tokio::test]
    async fn duplicate_plugin_id_is_rejected() {
        let (mut host, _lines) = host();
        host.load(Arc::new(Echo { id: "echo", pattern: "повтори" }), &OptionMap::new())
            .await
            .unwrap();
        let err = host
            .load(Arc::new(Echo { id: "echo", pattern: "скажи" }), &OptionMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PluginError::InvalidManifest(_)));
    }

    #[tokio::test]
    async fn declared_backend_without_impl_is_fatal_for_that_plugin() {
        let (mut host, _lines) = host();
        let err = host
            .load(Arc::new(Voices { provide: false }), &OptionMap::new())
            .await
            .unwrap_err();
        assert!(err.is_fatal_for_plugin());
        assert!(host.loaded().is_empty());
        assert!(host.backends().names().is_empty());

        host.load(Arc::new(Echo { id: "echo", pattern: "повтори" }), &OptionMap::new())
            .await
            .unwrap();
        assert_eq!(host.loaded().len(), 1);
    }

    #[tokio::test]
    async fn backends_are_registered_and_activatable() {
        let (mut host, _lines) = host();
        let report = host
            .load(Arc::new(Voices { provide: true }), &OptionMap::new())
            .await
            .unwrap();
        assert_eq!(report.backends, vec!["mute"]);
        assert_eq!(host.backends().owner("mute"), Some("voices"));
        let active = host.activate_backend("mute").await.unwrap();
        assert_eq!(active.name(), "mute");
        host.backends().speak_text("тишина", "").await.unwrap();
    }

    #[tokio::test]
    async fn summaries_list_state_and_commands() {
        let (mut host, _lines) = host();
        host.load(Arc::new(Echo { id: "echo", pattern: "повтори" }), &OptionMap::new())
            .await
            .unwrap();
        host.load(Arc::new(Unconfigured), &OptionMap::new()).await.unwrap();
        let summaries = host.loaded();
        let ids: Vec<&str> = summaries.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["echo", "unconfigured"]);
        assert_eq!(summaries[0].commands, vec!["повтори"]);
        assert_eq!(summaries[1].state, PluginState::ActiveWithWarning);
        let json = serde_json::to_value(&summaries[1]).unwrap();
        assert_eq!(json["state"], "active_with_warning");
    }
}
