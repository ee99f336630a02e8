//! Extension lifecycle: registration, load, reload, event broadcast.

use std::{collections::HashMap, sync::Arc};

use {
    chrono::{DateTime, Utc},
    chrono_tz::Tz,
    tokio::sync::{Mutex, RwLock},
    tracing::{error, info, warn},
};

use crate::{
    error::{Error, Result},
    plugin::{CommandSpec, Extension, ExtensionContext, InboundMessage},
    settings::{self, ExtensionOverrides},
};

/// Load state of one extension slot.
#[derive(Debug, Clone)]
pub enum LoadState {
    Unloaded,
    Loaded { since: DateTime<Tz> },
}

struct Slot {
    extension: Arc<dyn Extension>,
    state: RwLock<LoadState>,
    /// Serializes load/reload per extension id. Never held while handling
    /// events, so a reload can proceed under traffic and a command handler
    /// can trigger one without deadlocking on itself.
    reload_gate: Mutex<()>,
}

/// Owns every registered extension and its load/reload lifecycle.
///
/// Registration happens once at startup; after that the host is shared
/// immutably. Different extensions may reload concurrently, reloads of the
/// same extension are mutually exclusive.
pub struct ExtensionHost {
    slots: HashMap<String, Slot>,
    overrides: ExtensionOverrides,
    timezone: Tz,
    version: String,
}

impl ExtensionHost {
    #[must_use]
    pub fn new(overrides: ExtensionOverrides, timezone: Tz, version: impl Into<String>) -> Self {
        Self {
            slots: HashMap::new(),
            overrides,
            timezone,
            version: version.into(),
        }
    }

    pub fn register(&mut self, extension: Arc<dyn Extension>) {
        let id = extension.id().to_string();
        if self
            .slots
            .insert(
                id.clone(),
                Slot {
                    extension,
                    state: RwLock::new(LoadState::Unloaded),
                    reload_gate: Mutex::new(()),
                },
            )
            .is_some()
        {
            warn!(extension_id = %id, "extension registered twice, replacing");
        }
    }

    #[must_use]
    pub fn extension_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.slots.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    #[must_use]
    pub fn extension(&self, id: &str) -> Option<Arc<dyn Extension>> {
        self.slots.get(id).map(|s| Arc::clone(&s.extension))
    }

    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    #[must_use]
    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    fn slot(&self, id: &str) -> Result<&Slot> {
        self.slots.get(id).ok_or_else(|| Error::unknown_extension(id))
    }

    pub async fn is_loaded(&self, id: &str) -> bool {
        match self.slots.get(id) {
            Some(slot) => matches!(*slot.state.read().await, LoadState::Loaded { .. }),
            None => false,
        }
    }

    /// Load timestamp of a loaded extension, in the process timezone.
    pub async fn loaded_since(&self, id: &str) -> Option<DateTime<Tz>> {
        let slot = self.slots.get(id)?;
        match *slot.state.read().await {
            LoadState::Loaded { since } => Some(since),
            LoadState::Unloaded => None,
        }
    }

    /// Load one extension: merge its settings, run its registration hook,
    /// record the load timestamp. On failure the slot stays `Unloaded` and
    /// the error is returned to the caller.
    pub async fn load(&self, id: &str) -> Result<()> {
        let slot = self.slot(id)?;
        let _gate = slot.reload_gate.lock().await;
        self.load_slot(slot).await
    }

    /// Tear down and re-run the load sequence. Idempotent; a failure at any
    /// step leaves the slot `Unloaded`, never half-initialized.
    pub async fn reload(&self, id: &str) -> Result<()> {
        let slot = self.slot(id)?;
        let _gate = slot.reload_gate.lock().await;
        *slot.state.write().await = LoadState::Unloaded;
        slot.extension.on_unload().await?;
        self.load_slot(slot).await
    }

    /// Unload one extension; unloading an already-unloaded extension is a
    /// no-op.
    pub async fn unload(&self, id: &str) -> Result<()> {
        let slot = self.slot(id)?;
        let _gate = slot.reload_gate.lock().await;
        let was_loaded = {
            let mut state = slot.state.write().await;
            let was = matches!(*state, LoadState::Loaded { .. });
            *state = LoadState::Unloaded;
            was
        };
        if was_loaded {
            slot.extension.on_unload().await?;
            info!(extension_id = id, "extension unloaded");
        }
        Ok(())
    }

    /// Load every registered extension. A failure (typically a settings
    /// type mismatch) is reported and skips only that extension.
    pub async fn load_all(&self) {
        for id in self.extension_ids() {
            if let Err(e) = self.load(id).await {
                error!(extension_id = id, error = %e, "failed to load extension");
            }
        }
    }

    /// Unload every loaded extension, logging failures.
    pub async fn unload_all(&self) {
        for id in self.extension_ids() {
            if let Err(e) = self.unload(id).await {
                warn!(extension_id = id, error = %e, "failed to unload extension");
            }
        }
    }

    /// Deliver an inbound message to every loaded extension. A failing
    /// handler is logged and isolated; it never aborts delivery to the rest
    /// or the event task itself.
    pub async fn broadcast_message(&self, message: &InboundMessage) {
        for (id, slot) in &self.slots {
            if !matches!(*slot.state.read().await, LoadState::Loaded { .. }) {
                continue;
            }
            if let Err(e) = slot.extension.on_message(message).await {
                error!(extension_id = %id, error = %e, "message handler failed");
            }
        }
    }

    /// Command specs of currently loaded extensions, for router re-sync.
    pub async fn command_specs(&self) -> Vec<(String, CommandSpec)> {
        let mut specs = Vec::new();
        for (id, slot) in &self.slots {
            if matches!(*slot.state.read().await, LoadState::Loaded { .. }) {
                for spec in slot.extension.commands() {
                    specs.push((id.clone(), spec));
                }
            }
        }
        specs
    }

    async fn load_slot(&self, slot: &Slot) -> Result<()> {
        let ext = &slot.extension;
        let resolved = settings::resolve(ext.id(), &ext.default_settings(), &self.overrides)?;
        let loaded_at = Utc::now().with_timezone(&self.timezone);
        let ctx = ExtensionContext {
            settings: resolved,
            loaded_at,
            timezone: self.timezone,
            version: self.version.clone(),
        };
        ext.on_load(ctx).await?;
        *slot.state.write().await = LoadState::Loaded { since: loaded_at };
        info!(extension_id = ext.id(), "extension loaded");
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use {async_trait::async_trait, serde_json::json};

    use {super::*, crate::settings::SettingsMap};

    #[derive(Default)]
    struct ProbeExtension {
        fail_next_load: AtomicBool,
        fail_messages: bool,
        loads: AtomicUsize,
        unloads: AtomicUsize,
        messages: AtomicUsize,
    }

    #[async_trait]
    impl Extension for ProbeExtension {
        fn id(&self) -> &str {
            "probe"
        }

        fn name(&self) -> &str {
            "Probe"
        }

        fn default_settings(&self) -> SettingsMap {
            [("pong_message".to_string(), json!("pong"))]
                .into_iter()
                .collect()
        }

        async fn on_load(&self, ctx: ExtensionContext) -> Result<()> {
            if self.fail_next_load.load(Ordering::SeqCst) {
                return Err(Error::usage("load failure injected"));
            }
            assert_eq!(ctx.settings.str("pong_message")?, "pong");
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn on_unload(&self) -> Result<()> {
            self.unloads.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn on_message(&self, _message: &InboundMessage) -> Result<()> {
            self.messages.fetch_add(1, Ordering::SeqCst);
            if self.fail_messages {
                return Err(Error::usage("handler failure injected"));
            }
            Ok(())
        }
    }

    struct SecondExtension {
        messages: AtomicUsize,
    }

    #[async_trait]
    impl Extension for SecondExtension {
        fn id(&self) -> &str {
            "second"
        }

        fn name(&self) -> &str {
            "Second"
        }

        async fn on_load(&self, _ctx: ExtensionContext) -> Result<()> {
            Ok(())
        }

        async fn on_message(&self, _message: &InboundMessage) -> Result<()> {
            self.messages.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn host_with(extension: Arc<dyn Extension>) -> ExtensionHost {
        let mut host = ExtensionHost::new(
            ExtensionOverrides::new(),
            chrono_tz::America::New_York,
            "test",
        );
        host.register(extension);
        host
    }

    fn message() -> InboundMessage {
        InboundMessage {
            guild_id: Some(1),
            channel_id: 2,
            author_id: 3,
            author_name: "alice".into(),
            author_is_bot: false,
            content: "hello".into(),
        }
    }

    #[tokio::test]
    async fn load_records_timestamp_and_state() {
        let ext = Arc::new(ProbeExtension::default());
        let host = host_with(ext.clone());

        assert!(!host.is_loaded("probe").await);
        host.load("probe").await.unwrap();
        assert!(host.is_loaded("probe").await);
        assert!(host.loaded_since("probe").await.is_some());
        assert_eq!(ext.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn load_unknown_extension_errors() {
        let host = host_with(Arc::new(ProbeExtension::default()));
        assert!(matches!(
            host.load("nope").await,
            Err(Error::UnknownExtension { .. })
        ));
    }

    #[tokio::test]
    async fn failed_reload_ends_unloaded() {
        let ext = Arc::new(ProbeExtension::default());
        let host = host_with(ext.clone());
        host.load("probe").await.unwrap();

        ext.fail_next_load.store(true, Ordering::SeqCst);
        assert!(host.reload("probe").await.is_err());
        assert!(!host.is_loaded("probe").await);
        assert_eq!(ext.unloads.load(Ordering::SeqCst), 1);

        // Recovery: the next reload succeeds and the slot is Loaded again.
        ext.fail_next_load.store(false, Ordering::SeqCst);
        host.reload("probe").await.unwrap();
        assert!(host.is_loaded("probe").await);
    }

    #[tokio::test]
    async fn settings_type_mismatch_fails_the_load() {
        let mut overrides = ExtensionOverrides::new();
        overrides.insert(
            "probe".into(),
            [("pong_message".to_string(), json!(7))].into_iter().collect(),
        );
        let mut host =
            ExtensionHost::new(overrides, chrono_tz::America::New_York, "test");
        host.register(Arc::new(ProbeExtension::default()));

        assert!(matches!(
            host.load("probe").await,
            Err(Error::ConfigurationType { .. })
        ));
        assert!(!host.is_loaded("probe").await);
    }

    #[tokio::test]
    async fn unloaded_extensions_receive_no_messages() {
        let ext = Arc::new(ProbeExtension::default());
        let host = host_with(ext.clone());

        host.broadcast_message(&message()).await;
        assert_eq!(ext.messages.load(Ordering::SeqCst), 0);

        host.load("probe").await.unwrap();
        host.broadcast_message(&message()).await;
        assert_eq!(ext.messages.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failing_handler_is_isolated_from_other_extensions() {
        let flaky = Arc::new(ProbeExtension {
            fail_messages: true,
            ..Default::default()
        });
        let second = Arc::new(SecondExtension {
            messages: AtomicUsize::new(0),
        });

        let mut host = ExtensionHost::new(
            ExtensionOverrides::new(),
            chrono_tz::America::New_York,
            "test",
        );
        host.register(flaky.clone());
        host.register(second.clone());
        host.load_all().await;

        host.broadcast_message(&message()).await;
        assert_eq!(flaky.messages.load(Ordering::SeqCst), 1);
        assert_eq!(second.messages.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unload_is_idempotent() {
        let ext = Arc::new(ProbeExtension::default());
        let host = host_with(ext.clone());
        host.load("probe").await.unwrap();

        host.unload("probe").await.unwrap();
        host.unload("probe").await.unwrap();
        assert_eq!(ext.unloads.load(Ordering::SeqCst), 1);
        assert!(!host.is_loaded("probe").await);
    }
}
