//! Schema registrar.

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::schema::build::{implicit_through, resolve_fields, Schema};
use crate::schema::descriptor::{Descriptor, FieldMap};
use crate::schema::model::ModelDef;
use crate::schema::registry::DescriptorRegistry;
use crate::store::Store;
use crate::table::Snapshot;
use crate::transaction::{MutationMode, Session};
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

/// Registers models and opens sessions over the resulting store.
///
/// The store is built lazily on first use and rebuilt after any
/// registration change.
///
/// # Example
///
/// ```rust,ignore
/// let mut orm = Orm::new();
/// orm.register([
///     ModelDef::new("Author").attribute("name"),
///     ModelDef::new("Book").attribute("title").foreign_key("author", "Author"),
/// ])?;
///
/// let session = orm.session(None)?;
/// ```
pub struct Orm {
    config: Arc<Config>,
    models: Vec<ModelDef>,
    synthesized: Vec<ModelDef>,
    registry: DescriptorRegistry,
    store: RwLock<Option<Arc<Store>>>,
}

impl Orm {
    /// Creates a registrar with the default configuration.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Creates a registrar with a custom configuration.
    pub fn with_config(config: Config) -> Self {
        let registry = DescriptorRegistry::new(config.id_attribute.clone());
        Self {
            config: Arc::new(config),
            models: Vec::new(),
            synthesized: Vec::new(),
            registry,
            store: RwLock::new(None),
        }
    }

    /// Configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Registers models and synthesizes their missing join models.
    ///
    /// Use [`Orm::replace`] to redeclare a registered model.
    ///
    /// # Errors
    ///
    /// Returns a `Schema` error for an empty or duplicate model name, or a
    /// synthesized join model name that is already taken. No model of the
    /// call is registered in that case.
    pub fn register(&mut self, models: impl IntoIterator<Item = ModelDef>) -> CoreResult<()> {
        let incoming: Vec<ModelDef> = models.into_iter().collect();
        let mut names: BTreeSet<&str> = self.models.iter().map(ModelDef::name).collect();
        for def in &incoming {
            if def.name().is_empty() {
                return Err(CoreError::schema("model name must not be empty"));
            }
            if !names.insert(def.name()) {
                return Err(CoreError::schema(format!(
                    "model {} is already registered",
                    def.name()
                )));
            }
        }
        debug!(models = incoming.len(), "registering models");
        let before = self.models.len();
        self.models.extend(incoming);
        if let Err(e) = self.invalidate() {
            self.models.truncate(before);
            self.invalidate()?;
            return Err(e);
        }
        Ok(())
    }

    /// Replaces a registered model's declaration, or registers it if new.
    pub fn replace(&mut self, model: ModelDef) -> CoreResult<()> {
        match self.models.iter_mut().find(|m| m.name() == model.name()) {
            Some(slot) => {
                *slot = model;
                self.invalidate()
            }
            None => self.register([model]),
        }
    }

    /// Adds descriptors for `model` to the registry.
    pub fn add_descriptors<K, D>(
        &mut self,
        model: &str,
        descriptors: impl IntoIterator<Item = (K, D)>,
    ) -> CoreResult<()>
    where
        K: Into<String>,
        D: Into<Descriptor>,
    {
        self.registry.add(model, descriptors);
        self.invalidate()
    }

    /// The descriptor registry.
    pub fn registry(&self) -> &DescriptorRegistry {
        &self.registry
    }

    /// Declared and synthesized models, declared first.
    pub fn models(&self) -> impl Iterator<Item = &ModelDef> + '_ {
        self.models.iter().chain(self.synthesized.iter())
    }

    /// Returns a declared or synthesized model.
    pub fn get(&self, name: &str) -> CoreResult<&ModelDef> {
        self.models()
            .find(|m| m.name() == name)
            .ok_or_else(|| CoreError::model_not_found(name))
    }

    /// Builds the schema of every registered model.
    pub fn build_schema(&self) -> CoreResult<Schema> {
        let all: Vec<ModelDef> = self.models().cloned().collect();
        Schema::build(&all, &self.registry, &self.config)
    }

    /// Returns the store, building it on first use.
    pub fn store(&self) -> CoreResult<Arc<Store>> {
        if let Some(store) = self.store.read().as_ref() {
            return Ok(store.clone());
        }
        let mut slot = self.store.write();
        if let Some(store) = slot.as_ref() {
            return Ok(store.clone());
        }
        let store = Arc::new(Store::new(
            Arc::new(self.build_schema()?),
            self.config.clone(),
        ));
        *slot = Some(store.clone());
        Ok(store)
    }

    /// Opens a copy-on-write session on `snapshot`, or on an empty state.
    pub fn session(&self, snapshot: Option<Snapshot>) -> CoreResult<Session> {
        self.open(snapshot, MutationMode::CopyOnWrite)
    }

    /// Opens an in-place session for exclusive bulk loading.
    ///
    /// Writes mutate structure the session holds uniquely, and a failing
    /// batch keeps the writes applied before the failure. Snapshots taken
    /// from the session earlier are not affected.
    pub fn bulk_session(&self, snapshot: Option<Snapshot>) -> CoreResult<Session> {
        self.open(snapshot, MutationMode::InPlace)
    }

    fn open(&self, snapshot: Option<Snapshot>, mode: MutationMode) -> CoreResult<Session> {
        let store = self.store()?;
        let snapshot = snapshot.unwrap_or_else(|| store.empty_snapshot());
        Ok(Session::new(store, snapshot, mode))
    }

    /// A snapshot with one empty table per model.
    pub fn empty_snapshot(&self) -> CoreResult<Snapshot> {
        Ok(self.store()?.empty_snapshot())
    }

    fn invalidate(&mut self) -> CoreResult<()> {
        *self.store.get_mut() = None;
        self.synthesize_join_models()
    }

    fn synthesize_join_models(&mut self) -> CoreResult<()> {
        let declared: BTreeSet<&str> = self.models.iter().map(ModelDef::name).collect();
        let mut synthesized: Vec<ModelDef> = Vec::new();

        for def in &self.models {
            let fields: FieldMap = match resolve_fields(def, &self.registry) {
                Ok(fields) => fields,
                // Reported when the schema is built.
                Err(_) => continue,
            };
            for (field, descriptor) in &fields {
                let Descriptor::ManyToMany(m2m) = descriptor else {
                    continue;
                };
                if m2m.through.is_some() {
                    continue;
                }
                let join = implicit_through(def.name(), field, m2m, &self.config.id_attribute);
                if declared.contains(join.name()) || synthesized.iter().any(|m| m.name() == join.name()) {
                    return Err(CoreError::schema(format!(
                        "join model name {} for {}.{field} is already taken",
                        join.name(),
                        def.name()
                    )));
                }
                synthesized.push(join);
            }
        }

        debug!(count = synthesized.len(), "synthesized join models");
        self.synthesized = synthesized;
        Ok(())
    }
}

impl Default for Orm {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Orm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orm")
            .field("config", &self.config)
            .field("models", &self.models.iter().map(ModelDef::name).collect::<Vec<_>>())
            .field(
                "synthesized",
                &self.synthesized.iter().map(ModelDef::name).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}
