//! Template Store - one directory per template
//!
//! ```text
//! <root>/
//!   sr-linux/
//!     template.yml          descriptor, id omitted (it is the directory name)
//!     configs/srl.cfg       startupConfigRelPath target, created once
//!   two-leaf-lab/
//!     template.yml
//!     leaf1.cfg             `configs` entries, rewritten on every save
//! ```
//!
//! Every mutating operation runs behind one gate per store, so two creates
//! can never race for the same slug and a delete cannot interleave a reload.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::catalog::Catalog;
use crate::defaults::default_catalog;
use crate::hashing::fingerprint;
use crate::naming::unique_slug;
use crate::templates::{
    decode_descriptor, encode_descriptor, Template, TemplateDescriptor, TemplateId, TemplateKind,
    DESCRIPTOR_FILE, DESCRIPTOR_FILE_ALT,
};
use crate::validation::{safe_join, Validator};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Template not found: {0}")]
    NotFound(TemplateId),

    #[error("Template '{name}' is invalid: {reason}")]
    Validation { name: String, reason: String },

    #[error("Storage error for template '{id}' at {}: {source}", .path.display())]
    Storage {
        id: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Cannot open template store at {}: {source}", .path.display())]
    Root {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to encode template '{id}': {source}")]
    Encode {
        id: String,
        #[source]
        source: serde_yaml::Error,
    },
}

fn storage_err(id: &str, path: &Path) -> impl FnOnce(io::Error) -> StoreError {
    let id = id.to_string();
    let path = path.to_path_buf();
    move |source| StoreError::Storage { id, path, source }
}

/// One storage unit that could not be loaded. Logged and reported, never raised.
#[derive(Debug, Clone, Error)]
#[error("Skipped template '{id}' at {}: {reason}", .path.display())]
pub struct PartialLoadError {
    pub id: String,
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    pub loaded: Vec<TemplateId>,
    pub failures: Vec<PartialLoadError>,
}

/// Fields to merge over an existing descriptor. `null` clears a field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TemplatePatch(Map<String, Value>);

impl TemplatePatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    pub fn clear(mut self, field: impl Into<String>) -> Self {
        self.0.insert(field.into(), Value::Null);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn apply(&self, id: &str, descriptor: &TemplateDescriptor) -> Result<TemplateDescriptor, StoreError> {
        let invalid = |reason: String| StoreError::Validation {
            name: descriptor.name().to_string(),
            reason,
        };

        if self.0.contains_key("id") {
            return Err(invalid(format!("the id of '{}' cannot be changed", id)));
        }

        let mut merged = descriptor.to_map().map_err(|e| invalid(e.to_string()))?;
        for (field, value) in &self.0 {
            if value.is_null() {
                merged.remove(field);
            } else {
                merged.insert(field.clone(), value.clone());
            }
        }

        let updated =
            TemplateDescriptor::try_from(Value::Object(merged)).map_err(|e| invalid(e.to_string()))?;
        if updated.kind() != descriptor.kind() {
            return Err(invalid(format!(
                "an update cannot turn a {} template into a {} template",
                descriptor.kind(),
                updated.kind()
            )));
        }
        Ok(updated)
    }
}

impl From<Map<String, Value>> for TemplatePatch {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

pub struct TemplateStore {
    root: PathBuf,
    templates: RwLock<HashMap<TemplateId, Template>>,
    gate: Mutex<()>,
    validator: Validator,
}

impl fmt::Debug for TemplateStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateStore")
            .field("root", &self.root)
            .field("templates", &self.read_map().len())
            .finish()
    }
}

impl TemplateStore {
    /// A store over `root`. Nothing touches disk until `initialize`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            templates: RwLock::new(HashMap::new()),
            gate: Mutex::new(()),
            validator: Validator::new(),
        }
    }

    /// Construct and initialize in one step.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let store = Self::new(root);
        store.initialize()?;
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the root if absent, then load everything under it.
    pub fn initialize(&self) -> Result<LoadReport, StoreError> {
        fs::create_dir_all(&self.root).map_err(|source| StoreError::Root {
            path: self.root.clone(),
            source,
        })?;
        info!("Opened template store at {}", self.root.display());
        Ok(self.load_all())
    }

    /// Replace the in-memory catalog with what is on disk. A unit that fails
    /// to load is logged and reported; the rest still load.
    pub fn load_all(&self) -> LoadReport {
        let _gate = self.lock_gate();
        let mut report = LoadReport::default();
        let mut loaded = HashMap::new();

        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Cannot read template store at {}: {}", self.root.display(), e);
                *self.write_map() = loaded;
                return report;
            }
        };

        let mut dirs: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .collect();
        dirs.sort();

        for dir in dirs {
            let Some(id) = dir.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
                let failure = PartialLoadError {
                    id: dir.display().to_string(),
                    path: dir.clone(),
                    reason: "directory name is not valid UTF-8".to_string(),
                };
                warn!("{}", failure);
                report.failures.push(failure);
                continue;
            };
            if id.starts_with('.') {
                continue;
            }

            match self.load_unit(&dir) {
                Ok(descriptor) => {
                    debug!("Loaded {} template '{}'", descriptor.kind(), id);
                    report.loaded.push(id.clone());
                    loaded.insert(id.clone(), Template::new(id, descriptor));
                }
                Err(reason) => {
                    let failure = PartialLoadError { id, path: dir, reason };
                    warn!("{}", failure);
                    report.failures.push(failure);
                }
            }
        }

        *self.write_map() = loaded;
        report
    }

    fn load_unit(&self, dir: &Path) -> Result<TemplateDescriptor, String> {
        let path = descriptor_path(dir)
            .ok_or_else(|| format!("no {} in template directory", DESCRIPTOR_FILE))?;
        let text = fs::read_to_string(&path).map_err(|e| e.to_string())?;
        let descriptor = decode_descriptor(&text).map_err(|e| e.to_string())?;

        let validation = self.validator.validate(&descriptor);
        if !validation.valid {
            return Err(validation.error_summary());
        }
        Ok(descriptor)
    }

    pub fn get(&self, id: &str) -> Option<Template> {
        self.read_map().get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.read_map().contains_key(id)
    }

    pub fn get_all(&self) -> Vec<Template> {
        self.read_map().values().cloned().collect()
    }

    pub fn get_all_of_kind(&self, kind: TemplateKind) -> Vec<Template> {
        self.read_map()
            .values()
            .filter(|t| t.kind() == kind)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read_map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_map().is_empty()
    }

    /// Snapshot of every known template, handed to the engine at drop time.
    pub fn catalog(&self) -> Catalog {
        Catalog::new(self.get_all())
    }

    /// Assign an id derived from the name, persist, and register.
    pub fn create(&self, descriptor: TemplateDescriptor) -> Result<Template, StoreError> {
        let _gate = self.lock_gate();
        self.create_locked(descriptor)
    }

    fn create_locked(&self, descriptor: TemplateDescriptor) -> Result<Template, StoreError> {
        self.check(&descriptor)?;
        let id = self.allocate_id(descriptor.name());

        if let Err(e) = self.persist(&id, &descriptor) {
            self.discard_unit(&id);
            return Err(e);
        }

        info!("Created {} template '{}'", descriptor.kind(), id);
        let template = Template::new(id.clone(), descriptor);
        self.write_map().insert(id, template.clone());
        Ok(template)
    }

    /// Shallow-merge `patch` over the stored descriptor and re-persist.
    pub fn update(&self, id: &str, patch: &TemplatePatch) -> Result<Template, StoreError> {
        let _gate = self.lock_gate();
        let existing = self
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        let descriptor = patch.apply(id, &existing.descriptor)?;
        self.check(&descriptor)?;
        self.persist(id, &descriptor)?;
        self.prune_configs(id, &existing.descriptor, &descriptor);

        debug!("Updated template '{}'", id);
        let template = Template::new(id, descriptor);
        self.write_map().insert(id.to_string(), template.clone());
        Ok(template)
    }

    /// Remove the storage unit, then the catalog entry. If removal fails the
    /// entry stays.
    pub fn delete(&self, id: &str) -> Result<(), StoreError> {
        let _gate = self.lock_gate();
        if !self.contains(id) {
            return Err(StoreError::NotFound(id.to_string()));
        }

        let unit = self.unit_dir(id);
        match fs::remove_dir_all(&unit) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!("Storage unit for '{}' was already gone", id);
            }
            Err(e) => return Err(storage_err(id, &unit)(e)),
        }

        self.write_map().remove(id);
        info!("Deleted template '{}'", id);
        Ok(())
    }

    /// Copy the whole storage unit of `id` to `target`, which must not exist.
    pub fn export(&self, id: &str, target: &Path) -> Result<(), StoreError> {
        let _gate = self.lock_gate();
        if !self.contains(id) {
            return Err(StoreError::NotFound(id.to_string()));
        }
        if target.exists() {
            return Err(storage_err(id, target)(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "export target already exists",
            )));
        }

        if let Err(e) = copy_dir(&self.unit_dir(id), target) {
            let _ = fs::remove_dir_all(target);
            return Err(storage_err(id, target)(e));
        }

        info!("Exported template '{}' to {}", id, target.display());
        Ok(())
    }

    /// Bring in a storage unit from elsewhere under a fresh id.
    pub fn import(&self, source: &Path, name: Option<&str>) -> Result<Template, StoreError> {
        let _gate = self.lock_gate();
        let source_label = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| source.display().to_string());

        let descriptor_file = descriptor_path(source).ok_or_else(|| {
            storage_err(&source_label, source)(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no {} in import source", DESCRIPTOR_FILE),
            ))
        })?;
        let text = fs::read_to_string(&descriptor_file)
            .map_err(storage_err(&source_label, &descriptor_file))?;
        let mut descriptor = decode_descriptor(&text).map_err(|e| StoreError::Validation {
            name: source_label.clone(),
            reason: e.to_string(),
        })?;
        if let Some(name) = name {
            descriptor.set_name(name);
        }

        self.check(&descriptor)?;
        let id = self.allocate_id(descriptor.name());
        let unit = self.unit_dir(&id);

        let copied = copy_dir(source, &unit).map_err(storage_err(&id, &unit));
        if let Err(e) = copied.and_then(|()| self.persist(&id, &descriptor)) {
            self.discard_unit(&id);
            return Err(e);
        }

        match fingerprint(&descriptor) {
            Ok(fp) => info!("Imported template '{}' from {} (fingerprint {})", id, source.display(), fp),
            Err(_) => info!("Imported template '{}' from {}", id, source.display()),
        }
        let template = Template::new(id.clone(), descriptor);
        self.write_map().insert(id, template.clone());
        Ok(template)
    }

    /// Populate an empty store with the built-in catalog. Returns how many
    /// templates were added.
    pub fn seed_defaults(&self) -> Result<usize, StoreError> {
        let _gate = self.lock_gate();
        if !self.is_empty() {
            debug!("Template store not empty, skipping default catalog");
            return Ok(0);
        }

        let defaults = default_catalog();
        let count = defaults.len();
        for descriptor in defaults {
            self.create_locked(descriptor)?;
        }
        info!("Seeded {} default templates", count);
        Ok(count)
    }

    fn check(&self, descriptor: &TemplateDescriptor) -> Result<(), StoreError> {
        let validation = self.validator.validate(descriptor);
        if !validation.valid {
            return Err(StoreError::Validation {
                name: descriptor.name().to_string(),
                reason: validation.error_summary(),
            });
        }
        for warning in &validation.violations {
            debug!("Template '{}': {}", descriptor.name(), warning.message);
        }
        Ok(())
    }

    /// Ids already in the catalog and directories already on disk are both taken.
    fn allocate_id(&self, name: &str) -> TemplateId {
        let map = self.read_map();
        unique_slug(name, |candidate| {
            map.contains_key(candidate) || self.root.join(candidate).exists()
        })
    }

    fn persist(&self, id: &str, descriptor: &TemplateDescriptor) -> Result<(), StoreError> {
        let unit = self.unit_dir(id);
        fs::create_dir_all(&unit).map_err(storage_err(id, &unit))?;

        let yaml = encode_descriptor(descriptor).map_err(|source| StoreError::Encode {
            id: id.to_string(),
            source,
        })?;
        let descriptor_file = unit.join(DESCRIPTOR_FILE);
        fs::write(&descriptor_file, yaml).map_err(storage_err(id, &descriptor_file))?;

        let alt = unit.join(DESCRIPTOR_FILE_ALT);
        if alt.exists() {
            fs::remove_file(&alt).map_err(storage_err(id, &alt))?;
        }

        match descriptor {
            TemplateDescriptor::Node(node) => {
                if let Some(rel) = &node.startup_config_rel_path {
                    let path = self.content_path(id, &unit, rel)?;
                    if !path.exists() {
                        write_content(id, &path, &startup_placeholder(&node.name))?;
                    }
                }
            }
            TemplateDescriptor::Stack(stack) => {
                for (rel, body) in stack.configs.iter().flatten() {
                    let path = self.content_path(id, &unit, rel)?;
                    write_content(id, &path, body)?;
                }
            }
        }
        Ok(())
    }

    /// Remove files for `configs` keys the update dropped. Runs after the new
    /// descriptor is saved, so failures only warn.
    fn prune_configs(&self, id: &str, before: &TemplateDescriptor, after: &TemplateDescriptor) {
        let (TemplateDescriptor::Stack(before), TemplateDescriptor::Stack(after)) = (before, after)
        else {
            return;
        };
        let unit = self.unit_dir(id);
        let kept = after.configs.as_ref();

        for rel in before.configs.iter().flatten().map(|(rel, _)| rel) {
            if kept.is_some_and(|configs| configs.contains_key(rel)) {
                continue;
            }
            let Some(path) = safe_join(&unit, rel) else {
                continue;
            };
            match fs::remove_file(&path) {
                Ok(()) => debug!("Removed dropped config {} of '{}'", rel, id),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!("Could not remove dropped config {}: {}", path.display(), e),
            }
        }
    }

    fn content_path(&self, id: &str, unit: &Path, rel: &str) -> Result<PathBuf, StoreError> {
        safe_join(unit, rel).ok_or_else(|| StoreError::Validation {
            name: id.to_string(),
            reason: format!("path '{}' escapes the template directory", rel),
        })
    }

    fn discard_unit(&self, id: &str) {
        let unit = self.unit_dir(id);
        if let Err(e) = fs::remove_dir_all(&unit) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!("Could not clean up {}: {}", unit.display(), e);
            }
        }
    }

    fn unit_dir(&self, id: &str) -> PathBuf {
        self.root.join(id)
    }

    fn lock_gate(&self) -> std::sync::MutexGuard<'_, ()> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_map(&self) -> RwLockReadGuard<'_, HashMap<TemplateId, Template>> {
        self.templates.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_map(&self) -> RwLockWriteGuard<'_, HashMap<TemplateId, Template>> {
        self.templates.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn descriptor_path(dir: &Path) -> Option<PathBuf> {
    [DESCRIPTOR_FILE, DESCRIPTOR_FILE_ALT]
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}

fn startup_placeholder(name: &str) -> String {
    format!("# Startup configuration for {}\n", name)
}

fn write_content(id: &str, path: &Path, body: &str) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(storage_err(id, parent))?;
    }
    fs::write(path, body).map_err(storage_err(id, path))
}

fn copy_dir(src: &Path, dst: &Path) -> io::Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
