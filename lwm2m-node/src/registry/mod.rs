//! Object and resource definitions
//!
//! The registry answers "what type does `/o/i/r` hold?" for the message
//! decoder. It is built once at startup, shared as `Arc<Registry>`, and
//! only ever grows afterwards.

mod builtin;

use lwm2m_codec::ResourceType;
use lwm2m_core::{Lwm2mError, Lwm2mResult, Path};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock};

/// Operations a resource supports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operations {
    None,
    Read,
    Write,
    ReadWrite,
    Execute,
}

impl Operations {
    pub fn is_readable(self) -> bool {
        matches!(self, Operations::Read | Operations::ReadWrite)
    }

    pub fn is_writable(self) -> bool {
        matches!(self, Operations::Write | Operations::ReadWrite)
    }

    pub fn is_executable(self) -> bool {
        self == Operations::Execute
    }
}

/// Declaration of one resource of an object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDefinition {
    pub id: u16,
    pub name: String,
    pub operations: Operations,
    pub multiple: bool,
    pub mandatory: bool,
    pub resource_type: ResourceType,
}

/// Declaration of an object and its resources
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectDefinition {
    pub id: u16,
    pub name: String,
    pub multiple: bool,
    pub mandatory: bool,
    pub resources: Vec<ResourceDefinition>,
}

impl ObjectDefinition {
    pub fn resource(&self, id: u16) -> Option<&ResourceDefinition> {
        self.resources.iter().find(|resource| resource.id == id)
    }
}

/// A provider of object definitions, such as an OMA DDF file loader
pub trait ObjectDefinitionSource {
    fn load(&self) -> Lwm2mResult<Vec<ObjectDefinition>>;
}

struct IndexedObject {
    definition: ObjectDefinition,
    resources: BTreeMap<u16, ResourceDefinition>,
}

/// Resource type registry
#[derive(Default)]
pub struct Registry {
    objects: RwLock<HashMap<u16, IndexedObject>>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the OMA core objects (0-7) and the IPSO
    /// temperature object (3303)
    pub fn with_core_objects() -> Self {
        Self::from_definitions(builtin::core_objects())
    }

    pub fn from_definitions(definitions: impl IntoIterator<Item = ObjectDefinition>) -> Self {
        let registry = Self::new();
        registry.append(definitions);
        registry
    }

    /// Merge definitions into the registry
    ///
    /// Unknown objects are added whole. For known objects only resources
    /// that are not yet declared are added; nothing is replaced or removed.
    pub fn append(&self, definitions: impl IntoIterator<Item = ObjectDefinition>) {
        let mut objects = self.objects.write().unwrap_or_else(PoisonError::into_inner);
        for definition in definitions {
            match objects.get_mut(&definition.id) {
                Some(existing) => {
                    for resource in definition.resources {
                        if !existing.resources.contains_key(&resource.id) {
                            existing.definition.resources.push(resource.clone());
                            existing.resources.insert(resource.id, resource);
                        }
                    }
                }
                None => {
                    let resources = definition
                        .resources
                        .iter()
                        .map(|resource| (resource.id, resource.clone()))
                        .collect();
                    objects.insert(
                        definition.id,
                        IndexedObject {
                            definition,
                            resources,
                        },
                    );
                }
            }
        }
    }

    /// Load and merge definitions from a source
    pub fn load_from(&self, source: &dyn ObjectDefinitionSource) -> Lwm2mResult<()> {
        let definitions = source.load()?;
        log::debug!("Loaded {} object definitions", definitions.len());
        self.append(definitions);
        Ok(())
    }

    /// Get an object definition
    pub fn object(&self, id: u16) -> Option<ObjectDefinition> {
        let objects = self.objects.read().unwrap_or_else(PoisonError::into_inner);
        objects.get(&id).map(|object| object.definition.clone())
    }

    /// Get a resource definition
    pub fn resource(&self, object_id: u16, resource_id: u16) -> Option<ResourceDefinition> {
        let objects = self.objects.read().unwrap_or_else(PoisonError::into_inner);
        objects
            .get(&object_id)
            .and_then(|object| object.resources.get(&resource_id))
            .cloned()
    }

    /// Ids of every known object, ascending
    pub fn object_ids(&self) -> Vec<u16> {
        let objects = self.objects.read().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<u16> = objects.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Declared type of the resource a path points into
    ///
    /// # Errors
    ///
    /// - `PathInvalidValue` unless the path is resource or resource-instance level
    /// - `NotFound` if the resource is not declared
    pub fn detect_resource_type(&self, path: &Path) -> Lwm2mResult<ResourceType> {
        Ok(self.lookup(path)?.resource_type)
    }

    /// Whether the resource a path points into is declared multiple
    pub fn is_multiple(&self, path: &Path) -> Lwm2mResult<bool> {
        Ok(self.lookup(path)?.multiple)
    }

    fn lookup(&self, path: &Path) -> Lwm2mResult<ResourceDefinition> {
        if !(path.is_resource() || path.is_resource_instance()) {
            return Err(Lwm2mError::PathInvalidValue(format!(
                "{} does not address a resource",
                path
            )));
        }
        self.resource(path.object_id()?, path.resource_id()?)
            .ok_or(Lwm2mError::NotFound)
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("objects", &self.object_ids())
            .finish()
    }
}
