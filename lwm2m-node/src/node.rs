//! Object / ObjectInstance / Resource / ResourceInstance tree

use bytes::Bytes;
use lwm2m_codec::{BinaryValue, EncodedValue, ResourceType, Value, Valuer};
use lwm2m_core::{Lwm2mError, Lwm2mResult, Path};
use std::collections::BTreeMap;

/// A decoded or to-be-encoded piece of LWM2M data
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Object(Object),
    ObjectInstance(ObjectInstance),
    Resource(Resource),
    ResourceInstance(ResourceInstance),
}

impl Node {
    /// Identifier at the node's own level
    pub fn id(&self) -> u16 {
        match self {
            Node::Object(object) => object.id(),
            Node::ObjectInstance(instance) => instance.id(),
            Node::Resource(resource) => resource.id(),
            Node::ResourceInstance(instance) => instance.id(),
        }
    }

    /// Path addressing this node
    pub fn path(&self) -> Path {
        match self {
            Node::Object(object) => object.path(),
            Node::ObjectInstance(instance) => instance.path(),
            Node::Resource(resource) => resource.path(),
            Node::ResourceInstance(instance) => instance.path(),
        }
    }
}

impl From<Object> for Node {
    fn from(object: Object) -> Self {
        Node::Object(object)
    }
}

impl From<ObjectInstance> for Node {
    fn from(instance: ObjectInstance) -> Self {
        Node::ObjectInstance(instance)
    }
}

impl From<Resource> for Node {
    fn from(resource: Resource) -> Self {
        Node::Resource(resource)
    }
}

impl From<ResourceInstance> for Node {
    fn from(instance: ResourceInstance) -> Self {
        Node::ResourceInstance(instance)
    }
}

/// An object with its instances
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Object {
    id: u16,
    instances: BTreeMap<u16, ObjectInstance>,
}

impl Object {
    pub fn new(id: u16) -> Self {
        Self {
            id,
            instances: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn path(&self) -> Path {
        Path::object(self.id)
    }

    pub fn instance(&self, id: u16) -> Option<&ObjectInstance> {
        self.instances.get(&id)
    }

    pub fn instances(&self) -> impl Iterator<Item = &ObjectInstance> {
        self.instances.values()
    }

    pub fn instance_ids(&self) -> impl Iterator<Item = u16> + '_ {
        self.instances.keys().copied()
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    pub fn has_instance(&self, id: u16) -> bool {
        self.instances.contains_key(&id)
    }

    /// Add or replace an instance
    ///
    /// # Errors
    ///
    /// `PathInvalidValue` if the instance belongs to another object
    pub fn insert_instance(&mut self, instance: ObjectInstance) -> Lwm2mResult<()> {
        if instance.object_id() != self.id {
            return Err(Lwm2mError::PathInvalidValue(format!(
                "{} is not an instance of object {}",
                instance.path(),
                self.id
            )));
        }
        self.instances.insert(instance.id(), instance);
        Ok(())
    }

    pub fn remove_instance(&mut self, id: u16) -> Option<ObjectInstance> {
        self.instances.remove(&id)
    }
}

/// An object instance with its resources
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectInstance {
    object_id: u16,
    id: u16,
    path: Path,
    resources: BTreeMap<u16, Resource>,
}

impl ObjectInstance {
    /// # Errors
    ///
    /// `PathInvalidValue` if `id` is the reserved instance id
    pub fn new(object_id: u16, id: u16) -> Lwm2mResult<Self> {
        Ok(Self {
            object_id,
            id,
            path: Path::object_instance(object_id, id)?,
            resources: BTreeMap::new(),
        })
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn object_id(&self) -> u16 {
        self.object_id
    }

    pub fn path(&self) -> Path {
        self.path
    }

    pub fn resource(&self, id: u16) -> Option<&Resource> {
        self.resources.get(&id)
    }

    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.resources.values()
    }

    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    /// Add or replace a resource
    ///
    /// # Errors
    ///
    /// `PathInvalidValue` if the resource lives under another instance
    pub fn insert_resource(&mut self, resource: Resource) -> Lwm2mResult<()> {
        if !resource.path().is_child_of_or_eq(&self.path()) {
            return Err(Lwm2mError::PathInvalidValue(format!(
                "{} is not below {}",
                resource.path(),
                self.path()
            )));
        }
        self.resources.insert(resource.id(), resource);
        Ok(())
    }
}

/// A resource and its instances
///
/// Single resources keep their value as instance 0.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    id: u16,
    path: Path,
    multiple: bool,
    instances: BTreeMap<u16, ResourceInstance>,
}

impl Resource {
    /// Create an empty resource at a resource-level path
    pub fn new(path: Path, multiple: bool) -> Lwm2mResult<Self> {
        if !path.is_resource() {
            return Err(Lwm2mError::PathInvalidValue(format!(
                "{} is not a resource path",
                path
            )));
        }
        Ok(Self {
            id: path.resource_id()?,
            path,
            multiple,
            instances: BTreeMap::new(),
        })
    }

    /// Single-instance resource holding `value`
    pub fn single(path: Path, value: Value) -> Lwm2mResult<Self> {
        let mut resource = Self::new(path, false)?;
        resource.insert_instance(ResourceInstance::from_value(path, value)?)?;
        Ok(resource)
    }

    /// Multiple-instance resource from `(instance id, value)` pairs
    pub fn multiple(path: Path, values: impl IntoIterator<Item = (u16, Value)>) -> Lwm2mResult<Self> {
        let mut resource = Self::new(path, true)?;
        for (id, value) in values {
            let instance_path = path.with_resource_instance(id)?;
            resource.insert_instance(ResourceInstance::from_value(instance_path, value)?)?;
        }
        Ok(resource)
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn path(&self) -> Path {
        self.path
    }

    pub fn is_multiple(&self) -> bool {
        self.multiple
    }

    pub fn instance(&self, id: u16) -> Option<&ResourceInstance> {
        self.instances.get(&id)
    }

    pub fn instances(&self) -> impl Iterator<Item = &ResourceInstance> {
        self.instances.values()
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// Add or replace an instance
    pub fn insert_instance(&mut self, instance: ResourceInstance) -> Lwm2mResult<()> {
        if !instance.path().is_child_of_or_eq(&self.path) {
            return Err(Lwm2mError::PathInvalidValue(format!(
                "{} is not below {}",
                instance.path(),
                self.path
            )));
        }
        self.instances.insert(instance.id(), instance);
        Ok(())
    }

    /// Value of a single resource (instance 0)
    pub fn value(&self) -> Lwm2mResult<Value> {
        self.instance(0).ok_or(Lwm2mError::NotFound)?.value()
    }

    /// Values of every instance, keyed by instance id
    pub fn values(&self) -> Lwm2mResult<BTreeMap<u16, Value>> {
        self.instances
            .iter()
            .map(|(id, instance)| Ok((*id, instance.value()?)))
            .collect()
    }
}

/// A single value of a resource
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceInstance {
    id: u16,
    path: Path,
    resource_type: ResourceType,
    value: EncodedValue,
}

impl ResourceInstance {
    /// Create an instance at a resource or resource-instance path
    ///
    /// A resource-level path denotes instance 0.
    pub fn new(path: Path, resource_type: ResourceType, value: EncodedValue) -> Lwm2mResult<Self> {
        let path = if path.is_resource() {
            path.with_resource_instance(0)?
        } else if path.is_resource_instance() {
            path
        } else {
            return Err(Lwm2mError::PathInvalidValue(format!(
                "{} is not a resource path",
                path
            )));
        };
        Ok(Self {
            id: path.resource_instance_id()?,
            path,
            resource_type,
            value,
        })
    }

    /// Create an instance from a typed value, encoded in binary form
    pub fn from_value(path: Path, value: Value) -> Lwm2mResult<Self> {
        let resource_type = value.resource_type();
        Self::new(path, resource_type, BinaryValue::from_value(&value).into())
    }

    /// Create an instance holding raw binary bytes of a declared type
    pub fn from_raw(path: Path, resource_type: ResourceType, raw: Bytes) -> Lwm2mResult<Self> {
        Self::new(path, resource_type, BinaryValue::new(raw).into())
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn path(&self) -> Path {
        self.path
    }

    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    /// The value in its wire representation
    pub fn encoded(&self) -> &EncodedValue {
        &self.value
    }

    /// The value interpreted through the declared resource type
    pub fn value(&self) -> Lwm2mResult<Value> {
        self.value.typed(self.resource_type)
    }
}
