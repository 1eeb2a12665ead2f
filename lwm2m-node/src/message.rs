//! Payload <-> node conversion, dispatched on content format

use crate::node::{Node, Object, ObjectInstance, Resource, ResourceInstance};
use crate::registry::Registry;
use bytes::Bytes;
use lwm2m_codec::tlv::{self, TlvEntry};
use lwm2m_codec::{EncodedValue, OpaqueValue, PlainTextValue, ResourceType, Valuer};
use lwm2m_core::{ContentFormat, Lwm2mError, Lwm2mResult, Path};

/// Decode a payload received for `base_path` into nodes
///
/// TLV payloads may carry any mix of object instances, resources and
/// resource instances. Plain-text and octet-stream payloads carry exactly
/// one value and are only accepted for resource-level paths.
///
/// # Errors
///
/// - `ContentFormatNotSupported` for formats other than TLV, text and opaque
/// - `PathInvalidValue` if the path cannot hold the payload
/// - `NotEnoughData` for truncated TLV
pub fn decode_message(
    registry: &Registry,
    base_path: &Path,
    content_format: ContentFormat,
    payload: &[u8],
) -> Lwm2mResult<Vec<Node>> {
    match content_format {
        ContentFormat::Tlv => {
            let entries = tlv::decode(payload)?;
            let builder = NodeBuilder { registry };
            entries
                .iter()
                .map(|entry| builder.build(base_path, entry))
                .collect()
        }
        ContentFormat::TextPlain => {
            let value = PlainTextValue::new(Bytes::copy_from_slice(payload));
            decode_single_value(registry, base_path, value.into())
        }
        ContentFormat::OctetStream => {
            let value = OpaqueValue::new(Bytes::copy_from_slice(payload));
            decode_single_value(registry, base_path, value.into())
        }
        other => Err(Lwm2mError::ContentFormatNotSupported(other.code())),
    }
}

fn decode_single_value(
    registry: &Registry,
    base_path: &Path,
    value: EncodedValue,
) -> Lwm2mResult<Vec<Node>> {
    let (resource_path, multiple) = if base_path.is_resource() {
        (*base_path, false)
    } else if base_path.is_resource_instance() {
        (base_path.parent().ok_or(Lwm2mError::NotFound)?, true)
    } else {
        return Err(Lwm2mError::PathInvalidValue(format!(
            "{} is not a resource path",
            base_path
        )));
    };

    let resource_type = detect_type(registry, base_path)?;
    let mut resource = Resource::new(resource_path, multiple)?;
    resource.insert_instance(ResourceInstance::new(*base_path, resource_type, value)?)?;
    Ok(vec![Node::Resource(resource)])
}

fn detect_type(registry: &Registry, path: &Path) -> Lwm2mResult<ResourceType> {
    match registry.detect_resource_type(path) {
        Err(Lwm2mError::NotFound) => {
            log::debug!("No definition for {}, keeping raw value", path);
            Ok(ResourceType::None)
        }
        other => other,
    }
}

struct NodeBuilder<'a> {
    registry: &'a Registry,
}

impl NodeBuilder<'_> {
    fn build(&self, base_path: &Path, entry: &TlvEntry) -> Lwm2mResult<Node> {
        match entry {
            TlvEntry::ObjectInstance { id, resources } => {
                let path = base_path.with_object_instance(*id)?;
                let mut instance = ObjectInstance::new(path.object_id()?, *id)?;
                for child in resources {
                    instance.insert_resource(self.build_resource(&path, child)?)?;
                }
                Ok(Node::ObjectInstance(instance))
            }
            TlvEntry::SingleResource { .. } | TlvEntry::MultipleResource { .. } => {
                Ok(Node::Resource(self.build_resource(base_path, entry)?))
            }
            TlvEntry::ResourceInstance { id, value } => {
                let path = base_path.with_resource_instance(*id)?;
                Ok(Node::ResourceInstance(self.build_instance(path, value)?))
            }
        }
    }

    fn build_resource(&self, instance_path: &Path, entry: &TlvEntry) -> Lwm2mResult<Resource> {
        match entry {
            TlvEntry::SingleResource { id, value } => {
                let path = instance_path.with_resource(*id)?;
                let mut resource = Resource::new(path, false)?;
                resource.insert_instance(self.build_instance(path, value)?)?;
                Ok(resource)
            }
            TlvEntry::MultipleResource { id, instances } => {
                let path = instance_path.with_resource(*id)?;
                let mut resource = Resource::new(path, true)?;
                for child in instances {
                    match child {
                        TlvEntry::ResourceInstance { id, value } => {
                            let child_path = path.with_resource_instance(*id)?;
                            resource.insert_instance(self.build_instance(child_path, value)?)?;
                        }
                        other => {
                            return Err(Lwm2mError::InvalidFormat(format!(
                                "{:?} entry inside multiple resource {}",
                                other.kind(),
                                path
                            )));
                        }
                    }
                }
                Ok(resource)
            }
            other => Err(Lwm2mError::InvalidFormat(format!(
                "{:?} entry where a resource was expected under {}",
                other.kind(),
                instance_path
            ))),
        }
    }

    fn build_instance(&self, path: Path, value: &Bytes) -> Lwm2mResult<ResourceInstance> {
        let resource_type = detect_type(self.registry, &path)?;
        ResourceInstance::from_raw(path, resource_type, value.clone())
    }
}

/// Encode nodes into a payload of the given content format
///
/// # Errors
///
/// - `UnsupportedEncoding` when plain text or opaque is asked for anything
///   but exactly one single-instance resource, or when `nodes` is empty
/// - `ContentFormatNotSupported` for other formats
pub fn encode_message(content_format: ContentFormat, nodes: &[Node]) -> Lwm2mResult<Bytes> {
    if nodes.is_empty() {
        return Err(Lwm2mError::UnsupportedEncoding(
            "nothing to encode".to_string(),
        ));
    }
    match content_format {
        ContentFormat::Tlv => {
            let mut entries = Vec::new();
            for node in nodes {
                entries.extend(node_entries(node)?);
            }
            tlv::encode(&entries)
        }
        ContentFormat::TextPlain => {
            let instance = single_value(content_format, nodes)?;
            let text = instance.encoded().to_plain_text(instance.resource_type())?;
            Ok(Bytes::copy_from_slice(text.raw()))
        }
        ContentFormat::OctetStream => {
            let instance = single_value(content_format, nodes)?;
            let opaque = instance.encoded().to_opaque(instance.resource_type())?;
            Ok(Bytes::copy_from_slice(opaque.raw()))
        }
        other => Err(Lwm2mError::ContentFormatNotSupported(other.code())),
    }
}

fn single_value(content_format: ContentFormat, nodes: &[Node]) -> Lwm2mResult<&ResourceInstance> {
    match nodes {
        [Node::Resource(resource)] if resource.instance_count() == 1 => resource
            .instances()
            .next()
            .ok_or(Lwm2mError::NotFound),
        _ => Err(Lwm2mError::UnsupportedEncoding(format!(
            "{} needs exactly one single-instance resource",
            content_format.mime()
        ))),
    }
}

fn node_entries(node: &Node) -> Lwm2mResult<Vec<TlvEntry>> {
    match node {
        Node::Object(object) => object_entries(object),
        Node::ObjectInstance(instance) => Ok(vec![instance_entry(instance)?]),
        Node::Resource(resource) => Ok(vec![resource_entry(resource)?]),
        Node::ResourceInstance(instance) => Ok(vec![TlvEntry::ResourceInstance {
            id: instance.id(),
            value: binary_bytes(instance)?,
        }]),
    }
}

fn object_entries(object: &Object) -> Lwm2mResult<Vec<TlvEntry>> {
    object.instances().map(instance_entry).collect()
}

fn instance_entry(instance: &ObjectInstance) -> Lwm2mResult<TlvEntry> {
    Ok(TlvEntry::ObjectInstance {
        id: instance.id(),
        resources: instance
            .resources()
            .map(resource_entry)
            .collect::<Lwm2mResult<_>>()?,
    })
}

fn resource_entry(resource: &Resource) -> Lwm2mResult<TlvEntry> {
    if resource.is_multiple() {
        let instances = resource
            .instances()
            .map(|instance| {
                Ok(TlvEntry::ResourceInstance {
                    id: instance.id(),
                    value: binary_bytes(instance)?,
                })
            })
            .collect::<Lwm2mResult<_>>()?;
        return Ok(TlvEntry::MultipleResource {
            id: resource.id(),
            instances,
        });
    }

    let value = match resource.instance(0).or_else(|| resource.instances().next()) {
        Some(instance) => binary_bytes(instance)?,
        None => Bytes::new(),
    };
    Ok(TlvEntry::SingleResource {
        id: resource.id(),
        value,
    })
}

fn binary_bytes(instance: &ResourceInstance) -> Lwm2mResult<Bytes> {
    Ok(instance
        .encoded()
        .to_binary(instance.resource_type())?
        .bytes()
        .clone())
}
