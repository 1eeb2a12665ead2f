//! LWM2M object model
//!
//! - `node`: the Object / ObjectInstance / Resource / ResourceInstance tree
//! - `registry`: declared resource types, built once and shared
//! - `message`: content-format dispatch between payloads and nodes
//! - `lookup`: queries over decoded node lists

pub mod lookup;
pub mod message;
pub mod node;
pub mod registry;

pub use lwm2m_codec::{ObjectLink, ResourceType, Value, Valuer};
pub use lwm2m_core::{ContentFormat, Lwm2mError, Lwm2mResult, Path};

pub use lookup::{get_all_resources, get_object_by_path, get_resource_by_path};
pub use message::{decode_message, encode_message};
pub use node::{Node, Object, ObjectInstance, Resource, ResourceInstance};
pub use registry::{
    ObjectDefinition, ObjectDefinitionSource, Operations, Registry, ResourceDefinition,
};
