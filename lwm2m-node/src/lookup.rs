//! Queries over decoded node lists

use crate::node::{Node, Object, Resource};
use lwm2m_core::{Lwm2mError, Lwm2mResult, Path};
use std::collections::BTreeMap;

/// Find the resource a resource-level path addresses
///
/// A top-level resource matches on its resource id; object and object
/// instance nodes are searched using the path's object and instance ids.
pub fn get_resource_by_path<'a>(nodes: &'a [Node], path: &Path) -> Lwm2mResult<&'a Resource> {
    if !path.is_resource() {
        return Err(Lwm2mError::PathInvalidValue(format!(
            "{} is not a resource path",
            path
        )));
    }
    let object_id = path.object_id()?;
    let instance_id = path.object_instance_id()?;
    let resource_id = path.resource_id()?;

    for node in nodes {
        let found = match node {
            Node::Resource(resource) if resource.id() == resource_id => Some(resource),
            Node::ObjectInstance(instance)
                if instance.object_id() == object_id && instance.id() == instance_id =>
            {
                instance.resource(resource_id)
            }
            Node::Object(object) if object.id() == object_id => object
                .instance(instance_id)
                .and_then(|instance| instance.resource(resource_id)),
            _ => None,
        };
        if let Some(resource) = found {
            return Ok(resource);
        }
    }
    Err(Lwm2mError::NotFound)
}

/// Find or assemble the object an object-level path addresses
///
/// A top-level object node is returned as is; otherwise every top-level
/// instance of that object is gathered into a new object.
pub fn get_object_by_path(nodes: &[Node], path: &Path) -> Lwm2mResult<Object> {
    if !path.is_object() {
        return Err(Lwm2mError::PathInvalidValue(format!(
            "{} is not an object path",
            path
        )));
    }
    let object_id = path.object_id()?;

    let mut assembled = Object::new(object_id);
    for node in nodes {
        match node {
            Node::Object(object) if object.id() == object_id => return Ok(object.clone()),
            Node::ObjectInstance(instance) if instance.object_id() == object_id => {
                assembled.insert_instance(instance.clone())?;
            }
            _ => {}
        }
    }

    if assembled.instance_count() == 0 {
        return Err(Lwm2mError::NotFound);
    }
    Ok(assembled)
}

/// Every resource at or below `parent`, keyed by resource path
pub fn get_all_resources<'a>(
    nodes: &'a [Node],
    parent: &Path,
) -> Lwm2mResult<BTreeMap<Path, &'a Resource>> {
    let mut resources = BTreeMap::new();
    let mut visit = |resource: &'a Resource| {
        if resource.path().is_child_of_or_eq(parent) {
            resources.insert(resource.path(), resource);
        }
    };

    for node in nodes {
        match node {
            Node::Object(object) => object
                .instances()
                .flat_map(|instance| instance.resources())
                .for_each(&mut visit),
            Node::ObjectInstance(instance) => instance.resources().for_each(&mut visit),
            Node::Resource(resource) => visit(resource),
            Node::ResourceInstance(_) => {}
        }
    }

    if resources.is_empty() {
        return Err(Lwm2mError::NotFound);
    }
    Ok(resources)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::ObjectInstance;
    use lwm2m_codec::Value;

    fn temperature_instance(id: u16, value: f64) -> ObjectInstance {
        let mut instance = ObjectInstance::new(3303, id).unwrap();
        instance
            .insert_resource(Resource::single(Path::resource(3303, id, 5700).unwrap(), Value::Float(value)).unwrap())
            .unwrap();
        instance
            .insert_resource(Resource::single(Path::resource(3303, id, 5701).unwrap(), Value::from("Cel")).unwrap())
            .unwrap();
        instance
    }

    #[test]
    fn test_get_resource_by_path() {
        let nodes = vec![
            Node::from(temperature_instance(0, 20.0)),
            Node::from(temperature_instance(1, 25.0)),
        ];
        let resource = get_resource_by_path(&nodes, &Path::resource(3303, 1, 5700).unwrap()).unwrap();
        assert_eq!(resource.value().unwrap(), Value::Float(25.0));

        assert!(matches!(
            get_resource_by_path(&nodes, &Path::resource(3303, 2, 5700).unwrap()),
            Err(Lwm2mError::NotFound)
        ));
        assert!(matches!(
            get_resource_by_path(&nodes, &Path::object_instance(3303, 1).unwrap()),
            Err(Lwm2mError::PathInvalidValue(_))
        ));
    }

    #[test]
    fn test_get_resource_through_object() {
        let mut object = Object::new(3303);
        object.insert_instance(temperature_instance(4, 18.5)).unwrap();
        let nodes = vec![Node::from(object)];
        let resource = get_resource_by_path(&nodes, &Path::resource(3303, 4, 5700).unwrap()).unwrap();
        assert_eq!(resource.value().unwrap(), Value::Float(18.5));
    }

    #[test]
    fn test_get_object_by_path_assembles_instances() {
        let nodes = vec![
            Node::from(temperature_instance(0, 20.0)),
            Node::from(ObjectInstance::new(3, 0).unwrap()),
            Node::from(temperature_instance(1, 25.0)),
        ];
        let object = get_object_by_path(&nodes, &Path::object(3303)).unwrap();
        assert_eq!(object.instance_count(), 2);
        assert!(object.has_instance(1));

        assert!(matches!(
            get_object_by_path(&nodes, &Path::object(5)),
            Err(Lwm2mError::NotFound)
        ));
        assert!(matches!(
            get_object_by_path(&nodes, &Path::object_instance(3303, 0).unwrap()),
            Err(Lwm2mError::PathInvalidValue(_))
        ));
    }

    #[test]
    fn test_get_all_resources_scoped() {
        let mut object = Object::new(3303);
        object.insert_instance(temperature_instance(0, 20.0)).unwrap();
        object.insert_instance(temperature_instance(1, 25.0)).unwrap();
        let nodes = vec![Node::from(object)];

        let all = get_all_resources(&nodes, &Path::object(3303)).unwrap();
        assert_eq!(all.len(), 4);

        let second = get_all_resources(&nodes, &Path::object_instance(3303, 1).unwrap()).unwrap();
        let paths: Vec<String> = second.keys().map(Path::to_string).collect();
        assert_eq!(paths, vec!["/3303/1/5700", "/3303/1/5701"]);

        assert!(matches!(
            get_all_resources(&nodes, &Path::object(3)),
            Err(Lwm2mError::NotFound)
        ));
    }
}
