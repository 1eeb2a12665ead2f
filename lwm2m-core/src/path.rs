use crate::error::{Lwm2mError, Lwm2mResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Reserved identifier, never a valid object-instance or resource-instance id
pub const MAX_ID: u16 = u16::MAX;

/// LWM2M resource locator
///
/// A path has up to four levels: object, object instance, resource and
/// resource instance. Levels are only ever absent from the right, so a
/// path is always one of root, object, object instance, resource or
/// resource instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Path {
    object_id: Option<u16>,
    object_instance_id: Option<u16>,
    resource_id: Option<u16>,
    resource_instance_id: Option<u16>,
}

impl Path {
    /// The root path `/`
    pub const fn root() -> Self {
        Self {
            object_id: None,
            object_instance_id: None,
            resource_id: None,
            resource_instance_id: None,
        }
    }

    /// Object level path, `/o`
    pub const fn object(object_id: u16) -> Self {
        Self {
            object_id: Some(object_id),
            object_instance_id: None,
            resource_id: None,
            resource_instance_id: None,
        }
    }

    /// Object instance level path, `/o/i`
    ///
    /// # Errors
    ///
    /// `PathInvalidValue` if `instance_id` is [`MAX_ID`]
    pub fn object_instance(object_id: u16, instance_id: u16) -> Lwm2mResult<Self> {
        check_instance_id(instance_id)?;
        Ok(Self {
            object_id: Some(object_id),
            object_instance_id: Some(instance_id),
            resource_id: None,
            resource_instance_id: None,
        })
    }

    /// Resource level path, `/o/i/r`
    ///
    /// # Errors
    ///
    /// `PathInvalidValue` if `instance_id` is [`MAX_ID`]
    pub fn resource(object_id: u16, instance_id: u16, resource_id: u16) -> Lwm2mResult<Self> {
        check_instance_id(instance_id)?;
        Ok(Self {
            object_id: Some(object_id),
            object_instance_id: Some(instance_id),
            resource_id: Some(resource_id),
            resource_instance_id: None,
        })
    }

    /// Resource instance level path, `/o/i/r/ri`
    ///
    /// # Errors
    ///
    /// `PathInvalidValue` if either instance id is [`MAX_ID`]
    pub fn resource_instance(
        object_id: u16,
        instance_id: u16,
        resource_id: u16,
        resource_instance_id: u16,
    ) -> Lwm2mResult<Self> {
        check_instance_id(instance_id)?;
        check_instance_id(resource_instance_id)?;
        Ok(Self {
            object_id: Some(object_id),
            object_instance_id: Some(instance_id),
            resource_id: Some(resource_id),
            resource_instance_id: Some(resource_instance_id),
        })
    }

    /// Replace the object instance level, dropping everything below it
    ///
    /// # Errors
    ///
    /// `PathInvalidValue` if the object level is absent or the id is reserved
    pub fn with_object_instance(&self, instance_id: u16) -> Lwm2mResult<Self> {
        let object_id = self.object_id.ok_or_else(|| {
            Lwm2mError::PathInvalidValue(format!("{} has no object id", self))
        })?;
        Self::object_instance(object_id, instance_id)
    }

    /// Replace the resource level, dropping the resource instance level
    ///
    /// # Errors
    ///
    /// `PathInvalidValue` if the object instance level is absent
    pub fn with_resource(&self, resource_id: u16) -> Lwm2mResult<Self> {
        match (self.object_id, self.object_instance_id) {
            (Some(object_id), Some(instance_id)) => {
                Self::resource(object_id, instance_id, resource_id)
            }
            _ => Err(Lwm2mError::PathInvalidValue(format!(
                "{} has no object instance id",
                self
            ))),
        }
    }

    /// Replace the resource instance level
    ///
    /// # Errors
    ///
    /// `PathInvalidValue` if the resource level is absent or the id is reserved
    pub fn with_resource_instance(&self, resource_instance_id: u16) -> Lwm2mResult<Self> {
        match (self.object_id, self.object_instance_id, self.resource_id) {
            (Some(object_id), Some(instance_id), Some(resource_id)) => Self::resource_instance(
                object_id,
                instance_id,
                resource_id,
                resource_instance_id,
            ),
            _ => Err(Lwm2mError::PathInvalidValue(format!(
                "{} has no resource id",
                self
            ))),
        }
    }

    /// Get the object id
    pub fn object_id(&self) -> Lwm2mResult<u16> {
        self.object_id.ok_or(Lwm2mError::FieldAbsent("object id"))
    }

    /// Get the object instance id
    pub fn object_instance_id(&self) -> Lwm2mResult<u16> {
        self.object_instance_id
            .ok_or(Lwm2mError::FieldAbsent("object instance id"))
    }

    /// Get the resource id
    pub fn resource_id(&self) -> Lwm2mResult<u16> {
        self.resource_id.ok_or(Lwm2mError::FieldAbsent("resource id"))
    }

    /// Get the resource instance id
    pub fn resource_instance_id(&self) -> Lwm2mResult<u16> {
        self.resource_instance_id
            .ok_or(Lwm2mError::FieldAbsent("resource instance id"))
    }

    pub fn is_root(&self) -> bool {
        self.depth() == 0
    }

    pub fn is_object(&self) -> bool {
        self.depth() == 1
    }

    pub fn is_object_instance(&self) -> bool {
        self.depth() == 2
    }

    pub fn is_resource(&self) -> bool {
        self.depth() == 3
    }

    pub fn is_resource_instance(&self) -> bool {
        self.depth() == 4
    }

    /// Number of levels present (0 for root, 4 for a resource instance)
    pub fn depth(&self) -> usize {
        self.levels().iter().take_while(|level| level.is_some()).count()
    }

    /// The path one level up, or `None` for root
    pub fn parent(&self) -> Option<Self> {
        let mut levels = self.levels();
        let depth = self.depth();
        if depth == 0 {
            return None;
        }
        levels[depth - 1] = None;
        Some(Self::from_levels(levels))
    }

    /// Check whether this path equals `other` or lies below it
    ///
    /// Every level present in `other` must be present and equal here.
    pub fn is_child_of_or_eq(&self, other: &Path) -> bool {
        self.levels()
            .iter()
            .zip(other.levels().iter())
            .all(|(mine, theirs)| theirs.is_none() || mine == theirs)
    }

    fn levels(&self) -> [Option<u16>; 4] {
        [
            self.object_id,
            self.object_instance_id,
            self.resource_id,
            self.resource_instance_id,
        ]
    }

    fn from_levels(levels: [Option<u16>; 4]) -> Self {
        Self {
            object_id: levels[0],
            object_instance_id: levels[1],
            resource_id: levels[2],
            resource_instance_id: levels[3],
        }
    }

    fn parse_segment(segment: &str, level: usize) -> Lwm2mResult<u16> {
        if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Lwm2mError::InvalidFormat(format!(
                "Invalid path segment: {:?}",
                segment
            )));
        }
        let value = segment.parse::<u16>().map_err(|_| {
            Lwm2mError::InvalidFormat(format!("Path segment out of range: {}", segment))
        })?;
        // levels 1 and 3 are the instance levels
        if level % 2 == 1 && value == MAX_ID {
            return Err(Lwm2mError::InvalidFormat(format!(
                "Reserved instance id: {}",
                segment
            )));
        }
        Ok(value)
    }
}

fn check_instance_id(id: u16) -> Lwm2mResult<()> {
    if id == MAX_ID {
        return Err(Lwm2mError::PathInvalidValue(format!(
            "Reserved instance id: {}",
            id
        )));
    }
    Ok(())
}

impl FromStr for Path {
    type Err = Lwm2mError;

    /// Parse a path such as `/3/0/1`
    ///
    /// Leading and trailing slashes are ignored, so `3/0/` is `/3/0`.
    fn from_str(s: &str) -> Lwm2mResult<Self> {
        let trimmed = s.trim_matches('/');
        if trimmed.is_empty() {
            return Ok(Self::root());
        }

        let segments: Vec<&str> = trimmed.split('/').collect();
        if segments.len() > 4 {
            return Err(Lwm2mError::InvalidFormat(format!(
                "Too many path segments: {}",
                s
            )));
        }

        let mut levels = [None; 4];
        for (level, segment) in segments.iter().enumerate() {
            levels[level] = Some(Self::parse_segment(segment, level)?);
        }
        Ok(Self::from_levels(levels))
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            return write!(f, "/");
        }
        for level in self.levels().iter().map_while(|level| *level) {
            write!(f, "/{}", level)?;
        }
        Ok(())
    }
}

impl Serialize for Path {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Path {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
