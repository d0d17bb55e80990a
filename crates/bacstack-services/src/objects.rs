//! Objects hosted by the local application.

use std::collections::HashMap;
use std::sync::Arc;

use bacstack_core::{AppError, LocalDevice, LocalObject, ObjectIdentifier};

/// Name and identifier indexes over the hosted objects, plus the local
/// device's object list.
#[derive(Debug, Default)]
pub struct ObjectRegistry {
    by_id: HashMap<ObjectIdentifier, Arc<dyn LocalObject>>,
    by_name: HashMap<String, ObjectIdentifier>,
    local_device: Option<Arc<LocalDevice>>,
    /// Object-list attribute of the local device, in registration order.
    object_list: Vec<ObjectIdentifier>,
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry hosting `device`, which becomes the first object.
    pub fn with_local_device(device: LocalDevice) -> Result<Self, AppError> {
        let device = Arc::new(device);
        let mut registry = Self {
            local_device: Some(device.clone()),
            ..Self::default()
        };
        registry.add_object(device)?;
        Ok(registry)
    }

    pub fn local_device(&self) -> Option<&Arc<LocalDevice>> {
        self.local_device.as_ref()
    }

    /// Empty when there is no local device.
    pub fn object_list(&self) -> &[ObjectIdentifier] {
        &self.object_list
    }

    pub fn add_object(&mut self, object: Arc<dyn LocalObject>) -> Result<(), AppError> {
        let name = object.object_name();
        let id = object.object_identifier();

        if name.is_empty() {
            return Err(AppError::MissingObjectName);
        }
        if !id.has_valid_instance() {
            return Err(AppError::InvalidObjectIdentifier(id));
        }
        if self.by_name.contains_key(name) {
            return Err(AppError::DuplicateObjectName(name.to_string()));
        }
        if self.by_id.contains_key(&id) {
            return Err(AppError::DuplicateObjectIdentifier(id));
        }

        tracing::debug!(object = %id, name, "object added");
        self.by_name.insert(name.to_string(), id);
        self.by_id.insert(id, object);
        if self.local_device.is_some() {
            self.object_list.push(id);
        }
        Ok(())
    }

    pub fn remove_object(&mut self, id: ObjectIdentifier) -> Result<Arc<dyn LocalObject>, AppError> {
        let object = self.by_id.remove(&id).ok_or(AppError::UnknownObject(id))?;
        self.by_name.remove(object.object_name());
        self.object_list.retain(|listed| *listed != id);
        tracing::debug!(object = %id, "object removed");
        Ok(object)
    }

    pub fn get_object_by_id(&self, id: ObjectIdentifier) -> Option<&Arc<dyn LocalObject>> {
        self.by_id.get(&id)
    }

    pub fn get_object_by_name(&self, name: &str) -> Option<&Arc<dyn LocalObject>> {
        self.by_name.get(name).and_then(|id| self.by_id.get(id))
    }

    pub fn iter_objects(&self) -> impl Iterator<Item = &Arc<dyn LocalObject>> {
        self.by_id.values()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

/// An object with nothing but identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicObject {
    pub name: String,
    pub identifier: ObjectIdentifier,
}

impl BasicObject {
    pub fn new(name: impl Into<String>, identifier: ObjectIdentifier) -> Self {
        Self {
            name: name.into(),
            identifier,
        }
    }
}

impl LocalObject for BasicObject {
    fn object_name(&self) -> &str {
        &self.name
    }

    fn object_identifier(&self) -> ObjectIdentifier {
        self.identifier
    }
}
