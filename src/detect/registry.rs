use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};

use crate::detect::result::{Detection, DetectionFrame};

use super::backend::{DetectionCapability, DetectorBackend};

/// Thread-safe registry of detector backends.
///
/// Backends are wrapped in `Mutex` because `DetectorBackend::detect` takes `&mut self`.
/// Registration order is preserved so merged output is deterministic.
pub struct BackendRegistry {
    backends: HashMap<String, Arc<Mutex<dyn DetectorBackend>>>,
    order: Vec<String>,
    default_name: Option<String>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            backends: HashMap::new(),
            order: Vec::new(),
            default_name: None,
        }
    }

    /// Register a backend. The first registered backend becomes the default.
    /// Re-registering a name replaces the previous backend in place.
    pub fn register<B: DetectorBackend + 'static>(&mut self, backend: B) {
        let name = backend.name().to_string();
        if self.default_name.is_none() {
            self.default_name = Some(name.clone());
        }
        if !self.order.contains(&name) {
            self.order.push(name.clone());
        }
        self.backends.insert(name, Arc::new(Mutex::new(backend)));
    }

    /// Set default backend by name.
    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if !self.backends.contains_key(name) {
            return Err(anyhow!("backend '{}' not registered", name));
        }
        self.default_name = Some(name.to_string());
        Ok(())
    }

    /// Get backend by name.
    pub fn get(&self, name: &str) -> Option<Arc<Mutex<dyn DetectorBackend>>> {
        self.backends.get(name).cloned()
    }

    /// Get default backend.
    pub fn default_backend(&self) -> Option<Arc<Mutex<dyn DetectorBackend>>> {
        self.default_name.as_ref().and_then(|name| self.get(name))
    }

    /// List registered backends in registration order.
    pub fn list(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Returns true when some registered backend supports the capability.
    pub fn supports(&self, capability: DetectionCapability) -> Result<bool> {
        for backend in self.ordered() {
            let guard = backend
                .lock()
                .map_err(|_| anyhow!("backend lock poisoned"))?;
            if guard.supports(capability) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Warm up every registered backend.
    pub fn warm_up_all(&self) -> Result<()> {
        for (name, backend) in self.order.iter().zip(self.ordered()) {
            let mut guard = backend
                .lock()
                .map_err(|_| anyhow!("backend lock poisoned"))?;
            guard
                .warm_up()
                .map_err(|e| anyhow!("backend '{}' warm-up failed: {}", name, e))?;
            log::debug!("detector backend {} warmed up", name);
        }
        Ok(())
    }

    /// Run every registered backend on the frame and concatenate their detections.
    ///
    /// This is how a normal-vehicle model and an emergency model feed one session.
    pub fn detect_all(
        &self,
        frame: &DetectionFrame,
        confidence_threshold: f32,
    ) -> Result<Vec<Detection>> {
        if self.order.is_empty() {
            return Err(anyhow!("no detector backend registered"));
        }
        let mut merged = Vec::new();
        for (name, backend) in self.order.iter().zip(self.ordered()) {
            let mut guard = backend
                .lock()
                .map_err(|_| anyhow!("backend lock poisoned"))?;
            let detections = guard
                .detect(frame, confidence_threshold)
                .map_err(|e| anyhow!("backend '{}' failed on frame {}: {}", name, frame.index, e))?;
            merged.extend(detections);
        }
        Ok(merged)
    }

    fn ordered(&self) -> impl Iterator<Item = &Arc<Mutex<dyn DetectorBackend>>> + '_ {
        self.order.iter().filter_map(|name| self.backends.get(name))
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}
