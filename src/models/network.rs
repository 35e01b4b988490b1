//! Network model and registry.
//!
//! A [`Network`] is the static set of elements for one scheduling run,
//! indexed by id. It is immutable once built; [`NetworkRegistry`] swaps
//! whole networks atomically when the infrastructure is reloaded.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use log::info;

use super::{NetworkElement, Train};
use crate::error::{Error, Result};

/// Index of an element inside a [`Network`].
pub type ElementIdx = usize;

/// Immutable, indexed set of network elements.
#[derive(Debug, Clone, Default)]
pub struct Network {
    elements: Vec<NetworkElement>,
    index: HashMap<String, ElementIdx>,
}

impl Network {
    /// Builds a network, rejecting duplicate ids and zero capacities.
    pub fn new(elements: Vec<NetworkElement>) -> Result<Self> {
        let mut index = HashMap::with_capacity(elements.len());
        for (idx, element) in elements.iter().enumerate() {
            if element.capacity == 0 {
                return Err(Error::InvalidInput(format!(
                    "element '{}' has zero capacity",
                    element.id
                )));
            }
            if index.insert(element.id.clone(), idx).is_some() {
                return Err(Error::InvalidInput(format!(
                    "duplicate element ID: {}",
                    element.id
                )));
            }
        }
        Ok(Self { elements, index })
    }

    /// Element at an index.
    #[inline]
    pub fn element(&self, idx: ElementIdx) -> &NetworkElement {
        &self.elements[idx]
    }

    /// Element by id.
    pub fn get(&self, id: &str) -> Option<&NetworkElement> {
        self.index.get(id).map(|&idx| &self.elements[idx])
    }

    /// Index of an element id.
    pub fn index_of(&self, id: &str) -> Option<ElementIdx> {
        self.index.get(id).copied()
    }

    /// Capacity of the element at an index.
    #[inline]
    pub fn capacity(&self, idx: ElementIdx) -> u32 {
        self.elements[idx].capacity
    }

    /// Capacity of an element by id.
    pub fn capacity_of(&self, id: &str) -> Option<u32> {
        self.get(id).map(|e| e.capacity)
    }

    pub fn elements(&self) -> &[NetworkElement] {
        &self.elements
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Resolves a train's route to element indices.
    ///
    /// Fails with [`Error::InvalidRoute`] naming the first unknown element.
    pub fn resolve_route(&self, train: &Train) -> Result<Vec<ElementIdx>> {
        train
            .route
            .iter()
            .map(|id| {
                self.index_of(id).ok_or_else(|| Error::InvalidRoute {
                    train_id: train.id.clone(),
                    element_id: id.clone(),
                })
            })
            .collect()
    }

    /// Checks that every route element exists.
    pub fn validate_route(&self, train: &Train) -> Result<()> {
        self.resolve_route(train).map(|_| ())
    }
}

/// Holder of the currently loaded network.
///
/// Readers take an `Arc` snapshot and keep it for the whole scheduling
/// run; a reload replaces the snapshot without disturbing running solves.
#[derive(Debug, Default)]
pub struct NetworkRegistry {
    current: RwLock<Arc<Network>>,
}

impl NetworkRegistry {
    pub fn new(network: Network) -> Self {
        Self {
            current: RwLock::new(Arc::new(network)),
        }
    }

    /// Snapshot of the loaded network.
    pub fn current(&self) -> Arc<Network> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replaces the loaded network, returning the previous one.
    pub fn reload(&self, network: Network) -> Arc<Network> {
        let next = Arc::new(network);
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        info!("network reloaded: {} elements", next.len());
        std::mem::replace(&mut *guard, next)
    }
}
