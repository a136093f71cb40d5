//! ## availsim-engine::builder
//! **Two-phase graph construction**
//!
//! Producers are registered into an arena and wired by reference. A node
//! may be declared first and bound to a producer later, which lets callers
//! wire edges before the producer exists. `add_duplicate` registers a fresh
//! copy of an existing producer under a new id.
//!
//! `create_simulation` freezes the topology, rejects cycles and calls
//! `Producer::initialize` on every node in dependency order.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use availsim_config::AvailsimConfig;
use availsim_core::prelude::*;
use availsim_telemetry::MetricsRecorder;
use tracing::{debug, info, instrument};

use crate::error::BuildError;
use crate::graph::Graph;
use crate::scheduler::Slot;
use crate::simulation::{Simulation, SimulationSettings};

static NEXT_BUILDER: AtomicU64 = AtomicU64::new(0);

/// Handle to a node registered with a [`GraphBuilder`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProducerRef {
    builder: u64,
    index: usize,
    id: ProducerId,
}

impl ProducerRef {
    pub fn id(&self) -> &ProducerId {
        &self.id
    }
}

struct Node {
    id: ProducerId,
    producer: Option<Box<dyn Producer>>,
    dependencies: Vec<usize>,
}

pub struct GraphBuilder {
    token: u64,
    random: RandomProvider,
    nodes: Vec<Node>,
    index: HashMap<ProducerId, usize>,
    config: Option<AvailsimConfig>,
}

impl GraphBuilder {
    pub fn new(random: RandomProvider) -> Self {
        Self {
            token: NEXT_BUILDER.fetch_add(1, Ordering::Relaxed),
            random,
            nodes: Vec::new(),
            index: HashMap::new(),
            config: None,
        }
    }

    /// Seeds the random provider from `config.engine.seed` and remembers the
    /// rest for [`GraphBuilder::create_configured_simulation`].
    pub fn from_config(config: &AvailsimConfig) -> Self {
        let mut builder = Self::new(RandomProvider::new(config.engine.seed));
        builder.config = Some(config.clone());
        builder
    }

    pub fn random_provider(&self) -> &RandomProvider {
        &self.random
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Registers `producer` under its own id.
    pub fn add_producer<P: Producer>(&mut self, producer: P) -> Result<ProducerRef, BuildError> {
        self.add_boxed(Box::new(producer))
    }

    pub fn add_boxed(&mut self, producer: Box<dyn Producer>) -> Result<ProducerRef, BuildError> {
        let id = ProducerId::new(producer.id());
        self.insert(id, Some(producer))
    }

    /// Reserves `id` for a producer bound later with [`GraphBuilder::bind`].
    pub fn declare(&mut self, id: impl Into<ProducerId>) -> Result<ProducerRef, BuildError> {
        self.insert(id.into(), None)
    }

    /// Fills a declared placeholder. The placeholder's id wins over `producer.id()`.
    pub fn bind<P: Producer>(&mut self, node: &ProducerRef, producer: P) -> Result<(), BuildError> {
        let index = self.resolve(node)?;
        let slot = &mut self.nodes[index];
        if slot.producer.is_some() {
            return Err(BuildError::AlreadyBound(slot.id.clone()));
        }
        slot.producer = Some(Box::new(producer));
        Ok(())
    }

    /// Registers a fresh copy of `source` under `id`: same configuration,
    /// reset runtime state, no dependencies, and its own random stream.
    pub fn add_duplicate(
        &mut self,
        source: &ProducerRef,
        id: impl Into<ProducerId>,
    ) -> Result<ProducerRef, BuildError> {
        let index = self.resolve(source)?;
        let copy = match &self.nodes[index].producer {
            Some(producer) => producer.duplicate(),
            None => return Err(BuildError::Unbound(source.id.clone())),
        };
        self.insert(id.into(), Some(copy))
    }

    /// Makes `dependent` read the state of `dependency`.
    pub fn add_dependency(
        &mut self,
        dependent: &ProducerRef,
        dependency: &ProducerRef,
    ) -> Result<&mut Self, BuildError> {
        let dependent = self.resolve(dependent)?;
        let dependency = self.resolve(dependency)?;
        self.nodes[dependent].dependencies.push(dependency);
        Ok(self)
    }

    pub fn add_dependency_by_id(
        &mut self,
        dependent: &str,
        dependency: &str,
    ) -> Result<&mut Self, BuildError> {
        let dependent = self.reference(dependent)?;
        let dependency = self.reference(dependency)?;
        self.add_dependency(&dependent, &dependency)
    }

    /// Reference to an already registered id.
    pub fn reference(&self, id: &str) -> Result<ProducerRef, BuildError> {
        let index = *self
            .index
            .get(id)
            .ok_or_else(|| BuildError::UnknownProducer(id.to_string()))?;
        Ok(ProducerRef {
            builder: self.token,
            index,
            id: self.nodes[index].id.clone(),
        })
    }

    /// Freezes the graph into a runnable simulation using `threads` workers.
    #[instrument(skip(self), fields(producers = self.nodes.len()))]
    pub fn create_simulation(self, threads: usize) -> Result<Simulation, BuildError> {
        let settings = SimulationSettings {
            threads,
            ..SimulationSettings::default()
        };
        self.build(settings)
    }

    /// Like [`GraphBuilder::create_simulation`], with threads, delivery
    /// buffering, horizon and metrics taken from the configuration given to
    /// [`GraphBuilder::from_config`]. Falls back to defaults without one.
    pub fn create_configured_simulation(mut self) -> Result<Simulation, BuildError> {
        let config = self.config.take().unwrap_or_default();
        let metrics = if config.telemetry.metrics_enabled {
            let recorder = MetricsRecorder::new().map_err(|e| BuildError::Metrics(e.to_string()))?;
            Some(Arc::new(recorder))
        } else {
            None
        };
        let settings = SimulationSettings {
            threads: config.engine.threads,
            delivery_buffer_capacity: config.engine.delivery_buffer_capacity,
            horizon: Some(config.engine.horizon),
            metrics,
        };
        self.build(settings)
    }

    fn build(self, settings: SimulationSettings) -> Result<Simulation, BuildError> {
        if settings.threads == 0 {
            return Err(BuildError::ZeroThreads);
        }
        if settings.delivery_buffer_capacity == 0 {
            return Err(BuildError::ZeroBufferCapacity);
        }

        let mut ids = Vec::with_capacity(self.nodes.len());
        let mut dependencies = Vec::with_capacity(self.nodes.len());
        let mut producers = Vec::with_capacity(self.nodes.len());
        for node in self.nodes {
            let producer = node.producer.ok_or_else(|| BuildError::Unbound(node.id.clone()))?;
            ids.push(node.id);
            dependencies.push(node.dependencies);
            producers.push(Some(producer));
        }

        let graph = Graph::new(ids, dependencies)?;

        let mut slots: Vec<Option<Slot>> = (0..graph.len()).map(|_| None).collect();
        for &node in graph.order() {
            let Some(mut producer) = producers[node].take() else {
                continue;
            };
            let id = graph.id(node);
            let dependency_ids: Vec<ProducerId> = graph
                .dependencies(node)
                .iter()
                .map(|&dep| graph.id(dep).clone())
                .collect();
            producer
                .initialize(&InitContext::new(id, &dependency_ids, &self.random))
                .map_err(|source| BuildError::Initialization {
                    producer: id.clone(),
                    source,
                })?;
            debug!(producer = %id, dependencies = dependency_ids.len(), "producer initialized");
            slots[node] = Some(Slot::new(producer));
        }
        let slots = slots.into_iter().flatten().collect();

        info!(
            producers = graph.len(),
            threads = settings.threads,
            seed = self.random.seed(),
            "simulation created"
        );
        Ok(Simulation::new(graph, slots, settings))
    }

    fn insert(
        &mut self,
        id: ProducerId,
        producer: Option<Box<dyn Producer>>,
    ) -> Result<ProducerRef, BuildError> {
        if self.index.contains_key(&id) {
            return Err(BuildError::DuplicateId(id));
        }
        let index = self.nodes.len();
        self.index.insert(id.clone(), index);
        self.nodes.push(Node {
            id: id.clone(),
            producer,
            dependencies: Vec::new(),
        });
        debug!(producer = %id, bound = self.nodes[index].producer.is_some(), "producer registered");
        Ok(ProducerRef {
            builder: self.token,
            index,
            id,
        })
    }

    fn resolve(&self, node: &ProducerRef) -> Result<usize, BuildError> {
        if node.builder != self.token {
            return Err(BuildError::ForeignReference(node.id.clone()));
        }
        Ok(node.index)
    }
}
