//! Build orchestration
//!
//! One build is a strict waterfall:
//!
//! ```text
//! ┌────────┐   ┌─────────────┐   ┌──────────┐   ┌─────────────┐   ┌───────────┐
//! │ Reader │──▶│ pre-process │──▶│ Expander │──▶│ view stages │──▶│ Aggregate │
//! └────────┘   └─────────────┘   └──────────┘   └─────────────┘   └───────────┘
//!  all data      one wavefront     one copy       one wavefront
//!  types at      over flat         per view       over every
//!  once          collections                      view
//! ```
//!
//! Every build starts from a fresh tree; nothing carries over between builds.

use futures::future::try_join_all;
use std::sync::Arc;
use std::time::Instant;

use crate::aggregate::{BuildOutput, aggregate};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::expander;
use crate::plugin::ViewName;
use crate::reader;
use crate::scheduler::{CancelFlag, Lane, Scheduler};
use crate::state::{BuildState, SlotKey};

/// A resolved configuration, ready to build any number of times
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: Arc<Config>,
    scheduler: Scheduler,
}

impl Pipeline {
    /// Create a pipeline over a resolved configuration
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);
        let scheduler = Scheduler::new(Arc::clone(&config));
        Self { config, scheduler }
    }

    /// The configuration this pipeline runs
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Input patterns with the input root applied
    pub fn input_patterns(&self) -> Vec<String> {
        self.config.input_patterns()
    }

    /// Run one complete build.
    pub async fn build(&self) -> Result<BuildOutput> {
        self.build_with(&CancelFlag::new()).await
    }

    /// Run one complete build that stops early once `cancel` is raised.
    ///
    /// The first plugin failure also raises `cancel`.
    pub async fn build_with(&self, cancel: &CancelFlag) -> Result<BuildOutput> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let started = Instant::now();
        tracing::info!(data_types = self.config.data_types.len(), "Starting build");

        let state = self.read_all().await?;
        let state = self.pre_process(state, cancel).await?;
        let (state, lanes) = self.expand(state);

        tracing::debug!(lanes = lanes.len(), "Running view pipelines");
        let state = self.scheduler.run(state, &lanes, cancel).await?;
        let output = aggregate(state, &self.config);

        tracing::info!(
            files = output.file_count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Build complete"
        );
        Ok(output)
    }

    /// Read every data type concurrently; the first failure wins.
    async fn read_all(&self) -> Result<BuildState> {
        let reads = self.config.data_types.iter().map(|(name, data_type)| {
            let pattern = data_type.resolved_pattern(&self.config.dirs);
            async move {
                let files = reader::read(&pattern).await?;
                tracing::debug!("Read {} file(s) for '{}' from {}", files.len(), name, pattern);
                Ok::<_, Error>((SlotKey::new(name.clone(), ViewName::Default), files))
            }
        });

        let mut state = BuildState::new();
        for (key, files) in try_join_all(reads).await? {
            state.insert(key, files);
        }
        Ok(state)
    }

    async fn pre_process(&self, state: BuildState, cancel: &CancelFlag) -> Result<BuildState> {
        let lanes: Vec<Lane> = self
            .config
            .data_types
            .iter()
            .filter(|(_, data_type)| !data_type.pre_process.is_empty())
            .map(|(name, data_type)| {
                Lane::new(
                    SlotKey::new(name.clone(), ViewName::Default),
                    data_type.pre_process.clone(),
                )
            })
            .collect();

        if lanes.is_empty() {
            return Ok(state);
        }
        tracing::debug!(lanes = lanes.len(), "Running pre-process pipelines");
        self.scheduler.run(state, &lanes, cancel).await
    }

    /// Replace each flat slot with one slot per view, and lay out the lanes
    /// that drive them.
    fn expand(&self, state: BuildState) -> (BuildState, Vec<Lane>) {
        let mut expanded = BuildState::new();
        let mut lanes = Vec::new();

        for (key, files) in state {
            let Some(data_type) = self.config.data_types.get(&key.data_type) else {
                continue;
            };
            for (view, files) in expander::expand(&data_type.output, files) {
                expanded.insert(SlotKey::new(key.data_type.clone(), view), files);
            }
            for (view, stages) in data_type.output.normalize() {
                lanes.push(Lane::new(SlotKey::new(key.data_type.clone(), view), stages));
            }
        }

        (expanded, lanes)
    }
}
