//! # Loomresearch: a durable, checkpointed autonomous research loop
//!
//! Loomresearch runs an iterative research session — plan, dispatch tools,
//! validate results, score quality, decide whether to keep going — as a
//! graph of small, deterministic nodes over versioned, channel-based state.
//! Every step can be checkpointed and resumed from durable storage.
//!
//! ## Core Concepts
//!
//! - **State**: [`state::ResearchState`] holds one independently-versioned
//!   [`channels::Channel`] per data family (findings, sources, tool history,
//!   quality, saturation, gaps, budget, stop decision, final answer,
//!   strategy context, errors).
//! - **Nodes**: [`node::Node`] is a pure `(snapshot, ctx) -> NodePartial`
//!   step; the canonical cycle is `Intake -> Plan -> Dispatch -> Validate ->
//!   Score -> Arbitrate -> {Plan | Synthesize | Abort}` ([`nodes`]).
//! - **Graph**: [`graphs::GraphBuilder`] wires nodes and conditional edges
//!   into a compiled [`app::App`].
//! - **Scheduler**: [`schedulers::Scheduler`] runs a superstep's frontier
//!   concurrently; [`app::App::apply_barrier`] folds the results
//!   deterministically and reducers in [`reducers`] apply them to state.
//! - **Runtime**: [`runtimes::AppRunner`] drives steps, autosaves via a
//!   [`runtimes::Checkpointer`], and [`runtimes::session`] exposes the
//!   session-lifecycle verbs (create/pause/resume/cancel/stream) on top of it.
//! - **Collaborators**: tool execution ([`tool::ToolExecutor`]), permissions
//!   ([`tool::PermissionGate`]), and model inference
//!   ([`model::ModelCoordinator`]) are all injected traits — this crate
//!   never hard-codes a concrete backend for any of them.
//!
//! ## Quick Start
//!
//! ### Building a node
//!
//! ```
//! use loomresearch::{
//!     finding::Finding,
//!     node::{Node, NodeContext, NodeError, NodePartial},
//!     state::ResearchStateSnapshot,
//! };
//! use async_trait::async_trait;
//!
//! struct EchoFinding;
//!
//! #[async_trait]
//! impl Node for EchoFinding {
//!     async fn run(
//!         &self,
//!         snapshot: ResearchStateSnapshot,
//!         ctx: NodeContext,
//!     ) -> Result<NodePartial, NodeError> {
//!         ctx.emit("echo", "recording a finding")?;
//!         let finding = Finding::new("f-1", snapshot.query.clone(), "echo", snapshot.iteration);
//!         Ok(NodePartial::new().with_findings(vec![finding]))
//!     }
//! }
//! ```
//!
//! ### Starting a session
//!
//! ```
//! use loomresearch::config::ResearchConfig;
//! use loomresearch::state::ResearchState;
//!
//! let config = ResearchConfig::default();
//! let state = ResearchState::new("session-1", "What is the Rust borrow checker?", &config);
//! assert_eq!(state.iteration, 1);
//! assert_eq!(state.thread_id, "session-1");
//! ```
//!
//! ## Module Guide
//!
//! - [`state`] / [`channels`] — versioned state and its channel storage
//! - [`node`] — the `Node` trait and the `NodePartial` update it returns
//! - [`nodes`] — the concrete Intake/Plan/Dispatch/Validate/Score/Arbitrate/
//!   Synthesize/Abort steps
//! - [`graphs`] — graph construction and compilation
//! - [`schedulers`] — concurrent superstep execution
//! - [`app`] — the compiled graph and its deterministic barrier merge
//! - [`reducers`] — per-channel merge strategies
//! - [`runtimes`] — checkpointing, persistence, the step-wise runner, and the
//!   session manager
//! - [`tool`] — the tool-dispatch collaborator traits
//! - [`model`] — the model-coordinator collaborator trait and consultation
//!   tiers
//! - [`budget`] / [`finding`] / [`gap`] / [`quality`] / [`source`] /
//!   [`stop`] / [`strategy`] / [`control`] / [`config`] — core domain value
//!   types shared across nodes
//! - [`event_bus`] — the event/diagnostic/streaming bus nodes emit through
//! - [`telemetry`] — structured log formatting

pub mod app;
pub mod budget;
pub mod channels;
pub mod config;
pub mod control;
pub mod event_bus;
pub mod finding;
pub mod gap;
pub mod graphs;
pub mod message;
pub mod model;
pub mod node;
pub mod nodes;
pub mod quality;
pub mod reducers;
pub mod runtimes;
pub mod schedulers;
pub mod source;
pub mod state;
pub mod stop;
pub mod strategy;
pub mod telemetry;
pub mod tool;
pub mod types;
pub mod utils;
