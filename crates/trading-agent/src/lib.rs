//! Round driver for the decision engine: state machine, kill switch,
//! claim verification, persistence and the collaborator adapters.

pub mod config;
pub mod engine;
pub mod gateway;
pub mod kill_switch;
pub mod metrics;
pub mod paper_broker;
pub mod pipeline;
pub mod state_machine;
pub mod store;
pub mod verifier;


pub use config::{AgentConfig, LoopTiming};
pub use engine::{shutdown_signal, DriverSettings, ExitReason, RoundDriver};
pub use gateway::GatewayClient;
pub use kill_switch::KillSwitch;
pub use metrics::{EngineMetrics, StageTimings};
pub use paper_broker::PaperBroker;
pub use pipeline::{Collaborators, PipelineSettings, RoundPipeline, RoundReport};
pub use state_machine::{EngineState, RoundStateMachine};
pub use store::RoundStore;
pub use verifier::EvidenceVerifier;
