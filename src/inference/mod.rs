pub mod gate;
pub mod runner;

pub use gate::{GateDecision, GateOutcome, GateStats, InferenceGate, RejectReason};
pub use runner::{OrtSignRunner, SequenceModel};
