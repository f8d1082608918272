//! Transaction lifecycle control.
//!
//! - `flags`: the abstract intent vocabulary (isolation, access mode, snapshot, chaining)
//! - `state`: what a connection believes about its open transaction
//! - `controller`: renders intents into dialect SQL and keeps the state honest

pub mod controller;
pub mod flags;
pub mod state;

pub use controller::{PlanOutcome, PlannedStatement, StateEffect, TransactionController, TransactionPlan};
pub use flags::{BeginIntent, IsolationLevel, TransactionFlags, decode_chain};
pub use state::TransactionState;
