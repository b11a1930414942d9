pub mod analysis;
pub mod cli;
pub mod config;
pub mod dynamics;
pub mod initial_conditions;
pub mod output;
pub mod plotting;
pub mod scan;
pub mod simulation;
pub mod solver;
pub mod state;
