//! Coloured Petri net marking and firing engine.
pub mod config;
pub mod net;
pub mod options;
pub mod report;
