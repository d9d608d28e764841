//! Promo Task Bot Library
//!
//! Core of a promotional Telegram bot that walks users through a fixed task
//! sequence and credits points for each step.
//!
//! This crate provides the core functionality for:
//! - Persisting user records behind a pluggable store
//! - Advancing the task state machine and crediting rewards
//! - Generating referral codes and resolving referrers
//! - Issuing and redeeming single-use article session codes
//! - Parsing console events and rendering replies

pub mod commands;
pub mod config;
pub mod flow;
pub mod ledger;
pub mod referral;
pub mod store;
