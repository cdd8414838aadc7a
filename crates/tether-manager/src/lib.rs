/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! # Tether Manager
//!
//! Propagates resource changes to connected agents.
//!
//! Store writes become [`store::Updates`] batches, the [`bus`] coalesces
//! bursts of them, and the [`manager::Manager`] turns each batch into at most
//! one [`manager::AgentUpdates`] per connected agent and hands those to every
//! registered [`protocol::Protocol`].

pub mod bus;
pub mod cli;
pub mod clock;
pub mod health;
pub mod manager;
pub mod metrics;
pub mod protocol;
pub mod store;
pub mod versions;
