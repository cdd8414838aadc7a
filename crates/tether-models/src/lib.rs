/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! # Tether Models
//!
//! Resource types shared by the Tether manager: agents, configurations, the
//! pipeline resources configurations are built from, and label selectors.

pub mod models;
