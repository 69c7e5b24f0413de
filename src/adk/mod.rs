// SPDX-License-Identifier: MIT

//! Agent development kit: model backends, agents, tools and errors

pub mod agent;
pub mod error;
pub mod model;
pub mod tool;
