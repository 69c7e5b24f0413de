// SPDX-License-Identifier: MIT

//! The market research workflow and the surfaces that expose it

pub mod charts;
pub mod config;
pub mod history;
pub mod server;
pub mod tools;
pub mod workflow;
