// SPDX-License-Identifier: MIT

pub mod search;
