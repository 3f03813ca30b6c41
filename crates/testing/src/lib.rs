// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Shared helpers for jobdispatch tests.

pub mod logging;
pub mod util;

pub use logging::init_tracing;
pub use util::wait::{wait_for, wait_for_condition, wait_for_value};
