// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Test harness for the form gateway.
//!
//! Provides a mock form API, gateway builders, request generators and
//! attack simulation utilities.

#![allow(dead_code)]

pub mod attacks;
pub mod gateway;
pub mod generators;
pub mod metrics;
