// ABOUTME: Configuration module for the authorization server
// ABOUTME: Environment-driven settings with protocol defaults
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

pub mod environment;

pub use environment::{RateLimitConfig, ServerConfig};
