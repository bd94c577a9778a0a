// ABOUTME: Credential lifecycle layer over the persistence store
// ABOUTME: Creation, hashing, validation, expiry, revocation, rotation, pruning
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

pub mod auth_codes;
pub mod clients;
pub mod secrets;
pub mod tokens;

pub use auth_codes::{AuthCodeManager, AuthCodeParams};
pub use clients::{ClientManager, CreateClientInput};
pub use secrets::{generate_secret, hash_secret, verify_secret};
pub use tokens::{TokenManager, TokenParams};
