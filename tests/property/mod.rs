// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests Module
//!
//! This module contains property-based tests using proptest to verify
//! invariants of the aggregates and the webhook signatures.

mod heartbeat;
mod sequence;
mod signature;
