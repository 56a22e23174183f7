// SPDX-License-Identifier: Apache-2.0
//! The Evidence Engine (spec §4.5): grant/transfer/verify/consume lifecycle
//! over TTL'd, gradeable, owned items.
//!
//! Grant computes `expires_at` from the grade's TTL; transfer requires
//! ownership, tradeability, and non-expiry in one atomic write; consume is
//! one-way. Built over one engine-over-`Storage`-plus-registry shape.

pub mod engine;

pub use engine::EvidenceEngine;
