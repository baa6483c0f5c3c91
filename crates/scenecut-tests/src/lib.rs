//! Integration test crate for scenecut.
//!
//! This crate exists solely to hold cross-crate integration tests.
//! It drives synthetic frame sources through the scene manager the way a
//! decoder-backed application would.

#[cfg(test)]
mod support;

#[cfg(test)]
mod pipeline;

#[cfg(test)]
mod cache;

#[cfg(test)]
mod prefetch;
