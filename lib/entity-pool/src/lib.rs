//! An object-reuse pool for asynchronously instantiated entities.
//!
//! Entities are created from templates by an external, asynchronous loader, and creating one is expensive enough
//! that instances should be reused rather than re-created. This crate provides the pooling engine around that
//! loader: per-kind registries of live entities, an acquire/release state machine, coordination of outstanding
//! instantiations, and a delayed reclaimer that destroys over-capacity entities a grace period after they are
//! released.
//!
//! The main entry point is [`EntityPool`][pool::EntityPool], configured with one
//! [`KindConfig`][config::KindConfig] per supported template. Callers acquire entities through the pool and release
//! them through the entity itself ([`PooledEntity::release`][instance::PooledEntity::release]); the loader seam is
//! the [`EntityLoader`][loader::EntityLoader] trait.
#![deny(warnings)]
#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod instance;
pub mod loader;
pub mod pool;

mod reclaimer;
mod registry;
