//! The portable-layer vocabulary shared by every OSAL backend.
//!
//! This crate defines what crosses the boundary between the portable layer
//! and a per-platform backend:
//!
//!  - [`StatusCode`] and the per-operation error subsets derived from it
//!  - [`ObjectType`], [`ObjectId`] and [`ObjectToken`], which identify one
//!    slot of one object category
//!  - [`IdMap`], the fixed-capacity slot table that hands out tokens
//!  - [`Config`], the capacities of each object category
//!  - [`Timeout`] and the tick constants used to convert durations
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(rust_2018_idioms)]

mod config;
mod error;
mod idmap;
mod object;
mod time;

pub use self::{config::*, error::*, idmap::*, object::*, time::*};

/// The largest initial value accepted by counting semaphore creation.
pub const SEM_VALUE_MAX: u32 = 0x7fff_ffff;
