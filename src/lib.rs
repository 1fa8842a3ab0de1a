// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
signatures_and_slots maps shader-visible resources onto native binding
slots.

You describe what a set of shaders can see — constant buffers, texture and
buffer views, samplers, acceleration structures, each with a variable class
and stage visibility — and the crate turns that description into a
[`Signature`](signature::Signature): a validated, sorted, hashed layout of
root parameters and descriptor-table slots.  From a signature you mint
[`BindingContext`](binding::BindingContext)s, bind actual device objects
into them, and drive transition, validation and commit against a backend's
command context.

The crate never talks to a GPU itself.  Everything device-shaped enters
through the [`backend`] traits; the built-in
[`headless`](backend::headless) backend runs the whole model in software
and is what the tests and doc examples use.

The division of labor:

- [`signature::descriptor`] — the vocabulary for describing resources;
- [`signature`] — validation, sorting, hashing, compatibility;
- [`layout`] — assignment of every resource to a root view or a
  descriptor-table slot;
- [`cache`] — the CPU-side shadow of the descriptor tables;
- [`binding`] — binding, static initialization, transitions, commit.
*/

pub mod backend;
pub mod binding;
pub mod cache;
pub mod layout;
pub mod signature;

pub use binding::{BindFlags, BindingContext, ResourceMapping, TransitionMode};
pub use signature::{Signature, SignatureError};
