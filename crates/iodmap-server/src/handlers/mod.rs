//! Map operation handlers
//!
//! Each handler takes its decoded request and a [`Responder`], does its
//! work against the store and the bulk engine, sends exactly one response
//! and only then releases what it acquired.
//!
//! [`Responder`]: crate::responder::Responder

mod close;
mod count;
mod create;
mod delete;
mod exists;
mod get;
mod open;
mod set;
