#![deny(unsafe_code)]

//! The download creation pipeline.
//!
//! A [`DownloadFactory`] turns a URI or an already-retrieved metadata blob
//! into a fully initialized, registered, running download. Creation is a
//! rendezvous of two independently-completing phases, "loaded" (the source
//! resolved) and "committed" (the caller declared intent to finalize),
//! scheduled on the global task queue. Whichever completes second drives
//! the merge-and-initialize pipeline, and any failure along the way
//! collapses into a single outcome notification.

mod factory;
mod initialize;
mod resolver;

pub use factory::DownloadFactory;
