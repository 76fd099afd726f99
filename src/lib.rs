// This is free and unencumbered software released into the public domain.

//! Camera capture and video preview pipeline for the aTalk client.
//!
//! The [`shared`] module holds the platform-independent core: camera stream
//! lifecycle and orientation ([`shared::CameraStreamBase`]), the CPU YUV path
//! ([`shared::PreviewStream`]), the GPU surface path
//! ([`shared::SurfaceStream`]) and the view/GL plumbing they depend on.
//! Platform services are reached through the traits in
//! [`shared::platform`]; bundled backends live under [`shared::drivers`].

extern crate alloc;

#[cfg(feature = "cli")]
pub mod cli;

pub mod shared;
