//! # bazel-source-finder
//!
//! Maps classes compiled by Bazel back to the source files they came from.
//!
//! ## Architecture
//!
//! - **classfile**: class file header parsing (names, supertypes, methods)
//! - **builder**: parallel indexing of compiled jars into a metadata registry
//! - **metadata**: the per-class records and their JSON document
//! - **discover**: build output walk pairing compiled jars with source jars
//! - **resolver**: classpath resolvers, fallback and version keyed caching
//! - **bazel**: output path conventions (source jars, workspace sources)
//! - **locator**: finding a class's source entry inside a source jar
//! - **declaration**: regex declaration probe and doc comments
//! - **tempfiles**: session temp files for sources extracted from jars
//! - **navigate**: definition and documentation lookups across the classpath

pub mod archive;
pub mod bazel;
pub mod builder;
pub mod classfile;
pub mod classpath;
pub mod cli;
pub mod config;
pub mod declaration;
pub mod discover;
pub mod error;
pub mod locator;
pub mod logging;
pub mod metadata;
pub mod navigate;
pub mod resolver;
pub mod tempfiles;
