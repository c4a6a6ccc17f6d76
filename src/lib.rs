// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(warnings)]                    // All warnings are treated as errors
#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Stackforge
//!
//! A CD friendly deployment engine for `CloudFormation` stacks.
//!
//! ## Overview
//!
//! Stackforge drives one stack through its lifecycle and streams what the
//! remote service does while it happens:
//!
//! - Create a stack, or update it when it already exists
//! - Merge parameter documents with command-line overrides
//! - Carry tags forward and raise termination protection
//! - Propagate a stack policy to every nested stack
//! - Follow the stack to completion, printing each new event
//! - Rotate assumed-role credentials when they expire mid-deployment
//!
//! ## Modules
//!
//! - [`config`]: Tag and parameter documents, `{{ env }}` templating, endpoints
//! - [`cloud`]: Service traits and their AWS SDK implementations
//! - [`auth`]: Role assumption and credential rotation
//! - [`stack`]: Deploy, destroy, events, stack policy and the poll loop
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! # parameters.yaml
//! Environment: prod
//! Subnets:
//!   - subnet-0a1b
//!   - subnet-2c3d
//! ImageTag: '{{ env "IMAGE_TAG" }}'
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod auth;
pub mod cli;
pub mod cloud;
pub mod config;
pub mod error;
pub mod stack;

// ============================================================================
// Re-exports
// ============================================================================

pub use auth::Session;
pub use cli::{Cli, Commands, OutputFormatter};
pub use cloud::{AwsClientFactory, ClientFactory, Clients, StackEvent, StackInfo, TemplateSource};
pub use config::DocumentParser;
pub use error::{Result, StackforgeError};
pub use stack::{DeployOutcome, Stack, StackOperation, StackWatcher};
