//! Configuration module for Stackforge.
//!
//! This module handles everything the engine reads from documents and the
//! environment:
//! - Coercing decoded values into the flat strings the remote service expects
//! - Parsing tag and parameter documents, with `{{ env "NAME" }}` templating
//! - Endpoint overrides for each remote sub-service

mod coerce;
mod endpoints;
mod envsubst;
mod parser;

pub use coerce::{coerce_value, CoerceError, CoerceOptions};
pub use endpoints::{
    EndpointOverrides, CLOUDFORMATION_ENDPOINT_VAR, IAM_ENDPOINT_VAR, STS_ENDPOINT_VAR,
};
pub use envsubst::{expand_env, expand_with};
pub use parser::{
    load_document, load_dotenv, parse_parameter_overrides, parse_parameters, parse_tags,
    DocumentParser,
};
