//! Common types shared among the igniter crates.
//!
//! Most users will have no reason to depend on this crate directly, as it is re-exported by
//! `igniter-node`.
#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs, missing_copy_implementations)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod config;
pub mod constants;
pub mod nmt;
pub mod node_id;
pub mod objects;

pub use config::{NodeConfig, ProtocolParams};
pub use nmt::{NmtControl, NmtState, ResetOutcome};
pub use node_id::NodeId;
pub use objects::AbortCode;
