#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

/// Tracing target for enforcement decisions.
pub const TRACING_TARGET_CASBIN: &str = "contrib_casbin::middleware";

mod enforcer;
mod error;
mod middleware;
mod username;

pub use casbin::{CoreApi, Enforcer, MgmtApi};

pub use crate::enforcer::{Casbin, UsernameExtractor};
pub use crate::error::{CasbinError, CasbinResult};
pub use crate::middleware::{RouterCasbinExt, enforce};
pub use crate::username::{Username, set_username, username};
