// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

pub const CRATE_NAME: &str = "custodian-git";

mod repo;
mod revision;

pub use repo::{GitRepo, GitSettings};
pub use revision::RevisionTree;
