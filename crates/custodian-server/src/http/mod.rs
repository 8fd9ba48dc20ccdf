// SPDX-License-Identifier: Apache-2.0

pub(crate) mod handlers;
pub(crate) mod owners;
pub(crate) mod repositories;
pub(crate) mod services;
pub(crate) mod webhook;
