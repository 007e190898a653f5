//! Device-side OTA update agent core.
//!
//! The library half of the `ota-client` daemon:
//!   - `api`        — transport seam (`ApiRequester`) and deployment API URLs
//!   - `device`     — installed-software identity sent with every update check
//!   - `update`     — update-check negotiation, response decoding, artifact fetch
//!   - `controlmap` — strict types for the optional update control map
//!   - `sink`       — byte-budgeted write destination for artifact downloads
//!   - `config`     — flat key=value agent configuration
//!
//! The daemon (`main.rs`) wires these into a periodic check/fetch loop.

#![allow(async_fn_in_trait)]

pub mod api;
pub mod config;
pub mod controlmap;
pub mod device;
pub mod error;
pub mod sink;
pub mod update;
