//! limsgate — LIMS flow integration library
//!
//! Client library and lightweight webhook gateway for integrating custom
//! workflow steps ("flows") with a remote Laboratory Information Management
//! System over its REST API. Provides an authenticated entity client
//! (fetch/add/update/remove, criteria search, attachments), a flow registry
//! that announces step definitions to the remote system, and an axum server
//! the remote system calls back into to execute steps.

pub mod client;
pub mod config;
pub mod entities;
pub mod flow;
pub mod instance;
pub mod logging;
pub mod server;

pub use client::{criteria, SlimsApi, SlimsError};
pub use config::{ConfigError, SlimsConfig};
pub use entities::{Attachment, Column, Record, SlimsEntity};
pub use flow::{FieldSpec, FlowRun, Status, Step, StepError};
pub use instance::Slims;
pub use server::{GatewayError, GatewayState};
