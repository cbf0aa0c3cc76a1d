// SPDX-License-Identifier: MIT OR Apache-2.0

//! Selective-replication authorization gateway.
//!
//! `warden-gateway` fronts a replicating document store for a fleet of
//! partially-connected clients: offline devices holding a filtered subset of
//! the dataset and online clients which may see everything. Per request it
//! decides whether the call reaches the backing store unmodified, is filtered
//! on the way back, passes the audited write pipeline, or is rejected — while
//! preserving the store's replication semantics (ordered change feeds,
//! revision history, purge propagation) so offline replicas keep converging
//! under changing permissions.
//!
//! Request flow: [`session::SessionResolver`] → [`firewall::RouteTable`] →
//! direct proxy, stream filter, write pipeline or rejection. The
//! [`visibility::VisibilityResolver`] feeds both the stream filter and the
//! write pipeline; the purge log is written on visibility loss and read
//! through its own feed ([`purge::PurgeFeed`]).
pub mod config;
pub mod firewall;
pub mod gateway;
pub mod purge;
pub mod session;
pub mod visibility;
pub mod write;

pub use config::GatewayConfig;
pub use firewall::{EndpointClass, Method, RouteTable, RouteTableBuilder, RouteTableError, enforce};
pub use gateway::{Gateway, GatewayRequest, GatewayResponse, Operation};
pub use purge::PurgeFeed;
pub use session::SessionResolver;
pub use visibility::VisibilityResolver;
pub use write::{AuthorizedWrite, WritePipeline};
