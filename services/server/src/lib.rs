// HTTP/WebSocket gateway for the ripple event streaming server.
//
// The binary in main.rs stays thin; router construction, configuration,
// and the transport adapter live here so integration tests can drive the
// full application without a process boundary.

pub mod api;
pub mod app;
pub mod config;
pub mod observability;
pub mod transport;
