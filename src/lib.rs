//! Demo HTTP server comparing two request-execution strategies: a bounded
//! pool of OS threads (the default) and one lightweight task per request
//! (activated by the `virtual-threads` profile). The single endpoint,
//! `GET /hello`, sleeps for one second on a worker of the active strategy
//! and answers `Hello world`.

pub mod client;
pub mod executor;
pub mod server;
pub mod service;
pub mod shutdown;
