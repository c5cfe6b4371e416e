//! Library surface so integration tests (and the binary in `main.rs`) can
//! build a router and drive it with `tower::ServiceExt::oneshot` without a
//! bound socket.

pub mod infra;
pub mod middleware;
pub mod routes;
