//! Membership query service
//!
//! Answers `GET /check/<set-id>/<address>` with 200 when the address is a
//! current member of the set, 404 when it is not (or the set is unknown) and
//! 400 for malformed requests.
pub mod check;
pub mod server;

pub use check::{check_status, route, Route};
pub use server::serve;
