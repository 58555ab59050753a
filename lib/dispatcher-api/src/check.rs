//! Membership check routing

use dispatcher_core::{GroupId, SetRegistry};
use hyper::StatusCode;

pub const CHECK_PREFIX: &str = "/check/";

/// Parsed request path
#[derive(Debug, PartialEq, Eq)]
pub enum Route<'a> {
    Check { id: GroupId, address: &'a str },
    BadRequest,
    NotFound,
}

/// Match a request path.
///
/// Under `/check/` the remainder must be exactly `<set-id>/<address>` with a
/// numeric set id.
pub fn route(path: &str) -> Route<'_> {
    let Some(rest) = path.strip_prefix(CHECK_PREFIX) else {
        return Route::NotFound;
    };

    let mut pieces = rest.split('/');
    let (Some(id), Some(address), None) = (pieces.next(), pieces.next(), pieces.next()) else {
        return Route::BadRequest;
    };

    match id.parse() {
        Ok(id) => Route::Check { id, address },
        Err(_) => Route::BadRequest,
    }
}

/// Status answering a request for `path`
pub fn check_status(registry: &SetRegistry, path: &str) -> StatusCode {
    match route(path) {
        Route::Check { id, address } => match registry.is_member(id, address) {
            Some(true) => StatusCode::OK,
            Some(false) | None => StatusCode::NOT_FOUND,
        },
        Route::BadRequest => StatusCode::BAD_REQUEST,
        Route::NotFound => StatusCode::NOT_FOUND,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dispatcher_core::MemorySource;
    use std::sync::Arc;

    fn registry() -> SetRegistry {
        let mut registry = SetRegistry::new("/tmp/unused.list");
        registry
            .insert(Arc::new(MemorySource::new(1, vec!["10.0.0.1:5060".to_string()])))
            .unwrap();
        registry
    }

    #[test]
    fn test_route_check() {
        assert_eq!(
            route("/check/1/10.0.0.1:5060"),
            Route::Check {
                id: 1,
                address: "10.0.0.1:5060"
            }
        );
    }

    #[test]
    fn test_route_segment_count() {
        assert_eq!(route("/check/1"), Route::BadRequest);
        assert_eq!(route("/check/1/10.0.0.1/extra"), Route::BadRequest);
        assert_eq!(route("/check/"), Route::BadRequest);
    }

    #[test]
    fn test_route_non_numeric_id() {
        assert_eq!(route("/check/x/10.0.0.1:5060"), Route::BadRequest);
        assert_eq!(route("/check/-1/10.0.0.1:5060"), Route::BadRequest);
    }

    #[test]
    fn test_route_other_paths() {
        assert_eq!(route("/"), Route::NotFound);
        assert_eq!(route("/healthz"), Route::NotFound);
        assert_eq!(route("/check"), Route::NotFound);
    }

    #[test]
    fn test_check_status_scenario() {
        let registry = registry();
        assert_eq!(check_status(&registry, "/check/1/10.0.0.1:5060"), StatusCode::OK);
        assert_eq!(check_status(&registry, "/check/1/10.0.0.9:5060"), StatusCode::NOT_FOUND);
        assert_eq!(check_status(&registry, "/check/9/10.0.0.1:5060"), StatusCode::NOT_FOUND);
        assert_eq!(check_status(&registry, "/check/x/10.0.0.1:5060"), StatusCode::BAD_REQUEST);
        assert_eq!(check_status(&registry, "/other"), StatusCode::NOT_FOUND);
    }
}
