/// Wire and domain vocabulary shared by the civitas crates.
///
/// `models` holds the closed sets (roles, statuses, routes) that both the
/// store and the HTTP layer agree on; `api` holds request/response bodies.
pub mod api;
pub mod models;
