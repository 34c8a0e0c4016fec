//! The fetchers: one per kind of EC2 resource.
//!
//! A fetcher queries the API once, then updates its metric families. It never retries:
//! an API error is returned to the caller, which decides what to do with it.

pub mod instances;
pub mod reservations;
pub mod spots;

pub use instances::InstanceFetcher;
pub use reservations::ReservationFetcher;
pub use spots::SpotFetcher;
