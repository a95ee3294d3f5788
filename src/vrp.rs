//! VRP data model and the aggregation logic that turns a flat VRP set into
//! per-address-family and per-origin policy material.

pub mod aggregate;
pub mod model;

pub use aggregate::{minimal_cover, FilterEntry, PrefixRule};
pub use model::{Afi, Asn, Vrp, VrpSet};
