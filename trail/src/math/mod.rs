//! Geodesy and walking-time models.
//!
//! All functions here are pure.

mod haversine;
mod radius;
mod tobler;

pub use self::{
    haversine::haversine_distance,
    radius::{earth_radius, RADIUS_EQUATOR, RADIUS_POLE},
    tobler::hiking_time,
};
