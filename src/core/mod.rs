//! Core simulation types: particles, the rectangular domain, the contact
//! laws, and the fixed-step integrator that ties them together.

pub mod contact;
pub mod domain;
pub mod particle;
pub mod sim;

pub use contact::ContactLaw;
pub use domain::Domain;
pub use particle::Particle;
pub use sim::{Simulation, STANDARD_GRAVITY};
