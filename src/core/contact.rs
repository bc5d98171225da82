use crate::error::{Error, Result};

/// Contact-force law for a simulation run.
///
/// The law is a configuration-time choice bound to the [`Domain`]: one law
/// drives both particle-wall and particle-particle contact for the whole
/// run. The penalty laws (`Hookean`, `Hertzian`) produce a repulsive force
/// while bodies overlap; `Reflective` instead resolves contacts with a hard
/// position/velocity correction and contributes no force.
///
/// [`Domain`]: crate::core::Domain
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ContactLaw {
    /// Perfectly elastic, instantaneous bounce. At a wall the position is
    /// snapped to the contact plane and the normal velocity component is
    /// pointed back into the domain; between particles an elastic
    /// hard-sphere impulse is exchanged. No energy loss.
    Reflective,
    /// Linear penalty spring, F = k * delta while overlapping. Overlap is
    /// not removed within one step; the restoring force resolves it over
    /// subsequent steps.
    Hookean {
        /// Spring constant k (finite, > 0).
        stiffness: f64,
    },
    /// Hertzian soft contact, F = (4/3) * E_eff * sqrt(R_eff) * delta^{3/2},
    /// with the effective modulus from the standard Hertz combination rule
    /// and the effective radius from the contact geometry. Models
    /// material-stiffness-dependent soft contact.
    Hertzian {
        /// Young's modulus E of the material (finite, > 0).
        young_modulus: f64,
        /// Poisson ratio nu of the material (finite, in (-1, 0.5]).
        poisson_ratio: f64,
    },
}

impl ContactLaw {
    /// Validate the law's parameters. Called by `Domain::new`.
    pub(crate) fn validate(&self) -> Result<()> {
        match *self {
            ContactLaw::Reflective => Ok(()),
            ContactLaw::Hookean { stiffness } => {
                if !stiffness.is_finite() || stiffness <= 0.0 {
                    return Err(Error::InvalidParam(
                        "spring stiffness must be finite and > 0".into(),
                    ));
                }
                Ok(())
            }
            ContactLaw::Hertzian {
                young_modulus,
                poisson_ratio,
            } => {
                if !young_modulus.is_finite() || young_modulus <= 0.0 {
                    return Err(Error::InvalidParam(
                        "Young's modulus must be finite and > 0".into(),
                    ));
                }
                if !poisson_ratio.is_finite() || poisson_ratio <= -1.0 || poisson_ratio > 0.5 {
                    return Err(Error::InvalidParam(
                        "Poisson ratio must be finite and in (-1, 0.5]".into(),
                    ));
                }
                Ok(())
            }
        }
    }

    /// True when contacts are resolved by hard position/velocity correction
    /// instead of a continuous penalty force.
    #[inline]
    pub fn is_reflective(&self) -> bool {
        matches!(self, ContactLaw::Reflective)
    }

    /// Normal force magnitude for a particle-wall contact with penetration
    /// `delta`. Zero for `delta <= 0` (contacts never attract) and for the
    /// reflective law. The wall is treated as a rigid plane, so the Hertz
    /// effective modulus reduces to E / (1 - nu^2) and the effective radius
    /// is the particle's own.
    pub fn wall_force(&self, delta: f64, radius: f64) -> f64 {
        if delta <= 0.0 {
            return 0.0;
        }
        match *self {
            ContactLaw::Reflective => 0.0,
            ContactLaw::Hookean { stiffness } => stiffness * delta,
            ContactLaw::Hertzian {
                young_modulus,
                poisson_ratio,
            } => {
                let e_eff = young_modulus / (1.0 - poisson_ratio * poisson_ratio);
                hertz_force(e_eff, radius, delta)
            }
        }
    }

    /// Normal force magnitude for a particle-particle contact with
    /// penetration `delta`. Zero for `delta <= 0` and for the reflective
    /// law. Both bodies share the configured material, so the Hertz
    /// combination 1/E_eff = (1-nu^2)/E + (1-nu^2)/E applies, and
    /// 1/R_eff = 1/r_i + 1/r_j.
    pub fn pair_force(&self, delta: f64, radius_i: f64, radius_j: f64) -> f64 {
        if delta <= 0.0 {
            return 0.0;
        }
        match *self {
            ContactLaw::Reflective => 0.0,
            ContactLaw::Hookean { stiffness } => stiffness * delta,
            ContactLaw::Hertzian {
                young_modulus,
                poisson_ratio,
            } => {
                let e_eff = young_modulus / (2.0 * (1.0 - poisson_ratio * poisson_ratio));
                hertz_force(e_eff, effective_radius(radius_i, radius_j), delta)
            }
        }
    }
}

/// Hertz contact force: (4/3) * E_eff * sqrt(R_eff) * delta^{3/2}.
///
/// delta^{3/2} is computed as delta * sqrt(delta), which is exact for
/// delta = 0 and has no negative-exponent singularity as delta -> 0.
#[inline]
fn hertz_force(e_eff: f64, r_eff: f64, delta: f64) -> f64 {
    (4.0 / 3.0) * e_eff * r_eff.sqrt() * delta * delta.sqrt()
}

/// Effective contact radius of two spheres: 1/R_eff = 1/r_i + 1/r_j.
#[inline]
fn effective_radius(radius_i: f64, radius_j: f64) -> f64 {
    radius_i * radius_j / (radius_i + radius_j)
}
