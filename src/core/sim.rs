use crate::core::contact::ContactLaw;
use crate::core::domain::Domain;
use crate::core::particle::{Particle, DIM};
use crate::error::{Error, Result};
use log::{debug, trace};
use rand::{rng, rngs::StdRng, Rng, SeedableRng};

/// Standard gravitational acceleration, used by [`Simulation::new`].
pub const STANDARD_GRAVITY: f64 = 9.81;

/// Center distances below this have no meaningful contact direction.
const EPS_DISTANCE: f64 = 1e-12;

/// Fallback contact normal for coincident particle centers.
const DEGENERATE_NORMAL: [f64; DIM] = [1.0, 0.0];

/// Fixed-step particle simulation in a rectangular domain.
///
/// Owns its particles, the [`Domain`], and the run configuration (timestep,
/// gravity). [`step`] advances the system by exactly one timestep and
/// returns the updated positions in construction order; consumers (a
/// renderer, a validation loop) call it once per frame and read positions
/// back.
///
/// Identical construction yields bit-identical trajectories: there is no
/// randomness and no wall-clock dependence in the step path. The timestep is
/// fixed for the simulation's lifetime; stability under a stiff law is the
/// caller's responsibility when choosing it (too large a step makes
/// positions diverge rather than fail).
///
/// [`step`]: Simulation::step
#[derive(Debug, Clone)]
pub struct Simulation {
    particles: Vec<Particle>,
    domain: Domain,
    dt: f64,
    gravity: f64,
    time_now: f64,
}

impl Simulation {
    /// Create a simulation under standard gravity (9.81).
    ///
    /// An empty particle set is legal; `step()` then returns an empty
    /// vector. Errors on a non-positive or non-finite timestep.
    pub fn new(particles: Vec<Particle>, domain: Domain, dt: f64) -> Result<Self> {
        Self::with_gravity(particles, domain, dt, STANDARD_GRAVITY)
    }

    /// Create a simulation with an explicit gravitational acceleration.
    ///
    /// `gravity` acts along -y; pass 0.0 for a gravity-free run.
    pub fn with_gravity(
        particles: Vec<Particle>,
        domain: Domain,
        dt: f64,
        gravity: f64,
    ) -> Result<Self> {
        if !dt.is_finite() || dt <= 0.0 {
            return Err(Error::InvalidParam("timestep must be finite and > 0".into()));
        }
        if !gravity.is_finite() {
            return Err(Error::InvalidParam("gravity must be finite".into()));
        }
        debug!(
            "new simulation: {} particle(s), {}x{} domain, {:?}, dt={}",
            particles.len(),
            domain.width(),
            domain.height(),
            domain.law(),
            dt
        );
        Ok(Self {
            particles,
            domain,
            dt,
            gravity,
            time_now: 0.0,
        })
    }

    /// Create a simulation with `num_particles` identical particles placed
    /// at random non-overlapping positions, under standard gravity.
    ///
    /// Positions are rejection-sampled within `[radius, L - radius]` per
    /// axis; initial velocities are uniform in [-1, 1] per component. Pass a
    /// `seed` for reproducible placement, `None` to seed from entropy.
    ///
    /// Errors on invalid parameters, on a domain shorter than `2 * radius`
    /// along either axis, or if non-overlapping placement fails after a
    /// bounded number of attempts.
    pub fn with_random_particles(
        num_particles: usize,
        domain: Domain,
        dt: f64,
        radius: f64,
        mass: f64,
        seed: Option<u64>,
    ) -> Result<Self> {
        if num_particles == 0 {
            return Err(Error::InvalidParam("num_particles must be > 0".into()));
        }
        if !radius.is_finite() || radius <= 0.0 {
            return Err(Error::InvalidParam("radius must be finite and > 0".into()));
        }
        if !mass.is_finite() || mass <= 0.0 {
            return Err(Error::InvalidParam("mass must be finite and > 0".into()));
        }
        let size = domain.size();
        for &l in &size {
            if l < 2.0 * radius {
                return Err(Error::InvalidParam(
                    "domain must be at least 2 * radius along every axis for placement".into(),
                ));
            }
        }

        let mut rng: StdRng = match seed {
            Some(s) => SeedableRng::seed_from_u64(s),
            None => SeedableRng::seed_from_u64(rng().random()),
        };

        // Rejection sample non-overlapping initial positions.
        let mut particles: Vec<Particle> = Vec::with_capacity(num_particles);
        let max_attempts = 1_000_000usize;
        for n in 0..num_particles {
            let mut attempts = 0usize;
            let r = loop {
                if attempts >= max_attempts {
                    return Err(Error::InvalidParam(format!(
                        "failed to place particle {} without overlap; try fewer particles or a smaller radius",
                        n
                    )));
                }
                attempts += 1;
                let mut r = [0.0_f64; DIM];
                for (k, r_k) in r.iter_mut().enumerate() {
                    *r_k = rng.random_range(radius..=size[k] - radius);
                }
                if !overlaps_existing(&particles, &r, radius) {
                    break r;
                }
            };

            let mut v = [0.0_f64; DIM];
            v.iter_mut().for_each(|x| *x = rng.random_range(-1.0..=1.0));

            particles.push(Particle::new(r, v, radius, mass)?);
        }

        Self::with_gravity(particles, domain, dt, STANDARD_GRAVITY)
    }

    /// Returns current simulation time.
    #[inline]
    pub fn time(&self) -> f64 {
        self.time_now
    }

    /// The configured timestep.
    #[inline]
    pub fn timestep(&self) -> f64 {
        self.dt
    }

    /// Number of particles.
    #[inline]
    pub fn num_particles(&self) -> usize {
        self.particles.len()
    }

    /// The particles, in construction order. Renderers read radius and
    /// position from here to place drawable shapes.
    #[inline]
    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    /// The domain. Renderers read width/height from here to size a surface.
    #[inline]
    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    /// Box width, forwarded from the domain.
    #[inline]
    pub fn width(&self) -> f64 {
        self.domain.width()
    }

    /// Box height, forwarded from the domain.
    #[inline]
    pub fn height(&self) -> f64 {
        self.domain.height()
    }

    /// Positions as a Vec of fixed-size arrays, in construction order.
    pub fn positions(&self) -> Vec<[f64; DIM]> {
        self.particles.iter().map(|p| p.r).collect()
    }

    /// Velocities as a Vec of fixed-size arrays, in construction order.
    pub fn velocities(&self) -> Vec<[f64; DIM]> {
        self.particles.iter().map(|p| p.v).collect()
    }

    /// Compute total kinetic energy (diagnostic).
    pub fn kinetic_energy(&self) -> f64 {
        self.particles.iter().map(|p| p.kinetic_energy()).sum()
    }

    /// Advance the system by one fixed timestep and return the updated
    /// positions, in construction order.
    ///
    /// One step is: accumulate net force per particle (gravity, wall
    /// penalty, pairwise penalty), integrate velocity from the net force and
    /// position from the new velocity (symplectic Euler), then, under the
    /// reflective law, apply the hard boundary and pair corrections.
    pub fn step(&mut self) -> Vec<[f64; DIM]> {
        let law = self.domain.law();

        // Gravity acts along -y on every particle.
        let mut forces = vec![[0.0_f64; DIM]; self.particles.len()];
        for (p, f) in self.particles.iter().zip(forces.iter_mut()) {
            f[1] = -p.mass * self.gravity;
        }

        if !law.is_reflective() {
            self.accumulate_wall_forces(law, &mut forces);
            self.accumulate_pair_forces(law, &mut forces);
        }

        // Symplectic Euler: velocity from the net force first, then position
        // from the new velocity.
        let dt = self.dt;
        for (p, f) in self.particles.iter_mut().zip(forces.iter()) {
            for k in 0..DIM {
                p.v[k] += f[k] / p.mass * dt;
                p.r[k] += p.v[k] * dt;
            }
        }

        if law.is_reflective() {
            self.reflect_walls();
            self.resolve_pair_impulses();
        }

        self.time_now += dt;
        trace!("stepped to t={}", self.time_now);
        self.positions()
    }

    // ============ Internal helpers ============

    /// Penalty forces from the four walls. Each axis and side contributes
    /// independently, so a particle wider than the box is pushed by both
    /// opposite walls at once.
    fn accumulate_wall_forces(&self, law: ContactLaw, forces: &mut [[f64; DIM]]) {
        let size = self.domain.size();
        for (p, f) in self.particles.iter().zip(forces.iter_mut()) {
            for k in 0..DIM {
                // Min wall at 0: penetration once r[k] - radius goes negative.
                let delta_min = p.radius - p.r[k];
                f[k] += law.wall_force(delta_min, p.radius);
                // Max wall at size[k], pushing the other way.
                let delta_max = p.r[k] + p.radius - size[k];
                f[k] -= law.wall_force(delta_max, p.radius);
            }
        }
    }

    /// Penalty forces for all overlapping pairs, equal and opposite along
    /// the contact normal (Newton's third law).
    fn accumulate_pair_forces(&self, law: ContactLaw, forces: &mut [[f64; DIM]]) {
        for (i, j) in overlapping_pairs(&self.particles) {
            let (pi, pj) = (&self.particles[i], &self.particles[j]);
            let (normal, dist) = contact_normal(pi.r, pj.r);
            let delta = pi.radius + pj.radius - dist;
            let magnitude = law.pair_force(delta, pi.radius, pj.radius);
            for k in 0..DIM {
                // `normal` points from i toward j; push i away from j.
                forces[i][k] -= magnitude * normal[k];
                forces[j][k] += magnitude * normal[k];
            }
        }
    }

    /// Hard boundary correction for the reflective law: snap the position to
    /// the contact plane and point the normal velocity component back into
    /// the domain.
    fn reflect_walls(&mut self) {
        let size = self.domain.size();
        for p in &mut self.particles {
            for k in 0..DIM {
                let lo = p.radius;
                let hi = size[k] - p.radius;
                if p.r[k] <= lo {
                    p.r[k] = lo;
                    p.v[k] = p.v[k].abs();
                } else if p.r[k] >= hi {
                    p.r[k] = hi;
                    p.v[k] = -p.v[k].abs();
                }
            }
        }
    }

    /// Elastic hard-sphere impulse exchange for overlapping, approaching
    /// pairs under the reflective law. Mass-weighted, equal and opposite;
    /// pairs already separating are left alone so each contact is resolved
    /// once.
    fn resolve_pair_impulses(&mut self) {
        for (i, j) in overlapping_pairs(&self.particles) {
            let (normal, _) = contact_normal(self.particles[i].r, self.particles[j].r);

            let mut u = [0.0_f64; DIM];
            for (k, u_k) in u.iter_mut().enumerate() {
                *u_k = self.particles[j].v[k] - self.particles[i].v[k];
            }
            let u_n = dot(&u, &normal);
            if u_n >= 0.0 {
                continue;
            }

            // Only the normal velocity component changes.
            let (mi, mj) = (self.particles[i].mass, self.particles[j].mass);
            let fi = (2.0 * mj / (mi + mj)) * u_n;
            let fj = (2.0 * mi / (mi + mj)) * u_n;
            for (k, &nk) in normal.iter().enumerate() {
                self.particles[i].v[k] += fi * nk;
                self.particles[j].v[k] -= fj * nk;
            }
        }
    }
}

// ============ Utility helpers ============

/// Broad phase: indices of every unordered particle pair whose circles
/// overlap.
///
/// A naive O(N^2) scan over all pairs; the force and impulse paths consume
/// only the returned pairs, so a spatial partition can replace this without
/// touching the physics.
fn overlapping_pairs(particles: &[Particle]) -> Vec<(usize, usize)> {
    let n = particles.len();
    let mut pairs = Vec::new();
    for i in 0..n {
        for j in (i + 1)..n {
            let r_sum = particles[i].radius + particles[j].radius;
            if dist_sq(particles[i].r, particles[j].r) < r_sum * r_sum {
                pairs.push((i, j));
            }
        }
    }
    pairs
}

/// Unit contact normal pointing from `from` toward `to`, and the center
/// distance.
///
/// Coincident centers have no contact direction; the +x axis is the
/// deterministic fallback so degenerate overlaps never produce NaN.
fn contact_normal(from: [f64; DIM], to: [f64; DIM]) -> ([f64; DIM], f64) {
    let mut d = [0.0_f64; DIM];
    for (k, d_k) in d.iter_mut().enumerate() {
        *d_k = to[k] - from[k];
    }
    let dist = dot(&d, &d).sqrt();
    if dist <= EPS_DISTANCE {
        return (DEGENERATE_NORMAL, dist);
    }
    for d_k in &mut d {
        *d_k /= dist;
    }
    (d, dist)
}

#[inline]
fn dot(a: &[f64; DIM], b: &[f64; DIM]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[inline]
fn dist_sq(a: [f64; DIM], b: [f64; DIM]) -> f64 {
    let mut acc = 0.0;
    for k in 0..DIM {
        let d = b[k] - a[k];
        acc += d * d;
    }
    acc
}

fn overlaps_existing(existing: &[Particle], r: &[f64; DIM], radius: f64) -> bool {
    let min_sq = (2.0 * radius) * (2.0 * radius);
    existing.iter().any(|p| dist_sq(p.r, *r) < min_sq)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reflective_domain() -> Result<Domain> {
        Domain::new(50.0, 30.0, ContactLaw::Reflective)
    }

    #[test]
    fn make_sim_ok() -> Result<()> {
        let p = Particle::new([25.0, 15.0], [1.0, 0.0], 1.0, 1.0)?;
        let mut sim = Simulation::new(vec![p], reflective_domain()?, 0.05)?;
        assert_eq!(sim.num_particles(), 1);
        assert_eq!(sim.width(), 50.0);
        assert_eq!(sim.height(), 30.0);
        assert_eq!(sim.timestep(), 0.05);
        assert!(sim.domain().law().is_reflective());
        let pos = sim.step();
        assert_eq!(pos.len(), 1);
        assert!((sim.time() - 0.05).abs() < 1e-15);
        Ok(())
    }

    #[test]
    fn invalid_timestep_rejected() -> Result<()> {
        let p = Particle::new([25.0, 15.0], [0.0, 0.0], 1.0, 1.0)?;
        assert!(Simulation::new(vec![p.clone()], reflective_domain()?, 0.0).is_err());
        assert!(Simulation::new(vec![p], reflective_domain()?, f64::NAN).is_err());
        Ok(())
    }

    #[test]
    fn non_finite_gravity_rejected() -> Result<()> {
        let p = Particle::new([25.0, 15.0], [0.0, 0.0], 1.0, 1.0)?;
        assert!(
            Simulation::with_gravity(vec![p], reflective_domain()?, 0.01, f64::INFINITY).is_err()
        );
        Ok(())
    }

    #[test]
    fn empty_system_steps_to_nothing() -> Result<()> {
        let mut sim = Simulation::new(Vec::new(), reflective_domain()?, 0.01)?;
        assert!(sim.step().is_empty());
        assert!((sim.time() - 0.01).abs() < 1e-15);
        Ok(())
    }

    #[test]
    fn free_fall_first_step() -> Result<()> {
        let g = 9.81;
        let dt = 0.01;
        let p = Particle::new([25.0, 15.0], [0.0, 0.0], 1.0, 2.0)?;
        let mut sim = Simulation::with_gravity(vec![p], reflective_domain()?, dt, g)?;
        let pos = sim.step();
        // v = -g*dt after the velocity update, then y += v*dt.
        assert!((sim.velocities()[0][1] + g * dt).abs() < 1e-15);
        assert!((pos[0][1] - (15.0 - g * dt * dt)).abs() < 1e-12);
        // x untouched.
        assert_eq!(pos[0][0], 25.0);
        Ok(())
    }

    #[test]
    fn coincident_centers_use_fallback_normal() -> Result<()> {
        let domain = Domain::new(50.0, 30.0, ContactLaw::Hookean { stiffness: 100.0 })?;
        let particles = vec![
            Particle::new([25.0, 15.0], [0.0, 0.0], 1.0, 1.0)?,
            Particle::new([25.0, 15.0], [0.0, 0.0], 1.0, 1.0)?,
        ];
        let mut sim = Simulation::with_gravity(particles, domain, 0.01, 0.0)?;
        let pos = sim.step();
        assert!(pos.iter().flatten().all(|c| c.is_finite()));
        let v = sim.velocities();
        // Pushed apart along the fallback +x axis, equal and opposite.
        assert!(v[0][0] < 0.0);
        assert!(v[1][0] > 0.0);
        assert_eq!(v[0][0], -v[1][0]);
        assert_eq!(v[0][1], 0.0);
        Ok(())
    }

    #[test]
    fn oversized_particle_feels_both_walls() -> Result<()> {
        // Radius exceeds the half-width, so both x walls overlap at once and
        // their contributions sum per axis.
        let domain = Domain::new(2.0, 40.0, ContactLaw::Hookean { stiffness: 100.0 })?;
        let centered = Particle::new([1.0, 20.0], [0.0, 0.0], 1.5, 1.0)?;
        let mut sim = Simulation::with_gravity(vec![centered], domain.clone(), 0.01, 0.0)?;
        sim.step();
        // Dead center: the opposite wall forces cancel exactly.
        assert_eq!(sim.velocities()[0][0], 0.0);

        let off_center = Particle::new([0.9, 20.0], [0.0, 0.0], 1.5, 1.0)?;
        let mut sim = Simulation::with_gravity(vec![off_center], domain, 0.01, 0.0)?;
        sim.step();
        // Nearer the left wall: net restoring force points back to center.
        assert!(sim.velocities()[0][0] > 0.0);
        Ok(())
    }

    #[test]
    fn reflective_wall_snaps_and_reverses() -> Result<()> {
        // Heading into the left wall.
        let p = Particle::new([1.2, 15.0], [-10.0, 0.0], 1.0, 1.0)?;
        let mut sim = Simulation::with_gravity(vec![p], reflective_domain()?, 0.05, 0.0)?;
        let pos = sim.step();
        assert_eq!(pos[0][0], 1.0);
        assert!(sim.velocities()[0][0] > 0.0);
        Ok(())
    }

    #[test]
    fn with_random_particles_is_seed_reproducible() -> Result<()> {
        let build = || -> Result<Simulation> {
            let domain = Domain::new(20.0, 20.0, ContactLaw::Reflective)?;
            Simulation::with_random_particles(16, domain, 0.01, 0.5, 1.0, Some(1234))
        };
        let a = build()?;
        let b = build()?;
        assert_eq!(a.positions(), b.positions());
        assert_eq!(a.velocities(), b.velocities());

        // Placement honors the domain and the no-overlap guarantee.
        for p in a.particles() {
            for k in 0..DIM {
                assert!(p.r[k] >= 0.5 && p.r[k] <= 19.5);
            }
        }
        for i in 0..a.num_particles() {
            for j in (i + 1)..a.num_particles() {
                assert!(dist_sq(a.particles()[i].r, a.particles()[j].r) >= 1.0 - 1e-12);
            }
        }
        Ok(())
    }

    #[test]
    fn with_random_particles_rejects_tight_domain() -> Result<()> {
        let domain = Domain::new(1.0, 20.0, ContactLaw::Reflective)?;
        assert!(Simulation::with_random_particles(1, domain, 0.01, 0.8, 1.0, Some(1)).is_err());
        Ok(())
    }
}
