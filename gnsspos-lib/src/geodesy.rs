//! Geodetic to Earth-Centered Earth-Fixed coordinate conversion.
//!
//! Reference: NGA.STND.0036, World Geodetic System 1984, section 4.
use rayon::prelude::*;

const MAX_ITERATIONS: usize = 10;
/// Latitude convergence threshold in radians (~6e-6 mm on the surface).
const LAT_EPSILON: f64 = 1e-15;

/// Reference ellipsoid defined by its semi-major axis and flattening.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ellipsoid {
    /// Semi-major axis in meters
    pub a: f64,
    /// Flattening
    pub f: f64,
}

impl Ellipsoid {
    pub const WGS84: Ellipsoid = Ellipsoid {
        a: 6_378_137.0,
        f: 1.0 / 298.257_223_563,
    };

    pub const GRS80: Ellipsoid = Ellipsoid {
        a: 6_378_137.0,
        f: 1.0 / 298.257_222_101,
    };

    /// Semi-minor axis in meters.
    #[must_use]
    pub fn b(&self) -> f64 {
        self.a * (1.0 - self.f)
    }

    /// First eccentricity squared.
    #[must_use]
    pub fn e2(&self) -> f64 {
        self.f * (2.0 - self.f)
    }

    /// Prime vertical radius of curvature at geodetic latitude `lat` (radians).
    fn prime_vertical_radius(&self, lat: f64) -> f64 {
        let s = lat.sin();
        self.a / (1.0 - self.e2() * s * s).sqrt()
    }

    /// Convert geodetic latitude, longitude (degrees) and ellipsoidal height (meters) to
    /// ECEF x, y, z in meters.
    ///
    /// Inputs are not validated. NaN inputs produce NaN outputs.
    #[must_use]
    pub fn llh_to_xyz(&self, lat: f64, lon: f64, h: f64) -> (f64, f64, f64) {
        let lat = lat.to_radians();
        let lon = lon.to_radians();
        let n = self.prime_vertical_radius(lat);
        let (slat, clat) = lat.sin_cos();
        let (slon, clon) = lon.sin_cos();

        (
            (n + h) * clat * clon,
            (n + h) * clat * slon,
            (n * (1.0 - self.e2()) + h) * slat,
        )
    }

    /// Convert ECEF x, y, z in meters to geodetic latitude, longitude (degrees) and
    /// ellipsoidal height (meters).
    ///
    /// Starts from Bowring's estimate and iterates on latitude. Height is computed in a
    /// form that remains stable at the poles.
    #[must_use]
    pub fn xyz_to_llh(&self, x: f64, y: f64, z: f64) -> (f64, f64, f64) {
        let e2 = self.e2();
        let b = self.b();
        let ep2 = (self.a * self.a - b * b) / (b * b);
        let p = x.hypot(y);
        let lon = y.atan2(x);

        let th = (self.a * z).atan2(b * p);
        let (sth, cth) = th.sin_cos();
        let mut lat = (z + ep2 * b * sth.powi(3)).atan2(p - e2 * self.a * cth.powi(3));

        for _ in 0..MAX_ITERATIONS {
            let n = self.prime_vertical_radius(lat);
            let next = (z + e2 * n * lat.sin()).atan2(p);
            let done = (next - lat).abs() < LAT_EPSILON;
            lat = next;
            if done {
                break;
            }
        }

        let n = self.prime_vertical_radius(lat);
        let (slat, clat) = lat.sin_cos();
        let h = p * clat + z * slat - self.a * self.a / n;

        (lat.to_degrees(), lon.to_degrees(), h)
    }
}

impl Default for Ellipsoid {
    fn default() -> Self {
        Ellipsoid::WGS84
    }
}

/// Convert WGS84 latitude/longitude (degrees) and ellipsoidal height (meters) to ECEF
/// x, y, z in meters.
#[must_use]
pub fn llh_to_xyz(lat: f64, lon: f64, h: f64) -> (f64, f64, f64) {
    Ellipsoid::WGS84.llh_to_xyz(lat, lon, h)
}

/// Inverse of [llh_to_xyz] on WGS84.
#[must_use]
pub fn xyz_to_llh(x: f64, y: f64, z: f64) -> (f64, f64, f64) {
    Ellipsoid::WGS84.xyz_to_llh(x, y, z)
}

/// Convert a batch of `[lat, lon, h]` positions in parallel. Output order matches input.
#[must_use]
pub fn llh_to_xyz_batch(ellipsoid: &Ellipsoid, llh: &[[f64; 3]]) -> Vec<[f64; 3]> {
    llh.par_iter()
        .map(|p| {
            let (x, y, z) = ellipsoid.llh_to_xyz(p[0], p[1], p[2]);
            [x, y, z]
        })
        .collect()
}
