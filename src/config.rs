/// Absolute tetrahedron-volume tolerance for the coplanarity test. Not
/// scale-invariant; inputs are expected in millimetres.
pub const COPLANARITY_TOLERANCE: f64 = 1e-6;
/// Squared per-component tolerance when comparing unit direction vectors.
pub const COLINEARITY_TOLERANCE_SQ: f64 = 1e-16;
/// Point equality tolerance for on-segment and endpoint checks.
pub const POINT_MATCH_TOLERANCE: f64 = 1e-8;
/// Merge distance below which clipped face points are treated as duplicates.
pub const POINT_MERGE_DISTANCE: f64 = 1e-4;
/// Point equality tolerance for undirected edge matching in the manifold check.
pub const EDGE_MATCH_TOLERANCE: f64 = 1e-6;
/// Plane normal components below this are snapped to zero before normalization.
pub const NORMAL_SNAP_TOLERANCE: f64 = 1e-8;
/// Minimum |n·u| against the unit line direction for a segment to count as
/// crossing a plane.
pub const PLANE_CROSSING_TOLERANCE: f64 = 1e-10;
/// Most negative Heron radicand that is still clamped to zero.
pub const HERON_CLAMP: f64 = -1e-6;
/// Fraction of the shortest polyhedron edge used to offset orientation probes.
pub const PROBE_OFFSET_FRACTION: f64 = 1e-2;
/// Ray length multiplier over the farthest vertex distance in containment tests.
pub const RAY_LENGTH_FACTOR: f64 = 4.0;
/// Maximum redraws of a degenerate containment ray before giving up.
pub const MAX_RAY_RETRIES: usize = 32;
