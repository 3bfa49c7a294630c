//! Global tuning constants for the simulation.

use crate::utils::math::{Real, PI};

// default shape parameters
pub const DEFAULT_FRICTION: Real = 0.2;
pub const DEFAULT_RESTITUTION: Real = 0.2;
pub const DEFAULT_DENSITY: Real = 1.0;
pub const DEFAULT_COLLISION_GROUP: u32 = 1;
pub const DEFAULT_COLLISION_MASK: u32 = 1;

// velocity limitations
pub const MAX_TRANSLATION_PER_STEP: Real = 20.0;
pub const MAX_ROTATION_PER_STEP: Real = PI;

// dynamic BVH
pub const BVH_PROXY_PADDING: Real = 0.1;
pub const BVH_INCREMENTAL_COLLISION_THRESHOLD: Real = 0.45;

// GJK/EPA
pub const DEFAULT_GJK_MARGIN: Real = 0.05;
pub const ENABLE_GJK_CACHING: bool = true;
pub const MAX_EPA_VERTICES: usize = 128;
pub const MAX_EPA_FACES: usize = 128;

// general constraints
pub const CONTACT_ENABLE_BOUNCE_THRESHOLD: Real = 0.5;
pub const VELOCITY_BAUMGARTE: Real = 0.2;
pub const POSITION_SPLIT_IMPULSE_BAUMGARTE: Real = 0.4;
pub const POSITION_NGS_BAUMGARTE: Real = 1.0;

// contacts
pub const ALTERNATIVE_POSITION_CORRECTION_DEPTH_THRESHOLD: Real = 0.05;
pub const CONTACT_PERSISTENCE_THRESHOLD: Real = 0.05;
pub const MAX_MANIFOLD_POINTS: usize = 4;

// joints
pub const JOINT_WARM_STARTING_FACTOR: Real = 0.95;

// islands
pub const ISLAND_INITIAL_BODY_CAPACITY: usize = 128;
pub const ISLAND_INITIAL_CONSTRAINT_CAPACITY: usize = 128;

// sleeping; per-body values can be changed through `RigidBodyConfig`
pub const SLEEPING_VELOCITY_THRESHOLD: Real = 0.2;
pub const SLEEPING_ANGULAR_VELOCITY_THRESHOLD: Real = 0.5;
pub const SLEEPING_TIME_THRESHOLD: Real = 1.0;
pub const DISABLE_SLEEPING: bool = false;

// slops
pub const LINEAR_SLOP: Real = 0.005;
pub const ANGULAR_SLOP: Real = PI / 180.0;

// world defaults
pub const DEFAULT_GRAVITY: [Real; 3] = [0.0, -9.80665, 0.0];
pub const DEFAULT_VELOCITY_ITERATIONS: u32 = 10;
pub const DEFAULT_POSITION_ITERATIONS: u32 = 5;
