/// A point in engine space. `y` is elevation; gameplay distance is measured
/// on the ground plane (`x`/`z`).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Position {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Ground-plane (x/z) distance, ignoring elevation.
    pub fn ground_distance(&self, other: &Position) -> f32 {
        let dx = self.x - other.x;
        let dz = self.z - other.z;
        (dx * dx + dz * dz).sqrt()
    }

    /// Inclusive ground-plane radius test.
    pub fn within(&self, other: &Position, radius: f32) -> bool {
        self.ground_distance(other) <= radius
    }
}
