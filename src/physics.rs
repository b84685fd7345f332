use glam::Vec3;

/// One convex piece of a solid.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvexHull {
    /// `None` when bound to the whole body; vertices are then in component space.
    pub bone: Option<usize>,
    pub vertices: Vec<Vec3>,
    pub faces: Vec<[u32; 3]>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PhysSolid {
    pub index: usize,
    pub name: String,
    pub surface_prop: Option<String>,
    pub mass: Option<f32>,
    pub hulls: Vec<ConvexHull>,
}

/// Allowed rotation about one axis, in degrees.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AngularLimit {
    pub min: f32,
    pub max: f32,
    pub friction: f32,
}

impl AngularLimit {
    pub fn is_locked(&self) -> bool {
        self.min == self.max
    }
}

/// Joint between two solids, limits given about the x, y and z axes.
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub parent: usize,
    pub child: usize,
    pub limits: [AngularLimit; 3],
}
