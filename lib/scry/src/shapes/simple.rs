//! Simple primitives: fully defined by their create message. Directional
//! shapes encode their axis as a quaternion from the canonical forward
//! `(0, 0, 1)` and their size as `scale.x/y = radius, scale.z = length`.

use super::{Shape, ShapeCore};
use crate::maths::{Quaternion, Vector3};
use crate::messages::{
    SID_ARROW, SID_BOX, SID_CAPSULE, SID_CONE, SID_CYLINDER, SID_PLANE, SID_POSE, SID_SPHERE,
    SID_STAR,
};

/// The primitive shape kinds sharing the tail-less create message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimpleKind {
    Sphere,
    Box,
    Cone,
    Cylinder,
    Capsule,
    Plane,
    Star,
    Arrow,
    Pose,
}

impl SimpleKind {
    pub fn routing_id(self) -> u16 {
        match self {
            SimpleKind::Sphere => SID_SPHERE,
            SimpleKind::Box => SID_BOX,
            SimpleKind::Cone => SID_CONE,
            SimpleKind::Cylinder => SID_CYLINDER,
            SimpleKind::Capsule => SID_CAPSULE,
            SimpleKind::Plane => SID_PLANE,
            SimpleKind::Star => SID_STAR,
            SimpleKind::Arrow => SID_ARROW,
            SimpleKind::Pose => SID_POSE,
        }
    }
}

/// A simple primitive instance.
pub struct SimpleShape {
    pub kind: SimpleKind,
    pub core: ShapeCore,
}

/// The directional scale convention: radius in x and y, length in z.
#[inline]
pub(super) fn directional_attributes(
    core: &mut ShapeCore,
    position: Vector3,
    direction: Vector3,
    radius: f64,
    length: f64,
) {
    core.attributes.position = position;
    core.attributes.rotation = Quaternion::rotation_between(Vector3::AXIS_Z, direction);
    core.attributes.scale = Vector3::new(radius, radius, length);
}

impl<'a> Shape<'a> {
    fn simple(kind: SimpleKind, object_id: u32) -> Shape<'a> {
        Shape::Simple(SimpleShape {
            kind,
            core: ShapeCore::new(object_id),
        })
    }

    /// A sphere of the given radius. Rotation and non-uniform scale may be
    /// applied afterwards to form ellipsoids.
    pub fn sphere(object_id: u32, position: Vector3, radius: f64) -> Shape<'a> {
        let mut shape = Shape::simple(SimpleKind::Sphere, object_id);
        let core = shape.core_mut();
        core.attributes.position = position;
        core.attributes.scale = Vector3::uniform(radius);
        shape
    }

    /// A box; `scale` sets the edge lengths.
    pub fn box_shape(
        object_id: u32,
        position: Vector3,
        scale: Vector3,
        rotation: Quaternion,
    ) -> Shape<'a> {
        let mut shape = Shape::simple(SimpleKind::Box, object_id);
        let core = shape.core_mut();
        core.attributes.position = position;
        core.attributes.scale = scale;
        core.attributes.rotation = rotation;
        shape
    }

    /// A cone with its pivot at the apex, opening along `direction`.
    pub fn cone(
        object_id: u32,
        apex: Vector3,
        direction: Vector3,
        radius: f64,
        length: f64,
    ) -> Shape<'a> {
        let mut shape = Shape::simple(SimpleKind::Cone, object_id);
        directional_attributes(shape.core_mut(), apex, direction, radius, length);
        shape
    }

    /// A cylinder centred on `centre` along `direction`.
    pub fn cylinder(
        object_id: u32,
        centre: Vector3,
        direction: Vector3,
        radius: f64,
        length: f64,
    ) -> Shape<'a> {
        let mut shape = Shape::simple(SimpleKind::Cylinder, object_id);
        directional_attributes(shape.core_mut(), centre, direction, radius, length);
        shape
    }

    /// A capsule centred on `centre` along `direction`.
    pub fn capsule(
        object_id: u32,
        centre: Vector3,
        direction: Vector3,
        radius: f64,
        length: f64,
    ) -> Shape<'a> {
        let mut shape = Shape::simple(SimpleKind::Capsule, object_id);
        directional_attributes(shape.core_mut(), centre, direction, radius, length);
        shape
    }

    /// A quad centred on `position` facing `normal`. `size` sets the quad
    /// edge length; `normal_length` the rendered normal.
    pub fn plane(
        object_id: u32,
        position: Vector3,
        normal: Vector3,
        size: f64,
        normal_length: f64,
    ) -> Shape<'a> {
        let mut shape = Shape::simple(SimpleKind::Plane, object_id);
        let core = shape.core_mut();
        core.attributes.position = position;
        core.attributes.rotation = Quaternion::rotation_between(Vector3::AXIS_Z, normal);
        core.attributes.scale = Vector3::new(size, normal_length, size);
        shape
    }

    /// A star marker; rotation is ignored, scale is the uniform radius.
    pub fn star(object_id: u32, position: Vector3, radius: f64) -> Shape<'a> {
        let mut shape = Shape::simple(SimpleKind::Star, object_id);
        let core = shape.core_mut();
        core.attributes.position = position;
        core.attributes.scale = Vector3::uniform(radius);
        shape
    }

    /// An arrow from `origin` along `direction`.
    pub fn arrow(
        object_id: u32,
        origin: Vector3,
        direction: Vector3,
        radius: f64,
        length: f64,
    ) -> Shape<'a> {
        let mut shape = Shape::simple(SimpleKind::Arrow, object_id);
        directional_attributes(shape.core_mut(), origin, direction, radius, length);
        shape
    }

    /// An oriented axis set marking a position and orientation.
    pub fn pose(object_id: u32, position: Vector3, rotation: Quaternion) -> Shape<'a> {
        let mut shape = Shape::simple(SimpleKind::Pose, object_id);
        let core = shape.core_mut();
        core.attributes.position = position;
        core.attributes.rotation = rotation;
        shape
    }
}
