//! Variable assignment store.
//!
//! A [`Values`] maps opaque variable keys to their current manifold-valued
//! estimates. The store is owned and mutated by the external solver between
//! iterations; during expression evaluation it is read-only.
//!
//! [`Value`] is the runtime union over the variable types the operation
//! library understands. Typed expression handles make variant mismatches
//! unrepresentable between composed nodes; the store itself is untyped per
//! key, so leaf lookups verify the stored variant and surface
//! [`TypeMismatch`](crate::AdError::TypeMismatch) when an assignment holds
//! a different type than the leaf declares.

use crate::calibration::Cal3;
use crate::error::{AdError, AdResult};
use crate::manifold::se3::SE3;
use crate::manifold::{Manifold, Point2, Point3};
use nalgebra::DVector;
use std::collections::BTreeMap;

/// Opaque variable identifier. Unique within a problem; pure lookup key with
/// no ownership semantics.
pub type Key = u64;

/// Discriminant of a [`Value`] variant, for typed-lookup diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueKind {
    /// Rigid transformation
    Pose,
    /// 3D point
    Point3,
    /// 2D image point
    Point2,
    /// Pinhole calibration
    Cal,
}

impl std::fmt::Display for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ValueKind::Pose => "pose",
            ValueKind::Point3 => "point3",
            ValueKind::Point2 => "point2",
            ValueKind::Cal => "calibration",
        };
        f.write_str(name)
    }
}

/// Runtime union over the manifold types an expression can produce.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// Rigid transformation (6 DoF)
    Pose(SE3),
    /// 3D point (3 DoF)
    Point3(Point3),
    /// 2D image point (2 DoF)
    Point2(Point2),
    /// Pinhole calibration (5 DoF)
    Cal(Cal3),
}

impl Value {
    /// Discriminant of the contained variant.
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Pose(_) => ValueKind::Pose,
            Value::Point3(_) => ValueKind::Point3,
            Value::Point2(_) => ValueKind::Point2,
            Value::Cal(_) => ValueKind::Cal,
        }
    }

    /// Tangent space dimension of the contained value.
    pub fn dof(&self) -> usize {
        match self {
            Value::Pose(_) => SE3::DOF,
            Value::Point3(_) => <Point3 as Manifold>::DOF,
            Value::Point2(_) => <Point2 as Manifold>::DOF,
            Value::Cal(_) => Cal3::DOF,
        }
    }

    /// Apply a tangent-space perturbation through the contained type's
    /// retraction.
    pub fn retract(&self, delta: &DVector<f64>) -> Value {
        match self {
            Value::Pose(x) => Value::Pose(x.retract(delta)),
            Value::Point3(p) => Value::Point3(p.retract(delta)),
            Value::Point2(p) => Value::Point2(p.retract(delta)),
            Value::Cal(k) => Value::Cal(k.retract(delta)),
        }
    }

    /// Tangent vector taking `self` to `other`.
    ///
    /// Both values must hold the same variant; typed expression handles
    /// guarantee this for composed nodes, and leaf lookups verify the
    /// stored variant before evaluation.
    pub fn local_coordinates(&self, other: &Value) -> DVector<f64> {
        match (self, other) {
            (Value::Pose(a), Value::Pose(b)) => a.local_coordinates(b),
            (Value::Point3(a), Value::Point3(b)) => a.local_coordinates(b),
            (Value::Point2(a), Value::Point2(b)) => a.local_coordinates(b),
            (Value::Cal(a), Value::Cal(b)) => a.local_coordinates(b),
            _ => unreachable!("variants typed at construction and checked at leaf lookup"),
        }
    }

    pub(crate) fn as_pose(&self) -> &SE3 {
        match self {
            Value::Pose(x) => x,
            _ => unreachable!("variants typed at construction and checked at leaf lookup"),
        }
    }

    pub(crate) fn as_point3(&self) -> &Point3 {
        match self {
            Value::Point3(p) => p,
            _ => unreachable!("variants typed at construction and checked at leaf lookup"),
        }
    }

    pub(crate) fn as_point2(&self) -> &Point2 {
        match self {
            Value::Point2(p) => p,
            _ => unreachable!("variants typed at construction and checked at leaf lookup"),
        }
    }

    pub(crate) fn as_cal(&self) -> &Cal3 {
        match self {
            Value::Cal(k) => k,
            _ => unreachable!("variants typed at construction and checked at leaf lookup"),
        }
    }
}

/// Manifold types that can be stored in a [`Values`] assignment and flow
/// through typed expression handles.
pub trait ValueType: Manifold {
    /// The [`Value`] variant this type wraps into.
    const KIND: ValueKind;

    /// Wrap into the runtime union.
    fn into_value(self) -> Value;

    /// Borrow back out of the runtime union, if the variant matches.
    fn from_value(value: &Value) -> Option<&Self>;
}

impl ValueType for SE3 {
    const KIND: ValueKind = ValueKind::Pose;

    fn into_value(self) -> Value {
        Value::Pose(self)
    }

    fn from_value(value: &Value) -> Option<&Self> {
        match value {
            Value::Pose(x) => Some(x),
            _ => None,
        }
    }
}

impl ValueType for Point3 {
    const KIND: ValueKind = ValueKind::Point3;

    fn into_value(self) -> Value {
        Value::Point3(self)
    }

    fn from_value(value: &Value) -> Option<&Self> {
        match value {
            Value::Point3(p) => Some(p),
            _ => None,
        }
    }
}

impl ValueType for Point2 {
    const KIND: ValueKind = ValueKind::Point2;

    fn into_value(self) -> Value {
        Value::Point2(self)
    }

    fn from_value(value: &Value) -> Option<&Self> {
        match value {
            Value::Point2(p) => Some(p),
            _ => None,
        }
    }
}

impl ValueType for Cal3 {
    const KIND: ValueKind = ValueKind::Cal;

    fn into_value(self) -> Value {
        Value::Cal(self)
    }

    fn from_value(value: &Value) -> Option<&Self> {
        match value {
            Value::Cal(k) => Some(k),
            _ => None,
        }
    }
}

/// Assignment from variable keys to current estimates.
///
/// Backed by a `BTreeMap` so iteration order (and therefore any downstream
/// assembly driven by it) is deterministic, ascending by key.
#[derive(Clone, Debug, Default)]
pub struct Values {
    map: BTreeMap<Key, Value>,
}

impl Values {
    /// Create an empty assignment.
    pub fn new() -> Self {
        Values {
            map: BTreeMap::new(),
        }
    }

    /// Insert or replace the estimate for `key`.
    pub fn insert<T: ValueType>(&mut self, key: Key, value: T) {
        self.map.insert(key, value.into_value());
    }

    /// Insert or replace the estimate for `key` with an already-wrapped
    /// value, e.g. one produced by [`Value::retract`].
    pub fn insert_value(&mut self, key: Key, value: Value) {
        self.map.insert(key, value);
    }

    /// Look up the estimate for `key`.
    pub fn at(&self, key: Key) -> AdResult<&Value> {
        self.map.get(&key).ok_or(AdError::MissingVariable { key })
    }

    /// Look up the estimate for `key` as a concrete type.
    ///
    /// Returns `None` when the key is present but holds a different type.
    pub fn at_as<T: ValueType>(&self, key: Key) -> AdResult<Option<&T>> {
        Ok(T::from_value(self.at(key)?))
    }

    /// Number of variables in the assignment.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the assignment is empty.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Iterate over `(key, value)` pairs in ascending key order.
    pub fn iter(&self) -> impl Iterator<Item = (&Key, &Value)> {
        self.map.iter()
    }
}
