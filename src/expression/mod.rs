//! Immutable expression graphs with reverse-mode differentiation.
//!
//! An [`ExprGraph`] is an arena of nodes describing a composition of
//! manifold-valued functions over optimization variables. Nodes reference
//! their children by index, never by pointer, so graphs are cheap to own,
//! trivially `Send + Sync`, and cycles are unrepresentable: a child's index
//! is always smaller than its parent's, making ascending index order a
//! topological order.
//!
//! Evaluation is a pure function of the assignment passed in:
//!
//! 1. **Forward pass** - each node reachable from the root is evaluated
//!    exactly once, in ascending index order, into a call-local cache.
//!    Shared subexpressions (one node feeding several parents) are therefore
//!    computed once per call.
//! 2. **Reverse pass** - the root's adjoint starts as the identity on its
//!    tangent space; walking indices downward, each composed node multiplies
//!    its adjoint by the operation's local partials and scatters the result
//!    into its children's adjoints; each leaf adds its adjoint into the
//!    Jacobian map under its key. Keys never touched stay absent - implicit
//!    zero blocks are never materialized.
//!
//! Handles are typed ([`Expr<T>`]) so composition is checked at compile
//! time. The assignment store is untyped per key, so each leaf records its
//! expected [`ValueKind`] and the forward pass verifies the stored variant
//! before evaluating anything downstream of it.

pub mod ops;

use crate::error::{AdError, AdResult};
use crate::values::{Key, Value, ValueKind, Values, ValueType};
use nalgebra::DMatrix;
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;

use ops::{BinaryOp, Project, SubPoint2, TransformTo, UnaryOp, Uncalibrate};

use crate::calibration::Cal3;
use crate::manifold::se3::SE3;
use crate::manifold::{Point2, Point3};

/// Map from variable key to its Jacobian block
/// (rows = output tangent dimension, cols = variable tangent dimension).
///
/// Backed by a `BTreeMap`, so iteration is in ascending key order - the
/// deterministic ordering downstream assembly relies on. Keys absent from
/// the map are implicitly zero blocks.
pub type JacobianMap = BTreeMap<Key, DMatrix<f64>>;

/// Typed handle to a node in an [`ExprGraph`].
///
/// Handles are plain indices; they are only meaningful for the graph that
/// produced them.
pub struct Expr<T> {
    index: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Expr<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Expr<T> {}

impl<T> fmt::Debug for Expr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Expr({})", self.index)
    }
}

impl<T> Expr<T> {
    fn new(index: usize) -> Self {
        Expr {
            index,
            _marker: PhantomData,
        }
    }
}

#[derive(Debug)]
enum Node {
    /// Fixed value; contributes no Jacobian entries.
    Constant(Value),
    /// Assignment lookup; Jacobian is the identity w.r.t. its own key.
    /// The stored value is checked against `kind` at evaluation time, since
    /// the assignment is untyped per key.
    Leaf { key: Key, kind: ValueKind },
    /// Unary composition.
    Unary { op: Box<dyn UnaryOp>, child: usize },
    /// Binary composition.
    Binary {
        op: Box<dyn BinaryOp>,
        lhs: usize,
        rhs: usize,
    },
}

/// Arena-owned immutable expression graph.
///
/// Built once at problem-setup time and evaluated repeatedly; no method
/// taking `&self` mutates the graph, so one graph may be evaluated from
/// several threads concurrently.
#[derive(Debug, Default)]
pub struct ExprGraph {
    nodes: Vec<Node>,
}

impl ExprGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        ExprGraph { nodes: Vec::new() }
    }

    /// Number of nodes in the arena.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the arena is empty.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn push(&mut self, node: Node) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    /// Add a constant node holding a fixed value.
    pub fn constant<T: ValueType>(&mut self, value: T) -> Expr<T> {
        Expr::new(self.push(Node::Constant(value.into_value())))
    }

    /// Add a leaf node bound to the variable `key`.
    pub fn leaf<T: ValueType>(&mut self, key: Key) -> Expr<T> {
        Expr::new(self.push(Node::Leaf {
            key,
            kind: T::KIND,
        }))
    }

    /// Compose an arbitrary unary operation. This is the extension point
    /// for operations outside the built-in library.
    pub fn apply_unary<A, R>(&mut self, op: impl UnaryOp + 'static, a: Expr<A>) -> Expr<R> {
        Expr::new(self.push(Node::Unary {
            op: Box::new(op),
            child: a.index,
        }))
    }

    /// Compose an arbitrary binary operation. This is the extension point
    /// for operations outside the built-in library.
    pub fn apply_binary<A, B, R>(
        &mut self,
        op: impl BinaryOp + 'static,
        a: Expr<A>,
        b: Expr<B>,
    ) -> Expr<R> {
        Expr::new(self.push(Node::Binary {
            op: Box::new(op),
            lhs: a.index,
            rhs: b.index,
        }))
    }

    /// Transform a world point into the pose's local frame.
    pub fn transform_to(&mut self, pose: Expr<SE3>, point: Expr<Point3>) -> Expr<Point3> {
        self.apply_binary(TransformTo, pose, point)
    }

    /// Project a camera-frame point onto the normalized image plane.
    ///
    /// The point must have positive depth; see [`ops::Project`].
    pub fn project(&mut self, point: Expr<Point3>) -> Expr<Point2> {
        self.apply_unary(Project, point)
    }

    /// Map a normalized image point to pixel coordinates.
    pub fn uncalibrate(&mut self, cal: Expr<Cal3>, point: Expr<Point2>) -> Expr<Point2> {
        self.apply_binary(Uncalibrate, cal, point)
    }

    /// Subtract two image points.
    pub fn sub(&mut self, lhs: Expr<Point2>, rhs: Expr<Point2>) -> Expr<Point2> {
        self.apply_binary(SubPoint2, lhs, rhs)
    }

    /// Evaluate the value of the expression rooted at `root`.
    ///
    /// Fails with [`MissingVariable`](crate::AdError::MissingVariable) if a
    /// leaf's key is absent from the assignment, and with
    /// [`TypeMismatch`](crate::AdError::TypeMismatch) if the assignment
    /// holds a different type than the leaf declares.
    pub fn value<T>(&self, root: Expr<T>, values: &Values) -> AdResult<Value> {
        let cache = self.forward_pass(root.index, values)?;
        Ok(cached(&cache, root.index).clone())
    }

    /// Evaluate the value together with the Jacobian block for every
    /// contributing variable, by reverse accumulation.
    pub fn value_and_jacobians<T>(
        &self,
        root: Expr<T>,
        values: &Values,
    ) -> AdResult<(Value, JacobianMap)> {
        let cache = self.forward_pass(root.index, values)?;
        let value = cached(&cache, root.index).clone();
        let rows = value.dof();

        // Reverse pass. adjoints[i] = d(root tangent)/d(node i tangent).
        let mut adjoints: Vec<Option<DMatrix<f64>>> = vec![None; root.index + 1];
        adjoints[root.index] = Some(DMatrix::identity(rows, rows));
        let mut jacobians = JacobianMap::new();

        for index in (0..=root.index).rev() {
            let Some(adjoint) = adjoints[index].take() else {
                continue;
            };
            match &self.nodes[index] {
                Node::Constant(_) => {}
                Node::Leaf { key, .. } => match jacobians.entry(*key) {
                    std::collections::btree_map::Entry::Occupied(mut e) => {
                        *e.get_mut() += adjoint;
                    }
                    std::collections::btree_map::Entry::Vacant(e) => {
                        e.insert(adjoint);
                    }
                },
                Node::Unary { op, child } => {
                    let d_child = op.partial(cached(&cache, *child));
                    accumulate(&mut adjoints[*child], &adjoint * d_child);
                }
                Node::Binary { op, lhs, rhs } => {
                    let (d_lhs, d_rhs) =
                        op.partials(cached(&cache, *lhs), cached(&cache, *rhs));
                    accumulate(&mut adjoints[*lhs], &adjoint * d_lhs);
                    accumulate(&mut adjoints[*rhs], &adjoint * d_rhs);
                }
            }
        }

        Ok((value, jacobians))
    }

    /// Forward pass over the subgraph reachable from `root`: one evaluation
    /// per node, cached by node index for the duration of this call only.
    fn forward_pass(&self, root: usize, values: &Values) -> AdResult<Vec<Option<Value>>> {
        let mut reachable = vec![false; root + 1];
        let mut stack = vec![root];
        while let Some(index) = stack.pop() {
            if reachable[index] {
                continue;
            }
            reachable[index] = true;
            match &self.nodes[index] {
                Node::Unary { child, .. } => stack.push(*child),
                Node::Binary { lhs, rhs, .. } => {
                    stack.push(*lhs);
                    stack.push(*rhs);
                }
                _ => {}
            }
        }

        let mut cache: Vec<Option<Value>> = vec![None; root + 1];
        for index in 0..=root {
            if !reachable[index] {
                continue;
            }
            let value = match &self.nodes[index] {
                Node::Constant(v) => v.clone(),
                Node::Leaf { key, kind } => {
                    let value = values.at(*key)?;
                    if value.kind() != *kind {
                        return Err(AdError::TypeMismatch {
                            key: *key,
                            expected: *kind,
                            actual: value.kind(),
                        });
                    }
                    value.clone()
                }
                Node::Unary { op, child } => op.forward(cached(&cache, *child)),
                Node::Binary { op, lhs, rhs } => {
                    op.forward(cached(&cache, *lhs), cached(&cache, *rhs))
                }
            };
            cache[index] = Some(value);
        }
        Ok(cache)
    }
}

// Children always carry a smaller arena index than their parents, so a
// parent's lookups during the ascending forward pass cannot miss.
fn cached(cache: &[Option<Value>], index: usize) -> &Value {
    cache[index]
        .as_ref()
        .expect("children are evaluated before parents")
}

fn accumulate(slot: &mut Option<DMatrix<f64>>, contribution: DMatrix<f64>) {
    match slot {
        Some(existing) => *existing += contribution,
        None => *slot = Some(contribution),
    }
}
