//! # tangent-ad
//!
//! Block automatic differentiation for manifold-valued nonlinear
//! least-squares factors.
//!
//! Instead of hand-differentiating every measurement function, a residual
//! is described as an immutable expression graph composing named
//! differentiable operations over optimization variables. One evaluation of
//! the graph produces both the predicted value and, via reverse-mode
//! accumulation (chain rule), the sparse Jacobian block for every
//! contributing variable - the linear approximation an external nonlinear
//! least-squares solver consumes.
//!
//! ## Building blocks
//!
//! - [`ExprGraph`] / [`Expr`]: arena-owned expression graphs with typed
//!   handles; leaves bind variable keys, constants contribute no
//!   derivatives, composed nodes chain operation partials.
//! - Operation library ([`expression::ops`]): rigid-transform application,
//!   perspective projection, uncalibration, subtraction - each a stateless
//!   forward function plus its tangent-space partial derivatives.
//! - [`ExpressionFactor`]: binds a measurement to an expression; `error`,
//!   `dim` and `linearize` into a sparse [`LinearFactor`].
//! - Collaborators: the [`Values`] assignment store, [`Manifold`] geometry
//!   types ([`SE3`], [`SO3`], points, [`Cal3`]) and [`NoiseModel`]
//!   weighting.
//!
//! ## Example
//!
//! The classical two-view bundle-adjustment measurement residual:
//!
//! ```
//! use tangent_ad::{Cal3, ExprGraph, ExpressionFactor, Point2, Point3, SE3, Values};
//!
//! // predicted = uncalibrate(K, project(transform_to(x, p)))
//! let mut graph = ExprGraph::new();
//! let x = graph.leaf::<SE3>(1);
//! let p = graph.leaf::<Point3>(2);
//! let k = graph.leaf::<Cal3>(3);
//! let local = graph.transform_to(x, p);
//! let projection = graph.project(local);
//! let uv = graph.uncalibrate(k, projection);
//! let factor = ExpressionFactor::new(graph, uv, Point2::new(0.0, 1.0));
//!
//! let mut values = Values::new();
//! values.insert(1, SE3::identity());
//! values.insert(2, Point3::new(0.0, 0.0, 1.0));
//! values.insert(3, Cal3::default());
//!
//! assert_eq!(factor.dim(), 2);
//! let linear = factor.linearize(&values)?;
//! assert_eq!(linear.keys().collect::<Vec<_>>(), vec![1, 2, 3]);
//! # Ok::<(), tangent_ad::AdError>(())
//! ```
//!
//! Everything here is a pure, read-only transform over the graph and the
//! assignment; factors may be evaluated concurrently without
//! synchronization.

pub mod calibration;
pub mod error;
pub mod expression;
pub mod factor;
pub mod logger;
pub mod manifold;
pub mod noise;
pub mod numdiff;
pub mod values;

// Re-export core types
pub use calibration::Cal3;
pub use error::{AdError, AdResult};
pub use expression::{Expr, ExprGraph, JacobianMap};
pub use factor::{assemble, ExpressionFactor, LinearFactor};
pub use logger::{init_logger, init_logger_with_level};
pub use manifold::se3::SE3;
pub use manifold::so3::SO3;
pub use manifold::{Manifold, Point2, Point3};
pub use noise::{DiagonalNoise, NoiseModel, UnitNoise};
pub use numdiff::numerical_jacobian;
pub use values::{Key, Value, ValueKind, Values, ValueType};
