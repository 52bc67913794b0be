//! # equal-risk
//!
//! $$
//! w_i\,(\Sigma\mathbf{w})_i = \frac{\mathbf{w}^\top\Sigma\mathbf{w}}{n}\quad \forall i
//! $$
//!
//! Equal risk contribution weights from daily closing prices, with an optional
//! cap that hands clipped weight to the strongest trailing performers.

pub mod allocation;
pub mod covariance;
pub mod engine;
pub mod error;
pub mod objective;
pub mod optimizers;
pub mod prices;
pub mod redistribute;
pub mod source;
pub mod types;

pub use allocation::ManualAllocation;
pub use allocation::adjusted_weights;
pub use covariance::CovarianceMatrix;
pub use engine::EngineConfig;
pub use engine::RiskParityEngine;
pub use engine::solve_weights;
pub use error::Error;
pub use error::Result;
pub use objective::RiskParityObjective;
pub use optimizers::ConstrainedMinimizer;
pub use optimizers::NelderMeadSolver;
pub use optimizers::ProjectedGradient;
pub use optimizers::Solver;
pub use prices::PriceMatrix;
pub use prices::PriceRow;
pub use prices::ReportingWindows;
pub use redistribute::CapAndRedistribute;
pub use redistribute::RedistributionMode;
pub use source::InMemoryPriceSource;
pub use source::PriceSource;
pub use types::AllocationWeight;
pub use types::OptimizationResult;
pub use types::SolverStatus;
pub use types::WeightVector;
