//! Alert State Tracking
//!
//! Turns a drawdown snapshot into threshold-crossing events without repeating
//! an alert until the index recovers above the threshold.
//!
//! ```text
//!  drawdown   3% ──▶ 17% ──▶ 17% ──▶ 8% ──▶ 12%
//!  level      -      15      15      5      10
//!  events     -   [5,10,15]  []      []    [10]
//! ```

mod evaluate;
mod tracker;

pub use evaluate::{Evaluation, evaluate};
pub use tracker::AlertTracker;
