/*! Built-in repair-pattern analyses.
 *
 * Each pattern implements [`fixgraph_core::PatternAnalysis`] and can be run
 * over file pairs with `fixgraph_core::analyze_pair` or `analyze_batch`.
 */

pub mod callback_error;
pub mod global_to_local;
pub mod special_type;

pub use callback_error::{CallbackErrorAnalysis, CallbackErrorElement};
pub use global_to_local::GlobalToLocalAnalysis;
pub use special_type::{condition_checks, literal_special_type, SpecialType};
