pub mod base;
pub mod conditions;
pub mod executor;

pub use base::{
    ActionResult, Condition, ConditionType, ScrollDirection, SequenceResult, WebAction,
};
pub use conditions::{ConditionEvaluator, WebCondition};
pub use executor::ActionExecutor;
