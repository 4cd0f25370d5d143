//! Actions bound into the workflow's dispatchers.

pub mod ask_planner;
pub mod retrieve_content;

pub use ask_planner::AskPlannerAction;
pub use retrieve_content::RetrieveContentAction;
